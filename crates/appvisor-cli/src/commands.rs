//! Built-in commands of the bootstrap application.

use std::sync::Arc;

use appvisor_kernel::{Application, CliArgs, CliCommand, Context, KernelError, KernelResult, BOOTSTRAP_APP};

/// Output format selected with `--format`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Format {
    Table,
    Json,
}

impl Format {
    fn from_args(args: &CliArgs) -> KernelResult<Self> {
        match args.flag("format").unwrap_or("table") {
            "table" | "" => Ok(Format::Table),
            "json" => Ok(Format::Json),
            other => Err(KernelError::Config(format!("unknown output format \"{other}\""))),
        }
    }
}

/// `apps [all] [--format table|json]`: list installed applications,
/// the bootstrap one included with `all`.
///
/// Flags always consume the next token, so `all` is a bare word rather than
/// a switch. A trailing `--all` or `--all 1` is accepted as well.
pub struct AppsCommand;

impl CliCommand for AppsCommand {
    fn run(&self, ctx: &mut Context, args: &CliArgs) -> KernelResult<()> {
        let include_system = args.positional.iter().any(|arg| arg == "all")
            || args.flag("all").is_some_and(|value| value != "0");
        let apps = ctx.apps(include_system)?;

        let output = match Format::from_args(args)? {
            Format::Json => serde_json::to_string_pretty(&apps)? + "\n",
            Format::Table => apps
                .iter()
                .map(|info| format!("{:<16} {:<12} {}\n", info.id.as_str(), info.full_version(), info.name))
                .collect(),
        };
        ctx.response_mut().write(&output);
        Ok(())
    }
}

/// `version [<app>]`: full version of an application, the bootstrap one by
/// default.
pub struct VersionCommand;

impl CliCommand for VersionCommand {
    fn run(&self, ctx: &mut Context, args: &CliArgs) -> KernelResult<()> {
        let app = args
            .positional
            .first()
            .map(String::as_str)
            .unwrap_or(BOOTSTRAP_APP);
        if !ctx.app_exists(app)? {
            return Err(KernelError::UnknownApplication(app.to_string()));
        }
        let version = ctx.version(Some(app))?;
        ctx.response_mut().write(&format!("{app} {version}\n"));
        Ok(())
    }
}

/// The bootstrap application with its shell commands.
pub fn bootstrap() -> Application {
    Application::new(BOOTSTRAP_APP)
        .with_command("apps", Arc::new(AppsCommand))
        .with_command("version", Arc::new(VersionCommand))
}
