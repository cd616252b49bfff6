//! CLI form of dispatch: `<prog> <app> <command> [--flag value|-f value|arg]...`

use indexmap::IndexMap;
use serde_json::Value;
use tracing::info;

use super::Dispatcher;
use crate::context::Context;
use crate::error::{KernelError, KernelResult};
use crate::types::{AppId, BOOTSTRAP_APP};

/// Flags and positional arguments of one command invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CliArgs {
    pub flags: IndexMap<String, String>,
    pub positional: Vec<String>,
}

impl CliArgs {
    pub fn flag(&self, name: &str) -> Option<&str> {
        self.flags.get(name).map(String::as_str)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CliInvocation {
    pub app: AppId,
    pub command: String,
    pub args: CliArgs,
}

/// Parse an argument vector whose first element is the program name.
///
/// `--name` and `-n` bind the following token (trimmed) as their value, or
/// an empty string at the end of the vector. Anything else is positional.
pub fn parse_cli<S: AsRef<str>>(argv: &[S]) -> KernelResult<CliInvocation> {
    let mut tokens = argv.iter().map(AsRef::<str>::as_ref).skip(1);
    let app = tokens
        .next()
        .filter(|app| !app.is_empty())
        .ok_or_else(|| KernelError::MissingField("application".into()))?;
    let command = tokens
        .next()
        .filter(|command| !command.is_empty())
        .ok_or_else(|| KernelError::MissingField("command".into()))?;

    let mut args = CliArgs::default();
    while let Some(token) = tokens.next() {
        let key = token
            .strip_prefix("--")
            .or_else(|| token.strip_prefix('-'))
            .filter(|key| !key.is_empty());
        match key {
            Some(key) => {
                let value = tokens.next().unwrap_or_default().trim().to_string();
                args.flags.insert(key.to_string(), value);
            }
            None => args.positional.push(token.to_string()),
        }
    }

    Ok(CliInvocation {
        app: AppId::from(app),
        command: command.to_string(),
        args,
    })
}

impl Dispatcher {
    /// Run a CLI command. Both the bootstrap and the target application are
    /// resolved first; the target becomes current.
    pub fn dispatch_cli<S: AsRef<str>>(ctx: &mut Context, argv: &[S]) -> KernelResult<()> {
        let invocation = parse_cli(argv)?;
        for (name, value) in &invocation.args.flags {
            ctx.request_mut()
                .set_param(name.clone(), Value::String(value.clone()));
        }

        ctx.instance(BOOTSTRAP_APP)?;
        ctx.activate(invocation.app.as_str())?;

        let command = ctx
            .kernel()
            .application(invocation.app.as_str())
            .and_then(|application| application.command(&invocation.command).cloned())
            .ok_or_else(|| {
                KernelError::not_found(format!(
                    "command \"{} {}\" not found",
                    invocation.app, invocation.command
                ))
            })?;

        info!(app = %invocation.app, command = %invocation.command, "Running CLI command");
        command.run(ctx, &invocation.args)
    }
}
