//! Appvisor CLI - run application commands from the shell
//!
//! ```text
//! appvisor [--config FILE] <app> <command> [--flag value|-f value|arg]...
//! ```
//!
//! The command's response body is written to stdout, logs go to stderr.
//! Exit codes: 0 on success, 2 when the application or command does not
//! exist, 1 on any other failure.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use appvisor_kernel::{
    Collaborators, Dispatcher, Environment, FileManifestSource, Kernel, KernelConfig, KernelError,
    KernelResult, Request,
};
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

/// Appvisor CLI
#[derive(Parser)]
#[command(name = "appvisor")]
#[command(about = "Appvisor - run application commands from the shell", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "APPVISOR_CONFIG")]
    config: Option<PathBuf>,

    /// Log level
    #[arg(long, env = "APPVISOR_LOG_LEVEL", default_value = "warn")]
    log_level: String,

    /// Enable JSON logging
    #[arg(long, env = "APPVISOR_LOG_JSON")]
    json: bool,

    /// Application, command and the command's own arguments
    #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
    invocation: Vec<String>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize tracing
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| cli.log_level.clone().into());

    if cli.json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }

    // Load configuration
    let config = match KernelConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(err) => return fail(&err, false),
    };
    let debug = config.debug;

    match run(config, &cli.invocation) {
        Ok(body) => {
            print!("{body}");
            ExitCode::SUCCESS
        }
        Err(err) => fail(&err, debug),
    }
}

fn run(config: KernelConfig, invocation: &[String]) -> KernelResult<String> {
    let manifest = FileManifestSource::new(&config.root_path, &config.manifest_path);
    let collaborators = Collaborators {
        manifest: Arc::new(manifest),
        ..Collaborators::in_memory()
    };

    let kernel = Kernel::builder(config, collaborators)
        .register(commands::bootstrap())
        .build()?;

    let argv: Vec<&str> = std::iter::once("appvisor")
        .chain(invocation.iter().map(String::as_str))
        .collect();
    let mut ctx = kernel.context(kernel.system_config(Environment::Backend), Request::get(""))?;
    Dispatcher::dispatch_cli(&mut ctx, &argv)?;

    Ok(ctx.into_response().body().to_string())
}

fn fail(err: &KernelError, debug: bool) -> ExitCode {
    tracing::debug!(error = ?err, "Command failed");
    eprintln!("appvisor: {}", err.public_message(debug));
    match err {
        KernelError::UnknownApplication(_) | KernelError::NotFound(_) => ExitCode::from(2),
        _ => ExitCode::FAILURE,
    }
}
