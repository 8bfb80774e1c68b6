mod config;
mod telemetry;

use clap::{Parser, Subcommand};
use config::Config;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(version, about = "Relays checkout notifications to attribution postbacks")]
struct Cli {
    /// YAML config file; CONTROL_URL, TIMEOUT_MS, PORT and friends override it
    #[arg(long, short, env = "RELAY_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<CliCommand>,
}

#[derive(Subcommand, Clone, Copy)]
enum CliCommand {
    /// Serve notifications (default)
    Run,
    /// Validate the configuration and exit
    CheckConfig,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match Config::load(cli.config.as_deref(), |name| std::env::var(name).ok()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    };

    match cli.command.unwrap_or(CliCommand::Run) {
        CliCommand::CheckConfig => {
            println!("{:#?}", config.relay);
            ExitCode::SUCCESS
        }
        CliCommand::Run => run(config),
    }
}

fn run(config: Config) -> ExitCode {
    // Sentry must be initialized before the runtime starts.
    let _sentry_guard = match telemetry::init_logging(&config.logging) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    };

    if let Some(metrics_config) = &config.metrics
        && let Err(e) = telemetry::init_metrics(metrics_config)
    {
        tracing::error!(error = %e, "Metrics disabled");
    }

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            tracing::error!(error = %e, "Failed to start tokio runtime");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(notify_router::run(config.relay)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "Postback relay stopped");
            ExitCode::FAILURE
        }
    }
}
