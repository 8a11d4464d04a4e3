use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

mod commands;
mod output;

use commands::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    let config = commands::load_config(&cli.global)?;

    init_logging(&config.observability.log_level, config.observability.json_logs);

    match cli.command {
        Commands::Resolve(args) => commands::resolve::run(args, &config).await,
        Commands::Select(args) => commands::select::run(args, &config).await,
        Commands::Guard(args) => commands::guard::run(args, &config).await,
        Commands::Logout(args) => commands::logout::run(args, &config),
        Commands::Watch(args) => commands::watch::run(args, &config).await,
        Commands::Config(args) => commands::show_config::run(args, &config),
    }
}

/// `RUST_LOG` wins over the configured level. Logs go to stderr so command
/// output on stdout stays machine readable.
fn init_logging(level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let registry = tracing_subscriber::registry().with(filter);

    if json {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry.with(fmt::layer().with_writer(std::io::stderr)).init();
    }
}
