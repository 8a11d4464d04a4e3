pub mod guard;
pub mod logout;
pub mod resolve;
pub mod select;
pub mod show_config;
pub mod watch;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use clap::{Args, Parser, Subcommand};
use config::{PosConfig, load_from_env, load_from_file, merge_configs, validate};
use context::HttpContextGateway;
use storage::FileStorage;
use sync::{ChannelHub, TerminalSession};

/// Exit code when the context could not be resolved or selected.
pub const EXIT_UNRESOLVED: u8 = 2;
/// Exit code when the guard did not let the operator through.
pub const EXIT_BLOCKED: u8 = 3;

#[derive(Parser)]
#[command(
    name = "pos-context",
    author,
    version,
    about = "Resolve, select and guard the operational context of a POS terminal",
    long_about = "Works against the operational-context API of the POS server.\n\nThe resolved \
                  context is cached in a local storage directory shared by every pos-context \
                  process,\nso `watch` in one terminal follows `select` in another."
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Args, Debug, Default)]
pub struct GlobalArgs {
    #[arg(long, global = true, help = "Configuration file (TOML or YAML)")]
    pub config: Option<PathBuf>,

    #[arg(long, global = true, help = "Base URL of the POS server")]
    pub base_url: Option<String>,

    #[arg(long, global = true, help = "Directory of the shared local storage")]
    pub storage_dir: Option<PathBuf>,

    #[arg(long, global = true, help = "Emit logs as JSON")]
    pub log_json: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    #[command(about = "Resolve the operational context (memory, cache, then server)")]
    Resolve(resolve::ResolveArgs),

    #[command(about = "Select a profile and branch for this terminal")]
    Select(select::SelectArgs),

    #[command(about = "Evaluate the route guard once")]
    Guard(guard::GuardArgs),

    #[command(about = "Forget the local context and purge local storage")]
    Logout(logout::LogoutArgs),

    #[command(about = "Follow the guard state as the context changes")]
    Watch(watch::WatchArgs),

    #[command(about = "Show the effective configuration")]
    Config(show_config::ConfigArgs),
}

/// Effective configuration: defaults < file < env < command line.
pub fn load_config(global: &GlobalArgs) -> Result<PosConfig> {
    let file_config = match &global.config {
        Some(path) => load_from_file(path)
            .with_context(|| format!("Failed to load {}", path.display()))?,
        None => PosConfig::default(),
    };
    let env_config =
        load_from_env().map_err(|e| anyhow!("Invalid environment configuration: {e}"))?;

    let mut cli_config = PosConfig::default();
    if let Some(base_url) = &global.base_url {
        cli_config.gateway.base_url = base_url.clone();
    }
    if let Some(dir) = &global.storage_dir {
        cli_config.cache.storage_dir = Some(dir.clone());
    }
    cli_config.observability.json_logs = global.log_json;

    let config = merge_configs(
        PosConfig::default(),
        file_config,
        "file",
        env_config,
        "env",
        Some(cli_config),
        "cli",
    );
    validate(&config).context("Invalid configuration")?;
    Ok(config)
}

pub fn storage_dir(config: &PosConfig) -> Result<PathBuf> {
    if let Some(dir) = &config.cache.storage_dir {
        return Ok(dir.clone());
    }
    dirs::data_dir()
        .map(|dir| dir.join("pos-context"))
        .ok_or_else(|| anyhow!("No data directory available, pass --storage-dir"))
}

/// One terminal session backed by the on-disk storage and the HTTP gateway.
pub fn open_session(config: &PosConfig) -> Result<TerminalSession> {
    let dir = storage_dir(config)?;
    let storage = FileStorage::open(&dir)
        .with_context(|| format!("Failed to open storage in {}", dir.display()))?;
    let gateway =
        HttpContextGateway::new(&config.gateway).context("Invalid gateway configuration")?;

    Ok(TerminalSession::new(
        config,
        Arc::new(gateway),
        Arc::new(storage),
        &ChannelHub::new(),
    ))
}
