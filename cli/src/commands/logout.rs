use std::process::ExitCode;

use anyhow::Result;
use clap::Args;
use config::PosConfig;
use serde_json::json;

use super::open_session;
use crate::output;

#[derive(Args)]
pub struct LogoutArgs {
    #[arg(long, help = "Output as JSON")]
    pub json: bool,
}

pub fn run(args: LogoutArgs, config: &PosConfig) -> Result<ExitCode> {
    let session = open_session(config)?;
    let purged = session.logout();

    if args.json {
        let output = json!({
            "purged": purged,
            "preserved": config.logout.preserved_keys
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        output::success(&format!("Logged out, {purged} stored entries removed"));
    }
    Ok(ExitCode::SUCCESS)
}
