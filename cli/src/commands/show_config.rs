use std::process::ExitCode;

use anyhow::Result;
use clap::Args;
use config::PosConfig;
use serde_json::Value;

use super::storage_dir;
use crate::output;

#[derive(Args)]
pub struct ConfigArgs {
    #[arg(long, help = "Include the gateway token instead of redacting it")]
    pub show_secrets: bool,
}

pub fn run(args: ConfigArgs, config: &PosConfig) -> Result<ExitCode> {
    let mut value = serde_json::to_value(config)?;
    if !args.show_secrets && config.gateway.api_token.is_some() {
        value["gateway"]["api_token"] = Value::String("***".to_string());
    }
    match storage_dir(config) {
        Ok(dir) => value["cache"]["storage_dir"] = Value::String(dir.display().to_string()),
        Err(e) => output::warn(&e.to_string()),
    }

    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(ExitCode::SUCCESS)
}
