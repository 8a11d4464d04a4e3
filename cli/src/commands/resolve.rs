use std::process::ExitCode;

use anyhow::Result;
use clap::Args;
use config::PosConfig;
use serde_json::json;

use super::{EXIT_UNRESOLVED, open_session};
use crate::output;

#[derive(Args)]
pub struct ResolveArgs {
    #[arg(long, help = "Output as JSON")]
    pub json: bool,
}

pub async fn run(args: ResolveArgs, config: &PosConfig) -> Result<ExitCode> {
    let session = open_session(config)?;

    match session.resolve().await {
        Ok(resolution) => {
            if args.json {
                let output = json!({
                    "context": output::context_json(&resolution.context),
                    "source": resolution.source.to_string()
                });
                println!("{}", serde_json::to_string_pretty(&output)?);
            } else {
                output::header("Operational context");
                output::print_context(&resolution.context);
                println!("  source:  {}", resolution.source);
            }
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            if args.json {
                println!("{}", serde_json::to_string_pretty(&output::resolution_error_json(&e))?);
            } else {
                output::print_resolution_error(&e);
            }
            Ok(ExitCode::from(EXIT_UNRESOLVED))
        }
    }
}
