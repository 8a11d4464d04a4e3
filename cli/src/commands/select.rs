use std::process::ExitCode;

use anyhow::Result;
use clap::Args;
use config::PosConfig;
use serde_json::json;

use super::{EXIT_UNRESOLVED, open_session};
use crate::output;

#[derive(Args)]
pub struct SelectArgs {
    #[arg(long, short, help = "Profile id to activate")]
    pub profile: String,

    #[arg(long, short, help = "Branch to operate in")]
    pub branch: String,

    #[arg(long, help = "Output as JSON")]
    pub json: bool,
}

pub async fn run(args: SelectArgs, config: &PosConfig) -> Result<ExitCode> {
    let session = open_session(config)?;

    match session.select(&args.profile, &args.branch).await {
        Ok(context) => {
            if args.json {
                let output = json!({ "context": output::context_json(&context) });
                println!("{}", serde_json::to_string_pretty(&output)?);
            } else {
                output::success(&format!("Operating as {context}"));
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
