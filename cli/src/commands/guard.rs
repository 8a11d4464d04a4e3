use std::process::ExitCode;

use anyhow::Result;
use clap::Args;
use config::PosConfig;
use context::GuardOptions;

use super::{EXIT_BLOCKED, open_session};
use crate::output;

#[derive(Args)]
pub struct GuardArgs {
    #[arg(long, default_value = "/", help = "Screen being entered; used as the return target")]
    pub destination: String,

    #[arg(long, help = "Also require an open shift")]
    pub requires_opening: bool,

    #[arg(long, help = "Output as JSON")]
    pub json: bool,
}

impl GuardArgs {
    pub fn options(&self) -> GuardOptions {
        let options = GuardOptions::new(self.destination.clone());
        if self.requires_opening {
            options.requiring_secondary_resource()
        } else {
            options
        }
    }
}

pub async fn run(args: GuardArgs, config: &PosConfig) -> Result<ExitCode> {
    let session = open_session(config)?;
    let state = session.check(&args.options()).await;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&output::guard_state_json(&state))?);
    } else {
        output::print_guard_state(&state);
    }

    if state.is_passed() {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::from(EXIT_BLOCKED))
    }
}
