use std::process::ExitCode;

use anyhow::Result;
use clap::Args;
use config::PosConfig;
use context::GuardOptions;

use super::open_session;
use crate::output;

#[derive(Args)]
pub struct WatchArgs {
    #[arg(long, default_value = "/", help = "Screen being guarded")]
    pub destination: String,

    #[arg(long, help = "Also require an open shift")]
    pub requires_opening: bool,

    #[arg(long, help = "One JSON object per state change")]
    pub json: bool,
}

/// Prints every settled guard state until interrupted. Selections made by
/// other pos-context processes sharing the storage directory show up here.
pub async fn run(args: WatchArgs, config: &PosConfig) -> Result<ExitCode> {
    let session = open_session(config)?;
    let mut options = GuardOptions::new(args.destination.clone());
    if args.requires_opening {
        options = options.requiring_secondary_resource();
    }
    let mut handle = session.watch(options);

    if !args.json {
        output::info("Watching the operational context, Ctrl-C to stop");
    }

    loop {
        tokio::select! {
            state = handle.changed() => {
                let Some(state) = state else { break };
                if state.is_loading() {
                    continue;
                }
                if args.json {
                    println!("{}", output::guard_state_json(&state));
                } else {
                    output::print_guard_state(&state);
                }
            }
            _ = tokio::signal::ctrl_c() => break
        }
    }

    Ok(ExitCode::SUCCESS)
}
