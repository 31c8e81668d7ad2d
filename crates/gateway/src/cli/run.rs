//! `ra-gateway run` — one-shot execution command.
//!
//! Sends a single request to the research agent and prints the report.
//! Useful for scripting and quick checks against a config without starting
//! the server.

use ra_domain::config::Config;

use crate::runtime::run_driver::{execute_run, RunOutcome};
use crate::state::AppState;

/// Run a single research request against a freshly bootstrapped [`AppState`]
/// and print the outcome.
pub async fn run(config: Config, thread: String, message: String, json: bool) -> anyhow::Result<()> {
    let state = AppState::bootstrap(config)?;
    let outcome = execute_run(&state, thread, message).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
        return Ok(());
    }

    match outcome {
        RunOutcome::Completed { report } => println!("{report}"),
        RunOutcome::Suspended { node, payload } => {
            println!("Run suspended at `{node}` awaiting input:");
            println!("{}", serde_json::to_string_pretty(&payload)?);
        }
        RunOutcome::Cancelled => println!("Run cancelled."),
    }

    Ok(())
}
