//! Run driver and trigger scheduler — wires [`ra_nodes::build_graph`] to a
//! single invocation (CLI) or to trigger firings (webhook/scheduled/event).

pub mod run_driver;
pub mod trigger_loop;

pub use run_driver::{execute_run, RunOutcome};
