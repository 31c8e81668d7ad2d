//! Shared data model, configuration, and error types for the research agent
//! workspace.
//!
//! Every other crate in the workspace (`ra-cache`, `ra-aggregator`,
//! `ra-context`, `ra-verifier`, `ra-engine`, `ra-nodes`, `ra-triggers`,
//! `ra-providers`, `ra-tools`, `ra-gateway`) depends on this crate for the
//! types that cross component boundaries: messages, run configuration,
//! trace events, and the common `Error`/`Result`.

pub mod capability;
pub mod config;
pub mod error;
pub mod run_state;
pub mod search;
pub mod stream;
pub mod tool;
pub mod tool_result;
pub mod trace;
pub mod trigger;

pub use config::Config;
pub use error::{Error, Result};
