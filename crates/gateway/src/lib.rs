//! Gateway binary support library: CLI, HTTP surface, and the run-driver
//! that wires [`ra_nodes::build_graph`] to trigger firings and CLI
//! invocations.

pub mod api;
pub mod cli;
pub mod runtime;
pub mod state;
