//! Tool registry and built-in tools for the research agent.
//!
//! `exec`/`process` are the ambient background-process tool pair, kept from
//! the gateway's process-session model. `registry` is C3's uniform `Tool` /
//! `ToolResult` contract that everything — built-in, node-local, or a
//! future search tool — is invoked through.

pub mod exec;
pub mod manager;
pub mod process;
pub mod registry;

pub use manager::ProcessManager;
pub use registry::{invoke_tool, InvokePolicy, Tool, ToolInvokeError, ToolRegistry};
