//! Graph engine (C7) and auto-continuation loop (C4) for the research
//! agent workspace.
//!
//! `graph` wires typed nodes into the router/planner/searcher/writer/
//! evaluator/human-review graph (C8 nodes implement [`graph::Node`]),
//! `cancel` is the run-keyed cancellation map nodes poll at suspension
//! points, `checkpoint` is the pluggable durable/ephemeral state store,
//! and `continuation` is the pure decision/parsing core of the
//! auto-continuation state machine.

pub mod cancel;
pub mod checkpoint;
pub mod continuation;
pub mod graph;

pub use cancel::{CancelMap, CancelToken};
pub use checkpoint::{Checkpoint, Checkpointer, FileCheckpointer, InMemoryCheckpointer};
pub use continuation::{
    decide, ContinuationPolicy, Decision, FinishReason, InjectionStrategy, LoopState, StopReason,
    TaggedCallParser,
};
pub use graph::{
    merge_into, EdgeFn, EngineResult, GraphEngine, InterruptHandle, Node, NodeId, NodeOutput,
    PartialRunState, Transition,
};
