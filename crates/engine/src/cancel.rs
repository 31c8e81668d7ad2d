//! Per-run cancellation tokens with group fan-out.
//!
//! Every run gets a `CancelToken`. Calling `cancel()` on it signals the
//! engine to stop at the next node boundary.
//!
//! **Groups** support cascading cancellation: cancelling a parent run also
//! cancels every child run registered in its group. Used when a node (e.g.
//! a sub-agent tool call) spawns its own run and should die with its parent.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

/// A cancellation token checked at node boundaries.
#[derive(Clone)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Signal cancellation.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    /// Check if cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Tracks active cancellation tokens per `run_id`, with group support for
/// cascading parent→child cancellation.
pub struct CancelMap {
    tokens: Mutex<HashMap<String, CancelToken>>,
    /// group_key (parent run) → set of child run ids.
    groups: Mutex<HashMap<String, HashSet<String>>>,
}

impl Default for CancelMap {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelMap {
    pub fn new() -> Self {
        Self {
            tokens: Mutex::new(HashMap::new()),
            groups: Mutex::new(HashMap::new()),
        }
    }

    /// Create and register a new cancel token for a run.
    pub fn register(&self, run_id: &str) -> CancelToken {
        let token = CancelToken::new();
        self.tokens.lock().insert(run_id.to_owned(), token.clone());
        token
    }

    /// Cancel a running run. Also cancels all children in its cancel
    /// group. Returns true if a token was found.
    pub fn cancel(&self, run_id: &str) -> bool {
        let found = if let Some(token) = self.tokens.lock().get(run_id) {
            token.cancel();
            true
        } else {
            false
        };

        if let Some(children) = self.groups.lock().get(run_id) {
            let tokens = self.tokens.lock();
            for child_id in children {
                if let Some(child_token) = tokens.get(child_id) {
                    child_token.cancel();
                }
            }
        }

        found
    }

    /// Remove the token for a run (called when the run finishes).
    pub fn remove(&self, run_id: &str) {
        self.tokens.lock().remove(run_id);
        self.groups.lock().remove(run_id);
    }

    /// Check if a run has an active (running) entry.
    pub fn is_running(&self, run_id: &str) -> bool {
        self.tokens.lock().contains_key(run_id)
    }

    /// Fetch the live token for a run, so a node driving its own
    /// sub-loop (e.g. a fan-out task) can poll cancellation directly
    /// rather than relying on the snapshot taken at fan-out dispatch.
    pub fn get(&self, run_id: &str) -> Option<CancelToken> {
        self.tokens.lock().get(run_id).cloned()
    }

    /// Register a child run id in a parent's cancel group.
    pub fn add_to_group(&self, parent_id: &str, child_id: &str) {
        self.groups
            .lock()
            .entry(parent_id.to_owned())
            .or_default()
            .insert(child_id.to_owned());
    }

    /// Remove a child from a parent's cancel group.
    pub fn remove_from_group(&self, parent_id: &str, child_id: &str) {
        let mut groups = self.groups.lock();
        if let Some(children) = groups.get_mut(parent_id) {
            children.remove(child_id);
            if children.is_empty() {
                groups.remove(parent_id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancel_token_lifecycle() {
        let token = CancelToken::new();
        assert!(!token.is_cancelled());
        token.cancel();
        assert!(token.is_cancelled());
    }

    #[test]
    fn cancel_map_register_and_cancel() {
        let map = CancelMap::new();
        let token = map.register("r1");
        assert!(!token.is_cancelled());
        assert!(map.is_running("r1"));

        assert!(map.cancel("r1"));
        assert!(token.is_cancelled());

        map.remove("r1");
        assert!(!map.is_running("r1"));
        assert!(!map.cancel("r1"));
    }

    #[test]
    fn cancel_cascades_to_children() {
        let map = CancelMap::new();
        let parent = map.register("parent");
        let child1 = map.register("child1");
        let child2 = map.register("child2");

        map.add_to_group("parent", "child1");
        map.add_to_group("parent", "child2");

        map.cancel("parent");
        assert!(parent.is_cancelled());
        assert!(child1.is_cancelled());
        assert!(child2.is_cancelled());
    }

    #[test]
    fn remove_from_group_cleanup() {
        let map = CancelMap::new();
        let _parent = map.register("p");
        let child = map.register("c");

        map.add_to_group("p", "c");
        map.remove_from_group("p", "c");

        map.cancel("p");
        assert!(!child.is_cancelled());
    }

    #[test]
    fn cancel_nonexistent_run_returns_false() {
        let map = CancelMap::new();
        assert!(!map.cancel("does_not_exist"));
    }

    #[test]
    fn remove_is_idempotent() {
        let map = CancelMap::new();
        map.register("r1");
        map.remove("r1");
        map.remove("r1");
        assert!(!map.is_running("r1"));
    }

    #[test]
    fn group_cleaned_up_on_parent_remove() {
        let map = CancelMap::new();
        let _parent = map.register("parent");
        let child = map.register("child");

        map.add_to_group("parent", "child");
        map.remove("parent");

        assert!(map.is_running("child"));
        assert!(!child.is_cancelled());
    }
}
