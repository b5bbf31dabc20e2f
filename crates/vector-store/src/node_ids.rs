use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque identifier of a tree node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub u64);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node-{}", self.0)
    }
}

/// Source of node identifiers, injected so tree construction is reproducible.
pub trait NodeIdGenerator: Send + Sync {
    fn next_id(&mut self) -> NodeId;

    /// Called by `clear()`; a reset generator must replay the same sequence.
    fn reset(&mut self);
}

/// Monotonic counter, starting at zero unless built with [`SequentialNodeIds::starting_at`].
#[derive(Debug, Default, Clone)]
pub struct SequentialNodeIds {
    first: u64,
    next: u64,
}

impl SequentialNodeIds {
    #[must_use]
    pub const fn starting_at(first: u64) -> Self {
        Self { first, next: first }
    }
}

impl NodeIdGenerator for SequentialNodeIds {
    fn next_id(&mut self) -> NodeId {
        let id = NodeId(self.next);
        self.next += 1;
        id
    }

    fn reset(&mut self) {
        self.next = self.first;
    }
}
