use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Free-form per-entry attributes supplied by the caller.
pub type Metadata = BTreeMap<String, serde_json::Value>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    pub id: String,
    pub vector: Vec<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
}

impl Entry {
    pub fn new(id: impl Into<String>, vector: Vec<f32>) -> Self {
        Self {
            id: id.into(),
            vector,
            metadata: None,
        }
    }

    #[must_use]
    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchResult {
    pub entry: Entry,
    pub distance: f32,
    /// `1 / (1 + distance)`
    pub score: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexStats {
    pub dimension: usize,
    pub total_nodes: usize,
    pub total_vectors: usize,
    pub max_leaf_size: usize,
    pub root_radius: f32,
    pub root_child_count: usize,
    pub leaf_count: usize,
    pub depth: usize,
    pub largest_leaf: usize,
    pub degenerate_leaves: usize,
}
