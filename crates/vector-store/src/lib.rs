//! # Hyperball Vector Store
//!
//! In-memory approximate nearest neighbor index for fixed-dimension embeddings.
//!
//! ## Features
//!
//! - **Incremental ball tree** split on leaf overflow by a farthest-pair heuristic
//! - **Two metrics**: Euclidean and hyperbolic (Poincare ball)
//! - **Exact ranking**: brute-force scan by default, or tree-pruned Euclidean search
//!   that returns the identical result list
//! - **Scalar quantization** to one signed byte per component
//! - **Snapshots** as versioned JSON, optionally quantized
//!
//! ## Architecture
//!
//! ```text
//! insert(id, vector, metadata)
//!     │
//!     ├──> VectorStore (authoritative, insertion order)
//!     │
//!     └──> BallTree
//!            ├─> running-mean centers on the insertion path
//!            └─> FarthestPairSplit when a leaf exceeds max_leaf_size
//!
//! search(query, k, metric)
//!     ├──> brute force: score every stored vector
//!     └──> pruned: branch-and-bound over covering radii (Euclidean)
//! ```
//!
//! ## Example
//!
//! ```
//! use hyperball_vector_store::{BallTreeIndex, IndexConfig, Metric};
//!
//! let mut index = BallTreeIndex::new(IndexConfig::with_dimension(3))?;
//! index.insert("a", vec![0.1, 0.2, 0.3], None)?;
//! index.insert("b", vec![0.9, -0.1, 0.0], None)?;
//!
//! let hits = index.search(&[0.1, 0.2, 0.3], 1, Metric::Euclidean)?;
//! assert_eq!(hits[0].entry.id, "a");
//! assert!(hits[0].score > 0.99);
//! # Ok::<(), hyperball_vector_store::VectorStoreError>(())
//! ```

mod ball_tree;
mod config;
mod error;
mod index;
pub mod metric;
mod node_ids;
pub mod quantize;
mod snapshot;
mod split;
mod store;
mod types;

pub use ball_tree::{BallTree, NodeSummary, TreeShape};
pub use config::{
    IndexConfig, SearchMode, DEFAULT_DIMENSION, DEFAULT_MAX_LEAF_SIZE, ENV_DIMENSION,
    ENV_MAX_LEAF_SIZE, ENV_SEARCH_MODE,
};
pub use error::{Result, VectorStoreError};
pub use index::BallTreeIndex;
pub use metric::{euclidean, poincare_distance, Metric};
pub use node_ids::{NodeId, NodeIdGenerator, SequentialNodeIds};
pub use quantize::{dequantize, quantization_error, quantize, QuantizedVector};
pub use snapshot::{IndexSnapshot, VectorEncoding, SNAPSHOT_SCHEMA_VERSION};
pub use split::{Cluster, FarthestPairSplit, SplitOutcome, SplitStrategy};
pub use store::VectorStore;
pub use types::{Entry, IndexStats, Metadata, SearchResult};
