use crate::ball_tree::BallTree;
use crate::config::{IndexConfig, SearchMode};
use crate::error::{check_vector, Result};
use crate::metric::Metric;
use crate::node_ids::{NodeIdGenerator, SequentialNodeIds};
use crate::split::{FarthestPairSplit, SplitStrategy};
use crate::store::VectorStore;
use crate::types::{Entry, IndexStats, Metadata, SearchResult};

/// Vector store plus the ball tree built over it.
///
/// Mutating calls take `&mut self` and searches take `&self`, so sharing an index
/// behind a `RwLock` gives the single-writer, many-reader discipline the structure
/// needs. Nothing inside locks or blocks.
#[derive(Debug)]
pub struct BallTreeIndex {
    config: IndexConfig,
    store: VectorStore,
    tree: BallTree,
}

impl BallTreeIndex {
    pub fn new(config: IndexConfig) -> Result<Self> {
        Self::with_components(
            config,
            Box::new(SequentialNodeIds::default()),
            Box::new(FarthestPairSplit),
        )
    }

    /// Build an index with a caller-supplied node id source and split strategy.
    pub fn with_components(
        config: IndexConfig,
        ids: Box<dyn NodeIdGenerator>,
        splitter: Box<dyn SplitStrategy>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            store: VectorStore::new(config.dimension),
            tree: BallTree::new(config.max_leaf_size, ids, splitter),
            config,
        })
    }

    /// Rebuild an index by inserting `entries` in order.
    pub fn from_entries(
        config: IndexConfig,
        entries: impl IntoIterator<Item = Entry>,
    ) -> Result<Self> {
        let mut index = Self::new(config)?;
        for entry in entries {
            index.insert_entry(entry)?;
        }
        log::info!("Rebuilt index with {} entries", index.len());
        Ok(index)
    }

    /// Store the vector and route it into the tree. A rejected vector leaves both
    /// untouched.
    pub fn insert(
        &mut self,
        id: impl Into<String>,
        vector: Vec<f32>,
        metadata: Option<Metadata>,
    ) -> Result<()> {
        let ordinal = self.store.insert(id, vector, metadata)?;
        self.tree.insert(ordinal, &self.store);
        Ok(())
    }

    pub fn insert_entry(&mut self, entry: Entry) -> Result<()> {
        self.insert(entry.id, entry.vector, entry.metadata)
    }

    /// Up to `k` nearest entries under `metric`, using the configured search mode.
    pub fn search(&self, query: &[f32], k: usize, metric: Metric) -> Result<Vec<SearchResult>> {
        self.search_with_mode(query, k, metric, self.config.search_mode)
    }

    pub fn search_with_mode(
        &self,
        query: &[f32],
        k: usize,
        metric: Metric,
        mode: SearchMode,
    ) -> Result<Vec<SearchResult>> {
        check_vector(query, self.config.dimension)?;
        if k == 0 || self.store.is_empty() {
            return Ok(Vec::new());
        }
        let k = k.min(self.store.len());

        let hits = match (mode, metric) {
            (SearchMode::Pruned, Metric::Euclidean) => {
                self.tree.search_euclidean(query, k, &self.store)
            }
            (SearchMode::Pruned, Metric::Poincare) => {
                log::debug!("Pruned search has no hyperbolic bound; scanning all vectors");
                self.linear_scan(query, k, metric)
            }
            (SearchMode::BruteForce, _) => self.linear_scan(query, k, metric),
        };

        Ok(hits
            .into_iter()
            .map(|(ordinal, distance)| SearchResult {
                entry: self.store.entry_at(ordinal).clone(),
                distance,
                score: 1.0 / (1.0 + distance),
            })
            .collect())
    }

    fn linear_scan(&self, query: &[f32], k: usize, metric: Metric) -> Vec<(usize, f32)> {
        let mut scored: Vec<(usize, f32)> = self
            .store
            .all()
            .enumerate()
            .map(|(ordinal, entry)| (ordinal, metric.distance(query, &entry.vector)))
            .collect();
        // Stable: equal distances keep insertion order.
        scored.sort_by(|a, b| a.1.total_cmp(&b.1));
        scored.truncate(k);
        scored
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<&Entry> {
        self.store.get(id)
    }

    pub fn get_all<'a>(&'a self, id: &'a str) -> impl Iterator<Item = &'a Entry> + 'a {
        self.store.get_all(id)
    }

    pub fn entries(&self) -> std::slice::Iter<'_, Entry> {
        self.store.all()
    }

    /// Ordered copy of every entry; feeding it to [`BallTreeIndex::from_entries`]
    /// reproduces an equivalent index.
    #[must_use]
    pub fn export(&self) -> Vec<Entry> {
        self.store.all().cloned().collect()
    }

    pub fn clear(&mut self) {
        self.store.clear();
        self.tree.clear();
    }

    #[must_use]
    pub fn stats(&self) -> IndexStats {
        let shape = self.tree.shape();
        IndexStats {
            dimension: self.config.dimension,
            total_nodes: shape.total_nodes,
            total_vectors: self.store.len(),
            max_leaf_size: self.config.max_leaf_size,
            root_radius: shape.root_radius,
            root_child_count: shape.root_child_count,
            leaf_count: shape.leaf_count,
            depth: shape.depth,
            largest_leaf: shape.largest_leaf,
            degenerate_leaves: shape.degenerate_leaves,
        }
    }

    #[must_use]
    pub const fn config(&self) -> &IndexConfig {
        &self.config
    }

    #[must_use]
    pub const fn dimension(&self) -> usize {
        self.config.dimension
    }

    #[must_use]
    pub const fn tree(&self) -> &BallTree {
        &self.tree
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.store.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }
}
