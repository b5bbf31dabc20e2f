//! Incrementally built binary ball tree over the vectors of a [`VectorStore`].
//!
//! Nodes live in an arena and refer to their children by arena index. Leaves hold
//! store ordinals rather than copies of the vectors, so the store stays the only
//! owner of vector data. Node centers are running means maintained on insert.
//!
//! Every node tracks two radii:
//! - `radius`: the largest distance ever observed between the node's center (as it
//!   was at insertion time) and an inserted vector.
//! - `covering_radius`: an upper bound on the distance between the *current* center
//!   and every vector below the node. When the center moves by `s`, no old vector
//!   can be farther than `covering + s`, so the bound is maintained in O(D).
//!
//! Only the covering radius is used for pruning.

use crate::metric::{euclidean, squared_euclidean};
use crate::node_ids::{NodeId, NodeIdGenerator};
use crate::split::{Cluster, SplitOutcome, SplitStrategy};
use crate::store::VectorStore;
use std::cmp::Ordering;
use std::collections::BinaryHeap;

/// Relative slack added to the k-th best distance before a subtree is pruned, so
/// `f32` rounding of computed distances can never prune a true neighbor.
const PRUNE_RELATIVE_SLACK: f64 = 1e-5;
const PRUNE_ABSOLUTE_SLACK: f64 = 1e-6;

#[derive(Debug)]
struct Node {
    id: NodeId,
    center: Vec<f32>,
    radius: f32,
    covering_radius: f64,
    count: usize,
    kind: NodeKind,
}

#[derive(Debug)]
enum NodeKind {
    Leaf {
        members: Vec<usize>,
        /// Set when the last split attempt collapsed into a single cluster.
        degenerate: bool,
    },
    Internal {
        children: [usize; 2],
    },
}

/// Read-only view of a node, for inspection and tests.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeSummary {
    pub id: NodeId,
    /// Zero for the root.
    pub depth: usize,
    pub center: Vec<f32>,
    pub radius: f32,
    pub count: usize,
    pub children: Vec<NodeId>,
    /// Store ordinals held by a leaf; empty for internal nodes.
    pub members: Vec<usize>,
    pub degenerate: bool,
}

/// Structural counters gathered in one traversal.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TreeShape {
    pub total_nodes: usize,
    pub root_radius: f32,
    pub root_child_count: usize,
    pub leaf_count: usize,
    /// Number of levels; a lone root leaf has depth 1.
    pub depth: usize,
    pub largest_leaf: usize,
    pub degenerate_leaves: usize,
}

pub struct BallTree {
    nodes: Vec<Node>,
    root: Option<usize>,
    max_leaf_size: usize,
    ids: Box<dyn NodeIdGenerator>,
    splitter: Box<dyn SplitStrategy>,
}

impl std::fmt::Debug for BallTree {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BallTree")
            .field("nodes", &self.nodes.len())
            .field("root", &self.root)
            .field("max_leaf_size", &self.max_leaf_size)
            .finish_non_exhaustive()
    }
}

impl BallTree {
    pub fn new(
        max_leaf_size: usize,
        ids: Box<dyn NodeIdGenerator>,
        splitter: Box<dyn SplitStrategy>,
    ) -> Self {
        Self {
            nodes: Vec::new(),
            root: None,
            max_leaf_size,
            ids,
            splitter,
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.root.is_none()
    }

    pub fn clear(&mut self) {
        self.nodes.clear();
        self.root = None;
        self.ids.reset();
    }

    /// Route the stored vector at `ordinal` to a leaf, updating every node on the way.
    pub fn insert(&mut self, ordinal: usize, store: &VectorStore) {
        let vector = store.vector_at(ordinal);

        let Some(mut current) = self.root else {
            let id = self.ids.next_id();
            self.nodes.push(Node {
                id,
                center: vector.to_vec(),
                radius: 0.0,
                covering_radius: 0.0,
                count: 1,
                kind: NodeKind::Leaf {
                    members: vec![ordinal],
                    degenerate: false,
                },
            });
            self.root = Some(self.nodes.len() - 1);
            log::debug!("Created root {id}");
            return;
        };

        loop {
            absorb(&mut self.nodes[current], vector);
            let children = match &mut self.nodes[current].kind {
                NodeKind::Leaf { members, .. } => {
                    members.push(ordinal);
                    None
                }
                NodeKind::Internal { children } => Some(*children),
            };
            let Some([first, second]) = children else {
                break;
            };
            let to_first = euclidean(&self.nodes[first].center, vector);
            let to_second = euclidean(&self.nodes[second].center, vector);
            current = if to_first <= to_second { first } else { second };
        }

        self.maybe_split(current, ordinal, store);
    }

    fn maybe_split(&mut self, leaf: usize, inserted: usize, store: &VectorStore) {
        let NodeKind::Leaf {
            members,
            degenerate,
        } = &self.nodes[leaf].kind
        else {
            return;
        };
        if members.len() <= self.max_leaf_size {
            return;
        }
        // A degenerate leaf only holds copies of one vector; another copy cannot
        // make it splittable.
        if *degenerate && store.vector_at(members[0]) == store.vector_at(inserted) {
            return;
        }

        let members = members.clone();
        match self.splitter.split(&members, store) {
            SplitOutcome::Split { first, second } => {
                let first = self.push_leaf(first, store);
                let second = self.push_leaf(second, store);
                log::debug!(
                    "Split {} ({} vectors) into {} and {}",
                    self.nodes[leaf].id,
                    members.len(),
                    self.nodes[first].id,
                    self.nodes[second].id
                );
                self.nodes[leaf].kind = NodeKind::Internal {
                    children: [first, second],
                };
            }
            SplitOutcome::Degenerate => {
                let node = &mut self.nodes[leaf];
                if let NodeKind::Leaf { degenerate, .. } = &mut node.kind {
                    if !*degenerate {
                        log::warn!(
                            "Leaf {} cannot be split (all {} vectors coincide); keeping it oversized",
                            node.id,
                            members.len()
                        );
                    }
                    *degenerate = true;
                }
            }
        }
    }

    fn push_leaf(&mut self, cluster: Cluster, store: &VectorStore) -> usize {
        let covering_radius = cluster
            .members
            .iter()
            .map(|&ordinal| squared_euclidean(&cluster.center, store.vector_at(ordinal)).sqrt())
            .fold(0.0f64, f64::max);
        self.nodes.push(Node {
            id: self.ids.next_id(),
            count: cluster.members.len(),
            center: cluster.center,
            radius: cluster.radius,
            covering_radius,
            kind: NodeKind::Leaf {
                members: cluster.members,
                degenerate: false,
            },
        });
        self.nodes.len() - 1
    }

    /// Exact Euclidean k-nearest search that skips subtrees whose covering ball
    /// cannot hold a candidate better than the current k-th best.
    ///
    /// Returns `(ordinal, distance)` ordered by distance, ties by ordinal, which is
    /// the same list a stable linear scan produces.
    pub fn search_euclidean(
        &self,
        query: &[f32],
        k: usize,
        store: &VectorStore,
    ) -> Vec<(usize, f32)> {
        let Some(root) = self.root else {
            return Vec::new();
        };
        if k == 0 {
            return Vec::new();
        }

        let mut best: BinaryHeap<Candidate> = BinaryHeap::with_capacity(k + 1);
        let mut stack = vec![(root, self.lower_bound(root, query))];
        let mut visited = 0usize;

        while let Some((index, bound)) = stack.pop() {
            if best.len() == k {
                if let Some(worst) = best.peek() {
                    if bound > prune_threshold(worst.distance) {
                        continue;
                    }
                }
            }
            visited += 1;

            match &self.nodes[index].kind {
                NodeKind::Leaf { members, .. } => {
                    for &ordinal in members {
                        let candidate = Candidate {
                            distance: euclidean(query, store.vector_at(ordinal)),
                            ordinal,
                        };
                        if best.len() < k {
                            best.push(candidate);
                        } else if best.peek().is_some_and(|worst| candidate < *worst) {
                            best.pop();
                            best.push(candidate);
                        }
                    }
                }
                NodeKind::Internal { children } => {
                    let [first, second] = *children;
                    let first_bound = self.lower_bound(first, query);
                    let second_bound = self.lower_bound(second, query);
                    // Nearer child goes on top of the stack.
                    if first_bound <= second_bound {
                        stack.push((second, second_bound));
                        stack.push((first, first_bound));
                    } else {
                        stack.push((first, first_bound));
                        stack.push((second, second_bound));
                    }
                }
            }
        }

        log::debug!(
            "Pruned search visited {visited}/{} nodes",
            self.nodes.len()
        );
        best.into_sorted_vec()
            .into_iter()
            .map(|c| (c.ordinal, c.distance))
            .collect()
    }

    fn lower_bound(&self, index: usize, query: &[f32]) -> f64 {
        let node = &self.nodes[index];
        squared_euclidean(query, &node.center).sqrt() - node.covering_radius
    }

    #[must_use]
    pub fn shape(&self) -> TreeShape {
        let Some(root) = self.root else {
            return TreeShape::default();
        };
        let root_node = &self.nodes[root];
        let mut shape = TreeShape {
            total_nodes: self.nodes.len(),
            root_radius: root_node.radius,
            root_child_count: match root_node.kind {
                NodeKind::Leaf { .. } => 0,
                NodeKind::Internal { .. } => 2,
            },
            ..TreeShape::default()
        };

        let mut stack = vec![(root, 1usize)];
        while let Some((index, depth)) = stack.pop() {
            shape.depth = shape.depth.max(depth);
            match &self.nodes[index].kind {
                NodeKind::Leaf {
                    members,
                    degenerate,
                } => {
                    shape.leaf_count += 1;
                    shape.largest_leaf = shape.largest_leaf.max(members.len());
                    if *degenerate {
                        shape.degenerate_leaves += 1;
                    }
                }
                NodeKind::Internal { children } => {
                    stack.push((children[1], depth + 1));
                    stack.push((children[0], depth + 1));
                }
            }
        }
        shape
    }

    /// Pre-order listing of every node.
    #[must_use]
    pub fn summaries(&self) -> Vec<NodeSummary> {
        let mut out = Vec::with_capacity(self.nodes.len());
        let mut stack: Vec<(usize, usize)> = self.root.map(|r| (r, 0)).into_iter().collect();
        while let Some((index, depth)) = stack.pop() {
            let node = &self.nodes[index];
            let (children, members, degenerate) = match &node.kind {
                NodeKind::Leaf {
                    members,
                    degenerate,
                } => (Vec::new(), members.clone(), *degenerate),
                NodeKind::Internal { children } => {
                    stack.push((children[1], depth + 1));
                    stack.push((children[0], depth + 1));
                    (
                        children.iter().map(|&c| self.nodes[c].id).collect(),
                        Vec::new(),
                        false,
                    )
                }
            };
            out.push(NodeSummary {
                id: node.id,
                depth,
                center: node.center.clone(),
                radius: node.radius,
                count: node.count,
                children,
                members,
                degenerate,
            });
        }
        out
    }
}

/// Fold `vector` into the node's running mean and radii.
fn absorb(node: &mut Node, vector: &[f32]) {
    node.count += 1;
    let n = node.count as f64;
    let previous = std::mem::take(&mut node.center);
    node.center = previous
        .iter()
        .zip(vector)
        .map(|(c, v)| ((f64::from(*c) * (n - 1.0) + f64::from(*v)) / n) as f32)
        .collect();

    let shift = squared_euclidean(&previous, &node.center).sqrt();
    let reach = squared_euclidean(&node.center, vector).sqrt();
    node.covering_radius = (node.covering_radius + shift).max(reach);
    node.radius = node.radius.max(reach as f32);
}

fn prune_threshold(worst: f32) -> f64 {
    let worst = f64::from(worst);
    worst + worst.abs() * PRUNE_RELATIVE_SLACK + PRUNE_ABSOLUTE_SLACK
}

/// Heap entry ordered by `(distance, ordinal)`; the heap top is the worst kept hit.
#[derive(Debug, Clone, Copy)]
struct Candidate {
    distance: f32,
    ordinal: usize,
}

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Candidate {}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        self.distance
            .total_cmp(&other.distance)
            .then(self.ordinal.cmp(&other.ordinal))
    }
}
