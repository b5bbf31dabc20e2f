//! Leaf splitting.
//!
//! When a leaf overflows, its members are divided into two clusters seeded by the
//! pair of members farthest apart. If every member is identical the seeds coincide
//! and one cluster comes out empty; the split is then reported as degenerate and the
//! leaf keeps all of its members.

use crate::metric::euclidean;
use crate::store::VectorStore;
use ndarray::{Array2, Axis};

/// One side of a successful split.
#[derive(Debug, Clone, PartialEq)]
pub struct Cluster {
    /// Ordinals into the [`VectorStore`], in the order they appeared in the leaf.
    pub members: Vec<usize>,
    pub center: Vec<f32>,
    pub radius: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SplitOutcome {
    Split { first: Cluster, second: Cluster },
    /// All members fell into one cluster.
    Degenerate,
}

pub trait SplitStrategy: Send + Sync {
    fn split(&self, members: &[usize], store: &VectorStore) -> SplitOutcome;
}

/// Seeds on the farthest pair (first maximum in `(i, j)`, `i < j` scan order) and
/// assigns each member to the nearer seed, ties to the first.
#[derive(Debug, Default, Clone, Copy)]
pub struct FarthestPairSplit;

impl FarthestPairSplit {
    fn farthest_pair(members: &[usize], store: &VectorStore) -> Option<(usize, usize)> {
        let mut best: Option<(usize, usize, f32)> = None;
        for (i, &a) in members.iter().enumerate() {
            for &b in &members[i + 1..] {
                let d = euclidean(store.vector_at(a), store.vector_at(b));
                if best.map_or(true, |(_, _, current)| d > current) {
                    best = Some((a, b, d));
                }
            }
        }
        best.map(|(a, b, _)| (a, b))
    }
}

impl SplitStrategy for FarthestPairSplit {
    fn split(&self, members: &[usize], store: &VectorStore) -> SplitOutcome {
        let Some((p, q)) = Self::farthest_pair(members, store) else {
            return SplitOutcome::Degenerate;
        };
        let seed_p = store.vector_at(p);
        let seed_q = store.vector_at(q);

        let (first, second): (Vec<usize>, Vec<usize>) = members.iter().partition(|&&ordinal| {
            let v = store.vector_at(ordinal);
            euclidean(v, seed_p) <= euclidean(v, seed_q)
        });

        if first.is_empty() || second.is_empty() {
            return SplitOutcome::Degenerate;
        }

        SplitOutcome::Split {
            first: build_cluster(first, store),
            second: build_cluster(second, store),
        }
    }
}

/// Arithmetic mean of the members plus the largest member distance from it.
fn build_cluster(members: Vec<usize>, store: &VectorStore) -> Cluster {
    let dimension = store.dimension();
    let matrix = Array2::from_shape_fn((members.len(), dimension), |(row, col)| {
        f64::from(store.vector_at(members[row])[col])
    });
    let center: Vec<f32> = matrix
        .mean_axis(Axis(0))
        .map(|mean| mean.iter().map(|v| *v as f32).collect())
        .unwrap_or_else(|| vec![0.0; dimension]);

    let radius = members
        .iter()
        .map(|&ordinal| euclidean(&center, store.vector_at(ordinal)))
        .fold(0.0f32, f32::max);

    Cluster {
        members,
        center,
        radius,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_of(vectors: &[[f32; 2]]) -> VectorStore {
        let mut store = VectorStore::new(2);
        for (i, v) in vectors.iter().enumerate() {
            store.insert(format!("v{i}"), v.to_vec(), None).unwrap();
        }
        store
    }

    #[test]
    fn splits_two_groups_apart() {
        let store = store_of(&[[0.0, 0.0], [10.0, 0.0], [0.5, 0.0], [9.5, 0.0]]);
        let members: Vec<usize> = (0..store.len()).collect();

        let SplitOutcome::Split { first, second } = FarthestPairSplit.split(&members, &store)
        else {
            panic!("expected a split");
        };
        assert_eq!(first.members, vec![0, 2]);
        assert_eq!(second.members, vec![1, 3]);
        assert_eq!(first.center, vec![0.25, 0.0]);
        assert_eq!(second.center, vec![9.75, 0.0]);
        assert!((first.radius - 0.25).abs() < 1e-6);
    }

    #[test]
    fn farthest_pair_prefers_first_in_scan_order() {
        // Unit square: both diagonals tie; (0,2) is scanned before (1,3).
        let store = store_of(&[[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0]]);
        let pair = FarthestPairSplit::farthest_pair(&[0, 1, 2, 3], &store);
        assert_eq!(pair, Some((0, 2)));
    }

    #[test]
    fn equidistant_members_go_to_first_cluster() {
        let store = store_of(&[[-1.0, 0.0], [1.0, 0.0], [0.0, 0.5]]);
        let SplitOutcome::Split { first, second } =
            FarthestPairSplit.split(&[0, 1, 2], &store)
        else {
            panic!("expected a split");
        };
        assert_eq!(first.members, vec![0, 2]);
        assert_eq!(second.members, vec![1]);
    }

    #[test]
    fn identical_members_are_degenerate() {
        let store = store_of(&[[0.3, 0.3], [0.3, 0.3], [0.3, 0.3]]);
        assert_eq!(
            FarthestPairSplit.split(&[0, 1, 2], &store),
            SplitOutcome::Degenerate
        );
        assert_eq!(FarthestPairSplit.split(&[0], &store), SplitOutcome::Degenerate);
    }
}
