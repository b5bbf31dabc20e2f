use hyperball_vector_store::{
    euclidean, poincare_distance, BallTreeIndex, IndexConfig, Metric, SearchMode,
    VectorStoreError,
};
use pretty_assertions::assert_eq;

const DIM: usize = 384;

fn index_with_leaf_size(max_leaf_size: usize) -> BallTreeIndex {
    BallTreeIndex::new(IndexConfig::with_dimension(DIM).max_leaf_size(max_leaf_size))
        .expect("valid config")
}

/// Vectors that differ only in their first coordinate.
fn one_axis_vectors(count: usize) -> Vec<Vec<f32>> {
    (0..count)
        .map(|i| {
            let mut v = vec![0.05; DIM];
            v[0] = i as f32 * 0.1;
            v
        })
        .collect()
}

#[test]
fn self_match_ranks_first_among_one_axis_variants() {
    let mut index = index_with_leaf_size(10);
    let vectors = one_axis_vectors(10);
    for (i, v) in vectors.iter().enumerate() {
        index.insert(format!("doc-{i}"), v.clone(), None).unwrap();
    }

    let hits = index.search(&vectors[0], 1, Metric::Euclidean).unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].entry.id, "doc-0");
    assert_eq!(hits[0].distance, 0.0);
    assert!(hits[0].score > 0.99);
}

#[test]
fn result_count_is_clamped_to_stored_vectors() {
    let mut index = index_with_leaf_size(10);
    for (i, v) in one_axis_vectors(5).into_iter().enumerate() {
        index.insert(format!("doc-{i}"), v, None).unwrap();
    }
    let query = vec![0.2; DIM];
    for metric in [Metric::Euclidean, Metric::Poincare] {
        assert_eq!(index.search(&query, 10, metric).unwrap().len(), 5);
    }
}

#[test]
fn identical_vectors_have_zero_distance_under_both_metrics() {
    let v: Vec<f32> = (0..DIM).map(|i| (i as f32 * 0.013).sin() * 0.04).collect();
    let copy = v.clone();
    assert_eq!(euclidean(&v, &copy), 0.0);
    assert!(poincare_distance(&v, &copy).abs() < 1e-6);

    let mut index = index_with_leaf_size(10);
    index.insert("twin-a", v.clone(), None).unwrap();
    index.insert("twin-b", copy, None).unwrap();
    for metric in [Metric::Euclidean, Metric::Poincare] {
        let hits = index.search(&v, 2, metric).unwrap();
        assert!(hits.iter().all(|h| h.distance.abs() < 1e-6), "{metric:?}");
    }
}

#[test]
fn eleventh_insert_triggers_exactly_one_split() {
    let mut index = index_with_leaf_size(10);
    let vectors = one_axis_vectors(11);
    for (i, v) in vectors.iter().take(10).enumerate() {
        index.insert(format!("doc-{i}"), v.clone(), None).unwrap();
    }
    assert_eq!(index.stats().total_nodes, 1);

    index.insert("doc-10", vectors[10].clone(), None).unwrap();
    let stats = index.stats();
    assert!(stats.total_nodes > 1);
    assert_eq!(stats.total_nodes, 3);
    assert_eq!(stats.root_child_count, 2);
    assert_eq!(stats.leaf_count, 2);
    assert_eq!(stats.total_vectors, 11);
}

#[test]
fn dimension_mismatch_leaves_index_untouched() {
    let mut index = index_with_leaf_size(4);
    for (i, v) in one_axis_vectors(6).into_iter().enumerate() {
        index.insert(format!("doc-{i}"), v, None).unwrap();
    }
    let before = index.stats();
    let before_tree = index.tree().summaries();

    for bad_len in [0, DIM - 1, DIM + 1] {
        let err = index.insert("bad", vec![0.0; bad_len], None).unwrap_err();
        assert!(
            matches!(err, VectorStoreError::InvalidDimension { expected: DIM, actual } if actual == bad_len)
        );
    }
    assert_eq!(index.stats(), before);
    assert_eq!(index.tree().summaries(), before_tree);
    assert!(index.get("bad").is_none());
}

#[test]
fn clear_resets_counts_and_search() {
    let mut index = index_with_leaf_size(3);
    for (i, v) in one_axis_vectors(12).into_iter().enumerate() {
        index.insert(format!("doc-{i}"), v, None).unwrap();
    }
    assert!(index.stats().total_nodes > 1);

    index.clear();
    let stats = index.stats();
    assert_eq!(stats.total_vectors, 0);
    assert_eq!(stats.total_nodes, 0);
    assert_eq!(stats.root_child_count, 0);
    for k in [0, 1, 50] {
        for mode in [SearchMode::BruteForce, SearchMode::Pruned] {
            assert!(index
                .search_with_mode(&vec![0.05; DIM], k, Metric::Euclidean, mode)
                .unwrap()
                .is_empty());
        }
    }

    // Cleared index accepts inserts again.
    index.insert("again", vec![0.1; DIM], None).unwrap();
    assert_eq!(index.stats().total_nodes, 1);
}

#[test]
fn duplicate_ids_are_stored_as_separate_entries() {
    let mut index = index_with_leaf_size(10);
    index.insert("tag", vec![0.1; DIM], None).unwrap();
    index.insert("tag", vec![0.3; DIM], None).unwrap();

    assert_eq!(index.len(), 2);
    assert_eq!(index.get("tag").unwrap().vector[0], 0.1);
    assert_eq!(index.get_all("tag").count(), 2);

    let hits = index.search(&vec![0.3; DIM], 5, Metric::Euclidean).unwrap();
    let ids: Vec<&str> = hits.iter().map(|h| h.entry.id.as_str()).collect();
    assert_eq!(ids, vec!["tag", "tag"]);
    assert_eq!(hits[0].entry.vector[0], 0.3);
}

#[test]
fn coinciding_vectors_keep_working_in_an_oversized_leaf() {
    let mut index = index_with_leaf_size(4);
    for i in 0..20 {
        index.insert(format!("same-{i}"), vec![0.2; DIM], None).unwrap();
    }
    let stats = index.stats();
    assert_eq!(stats.total_nodes, 1);
    assert_eq!(stats.largest_leaf, 20);
    assert_eq!(stats.degenerate_leaves, 1);

    let hits = index
        .search_with_mode(&vec![0.2; DIM], 3, Metric::Euclidean, SearchMode::Pruned)
        .unwrap();
    let ids: Vec<&str> = hits.iter().map(|h| h.entry.id.as_str()).collect();
    assert_eq!(ids, vec!["same-0", "same-1", "same-2"]);
}

#[test]
fn poincare_clamps_unnormalized_vectors() {
    let mut index = BallTreeIndex::new(IndexConfig::with_dimension(2)).unwrap();
    index.insert("big", vec![30.0, 40.0], None).unwrap();
    index.insert("small", vec![0.1, 0.0], None).unwrap();

    let hits = index.search(&[30.0, 40.0], 2, Metric::Poincare).unwrap();
    assert_eq!(hits[0].entry.id, "big");
    assert!(hits[0].distance.abs() < 1e-6);
    assert!(hits[1].distance.is_finite());
}
