//! Single-linkage clustering over the similarity graph.

use std::collections::HashMap;

use crate::matrix::SimilarityMatrix;
use crate::union_find::UnionFind;

/// Assign a cluster id to every idea.
///
/// Every ordered pair `i < j` with similarity at or above `threshold` is
/// unioned, so ideas share a cluster exactly when a path of above-threshold
/// pairs connects them. Roots are then renumbered into contiguous ids
/// `0..K-1` in encounter order: the first idea always lands in cluster 0.
pub fn assign_clusters(matrix: &SimilarityMatrix, threshold: f64) -> Vec<usize> {
    let n = matrix.len();
    let mut uf = UnionFind::new(n);

    for i in 0..n {
        for j in (i + 1)..n {
            if matrix.get(i, j) >= threshold {
                uf.union(i, j);
            }
        }
    }

    let mut next_id = 0usize;
    let mut relabel: HashMap<usize, usize> = HashMap::new();
    let mut clusters = Vec::with_capacity(n);
    for i in 0..n {
        let root = uf.find(i);
        let id = *relabel.entry(root).or_insert_with(|| {
            let id = next_id;
            next_id += 1;
            id
        });
        clusters.push(id);
    }

    clusters
}

/// Number of distinct clusters in an assignment.
pub fn cluster_count(clusters: &[usize]) -> usize {
    clusters.iter().copied().max().map_or(0, |m| m + 1)
}
