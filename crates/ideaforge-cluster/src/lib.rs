//! # ideaforge-cluster
//!
//! Similarity engine for the ideaforge research pipeline: cosine similarity
//! matrix, single-linkage clustering via union-find, and intra-cluster
//! deduplication.

pub mod cluster;
pub mod dedup;
pub mod matrix;
pub mod union_find;

pub use cluster::{assign_clusters, cluster_count};
pub use dedup::{mark_duplicates, round_similarity, summarize, DuplicateFlag};
pub use matrix::{cosine_similarity, SimilarityMatrix};
pub use union_find::UnionFind;

use ideaforge_core::models::ClusterSummary;

/// Full similarity analysis for one idea set.
#[derive(Debug, Clone)]
pub struct SimilarityAnalysis {
    pub clusters: Vec<usize>,
    pub flags: Vec<DuplicateFlag>,
    pub summary: ClusterSummary,
}

/// Run the whole similarity pipeline: matrix → clusters → duplicate flags.
///
/// `embeddings` and `confidences` are parallel slices in pipeline order.
pub fn analyze(
    embeddings: &[Vec<f32>],
    confidences: &[f64],
    cluster_threshold: f64,
    dedup_threshold: f64,
) -> SimilarityAnalysis {
    let matrix = SimilarityMatrix::build(embeddings);
    let clusters = assign_clusters(&matrix, cluster_threshold);
    let flags = mark_duplicates(&matrix, &clusters, confidences, dedup_threshold);
    let summary = summarize(&clusters, &flags);
    SimilarityAnalysis {
        clusters,
        flags,
        summary,
    }
}
