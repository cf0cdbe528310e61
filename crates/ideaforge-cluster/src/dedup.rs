//! Intra-cluster deduplication.
//!
//! Clustering (looser threshold) groups ideas by theme; deduplication
//! (tighter threshold) collapses ideas that are effectively the same idea.
//! A cluster may therefore hold multiple genuinely distinct survivors.

use std::collections::HashMap;

use ideaforge_core::defaults::SIMILARITY_DECIMALS;
use ideaforge_core::models::ClusterSummary;

use crate::matrix::SimilarityMatrix;

/// Dedup outcome for one idea, indexed parallel to the input.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct DuplicateFlag {
    pub is_duplicate: bool,
    /// Index of the keeper this idea duplicates, when flagged.
    pub duplicate_of_idx: Option<usize>,
    /// Triggering similarity, rounded to 4 fractional digits, when flagged.
    pub similarity: Option<f64>,
}

/// Round a similarity to the persisted precision so the in-memory value and
/// the stored value never drift apart.
pub fn round_similarity(value: f64) -> f64 {
    let scale = 10f64.powi(SIMILARITY_DECIMALS as i32);
    (value * scale).round() / scale
}

/// Flag duplicates within each cluster of size ≥ 2.
///
/// Pairs `(i, j)` are scanned in index order. A pair qualifies when neither
/// side is already flagged and its similarity meets `dedup_threshold`; the
/// lower-confidence side is flagged as a duplicate of the other, with ties
/// keeping the lower index. An idea already serving as a keeper is never
/// flagged, so no duplicate ever points at another duplicate. The outcome
/// is deterministic in scan order but is not a global minimum-loss
/// selection.
pub fn mark_duplicates(
    matrix: &SimilarityMatrix,
    clusters: &[usize],
    confidences: &[f64],
    dedup_threshold: f64,
) -> Vec<DuplicateFlag> {
    assert_eq!(matrix.len(), clusters.len());
    assert_eq!(matrix.len(), confidences.len());

    let n = matrix.len();
    let mut flags = vec![DuplicateFlag::default(); n];
    let mut is_keeper = vec![false; n];

    let mut members: HashMap<usize, Vec<usize>> = HashMap::new();
    for (idx, cluster) in clusters.iter().enumerate() {
        members.entry(*cluster).or_default().push(idx);
    }

    let mut cluster_ids: Vec<usize> = members.keys().copied().collect();
    cluster_ids.sort_unstable();

    for cluster in cluster_ids {
        let ideas = &members[&cluster];
        if ideas.len() < 2 {
            continue;
        }

        for a in 0..ideas.len() {
            for b in (a + 1)..ideas.len() {
                let (i, j) = (ideas[a], ideas[b]);
                if flags[i].is_duplicate || flags[j].is_duplicate {
                    continue;
                }
                let similarity = matrix.get(i, j);
                if similarity < dedup_threshold {
                    continue;
                }

                // Lower confidence loses; ties keep the lower index.
                let (keeper, loser) = if confidences[i] < confidences[j] {
                    (j, i)
                } else {
                    (i, j)
                };
                if is_keeper[loser] {
                    continue;
                }

                flags[loser] = DuplicateFlag {
                    is_duplicate: true,
                    duplicate_of_idx: Some(keeper),
                    similarity: Some(round_similarity(similarity)),
                };
                is_keeper[keeper] = true;
            }
        }
    }

    flags
}

/// Aggregate counts for a clustered, deduplicated idea set.
pub fn summarize(clusters: &[usize], flags: &[DuplicateFlag]) -> ClusterSummary {
    let duplicates = flags.iter().filter(|f| f.is_duplicate).count();
    ClusterSummary {
        total_ideas: clusters.len(),
        unique_ideas: clusters.len() - duplicates,
        duplicates,
        clusters: crate::cluster::cluster_count(clusters),
    }
}
