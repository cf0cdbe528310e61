//! Pairwise cosine similarity matrix.

/// Cosine similarity between two vectors, clamped to `[-1, 1]`.
///
/// Zero-norm vectors contribute similarity 0 so degenerate embeddings never
/// divide by zero.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    debug_assert_eq!(a.len(), b.len());

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += f64::from(*x) * f64::from(*y);
        norm_a += f64::from(*x) * f64::from(*x);
        norm_b += f64::from(*y) * f64::from(*y);
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    (dot / (norm_a.sqrt() * norm_b.sqrt())).clamp(-1.0, 1.0)
}

/// Symmetric `N×N` cosine similarity matrix.
///
/// Only the upper triangle is computed; the diagonal is fixed at 1.0 and
/// lookups mirror `(i, j)` / `(j, i)`.
#[derive(Debug, Clone)]
pub struct SimilarityMatrix {
    n: usize,
    /// Upper triangle (i < j), row-major.
    values: Vec<f64>,
}

impl SimilarityMatrix {
    /// Build the matrix from a slice of equal-dimension embeddings.
    pub fn build(embeddings: &[Vec<f32>]) -> Self {
        let n = embeddings.len();
        let mut values = Vec::with_capacity(n.saturating_sub(1) * n / 2);
        for i in 0..n {
            for j in (i + 1)..n {
                values.push(cosine_similarity(&embeddings[i], &embeddings[j]));
            }
        }
        Self { n, values }
    }

    /// Build a matrix directly from packed upper-triangle values
    /// (row-major, `i < j`). Panics if the value count does not match `n`.
    pub fn from_upper_triangle(n: usize, values: Vec<f64>) -> Self {
        assert_eq!(
            values.len(),
            n.saturating_sub(1) * n / 2,
            "upper triangle size mismatch"
        );
        Self { n, values }
    }

    /// Number of ideas covered.
    pub fn len(&self) -> usize {
        self.n
    }

    pub fn is_empty(&self) -> bool {
        self.n == 0
    }

    /// Similarity of ideas `i` and `j`; `get(i, i)` is 1.0.
    pub fn get(&self, i: usize, j: usize) -> f64 {
        assert!(i < self.n && j < self.n, "index out of bounds");
        if i == j {
            return 1.0;
        }
        let (i, j) = if i < j { (i, j) } else { (j, i) };
        // Offset of row i in the packed upper triangle, then column j.
        let row_start = i * self.n - i * (i + 1) / 2;
        self.values[row_start + (j - i - 1)]
    }
}
