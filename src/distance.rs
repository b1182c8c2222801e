//! Distance metrics for vector similarity

use std::fmt;
use std::str::FromStr;

use ndarray::{Array2, ArrayView2};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{IvfError, Result};

/// Distance metrics for measuring vector similarity.
///
/// Every metric follows the "smaller is closer" convention so that search can
/// rank candidates with a single ascending order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum DistanceMetric {
    /// Sum of squared differences (no square root)
    #[default]
    #[serde(rename = "sqeuclidean")]
    SqEuclidean,
    /// Euclidean (L2) distance
    #[serde(rename = "euclidean")]
    Euclidean,
    /// Inner product (negated for minimum distance)
    #[serde(rename = "inner_product")]
    InnerProduct,
    /// Cosine similarity (converted to distance: 1 - similarity)
    #[serde(rename = "cosine")]
    Cosine,
}

impl DistanceMetric {
    pub const ALL: [DistanceMetric; 4] = [
        DistanceMetric::SqEuclidean,
        DistanceMetric::Euclidean,
        DistanceMetric::InnerProduct,
        DistanceMetric::Cosine,
    ];

    /// The canonical string name of this metric.
    pub fn as_str(&self) -> &'static str {
        match self {
            DistanceMetric::SqEuclidean => "sqeuclidean",
            DistanceMetric::Euclidean => "euclidean",
            DistanceMetric::InnerProduct => "inner_product",
            DistanceMetric::Cosine => "cosine",
        }
    }

    /// Compute the distance between two vectors using this metric
    pub fn distance(&self, a: &[f32], b: &[f32]) -> Result<f32> {
        if a.len() != b.len() {
            return Err(IvfError::DimensionMismatch {
                expected: a.len(),
                actual: b.len(),
            });
        }
        Ok(self.compute(a, b))
    }

    /// Distance without the dimension check. Callers validate dimensions once
    /// at the API boundary.
    #[inline]
    pub fn compute(&self, a: &[f32], b: &[f32]) -> f32 {
        debug_assert_eq!(a.len(), b.len());
        match self {
            DistanceMetric::SqEuclidean => squared_euclidean(a, b),
            DistanceMetric::Euclidean => squared_euclidean(a, b).sqrt(),
            DistanceMetric::InnerProduct => -dot_product(a, b),
            DistanceMetric::Cosine => cosine_distance(a, b),
        }
    }

    /// Distances from `query` to every row of the row-major `candidates` buffer.
    pub fn distances_to<'a>(
        &'a self,
        query: &'a [f32],
        candidates: &'a [f32],
    ) -> impl Iterator<Item = f32> + 'a {
        debug_assert!(!query.is_empty());
        candidates
            .chunks_exact(query.len())
            .map(move |c| self.compute(query, c))
    }

    /// Index and distance of the closest row in `candidates`.
    ///
    /// Exact ties resolve to the lower row index.
    pub fn nearest(&self, query: &[f32], candidates: &[f32]) -> Option<(usize, f32)> {
        self.distances_to(query, candidates)
            .enumerate()
            .min_by(|a, b| a.1.total_cmp(&b.1).then_with(|| a.0.cmp(&b.0)))
    }

    /// Full `queries × candidates` distance matrix, computed in parallel over
    /// query rows on the current rayon pool.
    pub fn pairwise(
        &self,
        queries: ArrayView2<f32>,
        candidates: ArrayView2<f32>,
    ) -> Result<Array2<f32>> {
        let dim = candidates.ncols();
        if queries.ncols() != dim {
            return Err(IvfError::DimensionMismatch {
                expected: dim,
                actual: queries.ncols(),
            });
        }
        let (n_queries, n_candidates) = (queries.nrows(), candidates.nrows());
        let mut out = vec![0.0f32; n_queries * n_candidates];
        if dim == 0 || n_queries == 0 || n_candidates == 0 {
            return Array2::from_shape_vec((n_queries, n_candidates), out)
                .map_err(|e| IvfError::invalid(e.to_string()));
        }

        let queries = queries.as_standard_layout();
        let candidates = candidates.as_standard_layout();
        let (queries, candidates) = match (queries.as_slice(), candidates.as_slice()) {
            (Some(q), Some(c)) => (q, c),
            _ => return Err(IvfError::invalid("non-contiguous input")),
        };

        out.par_chunks_mut(n_candidates)
            .zip(queries.par_chunks_exact(dim))
            .for_each(|(row, query)| {
                for (slot, d) in row.iter_mut().zip(self.distances_to(query, candidates)) {
                    *slot = d;
                }
            });

        Array2::from_shape_vec((n_queries, n_candidates), out)
            .map_err(|e| IvfError::invalid(e.to_string()))
    }
}

impl fmt::Display for DistanceMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DistanceMetric {
    type Err = IvfError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sqeuclidean" => Ok(DistanceMetric::SqEuclidean),
            "euclidean" => Ok(DistanceMetric::Euclidean),
            "inner_product" => Ok(DistanceMetric::InnerProduct),
            "cosine" => Ok(DistanceMetric::Cosine),
            other => Err(IvfError::invalid(format!("unknown metric: {}", other))),
        }
    }
}

/// Sum of squared component differences
#[inline]
pub fn squared_euclidean(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| {
            let d = x - y;
            d * d
        })
        .sum()
}

/// Compute dot product of two vectors
#[inline]
pub fn dot_product(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// L2 norm of a vector
#[inline]
pub fn norm(a: &[f32]) -> f32 {
    dot_product(a, a).sqrt()
}

/// Cosine distance (1 - cosine similarity). A zero vector is treated as
/// orthogonal to everything, giving distance 1.0.
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    let norm_a = norm(a);
    let norm_b = norm(b);
    if norm_a == 0.0 || norm_b == 0.0 {
        return 1.0;
    }

    // Clamp to [-1, 1] to handle floating point errors
    let similarity = (dot_product(a, b) / (norm_a * norm_b)).clamp(-1.0, 1.0);
    1.0 - similarity
}
