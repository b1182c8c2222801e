//! Recall@k against a ground-truth neighbor table.

use std::collections::HashSet;

use ndarray::ArrayView2;

use crate::error::{IvfError, Result};
use crate::index::SENTINEL_ID;

/// Mean fraction of the true top-k found in each predicted row, where k is the
/// number of predicted columns. Padding ids never count as hits.
pub fn recall_at_k(predicted: ArrayView2<u64>, ground_truth: ArrayView2<u64>) -> Result<f64> {
    let (n_queries, k) = predicted.dim();
    if ground_truth.nrows() != n_queries {
        return Err(IvfError::invalid(format!(
            "{} predicted rows but {} ground-truth rows",
            n_queries,
            ground_truth.nrows()
        )));
    }
    if ground_truth.ncols() < k {
        return Err(IvfError::invalid(format!(
            "ground truth has {} columns, need at least {}",
            ground_truth.ncols(),
            k
        )));
    }
    if n_queries == 0 || k == 0 {
        return Ok(1.0);
    }

    let hits: usize = predicted
        .outer_iter()
        .zip(ground_truth.outer_iter())
        .map(|(pred, truth)| {
            let truth: HashSet<u64> = truth.iter().take(k).copied().collect();
            pred.iter()
                .filter(|&&id| id != SENTINEL_ID && truth.contains(&id))
                .count()
        })
        .sum();

    Ok(hits as f64 / (n_queries * k) as f64)
}
