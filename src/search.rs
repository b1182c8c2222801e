//! Approximate top-k search over an IVF-Flat index.
//!
//! Search runs in two phases. The coarse phase computes the full
//! queries × centroids distance matrix and keeps the `n_probes` closest lists
//! per query. The fine phase scans those lists for each query in parallel and
//! keeps the best `k` candidates in a bounded heap.

use ndarray::{Array2, ArrayView1, ArrayView2};
use rayon::prelude::*;

use crate::error::{IvfError, Result};
use crate::index::{IvfFlatIndex, SENTINEL_ID};
use crate::inverted_lists::InvertedLists;
use crate::neighbor_queue::{Neighbor, TopK};
use crate::params::SearchParams;
use crate::resources::Resources;

/// Distances and ids of the nearest neighbors, one row per query.
///
/// Rows are sorted by ascending distance with ties broken by ascending id.
/// Slots without a neighbor hold `f32::INFINITY` and [`SENTINEL_ID`].
#[derive(Debug, Clone, PartialEq)]
pub struct SearchResults {
    pub distances: Array2<f32>,
    pub ids: Array2<u64>,
}

impl SearchResults {
    /// An `n_queries × k` table with every slot padded.
    ///
    /// Shapes that cannot be addressed are rejected even with zero queries;
    /// a failed allocation is reported instead of aborting.
    fn padded(n_queries: usize, k: usize) -> Result<Self> {
        let max_len = isize::MAX as usize / std::mem::size_of::<u64>();
        n_queries
            .max(1)
            .checked_mul(k)
            .filter(|&len| len <= max_len)
            .ok_or_else(|| {
                IvfError::invalid(format!(
                    "k = {} is too large for {} queries",
                    k, n_queries
                ))
            })?;

        let len = n_queries * k;
        let distances = filled(len, f32::INFINITY)?;
        let ids = filled(len, SENTINEL_ID)?;
        Ok(Self {
            distances: Array2::from_shape_vec((n_queries, k), distances)
                .map_err(|e| IvfError::invalid(e.to_string()))?,
            ids: Array2::from_shape_vec((n_queries, k), ids)
                .map_err(|e| IvfError::invalid(e.to_string()))?,
        })
    }

    pub fn n_queries(&self) -> usize {
        self.ids.nrows()
    }

    pub fn k(&self) -> usize {
        self.ids.ncols()
    }

    /// Distances and ids for query `i`.
    pub fn row(&self, i: usize) -> (ArrayView1<f32>, ArrayView1<u64>) {
        (self.distances.row(i), self.ids.row(i))
    }

    /// Ids for query `i` with the padding removed.
    pub fn found_ids(&self, i: usize) -> Vec<u64> {
        self.ids
            .row(i)
            .iter()
            .copied()
            .filter(|&id| id != SENTINEL_ID)
            .collect()
    }
}

/// Find the `k` nearest stored vectors for every query row.
pub fn search(
    resources: &Resources,
    params: &SearchParams,
    index: &IvfFlatIndex,
    queries: ArrayView2<f32>,
    k: usize,
) -> Result<SearchResults> {
    search_with_filter(resources, params, index, queries, k, |_| true)
}

/// Like [`search`], but entries whose id is rejected by `filter` are skipped
/// during the list scan.
pub fn search_with_filter<F>(
    resources: &Resources,
    params: &SearchParams,
    index: &IvfFlatIndex,
    queries: ArrayView2<f32>,
    k: usize,
    filter: F,
) -> Result<SearchResults>
where
    F: Fn(u64) -> bool + Sync,
{
    params.validate()?;
    if k == 0 {
        return Err(IvfError::invalid("k must be positive"));
    }
    let dim = index.dim();
    if queries.ncols() != dim {
        return Err(IvfError::DimensionMismatch {
            expected: dim,
            actual: queries.ncols(),
        });
    }

    let n_queries = queries.nrows();
    let n_probes = params.n_probes.min(index.n_lists());
    let mut results = SearchResults::padded(n_queries, k)?;
    if n_queries == 0 {
        return Ok(results);
    }

    tracing::debug!(n_queries, k, n_probes, "searching");

    let lists = index.inverted_lists();
    let queries = queries.as_standard_layout();
    let query_rows = queries
        .as_slice()
        .ok_or_else(|| IvfError::invalid("non-contiguous queries"))?;

    let neighbors = resources.install(|| -> Result<Vec<Vec<Neighbor>>> {
        let coarse = lists.metric().pairwise(queries.view(), lists.centroids().view())?;
        let coarse_rows = coarse
            .as_slice()
            .ok_or_else(|| IvfError::invalid("non-contiguous coarse distances"))?;

        Ok(query_rows
            .par_chunks_exact(dim)
            .zip(coarse_rows.par_chunks_exact(lists.n_lists()))
            .map(|(query, centroid_dists)| {
                let probes = closest_lists(centroid_dists, n_probes);
                scan_lists(lists, query, &probes, k, &filter)
            })
            .collect())
    })?;

    for (i, row) in neighbors.into_iter().enumerate() {
        for (j, n) in row.into_iter().enumerate() {
            results.distances[[i, j]] = n.distance;
            results.ids[[i, j]] = n.id;
        }
    }
    Ok(results)
}

impl IvfFlatIndex {
    /// Method form of [`search`].
    pub fn search(
        &self,
        resources: &Resources,
        params: &SearchParams,
        queries: ArrayView2<f32>,
        k: usize,
    ) -> Result<SearchResults> {
        search(resources, params, self, queries, k)
    }
}

fn filled<T: Clone>(len: usize, value: T) -> Result<Vec<T>> {
    let mut buf = Vec::new();
    buf.try_reserve_exact(len)
        .map_err(|e| IvfError::ResourceError(e.to_string()))?;
    buf.resize(len, value);
    Ok(buf)
}

/// Indices of the `n_probes` smallest distances, ties going to the lower index.
fn closest_lists(centroid_dists: &[f32], n_probes: usize) -> Vec<usize> {
    let mut top = TopK::new(n_probes);
    for (i, &d) in centroid_dists.iter().enumerate() {
        top.push(Neighbor::new(i as u64, d));
    }
    top.into_sorted_vec()
        .into_iter()
        .map(|n| n.id as usize)
        .collect()
}

fn scan_lists<F>(
    lists: &InvertedLists,
    query: &[f32],
    probes: &[usize],
    k: usize,
    filter: &F,
) -> Vec<Neighbor>
where
    F: Fn(u64) -> bool,
{
    let metric = lists.metric();
    let candidates: usize = probes
        .iter()
        .filter_map(|&p| lists.list(p))
        .map(|l| l.len())
        .sum();
    let mut top = TopK::with_capacity(k, candidates);
    for list in probes.iter().filter_map(|&p| lists.list(p)) {
        for (id, vector) in list.iter(query.len()) {
            if filter(id) {
                top.push(Neighbor::new(id, metric.compute(query, vector)));
            }
        }
    }
    top.into_sorted_vec()
}
