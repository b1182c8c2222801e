//! Inverted lists: per-centroid storage of (id, vector) pairs.
//!
//! The store owns the coarse routing keys (centroids plus metric), so a vector
//! can be assigned and appended without the caller knowing about clustering.

use ndarray::{Array2, ArrayView2, Axis};
use rayon::prelude::*;

use crate::distance::DistanceMetric;
use crate::error::{IvfError, Result};
use crate::resources::Resources;

/// One inverted list. Vectors are stored row-major next to a parallel id column.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InvertedList {
    ids: Vec<u64>,
    data: Vec<f32>,
}

impl InvertedList {
    pub(crate) fn from_parts(ids: Vec<u64>, data: Vec<f32>) -> Self {
        Self { ids, data }
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn ids(&self) -> &[u64] {
        &self.ids
    }

    /// Raw row-major vector storage.
    pub fn data(&self) -> &[f32] {
        &self.data
    }

    /// Iterate over (id, vector) pairs in insertion order.
    pub fn iter(&self, dim: usize) -> impl Iterator<Item = (u64, &[f32])> {
        self.ids.iter().copied().zip(self.data.chunks_exact(dim.max(1)))
    }

    fn push(&mut self, id: u64, vector: &[f32]) {
        self.ids.push(id);
        self.data.extend_from_slice(vector);
    }
}

/// Centroids and the inverted list stored under each of them.
#[derive(Debug, Clone, PartialEq)]
pub struct InvertedLists {
    metric: DistanceMetric,
    centroids: Array2<f32>,
    lists: Vec<InvertedList>,
}

impl InvertedLists {
    /// Create one empty list per centroid row.
    pub fn new(metric: DistanceMetric, centroids: Array2<f32>) -> Self {
        let lists = vec![InvertedList::default(); centroids.nrows()];
        Self {
            metric,
            centroids: centroids.as_standard_layout().into_owned(),
            lists,
        }
    }

    /// Reassemble a store from decoded parts, checking every length.
    pub(crate) fn from_parts(
        metric: DistanceMetric,
        centroids: Array2<f32>,
        lists: Vec<InvertedList>,
    ) -> Result<Self> {
        let (n_lists, dim) = centroids.dim();
        if lists.len() != n_lists {
            return Err(IvfError::corrupt(format!(
                "expected {} lists, found {}",
                n_lists,
                lists.len()
            )));
        }
        for (i, list) in lists.iter().enumerate() {
            if list.data.len() != list.ids.len() * dim {
                return Err(IvfError::corrupt(format!(
                    "list {} holds {} ids but {} components (dim {})",
                    i,
                    list.ids.len(),
                    list.data.len(),
                    dim
                )));
            }
        }
        Ok(Self {
            metric,
            centroids: centroids.as_standard_layout().into_owned(),
            lists,
        })
    }

    pub fn metric(&self) -> DistanceMetric {
        self.metric
    }

    pub fn dim(&self) -> usize {
        self.centroids.ncols()
    }

    pub fn n_lists(&self) -> usize {
        self.lists.len()
    }

    pub fn centroids(&self) -> &Array2<f32> {
        &self.centroids
    }

    pub fn list(&self, i: usize) -> Option<&InvertedList> {
        self.lists.get(i)
    }

    pub fn lists(&self) -> &[InvertedList] {
        &self.lists
    }

    pub fn list_sizes(&self) -> Vec<usize> {
        self.lists.iter().map(InvertedList::len).collect()
    }

    /// Total number of stored entries across all lists.
    pub fn total_len(&self) -> usize {
        self.lists.iter().map(InvertedList::len).sum()
    }

    fn centroid_slice(&self) -> &[f32] {
        // Always standard layout, see constructors
        self.centroids.as_slice().unwrap_or(&[])
    }

    fn check_dim(&self, actual: usize) -> Result<()> {
        if actual != self.dim() {
            return Err(IvfError::DimensionMismatch {
                expected: self.dim(),
                actual,
            });
        }
        Ok(())
    }

    /// Index of the closest centroid to `vector`.
    pub fn assign(&self, vector: &[f32]) -> Result<usize> {
        self.check_dim(vector.len())?;
        self.metric
            .nearest(vector, self.centroid_slice())
            .map(|(i, _)| i)
            .ok_or_else(|| IvfError::invalid("store has no lists"))
    }

    /// Append one vector to the list of its closest centroid. Returns the list index.
    pub fn insert(&mut self, id: u64, vector: &[f32]) -> Result<usize> {
        let list = self.assign(vector)?;
        self.lists[list].push(id, vector);
        Ok(list)
    }

    /// Assign and append many vectors at once.
    ///
    /// Input is processed in chunks of `resources.insert_batch_size()` rows.
    /// Each chunk is assigned in parallel, then appended in input order, so the
    /// content of every list is independent of thread scheduling.
    pub fn insert_batch(
        &mut self,
        resources: &Resources,
        vectors: ArrayView2<f32>,
        ids: &[u64],
    ) -> Result<()> {
        if vectors.nrows() != ids.len() {
            return Err(IvfError::invalid(format!(
                "got {} vectors but {} ids",
                vectors.nrows(),
                ids.len()
            )));
        }
        if vectors.nrows() == 0 {
            return Ok(());
        }
        self.check_dim(vectors.ncols())?;
        if self.lists.is_empty() {
            return Err(IvfError::invalid("store has no lists"));
        }

        let dim = self.dim();
        let batch = resources.insert_batch_size();
        for (chunk, chunk_ids) in vectors
            .axis_chunks_iter(Axis(0), batch)
            .zip(ids.chunks(batch))
        {
            let chunk = chunk.as_standard_layout();
            let rows = chunk
                .as_slice()
                .ok_or_else(|| IvfError::invalid("non-contiguous input"))?;

            let centroids = self.centroid_slice();
            let metric = self.metric;
            let labels: Vec<usize> = resources.install(|| {
                rows.par_chunks_exact(dim)
                    .map(|r| metric.nearest(r, centroids).map(|(i, _)| i).unwrap_or(0))
                    .collect()
            });

            for ((r, &id), list) in rows.chunks_exact(dim).zip(chunk_ids).zip(labels) {
                self.lists[list].push(id, r);
            }
            tracing::trace!(rows = chunk_ids.len(), "inserted chunk");
        }
        Ok(())
    }
}
