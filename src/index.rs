//! IVF-Flat index: trained centroids plus uncompressed inverted lists.

use std::fmt;

use ndarray::{Array2, ArrayView2};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use crate::distance::DistanceMetric;
use crate::error::{IvfError, Result};
use crate::inverted_lists::{InvertedList, InvertedLists};
use crate::kmeans::{sample_trainset, KMeans};
use crate::params::IndexParams;
use crate::resources::Resources;

/// Id reported for result slots that have no neighbor. Reserved: it cannot be
/// stored in an index.
pub const SENTINEL_ID: u64 = u64::MAX;

/// Read-only summary of an index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexSummary {
    pub dim: usize,
    pub n_lists: usize,
    pub size: usize,
    pub metric: DistanceMetric,
}

impl fmt::Display for IndexSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "IVF-Flat index: dim={}, n_lists={}, size={}, metric={}",
            self.dim, self.n_lists, self.size, self.metric
        )
    }
}

/// An inverted-file index with flat (uncompressed) list storage.
///
/// Centroids are fixed once trained. `extend` only appends to lists, so
/// cluster balance can drift as data is added; rebuild to rebalance.
///
/// The index takes no internal locks: searches borrow it immutably and
/// `extend` borrows it mutably, which serializes writers against readers.
#[derive(Debug, Clone, PartialEq)]
pub struct IvfFlatIndex {
    params: IndexParams,
    lists: InvertedLists,
}

impl IvfFlatIndex {
    /// Train centroids on a sample of `dataset` and, if
    /// `params.add_data_on_build` is set, insert every row with its position
    /// as id.
    pub fn build(
        resources: &Resources,
        params: &IndexParams,
        dataset: ArrayView2<f32>,
    ) -> Result<Self> {
        params.validate()?;
        let (n_rows, dim) = dataset.dim();
        if dim == 0 {
            return Err(IvfError::invalid("dimensionality must be positive"));
        }
        if n_rows == 0 && params.add_data_on_build {
            return Err(IvfError::invalid(
                "cannot add an empty dataset on build",
            ));
        }

        tracing::info!(
            n_rows,
            dim,
            n_lists = params.n_lists,
            metric = %params.metric,
            "building IVF-Flat index"
        );

        let mut rng = StdRng::seed_from_u64(params.seed);
        let trainset = sample_trainset(dataset, params.kmeans_trainset_fraction, &mut rng);
        let centroids = KMeans::new(params.n_lists, params.kmeans_n_iters, params.metric)
            .fit(resources, trainset.view(), &mut rng)?;

        let mut index = Self {
            params: params.clone(),
            lists: InvertedLists::new(params.metric, centroids),
        };

        if params.add_data_on_build {
            let ids: Vec<u64> = (0..n_rows as u64).collect();
            index.lists.insert_batch(resources, dataset, &ids)?;
        }

        tracing::info!(size = index.len(), "index built");
        Ok(index)
    }

    /// Assemble an index from already-trained parts.
    pub(crate) fn from_parts(params: IndexParams, lists: InvertedLists) -> Self {
        Self { params, lists }
    }

    /// Append vectors to the lists of their closest centroids.
    ///
    /// With `ids == None` the new rows get consecutive ids starting at the
    /// current size. Duplicate ids are stored as separate entries.
    pub fn extend(
        &mut self,
        resources: &Resources,
        vectors: ArrayView2<f32>,
        ids: Option<&[u64]>,
    ) -> Result<()> {
        let n_rows = vectors.nrows();
        if let Some(ids) = ids {
            if ids.len() != n_rows {
                return Err(IvfError::invalid(format!(
                    "got {} vectors but {} ids",
                    n_rows,
                    ids.len()
                )));
            }
            if ids.contains(&SENTINEL_ID) {
                return Err(IvfError::invalid(format!(
                    "id {} is reserved for empty result slots",
                    SENTINEL_ID
                )));
            }
        }
        if n_rows == 0 {
            return Ok(());
        }
        if vectors.ncols() != self.dim() {
            return Err(IvfError::DimensionMismatch {
                expected: self.dim(),
                actual: vectors.ncols(),
            });
        }

        let generated: Vec<u64>;
        let ids = match ids {
            Some(ids) => ids,
            None => {
                let start = self.len() as u64;
                generated = (start..start + n_rows as u64).collect();
                &generated
            }
        };

        self.lists.insert_batch(resources, vectors, ids)?;
        tracing::debug!(added = n_rows, size = self.len(), "extended index");
        Ok(())
    }

    pub fn describe(&self) -> IndexSummary {
        IndexSummary {
            dim: self.dim(),
            n_lists: self.n_lists(),
            size: self.len(),
            metric: self.metric(),
        }
    }

    pub fn params(&self) -> &IndexParams {
        &self.params
    }

    pub fn metric(&self) -> DistanceMetric {
        self.lists.metric()
    }

    pub fn dim(&self) -> usize {
        self.lists.dim()
    }

    pub fn n_lists(&self) -> usize {
        self.lists.n_lists()
    }

    /// Number of stored entries, duplicates included.
    pub fn len(&self) -> usize {
        self.lists.total_len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn centroids(&self) -> &Array2<f32> {
        self.lists.centroids()
    }

    pub fn list_sizes(&self) -> Vec<usize> {
        self.lists.list_sizes()
    }

    pub fn lists(&self) -> &[InvertedList] {
        self.lists.lists()
    }

    pub(crate) fn inverted_lists(&self) -> &InvertedLists {
        &self.lists
    }
}
