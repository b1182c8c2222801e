//! Serialization utilities: bincode payloads for index snapshots.

use crate::distance::DistanceMetric;
use crate::error::{IvfError, Result};
use crate::index::IvfFlatIndex;
use crate::inverted_lists::{InvertedList, InvertedLists};
use crate::params::IndexParams;
use ndarray::Array2;
use serde::{Deserialize, Serialize};

/// Serializable representation of one inverted list.
#[derive(Debug, Serialize, Deserialize)]
pub struct SerializedList {
    pub ids: Vec<u64>,
    pub data: Vec<f32>,
}

/// Serializable representation of the full index state.
#[derive(Debug, Serialize, Deserialize)]
pub struct IndexSnapshot {
    pub params: IndexParams,
    pub metric: DistanceMetric,
    pub dim: usize,
    pub n_lists: usize,
    /// Centroids, row-major `n_lists × dim`.
    pub centroids: Vec<f32>,
    pub lists: Vec<SerializedList>,
}

impl IndexSnapshot {
    /// Capture the searchable state of an index.
    pub fn capture(index: &IvfFlatIndex) -> Self {
        Self {
            params: index.params().clone(),
            metric: index.metric(),
            dim: index.dim(),
            n_lists: index.n_lists(),
            centroids: index.centroids().iter().copied().collect(),
            lists: index
                .lists()
                .iter()
                .map(|l| SerializedList {
                    ids: l.ids().to_vec(),
                    data: l.data().to_vec(),
                })
                .collect(),
        }
    }

    /// Rebuild an index, checking that the declared shape matches the content.
    pub fn restore(self) -> Result<IvfFlatIndex> {
        if self.dim == 0 || self.n_lists == 0 {
            return Err(IvfError::corrupt(format!(
                "declared dim {} and n_lists {} must be positive",
                self.dim, self.n_lists
            )));
        }
        let expected = self
            .n_lists
            .checked_mul(self.dim)
            .ok_or_else(|| IvfError::corrupt("declared shape overflows"))?;
        if self.centroids.len() != expected {
            return Err(IvfError::corrupt(format!(
                "expected {} centroid components for {} lists of dim {}, found {}",
                expected,
                self.n_lists,
                self.dim,
                self.centroids.len()
            )));
        }

        let centroids = Array2::from_shape_vec((self.n_lists, self.dim), self.centroids)
            .map_err(|e| IvfError::corrupt(e.to_string()))?;
        let lists = self
            .lists
            .into_iter()
            .map(|l| InvertedList::from_parts(l.ids, l.data))
            .collect();
        let lists = InvertedLists::from_parts(self.metric, centroids, lists)?;
        Ok(IvfFlatIndex::from_parts(self.params, lists))
    }
}

/// Encode data to bincode bytes.
pub fn to_bincode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    bincode::serialize(value).map_err(|e| IvfError::SerializationError(e.to_string()))
}

/// Decode data from bincode bytes. Undecodable input is reported as corrupt.
pub fn from_bincode<'a, T: Deserialize<'a>>(bytes: &'a [u8]) -> Result<T> {
    bincode::deserialize(bytes).map_err(|e| IvfError::corrupt(e.to_string()))
}
