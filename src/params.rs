//! Build, search and execution configuration.
//!
//! All parameter sets are plain serde structs with sensible defaults so they can
//! be constructed in code, through the `with_*` builders, or loaded from JSON.

use std::fs;
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::distance::DistanceMetric;
use crate::error::{IvfError, Result};

/// Parameters controlling how an index is trained and populated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexParams {
    /// Number of inverted lists (k-means clusters).
    pub n_lists: usize,
    /// Distance metric used for training, assignment and search.
    pub metric: DistanceMetric,
    /// Fraction of the dataset sampled to train k-means, in (0, 1].
    pub kmeans_trainset_fraction: f64,
    /// Number of Lloyd iterations.
    pub kmeans_n_iters: usize,
    /// Whether `build` inserts the dataset after training.
    pub add_data_on_build: bool,
    /// Seed for trainset sampling and centroid initialization.
    pub seed: u64,
}

impl Default for IndexParams {
    fn default() -> Self {
        Self {
            n_lists: 1024,
            metric: DistanceMetric::SqEuclidean,
            kmeans_trainset_fraction: 0.5,
            kmeans_n_iters: 20,
            add_data_on_build: true,
            seed: 0,
        }
    }
}

impl IndexParams {
    pub fn new(n_lists: usize, metric: DistanceMetric) -> Self {
        Self {
            n_lists,
            metric,
            ..Self::default()
        }
    }

    pub fn with_n_lists(mut self, n_lists: usize) -> Self {
        self.n_lists = n_lists;
        self
    }

    pub fn with_metric(mut self, metric: DistanceMetric) -> Self {
        self.metric = metric;
        self
    }

    pub fn with_trainset_fraction(mut self, fraction: f64) -> Self {
        self.kmeans_trainset_fraction = fraction;
        self
    }

    pub fn with_n_iters(mut self, n_iters: usize) -> Self {
        self.kmeans_n_iters = n_iters;
        self
    }

    pub fn with_add_data_on_build(mut self, add: bool) -> Self {
        self.add_data_on_build = add;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Check every field against its allowed range.
    pub fn validate(&self) -> Result<()> {
        if self.n_lists == 0 {
            return Err(IvfError::invalid("n_lists must be positive"));
        }
        let fraction = self.kmeans_trainset_fraction;
        if !(fraction > 0.0 && fraction <= 1.0) {
            return Err(IvfError::invalid(format!(
                "kmeans_trainset_fraction must be in (0, 1], got {}",
                fraction
            )));
        }
        if self.kmeans_n_iters == 0 {
            return Err(IvfError::invalid("kmeans_n_iters must be positive"));
        }
        Ok(())
    }

    /// Load parameters from a JSON file. Missing fields take their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let params: Self = read_json(path)?;
        params.validate()?;
        Ok(params)
    }
}

/// Parameters controlling a search call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchParams {
    /// Number of closest lists scanned per query. Values above `n_lists` are clamped.
    pub n_probes: usize,
}

impl Default for SearchParams {
    fn default() -> Self {
        Self { n_probes: 20 }
    }
}

impl SearchParams {
    pub fn new(n_probes: usize) -> Self {
        Self { n_probes }
    }

    pub fn validate(&self) -> Result<()> {
        if self.n_probes == 0 {
            return Err(IvfError::invalid("n_probes must be positive"));
        }
        Ok(())
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let params: Self = read_json(path)?;
        params.validate()?;
        Ok(params)
    }
}

/// Configuration of the execution context shared by build, extend and search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourcesConfig {
    /// Worker threads; 0 lets rayon pick one per core.
    pub num_threads: usize,
    /// Rows assigned per internal chunk when inserting into the lists.
    pub insert_batch_size: usize,
}

impl Default for ResourcesConfig {
    fn default() -> Self {
        Self {
            num_threads: 0,
            insert_batch_size: 65_536,
        }
    }
}

impl ResourcesConfig {
    pub fn with_num_threads(mut self, num_threads: usize) -> Self {
        self.num_threads = num_threads;
        self
    }

    pub fn with_insert_batch_size(mut self, batch_size: usize) -> Self {
        self.insert_batch_size = batch_size;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.insert_batch_size == 0 {
            return Err(IvfError::invalid("insert_batch_size must be positive"));
        }
        Ok(())
    }
}

fn read_json<T: DeserializeOwned>(path: impl AsRef<Path>) -> Result<T> {
    let bytes = fs::read(path)?;
    serde_json::from_slice(&bytes).map_err(|e| IvfError::SerializationError(e.to_string()))
}
