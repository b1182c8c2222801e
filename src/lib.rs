//! # IVF-Flat
//!
//! An inverted-file approximate nearest neighbor index with flat (uncompressed)
//! list storage.
//!
//! This library provides:
//! - Distance metrics (squared Euclidean, Euclidean, inner product, cosine)
//! - K-means training of coarse centroids
//! - Inverted lists with batched, parallel insertion
//! - Approximate top-k search with a tunable number of probed lists
//! - A checksummed binary persistence format
//!
//! ## Example
//!
//! ```rust
//! use ivf_flat::{DistanceMetric, IndexParams, IvfFlatIndex, Resources, SearchParams};
//! use ndarray::Array2;
//!
//! let resources = Resources::new().unwrap();
//! let dataset = Array2::from_shape_fn((200, 8), |(i, j)| ((i * 7 + j) % 23) as f32);
//!
//! let params = IndexParams::new(8, DistanceMetric::SqEuclidean);
//! let index = IvfFlatIndex::build(&resources, &params, dataset.view()).unwrap();
//!
//! let queries = dataset.slice(ndarray::s![0..2, ..]);
//! let results = index
//!     .search(&resources, &SearchParams::new(8), queries, 5)
//!     .unwrap();
//! assert_eq!(results.ids.dim(), (2, 5));
//! ```

pub mod distance;
pub mod error;
pub mod index;
pub mod inverted_lists;
pub mod kmeans;
pub mod neighbor_queue;
pub mod params;
pub mod persistence;
pub mod recall;
pub mod resources;
pub mod search;

pub use distance::DistanceMetric;
pub use error::{IvfError, Result};
pub use index::{IndexSummary, IvfFlatIndex, SENTINEL_ID};
pub use params::{IndexParams, ResourcesConfig, SearchParams};
pub use recall::recall_at_k;
pub use resources::Resources;
pub use search::{search, search_with_filter, SearchResults};
