//! K-Means clustering for IVF partitioning.
//!
//! Lloyd's algorithm with k-means++ initialization. Training runs for a fixed
//! number of iterations and is fully reproducible for a given seed: random
//! choices come from the caller's RNG, assignment is computed in parallel but
//! stored per point, and centroid means are accumulated sequentially.

use ndarray::{Array2, ArrayView2, Axis};
use rand::distributions::{Distribution, WeightedIndex};
use rand::seq::SliceRandom;
use rand::Rng;
use rayon::prelude::*;

use crate::distance::{norm, squared_euclidean, DistanceMetric};
use crate::error::{IvfError, Result};
use crate::resources::Resources;

/// Draw `round(N * fraction)` rows uniformly without replacement.
///
/// Sampled rows keep their relative dataset order. A fraction of 1 returns the
/// whole dataset.
pub fn sample_trainset<R: Rng + ?Sized>(
    dataset: ArrayView2<f32>,
    fraction: f64,
    rng: &mut R,
) -> Array2<f32> {
    let n = dataset.nrows();
    let n_train = (((n as f64) * fraction).round() as usize).min(n);
    if n_train == n {
        return dataset.to_owned();
    }

    let mut indices = rand::seq::index::sample(rng, n, n_train).into_vec();
    indices.sort_unstable();
    dataset.select(Axis(0), &indices)
}

/// K-Means trainer producing exactly `n_clusters` centroids.
#[derive(Debug, Clone)]
pub struct KMeans {
    n_clusters: usize,
    n_iters: usize,
    metric: DistanceMetric,
}

impl KMeans {
    pub fn new(n_clusters: usize, n_iters: usize, metric: DistanceMetric) -> Self {
        Self {
            n_clusters,
            n_iters,
            metric,
        }
    }

    /// Train centroids on `trainset`, returned as an `n_clusters × dim` array.
    pub fn fit<R: Rng + ?Sized>(
        &self,
        resources: &Resources,
        trainset: ArrayView2<f32>,
        rng: &mut R,
    ) -> Result<Array2<f32>> {
        let (n, dim) = trainset.dim();
        if self.n_clusters == 0 {
            return Err(IvfError::invalid("n_clusters must be positive"));
        }
        if dim == 0 {
            return Err(IvfError::invalid("dimensionality must be positive"));
        }
        if n < self.n_clusters {
            return Err(IvfError::InsufficientData {
                required: self.n_clusters,
                available: n,
            });
        }

        let trainset = trainset.as_standard_layout();
        let data = trainset
            .as_slice()
            .ok_or_else(|| IvfError::invalid("non-contiguous trainset"))?;

        tracing::info!(
            n_clusters = self.n_clusters,
            n_train = n,
            dim,
            metric = %self.metric,
            "training k-means"
        );

        let mut centroids = self.init_plus_plus(resources, data, dim, rng);

        for iteration in 0..self.n_iters {
            let assignments = resources.install(|| self.assign(data, &centroids, dim));
            let mut counts = self.update_centroids(data, dim, &assignments, &mut centroids);
            let reseeded = self.reseed_empty(data, dim, &assignments, &mut counts, &mut centroids);

            let inertia: f64 = assignments.iter().map(|&(_, d)| d as f64).sum();
            tracing::debug!(iteration, inertia, reseeded, "k-means iteration");
        }

        tracing::info!(n_clusters = self.n_clusters, "k-means finished");
        Array2::from_shape_vec((self.n_clusters, dim), centroids)
            .map_err(|e| IvfError::invalid(e.to_string()))
    }

    /// k-means++ seeding on squared Euclidean distance.
    ///
    /// The distance from each point to its nearest seed is updated
    /// incrementally, so seeding costs one pass over the data per centroid.
    fn init_plus_plus<R: Rng + ?Sized>(
        &self,
        resources: &Resources,
        data: &[f32],
        dim: usize,
        rng: &mut R,
    ) -> Vec<f32> {
        let n = data.len() / dim;
        let mut centroids = Vec::with_capacity(self.n_clusters * dim);
        let mut chosen = vec![false; n];

        let first = rng.gen_range(0..n);
        chosen[first] = true;
        centroids.extend_from_slice(row(data, dim, first));

        let first_row = row(data, dim, first);
        let mut min_dist: Vec<f32> = resources.install(|| {
            data.par_chunks_exact(dim)
                .map(|r| squared_euclidean(r, first_row))
                .collect()
        });

        for _ in 1..self.n_clusters {
            let weighted = WeightedIndex::new(min_dist.iter().map(|&d| d as f64));
            let next = match weighted {
                Ok(dist) => dist.sample(rng),
                // Every remaining point coincides with a seed
                Err(_) => {
                    let unused: Vec<usize> = (0..n).filter(|&i| !chosen[i]).collect();
                    unused.choose(rng).copied().unwrap_or(0)
                }
            };
            chosen[next] = true;

            let next_row = row(data, dim, next);
            centroids.extend_from_slice(next_row);
            resources.install(|| {
                min_dist
                    .par_iter_mut()
                    .zip(data.par_chunks_exact(dim))
                    .for_each(|(d, r)| *d = d.min(squared_euclidean(r, next_row)));
            });
        }

        centroids
    }

    /// Nearest centroid and its distance for every training point.
    fn assign(&self, data: &[f32], centroids: &[f32], dim: usize) -> Vec<(usize, f32)> {
        data.par_chunks_exact(dim)
            .map(|r| {
                self.metric
                    .nearest(r, centroids)
                    .unwrap_or((0, f32::INFINITY))
            })
            .collect()
    }

    /// Move each non-empty centroid to the mean of its members. Returns the
    /// member count per cluster; empty clusters keep their old position.
    fn update_centroids(
        &self,
        data: &[f32],
        dim: usize,
        assignments: &[(usize, f32)],
        centroids: &mut [f32],
    ) -> Vec<usize> {
        let mut sums = vec![0.0f64; self.n_clusters * dim];
        let mut counts = vec![0usize; self.n_clusters];

        for (r, &(cluster, _)) in data.chunks_exact(dim).zip(assignments) {
            counts[cluster] += 1;
            let sum = &mut sums[cluster * dim..(cluster + 1) * dim];
            for (s, &x) in sum.iter_mut().zip(r) {
                *s += x as f64;
            }
        }

        for (cluster, &count) in counts.iter().enumerate() {
            if count == 0 {
                continue;
            }
            let centroid = &mut centroids[cluster * dim..(cluster + 1) * dim];
            let sum = &sums[cluster * dim..(cluster + 1) * dim];
            for (c, &s) in centroid.iter_mut().zip(sum) {
                *c = (s / count as f64) as f32;
            }

            // Spherical k-means: cosine centroids live on the unit sphere
            if self.metric == DistanceMetric::Cosine {
                let len = norm(centroid);
                if len > 0.0 {
                    centroid.iter_mut().for_each(|c| *c /= len);
                }
            }
        }

        counts
    }

    /// Reseed each empty cluster at the training point farthest from its own
    /// centroid, taking donors only from clusters with more than one member.
    fn reseed_empty(
        &self,
        data: &[f32],
        dim: usize,
        assignments: &[(usize, f32)],
        counts: &mut [usize],
        centroids: &mut [f32],
    ) -> usize {
        let empty: Vec<usize> = counts
            .iter()
            .enumerate()
            .filter(|(_, &c)| c == 0)
            .map(|(i, _)| i)
            .collect();
        if empty.is_empty() {
            return 0;
        }

        let mut order: Vec<usize> = (0..assignments.len()).collect();
        order.sort_by(|&a, &b| {
            assignments[b]
                .1
                .total_cmp(&assignments[a].1)
                .then_with(|| a.cmp(&b))
        });
        let mut donors = order.into_iter();

        let mut reseeded = 0;
        for cluster in empty {
            let donor = donors.by_ref().find(|&i| counts[assignments[i].0] > 1);
            let Some(point) = donor else {
                tracing::warn!(cluster, "no donor point left to reseed empty cluster");
                break;
            };
            counts[assignments[point].0] -= 1;
            counts[cluster] = 1;
            let centroid = &mut centroids[cluster * dim..(cluster + 1) * dim];
            centroid.copy_from_slice(row(data, dim, point));
            if self.metric == DistanceMetric::Cosine {
                let len = norm(centroid);
                if len > 0.0 {
                    centroid.iter_mut().for_each(|c| *c /= len);
                }
            }
            tracing::debug!(cluster, point, "reseeded empty cluster");
            reseeded += 1;
        }
        reseeded
    }
}

#[inline]
fn row(data: &[f32], dim: usize, i: usize) -> &[f32] {
    &data[i * dim..(i + 1) * dim]
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn two_blobs() -> Array2<f32> {
        array![
            [0.0, 0.0],
            [0.1, 0.0],
            [0.0, 0.1],
            [0.1, 0.1],
            [10.0, 10.0],
            [10.1, 10.0],
            [10.0, 10.1],
            [10.1, 10.1],
        ]
    }

    #[test]
    fn test_kmeans_finds_blob_means() {
        let res = Resources::new().unwrap();
        let data = two_blobs();
        let mut rng = StdRng::seed_from_u64(7);
        let centroids = KMeans::new(2, 10, DistanceMetric::SqEuclidean)
            .fit(&res, data.view(), &mut rng)
            .unwrap();

        assert_eq!(centroids.dim(), (2, 2));
        let mut means: Vec<(f32, f32)> = centroids
            .outer_iter()
            .map(|c| (c[0], c[1]))
            .collect();
        means.sort_by(|a, b| a.0.total_cmp(&b.0));
        assert_relative_eq!(means[0].0, 0.05, epsilon = 1e-5);
        assert_relative_eq!(means[0].1, 0.05, epsilon = 1e-5);
        assert_relative_eq!(means[1].0, 10.05, epsilon = 1e-4);
        assert_relative_eq!(means[1].1, 10.05, epsilon = 1e-4);
    }

    #[test]
    fn test_kmeans_is_reproducible() {
        let res = Resources::new().unwrap();
        let data = two_blobs();
        let km = KMeans::new(3, 5, DistanceMetric::Euclidean);
        let a = km.fit(&res, data.view(), &mut StdRng::seed_from_u64(42)).unwrap();
        let b = km.fit(&res, data.view(), &mut StdRng::seed_from_u64(42)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_insufficient_data() {
        let res = Resources::new().unwrap();
        let data = two_blobs();
        let err = KMeans::new(9, 5, DistanceMetric::SqEuclidean)
            .fit(&res, data.view(), &mut StdRng::seed_from_u64(0))
            .unwrap_err();
        assert!(matches!(
            err,
            IvfError::InsufficientData { required: 9, available: 8 }
        ));
    }

    #[test]
    fn test_every_cluster_ends_non_empty() {
        let res = Resources::new().unwrap();
        let data = two_blobs();
        let km = KMeans::new(8, 10, DistanceMetric::SqEuclidean);
        let centroids = km.fit(&res, data.view(), &mut StdRng::seed_from_u64(3)).unwrap();

        let flat = centroids.as_slice().unwrap();
        let assignments = km.assign(data.as_slice().unwrap(), flat, 2);
        let mut counts = vec![0; 8];
        assignments.iter().for_each(|&(c, _)| counts[c] += 1);
        assert!(counts.iter().all(|&c| c == 1), "counts: {:?}", counts);
    }

    #[test]
    fn test_reseed_takes_farthest_point() {
        let km = KMeans::new(2, 1, DistanceMetric::SqEuclidean);
        let data = [0.0f32, 1.0, 5.0];
        let assignments = vec![(0, 1.0), (0, 0.0), (0, 16.0)];
        let mut counts = vec![3, 0];
        let mut centroids = vec![1.0f32, 1.0];

        let reseeded = km.reseed_empty(&data, 1, &assignments, &mut counts, &mut centroids);
        assert_eq!(reseeded, 1);
        assert_eq!(centroids, vec![1.0, 5.0]);
        assert_eq!(counts, vec![2, 1]);
    }

    #[test]
    fn test_sample_trainset_size_and_order() {
        let data = Array2::from_shape_fn((100, 3), |(i, _)| i as f32);
        let mut rng = StdRng::seed_from_u64(1);

        let sample = sample_trainset(data.view(), 0.25, &mut rng);
        assert_eq!(sample.dim(), (25, 3));
        let firsts: Vec<f32> = sample.column(0).to_vec();
        assert!(firsts.windows(2).all(|w| w[0] < w[1]));

        let full = sample_trainset(data.view(), 1.0, &mut rng);
        assert_eq!(full, data);
    }

    #[test]
    fn test_cosine_centroids_are_unit_length() {
        let res = Resources::new().unwrap();
        let data = array![
            [1.0, 0.0],
            [2.0, 0.1],
            [3.0, 0.0],
            [1.0, 0.1],
            [0.0, 1.0],
            [0.1, 2.0],
            [0.0, 3.0],
            [0.1, 1.0],
        ];
        let centroids = KMeans::new(2, 5, DistanceMetric::Cosine)
            .fit(&res, data.view(), &mut StdRng::seed_from_u64(5))
            .unwrap();
        for c in centroids.outer_iter() {
            assert_relative_eq!(norm(c.as_slice().unwrap()), 1.0, epsilon = 1e-5);
        }
    }
}
