//! Benchmarks for IVF-Flat search

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use ivf_flat::{DistanceMetric, IndexParams, IvfFlatIndex, Resources, SearchParams};
use ndarray::Array2;
use ndarray_rand::rand::rngs::StdRng;
use ndarray_rand::rand::SeedableRng;
use ndarray_rand::rand_distr::Uniform;
use ndarray_rand::RandomExt;

fn random_vectors(n: usize, dim: usize, seed: u64) -> Array2<f32> {
    let mut rng = StdRng::seed_from_u64(seed);
    Array2::random_using((n, dim), Uniform::new(0.0f32, 1.0), &mut rng)
}

fn benchmark_search_n_probes(c: &mut Criterion) {
    let mut group = c.benchmark_group("search_n_probes");
    group.sample_size(20);

    let res = Resources::new().unwrap();
    let data = random_vectors(20_000, 128, 1);
    let queries = random_vectors(100, 128, 2);
    let index = IvfFlatIndex::build(
        &res,
        &IndexParams::new(128, DistanceMetric::SqEuclidean),
        data.view(),
    )
    .unwrap();

    group.throughput(Throughput::Elements(queries.nrows() as u64));
    for n_probes in [1, 4, 16, 64, 128] {
        let params = SearchParams::new(n_probes);
        group.bench_with_input(BenchmarkId::from_parameter(n_probes), &n_probes, |b, _| {
            b.iter(|| {
                index
                    .search(&res, &params, black_box(queries.view()), black_box(10))
                    .unwrap()
            });
        });
    }

    group.finish();
}

fn benchmark_search_metrics(c: &mut Criterion) {
    let mut group = c.benchmark_group("search_metric");
    group.sample_size(20);

    let res = Resources::new().unwrap();
    let data = random_vectors(10_000, 64, 3);
    let queries = random_vectors(100, 64, 4);
    let params = SearchParams::new(8);

    for metric in DistanceMetric::ALL {
        let index =
            IvfFlatIndex::build(&res, &IndexParams::new(64, metric), data.view()).unwrap();
        group.bench_with_input(BenchmarkId::from_parameter(metric), &metric, |b, _| {
            b.iter(|| {
                index
                    .search(&res, &params, black_box(queries.view()), black_box(10))
                    .unwrap()
            });
        });
    }

    group.finish();
}

criterion_group!(benches, benchmark_search_n_probes, benchmark_search_metrics);
criterion_main!(benches);
