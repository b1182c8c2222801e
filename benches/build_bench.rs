//! Benchmarks for index training and insertion

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use ivf_flat::kmeans::KMeans;
use ivf_flat::{DistanceMetric, IndexParams, IvfFlatIndex, Resources};
use ndarray::Array2;
use ndarray_rand::rand::rngs::StdRng;
use ndarray_rand::rand::SeedableRng;
use ndarray_rand::rand_distr::Uniform;
use ndarray_rand::RandomExt;

fn random_vectors(n: usize, dim: usize, seed: u64) -> Array2<f32> {
    let mut rng = StdRng::seed_from_u64(seed);
    Array2::random_using((n, dim), Uniform::new(0.0f32, 1.0), &mut rng)
}

fn benchmark_kmeans(c: &mut Criterion) {
    let mut group = c.benchmark_group("kmeans");
    group.sample_size(10);

    let res = Resources::new().unwrap();
    let trainset = random_vectors(5_000, 64, 1);

    for n_clusters in [16, 64, 256] {
        let kmeans = KMeans::new(n_clusters, 10, DistanceMetric::SqEuclidean);
        group.bench_with_input(
            BenchmarkId::from_parameter(n_clusters),
            &n_clusters,
            |b, _| {
                b.iter(|| {
                    let mut rng = StdRng::seed_from_u64(0);
                    kmeans
                        .fit(&res, black_box(trainset.view()), &mut rng)
                        .unwrap()
                });
            },
        );
    }

    group.finish();
}

fn benchmark_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("build");
    group.sample_size(10);

    let res = Resources::new().unwrap();
    for size in [1_000, 10_000] {
        let data = random_vectors(size, 64, 2);
        let params = IndexParams::new(32, DistanceMetric::SqEuclidean).with_n_iters(10);

        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter(|| IvfFlatIndex::build(&res, &params, black_box(data.view())).unwrap());
        });
    }

    group.finish();
}

fn benchmark_extend(c: &mut Criterion) {
    let mut group = c.benchmark_group("extend");
    group.sample_size(10);

    let res = Resources::new().unwrap();
    let train = random_vectors(2_000, 64, 3);
    let params = IndexParams::new(64, DistanceMetric::SqEuclidean).with_add_data_on_build(false);
    let empty = IvfFlatIndex::build(&res, &params, train.view()).unwrap();
    let batch = random_vectors(20_000, 64, 4);

    group.throughput(Throughput::Elements(batch.nrows() as u64));
    group.bench_function("20000x64", |b| {
        b.iter(|| {
            let mut index = empty.clone();
            index.extend(&res, black_box(batch.view()), None).unwrap();
            index
        });
    });

    group.finish();
}

criterion_group!(benches, benchmark_kmeans, benchmark_build, benchmark_extend);
criterion_main!(benches);
