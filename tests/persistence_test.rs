//! Persistence tests: saved indexes reload with identical search behavior

use std::fs;

use ivf_flat::persistence::{from_bytes, load_file, save_file, to_bytes};
use ivf_flat::{DistanceMetric, IndexParams, IvfError, IvfFlatIndex, Resources, SearchParams};
use ndarray::Array2;
use tempfile::TempDir;

fn build(metric: DistanceMetric) -> (Resources, IvfFlatIndex, Array2<f32>) {
    let res = Resources::new().unwrap();
    let data = Array2::from_shape_fn((400, 12), |(i, j)| ((i * 7 + j * 3) % 41) as f32 - 20.0);
    let index = IvfFlatIndex::build(&res, &IndexParams::new(16, metric), data.view()).unwrap();
    (res, index, data)
}

#[test]
fn test_save_load_preserves_search_results() {
    let dir = TempDir::new().unwrap();

    for metric in DistanceMetric::ALL {
        let (res, index, data) = build(metric);
        let path = dir.path().join(format!("{}.ivf", metric));
        save_file(&index, &path).unwrap();

        let loaded = load_file(&path).unwrap();
        assert_eq!(loaded.describe(), index.describe());
        assert_eq!(loaded.centroids(), index.centroids());
        assert_eq!(loaded.list_sizes(), index.list_sizes());

        let queries = data.slice(ndarray::s![..25, ..]);
        let params = SearchParams::new(4);
        let before = index.search(&res, &params, queries, 7).unwrap();
        let after = loaded.search(&res, &params, queries, 7).unwrap();
        assert_eq!(before, after, "metric {}", metric);
    }
}

#[test]
fn test_extend_after_reload() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("index.ivf");
    let (res, mut index, data) = build(DistanceMetric::SqEuclidean);
    save_file(&index, &path).unwrap();

    let mut loaded = load_file(&path).unwrap();
    let extra = data.slice(ndarray::s![..10, ..]);
    index.extend(&res, extra, None).unwrap();
    loaded.extend(&res, extra, None).unwrap();
    assert_eq!(loaded, index);

    // Overwriting the same path replaces the old content
    save_file(&loaded, &path).unwrap();
    assert_eq!(load_file(&path).unwrap().len(), 410);
}

#[test]
fn test_corrupted_file_is_rejected() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("index.ivf");
    let (_, index, _) = build(DistanceMetric::Cosine);
    save_file(&index, &path).unwrap();

    let mut bytes = fs::read(&path).unwrap();
    let mid = bytes.len() / 2;
    bytes[mid] ^= 0x55;
    fs::write(&path, &bytes).unwrap();

    assert!(matches!(load_file(&path), Err(IvfError::CorruptData(_))));
}

#[test]
fn test_truncated_and_foreign_bytes_are_rejected() {
    let (_, index, _) = build(DistanceMetric::Euclidean);
    let bytes = to_bytes(&index).unwrap();

    assert!(matches!(
        from_bytes(&bytes[..bytes.len() / 3]),
        Err(IvfError::CorruptData(_))
    ));

    let mut padded = bytes.clone();
    padded.push(0);
    assert!(matches!(from_bytes(&padded), Err(IvfError::CorruptData(_))));

    assert!(matches!(
        from_bytes(b"not an index at all, just some text"),
        Err(IvfError::CorruptData(_))
    ));
}
