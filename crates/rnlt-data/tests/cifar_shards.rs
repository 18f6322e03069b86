mod common;

use std::fs;

use approx::assert_abs_diff_eq;
use common::write_shard;
use rnlt_data::cifar::{RECORDS_PER_SHARD, RECORD_BYTES};
use rnlt_data::{Cifar10, Cifar10Config, DataLoader, Dataset, DatasetError, Normalize};
use tempfile::tempdir;

#[test]
fn full_test_shard() {
    let dir = tempdir().unwrap();
    write_shard(dir.path(), "test_batch.bin", RECORDS_PER_SHARD, 0);

    let ds = Cifar10::load(dir.path(), false).unwrap();
    assert_eq!(ds.len(), 10_000);
    assert_eq!(ds.images().shape_vec(), vec![10_000, 3, 32, 32]);
    assert_eq!(ds.labels().len(), 10_000);
    assert!(ds.images().data().iter().all(|&v| (0.0..=1.0).contains(&v)));
    assert_eq!(ds.images().max_all().unwrap(), 1.0);
    assert_eq!(ds.images().min_all().unwrap(), 0.0);

    let (image, label) = ds.get(257).unwrap();
    assert_eq!(label, 7);
    assert_eq!(image.shape_vec(), vec![3, 32, 32]);
    assert_abs_diff_eq!(image.data()[0], 1.0 / 255.0);
}

#[test]
fn training_shards_concatenate_in_order() {
    let dir = tempdir().unwrap();
    // written out of order on purpose
    write_shard(dir.path(), "data_batch_2.bin", 3, 5);
    write_shard(dir.path(), "data_batch_1.bin", 2, 0);

    let ds = Cifar10::load(dir.path(), true).unwrap();
    assert_eq!(ds.len(), 5);
    assert_eq!(ds.labels(), &[0, 1, 5, 6, 7]);
    assert_eq!(ds.get(2).unwrap().0.data()[0], 0.0);
    assert_abs_diff_eq!(ds.get(4).unwrap().0.data()[0], 2.0 / 255.0);

    // the test split only reads test_batch.bin
    assert!(Cifar10::load(dir.path(), false).unwrap().is_empty());
}

#[test]
fn missing_directory_gives_empty_dataset() {
    let dir = tempdir().unwrap();
    let ds = Cifar10::load(dir.path().join("nowhere"), true).unwrap();
    assert!(ds.is_empty());
    assert_eq!(ds.images().shape_vec(), vec![0, 3, 32, 32]);
}

#[test]
fn unreadable_shard_is_skipped() {
    let dir = tempdir().unwrap();
    // opens fine, fails on read
    fs::create_dir(dir.path().join("data_batch_1.bin")).unwrap();
    write_shard(dir.path(), "data_batch_2.bin", 3, 4);

    let ds = Cifar10::load(dir.path(), true).unwrap();
    assert_eq!(ds.len(), 3);
    assert_eq!(ds.labels(), &[4, 5, 6]);
    assert_eq!(ds.images().shape_vec(), vec![3, 3, 32, 32]);

    fs::create_dir(dir.path().join("test_batch.bin")).unwrap();
    assert!(Cifar10::load(dir.path(), false).unwrap().is_empty());
}

#[test]
fn partial_record_is_rejected() {
    let dir = tempdir().unwrap();
    write_shard(dir.path(), "data_batch_1.bin", 2, 0);
    let path = dir.path().join("data_batch_3.bin");
    fs::write(&path, vec![0u8; RECORD_BYTES + 100]).unwrap();

    match Cifar10::load(dir.path(), true) {
        Err(DatasetError::TruncatedRecord { path: p, len, .. }) => {
            assert_eq!(p, path);
            assert_eq!(len, RECORD_BYTES + 100);
        }
        other => panic!("expected TruncatedRecord, got {:?}", other.map(|d| d.len())),
    }
}

#[test]
fn config_attaches_normalization() {
    let dir = tempdir().unwrap();
    write_shard(dir.path(), "test_batch.bin", 4, 0);
    let config = Cifar10Config {
        normalize: true,
        ..Cifar10Config::new(dir.path(), false)
    };
    let ds = Cifar10::from_config(&config).unwrap();
    assert_eq!(ds.transform(), Some(&Normalize::cifar10()));

    let (image, _) = ds.get(0).unwrap();
    assert_abs_diff_eq!(image.data()[0], -0.4914 / 0.2023, epsilon = 1e-5);
    // stored pixels stay in [0, 1]
    assert_eq!(ds.images().data()[0], 0.0);
}

#[test]
fn loader_batches_a_shard() {
    let dir = tempdir().unwrap();
    write_shard(dir.path(), "test_batch.bin", 10, 0);
    let ds = Cifar10::load(dir.path(), false).unwrap();
    let batches: Vec<_> = DataLoader::new(&ds, 4)
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(batches.len(), 3);
    assert_eq!(batches[0].0.shape_vec(), vec![4, 3, 32, 32]);
    assert_eq!(batches[2].1, vec![8, 9]);
}
