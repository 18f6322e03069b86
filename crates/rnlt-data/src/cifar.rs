//! Reader for the CIFAR-10 binary distribution.
//!
//! Each shard is a flat run of 3073-byte records: one label byte followed by
//! a 3×32×32 image, channel-major then row-major. There is no header.

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use rayon::prelude::*;
use rnlt_core::Tensor;
use tracing::{info, warn};

use crate::config::Cifar10Config;
use crate::dataset::Dataset;
use crate::error::{DatasetError, DatasetResult};
use crate::transforms::Normalize;

pub const IMAGE_CHANNELS: usize = 3;
pub const IMAGE_HEIGHT: usize = 32;
pub const IMAGE_WIDTH: usize = 32;
pub const IMAGE_BYTES: usize = IMAGE_CHANNELS * IMAGE_HEIGHT * IMAGE_WIDTH;
pub const RECORD_BYTES: usize = 1 + IMAGE_BYTES;
pub const RECORDS_PER_SHARD: usize = 10_000;

pub const TRAIN_SHARDS: [&str; 5] = [
    "data_batch_1.bin",
    "data_batch_2.bin",
    "data_batch_3.bin",
    "data_batch_4.bin",
    "data_batch_5.bin",
];
pub const TEST_SHARDS: [&str; 1] = ["test_batch.bin"];

/// Decoded records of one shard.
#[derive(Debug, Default)]
struct Shard {
    pixels: Vec<f32>,
    labels: Vec<i64>,
}

/// CIFAR-10 images `[N, 3, 32, 32]` scaled to `[0, 1]` and their labels.
#[derive(Debug, Clone)]
pub struct Cifar10 {
    images: Tensor<f32>,
    labels: Vec<i64>,
    transform: Option<Normalize>,
}

impl Cifar10 {
    /// Read the training shards (`train == true`) or the test shard from
    /// `root`.
    ///
    /// Shards that cannot be opened or read are skipped with a warning; if
    /// none can be read the dataset is empty. A shard whose size is not a
    /// multiple of the record size is an error.
    pub fn load<P: AsRef<Path>>(root: P, train: bool) -> DatasetResult<Self> {
        let root = root.as_ref();
        let names: &[&str] = if train { &TRAIN_SHARDS } else { &TEST_SHARDS };

        let shards = names
            .par_iter()
            .map(|name| read_shard(&root.join(name)))
            .collect::<Vec<_>>();

        let total: usize = shards
            .iter()
            .filter_map(|s| s.as_ref().ok().and_then(Option::as_ref))
            .map(|s| s.labels.len())
            .sum();

        // The first shard's buffers become the dataset's; later shards are
        // moved in and dropped one at a time.
        let mut pixels = Vec::new();
        let mut labels = Vec::new();
        let mut shards_read = 0;
        for shard in shards {
            let Some(mut shard) = shard? else {
                continue;
            };
            if shards_read == 0 {
                pixels = shard.pixels;
                labels = shard.labels;
                pixels.reserve_exact((total - labels.len()) * IMAGE_BYTES);
                labels.reserve_exact(total - labels.len());
            } else {
                pixels.append(&mut shard.pixels);
                labels.append(&mut shard.labels);
            }
            shards_read += 1;
        }

        if shards_read == 0 {
            warn!(root = %root.display(), train, "no readable CIFAR-10 shards, dataset is empty");
        }
        info!(
            root = %root.display(),
            train,
            records = labels.len(),
            shards = shards_read,
            "loaded CIFAR-10"
        );
        Self::from_parts(pixels, labels)
    }

    pub fn from_config(config: &Cifar10Config) -> DatasetResult<Self> {
        let dataset = Self::load(&config.root, config.train)?;
        Ok(if config.normalize {
            dataset.with_transform(Normalize::cifar10())
        } else {
            dataset
        })
    }

    /// Build from already decoded pixels (`N * 3072` values) and labels.
    pub fn from_parts(pixels: Vec<f32>, labels: Vec<i64>) -> DatasetResult<Self> {
        let images = Tensor::new(
            pixels,
            vec![labels.len(), IMAGE_CHANNELS, IMAGE_HEIGHT, IMAGE_WIDTH],
        )?;
        Ok(Cifar10 {
            images,
            labels,
            transform: None,
        })
    }

    /// Apply `transform` to every image returned by [`Dataset::get`]. The
    /// stored images are not modified.
    pub fn with_transform(mut self, transform: Normalize) -> Self {
        self.transform = Some(transform);
        self
    }

    pub fn images(&self) -> &Tensor<f32> {
        &self.images
    }

    pub fn labels(&self) -> &[i64] {
        &self.labels
    }

    pub fn transform(&self) -> Option<&Normalize> {
        self.transform.as_ref()
    }
}

impl Dataset for Cifar10 {
    fn len(&self) -> usize {
        self.labels.len()
    }

    fn get(&self, idx: usize) -> DatasetResult<(Tensor<f32>, i64)> {
        let label = *self.labels.get(idx).ok_or(DatasetError::IndexOutOfBounds {
            index: idx,
            len: self.labels.len(),
        })?;
        let mut image = self.images.select(idx)?;
        if let Some(transform) = &self.transform {
            transform.apply_mut(&mut image)?;
        }
        Ok((image, label))
    }
}

/// `Ok(None)` when the file cannot be opened or read.
fn read_shard(path: &Path) -> DatasetResult<Option<Shard>> {
    let bytes = match read_bytes(path) {
        Ok(bytes) => bytes,
        Err(err) => {
            warn!(path = %path.display(), error = %err, "skipping unreadable CIFAR-10 shard");
            return Ok(None);
        }
    };
    decode_shard(path, &bytes).map(Some)
}

fn read_bytes(path: &Path) -> DatasetResult<Vec<u8>> {
    let io_err = |source: std::io::Error| DatasetError::Io {
        path: path.to_path_buf(),
        source,
    };
    let mut file = File::open(path).map_err(io_err)?;
    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes).map_err(io_err)?;
    Ok(bytes)
}

fn decode_shard(path: &Path, bytes: &[u8]) -> DatasetResult<Shard> {
    if bytes.len() % RECORD_BYTES != 0 {
        return Err(DatasetError::TruncatedRecord {
            path: PathBuf::from(path),
            len: bytes.len(),
            record: RECORD_BYTES,
        });
    }
    let records = bytes.len() / RECORD_BYTES;
    if records != RECORDS_PER_SHARD {
        warn!(
            path = %path.display(),
            records,
            expected = RECORDS_PER_SHARD,
            "unexpected CIFAR-10 record count"
        );
    }

    let mut shard = Shard {
        pixels: Vec::with_capacity(records * IMAGE_BYTES),
        labels: Vec::with_capacity(records),
    };
    for record in bytes.chunks_exact(RECORD_BYTES) {
        shard.labels.push(i64::from(record[0]));
        shard
            .pixels
            .extend(record[1..].iter().map(|&b| f32::from(b) / 255.0));
    }
    Ok(shard)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(label: u8, fill: u8) -> Vec<u8> {
        let mut r = vec![label];
        r.extend(std::iter::repeat(fill).take(IMAGE_BYTES));
        r
    }

    #[test]
    fn test_decode_records() {
        let mut bytes = record(3, 255);
        bytes.extend(record(9, 0));
        let shard = decode_shard(Path::new("mem"), &bytes).unwrap();
        assert_eq!(shard.labels, vec![3, 9]);
        assert_eq!(shard.pixels.len(), 2 * IMAGE_BYTES);
        assert!(shard.pixels[..IMAGE_BYTES].iter().all(|&v| v == 1.0));
        assert!(shard.pixels[IMAGE_BYTES..].iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_pixel_layout_is_channel_major() {
        let mut bytes = vec![0u8; RECORD_BYTES];
        // channel 1, row 2, column 5
        bytes[1 + 1024 + 2 * 32 + 5] = 51;
        let shard = decode_shard(Path::new("mem"), &bytes).unwrap();
        let ds = Cifar10::from_parts(shard.pixels, shard.labels).unwrap();
        let (image, _) = ds.get(0).unwrap();
        assert_eq!(image.get(&[1, 2, 5]).unwrap(), 0.2);
        assert_eq!(image.sum_all(), f64::from(0.2f32));
    }

    #[test]
    fn test_truncated_shard() {
        let mut bytes = record(1, 7);
        bytes.push(0);
        assert!(matches!(
            decode_shard(Path::new("x.bin"), &bytes),
            Err(DatasetError::TruncatedRecord { len: 3074, .. })
        ));
    }

    #[test]
    fn test_empty_parts() {
        let ds = Cifar10::from_parts(Vec::new(), Vec::new()).unwrap();
        assert!(ds.is_empty());
        assert_eq!(ds.images().shape_vec(), vec![0, 3, 32, 32]);
        assert!(matches!(
            ds.get(0),
            Err(DatasetError::IndexOutOfBounds { index: 0, len: 0 })
        ));
    }
}
