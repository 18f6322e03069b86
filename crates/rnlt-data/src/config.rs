use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{DatasetError, DatasetResult};

/// Where and how to load CIFAR-10.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Cifar10Config {
    /// Directory holding the `.bin` shards.
    pub root: PathBuf,
    /// Training shards if set, the test shard otherwise.
    pub train: bool,
    /// Attach the CIFAR-10 channel normalization.
    pub normalize: bool,
}

impl Default for Cifar10Config {
    fn default() -> Self {
        Cifar10Config {
            root: PathBuf::from("data/cifar-10-batches-bin"),
            train: true,
            normalize: false,
        }
    }
}

impl Cifar10Config {
    pub fn new<P: Into<PathBuf>>(root: P, train: bool) -> Self {
        Cifar10Config {
            root: root.into(),
            train,
            ..Self::default()
        }
    }

    pub fn from_json_str(json: &str) -> DatasetResult<Self> {
        serde_json::from_str(json).map_err(|e| DatasetError::Config(e.to_string()))
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> DatasetResult<Self> {
        let path = path.as_ref();
        let json = fs::read_to_string(path).map_err(|source| DatasetError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&json)
    }
}
