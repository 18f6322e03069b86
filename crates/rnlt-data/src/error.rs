use std::path::PathBuf;

use rnlt_core::TensorError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{path}: {len} bytes is not a whole number of {record}-byte records")]
    TruncatedRecord {
        path: PathBuf,
        len: usize,
        record: usize,
    },

    #[error("Index {index} out of bounds for dataset of {len} samples")]
    IndexOutOfBounds { index: usize, len: usize },

    #[error(transparent)]
    Tensor(#[from] TensorError),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

pub type DatasetResult<T> = Result<T, DatasetError>;
