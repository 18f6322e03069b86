use rnlt_core::TensorError;
use thiserror::Error;

/// Errors raised while configuring, building or running a network.
#[derive(Debug, Error)]
pub enum NnError {
    #[error(transparent)]
    Tensor(#[from] TensorError),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Unknown preset: {0}")]
    UnknownPreset(String),

    #[error("Config parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type NnResult<T> = Result<T, NnError>;
