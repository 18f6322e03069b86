pub mod error;
pub mod dataset;
pub mod cifar;
pub mod transforms;
pub mod dataloader;
pub mod config;

pub use error::{DatasetError, DatasetResult};
pub use dataset::Dataset;
pub use cifar::Cifar10;
pub use transforms::Normalize;
pub use dataloader::DataLoader;
pub use config::Cifar10Config;
