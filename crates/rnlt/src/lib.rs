//! # rnlt
//!
//! Residual networks for 32×32 images and a reader for the CIFAR-10 binary
//! format, on a small CPU tensor engine.
//!
//! ## Modules
//!
//! - **core**: `Tensor<f32>`, shapes, errors and the GEMM kernel
//! - **nn**: layers, residual blocks, stages, the ResNet builder, presets
//!   (ResNet18 to ResNet152) and the weight initializer
//! - **data**: CIFAR-10 decoding, normalization and batching
//!
//! ```no_run
//! use rnlt::data::{Cifar10, DataLoader};
//! use rnlt::nn::{resnet18, Module};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let net = resnet18()?;
//! let test = Cifar10::load("data/cifar-10-batches-bin", false)?;
//! for batch in DataLoader::new(&test, 64)? {
//!     let (images, _labels) = batch?;
//!     let scores = net.forward(&images)?;
//!     let _predicted = scores.argmax_rows()?;
//! }
//! # Ok(())
//! # }
//! ```

/// Tensor engine.
pub use rnlt_core as core;

/// Network layers, blocks and presets.
pub use rnlt_nn as nn;

/// Dataset loading.
pub use rnlt_data as data;
