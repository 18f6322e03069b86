use rnlt_core::{Tensor, TensorError, TensorResult};
use serde::{Deserialize, Serialize};

use crate::error::{DatasetError, DatasetResult};

/// Per-channel `(x - mean) / std` over the channel axis of `[C, H, W]` or
/// `[N, C, H, W]` tensors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Normalize {
    mean: Vec<f32>,
    std: Vec<f32>,
}

impl Normalize {
    pub fn new(mean: Vec<f32>, std: Vec<f32>) -> DatasetResult<Self> {
        if mean.len() != std.len() || mean.is_empty() {
            return Err(DatasetError::Config(format!(
                "normalize: {} means for {} standard deviations",
                mean.len(),
                std.len()
            )));
        }
        if std.iter().any(|&s| !s.is_finite() || s <= 0.0) {
            return Err(DatasetError::Config(
                "normalize: standard deviations must be positive".into(),
            ));
        }
        Ok(Normalize { mean, std })
    }

    /// CIFAR-10 training-set channel statistics.
    pub fn cifar10() -> Self {
        Normalize {
            mean: vec![0.4914, 0.4822, 0.4465],
            std: vec![0.2023, 0.1994, 0.2010],
        }
    }

    pub fn mean(&self) -> &[f32] {
        &self.mean
    }

    pub fn std(&self) -> &[f32] {
        &self.std
    }

    pub fn apply_mut(&self, x: &mut Tensor<f32>) -> TensorResult<()> {
        let dims = x.dims();
        let channel_axis = match dims.len() {
            3 => 0,
            4 => 1,
            ndim => {
                return Err(TensorError::DimensionMismatch(format!(
                    "normalize expects [C, H, W] or [N, C, H, W], got {} dimensions",
                    ndim
                )))
            }
        };
        let channels = dims[channel_axis];
        if channels != self.mean.len() {
            return Err(TensorError::ShapeMismatch {
                expected: vec![self.mean.len()],
                got: vec![channels],
            });
        }
        let plane = dims[channel_axis + 1] * dims[channel_axis + 2];
        if plane == 0 {
            return Ok(());
        }
        for (i, values) in x.data_mut().chunks_exact_mut(plane).enumerate() {
            let c = i % channels;
            let (m, s) = (self.mean[c], self.std[c]);
            for v in values.iter_mut() {
                *v = (*v - m) / s;
            }
        }
        Ok(())
    }

    pub fn apply(&self, x: &Tensor<f32>) -> TensorResult<Tensor<f32>> {
        let mut out = x.clone();
        self.apply_mut(&mut out)?;
        Ok(out)
    }
}
