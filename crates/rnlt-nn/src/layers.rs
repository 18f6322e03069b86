use std::sync::{Mutex, PoisonError};

use rand::Rng;
use rnlt_core::{Tensor, TensorError, TensorResult};

use crate::module::{Module, ParamRole, Parameter, ParameterMut};

/// Fully connected layer: `y = xW + b`, `W: [in_features, out_features]`.
pub struct Linear {
    pub weight: Tensor<f32>,
    pub bias: Tensor<f32>,
    pub in_features: usize,
    pub out_features: usize,
}

impl Linear {
    /// Weight and bias drawn from `U(-1/√in, 1/√in)`.
    pub fn new<R: Rng + ?Sized>(
        in_features: usize,
        out_features: usize,
        rng: &mut R,
    ) -> TensorResult<Self> {
        let bound = 1.0 / (in_features.max(1) as f64).sqrt();
        Ok(Linear {
            weight: Tensor::uniform(vec![in_features, out_features], -bound, bound, rng)?,
            bias: Tensor::uniform(vec![out_features], -bound, bound, rng)?,
            in_features,
            out_features,
        })
    }
}

impl Module for Linear {
    fn forward(&self, input: &Tensor<f32>) -> TensorResult<Tensor<f32>> {
        if input.ndim() != 2 || input.dims()[1] != self.in_features {
            let batch = input.dims().first().copied().unwrap_or(0);
            return Err(TensorError::ShapeMismatch {
                expected: vec![batch, self.in_features],
                got: input.shape_vec(),
            });
        }
        let mut out = input.matmul(&self.weight)?;
        let bias = self.bias.data();
        for row in out.data_mut().chunks_exact_mut(self.out_features) {
            for (v, &b) in row.iter_mut().zip(bias) {
                *v += b;
            }
        }
        Ok(out)
    }

    fn parameters(&self) -> Vec<Parameter<'_>> {
        vec![
            Parameter::new("weight", ParamRole::LinearWeight, &self.weight),
            Parameter::new("bias", ParamRole::LinearBias, &self.bias),
        ]
    }

    fn parameters_mut(&mut self) -> Vec<ParameterMut<'_>> {
        vec![
            ParameterMut::new("weight", ParamRole::LinearWeight, &mut self.weight),
            ParameterMut::new("bias", ParamRole::LinearBias, &mut self.bias),
        ]
    }
}

#[derive(Debug, Clone)]
struct RunningStats {
    mean: Vec<f32>,
    var: Vec<f32>,
}

/// Batch normalization over the channel axis of `[N, C, H, W]` input.
///
/// `y = (x - μ) / √(σ² + ε) · γ + β`. In training mode `μ` and `σ²` are the
/// batch statistics over `(N, H, W)` and the running estimates are updated
/// with `momentum`; in inference mode the running estimates are used.
pub struct BatchNorm2d {
    pub num_features: usize,
    pub eps: f32,
    pub momentum: f32,
    /// γ, one per channel.
    pub weight: Tensor<f32>,
    /// β, one per channel.
    pub bias: Tensor<f32>,
    running: Mutex<RunningStats>,
    training: bool,
}

impl BatchNorm2d {
    pub fn new(num_features: usize) -> Self {
        BatchNorm2d {
            num_features,
            eps: 1e-5,
            momentum: 0.1,
            weight: Tensor::ones(vec![num_features]),
            bias: Tensor::zeros(vec![num_features]),
            running: Mutex::new(RunningStats {
                mean: vec![0.0; num_features],
                var: vec![1.0; num_features],
            }),
            training: true,
        }
    }

    pub fn is_training(&self) -> bool {
        self.training
    }

    pub fn running_mean(&self) -> Vec<f32> {
        self.running.lock().unwrap_or_else(PoisonError::into_inner).mean.clone()
    }

    pub fn running_var(&self) -> Vec<f32> {
        self.running.lock().unwrap_or_else(PoisonError::into_inner).var.clone()
    }

    /// Normalize `x` in place.
    pub fn normalize_mut(&self, x: &mut Tensor<f32>) -> TensorResult<()> {
        let (n, c, h, w) = x.shape().nchw()?;
        if c != self.num_features {
            return Err(TensorError::ShapeMismatch {
                expected: vec![n, self.num_features, h, w],
                got: x.shape_vec(),
            });
        }
        let plane = h * w;
        let count = n * plane;
        if count == 0 {
            return Ok(());
        }

        let (mean, var) = if self.training {
            let (mean, var) = channel_statistics(x.data(), n, c, plane);
            let mut running = self.running.lock().unwrap_or_else(PoisonError::into_inner);
            let unbias = if count > 1 { count as f64 / (count - 1) as f64 } else { 1.0 };
            let m = f64::from(self.momentum);
            for ch in 0..c {
                running.mean[ch] = ((1.0 - m) * f64::from(running.mean[ch]) + m * mean[ch]) as f32;
                running.var[ch] =
                    ((1.0 - m) * f64::from(running.var[ch]) + m * var[ch] * unbias) as f32;
            }
            (mean, var)
        } else {
            let running = self.running.lock().unwrap_or_else(PoisonError::into_inner);
            (
                running.mean.iter().map(|&v| f64::from(v)).collect(),
                running.var.iter().map(|&v| f64::from(v)).collect(),
            )
        };

        let gamma = self.weight.data();
        let beta = self.bias.data();
        let eps = f64::from(self.eps);
        let scale: Vec<f32> = (0..c)
            .map(|ch| (f64::from(gamma[ch]) / (var[ch] + eps).sqrt()) as f32)
            .collect();

        for (i, plane_data) in x.data_mut().chunks_exact_mut(plane).enumerate() {
            let ch = i % c;
            let (m, s, b) = (mean[ch] as f32, scale[ch], beta[ch]);
            for v in plane_data.iter_mut() {
                *v = (*v - m) * s + b;
            }
        }
        Ok(())
    }
}

/// Per-channel mean and population variance of NCHW data.
fn channel_statistics(data: &[f32], n: usize, c: usize, plane: usize) -> (Vec<f64>, Vec<f64>) {
    let count = (n * plane) as f64;
    let mut sum = vec![0.0f64; c];
    let mut sq = vec![0.0f64; c];
    for (i, plane_data) in data.chunks_exact(plane).enumerate() {
        let ch = i % c;
        for &v in plane_data {
            let v = f64::from(v);
            sum[ch] += v;
            sq[ch] += v * v;
        }
    }
    let mean: Vec<f64> = sum.iter().map(|s| s / count).collect();
    let var = sq
        .iter()
        .zip(mean.iter())
        .map(|(s, m)| (s / count - m * m).max(0.0))
        .collect();
    (mean, var)
}

impl Module for BatchNorm2d {
    fn forward(&self, input: &Tensor<f32>) -> TensorResult<Tensor<f32>> {
        let mut out = input.clone();
        self.normalize_mut(&mut out)?;
        Ok(out)
    }

    fn parameters(&self) -> Vec<Parameter<'_>> {
        vec![
            Parameter::new("weight", ParamRole::NormScale, &self.weight),
            Parameter::new("bias", ParamRole::NormShift, &self.bias),
        ]
    }

    fn parameters_mut(&mut self) -> Vec<ParameterMut<'_>> {
        vec![
            ParameterMut::new("weight", ParamRole::NormScale, &mut self.weight),
            ParameterMut::new("bias", ParamRole::NormShift, &mut self.bias),
        ]
    }

    fn set_training(&mut self, training: bool) {
        self.training = training;
    }
}
