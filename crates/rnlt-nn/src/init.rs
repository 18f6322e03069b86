use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rnlt_core::{Tensor, TensorError, TensorResult};
use tracing::debug;

use crate::module::{Module, ParamRole};

/// What an initializer run touched, counted per parameter tensor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InitReport {
    pub conv_weights: usize,
    pub norm_scales: usize,
    pub norm_shifts: usize,
    /// Linear weights and biases, and convolution biases.
    pub untouched: usize,
}

/// Initialize `module` from a fresh `StdRng` seeded with `seed`.
pub fn initialize<M: Module + ?Sized>(module: &mut M, seed: u64) -> TensorResult<InitReport> {
    let mut rng = StdRng::seed_from_u64(seed);
    initialize_with_rng(module, &mut rng)
}

/// Convolution weights get Xavier-normal, normalization scales 1 and shifts 0.
/// Linear layers keep their own initialization.
pub fn initialize_with_rng<M: Module + ?Sized, R: Rng + ?Sized>(
    module: &mut M,
    rng: &mut R,
) -> TensorResult<InitReport> {
    let mut report = InitReport::default();
    for param in module.parameters_mut() {
        match param.role {
            ParamRole::ConvWeight => {
                fill_xavier_normal(param.tensor, 1.0, rng)?;
                report.conv_weights += 1;
            }
            ParamRole::NormScale => {
                param.tensor.fill(1.0);
                report.norm_scales += 1;
            }
            ParamRole::NormShift => {
                param.tensor.fill(0.0);
                report.norm_shifts += 1;
            }
            ParamRole::ConvBias | ParamRole::LinearWeight | ParamRole::LinearBias => {
                report.untouched += 1;
            }
        }
    }
    debug!(
        conv_weights = report.conv_weights,
        norm_scales = report.norm_scales,
        norm_shifts = report.norm_shifts,
        untouched = report.untouched,
        "initialized parameters"
    );
    Ok(report)
}

/// `(fan_in, fan_out)` of a weight laid out `[out, in, *receptive_field]`.
pub fn fan_in_and_fan_out(dims: &[usize]) -> TensorResult<(usize, usize)> {
    if dims.len() < 2 {
        return Err(TensorError::DimensionMismatch(format!(
            "fan in/out needs at least 2 dimensions, got {:?}",
            dims
        )));
    }
    let receptive: usize = dims[2..].iter().product();
    Ok((dims[1] * receptive, dims[0] * receptive))
}

/// Fill with `N(0, std²)`, `std = gain * sqrt(2 / (fan_in + fan_out))`.
pub fn fill_xavier_normal<R: Rng + ?Sized>(
    tensor: &mut Tensor<f32>,
    gain: f64,
    rng: &mut R,
) -> TensorResult<()> {
    let (fan_in, fan_out) = fan_in_and_fan_out(tensor.dims())?;
    if fan_in + fan_out == 0 {
        return Ok(());
    }
    let std = gain * (2.0 / (fan_in + fan_out) as f64).sqrt();
    tensor.fill_normal(0.0, std, rng)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::BlockKind;
    use approx::assert_relative_eq;

    #[test]
    fn test_fans() {
        assert_eq!(fan_in_and_fan_out(&[64, 3, 3, 3]).unwrap(), (27, 576));
        assert_eq!(fan_in_and_fan_out(&[10, 512]).unwrap(), (512, 10));
        assert!(fan_in_and_fan_out(&[5]).is_err());
    }

    #[test]
    fn test_xavier_variance() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut t: Tensor<f32> = Tensor::zeros(vec![128, 64, 3, 3]);
        fill_xavier_normal(&mut t, 1.0, &mut rng).unwrap();
        let expected = 2.0 / ((64 * 9 + 128 * 9) as f64);
        assert_relative_eq!(t.var_all().unwrap(), expected, max_relative = 0.05);
        assert!(t.mean_all().unwrap().abs() < 1e-3);
    }

    #[test]
    fn test_initialize_block_report() {
        let mut block = BlockKind::Basic.build(16, 32, 2);
        let report = initialize(&mut block, 0).unwrap();
        assert_eq!(
            report,
            InitReport {
                conv_weights: 3,
                norm_scales: 3,
                norm_shifts: 3,
                untouched: 0,
            }
        );
    }

    #[test]
    fn test_same_seed_same_weights() {
        let mut a = BlockKind::Bottleneck.build(8, 4, 1);
        let mut b = BlockKind::Bottleneck.build(8, 4, 1);
        initialize(&mut a, 11).unwrap();
        initialize(&mut b, 11).unwrap();
        for (pa, pb) in a.parameters().iter().zip(b.parameters().iter()) {
            assert_eq!(pa.tensor, pb.tensor, "{}", pa.name);
        }
    }
}
