use rnlt_core::{Tensor, TensorResult};
use tracing::debug;

use crate::block::{BlockKind, ResidualBlock};
use crate::module::{scope_all, Module, Parameter, ParameterMut};

/// An ordered run of blocks of one kind.
pub struct Stage {
    kind: BlockKind,
    blocks: Vec<ResidualBlock>,
}

/// Build `n_blocks` blocks of `kind`, the first with `stride` and the rest
/// with stride 1. Returns the stage and the channel width after it.
///
/// With `n_blocks == 0` the stage is empty and `current_channels` comes back
/// unchanged.
pub fn build_stage(
    kind: BlockKind,
    current_channels: usize,
    width: usize,
    n_blocks: usize,
    stride: usize,
) -> (Stage, usize) {
    let mut channels = current_channels;
    let blocks = (0..n_blocks)
        .map(|i| {
            let block = kind.build(channels, width, if i == 0 { stride } else { 1 });
            channels = block.out_channels();
            block
        })
        .collect();

    debug!(
        ?kind,
        width, stride, n_blocks, in_channels = current_channels, out_channels = channels,
        "built stage"
    );
    (Stage { kind, blocks }, channels)
}

impl Stage {
    pub fn kind(&self) -> BlockKind {
        self.kind
    }

    pub fn blocks(&self) -> &[ResidualBlock] {
        &self.blocks
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }
}

impl Module for Stage {
    fn forward(&self, x: &Tensor<f32>) -> TensorResult<Tensor<f32>> {
        let Some((first, rest)) = self.blocks.split_first() else {
            return Ok(x.clone());
        };
        rest.iter().try_fold(first.forward(x)?, |out, block| block.forward(&out))
    }

    fn parameters(&self) -> Vec<Parameter<'_>> {
        self.blocks
            .iter()
            .enumerate()
            .flat_map(|(i, b)| scope_all(&i.to_string(), b.parameters()))
            .collect()
    }

    fn parameters_mut(&mut self) -> Vec<ParameterMut<'_>> {
        self.blocks
            .iter_mut()
            .enumerate()
            .flat_map(|(i, b)| scope_all(&i.to_string(), b.parameters_mut()))
            .collect()
    }

    fn set_training(&mut self, training: bool) {
        for block in &mut self.blocks {
            block.set_training(training);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stride_only_on_first_block() {
        let (stage, out) = build_stage(BlockKind::Basic, 64, 128, 3, 2);
        assert_eq!(out, 128);
        let strides: Vec<usize> = stage.blocks().iter().map(|b| b.spec().stride).collect();
        assert_eq!(strides, vec![2, 1, 1]);
        let ins: Vec<usize> = stage.blocks().iter().map(|b| b.spec().in_channels).collect();
        assert_eq!(ins, vec![64, 128, 128]);
    }

    #[test]
    fn test_bottleneck_width_threading() {
        let (stage, out) = build_stage(BlockKind::Bottleneck, 64, 64, 3, 1);
        assert_eq!(out, 256);
        assert!(stage.blocks()[0].has_projection());
        assert!(!stage.blocks()[1].has_projection());
        assert_eq!(stage.blocks()[1].spec().in_channels, 256);
    }

    #[test]
    fn test_empty_stage_is_identity() {
        let (stage, out) = build_stage(BlockKind::Bottleneck, 96, 64, 0, 2);
        assert_eq!(out, 96);
        assert!(stage.is_empty());
        let x = Tensor::new((0..12).map(|v| v as f32).collect(), vec![1, 3, 2, 2]).unwrap();
        assert_eq!(stage.forward(&x).unwrap(), x);
        assert!(stage.parameters().is_empty());
    }

    #[test]
    fn test_parameter_names_are_indexed() {
        let (stage, _) = build_stage(BlockKind::Basic, 8, 8, 2, 1);
        let params = stage.parameters();
        assert_eq!(params.first().map(|p| p.name.as_str()), Some("0.conv1.weight"));
        assert_eq!(params.last().map(|p| p.name.as_str()), Some("1.bn2.bias"));
    }
}
