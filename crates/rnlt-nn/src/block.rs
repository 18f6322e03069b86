use rnlt_core::{Tensor, TensorResult};
use serde::{Deserialize, Serialize};

use crate::conv::Conv2d;
use crate::layers::BatchNorm2d;
use crate::module::{scope_all, Module, Parameter, ParameterMut};

/// Residual block variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlockKind {
    Basic,
    Bottleneck,
}

impl BlockKind {
    /// Output channels = `width * expansion()`.
    pub fn expansion(self) -> usize {
        match self {
            BlockKind::Basic => 1,
            BlockKind::Bottleneck => 4,
        }
    }

    pub fn build(self, in_channels: usize, width: usize, stride: usize) -> ResidualBlock {
        let spec = BlockSpec {
            in_channels,
            width,
            stride,
            kind: self,
        };
        match self {
            BlockKind::Basic => ResidualBlock::Basic(BasicBlock::new(spec)),
            BlockKind::Bottleneck => ResidualBlock::Bottleneck(Bottleneck::new(spec)),
        }
    }
}

/// Construction parameters of one block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockSpec {
    pub in_channels: usize,
    pub width: usize,
    pub stride: usize,
    pub kind: BlockKind,
}

impl BlockSpec {
    pub fn out_channels(&self) -> usize {
        self.width * self.kind.expansion()
    }

    /// A learned projection is needed whenever the main path changes the
    /// spatial size or the channel count.
    pub fn needs_projection(&self) -> bool {
        self.stride != 1 || self.in_channels != self.out_channels()
    }
}

/// Skip path of a residual block.
pub enum Shortcut {
    Identity,
    Projection { conv: Conv2d, norm: BatchNorm2d },
}

impl Shortcut {
    fn for_spec(spec: &BlockSpec) -> Self {
        if spec.needs_projection() {
            Shortcut::Projection {
                conv: Conv2d::new(spec.in_channels, spec.out_channels(), 1, spec.stride, 0, false),
                norm: BatchNorm2d::new(spec.out_channels()),
            }
        } else {
            Shortcut::Identity
        }
    }

    pub fn is_projection(&self) -> bool {
        matches!(self, Shortcut::Projection { .. })
    }

    /// `out += shortcut(x)`.
    fn add_into(&self, x: &Tensor<f32>, out: &mut Tensor<f32>) -> TensorResult<()> {
        match self {
            Shortcut::Identity => out.add_mut(x),
            Shortcut::Projection { conv, norm } => {
                let mut s = conv.forward(x)?;
                norm.normalize_mut(&mut s)?;
                out.add_mut(&s)
            }
        }
    }

    fn parameters(&self) -> Vec<Parameter<'_>> {
        match self {
            Shortcut::Identity => Vec::new(),
            Shortcut::Projection { conv, norm } => {
                let mut params = scope_all("conv", conv.parameters());
                params.extend(scope_all("norm", norm.parameters()));
                params
            }
        }
    }

    fn parameters_mut(&mut self) -> Vec<ParameterMut<'_>> {
        match self {
            Shortcut::Identity => Vec::new(),
            Shortcut::Projection { conv, norm } => {
                let mut params = scope_all("conv", conv.parameters_mut());
                params.extend(scope_all("norm", norm.parameters_mut()));
                params
            }
        }
    }

    fn set_training(&mut self, training: bool) {
        if let Shortcut::Projection { norm, .. } = self {
            norm.set_training(training);
        }
    }
}

/// Two 3×3 convolutions; the first carries the stride.
pub struct BasicBlock {
    spec: BlockSpec,
    pub conv1: Conv2d,
    pub bn1: BatchNorm2d,
    pub conv2: Conv2d,
    pub bn2: BatchNorm2d,
    pub shortcut: Shortcut,
}

impl BasicBlock {
    pub fn new(spec: BlockSpec) -> Self {
        let BlockSpec {
            in_channels,
            width,
            stride,
            ..
        } = spec;
        BasicBlock {
            conv1: Conv2d::new(in_channels, width, 3, stride, 1, false),
            bn1: BatchNorm2d::new(width),
            conv2: Conv2d::new(width, width, 3, 1, 1, false),
            bn2: BatchNorm2d::new(width),
            shortcut: Shortcut::for_spec(&spec),
            spec,
        }
    }
}

impl Module for BasicBlock {
    fn forward(&self, x: &Tensor<f32>) -> TensorResult<Tensor<f32>> {
        let mut out = self.conv1.forward(x)?;
        self.bn1.normalize_mut(&mut out)?;
        out.relu_mut();
        let mut out = self.conv2.forward(&out)?;
        self.bn2.normalize_mut(&mut out)?;
        self.shortcut.add_into(x, &mut out)?;
        out.relu_mut();
        Ok(out)
    }

    fn parameters(&self) -> Vec<Parameter<'_>> {
        let mut params = scope_all("conv1", self.conv1.parameters());
        params.extend(scope_all("bn1", self.bn1.parameters()));
        params.extend(scope_all("conv2", self.conv2.parameters()));
        params.extend(scope_all("bn2", self.bn2.parameters()));
        params.extend(scope_all("shortcut", self.shortcut.parameters()));
        params
    }

    fn parameters_mut(&mut self) -> Vec<ParameterMut<'_>> {
        let mut params = scope_all("conv1", self.conv1.parameters_mut());
        params.extend(scope_all("bn1", self.bn1.parameters_mut()));
        params.extend(scope_all("conv2", self.conv2.parameters_mut()));
        params.extend(scope_all("bn2", self.bn2.parameters_mut()));
        params.extend(scope_all("shortcut", self.shortcut.parameters_mut()));
        params
    }

    fn set_training(&mut self, training: bool) {
        self.bn1.set_training(training);
        self.bn2.set_training(training);
        self.shortcut.set_training(training);
    }
}

/// 1×1 reduce, 3×3, 1×1 expand (×4). The stride sits on the first 1×1.
pub struct Bottleneck {
    spec: BlockSpec,
    pub conv1: Conv2d,
    pub bn1: BatchNorm2d,
    pub conv2: Conv2d,
    pub bn2: BatchNorm2d,
    pub conv3: Conv2d,
    pub bn3: BatchNorm2d,
    pub shortcut: Shortcut,
}

impl Bottleneck {
    pub fn new(spec: BlockSpec) -> Self {
        let BlockSpec {
            in_channels,
            width,
            stride,
            ..
        } = spec;
        let out_channels = spec.out_channels();
        Bottleneck {
            conv1: Conv2d::new(in_channels, width, 1, stride, 0, false),
            bn1: BatchNorm2d::new(width),
            conv2: Conv2d::new(width, width, 3, 1, 1, false),
            bn2: BatchNorm2d::new(width),
            conv3: Conv2d::new(width, out_channels, 1, 1, 0, false),
            bn3: BatchNorm2d::new(out_channels),
            shortcut: Shortcut::for_spec(&spec),
            spec,
        }
    }
}

impl Module for Bottleneck {
    fn forward(&self, x: &Tensor<f32>) -> TensorResult<Tensor<f32>> {
        let mut out = self.conv1.forward(x)?;
        self.bn1.normalize_mut(&mut out)?;
        out.relu_mut();
        let mut out = self.conv2.forward(&out)?;
        self.bn2.normalize_mut(&mut out)?;
        out.relu_mut();
        let mut out = self.conv3.forward(&out)?;
        self.bn3.normalize_mut(&mut out)?;
        self.shortcut.add_into(x, &mut out)?;
        out.relu_mut();
        Ok(out)
    }

    fn parameters(&self) -> Vec<Parameter<'_>> {
        let mut params = scope_all("conv1", self.conv1.parameters());
        params.extend(scope_all("bn1", self.bn1.parameters()));
        params.extend(scope_all("conv2", self.conv2.parameters()));
        params.extend(scope_all("bn2", self.bn2.parameters()));
        params.extend(scope_all("conv3", self.conv3.parameters()));
        params.extend(scope_all("bn3", self.bn3.parameters()));
        params.extend(scope_all("shortcut", self.shortcut.parameters()));
        params
    }

    fn parameters_mut(&mut self) -> Vec<ParameterMut<'_>> {
        let mut params = scope_all("conv1", self.conv1.parameters_mut());
        params.extend(scope_all("bn1", self.bn1.parameters_mut()));
        params.extend(scope_all("conv2", self.conv2.parameters_mut()));
        params.extend(scope_all("bn2", self.bn2.parameters_mut()));
        params.extend(scope_all("conv3", self.conv3.parameters_mut()));
        params.extend(scope_all("bn3", self.bn3.parameters_mut()));
        params.extend(scope_all("shortcut", self.shortcut.parameters_mut()));
        params
    }

    fn set_training(&mut self, training: bool) {
        self.bn1.set_training(training);
        self.bn2.set_training(training);
        self.bn3.set_training(training);
        self.shortcut.set_training(training);
    }
}

/// A built block of either kind.
pub enum ResidualBlock {
    Basic(BasicBlock),
    Bottleneck(Bottleneck),
}

impl ResidualBlock {
    pub fn spec(&self) -> &BlockSpec {
        match self {
            ResidualBlock::Basic(b) => &b.spec,
            ResidualBlock::Bottleneck(b) => &b.spec,
        }
    }

    pub fn kind(&self) -> BlockKind {
        self.spec().kind
    }

    pub fn out_channels(&self) -> usize {
        self.spec().out_channels()
    }

    pub fn shortcut(&self) -> &Shortcut {
        match self {
            ResidualBlock::Basic(b) => &b.shortcut,
            ResidualBlock::Bottleneck(b) => &b.shortcut,
        }
    }

    pub fn has_projection(&self) -> bool {
        self.shortcut().is_projection()
    }
}

impl Module for ResidualBlock {
    fn forward(&self, x: &Tensor<f32>) -> TensorResult<Tensor<f32>> {
        match self {
            ResidualBlock::Basic(b) => b.forward(x),
            ResidualBlock::Bottleneck(b) => b.forward(x),
        }
    }

    fn parameters(&self) -> Vec<Parameter<'_>> {
        match self {
            ResidualBlock::Basic(b) => b.parameters(),
            ResidualBlock::Bottleneck(b) => b.parameters(),
        }
    }

    fn parameters_mut(&mut self) -> Vec<ParameterMut<'_>> {
        match self {
            ResidualBlock::Basic(b) => b.parameters_mut(),
            ResidualBlock::Bottleneck(b) => b.parameters_mut(),
        }
    }

    fn set_training(&mut self, training: bool) {
        match self {
            ResidualBlock::Basic(b) => b.set_training(training),
            ResidualBlock::Bottleneck(b) => b.set_training(training),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::ParamRole;

    #[test]
    fn test_expansion() {
        assert_eq!(BlockKind::Basic.expansion(), 1);
        assert_eq!(BlockKind::Bottleneck.expansion(), 4);
        assert_eq!(BlockKind::Bottleneck.build(64, 64, 1).out_channels(), 256);
    }

    #[test]
    fn test_identity_and_projection() {
        assert!(!BlockKind::Basic.build(64, 64, 1).has_projection());
        assert!(BlockKind::Basic.build(64, 128, 2).has_projection());
        assert!(BlockKind::Basic.build(64, 64, 2).has_projection());
        assert!(BlockKind::Bottleneck.build(64, 64, 1).has_projection());
        assert!(!BlockKind::Bottleneck.build(256, 64, 1).has_projection());
    }

    #[test]
    fn test_basic_forward_shapes() {
        let block = BlockKind::Basic.build(4, 8, 2);
        let x: Tensor<f32> = Tensor::ones(vec![2, 4, 8, 8]);
        let y = block.forward(&x).unwrap();
        assert_eq!(y.shape_vec(), vec![2, 8, 4, 4]);
        assert!(y.data().iter().all(|&v| v >= 0.0));
        assert_eq!(x, Tensor::ones(vec![2, 4, 8, 8]));
    }

    #[test]
    fn test_bottleneck_forward_shapes() {
        let block = BlockKind::Bottleneck.build(8, 4, 2);
        let y = block.forward(&Tensor::ones(vec![1, 8, 6, 6])).unwrap();
        assert_eq!(y.shape_vec(), vec![1, 16, 3, 3]);
    }

    #[test]
    fn test_identity_block_passes_input_through() {
        // zero weights: main path is zero after batch norm, output = relu(x)
        let block = BlockKind::Basic.build(2, 2, 1);
        let x = Tensor::new(
            (0..32).map(|v| v as f32 - 16.0).collect(),
            vec![1, 2, 4, 4],
        )
        .unwrap();
        let y = block.forward(&x).unwrap();
        let mut expected = x.clone();
        expected.relu_mut();
        assert_eq!(y, expected);
    }

    fn ramp(shape: Vec<usize>, period: usize, scale: f32) -> Tensor<f32> {
        let n: usize = shape.iter().product();
        let half = (period / 2) as f32;
        let data = (0..n).map(|i| ((i % period) as f32 - half) * scale).collect();
        Tensor::new(data, shape).unwrap()
    }

    fn relu(mut t: Tensor<f32>) -> Tensor<f32> {
        t.relu_mut();
        t
    }

    #[test]
    fn test_bottleneck_applies_relu_after_every_norm() {
        let mut block = Bottleneck::new(BlockSpec {
            in_channels: 16,
            width: 4,
            stride: 1,
            kind: BlockKind::Bottleneck,
        });
        block.conv1.weight = ramp(vec![4, 16, 1, 1], 7, 0.1);
        block.conv2.weight = ramp(vec![4, 4, 3, 3], 5, 0.1);
        block.conv3.weight = ramp(vec![16, 4, 1, 1], 7, 0.1);
        block.bn2.bias.fill(-0.5);
        block.set_training(false);
        let x = ramp(vec![1, 16, 4, 4], 7, 0.25);

        let h1 = relu(block.bn1.forward(&block.conv1.forward(&x).unwrap()).unwrap());
        let h2 = block.bn2.forward(&block.conv2.forward(&h1).unwrap()).unwrap();
        assert!(h2.data().iter().any(|&v| v < 0.0));
        let tail = |h: &Tensor<f32>| {
            let mut out = block.bn3.forward(&block.conv3.forward(h).unwrap()).unwrap();
            out.add_mut(&x).unwrap();
            relu(out)
        };
        let expected = tail(&relu(h2.clone()));
        let without_mid_relu = tail(&h2);

        let y = block.forward(&x).unwrap();
        assert_eq!(y, expected);
        assert_ne!(y, without_mid_relu);
    }

    #[test]
    fn test_parameter_names() {
        let block = BlockKind::Basic.build(64, 128, 2);
        let names: Vec<String> = block.parameters().into_iter().map(|p| p.name).collect();
        assert_eq!(
            names,
            vec![
                "conv1.weight",
                "bn1.weight",
                "bn1.bias",
                "conv2.weight",
                "bn2.weight",
                "bn2.bias",
                "shortcut.conv.weight",
                "shortcut.norm.weight",
                "shortcut.norm.bias",
            ]
        );
        let roles: Vec<ParamRole> = block.parameters().into_iter().map(|p| p.role).collect();
        let mut_roles: Vec<ParamRole> = {
            let mut block = block;
            block.parameters_mut().into_iter().map(|p| p.role).collect()
        };
        assert_eq!(roles, mut_roles);
    }

    #[test]
    fn test_block_kind_serde() {
        assert_eq!(serde_json::to_string(&BlockKind::Bottleneck).unwrap(), "\"bottleneck\"");
        let kind: BlockKind = serde_json::from_str("\"basic\"").unwrap();
        assert_eq!(kind, BlockKind::Basic);
    }
}
