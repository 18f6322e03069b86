use rand::rngs::StdRng;
use rand::SeedableRng;
use rnlt_core::{Tensor, TensorResult};
use tracing::info;

use crate::block::BlockKind;
use crate::config::ResNetConfig;
use crate::conv::{AvgPool2d, Conv2d};
use crate::error::NnResult;
use crate::init::initialize_with_rng;
use crate::layers::{BatchNorm2d, Linear};
use crate::module::{scope_all, Module, Parameter, ParameterMut};
use crate::stage::{build_stage, Stage};

pub const STEM_CHANNELS: usize = 64;
pub const STAGE_WIDTHS: [usize; 4] = [64, 128, 256, 512];
pub const STAGE_STRIDES: [usize; 4] = [1, 2, 2, 2];
/// Average-pool window of the head; a 32×32 input reaches it as 4×4.
pub const HEAD_POOL: usize = 4;

/// Channel bookkeeping of one stage, recorded at build time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StagePlan {
    pub width: usize,
    pub stride: usize,
    pub blocks: usize,
    pub in_channels: usize,
    pub out_channels: usize,
}

/// Residual network for 32×32 inputs: 3×3 stem, four stages, average pool
/// and a linear classifier.
pub struct ResNet {
    kind: BlockKind,
    num_classes: usize,
    pub conv1: Conv2d,
    pub bn1: BatchNorm2d,
    stages: Vec<Stage>,
    pool: AvgPool2d,
    pub linear: Linear,
    plan: [StagePlan; 4],
}

impl ResNet {
    /// Build and initialize a network. Two calls with the same config give
    /// identical weights.
    pub fn new(config: &ResNetConfig) -> NnResult<Self> {
        config.validate()?;
        let kind = config.kind;

        let mut channels = STEM_CHANNELS;
        let mut stages = Vec::with_capacity(4);
        let mut plan = [StagePlan {
            width: 0,
            stride: 0,
            blocks: 0,
            in_channels: 0,
            out_channels: 0,
        }; 4];
        for (k, entry) in plan.iter_mut().enumerate() {
            let (width, stride, blocks) = (STAGE_WIDTHS[k], STAGE_STRIDES[k], config.depths[k]);
            let (stage, out_channels) = build_stage(kind, channels, width, blocks, stride);
            *entry = StagePlan {
                width,
                stride,
                blocks,
                in_channels: channels,
                out_channels,
            };
            stages.push(stage);
            channels = out_channels;
        }

        let mut rng = StdRng::seed_from_u64(config.seed);
        let linear = Linear::new(STAGE_WIDTHS[3] * kind.expansion(), config.num_classes, &mut rng)?;
        let mut net = ResNet {
            kind,
            num_classes: config.num_classes,
            conv1: Conv2d::new(3, STEM_CHANNELS, 3, 1, 1, false),
            bn1: BatchNorm2d::new(STEM_CHANNELS),
            stages,
            pool: AvgPool2d::new(HEAD_POOL),
            linear,
            plan,
        };
        initialize_with_rng(&mut net, &mut rng)?;

        info!(
            ?kind,
            depths = ?config.depths,
            num_classes = config.num_classes,
            parameters = net.num_parameters(),
            "built resnet"
        );
        Ok(net)
    }

    pub fn kind(&self) -> BlockKind {
        self.kind
    }

    pub fn num_classes(&self) -> usize {
        self.num_classes
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    /// Stage `k`, counted from 1 like the parameter names.
    pub fn stage(&self, k: usize) -> Option<&Stage> {
        k.checked_sub(1).and_then(|i| self.stages.get(i))
    }

    pub fn plan(&self) -> &[StagePlan; 4] {
        &self.plan
    }

    pub fn train(&mut self) {
        self.set_training(true);
    }

    pub fn eval(&mut self) {
        self.set_training(false);
    }
}

impl Module for ResNet {
    fn forward(&self, x: &Tensor<f32>) -> TensorResult<Tensor<f32>> {
        let mut out = self.conv1.forward(x)?;
        self.bn1.normalize_mut(&mut out)?;
        out.relu_mut();
        let out = self
            .stages
            .iter()
            .try_fold(out, |out, stage| stage.forward(&out))?;
        let pooled = self.pool.forward(&out)?.flatten_batch()?;
        self.linear.forward(&pooled)
    }

    fn parameters(&self) -> Vec<Parameter<'_>> {
        let mut params = scope_all("conv1", self.conv1.parameters());
        params.extend(scope_all("bn1", self.bn1.parameters()));
        for (k, stage) in self.stages.iter().enumerate() {
            params.extend(scope_all(&format!("stage{}", k + 1), stage.parameters()));
        }
        params.extend(scope_all("linear", self.linear.parameters()));
        params
    }

    fn parameters_mut(&mut self) -> Vec<ParameterMut<'_>> {
        let mut params = scope_all("conv1", self.conv1.parameters_mut());
        params.extend(scope_all("bn1", self.bn1.parameters_mut()));
        for (k, stage) in self.stages.iter_mut().enumerate() {
            params.extend(scope_all(&format!("stage{}", k + 1), stage.parameters_mut()));
        }
        params.extend(scope_all("linear", self.linear.parameters_mut()));
        params
    }

    fn set_training(&mut self, training: bool) {
        self.bn1.set_training(training);
        for stage in &mut self.stages {
            stage.set_training(training);
        }
    }
}
