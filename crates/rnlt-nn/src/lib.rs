pub mod error;
pub mod module;
pub mod layers;
pub mod conv;
pub mod block;
pub mod stage;
pub mod init;
pub mod config;
pub mod preset;
pub mod resnet;

pub use error::{NnError, NnResult};
pub use module::{Module, ParamRole, Parameter, ParameterMut};
pub use layers::{BatchNorm2d, Linear};
pub use conv::{AvgPool2d, Conv2d};
pub use block::{BasicBlock, BlockKind, BlockSpec, Bottleneck, ResidualBlock, Shortcut};
pub use stage::{build_stage, Stage};
pub use init::{initialize, InitReport};
pub use config::ResNetConfig;
pub use preset::{resnet101, resnet152, resnet18, resnet34, resnet50, Preset};
pub use resnet::{ResNet, StagePlan};
