use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::block::BlockKind;
use crate::error::{NnError, NnResult};
use crate::preset::Preset;

/// Everything needed to build a [`ResNet`](crate::ResNet).
///
/// ```json
/// { "kind": "bottleneck", "depths": [3, 4, 6, 3], "num_classes": 100, "seed": 7 }
/// ```
///
/// Missing fields take their value from [`ResNetConfig::default`] (ResNet18,
/// 10 classes, seed 42).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResNetConfig {
    pub kind: BlockKind,
    /// Blocks per stage.
    pub depths: [usize; 4],
    pub num_classes: usize,
    /// Seed for the weight initializer and the linear head.
    pub seed: u64,
}

impl Default for ResNetConfig {
    fn default() -> Self {
        Preset::ResNet18.config(10)
    }
}

impl ResNetConfig {
    pub const DEFAULT_SEED: u64 = 42;

    pub fn for_preset(preset: Preset) -> Self {
        preset.config(10)
    }

    pub fn with_num_classes(mut self, num_classes: usize) -> Self {
        self.num_classes = num_classes;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn validate(&self) -> NnResult<()> {
        if self.num_classes == 0 {
            return Err(NnError::Config("num_classes must be at least 1".into()));
        }
        Ok(())
    }

    pub fn from_json_str(json: &str) -> NnResult<Self> {
        let config: ResNetConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> NnResult<Self> {
        let json = fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    pub fn to_json_string(&self) -> NnResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
