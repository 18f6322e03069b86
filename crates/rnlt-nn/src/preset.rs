use std::fmt;
use std::str::FromStr;

use crate::block::BlockKind;
use crate::config::ResNetConfig;
use crate::error::{NnError, NnResult};
use crate::resnet::ResNet;

/// The five canonical depths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Preset {
    ResNet18,
    ResNet34,
    ResNet50,
    ResNet101,
    ResNet152,
}

struct PresetEntry {
    preset: Preset,
    name: &'static str,
    kind: BlockKind,
    depths: [usize; 4],
}

static PRESETS: [PresetEntry; 5] = [
    PresetEntry {
        preset: Preset::ResNet18,
        name: "resnet18",
        kind: BlockKind::Basic,
        depths: [2, 2, 2, 2],
    },
    PresetEntry {
        preset: Preset::ResNet34,
        name: "resnet34",
        kind: BlockKind::Basic,
        depths: [3, 4, 6, 3],
    },
    PresetEntry {
        preset: Preset::ResNet50,
        name: "resnet50",
        kind: BlockKind::Bottleneck,
        depths: [3, 4, 6, 3],
    },
    PresetEntry {
        preset: Preset::ResNet101,
        name: "resnet101",
        kind: BlockKind::Bottleneck,
        depths: [3, 4, 23, 2],
    },
    PresetEntry {
        preset: Preset::ResNet152,
        name: "resnet152",
        kind: BlockKind::Bottleneck,
        depths: [3, 8, 36, 3],
    },
];

impl Preset {
    pub const ALL: [Preset; 5] = [
        Preset::ResNet18,
        Preset::ResNet34,
        Preset::ResNet50,
        Preset::ResNet101,
        Preset::ResNet152,
    ];

    fn entry(self) -> &'static PresetEntry {
        &PRESETS[self as usize]
    }

    pub fn name(self) -> &'static str {
        self.entry().name
    }

    pub fn kind(self) -> BlockKind {
        self.entry().kind
    }

    pub fn depths(self) -> [usize; 4] {
        self.entry().depths
    }

    pub fn config(self, num_classes: usize) -> ResNetConfig {
        ResNetConfig {
            kind: self.kind(),
            depths: self.depths(),
            num_classes,
            seed: ResNetConfig::DEFAULT_SEED,
        }
    }

    pub fn build(self, num_classes: usize) -> NnResult<ResNet> {
        ResNet::new(&self.config(num_classes))
    }
}

impl fmt::Display for Preset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Preset {
    type Err = NnError;

    /// Case-insensitive, `-` and `_` ignored: `ResNet-50`, `resnet50`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key: String = s
            .chars()
            .filter(|c| *c != '-' && *c != '_')
            .collect::<String>()
            .to_ascii_lowercase();
        PRESETS
            .iter()
            .find(|e| e.name == key)
            .map(|e| e.preset)
            .ok_or_else(|| NnError::UnknownPreset(s.to_string()))
    }
}

pub fn resnet18() -> NnResult<ResNet> {
    Preset::ResNet18.build(10)
}

pub fn resnet34() -> NnResult<ResNet> {
    Preset::ResNet34.build(10)
}

pub fn resnet50() -> NnResult<ResNet> {
    Preset::ResNet50.build(10)
}

pub fn resnet101() -> NnResult<ResNet> {
    Preset::ResNet101.build(10)
}

pub fn resnet152() -> NnResult<ResNet> {
    Preset::ResNet152.build(10)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_order_matches_enum() {
        for preset in Preset::ALL {
            assert_eq!(preset.entry().preset, preset);
        }
    }

    #[test]
    fn test_table_values() {
        assert_eq!(Preset::ResNet34.depths(), [3, 4, 6, 3]);
        assert_eq!(Preset::ResNet50.depths(), [3, 4, 6, 3]);
        assert_eq!(Preset::ResNet34.kind(), BlockKind::Basic);
        assert_eq!(Preset::ResNet50.kind(), BlockKind::Bottleneck);
        assert_eq!(Preset::ResNet152.depths().iter().sum::<usize>(), 50);
    }

    #[test]
    fn test_parse() {
        assert_eq!("ResNet-50".parse::<Preset>().unwrap(), Preset::ResNet50);
        assert_eq!("resnet_101".parse::<Preset>().unwrap(), Preset::ResNet101);
        assert_eq!(Preset::ResNet152.to_string().parse::<Preset>().unwrap(), Preset::ResNet152);
        assert!(matches!(
            "resnet20".parse::<Preset>(),
            Err(NnError::UnknownPreset(name)) if name == "resnet20"
        ));
    }

    #[test]
    fn test_config_overrides_classes() {
        let config = Preset::ResNet18.config(100);
        assert_eq!(config.num_classes, 100);
        assert_eq!(config.depths, [2, 2, 2, 2]);
    }
}
