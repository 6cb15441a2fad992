// SPDX-FileCopyrightText: 2025 Russ Fellows <russ.fellows@gmail.com>
// SPDX-License-Identifier: GPL-3.0-or-later

// crates/core/src/config/loader_config.rs
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use mbcache_formats::TypeTag;

use crate::error::ConfigError;

pub const DEFAULT_MACROBATCH_SIZE: usize = 1024;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LoaderConfig {
    pub manifest: PathBuf,              // CSV manifest, one example per line
    #[serde(default)]
    pub root: Option<String>,           // prefix joined onto every manifest field
    #[serde(default)]
    pub shuffle_manifest: bool,
    #[serde(default = "default_subset_percent")]
    pub subset_percent: u32,            // 1..=100
    #[serde(default)]
    pub subset_seed: u64,
    #[serde(default = "default_macrobatch_size")]
    pub macrobatch_size: usize,
    pub cache_dir: PathBuf,             // root of all loader_<id> cache directories
    #[serde(default = "default_type_tag")]
    pub type_tag: String,               // "imgclass" | "bbox"
}

fn default_subset_percent() -> u32 {
    100
}

fn default_macrobatch_size() -> usize {
    DEFAULT_MACROBATCH_SIZE
}

fn default_type_tag() -> String {
    TypeTag::ImageClass.as_str().to_string()
}

impl LoaderConfig {
    /// Minimal config: everything but the two paths at its default.
    pub fn new(manifest: impl Into<PathBuf>, cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            manifest: manifest.into(),
            root: None,
            shuffle_manifest: false,
            subset_percent: default_subset_percent(),
            subset_seed: 0,
            macrobatch_size: DEFAULT_MACROBATCH_SIZE,
            cache_dir: cache_dir.into(),
            type_tag: default_type_tag(),
        }
    }

    /// Parse and validate a config from a YAML string
    pub fn from_yaml(yaml_str: &str) -> Result<Self, ConfigError> {
        let cfg: Self = serde_yaml::from_str(yaml_str)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load LoaderConfig from YAML file
    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(&path).map_err(|e| ConfigError::Read {
            path: path.as_ref().to_path_buf(),
            source: e,
        })?;
        Self::from_yaml(&text)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.subset_percent == 0 || self.subset_percent > 100 {
            return Err(ConfigError::Invalid {
                field: "subset_percent",
                reason: format!("{} is not in 1..=100", self.subset_percent),
            });
        }
        if self.macrobatch_size == 0 {
            return Err(ConfigError::Invalid {
                field: "macrobatch_size",
                reason: "must be greater than 0".to_string(),
            });
        }
        self.tag()?;
        Ok(())
    }

    /// Subset percentage as a fraction in (0, 1].
    pub fn subset_fraction(&self) -> f64 {
        f64::from(self.subset_percent) / 100.0
    }

    pub fn root_str(&self) -> &str {
        self.root.as_deref().unwrap_or("")
    }

    pub fn tag(&self) -> Result<TypeTag, ConfigError> {
        self.type_tag.parse().map_err(|_| ConfigError::Invalid {
            field: "type_tag",
            reason: format!("unknown record schema {:?}", self.type_tag),
        })
    }
}
