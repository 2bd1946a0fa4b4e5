//! Configuration management
//!
//! One TOML file with a section per pipeline stage. Missing sections and
//! fields fall back to their defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{Error, Result};
use crate::graph::GraphConfig;
use crate::model::{DgcnnConfig, GatConfig};
use crate::training::TrainingConfig;

/// Dataset source and split
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    /// Wide CSV of jets; synthetic jets are generated when unset
    pub path: Option<PathBuf>,
    /// Upper bound on jets read from `path`
    pub max_jets: Option<usize>,
    pub synthetic_jets: usize,
    pub max_particles: usize,
    pub synthetic_seed: u64,
    pub train_fraction: f64,
    pub val_fraction: f64,
    pub split_seed: u64,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            path: None,
            max_jets: None,
            synthetic_jets: 2000,
            max_particles: 60,
            synthetic_seed: 7,
            train_fraction: 0.7,
            val_fraction: 0.15,
            split_seed: 42,
        }
    }
}

/// Where checkpoints go
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub dir: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("checkpoints"),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Main configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub data: DataConfig,
    pub graph: GraphConfig,
    pub gat: GatConfig,
    pub dgcnn: DgcnnConfig,
    pub training: TrainingConfig,
    pub output: OutputConfig,
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from file or use default
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        if !path.exists() {
            return Self::default();
        }
        Self::load(path).unwrap_or_else(|e| {
            warn!("Ignoring {}: {}", path.display(), e);
            Self::default()
        })
    }

    /// Save configuration to file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.graph.k == 0 {
            return Err(Error::Config("graph.k must be at least 1".to_string()));
        }
        if self.graph.padding_epsilon < 0.0 {
            return Err(Error::Config(
                "graph.padding_epsilon must be non-negative".to_string(),
            ));
        }
        let data = &self.data;
        if !(0.0..=1.0).contains(&data.train_fraction)
            || !(0.0..=1.0).contains(&data.val_fraction)
            || data.train_fraction + data.val_fraction > 1.0
        {
            return Err(Error::Config(format!(
                "data fractions out of range: train {} validation {}",
                data.train_fraction, data.val_fraction
            )));
        }
        if data.path.is_none() && data.max_particles == 0 {
            return Err(Error::Config(
                "data.max_particles must be positive".to_string(),
            ));
        }
        self.gat.validate()?;
        self.dgcnn.validate()?;
        self.training.validate()?;
        Ok(())
    }
}
