//! Configuration handling.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

use crate::error::RnnError;
use crate::models::recurrent_network::CombineMode;
use crate::models::sequence_model::OutputMode;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Invalid(#[from] RnnError),
}

fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T, ConfigError> {
    let content = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

fn write_json<T: Serialize>(value: &T, path: &Path) -> Result<(), ConfigError> {
    let content = serde_json::to_string_pretty(value)?;
    fs::write(path, content)?;
    Ok(())
}

/// Training hyperparameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    /// Number of passes over the training set
    pub epochs: usize,
    /// Samples stacked as columns per optimizer step
    pub batch_size: usize,
    pub learning_rate: f64,
    /// Maximum global gradient norm
    pub clip_gradient: Option<f64>,
    /// Log progress every this many epochs
    pub log_every: usize,
    /// Seed for shuffling
    pub seed: u64,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        TrainingConfig {
            epochs: 100,
            batch_size: 32,
            learning_rate: 0.01,
            clip_gradient: Some(5.0),
            log_every: 10,
            seed: 42,
        }
    }
}

impl TrainingConfig {
    /// Load and validate configuration from a JSON file.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config: TrainingConfig = read_json(path.as_ref())?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        write_json(self, path.as_ref())
    }

    pub fn validate(&self) -> Result<(), RnnError> {
        if self.batch_size == 0 {
            return Err(RnnError::InvalidConfig("batch_size must be positive".into()));
        }
        if !(self.learning_rate.is_finite() && self.learning_rate > 0.0) {
            return Err(RnnError::InvalidConfig(format!(
                "learning_rate must be positive, got {}",
                self.learning_rate
            )));
        }
        if let Some(clip) = self.clip_gradient {
            if !(clip.is_finite() && clip > 0.0) {
                return Err(RnnError::InvalidConfig(format!("clip_gradient must be positive, got {}", clip)));
            }
        }
        if self.log_every == 0 {
            return Err(RnnError::InvalidConfig("log_every must be positive".into()));
        }
        Ok(())
    }
}

/// Model architecture.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub input_size: usize,
    pub hidden_size: usize,
    pub output_size: usize,
    pub num_layers: usize,
    pub bidirectional: bool,
    /// How the two directions are merged when bidirectional
    pub combine_mode: CombineMode,
    pub output_mode: OutputMode,
}

impl Default for ModelConfig {
    fn default() -> Self {
        ModelConfig {
            input_size: 1,
            hidden_size: 16,
            output_size: 1,
            num_layers: 1,
            bidirectional: false,
            combine_mode: CombineMode::Concat,
            output_mode: OutputMode::LastStep,
        }
    }
}

impl ModelConfig {
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config: ModelConfig = read_json(path.as_ref())?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        write_json(self, path.as_ref())
    }

    pub fn validate(&self) -> Result<(), RnnError> {
        let sizes = [
            ("input_size", self.input_size),
            ("hidden_size", self.hidden_size),
            ("output_size", self.output_size),
            ("num_layers", self.num_layers),
        ];
        for (name, value) in sizes {
            if value == 0 {
                return Err(RnnError::InvalidConfig(format!("{} must be positive", name)));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert!(TrainingConfig::default().validate().is_ok());
        assert!(ModelConfig::default().validate().is_ok());
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let config = TrainingConfig { batch_size: 0, ..TrainingConfig::default() };
        assert!(matches!(config.validate(), Err(RnnError::InvalidConfig(_))));

        let config = TrainingConfig { learning_rate: f64::NAN, ..TrainingConfig::default() };
        assert!(config.validate().is_err());

        let config = ModelConfig { hidden_size: 0, ..ModelConfig::default() };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: ModelConfig =
            serde_json::from_str(r#"{"hidden_size": 8, "bidirectional": true, "combine_mode": "Sum"}"#).unwrap();
        assert_eq!(config.hidden_size, 8);
        assert!(config.bidirectional);
        assert_eq!(config.combine_mode, CombineMode::Sum);
        assert_eq!(config.input_size, 1);
        assert_eq!(config.output_mode, OutputMode::LastStep);
    }
}
