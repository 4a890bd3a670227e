//! Curation run configuration.
//!
//! This module provides the configuration for a curation run: the seed, the
//! stratum grid (replication target and locales), and the parameters of the
//! similarity, diversity, band and split stages.
//!
//! Values are layered: defaults, then an optional YAML file, then
//! `GOLDEN_*` environment variables, then CLI flags. The result is always
//! validated before a run starts.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::bands::BandConfig;
use crate::diversity::{DiversityConfig, SimilarityConfig, DEFAULT_REPLICATION};
use crate::split::SplitConfig;
use crate::storage::{Stratum, DEFAULT_PLATFORM};

/// Default run seed.
pub const DEFAULT_SEED: u64 = 2025;

/// Errors that can occur during configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An environment variable has an invalid value.
    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    /// Configuration validation failed.
    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),

    /// The configuration file is not valid YAML for this schema.
    #[error("Invalid configuration file: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// IO error while reading configuration.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration for a curation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CurationConfig {
    /// Run seed; every stage derives its own sub-seed from it.
    pub seed: u64,
    /// Items per stratum (R).
    pub replication: usize,
    /// Locales of the stratum grid.
    pub locales: Vec<String>,
    /// Platform tag used in derived slot ids.
    pub platform: String,

    // Stage settings
    pub similarity: SimilarityConfig,
    pub diversity: DiversityConfig,
    pub bands: BandConfig,
    pub split: SplitConfig,

    /// Whether distribution checks (diversity, band mix) fail the run.
    pub enforce: bool,
}

impl Default for CurationConfig {
    fn default() -> Self {
        Self {
            seed: DEFAULT_SEED,
            replication: DEFAULT_REPLICATION,
            locales: vec!["en".to_string()],
            platform: DEFAULT_PLATFORM.to_string(),
            similarity: SimilarityConfig::default(),
            diversity: DiversityConfig::default(),
            bands: BandConfig::default(),
            split: SplitConfig::default(),
            enforce: false,
        }
    }
}

impl CurationConfig {
    /// Creates a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from a YAML file, falling back to defaults for
    /// absent keys.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&text)
    }

    /// Parses configuration from YAML text.
    pub fn from_yaml_str(text: &str) -> Result<Self, ConfigError> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(text)?)
    }

    /// Loads configuration from environment variables on top of defaults.
    ///
    /// # Environment Variables
    ///
    /// - `GOLDEN_SEED`: Run seed (default: 2025)
    /// - `GOLDEN_SIMILARITY_THRESHOLD`: Near-duplicate threshold (default: 0.85)
    /// - `GOLDEN_REPLICATION`: Items per stratum (default: 5)
    /// - `GOLDEN_ENFORCE`: Fail on distribution checks (default: false)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().apply_env()
    }

    /// Applies `GOLDEN_*` overrides to an existing configuration and
    /// validates the result.
    pub fn apply_env(self) -> Result<Self, ConfigError> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    fn apply_overrides(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        if let Some(val) = lookup("GOLDEN_SEED") {
            self.seed = parse_env_value(&val, "GOLDEN_SEED")?;
        }
        if let Some(val) = lookup("GOLDEN_SIMILARITY_THRESHOLD") {
            self.similarity.threshold = parse_env_value(&val, "GOLDEN_SIMILARITY_THRESHOLD")?;
        }
        if let Some(val) = lookup("GOLDEN_REPLICATION") {
            self.replication = parse_env_value(&val, "GOLDEN_REPLICATION")?;
        }
        if let Some(val) = lookup("GOLDEN_ENFORCE") {
            self.enforce = parse_env_bool(&val, "GOLDEN_ENFORCE")?;
        }

        self.validate()?;
        Ok(self)
    }

    /// Validates the configuration values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.replication == 0 {
            return Err(ConfigError::ValidationFailed(
                "replication must be greater than 0".to_string(),
            ));
        }

        if self.locales.is_empty() {
            return Err(ConfigError::ValidationFailed(
                "locales must not be empty".to_string(),
            ));
        }

        if self.locales.iter().any(|l| l.trim().is_empty()) {
            return Err(ConfigError::ValidationFailed(
                "locales must not contain empty entries".to_string(),
            ));
        }

        if self.platform.trim().is_empty() {
            return Err(ConfigError::ValidationFailed(
                "platform cannot be empty".to_string(),
            ));
        }

        self.similarity
            .validate()
            .map_err(|e| ConfigError::ValidationFailed(format!("similarity: {}", e)))?;
        self.diversity
            .validate()
            .map_err(|e| ConfigError::ValidationFailed(format!("diversity: {}", e)))?;
        self.bands
            .validate()
            .map_err(|e| ConfigError::ValidationFailed(format!("bands: {}", e)))?;
        self.split
            .validate(self.replication)
            .map_err(|e| ConfigError::ValidationFailed(format!("split: {}", e)))?;

        Ok(())
    }

    /// Every configured stratum in canonical order.
    pub fn strata(&self) -> Vec<Stratum> {
        Stratum::grid(&self.locales)
    }

    /// Total number of final items (N).
    pub fn total_items(&self) -> usize {
        self.strata().len() * self.replication
    }

    /// Builder method to set the run seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Builder method to set the replication target.
    pub fn with_replication(mut self, replication: usize) -> Self {
        self.replication = replication;
        self
    }

    /// Builder method to set locales.
    pub fn with_locales(mut self, locales: Vec<String>) -> Self {
        self.locales = locales;
        self
    }

    /// Builder method to set the similarity threshold.
    pub fn with_similarity_threshold(mut self, threshold: f64) -> Self {
        self.similarity.threshold = threshold;
        self
    }

    /// Builder method to set diversity settings.
    pub fn with_diversity(mut self, diversity: DiversityConfig) -> Self {
        self.diversity = diversity;
        self
    }

    /// Builder method to set split counts.
    pub fn with_split(mut self, split: SplitConfig) -> Self {
        self.split = split;
        self
    }

    /// Builder method to toggle enforcement of distribution checks.
    pub fn with_enforce(mut self, enforce: bool) -> Self {
        self.enforce = enforce;
        self
    }
}

/// Parse an environment variable value into a type.
fn parse_env_value<T: std::str::FromStr>(value: &str, key: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        message: format!("could not parse '{}'", value),
    })
}

/// Parse an environment variable as a boolean.
fn parse_env_bool(value: &str, key: &str) -> Result<bool, ConfigError> {
    match value.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("expected boolean value, got '{}'", value),
        }),
    }
}
