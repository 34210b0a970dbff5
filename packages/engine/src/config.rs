//! Engine configuration.
//!
//! The defaults live in `config/default.toml`, baked into the binary with
//! [`include_str!`]. Every section is `#[serde(default)]`, so an override
//! file only needs the keys it changes.

use std::path::Path;

use gps_deform_ceemd::CeemdConfig;
use gps_deform_features::FeatureConfig;
use gps_deform_forecast::ForecastConfig;
use gps_deform_geodesy::ErrorModel;
use gps_deform_pattern::PatternConfig;
use gps_deform_preprocess::PreprocessConfig;
use gps_deform_risk::RiskConfig;
use serde::{Deserialize, Serialize};

const DEFAULT_TOML: &str = include_str!("../config/default.toml");

/// Errors from loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("Failed to read config {path}: {source}")]
    Io {
        /// Path that was read.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The config file is not valid TOML for [`EngineConfig`].
    #[error("Invalid config: {0}")]
    Toml(#[from] toml::de::Error),

    /// The config could not be rendered back to TOML.
    #[error("Failed to render config: {0}")]
    Render(#[from] toml::ser::Error),
}

/// Settings of the orchestrator itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct EngineSection {
    /// Upper bound on a position fetch.
    pub fetch_timeout_secs: u64,
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            fetch_timeout_secs: 30,
        }
    }
}

/// Complete engine configuration, one section per stage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct EngineConfig {
    pub engine: EngineSection,
    pub error_model: ErrorModel,
    pub preprocess: PreprocessConfig,
    pub ceemd: CeemdConfig,
    pub pattern: PatternConfig,
    pub features: FeatureConfig,
    pub forecast: ForecastConfig,
    pub risk: RiskConfig,
}

impl EngineConfig {
    /// The embedded default configuration.
    ///
    /// # Panics
    ///
    /// Panics if the embedded `default.toml` is malformed, which the test
    /// suite rules out.
    #[must_use]
    pub fn embedded() -> Self {
        Self::from_toml_str(DEFAULT_TOML)
            .unwrap_or_else(|e| panic!("Failed to parse embedded default.toml: {e}"))
    }

    /// Parses a configuration, filling missing keys with defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Toml`] if the text is not a valid config.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Reads and parses a configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read or
    /// [`ConfigError::Toml`] if it does not parse.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let config = Self::from_toml_str(&text)?;
        log::info!("Loaded engine config from {}", path.display());
        Ok(config)
    }

    /// Renders the configuration as TOML.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Render`] if serialization fails.
    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string(self)?)
    }
}
