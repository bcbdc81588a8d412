//! Runtime configuration.
//!
//! Loaded from environment variables (and a `.env` file when present) with
//! the `CYCLESENSE` prefix; nested keys use `__`:
//!
//! - `CYCLESENSE__DATA_DIR=/var/lib/cyclesense`
//! - `CYCLESENSE__LOG_LEVEL=debug`
//! - `CYCLESENSE__IRREGULARITY__MAX_STD_DEV_DAYS=7`
//! - `CYCLESENSE__IRREGULARITY__MAX_LATEST_DEVIATION_DAYS=7`
//! - `CYCLESENSE__PCOS__BASE_URL=http://localhost:8001`
//! - `CYCLESENSE__PCOS__TIMEOUT_SECS=30`

use std::path::PathBuf;

use serde::Deserialize;
use thiserror::Error;

use crate::prediction::IrregularityPolicy;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("configuration loading failed: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid configuration: {0}")]
    Invalid(&'static str),
}

#[derive(Debug, Clone, Deserialize)]
pub struct PcosConfig {
    #[serde(default = "default_pcos_url")]
    pub base_url: String,
    #[serde(default = "default_pcos_timeout")]
    pub timeout_secs: u64,
}

fn default_pcos_url() -> String {
    "http://localhost:8001".to_string()
}

fn default_pcos_timeout() -> u64 {
    30
}

impl Default for PcosConfig {
    fn default() -> Self {
        Self {
            base_url: default_pcos_url(),
            timeout_secs: default_pcos_timeout(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Where encrypted user documents live. Falls back to the platform data dir.
    #[serde(default)]
    pub data_dir: Option<PathBuf>,

    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub irregularity: IrregularityPolicy,

    #[serde(default)]
    pub pcos: PcosConfig,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            log_level: default_log_level(),
            irregularity: IrregularityPolicy::default(),
            pcos: PcosConfig::default(),
        }
    }
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(
                config::Environment::default()
                    .prefix("CYCLESENSE")
                    .separator("__"),
            )
            .build()?
            .try_deserialize()?;

        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let url = self.pcos.base_url.trim();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(ConfigError::Invalid("pcos.base_url must be an http(s) URL"));
        }
        if self.pcos.timeout_secs == 0 {
            return Err(ConfigError::Invalid("pcos.timeout_secs must be positive"));
        }
        let max_std_dev = self.irregularity.max_std_dev_days;
        if !max_std_dev.is_finite() || max_std_dev <= 0.0 {
            return Err(ConfigError::Invalid(
                "irregularity.max_std_dev_days must be positive",
            ));
        }
        if self.irregularity.max_latest_deviation_days == 0 {
            return Err(ConfigError::Invalid(
                "irregularity.max_latest_deviation_days must be positive",
            ));
        }
        Ok(())
    }
}
