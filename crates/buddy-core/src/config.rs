use anyhow::{Context, Result};
use buddy_ai::ProviderConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::BuddyError;
use crate::report::{validate_timestamp_format, ReportRenderer, DEFAULT_TIMESTAMP_FORMAT};
use crate::scheduler::{DEFAULT_COOLDOWN, DEFAULT_POLL_INTERVAL};

pub const CONFIG_FILE_NAME: &str = "config.toml";

/// Get the local data directory for browse-buddy.
///
/// # Errors
///
/// Returns an error if the local data directory cannot be determined.
pub fn get_data_dir() -> Result<PathBuf> {
    let mut path =
        dirs::data_local_dir().ok_or_else(|| anyhow::anyhow!("Failed to get local data dir"))?;
    path.push("browse-buddy");
    Ok(path)
}

/// Page polling and analysis pacing, the `[monitor]` section
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub poll_interval_secs: u64,
    pub cooldown_secs: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: DEFAULT_POLL_INTERVAL.as_secs(),
            cooldown_secs: DEFAULT_COOLDOWN.as_secs(),
        }
    }
}

impl MonitorConfig {
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    #[must_use]
    pub const fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }
}

/// Report output, the `[report]` section
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    /// Where reports are saved. Unset means `<data dir>/reports`.
    pub output_dir: Option<PathBuf>,
    pub timestamp_format: String,
    pub prompt_for_location: bool,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            output_dir: None,
            timestamp_format: DEFAULT_TIMESTAMP_FORMAT.to_string(),
            prompt_for_location: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuddyConfig {
    pub classifier: ProviderConfig,
    pub monitor: MonitorConfig,
    pub report: ReportConfig,
}

impl BuddyConfig {
    /// `<data dir>/config.toml`
    ///
    /// # Errors
    ///
    /// Returns an error if the local data directory cannot be determined.
    pub fn default_path() -> Result<PathBuf> {
        Ok(get_data_dir()?.join(CONFIG_FILE_NAME))
    }

    /// Load from `path`, or from the default location when `None`. A missing
    /// default file yields the defaults; a missing explicit file is an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let (path, explicit) = match path {
            Some(path) => (path.to_path_buf(), true),
            None => (Self::default_path()?, false),
        };

        if !explicit && !path.exists() {
            log::debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config = Self::from_toml_str(&contents)
            .with_context(|| format!("Invalid config file {}", path.display()))?;
        log::debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Parse and validate a TOML document
    ///
    /// # Errors
    ///
    /// Returns an error if the document is not valid TOML or fails validation.
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: Self = toml::from_str(contents).context("Failed to parse config")?;
        config.validate()?;
        Ok(config)
    }

    /// # Errors
    ///
    /// Returns `BuddyError::Config` for zero intervals or a bad timestamp format
    pub fn validate(&self) -> crate::error::Result<()> {
        if self.monitor.poll_interval_secs == 0 {
            return Err(BuddyError::Config(String::from(
                "monitor.poll_interval_secs must be greater than 0",
            )));
        }
        if self.classifier.request_timeout_secs == 0 {
            return Err(BuddyError::Config(String::from(
                "classifier.request_timeout_secs must be greater than 0",
            )));
        }
        validate_timestamp_format(&self.report.timestamp_format)
    }

    /// Report directory, falling back to `<data dir>/reports`
    ///
    /// # Errors
    ///
    /// Returns an error if no directory is configured and the data directory
    /// cannot be determined.
    pub fn output_dir(&self) -> Result<PathBuf> {
        match &self.report.output_dir {
            Some(dir) => Ok(dir.clone()),
            None => Ok(get_data_dir()?.join("reports")),
        }
    }

    /// Renderer for the configured timestamp format
    ///
    /// # Errors
    ///
    /// Returns `BuddyError::Config` if the format is invalid
    pub fn renderer(&self) -> crate::error::Result<ReportRenderer> {
        ReportRenderer::new(&self.report.timestamp_format)
    }

    /// # Errors
    ///
    /// Returns an error if serialization fails
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize config")
    }
}
