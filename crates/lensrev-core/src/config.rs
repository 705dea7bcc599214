//! Review configuration loaded from TOML and environment variables.
//!
//! Reads (all optional):
//! - `LENSREV_CONCURRENCY` - lens concurrency limit
//! - `LENSREV_PARTIAL_ON_ALL_FAILED` - `true`/`false`
//! - `LENSREV_FAIL_FAST` - `true`/`false`
//! - `LENSREV_PROFILE` - review profile name
//! - `LENSREV_MIN_SEVERITY` - `blocker`, `high`, `medium`, `low`, or `nit`
//! - `LENSREV_LOG_FORMAT` - `json` for JSON log lines
//! - `LENSREV_LOG_LEVEL` - default log level

use std::path::{Path, PathBuf};

use lensrev_domain::Severity;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::orchestrator::{ReviewOptions, RunOptions, DEFAULT_CONCURRENCY};
use crate::telemetry::{init_tracing, parse_level};

/// Errors raised while loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid value for {var}: {value:?}")]
    InvalidEnv { var: &'static str, value: String },
}

/// Process-level defaults for review runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReviewConfig {
    pub concurrency: usize,
    pub partial_on_all_failed: bool,
    pub fail_fast: bool,
    pub profile: Option<String>,
    pub min_severity: Option<Severity>,
    pub log_json: bool,
    pub log_level: String,
}

impl Default for ReviewConfig {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            partial_on_all_failed: false,
            fail_fast: false,
            profile: None,
            min_severity: None,
            log_json: false,
            log_level: "info".to_string(),
        }
    }
}

impl ReviewConfig {
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Read a TOML file; missing keys take their defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Defaults overlaid with `LENSREV_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().with_env_overrides()
    }

    pub fn with_env_overrides(self) -> Result<Self, ConfigError> {
        self.with_overrides(|var| std::env::var(var).ok())
    }

    /// Apply overrides from an arbitrary variable lookup.
    pub fn with_overrides(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        if let Some(value) = lookup("LENSREV_CONCURRENCY") {
            self.concurrency = value
                .trim()
                .parse()
                .map_err(|_| invalid("LENSREV_CONCURRENCY", &value))?;
        }
        if let Some(value) = lookup("LENSREV_PARTIAL_ON_ALL_FAILED") {
            self.partial_on_all_failed = parse_bool("LENSREV_PARTIAL_ON_ALL_FAILED", &value)?;
        }
        if let Some(value) = lookup("LENSREV_FAIL_FAST") {
            self.fail_fast = parse_bool("LENSREV_FAIL_FAST", &value)?;
        }
        if let Some(value) = lookup("LENSREV_PROFILE") {
            let value = value.trim();
            self.profile = (!value.is_empty()).then(|| value.to_string());
        }
        if let Some(value) = lookup("LENSREV_MIN_SEVERITY") {
            self.min_severity = Some(
                value
                    .parse()
                    .map_err(|_| invalid("LENSREV_MIN_SEVERITY", &value))?,
            );
        }
        if let Some(value) = lookup("LENSREV_LOG_FORMAT") {
            self.log_json = value.trim().eq_ignore_ascii_case("json");
        }
        if let Some(value) = lookup("LENSREV_LOG_LEVEL") {
            self.log_level = value.trim().to_string();
        }
        Ok(self)
    }

    /// Run options for one review; `cancel` lets the caller stop it early.
    pub fn run_options(&self, cancel: Option<CancellationToken>) -> RunOptions {
        RunOptions {
            concurrency: self.concurrency,
            partial_on_all_failed: self.partial_on_all_failed,
            fail_fast: self.fail_fast,
            cancel,
        }
    }

    /// Review options seeded with the configured profile and threshold.
    pub fn review_options(&self) -> ReviewOptions {
        ReviewOptions {
            profile: self.profile.clone(),
            min_severity: self.min_severity,
            ..ReviewOptions::default()
        }
    }

    /// Install the global tracing subscriber using the logging settings.
    pub fn init_logging(&self) {
        init_tracing(self.log_json, parse_level(&self.log_level));
    }
}

fn invalid(var: &'static str, value: &str) -> ConfigError {
    ConfigError::InvalidEnv {
        var,
        value: value.to_string(),
    }
}

fn parse_bool(var: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(invalid(var, value)),
    }
}
