//! Gate configuration.
//!
//! A single [`GateConfig`] is threaded through every stage. Stages never read
//! the process environment themselves; the environment is only one of the
//! sources a config can be built from.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Environment variable holding the API key.
pub const ENV_API_KEY: &str = "ANOMALO_API_KEY";
/// Environment variable holding the numeric test id.
pub const ENV_TEST_ID: &str = "ANOMALO_TEST_ID";
/// Environment variable naming the quarantine destination.
pub const ENV_QUARANTINE_TABLE: &str = "QUARANTINE_TABLE";
/// Environment variable overriding the service base URL.
pub const ENV_BASE_URL: &str = "ANOMALO_BASE_URL";
/// Environment variable overriding the results file path. Empty disables it.
pub const ENV_RESULTS_PATH: &str = "ANOMALO_RESULTS_PATH";
/// Environment variable setting a request timeout in seconds.
pub const ENV_TIMEOUT_SECONDS: &str = "ANOMALO_TIMEOUT_SECONDS";

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required setting was not provided.
    #[error("Missing required configuration: {key}")]
    Missing {
        /// The setting name.
        key: String,
    },

    /// A setting could not be parsed or is out of range.
    #[error("Invalid configuration for {key}: '{value}' ({reason})")]
    Invalid {
        /// The setting name.
        key: String,
        /// The rejected value.
        value: String,
        /// Why it was rejected.
        reason: String,
    },

    /// The config file could not be read.
    #[error("Failed to read config file {path}: {source}")]
    Read {
        /// The file path.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The config file was not valid JSON for a [`GateConfig`].
    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        /// The file path.
        path: PathBuf,
        /// Underlying parse error.
        #[source]
        source: serde_json::Error,
    },
}

impl ConfigError {
    pub(crate) fn missing(key: &str) -> Self {
        Self::Missing {
            key: key.to_string(),
        }
    }

    fn invalid(key: &str, value: &str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key: key.to_string(),
            value: value.to_string(),
            reason: reason.into(),
        }
    }
}

/// Configuration for one gate run.
#[derive(Clone, Serialize, Deserialize)]
pub struct GateConfig {
    /// Bearer token for the remote service.
    pub api_key: String,
    /// The remote test to run and verify.
    pub test_id: u64,
    /// Base URL of the remote service.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Where failing records are moved.
    #[serde(default)]
    pub quarantine_table: Option<String>,
    /// Where the raw trigger response is written, if anywhere.
    #[serde(default = "default_results_path")]
    pub results_path: Option<PathBuf>,
    /// Request timeout in seconds. No timeout when unset.
    #[serde(default)]
    pub timeout_seconds: Option<f64>,
}

fn default_base_url() -> String {
    "https://demo.anomalo.com".to_string()
}

fn default_results_path() -> Option<PathBuf> {
    Some(PathBuf::from("data/test_results.json"))
}

impl fmt::Debug for GateConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GateConfig")
            .field("api_key", &"<redacted>")
            .field("test_id", &self.test_id)
            .field("base_url", &self.base_url)
            .field("quarantine_table", &self.quarantine_table)
            .field("results_path", &self.results_path)
            .field("timeout_seconds", &self.timeout_seconds)
            .finish()
    }
}

impl GateConfig {
    /// Creates a configuration with defaults for everything but the credentials.
    #[must_use]
    pub fn new(api_key: impl Into<String>, test_id: u64) -> Self {
        Self {
            api_key: api_key.into(),
            test_id,
            base_url: default_base_url(),
            quarantine_table: None,
            results_path: default_results_path(),
            timeout_seconds: None,
        }
    }

    /// Builds a configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns an error if a required variable is missing or malformed.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a configuration from an arbitrary key lookup.
    ///
    /// Keys are the `ENV_*` constants of this module.
    ///
    /// # Errors
    ///
    /// Returns an error if a required key is missing or malformed.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_key = lookup(ENV_API_KEY).ok_or_else(|| ConfigError::missing(ENV_API_KEY))?;
        let raw_test_id = lookup(ENV_TEST_ID).ok_or_else(|| ConfigError::missing(ENV_TEST_ID))?;
        let test_id = raw_test_id
            .trim()
            .parse::<u64>()
            .map_err(|e| ConfigError::invalid(ENV_TEST_ID, &raw_test_id, e.to_string()))?;

        let mut config = Self::new(api_key, test_id);

        if let Some(url) = lookup(ENV_BASE_URL) {
            config.base_url = url;
        }
        config.quarantine_table = lookup(ENV_QUARANTINE_TABLE);
        if let Some(path) = lookup(ENV_RESULTS_PATH) {
            config.results_path = if path.is_empty() {
                None
            } else {
                Some(PathBuf::from(path))
            };
        }
        if let Some(raw) = lookup(ENV_TIMEOUT_SECONDS) {
            let seconds = raw
                .trim()
                .parse::<f64>()
                .map_err(|e| ConfigError::invalid(ENV_TIMEOUT_SECONDS, &raw, e.to_string()))?;
            config.timeout_seconds = Some(seconds);
        }

        config.validate()?;
        Ok(config)
    }

    /// Loads a configuration from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed, or validated.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Sets the base URL.
    #[must_use]
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Sets the quarantine destination.
    #[must_use]
    pub fn with_quarantine_table(mut self, table: impl Into<String>) -> Self {
        self.quarantine_table = Some(table.into());
        self
    }

    /// Sets the results file path.
    #[must_use]
    pub fn with_results_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.results_path = Some(path.into());
        self
    }

    /// Disables writing the results file.
    #[must_use]
    pub fn without_results_file(mut self) -> Self {
        self.results_path = None;
        self
    }

    /// Sets the request timeout.
    #[must_use]
    pub fn with_timeout(mut self, seconds: f64) -> Self {
        self.timeout_seconds = Some(seconds);
        self
    }

    /// Gets the timeout as a Duration.
    ///
    /// A value that no `Duration` can hold yields `None`; [`Self::validate`]
    /// rejects such values up front.
    #[must_use]
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_seconds
            .and_then(|seconds| Duration::try_from_secs_f64(seconds).ok())
    }

    /// Checks that required settings are usable.
    ///
    /// # Errors
    ///
    /// Returns an error describing the first invalid setting.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.api_key.trim().is_empty() {
            return Err(ConfigError::missing(ENV_API_KEY));
        }
        if !(self.base_url.starts_with("http://") || self.base_url.starts_with("https://")) {
            return Err(ConfigError::invalid(
                ENV_BASE_URL,
                &self.base_url,
                "must start with http:// or https://",
            ));
        }
        if let Some(seconds) = self.timeout_seconds {
            if !seconds.is_finite() || seconds <= 0.0 {
                return Err(ConfigError::invalid(
                    ENV_TIMEOUT_SECONDS,
                    &seconds.to_string(),
                    "must be a positive number of seconds",
                ));
            }
            if let Err(e) = Duration::try_from_secs_f64(seconds) {
                return Err(ConfigError::invalid(
                    ENV_TIMEOUT_SECONDS,
                    &seconds.to_string(),
                    e.to_string(),
                ));
            }
        }
        if let Some(table) = &self.quarantine_table {
            if table.trim().is_empty() {
                return Err(ConfigError::invalid(
                    ENV_QUARANTINE_TABLE,
                    table,
                    "must not be blank",
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_from_lookup_minimal() {
        let config = GateConfig::from_lookup(lookup_from(&[
            (ENV_API_KEY, "secret"),
            (ENV_TEST_ID, "42"),
        ]))
        .unwrap();

        assert_eq!(config.api_key, "secret");
        assert_eq!(config.test_id, 42);
        assert_eq!(config.base_url, "https://demo.anomalo.com");
        assert_eq!(config.results_path, Some(PathBuf::from("data/test_results.json")));
        assert!(config.quarantine_table.is_none());
        assert!(config.timeout().is_none());
    }

    #[test]
    fn test_from_lookup_all_settings() {
        let config = GateConfig::from_lookup(lookup_from(&[
            (ENV_API_KEY, "secret"),
            (ENV_TEST_ID, " 7 "),
            (ENV_QUARANTINE_TABLE, "warehouse.quarantine"),
            (ENV_BASE_URL, "http://localhost:9000"),
            (ENV_RESULTS_PATH, ""),
            (ENV_TIMEOUT_SECONDS, "2.5"),
        ]))
        .unwrap();

        assert_eq!(config.test_id, 7);
        assert_eq!(config.quarantine_table.as_deref(), Some("warehouse.quarantine"));
        assert_eq!(config.base_url, "http://localhost:9000");
        assert!(config.results_path.is_none());
        assert_eq!(config.timeout(), Some(Duration::from_millis(2500)));
    }

    #[test]
    fn test_missing_api_key() {
        let err = GateConfig::from_lookup(lookup_from(&[(ENV_TEST_ID, "1")])).unwrap_err();
        assert!(matches!(err, ConfigError::Missing { ref key } if key == ENV_API_KEY));
    }

    #[test]
    fn test_invalid_test_id() {
        let err = GateConfig::from_lookup(lookup_from(&[
            (ENV_API_KEY, "secret"),
            (ENV_TEST_ID, "forty-two"),
        ]))
        .unwrap_err();

        assert!(matches!(err, ConfigError::Invalid { ref key, .. } if key == ENV_TEST_ID));
        assert!(err.to_string().contains("forty-two"));
    }

    #[test]
    fn test_validate_rejects_bad_timeout() {
        let config = GateConfig::new("secret", 1).with_timeout(0.0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_out_of_range_timeout_is_a_config_error() {
        let err = GateConfig::from_lookup(lookup_from(&[
            (ENV_API_KEY, "secret"),
            (ENV_TEST_ID, "1"),
            (ENV_TIMEOUT_SECONDS, "1e20"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { ref key, .. } if key == ENV_TIMEOUT_SECONDS));

        let unchecked = GateConfig::new("secret", 1).with_timeout(1e20);
        assert!(unchecked.validate().is_err());
        assert!(unchecked.timeout().is_none());
    }

    #[test]
    fn test_validate_rejects_bad_base_url() {
        let config = GateConfig::new("secret", 1).with_base_url("demo.anomalo.com");
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_debug_redacts_api_key() {
        let config = GateConfig::new("super-secret-token", 1);
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("super-secret-token"));
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gate.json");
        std::fs::write(
            &path,
            r#"{"api_key": "secret", "test_id": 3, "quarantine_table": "q"}"#,
        )
        .unwrap();

        let config = GateConfig::from_file(&path).unwrap();
        assert_eq!(config.test_id, 3);
        assert_eq!(config.quarantine_table.as_deref(), Some("q"));
        assert_eq!(config.base_url, "https://demo.anomalo.com");
        assert!(config.results_path.is_some());
    }

    #[test]
    fn test_from_file_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gate.json");
        std::fs::write(&path, "not json").unwrap();

        let err = GateConfig::from_file(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }
}
