//! Configuration management.
//!
//! Every constant the checker depends on (portal URL, fetch timings, page
//! selectors, spreadsheet columns) lives here and can be overridden from a
//! config file or the environment.

mod browser;
mod columns;
mod fetch;

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

pub use browser::BrowserConfig;
pub use columns::{ColumnConfig, OutputColumn};
pub use fetch::FetchConfig;

/// Portal page that hosts the practice lookup form.
pub const DEFAULT_TARGET_URL: &str = "https://www.impresa.gov.it/intro/info/news.html";

/// Name used for config file auto-discovery (`nsis-status.toml`, ...).
pub const CONFIG_NAME: &str = "nsis-status";

/// Errors raised while reading a config file.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse {format} config {path}: {message}")]
    Parse {
        path: PathBuf,
        format: &'static str,
        message: String,
    },
    #[error("invalid target_url '{url}': {message}")]
    InvalidUrl { url: String, message: String },
}

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Page loaded before the first code is checked.
    pub target_url: String,

    /// Fetch timings, budgets and page scripts.
    pub fetch: FetchConfig,

    /// Browser launch/connect settings.
    pub browser: BrowserConfig,

    /// Spreadsheet column mapping.
    pub columns: ColumnConfig,

    /// Path of the file this config was read from.
    #[serde(skip)]
    pub source_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            target_url: DEFAULT_TARGET_URL.to_string(),
            fetch: FetchConfig::default(),
            browser: BrowserConfig::default(),
            columns: ColumnConfig::default(),
            source_path: None,
        }
    }
}

impl Config {
    /// Load configuration, honouring an explicit path first.
    ///
    /// Without an explicit path, `prefer` looks for an `nsis-status` file in
    /// the usual places. A missing or unreadable file falls back to defaults.
    /// Environment overrides are applied last in every case.
    pub async fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let config = match explicit {
            Some(path) => Self::load_from_path(path).await?,
            None => Self::discover().await,
        };
        let config = config.with_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Reject settings that would only fail once the browser is up.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |message: String| ConfigError::InvalidUrl {
            url: self.target_url.clone(),
            message,
        };
        let url = url::Url::parse(&self.target_url).map_err(|e| invalid(e.to_string()))?;
        match url.scheme() {
            "http" | "https" | "file" => Ok(()),
            other => Err(invalid(format!("unsupported scheme '{}'", other))),
        }
    }

    async fn discover() -> Self {
        match prefer::load(CONFIG_NAME).await {
            Ok(pref_config) => match pref_config.source_path() {
                Some(path) => match Self::load_from_path(path).await {
                    Ok(config) => config,
                    Err(e) => {
                        tracing::warn!("Ignoring config file: {}", e);
                        Self::default()
                    }
                },
                None => Self::default(),
            },
            Err(_) => {
                debug!("No config file found, using defaults");
                Self::default()
            }
        }
    }

    /// Load configuration from a specific file path.
    /// The format follows the extension: TOML, YAML, anything else is JSON.
    pub async fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        let contents =
            tokio::fs::read_to_string(path)
                .await
                .map_err(|source| ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })?;

        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("json");
        let parse_error = |format: &'static str, message: String| ConfigError::Parse {
            path: path.to_path_buf(),
            format,
            message,
        };

        let mut config: Config = match ext {
            "toml" => toml::from_str(&contents).map_err(|e| parse_error("TOML", e.to_string()))?,
            "yaml" | "yml" => {
                serde_yaml::from_str(&contents).map_err(|e| parse_error("YAML", e.to_string()))?
            }
            _ => serde_json::from_str(&contents).map_err(|e| parse_error("JSON", e.to_string()))?,
        };

        debug!("Loaded config from {}", path.display());
        config.source_path = Some(path.to_path_buf());
        Ok(config)
    }

    /// Apply environment variable overrides.
    ///
    /// - `NSIS_URL` - portal page to load
    /// - `NSIS_MAX_RETRIES`, `NSIS_POLL_TIMEOUT_MS` - fetch budgets
    /// - `BROWSER_URL`, `NSIS_HEADLESS` - see [`BrowserConfig::with_env_overrides`]
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(url) = std::env::var("NSIS_URL") {
            if !url.is_empty() {
                debug!("NSIS_URL override: {}", url);
                self.target_url = url;
            }
        }
        self.fetch = self.fetch.with_env_overrides();
        self.browser = self.browser.with_env_overrides();
        self
    }

    /// Render the effective configuration as TOML.
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.target_url, DEFAULT_TARGET_URL);
        assert_eq!(config.fetch.max_retries, 2);
        assert_eq!(config.fetch.null_check_ceiling, 5);
        assert_eq!(config.columns.search, "ricerca");
        assert!(config.source_path.is_none());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let toml_str = r#"
            target_url = "https://example.test/form"

            [fetch]
            max_retries = 4
            poll_interval_ms = 250

            [columns]
            search = "Codice"
        "#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.target_url, "https://example.test/form");
        assert_eq!(config.fetch.max_retries, 4);
        assert_eq!(config.fetch.poll_interval_ms, 250);
        assert_eq!(config.fetch.poll_timeout_ms, 10_000);
        assert_eq!(config.columns.search, "Codice");
        assert_eq!(config.columns.status.header, "stato");
    }

    #[test]
    fn test_json_config() {
        let json = r#"{"browser": {"headless": true, "remote_url": "ws://localhost:9222"}}"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert!(config.browser.headless);
        assert_eq!(
            config.browser.remote_url.as_deref(),
            Some("ws://localhost:9222")
        );
        assert_eq!(config.target_url, DEFAULT_TARGET_URL);
    }

    #[tokio::test]
    async fn test_load_from_yaml_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nsis-status.yaml");
        std::fs::write(&path, "fetch:\n  retry_delay_ms: 20\n").unwrap();

        let config = Config::load_from_path(&path).await.unwrap();
        assert_eq!(config.fetch.retry_delay_ms, 20);
        assert_eq!(config.source_path.as_deref(), Some(path.as_path()));
    }

    #[tokio::test]
    async fn test_load_from_path_reports_parse_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.toml");
        std::fs::write(&path, "fetch = [").unwrap();

        let err = Config::load_from_path(&path).await.unwrap_err();
        assert!(matches!(err, ConfigError::Parse { format: "TOML", .. }));
    }

    #[test]
    fn test_validate_rejects_bad_urls() {
        let mut config = Config::default();
        assert!(config.validate().is_ok());

        config.target_url = "not a url".to_string();
        assert!(matches!(config.validate(), Err(ConfigError::InvalidUrl { .. })));

        config.target_url = "ftp://example.org/".to_string();
        assert!(matches!(config.validate(), Err(ConfigError::InvalidUrl { .. })));
    }

    #[test]
    fn test_round_trips_through_toml() {
        let config = Config::default();
        let rendered = config.to_toml().unwrap();
        let parsed: Config = toml::from_str(&rendered).unwrap();
        assert_eq!(parsed, config);
    }
}
