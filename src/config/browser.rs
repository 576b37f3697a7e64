//! Browser launch configuration.
//!
//! These types live here (always compiled) rather than behind
//! `#[cfg(feature = "browser")]` so config parsing works without the browser feature.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Browser configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BrowserConfig {
    /// Run without a visible window. The window is the user's view of the
    /// portal, so this defaults to false.
    #[serde(default)]
    pub headless: bool,

    /// Seconds to wait for the portal's first page load.
    #[serde(default = "default_page_load_timeout")]
    pub page_load_timeout_secs: u64,

    /// Seconds before a single DevTools request is abandoned.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Explicit Chrome/Chromium executable.
    #[serde(default)]
    pub executable: Option<PathBuf>,

    /// Proxy server URL (e.g., "socks5://127.0.0.1:1080").
    #[serde(default)]
    pub proxy: Option<String>,

    /// Additional Chrome arguments.
    #[serde(default)]
    pub chrome_args: Vec<String>,

    /// Remote Chrome DevTools URL (e.g., "ws://localhost:9222").
    /// If set, connects to an existing browser instead of launching one.
    /// Can also be set via BROWSER_URL environment variable.
    #[serde(default)]
    pub remote_url: Option<String>,
}

fn default_page_load_timeout() -> u64 {
    30
}

fn default_request_timeout() -> u64 {
    30
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            headless: false,
            page_load_timeout_secs: default_page_load_timeout(),
            request_timeout_secs: default_request_timeout(),
            executable: None,
            proxy: None,
            chrome_args: Vec::new(),
            remote_url: None,
        }
    }
}

impl BrowserConfig {
    /// Apply environment variable overrides.
    ///
    /// - `BROWSER_URL` - Remote Chrome DevTools URL
    /// - `NSIS_HEADLESS` - `1`/`true` hides the browser window
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(val) = std::env::var("BROWSER_URL") {
            if !val.is_empty() {
                self.remote_url = Some(val);
            }
        }
        if let Ok(val) = std::env::var("NSIS_HEADLESS") {
            self.headless = matches!(val.to_lowercase().as_str(), "1" | "true" | "yes");
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = BrowserConfig::default();
        assert!(!config.headless);
        assert_eq!(config.page_load_timeout_secs, 30);
        assert!(config.executable.is_none());
        assert!(config.remote_url.is_none());
        assert!(config.chrome_args.is_empty());
    }

    #[test]
    fn test_deserialize_empty_object() {
        let config: BrowserConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, BrowserConfig::default());
    }

    #[test]
    fn test_deserialize_full() {
        let json = r#"{
            "headless": true,
            "page_load_timeout_secs": 5,
            "executable": "/opt/chromium/chrome",
            "proxy": "socks5://127.0.0.1:9050",
            "chrome_args": ["--lang=it-IT"]
        }"#;
        let config: BrowserConfig = serde_json::from_str(json).unwrap();
        assert!(config.headless);
        assert_eq!(config.page_load_timeout_secs, 5);
        assert_eq!(config.request_timeout_secs, 30);
        assert_eq!(config.executable, Some(PathBuf::from("/opt/chromium/chrome")));
        assert_eq!(config.proxy.as_deref(), Some("socks5://127.0.0.1:9050"));
        assert_eq!(config.chrome_args, vec!["--lang=it-IT"]);
    }
}
