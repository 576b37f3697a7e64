//! Launching or connecting to the Chromium instance that hosts the portal page.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chromiumoxide::handler::HandlerConfig;
use chromiumoxide::{Browser, BrowserConfig as CdpConfig};
use futures::StreamExt;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::{BrowserError, ChromiumPage};
use crate::config::BrowserConfig;

/// Common Chrome executable paths to check.
const CHROME_PATHS: &[&str] = &[
    // Linux
    "/usr/bin/google-chrome",
    "/usr/bin/google-chrome-stable",
    "/usr/bin/chromium",
    "/usr/bin/chromium-browser",
    "/snap/bin/chromium",
    // macOS
    "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
    "/Applications/Chromium.app/Contents/MacOS/Chromium",
    // Windows
    r"C:\Program Files\Google\Chrome\Application\chrome.exe",
    r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe",
    // Common install locations
    "/opt/google/chrome/google-chrome",
];

const CHROME_COMMANDS: &[&str] = &[
    "google-chrome",
    "google-chrome-stable",
    "chromium",
    "chromium-browser",
    "chrome",
];

/// A running (or connected) browser plus the task pumping its CDP handler.
pub struct BrowserSession {
    browser: Browser,
    handler: JoinHandle<()>,
    request_timeout: Duration,
}

impl BrowserSession {
    /// Launch a local browser, or connect to `remote_url` when configured.
    pub async fn start(config: &BrowserConfig) -> Result<Self, BrowserError> {
        match &config.remote_url {
            Some(url) => Self::connect_remote(config, url).await,
            None => Self::launch(config).await,
        }
    }

    async fn launch(config: &BrowserConfig) -> Result<Self, BrowserError> {
        info!("Launching browser (headless={})", config.headless);
        let chrome_path = find_chrome(config.executable.as_deref())?;

        let mut builder = CdpConfig::builder()
            .chrome_executable(chrome_path)
            .request_timeout(Duration::from_secs(config.request_timeout_secs));

        // with_head means NOT headless
        if !config.headless {
            builder = builder.with_head().window_size(1280, 900);
        }

        if let Some(ref proxy) = config.proxy {
            builder = builder.arg(format!("--proxy-server={}", proxy));
        }

        builder = builder
            .arg("--disable-blink-features=AutomationControlled")
            .arg("--disable-infobars")
            .arg("--disable-dev-shm-usage")
            .arg("--no-first-run")
            .arg("--no-default-browser-check")
            .arg("--disable-popup-blocking")
            .arg("--disable-translate");

        if config.headless {
            builder = builder.arg("--no-sandbox").arg("--disable-gpu");
        }

        for arg in &config.chrome_args {
            builder = builder.arg(arg);
        }

        let cdp_config = builder.build().map_err(BrowserError::Launch)?;
        let (browser, handler) = Browser::launch(cdp_config)
            .await
            .map_err(|e| BrowserError::Launch(e.to_string()))?;

        Ok(Self {
            browser,
            handler: spawn_handler(handler),
            request_timeout: Duration::from_secs(config.request_timeout_secs),
        })
    }

    /// Connect to a remote Chrome instance through its `/json/version` endpoint.
    async fn connect_remote(config: &BrowserConfig, url: &str) -> Result<Self, BrowserError> {
        info!(
            "Connecting to remote browser at {} (timeout: {}s)",
            url, config.request_timeout_secs
        );
        let connect_error = |message: String| BrowserError::Connect {
            url: url.to_string(),
            message,
        };

        let http_url = url
            .replace("ws://", "http://")
            .replace("wss://", "https://");
        let version_url = format!("{}/json/version", http_url.trim_end_matches('/'));

        let resp: serde_json::Value = reqwest::Client::new()
            .get(&version_url)
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .send()
            .await
            .map_err(|e| connect_error(e.to_string()))?
            .json()
            .await
            .map_err(|e| connect_error(format!("invalid version info: {}", e)))?;

        let ws_url = resp
            .get("webSocketDebuggerUrl")
            .and_then(|v| v.as_str())
            .ok_or_else(|| connect_error("no webSocketDebuggerUrl in response".to_string()))?;

        info!("Connecting to WebSocket: {}", ws_url);

        let handler_config = HandlerConfig {
            request_timeout: Duration::from_secs(config.request_timeout_secs),
            ..Default::default()
        };

        let (browser, handler) = Browser::connect_with_config(ws_url, handler_config)
            .await
            .map_err(|e| connect_error(e.to_string()))?;

        Ok(Self {
            browser,
            handler: spawn_handler(handler),
            request_timeout: Duration::from_secs(config.request_timeout_secs),
        })
    }

    /// Open the page the checker will drive.
    pub async fn open_page(&self) -> Result<ChromiumPage, BrowserError> {
        let page = self
            .browser
            .new_page("about:blank")
            .await
            .map_err(|e| BrowserError::Launch(format!("could not open page: {}", e)))?;
        ChromiumPage::attach(page, self.request_timeout).await
    }

    /// Close the browser and stop the handler task.
    pub async fn close(mut self) {
        if let Err(e) = self.browser.close().await {
            debug!("Browser close: {}", e);
        }
        self.handler.abort();
    }
}

fn spawn_handler(mut handler: chromiumoxide::Handler) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(h) = handler.next().await {
            if let Err(e) = h {
                warn!("Browser connection closed: {}", e);
                break;
            }
        }
    })
}

/// Find a Chrome executable: explicit path, well-known locations, then `PATH`.
pub(crate) fn find_chrome(explicit: Option<&Path>) -> Result<PathBuf, BrowserError> {
    if let Some(path) = explicit {
        if path.exists() {
            return Ok(path.to_path_buf());
        }
        warn!("Configured browser executable {} not found", path.display());
    }

    for path in CHROME_PATHS {
        let p = Path::new(path);
        if p.exists() {
            info!("Found Chrome at: {}", path);
            return Ok(p.to_path_buf());
        }
    }

    for cmd in CHROME_COMMANDS {
        if let Ok(path) = which::which(cmd) {
            info!("Found Chrome in PATH: {}", path.display());
            return Ok(path);
        }
    }

    Err(BrowserError::ExecutableNotFound)
}
