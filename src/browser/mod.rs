//! Page driver for the portal's lookup form.
//!
//! A driver runs JavaScript in a single page and reports back through an
//! event queue: script results and page-load outcomes both arrive as
//! [`DriverEvent`]s, never as return values. The fetch state machine is the
//! only consumer and tags every script with a [`Ticket`] so that results
//! belonging to an older context can be recognised and dropped.
//!
//! Two drivers exist: [`ChromiumPage`] (CDP via chromiumoxide, behind the
//! `browser` feature) and [`ScriptedPage`], which answers scripts locally and
//! backs both simulation mode and the tests.

mod gate;
mod scripted;
mod scripts;

#[cfg(feature = "browser")]
mod chromium;
#[cfg(feature = "browser")]
mod frames;
#[cfg(feature = "browser")]
mod launch;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;

pub use gate::{open_target, PageReadiness};
pub use scripted::{Scripted, ScriptedPage};
pub use scripts::{escape_js_string, PageScripts, LINK_HANDLER_SCRIPT};

#[cfg(feature = "browser")]
pub use chromium::ChromiumPage;
#[cfg(feature = "browser")]
pub use launch::BrowserSession;

/// What a dispatched script is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScriptKind {
    /// Writes the code into the input field.
    Input,
    /// Clicks the search button.
    Click,
    /// Reads the first result-table row.
    Extract,
}

impl std::fmt::Display for ScriptKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Input => write!(f, "input"),
            Self::Click => write!(f, "click"),
            Self::Extract => write!(f, "extract"),
        }
    }
}

/// Identity of a dispatched script.
///
/// `generation` changes with every fetch attempt, so two tickets are equal
/// only when they were issued for the same code in the same attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ticket {
    pub generation: u64,
    pub code: String,
    pub kind: ScriptKind,
}

/// Result of a script: the JSON value it evaluated to, or the exception text.
pub type ScriptOutcome = Result<Value, String>;

/// Asynchronous notifications from a driver.
#[derive(Debug, Clone, PartialEq)]
pub enum DriverEvent {
    ScriptFinished {
        ticket: Ticket,
        outcome: ScriptOutcome,
    },
    PageLoad {
        ok: bool,
        url: Option<String>,
    },
}

/// Errors raised by the browser layer itself.
#[derive(Debug, thiserror::Error)]
pub enum BrowserError {
    #[error("Chrome/Chromium not found; install it or set browser.executable")]
    ExecutableNotFound,
    #[error("failed to launch browser: {0}")]
    Launch(String),
    #[error("failed to connect to remote browser at {url}: {message}")]
    Connect { url: String, message: String },
    #[error("navigation to {url} failed: {message}")]
    Navigation { url: String, message: String },
    #[error("could not dispatch {kind} script: {message}")]
    Dispatch { kind: ScriptKind, message: String },
    #[error("browser support not compiled in; rebuild with --features browser")]
    Unsupported,
}

/// A single browser page that runs scripts asynchronously.
#[async_trait]
pub trait PageDriver: Send {
    /// Begin navigating to `url`. Success or failure arrives later as a
    /// [`DriverEvent::PageLoad`].
    async fn load(&mut self, url: &str) -> Result<(), BrowserError>;

    /// Queue `script` for evaluation. Returns as soon as it is queued; the
    /// outcome arrives as [`DriverEvent::ScriptFinished`] carrying `ticket`.
    fn run_script(&mut self, ticket: Ticket, script: String) -> Result<(), BrowserError>;

    /// Wait for the next event. `None` once the driver has shut down.
    async fn next_event(&mut self) -> Option<DriverEvent>;

    /// Take the next event if one is already queued.
    fn try_next_event(&mut self) -> Option<DriverEvent>;
}

/// Event queue shared by the driver implementations.
pub(crate) struct EventQueue {
    tx: mpsc::UnboundedSender<DriverEvent>,
    rx: mpsc::UnboundedReceiver<DriverEvent>,
}

impl EventQueue {
    pub(crate) fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self { tx, rx }
    }

    pub(crate) fn sender(&self) -> mpsc::UnboundedSender<DriverEvent> {
        self.tx.clone()
    }

    pub(crate) fn push(&self, event: DriverEvent) {
        // The receiver lives in `self`, so this only fails during teardown.
        let _ = self.tx.send(event);
    }

    pub(crate) async fn recv(&mut self) -> Option<DriverEvent> {
        self.rx.recv().await
    }

    pub(crate) fn try_recv(&mut self) -> Option<DriverEvent> {
        self.rx.try_recv().ok()
    }
}
