//! CDP-backed page driver.
//!
//! chromiumoxide's handler task owns the DevTools socket; every call here is
//! a message to that task. Script evaluations run as detached tasks and
//! hand their outcome back through the page's event queue.

use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::network::{
    EventLoadingFailed, EventLoadingFinished, EventRequestWillBeSent, ResourceType,
};
use chromiumoxide::cdp::browser_protocol::page::{
    AddScriptToEvaluateOnNewDocumentParams, EventLoadEventFired, NavigateParams,
};
use chromiumoxide::cdp::js_protocol::runtime::EventConsoleApiCalled;
use chromiumoxide::Page;
use futures::StreamExt;
use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::frames::MainFrameRequests;
use super::scripts::LINK_HANDLER_SCRIPT;
use super::{BrowserError, DriverEvent, EventQueue, PageDriver, ScriptOutcome, Ticket};

/// The portal page inside a Chromium tab.
pub struct ChromiumPage {
    page: Page,
    queue: EventQueue,
    listeners: Vec<JoinHandle<()>>,
    request_timeout: Duration,
}

impl ChromiumPage {
    /// Wire page events into the queue and register the link handler.
    pub(crate) async fn attach(page: Page, request_timeout: Duration) -> Result<Self, BrowserError> {
        let setup_error = |e: chromiumoxide::error::CdpError| {
            BrowserError::Launch(format!("page setup failed: {}", e))
        };

        page.execute(AddScriptToEvaluateOnNewDocumentParams::new(
            LINK_HANDLER_SCRIPT,
        ))
        .await
        .map_err(setup_error)?;

        let queue = EventQueue::new();
        let mut listeners = Vec::new();

        let mut loads = page
            .event_listener::<EventLoadEventFired>()
            .await
            .map_err(setup_error)?;
        let tx = queue.sender();
        let load_page = page.clone();
        listeners.push(tokio::spawn(async move {
            while loads.next().await.is_some() {
                let url = load_page.url().await.ok().flatten();
                debug!("Page loaded: {:?}", url);
                if tx.send(DriverEvent::PageLoad { ok: true, url }).is_err() {
                    break;
                }
            }
        }));

        let main_frame = page
            .mainframe()
            .await
            .map_err(setup_error)?
            .map(|frame| frame.inner().clone());
        let mut sent = page
            .event_listener::<EventRequestWillBeSent>()
            .await
            .map_err(setup_error)?;
        let mut finished = page
            .event_listener::<EventLoadingFinished>()
            .await
            .map_err(setup_error)?;
        let mut failures = page
            .event_listener::<EventLoadingFailed>()
            .await
            .map_err(setup_error)?;
        let tx = queue.sender();
        listeners.push(tokio::spawn(async move {
            let mut requests = MainFrameRequests::new(main_frame);
            loop {
                tokio::select! {
                    Some(event) = sent.next() => {
                        requests.observe_request(
                            event.frame_id.as_ref().map(|frame| frame.inner().as_str()),
                            event.r#type == Some(ResourceType::Document),
                            event.request_id.inner(),
                        );
                    }
                    Some(event) = finished.next() => {
                        requests.observe_finished(event.request_id.inner());
                    }
                    Some(event) = failures.next() => {
                        let is_page = requests.is_main_frame_failure(
                            event.request_id.inner(),
                            event.r#type == ResourceType::Document,
                            event.canceled.unwrap_or(false),
                        );
                        if !is_page {
                            debug!("Ignoring failed subresource: {}", event.error_text);
                            continue;
                        }
                        warn!("Document load failed: {}", event.error_text);
                        if tx.send(DriverEvent::PageLoad { ok: false, url: None }).is_err() {
                            break;
                        }
                    }
                    else => break,
                }
            }
        }));

        let mut console = page
            .event_listener::<EventConsoleApiCalled>()
            .await
            .map_err(setup_error)?;
        listeners.push(tokio::spawn(async move {
            while let Some(event) = console.next().await {
                let text: Vec<String> = event
                    .args
                    .iter()
                    .filter_map(|arg| arg.value.as_ref().map(|v| v.to_string()))
                    .collect();
                debug!(target: "nsis_status::page", "console.{:?}: {}", event.r#type, text.join(" "));
            }
        }));

        Ok(Self {
            page,
            queue,
            listeners,
            request_timeout,
        })
    }
}

#[async_trait]
impl PageDriver for ChromiumPage {
    async fn load(&mut self, url: &str) -> Result<(), BrowserError> {
        info!("Navigating to {}", url);
        let nav_params = NavigateParams::builder()
            .url(url)
            .build()
            .map_err(|message| BrowserError::Navigation {
                url: url.to_string(),
                message,
            })?;

        // Success is reported by the load-event listener; only failures are
        // reported from here.
        let page = self.page.clone();
        let tx = self.queue.sender();
        let timeout = self.request_timeout;
        let url = url.to_string();
        tokio::spawn(async move {
            let failure = match tokio::time::timeout(timeout, page.execute(nav_params)).await {
                Ok(Ok(resp)) => resp.result.error_text.clone(),
                Ok(Err(e)) => Some(e.to_string()),
                Err(_) => Some(format!("timed out after {}s", timeout.as_secs())),
            };
            if let Some(message) = failure {
                warn!("Navigation to {} failed: {}", url, message);
                let _ = tx.send(DriverEvent::PageLoad {
                    ok: false,
                    url: Some(url),
                });
            }
        });
        Ok(())
    }

    fn run_script(&mut self, ticket: Ticket, script: String) -> Result<(), BrowserError> {
        let page = self.page.clone();
        let tx = self.queue.sender();
        let timeout = self.request_timeout;
        tokio::spawn(async move {
            let outcome: ScriptOutcome = match tokio::time::timeout(timeout, page.evaluate(script)).await {
                Ok(Ok(result)) => Ok(result.value().cloned().unwrap_or(Value::Null)),
                Ok(Err(e)) => Err(e.to_string()),
                Err(_) => Err(format!("no answer within {}s", timeout.as_secs())),
            };
            let _ = tx.send(DriverEvent::ScriptFinished { ticket, outcome });
        });
        Ok(())
    }

    async fn next_event(&mut self) -> Option<DriverEvent> {
        self.queue.recv().await
    }

    fn try_next_event(&mut self) -> Option<DriverEvent> {
        self.queue.try_recv()
    }
}

impl Drop for ChromiumPage {
    fn drop(&mut self) {
        for listener in &self.listeners {
            listener.abort();
        }
    }
}
