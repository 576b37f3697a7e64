//! Driver that answers scripts locally instead of running them in a browser.

use async_trait::async_trait;
use serde_json::{json, Value};

use super::scripts::code_from_input_script;
use super::{BrowserError, DriverEvent, EventQueue, PageDriver, ScriptKind, Ticket};

/// How a [`ScriptedPage`] answers one script.
#[derive(Debug, Clone, PartialEq)]
pub enum Scripted {
    /// The script evaluates to this value.
    Value(Value),
    /// The script throws.
    Throw(String),
    /// The script never completes.
    Silent,
    /// The page navigation fails instead of the script completing.
    PageLoadFailed,
}

type Responder = Box<dyn FnMut(&Ticket, &str) -> Scripted + Send>;

/// A page whose script results come from a responder function.
pub struct ScriptedPage {
    responder: Responder,
    queue: EventQueue,
    loaded: Vec<String>,
}

impl ScriptedPage {
    /// Page answered by `responder`, called once per dispatched script.
    pub fn new<F>(responder: F) -> Self
    where
        F: FnMut(&Ticket, &str) -> Scripted + Send + 'static,
    {
        Self {
            responder: Box::new(responder),
            queue: EventQueue::new(),
            loaded: Vec::new(),
        }
    }

    /// Offline stand-in for the portal.
    ///
    /// Each code gets a fixed state derived from its characters, so repeated
    /// runs over the same workbook produce the same results. Codes ending in
    /// `0` come back as "no data".
    pub fn simulated(no_data_phrase: &str) -> Self {
        const STATES: [&str; 5] = ["ANNULLATA", "APERTA", "CHIUSA", "IN LAVORAZIONE", "INVIATA"];
        let no_data_phrase = no_data_phrase.to_string();
        let mut current: Option<String> = None;

        Self::new(move |ticket, script| match ticket.kind {
            ScriptKind::Input => {
                current = code_from_input_script(script);
                Scripted::Value(json!(current.clone().unwrap_or_default()))
            }
            ScriptKind::Click => Scripted::Value(Value::Null),
            ScriptKind::Extract => {
                let Some(code) = current.as_deref() else {
                    return Scripted::Value(Value::Null);
                };
                if code.ends_with('0') {
                    return Scripted::Value(json!([no_data_phrase]));
                }
                let seed: usize = code.bytes().map(usize::from).sum();
                let state = STATES[seed % STATES.len()];
                Scripted::Value(json!([
                    "",
                    "",
                    state,
                    "",
                    "",
                    format!("SIM-{code}"),
                    "Nulla osta simulato",
                    "01/01/2024",
                    code,
                    "",
                    "",
                ]))
            }
        })
    }

    /// URLs passed to [`PageDriver::load`], in order.
    pub fn loaded_urls(&self) -> &[String] {
        &self.loaded
    }

    /// Queue a page-load event as if the browser had reported one.
    pub fn push_page_load(&self, ok: bool) {
        self.queue.push(DriverEvent::PageLoad { ok, url: None });
    }
}

#[async_trait]
impl PageDriver for ScriptedPage {
    async fn load(&mut self, url: &str) -> Result<(), BrowserError> {
        self.loaded.push(url.to_string());
        self.queue.push(DriverEvent::PageLoad {
            ok: true,
            url: Some(url.to_string()),
        });
        Ok(())
    }

    fn run_script(&mut self, ticket: Ticket, script: String) -> Result<(), BrowserError> {
        match (self.responder)(&ticket, &script) {
            Scripted::Value(value) => self.queue.push(DriverEvent::ScriptFinished {
                ticket,
                outcome: Ok(value),
            }),
            Scripted::Throw(message) => self.queue.push(DriverEvent::ScriptFinished {
                ticket,
                outcome: Err(message),
            }),
            Scripted::Silent => {}
            Scripted::PageLoadFailed => self.queue.push(DriverEvent::PageLoad { ok: false, url: None }),
        }
        Ok(())
    }

    async fn next_event(&mut self) -> Option<DriverEvent> {
        self.queue.recv().await
    }

    fn try_next_event(&mut self) -> Option<DriverEvent> {
        self.queue.try_recv()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::PageScripts;
    use crate::config::FetchConfig;

    fn ticket(kind: ScriptKind) -> Ticket {
        Ticket {
            generation: 1,
            code: "ABC123".to_string(),
            kind,
        }
    }

    #[tokio::test]
    async fn test_load_reports_success() {
        let mut page = ScriptedPage::new(|_, _| Scripted::Silent);
        page.load("https://example.test").await.unwrap();
        assert_eq!(page.loaded_urls(), ["https://example.test"]);
        assert_eq!(
            page.next_event().await,
            Some(DriverEvent::PageLoad {
                ok: true,
                url: Some("https://example.test".to_string())
            })
        );
    }

    #[tokio::test]
    async fn test_results_are_delivered_as_events() {
        let mut page = ScriptedPage::new(|_, _| Scripted::Throw("boom".to_string()));
        page.run_script(ticket(ScriptKind::Click), "x".to_string())
            .unwrap();
        match page.try_next_event() {
            Some(DriverEvent::ScriptFinished { ticket: t, outcome }) => {
                assert_eq!(t.kind, ScriptKind::Click);
                assert_eq!(outcome, Err("boom".to_string()));
            }
            other => panic!("unexpected event: {:?}", other),
        }
        assert!(page.try_next_event().is_none());
    }

    #[tokio::test]
    async fn test_simulated_echoes_code() {
        let scripts = PageScripts::new(&FetchConfig::default());
        let mut page = ScriptedPage::simulated("Nessun dato presente");

        page.run_script(ticket(ScriptKind::Input), scripts.input("ABC123"))
            .unwrap();
        page.run_script(ticket(ScriptKind::Extract), scripts.cells().to_string())
            .unwrap();

        let _input = page.try_next_event();
        let Some(DriverEvent::ScriptFinished { outcome: Ok(cells), .. }) = page.try_next_event()
        else {
            panic!("expected extraction result");
        };
        let cells = cells.as_array().unwrap();
        assert_eq!(cells.len(), 11);
        assert_eq!(cells[8], json!("ABC123"));
        assert!(!cells[2].as_str().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_simulated_no_data() {
        let scripts = PageScripts::new(&FetchConfig::default());
        let mut page = ScriptedPage::simulated("Nessun dato presente");
        page.run_script(ticket(ScriptKind::Input), scripts.input("A10"))
            .unwrap();
        page.run_script(ticket(ScriptKind::Extract), scripts.cells().to_string())
            .unwrap();
        let _input = page.try_next_event();
        let Some(DriverEvent::ScriptFinished { outcome, .. }) = page.try_next_event() else {
            panic!("expected extraction result");
        };
        assert_eq!(outcome, Ok(json!(["Nessun dato presente"])));
    }
}
