//! Fetch timing, budget and page-script configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Row selector of the portal's result table.
pub const DEFAULT_RESULT_ROW_SELECTOR: &str = "#risultatiConsultazionePratica tbody tr";

/// Settings that drive one code through the lookup form.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FetchConfig {
    /// Retries after the first attempt; total attempts = `max_retries + 1`.
    pub max_retries: u32,

    /// Polling budget per attempt, measured from the first poll.
    pub poll_timeout_ms: u64,

    /// Gap between two polls of the result table.
    pub poll_interval_ms: u64,

    /// Settle time between writing the code and clicking search.
    pub post_input_delay_ms: u64,

    /// Settle time between clicking search and the first poll.
    pub post_click_delay_ms: u64,

    /// Back-off before a new attempt.
    pub retry_delay_ms: u64,

    /// Consecutive `null` polls after which the table is considered missing.
    pub null_check_ceiling: u32,

    /// CSS selector of the first result-table row.
    pub result_row_selector: String,

    /// Cell extraction script. Built from `result_row_selector` when unset.
    pub cells_script: Option<String>,

    /// `id` of the code input field.
    pub input_element_id: String,

    /// `id` of the search button.
    pub search_button_id: String,

    /// Text of the single-cell row the portal shows when nothing matches.
    pub no_data_phrase: String,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            poll_timeout_ms: 10_000,
            poll_interval_ms: 100,
            post_input_delay_ms: 100,
            post_click_delay_ms: 1_000,
            retry_delay_ms: 1_000,
            null_check_ceiling: 5,
            result_row_selector: DEFAULT_RESULT_ROW_SELECTOR.to_string(),
            cells_script: None,
            input_element_id: "codiceRichiesta".to_string(),
            search_button_id: "cercaRichiestaNullaOstaBtn".to_string(),
            no_data_phrase: "Nessun dato presente".to_string(),
        }
    }
}

impl FetchConfig {
    /// Apply environment variable overrides.
    ///
    /// - `NSIS_MAX_RETRIES` - retry budget
    /// - `NSIS_POLL_TIMEOUT_MS` - per-attempt polling budget
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(value) = env_number("NSIS_MAX_RETRIES") {
            self.max_retries = value;
        }
        if let Some(value) = env_number("NSIS_POLL_TIMEOUT_MS") {
            self.poll_timeout_ms = value;
        }
        self
    }

    pub fn total_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn post_input_delay(&self) -> Duration {
        Duration::from_millis(self.post_input_delay_ms)
    }

    pub fn post_click_delay(&self) -> Duration {
        Duration::from_millis(self.post_click_delay_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

fn env_number<T: std::str::FromStr>(name: &str) -> Option<T> {
    let raw = std::env::var(name).ok()?;
    match raw.trim().parse() {
        Ok(value) => {
            tracing::debug!("{} override: {}", name, raw);
            Some(value)
        }
        Err(_) => {
            tracing::warn!("Ignoring {}={:?}: not a number", name, raw);
            None
        }
    }
}
