use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use super::state::{FetchState, ResultRow};
use crate::browser::{ScriptKind, Ticket};

/// Shared stop request, checked cooperatively between steps.
#[derive(Debug, Clone, Default)]
pub struct StopFlag(Arc<AtomicBool>);

impl StopFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_requested(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Clear a previous request before a new run.
    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// State of the fetch currently in flight.
#[derive(Debug)]
pub struct FetchContext {
    pub code: String,
    /// Changes with every attempt; tickets from older attempts no longer match.
    pub generation: u64,
    /// 1-based attempt number.
    pub attempt: u32,
    pub poll_started: Option<Instant>,
    pub check_count: u32,
    pub null_check_count: u32,
    pub page_load_error: bool,
    /// Reason the previous attempt gave up, when it was not a plain timeout.
    pub last_failure: Option<FetchState>,
    pub cells: ResultRow,
}

impl FetchContext {
    pub fn new(code: &str, generation: u64) -> Self {
        Self {
            code: code.to_string(),
            generation,
            attempt: 1,
            poll_started: None,
            check_count: 0,
            null_check_count: 0,
            page_load_error: false,
            last_failure: None,
            cells: ResultRow::placeholder(code),
        }
    }

    pub fn ticket(&self, kind: ScriptKind) -> Ticket {
        Ticket {
            generation: self.generation,
            code: self.code.clone(),
            kind,
        }
    }

    /// Whether `ticket` was issued by this context's current attempt.
    pub fn owns(&self, ticket: &Ticket) -> bool {
        ticket.generation == self.generation && ticket.code == self.code
    }

    /// Move to the next attempt under a fresh generation.
    pub fn next_attempt(&mut self, generation: u64) {
        self.attempt += 1;
        self.generation = generation;
        self.poll_started = None;
        self.check_count = 0;
        self.null_check_count = 0;
    }

    pub fn begin_polling(&mut self, now: Instant) {
        self.poll_started = Some(now);
        self.check_count = 0;
        self.null_check_count = 0;
    }

    /// Time spent polling in this attempt.
    pub fn poll_elapsed(&self, now: Instant) -> Duration {
        self.poll_started
            .map(|started| now.saturating_duration_since(started))
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stop_flag_is_shared() {
        let flag = StopFlag::new();
        let other = flag.clone();
        assert!(!flag.is_requested());
        other.request();
        assert!(flag.is_requested());
        flag.reset();
        assert!(!other.is_requested());
    }

    #[test]
    fn test_tickets_from_previous_attempt_are_stale() {
        let mut ctx = FetchContext::new("A1", 7);
        let old = ctx.ticket(ScriptKind::Extract);
        assert!(ctx.owns(&old));

        ctx.next_attempt(8);
        assert_eq!(ctx.attempt, 2);
        assert!(!ctx.owns(&old));
        assert!(ctx.owns(&ctx.ticket(ScriptKind::Input)));
    }

    #[test]
    fn test_tickets_for_other_codes_are_stale() {
        let ctx = FetchContext::new("A1", 3);
        let foreign = Ticket {
            generation: 3,
            code: "A2".to_string(),
            kind: ScriptKind::Extract,
        };
        assert!(!ctx.owns(&foreign));
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_elapsed_uses_monotonic_clock() {
        let mut ctx = FetchContext::new("A1", 1);
        assert_eq!(ctx.poll_elapsed(Instant::now()), Duration::ZERO);

        ctx.begin_polling(Instant::now());
        tokio::time::advance(Duration::from_millis(250)).await;
        assert_eq!(ctx.poll_elapsed(Instant::now()), Duration::from_millis(250));
    }
}
