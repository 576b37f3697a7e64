//! Per-code fetch state machine.

use serde_json::Value;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::context::{FetchContext, StopFlag};
use super::poll::{classify_poll, PollVerdict};
use super::state::{FetchResult, FetchState};
use crate::browser::{DriverEvent, PageDriver, PageScripts, ScriptKind};
use crate::config::FetchConfig;
use crate::run::RunEvent;

/// Steps of one attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    InputtingCode,
    AwaitingClickDelay,
    Clicking,
    AwaitingFirstCheckDelay,
    Polling,
    RetryScheduled,
}

enum Step {
    Go(Phase),
    Resolve(FetchState),
}

/// Answer to a dispatched script.
enum Reply {
    Value(Value),
    /// The script failed, threw or did not answer in time.
    Failed(String),
    /// A stop request or page-load failure arrived; the caller re-checks.
    Escalated,
}

/// Drives codes through the lookup form one at a time.
pub struct FetchMachine<D> {
    driver: D,
    config: FetchConfig,
    scripts: PageScripts,
    stop: StopFlag,
    events: Option<mpsc::Sender<RunEvent>>,
    next_generation: u64,
}

impl<D: PageDriver> FetchMachine<D> {
    pub fn new(driver: D, config: FetchConfig, stop: StopFlag) -> Self {
        let scripts = PageScripts::new(&config);
        Self {
            driver,
            config,
            scripts,
            stop,
            events: None,
            next_generation: 0,
        }
    }

    /// Publish status updates on `events`.
    pub fn with_events(mut self, events: mpsc::Sender<RunEvent>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    pub fn driver_mut(&mut self) -> &mut D {
        &mut self.driver
    }

    pub fn into_driver(self) -> D {
        self.driver
    }

    pub fn stop_flag(&self) -> &StopFlag {
        &self.stop
    }

    /// Resolve `code` to exactly one [`FetchResult`].
    pub async fn fetch(&mut self, code: &str) -> FetchResult {
        let generation = self.issue_generation();
        let mut ctx = FetchContext::new(code.trim(), generation);
        self.discard_pending();
        info!(code = %ctx.code, generation, "Fetch started");

        let mut phase = Phase::InputtingCode;
        loop {
            self.collect_events(&mut ctx);
            if let Some(state) = self.escape(&ctx) {
                return self.resolve(ctx, state).await;
            }

            let step = match phase {
                Phase::InputtingCode => self.input(&mut ctx).await,
                Phase::AwaitingClickDelay => {
                    tokio::time::sleep(self.config.post_input_delay()).await;
                    Step::Go(Phase::Clicking)
                }
                Phase::Clicking => self.click(&mut ctx).await,
                Phase::AwaitingFirstCheckDelay => {
                    tokio::time::sleep(self.config.post_click_delay()).await;
                    ctx.begin_polling(Instant::now());
                    Step::Go(Phase::Polling)
                }
                Phase::Polling => self.poll(&mut ctx).await,
                Phase::RetryScheduled => {
                    let generation = self.issue_generation();
                    ctx.next_attempt(generation);
                    if ctx.attempt <= self.config.total_attempts() {
                        info!(code = %ctx.code, attempt = ctx.attempt, "Retrying");
                        tokio::time::sleep(self.config.retry_delay()).await;
                    }
                    Step::Go(Phase::InputtingCode)
                }
            };

            match step {
                Step::Go(next) => phase = next,
                Step::Resolve(state) => return self.resolve(ctx, state).await,
            }
        }
    }

    async fn input(&mut self, ctx: &mut FetchContext) -> Step {
        let total = self.config.total_attempts();
        if ctx.attempt > total {
            let state = ctx.last_failure.take().unwrap_or(FetchState::Timeout);
            warn!(code = %ctx.code, attempts = total, "Attempt budget exhausted");
            return Step::Resolve(state);
        }

        self.status(format!(
            "{}: entering code (attempt {}/{})",
            ctx.code, ctx.attempt, total
        ))
        .await;
        let script = self.scripts.input(&ctx.code);
        let deadline = Instant::now() + self.config.poll_timeout();
        match self.exec(ctx, ScriptKind::Input, script, deadline).await {
            Reply::Value(_) => Step::Go(Phase::AwaitingClickDelay),
            Reply::Escalated => Step::Go(Phase::InputtingCode),
            Reply::Failed(reason) => self.fail_attempt(ctx, Phase::InputtingCode, reason, None),
        }
    }

    async fn click(&mut self, ctx: &mut FetchContext) -> Step {
        self.status(format!("{}: searching", ctx.code)).await;
        let script = self.scripts.click().to_string();
        let deadline = Instant::now() + self.config.poll_timeout();
        match self.exec(ctx, ScriptKind::Click, script, deadline).await {
            Reply::Value(_) => Step::Go(Phase::AwaitingFirstCheckDelay),
            Reply::Escalated => Step::Go(Phase::Clicking),
            Reply::Failed(reason) => self.fail_attempt(ctx, Phase::Clicking, reason, None),
        }
    }

    async fn poll(&mut self, ctx: &mut FetchContext) -> Step {
        let timeout = self.config.poll_timeout();
        if ctx.poll_elapsed(Instant::now()) > timeout {
            let reason = format!("no matching row after {}ms", timeout.as_millis());
            return self.fail_attempt(ctx, Phase::Polling, reason, None);
        }

        ctx.check_count += 1;
        if ctx.check_count == 1 {
            self.status(format!("{}: waiting for result", ctx.code)).await;
        }

        let deadline = ctx.poll_started.unwrap_or_else(Instant::now) + timeout;
        let script = self.scripts.cells().to_string();
        let value = match self.exec(ctx, ScriptKind::Extract, script, deadline).await {
            Reply::Value(value) => value,
            Reply::Escalated => return Step::Go(Phase::Polling),
            Reply::Failed(reason) => {
                return self.fail_attempt(ctx, Phase::Polling, reason, None);
            }
        };

        match classify_poll(&value, &ctx.code, &self.config.no_data_phrase) {
            PollVerdict::Missing => {
                ctx.null_check_count += 1;
                debug!(
                    code = %ctx.code,
                    nulls = ctx.null_check_count,
                    "Result table not present"
                );
                if ctx.null_check_count >= self.config.null_check_ceiling {
                    warn!(code = %ctx.code, attempt = ctx.attempt, "Result table never appeared");
                    return Step::Resolve(FetchState::ElementNotFound);
                }
                self.wait_poll_interval().await;
                Step::Go(Phase::Polling)
            }
            PollVerdict::NoData(row) => {
                ctx.cells = row;
                Step::Resolve(FetchState::NotFound)
            }
            PollVerdict::Matched { state, row } => {
                ctx.cells = row;
                Step::Resolve(state)
            }
            PollVerdict::Pending(_) => {
                ctx.null_check_count = 0;
                self.wait_poll_interval().await;
                Step::Go(Phase::Polling)
            }
            PollVerdict::Unexpected(desc) => {
                let reason = format!("unexpected extraction result {}", desc);
                self.fail_attempt(
                    ctx,
                    Phase::Polling,
                    reason,
                    Some(FetchState::UnexpectedJsResult),
                )
            }
        }
    }

    fn fail_attempt(
        &self,
        ctx: &mut FetchContext,
        phase: Phase,
        reason: String,
        failure: Option<FetchState>,
    ) -> Step {
        warn!(
            code = %ctx.code,
            attempt = ctx.attempt,
            phase = ?phase,
            "Attempt failed: {}",
            reason
        );
        ctx.last_failure = failure;
        Step::Go(Phase::RetryScheduled)
    }

    /// Dispatch a script and wait for its answer, up to `deadline`.
    async fn exec(
        &mut self,
        ctx: &mut FetchContext,
        kind: ScriptKind,
        script: String,
        deadline: Instant,
    ) -> Reply {
        let ticket = ctx.ticket(kind);
        if let Err(e) = self.driver.run_script(ticket, script) {
            return Reply::Failed(e.to_string());
        }

        loop {
            let event = match tokio::time::timeout_at(deadline, self.driver.next_event()).await {
                Ok(Some(event)) => event,
                Ok(None) => return Reply::Failed("browser page closed".to_string()),
                Err(_) => return Reply::Failed(format!("{} script did not answer in time", kind)),
            };

            match event {
                DriverEvent::ScriptFinished { ticket, outcome } if ctx.owns(&ticket) && ticket.kind == kind => {
                    // Accepted even after a stop request; the caller resolves it as interrupted.
                    if self.stop.is_requested() {
                        return Reply::Escalated;
                    }
                    return match outcome {
                        Ok(value) => Reply::Value(value),
                        Err(message) => Reply::Failed(format!("{} script raised: {}", kind, message)),
                    };
                }
                DriverEvent::ScriptFinished { ticket, .. } => {
                    debug!(
                        code = %ctx.code,
                        stale_code = %ticket.code,
                        stale_generation = ticket.generation,
                        "Discarding stale script result"
                    );
                }
                DriverEvent::PageLoad { ok: false, url } => {
                    warn!(code = %ctx.code, url = ?url, "Page load failed during fetch");
                    ctx.page_load_error = true;
                    return Reply::Escalated;
                }
                DriverEvent::PageLoad { ok: true, url } => {
                    debug!(code = %ctx.code, url = ?url, "Page reloaded during {}", kind);
                }
            }
        }
    }

    /// Apply already-queued events to `ctx` without waiting.
    fn collect_events(&mut self, ctx: &mut FetchContext) {
        while let Some(event) = self.driver.try_next_event() {
            match event {
                DriverEvent::PageLoad { ok: false, url } => {
                    warn!(code = %ctx.code, url = ?url, "Page load failed during fetch");
                    ctx.page_load_error = true;
                }
                DriverEvent::PageLoad { ok: true, .. } => {}
                DriverEvent::ScriptFinished { ticket, .. } => {
                    debug!(
                        code = %ctx.code,
                        stale_code = %ticket.code,
                        "Discarding stale script result"
                    );
                }
            }
        }
    }

    /// Drop everything queued before the current context existed.
    fn discard_pending(&mut self) {
        let mut dropped = 0usize;
        while self.driver.try_next_event().is_some() {
            dropped += 1;
        }
        if dropped > 0 {
            debug!(dropped, "Discarded events from a previous fetch");
        }
    }

    fn escape(&self, ctx: &FetchContext) -> Option<FetchState> {
        if self.stop.is_requested() {
            Some(FetchState::Interrupted)
        } else if ctx.page_load_error {
            Some(FetchState::PageLoadError)
        } else {
            None
        }
    }

    async fn resolve(&mut self, ctx: FetchContext, state: FetchState) -> FetchResult {
        info!(
            code = %ctx.code,
            attempt = ctx.attempt,
            polls = ctx.check_count,
            state = %state,
            "Fetch resolved"
        );
        self.status(format!("{}: {}", ctx.code, state)).await;
        FetchResult {
            attempts: ctx.attempt.min(self.config.total_attempts()),
            code: ctx.code,
            state,
            cells: ctx.cells,
        }
    }

    async fn wait_poll_interval(&self) {
        tokio::time::sleep(self.config.poll_interval()).await;
    }

    async fn status(&self, text: String) {
        if let Some(ref events) = self.events {
            let _ = events.send(RunEvent::Status(text)).await;
        }
    }

    fn issue_generation(&mut self) -> u64 {
        self.next_generation += 1;
        self.next_generation
    }
}
