//! Sequential processing of a code list.

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{error, info, warn};

use super::classify::{classify, ClassificationCounts};
use super::events::{RunEvent, RunOutcome, SaveStatus};
use super::record::ResultRecord;
use crate::browser::PageDriver;
use crate::fetch::{FetchMachine, StopFlag};
use crate::workbook::{SaveReport, WorkbookError};

/// Destination for a run's records.
#[async_trait]
pub trait ResultStore: Send {
    async fn save(&mut self, records: &[ResultRecord]) -> Result<SaveReport, WorkbookError>;
}

/// Everything a run produced.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub outcome: RunOutcome,
    pub records: Vec<ResultRecord>,
    pub counts: ClassificationCounts,
    pub save: SaveStatus,
    pub elapsed: Duration,
}

/// Feeds codes to a [`FetchMachine`] one at a time.
pub struct Sequencer<D> {
    machine: FetchMachine<D>,
    events: Option<mpsc::Sender<RunEvent>>,
}

impl<D: PageDriver> Sequencer<D> {
    pub fn new(machine: FetchMachine<D>) -> Self {
        Self {
            machine,
            events: None,
        }
    }

    /// Publish run and status events on `events`.
    pub fn with_events(mut self, events: mpsc::Sender<RunEvent>) -> Self {
        self.machine = self.machine.with_events(events.clone());
        self.events = Some(events);
        self
    }

    pub fn stop_flag(&self) -> StopFlag {
        self.machine.stop_flag().clone()
    }

    pub fn machine(&self) -> &FetchMachine<D> {
        &self.machine
    }

    /// Process `codes` in order, then hand the records to `store`.
    ///
    /// A stop request takes effect at the next code boundary; the records
    /// gathered so far are still saved.
    pub async fn run<S>(&mut self, codes: &[String], store: &mut S) -> RunReport
    where
        S: ResultStore + ?Sized,
    {
        let started = Instant::now();
        let stop = self.stop_flag();
        let total = codes.len();
        let mut counts = ClassificationCounts::default();
        let mut records = Vec::with_capacity(total);
        let mut outcome = RunOutcome::Completed;

        info!(total, "Run started");
        self.emit(RunEvent::Started { total }).await;

        for (index, code) in codes.iter().enumerate() {
            if stop.is_requested() {
                outcome = RunOutcome::Interrupted;
                break;
            }

            let result = self.machine.fetch(code).await;
            let record = ResultRecord::from_fetch(&result);

            let (bucket, unmapped) = classify(&record.stato);
            if let Some(state) = unmapped {
                warn!(code = %record.input_code, state = %state, "Unmapped state counted as exception");
                self.emit(RunEvent::Warning(format!(
                    "{}: unmapped state '{}' counted as eccezioni",
                    record.input_code, state
                )))
                .await;
            }
            counts.increment(bucket);

            info!(
                index,
                code = %record.input_code,
                state = %record.stato,
                bucket = %bucket,
                attempts = result.attempts,
                "Code processed"
            );
            self.emit(RunEvent::CodeResolved {
                index,
                total,
                record: record.clone(),
                bucket,
                counts,
            })
            .await;
            records.push(record);

            // A stop after the last code leaves nothing to skip.
            if index + 1 < total && stop.is_requested() {
                outcome = RunOutcome::Interrupted;
                break;
            }
        }

        if outcome == RunOutcome::Interrupted {
            info!(processed = records.len(), total, "Run interrupted");
        }

        let save = self.save(&records, store).await;
        self.emit(RunEvent::Finished {
            outcome,
            counts,
            save: save.clone(),
        })
        .await;

        RunReport {
            outcome,
            records,
            counts,
            save,
            elapsed: started.elapsed(),
        }
    }

    async fn save<S>(&self, records: &[ResultRecord], store: &mut S) -> SaveStatus
    where
        S: ResultStore + ?Sized,
    {
        if records.is_empty() {
            return SaveStatus::Skipped;
        }

        self.emit(RunEvent::Saving {
            records: records.len(),
        })
        .await;
        match store.save(records).await {
            Ok(report) => {
                info!(path = %report.path.display(), rows = report.rows_written, "Results saved");
                SaveStatus::Saved(report)
            }
            Err(e) => {
                error!("Saving results failed: {}", e);
                SaveStatus::Failed(e.to_string())
            }
        }
    }

    async fn emit(&self, event: RunEvent) {
        if let Some(ref events) = self.events {
            let _ = events.send(event).await;
        }
    }
}
