//! Progress events for whatever is displaying a run.

use std::fmt;

use super::classify::{Bucket, ClassificationCounts};
use super::record::ResultRecord;
use crate::workbook::SaveReport;

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// Every code was processed.
    Completed,
    /// A stop request ended the run early.
    Interrupted,
}

impl fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Completed => write!(f, "completed"),
            Self::Interrupted => write!(f, "interrupted"),
        }
    }
}

/// What happened to the results at the end of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveStatus {
    Saved(SaveReport),
    /// Nothing to save.
    Skipped,
    Failed(String),
}

/// Events emitted while a run progresses.
#[derive(Debug, Clone)]
pub enum RunEvent {
    Started {
        total: usize,
    },
    /// Current phase of the code in flight.
    Status(String),
    CodeResolved {
        index: usize,
        total: usize,
        record: ResultRecord,
        bucket: Bucket,
        counts: ClassificationCounts,
    },
    Warning(String),
    Saving {
        records: usize,
    },
    /// Sent exactly once per run, last.
    Finished {
        outcome: RunOutcome,
        counts: ClassificationCounts,
        save: SaveStatus,
    },
}
