//! Orchestration of a whole run: codes in, classified records out.

mod classify;
mod events;
mod record;
mod sequencer;


pub use classify::{
    classify, is_known_exception, normalize_state, Bucket, ClassificationCounts,
    KNOWN_EXCEPTION_STATES,
};
pub use events::{RunEvent, RunOutcome, SaveStatus};
pub use record::ResultRecord;
pub use sequencer::{ResultStore, RunReport, Sequencer};
