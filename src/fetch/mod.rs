//! Resolution of a single code against the lookup form.
//!
//! An attempt writes the code into the form, clicks search and then polls
//! the result table until it shows the requested code, reports "no data",
//! or the attempt's polling budget runs out. Failed attempts are retried up
//! to the configured budget.

mod context;
mod machine;
mod poll;
mod state;


pub use context::{FetchContext, StopFlag};
pub use machine::{FetchMachine, Phase};
pub use poll::{classify_poll, PollVerdict};
pub use state::{cell, FetchResult, FetchState, ResultRow, ROW_WIDTH};
