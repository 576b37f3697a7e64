//! Command-line interface for the NSIS status checker.

mod commands;
mod progress;

pub use commands::{is_verbose, run};
