//! NSIS status checker.
//!
//! Reads practice codes from a spreadsheet, looks each one up on the NSIS
//! portal through a Chromium page, and writes the reported state back into
//! the workbook.

pub mod browser;
pub mod cli;
pub mod config;
pub mod fetch;
pub mod run;
pub mod workbook;
