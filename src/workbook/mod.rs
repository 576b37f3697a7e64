//! Workbook access: the code list comes in through the search column and
//! results go back into the rows they came from.
//!
//! Reading goes through calamine (xlsx, xlsm, xls, ods); writing edits the
//! original xlsx in place with umya-spreadsheet so existing formatting
//! survives.

mod load;
mod save;

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::config::ColumnConfig;
use crate::run::{ResultRecord, ResultStore};

pub use load::load_codes;
pub use save::{fallback_path, save_results};

/// Workbook errors.
#[derive(Debug, thiserror::Error)]
pub enum WorkbookError {
    #[error("could not open {}: {}", .path.display(), .message)]
    Open { path: PathBuf, message: String },

    #[error("{} has no rows in its first sheet", .path.display())]
    EmptySheet { path: PathBuf },

    #[error("column '{}' not found in the header row of {}", .column, .path.display())]
    MissingColumn { path: PathBuf, column: String },

    #[error("{}: only .xlsx and .xlsm workbooks can be written", .path.display())]
    UnsupportedFormat { path: PathBuf },

    #[error("could not write {}: {}", .path.display(), .message)]
    Write { path: PathBuf, message: String },
}

/// Outcome of a save.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveReport {
    /// File actually written; differs from the input on fallback.
    pub path: PathBuf,
    pub rows_written: usize,
    /// Codes with no matching row.
    pub unmatched: Vec<String>,
    /// True when the original was not writable and a copy was created.
    pub fallback: bool,
}

/// A workbook on disk plus its column mapping.
#[derive(Debug, Clone)]
pub struct Workbook {
    path: PathBuf,
    columns: ColumnConfig,
}

impl Workbook {
    pub fn new(path: impl Into<PathBuf>, columns: ColumnConfig) -> Self {
        Self {
            path: path.into(),
            columns,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the codes from the search column.
    ///
    /// Workbooks results cannot be written back to are rejected here, before
    /// any code is looked up.
    pub async fn load_codes(&self) -> Result<Vec<String>, WorkbookError> {
        save::ensure_writable_format(&self.path)?;
        let path = self.path.clone();
        let column = self.columns.search.clone();
        tokio::task::spawn_blocking(move || load_codes(&path, &column))
            .await
            .map_err(|e| WorkbookError::Open {
                path: self.path.clone(),
                message: e.to_string(),
            })?
    }
}

#[async_trait]
impl ResultStore for Workbook {
    async fn save(&mut self, records: &[ResultRecord]) -> Result<SaveReport, WorkbookError> {
        let path = self.path.clone();
        let columns = self.columns.clone();
        let records = records.to_vec();
        tokio::task::spawn_blocking(move || save_results(&path, &columns, &records))
            .await
            .map_err(|e| WorkbookError::Write {
                path: self.path.clone(),
                message: e.to_string(),
            })?
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::{FetchResult, FetchState, ResultRow};

    fn record(code: &str, state: FetchState) -> ResultRecord {
        ResultRecord::from_fetch(&FetchResult {
            code: code.to_string(),
            state,
            cells: ResultRow::placeholder(code),
            attempts: 1,
        })
    }

    #[tokio::test]
    async fn test_unwritable_formats_rejected_on_load() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["codes.ods", "codes.xls", "codes.csv"] {
            let path = dir.path().join(name);
            std::fs::write(&path, b"ricerca\nX1\n").unwrap();

            let err = Workbook::new(&path, ColumnConfig::default())
                .load_codes()
                .await
                .unwrap_err();
            assert!(
                matches!(err, WorkbookError::UnsupportedFormat { .. }),
                "{}: {:?}",
                name,
                err
            );
        }
    }

    #[tokio::test]
    async fn test_round_trip_through_workbook() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("codes.xlsx");
        testing::write_sheet(
            &path,
            &["Ricerca"],
            &[vec!["N1"], vec!["N2"], vec!["N3"], vec!["00123"]],
        );

        let mut workbook = Workbook::new(&path, ColumnConfig::default());
        let codes = workbook.load_codes().await.unwrap();
        assert_eq!(codes, vec!["N1", "N2", "N3", "00123"]);

        let states = ["CHIUSA", "APERTA", "INVIATA", "ANNULLATA"];
        let records: Vec<ResultRecord> = codes
            .iter()
            .zip(states)
            .map(|(code, state)| record(code, FetchState::Reported(state.to_string())))
            .collect();
        let report = workbook.save(&records).await.unwrap();
        assert_eq!(report.rows_written, 4);
        assert!(!report.fallback);

        let statuses = load::read_column_pairs(&path, "ricerca", "stato").unwrap();
        for (code, state) in codes.iter().zip(states) {
            assert!(
                statuses.contains(&(code.clone(), state.to_string())),
                "{} -> {} missing from {:?}",
                code,
                state,
                statuses
            );
        }
    }
}
