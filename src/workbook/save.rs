use std::collections::HashMap;
use std::fs::OpenOptions;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::Local;
use tracing::{debug, info, warn};
use umya_spreadsheet::{NumberingFormat, Spreadsheet, Worksheet, XlsxError};

use super::{SaveReport, WorkbookError};
use crate::config::ColumnConfig;
use crate::run::ResultRecord;

/// Positions in [`ColumnConfig::outputs`].
const RESULT_CODE_OUTPUT: usize = 4;
const NOTES_OUTPUT: usize = 5;

/// Write `records` back into the rows their codes came from.
///
/// The header row is the first non-empty row of the first sheet, the same
/// row [`load_codes`](super::load_codes) reads codes under. Output columns
/// are found by header; a missing header is created at its default
/// position, or in the next free column when that one is taken. When the
/// original file cannot be written, a timestamped sibling copy is written
/// instead (see [`fallback_path`]).
pub fn save_results(
    path: &Path,
    columns: &ColumnConfig,
    records: &[ResultRecord],
) -> Result<SaveReport, WorkbookError> {
    save_results_with(path, columns, records, |book, target| {
        umya_spreadsheet::writer::xlsx::write(book, target)
    })
}

fn save_results_with<W>(
    path: &Path,
    columns: &ColumnConfig,
    records: &[ResultRecord],
    write: W,
) -> Result<SaveReport, WorkbookError>
where
    W: Fn(&Spreadsheet, &Path) -> Result<(), XlsxError>,
{
    ensure_writable_format(path)?;

    let mut book = umya_spreadsheet::reader::xlsx::read(path).map_err(|e| WorkbookError::Open {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    let (rows_written, unmatched) = fill_sheet(path, &mut book, columns, records)?;
    let (target, fallback) = write_with_fallback(&book, path, write)?;

    info!(
        path = %target.display(),
        rows_written,
        unmatched = unmatched.len(),
        "Workbook saved"
    );
    Ok(SaveReport {
        path: target,
        rows_written,
        unmatched,
        fallback,
    })
}

/// Reject files the writer cannot produce, before any lookup is spent on them.
pub(crate) fn ensure_writable_format(path: &Path) -> Result<(), WorkbookError> {
    if is_writable_format(path) {
        Ok(())
    } else {
        Err(WorkbookError::UnsupportedFormat {
            path: path.to_path_buf(),
        })
    }
}

/// Write every record into the first sheet. Returns the number of rows
/// written and the codes that matched no row.
fn fill_sheet(
    path: &Path,
    book: &mut Spreadsheet,
    columns: &ColumnConfig,
    records: &[ResultRecord],
) -> Result<(usize, Vec<String>), WorkbookError> {
    let sheet = book
        .get_sheet_mut(&0)
        .ok_or_else(|| WorkbookError::EmptySheet {
            path: path.to_path_buf(),
        })?;

    let header = header_row(sheet);
    let mut headers = header_map(sheet, header);
    let search_col = headers
        .get(&normalize(&columns.search))
        .copied()
        .ok_or_else(|| WorkbookError::MissingColumn {
            path: path.to_path_buf(),
            column: columns.search.clone(),
        })?;

    let output_cols: Vec<u32> = columns
        .outputs()
        .iter()
        .map(|column| {
            resolve_output_column(
                sheet,
                &mut headers,
                header,
                &column.header,
                column.default_index + 1,
            )
        })
        .collect();

    let rows = row_map(sheet, search_col, header);
    let mut rows_written = 0;
    let mut unmatched = Vec::new();

    for record in records {
        let Some(&row) = rows.get(&normalize(&record.input_code)) else {
            warn!(code = %record.input_code, "No row matches code; result not written");
            unmatched.push(record.input_code.clone());
            continue;
        };

        for (index, (&col, value)) in output_cols.iter().zip(record.output_values()).enumerate() {
            let value = output_text(index, value, &columns.empty_notes_placeholder);
            sheet.get_cell_mut((col, row)).set_value_string(value);
        }
        set_text_format(sheet, search_col, row);
        set_text_format(sheet, output_cols[RESULT_CODE_OUTPUT], row);
        rows_written += 1;
    }

    for &col in &output_cols {
        fit_column_width(sheet, col);
    }
    Ok((rows_written, unmatched))
}

/// Value written for output `index`; only the notes output gets the placeholder.
fn output_text<'a>(index: usize, value: &'a str, placeholder: &'a str) -> &'a str {
    if index == NOTES_OUTPUT && value.trim().is_empty() {
        placeholder
    } else {
        value
    }
}

/// Write `book` over `path`, or to a [`fallback_path`] copy when the
/// original is not writable. Returns the file written and whether it is the copy.
fn write_with_fallback<W>(
    book: &Spreadsheet,
    path: &Path,
    write: W,
) -> Result<(PathBuf, bool), WorkbookError>
where
    W: Fn(&Spreadsheet, &Path) -> Result<(), XlsxError>,
{
    let write_error = |target: &Path, e: XlsxError| WorkbookError::Write {
        path: target.to_path_buf(),
        message: e.to_string(),
    };

    if is_file_writable(path) {
        match write(book, path) {
            Ok(()) => return Ok((path.to_path_buf(), false)),
            Err(e) if is_permission_denied(&e) => {
                warn!("Writing {} was refused: {}", path.display(), e);
            }
            Err(e) => return Err(write_error(path, e)),
        }
    }

    let copy = fallback_path(path);
    warn!(
        "{} is not writable; saving a copy to {}",
        path.display(),
        copy.display()
    );
    write(book, &copy).map_err(|e| write_error(&copy, e))?;
    Ok((copy, true))
}

fn is_permission_denied(error: &XlsxError) -> bool {
    matches!(error, XlsxError::Io(e) if e.kind() == ErrorKind::PermissionDenied)
}

/// Sibling copy name: `{stem}_output_{YYYYmmdd_HHMMSS}.{ext}`.
pub fn fallback_path(path: &Path) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "results".to_string());
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().into_owned())
        .unwrap_or_else(|| "xlsx".to_string());
    let name = format!(
        "{}_output_{}.{}",
        stem,
        Local::now().format("%Y%m%d_%H%M%S"),
        ext
    );
    path.with_file_name(name)
}

fn is_writable_format(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("xlsx") || e.eq_ignore_ascii_case("xlsm"))
        .unwrap_or(false)
}

fn is_file_writable(path: &Path) -> bool {
    OpenOptions::new().append(true).open(path).is_ok()
}

fn normalize(text: &str) -> String {
    text.trim().to_lowercase()
}

/// First row holding any value; row 1 when the sheet is blank.
///
/// Matches the range start calamine reports when codes are loaded.
fn header_row(sheet: &Worksheet) -> u32 {
    let last_col = sheet.get_highest_column();
    (1..=sheet.get_highest_row())
        .find(|&row| (1..=last_col).any(|col| !sheet.get_value((col, row)).trim().is_empty()))
        .unwrap_or(1)
}

/// Normalized header text to one-based column index, first occurrence wins.
fn header_map(sheet: &Worksheet, header_row: u32) -> HashMap<String, u32> {
    let mut headers = HashMap::new();
    for col in 1..=sheet.get_highest_column() {
        let text = normalize(&sheet.get_value((col, header_row)));
        if !text.is_empty() {
            headers.entry(text).or_insert(col);
        }
    }
    headers
}

/// Normalized code to one-based row index, first occurrence wins.
fn row_map(sheet: &Worksheet, search_col: u32, header_row: u32) -> HashMap<String, u32> {
    let mut rows = HashMap::new();
    for row in header_row + 1..=sheet.get_highest_row() {
        let code = normalize(&sheet.get_value((search_col, row)));
        if !code.is_empty() {
            rows.entry(code).or_insert(row);
        }
    }
    rows
}

fn resolve_output_column(
    sheet: &mut Worksheet,
    headers: &mut HashMap<String, u32>,
    header_row: u32,
    header: &str,
    default_col: u32,
) -> u32 {
    let key = normalize(header);
    if let Some(&col) = headers.get(&key) {
        return col;
    }

    let claimed = |col: u32, headers: &HashMap<String, u32>| {
        headers.values().any(|&c| c == col)
            || !sheet.get_value((col, header_row)).trim().is_empty()
    };
    let col = if claimed(default_col, headers) {
        let mut col = sheet.get_highest_column().max(1) + 1;
        while claimed(col, headers) {
            col += 1;
        }
        col
    } else {
        default_col
    };

    debug!(header, col, header_row, "Creating missing output column");
    sheet.get_cell_mut((col, header_row)).set_value_string(header);
    sheet.get_style_mut((col, header_row)).get_font_mut().set_bold(true);
    headers.insert(key, col);
    col
}

fn set_text_format(sheet: &mut Worksheet, col: u32, row: u32) {
    sheet
        .get_style_mut((col, row))
        .get_number_format_mut()
        .set_format_code(NumberingFormat::FORMAT_TEXT);
}

fn fit_column_width(sheet: &mut Worksheet, col: u32) {
    let longest = (1..=sheet.get_highest_row())
        .map(|row| sheet.get_value((col, row)).chars().count())
        .max()
        .unwrap_or(0);
    sheet
        .get_column_dimension_mut(&column_letter(col))
        .set_width(longest as f64 + 2.0);
}

/// One-based column index to its letter name: 1 -> A, 27 -> AA.
fn column_letter(mut col: u32) -> String {
    let mut letters = Vec::new();
    while col > 0 {
        let rem = (col - 1) % 26;
        letters.push(char::from(b'A' + rem as u8));
        col = (col - 1) / 26;
    }
    letters.iter().rev().collect()
}
