use std::path::Path;

use calamine::{open_workbook_auto, Data, Range, Reader};
use tracing::{debug, info};

use super::WorkbookError;

/// Read the codes below the `search_column` header of the first sheet.
///
/// The header is matched case-insensitively on trimmed text. Empty cells
/// and cells reading `nan` are skipped; everything else is trimmed.
pub fn load_codes(path: &Path, search_column: &str) -> Result<Vec<String>, WorkbookError> {
    let range = first_sheet(path)?;
    let column = find_header(&range, search_column).ok_or_else(|| WorkbookError::MissingColumn {
        path: path.to_path_buf(),
        column: search_column.to_string(),
    })?;

    let codes: Vec<String> = range
        .rows()
        .skip(1)
        .filter_map(|row| row.get(column).map(cell_text))
        .map(|text| text.trim().to_string())
        .filter(|text| !text.is_empty() && !text.eq_ignore_ascii_case("nan"))
        .collect();

    info!("Loaded {} codes from {:?}", codes.len(), path);
    Ok(codes)
}

fn first_sheet(path: &Path) -> Result<Range<Data>, WorkbookError> {
    let open_error = |message: String| WorkbookError::Open {
        path: path.to_path_buf(),
        message,
    };

    let mut workbook = open_workbook_auto(path).map_err(|e| open_error(e.to_string()))?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| WorkbookError::EmptySheet {
            path: path.to_path_buf(),
        })?
        .map_err(|e| open_error(e.to_string()))?;

    if range.is_empty() {
        return Err(WorkbookError::EmptySheet {
            path: path.to_path_buf(),
        });
    }
    debug!("First sheet of {:?} spans {:?}", path, range.get_size());
    Ok(range)
}

fn find_header(range: &Range<Data>, name: &str) -> Option<usize> {
    let wanted = name.trim().to_lowercase();
    range
        .rows()
        .next()?
        .iter()
        .position(|cell| cell_text(cell).trim().to_lowercase() == wanted)
}

/// Text of a cell as the user sees it. Whole numbers lose their `.0` so
/// numeric-looking codes come back unchanged.
fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.clone(),
        Data::Float(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", *f as i64),
        other => other.to_string(),
    }
}

/// `(search, other)` pairs for every data row, for checking written files.
#[cfg(test)]
pub(crate) fn read_column_pairs(
    path: &Path,
    search_column: &str,
    other_column: &str,
) -> Result<Vec<(String, String)>, WorkbookError> {
    let range = first_sheet(path)?;
    let missing = |column: &str| WorkbookError::MissingColumn {
        path: path.to_path_buf(),
        column: column.to_string(),
    };
    let search = find_header(&range, search_column).ok_or_else(|| missing(search_column))?;
    let other = find_header(&range, other_column).ok_or_else(|| missing(other_column))?;
    Ok(range
        .rows()
        .skip(1)
        .map(|row| {
            let text = |i: usize| row.get(i).map(cell_text).unwrap_or_default();
            (text(search).trim().to_string(), text(other))
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workbook::testing::write_sheet;

    #[test]
    fn test_finds_column_case_insensitively() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("in.xlsx");
        write_sheet(
            &path,
            &["Nome", "  RICERCA "],
            &[vec!["a", " X1 "], vec!["b", ""], vec!["c", "nan"], vec!["d", "X2"]],
        );

        assert_eq!(load_codes(&path, "ricerca").unwrap(), vec!["X1", "X2"]);
    }

    #[test]
    fn test_missing_column() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("in.xlsx");
        write_sheet(&path, &["Codice"], &[vec!["X1"]]);

        let err = load_codes(&path, "ricerca").unwrap_err();
        assert!(matches!(err, WorkbookError::MissingColumn { ref column, .. } if column == "ricerca"));
    }

    #[test]
    fn test_empty_sheet() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.xlsx");
        write_sheet(&path, &[], &[]);

        let err = load_codes(&path, "ricerca").unwrap_err();
        assert!(matches!(err, WorkbookError::EmptySheet { .. }));
    }

    #[test]
    fn test_unreadable_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("not-a-workbook.xlsx");
        std::fs::write(&path, b"plain text").unwrap();

        let err = load_codes(&path, "ricerca").unwrap_err();
        assert!(matches!(err, WorkbookError::Open { .. }));
    }

    #[test]
    fn test_whole_numbers_keep_their_digits() {
        assert_eq!(cell_text(&Data::Float(12345.0)), "12345");
        assert_eq!(cell_text(&Data::Float(1.5)), "1.5");
        assert_eq!(cell_text(&Data::Int(7)), "7");
        assert_eq!(cell_text(&Data::Empty), "");
    }
}
