//! Terminal states and result rows.

use std::fmt;

/// Number of cells in a result-table row.
pub const ROW_WIDTH: usize = 11;

/// Positions in a result-table row.
pub mod cell {
    pub const STATUS: usize = 2;
    pub const PROTOCOL: usize = 5;
    pub const MEASURE: usize = 6;
    pub const MEASURE_DATE: usize = 7;
    pub const CODE: usize = 8;
    pub const NOTES: usize = 10;
}

/// One scraped result-table row, always [`ROW_WIDTH`] trimmed cells.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultRow(Vec<String>);

impl ResultRow {
    /// Row used until the portal answers: empty apart from the echoed code.
    pub fn placeholder(code: &str) -> Self {
        let mut cells = vec![String::new(); ROW_WIDTH];
        cells[cell::CODE] = code.to_string();
        Self(cells)
    }

    /// Trim every cell and pad short rows with empty strings.
    pub fn from_cells<I, S>(cells: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut cells: Vec<String> = cells
            .into_iter()
            .map(|c| c.as_ref().trim().to_string())
            .collect();
        if cells.len() < ROW_WIDTH {
            cells.resize(ROW_WIDTH, String::new());
        }
        Self(cells)
    }

    /// Cell text, empty when the row is shorter than `index`.
    pub fn get(&self, index: usize) -> &str {
        self.0.get(index).map(String::as_str).unwrap_or("")
    }

    pub(crate) fn set(&mut self, index: usize, value: &str) {
        if let Some(slot) = self.0.get_mut(index) {
            *slot = value.to_string();
        }
    }

    pub fn cells(&self) -> &[String] {
        &self.0
    }
}

/// How a fetch ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchState {
    /// Status text shown by the portal for the code.
    Reported(String),
    /// The portal answered with its "no data" row.
    NotFound,
    /// The row matched the code but its status cell was blank.
    Unknown,
    /// Every attempt ran out without a matching row.
    Timeout,
    /// The page failed to load while the fetch was running.
    PageLoadError,
    /// The result table never appeared.
    ElementNotFound,
    /// The extraction script returned something other than a list or null.
    UnexpectedJsResult,
    /// A stop was requested.
    Interrupted,
}

impl FetchState {
    pub fn label(&self) -> &str {
        match self {
            Self::Reported(text) => text,
            Self::NotFound => "Non Trovato",
            Self::Unknown => "Sconosciuto",
            Self::Timeout => "Errore Timeout",
            Self::PageLoadError => "Errore Caricamento Pagina",
            Self::ElementNotFound => "Elemento Non Trovato (JS)",
            Self::UnexpectedJsResult => "Errore Risultato JS",
            Self::Interrupted => "Interrotto",
        }
    }

    /// True for states produced by the checker rather than read from the portal.
    pub fn is_internal(&self) -> bool {
        !matches!(self, Self::Reported(_))
    }
}

impl fmt::Display for FetchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Terminal output of one fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchResult {
    pub code: String,
    pub state: FetchState,
    pub cells: ResultRow,
    /// Attempts started before the fetch resolved.
    pub attempts: u32,
}
