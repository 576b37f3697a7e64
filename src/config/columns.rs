//! Spreadsheet column mapping.

use serde::{Deserialize, Serialize};

/// One output column: header text plus the zero-based column index used when
/// the header is missing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OutputColumn {
    pub header: String,
    pub default_index: u32,
}

impl OutputColumn {
    fn new(header: &str, default_index: u32) -> Self {
        Self {
            header: header.to_string(),
            default_index,
        }
    }
}

/// Column names are matched case-insensitively against trimmed header text.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ColumnConfig {
    /// Column holding the codes to look up.
    pub search: String,

    /// Written in place of an empty notes field.
    pub empty_notes_placeholder: String,

    pub status: OutputColumn,
    pub protocol: OutputColumn,
    pub measure: OutputColumn,
    pub measure_date: OutputColumn,
    pub result_code: OutputColumn,
    pub notes: OutputColumn,
}

impl Default for ColumnConfig {
    fn default() -> Self {
        Self {
            search: "ricerca".to_string(),
            empty_notes_placeholder: "NOTA USMAF".to_string(),
            status: OutputColumn::new("stato", 3),
            protocol: OutputColumn::new("protocollo uscita", 4),
            measure: OutputColumn::new("provvedimento", 5),
            measure_date: OutputColumn::new("data provvedimento", 6),
            result_code: OutputColumn::new("codice richiesta (risultato)", 7),
            notes: OutputColumn::new("note usmaf", 8),
        }
    }
}

impl ColumnConfig {
    /// Output columns in write order.
    pub fn outputs(&self) -> [&OutputColumn; 6] {
        [
            &self.status,
            &self.protocol,
            &self.measure,
            &self.measure_date,
            &self.result_code,
            &self.notes,
        ]
    }
}
