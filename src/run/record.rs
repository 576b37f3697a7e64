use serde::Serialize;

use super::classify::is_known_exception;
use crate::fetch::{cell, FetchResult};

/// One output row, as written back to the workbook.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ResultRecord {
    pub input_code: String,
    pub stato: String,
    pub protocollo_uscita: String,
    pub provvedimento: String,
    pub data_provvedimento: String,
    pub codice_richiesta_risultato: String,
    pub note_usmaf: String,
}

impl ResultRecord {
    pub fn from_fetch(result: &FetchResult) -> Self {
        let cells = &result.cells;
        let stato = result.state.label().to_string();

        let echoed = cells.get(cell::CODE);
        let codice_richiesta_risultato = if echoed.is_empty() {
            result.code.clone()
        } else {
            echoed.to_string()
        };

        let notes = cells.get(cell::NOTES);
        let note_usmaf = if is_known_exception(&stato) {
            format!("Stato recuperato: {}. {}", stato, notes)
                .trim()
                .to_string()
        } else {
            notes.to_string()
        };

        Self {
            input_code: result.code.clone(),
            stato,
            protocollo_uscita: cells.get(cell::PROTOCOL).to_string(),
            provvedimento: cells.get(cell::MEASURE).to_string(),
            data_provvedimento: cells.get(cell::MEASURE_DATE).to_string(),
            codice_richiesta_risultato,
            note_usmaf,
        }
    }

    /// Output values in column order: state, protocol, measure, date, code, notes.
    pub fn output_values(&self) -> [&str; 6] {
        [
            self.stato.as_str(),
            self.protocollo_uscita.as_str(),
            self.provvedimento.as_str(),
            self.data_provvedimento.as_str(),
            self.codice_richiesta_risultato.as_str(),
            self.note_usmaf.as_str(),
        ]
    }
}
