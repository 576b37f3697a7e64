//! Bucketing of resolved states.

use std::fmt;

use serde::Serialize;

/// States produced by the checker itself, plus labels older releases wrote
/// into workbooks. All of them count as exceptions without a warning.
pub const KNOWN_EXCEPTION_STATES: &[&str] = &[
    "NON TROVATO",
    "ERRORE TIMEOUT",
    "ERRORE PAGINA",
    "ERRORE PAGINA (INTERNO)",
    "ERRORE INTERNO FETCH",
    "SCONOSCIUTO",
    "INTERROTTO",
    "ERRORE CARICAMENTO PAGINA",
    "ELEMENTO NON TROVATO (JS)",
    "ERRORE RISULTATO JS",
];

/// Summary buckets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Bucket {
    Annullata,
    Aperta,
    Chiusa,
    Lavorazione,
    Inviata,
    Eccezioni,
}

impl Bucket {
    pub const ALL: [Bucket; 6] = [
        Bucket::Annullata,
        Bucket::Aperta,
        Bucket::Chiusa,
        Bucket::Lavorazione,
        Bucket::Inviata,
        Bucket::Eccezioni,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::Annullata => "annullata",
            Self::Aperta => "aperta",
            Self::Chiusa => "chiusa",
            Self::Lavorazione => "lavorazione",
            Self::Inviata => "inviata",
            Self::Eccezioni => "eccezioni",
        }
    }
}

impl fmt::Display for Bucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Upper-cased, trimmed form used for every lookup.
pub fn normalize_state(state: &str) -> String {
    state.trim().to_uppercase()
}

pub fn is_known_exception(state: &str) -> bool {
    KNOWN_EXCEPTION_STATES.contains(&normalize_state(state).as_str())
}

/// Bucket for a state; `None` in the second slot means the state was recognised.
pub fn classify(state: &str) -> (Bucket, Option<String>) {
    let normalized = normalize_state(state);
    let bucket = match normalized.as_str() {
        "ANNULLATA" => Bucket::Annullata,
        "APERTA" => Bucket::Aperta,
        "CHIUSA" => Bucket::Chiusa,
        "IN LAVORAZIONE" => Bucket::Lavorazione,
        "INVIATA" => Bucket::Inviata,
        other if KNOWN_EXCEPTION_STATES.contains(&other) => Bucket::Eccezioni,
        _ => return (Bucket::Eccezioni, Some(normalized)),
    };
    (bucket, None)
}

/// Running per-bucket totals for one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ClassificationCounts {
    pub annullata: usize,
    pub aperta: usize,
    pub chiusa: usize,
    pub lavorazione: usize,
    pub inviata: usize,
    pub eccezioni: usize,
}

impl ClassificationCounts {
    pub fn increment(&mut self, bucket: Bucket) {
        *self.slot(bucket) += 1;
    }

    pub fn get(&self, bucket: Bucket) -> usize {
        match bucket {
            Bucket::Annullata => self.annullata,
            Bucket::Aperta => self.aperta,
            Bucket::Chiusa => self.chiusa,
            Bucket::Lavorazione => self.lavorazione,
            Bucket::Inviata => self.inviata,
            Bucket::Eccezioni => self.eccezioni,
        }
    }

    pub fn total(&self) -> usize {
        Bucket::ALL.iter().map(|b| self.get(*b)).sum()
    }

    fn slot(&mut self, bucket: Bucket) -> &mut usize {
        match bucket {
            Bucket::Annullata => &mut self.annullata,
            Bucket::Aperta => &mut self.aperta,
            Bucket::Chiusa => &mut self.chiusa,
            Bucket::Lavorazione => &mut self.lavorazione,
            Bucket::Inviata => &mut self.inviata,
            Bucket::Eccezioni => &mut self.eccezioni,
        }
    }
}

impl fmt::Display for ClassificationCounts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = Bucket::ALL
            .iter()
            .map(|b| format!("{}: {}", b, self.get(*b)))
            .collect();
        f.write_str(&parts.join(", "))
    }
}
