//! Interpretation of one extraction-script result.

use serde_json::Value;

use super::state::{cell, FetchState, ResultRow};

/// What a single poll of the result table says.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollVerdict {
    /// No result row on the page yet.
    Missing,
    /// The portal's "no data" row.
    NoData(ResultRow),
    /// A row for the requested code.
    Matched { state: FetchState, row: ResultRow },
    /// A row that belongs to something else (previous code, partial render).
    Pending(ResultRow),
    /// Not a list and not null.
    Unexpected(String),
}

pub fn classify_poll(value: &Value, code: &str, no_data_phrase: &str) -> PollVerdict {
    let items = match value {
        Value::Null => return PollVerdict::Missing,
        Value::Array(items) => items,
        other => return PollVerdict::Unexpected(describe(other)),
    };

    let raw: Vec<String> = items.iter().map(cell_text).collect();

    if raw
        .first()
        .is_some_and(|first| first.contains(no_data_phrase))
    {
        let mut row = ResultRow::from_cells(&raw);
        row.set(cell::STATUS, FetchState::NotFound.label());
        return PollVerdict::NoData(row);
    }

    let row = ResultRow::from_cells(&raw);
    if raw.len() > cell::CODE && row.get(cell::CODE) == code.trim() {
        let status = row.get(cell::STATUS);
        let state = if status.is_empty() {
            FetchState::Unknown
        } else {
            FetchState::Reported(status.to_string())
        };
        return PollVerdict::Matched { state, row };
    }

    PollVerdict::Pending(row)
}

fn cell_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn describe(value: &Value) -> String {
    let text = value.to_string();
    match text.char_indices().nth(80) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text,
    }
}
