//! End-to-end runs against a real workbook with a scripted portal page.

use std::path::Path;

use calamine::{open_workbook_auto, Data, Reader};
use serde_json::{json, Value};

use nsis_status::browser::{ScriptKind, Scripted, ScriptedPage};
use nsis_status::config::{ColumnConfig, FetchConfig};
use nsis_status::fetch::{FetchMachine, StopFlag};
use nsis_status::run::{RunOutcome, SaveStatus, Sequencer};
use nsis_status::workbook::Workbook;
use umya_spreadsheet::NumberingFormat;

fn write_codes(path: &Path, codes: &[&str]) {
    write_codes_at(path, 1, codes);
}

/// Like [`write_codes`], with the header on `header_row` and blank rows above it.
fn write_codes_at(path: &Path, header_row: u32, codes: &[&str]) {
    let mut book = umya_spreadsheet::new_file();
    let sheet = book.get_sheet_mut(&0).unwrap();
    sheet.get_cell_mut((1u32, header_row)).set_value_string("Ditta");
    sheet.get_cell_mut((2u32, header_row)).set_value_string("Ricerca");
    for (i, code) in codes.iter().enumerate() {
        let row = header_row + 1 + i as u32;
        sheet
            .get_cell_mut((1u32, row))
            .set_value_string(format!("Ditta {}", i));
        sheet.get_cell_mut((2u32, row)).set_value_string(*code);
    }
    umya_spreadsheet::writer::xlsx::write(&book, path).unwrap();
}

/// Header row plus data rows of the first sheet, as display text.
fn read_sheet(path: &Path) -> Vec<Vec<String>> {
    let mut workbook = open_workbook_auto(path).unwrap();
    let range = workbook.worksheet_range_at(0).unwrap().unwrap();
    range
        .rows()
        .map(|row| {
            row.iter()
                .map(|cell| match cell {
                    Data::Empty => String::new(),
                    other => other.to_string(),
                })
                .collect()
        })
        .collect()
}

fn portal_row(code: &str, status: &str) -> Value {
    json!(["", "", status, "", "", "PROT-1", "Nulla osta", "02/03/2024", code, "", ""])
}

#[tokio::test(start_paused = true)]
async fn test_results_land_next_to_their_codes() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("pratiche.xlsx");
    write_codes(&path, &["A1", "A2", "A3"]);

    let page = ScriptedPage::new(|ticket, _| match (ticket.kind, ticket.code.as_str()) {
        (ScriptKind::Extract, "A1") => Scripted::Value(portal_row("A1", "CHIUSA")),
        (ScriptKind::Extract, "A2") => Scripted::Value(json!(["Nessun dato presente"])),
        (ScriptKind::Extract, _) => Scripted::Value(Value::Null),
        _ => Scripted::Value(Value::Null),
    });

    let mut workbook = Workbook::new(&path, ColumnConfig::default());
    let codes = workbook.load_codes().await.unwrap();
    let mut sequencer = Sequencer::new(FetchMachine::new(
        page,
        FetchConfig::default(),
        StopFlag::new(),
    ));
    let report = sequencer.run(&codes, &mut workbook).await;

    assert_eq!(report.outcome, RunOutcome::Completed);
    assert_eq!(report.counts.chiusa, 1);
    assert_eq!(report.counts.eccezioni, 2);
    assert!(matches!(report.save, SaveStatus::Saved(ref save) if !save.fallback));

    let rows = read_sheet(&path);
    let header = &rows[0];
    let col = |name: &str| header.iter().position(|h| h == name).unwrap();
    let (stato, protocollo, note) = (col("stato"), col("protocollo uscita"), col("note usmaf"));

    assert_eq!(rows[1][0], "Ditta 0", "untouched columns survive");
    assert_eq!(rows[1][stato], "CHIUSA");
    assert_eq!(rows[1][protocollo], "PROT-1");
    assert_eq!(rows[1][note], "NOTA USMAF");
    assert_eq!(rows[2][stato], "Non Trovato");
    assert_eq!(rows[3][stato], "Elemento Non Trovato (JS)");
    assert!(rows[3][note].starts_with("Stato recuperato: Elemento Non Trovato (JS)."));
}

#[tokio::test(start_paused = true)]
async fn test_interrupted_run_saves_processed_codes_only() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("pratiche.xlsx");
    write_codes(&path, &["B1", "B2", "B3", "B4"]);

    let stop = StopFlag::new();
    let stop_in_page = stop.clone();
    let page = ScriptedPage::new(move |ticket, _| match ticket.kind {
        ScriptKind::Extract => {
            if ticket.code == "B2" {
                stop_in_page.request();
            }
            Scripted::Value(portal_row(&ticket.code, "APERTA"))
        }
        _ => Scripted::Value(Value::Null),
    });

    let mut workbook = Workbook::new(&path, ColumnConfig::default());
    let codes = workbook.load_codes().await.unwrap();
    let mut sequencer = Sequencer::new(FetchMachine::new(page, FetchConfig::default(), stop));
    let report = sequencer.run(&codes, &mut workbook).await;

    assert_eq!(report.outcome, RunOutcome::Interrupted);
    assert_eq!(report.records.len(), 2);

    let rows = read_sheet(&path);
    let stato = rows[0].iter().position(|h| h == "stato").unwrap();
    assert_eq!(rows[1][stato], "APERTA");
    assert_eq!(rows[2][stato], "Interrotto");
    assert!(rows.get(3).map_or(true, |row| row.get(stato).map_or(true, |s| s.is_empty())));
}

#[tokio::test(start_paused = true)]
async fn test_header_below_blank_first_row() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("pratiche.xlsx");
    write_codes_at(&path, 2, &["C1", "C2"]);

    let page = ScriptedPage::new(|ticket, _| match ticket.kind {
        ScriptKind::Extract => Scripted::Value(portal_row(&ticket.code, "INVIATA")),
        _ => Scripted::Value(Value::Null),
    });

    let mut workbook = Workbook::new(&path, ColumnConfig::default());
    let codes = workbook.load_codes().await.unwrap();
    assert_eq!(codes, vec!["C1", "C2"]);

    let mut sequencer = Sequencer::new(FetchMachine::new(
        page,
        FetchConfig::default(),
        StopFlag::new(),
    ));
    let report = sequencer.run(&codes, &mut workbook).await;

    assert_eq!(report.outcome, RunOutcome::Completed);
    assert!(
        matches!(report.save, SaveStatus::Saved(ref save) if save.rows_written == 2),
        "{:?}",
        report.save
    );

    let book = umya_spreadsheet::reader::xlsx::read(&path).unwrap();
    let sheet = book.get_sheet(&0).unwrap();
    assert_eq!(sheet.get_value((2u32, 1u32)), "", "nothing written above the header");

    // calamine starts the range at the header row
    let rows = read_sheet(&path);
    let stato = rows[0].iter().position(|h| h == "stato").unwrap();
    assert_eq!(rows[1][1], "C1");
    assert_eq!(rows[1][stato], "INVIATA");
    assert_eq!(rows[2][1], "C2");
    assert_eq!(rows[2][stato], "INVIATA");
}

#[tokio::test(start_paused = true)]
async fn test_codes_and_result_codes_saved_as_text() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("pratiche.xlsx");
    write_codes(&path, &["00123", "4500"]);

    let page = ScriptedPage::new(|ticket, _| match ticket.kind {
        ScriptKind::Extract => Scripted::Value(portal_row(&ticket.code, "CHIUSA")),
        _ => Scripted::Value(Value::Null),
    });

    let mut workbook = Workbook::new(&path, ColumnConfig::default());
    let codes = workbook.load_codes().await.unwrap();
    assert_eq!(codes, vec!["00123", "4500"]);
    let mut sequencer = Sequencer::new(FetchMachine::new(
        page,
        FetchConfig::default(),
        StopFlag::new(),
    ));
    let report = sequencer.run(&codes, &mut workbook).await;
    assert!(matches!(report.save, SaveStatus::Saved(_)));

    let book = umya_spreadsheet::reader::xlsx::read(&path).unwrap();
    let sheet = book.get_sheet(&0).unwrap();
    let col = |name: &str| {
        (1..=sheet.get_highest_column())
            .find(|&c| sheet.get_value((c, 1u32)) == name)
            .unwrap()
    };
    let search = col("Ricerca");
    let result_code = col("codice richiesta (risultato)");

    for (row, code) in [(2u32, "00123"), (3u32, "4500")] {
        assert_eq!(sheet.get_value((search, row)), code);
        assert_eq!(sheet.get_value((result_code, row)), code);
        for column in [search, result_code] {
            let format = sheet
                .get_cell((column, row))
                .and_then(|cell| cell.get_style().get_number_format())
                .map(|format| format.get_format_code().to_string());
            assert_eq!(
                format.as_deref(),
                Some(NumberingFormat::FORMAT_TEXT),
                "column {} row {}",
                column,
                row
            );
        }
    }
}
