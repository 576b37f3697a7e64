//! The default command: look up a workbook's codes and write results back.

use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use console::style;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::CheckArgs;
use crate::browser::{open_target, PageDriver, PageReadiness, ScriptedPage};
use crate::cli::progress;
use crate::config::Config;
use crate::fetch::{FetchMachine, StopFlag};
use crate::run::{Bucket, RunOutcome, RunReport, SaveStatus, Sequencer};
use crate::workbook::Workbook;

pub(crate) async fn cmd_check(mut config: Config, args: CheckArgs) -> anyhow::Result<()> {
    if args.headless {
        config.browser.headless = true;
    }
    if let Some(ref path) = config.source_path {
        println!("{} Using config {}", style("→").dim(), path.display());
    }

    let Some((mut workbook, codes)) = select_workbook(&config, args.file.as_deref()).await? else {
        println!("{} No workbook selected", style("!").yellow());
        return Ok(());
    };
    if codes.is_empty() {
        println!(
            "{} No codes found in column '{}' of {}",
            style("!").yellow(),
            config.columns.search,
            workbook.path().display()
        );
        return Ok(());
    }
    println!(
        "{} {} codes loaded from {}",
        style("✓").green(),
        codes.len(),
        workbook.path().display()
    );

    let stop = StopFlag::new();
    let interrupt = spawn_interrupt_handler(stop.clone());

    let report = if args.simulate {
        println!("{} Simulation mode: no browser is started", style("!").yellow());
        let page = ScriptedPage::simulated(&config.fetch.no_data_phrase);
        check_codes(page, &config, &codes, &mut workbook, stop).await
    } else {
        run_in_browser(&config, &codes, &mut workbook, stop).await
    };
    interrupt.abort();
    let report = report?;

    print_report(&report, codes.len());
    if args.json {
        println!("{}", serde_json::to_string_pretty(&report.records)?);
    }

    match report.save {
        SaveStatus::Failed(ref message) => anyhow::bail!("results could not be saved: {}", message),
        _ => Ok(()),
    }
}

/// Load codes from `file`, or from paths typed at the prompt until one works.
///
/// Returns `None` when the prompt is left empty.
async fn select_workbook(
    config: &Config,
    file: Option<&Path>,
) -> anyhow::Result<Option<(Workbook, Vec<String>)>> {
    if let Some(path) = file {
        let workbook = Workbook::new(path, config.columns.clone());
        let codes = workbook
            .load_codes()
            .await
            .with_context(|| format!("loading codes from {}", path.display()))?;
        return Ok(Some((workbook, codes)));
    }

    loop {
        let Some(path) = prompt_for_path()? else {
            return Ok(None);
        };
        let workbook = Workbook::new(path, config.columns.clone());
        match workbook.load_codes().await {
            Ok(codes) => return Ok(Some((workbook, codes))),
            Err(e) => eprintln!("{} {}", style("✗").red(), e),
        }
    }
}

fn prompt_for_path() -> anyhow::Result<Option<PathBuf>> {
    print!("\nWorkbook to process (empty to quit): ");
    io::stdout().flush()?;
    let mut input = String::new();
    io::stdin()
        .read_line(&mut input)
        .context("reading workbook path")?;
    Ok(parse_prompt_path(&input))
}

/// Trims whitespace and the quotes terminals add to dropped paths.
fn parse_prompt_path(input: &str) -> Option<PathBuf> {
    let trimmed = input.trim().trim_matches(|c| c == '"' || c == '\'').trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(PathBuf::from(trimmed))
    }
}

/// Exit status for a run ended by a second Ctrl-C.
const FORCE_QUIT_STATUS: i32 = 130;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InterruptAction {
    /// Finish the current code, then save what was gathered.
    Stop,
    /// Leave at once without saving.
    ForceQuit,
}

/// React to the `count`-th Ctrl-C of the run.
fn on_interrupt(count: u32, stop: &StopFlag) -> InterruptAction {
    if count <= 1 {
        stop.request();
        InterruptAction::Stop
    } else {
        InterruptAction::ForceQuit
    }
}

fn spawn_interrupt_handler(stop: StopFlag) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut count = 0;
        while tokio::signal::ctrl_c().await.is_ok() {
            count += 1;
            match on_interrupt(count, &stop) {
                InterruptAction::Stop => eprintln!(
                    "\n{} Stopping after the current code; partial results will be saved \
                     (Ctrl-C again to quit now)",
                    style("!").yellow()
                ),
                InterruptAction::ForceQuit => {
                    eprintln!("\n{} Quitting without saving", style("✗").red());
                    std::process::exit(FORCE_QUIT_STATUS);
                }
            }
        }
    })
}

#[cfg(feature = "browser")]
async fn run_in_browser(
    config: &Config,
    codes: &[String],
    workbook: &mut Workbook,
    stop: StopFlag,
) -> anyhow::Result<RunReport> {
    use crate::browser::BrowserSession;

    println!("{} Starting browser", style("→").cyan());
    let session = BrowserSession::start(&config.browser)
        .await
        .context("starting browser")?;
    let result = match session.open_page().await {
        Ok(page) => check_codes(page, config, codes, workbook, stop).await,
        Err(e) => Err(anyhow::Error::new(e).context("opening portal page")),
    };
    session.close().await;
    result
}

#[cfg(not(feature = "browser"))]
async fn run_in_browser(
    _config: &Config,
    _codes: &[String],
    _workbook: &mut Workbook,
    _stop: StopFlag,
) -> anyhow::Result<RunReport> {
    Err(crate::browser::BrowserError::Unsupported.into())
}

/// Open the portal in `driver`, then run every code through it.
async fn check_codes<D: PageDriver>(
    mut driver: D,
    config: &Config,
    codes: &[String],
    workbook: &mut Workbook,
    stop: StopFlag,
) -> anyhow::Result<RunReport> {
    let load_timeout = Duration::from_secs(config.browser.page_load_timeout_secs);
    let readiness = open_target(&mut driver, &config.target_url, load_timeout)
        .await
        .context("loading the portal")?;
    if readiness == PageReadiness::TimedOut {
        println!(
            "{} Portal did not finish loading in {:?}; continuing",
            style("!").yellow(),
            load_timeout
        );
    }

    let (tx, rx) = mpsc::channel(256);
    let display = tokio::spawn(progress::render(rx));

    let machine = FetchMachine::new(driver, config.fetch.clone(), stop);
    let mut sequencer = Sequencer::new(machine).with_events(tx);
    let report = sequencer.run(codes, workbook).await;
    drop(sequencer);
    let _ = display.await;

    Ok(report)
}

fn print_report(report: &RunReport, total: usize) {
    println!();
    match (&report.outcome, &report.save) {
        (_, SaveStatus::Failed(message)) => {
            println!("{} Error: results could not be saved", style("✗").red());
            println!("  {} {}", style("→").dim(), message);
        }
        (RunOutcome::Completed, SaveStatus::Saved(save)) => {
            println!(
                "{} Completed and saved to {}",
                style("✓").green(),
                save.path.display()
            );
        }
        (RunOutcome::Interrupted, SaveStatus::Saved(save)) => {
            println!(
                "{} Interrupted after {} of {} codes; partial results saved to {}",
                style("!").yellow(),
                report.records.len(),
                total,
                save.path.display()
            );
        }
        (RunOutcome::Interrupted, SaveStatus::Skipped) => {
            println!("{} Interrupted before any code was processed", style("!").yellow());
        }
        (RunOutcome::Completed, SaveStatus::Skipped) => {
            println!("{} Completed; nothing to save", style("✓").green());
        }
    }

    if let SaveStatus::Saved(ref save) = report.save {
        if save.fallback {
            println!(
                "  {} Original workbook was not writable; wrote a copy instead",
                style("!").yellow()
            );
        }
        if !save.unmatched.is_empty() {
            println!(
                "  {} No matching row for: {}",
                style("!").yellow(),
                save.unmatched.join(", ")
            );
        }
    }

    println!("\n{}", style("Results").bold());
    for bucket in Bucket::ALL {
        println!("  {:<12} {}", bucket.name(), report.counts.get(bucket));
    }
    println!(
        "  {:<12} {}",
        "total",
        style(report.counts.total()).bold()
    );
    println!(
        "  {} Elapsed {}",
        style("→").dim(),
        format_elapsed(report.elapsed)
    );
}

fn format_elapsed(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    if secs >= 3600 {
        format!("{}h {:02}m {:02}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    } else if secs >= 60 {
        format!("{}m {:02}s", secs / 60, secs % 60)
    } else {
        format!("{:.1}s", elapsed.as_secs_f64())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_path_strips_quotes() {
        assert_eq!(
            parse_prompt_path("  '/tmp/my codes.xlsx'\n"),
            Some(PathBuf::from("/tmp/my codes.xlsx"))
        );
        assert_eq!(
            parse_prompt_path("\"C:\\dati\\codici.xlsx\"\r\n"),
            Some(PathBuf::from("C:\\dati\\codici.xlsx"))
        );
        assert_eq!(parse_prompt_path("   \n"), None);
    }

    #[test]
    fn test_format_elapsed() {
        assert_eq!(format_elapsed(Duration::from_millis(2500)), "2.5s");
        assert_eq!(format_elapsed(Duration::from_secs(125)), "2m 05s");
        assert_eq!(format_elapsed(Duration::from_secs(3725)), "1h 02m 05s");
    }

    #[test]
    fn test_second_interrupt_forces_quit() {
        let stop = StopFlag::new();

        assert_eq!(on_interrupt(1, &stop), InterruptAction::Stop);
        assert!(stop.is_requested());
        assert_eq!(on_interrupt(2, &stop), InterruptAction::ForceQuit);
        assert_eq!(on_interrupt(3, &stop), InterruptAction::ForceQuit);
    }

    #[tokio::test]
    async fn test_unwritable_workbook_rejected_before_lookups() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("codes.ods");
        std::fs::write(&path, b"not a spreadsheet").unwrap();

        let err = select_workbook(&Config::default(), Some(&path))
            .await
            .unwrap_err();
        let source = err
            .downcast_ref::<crate::workbook::WorkbookError>()
            .expect("workbook error");
        assert!(matches!(
            source,
            crate::workbook::WorkbookError::UnsupportedFormat { .. }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_simulated_check_writes_workbook() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("codes.xlsx");
        crate::workbook::testing::write_sheet(&path, &["ricerca"], &[vec!["AB1"], vec!["AB10"]]);

        let config = Config::default();
        let mut workbook = Workbook::new(&path, config.columns.clone());
        let codes = workbook.load_codes().await.unwrap();
        let page = ScriptedPage::simulated(&config.fetch.no_data_phrase);

        let report = check_codes(page, &config, &codes, &mut workbook, StopFlag::new())
            .await
            .unwrap();

        assert_eq!(report.outcome, RunOutcome::Completed);
        assert_eq!(report.records.len(), 2);
        assert_eq!(report.records[1].stato, "Non Trovato");
        assert!(matches!(report.save, SaveStatus::Saved(ref save) if save.rows_written == 2));
    }
}
