//! Terminal rendering of run events.

use std::time::Duration;

use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::mpsc;

use crate::run::{Bucket, ResultRecord, RunEvent};

/// Draw a progress bar plus one log line per resolved code until the run's
/// event stream closes.
pub(crate) async fn render(mut events: mpsc::Receiver<RunEvent>) {
    let mut bar: Option<ProgressBar> = None;

    while let Some(event) = events.recv().await {
        match event {
            RunEvent::Started { total } => {
                let progress = ProgressBar::new(total as u64);
                progress.set_style(bar_style());
                progress.enable_steady_tick(Duration::from_millis(120));
                progress.set_message("starting");
                bar = Some(progress);
            }
            RunEvent::Status(status) => {
                if let Some(ref progress) = bar {
                    progress.set_message(status);
                }
            }
            RunEvent::CodeResolved {
                record, bucket, ..
            } => {
                let line = resolved_line(&record, bucket);
                match bar {
                    Some(ref progress) => {
                        progress.println(line);
                        progress.inc(1);
                    }
                    None => println!("{}", line),
                }
            }
            RunEvent::Warning(text) => {
                let line = format!("{} {}", style("!").yellow(), text);
                match bar {
                    Some(ref progress) => progress.println(line),
                    None => eprintln!("{}", line),
                }
            }
            RunEvent::Saving { records } => {
                if let Some(ref progress) = bar {
                    progress.set_message(format!("saving {} results", records));
                }
            }
            RunEvent::Finished { counts, .. } => {
                if let Some(progress) = bar.take() {
                    progress.finish_and_clear();
                }
                println!("{} {}", style("→").dim(), counts);
            }
        }
    }

    if let Some(progress) = bar {
        progress.abandon();
    }
}

fn bar_style() -> ProgressStyle {
    ProgressStyle::default_bar()
        .template("{spinner:.green} [{bar:30.cyan/blue}] {pos}/{len} {wide_msg}")
        .map(|s| s.progress_chars("█▓░"))
        .unwrap_or_else(|_| ProgressStyle::default_bar())
}

fn resolved_line(record: &ResultRecord, bucket: Bucket) -> String {
    let icon = if bucket == Bucket::Eccezioni {
        style("!").yellow()
    } else {
        style("✓").green()
    };
    format!(
        "{} {} {} {}",
        icon,
        style(&record.input_code).bold(),
        style("→").dim(),
        record.stato
    )
}
