//! Subcommand implementations.

use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use anyhow::Result;

use proctor_core::engine::{Phase, ProgressReporter};
use proctor_core::model::ExamRow;
use proctor_core::record::ExamSummary;
use proctor_report::jsonl::JsonlWriter;

pub mod grade;
pub mod init;
pub mod list_models;
pub mod run;
pub mod validate;

/// Console progress reporter that also persists each completed row to a
/// JSONL file, so an aborted run keeps everything finished so far.
pub struct RunReporter {
    verbose: bool,
    writer: Mutex<JsonlWriter>,
}

impl RunReporter {
    pub fn create(path: &Path, verbose: bool) -> Result<Self> {
        Ok(Self {
            verbose,
            writer: Mutex::new(JsonlWriter::create(path)?),
        })
    }
}

impl ProgressReporter for RunReporter {
    fn on_row_start(&self, phase: Phase, index: i64) {
        eprintln!("  {phase} :: question {index}");
    }

    fn on_row_complete(&self, phase: Phase, row: &ExamRow) {
        if self.verbose {
            let response = match phase {
                Phase::Student => row.student_response(),
                Phase::Grader => row.grader_response(),
            };
            if let Some(text) = response {
                eprintln!("    {text}");
            }
        }
        if let Err(e) = self.writer.lock().unwrap().append(row) {
            tracing::error!(index = row.question.index, "failed to persist row: {e:#}");
        }
    }

    fn on_row_failed(&self, phase: Phase, index: i64, error: &str) {
        eprintln!("  {phase} :: question {index} FAILED: {error}");
    }

    fn on_run_complete(&self, phase: Phase, completed: usize, failed: usize, elapsed: Duration) {
        eprintln!(
            "\n{phase} phase complete: {completed} answered, {failed} failed ({:.1}s)",
            elapsed.as_secs_f64()
        );
    }
}

/// Per-run score table printed after the last phase.
pub fn print_summary(runs: &[(String, Vec<ExamRow>)]) {
    use comfy_table::{Cell, Table};

    let mut table = Table::new();
    table.set_header(vec![
        "Run", "Questions", "Answered", "Graded", "Points", "Score",
    ]);

    for (name, rows) in runs {
        let summary = ExamSummary::compute(rows);
        let score = if summary.graded > 0 {
            format!("{:.1}", summary.total_score)
        } else {
            "-".to_string()
        };
        table.add_row(vec![
            Cell::new(name),
            Cell::new(summary.rows),
            Cell::new(summary.answered),
            Cell::new(summary.graded),
            Cell::new(format!("{:.1}", summary.total_points)),
            Cell::new(score),
        ]);
    }

    eprintln!("\n{table}");
}
