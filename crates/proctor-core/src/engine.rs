//! The sequential exam runner.
//!
//! One runner instance drives one phase (student or grader) for one model
//! configuration. Rows are processed strictly in input order because row N's
//! payload contains the full content of rows 1..N-1 as produced by this same
//! run; no row can start before its predecessors complete. Independent model
//! configurations each get their own runner and their own history.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};

use crate::error::ProviderError;
use crate::grading::parse_grader_response;
use crate::model::{ExamQuestion, ExamRow, GraderOutcome, StudentOutcome};
use crate::traits::{ConversationTurn, ModelAdapter};

/// Which phase a runner is driving.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Student,
    Grader,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Phase::Student => write!(f, "student"),
            Phase::Grader => write!(f, "grader"),
        }
    }
}

/// What to do when a row exhausts its retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailureMode {
    /// Abort the run. Rows completed so far are preserved through the
    /// progress reporter.
    #[default]
    Abort,
    /// Mark the row failed and continue with the next one. Failed rows carry
    /// no outcome and never enter the history.
    Skip,
}

impl std::str::FromStr for FailureMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "abort" => Ok(FailureMode::Abort),
            "skip" => Ok(FailureMode::Skip),
            other => Err(format!("unknown failure mode: {other} (expected abort|skip)")),
        }
    }
}

/// Configuration for the exam runner.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Retries per row on transient provider errors.
    pub max_retries: u32,
    /// Initial delay between retries; doubled per attempt, capped at 60s.
    pub retry_delay: Duration,
    /// Row-failure policy.
    pub failure_mode: FailureMode,
    /// Cooperative cancellation flag, checked between rows.
    pub cancel: Option<Arc<AtomicBool>>,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay: Duration::from_secs(1),
            failure_mode: FailureMode::Abort,
            cancel: None,
        }
    }
}

/// Progress reporting trait. The CLI uses this for verbose echo and for
/// persisting completed rows incrementally.
pub trait ProgressReporter: Send + Sync {
    fn on_row_start(&self, phase: Phase, index: i64);
    fn on_row_complete(&self, phase: Phase, row: &ExamRow);
    fn on_row_failed(&self, phase: Phase, index: i64, error: &str);
    fn on_run_complete(&self, phase: Phase, completed: usize, failed: usize, elapsed: Duration);
}

/// No-op progress reporter.
pub struct NoopReporter;

impl ProgressReporter for NoopReporter {
    fn on_row_start(&self, _: Phase, _: i64) {}
    fn on_row_complete(&self, _: Phase, _: &ExamRow) {}
    fn on_row_failed(&self, _: Phase, _: i64, _: &str) {}
    fn on_run_complete(&self, _: Phase, _: usize, _: usize, _: Duration) {}
}

/// Drives sequential iteration over exam rows for one phase of one model
/// configuration.
pub struct ExamRunner {
    adapter: Arc<dyn ModelAdapter>,
    config: RunnerConfig,
}

impl ExamRunner {
    pub fn new(adapter: Arc<dyn ModelAdapter>, config: RunnerConfig) -> Self {
        Self { adapter, config }
    }

    fn cancelled(&self) -> bool {
        self.config
            .cancel
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::Relaxed))
    }

    /// Run the student phase: answer every question in input order, feeding
    /// each row the completed rows before it as conversational history.
    pub async fn take_exam(
        &self,
        questions: &[ExamQuestion],
        progress: &dyn ProgressReporter,
    ) -> Result<Vec<ExamRow>> {
        let start = Instant::now();
        let mut rows: Vec<ExamRow> = Vec::with_capacity(questions.len());
        let mut history: Vec<ExamRow> = Vec::new();
        let mut failed = 0usize;

        for question in questions {
            if self.cancelled() {
                tracing::warn!(
                    index = question.index,
                    "run cancelled; preserving {} completed rows",
                    rows.len()
                );
                break;
            }
            progress.on_row_start(Phase::Student, question.index);

            let outcome = self.answer_question(question, &history).await;
            match outcome {
                Ok(student) => {
                    let row = ExamRow::from_question(question.clone()).with_student(student);
                    progress.on_row_complete(Phase::Student, &row);
                    history.push(row.clone());
                    rows.push(row);
                }
                Err(e) => match self.config.failure_mode {
                    FailureMode::Abort => {
                        return Err(e).with_context(|| {
                            format!("student phase failed at question {}", question.index)
                        });
                    }
                    FailureMode::Skip => {
                        tracing::warn!(index = question.index, "row failed, skipping: {e:#}");
                        progress.on_row_failed(Phase::Student, question.index, &format!("{e:#}"));
                        rows.push(ExamRow::from_question(question.clone()));
                        failed += 1;
                    }
                },
            }
        }

        progress.on_run_complete(Phase::Student, rows.len() - failed, failed, start.elapsed());
        Ok(rows)
    }

    async fn answer_question(
        &self,
        question: &ExamQuestion,
        history: &[ExamRow],
    ) -> Result<StudentOutcome> {
        let turns = self.adapter.prepare_student_input(question, history)?;
        let result = self.generate_with_retry(&turns).await?;
        Ok(StudentOutcome::from_inference(
            self.adapter.model_name(),
            result,
        ))
    }

    /// Run the grader phase over student-answered rows. Rows without a
    /// recorded student response are carried through ungraded with a warning.
    pub async fn grade_exam(
        &self,
        answered: &[ExamRow],
        progress: &dyn ProgressReporter,
    ) -> Result<Vec<ExamRow>> {
        let start = Instant::now();
        let mut rows: Vec<ExamRow> = Vec::with_capacity(answered.len());
        let mut history: Vec<ExamRow> = Vec::new();
        let mut failed = 0usize;

        for row in answered {
            if self.cancelled() {
                tracing::warn!(
                    index = row.question.index,
                    "run cancelled; preserving {} completed rows",
                    rows.len()
                );
                break;
            }

            if row.student.is_none() {
                tracing::warn!(
                    index = row.question.index,
                    "question has no student response; leaving it ungraded"
                );
                rows.push(row.clone());
                failed += 1;
                continue;
            }
            progress.on_row_start(Phase::Grader, row.question.index);

            let outcome = self.grade_row(row, &history).await;
            match outcome {
                Ok(grader) => {
                    let graded = row.clone().with_grader(grader);
                    progress.on_row_complete(Phase::Grader, &graded);
                    history.push(graded.clone());
                    rows.push(graded);
                }
                Err(e) => match self.config.failure_mode {
                    FailureMode::Abort => {
                        return Err(e).with_context(|| {
                            format!("grader phase failed at question {}", row.question.index)
                        });
                    }
                    FailureMode::Skip => {
                        tracing::warn!(
                            index = row.question.index,
                            "row failed, skipping: {e:#}"
                        );
                        progress.on_row_failed(Phase::Grader, row.question.index, &format!("{e:#}"));
                        rows.push(row.clone());
                        failed += 1;
                    }
                },
            }
        }

        progress.on_run_complete(Phase::Grader, rows.len() - failed, failed, start.elapsed());
        Ok(rows)
    }

    async fn grade_row(&self, row: &ExamRow, history: &[ExamRow]) -> Result<GraderOutcome> {
        let turns = self.adapter.prepare_grader_input(row, history)?;
        let result = self.generate_with_retry(&turns).await?;
        let grading = parse_grader_response(row.question.index, &result.response_text);
        Ok(GraderOutcome::from_inference(
            self.adapter.model_name(),
            result,
            grading,
        ))
    }

    /// Call the adapter with bounded exponential backoff. Permanent provider
    /// errors are surfaced immediately; rate-limit hints override the
    /// computed delay.
    async fn generate_with_retry(
        &self,
        turns: &[ConversationTurn],
    ) -> Result<crate::model::InferenceResult> {
        let mut delay = self.config.retry_delay;
        let mut last_error = None;

        for attempt in 0..=self.config.max_retries {
            if attempt > 0 {
                tokio::time::sleep(delay).await;
                delay = (delay * 2).min(Duration::from_secs(60));
            }
            match self.adapter.generate(turns).await {
                Ok(result) => return Ok(result),
                Err(e) => {
                    if let Some(provider_err) = e.downcast_ref::<ProviderError>() {
                        if provider_err.is_permanent() {
                            return Err(e);
                        }
                        if let Some(ms) = provider_err.retry_after_ms() {
                            delay = Duration::from_millis(ms);
                        }
                    }
                    tracing::warn!(attempt, "inference call failed: {e:#}");
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| anyhow::anyhow!("inference failed with no error")))
    }
}
