//! The `proctor run` command.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};

use proctor_core::engine::{ExamRunner, FailureMode, RunnerConfig};
use proctor_core::model::{ExamRow, ModelConfig};
use proctor_core::parser;
use proctor_core::traits::ModelAdapter;
use proctor_providers::ProviderRegistry;
use proctor_report::csv::write_csv;
use proctor_report::RunManifest;

use super::{print_summary, RunReporter};

/// One student config resolved and ready to run.
struct StudentRun {
    name: String,
    config: ModelConfig,
    adapter: Arc<dyn ModelAdapter>,
}

#[allow(clippy::too_many_arguments)]
pub async fn execute(
    exam: PathBuf,
    student_configs: Vec<PathBuf>,
    grading: bool,
    grader_config: Option<PathBuf>,
    output: Option<PathBuf>,
    registry_path: Option<PathBuf>,
    on_error: String,
    max_retries: u32,
    verbose: bool,
) -> Result<()> {
    anyhow::ensure!(
        !grading || grader_config.is_some(),
        "--grading requires --grader-config"
    );
    anyhow::ensure!(
        grading || grader_config.is_none(),
        "--grader-config is only used with --grading"
    );
    let failure_mode: FailureMode = on_error.parse().map_err(|e: String| anyhow::anyhow!(e))?;

    let questions = parser::load_exam(&exam)?;
    anyhow::ensure!(
        !questions.is_empty(),
        "exam file has no questions: {}",
        exam.display()
    );
    for warning in parser::validate_exam(&questions) {
        match warning.index {
            Some(index) => eprintln!("  [{index}] WARNING: {}", warning.message),
            None => eprintln!("  WARNING: {}", warning.message),
        }
    }

    let registry = match &registry_path {
        Some(path) => ProviderRegistry::load(path)?,
        None => ProviderRegistry::builtin(),
    };

    let output_dir = output.unwrap_or_else(|| default_output_dir(&exam));
    std::fs::create_dir_all(&output_dir)
        .with_context(|| format!("failed to create output dir: {}", output_dir.display()))?;

    // Resolve every adapter up front so config problems surface before any
    // tokens are spent.
    let mut runs = Vec::new();
    for path in &student_configs {
        let config = ModelConfig::load(path)?;
        let adapter: Arc<dyn ModelAdapter> = Arc::from(registry.resolve(&config)?);
        let name = run_name(path, &runs);
        std::fs::copy(path, output_dir.join(format!("{name}_config.json")))
            .with_context(|| format!("failed to copy config: {}", path.display()))?;
        runs.push(StudentRun {
            name,
            config,
            adapter,
        });
    }

    let grader = match &grader_config {
        Some(path) => {
            let config = ModelConfig::load(path)?;
            let adapter: Arc<dyn ModelAdapter> = Arc::from(registry.resolve(&config)?);
            std::fs::copy(path, output_dir.join("grader_config.json"))
                .with_context(|| format!("failed to copy config: {}", path.display()))?;
            Some((config, adapter))
        }
        None => None,
    };

    RunManifest::new(
        &exam,
        runs.iter().map(|r| r.config.model_name.clone()).collect(),
        grader.as_ref().map(|(c, _)| c.model_name.clone()),
    )
    .save(&output_dir.join("manifest.json"))?;

    // Ctrl-C flips the flag; runners stop between rows, keeping every
    // completed row on disk.
    let cancel = Arc::new(AtomicBool::new(false));
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                eprintln!("\nInterrupt received, finishing the current row...");
                cancel.store(true, Ordering::Relaxed);
            }
        });
    }

    eprintln!(
        "Administering {} questions to {} student config(s){}",
        questions.len(),
        runs.len(),
        if grading { ", then grading" } else { "" },
    );
    eprintln!();

    // Independent configs run concurrently; rows within one run stay
    // strictly sequential because each row's payload depends on the last.
    let tasks = runs.into_iter().map(|run| {
        let questions = questions.clone();
        let grader = grader.clone();
        let output_dir = output_dir.clone();
        let runner_config = RunnerConfig {
            max_retries,
            failure_mode,
            cancel: Some(cancel.clone()),
            ..RunnerConfig::default()
        };
        async move {
            let runner = ExamRunner::new(run.adapter, runner_config.clone());
            let reporter =
                RunReporter::create(&output_dir.join(format!("{}.jsonl", run.name)), verbose)?;
            let answered = runner.take_exam(&questions, &reporter).await?;
            write_csv(&answered, &output_dir.join(format!("{}.csv", run.name)))?;

            let rows = match grader {
                Some((_, adapter)) => {
                    let runner = ExamRunner::new(adapter, runner_config);
                    let reporter = RunReporter::create(
                        &output_dir.join(format!("{}_graded.jsonl", run.name)),
                        verbose,
                    )?;
                    let graded = runner.grade_exam(&answered, &reporter).await?;
                    write_csv(&graded, &output_dir.join(format!("{}_graded.csv", run.name)))?;
                    graded
                }
                None => answered,
            };
            Ok::<(String, Vec<ExamRow>), anyhow::Error>((run.name, rows))
        }
    });
    let results = futures::future::try_join_all(tasks).await?;

    print_summary(&results);
    eprintln!("Results saved to: {}", output_dir.display());
    Ok(())
}

fn default_output_dir(exam: &Path) -> PathBuf {
    let stem = exam
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("exam");
    let timestamp = chrono::Utc::now().format("%Y-%m-%dT%H%M%S");
    PathBuf::from("responses").join(format!("{stem}_output_{timestamp}"))
}

/// Name a run after its config file, deduplicating stems.
fn run_name(path: &Path, existing: &[StudentRun]) -> String {
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("student")
        .to_string();
    if !existing.iter().any(|r| r.name == stem) {
        return stem;
    }
    let mut n = 2;
    loop {
        let candidate = format!("{stem}_{n}");
        if !existing.iter().any(|r| r.name == candidate) {
            return candidate;
        }
        n += 1;
    }
}
