//! The `proctor grade` command: standalone grading of an answered exam.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};

use proctor_core::engine::{ExamRunner, FailureMode, RunnerConfig};
use proctor_core::model::ModelConfig;
use proctor_core::traits::ModelAdapter;
use proctor_providers::ProviderRegistry;
use proctor_report::csv::{read_csv, write_csv};
use proctor_report::jsonl::read_jsonl;

use super::{print_summary, RunReporter};

#[allow(clippy::too_many_arguments)]
pub async fn execute(
    input: PathBuf,
    grader_config: PathBuf,
    output: Option<PathBuf>,
    registry_path: Option<PathBuf>,
    on_error: String,
    max_retries: u32,
    verbose: bool,
) -> Result<()> {
    let failure_mode: FailureMode = on_error.parse().map_err(|e: String| anyhow::anyhow!(e))?;

    let answered = match input.extension().and_then(|e| e.to_str()) {
        Some("csv") => read_csv(&input)?,
        _ => read_jsonl(&input)?,
    };
    anyhow::ensure!(
        !answered.is_empty(),
        "input file has no rows: {}",
        input.display()
    );

    let registry = match &registry_path {
        Some(path) => ProviderRegistry::load(path)?,
        None => ProviderRegistry::builtin(),
    };
    let config = ModelConfig::load(&grader_config)?;
    let adapter: Arc<dyn ModelAdapter> = Arc::from(registry.resolve(&config)?);

    let output_dir = output.unwrap_or_else(|| {
        input
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."))
    });
    std::fs::create_dir_all(&output_dir)
        .with_context(|| format!("failed to create output dir: {}", output_dir.display()))?;

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

    let name = input
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("exam")
        .to_string();
    eprintln!(
        "Grading {} answered rows with {}",
        answered.len(),
        config.model_name
    );
    eprintln!();

    let runner = ExamRunner::new(
        adapter,
        RunnerConfig {
            max_retries,
            failure_mode,
            cancel: Some(cancel),
            ..RunnerConfig::default()
        },
    );
    let reporter =
        RunReporter::create(&output_dir.join(format!("{name}_graded.jsonl")), verbose)?;
    let graded = runner.grade_exam(&answered, &reporter).await?;
    write_csv(&graded, &output_dir.join(format!("{name}_graded.csv")))?;

    print_summary(&[(name, graded)]);
    eprintln!("Results saved to: {}", output_dir.display());
    Ok(())
}
