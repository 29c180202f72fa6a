//! proctor CLI — the user-facing command-line interface.

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "proctor", version, about = "LLM exam administration and grading harness")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Administer an exam to one or more student models
    Run {
        /// Path to the exam JSONL file
        #[arg(long)]
        exam: PathBuf,

        /// Student model config files (comma-separated for multiple)
        #[arg(long = "student-config", value_delimiter = ',', required = true)]
        student_configs: Vec<PathBuf>,

        /// Grade responses after the student phase
        #[arg(long)]
        grading: bool,

        /// Grader model config file (required with --grading)
        #[arg(long)]
        grader_config: Option<PathBuf>,

        /// Output directory (default: responses/<exam>_output_<timestamp>)
        #[arg(long)]
        output: Option<PathBuf>,

        /// Provider registry JSON file (default: built-in registry)
        #[arg(long)]
        registry: Option<PathBuf>,

        /// Row failure policy: abort or skip
        #[arg(long, default_value = "abort")]
        on_error: String,

        /// Retries per row on transient provider errors
        #[arg(long, default_value = "3")]
        max_retries: u32,

        /// Echo each response as it arrives
        #[arg(long)]
        verbose: bool,
    },

    /// Grade an already-answered exam output
    Grade {
        /// Answered exam output (.csv or .jsonl)
        #[arg(long)]
        input: PathBuf,

        /// Grader model config file
        #[arg(long)]
        grader_config: PathBuf,

        /// Output directory (default: alongside the input)
        #[arg(long)]
        output: Option<PathBuf>,

        /// Provider registry JSON file (default: built-in registry)
        #[arg(long)]
        registry: Option<PathBuf>,

        /// Row failure policy: abort or skip
        #[arg(long, default_value = "abort")]
        on_error: String,

        /// Retries per row on transient provider errors
        #[arg(long, default_value = "3")]
        max_retries: u32,

        /// Echo each grading response as it arrives
        #[arg(long)]
        verbose: bool,
    },

    /// Validate an exam file
    Validate {
        /// Path to the exam JSONL file
        #[arg(long)]
        exam: PathBuf,
    },

    /// List models available through the provider registry
    ListModels {
        /// Provider registry JSON file (default: built-in registry)
        #[arg(long)]
        registry: Option<PathBuf>,
    },

    /// Create a starter exam, model configs, and registry
    Init,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Run {
            exam,
            student_configs,
            grading,
            grader_config,
            output,
            registry,
            on_error,
            max_retries,
            verbose,
        } => {
            commands::run::execute(
                exam,
                student_configs,
                grading,
                grader_config,
                output,
                registry,
                on_error,
                max_retries,
                verbose,
            )
            .await
        }
        Commands::Grade {
            input,
            grader_config,
            output,
            registry,
            on_error,
            max_retries,
            verbose,
        } => {
            commands::grade::execute(
                input,
                grader_config,
                output,
                registry,
                on_error,
                max_retries,
                verbose,
            )
            .await
        }
        Commands::Validate { exam } => commands::validate::execute(exam),
        Commands::ListModels { registry } => commands::list_models::execute(registry),
        Commands::Init => commands::init::execute(),
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}
