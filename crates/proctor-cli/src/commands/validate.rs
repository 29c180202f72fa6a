//! The `proctor validate` command.

use std::path::PathBuf;

use anyhow::Result;

use proctor_core::parser;

pub fn execute(exam: PathBuf) -> Result<()> {
    let questions = parser::load_exam(&exam)?;
    println!(
        "Exam: {} ({} questions, {} points)",
        exam.display(),
        questions.len(),
        parser::total_points(&questions)
    );

    let warnings = parser::validate_exam(&questions);
    for warning in &warnings {
        let prefix = warning
            .index
            .map(|index| format!("  [{index}]"))
            .unwrap_or_else(|| "  ".to_string());
        println!("{prefix} WARNING: {}", warning.message);
    }

    if warnings.is_empty() {
        println!("Exam is valid.");
    } else {
        println!("\n{} warning(s) found.", warnings.len());
    }

    Ok(())
}
