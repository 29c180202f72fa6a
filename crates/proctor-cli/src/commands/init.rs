//! The `proctor init` command.

use anyhow::Result;

use proctor_providers::ProviderRegistry;

pub fn execute() -> Result<()> {
    if std::path::Path::new("registry.json").exists() {
        println!("registry.json already exists, skipping.");
    } else {
        let registry = serde_json::to_string_pretty(&ProviderRegistry::builtin())?;
        std::fs::write("registry.json", registry)?;
        println!("Created registry.json");
    }

    std::fs::create_dir_all("configs")?;
    write_if_absent("configs/student.json", STUDENT_CONFIG)?;
    write_if_absent("configs/grader.json", GRADER_CONFIG)?;

    std::fs::create_dir_all("exams")?;
    write_if_absent("exams/sample_exam.jsonl", SAMPLE_EXAM)?;

    println!("\nNext steps:");
    println!("  1. Export your API keys (ANTHROPIC_API_KEY, OPENAI_API_KEY)");
    println!("  2. Run: proctor validate --exam exams/sample_exam.jsonl");
    println!("  3. Run: proctor run --exam exams/sample_exam.jsonl --student-config configs/student.json");

    Ok(())
}

fn write_if_absent(path: &str, content: &str) -> Result<()> {
    if std::path::Path::new(path).exists() {
        println!("{path} already exists, skipping.");
    } else {
        std::fs::write(path, content)?;
        println!("Created {path}");
    }
    Ok(())
}

const STUDENT_CONFIG: &str = r#"{
  "model_name": "claude-sonnet-4-20250514",
  "system_prompt": "You are a student taking an exam. Answer each question to the best of your ability.",
  "model_params": {
    "max_tokens": 3000,
    "temperature": 1.0
  }
}
"#;

const GRADER_CONFIG: &str = r#"{
  "model_name": "gpt-4.1",
  "system_prompt": "You are grading a student's exam. For each question you receive the question, the student's response, the answer key, and the points available. Respond with a JSON object containing the keys \"grader_score\" (a number) and \"grader_justification\" (a short explanation).",
  "model_params": {
    "temperature": 1.0
  }
}
"#;

const SAMPLE_EXAM: &str = r#"{"index": 1, "question": "What is 2 + 2?", "answer": "4", "points": 5}
{"index": 2, "question": "Name the largest planet in the solar system.", "answer": "Jupiter", "points": 5}
{"index": 3, "question": "In what year did the first human land on the Moon?", "answer": "1969", "points": 10}
"#;
