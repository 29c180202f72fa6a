//! Exam file loading and validation.
//!
//! Exams are JSONL: one question object per line with `index`, `question`,
//! `answer`, `points`, and an optional `image` path list.

use std::path::Path;

use anyhow::{Context, Result};

use crate::model::ExamQuestion;

/// Load an exam from a JSONL file, in file order.
pub fn load_exam(path: &Path) -> Result<Vec<ExamQuestion>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read exam file: {}", path.display()))?;
    load_exam_str(&content, path)
}

/// Parse JSONL exam content (useful for testing).
pub fn load_exam_str(content: &str, source_path: &Path) -> Result<Vec<ExamQuestion>> {
    content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(i, line)| {
            serde_json::from_str(line).with_context(|| {
                format!("invalid question on line {} of {}", i + 1, source_path.display())
            })
        })
        .collect()
}

/// A warning from exam validation.
#[derive(Debug, Clone)]
pub struct ValidationWarning {
    /// The question index, if the warning is row-scoped.
    pub index: Option<i64>,
    /// Warning message.
    pub message: String,
}

/// Validate an exam for common issues. Warnings, not errors: the runner will
/// happily process a flawed exam, this exists so operators catch problems
/// before spending tokens.
pub fn validate_exam(questions: &[ExamQuestion]) -> Vec<ValidationWarning> {
    let mut warnings = Vec::new();

    let mut seen = std::collections::HashSet::new();
    for q in questions {
        if !seen.insert(q.index) {
            warnings.push(ValidationWarning {
                index: Some(q.index),
                message: format!("duplicate question index: {}", q.index),
            });
        }
    }

    for q in questions {
        if q.question.trim().is_empty() {
            warnings.push(ValidationWarning {
                index: Some(q.index),
                message: "question text is empty".into(),
            });
        }
        if q.points <= 0.0 {
            warnings.push(ValidationWarning {
                index: Some(q.index),
                message: format!("points is not positive: {}", q.points),
            });
        }
        for image in &q.image {
            if !image.exists() {
                warnings.push(ValidationWarning {
                    index: Some(q.index),
                    message: format!("image file not found: {}", image.display()),
                });
            }
        }
    }

    warnings
}

/// Sum of the point ceilings across all questions.
pub fn total_points(questions: &[ExamQuestion]) -> f64 {
    questions.iter().map(|q| q.points).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    const VALID_EXAM: &str = r#"{"index": 1, "question": "What is 2+2?", "answer": "4", "points": 5, "image": []}
{"index": 2, "question": "Name the figure", "answer": "triangle", "points": 10, "image": ["fig1.png"]}
"#;

    #[test]
    fn load_valid_exam() {
        let exam = load_exam_str(VALID_EXAM, &PathBuf::from("exam.jsonl")).unwrap();
        assert_eq!(exam.len(), 2);
        assert_eq!(exam[0].index, 1);
        assert_eq!(exam[0].points, 5.0);
        assert_eq!(exam[1].image, vec![PathBuf::from("fig1.png")]);
    }

    #[test]
    fn load_preserves_file_order() {
        let content = r#"{"index": 9, "question": "Q9", "answer": "A", "points": 1}
{"index": 3, "question": "Q3", "answer": "A", "points": 1}
"#;
        let exam = load_exam_str(content, &PathBuf::from("exam.jsonl")).unwrap();
        let indexes: Vec<i64> = exam.iter().map(|q| q.index).collect();
        assert_eq!(indexes, vec![9, 3]);
    }

    #[test]
    fn load_skips_blank_lines() {
        let content = "\n{\"index\": 1, \"question\": \"Q\", \"answer\": \"A\", \"points\": 1}\n\n";
        let exam = load_exam_str(content, &PathBuf::from("exam.jsonl")).unwrap();
        assert_eq!(exam.len(), 1);
    }

    #[test]
    fn load_malformed_line_reports_line_number() {
        let content = "{\"index\": 1, \"question\": \"Q\", \"answer\": \"A\", \"points\": 1}\nnot json\n";
        let err = load_exam_str(content, &PathBuf::from("exam.jsonl")).unwrap_err();
        assert!(err.to_string().contains("line 2"));
    }

    #[test]
    fn validate_duplicate_indexes() {
        let content = "{\"index\": 1, \"question\": \"Q\", \"answer\": \"A\", \"points\": 1}\n{\"index\": 1, \"question\": \"Q2\", \"answer\": \"A\", \"points\": 1}\n";
        let exam = load_exam_str(content, &PathBuf::from("exam.jsonl")).unwrap();
        let warnings = validate_exam(&exam);
        assert!(warnings.iter().any(|w| w.message.contains("duplicate")));
    }

    #[test]
    fn validate_missing_image() {
        let exam = load_exam_str(VALID_EXAM, &PathBuf::from("exam.jsonl")).unwrap();
        let warnings = validate_exam(&exam);
        assert!(warnings
            .iter()
            .any(|w| w.message.contains("image file not found")));
    }

    #[test]
    fn validate_empty_question_and_zero_points() {
        let content = "{\"index\": 1, \"question\": \"  \", \"answer\": \"A\", \"points\": 0}\n";
        let exam = load_exam_str(content, &PathBuf::from("exam.jsonl")).unwrap();
        let warnings = validate_exam(&exam);
        assert!(warnings.iter().any(|w| w.message.contains("empty")));
        assert!(warnings.iter().any(|w| w.message.contains("not positive")));
    }

    #[test]
    fn sum_total_points() {
        let exam = load_exam_str(VALID_EXAM, &PathBuf::from("exam.jsonl")).unwrap();
        assert_eq!(total_points(&exam), 15.0);
    }
}
