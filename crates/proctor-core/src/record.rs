//! Flat output records.
//!
//! Persisted rows are flat maps: the original question fields plus each
//! phase's outcome fields prefixed with the phase name (`student_response`,
//! `grader_score`, ...). `row_to_record` and `row_from_record` are inverses,
//! so answered exams can be written out and later re-loaded for a standalone
//! grading pass.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::model::{ExamQuestion, ExamRow, GraderOutcome, StudentOutcome};

const QUESTION_FIELDS: [&str; 5] = ["index", "question", "answer", "points", "image"];

/// Flatten a row into one output record with phase-prefixed fields.
pub fn row_to_record(row: &ExamRow) -> Result<Map<String, Value>> {
    let mut record = as_object(&row.question).context("failed to serialize question")?;

    if let Some(student) = &row.student {
        for (key, value) in as_object(student).context("failed to serialize student outcome")? {
            record.insert(format!("student_{key}"), value);
        }
    }
    if let Some(grader) = &row.grader {
        for (key, value) in as_object(grader).context("failed to serialize grader outcome")? {
            record.insert(format!("grader_{key}"), value);
        }
    }
    Ok(record)
}

/// Rebuild a row from a flat record. Unknown keys are ignored; a phase with
/// no prefixed keys at all yields `None` for that outcome.
pub fn row_from_record(record: &Map<String, Value>) -> Result<ExamRow> {
    let mut question = Map::new();
    let mut student = Map::new();
    let mut grader = Map::new();

    for (key, value) in record {
        if let Some(field) = key.strip_prefix("student_") {
            student.insert(field.to_string(), value.clone());
        } else if let Some(field) = key.strip_prefix("grader_") {
            grader.insert(field.to_string(), value.clone());
        } else if QUESTION_FIELDS.contains(&key.as_str()) {
            question.insert(key.clone(), value.clone());
        }
    }

    let question: ExamQuestion = serde_json::from_value(Value::Object(question))
        .context("record is missing question fields")?;
    let student: Option<StudentOutcome> = outcome_from(student, "student")?;
    let grader: Option<GraderOutcome> = outcome_from(grader, "grader")?;

    Ok(ExamRow {
        question,
        student,
        grader,
    })
}

fn as_object<T: Serialize>(value: &T) -> Result<Map<String, Value>> {
    match serde_json::to_value(value)? {
        Value::Object(map) => Ok(map),
        other => anyhow::bail!("expected a JSON object, got {other}"),
    }
}

fn outcome_from<T: for<'de> Deserialize<'de>>(
    fields: Map<String, Value>,
    phase: &str,
) -> Result<Option<T>> {
    // A record with no response for this phase has no outcome, even when
    // stray prefixed columns (e.g. empty CSV cells) are present.
    let has_response = fields
        .get("response")
        .is_some_and(|v| !v.is_null() && v.as_str() != Some(""));
    if !has_response {
        return Ok(None);
    }
    let outcome = serde_json::from_value(Value::Object(fields))
        .with_context(|| format!("invalid {phase} fields in record"))?;
    Ok(Some(outcome))
}

/// Per-run rollup printed after each phase.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExamSummary {
    pub rows: usize,
    pub answered: usize,
    pub graded: usize,
    pub total_points: f64,
    pub total_score: f64,
}

impl ExamSummary {
    pub fn compute(rows: &[ExamRow]) -> Self {
        Self {
            rows: rows.len(),
            answered: rows.iter().filter(|r| r.student.is_some()).count(),
            graded: rows.iter().filter(|r| r.grader.is_some()).count(),
            total_points: rows.iter().map(|r| r.question.points).sum(),
            total_score: rows
                .iter()
                .filter_map(|r| r.grader.as_ref().and_then(|g| g.score))
                .sum(),
        }
    }
}
