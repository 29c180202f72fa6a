//! CSV output: the final flat table for a run.
//!
//! Cells are strings; list and object fields are stored as JSON text and a
//! null score is an empty cell. The reader coerces cells back to typed
//! record values, and also accepts the single-quoted list syntax older
//! tooling used for the image column.

use std::path::Path;

use anyhow::{Context, Result};
use serde_json::{Map, Value};
use tracing::warn;

use proctor_core::model::ExamRow;
use proctor_core::record::{row_from_record, row_to_record};

const QUESTION_COLUMNS: [&str; 5] = ["index", "question", "answer", "points", "image"];

const STUDENT_COLUMNS: [&str; 9] = [
    "student_response",
    "student_response_time",
    "student_model_specified",
    "student_model_used",
    "student_input_tokens",
    "student_output_tokens",
    "student_stop_reason",
    "student_model_params",
    "student_system_prompt",
];

const GRADER_COLUMNS: [&str; 11] = [
    "grader_response",
    "grader_score",
    "grader_justification",
    "grader_response_time",
    "grader_model_specified",
    "grader_model_used",
    "grader_input_tokens",
    "grader_output_tokens",
    "grader_stop_reason",
    "grader_model_params",
    "grader_system_prompt",
];

/// Write rows as a CSV table.
pub fn write_csv(rows: &[ExamRow], path: &Path) -> Result<()> {
    let records = rows
        .iter()
        .map(row_to_record)
        .collect::<Result<Vec<_>>>()?;
    let columns = column_order(&records);

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut writer = ::csv::Writer::from_path(path)
        .with_context(|| format!("failed to create output file: {}", path.display()))?;
    writer.write_record(&columns)?;
    for record in &records {
        let cells = columns
            .iter()
            .map(|column| cell_text(record.get(column.as_str())))
            .collect::<Result<Vec<_>>>()?;
        writer.write_record(&cells)?;
    }
    writer.flush()?;
    Ok(())
}

/// Read rows back from a CSV file.
pub fn read_csv(path: &Path) -> Result<Vec<ExamRow>> {
    let mut reader = ::csv::Reader::from_path(path)
        .with_context(|| format!("failed to open input file: {}", path.display()))?;
    let headers = reader.headers()?.clone();

    let mut rows = Vec::new();
    for (row_no, result) in reader.records().enumerate() {
        let record = result?;
        let mut fields = Map::new();
        for (header, cell) in headers.iter().zip(record.iter()) {
            if let Some(value) = coerce_cell(header, cell) {
                fields.insert(header.to_string(), value);
            }
        }
        rows.push(
            row_from_record(&fields)
                .with_context(|| format!("{}: row {}: invalid record", path.display(), row_no + 1))?,
        );
    }
    Ok(rows)
}

/// Column layout: question fields, then the student block, then the grader
/// block, each filtered to what the records actually carry. Keys outside
/// the known layout land at the end, sorted.
fn column_order(records: &[Map<String, Value>]) -> Vec<String> {
    let present = |column: &str| records.iter().any(|r| r.contains_key(column));

    let mut columns: Vec<String> = QUESTION_COLUMNS
        .iter()
        .chain(STUDENT_COLUMNS.iter())
        .chain(GRADER_COLUMNS.iter())
        .filter(|c| present(c))
        .map(|c| c.to_string())
        .collect();

    let mut extra: Vec<String> = records
        .iter()
        .flat_map(|r| r.keys())
        .filter(|k| !columns.iter().any(|c| c == *k))
        .cloned()
        .collect();
    extra.sort();
    extra.dedup();
    columns.extend(extra);
    columns
}

fn cell_text(value: Option<&Value>) -> Result<String> {
    Ok(match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        Some(composite) => serde_json::to_string(composite)?,
    })
}

/// Coerce one CSV cell back to a record value. Returns `None` to drop the
/// key entirely, which lets the record layer apply its defaults.
fn coerce_cell(header: &str, cell: &str) -> Option<Value> {
    if cell.is_empty() {
        return None;
    }
    let field = header
        .strip_prefix("student_")
        .or_else(|| header.strip_prefix("grader_"))
        .unwrap_or(header);

    match field {
        "index" => match cell.parse::<i64>() {
            Ok(n) => Some(Value::from(n)),
            Err(_) => {
                warn!(header, cell, "non-integer cell, ignoring");
                None
            }
        },
        "points" | "score" => match cell.parse::<f64>() {
            Ok(n) => Some(Value::from(n)),
            Err(_) => {
                warn!(header, cell, "non-numeric cell, ignoring");
                None
            }
        },
        "input_tokens" | "output_tokens" => match cell.parse::<u64>() {
            Ok(n) => Some(Value::from(n)),
            Err(_) => {
                warn!(header, cell, "non-integer cell, ignoring");
                None
            }
        },
        "image" => Some(decode_image_list(cell)),
        "model_params" => match serde_json::from_str(cell) {
            Ok(value @ Value::Object(_)) => Some(value),
            _ => {
                warn!(header, cell, "unparseable params cell, ignoring");
                None
            }
        },
        _ => Some(Value::String(cell.to_string())),
    }
}

/// Decode the image column. Accepts a JSON array of strings or the
/// single-quoted literal form `['a.png', 'b.png']`.
fn decode_image_list(cell: &str) -> Value {
    let trimmed = cell.trim();
    if let Ok(value @ Value::Array(_)) = serde_json::from_str(trimmed) {
        return value;
    }

    let inner = trimmed
        .strip_prefix('[')
        .and_then(|s| s.strip_suffix(']'))
        .unwrap_or(trimmed);
    let paths: Vec<Value> = inner
        .split(',')
        .map(|part| part.trim().trim_matches(|c| c == '\'' || c == '"'))
        .filter(|part| !part.is_empty())
        .map(|part| Value::String(part.to_string()))
        .collect();
    Value::Array(paths)
}
