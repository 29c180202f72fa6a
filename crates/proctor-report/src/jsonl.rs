//! JSONL output: one flat record per line.
//!
//! The writer appends and flushes after every record, so a run aborted
//! mid-exam leaves every completed row on disk.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use anyhow::{Context, Result};
use serde_json::{Map, Value};

use proctor_core::model::ExamRow;
use proctor_core::record::{row_from_record, row_to_record};

/// Incremental JSONL writer.
pub struct JsonlWriter {
    inner: BufWriter<File>,
}

impl JsonlWriter {
    /// Create (truncating) the output file.
    pub fn create(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = File::create(path)
            .with_context(|| format!("failed to create output file: {}", path.display()))?;
        Ok(Self {
            inner: BufWriter::new(file),
        })
    }

    /// Append one row and flush it to disk.
    pub fn append(&mut self, row: &ExamRow) -> Result<()> {
        let record = row_to_record(row)?;
        serde_json::to_writer(&mut self.inner, &Value::Object(record))?;
        self.inner.write_all(b"\n")?;
        self.inner.flush()?;
        Ok(())
    }
}

/// Write a full set of rows in one go.
pub fn write_jsonl(rows: &[ExamRow], path: &Path) -> Result<()> {
    let mut writer = JsonlWriter::create(path)?;
    for row in rows {
        writer.append(row)?;
    }
    Ok(())
}

/// Read rows back from a JSONL file. Blank lines are skipped.
pub fn read_jsonl(path: &Path) -> Result<Vec<ExamRow>> {
    let file = File::open(path)
        .with_context(|| format!("failed to open output file: {}", path.display()))?;
    let reader = BufReader::new(file);

    let mut rows = Vec::new();
    for (line_no, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let record: Map<String, Value> = serde_json::from_str(&line)
            .with_context(|| format!("{}:{}: invalid JSON record", path.display(), line_no + 1))?;
        rows.push(
            row_from_record(&record)
                .with_context(|| format!("{}:{}: invalid row", path.display(), line_no + 1))?,
        );
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proctor_core::model::{ExamQuestion, InferenceResult, StudentOutcome};
    use serde_json::Map;

    fn answered_row(index: i64) -> ExamRow {
        let question = ExamQuestion {
            index,
            question: format!("Q{index}"),
            answer: format!("K{index}"),
            points: 2.0,
            image: vec![],
        };
        ExamRow::from_question(question).with_student(StudentOutcome::from_inference(
            "m",
            InferenceResult {
                response_text: format!("A{index}"),
                input_tokens: 10,
                output_tokens: 2,
                stop_reason: "end_turn".into(),
                model_used: "m-1".into(),
                model_params: Map::new(),
                system_prompt: None,
            },
        ))
    }

    #[test]
    fn incremental_append_survives_partial_runs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.jsonl");

        let mut writer = JsonlWriter::create(&path).unwrap();
        writer.append(&answered_row(1)).unwrap();
        writer.append(&answered_row(2)).unwrap();
        // drop without any finalization step, as an aborted run would
        drop(writer);

        let rows = read_jsonl(&path).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].question.index, 1);
        assert_eq!(rows[1].student_response(), Some("A2"));
    }

    #[test]
    fn round_trip_preserves_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.jsonl");
        let rows = vec![answered_row(1), answered_row(2), answered_row(3)];

        write_jsonl(&rows, &path).unwrap();
        let loaded = read_jsonl(&path).unwrap();

        assert_eq!(loaded.len(), 3);
        for (original, loaded) in rows.iter().zip(&loaded) {
            assert_eq!(original.question.index, loaded.question.index);
            assert_eq!(original.student_response(), loaded.student_response());
        }
    }

    #[test]
    fn invalid_line_reports_line_number() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.jsonl");
        std::fs::write(&path, "{\"index\": 1, \"question\": \"Q\", \"answer\": \"A\", \"points\": 1.0}\nnot json\n").unwrap();

        let err = read_jsonl(&path).unwrap_err();
        assert!(err.to_string().contains(":2"));
    }
}
