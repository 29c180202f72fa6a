//! Core data model types for proctor.
//!
//! An exam is an ordered list of [`ExamQuestion`]s. As each phase runs, the
//! runner merges that phase's outcome into a fresh [`ExamRow`]; the original
//! question is never mutated, and completed rows double as the conversation
//! history for the rows that follow.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::grading::GradingResult;

/// A single exam question as loaded from the input file. Immutable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExamQuestion {
    /// Unique, stable ordering key.
    pub index: i64,
    /// The question text shown to the student model.
    pub question: String,
    /// The answer key the grader scores against.
    pub answer: String,
    /// Point ceiling for this question.
    pub points: f64,
    /// Image files attached to the question, in order. Possibly empty.
    #[serde(default)]
    pub image: Vec<PathBuf>,
}

/// Selection of one model plus its prompt and passthrough parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Model identifier (e.g. "claude-sonnet-4-20250514").
    pub model_name: String,
    /// Optional system prompt.
    #[serde(default)]
    pub system_prompt: Option<String>,
    /// Opaque provider-passthrough parameters (temperature, max_tokens, ...).
    /// Override the adapter's hard defaults key by key.
    #[serde(default)]
    pub model_params: Map<String, Value>,
}

impl ModelConfig {
    /// Load a model config from a JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read model config: {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("failed to parse model config: {}", path.display()))
    }
}

/// Normalized result of one inference call, uniform across providers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InferenceResult {
    /// The provider's response text.
    pub response_text: String,
    /// Input token count reported by the provider.
    pub input_tokens: u32,
    /// Output token count reported by the provider.
    pub output_tokens: u32,
    /// Provider-specific stop/finish reason.
    pub stop_reason: String,
    /// Model the provider actually used. May differ from the requested name.
    pub model_used: String,
    /// The request's effective passthrough parameters, echoed back.
    pub model_params: Map<String, Value>,
    /// The system prompt attached to the request, echoed back.
    pub system_prompt: Option<String>,
}

fn now() -> DateTime<Utc> {
    Utc::now()
}

/// What the student phase recorded for one question.
///
/// Field names are deliberately the unprefixed output-record fields; the flat
/// record layer prefixes them with `student_`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StudentOutcome {
    pub response: String,
    #[serde(default = "now")]
    pub response_time: DateTime<Utc>,
    #[serde(default)]
    pub model_specified: String,
    #[serde(default)]
    pub model_used: String,
    #[serde(default)]
    pub input_tokens: u32,
    #[serde(default)]
    pub output_tokens: u32,
    #[serde(default)]
    pub stop_reason: String,
    #[serde(default)]
    pub model_params: Map<String, Value>,
    #[serde(default)]
    pub system_prompt: Option<String>,
}

impl StudentOutcome {
    pub fn from_inference(model_specified: &str, result: InferenceResult) -> Self {
        Self {
            response: result.response_text,
            response_time: Utc::now(),
            model_specified: model_specified.to_string(),
            model_used: result.model_used,
            input_tokens: result.input_tokens,
            output_tokens: result.output_tokens,
            stop_reason: result.stop_reason,
            model_params: result.model_params,
            system_prompt: result.system_prompt,
        }
    }
}

/// What the grader phase recorded for one question.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraderOutcome {
    /// Raw grader response text, always retained.
    pub response: String,
    /// Score as returned by the grader. Absent when the response could not be
    /// parsed; never clamped against `points`.
    #[serde(default)]
    pub score: Option<f64>,
    #[serde(default)]
    pub justification: String,
    #[serde(default = "now")]
    pub response_time: DateTime<Utc>,
    #[serde(default)]
    pub model_specified: String,
    #[serde(default)]
    pub model_used: String,
    #[serde(default)]
    pub input_tokens: u32,
    #[serde(default)]
    pub output_tokens: u32,
    #[serde(default)]
    pub stop_reason: String,
    #[serde(default)]
    pub model_params: Map<String, Value>,
    #[serde(default)]
    pub system_prompt: Option<String>,
}

impl GraderOutcome {
    pub fn from_inference(
        model_specified: &str,
        result: InferenceResult,
        grading: GradingResult,
    ) -> Self {
        Self {
            response: result.response_text,
            score: grading.score,
            justification: grading.justification,
            response_time: Utc::now(),
            model_specified: model_specified.to_string(),
            model_used: result.model_used,
            input_tokens: result.input_tokens,
            output_tokens: result.output_tokens,
            stop_reason: result.stop_reason,
            model_params: result.model_params,
            system_prompt: result.system_prompt,
        }
    }
}

/// One exam question together with whatever phase outcomes exist for it.
///
/// Rows are merged functionally: each phase produces a new row value rather
/// than mutating a shared one, so independent runs can never contaminate each
/// other's history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExamRow {
    pub question: ExamQuestion,
    #[serde(default)]
    pub student: Option<StudentOutcome>,
    #[serde(default)]
    pub grader: Option<GraderOutcome>,
}

impl ExamRow {
    pub fn from_question(question: ExamQuestion) -> Self {
        Self {
            question,
            student: None,
            grader: None,
        }
    }

    /// Merge a student outcome into a new row value.
    pub fn with_student(self, student: StudentOutcome) -> Self {
        Self {
            student: Some(student),
            ..self
        }
    }

    /// Merge a grader outcome into a new row value.
    pub fn with_grader(self, grader: GraderOutcome) -> Self {
        Self {
            grader: Some(grader),
            ..self
        }
    }

    /// The recorded student answer, if the student phase completed this row.
    pub fn student_response(&self) -> Option<&str> {
        self.student.as_ref().map(|s| s.response.as_str())
    }

    /// The recorded grader response text, if the grader phase completed.
    pub fn grader_response(&self) -> Option<&str> {
        self.grader.as_ref().map(|g| g.response.as_str())
    }
}
