//! Tolerant parser for grader model output.
//!
//! The grader is asked (via its system prompt) to reply with a JSON object
//! holding `grader_score` and `grader_justification`. Models do not always
//! comply, so parsing degrades in tiers and never fails: a malformed reply
//! yields a missing score and an empty justification, and the raw response
//! text is retained either way.

use serde_json::Value;

/// Parsed grading outcome. `score` is recorded exactly as the grader
/// returned it, with no clamping against the question's point ceiling.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct GradingResult {
    pub score: Option<f64>,
    pub justification: String,
}

/// Extract a score and justification from free-form grader output.
///
/// Tiers:
/// 1. not valid JSON: warn, return defaults;
/// 2. valid JSON missing `grader_score` and/or `grader_justification`: warn
///    per missing key, use whichever keys are present;
/// 3. both present: copied verbatim.
pub fn parse_grader_response(index: i64, raw: &str) -> GradingResult {
    let value: Value = match serde_json::from_str(raw) {
        Ok(v) => v,
        Err(_) => {
            tracing::warn!(
                index,
                "failed to decode JSON from grader response text for question [{index}]"
            );
            return GradingResult::default();
        }
    };

    let Some(object) = value.as_object() else {
        tracing::warn!(
            index,
            "grader response for question [{index}] is valid JSON but not an object"
        );
        return GradingResult::default();
    };

    let mut result = GradingResult::default();

    match object.get("grader_score") {
        Some(score) => match score.as_f64() {
            Some(n) => result.score = Some(n),
            None => {
                tracing::warn!(
                    index,
                    "grader_score for question [{index}] is not numeric: {score}"
                );
            }
        },
        None => {
            tracing::warn!(
                index,
                "decoded JSON from grader response for question [{index}] but missing key: 'grader_score'"
            );
        }
    }

    match object.get("grader_justification") {
        Some(justification) => {
            result.justification = match justification {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
        }
        None => {
            tracing::warn!(
                index,
                "decoded JSON from grader response for question [{index}] but missing key: 'grader_justification'"
            );
        }
    }

    result
}
