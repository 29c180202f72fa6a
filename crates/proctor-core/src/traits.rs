//! The model-adapter trait and the conversation assembly shared by every
//! provider.
//!
//! Both phases and both provider variants build the same turn structure: one
//! user/assistant pair per completed history row, then the current prompt as
//! the final user turn, with image blocks (if any) ordered before a trailing
//! text block. Providers only differ in how they serialize these turns onto
//! the wire.

use async_trait::async_trait;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::Path;

use crate::error::ExamError;
use crate::model::{ExamQuestion, ExamRow, InferenceResult};

// ---------------------------------------------------------------------------
// Conversation types
// ---------------------------------------------------------------------------

/// Speaker of a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One block of multimodal content. Image blocks always precede the trailing
/// text block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ContentBlock {
    Image { media_type: String, data: String },
    Text { text: String },
}

/// Turn content: plain text, or an ordered list of content blocks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TurnContent {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

/// A single turn fed to a model adapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: Role,
    pub content: TurnContent,
}

impl ConversationTurn {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: TurnContent::Text(text.into()),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: TurnContent::Text(text.into()),
        }
    }

    pub fn user_blocks(blocks: Vec<ContentBlock>) -> Self {
        Self {
            role: Role::User,
            content: TurnContent::Blocks(blocks),
        }
    }

    /// The text of this turn: the plain text, or the trailing text block.
    pub fn text(&self) -> &str {
        match &self.content {
            TurnContent::Text(t) => t,
            TurnContent::Blocks(blocks) => blocks
                .iter()
                .rev()
                .find_map(|b| match b {
                    ContentBlock::Text { text } => Some(text.as_str()),
                    _ => None,
                })
                .unwrap_or(""),
        }
    }
}

// ---------------------------------------------------------------------------
// Model adapter trait
// ---------------------------------------------------------------------------

impl std::fmt::Debug for dyn ModelAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelAdapter")
            .field("provider", &self.provider())
            .field("model", &self.model_name())
            .finish_non_exhaustive()
    }
}

/// Trait for provider-specific model adapters.
///
/// One concrete type exists per provider, selected through the sealed
/// registry in `proctor-providers`. Input preparation is shared via the
/// default methods; only `generate` is provider-shaped.
#[async_trait]
pub trait ModelAdapter: Send + Sync {
    /// Provider identifier (e.g. "anthropic").
    fn provider(&self) -> &str;

    /// The model name this adapter was configured with.
    fn model_name(&self) -> &str;

    /// Whether this model accepts image content blocks. Derived from the
    /// registry, never from user input.
    fn vision(&self) -> bool;

    /// The configured system prompt, if any.
    fn system_prompt(&self) -> Option<&str>;

    /// Passthrough parameters merged over the provider's hard defaults.
    fn model_params(&self) -> &Map<String, Value>;

    /// Assemble the student-phase turns for one question given the completed
    /// history so far.
    fn prepare_student_input(
        &self,
        question: &ExamQuestion,
        history: &[ExamRow],
    ) -> Result<Vec<ConversationTurn>, ExamError> {
        student_turns(question, history, self.vision())
    }

    /// Assemble the grader-phase turns for one answered row given the graded
    /// history so far.
    fn prepare_grader_input(
        &self,
        row: &ExamRow,
        history: &[ExamRow],
    ) -> Result<Vec<ConversationTurn>, ExamError> {
        grader_turns(row, history, self.vision())
    }

    /// Issue one blocking inference call and normalize the provider's reply.
    async fn generate(&self, turns: &[ConversationTurn]) -> anyhow::Result<InferenceResult>;
}

// ---------------------------------------------------------------------------
// Shared assembly
// ---------------------------------------------------------------------------

/// The grader prompt template. Identical text across providers.
pub fn grader_prompt(question: &str, student_response: &str, answer: &str, points: f64) -> String {
    format!(
        "Question: {question}\n\
         Student response: {student_response}\n\
         Answer key: {answer}\n\
         Total points available: {points}\n"
    )
}

/// Build the student-phase turn list: one user/assistant pair per history
/// row, then the current question as the final user turn.
pub fn student_turns(
    question: &ExamQuestion,
    history: &[ExamRow],
    vision: bool,
) -> Result<Vec<ConversationTurn>, ExamError> {
    let mut turns = Vec::with_capacity(history.len() * 2 + 1);
    for entry in history {
        let Some(response) = entry.student_response() else {
            continue;
        };
        turns.push(ConversationTurn::user(entry.question.question.clone()));
        turns.push(ConversationTurn::assistant(response));
    }
    turns.push(question_turn(question, &question.question, vision)?);
    Ok(turns)
}

/// Build the grader-phase turn list. Each user turn is the fixed grading
/// template filled from the current or historical row; assistant turns are
/// the recorded grader responses.
pub fn grader_turns(
    row: &ExamRow,
    history: &[ExamRow],
    vision: bool,
) -> Result<Vec<ConversationTurn>, ExamError> {
    let mut turns = Vec::with_capacity(history.len() * 2 + 1);
    for entry in history {
        let (Some(student), Some(grader)) =
            (entry.student_response(), entry.grader_response())
        else {
            continue;
        };
        turns.push(ConversationTurn::user(grader_prompt(
            &entry.question.question,
            student,
            &entry.question.answer,
            entry.question.points,
        )));
        turns.push(ConversationTurn::assistant(grader));
    }

    let student = row
        .student_response()
        .ok_or(ExamError::MissingStudentResponse(row.question.index))?;
    let prompt = grader_prompt(
        &row.question.question,
        student,
        &row.question.answer,
        row.question.points,
    );
    turns.push(question_turn(&row.question, &prompt, vision)?);
    Ok(turns)
}

/// Build the final user turn for a question, attaching its images when the
/// adapter has vision. Without vision, images are dropped with a warning and
/// the turn degrades to text-only.
fn question_turn(
    question: &ExamQuestion,
    text: &str,
    vision: bool,
) -> Result<ConversationTurn, ExamError> {
    if question.image.is_empty() {
        return Ok(ConversationTurn::user(text));
    }
    if !vision {
        tracing::warn!(
            index = question.index,
            "question has images but the selected model does not have vision \
             capabilities; ignoring images and processing text only"
        );
        return Ok(ConversationTurn::user(text));
    }

    let mut blocks = Vec::with_capacity(question.image.len() + 1);
    for path in &question.image {
        blocks.push(encode_image(path)?);
    }
    // The question text is always the last block.
    blocks.push(ContentBlock::Text { text: text.into() });
    Ok(ConversationTurn::user_blocks(blocks))
}

/// Read and base64-encode one image file, tagging the media type from its
/// file extension.
pub fn encode_image(path: &Path) -> Result<ContentBlock, ExamError> {
    let bytes = std::fs::read(path).map_err(|source| ExamError::Image {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(ContentBlock::Image {
        media_type: media_type_for(path),
        data: base64::engine::general_purpose::STANDARD.encode(bytes),
    })
}

fn media_type_for(path: &Path) -> String {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("png")
        .to_lowercase();
    let ext = match ext.as_str() {
        "jpg" => "jpeg",
        other => other,
    };
    format!("image/{ext}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::StudentOutcome;
    use chrono::Utc;
    use std::io::Write;

    fn question(index: i64, text: &str) -> ExamQuestion {
        ExamQuestion {
            index,
            question: text.into(),
            answer: "key".into(),
            points: 10.0,
            image: vec![],
        }
    }

    fn answered(index: i64, text: &str, response: &str) -> ExamRow {
        ExamRow::from_question(question(index, text)).with_student(StudentOutcome {
            response: response.into(),
            response_time: Utc::now(),
            model_specified: "m".into(),
            model_used: "m".into(),
            input_tokens: 0,
            output_tokens: 0,
            stop_reason: "end_turn".into(),
            model_params: Map::new(),
            system_prompt: None,
        })
    }

    #[test]
    fn student_turns_pair_history_in_order() {
        let history = vec![answered(1, "Q1", "A1"), answered(2, "Q2", "A2")];
        let turns = student_turns(&question(3, "Q3"), &history, false).unwrap();

        assert_eq!(turns.len(), 5);
        assert_eq!(turns[0].role, Role::User);
        assert_eq!(turns[0].text(), "Q1");
        assert_eq!(turns[1].role, Role::Assistant);
        assert_eq!(turns[1].text(), "A1");
        assert_eq!(turns[2].text(), "Q2");
        assert_eq!(turns[3].text(), "A2");
        assert_eq!(turns[4].role, Role::User);
        assert_eq!(turns[4].text(), "Q3");
    }

    #[test]
    fn grader_prompt_template() {
        let prompt = grader_prompt("What is 2+2?", "4", "4", 5.0);
        assert_eq!(
            prompt,
            "Question: What is 2+2?\nStudent response: 4\nAnswer key: 4\nTotal points available: 5\n"
        );
    }

    #[test]
    fn grader_turns_use_template_and_recorded_responses() {
        let mut graded = answered(1, "Q1", "A1");
        graded.grader = Some(crate::model::GraderOutcome {
            response: r#"{"grader_score": 5}"#.into(),
            score: Some(5.0),
            justification: String::new(),
            response_time: Utc::now(),
            model_specified: "g".into(),
            model_used: "g".into(),
            input_tokens: 0,
            output_tokens: 0,
            stop_reason: "stop".into(),
            model_params: Map::new(),
            system_prompt: None,
        });
        let current = answered(2, "Q2", "A2");

        let turns = grader_turns(&current, &[graded], false).unwrap();
        assert_eq!(turns.len(), 3);
        assert!(turns[0].text().starts_with("Question: Q1\nStudent response: A1\n"));
        assert_eq!(turns[1].text(), r#"{"grader_score": 5}"#);
        assert!(turns[2].text().contains("Student response: A2"));
    }

    #[test]
    fn grader_turns_require_student_response() {
        let row = ExamRow::from_question(question(7, "Q"));
        let err = grader_turns(&row, &[], false).unwrap_err();
        assert!(matches!(err, ExamError::MissingStudentResponse(7)));
    }

    #[test]
    fn vision_disabled_drops_images_without_error() {
        let mut q = question(1, "Describe the figure");
        q.image = vec!["fig1.png".into()];
        let turns = student_turns(&q, &[], false).unwrap();
        assert_eq!(turns.len(), 1);
        assert!(matches!(turns[0].content, TurnContent::Text(_)));
    }

    #[test]
    fn vision_enabled_orders_images_before_trailing_text() {
        let dir = tempfile::tempdir().unwrap();
        let img = dir.path().join("diagram.png");
        let mut file = std::fs::File::create(&img).unwrap();
        file.write_all(b"\x89PNG fake").unwrap();

        let mut q = question(1, "Describe the figure");
        q.image = vec![img];
        let turns = student_turns(&q, &[], true).unwrap();

        let TurnContent::Blocks(blocks) = &turns[0].content else {
            panic!("expected content blocks");
        };
        assert_eq!(blocks.len(), 2);
        assert!(matches!(
            &blocks[0],
            ContentBlock::Image { media_type, .. } if media_type == "image/png"
        ));
        assert!(matches!(
            &blocks[1],
            ContentBlock::Text { text } if text == "Describe the figure"
        ));
    }

    #[test]
    fn missing_image_is_a_row_error() {
        let mut q = question(1, "Q");
        q.image = vec!["definitely/not/here.png".into()];
        let err = student_turns(&q, &[], true).unwrap_err();
        assert!(matches!(err, ExamError::Image { .. }));
    }

    #[test]
    fn media_type_from_extension() {
        assert_eq!(media_type_for(Path::new("a.png")), "image/png");
        assert_eq!(media_type_for(Path::new("a.JPG")), "image/jpeg");
        assert_eq!(media_type_for(Path::new("a.webp")), "image/webp");
    }
}
