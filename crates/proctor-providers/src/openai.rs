//! OpenAI chat completions adapter. Also speaks to OpenAI-compatible
//! endpoints via a registry `base_url` override.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::instrument;

use proctor_core::error::ProviderError;
use proctor_core::model::InferenceResult;
use proctor_core::traits::{ContentBlock, ConversationTurn, ModelAdapter, Role, TurnContent};

const DEFAULT_BASE_URL: &str = "https://api.openai.com";
const DEFAULT_TIMEOUT_SECS: u64 = 120;
const DEFAULT_TEMPERATURE: f64 = 1.0;

/// Adapter for OpenAI chat models.
pub struct OpenAiAdapter {
    api_key: String,
    model_name: String,
    vision: bool,
    system_prompt: Option<String>,
    model_params: Map<String, Value>,
    base_url: String,
    client: reqwest::Client,
}

impl OpenAiAdapter {
    pub fn new(
        api_key: &str,
        model_name: &str,
        vision: bool,
        system_prompt: Option<String>,
        model_params: Map<String, Value>,
        base_url: Option<String>,
    ) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            api_key: api_key.to_string(),
            model_name: model_name.to_string(),
            vision,
            system_prompt,
            model_params,
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            client,
        })
    }

    fn request_body(&self, turns: &[ConversationTurn]) -> Value {
        // The system prompt rides as a leading system message here, unlike
        // the Anthropic top-level field.
        let mut messages = Vec::with_capacity(turns.len() + 1);
        if let Some(system) = &self.system_prompt {
            messages.push(json!({"role": "system", "content": system}));
        }
        messages.extend(turns.iter().map(wire_message));

        let mut body = Map::new();
        body.insert("temperature".into(), json!(DEFAULT_TEMPERATURE));
        for (key, value) in &self.model_params {
            body.insert(key.clone(), value.clone());
        }
        body.insert("model".into(), json!(self.model_name));
        body.insert("messages".into(), Value::Array(messages));
        Value::Object(body)
    }
}

/// Serialize one turn into the chat-completions message shape. Image blocks
/// become base64 data-URL strings.
fn wire_message(turn: &ConversationTurn) -> Value {
    let role = match turn.role {
        Role::User => "user",
        Role::Assistant => "assistant",
        Role::System => "system",
    };
    let content = match &turn.content {
        TurnContent::Text(text) => Value::String(text.clone()),
        TurnContent::Blocks(blocks) => Value::Array(
            blocks
                .iter()
                .map(|block| match block {
                    ContentBlock::Image { media_type, data } => json!({
                        "type": "image",
                        "image_url": format!("data:{media_type};base64,{data}"),
                    }),
                    ContentBlock::Text { text } => json!({"type": "text", "text": text}),
                })
                .collect(),
        ),
    };
    json!({"role": role, "content": content})
}

#[derive(Deserialize)]
struct OpenAiResponse {
    choices: Vec<OpenAiChoice>,
    #[serde(default)]
    usage: OpenAiUsage,
    model: String,
}

#[derive(Deserialize)]
struct OpenAiChoice {
    message: OpenAiChoiceMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct OpenAiChoiceMessage {
    #[serde(default)]
    content: String,
}

#[derive(Deserialize, Default)]
struct OpenAiUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
}

#[async_trait]
impl ModelAdapter for OpenAiAdapter {
    fn provider(&self) -> &str {
        "openai"
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }

    fn vision(&self) -> bool {
        self.vision
    }

    fn system_prompt(&self) -> Option<&str> {
        self.system_prompt.as_deref()
    }

    fn model_params(&self) -> &Map<String, Value> {
        &self.model_params
    }

    #[instrument(skip(self, turns), fields(model = %self.model_name))]
    async fn generate(&self, turns: &[ConversationTurn]) -> anyhow::Result<InferenceResult> {
        let body = self.request_body(turns);

        let response = self
            .client
            .post(format!("{}/v1/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProviderError::Timeout(DEFAULT_TIMEOUT_SECS)
                } else {
                    ProviderError::NetworkError(e.to_string())
                }
            })?;

        let status = response.status().as_u16();
        if status == 429 {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(5)
                .saturating_mul(1000);
            return Err(ProviderError::RateLimited {
                retry_after_ms: retry_after,
            }
            .into());
        }
        if status == 401 {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::AuthenticationFailed(body).into());
        }
        if status == 404 {
            return Err(ProviderError::ModelNotFound(self.model_name.clone()).into());
        }
        if status >= 400 {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::ApiError {
                status,
                message: body,
            }
            .into());
        }

        let api_response: OpenAiResponse =
            response.json().await.map_err(|e| ProviderError::ApiError {
                status: 0,
                message: format!("failed to parse response: {e}"),
            })?;

        let (response_text, stop_reason) = api_response
            .choices
            .first()
            .map(|c| {
                (
                    c.message.content.clone(),
                    c.finish_reason.clone().unwrap_or_default(),
                )
            })
            .unwrap_or_default();

        if stop_reason != "stop" {
            tracing::warn!(
                model = %self.model_name,
                "response did not complete naturally, finish reason is '{stop_reason}'"
            );
        }

        Ok(InferenceResult {
            response_text,
            input_tokens: api_response.usage.prompt_tokens,
            output_tokens: api_response.usage.completion_tokens,
            stop_reason,
            model_used: api_response.model,
            model_params: self.model_params.clone(),
            system_prompt: self.system_prompt.clone(),
        })
    }
}
