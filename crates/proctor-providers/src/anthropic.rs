//! Anthropic Messages API adapter.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::instrument;

use proctor_core::error::ProviderError;
use proctor_core::model::InferenceResult;
use proctor_core::traits::{ContentBlock, ConversationTurn, ModelAdapter, Role, TurnContent};

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const DEFAULT_TIMEOUT_SECS: u64 = 120;
// max_tokens is a required request parameter for this API.
const DEFAULT_MAX_TOKENS: u32 = 3000;
const DEFAULT_TEMPERATURE: f64 = 1.0;

/// Adapter for Anthropic models.
pub struct AnthropicAdapter {
    api_key: String,
    model_name: String,
    vision: bool,
    system_prompt: Option<String>,
    model_params: Map<String, Value>,
    base_url: String,
    client: reqwest::Client,
}

impl AnthropicAdapter {
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

    /// Request body: hard defaults, then passthrough params over them, then
    /// the fixed fields.
    fn request_body(&self, turns: &[ConversationTurn]) -> Value {
        let mut body = Map::new();
        body.insert("max_tokens".into(), json!(DEFAULT_MAX_TOKENS));
        body.insert("temperature".into(), json!(DEFAULT_TEMPERATURE));
        for (key, value) in &self.model_params {
            body.insert(key.clone(), value.clone());
        }
        body.insert("model".into(), json!(self.model_name));
        body.insert(
            "messages".into(),
            Value::Array(turns.iter().map(wire_message).collect()),
        );
        if let Some(system) = &self.system_prompt {
            body.insert("system".into(), json!(system));
        }
        Value::Object(body)
    }
}

/// Serialize one turn into the Anthropic message shape. Image blocks become
/// embedded base64 source objects.
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
                        "source": {
                            "type": "base64",
                            "media_type": media_type,
                            "data": data,
                        }
                    }),
                    ContentBlock::Text { text } => json!({"type": "text", "text": text}),
                })
                .collect(),
        ),
    };
    json!({"role": role, "content": content})
}

#[derive(Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicContent>,
    #[serde(default)]
    usage: AnthropicUsage,
    model: String,
    #[serde(default)]
    stop_reason: Option<String>,
}

#[derive(Deserialize)]
struct AnthropicContent {
    #[serde(default)]
    text: String,
}

#[derive(Deserialize, Default)]
struct AnthropicUsage {
    #[serde(default)]
    input_tokens: u32,
    #[serde(default)]
    output_tokens: u32,
}

#[derive(Deserialize)]
struct AnthropicError {
    error: AnthropicErrorBody,
}

#[derive(Deserialize)]
struct AnthropicErrorBody {
    message: String,
}

#[async_trait]
impl ModelAdapter for AnthropicAdapter {
    fn provider(&self) -> &str {
        "anthropic"
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
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
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
            let message = serde_json::from_str::<AnthropicError>(&body)
                .map(|e| e.error.message)
                .unwrap_or(body);
            return Err(ProviderError::ApiError { status, message }.into());
        }

        let api_response: AnthropicResponse =
            response.json().await.map_err(|e| ProviderError::ApiError {
                status: 0,
                message: format!("failed to parse response: {e}"),
            })?;

        let stop_reason = api_response.stop_reason.unwrap_or_default();
        if stop_reason != "end_turn" {
            tracing::warn!(
                model = %self.model_name,
                "response did not complete naturally, stop reason is '{stop_reason}'"
            );
        }

        let response_text = api_response
            .content
            .first()
            .map(|c| c.text.clone())
            .unwrap_or_default();

        Ok(InferenceResult {
            response_text,
            input_tokens: api_response.usage.input_tokens,
            output_tokens: api_response.usage.output_tokens,
            stop_reason,
            model_used: api_response.model,
            model_params: self.model_params.clone(),
            system_prompt: self.system_prompt.clone(),
        })
    }
}
