//! Provider registry and adapter factory.
//!
//! The registry maps provider identifiers to the models they serve, the
//! vision-capable subset, and the environment variable holding the API key.
//! Adapter construction goes through the sealed [`ProviderKind`] enum; an
//! identifier outside the fixed set fails at deserialization time, before
//! any inference call is made.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use proctor_core::error::ExamError;
use proctor_core::model::ModelConfig;
use proctor_core::traits::ModelAdapter;

use crate::anthropic::AnthropicAdapter;
use crate::openai::OpenAiAdapter;

/// The fixed set of supported provider implementations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Anthropic,
    OpenAi,
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderKind::Anthropic => write!(f, "anthropic"),
            ProviderKind::OpenAi => write!(f, "openai"),
        }
    }
}

/// One provider's entry in the registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryEntry {
    /// Which adapter implementation to instantiate.
    pub provider: ProviderKind,
    /// Models this provider serves.
    pub models: Vec<String>,
    /// Subset of `models` that accept image content.
    #[serde(default)]
    pub models_with_vision: Vec<String>,
    /// Environment variable holding the provider's API key.
    pub api_key_env_var: String,
    /// Endpoint override, mainly for OpenAI-compatible gateways and tests.
    #[serde(default)]
    pub base_url: Option<String>,
}

/// Registry of all configured providers, keyed by identifier.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProviderRegistry {
    pub entries: BTreeMap<String, RegistryEntry>,
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

impl ProviderRegistry {
    /// The built-in registry used when no registry file is given.
    pub fn builtin() -> Self {
        let mut entries = BTreeMap::new();
        entries.insert(
            "anthropic".to_string(),
            RegistryEntry {
                provider: ProviderKind::Anthropic,
                models: vec![
                    "claude-sonnet-4-20250514".into(),
                    "claude-haiku-4-5-20251001".into(),
                    "claude-3-5-sonnet-20241022".into(),
                ],
                models_with_vision: vec![
                    "claude-sonnet-4-20250514".into(),
                    "claude-haiku-4-5-20251001".into(),
                    "claude-3-5-sonnet-20241022".into(),
                ],
                api_key_env_var: "ANTHROPIC_API_KEY".into(),
                base_url: None,
            },
        );
        entries.insert(
            "openai".to_string(),
            RegistryEntry {
                provider: ProviderKind::OpenAi,
                models: vec![
                    "gpt-4.1".into(),
                    "gpt-4.1-mini".into(),
                    "gpt-4o".into(),
                    "gpt-4-vision-preview".into(),
                ],
                models_with_vision: vec![
                    "gpt-4o".into(),
                    "gpt-4-vision-preview".into(),
                ],
                api_key_env_var: "OPENAI_API_KEY".into(),
                base_url: None,
            },
        );
        Self { entries }
    }

    /// Load a registry from a JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read provider registry: {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("failed to parse provider registry: {}", path.display()))
    }

    /// Resolve a model config to a concrete adapter.
    ///
    /// Scans entries in order for the provider whose model list contains the
    /// requested name, checks the API key, and derives the vision flag from
    /// registry membership. All failures here are fatal and happen before
    /// any row is processed.
    pub fn resolve(&self, config: &ModelConfig) -> Result<Box<dyn ModelAdapter>> {
        for (name, entry) in &self.entries {
            if !entry.models.iter().any(|m| m == &config.model_name) {
                continue;
            }

            let api_key = std::env::var(&entry.api_key_env_var)
                .ok()
                .filter(|key| !key.is_empty())
                .ok_or_else(|| ExamError::MissingApiKey {
                    provider: name.clone(),
                    env_var: entry.api_key_env_var.clone(),
                })?;

            let vision = entry
                .models_with_vision
                .iter()
                .any(|m| m == &config.model_name);

            let adapter: Box<dyn ModelAdapter> = match entry.provider {
                ProviderKind::Anthropic => Box::new(AnthropicAdapter::new(
                    &api_key,
                    &config.model_name,
                    vision,
                    config.system_prompt.clone(),
                    config.model_params.clone(),
                    entry.base_url.clone(),
                )?),
                ProviderKind::OpenAi => Box::new(OpenAiAdapter::new(
                    &api_key,
                    &config.model_name,
                    vision,
                    config.system_prompt.clone(),
                    config.model_params.clone(),
                    entry.base_url.clone(),
                )?),
            };
            return Ok(adapter);
        }

        Err(ExamError::UnsupportedModel(config.model_name.clone()).into())
    }
}
