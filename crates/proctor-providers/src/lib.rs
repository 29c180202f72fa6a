//! proctor-providers — model adapter implementations.
//!
//! Implements the `ModelAdapter` trait for the Anthropic and OpenAI APIs and
//! provides the sealed registry that resolves a model-selection config to a
//! concrete adapter.

pub mod anthropic;
pub mod openai;
pub mod registry;

pub use proctor_core::error::ProviderError;
pub use registry::{ProviderKind, ProviderRegistry, RegistryEntry};
