//! Gateway trait — the single seam to the hosted chat model.

use async_trait::async_trait;
use serde::Serialize;
use uuid::Uuid;

use crate::error::LlmError;
use crate::session::model::{ModelId, SessionConfig};
use crate::session::transcript::Turn;

/// Sampling parameters sent with every request of a chat.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GenerationConfig {
    pub temperature: f32,
    pub top_p: f32,
    pub top_k: u32,
    pub max_output_tokens: u32,
}

impl GenerationConfig {
    pub fn with_temperature(temperature: f32) -> Self {
        Self {
            temperature,
            ..Self::default()
        }
    }
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            temperature: 0.5,
            top_p: 0.95,
            top_k: 40,
            max_output_tokens: 8192,
        }
    }
}

/// Opaque handle for one chat, created when a session starts.
///
/// Gateways read it but never change it; a new configuration always means a
/// new handle.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatHandle {
    pub id: Uuid,
    pub model: ModelId,
    pub generation: GenerationConfig,
}

impl ChatHandle {
    pub fn for_config(config: &SessionConfig) -> Self {
        Self {
            id: Uuid::new_v4(),
            model: config.model,
            generation: GenerationConfig::with_temperature(config.temperature.value()),
        }
    }
}

/// A hosted chat model.
///
/// Implementations send `history` followed by `text` and return the model's
/// reply. They never retry; retry policy belongs to the caller.
#[async_trait]
pub trait ChatGateway: Send + Sync {
    /// Provider name used in errors and logs.
    fn name(&self) -> &str;

    /// Open a chat handle for a session configuration.
    fn open(&self, config: &SessionConfig) -> ChatHandle {
        ChatHandle::for_config(config)
    }

    /// Send one user message in the context of `history`.
    async fn send(
        &self,
        handle: &ChatHandle,
        history: &[Turn],
        text: &str,
    ) -> Result<String, LlmError>;
}
