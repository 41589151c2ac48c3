//! LLM integration for Grantbuddy.
//!
//! Supports:
//! - **Gemini**: `generateContent` over REST, the chat gateway
//! - **Perplexity**: web lookup whose results the chat model summarizes
//!
//! Everything else talks to the model through the [`ChatGateway`] trait.

pub mod gemini;
pub mod provider;
pub mod search;

pub use gemini::GeminiGateway;
pub use provider::*;
pub use search::{PerplexitySearch, WebSearch};

use std::sync::Arc;
use std::time::Duration;

use crate::error::{LlmError, SearchError};

/// Supported chat backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmBackend {
    Gemini,
}

/// Configuration for creating a chat gateway.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub backend: LlmBackend,
    pub api_key: secrecy::SecretString,
    pub request_timeout: Duration,
}

/// Create the process-wide chat gateway.
pub fn create_gateway(config: &LlmConfig) -> Result<Arc<dyn ChatGateway>, LlmError> {
    match config.backend {
        LlmBackend::Gemini => {
            let gateway = GeminiGateway::new(config.api_key.clone(), config.request_timeout)?;
            tracing::info!("Using Gemini (timeout: {:?})", config.request_timeout);
            Ok(Arc::new(gateway))
        }
    }
}

/// Create the web lookup client, if a key is configured.
pub fn create_search(
    api_key: Option<&secrecy::SecretString>,
    timeout: Duration,
) -> Result<Option<Arc<dyn WebSearch>>, SearchError> {
    match api_key {
        Some(key) => {
            let search = PerplexitySearch::new(key.clone(), timeout)?;
            tracing::info!("Web lookup enabled (Perplexity)");
            Ok(Some(Arc::new(search)))
        }
        None => Ok(None),
    }
}
