//! Error types for Grantbuddy.

use std::time::Duration;

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("Interview error: {0}")]
    Wizard(#[from] WizardError),

    #[error("Document error: {0}")]
    Extraction(#[from] ExtractionError),

    #[error("Search error: {0}")]
    Search(#[from] SearchError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Transcript log errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Channel-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Failed to send response on channel {name}: {reason}")]
    SendFailed { name: String, reason: String },
}

/// Failures of a single call to the hosted model.
///
/// These are the only kinds a gateway may return. None of them is retried by
/// the gateway or the session manager.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LlmError {
    #[error("Provider {provider} rate limited, retry after {retry_after:?}")]
    RateLimited {
        provider: String,
        retry_after: Option<Duration>,
    },

    #[error("Authentication failed for provider {provider}")]
    Unauthenticated { provider: String },

    #[error("Provider {provider} timed out")]
    Timeout { provider: String },

    #[error("Provider {provider} request failed: {detail}")]
    ProviderError { provider: String, detail: String },
}

/// Errors from the conversation session layer.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SessionError {
    #[error("Message is empty")]
    EmptyInput,

    #[error("Validation failed: {reason}")]
    ValidationFailed { reason: String },

    #[error("Turn order violated: {reason}")]
    OutOfOrder { reason: String },

    #[error("Stored transcript cannot be replayed: {reason}")]
    CorruptTranscript { reason: String },

    #[error(transparent)]
    Gateway(#[from] LlmError),
}

/// Errors from the interview stage machine.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WizardError {
    #[error("Stage {stage}: {reason}")]
    ValidationFailed { stage: String, reason: String },

    #[error("Invalid stage table: {0}")]
    InvalidDefinition(String),
}

/// Errors from the document ingestion collaborator.
#[derive(Debug, thiserror::Error)]
pub enum ExtractionError {
    #[error("Unsupported document type: {name}")]
    Unsupported { name: String },

    #[error("Document {name} is not valid UTF-8 text")]
    InvalidEncoding { name: String },

    #[error("Document {name} contains no text")]
    Empty { name: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors from the web search collaborator.
#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    #[error("Search is not configured")]
    NotConfigured,

    #[error("Search request failed: {0}")]
    RequestFailed(String),

    #[error("Invalid search response: {0}")]
    InvalidResponse(String),
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, Error>;
