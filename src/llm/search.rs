//! Web lookup — a search collaborator whose results are summarized by the
//! chat model.

use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::SearchError;

const DEFAULT_ENDPOINT: &str = "https://api.perplexity.ai/chat/completions";
const DEFAULT_MODEL: &str = "llama-3.1-sonar-small-128k-online";

/// Prefix that turns a chat message into a web lookup.
pub const LOOKUP_PREFIX: &str = "lookup";

/// A web search backend.
#[async_trait]
pub trait WebSearch: Send + Sync {
    async fn search(&self, query: &str) -> Result<String, SearchError>;
}

/// Extract the query from a `lookup ...` message.
///
/// Returns `None` when the message is not a lookup, `Some("")` when it is a
/// lookup without a query.
pub fn parse_lookup(message: &str) -> Option<&str> {
    let trimmed = message.trim_start();
    let head = trimmed.get(..LOOKUP_PREFIX.len())?;
    if !head.eq_ignore_ascii_case(LOOKUP_PREFIX) {
        return None;
    }
    let rest = &trimmed[LOOKUP_PREFIX.len()..];
    if !rest.is_empty() && !rest.starts_with(char::is_whitespace) {
        return None;
    }
    Some(rest.trim())
}

/// Prompt asking the chat model to summarize search results.
pub fn lookup_prompt(query: &str, results: &str) -> String {
    format!(
        "Here are web search results for: '{query}'\n\n\
         {results}\n\n\
         Please provide a clear, accurate summary of these results in a well-formatted response. \
         Include relevant links when available. Verify accuracy before responding."
    )
}

#[derive(Debug, Serialize)]
struct SearchRequest<'a> {
    model: &'a str,
    messages: Vec<SearchMessage>,
}

#[derive(Debug, Serialize, Deserialize)]
struct SearchMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    choices: Vec<SearchChoice>,
}

#[derive(Debug, Deserialize)]
struct SearchChoice {
    message: SearchMessage,
}

fn extract_answer(response: SearchResponse) -> Result<String, SearchError> {
    response
        .choices
        .into_iter()
        .next()
        .map(|c| c.message.content)
        .filter(|c| !c.trim().is_empty())
        .ok_or_else(|| SearchError::InvalidResponse("no search results returned".to_string()))
}

/// Perplexity chat-completions search client.
pub struct PerplexitySearch {
    client: reqwest::Client,
    api_key: SecretString,
    endpoint: String,
    model: String,
}

impl PerplexitySearch {
    pub fn new(api_key: SecretString, timeout: Duration) -> Result<Self, SearchError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SearchError::RequestFailed(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self {
            client,
            api_key,
            endpoint: DEFAULT_ENDPOINT.to_string(),
            model: DEFAULT_MODEL.to_string(),
        })
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

#[async_trait]
impl WebSearch for PerplexitySearch {
    async fn search(&self, query: &str) -> Result<String, SearchError> {
        debug!(query = query, "Running web lookup");
        let body = SearchRequest {
            model: &self.model,
            messages: vec![SearchMessage {
                role: "user".to_string(),
                content: format!("Search the web for: {query}"),
            }],
        };

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(self.api_key.expose_secret())
            .header("accept", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| SearchError::RequestFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(SearchError::RequestFailed(format!(
                "HTTP {status}: {}",
                text.chars().take(200).collect::<String>()
            )));
        }

        let parsed: SearchResponse = response
            .json()
            .await
            .map_err(|e| SearchError::InvalidResponse(e.to_string()))?;
        extract_answer(parsed)
    }
}
