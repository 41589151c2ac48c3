//! Gemini REST adapter for [`ChatGateway`].

use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::LlmError;
use crate::llm::provider::{ChatGateway, ChatHandle, GenerationConfig};
use crate::session::transcript::{Role, Turn};

const PROVIDER: &str = "gemini";
const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

// ── Wire types ──────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
    generation_config: WireGenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    role: &'static str,
    parts: Vec<Part<'a>>,
}

#[derive(Debug, Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WireGenerationConfig {
    temperature: f32,
    top_p: f32,
    top_k: u32,
    max_output_tokens: u32,
}

impl From<GenerationConfig> for WireGenerationConfig {
    fn from(g: GenerationConfig) -> Self {
        Self {
            temperature: g.temperature,
            top_p: g.top_p,
            top_k: g.top_k,
            max_output_tokens: g.max_output_tokens,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<CandidateContent>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
    #[serde(default)]
    status: String,
    #[serde(default)]
    details: Vec<serde_json::Value>,
}

/// Provider role for a turn. The API only knows "user" and "model".
fn wire_role(role: Role) -> &'static str {
    match role {
        Role::System | Role::User => "user",
        Role::Assistant => "model",
    }
}

fn build_request<'a>(
    history: &'a [Turn],
    text: &'a str,
    generation: GenerationConfig,
) -> GenerateRequest<'a> {
    let mut contents: Vec<Content<'a>> = history
        .iter()
        .map(|turn| Content {
            role: wire_role(turn.role),
            parts: vec![Part { text: &turn.text }],
        })
        .collect();
    contents.push(Content {
        role: "user",
        parts: vec![Part { text }],
    });
    GenerateRequest {
        contents,
        generation_config: generation.into(),
    }
}

/// Pull the reply text out of a successful response.
fn extract_text(response: GenerateResponse) -> Result<String, LlmError> {
    if let Some(reason) = response.prompt_feedback.and_then(|f| f.block_reason) {
        return Err(LlmError::ProviderError {
            provider: PROVIDER.to_string(),
            detail: format!("prompt blocked: {reason}"),
        });
    }

    let candidate = response
        .candidates
        .into_iter()
        .next()
        .ok_or_else(|| LlmError::ProviderError {
            provider: PROVIDER.to_string(),
            detail: "response contained no candidates".to_string(),
        })?;

    let text: String = candidate
        .content
        .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
        .unwrap_or_default();

    if text.is_empty() {
        let reason = candidate.finish_reason.unwrap_or_else(|| "unknown".to_string());
        return Err(LlmError::ProviderError {
            provider: PROVIDER.to_string(),
            detail: format!("empty reply (finish reason: {reason})"),
        });
    }
    Ok(text)
}

/// Parse a `RetryInfo` delay such as `"32s"` from error details.
fn retry_delay_from_details(details: &[serde_json::Value]) -> Option<Duration> {
    details.iter().find_map(|d| {
        let delay = d.get("retryDelay")?.as_str()?;
        let secs: f64 = delay.strip_suffix('s')?.parse().ok()?;
        Duration::try_from_secs_f64(secs).ok()
    })
}

/// Map a non-success HTTP status and body to a gateway error.
fn classify_status(status: u16, retry_after: Option<Duration>, body: &str) -> LlmError {
    let error = serde_json::from_str::<ErrorEnvelope>(body)
        .map(|e| e.error)
        .unwrap_or_default();
    let provider = PROVIDER.to_string();

    match status {
        429 => LlmError::RateLimited {
            provider,
            retry_after: retry_after.or_else(|| retry_delay_from_details(&error.details)),
        },
        401 | 403 => LlmError::Unauthenticated { provider },
        400 if error.message.to_lowercase().contains("api key") => {
            LlmError::Unauthenticated { provider }
        }
        408 | 504 => LlmError::Timeout { provider },
        _ => {
            let detail = if error.message.is_empty() {
                format!("HTTP {status}: {}", body.chars().take(200).collect::<String>())
            } else if error.status.is_empty() {
                format!("HTTP {status}: {}", error.message)
            } else {
                format!("HTTP {status} {}: {}", error.status, error.message)
            };
            LlmError::ProviderError { provider, detail }
        }
    }
}

fn classify_transport(err: reqwest::Error) -> LlmError {
    if err.is_timeout() {
        LlmError::Timeout {
            provider: PROVIDER.to_string(),
        }
    } else {
        LlmError::ProviderError {
            provider: PROVIDER.to_string(),
            detail: err.to_string(),
        }
    }
}

// ── Gateway ─────────────────────────────────────────────────────────

/// Gemini `generateContent` client.
///
/// The HTTP client and key are shared by every session and never change after
/// construction.
pub struct GeminiGateway {
    client: reqwest::Client,
    api_key: SecretString,
    base_url: String,
}

impl GeminiGateway {
    pub fn new(api_key: SecretString, timeout: Duration) -> Result<Self, LlmError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| LlmError::ProviderError {
                provider: PROVIDER.to_string(),
                detail: format!("Failed to create HTTP client: {e}"),
            })?;
        Ok(Self {
            client,
            api_key,
            base_url: DEFAULT_BASE_URL.to_string(),
        })
    }

    /// Point the gateway at a different endpoint (proxies, tests).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn endpoint(&self, handle: &ChatHandle) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url,
            handle.model.as_str()
        )
    }
}

#[async_trait]
impl ChatGateway for GeminiGateway {
    fn name(&self) -> &str {
        PROVIDER
    }

    async fn send(
        &self,
        handle: &ChatHandle,
        history: &[Turn],
        text: &str,
    ) -> Result<String, LlmError> {
        let body = build_request(history, text, handle.generation);
        debug!(
            chat_id = %handle.id,
            model = %handle.model,
            turns = body.contents.len(),
            "Sending generateContent request"
        );

        let response = self
            .client
            .post(self.endpoint(handle))
            .header("x-goog-api-key", self.api_key.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(classify_transport)?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.trim().parse::<u64>().ok())
                .map(Duration::from_secs);
            let text = response.text().await.unwrap_or_default();
            return Err(classify_status(status.as_u16(), retry_after, &text));
        }

        let parsed: GenerateResponse = response.json().await.map_err(|e| {
            if e.is_timeout() {
                classify_transport(e)
            } else {
                LlmError::ProviderError {
                    provider: PROVIDER.to_string(),
                    detail: format!("invalid response body: {e}"),
                }
            }
        })?;
        extract_text(parsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn turn(role: Role, text: &str, sequence: u64) -> Turn {
        Turn {
            role,
            text: text.to_string(),
            sequence,
        }
    }

    #[test]
    fn request_maps_roles_and_appends_message() {
        let history = vec![
            turn(Role::System, "System: be brief", 0),
            turn(Role::Assistant, "Understood.", 1),
        ];
        let request = build_request(&history, "Hello", GenerationConfig::default());
        let json = serde_json::to_value(&request).unwrap();

        let contents = json["contents"].as_array().unwrap();
        assert_eq!(contents.len(), 3);
        assert_eq!(contents[0]["role"], "user");
        assert_eq!(contents[1]["role"], "model");
        assert_eq!(contents[2]["role"], "user");
        assert_eq!(contents[2]["parts"][0]["text"], "Hello");
        assert_eq!(json["generationConfig"]["topK"], 40);
        assert_eq!(json["generationConfig"]["maxOutputTokens"], 8192);
    }

    #[test]
    fn extracts_joined_candidate_text() {
        let response: GenerateResponse = serde_json::from_str(
            r#"{"candidates":[{"content":{"role":"model","parts":[{"text":"Hi "},{"text":"there"}]},"finishReason":"STOP"}]}"#,
        )
        .unwrap();
        assert_eq!(extract_text(response).unwrap(), "Hi there");
    }

    #[test]
    fn blocked_prompt_is_provider_error() {
        let response: GenerateResponse =
            serde_json::from_str(r#"{"promptFeedback":{"blockReason":"SAFETY"}}"#).unwrap();
        match extract_text(response) {
            Err(LlmError::ProviderError { detail, .. }) => assert!(detail.contains("SAFETY")),
            other => panic!("expected provider error, got {other:?}"),
        }
    }

    #[test]
    fn empty_candidate_is_provider_error() {
        let response: GenerateResponse = serde_json::from_str(
            r#"{"candidates":[{"content":{"parts":[]},"finishReason":"MAX_TOKENS"}]}"#,
        )
        .unwrap();
        assert!(matches!(
            extract_text(response),
            Err(LlmError::ProviderError { .. })
        ));
    }

    #[test]
    fn status_429_is_rate_limited_with_header_delay() {
        let err = classify_status(429, Some(Duration::from_secs(30)), "");
        assert_eq!(
            err,
            LlmError::RateLimited {
                provider: "gemini".to_string(),
                retry_after: Some(Duration::from_secs(30)),
            }
        );
    }

    #[test]
    fn status_429_reads_retry_info_from_body() {
        let body = r#"{"error":{"code":429,"message":"Quota exceeded","status":"RESOURCE_EXHAUSTED",
            "details":[{"@type":"type.googleapis.com/google.rpc.RetryInfo","retryDelay":"32s"}]}}"#;
        match classify_status(429, None, body) {
            LlmError::RateLimited { retry_after, .. } => {
                assert_eq!(retry_after, Some(Duration::from_secs(32)))
            }
            other => panic!("expected rate limit, got {other:?}"),
        }
    }

    #[test]
    fn unrepresentable_retry_delay_is_dropped() {
        for delay in ["1e30s", "infs", "NaNs", "-5s", "soon"] {
            let body = format!(
                r#"{{"error":{{"code":429,"message":"Quota exceeded","details":[{{"retryDelay":"{delay}"}}]}}}}"#
            );
            assert_eq!(
                classify_status(429, None, &body),
                LlmError::RateLimited {
                    provider: "gemini".to_string(),
                    retry_after: None,
                },
                "retryDelay {delay}"
            );
        }
    }

    #[test]
    fn auth_statuses_are_unauthenticated() {
        assert!(matches!(
            classify_status(403, None, ""),
            LlmError::Unauthenticated { .. }
        ));
        let body = r#"{"error":{"code":400,"message":"API key not valid. Please pass a valid API key.","status":"INVALID_ARGUMENT"}}"#;
        assert!(matches!(
            classify_status(400, None, body),
            LlmError::Unauthenticated { .. }
        ));
    }

    #[test]
    fn gateway_timeouts_are_timeouts() {
        assert!(matches!(classify_status(504, None, ""), LlmError::Timeout { .. }));
    }

    #[test]
    fn other_statuses_keep_provider_detail() {
        let body = r#"{"error":{"code":500,"message":"Internal error","status":"INTERNAL"}}"#;
        match classify_status(500, None, body) {
            LlmError::ProviderError { detail, .. } => {
                assert_eq!(detail, "HTTP 500 INTERNAL: Internal error")
            }
            other => panic!("expected provider error, got {other:?}"),
        }
    }

    #[test]
    fn endpoint_uses_model_id() {
        let gateway = GeminiGateway::new(SecretString::from("k"), Duration::from_secs(5))
            .unwrap()
            .with_base_url("http://localhost:9000/");
        let handle = ChatHandle::for_config(&Default::default());
        assert_eq!(
            gateway.endpoint(&handle),
            "http://localhost:9000/v1beta/models/gemini-1.5-flash-002:generateContent"
        );
    }
}
