//! Session configuration values.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::SessionError;

/// Hosted models the assistant can talk to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModelId {
    #[default]
    #[serde(rename = "gemini-1.5-flash-002")]
    GeminiFlash,
    #[serde(rename = "gemini-1.5-pro-002")]
    GeminiPro,
}

impl ModelId {
    pub const ALL: [ModelId; 2] = [ModelId::GeminiFlash, ModelId::GeminiPro];

    /// Provider-side model identifier.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::GeminiFlash => "gemini-1.5-flash-002",
            Self::GeminiPro => "gemini-1.5-pro-002",
        }
    }

    /// Provider quota, in requests per minute.
    pub fn requests_per_minute(&self) -> u32 {
        match self {
            Self::GeminiFlash => 15,
            Self::GeminiPro => 2,
        }
    }
}

impl std::fmt::Display for ModelId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ModelId {
    type Err = SessionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_lowercase();
        Self::ALL
            .into_iter()
            .find(|m| m.as_str() == s)
            .or(match s.as_str() {
                "flash" => Some(Self::GeminiFlash),
                "pro" => Some(Self::GeminiPro),
                _ => None,
            })
            .ok_or_else(|| SessionError::ValidationFailed {
                reason: format!(
                    "unknown model '{s}', expected one of: {}",
                    Self::ALL.map(|m| m.as_str()).join(", ")
                ),
            })
    }
}

/// Sampling temperature in `[0.0, 1.0]`.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize)]
#[serde(transparent)]
pub struct Temperature(f32);

impl Temperature {
    pub const MIN: f32 = 0.0;
    pub const MAX: f32 = 1.0;

    /// Validate a temperature. Out-of-range values are rejected, not clamped.
    pub fn new(value: f32) -> Result<Self, SessionError> {
        if !value.is_finite() || !(Self::MIN..=Self::MAX).contains(&value) {
            return Err(SessionError::ValidationFailed {
                reason: format!(
                    "temperature must be between {} and {}, got {value}",
                    Self::MIN,
                    Self::MAX
                ),
            });
        }
        Ok(Self(value))
    }

    pub fn value(&self) -> f32 {
        self.0
    }
}

impl Default for Temperature {
    fn default() -> Self {
        Self(0.5)
    }
}

impl<'de> Deserialize<'de> for Temperature {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = f32::deserialize(deserializer)?;
        Temperature::new(value).map_err(serde::de::Error::custom)
    }
}

impl FromStr for Temperature {
    type Err = SessionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value: f32 = s.trim().parse().map_err(|_| SessionError::ValidationFailed {
            reason: format!("temperature '{}' is not a number", s.trim()),
        })?;
        Self::new(value)
    }
}

/// Everything that decides whether a live session is still valid.
///
/// Compared by value: two configs are equal when model, temperature and
/// document text are all equal.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    pub model: ModelId,
    pub temperature: Temperature,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_text: Option<String>,
}

impl SessionConfig {
    pub fn new(model: ModelId, temperature: Temperature) -> Self {
        Self {
            model,
            temperature,
            document_text: None,
        }
    }

    pub fn with_model(&self, model: ModelId) -> Self {
        Self {
            model,
            ..self.clone()
        }
    }

    pub fn with_temperature(&self, temperature: Temperature) -> Self {
        Self {
            temperature,
            ..self.clone()
        }
    }

    pub fn with_document(&self, document_text: Option<String>) -> Self {
        Self {
            document_text,
            ..self.clone()
        }
    }
}
