//! Configuration types.

use std::path::{Path, PathBuf};
use std::time::Duration;

use secrecy::SecretString;

use crate::context::DEFAULT_SYSTEM_PROMPT;
use crate::error::ConfigError;
use crate::session::{ModelId, SessionConfig, Temperature};

/// Application configuration, read from the environment.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Gemini API key.
    pub google_api_key: SecretString,
    /// Perplexity API key; web lookup is disabled without it.
    pub perplexity_api_key: Option<SecretString>,
    pub model: ModelId,
    pub temperature: Temperature,
    /// System instructions file.
    pub instructions_path: PathBuf,
    /// Transcript log database; history is not persisted without it.
    pub db_path: Option<PathBuf>,
    /// Upper bound on one model call.
    pub request_timeout: Duration,
    /// Directory for daily log files; logs go to stderr without it.
    pub log_dir: Option<PathBuf>,
}

impl AppConfig {
    /// Read configuration from process environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read configuration through `lookup`. Blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let google_api_key = get("GOOGLE_API_KEY")
            .map(SecretString::from)
            .ok_or_else(|| ConfigError::MissingEnvVar("GOOGLE_API_KEY".to_string()))?;

        let model = match get("GRANTBUDDY_MODEL") {
            Some(value) => value.parse().map_err(|e| ConfigError::InvalidValue {
                key: "GRANTBUDDY_MODEL".to_string(),
                message: format!("{e}"),
            })?,
            None => ModelId::default(),
        };

        let temperature = match get("GRANTBUDDY_TEMPERATURE") {
            Some(value) => value.parse().map_err(|e| ConfigError::InvalidValue {
                key: "GRANTBUDDY_TEMPERATURE".to_string(),
                message: format!("{e}"),
            })?,
            None => Temperature::default(),
        };

        let request_timeout_secs: u64 = match get("GRANTBUDDY_REQUEST_TIMEOUT_SECS") {
            Some(value) => value
                .parse::<u64>()
                .ok()
                .filter(|secs| *secs > 0)
                .ok_or_else(|| ConfigError::InvalidValue {
                    key: "GRANTBUDDY_REQUEST_TIMEOUT_SECS".to_string(),
                    message: format!("expected a positive number of seconds, got '{value}'"),
                })?,
            None => 120,
        };

        Ok(Self {
            google_api_key,
            perplexity_api_key: get("PERPLEXITY_API_KEY").map(SecretString::from),
            model,
            temperature,
            instructions_path: get("GRANTBUDDY_INSTRUCTIONS")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("instructions.txt")),
            db_path: get("GRANTBUDDY_DB_PATH").map(PathBuf::from),
            request_timeout: Duration::from_secs(request_timeout_secs),
            log_dir: get("GRANTBUDDY_LOG_DIR").map(PathBuf::from),
        })
    }

    /// Configuration new sessions start with.
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig::new(self.model, self.temperature)
    }
}

/// Read the system instructions, falling back to the built-in prompt when
/// the file is missing, unreadable, or empty.
pub async fn load_system_prompt(path: &Path) -> String {
    match tokio::fs::read_to_string(path).await {
        Ok(text) if !text.trim().is_empty() => {
            tracing::info!(path = %path.display(), "Loaded system instructions");
            text.trim().to_string()
        }
        Ok(_) => {
            tracing::warn!(path = %path.display(), "Instructions file is empty, using built-in instructions");
            DEFAULT_SYSTEM_PROMPT.to_string()
        }
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Could not read instructions, using built-in instructions");
            DEFAULT_SYSTEM_PROMPT.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use secrecy::ExposeSecret;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn defaults_with_only_api_key() {
        let config = AppConfig::from_lookup(lookup(&[("GOOGLE_API_KEY", "g-key")])).unwrap();
        assert_eq!(config.google_api_key.expose_secret(), "g-key");
        assert!(config.perplexity_api_key.is_none());
        assert_eq!(config.model, ModelId::GeminiFlash);
        assert_eq!(config.temperature, Temperature::default());
        assert_eq!(config.instructions_path, PathBuf::from("instructions.txt"));
        assert!(config.db_path.is_none());
        assert_eq!(config.request_timeout, Duration::from_secs(120));
        assert_eq!(config.session_config(), SessionConfig::default());
    }

    #[test]
    fn missing_api_key() {
        let err = AppConfig::from_lookup(lookup(&[("GOOGLE_API_KEY", "  ")])).unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnvVar(ref k) if k == "GOOGLE_API_KEY"));
    }

    #[test]
    fn overrides_are_parsed() {
        let config = AppConfig::from_lookup(lookup(&[
            ("GOOGLE_API_KEY", "g-key"),
            ("PERPLEXITY_API_KEY", "p-key"),
            ("GRANTBUDDY_MODEL", "pro"),
            ("GRANTBUDDY_TEMPERATURE", "0.2"),
            ("GRANTBUDDY_DB_PATH", "./data/grantbuddy.db"),
            ("GRANTBUDDY_REQUEST_TIMEOUT_SECS", "30"),
        ]))
        .unwrap();
        assert_eq!(config.model, ModelId::GeminiPro);
        assert_eq!(config.temperature.value(), 0.2);
        assert_eq!(config.db_path, Some(PathBuf::from("./data/grantbuddy.db")));
        assert_eq!(config.request_timeout, Duration::from_secs(30));
        assert!(config.perplexity_api_key.is_some());
    }

    #[test]
    fn out_of_range_temperature_is_rejected() {
        let err = AppConfig::from_lookup(lookup(&[
            ("GOOGLE_API_KEY", "g-key"),
            ("GRANTBUDDY_TEMPERATURE", "1.5"),
        ]))
        .unwrap_err();
        assert!(
            matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "GRANTBUDDY_TEMPERATURE")
        );
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let err = AppConfig::from_lookup(lookup(&[
            ("GOOGLE_API_KEY", "g-key"),
            ("GRANTBUDDY_REQUEST_TIMEOUT_SECS", "0"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[tokio::test]
    async fn instructions_fall_back_to_built_in() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.txt");
        assert_eq!(load_system_prompt(&missing).await, DEFAULT_SYSTEM_PROMPT);

        let path = dir.path().join("instructions.txt");
        tokio::fs::write(&path, "  Focus on education grants.\n").await.unwrap();
        assert_eq!(load_system_prompt(&path).await, "Focus on education grants.");
    }
}
