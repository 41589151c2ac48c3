//! Session lifecycle: one live chat per user context, seeded once, replaced
//! whenever its configuration changes.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::context::seed_turns;
use crate::document::{DocumentIngestor, RawDocument};
use crate::error::{ExtractionError, LlmError, SessionError};
use crate::llm::provider::{ChatGateway, ChatHandle};
use crate::session::model::{ModelId, SessionConfig, Temperature};
use crate::session::transcript::{Role, Transcript, TranscriptMark, Turn};
use crate::store::TranscriptLog;

/// Default upper bound on one gateway call.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// A live chat: one configuration, one provider handle, one transcript.
#[derive(Debug, Clone)]
pub struct Session {
    id: Uuid,
    config: SessionConfig,
    handle: ChatHandle,
    transcript: Transcript,
    created_at: DateTime<Utc>,
}

impl Session {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }
}

/// User turn appended ahead of the gateway reply.
///
/// Rewinds the transcript on drop unless committed, so an error return and a
/// cancelled future both leave the transcript as it was.
struct PendingExchange<'a> {
    transcript: &'a mut Transcript,
    mark: TranscriptMark,
    committed: bool,
}

impl<'a> PendingExchange<'a> {
    fn begin(transcript: &'a mut Transcript) -> Self {
        let mark = transcript.mark();
        Self {
            transcript,
            mark,
            committed: false,
        }
    }

    fn commit(mut self) {
        self.committed = true;
    }
}

impl Drop for PendingExchange<'_> {
    fn drop(&mut self) {
        if !self.committed {
            self.transcript.rewind(self.mark);
        }
    }
}

/// Owns the single live [`Session`] of one user and mediates every exchange.
pub struct SessionManager {
    gateway: Arc<dyn ChatGateway>,
    log: Option<Arc<dyn TranscriptLog>>,
    user_id: String,
    system_prompt: String,
    config: SessionConfig,
    live: Option<Session>,
    request_timeout: Duration,
}

impl SessionManager {
    pub fn new(
        gateway: Arc<dyn ChatGateway>,
        user_id: impl Into<String>,
        system_prompt: impl Into<String>,
        config: SessionConfig,
    ) -> Self {
        Self {
            gateway,
            log: None,
            user_id: user_id.into(),
            system_prompt: system_prompt.into(),
            config,
            live: None,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    /// Persist seeds and successful exchanges to `log`.
    pub fn with_log(mut self, log: Arc<dyn TranscriptLog>) -> Self {
        self.log = Some(log);
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// The configuration the next session will be created with.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn live_session(&self) -> Option<&Session> {
        self.live.as_ref()
    }

    /// Read-only view of the live transcript, if a session exists.
    pub fn transcript(&self) -> Option<&Transcript> {
        self.live.as_ref().map(|s| &s.transcript)
    }

    /// Replace the configuration. A different value drops the live session.
    pub fn configure(&mut self, config: SessionConfig) {
        if config == self.config {
            return;
        }
        self.config = config;
        if let Some(old) = self.live.take() {
            info!(
                session_id = %old.id,
                model = %self.config.model,
                "Configuration changed, session invalidated"
            );
        }
    }

    pub fn set_model(&mut self, model: ModelId) {
        self.configure(self.config.with_model(model));
    }

    /// Validate and apply a temperature. Rejected values change nothing.
    pub fn set_temperature(&mut self, value: f32) -> Result<(), SessionError> {
        let temperature = Temperature::new(value)?;
        self.configure(self.config.with_temperature(temperature));
        Ok(())
    }

    pub fn set_document(&mut self, document_text: Option<String>) {
        self.configure(self.config.with_document(document_text));
    }

    /// Extract an uploaded document and inject its text into the next session.
    ///
    /// Extraction failures leave the configuration and live session untouched.
    pub fn attach_document(
        &mut self,
        ingestor: &dyn DocumentIngestor,
        document: &RawDocument,
    ) -> Result<(), ExtractionError> {
        let text = ingestor.extract(document)?;
        info!(name = %document.name, chars = text.len(), "Document attached");
        self.set_document(Some(text));
        Ok(())
    }

    /// Return the live session for `config`, replacing it if the config
    /// differs by value. Idempotent for an unchanged config.
    pub async fn ensure_session(&mut self, config: SessionConfig) -> &Session {
        self.configure(config);
        self.ensure_live().await
    }

    async fn ensure_live(&mut self) -> &mut Session {
        let session = match self.live.take() {
            Some(session) if session.config == self.config => session,
            stale => {
                if let Some(old) = stale {
                    info!(session_id = %old.id, "Session replaced");
                }
                let session = self.new_session();
                self.persist_seed(&session).await;
                session
            }
        };
        self.live.insert(session)
    }

    fn new_session(&self) -> Session {
        let seed = seed_turns(&self.system_prompt, self.config.document_text.as_deref());
        let session = Session {
            id: Uuid::new_v4(),
            handle: self.gateway.open(&self.config),
            transcript: Transcript::seeded(seed),
            config: self.config.clone(),
            created_at: Utc::now(),
        };
        info!(
            session_id = %session.id,
            model = %session.config.model,
            temperature = session.config.temperature.value(),
            seed_turns = session.transcript.len(),
            "Session created"
        );
        session
    }

    /// Send one user message and return the assistant reply.
    ///
    /// On any gateway error, timeout or cancellation the transcript is rolled
    /// back to exactly its state before the call.
    pub async fn send(&mut self, text: &str) -> Result<String, SessionError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(SessionError::EmptyInput);
        }

        let gateway = Arc::clone(&self.gateway);
        let log = self.log.clone();
        let request_timeout = self.request_timeout;

        let Session {
            id,
            handle,
            transcript,
            ..
        } = self.ensure_live().await;
        let session_id = *id;
        let start = transcript.len();

        let mut pending = PendingExchange::begin(transcript);
        pending.transcript.append(Role::User, text)?;

        debug!(%session_id, history = start, "Sending message");
        let history = &pending.transcript.turns()[..start];
        let reply =
            match tokio::time::timeout(request_timeout, gateway.send(handle, history, text)).await
            {
                Ok(Ok(reply)) => reply,
                Ok(Err(e)) => {
                    warn!(%session_id, error = %e, "Gateway call failed, rolling back");
                    return Err(e.into());
                }
                Err(_) => {
                    warn!(%session_id, timeout = ?request_timeout, "Gateway call timed out, rolling back");
                    return Err(LlmError::Timeout {
                        provider: gateway.name().to_string(),
                    }
                    .into());
                }
            };

        pending.transcript.append(Role::Assistant, reply.clone())?;
        let exchanged: Vec<Turn> = pending.transcript.turns()[start..].to_vec();
        pending.commit();

        if let Some(log) = log {
            let now = Utc::now();
            let records: Vec<_> = exchanged
                .iter()
                .map(|turn| turn.to_record(session_id, now))
                .collect();
            if let Err(e) = log.append(&records).await {
                warn!(%session_id, error = %e, "Failed to persist exchange");
            }
        }

        Ok(reply)
    }

    /// Drop the live session and its transcript. The configuration is kept.
    pub fn reset(&mut self) {
        if let Some(old) = self.live.take() {
            info!(session_id = %old.id, turns = old.transcript.len(), "Session reset");
        }
    }

    /// Rebuild the live session from the transcript log.
    ///
    /// Returns `false` when there is no log or nothing was recorded for
    /// `session_id`. The recorded seed must match the current configuration.
    pub async fn restore(&mut self, session_id: Uuid) -> crate::error::Result<bool> {
        let Some(log) = self.log.clone() else {
            return Ok(false);
        };
        let records = log.load(session_id).await?;
        if records.is_empty() {
            return Ok(false);
        }

        let seed = seed_turns(&self.system_prompt, self.config.document_text.as_deref());
        let transcript = Transcript::replay(seed, &records)?;
        info!(%session_id, turns = transcript.len(), "Session restored");
        self.live = Some(Session {
            id: session_id,
            handle: self.gateway.open(&self.config),
            transcript,
            config: self.config.clone(),
            created_at: records[0].timestamp,
        });
        Ok(true)
    }

    /// Restore this user's most recent session, if the log has one.
    pub async fn resume_latest(&mut self) -> crate::error::Result<bool> {
        let Some(log) = self.log.clone() else {
            return Ok(false);
        };
        match log.latest_session(&self.user_id).await? {
            Some(session_id) => self.restore(session_id).await,
            None => Ok(false),
        }
    }

    async fn persist_seed(&self, session: &Session) {
        let Some(log) = &self.log else {
            return;
        };
        let records: Vec<_> = session
            .transcript
            .seed()
            .iter()
            .map(|turn| turn.to_record(session.id, session.created_at))
            .collect();
        let result = match log.open_session(session.id, &self.user_id).await {
            Ok(()) => log.append(&records).await,
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            warn!(session_id = %session.id, error = %e, "Failed to persist session seed");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::document::PlainTextIngestor;
    use crate::store::LibSqlBackend;

    /// Gateway that replays scripted outcomes and records what it was sent.
    #[derive(Default)]
    struct ScriptedGateway {
        outcomes: Mutex<VecDeque<Result<String, LlmError>>>,
        calls: Mutex<Vec<(usize, String)>>,
        delay: Option<Duration>,
    }

    impl ScriptedGateway {
        fn with(outcomes: Vec<Result<String, LlmError>>) -> Arc<Self> {
            Arc::new(Self {
                outcomes: Mutex::new(outcomes.into()),
                ..Default::default()
            })
        }

        fn slow(delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                delay: Some(delay),
                ..Default::default()
            })
        }

        fn calls(&self) -> Vec<(usize, String)> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ChatGateway for ScriptedGateway {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn send(
            &self,
            _handle: &ChatHandle,
            history: &[Turn],
            text: &str,
        ) -> Result<String, LlmError> {
            self.calls
                .lock()
                .unwrap()
                .push((history.len(), text.to_string()));
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            self.outcomes
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok("ok".to_string()))
        }
    }

    fn timeout_err() -> LlmError {
        LlmError::Timeout {
            provider: "scripted".into(),
        }
    }

    fn manager(gateway: Arc<ScriptedGateway>) -> SessionManager {
        SessionManager::new(gateway, "amina", "Be helpful.", SessionConfig::default())
    }

    fn roles(transcript: &Transcript) -> Vec<Role> {
        transcript.turns().iter().map(|t| t.role).collect()
    }

    #[tokio::test]
    async fn hello_then_failed_help_leaves_transcript_unchanged() {
        let gateway = ScriptedGateway::with(vec![Ok("Hi there".into()), Err(timeout_err())]);
        let mut mgr = manager(gateway.clone());

        let reply = mgr.send("Hello").await.unwrap();
        assert_eq!(reply, "Hi there");

        let transcript = mgr.transcript().unwrap().clone();
        assert_eq!(transcript.len(), 4);
        assert_eq!(
            roles(&transcript),
            vec![Role::System, Role::Assistant, Role::User, Role::Assistant]
        );
        assert_eq!(transcript.turns()[2].text, "Hello");
        assert_eq!(transcript.turns()[3].text, "Hi there");

        let err = mgr.send("Help").await.unwrap_err();
        assert_eq!(err, SessionError::Gateway(timeout_err()));
        assert_eq!(mgr.transcript().unwrap(), &transcript);

        // history excludes the pending user turn
        assert_eq!(
            gateway.calls(),
            vec![(2, "Hello".to_string()), (4, "Help".to_string())]
        );
    }

    #[tokio::test]
    async fn retry_after_failure_keeps_alternation() {
        let gateway = ScriptedGateway::with(vec![
            Err(LlmError::RateLimited {
                provider: "scripted".into(),
                retry_after: Some(Duration::from_secs(30)),
            }),
            Ok("Budget help".into()),
            Ok("More".into()),
        ]);
        let mut mgr = manager(gateway);

        assert!(mgr.send("Budget?").await.is_err());
        mgr.send("Budget?").await.unwrap();
        mgr.send("And more?").await.unwrap();

        let transcript = mgr.transcript().unwrap();
        let conversation: Vec<Role> = transcript.conversation().iter().map(|t| t.role).collect();
        assert_eq!(
            conversation,
            vec![Role::User, Role::Assistant, Role::User, Role::Assistant]
        );
        let sequences: Vec<u64> = transcript.turns().iter().map(|t| t.sequence).collect();
        assert_eq!(sequences, vec![0, 1, 2, 3, 4, 5]);
    }

    #[tokio::test]
    async fn empty_input_is_rejected_without_a_session() {
        let gateway = ScriptedGateway::with(vec![]);
        let mut mgr = manager(gateway.clone());

        assert_eq!(mgr.send("   ").await, Err(SessionError::EmptyInput));
        assert!(mgr.live_session().is_none());
        assert!(gateway.calls().is_empty());
    }

    #[tokio::test]
    async fn request_timeout_rolls_back() {
        let gateway = ScriptedGateway::slow(Duration::from_secs(5));
        let mut mgr = manager(gateway).with_request_timeout(Duration::from_millis(20));

        let err = mgr.send("Hello").await.unwrap_err();
        assert!(matches!(
            err,
            SessionError::Gateway(LlmError::Timeout { .. })
        ));
        assert!(!mgr.transcript().unwrap().has_history());
    }

    #[tokio::test]
    async fn cancelled_send_rolls_back() {
        let gateway = ScriptedGateway::slow(Duration::from_secs(5));
        let mut mgr = manager(gateway);
        mgr.ensure_session(SessionConfig::default()).await;
        let before = mgr.transcript().unwrap().clone();

        let cancelled = tokio::time::timeout(Duration::from_millis(20), mgr.send("Hello")).await;
        assert!(cancelled.is_err());
        assert_eq!(mgr.transcript().unwrap(), &before);
    }

    #[tokio::test]
    async fn ensure_session_is_idempotent_for_same_config() {
        let mut mgr = manager(ScriptedGateway::with(vec![]));
        let first = mgr.ensure_session(SessionConfig::default()).await.id();
        let second = mgr.ensure_session(SessionConfig::default()).await.id();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn config_change_discards_history() {
        let mut mgr = manager(ScriptedGateway::with(vec![]));
        mgr.send("Hello").await.unwrap();
        let old_id = mgr.live_session().unwrap().id();

        let changes = [
            SessionConfig::default().with_model(ModelId::GeminiPro),
            SessionConfig::default().with_temperature(Temperature::new(0.9).unwrap()),
            SessionConfig::default().with_document(Some("Call for proposals".into())),
        ];
        for config in changes {
            mgr.ensure_session(SessionConfig::default()).await;
            mgr.send("Hello").await.unwrap();

            let session = mgr.ensure_session(config.clone()).await;
            assert_ne!(session.id(), old_id);
            assert_eq!(session.config(), &config);
            assert!(!session.transcript().has_history());
        }
    }

    #[tokio::test]
    async fn document_seeds_four_turns() {
        let mut mgr = manager(ScriptedGateway::with(vec![]));
        mgr.set_document(Some("Deadline: March 1".into()));
        let session = mgr.ensure_session(mgr.config().clone()).await;
        assert_eq!(session.transcript().len(), 4);
        assert!(session.transcript().turns()[2].text.contains("Deadline: March 1"));
    }

    #[tokio::test]
    async fn invalid_temperature_changes_nothing() {
        let mut mgr = manager(ScriptedGateway::with(vec![]));
        mgr.send("Hello").await.unwrap();
        let id = mgr.live_session().unwrap().id();

        assert!(matches!(
            mgr.set_temperature(1.5),
            Err(SessionError::ValidationFailed { .. })
        ));
        assert_eq!(mgr.live_session().unwrap().id(), id);
        assert_eq!(mgr.config().temperature, Temperature::default());
    }

    #[tokio::test]
    async fn failed_extraction_keeps_live_session() {
        let mut mgr = manager(ScriptedGateway::with(vec![]));
        mgr.send("Hello").await.unwrap();
        let before = mgr.live_session().unwrap().id();

        let pdf = RawDocument::new("rfp.pdf", b"%PDF-1.7".to_vec());
        assert!(mgr.attach_document(&PlainTextIngestor, &pdf).is_err());
        assert_eq!(mgr.live_session().unwrap().id(), before);
        assert!(mgr.config().document_text.is_none());

        let txt = RawDocument::new("rfp.txt", b"Max award $25,000".to_vec());
        mgr.attach_document(&PlainTextIngestor, &txt).unwrap();
        assert!(mgr.live_session().is_none());
        assert_eq!(mgr.config().document_text.as_deref(), Some("Max award $25,000"));
    }

    #[tokio::test]
    async fn reset_keeps_config() {
        let mut mgr = manager(ScriptedGateway::with(vec![]));
        mgr.set_model(ModelId::GeminiPro);
        mgr.send("Hello").await.unwrap();

        mgr.reset();
        assert!(mgr.live_session().is_none());
        assert_eq!(mgr.config().model, ModelId::GeminiPro);

        let session = mgr.ensure_session(mgr.config().clone()).await;
        assert!(!session.transcript().has_history());
    }

    #[tokio::test]
    async fn logged_session_restores_exactly() {
        let log: Arc<dyn TranscriptLog> = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        let gateway = ScriptedGateway::with(vec![
            Ok("Hi there".into()),
            Err(timeout_err()),
            Ok("Sure".into()),
        ]);

        let mut mgr = manager(gateway.clone()).with_log(Arc::clone(&log));
        mgr.send("Hello").await.unwrap();
        assert!(mgr.send("Help").await.is_err());
        mgr.send("Help").await.unwrap();
        let expected = mgr.transcript().unwrap().clone();

        let mut restored = manager(gateway).with_log(log);
        assert!(restored.resume_latest().await.unwrap());
        assert_eq!(restored.transcript().unwrap(), &expected);
    }

    #[tokio::test]
    async fn restore_rejects_seed_from_other_config() {
        let log: Arc<dyn TranscriptLog> = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        let mut mgr = manager(ScriptedGateway::with(vec![])).with_log(Arc::clone(&log));
        mgr.send("Hello").await.unwrap();
        let id = mgr.live_session().unwrap().id();

        let mut other = manager(ScriptedGateway::with(vec![])).with_log(log);
        other.set_document(Some("different".into()));
        assert!(other.restore(id).await.is_err());
        assert!(other.live_session().is_none());
    }

    #[tokio::test]
    async fn restore_without_log_is_a_no_op() {
        let mut mgr = manager(ScriptedGateway::with(vec![]));
        assert!(!mgr.restore(Uuid::new_v4()).await.unwrap());
        assert!(!mgr.resume_latest().await.unwrap());
    }
}
