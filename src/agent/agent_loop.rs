//! Main agent loop.
//!
//! Reads messages from the channel and routes each user's messages to a
//! dedicated worker task, so one user's requests are handled in submission
//! order while other users proceed in parallel.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;

use crate::agent::registry::UserRegistry;
use crate::agent::submission::{Submission, SubmissionParser};
use crate::agent::user_context::UserContext;
use crate::channels::{Channel, IncomingMessage, OutgoingResponse, StatusUpdate};
use crate::document::DocumentIngestor;
use crate::error::Error;
use crate::llm::provider::ChatGateway;
use crate::llm::search::WebSearch;
use crate::session::SessionConfig;
use crate::store::TranscriptLog;
use crate::wizard::StageMachine;

/// Shared, read-only dependencies every user context is built from.
pub struct AgentDeps {
    pub gateway: Arc<dyn ChatGateway>,
    pub log: Option<Arc<dyn TranscriptLog>>,
    pub search: Option<Arc<dyn WebSearch>>,
    pub ingestor: Arc<dyn DocumentIngestor>,
    pub machine: Arc<StageMachine>,
    pub system_prompt: String,
    /// Configuration new users start with.
    pub session_config: SessionConfig,
    pub request_timeout: Duration,
}

/// The main agent that coordinates the channel and user workers.
pub struct Agent {
    channel: Arc<dyn Channel>,
    registry: Arc<UserRegistry>,
}

impl Agent {
    pub fn new(deps: AgentDeps, channel: Arc<dyn Channel>) -> Self {
        Self {
            channel,
            registry: Arc::new(UserRegistry::new(Arc::new(deps))),
        }
    }

    /// Run until the channel closes, `/quit` arrives, or Ctrl+C.
    pub async fn run(self) -> Result<(), Error> {
        let mut message_stream = self.channel.start().await?;
        let mut workers: HashMap<String, (mpsc::UnboundedSender<IncomingMessage>, JoinHandle<()>)> =
            HashMap::new();

        tracing::info!(channel = self.channel.name(), "Grantbuddy ready and listening");

        loop {
            let message = tokio::select! {
                biased;
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("Ctrl+C received, shutting down...");
                    break;
                }
                msg = message_stream.next() => {
                    match msg {
                        Some(m) => m,
                        None => {
                            tracing::info!("Channel stream ended, shutting down...");
                            break;
                        }
                    }
                }
            };

            if matches!(SubmissionParser::parse(&message.content), Submission::Quit) {
                tracing::info!("Shutdown command received, exiting...");
                let _ = self
                    .channel
                    .respond(&message, OutgoingResponse::text("Goodbye."))
                    .await;
                break;
            }

            let user_id = message.user_id.clone();
            let message = match workers.get(&user_id) {
                Some((tx, _)) => match tx.send(message) {
                    Ok(()) => continue,
                    // Worker died; start a fresh one below.
                    Err(mpsc::error::SendError(message)) => message,
                },
                None => message,
            };

            let ctx = self.registry.get_or_create(&user_id).await;
            let (tx, rx) = mpsc::unbounded_channel();
            let handle = tokio::spawn(run_worker(ctx, Arc::clone(&self.channel), rx));
            if tx.send(message).is_err() {
                tracing::error!(%user_id, "Worker exited before its first message");
            }
            workers.insert(user_id, (tx, handle));
        }

        tracing::info!("Agent shutting down...");
        // Close every queue and let in-flight requests finish.
        let handles: Vec<JoinHandle<()>> = workers.into_values().map(|(_, h)| h).collect();
        for handle in handles {
            if let Err(e) = handle.await {
                tracing::warn!("User worker ended abnormally: {}", e);
            }
        }
        self.channel.shutdown().await?;

        Ok(())
    }
}

/// Handle one user's messages in order.
async fn run_worker(
    ctx: Arc<Mutex<UserContext>>,
    channel: Arc<dyn Channel>,
    mut rx: mpsc::UnboundedReceiver<IncomingMessage>,
) {
    while let Some(message) = rx.recv().await {
        let submission = SubmissionParser::parse(&message.content);
        if let Some(status) = status_for(&submission) {
            let _ = channel.send_status(status, &message.metadata).await;
        }

        let result = ctx.lock().await.handle(submission).await;
        let response = match result {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(user_id = %message.user_id, "Request failed: {}", e);
                format!("Error: {}", e)
            }
        };

        if let Err(e) = channel
            .respond(&message, OutgoingResponse::text(response))
            .await
        {
            tracing::error!("Failed to send response: {}", e);
        }
    }
}

/// Progress to show before handling `submission`, if it waits on a provider.
fn status_for(submission: &Submission) -> Option<StatusUpdate> {
    match submission {
        Submission::Lookup { query } if query.trim().is_empty() => None,
        Submission::Lookup { query } => Some(StatusUpdate::Status(format!(
            "Searching the web for '{}'...",
            query.trim()
        ))),
        s if s.calls_model() => Some(StatusUpdate::Thinking("Thinking...".into())),
        _ => None,
    }
}
