//! Per-user state: the chat session plus interview progress.

use std::path::Path;
use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use crate::agent::agent_loop::AgentDeps;
use crate::agent::submission::Submission;
use crate::document::{DocumentIngestor, RawDocument};
use crate::error::{Error, SearchError, SessionError, WizardError};
use crate::llm::search::{WebSearch, lookup_prompt};
use crate::session::transcript::{Role, Transcript};
use crate::session::{ModelId, SessionManager};
use crate::wizard::prompts::{brainstorm_prompt, section_prompt};
use crate::wizard::{ProposalSection, StageDescriptor, StageInput, StageMachine, WizardState};

/// Read-only view handed to whatever renders the conversation.
#[derive(Debug, Clone, Serialize)]
pub struct Snapshot {
    pub transcript: Option<Transcript>,
    pub wizard: WizardState,
}

/// Everything one user owns. Operations on it are strictly sequential.
pub struct UserContext {
    chat: SessionManager,
    machine: Arc<StageMachine>,
    wizard: WizardState,
    search: Option<Arc<dyn WebSearch>>,
    ingestor: Arc<dyn DocumentIngestor>,
    /// Text of the last exchange the gateway failed, for `/retry`.
    last_failed: Option<String>,
}

impl UserContext {
    pub fn new(user_id: &str, deps: &AgentDeps) -> Self {
        let mut chat = SessionManager::new(
            Arc::clone(&deps.gateway),
            user_id,
            deps.system_prompt.clone(),
            deps.session_config.clone(),
        )
        .with_request_timeout(deps.request_timeout);
        if let Some(log) = &deps.log {
            chat = chat.with_log(Arc::clone(log));
        }

        Self {
            chat,
            machine: Arc::clone(&deps.machine),
            wizard: WizardState::default(),
            search: deps.search.clone(),
            ingestor: Arc::clone(&deps.ingestor),
            last_failed: None,
        }
    }

    /// Pick up the user's last logged conversation, if it still matches the
    /// configuration. Failures start a fresh session instead.
    pub async fn resume(&mut self) {
        match self.chat.resume_latest().await {
            Ok(true) => info!(user_id = %self.chat.user_id(), "Resumed previous conversation"),
            Ok(false) => {}
            Err(e) => {
                warn!(user_id = %self.chat.user_id(), error = %e, "Could not resume conversation")
            }
        }
    }

    pub fn chat(&self) -> &SessionManager {
        &self.chat
    }

    pub fn wizard(&self) -> &WizardState {
        &self.wizard
    }

    pub fn current_stage(&self) -> &StageDescriptor {
        self.machine.current_stage(&self.wizard)
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            transcript: self.chat.transcript().cloned(),
            wizard: self.wizard.clone(),
        }
    }

    // ── Chat ───────────────────────────────────────────────────────

    /// Send through the session, remembering the text if the gateway fails.
    async fn send_tracked(&mut self, text: String) -> Result<String, Error> {
        match self.chat.send(&text).await {
            Ok(reply) => {
                self.last_failed = None;
                Ok(reply)
            }
            Err(e @ SessionError::Gateway(_)) => {
                self.last_failed = Some(text);
                Err(e.into())
            }
            Err(e) => Err(e.into()),
        }
    }

    pub async fn send(&mut self, text: &str) -> Result<String, Error> {
        self.send_tracked(text.to_string()).await
    }

    /// Re-send the last failed message. `None` if nothing failed.
    pub async fn retry(&mut self) -> Option<Result<String, Error>> {
        let text = self.last_failed.take()?;
        Some(self.send_tracked(text).await)
    }

    /// Search the web and have the model summarize the results.
    pub async fn lookup(&mut self, query: &str) -> Result<String, Error> {
        let query = query.trim();
        if query.is_empty() {
            return Err(SessionError::EmptyInput.into());
        }
        let search = self.search.as_ref().ok_or(SearchError::NotConfigured)?;
        let results = search.search(query).await?;
        self.send_tracked(lookup_prompt(query, &results)).await
    }

    pub async fn brainstorm(&mut self) -> Result<String, Error> {
        let prompt = brainstorm_prompt(&self.wizard);
        self.send_tracked(prompt).await
    }

    pub async fn draft_section(&mut self, section: ProposalSection) -> Result<String, Error> {
        let prompt = section_prompt(&self.wizard, section);
        self.send_tracked(prompt).await
    }

    pub async fn upload(&mut self, path: &Path) -> Result<(), Error> {
        let document = RawDocument::read(path).await?;
        self.chat.attach_document(self.ingestor.as_ref(), &document)?;
        Ok(())
    }

    // ── Interview ──────────────────────────────────────────────────

    pub fn advance(&mut self, input: StageInput) -> Result<&StageDescriptor, WizardError> {
        self.wizard = self.machine.advance(&self.wizard, input)?;
        Ok(self.current_stage())
    }

    pub fn retreat(&mut self) -> &StageDescriptor {
        self.wizard = self.machine.retreat(&self.wizard);
        self.current_stage()
    }

    pub fn restart(&mut self) {
        self.wizard = self.machine.reset();
    }

    /// Save the model's latest reply as `section`.
    pub fn save_section(&mut self, section: ProposalSection) -> Result<(), WizardError> {
        let reply = self
            .chat
            .transcript()
            .and_then(|t| t.conversation().last())
            .filter(|turn| turn.role == Role::Assistant)
            .map(|turn| turn.text.clone())
            .ok_or_else(|| WizardError::ValidationFailed {
                stage: self.current_stage().id.to_string(),
                reason: format!("nothing to save yet, use /draft {} first", section.key()),
            })?;
        self.wizard = self.machine.save_draft(&self.wizard, section, &reply)?;
        Ok(())
    }

    // ── Dispatch ───────────────────────────────────────────────────

    /// Handle one submission and render the reply text.
    pub async fn handle(&mut self, submission: Submission) -> Result<String, Error> {
        match submission {
            Submission::UserInput { content } => self.send(&content).await,
            Submission::Lookup { query } => self.lookup(&query).await,
            Submission::Help | Submission::Unknown { .. } => Ok(help_text(&submission)),
            Submission::Quit => Ok("Goodbye.".to_string()),
            Submission::Clear => {
                self.chat.reset();
                self.last_failed = None;
                Ok("Chat cleared.".to_string())
            }
            Submission::Model { name: None } => {
                let config = self.chat.config();
                Ok(format!(
                    "Model: {} (temperature {})",
                    config.model,
                    config.temperature.value()
                ))
            }
            Submission::Model { name: Some(name) } => {
                let model: ModelId = name.parse()?;
                self.chat.set_model(model);
                Ok(format!(
                    "Switched to {model} ({} requests/minute). Starting a new chat.",
                    model.requests_per_minute()
                ))
            }
            Submission::Temperature { value } => {
                let value: f32 = value.trim().parse().map_err(|_| {
                    SessionError::ValidationFailed {
                        reason: format!("temperature '{}' is not a number", value.trim()),
                    }
                })?;
                self.chat.set_temperature(value)?;
                Ok(format!("Temperature set to {value}."))
            }
            Submission::Upload { path } => {
                self.upload(Path::new(&path)).await?;
                Ok(format!("Loaded {path}. The next message starts a new chat with it."))
            }
            Submission::Unload => {
                self.chat.set_document(None);
                Ok("Document removed.".to_string())
            }
            Submission::Retry => match self.retry().await {
                Some(result) => result,
                None => Ok("Nothing to retry.".to_string()),
            },
            Submission::Stage => Ok(self.stage_text()),
            Submission::Next { args } => {
                let input = stage_input(self.current_stage(), &args)?;
                self.advance(input)?;
                Ok(self.stage_text())
            }
            Submission::Back => {
                self.retreat();
                Ok(self.stage_text())
            }
            Submission::Save { section } => {
                let section: ProposalSection = section.parse()?;
                self.save_section(section)?;
                Ok(format!("Saved {section}."))
            }
            Submission::Draft { section } => {
                let section: ProposalSection = section.parse()?;
                self.draft_section(section).await
            }
            Submission::Brainstorm => self.brainstorm().await,
            Submission::Restart => {
                self.restart();
                Ok(self.stage_text())
            }
        }
    }

    fn stage_text(&self) -> String {
        let stage = self.current_stage();
        let position = self.wizard.stage_index.min(self.machine.stages().len() - 1) + 1;
        let mut text = format!(
            "[{position}/{}] {}\n{}",
            self.machine.stages().len(),
            stage.title,
            stage.prompt
        );
        if !stage.fields.is_empty() {
            text.push_str(&format!("\nFields: {}", stage.fields.join(", ")));
        }
        if !self.wizard.section_drafts.is_empty() {
            let saved: Vec<&str> = self.wizard.section_drafts.keys().map(String::as_str).collect();
            text.push_str(&format!("\nSaved sections: {}", saved.join(", ")));
        }
        text
    }
}

/// Parse `/next` arguments: `key=value` pairs separated by `;`. A bare value
/// fills the stage's first field.
pub fn stage_input(stage: &StageDescriptor, args: &str) -> Result<StageInput, WizardError> {
    let mut input = StageInput::new();
    for part in args.split(';').map(str::trim).filter(|p| !p.is_empty()) {
        input = match part.split_once('=') {
            Some((key, value)) => input.with_fact(key.trim().to_lowercase(), value),
            None => match stage.fields.first() {
                Some(field) => input.with_fact(*field, part),
                None => {
                    return Err(WizardError::ValidationFailed {
                        stage: stage.id.to_string(),
                        reason: format!("this stage takes no fields, got '{part}'"),
                    });
                }
            },
        };
    }
    Ok(input)
}

fn help_text(submission: &Submission) -> String {
    let mut text = String::new();
    if let Submission::Unknown { command } = submission {
        text.push_str(&format!("Unknown command {command}.\n\n"));
    }
    text.push_str(
        "\
Chat:
  <message>              talk to Grantbuddy
  lookup <query>         search the web and summarize
  /retry                 resend the last failed message
  /clear                 start a new chat (keeps the document)
  /model [name]          show or switch model
  /temp <0.0-1.0>        set temperature
  /upload <path>         use a text document as reference
  /unload                remove the document
Interview:
  /stage                 show the current step
  /next key=value; ...   answer and move on
  /back                  previous step
  /brainstorm            project ideas from your answers
  /draft <section>       draft a proposal section
  /save <section>        keep the last reply as that section
  /restart               start the interview over
  /quit
Models:",
    );
    for model in ModelId::ALL {
        text.push_str(&format!(
            "\n  {model} ({} requests/minute)",
            model.requests_per_minute()
        ));
    }
    text.push_str("\nSections: ");
    text.push_str(&ProposalSection::ALL.map(|s| s.key()).join(", "));
    text
}
