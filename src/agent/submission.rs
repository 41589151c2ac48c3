//! Submission types — what a line of user input asks the assistant to do.

use serde::{Deserialize, Serialize};

use crate::llm::search::parse_lookup;

/// Parses user input into Submission types.
pub struct SubmissionParser;

impl SubmissionParser {
    /// Parse message content into a Submission.
    pub fn parse(content: &str) -> Submission {
        let trimmed = content.trim();
        let lower = trimmed.to_lowercase();

        match lower.as_str() {
            "/help" | "/?" => Submission::Help,
            "/quit" | "/exit" => Submission::Quit,
            "/clear" => Submission::Clear,
            "/unload" => Submission::Unload,
            "/retry" => Submission::Retry,
            "/stage" => Submission::Stage,
            "/back" => Submission::Back,
            "/brainstorm" => Submission::Brainstorm,
            "/restart" => Submission::Restart,

            _ => parse_complex(content, trimmed, &lower),
        }
    }
}

/// Parameterized commands, lookups, and the plain-chat fallback.
fn parse_complex(content: &str, trimmed: &str, lower: &str) -> Submission {
    parse_command(trimmed, lower)
        .or_else(|| {
            parse_lookup(trimmed).map(|query| Submission::Lookup {
                query: query.to_string(),
            })
        })
        .unwrap_or_else(|| Submission::UserInput {
            content: content.to_string(),
        })
}

/// Split `/name rest` into the lowercased name and the untouched remainder.
fn split_command<'a>(trimmed: &'a str, lower: &str) -> Option<(String, &'a str)> {
    if !lower.starts_with('/') {
        return None;
    }
    let end = trimmed.find(char::is_whitespace).unwrap_or(trimmed.len());
    let name = lower.get(..end).unwrap_or(lower).to_string();
    Some((name, trimmed[end..].trim()))
}

fn parse_command(trimmed: &str, lower: &str) -> Option<Submission> {
    let (name, rest) = split_command(trimmed, lower)?;
    let arg = rest.to_string();
    let submission = match name.as_str() {
        "/model" => Submission::Model {
            name: (!rest.is_empty()).then_some(arg),
        },
        "/temp" | "/temperature" => Submission::Temperature { value: arg },
        "/upload" => Submission::Upload { path: arg },
        "/next" => Submission::Next { args: arg },
        "/save" => Submission::Save { section: arg },
        "/draft" => Submission::Draft { section: arg },
        _ => Submission::Unknown { command: name },
    };
    Some(submission)
}

/// A submission to the assistant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Submission {
    /// Plain chat message.
    UserInput { content: String },

    /// `lookup <query>`: web search, then summarize through the chat.
    Lookup { query: String },

    Help,
    Quit,

    /// Drop the chat session. The uploaded document stays.
    Clear,

    /// Show or switch the model.
    Model { name: Option<String> },

    Temperature { value: String },

    /// Inject a document into the next session.
    Upload { path: String },

    /// Remove the injected document.
    Unload,

    /// Re-send the last message that failed.
    Retry,

    /// Show the current interview stage.
    Stage,

    /// Submit `key=value; ...` facts and advance the interview.
    Next { args: String },

    Back,

    /// Save the last assistant reply as a proposal section.
    Save { section: String },

    /// Ask the model to draft a proposal section.
    Draft { section: String },

    Brainstorm,

    /// Start the interview over.
    Restart,

    /// A slash command nobody handles.
    Unknown { command: String },
}

impl Submission {
    /// Whether handling this submission waits on the chat model.
    pub fn calls_model(&self) -> bool {
        matches!(
            self,
            Self::UserInput { .. }
                | Self::Lookup { .. }
                | Self::Retry
                | Self::Draft { .. }
                | Self::Brainstorm
        )
    }
}
