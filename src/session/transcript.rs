//! Turns and the append-only transcript of one session.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::SessionError;

/// Who produced a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }

    /// Parse the stored form of a role.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "system" => Some(Self::System),
            "user" => Some(Self::User),
            "assistant" => Some(Self::Assistant),
            _ => None,
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One role-tagged utterance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub text: String,
    pub sequence: u64,
}

impl Turn {
    /// Convert to the flat persisted form.
    pub fn to_record(&self, session_id: Uuid, timestamp: DateTime<Utc>) -> TurnRecord {
        TurnRecord {
            session_id,
            sequence: self.sequence,
            role: self.role,
            text: self.text.clone(),
            timestamp,
        }
    }
}

/// A persisted transcript entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnRecord {
    pub session_id: Uuid,
    pub sequence: u64,
    pub role: Role,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

/// Ordered turns belonging to one session.
///
/// The first `seed_len` turns are the seed block built by
/// [`crate::context::seed_turns`]. After it, roles strictly alternate
/// user/assistant, starting with user. Appends that would break this are
/// rejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Transcript {
    turns: Vec<Turn>,
    seed_len: usize,
    next_sequence: u64,
}

impl Transcript {
    /// Start a transcript from a seed block.
    pub fn seeded(seed: Vec<(Role, String)>) -> Self {
        let turns: Vec<Turn> = seed
            .into_iter()
            .enumerate()
            .map(|(i, (role, text))| Turn {
                role,
                text,
                sequence: i as u64,
            })
            .collect();
        Self {
            seed_len: turns.len(),
            next_sequence: turns.len() as u64,
            turns,
        }
    }

    /// Rebuild a transcript from persisted records.
    ///
    /// `seed` is the seed block the current configuration produces; the first
    /// records must match it exactly, and the remainder must alternate.
    pub fn replay(seed: Vec<(Role, String)>, records: &[TurnRecord]) -> Result<Self, SessionError> {
        let mut transcript = Self::seeded(seed);
        if records.len() < transcript.seed_len {
            return Err(SessionError::CorruptTranscript {
                reason: format!(
                    "expected {} seed turns, found {} records",
                    transcript.seed_len,
                    records.len()
                ),
            });
        }

        for (turn, record) in transcript.turns.iter().zip(records) {
            if turn.role != record.role || turn.text != record.text {
                return Err(SessionError::CorruptTranscript {
                    reason: format!(
                        "seed turn {} does not match the current configuration",
                        record.sequence
                    ),
                });
            }
        }

        for record in &records[transcript.seed_len..] {
            if record.sequence != transcript.next_sequence {
                return Err(SessionError::CorruptTranscript {
                    reason: format!(
                        "expected sequence {}, found {}",
                        transcript.next_sequence, record.sequence
                    ),
                });
            }
            transcript
                .append(record.role, record.text.clone())
                .map_err(|e| SessionError::CorruptTranscript {
                    reason: e.to_string(),
                })?;
        }

        Ok(transcript)
    }

    /// All turns, seed block included.
    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    /// The seed block.
    pub fn seed(&self) -> &[Turn] {
        &self.turns[..self.seed_len]
    }

    /// Turns exchanged after the seed block.
    pub fn conversation(&self) -> &[Turn] {
        &self.turns[self.seed_len..]
    }

    /// Whether any user/assistant exchange has happened yet.
    pub fn has_history(&self) -> bool {
        self.turns.len() > self.seed_len
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn last(&self) -> Option<&Turn> {
        self.turns.last()
    }

    /// The role the next conversation turn must have.
    pub fn expected_role(&self) -> Role {
        match self.conversation().last() {
            Some(turn) if turn.role == Role::User => Role::Assistant,
            _ => Role::User,
        }
    }

    /// Check that a turn with `role` may be appended, without appending it.
    pub fn check_next(&self, role: Role) -> Result<(), SessionError> {
        let expected = self.expected_role();
        if role != expected {
            return Err(SessionError::OutOfOrder {
                reason: format!(
                    "expected a {expected} turn after sequence {}, got {role}",
                    self.next_sequence.saturating_sub(1)
                ),
            });
        }
        Ok(())
    }

    /// Append a conversation turn. Returns the new turn's sequence number.
    pub fn append(&mut self, role: Role, text: impl Into<String>) -> Result<u64, SessionError> {
        self.check_next(role)?;
        let sequence = self.next_sequence;
        self.turns.push(Turn {
            role,
            text: text.into(),
            sequence,
        });
        self.next_sequence += 1;
        Ok(sequence)
    }

    /// Position marker used to undo a failed exchange.
    pub(crate) fn mark(&self) -> TranscriptMark {
        TranscriptMark {
            len: self.turns.len(),
            next_sequence: self.next_sequence,
        }
    }

    /// Restore the transcript to exactly the state at `mark`.
    pub(crate) fn rewind(&mut self, mark: TranscriptMark) {
        let len = mark.len.max(self.seed_len);
        self.turns.truncate(len);
        self.next_sequence = mark.next_sequence;
    }
}

/// A saved transcript position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct TranscriptMark {
    len: usize,
    next_sequence: u64,
}
