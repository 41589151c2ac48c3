//! `TranscriptLog` trait — append-only persistence for session transcripts.

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::DatabaseError;
use crate::session::transcript::TurnRecord;

/// Backend-agnostic transcript log.
///
/// Records are only ever appended. A session's records, ordered by sequence,
/// are enough to rebuild its transcript exactly.
#[async_trait]
pub trait TranscriptLog: Send + Sync {
    /// Register a new session for a user.
    async fn open_session(&self, session_id: Uuid, user_id: &str) -> Result<(), DatabaseError>;

    /// Append turns. Either all records are written or none.
    async fn append(&self, records: &[TurnRecord]) -> Result<(), DatabaseError>;

    /// Load a session's records in sequence order.
    async fn load(&self, session_id: Uuid) -> Result<Vec<TurnRecord>, DatabaseError>;

    /// The most recently opened session for a user, if any.
    async fn latest_session(&self, user_id: &str) -> Result<Option<Uuid>, DatabaseError>;
}
