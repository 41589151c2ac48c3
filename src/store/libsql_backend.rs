//! libSQL backend — async `TranscriptLog` implementation.
//!
//! Supports local file and in-memory databases.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::DatabaseError;
use crate::session::transcript::{Role, TurnRecord};
use crate::store::migrations;
use crate::store::traits::TranscriptLog;

/// libSQL transcript log.
///
/// Stores a single connection that is reused for all operations.
pub struct LibSqlBackend {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlBackend {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Pool(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to open libSQL database: {e}")))?;

        let backend = Self::from_database(db).await?;
        info!(path = %path.display(), "Transcript log opened");
        Ok(backend)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Pool(format!("Failed to create in-memory database: {e}"))
            })?;
        Self::from_database(db).await
    }

    async fn from_database(db: LibSqlDatabase) -> Result<Self, DatabaseError> {
        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;
        migrations::run_migrations(&conn).await?;
        Ok(Self {
            db: Arc::new(db),
            conn,
        })
    }

    fn conn(&self) -> &Connection {
        &self.conn
    }
}

/// Parse an RFC 3339 timestamp written by this backend.
fn parse_datetime(s: &str) -> Result<DateTime<Utc>, DatabaseError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| DatabaseError::Serialization(format!("bad timestamp '{s}': {e}")))
}

fn row_to_record(row: &libsql::Row) -> Result<TurnRecord, DatabaseError> {
    let read = |e: libsql::Error| DatabaseError::Serialization(format!("bad turn row: {e}"));

    let session_id: String = row.get(0).map_err(read)?;
    let sequence: i64 = row.get(1).map_err(read)?;
    let role: String = row.get(2).map_err(read)?;
    let text: String = row.get(3).map_err(read)?;
    let timestamp: String = row.get(4).map_err(read)?;

    Ok(TurnRecord {
        session_id: Uuid::parse_str(&session_id)
            .map_err(|e| DatabaseError::Serialization(format!("bad session id: {e}")))?,
        sequence: u64::try_from(sequence)
            .map_err(|_| DatabaseError::Serialization(format!("negative sequence {sequence}")))?,
        role: Role::parse(&role)
            .ok_or_else(|| DatabaseError::Serialization(format!("unknown role '{role}'")))?,
        text,
        timestamp: parse_datetime(&timestamp)?,
    })
}

#[async_trait]
impl TranscriptLog for LibSqlBackend {
    async fn open_session(&self, session_id: Uuid, user_id: &str) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "INSERT OR IGNORE INTO sessions (id, user_id, created_at) VALUES (?1, ?2, ?3)",
                params![session_id.to_string(), user_id, Utc::now().to_rfc3339()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("open_session: {e}")))?;
        Ok(())
    }

    async fn append(&self, records: &[TurnRecord]) -> Result<(), DatabaseError> {
        if records.is_empty() {
            return Ok(());
        }

        let tx = self
            .conn()
            .transaction()
            .await
            .map_err(|e| DatabaseError::Query(format!("append: begin: {e}")))?;

        for record in records {
            let sequence = i64::try_from(record.sequence).map_err(|_| {
                DatabaseError::Serialization(format!("sequence {} overflows", record.sequence))
            })?;
            tx.execute(
                "INSERT INTO turns (session_id, sequence, role, text, timestamp)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    record.session_id.to_string(),
                    sequence,
                    record.role.as_str(),
                    record.text.as_str(),
                    record.timestamp.to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("append: {e}")))?;
        }

        tx.commit()
            .await
            .map_err(|e| DatabaseError::Query(format!("append: commit: {e}")))?;
        debug!(count = records.len(), "Appended transcript records");
        Ok(())
    }

    async fn load(&self, session_id: Uuid) -> Result<Vec<TurnRecord>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT session_id, sequence, role, text, timestamp FROM turns
                 WHERE session_id = ?1 ORDER BY sequence ASC",
                params![session_id.to_string()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("load: {e}")))?;

        let mut records = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("load: {e}")))?
        {
            records.push(row_to_record(&row)?);
        }
        Ok(records)
    }

    async fn latest_session(&self, user_id: &str) -> Result<Option<Uuid>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT id FROM sessions WHERE user_id = ?1
                 ORDER BY created_at DESC, rowid DESC LIMIT 1",
                params![user_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("latest_session: {e}")))?;

        match rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("latest_session: {e}")))?
        {
            Some(row) => {
                let id: String = row
                    .get(0)
                    .map_err(|e| DatabaseError::Serialization(format!("bad session row: {e}")))?;
                Uuid::parse_str(&id)
                    .map(Some)
                    .map_err(|e| DatabaseError::Serialization(format!("bad session id: {e}")))
            }
            None => Ok(None),
        }
    }
}
