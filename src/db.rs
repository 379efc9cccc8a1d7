//! Session persistence
//!
//! Stores one full [`ConversationState`] snapshot per `thread_id` with an
//! inactivity expiry. Every save pushes the expiry forward; expired rows
//! read as absent and are purged in the background.

mod schema;

pub use schema::*;

use crate::conversation::ConversationState;
use chrono::{DateTime, Duration, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("State encoding error: {0}")]
    Encoding(#[from] serde_json::Error),
    #[error("Database lock poisoned")]
    Poisoned,
}

pub type DbResult<T> = Result<T, DbError>;

/// Thread-safe database handle
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open or create database at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> DbResult<Self> {
        let conn = Connection::open(path)?;
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.run_migrations()?;
        Ok(db)
    }

    /// Open an in-memory database (for testing)
    #[allow(dead_code)] // Used in tests
    pub fn open_in_memory() -> DbResult<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.run_migrations()?;
        Ok(db)
    }

    fn conn(&self) -> DbResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| DbError::Poisoned)
    }

    fn run_migrations(&self) -> DbResult<()> {
        let conn = self.conn()?;
        conn.execute_batch(SCHEMA)?;
        Ok(())
    }

    // ==================== Session Operations ====================

    /// Fetch a session row, expired or not
    pub fn get_session(&self, thread_id: &str) -> DbResult<Option<SessionRow>> {
        let conn = self.conn()?;
        let row = conn
            .query_row(
                "SELECT thread_id, state, created_at, updated_at, expires_at
                 FROM sessions WHERE thread_id = ?1",
                params![thread_id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, i64>(4)?,
                    ))
                },
            )
            .optional()?;

        let Some((thread_id, state, created_at, updated_at, expires_at)) = row else {
            return Ok(None);
        };
        Ok(Some(SessionRow {
            thread_id,
            state: serde_json::from_str(&state)?,
            created_at: parse_datetime(&created_at),
            updated_at: parse_datetime(&updated_at),
            expires_at,
        }))
    }

    /// Load the live state for `thread_id`. Expired sessions read as absent.
    pub fn load_state(
        &self,
        thread_id: &str,
        now: DateTime<Utc>,
    ) -> DbResult<Option<ConversationState>> {
        let Some(row) = self.get_session(thread_id)? else {
            return Ok(None);
        };
        if row.is_expired(now) {
            tracing::info!(
                thread_id = %row.thread_id,
                idle_secs = (now - row.updated_at).num_seconds(),
                "Session expired"
            );
            return Ok(None);
        }
        tracing::debug!(
            thread_id = %row.thread_id,
            age_secs = (now - row.created_at).num_seconds(),
            idle_secs = (now - row.updated_at).num_seconds(),
            "Session loaded"
        );
        Ok(Some(row.state))
    }

    /// Write the full snapshot and extend the session's life to `now + ttl`
    pub fn save_state(
        &self,
        thread_id: &str,
        state: &ConversationState,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> DbResult<()> {
        let encoded = serde_json::to_string(state)?;
        let expires_at = (now + ttl).timestamp_millis();
        let stamp = now.to_rfc3339();

        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO sessions (thread_id, state, created_at, updated_at, expires_at)
             VALUES (?1, ?2, ?3, ?3, ?4)
             ON CONFLICT(thread_id) DO UPDATE SET
                state = excluded.state,
                updated_at = excluded.updated_at,
                expires_at = excluded.expires_at,
                created_at = CASE WHEN sessions.expires_at <= ?5
                                  THEN excluded.created_at
                                  ELSE sessions.created_at END",
            params![thread_id, encoded, stamp, expires_at, now.timestamp_millis()],
        )?;
        Ok(())
    }

    /// Delete every expired session, returning how many were removed
    pub fn purge_expired(&self, now: DateTime<Utc>) -> DbResult<usize> {
        let conn = self.conn()?;
        let removed = conn.execute(
            "DELETE FROM sessions WHERE expires_at <= ?1",
            params![now.timestamp_millis()],
        )?;
        Ok(removed)
    }

    /// Number of rows currently stored, live or expired
    pub fn session_count(&self) -> DbResult<usize> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM sessions", [], |row| row.get(0))?;
        Ok(usize::try_from(count).unwrap_or_default())
    }
}

fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s).map_or_else(|_| Utc::now(), |dt| dt.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::Message;

    fn state_with(messages: &[&str]) -> ConversationState {
        let mut state = ConversationState::new(Message::user(messages[0]), 10, None);
        for text in &messages[1..] {
            state.append(Message::assistant(*text));
        }
        state
    }

    #[test]
    fn test_load_missing_is_absent() {
        let db = Database::open_in_memory().unwrap();
        assert!(db.load_state("nope", Utc::now()).unwrap().is_none());
    }

    #[test]
    fn test_save_then_load_round_trips_full_state() {
        let db = Database::open_in_memory().unwrap();
        let now = Utc::now();
        let mut state = state_with(&["hi", "hello"]);
        state.remaining_steps = 7;

        db.save_state("t1", &state, Duration::minutes(15), now).unwrap();
        let loaded = db.load_state("t1", now).unwrap().unwrap();
        assert_eq!(loaded, state);
    }

    #[test]
    fn test_expired_session_reads_as_absent() {
        let db = Database::open_in_memory().unwrap();
        let now = Utc::now();
        db.save_state("t1", &state_with(&["hi"]), Duration::minutes(15), now)
            .unwrap();

        assert!(db
            .load_state("t1", now + Duration::minutes(14))
            .unwrap()
            .is_some());
        assert!(db
            .load_state("t1", now + Duration::minutes(15))
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_save_extends_expiry() {
        let db = Database::open_in_memory().unwrap();
        let start = Utc::now();
        let ttl = Duration::minutes(15);
        db.save_state("t1", &state_with(&["hi"]), ttl, start).unwrap();

        let later = start + Duration::minutes(10);
        db.save_state("t1", &state_with(&["hi", "again"]), ttl, later)
            .unwrap();

        let row = db.get_session("t1").unwrap().unwrap();
        assert_eq!(row.expires_at, (later + ttl).timestamp_millis());
        assert_eq!(row.created_at.timestamp(), start.timestamp());
        assert!(db
            .load_state("t1", start + Duration::minutes(20))
            .unwrap()
            .is_some());
    }

    #[test]
    fn test_purge_removes_only_expired() {
        let db = Database::open_in_memory().unwrap();
        let now = Utc::now();
        db.save_state("old", &state_with(&["a"]), Duration::minutes(1), now)
            .unwrap();
        db.save_state("new", &state_with(&["b"]), Duration::minutes(30), now)
            .unwrap();

        let removed = db.purge_expired(now + Duration::minutes(5)).unwrap();
        assert_eq!(removed, 1);
        assert_eq!(db.session_count().unwrap(), 1);
        assert!(db.get_session("new").unwrap().is_some());
    }

    #[test]
    fn test_state_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sessions.db");
        let now = Utc::now();
        let state = state_with(&["book me in", "Sure"]);

        {
            let db = Database::open(&path).unwrap();
            db.save_state("t1", &state, Duration::minutes(15), now).unwrap();
        }

        let db = Database::open(&path).unwrap();
        assert_eq!(db.load_state("t1", now).unwrap(), Some(state));
    }
}
