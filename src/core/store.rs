use anyhow::Result;
use rusqlite::{params, Connection};
use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex};

use super::session::TurnSink;
use super::Turn;
use crate::config::settings::config_dir;

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS sessions (
        id TEXT PRIMARY KEY,
        model TEXT NOT NULL,
        created_at TEXT NOT NULL DEFAULT (datetime('now'))
    );

    CREATE TABLE IF NOT EXISTS turns (
        id TEXT PRIMARY KEY,
        session_id TEXT NOT NULL,
        role TEXT NOT NULL,
        text TEXT NOT NULL DEFAULT '',
        mode TEXT NOT NULL,
        created_at TEXT NOT NULL DEFAULT (datetime('now')),
        FOREIGN KEY (session_id) REFERENCES sessions(id) ON DELETE CASCADE
    );";

#[derive(Debug, Clone)]
pub struct StoredSession {
    pub id: String,
    pub model: String,
    pub created_at: String,
}

/// SQLite log of every turn the user saw, grouped by chat session.
pub struct TranscriptStore {
    conn: Mutex<Connection>,
}

impl TranscriptStore {
    /// Open (or create) the database at ~/.modechat/transcripts.db
    pub fn open() -> Result<Self> {
        let dir = config_dir();
        if !dir.exists() {
            fs::create_dir_all(&dir)?;
        }
        Self::open_at(&dir.join("transcripts.db"))
    }

    pub fn open_at(path: &Path) -> Result<Self> {
        Self::init(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch("PRAGMA journal_mode = WAL; PRAGMA foreign_keys = ON;")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| anyhow::anyhow!("lock error: {}", e))
    }

    pub fn create_session(&self, model: &str) -> Result<StoredSession> {
        let conn = self.lock()?;
        let id = uuid::Uuid::new_v4().to_string();
        conn.execute(
            "INSERT INTO sessions (id, model) VALUES (?1, ?2)",
            params![id, model],
        )?;
        let created_at: String = conn.query_row(
            "SELECT created_at FROM sessions WHERE id = ?1",
            params![id],
            |row| row.get(0),
        )?;
        Ok(StoredSession {
            id,
            model: model.to_string(),
            created_at,
        })
    }

    pub fn record_turn(&self, session_id: &str, turn: &Turn, mode: &str) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO turns (id, session_id, role, text, mode) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![turn.id, session_id, turn.role.as_str(), turn.text, mode],
        )?;
        Ok(())
    }

    /// A turn sink writing into `session_id`. Write failures are logged and dropped.
    pub fn turn_sink(self: Arc<Self>, session_id: String) -> TurnSink {
        Box::new(move |turn: &Turn, mode: &str| {
            if let Err(e) = self.record_turn(&session_id, turn, mode) {
                tracing::warn!(error = %e, turn = %turn.id, "failed to store turn");
            }
        })
    }
}
