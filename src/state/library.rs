use chrono::{DateTime, TimeZone, Utc};
use rusqlite::{params, Connection};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::backend::{ComposeResult, DeliveryResult};
use crate::error::{EditorError, EditorResult};

/// A finished session as remembered locally, for replay
#[derive(Debug, Clone, PartialEq)]
pub struct SessionEntry {
    pub session_id: String,
    pub result_path: String,
    pub qr_code_path: String,
    pub video_path: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// The Library is the local SQLite catalog of finished sessions.
/// The backend keeps the actual session data; this only lists what this
/// booth produced so a session can be reopened.
pub struct Library {
    conn: Connection,
    db_path: PathBuf,
}

impl Library {
    /// Open the catalog in the user's data directory:
    /// - Linux: ~/.local/share/photobooth-editor/photobooth.db
    /// - macOS: ~/Library/Application Support/photobooth-editor/photobooth.db
    /// - Windows: %APPDATA%\photobooth-editor\photobooth.db
    pub fn new() -> EditorResult<Self> {
        let db_path = Self::default_db_path()
            .ok_or_else(|| EditorError::not_ready("no user data directory"))?;
        Self::open(&db_path)
    }

    pub fn open(db_path: &Path) -> EditorResult<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(db_path)?;
        info!(path = %db_path.display(), "catalog opened");

        let library = Library { conn, db_path: db_path.to_path_buf() };
        library.init_schema()?;
        Ok(library)
    }

    #[cfg(test)]
    pub fn in_memory() -> EditorResult<Self> {
        let library = Library { conn: Connection::open_in_memory()?, db_path: PathBuf::from(":memory:") };
        library.init_schema()?;
        Ok(library)
    }

    fn default_db_path() -> Option<PathBuf> {
        let mut path = dirs::data_dir().or_else(dirs::home_dir)?;
        path.push("photobooth-editor");
        path.push("photobooth.db");
        Some(path)
    }

    fn init_schema(&self) -> EditorResult<()> {
        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS sessions (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                session_id      TEXT NOT NULL UNIQUE,
                result_path     TEXT NOT NULL,
                qr_code_path    TEXT NOT NULL,
                video_path      TEXT,
                created_at      INTEGER NOT NULL
            )",
            [],
        )?;

        self.conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_sessions_created_at
             ON sessions(created_at DESC)",
            [],
        )?;
        Ok(())
    }

    pub fn path(&self) -> &PathBuf {
        &self.db_path
    }

    pub fn session_count(&self) -> EditorResult<i64> {
        Ok(self.conn.query_row("SELECT COUNT(*) FROM sessions", [], |row| row.get(0))?)
    }

    /// Remember a composed result. Re-finalizing the same session updates it.
    pub fn record_session(&self, result: &ComposeResult) -> EditorResult<()> {
        self.record_session_at(result, Utc::now())
    }

    fn record_session_at(&self, result: &ComposeResult, at: DateTime<Utc>) -> EditorResult<()> {
        self.conn.execute(
            "INSERT INTO sessions (session_id, result_path, qr_code_path, created_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(session_id) DO UPDATE SET
                result_path = excluded.result_path,
                qr_code_path = excluded.qr_code_path",
            params![result.session_id, result.result_path, result.qr_code_path, at.timestamp_millis()],
        )?;
        Ok(())
    }

    pub fn set_video(&self, session_id: &str, video: &DeliveryResult) -> EditorResult<()> {
        self.conn.execute(
            "UPDATE sessions SET video_path = ?1 WHERE session_id = ?2",
            params![video.result_path, session_id],
        )?;
        Ok(())
    }

    /// Newest first
    pub fn recent_sessions(&self, limit: usize) -> EditorResult<Vec<SessionEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT session_id, result_path, qr_code_path, video_path, created_at
             FROM sessions ORDER BY created_at DESC, id DESC LIMIT ?1",
        )?;

        let entries = stmt
            .query_map([limit as i64], Self::row_to_entry)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    fn row_to_entry(row: &rusqlite::Row<'_>) -> rusqlite::Result<SessionEntry> {
        let millis: i64 = row.get(4)?;
        Ok(SessionEntry {
            session_id: row.get(0)?,
            result_path: row.get(1)?,
            qr_code_path: row.get(2)?,
            video_path: row.get(3)?,
            created_at: Utc.timestamp_millis_opt(millis).single().unwrap_or_default(),
        })
    }
}

impl std::fmt::Debug for Library {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Library")
            .field("db_path", &self.db_path)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(id: &str) -> ComposeResult {
        ComposeResult {
            result_path: format!("/static/results/{id}.png"),
            qr_code_path: format!("/static/results/qr_{id}.png"),
            session_id: id.to_string(),
        }
    }

    #[test]
    fn recent_sessions_are_newest_first() {
        let lib = Library::in_memory().unwrap();
        let t0 = Utc.timestamp_millis_opt(1_700_000_000_000).unwrap();
        lib.record_session_at(&result("a"), t0).unwrap();
        lib.record_session_at(&result("b"), t0 + chrono::Duration::seconds(5)).unwrap();

        let recent = lib.recent_sessions(10).unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].session_id, "b");
        assert_eq!(recent[1].created_at, t0);
    }

    #[test]
    fn refinalize_updates_in_place_and_video_attaches() {
        let lib = Library::in_memory().unwrap();
        lib.record_session(&result("a")).unwrap();
        let mut again = result("a");
        again.result_path = "/static/results/a_v2.png".into();
        lib.record_session(&again).unwrap();
        lib.set_video(
            "a",
            &DeliveryResult { result_path: "/static/results/a.mp4".into(), qr_code_path: "/q.png".into() },
        )
        .unwrap();

        assert_eq!(lib.session_count().unwrap(), 1);
        let entry = &lib.recent_sessions(10).unwrap()[0];
        assert_eq!(entry.result_path, "/static/results/a_v2.png");
        assert_eq!(entry.video_path.as_deref(), Some("/static/results/a.mp4"));
    }
}
