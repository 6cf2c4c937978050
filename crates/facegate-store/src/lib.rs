//! facegate-store — SQLite-backed [`TemplateStore`].
//!
//! One row per subject in `face_templates`. Every write is a single
//! statement, so a reader never observes a half-written encoded form.

use chrono::Utc;
use facegate_core::{EncodedForm, StoreError, SubjectId, TemplateStore};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS face_templates (
    subject_id TEXT PRIMARY KEY NOT NULL,
    encoded    TEXT,
    updated_at TEXT NOT NULL
);
";

/// Template store over a single SQLite connection.
pub struct SqliteTemplateStore {
    conn: Mutex<Connection>,
}

impl SqliteTemplateStore {
    /// Open (or create) the database file, creating parent directories.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                StoreError::Unavailable(format!("cannot create {}: {e}", parent.display()))
            })?;
        }

        let conn = Connection::open(path).map_err(backend)?;
        let mode: String = conn
            .pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))
            .map_err(backend)?;
        conn.busy_timeout(std::time::Duration::from_secs(5))
            .map_err(backend)?;

        let store = Self::with_connection(conn)?;
        tracing::info!(path = %path.display(), journal_mode = %mode, "template store opened");
        Ok(store)
    }

    /// Private in-memory database, for tests and tooling.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::with_connection(Connection::open_in_memory().map_err(backend)?)
    }

    fn with_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(SCHEMA).map_err(backend)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Unavailable("connection lock poisoned".into()))
    }
}

impl TemplateStore for SqliteTemplateStore {
    fn get(&self, subject_id: &SubjectId) -> Result<Option<EncodedForm>, StoreError> {
        let conn = self.lock()?;
        let encoded: Option<Option<String>> = conn
            .query_row(
                "SELECT encoded FROM face_templates WHERE subject_id = ?1",
                params![subject_id.as_str()],
                |row| row.get(0),
            )
            .optional()
            .map_err(backend)?;
        Ok(encoded.flatten().map(EncodedForm::new))
    }

    fn put(&self, subject_id: &SubjectId, encoded: &EncodedForm) -> Result<(), StoreError> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO face_templates (subject_id, encoded, updated_at)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(subject_id) DO UPDATE
             SET encoded = excluded.encoded, updated_at = excluded.updated_at",
            params![subject_id.as_str(), encoded.as_str(), Utc::now().to_rfc3339()],
        )
        .map_err(backend)?;
        tracing::debug!(subject = %subject_id, "template written");
        Ok(())
    }

    fn clear(&self, subject_id: &SubjectId) -> Result<(), StoreError> {
        let conn = self.lock()?;
        let rows = conn
            .execute(
                "DELETE FROM face_templates WHERE subject_id = ?1",
                params![subject_id.as_str()],
            )
            .map_err(backend)?;
        tracing::debug!(subject = %subject_id, rows, "template cleared");
        Ok(())
    }

    fn list_subjects_with_template(&self) -> Result<Vec<SubjectId>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(
                "SELECT subject_id, encoded FROM face_templates
                 WHERE encoded IS NOT NULL
                 ORDER BY subject_id",
            )
            .map_err(backend)?;
        let rows = stmt
            .query_map([], |row| {
                Ok((row.get::<_, String>(0)?, EncodedForm::new(row.get::<_, String>(1)?)))
            })
            .map_err(backend)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(backend)?;
        // Blankness is decided by `EncodedForm::is_blank`, not SQL `trim`.
        Ok(rows
            .into_iter()
            .filter(|(_, encoded)| !encoded.is_blank())
            .map(|(id, _)| SubjectId::from(id))
            .collect())
    }
}

fn backend(e: rusqlite::Error) -> StoreError {
    StoreError::Backend(Box::new(e))
}
