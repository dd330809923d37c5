use crate::assignment::AnswerSheet;
use crate::workspace::ResumePoint;
use chrono::{DateTime, Utc};
use directories::ProjectDirs;
use rusqlite::{params, Connection, OptionalExtension, Result};
use std::path::{Path, PathBuf};

/// A saved draft: what was written, and when the clock started for timed
/// work. Survives process restarts so a session picks up where it left off.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredDraft {
    pub assignment_id: i64,
    pub started_at: Option<DateTime<Utc>>,
    pub sheet: AnswerSheet,
    pub updated_at: DateTime<Utc>,
}

impl From<StoredDraft> for ResumePoint {
    fn from(draft: StoredDraft) -> Self {
        ResumePoint {
            sheet: draft.sheet,
            started_at: draft.started_at,
        }
    }
}

/// Database manager for in-flight drafts
#[derive(Debug)]
pub struct DraftStore {
    conn: Connection,
}

impl DraftStore {
    /// Open the store at its default location, creating it if needed.
    pub fn new() -> Result<Self> {
        let db_path = Self::get_db_path().unwrap_or_else(|| PathBuf::from("studyhall_drafts.db"));
        Self::open_at(&db_path)
    }

    pub fn open_at(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                rusqlite::Error::SqliteFailure(
                    rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_CANTOPEN),
                    Some(format!("Failed to create directory: {}", e)),
                )
            })?;
        }

        let conn = Connection::open(db_path)?;

        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS drafts (
                assignment_id INTEGER PRIMARY KEY,
                started_at TEXT,
                content TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
            [],
        )?;

        Ok(DraftStore { conn })
    }

    /// Database file under $HOME/.local/state/studyhall
    fn get_db_path() -> Option<PathBuf> {
        if let Ok(home) = std::env::var("HOME") {
            let state_dir = PathBuf::from(home)
                .join(".local")
                .join("state")
                .join("studyhall");
            Some(state_dir.join("drafts.db"))
        } else if let Some(proj_dirs) = ProjectDirs::from("", "", "studyhall") {
            let state_dir = proj_dirs.data_local_dir();
            Some(state_dir.join("drafts.db"))
        } else {
            None
        }
    }

    /// Insert or overwrite the draft for an assignment. Last write wins.
    pub fn save(&self, draft: &StoredDraft) -> Result<()> {
        let content = serde_json::to_string(&draft.sheet).map_err(|_| {
            rusqlite::Error::InvalidColumnType(2, "content".to_string(), rusqlite::types::Type::Text)
        })?;

        self.conn.execute(
            r#"
            INSERT INTO drafts (assignment_id, started_at, content, updated_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(assignment_id) DO UPDATE SET
                started_at = excluded.started_at,
                content = excluded.content,
                updated_at = excluded.updated_at
            "#,
            params![
                draft.assignment_id,
                draft.started_at.map(|t| t.to_rfc3339()),
                content,
                draft.updated_at.to_rfc3339(),
            ],
        )?;

        Ok(())
    }

    pub fn load(&self, assignment_id: i64) -> Result<Option<StoredDraft>> {
        self.conn
            .query_row(
                "SELECT assignment_id, started_at, content, updated_at FROM drafts WHERE assignment_id = ?1",
                [assignment_id],
                |row| {
                    let started_at: Option<String> = row.get(1)?;
                    let started_at = match started_at {
                        Some(raw) => Some(parse_instant(&raw, 1)?),
                        None => None,
                    };

                    let content: String = row.get(2)?;
                    let sheet = serde_json::from_str(&content).map_err(|_| {
                        rusqlite::Error::InvalidColumnType(
                            2,
                            "content".to_string(),
                            rusqlite::types::Type::Text,
                        )
                    })?;

                    let updated_at: String = row.get(3)?;

                    Ok(StoredDraft {
                        assignment_id: row.get(0)?,
                        started_at,
                        sheet,
                        updated_at: parse_instant(&updated_at, 3)?,
                    })
                },
            )
            .optional()
    }

    /// Drop the draft once the work has been accepted upstream.
    pub fn delete(&self, assignment_id: i64) -> Result<()> {
        self.conn
            .execute("DELETE FROM drafts WHERE assignment_id = ?1", [assignment_id])?;
        Ok(())
    }
}

fn parse_instant(raw: &str, column: usize) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|_| {
            rusqlite::Error::InvalidColumnType(
                column,
                "timestamp".to_string(),
                rusqlite::types::Type::Text,
            )
        })
}
