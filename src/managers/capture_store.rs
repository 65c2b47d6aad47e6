//! Capture history backed by SQLite.
//!
//! Every finished full-page or region capture is recorded with its image so
//! the last result survives a restart of the host.

use std::time::{SystemTime, UNIX_EPOCH};

use rusqlite::{params, OptionalExtension, Row};
use tracing::debug;

use crate::database::connection::Database;
use crate::types::capture::{CaptureKind, CaptureRecord, CapturedImage, MessageSender, OutputFormat};
use crate::types::errors::StoreError;

/// Trait defining capture history operations.
pub trait CaptureStoreTrait {
    fn record(&mut self, kind: CaptureKind, sender: &MessageSender, image: &CapturedImage) -> Result<i64, StoreError>;
    fn set_analysis(&mut self, id: i64, analysis: Option<&str>, error: Option<&str>) -> Result<(), StoreError>;
    fn last_capture(&self) -> Result<Option<CaptureRecord>, StoreError>;
    fn image(&self, id: i64) -> Result<CapturedImage, StoreError>;
    fn list_recent(&self, limit: usize) -> Result<Vec<CaptureRecord>, StoreError>;
    fn clear(&mut self) -> Result<usize, StoreError>;
}

/// Rows kept when no limit is configured.
pub const DEFAULT_RETENTION: usize = 50;

const RECORD_COLUMNS: &str =
    "id, kind, tab_id, url, mime_type, width, height, captured_at, analysis, analysis_error";

pub struct CaptureStore {
    db: Database,
    retention: usize,
}

impl CaptureStore {
    pub fn new(db: Database) -> Self {
        Self::with_retention(db, DEFAULT_RETENTION)
    }

    /// Keeps at most `retention` captures (at least one).
    pub fn with_retention(db: Database, retention: usize) -> Self {
        Self {
            db,
            retention: retention.max(1),
        }
    }

    pub fn retention(&self) -> usize {
        self.retention
    }

    /// Changes the cap and prunes right away. Returns the rows removed.
    pub fn set_retention(&mut self, retention: usize) -> Result<usize, StoreError> {
        self.retention = retention.max(1);
        self.prune()
    }

    /// Deletes everything but the newest `retention` rows.
    fn prune(&self) -> Result<usize, StoreError> {
        let removed = self
            .db
            .connection()
            .execute(
                "DELETE FROM captures WHERE id NOT IN \
                 (SELECT id FROM captures ORDER BY id DESC LIMIT ?1)",
                params![self.retention as i64],
            )
            .map_err(db_err)?;
        if removed > 0 {
            debug!(removed, retention = self.retention, "capture history pruned");
        }
        Ok(removed)
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    fn now() -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs() as i64
    }

    fn row_to_record(row: &Row) -> rusqlite::Result<CaptureRecord> {
        let kind: String = row.get(1)?;
        Ok(CaptureRecord {
            id: row.get(0)?,
            kind: CaptureKind::parse(&kind),
            tab_id: row.get(2)?,
            url: row.get(3)?,
            mime_type: row.get(4)?,
            width: row.get(5)?,
            height: row.get(6)?,
            captured_at: row.get(7)?,
            analysis: row.get(8)?,
            analysis_error: row.get(9)?,
        })
    }
}

fn db_err(e: rusqlite::Error) -> StoreError {
    StoreError::DatabaseError(e.to_string())
}

impl CaptureStoreTrait for CaptureStore {
    /// Stores a finished capture and returns its row id, pruning the
    /// history down to the retention cap.
    fn record(&mut self, kind: CaptureKind, sender: &MessageSender, image: &CapturedImage) -> Result<i64, StoreError> {
        let conn = self.db.connection();
        conn.execute(
            "INSERT INTO captures (kind, tab_id, url, mime_type, width, height, image, captured_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                kind.as_str(),
                sender.tab_id,
                sender.url,
                image.format.mime(),
                image.width,
                image.height,
                image.bytes,
                Self::now()
            ],
        )
        .map_err(db_err)?;
        let id = conn.last_insert_rowid();
        debug!(id, kind = kind.as_str(), width = image.width, height = image.height, "capture recorded");
        self.prune()?;
        Ok(id)
    }

    /// Attaches the vision analysis outcome to a stored capture.
    fn set_analysis(&mut self, id: i64, analysis: Option<&str>, error: Option<&str>) -> Result<(), StoreError> {
        let updated = self
            .db
            .connection()
            .execute(
                "UPDATE captures SET analysis = ?1, analysis_error = ?2 WHERE id = ?3",
                params![analysis, error, id],
            )
            .map_err(db_err)?;
        if updated == 0 {
            return Err(StoreError::NotFound(id));
        }
        Ok(())
    }

    fn last_capture(&self) -> Result<Option<CaptureRecord>, StoreError> {
        self.db
            .connection()
            .query_row(
                &format!("SELECT {} FROM captures ORDER BY id DESC LIMIT 1", RECORD_COLUMNS),
                [],
                Self::row_to_record,
            )
            .optional()
            .map_err(db_err)
    }

    fn image(&self, id: i64) -> Result<CapturedImage, StoreError> {
        let row = self
            .db
            .connection()
            .query_row(
                "SELECT mime_type, width, height, image FROM captures WHERE id = ?1",
                params![id],
                |row| {
                    let mime: String = row.get(0)?;
                    Ok(CapturedImage {
                        format: OutputFormat::parse(&mime).unwrap_or_default(),
                        width: row.get(1)?,
                        height: row.get(2)?,
                        bytes: row.get(3)?,
                    })
                },
            )
            .optional()
            .map_err(db_err)?;
        row.ok_or(StoreError::NotFound(id))
    }

    /// Newest first.
    fn list_recent(&self, limit: usize) -> Result<Vec<CaptureRecord>, StoreError> {
        let conn = self.db.connection();
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {} FROM captures ORDER BY id DESC LIMIT ?1",
                RECORD_COLUMNS
            ))
            .map_err(db_err)?;
        let rows = stmt
            .query_map(params![limit as i64], Self::row_to_record)
            .map_err(db_err)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(db_err)
    }

    fn clear(&mut self) -> Result<usize, StoreError> {
        self.db
            .connection()
            .execute("DELETE FROM captures", [])
            .map_err(db_err)
    }
}
