//! SQLite implementation of the catalog ports.

use super::schema::{CATALOG_SCHEMA_SQL, CATALOG_SCHEMA_VERSION};
use super::{ContentUpdate, ImportWriter, StatusReader};
use crate::import::{ImportJob, ImportStatus, ImportStatusCode};
use crate::media::{hash_hex, MediaType, Sha256Hash};
use anyhow::{anyhow, Context, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, info};

/// File catalog backed by a single SQLite database.
///
/// The connection mutex makes every operation, `import_file` included, a
/// serialized transaction from the pipeline's point of view.
pub struct SqliteFileCatalog {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteFileCatalog {
    /// Open or create a catalog database.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open catalog database: {:?}", path))?;
        Self::init(conn)
    }

    /// Create an ephemeral in-memory catalog, for tests and dry runs.
    pub fn in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute("PRAGMA foreign_keys = ON", [])?;
        conn.execute_batch(CATALOG_SCHEMA_SQL)?;
        conn.pragma_update(None, "user_version", CATALOG_SCHEMA_VERSION)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Mark stored content as deleted, leaving a tombstone so a later import
    /// of the same bytes reports it as previously deleted.
    pub fn mark_deleted(&self, hash: &Sha256Hash) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let changed = conn.execute(
            "UPDATE files SET deleted = 1, archived = 0 WHERE hash = ?1",
            params![hash.as_slice()],
        )?;
        anyhow::ensure!(changed == 1, "No catalog record for {}", hash_hex(hash));
        Ok(())
    }

    pub fn is_archived(&self, hash: &Sha256Hash) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let archived: Option<i64> = conn
            .query_row(
                "SELECT archived FROM files WHERE hash = ?1",
                params![hash.as_slice()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(archived == Some(1))
    }

    pub fn count_files(&self) -> Result<u64> {
        let conn = self.conn.lock().unwrap();
        let count: i64 =
            conn.query_row("SELECT COUNT(*) FROM files WHERE deleted = 0", [], |row| {
                row.get(0)
            })?;
        Ok(count.max(0) as u64)
    }
}

fn system_time_to_secs(t: SystemTime) -> i64 {
    match t.duration_since(UNIX_EPOCH) {
        Ok(d) => d.as_secs() as i64,
        Err(_) => 0,
    }
}

fn perceptual_hashes_to_json(hashes: &[Vec<u8>]) -> Result<String> {
    let hex: Vec<String> = hashes
        .iter()
        .map(|h| h.iter().map(|b| format!("{:02x}", b)).collect())
        .collect();
    Ok(serde_json::to_string(&hex)?)
}

impl StatusReader for SqliteFileCatalog {
    fn lookup_status(&self, hash: &Sha256Hash) -> Result<ImportStatus> {
        let conn = self.conn.lock().unwrap();

        let row: Option<(String, i64)> = conn
            .query_row(
                "SELECT mime, deleted FROM files WHERE hash = ?1",
                params![hash.as_slice()],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        let status = match row {
            None => ImportStatus::new(ImportStatusCode::Unknown, Some(*hash)),
            Some((mime, deleted)) => {
                let code = if deleted == 1 {
                    ImportStatusCode::PreviouslyDeleted
                } else {
                    ImportStatusCode::AlreadyPresent
                };
                let mut status = ImportStatus::new(code, Some(*hash));
                status.media_type = Some(MediaType::from_mime_str(&mime));
                status.note = "file recognised".to_string();
                status
            }
        };

        debug!(hash = %hash_hex(hash), status = %status, "Catalog status lookup");
        Ok(status)
    }
}

impl ImportWriter for SqliteFileCatalog {
    fn import_file(&self, job: &ImportJob<'_>) -> Result<ImportStatus> {
        let hash = job
            .hash()
            .ok_or_else(|| anyhow!("Import requested before the content hash was computed"))?;
        let info = job
            .file_info()
            .ok_or_else(|| anyhow!("Import requested before metadata extraction"))?;

        let perceptual_hashes = job
            .perceptual_hashes()
            .map(perceptual_hashes_to_json)
            .transpose()?;
        let (blake3, sha512) = match job.extra_hashes() {
            Some(extra) => (
                Some(extra.blake3.to_vec()),
                Some(extra.sha512.to_vec()),
            ),
            None => (None, None),
        };
        let source_modified_at = job.file_modified_at().map(system_time_to_secs);

        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;

        let existing: Option<i64> = tx
            .query_row(
                "SELECT deleted FROM files WHERE hash = ?1",
                params![hash.as_slice()],
                |row| row.get(0),
            )
            .optional()?;

        let status = match existing {
            // A racing job (or an earlier import) got here first.
            Some(0) => {
                let mut status = ImportStatus::new(ImportStatusCode::AlreadyPresent, Some(hash));
                status.media_type = Some(info.media_type);
                status
            }
            Some(_) => {
                // Tombstoned content being re-imported: revive the record.
                tx.execute(
                    r#"
                    UPDATE files SET
                        mime = ?2, size = ?3, width = ?4, height = ?5,
                        duration_ms = ?6, num_frames = ?7, has_audio = ?8, num_words = ?9,
                        blake3 = ?10, sha512 = ?11, perceptual_hashes = ?12,
                        source_modified_at = ?13, deleted = 0
                    WHERE hash = ?1
                    "#,
                    params![
                        hash.as_slice(),
                        info.media_type.mime(),
                        info.size as i64,
                        info.width,
                        info.height,
                        info.duration_ms.map(|d| d as i64),
                        info.num_frames,
                        info.has_audio as i64,
                        info.num_words,
                        blake3,
                        sha512,
                        perceptual_hashes,
                        source_modified_at,
                    ],
                )?;

                let mut status = ImportStatus::new(ImportStatusCode::New, Some(hash));
                status.media_type = Some(info.media_type);
                status
            }
            None => {
                tx.execute(
                    r#"
                    INSERT INTO files (
                        hash, mime, size, width, height, duration_ms, num_frames,
                        has_audio, num_words, blake3, sha512, perceptual_hashes,
                        source_modified_at
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
                    "#,
                    params![
                        hash.as_slice(),
                        info.media_type.mime(),
                        info.size as i64,
                        info.width,
                        info.height,
                        info.duration_ms.map(|d| d as i64),
                        info.num_frames,
                        info.has_audio as i64,
                        info.num_words,
                        blake3,
                        sha512,
                        perceptual_hashes,
                        source_modified_at,
                    ],
                )?;

                info!(hash = %hash_hex(&hash), mime = info.media_type.mime(), "Imported new file");
                let mut status = ImportStatus::new(ImportStatusCode::New, Some(hash));
                status.media_type = Some(info.media_type);
                status
            }
        };

        tx.commit()?;
        Ok(status)
    }

    fn publish_content_update(&self, update: ContentUpdate) -> Result<()> {
        match update {
            ContentUpdate::Archive { hash } => {
                debug!(hash = %hash_hex(&hash), "Archiving file");
                let conn = self.conn.lock().unwrap();
                conn.execute(
                    "UPDATE files SET archived = 1 WHERE hash = ?1 AND deleted = 0",
                    params![hash.as_slice()],
                )?;
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_unknown_hash() {
        let catalog = SqliteFileCatalog::in_memory().unwrap();
        let status = catalog.lookup_status(&[1u8; 32]).unwrap();
        assert_eq!(status.code, ImportStatusCode::Unknown);
        assert_eq!(status.hash, Some([1u8; 32]));
    }

    #[test]
    fn test_archive_update_requires_live_record() {
        let catalog = SqliteFileCatalog::in_memory().unwrap();
        // No record: the update is a no-op, not an error.
        catalog
            .publish_content_update(ContentUpdate::Archive { hash: [2u8; 32] })
            .unwrap();
        assert!(!catalog.is_archived(&[2u8; 32]).unwrap());
    }

    #[test]
    fn test_mark_deleted_requires_record() {
        let catalog = SqliteFileCatalog::in_memory().unwrap();
        assert!(catalog.mark_deleted(&[3u8; 32]).is_err());
    }
}
