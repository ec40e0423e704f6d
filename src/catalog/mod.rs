//! Catalog ports: the read and write sides of the import pipeline's shared
//! state, plus the SQLite implementation.
//!
//! Both ports are assumed externally synchronized. The write port's
//! `import_file` is the single point that resolves races between concurrent
//! imports of identical content; the job itself holds no locks.

mod schema;
mod sqlite_catalog;

pub use schema::{CATALOG_SCHEMA_SQL, CATALOG_SCHEMA_VERSION};
pub use sqlite_catalog::SqliteFileCatalog;

use crate::import::{ImportJob, ImportStatus};
use crate::media::Sha256Hash;
use anyhow::Result;

/// A change to already-stored content, published after import.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentUpdate {
    /// Move a file out of the inbox into the archive.
    Archive { hash: Sha256Hash },
}

/// Read port: pre-import status lookup by content digest.
pub trait StatusReader: Send + Sync {
    fn lookup_status(&self, hash: &Sha256Hash) -> Result<ImportStatus>;
}

/// Write port: transactional import plus content-update publication.
pub trait ImportWriter: Send + Sync {
    /// Commit a fully-extracted job to the catalog and return the
    /// authoritative final status. Must be atomic and idempotent-safe: two
    /// jobs racing on identical content converge to a single stored record,
    /// with the loser seeing an already-present status.
    fn import_file(&self, job: &ImportJob<'_>) -> Result<ImportStatus>;

    /// Publish one content update.
    fn publish_content_update(&self, update: ContentUpdate) -> Result<()>;
}
