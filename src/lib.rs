//! Filevault Library
//!
//! Content-addressable file ingestion: analyze a staged file, decide whether
//! it belongs in the vault, store it, and record it in the catalog.

pub mod catalog;
pub mod import;
pub mod media;
pub mod vault;

// Re-export commonly used types for convenience
pub use catalog::{ContentUpdate, ImportWriter, SqliteFileCatalog, StatusReader};
pub use import::{ImportContext, ImportJob, ImportOptions, ImportStatus, ImportStatusCode};
pub use media::{FileAnalyzer, MediaType, StandardFileAnalyzer};
pub use vault::{FileVault, FsFileVault};
