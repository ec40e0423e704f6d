//! SQLite schema for the file catalog.

pub const CATALOG_SCHEMA_VERSION: i64 = 1;

pub const CATALOG_SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS files (
    hash BLOB PRIMARY KEY NOT NULL,
    mime TEXT NOT NULL,
    size INTEGER NOT NULL,
    width INTEGER,
    height INTEGER,
    duration_ms INTEGER,
    num_frames INTEGER,
    has_audio INTEGER NOT NULL DEFAULT 0,
    num_words INTEGER,
    blake3 BLOB,
    sha512 BLOB,
    perceptual_hashes TEXT,
    source_modified_at INTEGER,
    archived INTEGER NOT NULL DEFAULT 0,
    deleted INTEGER NOT NULL DEFAULT 0,
    imported_at INTEGER NOT NULL DEFAULT (cast(strftime('%s','now') as int))
);

CREATE INDEX IF NOT EXISTS idx_files_blake3 ON files(blake3);
"#;
