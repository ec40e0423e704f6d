//! Content-addressable file vault.
//!
//! Files are stored by sha256 under a two-level hash-prefixed layout:
//!
//! ```text
//! {root}/f3a/3a7b...c9.png     file payload
//! {root}/t3a/3a7b...c9.png     thumbnail, when one was rendered
//! ```
//!
//! Writes go through a temp file + rename so a crashed import never leaves a
//! half-written payload at a resolvable path.

use crate::media::{hash_hex, MediaType, Sha256Hash};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// Errors from vault operations.
///
/// `FileMissing` is load-bearing: the status reconciler keys its self-heal
/// on it, so implementations must not collapse it into a generic IO error.
#[derive(Debug, Error)]
pub enum VaultError {
    #[error("File {0} is not in the vault")]
    FileMissing(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// The store the import pipeline commits accepted files into.
pub trait FileVault: Send + Sync {
    /// Resolve a readable path for previously stored content.
    fn resolve_path(&self, hash: &Sha256Hash, media_type: MediaType)
        -> Result<PathBuf, VaultError>;

    /// Copy `source_path` into the vault under `hash`, attaching a thumbnail
    /// when one was precomputed. Adding content that is already present is a
    /// no-op.
    fn add(
        &self,
        hash: &Sha256Hash,
        media_type: MediaType,
        source_path: &Path,
        thumbnail: Option<&[u8]>,
    ) -> Result<(), VaultError>;
}

/// Filesystem-backed vault.
pub struct FsFileVault {
    root: PathBuf,
}

impl FsFileVault {
    /// Open a vault rooted at `root`, creating the directory if needed.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, VaultError> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    fn file_path(&self, hash: &Sha256Hash, media_type: MediaType) -> PathBuf {
        let hex = hash_hex(hash);
        self.root
            .join(format!("f{}", &hex[..2]))
            .join(format!("{}.{}", hex, media_type.ext()))
    }

    fn thumbnail_path(&self, hash: &Sha256Hash) -> PathBuf {
        let hex = hash_hex(hash);
        self.root
            .join(format!("t{}", &hex[..2]))
            .join(format!("{}.png", hex))
    }

    fn write_atomic(&self, target: &Path, write: impl FnOnce(&mut fs::File) -> std::io::Result<()>)
        -> Result<(), VaultError> {
        // Targets are always {root}/{prefix}/{name}, so a parent exists.
        let dir = target.parent().unwrap_or(&self.root);
        fs::create_dir_all(dir)?;

        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        write(tmp.as_file_mut())?;
        tmp.as_file_mut().flush()?;
        tmp.persist(target).map_err(|e| e.error)?;

        Ok(())
    }
}

impl FileVault for FsFileVault {
    fn resolve_path(
        &self,
        hash: &Sha256Hash,
        media_type: MediaType,
    ) -> Result<PathBuf, VaultError> {
        let path = self.file_path(hash, media_type);
        if path.is_file() {
            Ok(path)
        } else {
            Err(VaultError::FileMissing(hash_hex(hash)))
        }
    }

    fn add(
        &self,
        hash: &Sha256Hash,
        media_type: MediaType,
        source_path: &Path,
        thumbnail: Option<&[u8]>,
    ) -> Result<(), VaultError> {
        let target = self.file_path(hash, media_type);

        if !target.is_file() {
            debug!(hash = %hash_hex(hash), target = ?target, "Copying file into vault");
            self.write_atomic(&target, |file| {
                let mut source = fs::File::open(source_path)?;
                std::io::copy(&mut source, file)?;
                Ok(())
            })?;
        }

        if let Some(thumbnail) = thumbnail {
            let thumb_target = self.thumbnail_path(hash);
            if !thumb_target.is_file() {
                self.write_atomic(&thumb_target, |file| file.write_all(thumbnail))?;
            }
        }

        Ok(())
    }
}
