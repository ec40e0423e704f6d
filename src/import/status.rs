//! Import status values and the self-healing status reconciler.

use crate::import::ImportOptions;
use crate::media::{MediaType, Sha256Hash};
use crate::vault::{FileVault, VaultError};
use tracing::warn;

/// A file's relationship to the vault.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImportStatusCode {
    /// Nothing is known about this content yet; importing is allowed.
    Unknown,
    /// Freshly committed by this import.
    New,
    /// Content is already in the vault.
    AlreadyPresent,
    /// Content was in the vault once and has been deleted since.
    PreviouslyDeleted,
    /// Rejected by the acceptance policy.
    Vetoed,
}

impl ImportStatusCode {
    pub fn label(&self) -> &'static str {
        match self {
            ImportStatusCode::Unknown => "unknown",
            ImportStatusCode::New => "new",
            ImportStatusCode::AlreadyPresent => "already in vault",
            ImportStatusCode::PreviouslyDeleted => "previously deleted",
            ImportStatusCode::Vetoed => "vetoed",
        }
    }
}

/// Outcome value carried through the import pipeline.
///
/// Cloning yields an independent value; the pipeline derives its post-import
/// status from the pre-import one via [`ImportStatus::vetoed`] and `clone`
/// rather than mutating shared state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportStatus {
    pub code: ImportStatusCode,
    pub hash: Option<Sha256Hash>,
    pub media_type: Option<MediaType>,
    pub note: String,
}

impl ImportStatus {
    pub fn new(code: ImportStatusCode, hash: Option<Sha256Hash>) -> Self {
        Self {
            code,
            hash,
            media_type: None,
            note: String::new(),
        }
    }

    /// The pre-lookup default: nothing known, no identity.
    pub fn unknown() -> Self {
        Self::new(ImportStatusCode::Unknown, None)
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = note.into();
        self
    }

    /// Derive a vetoed status from this one, carrying the violation message.
    pub fn vetoed(&self, note: impl Into<String>) -> Self {
        let mut status = self.clone();
        status.code = ImportStatusCode::Vetoed;
        status.note = note.into();
        status
    }

    pub fn already_in_store(&self) -> bool {
        self.code == ImportStatusCode::AlreadyPresent
    }

    /// Whether the pipeline should proceed to import this content.
    ///
    /// Unknown content always imports. Previously deleted content imports
    /// unless the options exclude it. Already-present and vetoed content
    /// never re-imports.
    pub fn should_import(&self, options: &ImportOptions) -> bool {
        match self.code {
            ImportStatusCode::Unknown => true,
            ImportStatusCode::PreviouslyDeleted => !options.excludes_deleted(),
            _ => false,
        }
    }
}

impl std::fmt::Display for ImportStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.note.is_empty() {
            f.write_str(self.code.label())
        } else {
            write!(f, "{}, {}", self.code.label(), self.note)
        }
    }
}

/// Re-validate an "already present" status against the live vault.
///
/// The catalog can drift from the vault (a payload removed behind its back).
/// When the vault reports the content missing, the status is demoted to
/// Unknown with an explanatory note so the import proceeds and repairs the
/// inconsistency. Every other case returns the input untouched. Read-only.
pub fn reconcile_import_status(status: ImportStatus, vault: &dyn FileVault) -> ImportStatus {
    if !status.already_in_store() {
        return status;
    }

    let (hash, media_type) = match (status.hash, status.media_type) {
        (Some(hash), Some(media_type)) => (hash, media_type),
        // Nothing to verify against the vault.
        _ => return status,
    };

    match vault.resolve_path(&hash, media_type) {
        Err(VaultError::FileMissing(_)) => {
            warn!(
                media_type = %media_type,
                "Catalog believed this file was in the vault, but it was missing"
            );

            let note = "The catalog believed this file was already in the vault, but it was \
                        truly missing! Import will go ahead, in an attempt to fix the situation.";

            ImportStatus {
                code: ImportStatusCode::Unknown,
                hash: Some(hash),
                media_type: Some(media_type),
                note: note.to_string(),
            }
        }
        _ => status,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::{Path, PathBuf};

    fn options_excluding_deleted(exclude: bool) -> ImportOptions {
        let mut options = ImportOptions::default();
        options.set_exclude_deleted(exclude);
        options
    }

    struct EmptyVault;

    impl FileVault for EmptyVault {
        fn resolve_path(
            &self,
            hash: &Sha256Hash,
            _media_type: MediaType,
        ) -> Result<PathBuf, VaultError> {
            Err(VaultError::FileMissing(format!("{:02x}", hash[0])))
        }

        fn add(
            &self,
            _hash: &Sha256Hash,
            _media_type: MediaType,
            _source_path: &Path,
            _thumbnail: Option<&[u8]>,
        ) -> Result<(), VaultError> {
            Ok(())
        }
    }

    struct FullVault;

    impl FileVault for FullVault {
        fn resolve_path(
            &self,
            _hash: &Sha256Hash,
            _media_type: MediaType,
        ) -> Result<PathBuf, VaultError> {
            Ok(PathBuf::from("/somewhere/on/disk"))
        }

        fn add(
            &self,
            _hash: &Sha256Hash,
            _media_type: MediaType,
            _source_path: &Path,
            _thumbnail: Option<&[u8]>,
        ) -> Result<(), VaultError> {
            Ok(())
        }
    }

    #[test]
    fn test_should_import_truth_table() {
        let exclude = options_excluding_deleted(true);
        let include = options_excluding_deleted(false);

        assert!(ImportStatus::unknown().should_import(&exclude));

        let deleted = ImportStatus::new(ImportStatusCode::PreviouslyDeleted, Some([1u8; 32]));
        assert!(!deleted.should_import(&exclude));
        assert!(deleted.should_import(&include));

        let present = ImportStatus::new(ImportStatusCode::AlreadyPresent, Some([1u8; 32]));
        assert!(!present.should_import(&include));

        let vetoed = ImportStatus::unknown().vetoed("too big");
        assert!(!vetoed.should_import(&include));
    }

    #[test]
    fn test_clone_is_independent() {
        let original = ImportStatus::new(ImportStatusCode::AlreadyPresent, Some([3u8; 32]))
            .with_note("first note");
        let mut copy = original.clone();
        copy.code = ImportStatusCode::Vetoed;
        copy.note = "changed".to_string();

        assert_eq!(original.code, ImportStatusCode::AlreadyPresent);
        assert_eq!(original.note, "first note");
    }

    #[test]
    fn test_display_appends_note() {
        let status = ImportStatus::new(ImportStatusCode::Vetoed, None);
        assert_eq!(status.to_string(), "vetoed");
        assert_eq!(
            status.with_note("File was too big").to_string(),
            "vetoed, File was too big"
        );
    }

    #[test]
    fn test_reconcile_demotes_missing_content() {
        let mut status = ImportStatus::new(ImportStatusCode::AlreadyPresent, Some([5u8; 32]));
        status.media_type = Some(MediaType::Png);

        let reconciled = reconcile_import_status(status, &EmptyVault);

        assert_eq!(reconciled.code, ImportStatusCode::Unknown);
        assert_eq!(reconciled.hash, Some([5u8; 32]));
        assert_eq!(reconciled.media_type, Some(MediaType::Png));
        assert!(!reconciled.note.is_empty());
    }

    #[test]
    fn test_reconcile_leaves_resolvable_content_alone() {
        let mut status = ImportStatus::new(ImportStatusCode::AlreadyPresent, Some([5u8; 32]));
        status.media_type = Some(MediaType::Png);

        let reconciled = reconcile_import_status(status.clone(), &FullVault);
        assert_eq!(reconciled, status);
    }

    #[test]
    fn test_reconcile_skips_statuses_with_nothing_to_verify() {
        // Missing media type: nothing to probe with.
        let partial = ImportStatus::new(ImportStatusCode::AlreadyPresent, Some([5u8; 32]));
        assert_eq!(
            reconcile_import_status(partial.clone(), &EmptyVault),
            partial
        );

        // Not already-present: out of scope.
        let unknown = ImportStatus::unknown();
        assert_eq!(
            reconcile_import_status(unknown.clone(), &EmptyVault),
            unknown
        );
    }
}
