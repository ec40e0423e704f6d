//! The import pipeline.
//!
//! An [`ImportJob`] is single-use: build it around a staged temp file and a
//! set of options, run it once, then read the outcome and the extracted
//! metadata through the accessors. The job never mutates the staged file;
//! when a legacy bitmap has to be re-encoded before hashing, the canonical
//! copy lives in a job-owned temp file.

use crate::catalog::{ContentUpdate, ImportWriter, StatusReader};
use crate::import::status::reconcile_import_status;
use crate::import::{ImportError, ImportOptions, ImportStatus};
use crate::media::{
    hash_hex, thumbnail_resolution, ExtraHashes, FileAnalyzer, FileInfo, MediaType, Sha256Hash,
};
use crate::vault::FileVault;
use std::path::Path;
use std::time::SystemTime;
use tempfile::NamedTempFile;
use tracing::{debug, info};

/// Default bounding box for generated thumbnails.
pub const THUMBNAIL_BOUNDING: (u32, u32) = (200, 200);

/// How far into time-based media the thumbnail frame is sampled.
pub const VIDEO_SEEK_PERCENTAGE: u32 = 35;

/// The collaborators one import run borrows.
pub struct ImportContext<'a> {
    pub analyzer: &'a dyn FileAnalyzer,
    pub vault: &'a dyn FileVault,
    pub reader: &'a dyn StatusReader,
    pub writer: &'a dyn ImportWriter,
    pub thumbnail_bounding: (u32, u32),
    pub video_seek_percentage: u32,
}

impl<'a> ImportContext<'a> {
    pub fn new(
        analyzer: &'a dyn FileAnalyzer,
        vault: &'a dyn FileVault,
        reader: &'a dyn StatusReader,
        writer: &'a dyn ImportWriter,
    ) -> Self {
        Self {
            analyzer,
            vault,
            reader,
            writer,
            thumbnail_bounding: THUMBNAIL_BOUNDING,
            video_seek_percentage: VIDEO_SEEK_PERCENTAGE,
        }
    }
}

/// One file's journey from staged bytes to catalog record.
pub struct ImportJob<'a> {
    temp_path: &'a Path,
    options: ImportOptions,

    canonical: Option<NamedTempFile>,
    hash: Option<Sha256Hash>,
    pre_import_status: Option<ImportStatus>,
    file_info: Option<FileInfo>,
    thumbnail: Option<Vec<u8>>,
    perceptual_hashes: Option<Vec<Vec<u8>>>,
    extra_hashes: Option<ExtraHashes>,
    file_modified_at: Option<SystemTime>,
}

impl<'a> ImportJob<'a> {
    pub fn new(temp_path: &'a Path, options: ImportOptions) -> Self {
        Self {
            temp_path,
            options,
            canonical: None,
            hash: None,
            pre_import_status: None,
            file_info: None,
            thumbnail: None,
            perceptual_hashes: None,
            extra_hashes: None,
            file_modified_at: None,
        }
    }

    /// The bytes every downstream stage works on. The canonical copy when one
    /// was produced, the staged file otherwise.
    pub fn working_path(&self) -> &Path {
        match &self.canonical {
            Some(canonical) => canonical.path(),
            None => self.temp_path,
        }
    }

    pub fn hash(&self) -> Option<Sha256Hash> {
        self.hash
    }

    pub fn media_type(&self) -> Option<MediaType> {
        self.file_info
            .as_ref()
            .map(|info| info.media_type)
            .or_else(|| self.pre_import_status.as_ref().and_then(|s| s.media_type))
    }

    pub fn file_info(&self) -> Option<&FileInfo> {
        self.file_info.as_ref()
    }

    pub fn thumbnail(&self) -> Option<&[u8]> {
        self.thumbnail.as_deref()
    }

    pub fn perceptual_hashes(&self) -> Option<&[Vec<u8>]> {
        self.perceptual_hashes.as_deref()
    }

    pub fn extra_hashes(&self) -> Option<&ExtraHashes> {
        self.extra_hashes.as_ref()
    }

    pub fn file_modified_at(&self) -> Option<SystemTime> {
        self.file_modified_at
    }

    pub fn options(&self) -> &ImportOptions {
        &self.options
    }

    pub fn run(&mut self, ctx: &ImportContext<'_>) -> Result<ImportStatus, ImportError> {
        self.run_with_progress(ctx, &mut |_| {})
    }

    /// Run the whole pipeline, firing `hook` with a short human-readable
    /// label as each stage starts.
    pub fn run_with_progress(
        &mut self,
        ctx: &ImportContext<'_>,
        hook: &mut dyn FnMut(&str),
    ) -> Result<ImportStatus, ImportError> {
        let (hash, mut pre) = self.generate_hash_and_status(ctx, hook)?;

        let post = if pre.should_import(&self.options) {
            let file_info = self.generate_info(ctx, &mut pre, hook)?;

            match self.options.check_file_is_valid(
                file_info.size,
                file_info.media_type,
                file_info.width,
                file_info.height,
            ) {
                Err(violation) => {
                    info!(hash = %hash_hex(&hash), %violation, "File vetoed");
                    pre.vetoed(violation.to_string())
                }
                Ok(()) => {
                    hook("copying file into file storage");
                    ctx.vault.add(
                        &hash,
                        file_info.media_type,
                        self.working_path(),
                        self.thumbnail.as_deref(),
                    )?;

                    hook("importing to database");
                    ctx.writer.import_file(self).map_err(ImportError::Store)?
                }
            }
        } else {
            debug!(status = %pre, "Not importing");
            pre.clone()
        };

        self.publish_side_effects(ctx, &post)?;
        Ok(post)
    }

    /// Stage one: canonicalize, hash, look the hash up, reconcile against the
    /// vault. Returns the hash alongside the reconciled pre-import status.
    fn generate_hash_and_status(
        &mut self,
        ctx: &ImportContext<'_>,
        hook: &mut dyn FnMut(&str),
    ) -> Result<(Sha256Hash, ImportStatus), ImportError> {
        hook("calculating hash");
        self.canonical = ctx
            .analyzer
            .canonicalize_bitmap(self.temp_path)
            .map_err(ImportError::Analysis)?;

        let hash = ctx
            .analyzer
            .sha256(self.working_path())
            .map_err(ImportError::Analysis)?;
        self.hash = Some(hash);

        hook("checking for file status");
        let mut status = ctx
            .reader
            .lookup_status(&hash)
            .map_err(ImportError::Store)?;

        // The lookup answers for the hash we asked about; make the identity
        // explicit on the status regardless of what the reader filled in.
        status.hash = Some(hash);

        let status = reconcile_import_status(status, ctx.vault);
        self.pre_import_status = Some(status.clone());

        debug!(hash = %hash_hex(&hash), status = %status, "Pre-import status");
        Ok((hash, status))
    }

    /// Stage three: media type, bomb probe, structural metadata, thumbnail,
    /// perceptual hashes, secondary digests, source timestamp.
    fn generate_info(
        &mut self,
        ctx: &ImportContext<'_>,
        pre: &mut ImportStatus,
        hook: &mut dyn FnMut(&str),
    ) -> Result<FileInfo, ImportError> {
        let working = self.working_path().to_path_buf();
        let working = working.as_path();

        let media_type = match pre.media_type {
            Some(media_type) => media_type,
            None => {
                hook("generating filetype");
                let media_type = ctx
                    .analyzer
                    .sniff_media_type(working)
                    .map_err(ImportError::Analysis)?;

                // The status carries the identity downstream; give it the
                // freshly sniffed type as well as the hash.
                pre.media_type = Some(media_type);
                self.pre_import_status = Some(pre.clone());
                media_type
            }
        };

        if media_type.decompression_bomb_risk() && !self.options.allows_decompression_bombs() {
            let is_bomb = ctx
                .analyzer
                .is_decompression_bomb(working)
                .map_err(ImportError::Analysis)?;
            if is_bomb {
                return Err(ImportError::DecompressionBomb);
            }
        }

        hook("generating file metadata");
        let file_info = ctx
            .analyzer
            .file_info(working, media_type)
            .map_err(ImportError::Analysis)?;

        if media_type.supports_thumbnails() {
            hook("generating thumbnail");
            let target = match (file_info.width, file_info.height) {
                (Some(w), Some(h)) => thumbnail_resolution((w, h), ctx.thumbnail_bounding),
                _ => ctx.thumbnail_bounding,
            };
            let thumbnail = ctx
                .analyzer
                .generate_thumbnail(working, media_type, target, ctx.video_seek_percentage)
                .map_err(|e| ImportError::Thumbnail(e.to_string()))?;
            self.thumbnail = Some(thumbnail);
        }

        if media_type.supports_perceptual_hashes() {
            hook("generating similar files metadata");
            let hashes = ctx
                .analyzer
                .perceptual_hashes(working, media_type)
                .map_err(ImportError::Analysis)?;
            self.perceptual_hashes = Some(hashes);
        }

        hook("generating additional hashes");
        self.extra_hashes = Some(
            ctx.analyzer
                .extra_hashes(working)
                .map_err(ImportError::Analysis)?,
        );

        // Timestamp of the staged source, not the canonical copy.
        self.file_modified_at = ctx
            .analyzer
            .modified_timestamp(self.temp_path)
            .map_err(ImportError::Analysis)?;

        self.file_info = Some(file_info.clone());
        Ok(file_info)
    }

    fn publish_side_effects(
        &self,
        ctx: &ImportContext<'_>,
        status: &ImportStatus,
    ) -> Result<(), ImportError> {
        if status.already_in_store() && self.options.automatically_archives() {
            if let Some(hash) = status.hash {
                ctx.writer
                    .publish_content_update(ContentUpdate::Archive { hash })
                    .map_err(ImportError::Store)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::import::ImportStatusCode;
    use crate::media::MediaType;
    use crate::vault::VaultError;
    use anyhow::Result;
    use std::io::Write;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const HASH: Sha256Hash = [7u8; 32];

    /// Analyzer double reporting a fixed PNG and counting metadata calls.
    struct StubAnalyzer {
        size: u64,
        bomb: bool,
        info_calls: AtomicUsize,
    }

    impl StubAnalyzer {
        fn png(size: u64) -> Self {
            Self {
                size,
                bomb: false,
                info_calls: AtomicUsize::new(0),
            }
        }
    }

    impl FileAnalyzer for StubAnalyzer {
        fn canonicalize_bitmap(&self, _path: &Path) -> Result<Option<NamedTempFile>> {
            Ok(None)
        }

        fn sniff_media_type(&self, _path: &Path) -> Result<MediaType> {
            Ok(MediaType::Png)
        }

        fn sha256(&self, _path: &Path) -> Result<Sha256Hash> {
            Ok(HASH)
        }

        fn file_info(&self, _path: &Path, media_type: MediaType) -> Result<FileInfo> {
            self.info_calls.fetch_add(1, Ordering::SeqCst);
            Ok(FileInfo {
                size: self.size,
                media_type,
                width: Some(64),
                height: Some(32),
                duration_ms: None,
                num_frames: None,
                has_audio: false,
                num_words: None,
            })
        }

        fn is_decompression_bomb(&self, _path: &Path) -> Result<bool> {
            Ok(self.bomb)
        }

        fn generate_thumbnail(
            &self,
            _path: &Path,
            _media_type: MediaType,
            _target_resolution: (u32, u32),
            _seek_percentage: u32,
        ) -> Result<Vec<u8>> {
            Ok(vec![1, 2, 3])
        }

        fn perceptual_hashes(&self, _path: &Path, _media_type: MediaType) -> Result<Vec<Vec<u8>>> {
            Ok(vec![vec![9; 8]])
        }

        fn extra_hashes(&self, _path: &Path) -> Result<ExtraHashes> {
            Ok(ExtraHashes {
                blake3: [1; 32],
                sha512: [2; 64],
            })
        }

        fn modified_timestamp(&self, _path: &Path) -> Result<Option<SystemTime>> {
            Ok(Some(SystemTime::UNIX_EPOCH))
        }
    }

    struct StubVault {
        resolves: bool,
        adds: AtomicUsize,
    }

    impl StubVault {
        fn empty() -> Self {
            Self {
                resolves: false,
                adds: AtomicUsize::new(0),
            }
        }

        fn full() -> Self {
            Self {
                resolves: true,
                adds: AtomicUsize::new(0),
            }
        }
    }

    impl FileVault for StubVault {
        fn resolve_path(
            &self,
            hash: &Sha256Hash,
            _media_type: MediaType,
        ) -> Result<PathBuf, VaultError> {
            if self.resolves {
                Ok(PathBuf::from("/vault/somewhere"))
            } else {
                Err(VaultError::FileMissing(hash_hex(hash)))
            }
        }

        fn add(
            &self,
            _hash: &Sha256Hash,
            _media_type: MediaType,
            _source_path: &Path,
            _thumbnail: Option<&[u8]>,
        ) -> Result<(), VaultError> {
            self.adds.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct StubReader {
        status: ImportStatus,
    }

    impl StatusReader for StubReader {
        fn lookup_status(&self, _hash: &Sha256Hash) -> Result<ImportStatus> {
            Ok(self.status.clone())
        }
    }

    struct RecordingWriter {
        imports: AtomicUsize,
        archives: AtomicUsize,
    }

    impl RecordingWriter {
        fn new() -> Self {
            Self {
                imports: AtomicUsize::new(0),
                archives: AtomicUsize::new(0),
            }
        }
    }

    impl ImportWriter for RecordingWriter {
        fn import_file(&self, job: &ImportJob<'_>) -> Result<ImportStatus> {
            self.imports.fetch_add(1, Ordering::SeqCst);
            let mut status = ImportStatus::new(ImportStatusCode::New, job.hash());
            status.media_type = job.media_type();
            Ok(status)
        }

        fn publish_content_update(&self, _update: ContentUpdate) -> Result<()> {
            self.archives.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn staged_file() -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"staged bytes").unwrap();
        file.flush().unwrap();
        file
    }

    fn known_status(code: ImportStatusCode) -> ImportStatus {
        let mut status = ImportStatus::new(code, Some(HASH));
        status.media_type = Some(MediaType::Png);
        status
    }

    #[test]
    fn test_new_file_runs_the_full_pipeline() {
        let analyzer = StubAnalyzer::png(600);
        let vault = StubVault::empty();
        let reader = StubReader {
            status: ImportStatus::unknown(),
        };
        let writer = RecordingWriter::new();
        let ctx = ImportContext::new(&analyzer, &vault, &reader, &writer);

        let staged = staged_file();
        let mut job = ImportJob::new(staged.path(), ImportOptions::default());
        let status = job.run(&ctx).unwrap();

        assert_eq!(status.code, ImportStatusCode::New);
        assert_eq!(status.hash, Some(HASH));
        assert_eq!(vault.adds.load(Ordering::SeqCst), 1);
        assert_eq!(writer.imports.load(Ordering::SeqCst), 1);
        assert_eq!(writer.archives.load(Ordering::SeqCst), 0);

        assert_eq!(job.hash(), Some(HASH));
        assert_eq!(job.media_type(), Some(MediaType::Png));
        assert!(job.file_info().is_some());
        assert!(job.thumbnail().is_some());
        assert!(job.perceptual_hashes().is_some());
        assert!(job.extra_hashes().is_some());
        assert!(job.file_modified_at().is_some());
    }

    #[test]
    fn test_progress_hook_order_for_a_full_run() {
        let analyzer = StubAnalyzer::png(600);
        let vault = StubVault::empty();
        let reader = StubReader {
            status: ImportStatus::unknown(),
        };
        let writer = RecordingWriter::new();
        let ctx = ImportContext::new(&analyzer, &vault, &reader, &writer);

        let staged = staged_file();
        let mut job = ImportJob::new(staged.path(), ImportOptions::default());

        let mut seen = Vec::new();
        job.run_with_progress(&ctx, &mut |label| seen.push(label.to_string()))
            .unwrap();

        assert_eq!(
            seen,
            vec![
                "calculating hash",
                "checking for file status",
                "generating filetype",
                "generating file metadata",
                "generating thumbnail",
                "generating similar files metadata",
                "generating additional hashes",
                "copying file into file storage",
                "importing to database",
            ]
        );
    }

    #[test]
    fn test_filetype_hook_skipped_when_the_type_is_already_known() {
        // The reader answers with a media type, so the pipeline never sniffs
        // and the corresponding progress label never fires. The empty vault
        // demotes the status, which forces a full run.
        let analyzer = StubAnalyzer::png(600);
        let vault = StubVault::empty();
        let reader = StubReader {
            status: known_status(ImportStatusCode::AlreadyPresent),
        };
        let writer = RecordingWriter::new();
        let ctx = ImportContext::new(&analyzer, &vault, &reader, &writer);

        let staged = staged_file();
        let mut job = ImportJob::new(staged.path(), ImportOptions::default());

        let mut seen = Vec::new();
        let status = job
            .run_with_progress(&ctx, &mut |label| seen.push(label.to_string()))
            .unwrap();

        assert_eq!(status.code, ImportStatusCode::New);
        assert!(!seen.iter().any(|label| label == "generating filetype"));
        assert!(seen.iter().any(|label| label == "generating file metadata"));
    }

    #[test]
    fn test_previously_deleted_short_circuits_without_extraction() {
        let analyzer = StubAnalyzer::png(600);
        let vault = StubVault::empty();
        let reader = StubReader {
            status: known_status(ImportStatusCode::PreviouslyDeleted),
        };
        let writer = RecordingWriter::new();
        let ctx = ImportContext::new(&analyzer, &vault, &reader, &writer);

        let staged = staged_file();
        let mut job = ImportJob::new(staged.path(), ImportOptions::default());
        let status = job.run(&ctx).unwrap();

        assert_eq!(status.code, ImportStatusCode::PreviouslyDeleted);
        assert_eq!(analyzer.info_calls.load(Ordering::SeqCst), 0);
        assert_eq!(vault.adds.load(Ordering::SeqCst), 0);
        assert_eq!(writer.imports.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_previously_deleted_reimports_when_allowed() {
        let analyzer = StubAnalyzer::png(600);
        let vault = StubVault::empty();
        let reader = StubReader {
            status: known_status(ImportStatusCode::PreviouslyDeleted),
        };
        let writer = RecordingWriter::new();
        let ctx = ImportContext::new(&analyzer, &vault, &reader, &writer);

        let mut options = ImportOptions::default();
        options.set_exclude_deleted(false);

        let staged = staged_file();
        let mut job = ImportJob::new(staged.path(), options);
        let status = job.run(&ctx).unwrap();

        assert_eq!(status.code, ImportStatusCode::New);
        assert_eq!(writer.imports.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_oversized_file_is_vetoed_not_imported() {
        let analyzer = StubAnalyzer::png(600);
        let vault = StubVault::empty();
        let reader = StubReader {
            status: ImportStatus::unknown(),
        };
        let writer = RecordingWriter::new();
        let ctx = ImportContext::new(&analyzer, &vault, &reader, &writer);

        let mut options = ImportOptions::default();
        options.set_max_size(Some(500));

        let staged = staged_file();
        let mut job = ImportJob::new(staged.path(), options);
        let status = job.run(&ctx).unwrap();

        assert_eq!(status.code, ImportStatusCode::Vetoed);
        assert!(status.note.contains("600 B"), "note: {}", status.note);
        assert!(status.note.contains("500 B"), "note: {}", status.note);
        // The status picked up the sniffed type before the veto.
        assert_eq!(status.media_type, Some(MediaType::Png));
        assert_eq!(vault.adds.load(Ordering::SeqCst), 0);
        assert_eq!(writer.imports.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_decompression_bomb_is_fatal_when_disallowed() {
        let mut analyzer = StubAnalyzer::png(600);
        analyzer.bomb = true;
        let vault = StubVault::empty();
        let reader = StubReader {
            status: ImportStatus::unknown(),
        };
        let writer = RecordingWriter::new();
        let ctx = ImportContext::new(&analyzer, &vault, &reader, &writer);

        let mut options = ImportOptions::default();
        options.set_allow_decompression_bombs(false);

        let staged = staged_file();
        let mut job = ImportJob::new(staged.path(), options);
        let err = job.run(&ctx).unwrap_err();

        assert!(matches!(err, ImportError::DecompressionBomb));
        assert_eq!(writer.imports.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_bomb_probe_skipped_when_allowed() {
        let mut analyzer = StubAnalyzer::png(600);
        analyzer.bomb = true;
        let vault = StubVault::empty();
        let reader = StubReader {
            status: ImportStatus::unknown(),
        };
        let writer = RecordingWriter::new();
        let ctx = ImportContext::new(&analyzer, &vault, &reader, &writer);

        let staged = staged_file();
        let mut job = ImportJob::new(staged.path(), ImportOptions::default());
        let status = job.run(&ctx).unwrap();

        assert_eq!(status.code, ImportStatusCode::New);
    }

    #[test]
    fn test_auto_archive_publishes_exactly_one_update() {
        let analyzer = StubAnalyzer::png(600);
        let vault = StubVault::full();
        let reader = StubReader {
            status: known_status(ImportStatusCode::AlreadyPresent),
        };
        let writer = RecordingWriter::new();
        let ctx = ImportContext::new(&analyzer, &vault, &reader, &writer);

        let mut options = ImportOptions::default();
        options.set_automatic_archive(true);

        let staged = staged_file();
        let mut job = ImportJob::new(staged.path(), options);
        let status = job.run(&ctx).unwrap();

        assert_eq!(status.code, ImportStatusCode::AlreadyPresent);
        assert_eq!(writer.archives.load(Ordering::SeqCst), 1);
        assert_eq!(writer.imports.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_no_archive_update_without_the_option() {
        let analyzer = StubAnalyzer::png(600);
        let vault = StubVault::full();
        let reader = StubReader {
            status: known_status(ImportStatusCode::AlreadyPresent),
        };
        let writer = RecordingWriter::new();
        let ctx = ImportContext::new(&analyzer, &vault, &reader, &writer);

        let staged = staged_file();
        let mut job = ImportJob::new(staged.path(), ImportOptions::default());
        let status = job.run(&ctx).unwrap();

        assert_eq!(status.code, ImportStatusCode::AlreadyPresent);
        assert_eq!(writer.archives.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_self_heal_reimports_missing_content() {
        // The reader says present, the vault disagrees. The reconciler demotes
        // the status and the import goes ahead.
        let analyzer = StubAnalyzer::png(600);
        let vault = StubVault::empty();
        let reader = StubReader {
            status: known_status(ImportStatusCode::AlreadyPresent),
        };
        let writer = RecordingWriter::new();
        let ctx = ImportContext::new(&analyzer, &vault, &reader, &writer);

        let staged = staged_file();
        let mut job = ImportJob::new(staged.path(), ImportOptions::default());
        let status = job.run(&ctx).unwrap();

        assert_eq!(status.code, ImportStatusCode::New);
        assert_eq!(vault.adds.load(Ordering::SeqCst), 1);
        assert_eq!(writer.imports.load(Ordering::SeqCst), 1);
    }
}
