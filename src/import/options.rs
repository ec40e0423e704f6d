//! Import options: acceptance policy, post-import actions, presentation flags.

use crate::import::error::{human_bytes, human_int, FileSizeViolation};
use crate::import::presentation::PresentationRules;
use crate::import::ImportStatusCode;
use crate::media::MediaType;

/// A width/height pair used by the resolution limits.
pub type Resolution = (u32, u32);

/// Versioned configuration for import jobs.
///
/// Loaded from its serialized form via
/// [`ImportOptions::from_serialized`](crate::import::ImportOptions::from_serialized)
/// (which runs the migration chain), then held immutably for the duration of
/// one or more jobs. Mutation happens only through the setters, outside the
/// pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportOptions {
    // Pre-import constraints.
    exclude_deleted: bool,
    do_not_check_known_urls_before_importing: bool,
    do_not_check_hashes_before_importing: bool,
    allow_decompression_bombs: bool,
    min_size: Option<u64>,
    max_size: Option<u64>,
    max_gif_size: Option<u64>,
    min_resolution: Option<Resolution>,
    max_resolution: Option<Resolution>,

    // Post-import actions.
    automatic_archive: bool,
    associate_primary_urls: bool,
    associate_source_urls: bool,

    // Presentation filters.
    present_new_files: bool,
    present_already_in_inbox_files: bool,
    present_already_in_archive_files: bool,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            exclude_deleted: true,
            do_not_check_known_urls_before_importing: false,
            do_not_check_hashes_before_importing: false,
            allow_decompression_bombs: true,
            min_size: None,
            max_size: None,
            max_gif_size: None,
            min_resolution: None,
            max_resolution: None,
            automatic_archive: false,
            associate_primary_urls: true,
            associate_source_urls: true,
            present_new_files: true,
            present_already_in_inbox_files: true,
            present_already_in_archive_files: true,
        }
    }
}

impl ImportOptions {
    pub fn excludes_deleted(&self) -> bool {
        self.exclude_deleted
    }

    pub fn allows_decompression_bombs(&self) -> bool {
        self.allow_decompression_bombs
    }

    pub fn automatically_archives(&self) -> bool {
        self.automatic_archive
    }

    pub fn should_associate_primary_urls(&self) -> bool {
        self.associate_primary_urls
    }

    pub fn should_associate_source_urls(&self) -> bool {
        self.associate_source_urls
    }

    pub fn do_not_check_hashes_before_importing(&self) -> bool {
        self.do_not_check_hashes_before_importing
    }

    pub fn do_not_check_known_urls_before_importing(&self) -> bool {
        self.do_not_check_known_urls_before_importing
    }

    pub fn min_size(&self) -> Option<u64> {
        self.min_size
    }

    pub fn max_size(&self) -> Option<u64> {
        self.max_size
    }

    pub fn max_gif_size(&self) -> Option<u64> {
        self.max_gif_size
    }

    pub fn min_resolution(&self) -> Option<Resolution> {
        self.min_resolution
    }

    pub fn max_resolution(&self) -> Option<Resolution> {
        self.max_resolution
    }

    /// The three presentation flags: (new, already in inbox, already in archive).
    pub fn presentation_options(&self) -> (bool, bool, bool) {
        (
            self.present_new_files,
            self.present_already_in_inbox_files,
            self.present_already_in_archive_files,
        )
    }

    pub fn set_exclude_deleted(&mut self, exclude_deleted: bool) {
        self.exclude_deleted = exclude_deleted;
    }

    pub fn set_allow_decompression_bombs(&mut self, allow: bool) {
        self.allow_decompression_bombs = allow;
    }

    pub fn set_min_size(&mut self, min_size: Option<u64>) {
        self.min_size = min_size;
    }

    pub fn set_max_size(&mut self, max_size: Option<u64>) {
        self.max_size = max_size;
    }

    pub fn set_max_gif_size(&mut self, max_gif_size: Option<u64>) {
        self.max_gif_size = max_gif_size;
    }

    pub fn set_min_resolution(&mut self, min_resolution: Option<Resolution>) {
        self.min_resolution = min_resolution;
    }

    pub fn set_max_resolution(&mut self, max_resolution: Option<Resolution>) {
        self.max_resolution = max_resolution;
    }

    pub fn set_automatic_archive(&mut self, automatic_archive: bool) {
        self.automatic_archive = automatic_archive;
    }

    #[allow(clippy::too_many_arguments)]
    pub fn set_pre_import_options(
        &mut self,
        exclude_deleted: bool,
        do_not_check_known_urls_before_importing: bool,
        do_not_check_hashes_before_importing: bool,
        allow_decompression_bombs: bool,
        min_size: Option<u64>,
        max_size: Option<u64>,
        max_gif_size: Option<u64>,
        min_resolution: Option<Resolution>,
        max_resolution: Option<Resolution>,
    ) {
        self.exclude_deleted = exclude_deleted;
        self.do_not_check_known_urls_before_importing = do_not_check_known_urls_before_importing;
        self.do_not_check_hashes_before_importing = do_not_check_hashes_before_importing;
        self.allow_decompression_bombs = allow_decompression_bombs;
        self.min_size = min_size;
        self.max_size = max_size;
        self.max_gif_size = max_gif_size;
        self.min_resolution = min_resolution;
        self.max_resolution = max_resolution;
    }

    pub fn set_post_import_options(
        &mut self,
        automatic_archive: bool,
        associate_primary_urls: bool,
        associate_source_urls: bool,
    ) {
        self.automatic_archive = automatic_archive;
        self.associate_primary_urls = associate_primary_urls;
        self.associate_source_urls = associate_source_urls;
    }

    pub fn set_presentation_options(
        &mut self,
        present_new_files: bool,
        present_already_in_inbox_files: bool,
        present_already_in_archive_files: bool,
    ) {
        self.present_new_files = present_new_files;
        self.present_already_in_inbox_files = present_already_in_inbox_files;
        self.present_already_in_archive_files = present_already_in_archive_files;
    }

    /// Validate an extracted file against the acceptance policy.
    ///
    /// Checks run in a fixed order and the first failure wins: min size, max
    /// size, gif cap, min resolution, max resolution. Unknown dimensions
    /// never trigger the resolution checks.
    pub fn check_file_is_valid(
        &self,
        size: u64,
        media_type: MediaType,
        width: Option<u32>,
        height: Option<u32>,
    ) -> Result<(), FileSizeViolation> {
        if let Some(min_size) = self.min_size {
            if size < min_size {
                return Err(FileSizeViolation::BelowMinimumSize {
                    actual: size,
                    limit: min_size,
                });
            }
        }

        if let Some(max_size) = self.max_size {
            if size > max_size {
                return Err(FileSizeViolation::AboveMaximumSize {
                    actual: size,
                    limit: max_size,
                });
            }
        }

        if media_type == MediaType::Gif {
            if let Some(max_gif_size) = self.max_gif_size {
                if size > max_gif_size {
                    return Err(FileSizeViolation::AboveMaximumGifSize {
                        actual: size,
                        limit: max_gif_size,
                    });
                }
            }
        }

        if let Some((min_width, min_height)) = self.min_resolution {
            let too_thin = width.is_some_and(|w| w < min_width);
            let too_short = height.is_some_and(|h| h < min_height);

            if too_thin || too_short {
                return Err(FileSizeViolation::BelowMinimumResolution {
                    width,
                    height,
                    limit: (min_width, min_height),
                });
            }
        }

        if let Some((max_width, max_height)) = self.max_resolution {
            let too_wide = width.is_some_and(|w| w > max_width);
            let too_tall = height.is_some_and(|h| h > max_height);

            if too_wide || too_tall {
                return Err(FileSizeViolation::AboveMaximumResolution {
                    width,
                    height,
                    limit: (max_width, max_height),
                });
            }
        }

        Ok(())
    }

    /// Pre-commit sizing guard for partially downloaded content.
    ///
    /// `is_complete_size` says whether `num_bytes` is the final size or a
    /// lower bound so far; the minimum check only applies to complete sizes.
    pub fn check_network_download(
        &self,
        possible_media_type: Option<MediaType>,
        num_bytes: u64,
        is_complete_size: bool,
    ) -> Result<(), FileSizeViolation> {
        if possible_media_type == Some(MediaType::Gif) {
            if let Some(max_gif_size) = self.max_gif_size {
                if num_bytes > max_gif_size {
                    return Err(FileSizeViolation::DownloadAboveMaximumGifSize {
                        actual: num_bytes,
                        limit: max_gif_size,
                        complete: is_complete_size,
                    });
                }
            }
        }

        if let Some(max_size) = self.max_size {
            if num_bytes > max_size {
                return Err(FileSizeViolation::DownloadAboveMaximumSize {
                    actual: num_bytes,
                    limit: max_size,
                    complete: is_complete_size,
                });
            }
        }

        if is_complete_size {
            if let Some(min_size) = self.min_size {
                if num_bytes < min_size {
                    return Err(FileSizeViolation::DownloadBelowMinimumSize {
                        actual: num_bytes,
                        limit: min_size,
                    });
                }
            }
        }

        Ok(())
    }

    /// Human summary of the configured policy, one statement per line.
    ///
    /// Statement order is fixed and depended on by downstream display code.
    pub fn summary(&self) -> String {
        let mut statements: Vec<String> = Vec::new();

        if self.exclude_deleted {
            statements.push("excluding previously deleted".to_string());
        }

        if !self.allow_decompression_bombs {
            statements.push("excluding decompression bombs".to_string());
        }

        if let Some(min_size) = self.min_size {
            statements.push(format!("excluding < {}", human_bytes(min_size)));
        }

        if let Some(max_size) = self.max_size {
            statements.push(format!("excluding > {}", human_bytes(max_size)));
        }

        if let Some(max_gif_size) = self.max_gif_size {
            statements.push(format!("excluding gifs > {}", human_bytes(max_gif_size)));
        }

        if let Some((width, height)) = self.min_resolution {
            statements.push(format!(
                "excluding < ( {} x {} )",
                human_int(width),
                human_int(height)
            ));
        }

        if let Some((width, height)) = self.max_resolution {
            statements.push(format!(
                "excluding > ( {} x {} )",
                human_int(width),
                human_int(height)
            ));
        }

        if self.automatic_archive {
            statements.push("automatically archiving".to_string());
        }

        let mut presentation_statements: Vec<&str> = Vec::new();

        if self.present_new_files {
            presentation_statements.push("new");
        }

        if self.present_already_in_inbox_files {
            presentation_statements.push("already in inbox");
        }

        if self.present_already_in_archive_files {
            presentation_statements.push("already in archive");
        }

        if presentation_statements.is_empty() {
            statements.push("not presenting any files".to_string());
        } else if presentation_statements.len() == 3 {
            statements.push("presenting all files".to_string());
        } else {
            statements.push(format!(
                "presenting {} files",
                presentation_statements.join(", ")
            ));
        }

        statements.join("\n")
    }

    /// Ask the presentation predicate whether a file with this status should
    /// be presented, given its inbox membership.
    pub fn should_present(
        &self,
        rules: &dyn PresentationRules,
        status: ImportStatusCode,
        in_inbox: bool,
    ) -> bool {
        let (new, inbox, archive) = self.presentation_options();
        rules.matches(new, inbox, archive, status, in_inbox)
    }

    pub fn should_present_ignorant_of_inbox(
        &self,
        rules: &dyn PresentationRules,
        status: ImportStatusCode,
    ) -> bool {
        let (new, inbox, archive) = self.presentation_options();
        rules.matches_ignorant_of_inbox(new, inbox, archive, status)
    }

    pub fn should_not_present_ignorant_of_inbox(
        &self,
        rules: &dyn PresentationRules,
        status: ImportStatusCode,
    ) -> bool {
        let (new, inbox, archive) = self.presentation_options();
        rules.non_match_ignorant_of_inbox(new, inbox, archive, status)
    }
}
