//! Serialized import options and their schema-migration chain.
//!
//! Options persist as a `(version, payload)` pair where the payload is a JSON
//! tuple. Five schema generations exist; anything below the current version
//! is walked through the chain one step at a time at load time. Each step is
//! a pure function that only adds fields with documented defaults — existing
//! fields never change meaning.

use crate::import::options::{ImportOptions, Resolution};
use anyhow::{bail, Context, Result};
use serde_json::Value;
use tracing::debug;

/// Current serialized schema version.
pub const SERIALIZED_OPTIONS_VERSION: u64 = 5;

// The v5 payload: (pre_import, post_import, presentation).
type PreImportTuple = (
    bool,           // exclude_deleted
    bool,           // do_not_check_known_urls_before_importing
    bool,           // do_not_check_hashes_before_importing
    bool,           // allow_decompression_bombs
    Option<u64>,    // min_size
    Option<u64>,    // max_size
    Option<u64>,    // max_gif_size
    Option<Resolution>, // min_resolution
    Option<Resolution>, // max_resolution
);
type PostImportTuple = (bool, bool, bool); // automatic_archive, associate_primary_urls, associate_source_urls
type PresentationTuple = (bool, bool, bool); // new, already in inbox, already in archive

/// v1 payload: (automatic_archive, exclude_deleted, min_size, min_resolution).
/// v2 adds explicit presentation flags.
fn update_v1_to_v2(payload: Value) -> Result<Value> {
    let (automatic_archive, exclude_deleted, min_size, min_resolution): (
        bool,
        bool,
        Option<u64>,
        Option<Resolution>,
    ) = serde_json::from_value(payload).context("Malformed v1 import options payload")?;

    let present_new_files = true;
    let present_already_in_inbox_files = false;
    let present_already_in_archive_files = false;

    Ok(serde_json::to_value((
        automatic_archive,
        exclude_deleted,
        present_new_files,
        present_already_in_inbox_files,
        present_already_in_archive_files,
        min_size,
        min_resolution,
    ))?)
}

/// v3 reorganizes the flat tuple into (pre_import, post_import, presentation)
/// and introduces the bomb/gif/max limits.
fn update_v2_to_v3(payload: Value) -> Result<Value> {
    let (
        automatic_archive,
        exclude_deleted,
        present_new_files,
        present_already_in_inbox_files,
        present_already_in_archive_files,
        min_size,
        min_resolution,
    ): (bool, bool, bool, bool, bool, Option<u64>, Option<Resolution>) =
        serde_json::from_value(payload).context("Malformed v2 import options payload")?;

    let allow_decompression_bombs = true;
    let max_size: Option<u64> = None;
    let max_gif_size: Option<u64> = Some(32 * 1048576);
    let max_resolution: Option<Resolution> = None;

    let pre_import_options = (
        exclude_deleted,
        allow_decompression_bombs,
        min_size,
        max_size,
        max_gif_size,
        min_resolution,
        max_resolution,
    );
    let post_import_options = automatic_archive;
    let presentation_options = (
        present_new_files,
        present_already_in_inbox_files,
        present_already_in_archive_files,
    );

    Ok(serde_json::to_value((
        pre_import_options,
        post_import_options,
        presentation_options,
    ))?)
}

/// v4 adds the known-url/hash pre-check skips and source url association.
fn update_v3_to_v4(payload: Value) -> Result<Value> {
    type V3Pre = (
        bool,
        bool,
        Option<u64>,
        Option<u64>,
        Option<u64>,
        Option<Resolution>,
        Option<Resolution>,
    );

    let (pre_import_options, post_import_options, presentation_options): (
        V3Pre,
        bool,
        PresentationTuple,
    ) = serde_json::from_value(payload).context("Malformed v3 import options payload")?;

    let (
        exclude_deleted,
        allow_decompression_bombs,
        min_size,
        max_size,
        max_gif_size,
        min_resolution,
        max_resolution,
    ) = pre_import_options;
    let automatic_archive = post_import_options;

    let do_not_check_known_urls_before_importing = false;
    let do_not_check_hashes_before_importing = false;
    let associate_source_urls = true;

    let pre_import_options = (
        exclude_deleted,
        do_not_check_known_urls_before_importing,
        do_not_check_hashes_before_importing,
        allow_decompression_bombs,
        min_size,
        max_size,
        max_gif_size,
        min_resolution,
        max_resolution,
    );
    let post_import_options = (automatic_archive, associate_source_urls);

    Ok(serde_json::to_value((
        pre_import_options,
        post_import_options,
        presentation_options,
    ))?)
}

/// v5 adds primary url association, inserted before source url association.
fn update_v4_to_v5(payload: Value) -> Result<Value> {
    let (pre_import_options, post_import_options, presentation_options): (
        PreImportTuple,
        (bool, bool),
        PresentationTuple,
    ) = serde_json::from_value(payload).context("Malformed v4 import options payload")?;

    let (automatic_archive, associate_source_urls) = post_import_options;
    let associate_primary_urls = true;

    let post_import_options = (
        automatic_archive,
        associate_primary_urls,
        associate_source_urls,
    );

    Ok(serde_json::to_value((
        pre_import_options,
        post_import_options,
        presentation_options,
    ))?)
}

/// Walk a serialized payload up to [`SERIALIZED_OPTIONS_VERSION`].
///
/// A payload already at the current version passes through unchanged;
/// versions outside 1..=5 are rejected.
pub fn migrate_serialized_options(mut version: u64, mut payload: Value) -> Result<Value> {
    if version == 0 || version > SERIALIZED_OPTIONS_VERSION {
        bail!("Unknown serialized import options version: {}", version);
    }

    while version < SERIALIZED_OPTIONS_VERSION {
        debug!(
            from = version,
            to = version + 1,
            "Migrating serialized import options"
        );

        payload = match version {
            1 => update_v1_to_v2(payload)?,
            2 => update_v2_to_v3(payload)?,
            3 => update_v3_to_v4(payload)?,
            4 => update_v4_to_v5(payload)?,
            _ => unreachable!("version bounds checked above"),
        };
        version += 1;
    }

    Ok(payload)
}

impl ImportOptions {
    /// Load options from their persisted `(version, payload)` form, running
    /// the migration chain first when needed.
    pub fn from_serialized(version: u64, payload: Value) -> Result<Self> {
        let payload = migrate_serialized_options(version, payload)?;

        let (pre, post, presentation): (PreImportTuple, PostImportTuple, PresentationTuple) =
            serde_json::from_value(payload).context("Malformed v5 import options payload")?;

        let mut options = ImportOptions::default();
        options.set_pre_import_options(
            pre.0, pre.1, pre.2, pre.3, pre.4, pre.5, pre.6, pre.7, pre.8,
        );
        options.set_post_import_options(post.0, post.1, post.2);
        options.set_presentation_options(presentation.0, presentation.1, presentation.2);

        Ok(options)
    }

    /// Persistable `(version, payload)` form of these options.
    pub fn to_serialized(&self) -> Result<(u64, Value)> {
        let pre: PreImportTuple = (
            self.excludes_deleted(),
            self.do_not_check_known_urls_before_importing(),
            self.do_not_check_hashes_before_importing(),
            self.allows_decompression_bombs(),
            self.min_size(),
            self.max_size(),
            self.max_gif_size(),
            self.min_resolution(),
            self.max_resolution(),
        );
        let post: PostImportTuple = (
            self.automatically_archives(),
            self.should_associate_primary_urls(),
            self.should_associate_source_urls(),
        );
        let presentation: PresentationTuple = self.presentation_options();

        Ok((
            SERIALIZED_OPTIONS_VERSION,
            serde_json::to_value((pre, post, presentation))?,
        ))
    }
}
