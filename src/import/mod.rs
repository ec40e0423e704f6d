//! File import: status model, acceptance options, and the pipeline itself.
//!
//! A typical import:
//! 1. Stage the file somewhere durable and build an [`ImportJob`] around it.
//! 2. Run the job against an [`ImportContext`] wiring the analyzer, vault
//!    and catalog together.
//! 3. Read the resulting [`ImportStatus`] and the extracted metadata off the
//!    job.

mod error;
mod job;
mod migrations;
mod options;
mod presentation;
mod status;

pub use error::{FileSizeViolation, ImportError};
pub use job::{ImportContext, ImportJob, THUMBNAIL_BOUNDING, VIDEO_SEEK_PERCENTAGE};
pub use migrations::{migrate_serialized_options, SERIALIZED_OPTIONS_VERSION};
pub use options::{ImportOptions, Resolution};
pub use presentation::PresentationRules;
pub use status::{reconcile_import_status, ImportStatus, ImportStatusCode};
