//! Presentation-predicate call contract.
//!
//! Whether an imported file gets surfaced to the user is decided by an
//! external module that owns the new/inbox/archive truth table. This crate
//! only defines the contract: the three presentation flags go in, a boolean
//! comes out. [`ImportOptions`](crate::import::ImportOptions) delegates its
//! presentation queries here and never interprets the flags itself.

use crate::import::ImportStatusCode;

/// The predicate deciding presentation for an import outcome.
pub trait PresentationRules: Send + Sync {
    /// Full decision: status plus inbox membership.
    fn matches(
        &self,
        present_new_files: bool,
        present_already_in_inbox_files: bool,
        present_already_in_archive_files: bool,
        status: ImportStatusCode,
        in_inbox: bool,
    ) -> bool;

    /// Decision when inbox membership is not yet known.
    fn matches_ignorant_of_inbox(
        &self,
        present_new_files: bool,
        present_already_in_inbox_files: bool,
        present_already_in_archive_files: bool,
        status: ImportStatusCode,
    ) -> bool;

    /// Definite-negative decision when inbox membership is not yet known:
    /// true only if no inbox state could make the file presentable.
    fn non_match_ignorant_of_inbox(
        &self,
        present_new_files: bool,
        present_already_in_inbox_files: bool,
        present_already_in_archive_files: bool,
        status: ImportStatusCode,
    ) -> bool;
}
