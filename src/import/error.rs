//! Error taxonomy for the import pipeline.
//!
//! Two tiers: [`FileSizeViolation`] is soft — the pipeline catches it and
//! turns it into a vetoed status. [`ImportError`] is fatal — it aborts the
//! job and propagates to the caller with no status.

use crate::vault::VaultError;
use thiserror::Error;

pub(crate) fn human_bytes(n: u64) -> String {
    format!("{:#}", byte_unit::Byte::from(n))
}

/// Decimal rendering with thousands separators, e.g. 2000 -> "2,000".
pub(crate) fn human_int(n: u32) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

fn pretty_resolution(width: &Option<u32>, height: &Option<u32>) -> String {
    match (width, height) {
        (Some(w), Some(h)) => format!("{} x {}", human_int(*w), human_int(*h)),
        (Some(w), None) => format!("{} x ?", human_int(*w)),
        (None, Some(h)) => format!("? x {}", human_int(*h)),
        (None, None) => "? x ?".to_string(),
    }
}

fn pretty_limit(limit: &(u32, u32)) -> String {
    format!("{} x {}", human_int(limit.0), human_int(limit.1))
}

fn download_prefix(complete: &bool) -> &'static str {
    if *complete {
        "Download was apparently"
    } else {
        "Download was at least"
    }
}

/// Soft acceptance-policy rejection raised by
/// [`ImportOptions::check_file_is_valid`](crate::import::ImportOptions::check_file_is_valid)
/// and
/// [`ImportOptions::check_network_download`](crate::import::ImportOptions::check_network_download).
///
/// Messages embed both the observed value and the configured limit; downstream
/// consumers surface them verbatim as the veto note.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FileSizeViolation {
    #[error("File was {} but the lower limit is {}.", human_bytes(*.actual), human_bytes(*.limit))]
    BelowMinimumSize { actual: u64, limit: u64 },

    #[error("File was {} but the upper limit is {}.", human_bytes(*.actual), human_bytes(*.limit))]
    AboveMaximumSize { actual: u64, limit: u64 },

    #[error("File was {} but the upper limit for gifs is {}.", human_bytes(*.actual), human_bytes(*.limit))]
    AboveMaximumGifSize { actual: u64, limit: u64 },

    #[error(
        "File had resolution {} but the lower limit is {}",
        pretty_resolution(.width, .height),
        pretty_limit(.limit)
    )]
    BelowMinimumResolution {
        width: Option<u32>,
        height: Option<u32>,
        limit: (u32, u32),
    },

    #[error(
        "File had resolution {} but the upper limit is {}",
        pretty_resolution(.width, .height),
        pretty_limit(.limit)
    )]
    AboveMaximumResolution {
        width: Option<u32>,
        height: Option<u32>,
        limit: (u32, u32),
    },

    #[error(
        "{} {} but the upper limit is {}.",
        download_prefix(.complete),
        human_bytes(*.actual),
        human_bytes(*.limit)
    )]
    DownloadAboveMaximumSize {
        actual: u64,
        limit: u64,
        complete: bool,
    },

    #[error(
        "{} {} but the upper limit for gifs is {}.",
        download_prefix(.complete),
        human_bytes(*.actual),
        human_bytes(*.limit)
    )]
    DownloadAboveMaximumGifSize {
        actual: u64,
        limit: u64,
        complete: bool,
    },

    #[error(
        "Download was apparently {} but the lower limit is {}.",
        human_bytes(*.actual),
        human_bytes(*.limit)
    )]
    DownloadBelowMinimumSize { actual: u64, limit: u64 },
}

/// Fatal import failure. The job is aborted; no status is produced.
#[derive(Debug, Error)]
pub enum ImportError {
    #[error("Image seems to be a Decompression Bomb!")]
    DecompressionBomb,

    #[error("Could not render a thumbnail: {0}")]
    Thumbnail(String),

    #[error("Analysis error: {0}")]
    Analysis(#[source] anyhow::Error),

    #[error("Vault error: {0}")]
    Vault(#[from] VaultError),

    #[error("Store error: {0}")]
    Store(#[source] anyhow::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
