//! Media type model and file analysis collaborators.
//!
//! The import pipeline never decodes files itself; it asks a [`FileAnalyzer`]
//! for everything it needs (digests, structural metadata, thumbnails,
//! perceptual hashes). [`StandardFileAnalyzer`] is the stock implementation.

mod analyzer;

pub use analyzer::{
    hash_hex, thumbnail_resolution, ExtraHashes, FileAnalyzer, FileInfo, Sha256Hash,
    StandardFileAnalyzer,
};

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Media types the vault understands.
///
/// This is deliberately coarse: the pipeline only needs enough resolution to
/// pick a file extension and to answer the capability questions below.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MediaType {
    Png,
    Jpeg,
    Gif,
    Webp,
    Bmp,
    Mp4,
    Webm,
    Mkv,
    Zip,
    Text,
    Unknown,
}

impl MediaType {
    /// Sniff the media type from file content.
    ///
    /// Container signatures take priority; files with no known signature that
    /// decode as UTF-8 are treated as text.
    pub fn sniff(path: &Path) -> std::io::Result<MediaType> {
        if let Some(kind) = infer::get_from_path(path)? {
            return Ok(Self::from_mime(kind.mime_type()));
        }

        // No magic number; cheap text heuristic on the first block.
        let bytes = std::fs::read(path)?;
        let sample = &bytes[..bytes.len().min(8192)];
        if !sample.is_empty() && std::str::from_utf8(sample).is_ok() {
            Ok(MediaType::Text)
        } else {
            Ok(MediaType::Unknown)
        }
    }

    fn from_mime(mime: &str) -> MediaType {
        match mime {
            "image/png" => MediaType::Png,
            "image/jpeg" => MediaType::Jpeg,
            "image/gif" => MediaType::Gif,
            "image/webp" => MediaType::Webp,
            "image/bmp" | "image/x-ms-bmp" => MediaType::Bmp,
            "video/mp4" => MediaType::Mp4,
            "video/webm" => MediaType::Webm,
            "video/x-matroska" => MediaType::Mkv,
            "application/zip" => MediaType::Zip,
            _ => MediaType::Unknown,
        }
    }

    /// Canonical mime string, used for logging and catalog storage.
    pub fn mime(&self) -> &'static str {
        match self {
            MediaType::Png => "image/png",
            MediaType::Jpeg => "image/jpeg",
            MediaType::Gif => "image/gif",
            MediaType::Webp => "image/webp",
            MediaType::Bmp => "image/bmp",
            MediaType::Mp4 => "video/mp4",
            MediaType::Webm => "video/webm",
            MediaType::Mkv => "video/x-matroska",
            MediaType::Zip => "application/zip",
            MediaType::Text => "text/plain",
            MediaType::Unknown => "application/octet-stream",
        }
    }

    /// Parse the canonical mime string back into a media type.
    pub fn from_mime_str(mime: &str) -> MediaType {
        match mime {
            "text/plain" => MediaType::Text,
            other => Self::from_mime(other),
        }
    }

    /// File extension used inside the vault.
    pub fn ext(&self) -> &'static str {
        match self {
            MediaType::Png => "png",
            MediaType::Jpeg => "jpg",
            MediaType::Gif => "gif",
            MediaType::Webp => "webp",
            MediaType::Bmp => "bmp",
            MediaType::Mp4 => "mp4",
            MediaType::Webm => "webm",
            MediaType::Mkv => "mkv",
            MediaType::Zip => "zip",
            MediaType::Text => "txt",
            MediaType::Unknown => "bin",
        }
    }

    /// Whether this is a raster image we can decode with the `image` crate.
    pub fn is_raster_image(&self) -> bool {
        matches!(
            self,
            MediaType::Png | MediaType::Jpeg | MediaType::Gif | MediaType::Webp | MediaType::Bmp
        )
    }

    /// Formats where a small compressed payload can expand into a huge pixel
    /// buffer on decode. These get the bomb probe before any decoding.
    pub fn decompression_bomb_risk(&self) -> bool {
        matches!(self, MediaType::Png | MediaType::Jpeg)
    }

    /// Whether the analyzer can render a thumbnail for this type.
    pub fn supports_thumbnails(&self) -> bool {
        self.is_raster_image()
    }

    /// Whether the analyzer can compute perceptual hashes for this type.
    pub fn supports_perceptual_hashes(&self) -> bool {
        self.is_raster_image()
    }
}

impl std::fmt::Display for MediaType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.mime())
    }
}
