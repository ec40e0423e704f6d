//! File analysis: digests, structural metadata, thumbnails, perceptual hashes.

use crate::media::MediaType;
use anyhow::{Context, Result};
use sha2::{Digest, Sha256, Sha512};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use std::time::SystemTime;
use tempfile::NamedTempFile;
use tracing::debug;

/// Primary content identity: the sha256 of the canonicalized bytes.
pub type Sha256Hash = [u8; 32];

/// Lowercase hex rendering of a content hash, for paths and log lines.
pub fn hash_hex(hash: &Sha256Hash) -> String {
    hash.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Decoded pixel budget above which an image counts as a decompression bomb.
/// Roughly 1 GiB of 24-bit pixel data.
const BOMB_PIXEL_BUDGET: u64 = 1024 * 1024 * 1024 / 3;

/// Structural metadata extracted from a file before import.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInfo {
    pub size: u64,
    pub media_type: MediaType,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub duration_ms: Option<u64>,
    pub num_frames: Option<u32>,
    pub has_audio: bool,
    pub num_words: Option<u32>,
}

/// Secondary digests computed alongside the primary identity, used for
/// cross-reference lookups.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtraHashes {
    pub blake3: [u8; 32],
    pub sha512: [u8; 64],
}

/// Everything the import pipeline asks of a file on disk.
///
/// Implementations must treat the input path as read-only; canonicalization
/// hands back a separate temp file instead of rewriting in place.
pub trait FileAnalyzer: Send + Sync {
    /// Re-encode legacy bitmap containers (BMP) into PNG so that identical
    /// pixel content always hashes identically. Returns `None` when the file
    /// is already in a canonical container.
    fn canonicalize_bitmap(&self, path: &Path) -> Result<Option<NamedTempFile>>;

    /// Content-based media type detection.
    fn sniff_media_type(&self, path: &Path) -> Result<MediaType>;

    /// Primary identity digest.
    fn sha256(&self, path: &Path) -> Result<Sha256Hash>;

    /// Structural metadata for the given, already-sniffed media type.
    fn file_info(&self, path: &Path, media_type: MediaType) -> Result<FileInfo>;

    /// Pixel-scan probe for decompression bombs. Only called for types where
    /// [`MediaType::decompression_bomb_risk`] holds.
    fn is_decompression_bomb(&self, path: &Path) -> Result<bool>;

    /// Render a PNG thumbnail fitting `target_resolution`. `seek_percentage`
    /// selects the sample point for time-based media and is ignored for
    /// still images.
    fn generate_thumbnail(
        &self,
        path: &Path,
        media_type: MediaType,
        target_resolution: (u32, u32),
        seek_percentage: u32,
    ) -> Result<Vec<u8>>;

    /// Perceptual fingerprints for similar-file indexing. Only called for
    /// types where [`MediaType::supports_perceptual_hashes`] holds.
    fn perceptual_hashes(&self, path: &Path, media_type: MediaType) -> Result<Vec<Vec<u8>>>;

    /// Secondary digests.
    fn extra_hashes(&self, path: &Path) -> Result<ExtraHashes>;

    /// Source file modified timestamp, when the filesystem has one.
    fn modified_timestamp(&self, path: &Path) -> Result<Option<SystemTime>>;
}

/// Compute the dimensions a thumbnail should be rendered at so it fits the
/// bounding box without upscaling or changing aspect ratio.
pub fn thumbnail_resolution(resolution: (u32, u32), bounding: (u32, u32)) -> (u32, u32) {
    let (width, height) = resolution;
    let (bound_width, bound_height) = bounding;

    if width == 0 || height == 0 {
        return (bound_width.max(1), bound_height.max(1));
    }

    if width <= bound_width && height <= bound_height {
        return (width, height);
    }

    let width_ratio = bound_width as f64 / width as f64;
    let height_ratio = bound_height as f64 / height as f64;
    let ratio = width_ratio.min(height_ratio);

    let thumb_width = ((width as f64 * ratio) as u32).max(1);
    let thumb_height = ((height as f64 * ratio) as u32).max(1);

    (thumb_width, thumb_height)
}

/// Stock analyzer built on `sha2`/`blake3` for digests and the `image` crate
/// for raster work. Time-based metadata (duration, frames, audio) is reported
/// as unknown; a decoder-backed analyzer can fill those in.
#[derive(Debug, Default, Clone)]
pub struct StandardFileAnalyzer;

impl StandardFileAnalyzer {
    pub fn new() -> Self {
        Self
    }
}

impl FileAnalyzer for StandardFileAnalyzer {
    fn canonicalize_bitmap(&self, path: &Path) -> Result<Option<NamedTempFile>> {
        if MediaType::sniff(path)? != MediaType::Bmp {
            return Ok(None);
        }

        debug!(path = ?path, "Canonicalizing BMP to PNG before hashing");

        let img = image::open(path)
            .with_context(|| format!("Failed to decode bitmap: {:?}", path))?;

        let mut canonical = tempfile::Builder::new()
            .prefix("filevault-canonical-")
            .suffix(".png")
            .tempfile()?;
        img.write_to(&mut canonical, image::ImageOutputFormat::Png)
            .with_context(|| format!("Failed to re-encode bitmap as PNG: {:?}", path))?;

        Ok(Some(canonical))
    }

    fn sniff_media_type(&self, path: &Path) -> Result<MediaType> {
        Ok(MediaType::sniff(path)?)
    }

    fn sha256(&self, path: &Path) -> Result<Sha256Hash> {
        let file = File::open(path)
            .with_context(|| format!("Failed to open file for hashing: {:?}", path))?;
        let mut reader = BufReader::new(file);
        let mut hasher = Sha256::new();

        let mut buf = [0u8; 1024 * 128];
        loop {
            let read = reader.read(&mut buf)?;
            if read == 0 {
                break;
            }
            hasher.update(&buf[..read]);
        }

        Ok(hasher.finalize().into())
    }

    fn file_info(&self, path: &Path, media_type: MediaType) -> Result<FileInfo> {
        let size = std::fs::metadata(path)?.len();

        let (width, height) = if media_type.is_raster_image() {
            let (w, h) = image::image_dimensions(path)
                .with_context(|| format!("Failed to read image dimensions: {:?}", path))?;
            (Some(w), Some(h))
        } else {
            (None, None)
        };

        let num_words = if media_type == MediaType::Text {
            let text = std::fs::read_to_string(path)?;
            Some(text.split_whitespace().count() as u32)
        } else {
            None
        };

        Ok(FileInfo {
            size,
            media_type,
            width,
            height,
            duration_ms: None,
            num_frames: None,
            has_audio: false,
            num_words,
        })
    }

    fn is_decompression_bomb(&self, path: &Path) -> Result<bool> {
        // Header-only probe; the point is to decide without decoding.
        let (width, height) = image::image_dimensions(path)
            .with_context(|| format!("Failed to read image dimensions: {:?}", path))?;
        Ok(width as u64 * height as u64 > BOMB_PIXEL_BUDGET)
    }

    fn generate_thumbnail(
        &self,
        path: &Path,
        media_type: MediaType,
        target_resolution: (u32, u32),
        _seek_percentage: u32,
    ) -> Result<Vec<u8>> {
        anyhow::ensure!(
            media_type.supports_thumbnails(),
            "No thumbnail support for {}",
            media_type
        );

        let img = image::open(path)
            .with_context(|| format!("Failed to decode image: {:?}", path))?;
        let (target_width, target_height) = target_resolution;
        let thumb = img.thumbnail(target_width, target_height);

        let mut bytes = std::io::Cursor::new(Vec::new());
        thumb
            .write_to(&mut bytes, image::ImageOutputFormat::Png)
            .context("Failed to encode thumbnail as PNG")?;

        Ok(bytes.into_inner())
    }

    fn perceptual_hashes(&self, path: &Path, media_type: MediaType) -> Result<Vec<Vec<u8>>> {
        anyhow::ensure!(
            media_type.supports_perceptual_hashes(),
            "No perceptual hash support for {}",
            media_type
        );

        let img = image::open(path)
            .with_context(|| format!("Failed to decode image: {:?}", path))?;
        let hasher = image_hasher::HasherConfig::new()
            .hash_alg(image_hasher::HashAlg::Gradient)
            .to_hasher();
        let hash = hasher.hash_image(&img);

        Ok(vec![hash.as_bytes().to_vec()])
    }

    fn extra_hashes(&self, path: &Path) -> Result<ExtraHashes> {
        let file = File::open(path)
            .with_context(|| format!("Failed to open file for hashing: {:?}", path))?;
        let mut reader = BufReader::new(file);
        let mut blake3_hasher = blake3::Hasher::new();
        let mut sha512_hasher = Sha512::new();

        let mut buf = [0u8; 1024 * 128];
        loop {
            let read = reader.read(&mut buf)?;
            if read == 0 {
                break;
            }
            blake3_hasher.update(&buf[..read]);
            sha512_hasher.update(&buf[..read]);
        }

        Ok(ExtraHashes {
            blake3: *blake3_hasher.finalize().as_bytes(),
            sha512: sha512_hasher.finalize().into(),
        })
    }

    fn modified_timestamp(&self, path: &Path) -> Result<Option<SystemTime>> {
        Ok(std::fs::metadata(path)?.modified().ok())
    }
}
