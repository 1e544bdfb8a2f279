//! Photograph type
//!
//! An immutable RGB raster shared by every pipeline stage. Operations take a
//! `&Photograph` and hand back a new one; nothing mutates a photograph that
//! another stage may still hold.

use image::{GrayImage, ImageFormat, RgbImage};
use sha2::{Digest, Sha256};
use std::io::Cursor;
use std::path::{Path, PathBuf};
use thiserror::Error;

// ============================================================
// Error Types
// ============================================================

/// Raised when raw bytes cannot be turned into a photograph
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("Image not found: {0}")]
    NotFound(PathBuf),

    #[error("Unreadable image: {0}")]
    Unreadable(String),

    #[error("Empty image")]
    Empty,

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Raised when a photograph cannot be serialized
#[derive(Debug, Error)]
#[error("Image encoding failed: {0}")]
pub struct EncodeError(pub String);

// ============================================================
// Photograph
// ============================================================

/// Decoded product photograph (8-bit RGB)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Photograph {
    pixels: RgbImage,
}

impl Photograph {
    /// Wrap an existing RGB buffer
    pub fn from_rgb(pixels: RgbImage) -> Self {
        Self { pixels }
    }

    /// Decode any format supported by the `image` crate
    pub fn decode(bytes: &[u8]) -> Result<Self, DecodeError> {
        if bytes.is_empty() {
            return Err(DecodeError::Empty);
        }

        let img =
            image::load_from_memory(bytes).map_err(|e| DecodeError::Unreadable(e.to_string()))?;
        let pixels = img.to_rgb8();

        if pixels.width() == 0 || pixels.height() == 0 {
            return Err(DecodeError::Empty);
        }

        Ok(Self { pixels })
    }

    /// Read and decode an image file
    pub fn open(path: &Path) -> Result<Self, DecodeError> {
        if !path.exists() {
            return Err(DecodeError::NotFound(path.to_path_buf()));
        }

        let bytes = std::fs::read(path)?;
        Self::decode(&bytes)
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.pixels.dimensions()
    }

    /// Borrow the underlying pixel buffer
    pub fn pixels(&self) -> &RgbImage {
        &self.pixels
    }

    pub fn into_pixels(self) -> RgbImage {
        self.pixels
    }

    /// Single-channel luminance copy
    pub fn to_luma(&self) -> GrayImage {
        image::imageops::grayscale(&self.pixels)
    }

    /// Encode as PNG (lossless, used for edit payloads and persisted output)
    pub fn encode_png(&self) -> Result<Vec<u8>, EncodeError> {
        self.encode(ImageFormat::Png)
    }

    /// Encode in the requested format
    pub fn encode(&self, format: ImageFormat) -> Result<Vec<u8>, EncodeError> {
        let mut buf = Cursor::new(Vec::new());
        self.pixels
            .write_to(&mut buf, format)
            .map_err(|e| EncodeError(e.to_string()))?;
        Ok(buf.into_inner())
    }

    /// Write to disk, format chosen from the extension
    pub fn save(&self, path: &Path) -> Result<(), EncodeError> {
        self.pixels
            .save(path)
            .map_err(|e| EncodeError(format!("{}: {}", path.display(), e)))
    }

    /// SHA-256 over dimensions and raw pixel data, hex encoded
    pub fn digest(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.width().to_le_bytes());
        hasher.update(self.height().to_le_bytes());
        hasher.update(self.pixels.as_raw());
        format!("{:x}", hasher.finalize())
    }
}

impl From<RgbImage> for Photograph {
    fn from(pixels: RgbImage) -> Self {
        Self::from_rgb(pixels)
    }
}
