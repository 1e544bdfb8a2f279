//! Masking/blur engine
//!
//! Deterministic, non-generative last resort: Gaussian-blur the detected
//! regions of a photograph and composite them back in place.
//!
//! # Algorithm
//!
//! 1. Clip every region to the image bounds
//! 2. Skip regions whose clipped width or height is below the minimum size
//! 3. Crop the region, blur each RGB channel, paste it back at its offset
//! 4. If no region survives, copy the source or (in full-frame mode) apply a
//!    lighter uniform blur to the whole image

use image::{GrayImage, Luma, Rgb, RgbImage};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::detection::DEFAULT_MIN_REGION_SIZE;
use crate::photo::Photograph;
use crate::region::BoundingBox;

// ============================================================
// Constants
// ============================================================

/// Default region blur intensity (Gaussian sigma)
pub const DEFAULT_BLUR_INTENSITY: u32 = 12;

/// Default full-frame fallback intensity
pub const DEFAULT_FULL_FRAME_INTENSITY: u32 = 4;

/// Upper bound for any intensity setting
const MAX_INTENSITY: u32 = 100;

// ============================================================
// Types
// ============================================================

/// What to do when no usable region remains
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackMode {
    /// Return the source unchanged
    #[default]
    Copy,
    /// Blur the whole frame at `full_frame_intensity`
    FullFrame,
}

/// Options for region blurring
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaskOptions {
    /// Gaussian sigma for region blur
    pub intensity: u32,

    /// Regions narrower or shorter than this are skipped
    pub min_region_size: u32,

    /// Behavior when no region is usable
    pub fallback: FallbackMode,

    /// Gaussian sigma for the full-frame fallback
    pub full_frame_intensity: u32,
}

impl Default for MaskOptions {
    fn default() -> Self {
        Self {
            intensity: DEFAULT_BLUR_INTENSITY,
            min_region_size: DEFAULT_MIN_REGION_SIZE,
            fallback: FallbackMode::Copy,
            full_frame_intensity: DEFAULT_FULL_FRAME_INTENSITY,
        }
    }
}

impl MaskOptions {
    /// Create a builder
    pub fn builder() -> MaskOptionsBuilder {
        MaskOptionsBuilder::default()
    }

    /// Full-frame fallback with default intensities
    pub fn strict() -> Self {
        Self {
            fallback: FallbackMode::FullFrame,
            ..Default::default()
        }
    }
}

/// Builder for MaskOptions
#[derive(Debug, Default)]
pub struct MaskOptionsBuilder {
    options: MaskOptions,
}

impl MaskOptionsBuilder {
    /// Set region blur intensity
    #[must_use]
    pub fn intensity(mut self, intensity: u32) -> Self {
        self.options.intensity = intensity.min(MAX_INTENSITY);
        self
    }

    /// Set minimum region size
    #[must_use]
    pub fn min_region_size(mut self, size: u32) -> Self {
        self.options.min_region_size = size.max(1);
        self
    }

    /// Set fallback mode
    #[must_use]
    pub fn fallback(mut self, mode: FallbackMode) -> Self {
        self.options.fallback = mode;
        self
    }

    /// Set full-frame fallback intensity
    #[must_use]
    pub fn full_frame_intensity(mut self, intensity: u32) -> Self {
        self.options.full_frame_intensity = intensity.min(MAX_INTENSITY);
        self
    }

    /// Build the options
    #[must_use]
    pub fn build(self) -> MaskOptions {
        self.options
    }
}

/// Result of a region blur
#[derive(Debug, Clone)]
pub struct MaskOutcome {
    /// New photograph; the source is never touched
    pub photo: Photograph,

    /// Regions actually blurred
    pub regions_applied: usize,

    /// Regions dropped by clipping or the size floor
    pub regions_skipped: usize,

    /// Whether the full-frame fallback ran
    pub full_frame: bool,
}

impl MaskOutcome {
    /// Whether any pixel could have changed
    pub fn modified(&self) -> bool {
        self.regions_applied > 0 || self.full_frame
    }
}

// ============================================================
// Engine
// ============================================================

/// Region blur engine
#[derive(Debug, Clone, Default)]
pub struct MaskEngine {
    options: MaskOptions,
}

impl MaskEngine {
    pub fn new(options: MaskOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &MaskOptions {
        &self.options
    }

    /// Blur `regions` of `photo` and return the composited copy
    pub fn apply_region_blur(&self, photo: &Photograph, regions: &[BoundingBox]) -> MaskOutcome {
        let (width, height) = photo.dimensions();
        let min_size = self.options.min_region_size;

        let usable: Vec<BoundingBox> = regions
            .iter()
            .filter_map(|r| r.clip(width, height))
            .filter(|r| r.meets_min_size(min_size))
            .collect();
        let skipped = regions.len() - usable.len();

        if usable.is_empty() {
            return self.fallback(photo, skipped);
        }

        let sigma = self.options.intensity as f32;
        let mut canvas = photo.pixels().clone();

        for region in &usable {
            let patch = image::imageops::crop_imm(
                photo.pixels(),
                region.x,
                region.y,
                region.width,
                region.height,
            )
            .to_image();
            let blurred = blur_rgb(&patch, sigma);
            paste(&mut canvas, &blurred, region.x, region.y);
        }

        debug!(
            "Blurred {} region(s), skipped {}, sigma {}",
            usable.len(),
            skipped,
            sigma
        );

        MaskOutcome {
            photo: Photograph::from_rgb(canvas),
            regions_applied: usable.len(),
            regions_skipped: skipped,
            full_frame: false,
        }
    }

    fn fallback(&self, photo: &Photograph, skipped: usize) -> MaskOutcome {
        match self.options.fallback {
            FallbackMode::Copy => {
                debug!("No usable regions, returning source copy");
                MaskOutcome {
                    photo: photo.clone(),
                    regions_applied: 0,
                    regions_skipped: skipped,
                    full_frame: false,
                }
            }
            FallbackMode::FullFrame => {
                let sigma = self.options.full_frame_intensity as f32;
                debug!("No usable regions, full-frame blur sigma {}", sigma);
                MaskOutcome {
                    photo: Photograph::from_rgb(blur_rgb(photo.pixels(), sigma)),
                    regions_applied: 0,
                    regions_skipped: skipped,
                    full_frame: sigma > 0.0,
                }
            }
        }
    }
}

/// Gaussian blur per RGB channel; non-positive sigma returns a copy
fn blur_rgb(image: &RgbImage, sigma: f32) -> RgbImage {
    if sigma <= 0.0 || image.width() == 0 || image.height() == 0 {
        return image.clone();
    }

    let (w, h) = image.dimensions();
    let channels: [GrayImage; 3] = std::array::from_fn(|c| {
        GrayImage::from_fn(w, h, |x, y| Luma([image.get_pixel(x, y).0[c]]))
    });
    let blurred: [GrayImage; 3] =
        std::array::from_fn(|c| imageproc::filter::gaussian_blur_f32(&channels[c], sigma));

    RgbImage::from_fn(w, h, |x, y| {
        Rgb([
            blurred[0].get_pixel(x, y).0[0],
            blurred[1].get_pixel(x, y).0[0],
            blurred[2].get_pixel(x, y).0[0],
        ])
    })
}

fn paste(canvas: &mut RgbImage, patch: &RgbImage, offset_x: u32, offset_y: u32) {
    for (x, y, pixel) in patch.enumerate_pixels() {
        let (cx, cy) = (offset_x + x, offset_y + y);
        if cx < canvas.width() && cy < canvas.height() {
            canvas.put_pixel(cx, cy, *pixel);
        }
    }
}
