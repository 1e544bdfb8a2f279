//! Sharpness scoring
//!
//! Deterministic blur metric computed from raw pixel data.
//!
//! # Algorithm
//!
//! 1. Convert to single-channel luminance
//! 2. Apply the Laplacian kernel `[0, 1, 0; 1, -4, 1; 0, 1, 0]` to every
//!    interior pixel (the one-pixel border is skipped, no wraparound)
//! 3. Sharpness = sum of the squared responses divided by the total
//!    pixel count (border included)
//! 4. Map sharpness onto a fixed 0..=100 blur-score bucket

use image::GrayImage;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::photo::{DecodeError, Photograph};

// ============================================================
// Constants
// ============================================================

/// Upper sharpness bound (exclusive) and blur score for each bucket,
/// blurriest first. Anything at or above the last bound scores 0.
const BLUR_BUCKETS: [(f64, u8); 5] = [
    (50.0, 100),
    (100.0, 80),
    (150.0, 60),
    (200.0, 40),
    (300.0, 20),
];

/// Blur score for images at or above the sharpest bucket bound
const SHARP_BLUR_SCORE: u8 = 0;

/// Blur score assigned when the image cannot be scored
pub const WORST_BLUR_SCORE: u8 = 100;

// ============================================================
// Types
// ============================================================

/// Blur metric for one photograph
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BlurMetric {
    /// Laplacian energy (higher = sharper), never negative
    pub sharpness: f64,

    /// Bucketed blurriness, one of 0, 20, 40, 60, 80, 100 (higher = blurrier)
    pub blur_score: u8,
}

impl BlurMetric {
    /// Build a metric from a raw sharpness value
    pub fn from_sharpness(sharpness: f64) -> Self {
        let sharpness = if sharpness.is_finite() {
            sharpness.max(0.0)
        } else {
            0.0
        };

        Self {
            sharpness,
            blur_score: blur_score(sharpness),
        }
    }

    /// Metric used when the image is unreadable
    pub fn worst() -> Self {
        Self {
            sharpness: 0.0,
            blur_score: WORST_BLUR_SCORE,
        }
    }

    /// Whether the blur score reaches the given significance cutoff
    pub fn is_significant(&self, threshold: u8) -> bool {
        self.blur_score >= threshold
    }
}

/// Map a sharpness value to its blur-score bucket
pub fn blur_score(sharpness: f64) -> u8 {
    BLUR_BUCKETS
        .iter()
        .find(|(bound, _)| sharpness < *bound)
        .map(|(_, score)| *score)
        .unwrap_or(SHARP_BLUR_SCORE)
}

// ============================================================
// Scorer
// ============================================================

/// Laplacian-energy sharpness scorer
pub struct SharpnessScorer;

impl SharpnessScorer {
    /// Score a decoded photograph
    pub fn score(photo: &Photograph) -> BlurMetric {
        Self::score_gray(&photo.to_luma())
    }

    /// Score a luminance image
    pub fn score_gray(gray: &GrayImage) -> BlurMetric {
        BlurMetric::from_sharpness(Self::laplacian_energy(gray))
    }

    /// Decode and score encoded image bytes
    pub fn score_bytes(bytes: &[u8]) -> Result<BlurMetric, DecodeError> {
        let photo = Photograph::decode(bytes)?;
        Ok(Self::score(&photo))
    }

    /// Like [`Self::score_bytes`] but unreadable input scores as maximally blurred
    pub fn score_or_worst(bytes: &[u8]) -> BlurMetric {
        Self::score_bytes(bytes).unwrap_or_else(|e| {
            warn!("Scoring undecodable image as fully blurred: {}", e);
            BlurMetric::worst()
        })
    }

    /// Squared Laplacian response summed over interior pixels, divided by
    /// the full `width * height` pixel count
    ///
    /// Images narrower or shorter than 3 pixels have no interior and score 0.
    pub fn laplacian_energy(gray: &GrayImage) -> f64 {
        let (width, height) = gray.dimensions();

        if width < 3 || height < 3 {
            return 0.0;
        }

        let mut sum_sq = 0.0f64;

        for y in 1..height - 1 {
            for x in 1..width - 1 {
                let center = gray.get_pixel(x, y).0[0] as f64;
                let top = gray.get_pixel(x, y - 1).0[0] as f64;
                let bottom = gray.get_pixel(x, y + 1).0[0] as f64;
                let left = gray.get_pixel(x - 1, y).0[0] as f64;
                let right = gray.get_pixel(x + 1, y).0[0] as f64;

                let laplacian = top + bottom + left + right - 4.0 * center;

                sum_sq += laplacian * laplacian;
            }
        }

        sum_sq / (width as f64 * height as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Luma, Rgb, RgbImage};

    #[test]
    fn test_bucket_scenarios() {
        assert_eq!(blur_score(40.0), 100);
        assert_eq!(blur_score(250.0), 20);
        assert_eq!(blur_score(1000.0), 0);
    }

    #[test]
    fn test_bucket_boundaries() {
        assert_eq!(blur_score(0.0), 100);
        assert_eq!(blur_score(49.999), 100);
        assert_eq!(blur_score(50.0), 80);
        assert_eq!(blur_score(100.0), 60);
        assert_eq!(blur_score(150.0), 40);
        assert_eq!(blur_score(200.0), 20);
        assert_eq!(blur_score(299.9), 20);
        assert_eq!(blur_score(300.0), 0);
    }

    #[test]
    fn test_blur_score_non_increasing() {
        let allowed = [0u8, 20, 40, 60, 80, 100];
        let mut previous = u8::MAX;
        let mut s = 0.0;
        while s < 1_000.0 {
            let score = blur_score(s);
            assert!(allowed.contains(&score), "unexpected bucket {}", score);
            assert!(score <= previous, "score rose at sharpness {}", s);
            previous = score;
            s += 0.5;
        }
    }

    #[test]
    fn test_from_sharpness_sanitizes_input() {
        assert_eq!(BlurMetric::from_sharpness(-5.0).sharpness, 0.0);
        assert_eq!(BlurMetric::from_sharpness(f64::NAN).blur_score, 100);
    }

    #[test]
    fn test_uniform_image_is_fully_blurred() {
        let gray = GrayImage::from_pixel(64, 64, Luma([128]));
        let metric = SharpnessScorer::score_gray(&gray);
        assert_eq!(metric.sharpness, 0.0);
        assert_eq!(metric.blur_score, 100);
    }

    #[test]
    fn test_single_spike_energy() {
        // 5x5 black with one bright pixel in the middle: center response
        // -400, four neighbours respond +100 each, 25 pixels in total.
        let mut gray = GrayImage::from_pixel(5, 5, Luma([0]));
        gray.put_pixel(2, 2, Luma([100]));

        let energy = SharpnessScorer::laplacian_energy(&gray);
        let expected = (400.0f64 * 400.0 + 4.0 * 100.0 * 100.0) / 25.0;
        assert!((energy - expected).abs() < 1e-9);
    }

    #[test]
    fn test_energy_divides_by_total_pixel_count() {
        // 10x10 with one spike: only 64 interior pixels, but the sum is
        // averaged over all 100.
        let mut gray = GrayImage::from_pixel(10, 10, Luma([0]));
        gray.put_pixel(5, 5, Luma([10]));

        let energy = SharpnessScorer::laplacian_energy(&gray);
        let sum = 40.0f64 * 40.0 + 4.0 * 10.0 * 10.0;
        assert!((energy - sum / 100.0).abs() < 1e-9);
        assert!((energy - sum / 64.0).abs() > 1.0);
    }

    #[test]
    fn test_border_pixels_excluded() {
        // A bright border only touches interior pixels through the kernel;
        // a 3x3 image has exactly one interior pixel.
        let mut gray = GrayImage::from_pixel(3, 3, Luma([0]));
        gray.put_pixel(0, 0, Luma([255]));
        gray.put_pixel(2, 2, Luma([255]));
        // corners are not 4-neighbours of the center
        assert_eq!(SharpnessScorer::laplacian_energy(&gray), 0.0);
    }

    #[test]
    fn test_tiny_image_scores_zero() {
        let gray = GrayImage::from_pixel(2, 10, Luma([255]));
        assert_eq!(SharpnessScorer::laplacian_energy(&gray), 0.0);
    }

    #[test]
    fn test_checkerboard_is_sharp() {
        let photo = Photograph::from_rgb(RgbImage::from_fn(32, 32, |x, y| {
            if (x + y) % 2 == 0 {
                Rgb([255, 255, 255])
            } else {
                Rgb([0, 0, 0])
            }
        }));
        let metric = SharpnessScorer::score(&photo);
        assert!(metric.sharpness > 300.0);
        assert_eq!(metric.blur_score, 0);
    }

    #[test]
    fn test_scoring_is_deterministic() {
        let photo = Photograph::from_rgb(RgbImage::from_fn(40, 30, |x, y| {
            Rgb([((x * 7 + y * 3) % 256) as u8, (x * y % 256) as u8, 12])
        }));
        let a = SharpnessScorer::score(&photo);
        let b = SharpnessScorer::score(&photo);
        assert_eq!(a, b);
    }

    #[test]
    fn test_undecodable_bytes() {
        assert!(SharpnessScorer::score_bytes(b"nope").is_err());
        assert_eq!(SharpnessScorer::score_or_worst(b"nope"), BlurMetric::worst());
    }
}
