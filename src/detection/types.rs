//! Common types for the detection module

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;

use crate::photo::EncodeError;
use crate::region::{BoundingBox, RawBox};
use crate::remote::RemoteError;
use crate::retry::Retryable;

// ============================================================
// Constants
// ============================================================

/// Default minimum region side in pixels
pub const DEFAULT_MIN_REGION_SIZE: u32 = 10;

/// Normalized Levenshtein similarity above which two brand names are merged
const BRAND_SIMILARITY_THRESHOLD: f64 = 0.85;

/// Corporate suffixes ignored when comparing brand names
const BRAND_SUFFIXES: [&str; 6] = ["inc", "inc.", "corp", "co", "ltd", "gmbh"];

/// Upper bound of the risk scale
pub const MAX_RISK_SCORE: u8 = 100;

// ============================================================
// Error Types
// ============================================================

/// Detection error types
#[derive(Debug, Error)]
pub enum DetectionError {
    #[error("Detection service error: {0}")]
    Remote(#[from] RemoteError),

    #[error("Malformed detection response: {0}")]
    Malformed(String),

    #[error("Could not encode image for detection: {0}")]
    Encode(#[from] EncodeError),

    #[error("Detection failed: {0}")]
    Failed(String),
}

impl Retryable for DetectionError {
    fn is_transient(&self) -> bool {
        match self {
            DetectionError::Remote(e) => e.is_transient(),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, DetectionError>;

// ============================================================
// Regions
// ============================================================

/// What kind of mark a region holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegionKind {
    Logo,
    Text,
}

/// Region as returned by a detector, before normalization
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawRegion {
    pub kind: RegionKind,
    pub label: String,
    pub confidence: f32,
    pub bbox: RawBox,
}

/// Normalized detection: clipped to the image, above the noise floor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectedRegion {
    pub kind: RegionKind,
    pub label: String,
    /// Detector confidence in 0..=1
    pub confidence: f32,
    pub bbox: BoundingBox,
}

/// Noise filter applied during normalization
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RegionFilter {
    /// Regions narrower or shorter than this are dropped
    pub min_size: u32,
    /// Regions below this confidence are dropped
    pub min_confidence: f32,
}

impl Default for RegionFilter {
    fn default() -> Self {
        Self {
            min_size: DEFAULT_MIN_REGION_SIZE,
            min_confidence: 0.0,
        }
    }
}

impl RegionFilter {
    pub fn with_min_size(min_size: u32) -> Self {
        Self {
            min_size,
            ..Default::default()
        }
    }
}

/// Scale, clip, and filter raw detections for an image of the given size
pub fn normalize_regions(
    raw: Vec<RawRegion>,
    width: u32,
    height: u32,
    filter: &RegionFilter,
) -> Vec<DetectedRegion> {
    raw.into_iter()
        .filter_map(|r| {
            let confidence = if r.confidence.is_finite() {
                r.confidence.clamp(0.0, 1.0)
            } else {
                0.0
            };
            if confidence < filter.min_confidence {
                return None;
            }

            let bbox = r.bbox.to_pixels(width, height)?;
            if !bbox.meets_min_size(filter.min_size) {
                return None;
            }

            Some(DetectedRegion {
                kind: r.kind,
                label: r.label.trim().to_string(),
                confidence,
                bbox,
            })
        })
        .collect()
}

// ============================================================
// Risk Assessment
// ============================================================

/// Holistic brand judgement for one image
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskAssessment {
    /// Brand names recognized in the image
    pub brands: Vec<String>,
    /// Likelihood (0..=100) that brand marks remain visible
    pub risk_score: u8,
    /// Free-form element descriptions ("Nike swoosh on side panel")
    pub detected_elements: Vec<String>,
}

impl RiskAssessment {
    /// Build an assessment, de-duplicating brands and clamping the score
    pub fn new(brands: Vec<String>, risk_score: i64, detected_elements: Vec<String>) -> Self {
        Self {
            brands: dedupe_brands(brands),
            risk_score: risk_score.clamp(0, MAX_RISK_SCORE as i64) as u8,
            detected_elements: detected_elements
                .into_iter()
                .map(|e| e.trim().to_string())
                .filter(|e| !e.is_empty())
                .collect(),
        }
    }

    /// No brands and a score under the threshold
    pub fn is_clean(&self, threshold: u8) -> bool {
        self.risk_score < threshold && self.brands.is_empty()
    }

    /// Labels to classify: detected elements, or one `"<brand> logo"` label
    /// per brand when the detector gave no element breakdown
    pub fn labels(&self) -> Vec<String> {
        if self.detected_elements.is_empty() {
            self.brands.iter().map(|b| format!("{} logo", b)).collect()
        } else {
            self.detected_elements.clone()
        }
    }
}

/// Collapse case, whitespace, suffix, and near-spelling variants of the
/// same brand, keeping the first spelling seen
pub fn dedupe_brands(brands: Vec<String>) -> Vec<String> {
    let mut kept: Vec<(String, String)> = Vec::new();
    let mut exact: HashSet<String> = HashSet::new();

    for brand in brands {
        let display = brand.split_whitespace().collect::<Vec<_>>().join(" ");
        if display.is_empty() {
            continue;
        }

        let key = brand_key(&display);
        if exact.contains(&key) {
            continue;
        }

        let similar = kept
            .iter()
            .any(|(k, _)| strsim::normalized_levenshtein(k, &key) >= BRAND_SIMILARITY_THRESHOLD);
        if similar {
            continue;
        }

        exact.insert(key.clone());
        kept.push((key, display));
    }

    kept.into_iter().map(|(_, display)| display).collect()
}

fn brand_key(name: &str) -> String {
    name.to_lowercase()
        .split_whitespace()
        .filter(|w| !BRAND_SUFFIXES.contains(w))
        .collect::<Vec<_>>()
        .join(" ")
}
