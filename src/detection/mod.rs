//! Brand detection module
//!
//! Normalizes detections from an external vision service into a common
//! format. Two independent modes:
//!
//! - **Region detection** ([`BrandDetector::detect_regions`]) - logo/text
//!   boxes in pixel space, used to build blur masks
//! - **Risk assessment** ([`BrandDetector::assess_risk`]) - holistic brand
//!   list, element descriptions, and a 0..=100 risk score, used for
//!   go/no-go decisions
//!
//! Failures surface as [`DetectionError`]. Adapters may retry transient
//! transport errors internally; callers never retry.

mod http;
mod types;

pub use http::HttpDetector;
pub use types::{
    dedupe_brands, normalize_regions, DetectedRegion, DetectionError, RawRegion, RegionFilter,
    RegionKind, Result, RiskAssessment, DEFAULT_MIN_REGION_SIZE, MAX_RISK_SCORE,
};

use crate::photo::Photograph;

/// Source of brand detections
pub trait BrandDetector: Send + Sync {
    /// Structured logo/text detection with clipped pixel boxes
    ///
    /// `brand_hints` narrows the search to brands already known to be present.
    fn detect_regions(
        &self,
        photo: &Photograph,
        brand_hints: &[String],
    ) -> Result<Vec<DetectedRegion>>;

    /// Holistic brand/risk judgement without geometry
    fn assess_risk(&self, photo: &Photograph) -> Result<RiskAssessment>;
}
