//! HTTP adapter for the remote vision service
//!
//! # Wire format
//!
//! `POST {base}/detect`
//!
//! ```json
//! {"image": "<base64 png>", "features": ["logo", "text"], "brand_hints": ["Nike"]}
//! ```
//!
//! returns
//!
//! ```json
//! {"regions": [{"kind": "logo", "label": "Nike swoosh", "confidence": 0.93,
//!               "bbox": {"x": 0.1, "y": 0.4, "width": 0.2, "height": 0.1},
//!               "normalized": true}]}
//! ```
//!
//! `POST {base}/assess` with `{"image": "<base64 png>"}` returns
//! `{"brands": [...], "risk_score": 42, "detected_elements": [...]}`
//! (camelCase keys are accepted too).

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::types::{
    normalize_regions, DetectedRegion, DetectionError, RawRegion, RegionFilter, RegionKind,
    Result, RiskAssessment,
};
use super::BrandDetector;
use crate::photo::Photograph;
use crate::region::{Coordinates, RawBox};
use crate::remote::{encode_image, RemoteClient, RemoteError, ServiceConfig};
use crate::retry::RetryPolicy;

const DETECT_PATH: &str = "detect";
const ASSESS_PATH: &str = "assess";
const FEATURES: [&str; 2] = ["logo", "text"];

// ============================================================
// Wire types
// ============================================================

#[derive(Debug, Serialize)]
struct DetectRequest<'a> {
    image: &'a str,
    features: &'a [&'a str],
    brand_hints: &'a [String],
}

#[derive(Debug, Serialize)]
struct AssessRequest<'a> {
    image: &'a str,
}

#[derive(Debug, Deserialize)]
struct DetectResponse {
    #[serde(default)]
    regions: Vec<WireRegion>,
}

#[derive(Debug, Deserialize)]
struct WireRegion {
    kind: RegionKind,
    #[serde(default)]
    label: String,
    #[serde(default)]
    confidence: f32,
    bbox: WireBox,
    #[serde(default)]
    normalized: bool,
}

#[derive(Debug, Deserialize)]
struct WireBox {
    x: f64,
    y: f64,
    width: f64,
    height: f64,
}

#[derive(Debug, Deserialize)]
struct AssessResponse {
    #[serde(default)]
    brands: Vec<String>,
    #[serde(alias = "riskScore")]
    risk_score: Option<i64>,
    #[serde(default, alias = "detectedElements")]
    detected_elements: Vec<String>,
}

impl From<WireRegion> for RawRegion {
    fn from(w: WireRegion) -> Self {
        let coordinates = if w.normalized {
            Coordinates::Normalized
        } else {
            Coordinates::Pixel
        };
        RawRegion {
            kind: w.kind,
            label: w.label,
            confidence: w.confidence,
            bbox: RawBox {
                x: w.bbox.x,
                y: w.bbox.y,
                width: w.bbox.width,
                height: w.bbox.height,
                coordinates,
            },
        }
    }
}

// ============================================================
// Detector
// ============================================================

/// Remote vision service client
pub struct HttpDetector {
    client: RemoteClient,
    retry: RetryPolicy,
    filter: RegionFilter,
}

impl HttpDetector {
    /// Create a detector for the configured endpoint
    pub fn new(
        config: &ServiceConfig,
        retry: RetryPolicy,
        filter: RegionFilter,
    ) -> std::result::Result<Self, RemoteError> {
        Ok(Self {
            client: RemoteClient::new("detector", config)?,
            retry,
            filter,
        })
    }
}

impl BrandDetector for HttpDetector {
    fn detect_regions(
        &self,
        photo: &Photograph,
        brand_hints: &[String],
    ) -> Result<Vec<DetectedRegion>> {
        let image = encode_image(photo)?;
        let request = DetectRequest {
            image: &image,
            features: &FEATURES,
            brand_hints,
        };

        let response: DetectResponse = self.retry.run("detect", || {
            self.client
                .post_json(DETECT_PATH, &request)
                .map_err(DetectionError::from)
        })?;

        let raw_count = response.regions.len();
        let raw: Vec<RawRegion> = response.regions.into_iter().map(RawRegion::from).collect();
        let (width, height) = photo.dimensions();
        let regions = normalize_regions(raw, width, height, &self.filter);

        debug!(
            "Detector returned {} regions, {} kept after normalization",
            raw_count,
            regions.len()
        );
        Ok(regions)
    }

    fn assess_risk(&self, photo: &Photograph) -> Result<RiskAssessment> {
        let image = encode_image(photo)?;
        let request = AssessRequest { image: &image };

        let response: AssessResponse = self.retry.run("assess", || {
            self.client
                .post_json(ASSESS_PATH, &request)
                .map_err(DetectionError::from)
        })?;

        let risk_score = response
            .risk_score
            .ok_or_else(|| DetectionError::Malformed("missing risk_score".into()))?;

        Ok(RiskAssessment::new(
            response.brands,
            risk_score,
            response.detected_elements,
        ))
    }
}
