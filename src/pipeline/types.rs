//! Pipeline types
//!
//! The per-product [`AnalysisResult`] record and its status.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::photo::{DecodeError, EncodeError};
use crate::verify::{PassRecord, VerifyError, VerifyState};

// ============================================================
// Error Types
// ============================================================

/// Per-product pipeline error
///
/// Never escapes [`super::ProductPipeline::run`]; its message is recorded in
/// the product's result instead.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Image decode failed: {0}")]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Verify(#[from] VerifyError),

    #[error("Exhausted {passes} verification pass(es) with risk score {risk_score}")]
    ExhaustedPasses { passes: u32, risk_score: u8 },

    #[error("Could not write edited image: {0}")]
    Artifact(String),

    #[error("Cancelled")]
    Cancelled,
}

impl From<EncodeError> for PipelineError {
    fn from(e: EncodeError) -> Self {
        PipelineError::Artifact(e.0)
    }
}

// ============================================================
// Status
// ============================================================

/// Product analysis status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisStatus {
    /// Entered the pipeline, not finished
    #[default]
    Pending,
    /// Clean without any edit
    Clean,
    /// Sanitized; worth a spot check
    BlurApplied,
    /// Still flagged after every pass
    NeedsReview,
    Failed,
}

impl AnalysisStatus {
    /// Check if the status is terminal
    pub fn is_terminal(&self) -> bool {
        !matches!(self, AnalysisStatus::Pending)
    }
}

impl fmt::Display for AnalysisStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AnalysisStatus::Pending => "pending",
            AnalysisStatus::Clean => "clean",
            AnalysisStatus::BlurApplied => "blur_applied",
            AnalysisStatus::NeedsReview => "needs_review",
            AnalysisStatus::Failed => "failed",
        };
        write!(f, "{}", name)
    }
}

/// Status reported when verification runs out of passes without a safe
/// fallback
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExhaustedStatus {
    #[default]
    NeedsReview,
    Failed,
}

impl From<ExhaustedStatus> for AnalysisStatus {
    fn from(s: ExhaustedStatus) -> Self {
        match s {
            ExhaustedStatus::NeedsReview => AnalysisStatus::NeedsReview,
            ExhaustedStatus::Failed => AnalysisStatus::Failed,
        }
    }
}

// ============================================================
// Result Record
// ============================================================

/// Current analysis of one product
///
/// Exactly one exists per product; a re-run replaces it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub product_id: String,

    pub status: AnalysisStatus,

    /// Risk score of the final image
    #[serde(default)]
    pub risk_score: Option<u8>,

    /// Brands reported on the untouched image
    #[serde(default)]
    pub brands_detected: Vec<String>,

    /// Where the edited image lives (`None` when nothing was edited)
    #[serde(default)]
    pub edited_image_ref: Option<String>,

    #[serde(default)]
    pub passes_used: u32,

    #[serde(default)]
    pub fallback_blur_used: bool,

    /// Blur score of the final image
    #[serde(default)]
    pub blur_score: Option<u8>,

    /// Rewritten title
    #[serde(default)]
    pub camouflaged_title: Option<String>,

    /// Labels left for manual review
    #[serde(default)]
    pub unmatched_elements: Vec<String>,

    #[serde(default)]
    pub history: Vec<VerifyState>,

    #[serde(default)]
    pub passes: Vec<PassRecord>,

    #[serde(default)]
    pub error: Option<String>,

    pub analyzed_at: DateTime<Utc>,
}

impl AnalysisResult {
    /// Fresh pending record
    pub fn pending(product_id: impl Into<String>) -> Self {
        Self {
            product_id: product_id.into(),
            status: AnalysisStatus::Pending,
            risk_score: None,
            brands_detected: Vec::new(),
            edited_image_ref: None,
            passes_used: 0,
            fallback_blur_used: false,
            blur_score: None,
            camouflaged_title: None,
            unmatched_elements: Vec::new(),
            history: Vec::new(),
            passes: Vec::new(),
            error: None,
            analyzed_at: Utc::now(),
        }
    }

    /// Failed record carrying only the error
    pub fn failed(product_id: impl Into<String>, error: impl Into<String>) -> Self {
        let mut result = Self::pending(product_id);
        result.status = AnalysisStatus::Failed;
        result.error = Some(error.into());
        result
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}
