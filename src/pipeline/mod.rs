//! Product pipeline
//!
//! Drives one product from `pending` to a terminal status:
//!
//! 1. Record a pending result
//! 2. Rewrite the title (failures fall back to the original title)
//! 3. Decode the primary photograph
//! 4. Run the verification loop
//! 5. Resolve the status, persist the edited image, record the result
//!
//! Every per-product error is caught here and written into the product's
//! [`AnalysisResult`]; [`ProductPipeline::run`] itself never fails.
//!
//! # Status rule
//!
//! | Verification | Fallback blur | Final blur significant | Status |
//! |---|---|---|---|
//! | clean, no edit | - | - | `clean` |
//! | clean after edits | used, not treated as clean | - | `blur_applied` |
//! | clean after edits | otherwise | yes | `blur_applied` |
//! | clean after edits | otherwise | no | `clean` |
//! | needs review | - | - | `exhausted_status` |

mod types;

pub use types::{AnalysisResult, AnalysisStatus, ExhaustedStatus, PipelineError};

use chrono::Utc;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::cancel::CancelToken;
use crate::catalog::Product;
use crate::detection::BrandDetector;
use crate::edit::{ImageEditor, PassthroughTitle, TitleRewriter};
use crate::photo::Photograph;
use crate::sharpness::{BlurMetric, SharpnessScorer};
use crate::store::{AnalysisStore, StoreError};
use crate::verify::{VerificationLoop, VerifyError, VerifyOutcome, Verdict};

/// Default blur score at which the final image counts as visibly blurred
pub const DEFAULT_BLUR_SIGNIFICANCE_THRESHOLD: u8 = 50;

/// Hex digits of the digest used in artifact file names
const ARTIFACT_DIGEST_LEN: usize = 12;

/// Pipeline status policy and output settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineOptions {
    /// Report `clean` instead of `blur_applied` after a fallback blur
    pub treat_fallback_blur_as_clean: bool,

    /// Final blur score at or above this means `blur_applied`
    pub blur_significance_threshold: u8,

    /// Status for runs that end in review
    pub exhausted_status: ExhaustedStatus,

    /// Directory for edited images; `None` keeps only the digest
    pub output_dir: Option<PathBuf>,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            treat_fallback_blur_as_clean: false,
            blur_significance_threshold: DEFAULT_BLUR_SIGNIFICANCE_THRESHOLD,
            exhausted_status: ExhaustedStatus::NeedsReview,
            output_dir: None,
        }
    }
}

/// Per-product state machine
pub struct ProductPipeline {
    detector: Arc<dyn BrandDetector>,
    editor: Arc<dyn ImageEditor>,
    titles: Arc<dyn TitleRewriter>,
    store: Arc<dyn AnalysisStore>,
    verifier: VerificationLoop,
    options: PipelineOptions,
}

impl ProductPipeline {
    pub fn new(
        detector: Arc<dyn BrandDetector>,
        editor: Arc<dyn ImageEditor>,
        store: Arc<dyn AnalysisStore>,
        verifier: VerificationLoop,
        options: PipelineOptions,
    ) -> Self {
        Self {
            detector,
            editor,
            titles: Arc::new(PassthroughTitle),
            store,
            verifier,
            options,
        }
    }

    /// Use a title rewriter instead of keeping titles unchanged
    #[must_use]
    pub fn with_title_rewriter(mut self, titles: Arc<dyn TitleRewriter>) -> Self {
        self.titles = titles;
        self
    }

    pub fn store(&self) -> &Arc<dyn AnalysisStore> {
        &self.store
    }

    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    /// Analyze one product and record its result
    pub fn run(&self, product: &Product, cancel: &CancelToken) -> AnalysisResult {
        info!("Analyzing product {}", product.id);

        let mut result = AnalysisResult::pending(&product.id);
        let pending_saved = self.save(&result);

        result.camouflaged_title = Some(self.camouflage_title(product));

        if let Err(e) = self.analyze(product, &mut result, cancel) {
            warn!("Product {} failed: {}", product.id, e);
            result.status = AnalysisStatus::Failed;
            result.error = Some(e.to_string());
        }

        result.analyzed_at = Utc::now();
        if let Err(e) = self.save(&result).and(pending_saved) {
            note_error(&mut result, format!("Result not stored: {}", e));
        }

        info!("Product {} finished: {}", product.id, result.status);
        result
    }

    fn camouflage_title(&self, product: &Product) -> String {
        match self
            .titles
            .rewrite(&product.title, product.category.as_deref())
        {
            Ok(title) => title,
            Err(e) => {
                warn!(
                    "Title rewrite failed for {}, keeping original: {}",
                    product.id, e
                );
                product.title.clone()
            }
        }
    }

    fn analyze(
        &self,
        product: &Product,
        result: &mut AnalysisResult,
        cancel: &CancelToken,
    ) -> Result<(), PipelineError> {
        let photo = match Photograph::open(&product.image_path) {
            Ok(photo) => photo,
            Err(e) => {
                result.blur_score = Some(BlurMetric::worst().blur_score);
                return Err(e.into());
            }
        };
        debug!(
            "Decoded {} ({}x{})",
            product.image_path.display(),
            photo.width(),
            photo.height()
        );

        let outcome = self
            .verifier
            .run(
                self.detector.as_ref(),
                self.editor.as_ref(),
                &photo,
                product.category.as_deref(),
                cancel,
            )
            .map_err(|e| match e {
                VerifyError::Cancelled => PipelineError::Cancelled,
                other => PipelineError::Verify(other),
            })?;

        let blur = SharpnessScorer::score(&outcome.photo);

        result.brands_detected = outcome.initial.brands.clone();
        result.risk_score = Some(outcome.final_assessment.risk_score);
        result.passes_used = outcome.passes_used;
        result.fallback_blur_used = outcome.fallback_used;
        result.blur_score = Some(blur.blur_score);
        result.unmatched_elements = outcome.unmatched.clone();
        result.history = outcome.history.clone();
        result.passes = outcome.passes.clone();
        result.status = self.resolve_status(&outcome, &blur);

        if outcome.verdict == Verdict::NeedsReview {
            result.error = Some(
                PipelineError::ExhaustedPasses {
                    passes: outcome.passes_used,
                    risk_score: outcome.final_assessment.risk_score,
                }
                .to_string(),
            );
        }

        if outcome.edited() {
            result.edited_image_ref = Some(self.persist_artifact(&product.id, &outcome.photo)?);
        }

        Ok(())
    }

    /// Map a verification outcome onto a product status
    pub fn resolve_status(&self, outcome: &VerifyOutcome, blur: &BlurMetric) -> AnalysisStatus {
        if outcome.verdict == Verdict::NeedsReview {
            return self.options.exhausted_status.into();
        }
        if !outcome.edited() {
            return AnalysisStatus::Clean;
        }
        if outcome.fallback_used && !self.options.treat_fallback_blur_as_clean {
            return AnalysisStatus::BlurApplied;
        }
        if blur.is_significant(self.options.blur_significance_threshold) {
            return AnalysisStatus::BlurApplied;
        }
        AnalysisStatus::Clean
    }

    /// Write the edited image and return its reference
    fn persist_artifact(&self, product_id: &str, photo: &Photograph) -> Result<String, PipelineError> {
        let digest = photo.digest();

        let Some(dir) = &self.options.output_dir else {
            return Ok(format!("sha256:{}", digest));
        };

        std::fs::create_dir_all(dir).map_err(|e| {
            PipelineError::Artifact(format!("{}: {}", dir.display(), e))
        })?;

        let short = &digest[..ARTIFACT_DIGEST_LEN.min(digest.len())];
        let path = dir.join(format!("{}-{}.png", file_safe(product_id), short));
        photo.save(&path)?;

        debug!("Wrote edited image {}", path.display());
        Ok(path.to_string_lossy().into_owned())
    }

    fn save(&self, result: &AnalysisResult) -> Result<(), StoreError> {
        self.store.upsert(result).map_err(|e| {
            warn!("Could not store result for {}: {}", result.product_id, e);
            e
        })
    }
}

/// Append a message to the result's error text
fn note_error(result: &mut AnalysisResult, message: String) {
    result.error = Some(match result.error.take() {
        Some(existing) => format!("{}; {}", existing, message),
        None => message,
    });
}

/// Replace characters that are unsafe in file names
fn file_safe(id: &str) -> String {
    id.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::RiskAssessment;
    use crate::store::MemoryStore;
    use crate::verify::VerifyState;
    use image::RgbImage;

    struct NoDetector;

    impl BrandDetector for NoDetector {
        fn detect_regions(
            &self,
            _photo: &Photograph,
            _hints: &[String],
        ) -> crate::detection::Result<Vec<crate::detection::DetectedRegion>> {
            Ok(Vec::new())
        }

        fn assess_risk(&self, _photo: &Photograph) -> crate::detection::Result<RiskAssessment> {
            Ok(RiskAssessment::default())
        }
    }

    struct NoEditor;

    impl ImageEditor for NoEditor {
        fn edit(
            &self,
            photo: &Photograph,
            _instruction: &str,
            _category: Option<&str>,
        ) -> crate::edit::Result<Photograph> {
            Ok(photo.clone())
        }
    }

    struct ReadOnlyStore;

    impl AnalysisStore for ReadOnlyStore {
        fn upsert(&self, _result: &AnalysisResult) -> Result<(), StoreError> {
            Err(StoreError::Storage("read-only".into()))
        }

        fn get(&self, _product_id: &str) -> Result<Option<AnalysisResult>, StoreError> {
            Ok(None)
        }

        fn list(&self) -> Result<Vec<AnalysisResult>, StoreError> {
            Ok(Vec::new())
        }

        fn flush(&self) -> Result<(), StoreError> {
            Ok(())
        }
    }

    fn pipeline(options: PipelineOptions) -> ProductPipeline {
        ProductPipeline::new(
            Arc::new(NoDetector),
            Arc::new(NoEditor),
            Arc::new(MemoryStore::new()),
            VerificationLoop::default(),
            options,
        )
    }

    fn outcome(verdict: Verdict, passes: u32, fallback: bool) -> VerifyOutcome {
        VerifyOutcome {
            verdict,
            passes_used: passes,
            fallback_used: fallback,
            exhausted: verdict == Verdict::NeedsReview,
            initial: RiskAssessment::default(),
            final_assessment: RiskAssessment::default(),
            photo: Photograph::from_rgb(RgbImage::new(4, 4)),
            strategies: Vec::new(),
            unmatched: Vec::new(),
            history: vec![VerifyState::Detecting],
            passes: Vec::new(),
        }
    }

    #[test]
    fn test_status_rule() {
        let p = pipeline(PipelineOptions::default());
        let sharp = BlurMetric::from_sharpness(1000.0);
        let blurry = BlurMetric::from_sharpness(10.0);

        assert_eq!(
            p.resolve_status(&outcome(Verdict::Clean, 0, false), &blurry),
            AnalysisStatus::Clean
        );
        assert_eq!(
            p.resolve_status(&outcome(Verdict::Clean, 2, false), &sharp),
            AnalysisStatus::Clean
        );
        assert_eq!(
            p.resolve_status(&outcome(Verdict::Clean, 2, false), &blurry),
            AnalysisStatus::BlurApplied
        );
        assert_eq!(
            p.resolve_status(&outcome(Verdict::Clean, 3, true), &sharp),
            AnalysisStatus::BlurApplied
        );
        assert_eq!(
            p.resolve_status(&outcome(Verdict::NeedsReview, 3, false), &sharp),
            AnalysisStatus::NeedsReview
        );
    }

    #[test]
    fn test_status_policy_flags() {
        let p = pipeline(PipelineOptions {
            treat_fallback_blur_as_clean: true,
            exhausted_status: ExhaustedStatus::Failed,
            ..Default::default()
        });
        let sharp = BlurMetric::from_sharpness(1000.0);

        assert_eq!(
            p.resolve_status(&outcome(Verdict::Clean, 3, true), &sharp),
            AnalysisStatus::Clean
        );
        assert_eq!(
            p.resolve_status(&outcome(Verdict::NeedsReview, 3, false), &sharp),
            AnalysisStatus::Failed
        );
    }

    #[test]
    fn test_store_failure_is_recorded_on_result() {
        let p = ProductPipeline::new(
            Arc::new(NoDetector),
            Arc::new(NoEditor),
            Arc::new(ReadOnlyStore),
            VerificationLoop::default(),
            PipelineOptions::default(),
        );
        let product = Product::new("p1", "Runner", "/nonexistent/p1.png");
        let result = p.run(&product, &CancelToken::new());

        assert_eq!(result.status, AnalysisStatus::Failed);
        let error = result.error.unwrap();
        assert!(error.contains("not found"));
        assert!(error.ends_with("Result not stored: Storage error: read-only"));
    }

    #[test]
    fn test_note_error_appends() {
        let mut result = AnalysisResult::pending("p1");
        note_error(&mut result, "first".into());
        note_error(&mut result, "second".into());
        assert_eq!(result.error.as_deref(), Some("first; second"));
    }

    #[test]
    fn test_missing_image_fails_with_worst_blur() {
        let p = pipeline(PipelineOptions::default());
        let product = Product::new("p1", "Runner", "/nonexistent/p1.png");
        let result = p.run(&product, &CancelToken::new());

        assert_eq!(result.status, AnalysisStatus::Failed);
        assert_eq!(result.blur_score, Some(100));
        assert!(result.error.unwrap().contains("not found"));
        assert_eq!(
            p.store().get("p1").unwrap().unwrap().status,
            AnalysisStatus::Failed
        );
    }

    #[test]
    fn test_artifact_reference_without_output_dir() {
        let p = pipeline(PipelineOptions::default());
        let photo = Photograph::from_rgb(RgbImage::new(4, 4));
        let reference = p.persist_artifact("p1", &photo).unwrap();
        assert_eq!(reference, format!("sha256:{}", photo.digest()));
    }

    #[test]
    fn test_artifact_written_to_output_dir() {
        let dir = tempfile::tempdir().unwrap();
        let p = pipeline(PipelineOptions {
            output_dir: Some(dir.path().join("out")),
            ..Default::default()
        });
        let photo = Photograph::from_rgb(RgbImage::new(4, 4));
        let reference = p.persist_artifact("sku/42", &photo).unwrap();

        let expected = dir
            .path()
            .join("out")
            .join(format!("sku_42-{}.png", &photo.digest()[..12]));
        assert_eq!(PathBuf::from(&reference), expected);
        assert!(expected.exists());
    }
}
