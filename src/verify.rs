//! Verification loop
//!
//! Drives one photograph through bounded (detect, edit, re-detect) passes
//! until the detector judges it clean or the pass budget runs out.
//!
//! # State machine
//!
//! ```text
//! Detecting -> Clean
//!           -> NeedsEdit -> Editing -> ReDetecting -> Clean
//!                                                  -> NeedsAnotherPass -> NeedsEdit
//!                                                  -> GiveUp -> FallbackBlur -> Clean | NeedsReview
//!                                                            -> NeedsReview
//! ```
//!
//! The editor is invoked at most `max_passes` times per run, whatever the
//! detector answers.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use tracing::{debug, info};

use crate::cancel::CancelToken;
use crate::detection::{BrandDetector, DetectionError, RiskAssessment};
use crate::edit::{EditError, ImageEditor};
use crate::mask::MaskEngine;
use crate::photo::Photograph;
use crate::region::BoundingBox;
use crate::strategy::{EditStrategy, StrategyClassifier};

// ============================================================
// Constants
// ============================================================

/// Default clean-risk threshold (risk must be strictly below)
pub const DEFAULT_CLEAN_RISK_THRESHOLD: u8 = 30;

/// Default maximum edit passes
pub const DEFAULT_MAX_PASSES: u32 = 3;

/// Hard cap on edit passes
pub const MAX_PASSES_LIMIT: u32 = 10;

// ============================================================
// Error Types
// ============================================================

/// Verification error types
#[derive(Debug, Error)]
pub enum VerifyError {
    #[error(transparent)]
    Detection(#[from] DetectionError),

    #[error(transparent)]
    Edit(#[from] EditError),

    #[error("Verification cancelled")]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, VerifyError>;

// ============================================================
// Types
// ============================================================

/// Verification states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerifyState {
    Detecting,
    NeedsEdit,
    Editing,
    ReDetecting,
    NeedsAnotherPass,
    GiveUp,
    FallbackBlur,
    Clean,
    NeedsReview,
}

impl fmt::Display for VerifyState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            VerifyState::Detecting => "detecting",
            VerifyState::NeedsEdit => "needs_edit",
            VerifyState::Editing => "editing",
            VerifyState::ReDetecting => "re_detecting",
            VerifyState::NeedsAnotherPass => "needs_another_pass",
            VerifyState::GiveUp => "give_up",
            VerifyState::FallbackBlur => "fallback_blur",
            VerifyState::Clean => "clean",
            VerifyState::NeedsReview => "needs_review",
        };
        write!(f, "{}", name)
    }
}

/// Terminal verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Clean,
    NeedsReview,
}

/// Options for the verification loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifyOptions {
    /// Risk scores strictly below this (with no brands) are clean
    pub clean_risk_threshold: u8,

    /// Maximum edit passes before giving up
    pub max_passes: u32,

    /// Run the deterministic region blur after giving up
    pub fallback_blur: bool,

    /// Later passes only target elements the last detection still reports
    pub narrow_instructions: bool,
}

impl Default for VerifyOptions {
    fn default() -> Self {
        Self {
            clean_risk_threshold: DEFAULT_CLEAN_RISK_THRESHOLD,
            max_passes: DEFAULT_MAX_PASSES,
            fallback_blur: true,
            narrow_instructions: true,
        }
    }
}

impl VerifyOptions {
    /// Create a builder
    pub fn builder() -> VerifyOptionsBuilder {
        VerifyOptionsBuilder::default()
    }
}

/// Builder for VerifyOptions
#[derive(Debug, Default)]
pub struct VerifyOptionsBuilder {
    options: VerifyOptions,
}

impl VerifyOptionsBuilder {
    /// Set clean-risk threshold (0..=100)
    #[must_use]
    pub fn clean_risk_threshold(mut self, threshold: u8) -> Self {
        self.options.clean_risk_threshold = threshold.min(100);
        self
    }

    /// Set maximum passes (1..=10)
    #[must_use]
    pub fn max_passes(mut self, passes: u32) -> Self {
        self.options.max_passes = passes.clamp(1, MAX_PASSES_LIMIT);
        self
    }

    /// Enable or disable the fallback blur
    #[must_use]
    pub fn fallback_blur(mut self, enabled: bool) -> Self {
        self.options.fallback_blur = enabled;
        self
    }

    /// Enable or disable instruction narrowing
    #[must_use]
    pub fn narrow_instructions(mut self, enabled: bool) -> Self {
        self.options.narrow_instructions = enabled;
        self
    }

    /// Build the options
    #[must_use]
    pub fn build(self) -> VerifyOptions {
        self.options
    }
}

/// One edit-then-redetect pass
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PassRecord {
    /// 1-based pass number
    pub pass: u32,
    pub instruction: String,
    pub risk_score: u8,
    pub brands: Vec<String>,
}

/// Everything a run produced
#[derive(Debug, Clone)]
pub struct VerifyOutcome {
    pub verdict: Verdict,

    /// Edit passes executed
    pub passes_used: u32,

    /// Whether the deterministic blur was applied
    pub fallback_used: bool,

    /// Whether the pass budget ran out while still flagged
    pub exhausted: bool,

    /// First assessment of the untouched photograph
    pub initial: RiskAssessment,

    /// Last assessment taken
    pub final_assessment: RiskAssessment,

    /// Final photograph (the input when nothing was edited)
    pub photo: Photograph,

    /// Strategies of the last pass
    pub strategies: Vec<EditStrategy>,

    /// Labels no classification rule recognized, across all passes
    pub unmatched: Vec<String>,

    /// States visited, in order
    pub history: Vec<VerifyState>,

    pub passes: Vec<PassRecord>,
}

impl VerifyOutcome {
    /// Whether the photograph differs from the input
    pub fn edited(&self) -> bool {
        self.passes_used > 0 || self.fallback_used
    }
}

// ============================================================
// Loop
// ============================================================

/// Mutable state of one run
struct Run {
    photo: Photograph,
    initial: Option<RiskAssessment>,
    latest: RiskAssessment,
    instruction: String,
    strategies: Vec<EditStrategy>,
    unmatched: Vec<String>,
    passes_used: u32,
    fallback_used: bool,
    exhausted: bool,
    history: Vec<VerifyState>,
    passes: Vec<PassRecord>,
}

impl Run {
    fn new(photo: Photograph) -> Self {
        Self {
            photo,
            initial: None,
            latest: RiskAssessment::default(),
            instruction: String::new(),
            strategies: Vec::new(),
            unmatched: Vec::new(),
            passes_used: 0,
            fallback_used: false,
            exhausted: false,
            history: Vec::new(),
            passes: Vec::new(),
        }
    }

    fn finish(self, verdict: Verdict) -> VerifyOutcome {
        let initial = self.initial.unwrap_or_else(|| self.latest.clone());
        VerifyOutcome {
            verdict,
            passes_used: self.passes_used,
            fallback_used: self.fallback_used,
            exhausted: self.exhausted,
            initial,
            final_assessment: self.latest,
            photo: self.photo,
            strategies: self.strategies,
            unmatched: self.unmatched,
            history: self.history,
            passes: self.passes,
        }
    }
}

/// Bounded generate-verify loop
#[derive(Debug, Clone, Default)]
pub struct VerificationLoop {
    options: VerifyOptions,
    classifier: StrategyClassifier,
    mask: MaskEngine,
}

impl VerificationLoop {
    pub fn new(options: VerifyOptions, classifier: StrategyClassifier, mask: MaskEngine) -> Self {
        Self {
            options,
            classifier,
            mask,
        }
    }

    pub fn options(&self) -> &VerifyOptions {
        &self.options
    }

    /// Run the loop on `photo`
    ///
    /// Detector and editor failures abort the run. Running out of passes is
    /// not an error: it ends in [`Verdict::NeedsReview`] unless the fallback
    /// blur clears verification.
    pub fn run(
        &self,
        detector: &dyn BrandDetector,
        editor: &dyn ImageEditor,
        photo: &Photograph,
        category: Option<&str>,
        cancel: &CancelToken,
    ) -> Result<VerifyOutcome> {
        let threshold = self.options.clean_risk_threshold;
        let mut run = Run::new(photo.clone());
        let mut state = VerifyState::Detecting;

        loop {
            run.history.push(state);
            debug!("Verification state: {}", state);

            state = match state {
                VerifyState::Detecting => {
                    let assessment = detector.assess_risk(&run.photo)?;
                    debug!(
                        "Initial risk {} with {} brand(s)",
                        assessment.risk_score,
                        assessment.brands.len()
                    );
                    let clean = assessment.is_clean(threshold);
                    run.initial = Some(assessment.clone());
                    run.latest = assessment;
                    if clean {
                        VerifyState::Clean
                    } else {
                        VerifyState::NeedsEdit
                    }
                }

                VerifyState::NeedsEdit => {
                    if cancel.is_cancelled() {
                        return Err(VerifyError::Cancelled);
                    }
                    if run.passes_used >= self.options.max_passes {
                        VerifyState::GiveUp
                    } else {
                        let labels = self.target_labels(&run);
                        let plan = self.classifier.plan(&labels);
                        for label in plan.unmatched_labels() {
                            if !run.unmatched.contains(&label) {
                                run.unmatched.push(label);
                            }
                        }
                        run.instruction = plan.instruction;
                        run.strategies = plan.strategies;
                        VerifyState::Editing
                    }
                }

                VerifyState::Editing => {
                    run.photo = editor.edit(&run.photo, &run.instruction, category)?;
                    run.passes_used += 1;
                    VerifyState::ReDetecting
                }

                VerifyState::ReDetecting => {
                    let assessment = detector.assess_risk(&run.photo)?;
                    debug!(
                        "Pass {} risk {} with {} brand(s)",
                        run.passes_used,
                        assessment.risk_score,
                        assessment.brands.len()
                    );
                    run.passes.push(PassRecord {
                        pass: run.passes_used,
                        instruction: run.instruction.clone(),
                        risk_score: assessment.risk_score,
                        brands: assessment.brands.clone(),
                    });
                    let clean = assessment.is_clean(threshold);
                    run.latest = assessment;

                    if clean {
                        VerifyState::Clean
                    } else if run.passes_used < self.options.max_passes {
                        VerifyState::NeedsAnotherPass
                    } else {
                        VerifyState::GiveUp
                    }
                }

                VerifyState::NeedsAnotherPass => VerifyState::NeedsEdit,

                VerifyState::GiveUp => {
                    run.exhausted = true;
                    if self.options.fallback_blur {
                        VerifyState::FallbackBlur
                    } else {
                        VerifyState::NeedsReview
                    }
                }

                VerifyState::FallbackBlur => {
                    if cancel.is_cancelled() {
                        return Err(VerifyError::Cancelled);
                    }
                    self.fallback_blur(detector, &mut run)?
                }

                VerifyState::Clean => {
                    info!("Verification clean after {} pass(es)", run.passes_used);
                    return Ok(run.finish(Verdict::Clean));
                }

                VerifyState::NeedsReview => {
                    info!(
                        "Verification needs review after {} pass(es), risk {}",
                        run.passes_used, run.latest.risk_score
                    );
                    return Ok(run.finish(Verdict::NeedsReview));
                }
            };
        }
    }

    /// Labels the next pass should target
    fn target_labels(&self, run: &Run) -> Vec<String> {
        match (&run.initial, self.options.narrow_instructions) {
            (Some(initial), false) => initial.labels(),
            _ => run.latest.labels(),
        }
    }

    fn fallback_blur(&self, detector: &dyn BrandDetector, run: &mut Run) -> Result<VerifyState> {
        let regions = detector.detect_regions(&run.photo, &run.latest.brands)?;
        let boxes: Vec<BoundingBox> = regions.iter().map(|r| r.bbox).collect();
        let outcome = self.mask.apply_region_blur(&run.photo, &boxes);

        if !outcome.modified() {
            debug!("Fallback blur found nothing to blur");
            return Ok(VerifyState::NeedsReview);
        }

        run.photo = outcome.photo;
        run.fallback_used = true;

        let assessment = detector.assess_risk(&run.photo)?;
        debug!(
            "Fallback blur over {} region(s), risk now {}",
            outcome.regions_applied, assessment.risk_score
        );
        let clean = assessment.is_clean(self.options.clean_risk_threshold);
        run.latest = assessment;

        Ok(if clean {
            VerifyState::Clean
        } else {
            VerifyState::NeedsReview
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::{DetectedRegion, RegionKind};
    use crate::strategy::StrategyType;
    use image::{Rgb, RgbImage};
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Returns scripted assessments; the last one repeats
    struct ScriptedDetector {
        script: Mutex<VecDeque<RiskAssessment>>,
        regions: Vec<DetectedRegion>,
        fail: bool,
    }

    impl ScriptedDetector {
        fn new(script: Vec<RiskAssessment>) -> Self {
            Self {
                script: Mutex::new(script.into()),
                regions: Vec::new(),
                fail: false,
            }
        }
    }

    impl BrandDetector for ScriptedDetector {
        fn detect_regions(
            &self,
            _photo: &Photograph,
            _hints: &[String],
        ) -> crate::detection::Result<Vec<DetectedRegion>> {
            Ok(self.regions.clone())
        }

        fn assess_risk(&self, _photo: &Photograph) -> crate::detection::Result<RiskAssessment> {
            if self.fail {
                return Err(DetectionError::Failed("offline".into()));
            }
            let mut script = self.script.lock().unwrap();
            if script.len() > 1 {
                Ok(script.pop_front().unwrap())
            } else {
                Ok(script.front().cloned().unwrap_or_default())
            }
        }
    }

    #[derive(Default)]
    struct RecordingEditor {
        instructions: Mutex<Vec<String>>,
        fail: bool,
    }

    impl ImageEditor for RecordingEditor {
        fn edit(
            &self,
            photo: &Photograph,
            instruction: &str,
            _category: Option<&str>,
        ) -> crate::edit::Result<Photograph> {
            if self.fail {
                return Err(EditError::Failed("editor down".into()));
            }
            self.instructions.lock().unwrap().push(instruction.to_string());
            Ok(photo.clone())
        }
    }

    fn photo() -> Photograph {
        Photograph::from_rgb(RgbImage::from_fn(40, 40, |x, y| {
            if (x + y) % 2 == 0 {
                Rgb([250, 250, 250])
            } else {
                Rgb([5, 5, 5])
            }
        }))
    }

    fn flagged(score: i64, brands: &[&str], elements: &[&str]) -> RiskAssessment {
        RiskAssessment::new(
            brands.iter().map(|s| s.to_string()).collect(),
            score,
            elements.iter().map(|s| s.to_string()).collect(),
        )
    }

    fn clean(score: i64) -> RiskAssessment {
        flagged(score, &[], &[])
    }

    fn no_fallback() -> VerificationLoop {
        VerificationLoop::new(
            VerifyOptions::builder().fallback_blur(false).build(),
            StrategyClassifier::default(),
            MaskEngine::default(),
        )
    }

    #[test]
    fn test_clean_on_first_detection_skips_editor() {
        let detector = ScriptedDetector::new(vec![clean(10)]);
        let editor = RecordingEditor::default();
        let outcome = VerificationLoop::default()
            .run(&detector, &editor, &photo(), None, &CancelToken::new())
            .unwrap();

        assert_eq!(outcome.verdict, Verdict::Clean);
        assert_eq!(outcome.passes_used, 0);
        assert!(!outcome.edited());
        assert!(editor.instructions.lock().unwrap().is_empty());
        assert_eq!(outcome.history, vec![VerifyState::Detecting, VerifyState::Clean]);
    }

    #[test]
    fn test_clean_after_second_pass() {
        let detector = ScriptedDetector::new(vec![
            flagged(80, &["Nike"], &["Nike swoosh", "SPLY-350 text"]),
            flagged(50, &["Nike"], &["Nike swoosh"]),
            clean(5),
        ]);
        let editor = RecordingEditor::default();
        let outcome = VerificationLoop::default()
            .run(&detector, &editor, &photo(), Some("shoes"), &CancelToken::new())
            .unwrap();

        assert_eq!(outcome.verdict, Verdict::Clean);
        assert_eq!(outcome.passes_used, 2);
        assert_eq!(outcome.passes.len(), 2);
        assert_eq!(outcome.passes[0].risk_score, 50);
        assert_eq!(outcome.initial.risk_score, 80);
        assert_eq!(outcome.final_assessment.risk_score, 5);

        // Second pass narrowed to the remaining element
        let instructions = editor.instructions.lock().unwrap();
        assert!(instructions[0].contains("SPLY-350 text"));
        assert!(!instructions[1].contains("SPLY-350 text"));
        assert!(instructions[1].contains("Nike swoosh"));
    }

    #[test]
    fn test_without_narrowing_reuses_initial_labels() {
        let detector = ScriptedDetector::new(vec![
            flagged(80, &["Nike"], &["Nike swoosh", "SPLY-350 text"]),
            flagged(50, &["Nike"], &["Nike swoosh"]),
            clean(5),
        ]);
        let editor = RecordingEditor::default();
        let verifier = VerificationLoop::new(
            VerifyOptions::builder().narrow_instructions(false).build(),
            StrategyClassifier::default(),
            MaskEngine::default(),
        );
        verifier
            .run(&detector, &editor, &photo(), None, &CancelToken::new())
            .unwrap();

        let instructions = editor.instructions.lock().unwrap();
        assert!(instructions[1].contains("SPLY-350 text"));
    }

    #[test]
    fn test_brand_only_assessment_targets_logo() {
        let detector = ScriptedDetector::new(vec![flagged(80, &["Nike"], &[]), clean(5)]);
        let editor = RecordingEditor::default();
        let outcome = VerificationLoop::default()
            .run(&detector, &editor, &photo(), None, &CancelToken::new())
            .unwrap();

        assert_eq!(outcome.verdict, Verdict::Clean);
        assert!(outcome.unmatched.is_empty());
        assert_eq!(outcome.strategies[0].strategy_type, StrategyType::Logo);
        let instructions = editor.instructions.lock().unwrap();
        assert!(instructions[0].contains("Nike logo"));
    }

    #[test]
    fn test_terminates_within_max_passes() {
        for max in 1..=4 {
            let detector = ScriptedDetector::new(vec![flagged(90, &["Nike"], &["Nike logo"])]);
            let editor = RecordingEditor::default();
            let verifier = VerificationLoop::new(
                VerifyOptions::builder()
                    .max_passes(max)
                    .fallback_blur(false)
                    .build(),
                StrategyClassifier::default(),
                MaskEngine::default(),
            );
            let outcome = verifier
                .run(&detector, &editor, &photo(), None, &CancelToken::new())
                .unwrap();

            assert_eq!(outcome.verdict, Verdict::NeedsReview);
            assert!(outcome.exhausted);
            assert_eq!(outcome.passes_used, max);
            assert_eq!(editor.instructions.lock().unwrap().len(), max as usize);
        }
    }

    #[test]
    fn test_brands_alone_keep_image_flagged() {
        let detector = ScriptedDetector::new(vec![flagged(5, &["Nike"], &[])]);
        let editor = RecordingEditor::default();
        let outcome = no_fallback()
            .run(&detector, &editor, &photo(), None, &CancelToken::new())
            .unwrap();
        assert_eq!(outcome.verdict, Verdict::NeedsReview);
    }

    #[test]
    fn test_fallback_blur_clears() {
        let mut detector = ScriptedDetector::new(vec![
            flagged(90, &["Nike"], &["Nike logo"]),
            flagged(90, &["Nike"], &["Nike logo"]),
            flagged(90, &["Nike"], &["Nike logo"]),
            flagged(90, &["Nike"], &["Nike logo"]),
            clean(10),
        ]);
        detector.regions = vec![DetectedRegion {
            kind: RegionKind::Logo,
            label: "Nike logo".into(),
            confidence: 0.9,
            bbox: BoundingBox::new(5, 5, 20, 20),
        }];
        let editor = RecordingEditor::default();
        let source = photo();
        let outcome = VerificationLoop::default()
            .run(&detector, &editor, &source, None, &CancelToken::new())
            .unwrap();

        assert_eq!(outcome.verdict, Verdict::Clean);
        assert!(outcome.fallback_used);
        assert!(outcome.exhausted);
        assert_eq!(outcome.passes_used, DEFAULT_MAX_PASSES);
        assert_ne!(outcome.photo, source);
        assert!(outcome.history.contains(&VerifyState::FallbackBlur));
    }

    #[test]
    fn test_fallback_with_no_regions_needs_review() {
        let detector = ScriptedDetector::new(vec![flagged(90, &["Nike"], &["Nike logo"])]);
        let editor = RecordingEditor::default();
        let outcome = VerificationLoop::default()
            .run(&detector, &editor, &photo(), None, &CancelToken::new())
            .unwrap();

        assert_eq!(outcome.verdict, Verdict::NeedsReview);
        assert!(!outcome.fallback_used);
    }

    #[test]
    fn test_unmatched_labels_collected() {
        let detector = ScriptedDetector::new(vec![
            flagged(70, &["Acme"], &["Acme logo", "mystery hologram"]),
            clean(0),
        ]);
        let editor = RecordingEditor::default();
        let outcome = VerificationLoop::default()
            .run(&detector, &editor, &photo(), None, &CancelToken::new())
            .unwrap();
        assert_eq!(outcome.unmatched, vec!["mystery hologram".to_string()]);
    }

    #[test]
    fn test_detection_error_propagates() {
        let mut detector = ScriptedDetector::new(vec![clean(0)]);
        detector.fail = true;
        let result = VerificationLoop::default().run(
            &detector,
            &RecordingEditor::default(),
            &photo(),
            None,
            &CancelToken::new(),
        );
        assert!(matches!(result, Err(VerifyError::Detection(_))));
    }

    #[test]
    fn test_edit_error_propagates() {
        let detector = ScriptedDetector::new(vec![flagged(90, &["Nike"], &["Nike logo"])]);
        let editor = RecordingEditor {
            fail: true,
            ..Default::default()
        };
        let result =
            VerificationLoop::default().run(&detector, &editor, &photo(), None, &CancelToken::new());
        assert!(matches!(result, Err(VerifyError::Edit(_))));
    }

    #[test]
    fn test_cancelled_before_edit() {
        let detector = ScriptedDetector::new(vec![flagged(90, &["Nike"], &["Nike logo"])]);
        let editor = RecordingEditor::default();
        let cancel = CancelToken::new();
        cancel.cancel();

        let result = VerificationLoop::default().run(&detector, &editor, &photo(), None, &cancel);
        assert!(matches!(result, Err(VerifyError::Cancelled)));
        assert!(editor.instructions.lock().unwrap().is_empty());
    }

    #[test]
    fn test_builder_clamps_passes() {
        assert_eq!(VerifyOptions::builder().max_passes(0).build().max_passes, 1);
        assert_eq!(
            VerifyOptions::builder().max_passes(99).build().max_passes,
            MAX_PASSES_LIMIT
        );
    }
}
