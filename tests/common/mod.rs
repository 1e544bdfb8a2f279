//! Shared fixtures for integration tests
//!
//! Product images carry a scenario marker in the red channel of pixel
//! (0, 0). The mock detector reads it to decide how to answer; the mock
//! editor flags its output by setting the green channel of that pixel.

#![allow(dead_code)]

use brandscrub::{
    BoundingBox, BrandDetector, CancelToken, DetectedRegion, DetectionError, EditError, ImageEditor,
    MaskEngine, MaskOptions, MemoryStore, Photograph, PipelineOptions, Product, ProductPipeline,
    RegionKind, RiskAssessment, StrategyClassifier, TitleRewriter, VerificationLoop,
    VerifyOptions,
};
use image::{Rgb, RgbImage};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Detector reports risk 10 and no brands
pub const MARKER_CLEAN: u8 = 0;
/// Detector fails
pub const MARKER_DETECTOR_FAILS: u8 = 1;
/// Flagged until the editor has touched the image
pub const MARKER_CLEARS_AFTER_EDIT: u8 = 2;
/// Always flagged
pub const MARKER_STUBBORN: u8 = 3;
/// Flagged until a blur covers pixel (0, 0)
pub const MARKER_CLEARS_AFTER_BLUR: u8 = 4;

const EDITED: u8 = 255;

fn marker(photo: &Photograph) -> u8 {
    photo.pixels().get_pixel(0, 0).0[0]
}

fn was_edited(photo: &Photograph) -> bool {
    photo.pixels().get_pixel(0, 0).0[1] == EDITED
}

fn flagged() -> RiskAssessment {
    RiskAssessment::new(
        vec!["Nike".into()],
        80,
        vec!["Nike swoosh".into(), "SPLY-350 text".into()],
    )
}

fn clean(score: i64) -> RiskAssessment {
    RiskAssessment::new(Vec::new(), score, Vec::new())
}

/// Detector driven by the image marker
#[derive(Default)]
pub struct MarkerDetector {
    pub assess_calls: AtomicUsize,
    pub region_calls: AtomicUsize,
}

impl BrandDetector for MarkerDetector {
    fn detect_regions(
        &self,
        photo: &Photograph,
        _brand_hints: &[String],
    ) -> brandscrub::detection::Result<Vec<DetectedRegion>> {
        self.region_calls.fetch_add(1, Ordering::SeqCst);
        // Only the blur scenario gets a box covering the marker pixel
        let bbox = if marker(photo) == MARKER_CLEARS_AFTER_BLUR {
            BoundingBox::new(0, 0, 16, 16)
        } else {
            BoundingBox::new(16, 16, 16, 16)
        };
        Ok(vec![DetectedRegion {
            kind: RegionKind::Logo,
            label: "Nike swoosh".into(),
            confidence: 0.9,
            bbox,
        }])
    }

    fn assess_risk(&self, photo: &Photograph) -> brandscrub::detection::Result<RiskAssessment> {
        self.assess_calls.fetch_add(1, Ordering::SeqCst);
        match marker(photo) {
            MARKER_CLEAN => Ok(clean(10)),
            MARKER_DETECTOR_FAILS => Err(DetectionError::Failed("vision service offline".into())),
            MARKER_CLEARS_AFTER_EDIT if was_edited(photo) => Ok(clean(5)),
            MARKER_CLEARS_AFTER_EDIT | MARKER_STUBBORN | MARKER_CLEARS_AFTER_BLUR => {
                Ok(flagged())
            }
            // After a blur the marker pixel no longer holds the exact value
            _ => Ok(clean(0)),
        }
    }
}

/// Editor that marks its output and counts calls
#[derive(Default)]
pub struct MarkingEditor {
    pub calls: AtomicUsize,
}

impl MarkingEditor {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ImageEditor for MarkingEditor {
    fn edit(
        &self,
        photo: &Photograph,
        instruction: &str,
        _category: Option<&str>,
    ) -> brandscrub::edit::Result<Photograph> {
        brandscrub::edit::validate_instruction(instruction)?;
        self.calls.fetch_add(1, Ordering::SeqCst);

        let mut pixels = photo.pixels().clone();
        let mut p = *pixels.get_pixel(0, 0);
        p.0[1] = EDITED;
        pixels.put_pixel(0, 0, p);
        Ok(Photograph::from_rgb(pixels))
    }
}

/// Editor that trips a cancel token while it edits
pub struct CancellingEditor {
    pub inner: MarkingEditor,
    pub cancel: CancelToken,
}

impl CancellingEditor {
    pub fn new(cancel: CancelToken) -> Self {
        Self {
            inner: MarkingEditor::default(),
            cancel,
        }
    }
}

impl ImageEditor for CancellingEditor {
    fn edit(
        &self,
        photo: &Photograph,
        instruction: &str,
        category: Option<&str>,
    ) -> brandscrub::edit::Result<Photograph> {
        self.cancel.cancel();
        self.inner.edit(photo, instruction, category)
    }
}

/// Title rewriter that always fails
pub struct FailingTitles;

impl TitleRewriter for FailingTitles {
    fn rewrite(&self, _title: &str, _category: Option<&str>) -> brandscrub::edit::Result<String> {
        Err(EditError::Failed("title service down".into()))
    }
}

/// Title rewriter that strips the word "Nike"
pub struct StripBrandTitles;

impl TitleRewriter for StripBrandTitles {
    fn rewrite(&self, title: &str, _category: Option<&str>) -> brandscrub::edit::Result<String> {
        Ok(title.replace("Nike ", ""))
    }
}

/// Sharp 32x32 checkerboard with the scenario marker at (0, 0)
pub fn product_image(marker: u8) -> RgbImage {
    let mut img = RgbImage::from_fn(32, 32, |x, y| {
        if (x + y) % 2 == 0 {
            Rgb([200, 200, 200])
        } else {
            Rgb([20, 20, 20])
        }
    });
    img.put_pixel(0, 0, Rgb([marker, 0, 0]));
    img
}

/// Write a product image and return its product record
pub fn write_product(dir: &Path, id: &str, marker: u8) -> Product {
    let path = dir.join(format!("{}.png", id));
    product_image(marker)
        .save(&path)
        .expect("write product image");
    Product::new(id, format!("Nike Runner {}", id), path).with_category("shoes")
}

/// Write raw bytes as a product image
pub fn write_broken_product(dir: &Path, id: &str) -> Product {
    let path: PathBuf = dir.join(format!("{}.png", id));
    std::fs::write(&path, b"definitely not a png").expect("write broken image");
    Product::new(id, "Broken", path)
}

/// Pipeline over the marker mocks with an in-memory store
pub struct Harness {
    pub detector: Arc<MarkerDetector>,
    pub editor: Arc<MarkingEditor>,
    pub store: Arc<MemoryStore>,
    pub pipeline: ProductPipeline,
}

impl Harness {
    pub fn new(verify: VerifyOptions, options: PipelineOptions) -> Self {
        let detector = Arc::new(MarkerDetector::default());
        let editor = Arc::new(MarkingEditor::default());
        let store = Arc::new(MemoryStore::new());

        let verifier = VerificationLoop::new(
            verify,
            StrategyClassifier::default(),
            MaskEngine::new(MaskOptions::default()),
        );
        let pipeline = ProductPipeline::new(
            detector.clone(),
            editor.clone(),
            store.clone(),
            verifier,
            options,
        );

        Self {
            detector,
            editor,
            store,
            pipeline,
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(VerifyOptions::default(), PipelineOptions::default())
    }
}
