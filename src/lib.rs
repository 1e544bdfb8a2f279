//! brandscrub - brand-mark sanitization for product photographs
//!
//! Detects logos, wordmarks and trade-dress patterns in product photos,
//! removes them through a generative editor, verifies the result, and falls
//! back to deterministic region blur when editing is not enough.
//!
//! # Modules
//!
//! - [`sharpness`] - Laplacian blur metric
//! - [`detection`] - brand/region detector adapters
//! - [`strategy`] - label classification into edit instructions
//! - [`mask`] - region blur engine
//! - [`edit`] - generative editor and title rewriter adapters
//! - [`verify`] - bounded detect/edit/re-detect loop
//! - [`pipeline`] - per-product state machine
//! - [`batch`] - paced batch scheduler
//! - [`service`] - id-based entry points
//!
//! # Example
//!
//! ```no_run
//! use brandscrub::{Config, NoProgress, Sanitizer, BatchSelection};
//!
//! let mut config = Config::load().unwrap_or_default();
//! config.apply_env();
//! let sanitizer = Sanitizer::from_config(&config).unwrap();
//! let report = sanitizer
//!     .analyze_batch(&BatchSelection::All, &NoProgress)
//!     .unwrap();
//! println!("{} failed", report.summary.failed);
//! ```

pub mod batch;
pub mod cancel;
pub mod catalog;
pub mod cli;
pub mod config;
pub mod detection;
pub mod edit;
pub mod mask;
pub mod photo;
pub mod pipeline;
pub mod region;
pub mod remote;
pub mod retry;
pub mod service;
pub mod sharpness;
pub mod store;
pub mod strategy;
pub mod verify;

// Batch
pub use batch::{
    BatchOptions, BatchProgressCallback, BatchReport, BatchScheduler, BatchSummary, NoProgress,
};
pub use cancel::CancelToken;

// Catalog
pub use catalog::{CatalogError, JsonCatalog, Product, ProductCatalog, StaticCatalog};

// CLI
pub use cli::{exit_codes, parse_region, Cli, Commands};

// Config
pub use config::{CliOverrides, Config, ConfigError};

// Detection
pub use detection::{
    BrandDetector, DetectedRegion, DetectionError, HttpDetector, RegionFilter, RegionKind,
    RiskAssessment,
};

// Edit
pub use edit::{
    EditError, HttpImageEditor, HttpTitleRewriter, ImageEditor, PassthroughTitle, TitleRewriter,
};

// Masking
pub use mask::{FallbackMode, MaskEngine, MaskOptions, MaskOutcome};

// Photograph
pub use photo::{DecodeError, EncodeError, Photograph};

// Pipeline
pub use pipeline::{
    AnalysisResult, AnalysisStatus, ExhaustedStatus, PipelineError, PipelineOptions,
    ProductPipeline,
};
pub use region::{BoundingBox, Coordinates, RawBox};
pub use remote::{RemoteError, ServiceConfig};
pub use retry::{RetryPolicy, Retryable};
pub use service::{BatchSelection, Sanitizer, ServiceError};
pub use sharpness::{BlurMetric, SharpnessScorer};
pub use store::{AnalysisStore, JsonFileStore, MemoryStore, StoreError};
pub use strategy::{
    Approach, EditPlan, EditStrategy, Priority, StrategyClassifier, StrategyRule, StrategyType,
};
pub use verify::{VerificationLoop, VerifyError, VerifyOptions, VerifyOutcome, VerifyState, Verdict};
