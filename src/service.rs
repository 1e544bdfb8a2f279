//! Pipeline trigger interface
//!
//! Entry points for callers that address products by id:
//! [`Sanitizer::analyze_single`] and [`Sanitizer::analyze_batch`].

use std::sync::Arc;
use thiserror::Error;
use tracing::warn;

use crate::batch::{BatchOptions, BatchProgressCallback, BatchReport, BatchScheduler, BatchSummary};
use crate::cancel::CancelToken;
use crate::catalog::{CatalogError, JsonCatalog, Product, ProductCatalog};
use crate::config::Config;
use crate::detection::HttpDetector;
use crate::edit::{HttpImageEditor, HttpTitleRewriter};
use crate::mask::MaskEngine;
use crate::pipeline::{AnalysisResult, ProductPipeline};
use crate::remote::RemoteError;
use crate::store::{AnalysisStore, JsonFileStore, MemoryStore, StoreError};
use crate::strategy::StrategyClassifier;
use crate::verify::VerificationLoop;

/// Service error types
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Unknown product: {0}")]
    UnknownProduct(String),

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error("No product catalog configured (set storage.catalog_path or --catalog)")]
    NoCatalog,
}

pub type Result<T> = std::result::Result<T, ServiceError>;

/// Which products a batch covers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchSelection {
    /// Every product in the catalog
    All,
    Ids(Vec<String>),
}

/// Catalog-aware front end of the pipeline
pub struct Sanitizer {
    catalog: Arc<dyn ProductCatalog>,
    pipeline: ProductPipeline,
    batch_options: BatchOptions,
    cancel: CancelToken,
}

impl Sanitizer {
    pub fn new(
        catalog: Arc<dyn ProductCatalog>,
        pipeline: ProductPipeline,
        batch_options: BatchOptions,
    ) -> Self {
        Self {
            catalog,
            pipeline,
            batch_options,
            cancel: CancelToken::new(),
        }
    }

    /// Wire HTTP adapters, catalog, and store from configuration
    pub fn from_config(config: &Config) -> Result<Self> {
        let catalog_path = config
            .storage
            .catalog_path
            .as_ref()
            .ok_or(ServiceError::NoCatalog)?;
        let catalog = Arc::new(JsonCatalog::load(catalog_path)?);

        let store: Arc<dyn AnalysisStore> = match &config.storage.results_path {
            Some(path) => Arc::new(JsonFileStore::open(path)?),
            None => Arc::new(MemoryStore::new()),
        };

        let detector = HttpDetector::new(
            &config.detector,
            config.retry.clone(),
            config.region_filter(),
        )?;
        let editor = HttpImageEditor::new(&config.editor, config.retry.clone())?;

        let verifier = VerificationLoop::new(
            config.verify_options(),
            StrategyClassifier::default(),
            MaskEngine::new(config.mask_options()),
        );
        let mut pipeline = ProductPipeline::new(
            Arc::new(detector),
            Arc::new(editor),
            store,
            verifier,
            config.pipeline_options(),
        );
        if config.title.is_configured() {
            let titles = HttpTitleRewriter::new(&config.title, config.retry.clone())?;
            pipeline = pipeline.with_title_rewriter(Arc::new(titles));
        }

        Ok(Self::new(catalog, pipeline, config.batch_options()))
    }

    /// Token that cancels work started through this sanitizer
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn pipeline(&self) -> &ProductPipeline {
        &self.pipeline
    }

    /// Analyze one product by id
    pub fn analyze_single(&self, product_id: &str) -> Result<AnalysisResult> {
        let product = self
            .catalog
            .get(product_id)
            .ok_or_else(|| ServiceError::UnknownProduct(product_id.to_string()))?;

        let result = self.pipeline.run(&product, &self.cancel);
        self.pipeline.store().flush()?;
        Ok(result)
    }

    /// Analyze a selection of products
    ///
    /// Ids missing from the catalog yield a stored `failed` result at their
    /// requested position, so the report has one entry per requested id.
    /// A cancelled batch stops at the first product that did not run.
    pub fn analyze_batch(
        &self,
        selection: &BatchSelection,
        progress: &dyn BatchProgressCallback,
    ) -> Result<BatchReport> {
        let requested: Option<Vec<(&String, Option<Product>)>> = match selection {
            BatchSelection::All => None,
            BatchSelection::Ids(ids) => {
                Some(ids.iter().map(|id| (id, self.catalog.get(id))).collect())
            }
        };
        let products: Vec<Product> = match &requested {
            None => self.catalog.list(),
            Some(requested) => requested.iter().filter_map(|(_, p)| p.clone()).collect(),
        };

        let scheduler = BatchScheduler::new(&self.pipeline, self.batch_options.clone());
        let mut report = scheduler.run_batch(&products, progress, &self.cancel);

        if let Some(requested) = requested.filter(|r| r.len() > products.len()) {
            let mut scheduled = std::mem::take(&mut report.results).into_iter();
            for (id, product) in requested {
                if product.is_some() {
                    match scheduled.next() {
                        Some(result) => report.results.push(result),
                        None => break,
                    }
                } else {
                    warn!("Unknown product id in batch: {}", id);
                    let result = AnalysisResult::failed(
                        id.as_str(),
                        ServiceError::UnknownProduct(id.clone()).to_string(),
                    );
                    self.pipeline.store().upsert(&result)?;
                    report.results.push(result);
                }
            }
            report.summary = BatchSummary::from_results(&report.results);
        }

        self.pipeline.store().flush()?;
        Ok(report)
    }

    /// Stored result of a product
    pub fn result_for(&self, product_id: &str) -> Result<Option<AnalysisResult>> {
        Ok(self.pipeline.store().get(product_id)?)
    }

    /// All stored results
    pub fn results(&self) -> Result<Vec<AnalysisResult>> {
        Ok(self.pipeline.store().list()?)
    }
}
