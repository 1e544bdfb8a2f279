//! Batch scheduler
//!
//! Drives many products through the [`ProductPipeline`] with pacing between
//! items. With the default concurrency of 1 processing is strictly
//! sequential: item *i+1* starts only after item *i* has fully finished.
//! Higher concurrency processes windows of that many items on a dedicated
//! `rayon` pool and paces between windows instead.
//!
//! A failing item never aborts the batch; its error lives in its result.

use serde::Serialize;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::cancel::CancelToken;
use crate::catalog::Product;
use crate::pipeline::{AnalysisResult, AnalysisStatus, ProductPipeline};

/// Default pause between items
pub const DEFAULT_INTER_ITEM_DELAY: Duration = Duration::from_millis(2000);

/// Upper bound on concurrent items
pub const MAX_CONCURRENCY: usize = 16;

/// Granularity of cancellable sleeps
const SLEEP_SLICE: Duration = Duration::from_millis(50);

/// Receives one call per finished item
pub trait BatchProgressCallback: Send + Sync {
    /// `current` is 1-based
    fn on_item_complete(&self, current: usize, total: usize, result: &AnalysisResult);
}

impl<F> BatchProgressCallback for F
where
    F: Fn(usize, usize, &AnalysisResult) + Send + Sync,
{
    fn on_item_complete(&self, current: usize, total: usize, result: &AnalysisResult) {
        self(current, total, result)
    }
}

/// Progress callback that ignores everything
pub struct NoProgress;

impl BatchProgressCallback for NoProgress {
    fn on_item_complete(&self, _current: usize, _total: usize, _result: &AnalysisResult) {}
}

/// Scheduling options
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchOptions {
    /// Pause before each item (or window) after the first
    pub inter_item_delay: Duration,
    /// Items processed at once (1..=16)
    pub concurrency: usize,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            inter_item_delay: DEFAULT_INTER_ITEM_DELAY,
            concurrency: 1,
        }
    }
}

impl BatchOptions {
    pub fn new(inter_item_delay: Duration, concurrency: usize) -> Self {
        Self {
            inter_item_delay,
            concurrency: concurrency.clamp(1, MAX_CONCURRENCY),
        }
    }

    /// No pacing, sequential
    pub fn immediate() -> Self {
        Self::new(Duration::ZERO, 1)
    }
}

/// Status counts of a batch
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub total: usize,
    pub clean: usize,
    pub blur_applied: usize,
    pub needs_review: usize,
    pub failed: usize,
    /// `(product_id, error)` for every failed item
    pub failures: Vec<(String, String)>,
}

impl BatchSummary {
    pub fn from_results(results: &[AnalysisResult]) -> Self {
        let mut summary = Self {
            total: results.len(),
            ..Default::default()
        };

        for r in results {
            match r.status {
                AnalysisStatus::Clean => summary.clean += 1,
                AnalysisStatus::BlurApplied => summary.blur_applied += 1,
                AnalysisStatus::NeedsReview => summary.needs_review += 1,
                AnalysisStatus::Failed => {
                    summary.failed += 1;
                    summary.failures.push((
                        r.product_id.clone(),
                        r.error.clone().unwrap_or_else(|| "Unknown error".into()),
                    ));
                }
                AnalysisStatus::Pending => {}
            }
        }

        summary
    }

    pub fn has_failures(&self) -> bool {
        self.failed > 0
    }
}

/// Outcome of a batch run
#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    /// Results in input order (only completed items when cancelled)
    pub results: Vec<AnalysisResult>,
    pub summary: BatchSummary,
    pub cancelled: bool,
    #[serde(with = "duration_secs")]
    pub elapsed: Duration,
}

mod duration_secs {
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_f64(d.as_secs_f64())
    }
}

/// Batch scheduler
pub struct BatchScheduler<'a> {
    pipeline: &'a ProductPipeline,
    options: BatchOptions,
}

impl<'a> BatchScheduler<'a> {
    pub fn new(pipeline: &'a ProductPipeline, options: BatchOptions) -> Self {
        Self { pipeline, options }
    }

    pub fn options(&self) -> &BatchOptions {
        &self.options
    }

    /// Run every product, reporting progress after each one
    pub fn run_batch(
        &self,
        products: &[Product],
        progress: &dyn BatchProgressCallback,
        cancel: &CancelToken,
    ) -> BatchReport {
        let start = Instant::now();
        info!(
            "Starting batch of {} product(s), concurrency {}",
            products.len(),
            self.options.concurrency
        );

        let (results, cancelled) = if self.options.concurrency <= 1 {
            self.run_sequential(products, progress, cancel)
        } else {
            match rayon::ThreadPoolBuilder::new()
                .num_threads(self.options.concurrency)
                .build()
            {
                Ok(pool) => self.run_windowed(&pool, products, progress, cancel),
                Err(e) => {
                    warn!("Could not build worker pool, running sequentially: {}", e);
                    self.run_sequential(products, progress, cancel)
                }
            }
        };

        let summary = BatchSummary::from_results(&results);
        let elapsed = start.elapsed();
        info!(
            "Batch finished in {:.1}s: {} clean, {} blur_applied, {} needs_review, {} failed{}",
            elapsed.as_secs_f64(),
            summary.clean,
            summary.blur_applied,
            summary.needs_review,
            summary.failed,
            if cancelled { " (cancelled)" } else { "" }
        );

        BatchReport {
            results,
            summary,
            cancelled,
            elapsed,
        }
    }

    fn run_sequential(
        &self,
        products: &[Product],
        progress: &dyn BatchProgressCallback,
        cancel: &CancelToken,
    ) -> (Vec<AnalysisResult>, bool) {
        let total = products.len();
        let mut results = Vec::with_capacity(total);

        for (i, product) in products.iter().enumerate() {
            if i > 0 && !pause(self.options.inter_item_delay, cancel) {
                return (results, true);
            }
            if cancel.is_cancelled() {
                return (results, true);
            }

            debug!("Batch item {}/{}: {}", i + 1, total, product.id);
            let result = self.pipeline.run(product, cancel);
            progress.on_item_complete(i + 1, total, &result);
            results.push(result);
        }

        // cancellation may land while the final item or window is running
        (results, cancel.is_cancelled())
    }

    fn run_windowed(
        &self,
        pool: &rayon::ThreadPool,
        products: &[Product],
        progress: &dyn BatchProgressCallback,
        cancel: &CancelToken,
    ) -> (Vec<AnalysisResult>, bool) {
        use rayon::prelude::*;

        let total = products.len();
        let mut results = Vec::with_capacity(total);

        for (w, window) in products.chunks(self.options.concurrency).enumerate() {
            if w > 0 && !pause(self.options.inter_item_delay, cancel) {
                return (results, true);
            }
            if cancel.is_cancelled() {
                return (results, true);
            }

            debug!(
                "Batch window {} ({} item(s)) starting at {}/{}",
                w + 1,
                window.len(),
                results.len() + 1,
                total
            );
            let window_results: Vec<AnalysisResult> = pool.install(|| {
                window
                    .par_iter()
                    .map(|product| self.pipeline.run(product, cancel))
                    .collect()
            });

            for result in window_results {
                results.push(result);
                if let Some(last) = results.last() {
                    progress.on_item_complete(results.len(), total, last);
                }
            }
        }

        // cancellation may land while the final item or window is running
        (results, cancel.is_cancelled())
    }
}

/// Sleep for `delay` in short slices; false when cancelled meanwhile
fn pause(delay: Duration, cancel: &CancelToken) -> bool {
    let deadline = Instant::now() + delay;
    loop {
        if cancel.is_cancelled() {
            return false;
        }
        let now = Instant::now();
        if now >= deadline {
            return true;
        }
        std::thread::sleep(SLEEP_SLICE.min(deadline - now));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(id: &str, status: AnalysisStatus, error: Option<&str>) -> AnalysisResult {
        let mut r = AnalysisResult::pending(id);
        r.status = status;
        r.error = error.map(String::from);
        r
    }

    #[test]
    fn test_summary_counts() {
        let results = vec![
            result("a", AnalysisStatus::Clean, None),
            result("b", AnalysisStatus::BlurApplied, None),
            result("c", AnalysisStatus::Failed, Some("detector offline")),
            result("d", AnalysisStatus::NeedsReview, None),
            result("e", AnalysisStatus::Clean, None),
        ];
        let summary = BatchSummary::from_results(&results);

        assert_eq!(summary.total, 5);
        assert_eq!(summary.clean, 2);
        assert_eq!(summary.blur_applied, 1);
        assert_eq!(summary.needs_review, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(
            summary.failures,
            vec![("c".to_string(), "detector offline".to_string())]
        );
        assert!(summary.has_failures());
    }

    #[test]
    fn test_options_clamp_concurrency() {
        assert_eq!(BatchOptions::new(Duration::ZERO, 0).concurrency, 1);
        assert_eq!(BatchOptions::new(Duration::ZERO, 500).concurrency, MAX_CONCURRENCY);
        assert_eq!(BatchOptions::default().inter_item_delay, Duration::from_secs(2));
    }

    #[test]
    fn test_pause_returns_early_on_cancel() {
        let cancel = CancelToken::new();
        cancel.cancel();
        let start = Instant::now();
        assert!(!pause(Duration::from_secs(10), &cancel));
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn test_pause_waits() {
        let start = Instant::now();
        assert!(pause(Duration::from_millis(60), &CancelToken::new()));
        assert!(start.elapsed() >= Duration::from_millis(60));
    }

    #[test]
    fn test_closure_progress_callback() {
        let seen = std::sync::Mutex::new(Vec::new());
        let callback = |current: usize, total: usize, r: &AnalysisResult| {
            seen.lock().unwrap().push((current, total, r.product_id.clone()));
        };
        callback.on_item_complete(1, 2, &result("a", AnalysisStatus::Clean, None));
        assert_eq!(seen.lock().unwrap()[0], (1, 2, "a".to_string()));
    }
}
