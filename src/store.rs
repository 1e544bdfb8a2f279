//! Analysis result storage
//!
//! One current [`AnalysisResult`] per product, keyed by product id.
//! `upsert` is last-write-wins: a re-run replaces the previous record.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use tracing::debug;

use crate::pipeline::AnalysisResult;

/// Current on-disk document version
const STORE_VERSION: u32 = 1;

/// Store error type
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Unsupported store version {0}")]
    Version(u32),
    #[error("Storage error: {0}")]
    Storage(String),
}

fn lock_error(e: impl std::fmt::Display) -> StoreError {
    StoreError::Storage(format!("Lock error: {}", e))
}

/// Keyed result store
pub trait AnalysisStore: Send + Sync {
    /// Insert or replace the result for `result.product_id`
    fn upsert(&self, result: &AnalysisResult) -> Result<(), StoreError>;
    /// Get the current result of a product
    fn get(&self, product_id: &str) -> Result<Option<AnalysisResult>, StoreError>;
    /// All results, ordered by product id
    fn list(&self) -> Result<Vec<AnalysisResult>, StoreError>;
    /// Persist pending changes
    fn flush(&self) -> Result<(), StoreError>;
}

// ============================================================
// Memory store
// ============================================================

/// In-process store; contents die with the process
#[derive(Debug, Default)]
pub struct MemoryStore {
    results: RwLock<BTreeMap<String, AnalysisResult>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.results.read().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl AnalysisStore for MemoryStore {
    fn upsert(&self, result: &AnalysisResult) -> Result<(), StoreError> {
        let mut results = self.results.write().map_err(lock_error)?;
        results.insert(result.product_id.clone(), result.clone());
        Ok(())
    }

    fn get(&self, product_id: &str) -> Result<Option<AnalysisResult>, StoreError> {
        let results = self.results.read().map_err(lock_error)?;
        Ok(results.get(product_id).cloned())
    }

    fn list(&self) -> Result<Vec<AnalysisResult>, StoreError> {
        let results = self.results.read().map_err(lock_error)?;
        Ok(results.values().cloned().collect())
    }

    fn flush(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

// ============================================================
// JSON file store
// ============================================================

/// Stored results document
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredResults {
    version: u32,
    results: BTreeMap<String, AnalysisResult>,
}

impl Default for StoredResults {
    fn default() -> Self {
        Self {
            version: STORE_VERSION,
            results: BTreeMap::new(),
        }
    }
}

/// JSON file-backed store
///
/// Every upsert rewrites the whole document through a temporary file in the
/// same directory, so readers never see a half-written file.
pub struct JsonFileStore {
    path: PathBuf,
    cache: RwLock<BTreeMap<String, AnalysisResult>>,
}

impl JsonFileStore {
    /// Open (or create) the store at `path`
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let store = Self {
            path,
            cache: RwLock::new(BTreeMap::new()),
        };
        store.load()?;

        Ok(store)
    }

    /// Reload from disk, replacing the cache
    pub fn load(&self) -> Result<(), StoreError> {
        if !self.path.exists() {
            return Ok(());
        }

        let content = std::fs::read_to_string(&self.path)?;
        let stored: StoredResults = serde_json::from_str(&content)?;
        if stored.version > STORE_VERSION {
            return Err(StoreError::Version(stored.version));
        }

        let mut cache = self.cache.write().map_err(lock_error)?;
        *cache = stored.results;
        debug!("Loaded {} result(s) from {}", cache.len(), self.path.display());

        Ok(())
    }

    /// Get the storage path
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.cache.read().map(|c| c.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn write_document(&self, results: &BTreeMap<String, AnalysisResult>) -> Result<(), StoreError> {
        let stored = StoredResults {
            version: STORE_VERSION,
            results: results.clone(),
        };
        let content = serde_json::to_vec_pretty(&stored)?;

        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let mut tmp = tempfile::NamedTempFile::new_in(&dir)?;
        tmp.write_all(&content)?;
        tmp.flush()?;
        tmp.persist(&self.path).map_err(|e| StoreError::Io(e.error))?;

        Ok(())
    }
}

impl AnalysisStore for JsonFileStore {
    fn upsert(&self, result: &AnalysisResult) -> Result<(), StoreError> {
        let mut cache = self.cache.write().map_err(lock_error)?;
        cache.insert(result.product_id.clone(), result.clone());
        self.write_document(&cache)
    }

    fn get(&self, product_id: &str) -> Result<Option<AnalysisResult>, StoreError> {
        let cache = self.cache.read().map_err(lock_error)?;
        Ok(cache.get(product_id).cloned())
    }

    fn list(&self) -> Result<Vec<AnalysisResult>, StoreError> {
        let cache = self.cache.read().map_err(lock_error)?;
        Ok(cache.values().cloned().collect())
    }

    fn flush(&self) -> Result<(), StoreError> {
        let cache = self.cache.read().map_err(lock_error)?;
        self.write_document(&cache)?;
        debug!("Flushed {} result(s) to {}", cache.len(), self.path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::AnalysisStatus;
    use tempfile::tempdir;

    fn result(id: &str, status: AnalysisStatus) -> AnalysisResult {
        let mut r = AnalysisResult::pending(id);
        r.status = status;
        r
    }

    #[test]
    fn test_memory_upsert_is_last_write_wins() {
        let store = MemoryStore::new();
        store.upsert(&result("p1", AnalysisStatus::Pending)).unwrap();
        store.upsert(&result("p1", AnalysisStatus::Clean)).unwrap();

        assert_eq!(store.len(), 1);
        assert_eq!(
            store.get("p1").unwrap().unwrap().status,
            AnalysisStatus::Clean
        );
        assert!(store.get("missing").unwrap().is_none());
    }

    #[test]
    fn test_list_ordered_by_id() {
        let store = MemoryStore::new();
        for id in ["c", "a", "b"] {
            store.upsert(&result(id, AnalysisStatus::Clean)).unwrap();
        }
        let ids: Vec<String> = store
            .list()
            .unwrap()
            .into_iter()
            .map(|r| r.product_id)
            .collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_json_store_persists_across_instances() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("results.json");

        {
            let store = JsonFileStore::open(&path).unwrap();
            store.upsert(&result("p1", AnalysisStatus::Pending)).unwrap();
            store
                .upsert(&result("p1", AnalysisStatus::BlurApplied))
                .unwrap();
            store.upsert(&result("p2", AnalysisStatus::Failed)).unwrap();
        }

        let reopened = JsonFileStore::open(&path).unwrap();
        assert_eq!(reopened.len(), 2);
        assert_eq!(
            reopened.get("p1").unwrap().unwrap().status,
            AnalysisStatus::BlurApplied
        );
    }

    #[test]
    fn test_json_store_rejects_future_version() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("results.json");
        std::fs::write(&path, r#"{"version": 99, "results": {}}"#).unwrap();

        let result = JsonFileStore::open(&path);
        assert!(matches!(result, Err(StoreError::Version(99))));
    }

    #[test]
    fn test_json_store_rejects_corrupt_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("results.json");
        std::fs::write(&path, "not json").unwrap();

        assert!(matches!(
            JsonFileStore::open(&path),
            Err(StoreError::Serialization(_))
        ));
    }
}
