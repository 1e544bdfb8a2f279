//! Product catalog
//!
//! Read-only source of products to sanitize. The JSON manifest is a list of
//! `{"id", "title", "category", "image"}` objects; relative image paths are
//! resolved against the manifest's directory.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Catalog error types
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Catalog not found: {0}")]
    NotFound(PathBuf),

    #[error("Invalid catalog: {0}")]
    Invalid(String),

    #[error("Duplicate product id: {0}")]
    DuplicateId(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, CatalogError>;

/// One product and its primary photograph
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(rename = "image")]
    pub image_path: PathBuf,
}

impl Product {
    pub fn new(id: impl Into<String>, title: impl Into<String>, image: impl Into<PathBuf>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            category: None,
            image_path: image.into(),
        }
    }

    #[must_use]
    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }
}

/// Product source
pub trait ProductCatalog: Send + Sync {
    fn get(&self, id: &str) -> Option<Product>;
    /// All products, in catalog order
    fn list(&self) -> Vec<Product>;
}

/// Catalog held in memory
#[derive(Debug, Clone, Default)]
pub struct StaticCatalog {
    products: Vec<Product>,
}

impl StaticCatalog {
    pub fn new(products: Vec<Product>) -> Result<Self> {
        let mut seen = HashSet::new();
        for p in &products {
            if p.id.trim().is_empty() {
                return Err(CatalogError::Invalid("product with empty id".into()));
            }
            if !seen.insert(p.id.as_str()) {
                return Err(CatalogError::DuplicateId(p.id.clone()));
            }
        }
        Ok(Self { products })
    }

    pub fn len(&self) -> usize {
        self.products.len()
    }

    pub fn is_empty(&self) -> bool {
        self.products.is_empty()
    }
}

impl ProductCatalog for StaticCatalog {
    fn get(&self, id: &str) -> Option<Product> {
        self.products.iter().find(|p| p.id == id).cloned()
    }

    fn list(&self) -> Vec<Product> {
        self.products.clone()
    }
}

/// Catalog loaded from a JSON manifest
#[derive(Debug, Clone)]
pub struct JsonCatalog {
    inner: StaticCatalog,
    path: PathBuf,
}

impl JsonCatalog {
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(CatalogError::NotFound(path.to_path_buf()));
        }

        let content = std::fs::read_to_string(path)?;
        let mut products: Vec<Product> = serde_json::from_str(&content)?;

        let base = path.parent().unwrap_or_else(|| Path::new("."));
        for product in &mut products {
            if product.image_path.is_relative() {
                product.image_path = base.join(&product.image_path);
            }
        }

        Ok(Self {
            inner: StaticCatalog::new(products)?,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

impl ProductCatalog for JsonCatalog {
    fn get(&self, id: &str) -> Option<Product> {
        self.inner.get(id)
    }

    fn list(&self) -> Vec<Product> {
        self.inner.list()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_load_resolves_relative_paths() {
        let dir = tempdir().unwrap();
        let manifest = dir.path().join("catalog.json");
        std::fs::write(
            &manifest,
            r#"[
                {"id": "p1", "title": "Air Runner", "category": "shoes", "image": "img/p1.png"},
                {"id": "p2", "title": "Tote", "image": "/abs/p2.jpg"}
            ]"#,
        )
        .unwrap();

        let catalog = JsonCatalog::load(&manifest).unwrap();
        assert_eq!(catalog.len(), 2);

        let p1 = catalog.get("p1").unwrap();
        assert_eq!(p1.image_path, dir.path().join("img/p1.png"));
        assert_eq!(p1.category.as_deref(), Some("shoes"));

        let p2 = catalog.get("p2").unwrap();
        assert_eq!(p2.image_path, PathBuf::from("/abs/p2.jpg"));
        assert!(p2.category.is_none());
    }

    #[test]
    fn test_missing_manifest() {
        let result = JsonCatalog::load(Path::new("/nonexistent/catalog.json"));
        assert!(matches!(result, Err(CatalogError::NotFound(_))));
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let result = StaticCatalog::new(vec![
            Product::new("p1", "A", "a.png"),
            Product::new("p1", "B", "b.png"),
        ]);
        assert!(matches!(result, Err(CatalogError::DuplicateId(id)) if id == "p1"));
    }

    #[test]
    fn test_list_keeps_order() {
        let catalog = StaticCatalog::new(vec![
            Product::new("z", "Z", "z.png"),
            Product::new("a", "A", "a.png"),
        ])
        .unwrap();
        let ids: Vec<String> = catalog.list().into_iter().map(|p| p.id).collect();
        assert_eq!(ids, vec!["z", "a"]);
    }
}
