//! Embedding generation and vector similarity search.

mod gemini;

pub use gemini::*;

use std::cmp::Ordering;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tracing::debug;

use crate::catalog::{templates, CatalogBackend, CatalogError};
use crate::models::CatalogDrug;

/// Embedding errors.
#[derive(Error, Debug)]
pub enum EmbeddingError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Embedding API error ({status}): {body}")]
    Api { status: u16, body: String },

    #[error("Invalid embedding response: {0}")]
    InvalidResponse(String),

    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),
}

pub type EmbeddingResult<T> = Result<T, EmbeddingError>;

/// Text embedding service.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed `text`. `Ok(None)` means embeddings are unavailable.
    async fn embed(&self, text: &str) -> EmbeddingResult<Option<Vec<f32>>>;
}

/// Embedder used when no embedding service is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledEmbedder;

#[async_trait]
impl Embedder for DisabledEmbedder {
    async fn embed(&self, _text: &str) -> EmbeddingResult<Option<Vec<f32>>> {
        Ok(None)
    }
}

/// Cosine similarity. Zero-norm or mismatched vectors score 0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f64 = a.iter().zip(b).map(|(x, y)| *x as f64 * *y as f64).sum();
    let norm_a: f64 = a.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt();
    let norm_b: f64 = b.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

/// A catalog row close to a query vector.
#[derive(Debug, Clone, PartialEq)]
pub struct Neighbor {
    pub drug: CatalogDrug,
    pub similarity: f64,
}

/// Nearest-neighbour lookup over catalog embeddings.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Rows with similarity >= `threshold`, most similar first, at most `limit`.
    /// With `strength` set, only rows whose strength contains it are considered.
    async fn nearest(
        &self,
        vector: &[f32],
        strength: Option<&str>,
        threshold: f64,
        limit: usize,
    ) -> EmbeddingResult<Vec<Neighbor>>;
}

/// Brute-force index: scans embedded catalog rows and ranks them in memory.
pub struct CatalogScan {
    catalog: Arc<dyn CatalogBackend>,
    cap: usize,
}

impl CatalogScan {
    pub fn new(catalog: Arc<dyn CatalogBackend>) -> Self {
        Self {
            catalog,
            cap: templates::EMBEDDING_SCAN_CAP,
        }
    }

    /// Maximum rows fetched per lookup.
    pub fn with_cap(mut self, cap: usize) -> Self {
        self.cap = cap;
        self
    }
}

#[async_trait]
impl VectorIndex for CatalogScan {
    async fn nearest(
        &self,
        vector: &[f32],
        strength: Option<&str>,
        threshold: f64,
        limit: usize,
    ) -> EmbeddingResult<Vec<Neighbor>> {
        let query = match strength {
            Some(s) => templates::embedded_rows_with_strength(s, self.cap),
            None => templates::embedded_rows(self.cap),
        };
        let rows = self.catalog.execute(&query).await?;
        let scanned = rows.len();

        let mut neighbors: Vec<Neighbor> = rows
            .into_iter()
            .filter_map(|row| {
                let similarity = cosine_similarity(vector, row.drug.embedding.as_deref()?);
                (similarity >= threshold).then_some(Neighbor {
                    drug: row.drug,
                    similarity,
                })
            })
            .collect();

        neighbors.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(Ordering::Equal)
        });
        neighbors.truncate(limit);

        debug!(scanned, kept = neighbors.len(), threshold, "embedding scan");
        Ok(neighbors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::SqliteCatalog;

    #[test]
    fn test_cosine_similarity() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-9);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-9);
        assert!((cosine_similarity(&[1.0, 1.0], &[2.0, 2.0]) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_cosine_degenerate() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
    }

    #[tokio::test]
    async fn test_disabled_embedder() {
        assert!(DisabledEmbedder.embed("metformin").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_catalog_scan_threshold_and_order() {
        let catalog = SqliteCatalog::open_in_memory().unwrap();
        catalog
            .upsert_drugs(&[
                CatalogDrug::new("A", "a").embedding(vec![1.0, 0.0]),
                CatalogDrug::new("B", "b").embedding(vec![0.8, 0.6]),
                CatalogDrug::new("C", "c").embedding(vec![0.0, 1.0]),
                CatalogDrug::new("D", "d"),
            ])
            .unwrap();

        let index = CatalogScan::new(Arc::new(catalog));
        let hits = index.nearest(&[1.0, 0.0], None, 0.7, 10).await.unwrap();
        let ids: Vec<_> = hits.iter().filter_map(|n| n.drug.rxcui.clone()).collect();
        assert_eq!(ids, vec!["A", "B"]);
        assert!(hits[0].similarity >= hits[1].similarity);

        let top = index.nearest(&[1.0, 0.0], None, 0.7, 1).await.unwrap();
        assert_eq!(top.len(), 1);
    }

    #[tokio::test]
    async fn test_catalog_scan_strength_filter() {
        let catalog = SqliteCatalog::open_in_memory().unwrap();
        catalog
            .upsert_drugs(&[
                CatalogDrug::new("A", "a").strength("500 MG").embedding(vec![1.0, 0.0]),
                CatalogDrug::new("B", "b").strength("850 MG").embedding(vec![1.0, 0.0]),
            ])
            .unwrap();

        let index = CatalogScan::new(Arc::new(catalog));
        let hits = index
            .nearest(&[1.0, 0.0], Some("500"), 0.6, 10)
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].drug.rxcui.as_deref(), Some("A"));
    }
}
