//! Semantic matching over catalog embeddings.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use super::{Requires, SearchStrategy, EMBEDDING_SEARCH, EMBEDDING_STRENGTH};
use crate::catalog::CatalogRow;
use crate::embedding::{Embedder, VectorIndex};
use crate::models::{DrugMatch, DrugQuery};
use crate::search::SearchResult;

pub const DEFAULT_SIMILARITY_THRESHOLD: f64 = 0.7;
pub const DEFAULT_STRENGTH_SIMILARITY_THRESHOLD: f64 = 0.6;
pub const DEFAULT_STRENGTH_BOOST: f64 = 0.1;

/// Embeds the query and ranks catalog rows by cosine similarity.
pub struct EmbeddingSearch {
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorIndex>,
    with_strength: bool,
    threshold: f64,
    strength_threshold: f64,
    strength_boost: f64,
}

impl EmbeddingSearch {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        index: Arc<dyn VectorIndex>,
        with_strength: bool,
    ) -> Self {
        Self {
            embedder,
            index,
            with_strength,
            threshold: DEFAULT_SIMILARITY_THRESHOLD,
            strength_threshold: DEFAULT_STRENGTH_SIMILARITY_THRESHOLD,
            strength_boost: DEFAULT_STRENGTH_BOOST,
        }
    }

    pub fn with_thresholds(mut self, threshold: f64, strength_threshold: f64) -> Self {
        self.threshold = threshold;
        self.strength_threshold = strength_threshold;
        self
    }

    pub fn with_strength_boost(mut self, boost: f64) -> Self {
        self.strength_boost = boost;
        self
    }
}

#[async_trait]
impl SearchStrategy for EmbeddingSearch {
    fn name(&self) -> &str {
        if self.with_strength {
            EMBEDDING_STRENGTH
        } else {
            EMBEDDING_SEARCH
        }
    }

    fn applies_to(&self, query: &DrugQuery) -> bool {
        !self.with_strength || Requires::STRENGTH.satisfied_by(query)
    }

    async fn search(&self, query: &DrugQuery, limit: usize) -> SearchResult<Vec<DrugMatch>> {
        let name = query.name();
        let (text, strength, threshold) = match (self.with_strength, query.strength()) {
            (true, Some(s)) => (format!("{name} {s}"), Some(s), self.strength_threshold),
            (true, None) => return Ok(Vec::new()),
            (false, _) => (name.to_string(), None, self.threshold),
        };

        let vector = match self.embedder.embed(&text).await? {
            Some(vector) => vector,
            None => {
                debug!(strategy = self.name(), "embedding unavailable");
                return Ok(Vec::new());
            }
        };

        let neighbors = self
            .index
            .nearest(&vector, strength, threshold, limit)
            .await?;

        let target = strength.map(str::to_lowercase);
        let mut matches: Vec<DrugMatch> = neighbors
            .into_iter()
            .map(|neighbor| {
                let boosted = match (&target, neighbor.drug.strength.as_deref()) {
                    (Some(t), Some(row)) if row.to_lowercase().contains(t.as_str()) => {
                        neighbor.similarity + self.strength_boost
                    }
                    _ => neighbor.similarity,
                };
                CatalogRow::new(neighbor.drug).into_match(self.name(), boosted)
            })
            .collect();
        matches.sort_by(|a, b| b.match_confidence.total_cmp(&a.match_confidence));

        debug!(strategy = self.name(), found = matches.len(), "embedding search");
        Ok(matches)
    }
}
