//! Synonym-table matching.

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::try_join_all;
use tracing::debug;

use super::{dedupe_by_id, Requires, SearchStrategy, SYNONYM_SEARCH, SYNONYM_STRENGTH};
use crate::catalog::{templates, CatalogBackend};
use crate::models::{DrugMatch, DrugQuery};
use crate::search::SearchResult;
use crate::synonyms::SynonymTable;

/// Rows fetched per synonym before deduplication.
pub const ROWS_PER_SYNONYM: usize = 5;

/// Looks up every synonym of the query name and merges the hits.
pub struct SynonymSearch {
    catalog: Arc<dyn CatalogBackend>,
    synonyms: Arc<SynonymTable>,
    with_strength: bool,
}

impl SynonymSearch {
    pub fn new(
        catalog: Arc<dyn CatalogBackend>,
        synonyms: Arc<SynonymTable>,
        with_strength: bool,
    ) -> Self {
        Self {
            catalog,
            synonyms,
            with_strength,
        }
    }

    fn default_confidence(&self) -> f64 {
        if self.with_strength {
            0.8
        } else {
            0.75
        }
    }
}

#[async_trait]
impl SearchStrategy for SynonymSearch {
    fn name(&self) -> &str {
        if self.with_strength {
            SYNONYM_STRENGTH
        } else {
            SYNONYM_SEARCH
        }
    }

    fn applies_to(&self, query: &DrugQuery) -> bool {
        !self.with_strength || Requires::STRENGTH.satisfied_by(query)
    }

    async fn search(&self, query: &DrugQuery, limit: usize) -> SearchResult<Vec<DrugMatch>> {
        let strength = match (self.with_strength, query.strength()) {
            (true, None) => return Ok(Vec::new()),
            (true, strength) => strength,
            (false, _) => None,
        };

        let synonyms = self.synonyms.get_synonyms(query.name());
        if synonyms.is_empty() {
            debug!(strategy = self.name(), drug = query.name(), "no synonyms");
            return Ok(Vec::new());
        }

        let lookups = synonyms.iter().map(|synonym| {
            let catalog_query = match strength {
                Some(s) => templates::synonym_strength(synonym, s, ROWS_PER_SYNONYM),
                None => templates::synonym_name(synonym, ROWS_PER_SYNONYM),
            };
            let catalog = self.catalog.clone();
            async move { catalog.execute(&catalog_query).await }
        });
        let per_synonym = try_join_all(lookups).await?;

        let mut matches = Vec::new();
        for (synonym, rows) in synonyms.iter().zip(per_synonym) {
            for row in rows {
                let mut m = row.into_match(self.name(), self.default_confidence());
                m.annotations.synonym_used = Some(synonym.clone());
                m.annotations.original_query = Some(query.name().to_string());
                matches.push(m);
            }
        }

        if strength.is_some() {
            matches.sort_by(|a, b| b.match_confidence.total_cmp(&a.match_confidence));
        }
        let matches = dedupe_by_id(matches, limit);

        debug!(
            strategy = self.name(),
            synonyms = synonyms.len(),
            found = matches.len(),
            "synonym search"
        );
        Ok(matches)
    }
}
