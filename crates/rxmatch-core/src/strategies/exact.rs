//! Exact name matching.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use super::{Requires, SearchStrategy, EXACT_MATCH, EXACT_MATCH_STRENGTH};
use crate::catalog::{templates, CatalogBackend};
use crate::models::{DrugMatch, DrugQuery};
use crate::search::SearchResult;

/// Case-insensitive equality on name or full name, optionally with strength.
pub struct ExactSearch {
    catalog: Arc<dyn CatalogBackend>,
    with_strength: bool,
}

impl ExactSearch {
    pub fn new(catalog: Arc<dyn CatalogBackend>, with_strength: bool) -> Self {
        Self {
            catalog,
            with_strength,
        }
    }

    fn requires(&self) -> Requires {
        if self.with_strength {
            Requires::STRENGTH
        } else {
            Requires::NOTHING
        }
    }
}

#[async_trait]
impl SearchStrategy for ExactSearch {
    fn name(&self) -> &str {
        if self.with_strength {
            EXACT_MATCH_STRENGTH
        } else {
            EXACT_MATCH
        }
    }

    fn applies_to(&self, query: &DrugQuery) -> bool {
        self.requires().satisfied_by(query)
    }

    async fn search(&self, query: &DrugQuery, limit: usize) -> SearchResult<Vec<DrugMatch>> {
        let name = query.name();
        if name.is_empty() {
            return Ok(Vec::new());
        }
        let catalog_query = match (self.with_strength, query.strength()) {
            (true, Some(strength)) => templates::exact_name_strength(name, strength, limit),
            (true, None) => return Ok(Vec::new()),
            (false, _) => templates::exact_name(name, limit),
        };

        let rows = self.catalog.execute(&catalog_query).await?;
        let matches: Vec<DrugMatch> = rows
            .into_iter()
            .map(|row| row.into_match(self.name(), 1.0))
            .collect();

        debug!(strategy = self.name(), found = matches.len(), "exact search");
        Ok(matches)
    }
}
