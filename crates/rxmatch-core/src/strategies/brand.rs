//! Brand-restricted matching.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use super::{
    Requires, SearchStrategy, BRAND_EXACT, BRAND_FUZZY, BRAND_STRENGTH, GENERIC_TO_BRAND,
};
use crate::catalog::{templates, CatalogBackend};
use crate::models::{DrugMatch, DrugQuery};
use crate::search::SearchResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrandMode {
    Exact,
    Fuzzy,
    Strength,
    /// Search by generic name, return branded products
    GenericToBrand,
}

impl BrandMode {
    /// Confidence for rows the query does not score itself.
    pub fn confidence(&self) -> f64 {
        match self {
            BrandMode::Exact => 0.9,
            BrandMode::Fuzzy => 0.75,
            BrandMode::Strength => 0.85,
            BrandMode::GenericToBrand => 0.75,
        }
    }
}

/// Searches restricted to branded and packaged term types.
pub struct BrandSearch {
    catalog: Arc<dyn CatalogBackend>,
    mode: BrandMode,
}

impl BrandSearch {
    pub fn new(catalog: Arc<dyn CatalogBackend>, mode: BrandMode) -> Self {
        Self { catalog, mode }
    }
}

#[async_trait]
impl SearchStrategy for BrandSearch {
    fn name(&self) -> &str {
        match self.mode {
            BrandMode::Exact => BRAND_EXACT,
            BrandMode::Fuzzy => BRAND_FUZZY,
            BrandMode::Strength => BRAND_STRENGTH,
            BrandMode::GenericToBrand => GENERIC_TO_BRAND,
        }
    }

    fn applies_to(&self, query: &DrugQuery) -> bool {
        match self.mode {
            BrandMode::Strength => Requires::STRENGTH.satisfied_by(query),
            _ => true,
        }
    }

    async fn search(&self, query: &DrugQuery, limit: usize) -> SearchResult<Vec<DrugMatch>> {
        let name = query.name();
        if name.is_empty() {
            return Ok(Vec::new());
        }
        let catalog_query = match self.mode {
            BrandMode::Exact => templates::brand_exact(name, limit),
            BrandMode::Fuzzy => templates::brand_fuzzy(name, limit),
            BrandMode::GenericToBrand => templates::generic_to_brand(name, limit),
            BrandMode::Strength => match query.strength() {
                Some(strength) => templates::brand_strength(name, strength, limit),
                None => return Ok(Vec::new()),
            },
        };

        let rows = self.catalog.execute(&catalog_query).await?;
        let confidence = self.mode.confidence();
        let matches: Vec<DrugMatch> = rows
            .into_iter()
            .map(|row| row.into_match(self.name(), confidence))
            .collect();

        debug!(strategy = self.name(), found = matches.len(), "brand search");
        Ok(matches)
    }
}
