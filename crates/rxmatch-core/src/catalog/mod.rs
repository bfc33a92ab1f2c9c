//! Drug catalog access: query builder, query templates and backends.

mod query;
mod schema;
mod sqlite;
pub mod templates;

pub use query::*;
pub use schema::*;
pub use sqlite::*;
pub use templates::ContextFilters;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::{CatalogDrug, DrugMatch};

/// Catalog errors.
#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Catalog task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("Catalog unavailable: {0}")]
    Unavailable(String),
}

pub type CatalogResult<T> = Result<T, CatalogError>;

/// A typed catalog row as returned by a query.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CatalogRow {
    pub drug: CatalogDrug,
    /// Value of the query's score expression, if it had one
    pub score: Option<f64>,
}

impl CatalogRow {
    pub fn new(drug: CatalogDrug) -> Self {
        Self { drug, score: None }
    }

    pub fn with_score(mut self, score: f64) -> Self {
        self.score = Some(score);
        self
    }

    /// Convert to a strategy match. The row score, when present, is the confidence.
    pub fn into_match(self, strategy: &str, default_confidence: f64) -> DrugMatch {
        let confidence = self.score.unwrap_or(default_confidence);
        let drug = self.drug;
        DrugMatch {
            canonical_id: drug.rxcui,
            name: drug.name,
            full_name: drug.full_name,
            generic_name: drug.generic_name,
            brand_name: drug.brand_name,
            strength: drug.strength,
            route: drug.route,
            dose_form: drug.dose_form,
            term_type: drug.term_type,
            strategy_name: strategy.to_string(),
            ..Default::default()
        }
        .with_confidence(confidence)
    }
}

/// Read-only query execution against a drug catalog.
#[async_trait]
pub trait CatalogBackend: Send + Sync {
    /// Run a query and return its rows in query order.
    async fn execute(&self, query: &CatalogQuery) -> CatalogResult<Vec<CatalogRow>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_into_match_prefers_row_score() {
        let row = CatalogRow::new(CatalogDrug::new("R1", "metformin").strength("500 MG"))
            .with_score(0.9);
        let m = row.into_match("fuzzy_match", 0.65);
        assert_eq!(m.canonical_id.as_deref(), Some("R1"));
        assert_eq!(m.strategy_name, "fuzzy_match");
        assert_eq!(m.match_confidence, 0.9);
        assert_eq!(m.strength.as_deref(), Some("500 MG"));
    }

    #[test]
    fn test_into_match_default_and_clamp() {
        let m = CatalogRow::new(CatalogDrug::new("R1", "x")).into_match("exact_match", 1.0);
        assert_eq!(m.match_confidence, 1.0);

        let m = CatalogRow::new(CatalogDrug::new("R1", "x"))
            .with_score(2.5)
            .into_match("comprehensive_instruction", 0.0);
        assert_eq!(m.match_confidence, 1.0);
    }
}
