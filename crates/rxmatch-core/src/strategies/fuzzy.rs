//! Substring and word-overlap matching.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use super::{Requires, SearchStrategy, FUZZY_MATCH, FUZZY_MATCH_STRENGTH, WORD_OVERLAP};
use crate::catalog::{templates, CatalogBackend};
use crate::models::{DrugMatch, DrugQuery};
use crate::search::SearchResult;

/// Fallback confidence when a query carries no score tiers.
pub const FUZZY_CONFIDENCE: f64 = 0.65;
pub const WORD_OVERLAP_CONFIDENCE: f64 = 0.65;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FuzzyMode {
    /// Substring in either direction on name / full name
    Name,
    /// Name substring plus strength substring
    NameStrength,
    /// Any query word (longer than two characters) in name / full name
    WordOverlap,
}

pub struct FuzzySearch {
    catalog: Arc<dyn CatalogBackend>,
    mode: FuzzyMode,
}

impl FuzzySearch {
    pub fn new(catalog: Arc<dyn CatalogBackend>, mode: FuzzyMode) -> Self {
        Self { catalog, mode }
    }
}

/// Lowercased whitespace-separated words longer than two characters.
pub fn query_words(name: &str) -> Vec<String> {
    name.to_lowercase()
        .split_whitespace()
        .filter(|w| w.chars().count() > 2)
        .map(str::to_string)
        .collect()
}

#[async_trait]
impl SearchStrategy for FuzzySearch {
    fn name(&self) -> &str {
        match self.mode {
            FuzzyMode::Name => FUZZY_MATCH,
            FuzzyMode::NameStrength => FUZZY_MATCH_STRENGTH,
            FuzzyMode::WordOverlap => WORD_OVERLAP,
        }
    }

    fn applies_to(&self, query: &DrugQuery) -> bool {
        match self.mode {
            FuzzyMode::NameStrength => Requires::STRENGTH.satisfied_by(query),
            _ => true,
        }
    }

    async fn search(&self, query: &DrugQuery, limit: usize) -> SearchResult<Vec<DrugMatch>> {
        let name = query.name();
        if name.is_empty() {
            return Ok(Vec::new());
        }
        let (catalog_query, confidence) = match self.mode {
            FuzzyMode::Name => (templates::fuzzy_name(name, limit), FUZZY_CONFIDENCE),
            FuzzyMode::NameStrength => match query.strength() {
                Some(strength) => (
                    templates::fuzzy_name_strength(name, strength, limit),
                    FUZZY_CONFIDENCE,
                ),
                None => return Ok(Vec::new()),
            },
            FuzzyMode::WordOverlap => {
                let words = query_words(name);
                if words.is_empty() {
                    return Ok(Vec::new());
                }
                (
                    templates::word_overlap(&words, limit),
                    WORD_OVERLAP_CONFIDENCE,
                )
            }
        };

        let rows = self.catalog.execute(&catalog_query).await?;
        let matches: Vec<DrugMatch> = rows
            .into_iter()
            .map(|row| row.into_match(self.name(), confidence))
            .collect();

        debug!(strategy = self.name(), found = matches.len(), "fuzzy search");
        Ok(matches)
    }
}
