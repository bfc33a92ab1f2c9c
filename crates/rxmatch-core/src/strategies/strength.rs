//! Strength-focused matching and strength normalization.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use super::{name_variants, Requires, SearchStrategy, STRENGTH_FOCUSED};
use crate::catalog::{templates, CatalogBackend};
use crate::models::{DrugMatch, DrugQuery};
use crate::search::SearchResult;
use crate::synonyms::SynonymTable;

/// Highest raw score the strength-focused query assigns.
pub const MAX_STRENGTH_SCORE: f64 = 25.0;

/// Leading numeric token of a strength, without leading zeros.
///
/// `"500mg"` → `"500"`, `"0.50 %"` → `"0.50"`, `"007"` → `"7"`, `"mg"` → `""`.
/// Thousands separators are ignored. Applying it twice changes nothing.
pub fn normalize_strength(strength: &str) -> String {
    let token: String = strength
        .chars()
        .filter(|c| *c != ',')
        .skip_while(|c| !c.is_ascii_digit() && *c != '.')
        .take_while(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    let token = token.trim_matches('.');
    if token.is_empty() {
        return String::new();
    }

    let trimmed = token.trim_start_matches('0');
    if trimmed.is_empty() {
        "0".to_string()
    } else if trimmed.starts_with('.') {
        format!("0{trimmed}")
    } else {
        trimmed.to_string()
    }
}

/// All ASCII digits of a strength, in order (`"2.5 mg"` → `"25"`).
pub fn strength_digits(strength: &str) -> String {
    strength.chars().filter(char::is_ascii_digit).collect()
}

/// Matches the strength against every spelling the catalog might use.
pub struct StrengthFocusedSearch {
    catalog: Arc<dyn CatalogBackend>,
    synonyms: Arc<SynonymTable>,
}

impl StrengthFocusedSearch {
    pub fn new(catalog: Arc<dyn CatalogBackend>, synonyms: Arc<SynonymTable>) -> Self {
        Self { catalog, synonyms }
    }
}

#[async_trait]
impl SearchStrategy for StrengthFocusedSearch {
    fn name(&self) -> &str {
        STRENGTH_FOCUSED
    }

    fn applies_to(&self, query: &DrugQuery) -> bool {
        Requires::STRENGTH.satisfied_by(query)
    }

    async fn search(&self, query: &DrugQuery, limit: usize) -> SearchResult<Vec<DrugMatch>> {
        let Some(strength) = query.strength() else {
            return Ok(Vec::new());
        };
        let normalized = normalize_strength(strength);
        if normalized.is_empty() {
            debug!(strategy = self.name(), strength, "no numeric strength");
            return Ok(Vec::new());
        }

        let full = strength.to_lowercase();
        let mg = full.contains("mg");
        let variants = name_variants(query, &self.synonyms);
        let catalog_query = templates::strength_focused(&variants, &normalized, &full, mg, limit);

        let rows = self.catalog.execute(&catalog_query).await?;
        let matches: Vec<DrugMatch> = rows
            .into_iter()
            .map(|row| {
                let score = row.score.unwrap_or(0.0);
                let mut m = row.into_match(self.name(), 0.0);
                m.set_confidence(score / MAX_STRENGTH_SCORE);
                m.annotations.strength_score = Some(score);
                m.annotations.normalized_strength = Some(normalized.clone());
                m
            })
            .collect();

        debug!(
            strategy = self.name(),
            normalized = %normalized,
            found = matches.len(),
            "strength-focused search"
        );
        Ok(matches)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategies::testing;
    use proptest::prelude::*;

    #[test]
    fn test_normalize_strength() {
        assert_eq!(normalize_strength("500mg"), "500");
        assert_eq!(normalize_strength("500 MG"), "500");
        assert_eq!(normalize_strength("0.5%"), "0.5");
        assert_eq!(normalize_strength(".5 mg"), "0.5");
        assert_eq!(normalize_strength("007"), "7");
        assert_eq!(normalize_strength("000"), "0");
        assert_eq!(normalize_strength("1,000 mg"), "1000");
        assert_eq!(normalize_strength("500/125 mg"), "500");
        assert_eq!(normalize_strength("mg"), "");
        assert_eq!(normalize_strength(""), "");
    }

    #[test]
    fn test_strength_digits() {
        assert_eq!(strength_digits("500mg"), "500");
        assert_eq!(strength_digits("2.5 MG"), "25");
        assert_eq!(strength_digits("MG"), "");
    }

    proptest! {
        #[test]
        fn normalize_is_idempotent(s in "\\PC{0,24}") {
            let once = normalize_strength(&s);
            prop_assert_eq!(normalize_strength(&once), once);
        }

        #[test]
        fn normalize_numeric_is_idempotent(s in "[0-9., ]{0,6}(mg|MG|mcg|%|ml)?") {
            let once = normalize_strength(&s);
            prop_assert_eq!(normalize_strength(&once), once.clone());
            prop_assert!(once.chars().all(|c| c.is_ascii_digit() || c == '.'));
        }
    }

    #[tokio::test]
    async fn test_strength_focused_scores() {
        let strategy =
            StrengthFocusedSearch::new(testing::catalog(), Arc::new(SynonymTable::default()));
        assert!(!strategy.applies_to(&DrugQuery::new("metformin")));

        let query = DrugQuery::new("metformin").with_strength("500mg");
        let matches = strategy.search(&query, 10).await.unwrap();
        let ids: Vec<_> = matches.iter().filter_map(|m| m.id()).collect();
        assert!(ids.contains(&"R1"));
        assert!(ids.contains(&"B1"));
        assert!(!ids.contains(&"R2"));

        let r1 = matches.iter().find(|m| m.id() == Some("R1")).unwrap();
        assert_eq!(r1.annotations.strength_score, Some(25.0));
        assert_eq!(r1.annotations.normalized_strength.as_deref(), Some("500"));
        assert_eq!(r1.match_confidence, 1.0);
    }

    #[tokio::test]
    async fn test_strength_without_number_is_empty() {
        let strategy =
            StrengthFocusedSearch::new(testing::catalog(), Arc::new(SynonymTable::default()));
        let query = DrugQuery::new("metformin").with_strength("extended release");
        assert!(strategy.search(&query, 5).await.unwrap().is_empty());
    }
}
