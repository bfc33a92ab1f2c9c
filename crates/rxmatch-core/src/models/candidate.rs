//! Merged and scored candidate models.

use serde::{Deserialize, Serialize};

use super::DrugMatch;

/// A deduplicated catalog concept annotated with the strategies that found it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MergedCandidate {
    /// Row attributes from the highest-priority strategy that found this id
    #[serde(flatten)]
    pub drug: DrugMatch,
    /// Distinct strategy names, in merge order
    pub found_by: Vec<String>,
    /// First (highest-priority) strategy that found this id
    pub primary_strategy: String,
    /// Composite relevance score, set by scoring
    #[serde(skip_serializing_if = "Option::is_none")]
    pub composite_score: Option<f64>,
    /// How the composite score was assembled
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score_breakdown: Option<ScoreBreakdown>,
}

impl MergedCandidate {
    /// Start a candidate from the first row seen for its id.
    pub fn new(drug: DrugMatch, strategy: &str) -> Self {
        Self {
            drug,
            found_by: vec![strategy.to_string()],
            primary_strategy: strategy.to_string(),
            composite_score: None,
            score_breakdown: None,
        }
    }

    pub fn canonical_id(&self) -> &str {
        self.drug.id().unwrap_or_default()
    }

    /// Record another strategy that found this id. Returns false if already recorded.
    pub fn add_finder(&mut self, strategy: &str) -> bool {
        if self.found_by.iter().any(|s| s == strategy) {
            return false;
        }
        self.found_by.push(strategy.to_string());
        true
    }
}

/// Quality of the name comparison.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NameMatch {
    Exact,
    Partial,
    Weak,
}

/// Quality of the strength comparison.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StrengthMatch {
    /// Digit sequences equal
    Exact,
    /// Query strength is a substring of the row strength
    Partial,
    Weak,
}

/// Breakdown of how a candidate was scored. All values are points.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScoreBreakdown {
    /// Clamped strategy confidence the base points came from
    pub base_confidence: f64,
    /// match_confidence * 30
    pub base_points: f64,
    pub name_match: NameMatch,
    /// 30 / 20 / 10
    pub name_points: f64,
    /// Absent when the query or the row has no strength
    pub strength_match: Option<StrengthMatch>,
    /// 20 / 15 / 5, or 0 when not compared
    pub strength_points: f64,
    /// Up to 10 for confirmation by several strategies
    pub multi_strategy_bonus: f64,
    /// 15 / 10 / 8 / 6 / 3 by primary strategy
    pub primary_strategy_bonus: f64,
    /// Up to 20 from the strength-focused raw score
    pub strength_score_bonus: f64,
    /// Present only when a safety context was supplied
    pub safety_bonus: Option<f64>,
}

impl ScoreBreakdown {
    /// Sum of all components.
    pub fn total(&self) -> f64 {
        self.base_points
            + self.name_points
            + self.strength_points
            + self.multi_strategy_bonus
            + self.primary_strategy_bonus
            + self.strength_score_bonus
            + self.safety_bonus.unwrap_or(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_finder_dedupes() {
        let drug = DrugMatch {
            canonical_id: Some("R1".into()),
            ..Default::default()
        };
        let mut candidate = MergedCandidate::new(drug, "exact_match");
        assert!(candidate.add_finder("fuzzy_match"));
        assert!(!candidate.add_finder("exact_match"));
        assert!(!candidate.add_finder("fuzzy_match"));
        assert_eq!(candidate.found_by, vec!["exact_match", "fuzzy_match"]);
        assert_eq!(candidate.primary_strategy, "exact_match");
        assert_eq!(candidate.canonical_id(), "R1");
    }

    #[test]
    fn test_breakdown_total() {
        let breakdown = ScoreBreakdown {
            base_confidence: 1.0,
            base_points: 30.0,
            name_match: NameMatch::Exact,
            name_points: 30.0,
            strength_match: None,
            strength_points: 0.0,
            multi_strategy_bonus: 4.0,
            primary_strategy_bonus: 10.0,
            strength_score_bonus: 0.0,
            safety_bonus: Some(0.0),
        };
        assert!((breakdown.total() - 74.0).abs() < 1e-9);
    }

    #[test]
    fn test_serializes_flat() {
        let drug = DrugMatch {
            canonical_id: Some("R1".into()),
            name: Some("metformin".into()),
            strategy_name: "exact_match".into(),
            match_confidence: 1.0,
            ..Default::default()
        };
        let candidate = MergedCandidate::new(drug, "exact_match");
        let json = serde_json::to_value(&candidate).unwrap();
        assert_eq!(json["canonical_id"], "R1");
        assert_eq!(json["primary_strategy"], "exact_match");
        assert!(json.get("composite_score").is_none());
    }
}
