//! Drug catalog match models.

use serde::{Deserialize, Serialize};

/// RxNorm term type of a catalog row.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TermType {
    /// Semantic Branded Drug
    Sbd,
    /// Branded Pack
    Bpck,
    /// Semantic Clinical Drug
    Scd,
    /// Generic Pack
    Gpck,
    /// Any other term type (IN, SCDC, BN, ...)
    Other(String),
}

impl TermType {
    /// Term types searched by the brand strategies.
    pub const BRANDED_OR_CLINICAL: [TermType; 4] =
        [TermType::Sbd, TermType::Bpck, TermType::Scd, TermType::Gpck];

    /// Term types that are strictly branded products.
    pub const BRANDED: [TermType; 2] = [TermType::Sbd, TermType::Bpck];

    pub fn code(&self) -> &str {
        match self {
            TermType::Sbd => "SBD",
            TermType::Bpck => "BPCK",
            TermType::Scd => "SCD",
            TermType::Gpck => "GPCK",
            TermType::Other(code) => code,
        }
    }

    /// Ordering used by brand queries: branded products first.
    pub fn brand_rank(&self) -> u8 {
        match self {
            TermType::Sbd => 1,
            TermType::Bpck => 2,
            TermType::Scd => 3,
            TermType::Gpck => 4,
            TermType::Other(_) => 5,
        }
    }
}

/// Strategy-specific extras carried from a strategy through to scoring.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MatchAnnotations {
    /// Route hint from the instructions that produced this row
    #[serde(skip_serializing_if = "Option::is_none")]
    pub route_matched: Option<String>,
    /// Dose form hint from the instructions that produced this row
    #[serde(skip_serializing_if = "Option::is_none")]
    pub form_matched: Option<String>,
    /// Synonym that was searched instead of the query name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub synonym_used: Option<String>,
    /// Query name the synonym was looked up for
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_query: Option<String>,
    /// Raw comprehensive-context score (4, 6, 8 or 10)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context_score: Option<f64>,
    /// Raw strength-focused score (0 - 25)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strength_score: Option<f64>,
    /// Normalized numeric strength the row was matched against
    #[serde(skip_serializing_if = "Option::is_none")]
    pub normalized_strength: Option<String>,
}

/// A single catalog row produced by one search strategy.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DrugMatch {
    /// Catalog concept identifier (RxCUI). Rows without one never reach the merge.
    pub canonical_id: Option<String>,
    pub name: Option<String>,
    pub full_name: Option<String>,
    pub generic_name: Option<String>,
    pub brand_name: Option<String>,
    pub strength: Option<String>,
    pub route: Option<String>,
    pub dose_form: Option<String>,
    pub term_type: Option<String>,
    /// Name of the strategy that produced this row
    pub strategy_name: String,
    /// Strategy-local confidence (0.0 - 1.0)
    pub match_confidence: f64,
    #[serde(default)]
    pub annotations: MatchAnnotations,
}

impl DrugMatch {
    /// Canonical id if present and non-blank.
    pub fn id(&self) -> Option<&str> {
        self.canonical_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
    }

    /// Set the confidence, clamped into [0, 1]. NaN becomes 0.
    pub fn set_confidence(&mut self, confidence: f64) {
        self.match_confidence = clamp_unit(confidence);
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.set_confidence(confidence);
        self
    }
}

/// Clamp a value into [0, 1], mapping NaN to 0.
pub fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}
