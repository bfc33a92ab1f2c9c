//! Composite scoring of merged candidates.

use crate::models::{
    clamp_unit, DrugQuery, MergedCandidate, NameMatch, ScoreBreakdown, StrengthMatch,
};
use crate::strategies::{
    strength_digits, BRAND_EXACT, BRAND_STRENGTH, COMPREHENSIVE_INSTRUCTION, EXACT_MATCH,
    EXACT_MATCH_STRENGTH, FUZZY_MATCH_STRENGTH, MAX_STRENGTH_SCORE, STRENGTH_FOCUSED,
    SYNONYM_SEARCH,
};

const BASE_WEIGHT: f64 = 30.0;
const MULTI_STRATEGY_CAP: f64 = 10.0;
const STRENGTH_SCORE_CAP: f64 = 20.0;

/// Bonus for the strategy that claimed the candidate.
pub fn primary_strategy_bonus(strategy: &str) -> f64 {
    match strategy {
        STRENGTH_FOCUSED | COMPREHENSIVE_INSTRUCTION => 15.0,
        EXACT_MATCH | EXACT_MATCH_STRENGTH => 10.0,
        BRAND_EXACT | BRAND_STRENGTH => 8.0,
        FUZZY_MATCH_STRENGTH | SYNONYM_SEARCH => 6.0,
        _ => 3.0,
    }
}

/// Bonus for independent confirmation; zero for a single finder.
pub fn multi_strategy_bonus(finders: usize) -> f64 {
    if finders > 1 {
        (finders as f64 * 2.0).min(MULTI_STRATEGY_CAP)
    } else {
        0.0
    }
}

fn name_match(candidate: Option<&str>, query: &str) -> NameMatch {
    let candidate = candidate.unwrap_or_default().to_lowercase();
    let query = query.to_lowercase();
    if candidate == query {
        NameMatch::Exact
    } else if candidate.contains(&query) || query.contains(&candidate) {
        NameMatch::Partial
    } else {
        NameMatch::Weak
    }
}

fn name_points(kind: NameMatch) -> f64 {
    match kind {
        NameMatch::Exact => 30.0,
        NameMatch::Partial => 20.0,
        NameMatch::Weak => 10.0,
    }
}

fn strength_match(query: &str, row: &str) -> StrengthMatch {
    let query_digits = strength_digits(query);
    if !query_digits.is_empty() && query_digits == strength_digits(row) {
        StrengthMatch::Exact
    } else if row.to_lowercase().contains(&query.to_lowercase()) {
        StrengthMatch::Partial
    } else {
        StrengthMatch::Weak
    }
}

fn strength_points(kind: StrengthMatch) -> f64 {
    match kind {
        StrengthMatch::Exact => 20.0,
        StrengthMatch::Partial => 15.0,
        StrengthMatch::Weak => 5.0,
    }
}

/// Score components for one candidate.
pub fn score_breakdown(candidate: &MergedCandidate, query: &DrugQuery) -> ScoreBreakdown {
    let drug = &candidate.drug;
    let base_confidence = clamp_unit(drug.match_confidence);
    let name_match = name_match(drug.name.as_deref(), query.name());

    let row_strength = drug
        .strength
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty());
    let strength_match = match (query.strength(), row_strength) {
        (Some(q), Some(r)) => Some(strength_match(q, r)),
        _ => None,
    };

    let strength_score_bonus = match drug.annotations.strength_score {
        Some(score) if score > 0.0 => {
            (score / MAX_STRENGTH_SCORE * STRENGTH_SCORE_CAP).min(STRENGTH_SCORE_CAP)
        }
        _ => 0.0,
    };

    ScoreBreakdown {
        base_confidence,
        base_points: base_confidence * BASE_WEIGHT,
        name_match,
        name_points: name_points(name_match),
        strength_match,
        strength_points: strength_match.map(strength_points).unwrap_or(0.0),
        multi_strategy_bonus: multi_strategy_bonus(candidate.found_by.len()),
        primary_strategy_bonus: primary_strategy_bonus(&candidate.primary_strategy),
        strength_score_bonus,
        safety_bonus: query.safety_context.as_ref().map(|_| 0.0),
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Attach composite scores and sort descending. Ties keep merge order.
pub fn score_candidates(
    mut candidates: Vec<MergedCandidate>,
    query: &DrugQuery,
) -> Vec<MergedCandidate> {
    for candidate in &mut candidates {
        let breakdown = score_breakdown(candidate, query);
        candidate.composite_score = Some(round2(breakdown.total()));
        candidate.score_breakdown = Some(breakdown);
    }
    candidates.sort_by(|a, b| {
        let a = a.composite_score.unwrap_or_default();
        let b = b.composite_score.unwrap_or_default();
        b.total_cmp(&a)
    });
    candidates
}
