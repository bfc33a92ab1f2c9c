//! Named catalog queries used by the search strategies.
//!
//! Each function builds one [`CatalogQuery`]. Confidence tiers are carried in the
//! query's score expression so rows come back already ranked.

use super::{CatalogQuery, Field, Predicate, ScoreExpr, SortKey};
use crate::models::TermType;

/// Rows fetched for a brute-force embedding scan.
pub const EMBEDDING_SCAN_CAP: usize = 1000;

const NAME_FIELDS: [Field; 2] = [Field::Name, Field::FullName];
const DRUG_FIELDS: [Field; 3] = [Field::Name, Field::FullName, Field::GenericName];

fn name_contains(query: &str) -> Predicate {
    Predicate::any_contains(&NAME_FIELDS, query)
}

fn strength_contains(strength: &str) -> Predicate {
    Predicate::contains(Field::Strength, strength)
}

/// Name or full name contains any of the variants (or the generic name does).
fn any_variant(variants: &[String]) -> Predicate {
    Predicate::any(
        variants
            .iter()
            .map(|v| Predicate::any_contains(&DRUG_FIELDS, v)),
    )
}

// ============================================================================
// Exact / fuzzy
// ============================================================================

pub fn exact_name(query: &str, limit: usize) -> CatalogQuery {
    CatalogQuery::new("exact_name", Predicate::any_equals(&NAME_FIELDS, query)).limit(limit)
}

pub fn exact_name_strength(query: &str, strength: &str, limit: usize) -> CatalogQuery {
    CatalogQuery::new(
        "exact_name_strength",
        Predicate::all([
            Predicate::any_equals(&NAME_FIELDS, query),
            strength_contains(strength),
        ]),
    )
    .limit(limit)
}

/// Substring match in either direction on the name fields.
pub fn fuzzy_name(query: &str, limit: usize) -> CatalogQuery {
    CatalogQuery::new(
        "fuzzy_name",
        Predicate::any([
            Predicate::contains(Field::Name, query),
            Predicate::contains(Field::FullName, query),
            Predicate::contained_in(Field::Name, query),
        ]),
    )
    .scored(
        ScoreExpr::new(0.6)
            .when(Predicate::contains(Field::Name, query), 0.9)
            .when(Predicate::contains(Field::FullName, query), 0.8)
            .when(Predicate::contained_in(Field::Name, query), 0.7),
    )
    .order_by(SortKey::ScoreDesc)
    .limit(limit)
}

pub fn fuzzy_name_strength(query: &str, strength: &str, limit: usize) -> CatalogQuery {
    CatalogQuery::new(
        "fuzzy_name_strength",
        Predicate::all([name_contains(query), strength_contains(strength)]),
    )
    .scored(
        ScoreExpr::new(0.6)
            .when(
                Predicate::all([
                    Predicate::contains(Field::Name, query),
                    strength_contains(strength),
                ]),
                0.95,
            )
            .when(Predicate::contains(Field::Name, query), 0.8)
            .when(
                Predicate::all([
                    Predicate::contains(Field::FullName, query),
                    strength_contains(strength),
                ]),
                0.85,
            )
            .when(Predicate::contains(Field::FullName, query), 0.7),
    )
    .order_by(SortKey::ScoreDesc)
    .limit(limit)
}

/// Any word appears in the name fields. No words means no rows.
pub fn word_overlap(words: &[String], limit: usize) -> CatalogQuery {
    CatalogQuery::new(
        "word_overlap",
        Predicate::any(words.iter().map(|w| name_contains(w))),
    )
    .limit(limit)
}

// ============================================================================
// Brand
// ============================================================================

fn brand_types() -> Predicate {
    Predicate::TermTypeIn(TermType::BRANDED_OR_CLINICAL.to_vec())
}

pub fn brand_exact(query: &str, limit: usize) -> CatalogQuery {
    CatalogQuery::new(
        "brand_exact",
        Predicate::all([
            brand_types(),
            Predicate::any_equals(&[Field::Name, Field::FullName, Field::BrandName], query),
        ]),
    )
    .order_by(SortKey::BrandRank)
    .limit(limit)
}

pub fn brand_fuzzy(query: &str, limit: usize) -> CatalogQuery {
    CatalogQuery::new(
        "brand_fuzzy",
        Predicate::all([
            brand_types(),
            Predicate::any([
                Predicate::contains(Field::Name, query),
                Predicate::contains(Field::FullName, query),
                Predicate::contains(Field::BrandName, query),
                Predicate::contained_in(Field::Name, query),
            ]),
        ]),
    )
    .scored(
        ScoreExpr::new(0.7)
            .when(Predicate::contains(Field::Name, query), 0.9)
            .when(Predicate::contains(Field::FullName, query), 0.85)
            .when(Predicate::contains(Field::BrandName, query), 0.8)
            .when(Predicate::contained_in(Field::Name, query), 0.75),
    )
    .order_by(SortKey::ScoreDesc)
    .order_by(SortKey::BrandRank)
    .limit(limit)
}

pub fn brand_strength(query: &str, strength: &str, limit: usize) -> CatalogQuery {
    CatalogQuery::new(
        "brand_strength",
        Predicate::all([
            brand_types(),
            Predicate::any_contains(&[Field::Name, Field::BrandName], query),
            strength_contains(strength),
        ]),
    )
    .order_by(SortKey::BrandRank)
    .limit(limit)
}

/// Branded products whose names or generic name mention the query.
pub fn generic_to_brand(query: &str, limit: usize) -> CatalogQuery {
    CatalogQuery::new(
        "generic_to_brand",
        Predicate::all([
            Predicate::TermTypeIn(TermType::BRANDED.to_vec()),
            Predicate::any_contains(&DRUG_FIELDS, query),
        ]),
    )
    .order_by(SortKey::TermType)
    .limit(limit)
}

// ============================================================================
// Synonym
// ============================================================================

pub fn synonym_name(synonym: &str, limit: usize) -> CatalogQuery {
    CatalogQuery::new(
        "synonym_name",
        Predicate::any([
            Predicate::any_equals(&NAME_FIELDS, synonym),
            name_contains(synonym),
        ]),
    )
    .scored(
        ScoreExpr::new(0.7)
            .when(Predicate::equals(Field::Name, synonym), 0.95)
            .when(Predicate::equals(Field::FullName, synonym), 0.9)
            .when(Predicate::contains(Field::Name, synonym), 0.8)
            .when(Predicate::contains(Field::FullName, synonym), 0.75),
    )
    .order_by(SortKey::ScoreDesc)
    .limit(limit)
}

pub fn synonym_strength(synonym: &str, strength: &str, limit: usize) -> CatalogQuery {
    CatalogQuery::new(
        "synonym_strength",
        Predicate::all([name_contains(synonym), strength_contains(strength)]),
    )
    .scored(
        ScoreExpr::new(0.8)
            .when(Predicate::contains(Field::Name, synonym), 0.95)
            .when(Predicate::contains(Field::FullName, synonym), 0.9),
    )
    .order_by(SortKey::ScoreDesc)
    .limit(limit)
}

// ============================================================================
// Embedding
// ============================================================================

/// Every row carrying an embedding, up to `cap`.
pub fn embedded_rows(cap: usize) -> CatalogQuery {
    CatalogQuery::new("embedded_rows", Predicate::HasEmbedding)
        .with_embedding()
        .limit(cap)
}

pub fn embedded_rows_with_strength(strength: &str, cap: usize) -> CatalogQuery {
    CatalogQuery::new(
        "embedded_rows_strength",
        Predicate::all([Predicate::HasEmbedding, strength_contains(strength)]),
    )
    .with_embedding()
    .limit(cap)
}

// ============================================================================
// Instruction
// ============================================================================

pub fn route_match(query: &str, route: &str, limit: usize) -> CatalogQuery {
    CatalogQuery::new(
        "route_match",
        Predicate::all([name_contains(query), Predicate::contains(Field::Route, route)]),
    )
    .limit(limit)
}

pub fn form_match(query: &str, form: &str, limit: usize) -> CatalogQuery {
    CatalogQuery::new(
        "form_match",
        Predicate::all([
            name_contains(query),
            Predicate::contains(Field::DoseForm, form),
        ]),
    )
    .limit(limit)
}

pub fn route_strength(query: &str, route: &str, strength: &str, limit: usize) -> CatalogQuery {
    CatalogQuery::new(
        "route_strength",
        Predicate::all([
            name_contains(query),
            Predicate::contains(Field::Route, route),
            strength_contains(strength),
        ]),
    )
    .limit(limit)
}

pub fn form_strength(query: &str, form: &str, strength: &str, limit: usize) -> CatalogQuery {
    CatalogQuery::new(
        "form_strength",
        Predicate::all([
            name_contains(query),
            Predicate::contains(Field::DoseForm, form),
            strength_contains(strength),
        ]),
    )
    .limit(limit)
}

/// Filters for the single combined context query.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContextFilters {
    /// Query name followed by its synonyms, lowercased
    pub variants: Vec<String>,
    /// Lowercased strength as written, used for scoring
    pub strength: Option<String>,
    /// Digits of the strength; the strength filter applies only when present
    pub strength_digits: Option<String>,
    pub routes: Vec<&'static str>,
    pub forms: Vec<&'static str>,
}

/// Drug variants AND strength AND route AND form, scored 10/8/6/4.
pub fn comprehensive_context(filters: &ContextFilters, limit: usize) -> CatalogQuery {
    let mut clauses = vec![any_variant(&filters.variants)];

    if let (Some(digits), Some(strength)) = (&filters.strength_digits, &filters.strength) {
        clauses.push(Predicate::any([
            strength_contains(digits),
            strength_contains(strength),
            Predicate::equals(Field::Strength, strength.as_str()),
        ]));
    }
    if !filters.routes.is_empty() {
        clauses.push(Predicate::any(
            filters
                .routes
                .iter()
                .map(|r| Predicate::contains(Field::Route, *r)),
        ));
    }
    if !filters.forms.is_empty() {
        clauses.push(Predicate::any(
            filters
                .forms
                .iter()
                .map(|f| Predicate::contains(Field::DoseForm, *f)),
        ));
    }

    let mut score = ScoreExpr::new(4.0);
    if let Some(strength) = &filters.strength {
        score = score.when(strength_contains(strength), 10.0);
    }
    if let Some(route) = filters.routes.first() {
        score = score.when(Predicate::contains(Field::Route, *route), 8.0);
    }
    if let Some(form) = filters.forms.first() {
        score = score.when(Predicate::contains(Field::DoseForm, *form), 6.0);
    }

    CatalogQuery::new("comprehensive_context", Predicate::All(clauses))
        .scored(score)
        .order_by(SortKey::ScoreDesc)
        .order_by(SortKey::TermType)
        .limit(limit)
}

// ============================================================================
// Strength-focused
// ============================================================================

/// Drug variants AND any strength spelling, scored 25/20/15.
///
/// `normalized` is the bare number ("500"); `full` the lowercased strength as
/// written ("500mg"). With `mg` set, "500 mg" and "500mg" are also accepted.
pub fn strength_focused(
    variants: &[String],
    normalized: &str,
    full: &str,
    mg: bool,
    limit: usize,
) -> CatalogQuery {
    let mut strengths = vec![strength_contains(normalized), strength_contains(full)];
    if mg {
        strengths.push(strength_contains(&format!("{normalized} mg")));
        strengths.push(strength_contains(&format!("{normalized}mg")));
    }

    CatalogQuery::new(
        "strength_focused",
        Predicate::all([any_variant(variants), Predicate::Any(strengths)]),
    )
    .scored(
        ScoreExpr::new(15.0)
            .when(strength_contains(normalized), 25.0)
            .when(strength_contains(full), 20.0),
    )
    .order_by(SortKey::ScoreDesc)
    .order_by(SortKey::TermType)
    .limit(limit)
}
