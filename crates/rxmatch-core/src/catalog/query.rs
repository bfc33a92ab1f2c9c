//! Typed catalog query builder.
//!
//! Queries are assembled from predicate trees and compiled to parameterized SQL.
//! User-supplied text only ever travels as a bound parameter.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use crate::models::TermType;

/// Catalog column a predicate can test.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Name,
    FullName,
    GenericName,
    BrandName,
    Strength,
    Route,
    DoseForm,
    TermType,
}

impl Field {
    pub fn column(&self) -> &'static str {
        match self {
            Field::Name => "d.name",
            Field::FullName => "d.full_name",
            Field::GenericName => "d.generic_name",
            Field::BrandName => "d.brand_name",
            Field::Strength => "d.strength",
            Field::Route => "d.route",
            Field::DoseForm => "d.dose_form",
            Field::TermType => "d.term_type",
        }
    }
}

/// Row filter. Text comparisons are case-insensitive; a missing field never matches.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// Field equals the value
    Equals(Field, String),
    /// Field contains the value
    Contains(Field, String),
    /// Value contains the field (an empty field never matches)
    ContainedIn(Field, String),
    /// Term type is one of the given types
    TermTypeIn(Vec<TermType>),
    /// Row carries a precomputed embedding
    HasEmbedding,
    /// At least one predicate holds (empty = false)
    Any(Vec<Predicate>),
    /// Every predicate holds (empty = true)
    All(Vec<Predicate>),
}

impl Predicate {
    pub fn equals(field: Field, value: impl Into<String>) -> Self {
        Predicate::Equals(field, value.into())
    }

    pub fn contains(field: Field, value: impl Into<String>) -> Self {
        Predicate::Contains(field, value.into())
    }

    pub fn contained_in(field: Field, value: impl Into<String>) -> Self {
        Predicate::ContainedIn(field, value.into())
    }

    pub fn any(predicates: impl IntoIterator<Item = Predicate>) -> Self {
        Predicate::Any(predicates.into_iter().collect())
    }

    pub fn all(predicates: impl IntoIterator<Item = Predicate>) -> Self {
        Predicate::All(predicates.into_iter().collect())
    }

    /// `value` contained in any of `fields`.
    pub fn any_contains(fields: &[Field], value: &str) -> Self {
        Predicate::any(fields.iter().map(|f| Predicate::contains(*f, value)))
    }

    /// Any of `fields` equals `value`.
    pub fn any_equals(fields: &[Field], value: &str) -> Self {
        Predicate::any(fields.iter().map(|f| Predicate::equals(*f, value)))
    }
}

/// Ordered CASE tiers: the first matching predicate supplies the score.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreExpr {
    pub tiers: Vec<(Predicate, f64)>,
    pub default: f64,
}

impl ScoreExpr {
    pub fn new(default: f64) -> Self {
        Self {
            tiers: Vec::new(),
            default,
        }
    }

    pub fn when(mut self, predicate: Predicate, score: f64) -> Self {
        self.tiers.push((predicate, score));
        self
    }
}

/// Result ordering key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortKey {
    /// Computed score, highest first
    ScoreDesc,
    /// SBD, BPCK, SCD, GPCK, then everything else
    BrandRank,
    /// Term type code, alphabetical
    TermType,
}

/// A bound parameter value.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Text(String),
    Integer(i64),
}

/// Query text plus its named parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledQuery {
    pub text: String,
    /// Placeholder name (with leading ':') → value
    pub params: BTreeMap<String, ParamValue>,
}

/// A read-only query against the drug catalog.
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogQuery {
    /// Template name, used in logs
    pub label: &'static str,
    pub filter: Predicate,
    pub score: Option<ScoreExpr>,
    pub order: Vec<SortKey>,
    pub limit: Option<usize>,
    pub include_embedding: bool,
}

impl CatalogQuery {
    pub fn new(label: &'static str, filter: Predicate) -> Self {
        Self {
            label,
            filter,
            score: None,
            order: Vec::new(),
            limit: None,
            include_embedding: false,
        }
    }

    pub fn scored(mut self, score: ScoreExpr) -> Self {
        self.score = Some(score);
        self
    }

    pub fn order_by(mut self, key: SortKey) -> Self {
        self.order.push(key);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_embedding(mut self) -> Self {
        self.include_embedding = true;
        self
    }

    /// Compile to SQLite SQL over the `drugs` table.
    pub fn to_sql(&self) -> CompiledQuery {
        let mut compiler = Compiler::default();

        let filter = compiler.predicate(&self.filter);
        let score = match &self.score {
            Some(expr) => compiler.score(expr),
            None => "NULL".to_string(),
        };
        let embedding = if self.include_embedding {
            "d.embedding"
        } else {
            "NULL"
        };

        let mut text = format!(
            "SELECT d.rxcui, d.name, d.full_name, d.generic_name, d.brand_name, \
             d.strength, d.route, d.dose_form, d.term_type, \
             {score} AS score, {embedding} AS embedding \
             FROM drugs d WHERE {filter} ORDER BY "
        );

        for key in &self.order {
            match key {
                SortKey::ScoreDesc => text.push_str("score DESC"),
                SortKey::BrandRank => text.push_str(&brand_rank_sql()),
                SortKey::TermType => text.push_str("d.term_type"),
            }
            text.push_str(", ");
        }
        text.push_str("d.rowid");

        if let Some(limit) = self.limit {
            let name = compiler.bind(ParamValue::Integer(limit as i64));
            let _ = write!(text, " LIMIT {name}");
        }

        CompiledQuery {
            text,
            params: compiler.params,
        }
    }
}

/// Name of the SQL function that folds a column like [`fold_case`]. Backends
/// must register it on every connection.
pub const FOLD_FN: &str = "rx_fold";

/// Unicode case folding applied to both bound values and catalog columns.
pub fn fold_case(text: &str) -> String {
    text.to_lowercase()
}

/// `CASE` expression ranking rows by [`TermType::brand_rank`].
fn brand_rank_sql() -> String {
    let mut sql = String::from("CASE upper(d.term_type)");
    for term_type in &TermType::BRANDED_OR_CLINICAL {
        let _ = write!(sql, " WHEN '{}' THEN {}", term_type.code(), term_type.brand_rank());
    }
    let _ = write!(sql, " ELSE {} END", TermType::Other(String::new()).brand_rank());
    sql
}

#[derive(Default)]
struct Compiler {
    params: BTreeMap<String, ParamValue>,
}

impl Compiler {
    /// Bind a value, reusing the placeholder of an identical earlier value.
    fn bind(&mut self, value: ParamValue) -> String {
        if let Some((name, _)) = self.params.iter().find(|(_, v)| **v == value) {
            return name.clone();
        }
        let name = format!(":p{}", self.params.len() + 1);
        self.params.insert(name.clone(), value);
        name
    }

    fn bind_folded(&mut self, value: &str) -> String {
        self.bind(ParamValue::Text(fold_case(value)))
    }

    fn predicate(&mut self, predicate: &Predicate) -> String {
        match predicate {
            Predicate::Equals(field, value) => {
                let p = self.bind_folded(value);
                format!("{FOLD_FN}({}) = {p}", field.column())
            }
            Predicate::Contains(field, value) => {
                let p = self.bind_folded(value);
                format!("instr({FOLD_FN}({}), {p}) > 0", field.column())
            }
            Predicate::ContainedIn(field, value) => {
                let p = self.bind_folded(value);
                let col = field.column();
                format!("(length({col}) > 0 AND instr({p}, {FOLD_FN}({col})) > 0)")
            }
            Predicate::TermTypeIn(types) => {
                if types.is_empty() {
                    return "0".to_string();
                }
                let names: Vec<String> = types
                    .iter()
                    .map(|t| self.bind(ParamValue::Text(t.code().to_uppercase())))
                    .collect();
                format!("upper(d.term_type) IN ({})", names.join(", "))
            }
            Predicate::HasEmbedding => "d.embedding IS NOT NULL".to_string(),
            Predicate::Any(items) => self.join(items, " OR ", "0"),
            Predicate::All(items) => self.join(items, " AND ", "1"),
        }
    }

    fn join(&mut self, items: &[Predicate], sep: &str, empty: &str) -> String {
        if items.is_empty() {
            return empty.to_string();
        }
        let parts: Vec<String> = items.iter().map(|p| self.predicate(p)).collect();
        format!("({})", parts.join(sep))
    }

    fn score(&mut self, expr: &ScoreExpr) -> String {
        if expr.tiers.is_empty() {
            return format!("{:?}", expr.default);
        }
        let mut sql = String::from("CASE");
        for (predicate, score) in &expr.tiers {
            let cond = self.predicate(predicate);
            let _ = write!(sql, " WHEN {cond} THEN {score:?}");
        }
        let _ = write!(sql, " ELSE {:?} END", expr.default);
        sql
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_values_are_bound_not_interpolated() {
        let query = CatalogQuery::new(
            "test",
            Predicate::equals(Field::Name, "Robert'); DROP TABLE drugs;--"),
        );
        let compiled = query.to_sql();
        assert!(!compiled.text.contains("DROP TABLE"));
        assert_eq!(
            compiled.params.get(":p1"),
            Some(&ParamValue::Text("robert'); drop table drugs;--".into()))
        );
    }

    #[test]
    fn test_repeated_values_share_placeholder() {
        let query = CatalogQuery::new(
            "test",
            Predicate::any_contains(&[Field::Name, Field::FullName], "Metformin"),
        )
        .limit(5);
        let compiled = query.to_sql();
        assert_eq!(compiled.params.len(), 2);
        assert!(compiled.text.contains("instr(rx_fold(d.name), :p1) > 0"));
        assert!(compiled.text.contains("instr(rx_fold(d.full_name), :p1) > 0"));
        assert!(compiled.text.ends_with("LIMIT :p2"));
        assert_eq!(compiled.params.get(":p2"), Some(&ParamValue::Integer(5)));
    }

    #[test]
    fn test_score_tiers_compile_to_case() {
        let query = CatalogQuery::new("test", Predicate::contains(Field::Name, "asa")).scored(
            ScoreExpr::new(0.6)
                .when(Predicate::contains(Field::Name, "asa"), 0.9)
                .when(Predicate::contains(Field::FullName, "asa"), 0.8),
        );
        let compiled = query.to_sql();
        assert!(compiled.text.contains("CASE WHEN"));
        assert!(compiled.text.contains("THEN 0.9"));
        assert!(compiled.text.contains("ELSE 0.6 END AS score"));
    }

    #[test]
    fn test_empty_groups() {
        let none = CatalogQuery::new("test", Predicate::Any(vec![])).to_sql();
        assert!(none.text.contains("WHERE 0 ORDER BY"));
        let all = CatalogQuery::new("test", Predicate::All(vec![])).to_sql();
        assert!(all.text.contains("WHERE 1 ORDER BY"));
    }

    #[test]
    fn test_order_keys() {
        let compiled = CatalogQuery::new("test", Predicate::HasEmbedding)
            .order_by(SortKey::ScoreDesc)
            .order_by(SortKey::BrandRank)
            .with_embedding()
            .to_sql();
        assert!(compiled.text.contains("d.embedding AS embedding"));
        assert!(compiled.text.contains("ORDER BY score DESC, CASE upper(d.term_type)"));
        assert!(compiled.text.contains("ELSE 5 END, d.rowid"));
    }

    #[test]
    fn test_brand_rank_sql_follows_term_types() {
        let sql = brand_rank_sql();
        for term_type in &TermType::BRANDED_OR_CLINICAL {
            let arm = format!("WHEN '{}' THEN {}", term_type.code(), term_type.brand_rank());
            assert!(sql.contains(&arm), "missing {arm}");
        }
        assert!(sql.ends_with("ELSE 5 END"));
    }
}
