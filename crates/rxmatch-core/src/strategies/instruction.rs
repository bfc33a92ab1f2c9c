//! Instruction (sig) driven matching.
//!
//! Route and dose-form hints are read from the free-text directions with fixed
//! keyword sets, then used as catalog filters.

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::try_join_all;
use tracing::debug;

use super::{
    dedupe_by_id, name_variants, normalize_strength, Requires, SearchStrategy,
    COMPREHENSIVE_INSTRUCTION, INSTRUCTION_SEARCH, INSTRUCTION_STRENGTH,
};
use crate::catalog::{templates, CatalogBackend, ContextFilters};
use crate::models::{DrugMatch, DrugQuery};
use crate::search::SearchResult;
use crate::synonyms::SynonymTable;

type HintTable = &'static [(&'static str, &'static [&'static str])];

const ROUTE_HINTS: HintTable = &[
    ("otic", &["ear", "otic", "au", "ad", "as"]),
    ("ophthalmic", &["eye", "ophthalmic", "ou", "od", "os"]),
    ("oral", &["oral", "po", "by mouth", "swallow"]),
    ("topical", &["topical", "apply", "skin"]),
    ("nasal", &["nasal", "nose", "nostril"]),
    ("vaginal", &["vaginal", "vaginally"]),
    ("rectal", &["rectal", "rectally"]),
    ("inhalation", &["inhale", "inhalation", "nebulize"]),
];

const FORM_HINTS: HintTable = &[
    ("tablet", &["tablet", "tab"]),
    ("capsule", &["capsule", "cap"]),
    ("drops", &["drop", "drops", "gtt", "gtts"]),
    ("topical", &["cream", "ointment", "gel", "lotion"]),
    ("injection", &["injection", "inject", "im", "iv", "sq", "sc"]),
    ("patch", &["patch"]),
    ("inhaler", &["inhaler", "puff", "spray"]),
    ("solution", &["liquid", "solution", "syrup"]),
];

const CONTEXT_ROUTES: HintTable = &[
    ("oral", &["oral", "po", "by mouth", "swallow", "take"]),
    ("ophthalmic", &["eye", "ophthalmic", "ou", "od", "os", "instill"]),
    ("otic", &["ear", "otic", "au", "ad", "as"]),
    ("topical", &["topical", "apply", "skin"]),
    ("nasal", &["nasal", "nose", "nostril"]),
    ("inhalation", &["inhale", "inhalation", "puff"]),
];

/// Keywords → dose-form filters for the combined context query.
const CONTEXT_FORMS: &[(&[&str], &[&str])] = &[
    (&["tablet", "tab"], &["tablet"]),
    (&["capsule", "cap"], &["capsule"]),
    (&["drop", "drops", "gtt", "gtts"], &["drops", "solution"]),
    (&["cream", "ointment", "gel"], &["cream", "ointment"]),
    (&["injection", "inject"], &["injection"]),
    (&["inhaler", "spray"], &["inhaler"]),
    (&["liquid", "solution", "syrup"], &["solution", "liquid"]),
];

/// Tokenized instructions for keyword lookup.
struct Sig {
    words: Vec<String>,
    /// Words joined by single spaces, padded with a space on each side
    padded: String,
}

impl Sig {
    fn new(instructions: &str) -> Self {
        let words: Vec<String> = instructions
            .to_lowercase()
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .map(str::to_string)
            .collect();
        let padded = format!(" {} ", words.join(" "));
        Self { words, padded }
    }

    /// Phrases match on word boundaries. Single words match a whole word, its
    /// plural ("tabs", "caps") when at least three letters long, or the start
    /// of a word when at least four letters long.
    fn mentions(&self, keyword: &str) -> bool {
        if keyword.contains(' ') {
            return self.padded.contains(&format!(" {keyword} "));
        }
        self.words.iter().any(|w| {
            w == keyword
                || (keyword.len() >= 3 && is_plural_of(w, keyword))
                || (keyword.len() >= 4 && w.starts_with(keyword))
        })
    }

    fn mentions_any(&self, keywords: &[&str]) -> bool {
        keywords.iter().any(|k| self.mentions(k))
    }

    fn hints(&self, table: HintTable) -> Vec<&'static str> {
        table
            .iter()
            .filter(|(_, keywords)| self.mentions_any(keywords))
            .map(|(hint, _)| *hint)
            .collect()
    }
}

fn is_plural_of(word: &str, keyword: &str) -> bool {
    word.strip_prefix(keyword)
        .is_some_and(|rest| rest == "s" || rest == "es")
}

/// Route and dose-form hints read from prescriber directions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstructionHints {
    pub routes: Vec<&'static str>,
    pub forms: Vec<&'static str>,
}

impl InstructionHints {
    pub fn analyze(instructions: &str) -> Self {
        let sig = Sig::new(instructions);
        Self {
            routes: sig.hints(ROUTE_HINTS),
            forms: sig.hints(FORM_HINTS),
        }
    }

    /// Route and form filters for the combined context query.
    pub fn for_context(instructions: &str) -> Self {
        let sig = Sig::new(instructions);
        let mut forms: Vec<&'static str> = Vec::new();
        for (keywords, filters) in CONTEXT_FORMS {
            if sig.mentions_any(keywords) {
                for f in filters.iter() {
                    if !forms.contains(f) {
                        forms.push(*f);
                    }
                }
            }
        }
        Self {
            routes: sig.hints(CONTEXT_ROUTES),
            forms,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty() && self.forms.is_empty()
    }
}

// ============================================================================
// Route / form search
// ============================================================================

pub const INSTRUCTION_CONFIDENCE: f64 = 0.8;
pub const INSTRUCTION_STRENGTH_CONFIDENCE: f64 = 0.85;

/// One catalog query per route or form hint, combined with the name filter.
pub struct InstructionSearch {
    catalog: Arc<dyn CatalogBackend>,
    with_strength: bool,
}

impl InstructionSearch {
    pub fn new(catalog: Arc<dyn CatalogBackend>, with_strength: bool) -> Self {
        Self {
            catalog,
            with_strength,
        }
    }

    fn requires(&self) -> Requires {
        if self.with_strength {
            Requires::BOTH
        } else {
            Requires::INSTRUCTIONS
        }
    }
}

enum Hint {
    Route(&'static str),
    Form(&'static str),
}

#[async_trait]
impl SearchStrategy for InstructionSearch {
    fn name(&self) -> &str {
        if self.with_strength {
            INSTRUCTION_STRENGTH
        } else {
            INSTRUCTION_SEARCH
        }
    }

    fn applies_to(&self, query: &DrugQuery) -> bool {
        self.requires().satisfied_by(query)
    }

    async fn search(&self, query: &DrugQuery, limit: usize) -> SearchResult<Vec<DrugMatch>> {
        if !self.applies_to(query) {
            return Ok(Vec::new());
        }
        let instructions = query.instructions().unwrap_or_default();
        let strength = query.strength().filter(|_| self.with_strength);

        let hints = InstructionHints::analyze(instructions);
        if hints.is_empty() {
            debug!(strategy = self.name(), "no route or form hints");
            return Ok(Vec::new());
        }

        let name = query.name();
        let all_hints: Vec<Hint> = hints
            .routes
            .iter()
            .map(|r| Hint::Route(*r))
            .chain(hints.forms.iter().map(|f| Hint::Form(*f)))
            .collect();

        let lookups = all_hints.iter().map(|hint| {
            let catalog_query = match (hint, strength) {
                (Hint::Route(r), Some(s)) => templates::route_strength(name, r, s, limit),
                (Hint::Route(r), None) => templates::route_match(name, r, limit),
                (Hint::Form(f), Some(s)) => templates::form_strength(name, f, s, limit),
                (Hint::Form(f), None) => templates::form_match(name, f, limit),
            };
            let catalog = self.catalog.clone();
            async move { catalog.execute(&catalog_query).await }
        });
        let per_hint = try_join_all(lookups).await?;

        let confidence = if self.with_strength {
            INSTRUCTION_STRENGTH_CONFIDENCE
        } else {
            INSTRUCTION_CONFIDENCE
        };
        let mut matches = Vec::new();
        for (hint, rows) in all_hints.iter().zip(per_hint) {
            for row in rows {
                let mut m = row.into_match(self.name(), confidence);
                match hint {
                    Hint::Route(r) => m.annotations.route_matched = Some(r.to_string()),
                    Hint::Form(f) => m.annotations.form_matched = Some(f.to_string()),
                }
                matches.push(m);
            }
        }
        let matches = dedupe_by_id(matches, limit);

        debug!(
            strategy = self.name(),
            routes = hints.routes.len(),
            forms = hints.forms.len(),
            found = matches.len(),
            "instruction search"
        );
        Ok(matches)
    }
}

// ============================================================================
// Comprehensive context search
// ============================================================================

/// Single query combining name variants, strength, route and form.
pub struct ComprehensiveSearch {
    catalog: Arc<dyn CatalogBackend>,
    synonyms: Arc<SynonymTable>,
}

impl ComprehensiveSearch {
    pub fn new(catalog: Arc<dyn CatalogBackend>, synonyms: Arc<SynonymTable>) -> Self {
        Self { catalog, synonyms }
    }

    /// Catalog filters for a query.
    pub fn filters(&self, query: &DrugQuery) -> ContextFilters {
        let hints = query
            .instructions()
            .map(InstructionHints::for_context)
            .unwrap_or_default();
        let strength = query.strength().map(str::to_lowercase);
        let strength_digits = strength
            .as_deref()
            .map(normalize_strength)
            .filter(|n| !n.is_empty());

        ContextFilters {
            variants: name_variants(query, &self.synonyms),
            strength,
            strength_digits,
            routes: hints.routes,
            forms: hints.forms,
        }
    }
}

#[async_trait]
impl SearchStrategy for ComprehensiveSearch {
    fn name(&self) -> &str {
        COMPREHENSIVE_INSTRUCTION
    }

    fn applies_to(&self, query: &DrugQuery) -> bool {
        Requires::INSTRUCTIONS.satisfied_by(query)
    }

    async fn search(&self, query: &DrugQuery, limit: usize) -> SearchResult<Vec<DrugMatch>> {
        let filters = self.filters(query);
        let rows = self
            .catalog
            .execute(&templates::comprehensive_context(&filters, limit))
            .await?;

        let matches: Vec<DrugMatch> = rows
            .into_iter()
            .map(|row| {
                let score = row.score.unwrap_or(0.0);
                let mut m = row.into_match(self.name(), 0.0);
                m.set_confidence(score / 10.0);
                m.annotations.context_score = Some(score);
                m
            })
            .collect();

        debug!(
            strategy = self.name(),
            variants = filters.variants.len(),
            routes = filters.routes.len(),
            forms = filters.forms.len(),
            found = matches.len(),
            "comprehensive search"
        );
        Ok(matches)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategies::testing;

    #[test]
    fn test_route_and_form_hints() {
        let hints = InstructionHints::analyze("Take 1 tablet by mouth twice daily");
        assert_eq!(hints.routes, vec!["oral"]);
        assert_eq!(hints.forms, vec!["tablet"]);

        let hints = InstructionHints::analyze("Instill 1 gtt OU BID");
        assert_eq!(hints.routes, vec!["ophthalmic"]);
        assert_eq!(hints.forms, vec!["drops"]);
    }

    #[test]
    fn test_hints_match_whole_words() {
        // "dose" must not read as "os", "head" must not read as "ad"
        let hints = InstructionHints::analyze("one dose at bedtime for head pain");
        assert!(hints.routes.is_empty());
        assert!(hints.forms.is_empty());

        // Long keywords match word prefixes
        let hints = InstructionHints::analyze("2 capsules, inhaled");
        assert_eq!(hints.forms, vec!["capsule"]);
        assert_eq!(hints.routes, vec!["inhalation"]);
    }

    #[test]
    fn test_abbreviated_plural_forms() {
        assert_eq!(InstructionHints::analyze("take 2 tabs daily").forms, vec!["tablet"]);
        assert_eq!(InstructionHints::analyze("2 caps twice daily").forms, vec!["capsule"]);
        assert_eq!(InstructionHints::analyze("2 puffs q4h prn").forms, vec!["inhaler"]);
        assert_eq!(InstructionHints::for_context("2 tabs daily").forms, vec!["tablet"]);

        // Two-letter abbreviations stay whole-word only
        assert!(InstructionHints::analyze("ims").forms.is_empty());
    }

    #[tokio::test]
    async fn test_comprehensive_reads_abbreviated_sig() {
        let strategy =
            ComprehensiveSearch::new(testing::catalog(), Arc::new(SynonymTable::default()));
        let ids = |matches: Vec<DrugMatch>| -> Vec<String> {
            matches.iter().filter_map(|m| m.id()).map(str::to_string).collect()
        };

        let abbreviated = DrugQuery::new("metformin").with_instructions("2 tabs daily");
        let spelled = DrugQuery::new("metformin").with_instructions("2 tablets daily");
        let abbreviated = ids(strategy.search(&abbreviated, 10).await.unwrap());
        let spelled = ids(strategy.search(&spelled, 10).await.unwrap());

        assert!(abbreviated.contains(&"R1".to_string()));
        assert_eq!(abbreviated, spelled);
    }

    #[test]
    fn test_context_hints() {
        let hints = InstructionHints::for_context("take 5 ml syrup; use drops if needed");
        assert_eq!(hints.routes, vec!["oral"]);
        assert_eq!(hints.forms, vec!["drops", "solution", "liquid"]);
    }

    #[tokio::test]
    async fn test_instruction_search_annotates_hint() {
        let strategy = InstructionSearch::new(testing::catalog(), false);
        let query = DrugQuery::new("timolol").with_instructions("1 drop in each eye");
        assert!(strategy.applies_to(&query));

        let matches = strategy.search(&query, 5).await.unwrap();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].id(), Some("T1"));
        assert_eq!(matches[0].annotations.route_matched.as_deref(), Some("ophthalmic"));
        assert_eq!(matches[0].match_confidence, INSTRUCTION_CONFIDENCE);
    }

    #[tokio::test]
    async fn test_instruction_strength_requires_both() {
        let strategy = InstructionSearch::new(testing::catalog(), true);
        let query = DrugQuery::new("metformin").with_instructions("take by mouth");
        assert!(!strategy.applies_to(&query));

        let query = query.with_strength("850");
        let matches = strategy.search(&query, 5).await.unwrap();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].id(), Some("R2"));
        assert_eq!(matches[0].match_confidence, INSTRUCTION_STRENGTH_CONFIDENCE);
    }

    #[tokio::test]
    async fn test_instruction_without_hints_is_empty() {
        let strategy = InstructionSearch::new(testing::catalog(), false);
        let query = DrugQuery::new("metformin").with_instructions("daily");
        assert!(strategy.search(&query, 5).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_comprehensive_scores() {
        let synonyms = Arc::new(SynonymTable::from_pairs([("metformin", "glucophage")]));
        let strategy = ComprehensiveSearch::new(testing::catalog(), synonyms);
        let query = DrugQuery::new("glucophage")
            .with_strength("500 mg")
            .with_instructions("take 1 tablet by mouth");

        let filters = strategy.filters(&query);
        assert_eq!(filters.variants, vec!["glucophage", "metformin"]);
        assert_eq!(filters.strength_digits.as_deref(), Some("500"));

        let matches = strategy.search(&query, 10).await.unwrap();
        let ids: Vec<_> = matches.iter().filter_map(|m| m.id()).collect();
        assert!(ids.contains(&"R1"));
        assert!(ids.contains(&"B1"));
        assert!(!ids.contains(&"R2"));
        for m in &matches {
            assert_eq!(m.annotations.context_score, Some(10.0));
            assert_eq!(m.match_confidence, 1.0);
        }
    }

    #[tokio::test]
    async fn test_comprehensive_route_tier() {
        let strategy =
            ComprehensiveSearch::new(testing::catalog(), Arc::new(SynonymTable::default()));
        let query = DrugQuery::new("timolol").with_instructions("instill into the eye");
        let matches = strategy.search(&query, 5).await.unwrap();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].annotations.context_score, Some(8.0));
        assert_eq!(matches[0].match_confidence, 0.8);
    }
}
