//! Search strategies.
//!
//! Every strategy turns a [`DrugQuery`] into catalog matches tagged with its own
//! name. Strategies report backend failures as errors; the orchestrator decides
//! what an error means for the batch.

mod brand;
mod embedding;
mod exact;
mod fuzzy;
mod instruction;
mod strength;
mod synonym;

pub use brand::*;
pub use embedding::*;
pub use exact::*;
pub use fuzzy::*;
pub use instruction::*;
pub use strength::*;
pub use synonym::*;

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;

use crate::catalog::CatalogBackend;
use crate::config::SearchConfig;
use crate::embedding::{Embedder, VectorIndex};
use crate::models::{DrugMatch, DrugQuery};
use crate::search::SearchResult;
use crate::synonyms::SynonymTable;

pub const EXACT_MATCH: &str = "exact_match";
pub const EXACT_MATCH_STRENGTH: &str = "exact_match_strength";
pub const FUZZY_MATCH: &str = "fuzzy_match";
pub const FUZZY_MATCH_STRENGTH: &str = "fuzzy_match_strength";
pub const WORD_OVERLAP: &str = "word_overlap";
pub const EMBEDDING_SEARCH: &str = "embedding_search";
pub const EMBEDDING_STRENGTH: &str = "embedding_strength";
pub const BRAND_EXACT: &str = "brand_exact";
pub const BRAND_FUZZY: &str = "brand_fuzzy";
pub const GENERIC_TO_BRAND: &str = "generic_to_brand";
pub const BRAND_STRENGTH: &str = "brand_strength";
pub const SYNONYM_SEARCH: &str = "synonym_search";
pub const SYNONYM_STRENGTH: &str = "synonym_strength";
pub const INSTRUCTION_SEARCH: &str = "instruction_search";
pub const INSTRUCTION_STRENGTH: &str = "instruction_strength";
pub const COMPREHENSIVE_INSTRUCTION: &str = "comprehensive_instruction";
pub const STRENGTH_FOCUSED: &str = "strength_focused";

/// Merge order, most trusted first.
pub const PRIORITY: [&str; 17] = [
    STRENGTH_FOCUSED,
    COMPREHENSIVE_INSTRUCTION,
    EXACT_MATCH,
    EXACT_MATCH_STRENGTH,
    BRAND_EXACT,
    BRAND_STRENGTH,
    FUZZY_MATCH_STRENGTH,
    FUZZY_MATCH,
    SYNONYM_SEARCH,
    SYNONYM_STRENGTH,
    EMBEDDING_SEARCH,
    EMBEDDING_STRENGTH,
    INSTRUCTION_SEARCH,
    INSTRUCTION_STRENGTH,
    BRAND_FUZZY,
    GENERIC_TO_BRAND,
    WORD_OVERLAP,
];

/// Position in [`PRIORITY`], or `None` for strategies outside the fixed order.
pub fn priority_rank(name: &str) -> Option<usize> {
    PRIORITY.iter().position(|p| *p == name)
}

/// Which optional inputs a strategy needs before it can run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Requires {
    pub strength: bool,
    pub instructions: bool,
}

impl Requires {
    pub const NOTHING: Requires = Requires {
        strength: false,
        instructions: false,
    };
    pub const STRENGTH: Requires = Requires {
        strength: true,
        instructions: false,
    };
    pub const INSTRUCTIONS: Requires = Requires {
        strength: false,
        instructions: true,
    };
    pub const BOTH: Requires = Requires {
        strength: true,
        instructions: true,
    };

    pub fn satisfied_by(&self, query: &DrugQuery) -> bool {
        (!self.strength || query.strength().is_some())
            && (!self.instructions || query.instructions().is_some())
    }
}

/// One independent search algorithm.
#[async_trait]
pub trait SearchStrategy: Send + Sync {
    /// Name stamped on every match this strategy produces.
    fn name(&self) -> &str;

    /// Whether the query carries the inputs this strategy needs.
    fn applies_to(&self, query: &DrugQuery) -> bool;

    /// At most `limit` matches, most relevant first.
    async fn search(&self, query: &DrugQuery, limit: usize) -> SearchResult<Vec<DrugMatch>>;
}

/// Shared services the built-in strategies are constructed from.
#[derive(Clone)]
pub struct StrategyDeps {
    pub catalog: Arc<dyn CatalogBackend>,
    pub synonyms: Arc<SynonymTable>,
    pub embedder: Arc<dyn Embedder>,
    pub index: Arc<dyn VectorIndex>,
}

/// All built-in strategies, in priority order.
pub fn default_strategies(
    deps: &StrategyDeps,
    config: &SearchConfig,
) -> Vec<Arc<dyn SearchStrategy>> {
    let catalog = &deps.catalog;
    let synonyms = &deps.synonyms;
    let embedding = |with_strength: bool| {
        EmbeddingSearch::new(deps.embedder.clone(), deps.index.clone(), with_strength)
            .with_thresholds(config.embedding_threshold, config.embedding_strength_threshold)
            .with_strength_boost(config.embedding_strength_boost)
    };

    vec![
        shared(StrengthFocusedSearch::new(catalog.clone(), synonyms.clone())),
        shared(ComprehensiveSearch::new(catalog.clone(), synonyms.clone())),
        shared(ExactSearch::new(catalog.clone(), false)),
        shared(ExactSearch::new(catalog.clone(), true)),
        shared(BrandSearch::new(catalog.clone(), BrandMode::Exact)),
        shared(BrandSearch::new(catalog.clone(), BrandMode::Strength)),
        shared(FuzzySearch::new(catalog.clone(), FuzzyMode::NameStrength)),
        shared(FuzzySearch::new(catalog.clone(), FuzzyMode::Name)),
        shared(SynonymSearch::new(catalog.clone(), synonyms.clone(), false)),
        shared(SynonymSearch::new(catalog.clone(), synonyms.clone(), true)),
        shared(embedding(false)),
        shared(embedding(true)),
        shared(InstructionSearch::new(catalog.clone(), false)),
        shared(InstructionSearch::new(catalog.clone(), true)),
        shared(BrandSearch::new(catalog.clone(), BrandMode::Fuzzy)),
        shared(BrandSearch::new(catalog.clone(), BrandMode::GenericToBrand)),
        shared(FuzzySearch::new(catalog.clone(), FuzzyMode::WordOverlap)),
    ]
}

fn shared<S: SearchStrategy + 'static>(strategy: S) -> Arc<dyn SearchStrategy> {
    Arc::new(strategy)
}

/// Keep the first match per canonical id, drop id-less rows, cap at `limit`.
pub(crate) fn dedupe_by_id(matches: Vec<DrugMatch>, limit: usize) -> Vec<DrugMatch> {
    let mut seen = HashSet::new();
    matches
        .into_iter()
        .filter(|m| match m.id() {
            Some(id) => seen.insert(id.to_string()),
            None => false,
        })
        .take(limit)
        .collect()
}

/// Lowercased query name followed by its synonyms.
pub(crate) fn name_variants(query: &DrugQuery, synonyms: &SynonymTable) -> Vec<String> {
    let name = query.name().to_lowercase();
    let mut variants = vec![name.clone()];
    variants.extend(
        synonyms
            .get_synonyms(&name)
            .into_iter()
            .filter(|s| *s != name),
    );
    variants
}
