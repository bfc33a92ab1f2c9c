//! RxMatch Core Library
//!
//! Parallel multi-strategy matching of noisy prescription drug names against
//! an RxNorm-style drug catalog.
//!
//! # Architecture
//!
//! ```text
//!                      DrugQuery (name, strength?, instructions?, safety?)
//!                                          │
//!                              ┌───────────▼───────────┐
//!                              │  SearchOrchestrator   │
//!                              │  applicable strategies│
//!                              └───────────┬───────────┘
//!          ┌──────────┬──────────┬─────────┼─────────┬──────────┬──────────┐
//!          ▼          ▼          ▼         ▼         ▼          ▼          ▼
//!        Exact      Fuzzy      Brand    Synonym  Embedding  Instruction Strength
//!          │          │          │         │         │          │          │
//!          └──────────┴──────────┴────┬────┴─────────┴──────────┴──────────┘
//!                                     ▼
//!                       Priority merge (one candidate per RxCUI)
//!                                     │
//!                              Composite scoring
//!                                     │
//!                                  Top-K
//! ```
//!
//! # Core Principle
//!
//! **A failing strategy never fails the search.** Errors and timeouts become
//! empty result sets; the caller only ever sees zero or more ranked candidates.
//!
//! # Modules
//!
//! - [`models`]: Domain types (DrugQuery, DrugMatch, MergedCandidate, CatalogDrug)
//! - [`catalog`]: Query builder, query templates and the SQLite catalog backend
//! - [`embedding`]: Embedding client and vector index seam
//! - [`synonyms`]: Bidirectional synonym table
//! - [`strategies`]: The search strategies
//! - [`search`]: Orchestrator, merge and scoring
//! - [`config`]: Search configuration

pub mod catalog;
pub mod config;
pub mod embedding;
pub mod models;
pub mod search;
pub mod strategies;
pub mod synonyms;

// Re-export commonly used types
pub use catalog::{CatalogBackend, CatalogError, SqliteCatalog};
pub use config::{ConfigError, SearchConfig};
pub use embedding::{CatalogScan, DisabledEmbedder, Embedder, GeminiEmbedder, VectorIndex};
pub use models::{CatalogDrug, DrugMatch, DrugQuery, MergedCandidate, SafetyContext};
pub use search::{SearchError, SearchOrchestrator, SearchOutcome, SearchStats, StrategyReport};
pub use strategies::{SearchStrategy, StrategyDeps};
pub use synonyms::{SynonymError, SynonymTable};
