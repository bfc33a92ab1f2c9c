//! Parallel search orchestration.
//!
//! Pipeline: Fan-out (all applicable strategies) → Priority merge → Scoring → Top-K

mod merge;
mod scoring;
mod stats;

pub use merge::*;
pub use scoring::*;
pub use stats::*;

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::join_all;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::catalog::CatalogError;
use crate::config::SearchConfig;
use crate::embedding::EmbeddingError;
use crate::models::{DrugMatch, DrugQuery, MergedCandidate};
use crate::strategies::{default_strategies, SearchStrategy, StrategyDeps};

/// Search errors.
#[derive(Error, Debug)]
pub enum SearchError {
    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),

    #[error("Embedding error: {0}")]
    Embedding(#[from] EmbeddingError),
}

pub type SearchResult<T> = Result<T, SearchError>;

/// How one strategy invocation ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyOutcome {
    Found(usize),
    Empty,
    Failed(String),
    TimedOut,
}

impl StrategyOutcome {
    /// Whether the strategy contributed nothing because something went wrong.
    pub fn is_error(&self) -> bool {
        matches!(self, StrategyOutcome::Failed(_) | StrategyOutcome::TimedOut)
    }
}

/// Per-strategy record of a search.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StrategyReport {
    pub name: String,
    pub outcome: StrategyOutcome,
    #[serde(rename = "elapsed_ms", serialize_with = "as_millis")]
    pub elapsed: Duration,
}

fn as_millis<S: serde::Serializer>(elapsed: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(elapsed.as_millis() as u64)
}

/// Scored candidates plus what each strategy did.
#[derive(Debug, Clone, Serialize)]
pub struct SearchOutcome {
    /// Correlates this search with its log lines
    pub search_id: Uuid,
    pub candidates: Vec<MergedCandidate>,
    pub reports: Vec<StrategyReport>,
}

/// Runs every applicable strategy concurrently and ranks the union.
pub struct SearchOrchestrator {
    strategies: Vec<Arc<dyn SearchStrategy>>,
    config: SearchConfig,
    stats: Arc<SearchStats>,
}

impl SearchOrchestrator {
    pub fn new(strategies: Vec<Arc<dyn SearchStrategy>>, config: SearchConfig) -> Self {
        Self {
            strategies,
            config,
            stats: Arc::new(SearchStats::new()),
        }
    }

    /// Orchestrator over the built-in strategies.
    pub fn with_defaults(deps: &StrategyDeps, config: SearchConfig) -> Self {
        Self::new(default_strategies(deps, &config), config)
    }

    /// Share counters with other orchestrators.
    pub fn with_stats(mut self, stats: Arc<SearchStats>) -> Self {
        self.stats = stats;
        self
    }

    /// Register an additional strategy.
    pub fn register(&mut self, strategy: Arc<dyn SearchStrategy>) {
        self.strategies.push(strategy);
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    pub fn stats(&self) -> &SearchStats {
        &self.stats
    }

    /// Ranked candidates for `query`, using the configured per-strategy limit.
    pub async fn search(&self, query: &DrugQuery) -> Vec<MergedCandidate> {
        self.search_detailed(query, self.config.limit_per_method)
            .await
            .candidates
    }

    /// Ranked candidates with an explicit per-strategy limit.
    pub async fn search_with_limit(
        &self,
        query: &DrugQuery,
        limit_per_method: usize,
    ) -> Vec<MergedCandidate> {
        self.search_detailed(query, limit_per_method).await.candidates
    }

    /// Ranked candidates plus a report per strategy that ran.
    pub async fn search_detailed(&self, query: &DrugQuery, limit_per_method: usize) -> SearchOutcome {
        let search_id = Uuid::new_v4();
        let started = Instant::now();
        let (results, reports) = self.fan_out(query, limit_per_method).await;

        let merged = merge(&results);
        let mut candidates = score_candidates(merged, query);
        candidates.truncate(self.config.top_k);

        self.stats.record_search(!candidates.is_empty());
        info!(
            %search_id,
            drug = query.name(),
            strategies = reports.len(),
            failed = reports.iter().filter(|r| r.outcome.is_error()).count(),
            candidates = candidates.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "search complete"
        );

        SearchOutcome {
            search_id,
            candidates,
            reports,
        }
    }

    /// Run all applicable strategies concurrently and collect their matches.
    ///
    /// Failures, panics and timeouts become empty result sets; the reports
    /// keep the distinction.
    pub async fn fan_out(
        &self,
        query: &DrugQuery,
        limit: usize,
    ) -> (StrategyResults, Vec<StrategyReport>) {
        let applicable: Vec<Arc<dyn SearchStrategy>> = self
            .strategies
            .iter()
            .filter(|s| s.applies_to(query))
            .cloned()
            .collect();
        debug!(
            drug = query.name(),
            applicable = applicable.len(),
            registered = self.strategies.len(),
            "fanning out"
        );

        let budget = self.config.strategy_timeout();
        let batch_started = Instant::now();
        let tasks = applicable.iter().map(|strategy| {
            let strategy = strategy.clone();
            let query = query.clone();
            tokio::spawn(async move {
                let started = Instant::now();
                let result = tokio::time::timeout(budget, strategy.search(&query, limit)).await;
                (result, started.elapsed())
            })
        });
        let joined = join_all(tasks).await;

        let mut results = StrategyResults::new();
        let mut reports = Vec::with_capacity(applicable.len());
        for (strategy, joined) in applicable.iter().zip(joined) {
            let name = strategy.name().to_string();
            let (outcome, matches, elapsed): (_, Vec<DrugMatch>, _) = match joined {
                Ok((Ok(Ok(matches)), elapsed)) if matches.is_empty() => {
                    (StrategyOutcome::Empty, matches, elapsed)
                }
                Ok((Ok(Ok(matches)), elapsed)) => {
                    (StrategyOutcome::Found(matches.len()), matches, elapsed)
                }
                Ok((Ok(Err(e)), elapsed)) => {
                    warn!(strategy = %name, error = %e, "strategy failed");
                    self.stats.record_failure();
                    (StrategyOutcome::Failed(e.to_string()), Vec::new(), elapsed)
                }
                Ok((Err(_), elapsed)) => {
                    warn!(strategy = %name, timeout_ms = budget.as_millis() as u64, "strategy timed out");
                    self.stats.record_timeout();
                    (StrategyOutcome::TimedOut, Vec::new(), elapsed)
                }
                Err(e) => {
                    warn!(strategy = %name, error = %e, "strategy task aborted");
                    self.stats.record_failure();
                    (
                        StrategyOutcome::Failed(e.to_string()),
                        Vec::new(),
                        batch_started.elapsed(),
                    )
                }
            };

            debug!(strategy = %name, outcome = ?outcome, elapsed_ms = elapsed.as_millis() as u64, "strategy finished");
            results.entry(name.clone()).or_default().extend(matches);
            reports.push(StrategyReport {
                name,
                outcome,
                elapsed,
            });
        }

        (results, reports)
    }
}
