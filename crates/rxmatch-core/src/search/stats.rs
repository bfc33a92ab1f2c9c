//! Search counters.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Running totals for one orchestrator. Safe to share across tasks.
#[derive(Debug, Default)]
pub struct SearchStats {
    total_searches: AtomicU64,
    searches_with_matches: AtomicU64,
    strategy_failures: AtomicU64,
    strategy_timeouts: AtomicU64,
}

/// Point-in-time copy of [`SearchStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub total_searches: u64,
    pub searches_with_matches: u64,
    pub strategy_failures: u64,
    pub strategy_timeouts: u64,
}

impl SearchStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_search(&self, found_matches: bool) {
        self.total_searches.fetch_add(1, Ordering::Relaxed);
        if found_matches {
            self.searches_with_matches.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_failure(&self) {
        self.strategy_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_timeout(&self) {
        self.strategy_timeouts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            total_searches: self.total_searches.load(Ordering::Relaxed),
            searches_with_matches: self.searches_with_matches.load(Ordering::Relaxed),
            strategy_failures: self.strategy_failures.load(Ordering::Relaxed),
            strategy_timeouts: self.strategy_timeouts.load(Ordering::Relaxed),
        }
    }
}

impl StatsSnapshot {
    /// Share of searches that returned at least one candidate.
    pub fn match_rate(&self) -> f64 {
        if self.total_searches == 0 {
            0.0
        } else {
            self.searches_with_matches as f64 / self.total_searches as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters() {
        let stats = SearchStats::new();
        assert_eq!(stats.snapshot().match_rate(), 0.0);

        stats.record_search(true);
        stats.record_search(false);
        stats.record_failure();
        stats.record_timeout();
        stats.record_timeout();

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.total_searches, 2);
        assert_eq!(snapshot.searches_with_matches, 1);
        assert_eq!(snapshot.strategy_failures, 1);
        assert_eq!(snapshot.strategy_timeouts, 2);
        assert_eq!(snapshot.match_rate(), 0.5);
    }
}
