//! Property tests for merge and scoring.

use std::collections::HashSet;

use proptest::prelude::*;

use rxmatch_core::catalog::CatalogRow;
use rxmatch_core::models::{CatalogDrug, DrugMatch, DrugQuery, MergedCandidate};
use rxmatch_core::search::{merge, multi_strategy_bonus, score_candidates, StrategyResults};
use rxmatch_core::strategies::{normalize_strength, priority_rank, PRIORITY};

fn strategy_name() -> impl Strategy<Value = String> {
    prop_oneof![
        4 => (0..PRIORITY.len()).prop_map(|i| PRIORITY[i].to_string()),
        1 => "custom_[a-c]".prop_map(String::from),
    ]
}

fn drug_id() -> impl Strategy<Value = Option<String>> {
    prop_oneof![
        6 => (0u8..6).prop_map(|n| Some(format!("R{n}"))),
        1 => Just(None),
        1 => Just(Some(String::new())),
    ]
}

fn strategy_results() -> impl Strategy<Value = StrategyResults> {
    prop::collection::vec(
        (strategy_name(), prop::collection::vec(drug_id(), 0..6)),
        0..10,
    )
    .prop_map(|entries| {
        let mut results = StrategyResults::new();
        for (strategy, ids) in entries {
            let rows: Vec<DrugMatch> = ids
                .into_iter()
                .map(|id| DrugMatch {
                    canonical_id: id,
                    strategy_name: strategy.clone(),
                    match_confidence: 0.5,
                    ..Default::default()
                })
                .collect();
            results.entry(strategy).or_default().extend(rows);
        }
        results
    })
}

/// Merge rank: fixed priority first, unknown strategies after by name.
fn rank(name: &str) -> (usize, String) {
    (priority_rank(name).unwrap_or(usize::MAX), name.to_string())
}

proptest! {
    #[test]
    fn merged_ids_are_unique(results in strategy_results()) {
        let merged = merge(&results);
        let mut seen = HashSet::new();
        for candidate in &merged {
            prop_assert!(!candidate.canonical_id().is_empty());
            prop_assert!(seen.insert(candidate.canonical_id().to_string()));
        }
    }

    #[test]
    fn primary_is_highest_priority_finder(results in strategy_results()) {
        for candidate in merge(&results) {
            let finders: Vec<&String> = results
                .iter()
                .filter(|(_, rows)| rows.iter().any(|m| m.id() == Some(candidate.canonical_id())))
                .map(|(name, _)| name)
                .collect();
            let best = finders.iter().map(|name| rank(name)).min().unwrap();
            prop_assert_eq!(rank(&candidate.primary_strategy), best);
            prop_assert_eq!(&candidate.found_by[0], &candidate.primary_strategy);
            prop_assert_eq!(candidate.found_by.len(), finders.len());

            let ranks: Vec<_> = candidate.found_by.iter().map(|name| rank(name)).collect();
            let mut sorted = ranks.clone();
            sorted.sort();
            prop_assert_eq!(ranks, sorted);
        }
    }

    #[test]
    fn multi_bonus_is_monotonic(a in 0usize..20, b in 0usize..20) {
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        prop_assert!(multi_strategy_bonus(lo) <= multi_strategy_bonus(hi));
        prop_assert!(multi_strategy_bonus(hi) <= 10.0);
        prop_assert!(multi_strategy_bonus(lo) >= 0.0);
    }

    #[test]
    fn more_finders_never_score_lower(extra in 0usize..8) {
        let drug = DrugMatch {
            canonical_id: Some("R1".into()),
            name: Some("metformin".into()),
            strength: Some("500 MG".into()),
            strategy_name: "fuzzy_match".into(),
            match_confidence: 0.7,
            ..Default::default()
        };
        let single = MergedCandidate::new(drug.clone(), "fuzzy_match");
        let mut several = MergedCandidate::new(drug, "fuzzy_match");
        for i in 0..extra {
            several.add_finder(&format!("custom_{i}"));
        }

        let query = DrugQuery::new("metformin").with_strength("500mg");
        let scored = score_candidates(vec![single, several], &query);
        let by_finders = |n: usize| {
            scored
                .iter()
                .find(|c| c.found_by.len() == n)
                .and_then(|c| c.composite_score)
                .unwrap()
        };
        prop_assert!(by_finders(extra + 1) >= by_finders(1));
    }

    #[test]
    fn confidence_is_clamped(score in prop::num::f64::ANY, default in -2.0f64..3.0) {
        let drug = CatalogDrug::new("R1", "metformin");
        let scored = CatalogRow::new(drug.clone()).with_score(score).into_match("x", default);
        prop_assert!((0.0..=1.0).contains(&scored.match_confidence));
        let unscored = CatalogRow::new(drug).into_match("x", default);
        prop_assert!((0.0..=1.0).contains(&unscored.match_confidence));
    }

    #[test]
    fn scored_candidates_are_sorted(results in strategy_results()) {
        let scored = score_candidates(merge(&results), &DrugQuery::new("R1"));
        let scores: Vec<f64> = scored.iter().filter_map(|c| c.composite_score).collect();
        prop_assert_eq!(scores.len(), scored.len());
        prop_assert!(scores.windows(2).all(|w| w[0] >= w[1]));
    }

    #[test]
    fn normalized_strength_is_stable(s in "[0-9a-zA-Z.,%/ ]{0,16}") {
        let once = normalize_strength(&s);
        prop_assert_eq!(normalize_strength(&once), once);
    }
}
