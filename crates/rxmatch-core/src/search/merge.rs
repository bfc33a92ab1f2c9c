//! Priority merge of per-strategy results.

use std::collections::HashMap;

use crate::models::{DrugMatch, MergedCandidate};
use crate::strategies::priority_rank;

/// Matches keyed by the strategy that produced them.
pub type StrategyResults = HashMap<String, Vec<DrugMatch>>;

/// Strategy names in merge order: the fixed priority list first, then
/// anything else by name.
pub fn merge_order<'a, I>(names: I) -> Vec<&'a str>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut names: Vec<&str> = names.into_iter().collect();
    names.sort_by_key(|name| (priority_rank(name).unwrap_or(usize::MAX), *name));
    names.dedup();
    names
}

/// Collapse per-strategy matches into one candidate per canonical id.
///
/// The highest-priority strategy that found an id becomes its primary and
/// supplies the row attributes. Rows without an id are dropped. Output is in
/// order of first appearance.
pub fn merge(results: &StrategyResults) -> Vec<MergedCandidate> {
    let mut candidates: Vec<MergedCandidate> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for strategy in merge_order(results.keys().map(String::as_str)) {
        let Some(matches) = results.get(strategy) else {
            continue;
        };
        for m in matches {
            let Some(id) = m.id() else {
                continue;
            };
            match index.get(id) {
                Some(&at) => {
                    candidates[at].add_finder(strategy);
                }
                None => {
                    index.insert(id.to_string(), candidates.len());
                    candidates.push(MergedCandidate::new(m.clone(), strategy));
                }
            }
        }
    }

    candidates
}
