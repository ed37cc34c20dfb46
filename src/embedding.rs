//! Enumeration of the trees displayed by a network.
//!
//! # Algorithm
//! Each reticulation with `k` incoming arcs contributes a choice among `k`
//! alternatives; the full space is the product of in-degrees. For every
//! combination the displayed tree is materialised (dummy leaves removed,
//! pass-through nodes suppressed, optionally restricted to a leaf subset),
//! its canonical form computed, and the matching multiset entry counted.
//!
//! ```text
//! ((a,(b)#H1),(#H1,c));     H1 parents: [left, right]
//!
//!   choice [0]  ->  ((a,b),c);
//!   choice [1]  ->  ((b,c),a);
//! ```
//!
//! Combinations are visited in lexicographic order (last reticulation varies
//! fastest), so the multiset and every entry's representative tree are
//! identical across runs.

use crate::config::{EmbeddingConfig, cancelled};
use crate::error::{LeafSubsetError, PhyloError, Result};
use crate::model::{CanonicalKey, Network, Tree};
use itertools::Itertools;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::{debug, info};

const PROGRESS_EVERY: u64 = 256;

/// One distinct displayed topology.
#[derive(Debug, Clone)]
pub struct MultisetEntry {
    pub key: CanonicalKey,
    /// Tree from the first combination that produced this topology.
    pub tree: Tree,
    /// Number of reticulation-choice combinations producing this topology.
    pub count: u64,
    /// The first such combination (parent index per reticulation).
    pub witness: Vec<usize>,
}

/// Distinct displayed trees with occurrence counts.
#[derive(Debug, Clone)]
pub struct TreeMultiset {
    leaves: Vec<String>,
    combinations: u128,
    entries: BTreeMap<CanonicalKey, MultisetEntry>,
}

impl TreeMultiset {
    /// Leaf labels the trees were restricted to, sorted.
    pub fn leaves(&self) -> &[String] {
        &self.leaves
    }

    /// Size of the combination space that was explored.
    pub fn combinations(&self) -> u128 {
        self.combinations
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &CanonicalKey) -> Option<&MultisetEntry> {
        self.entries.get(key)
    }

    /// Entries in canonical-form order.
    pub fn iter(&self) -> impl Iterator<Item = &MultisetEntry> {
        self.entries.values()
    }

    pub fn total_count(&self) -> u64 {
        self.entries.values().map(|e| e.count).sum()
    }

    /// Count per canonical form.
    pub fn counts(&self) -> BTreeMap<CanonicalKey, u64> {
        self.entries
            .iter()
            .map(|(key, entry)| (key.clone(), entry.count))
            .collect()
    }

    /// Restrict every entry to `leaves` and merge topologies that coincide.
    pub fn restricted(&self, leaves: &BTreeSet<String>) -> TreeMultiset {
        let mut entries: BTreeMap<CanonicalKey, MultisetEntry> = BTreeMap::new();
        for entry in self.entries.values() {
            let Some(tree) = entry.tree.restrict(leaves) else {
                continue;
            };
            let key = tree.canonical_form();
            entries
                .entry(key.clone())
                .and_modify(|merged| merged.count += entry.count)
                .or_insert_with(|| MultisetEntry {
                    key,
                    tree,
                    count: entry.count,
                    witness: entry.witness.clone(),
                });
        }
        TreeMultiset {
            leaves: leaves.iter().cloned().collect(),
            combinations: self.combinations,
            entries,
        }
    }
}

/// Headline facts about a network.
#[derive(Debug, Clone, Serialize)]
pub struct NetworkSummary {
    pub reticulations: usize,
    pub leaves: Vec<String>,
    /// `None` when the product of in-degrees overflows.
    pub combinations: Option<u128>,
}

impl NetworkSummary {
    pub fn of(network: &Network) -> Self {
        Self {
            reticulations: network.num_reticulations(),
            leaves: network.leaf_labels().into_iter().collect(),
            combinations: network.choice_count(),
        }
    }
}

/// Split a user-typed list such as `"1, 2,3"` into labels.
pub fn parse_leaf_list(text: &str) -> Vec<String> {
    text.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Check that `filter` is a non-empty subset of the network's labelled leaves.
pub fn resolve_leaf_filter(
    network: &Network,
    filter: &[String],
) -> std::result::Result<BTreeSet<String>, LeafSubsetError> {
    if filter.is_empty() {
        return Err(LeafSubsetError::Empty);
    }
    let available = network.leaf_labels();
    let requested: BTreeSet<String> = filter.iter().cloned().collect();
    let unknown: Vec<String> = requested.difference(&available).cloned().collect();
    if !unknown.is_empty() {
        return Err(LeafSubsetError::Unknown(unknown));
    }
    Ok(requested)
}

/// Enumerate the displayed trees of `network`, restricted to `leaf_filter`
/// when given.
///
/// # Errors
/// - [`PhyloError::InvalidLeafSubset`] when the filter is empty or names unknown leaves.
/// - [`PhyloError::UnsupportedScale`] when the combination count exceeds
///   `config.max_combinations`.
/// - [`PhyloError::Cancelled`] when the token fires mid-run.
pub fn enumerate(
    network: &Network,
    leaf_filter: Option<&[String]>,
    config: &EmbeddingConfig,
) -> Result<TreeMultiset> {
    let leaves = match leaf_filter {
        Some(filter) => resolve_leaf_filter(network, filter)?,
        None => network.leaf_labels(),
    };
    let restrict = leaf_filter.map(|_| &leaves);

    let reticulations = network.reticulations();
    let degrees: Vec<usize> = reticulations
        .iter()
        .map(|&r| network.node(r).parents.len())
        .collect();
    let combinations = network.choice_count().unwrap_or(u128::MAX);
    if combinations > config.max_combinations {
        return Err(PhyloError::UnsupportedScale {
            combinations,
            ceiling: config.max_combinations,
        });
    }

    info!(
        reticulations = reticulations.len(),
        leaves = leaves.len(),
        %combinations,
        "enumerating displayed trees"
    );

    let choices: Box<dyn Iterator<Item = Vec<usize>>> = if degrees.is_empty() {
        Box::new(std::iter::once(Vec::new()))
    } else {
        Box::new(degrees.into_iter().map(|d| 0..d).multi_cartesian_product())
    };

    let mut entries: BTreeMap<CanonicalKey, MultisetEntry> = BTreeMap::new();
    let mut visited: u64 = 0;
    for choice in choices {
        if cancelled(&config.cancel) {
            return Err(PhyloError::Cancelled);
        }

        visited += 1;
        let Some(tree) = network.displayed_tree(&choice, restrict) else {
            continue;
        };
        let key = tree.canonical_form();
        match entries.get_mut(&key) {
            Some(entry) => entry.count += 1,
            None => {
                entries.insert(
                    key.clone(),
                    MultisetEntry {
                        key,
                        tree,
                        count: 1,
                        witness: choice,
                    },
                );
            }
        }

        if visited % PROGRESS_EVERY == 0 {
            debug!(visited, distinct = entries.len(), "enumeration progress");
        }
    }

    info!(
        visited,
        distinct = entries.len(),
        "generated all displayed trees"
    );

    Ok(TreeMultiset {
        leaves: leaves.into_iter().collect(),
        combinations,
        entries,
    })
}

/// Per-network memo of multisets keyed by leaf subset.
#[derive(Debug)]
pub struct EmbeddingCache {
    network: Network,
    config: EmbeddingConfig,
    results: HashMap<BTreeSet<String>, TreeMultiset>,
}

impl EmbeddingCache {
    pub fn new(network: Network, config: EmbeddingConfig) -> Self {
        Self {
            network,
            config,
            results: HashMap::new(),
        }
    }

    pub fn network(&self) -> &Network {
        &self.network
    }

    pub fn summary(&self) -> NetworkSummary {
        NetworkSummary::of(&self.network)
    }

    /// Multiset for `leaves` (all leaves when `None`), computed at most once per subset.
    pub fn process(&mut self, leaves: Option<&[String]>) -> Result<&TreeMultiset> {
        let subset = match leaves {
            Some(filter) => resolve_leaf_filter(&self.network, filter)?,
            None => self.network.leaf_labels(),
        };
        if !self.results.contains_key(&subset) {
            let filter: Vec<String> = subset.iter().cloned().collect();
            let multiset = enumerate(&self.network, Some(filter.as_slice()), &self.config)?;
            self.results.insert(subset.clone(), multiset);
        } else {
            debug!(leaves = subset.len(), "reusing cached displayed trees");
        }
        Ok(&self.results[&subset])
    }

    pub fn cached_subsets(&self) -> usize {
        self.results.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CancellationToken;

    const ONE_RETICULATION: &str = "((a,(b)#H1),(#H1,c));";
    const THREE_RETICULATIONS: &str = "(((1,(2)#H2),((#H2,#H3))#H1),(#H1,((3)#H3,4)));";

    fn net(text: &str) -> Network {
        Network::from_newick(text).unwrap()
    }

    fn labels(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_single_reticulation_yields_two_trees() {
        let multiset = enumerate(&net(ONE_RETICULATION), None, &EmbeddingConfig::default()).unwrap();
        assert_eq!(multiset.len(), 2);
        assert_eq!(multiset.total_count(), 2);
        for entry in multiset.iter() {
            assert_eq!(entry.count, 1);
            assert_eq!(entry.tree.num_leaves(), 3);
            assert!(entry.tree.is_binary());
            assert_eq!(
                entry.tree.leaf_set(),
                ["a", "b", "c"].iter().map(|s| s.to_string()).collect::<BTreeSet<_>>()
            );
        }
    }

    #[test]
    fn test_counts_sum_to_choice_space() {
        let network = net(THREE_RETICULATIONS);
        assert_eq!(network.num_reticulations(), 3);
        let multiset = enumerate(&network, None, &EmbeddingConfig::default()).unwrap();
        assert_eq!(multiset.total_count() as u128, network.choice_count().unwrap());
        assert_eq!(multiset.combinations(), 8);
        assert!(multiset.len() <= 8);
    }

    #[test]
    fn test_enumeration_is_deterministic() {
        let network = net(THREE_RETICULATIONS);
        let first = enumerate(&network, None, &EmbeddingConfig::default()).unwrap();
        let second = enumerate(&network, None, &EmbeddingConfig::default()).unwrap();
        assert_eq!(first.counts(), second.counts());
        for (a, b) in first.iter().zip(second.iter()) {
            assert_eq!(a.tree.to_newick(), b.tree.to_newick());
            assert_eq!(a.witness, b.witness);
        }
    }

    #[test]
    fn test_tree_input_yields_itself() {
        let network = net("((a,b),(c,d));");
        let multiset = enumerate(&network, None, &EmbeddingConfig::default()).unwrap();
        assert_eq!(multiset.len(), 1);
        let entry = multiset.iter().next().unwrap();
        assert_eq!(entry.count, 1);
        assert_eq!(entry.key, network.as_tree().unwrap().canonical_form());
    }

    #[test]
    fn test_leaf_filter_matches_restricting_full_multiset() {
        let network = net(THREE_RETICULATIONS);
        let full = enumerate(&network, None, &EmbeddingConfig::default()).unwrap();
        for subset in [labels(&["1", "2", "3"]), labels(&["2", "4"]), labels(&["1", "3", "4"])] {
            let direct =
                enumerate(&network, Some(subset.as_slice()), &EmbeddingConfig::default()).unwrap();
            let keep: BTreeSet<String> = subset.iter().cloned().collect();
            assert_eq!(direct.counts(), full.restricted(&keep).counts());
            assert_eq!(direct.leaves(), subset.as_slice());
        }
    }

    #[test]
    fn test_invalid_leaf_subsets() {
        let network = net(ONE_RETICULATION);
        let err = enumerate(&network, Some(&[][..]), &EmbeddingConfig::default()).unwrap_err();
        assert!(matches!(err, PhyloError::InvalidLeafSubset(LeafSubsetError::Empty)));

        let err = enumerate(&network, Some(labels(&["a", "z"]).as_slice()), &EmbeddingConfig::default())
            .unwrap_err();
        match err {
            PhyloError::InvalidLeafSubset(LeafSubsetError::Unknown(unknown)) => {
                assert_eq!(unknown, vec!["z"])
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_scale_ceiling_is_reported() {
        let config = EmbeddingConfig::default().with_max_combinations(4);
        let err = enumerate(&net(THREE_RETICULATIONS), None, &config).unwrap_err();
        assert!(matches!(
            err,
            PhyloError::UnsupportedScale { combinations: 8, ceiling: 4 }
        ));
    }

    #[test]
    fn test_cancelled_enumeration() {
        let token = CancellationToken::new();
        token.cancel();
        let config = EmbeddingConfig::default().with_cancel(token);
        let err = enumerate(&net(ONE_RETICULATION), None, &config).unwrap_err();
        assert!(matches!(err, PhyloError::Cancelled));
    }

    #[test]
    fn test_cache_reuses_subsets() {
        let mut cache = EmbeddingCache::new(net(THREE_RETICULATIONS), EmbeddingConfig::default());
        let first = cache.process(Some(labels(&["3", "1", "2"]).as_slice())).unwrap().counts();
        let again = cache.process(Some(labels(&["1", "2", "3"]).as_slice())).unwrap().counts();
        assert_eq!(first, again);
        assert_eq!(cache.cached_subsets(), 1);
        cache.process(None).unwrap();
        assert_eq!(cache.cached_subsets(), 2);
        assert_eq!(cache.summary().reticulations, 3);
    }

    #[test]
    fn test_parse_leaf_list() {
        assert_eq!(parse_leaf_list(" 1, 2,,3 "), labels(&["1", "2", "3"]));
    }
}
