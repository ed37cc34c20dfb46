//! Boundary to the rSPR distance / neighborhood computation.
//!
//! The graph builder only relies on the contract below:
//! - `distance(a, b) == distance(b, a)`, and it is `0` iff the canonical forms match;
//! - `neighbors(t)` is finite, deterministic in content and never contains `t`.
//!
//! Implementations: [`crate::spr::SprNeighborhood`] (in-process) and
//! [`crate::external::ExternalRspr`] (subprocess). Tests use in-memory tables.

use crate::error::OracleError;
use crate::model::Tree;

/// Outcome of comparing one pair of trees.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Comparison {
    pub distance: u32,
    /// Agreement forest components, one Newick string each.
    pub forest: Option<Vec<String>>,
}

pub trait RsprOracle: Send + Sync {
    /// rSPR distance between two trees on the same taxa.
    fn distance(&self, a: &Tree, b: &Tree) -> Result<u32, OracleError>;

    /// All trees one rSPR move away from `tree`.
    fn neighbors(&self, tree: &Tree) -> Result<Vec<Tree>, OracleError>;

    /// Distance and, when the oracle produces one, a maximum agreement
    /// forest, both from a single computation.
    fn compare(&self, a: &Tree, b: &Tree) -> Result<Comparison, OracleError> {
        self.distance(a, b).map(|distance| Comparison {
            distance,
            forest: None,
        })
    }
}

impl<O: RsprOracle + ?Sized> RsprOracle for Box<O> {
    fn distance(&self, a: &Tree, b: &Tree) -> Result<u32, OracleError> {
        (**self).distance(a, b)
    }

    fn neighbors(&self, tree: &Tree) -> Result<Vec<Tree>, OracleError> {
        (**self).neighbors(tree)
    }

    fn compare(&self, a: &Tree, b: &Tree) -> Result<Comparison, OracleError> {
        (**self).compare(a, b)
    }
}

/// Fails with [`OracleError::IncompatibleLeafSets`] unless both trees have the same taxa.
pub fn require_same_taxa(a: &Tree, b: &Tree) -> Result<(), OracleError> {
    let (la, lb) = (a.leaf_set(), b.leaf_set());
    if la == lb {
        return Ok(());
    }
    let missing = la.symmetric_difference(&lb).cloned().collect();
    Err(OracleError::IncompatibleLeafSets(missing))
}

#[cfg(test)]
pub(crate) mod stub {
    //! Deterministic table-driven oracle for engine tests.

    use super::*;
    use crate::model::CanonicalKey;
    use std::collections::{HashMap, HashSet};
    use std::sync::Mutex;

    #[derive(Default)]
    pub struct TableOracle {
        pub neighbors: HashMap<CanonicalKey, Vec<String>>,
        pub distances: HashMap<(CanonicalKey, CanonicalKey), u32>,
        pub failing: HashSet<(CanonicalKey, CanonicalKey)>,
        pub forests: HashMap<(CanonicalKey, CanonicalKey), Vec<String>>,
        pub calls: Mutex<usize>,
    }

    pub fn key(text: &str) -> CanonicalKey {
        Tree::from_newick(text).unwrap().canonical_form()
    }

    fn ordered(a: CanonicalKey, b: CanonicalKey) -> (CanonicalKey, CanonicalKey) {
        if a <= b { (a, b) } else { (b, a) }
    }

    impl TableOracle {
        pub fn with_neighbors(mut self, tree: &str, around: &[&str]) -> Self {
            self.neighbors
                .insert(key(tree), around.iter().map(|s| s.to_string()).collect());
            self
        }

        pub fn with_distance(mut self, a: &str, b: &str, d: u32) -> Self {
            self.distances.insert(ordered(key(a), key(b)), d);
            self
        }

        pub fn with_forest(mut self, a: &str, b: &str, forest: &[&str]) -> Self {
            self.forests.insert(
                ordered(key(a), key(b)),
                forest.iter().map(|s| s.to_string()).collect(),
            );
            self
        }

        pub fn failing_on(mut self, a: &str, b: &str) -> Self {
            self.failing.insert(ordered(key(a), key(b)));
            self
        }

        pub fn call_count(&self) -> usize {
            *self.calls.lock().unwrap()
        }
    }

    impl RsprOracle for TableOracle {
        fn distance(&self, a: &Tree, b: &Tree) -> Result<u32, OracleError> {
            *self.calls.lock().unwrap() += 1;
            let pair = ordered(a.canonical_form(), b.canonical_form());
            if pair.0 == pair.1 {
                return Ok(0);
            }
            if self.failing.contains(&pair) {
                return Err(OracleError::Unavailable("stub failure".to_string()));
            }
            self.distances
                .get(&pair)
                .copied()
                .ok_or_else(|| OracleError::Unavailable("pair not in table".to_string()))
        }

        fn compare(&self, a: &Tree, b: &Tree) -> Result<Comparison, OracleError> {
            let distance = self.distance(a, b)?;
            let pair = ordered(a.canonical_form(), b.canonical_form());
            Ok(Comparison {
                distance,
                forest: self.forests.get(&pair).cloned(),
            })
        }

        fn neighbors(&self, tree: &Tree) -> Result<Vec<Tree>, OracleError> {
            *self.calls.lock().unwrap() += 1;
            Ok(self
                .neighbors
                .get(&tree.canonical_form())
                .map(|list| {
                    list.iter()
                        .map(|text| Tree::from_newick(text).unwrap())
                        .collect()
                })
                .unwrap_or_default())
        }
    }
}
