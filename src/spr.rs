//! Native rSPR oracle.
//!
//! # Neighborhood
//! A rooted SPR move cuts the edge above a non-root node `v` and reattaches
//! the detached subtree on an edge outside it (or above the root):
//!
//! ```text
//!        r                        r
//!      /   \     prune a         / \
//!     p     c    regraft        b   x
//!    / \         above c           / \
//!   a   b       -------->         c   a
//! ```
//!
//! The vacated parent becomes unary and is suppressed when the tree is
//! rebuilt. Moves that land back on the input topology are discarded, and
//! duplicates are merged by canonical form.
//!
//! # Distance
//! Exact distance by bidirectional breadth-first search over neighborhoods,
//! always growing the smaller frontier by a full level. A [`SearchBudget`]
//! bounds the number of distinct trees held and the wall-clock time.

use crate::config::SearchBudget;
use crate::error::OracleError;
use crate::model::{CanonicalKey, NodeId, Tree};
use crate::oracle::{RsprOracle, require_same_taxa};
use crate::snapshot::TreeSnapshot;
use std::collections::{BTreeMap, HashMap};
use std::time::Instant;
use tracing::debug;

#[derive(Debug, Clone, Default)]
pub struct SprNeighborhood {
    budget: SearchBudget,
}

impl SprNeighborhood {
    pub fn new(budget: SearchBudget) -> Self {
        Self { budget }
    }

    pub fn budget(&self) -> SearchBudget {
        self.budget
    }

    /// Every tree one rSPR move away from `tree`, ordered by canonical form.
    ///
    /// ```
    /// # use phylonet_rspr::model::Tree;
    /// # use phylonet_rspr::spr::SprNeighborhood;
    /// let tree = Tree::from_newick("(a,(b,c));").unwrap();
    /// assert_eq!(SprNeighborhood::neighborhood(&tree).len(), 2);
    /// ```
    pub fn neighborhood(tree: &Tree) -> Vec<Tree> {
        let own = tree.canonical_form();
        let snapshot = TreeSnapshot::from_tree(tree);
        let children: Vec<Vec<NodeId>> =
            tree.nodes().iter().map(|node| node.children.clone()).collect();
        let mut labels: Vec<Option<String>> =
            tree.nodes().iter().map(|node| node.label.clone()).collect();
        labels.push(None);

        let mut found: BTreeMap<CanonicalKey, Tree> = BTreeMap::new();
        for pruned in 0..tree.len() {
            let Some(parent) = tree.parent(pruned) else {
                continue;
            };
            for target in 0..tree.len() {
                if snapshot.in_subtree(target, pruned) {
                    continue;
                }
                let Some(moved) = regraft(tree, &children, &labels, pruned, parent, target)
                else {
                    continue;
                };
                let key = moved.canonical_form();
                if key != own {
                    found.entry(key).or_insert(moved);
                }
            }
        }
        found.into_values().collect()
    }

    fn search(&self, a: &Tree, b: &Tree) -> Result<u32, OracleError> {
        require_same_taxa(a, b)?;
        let (ka, kb) = (a.canonical_form(), b.canonical_form());
        if ka == kb {
            return Ok(0);
        }

        let started = Instant::now();
        let mut sides = [Frontier::new(ka, a.clone()), Frontier::new(kb, b.clone())];
        loop {
            let (grow, other) = if sides[0].trees.len() <= sides[1].trees.len() {
                (0, 1)
            } else {
                (1, 0)
            };
            if sides[grow].trees.is_empty() {
                return Err(OracleError::Unavailable(
                    "rSPR search exhausted without joining the two trees".to_string(),
                ));
            }

            let depth = sides[grow].depth + 1;
            let level = std::mem::take(&mut sides[grow].trees);
            let mut best: Option<u32> = None;
            for tree in level {
                self.check_budget(started, sides[0].seen.len() + sides[1].seen.len())?;
                for next in Self::neighborhood(&tree) {
                    let key = next.canonical_form();
                    if sides[grow].seen.contains_key(&key) {
                        continue;
                    }
                    if let Some(&there) = sides[other].seen.get(&key) {
                        best = Some(best.map_or(depth + there, |d| d.min(depth + there)));
                    }
                    sides[grow].seen.insert(key, depth);
                    sides[grow].trees.push(next);
                }
            }
            sides[grow].depth = depth;

            if let Some(distance) = best {
                debug!(
                    distance,
                    states = sides[0].seen.len() + sides[1].seen.len(),
                    "rSPR search finished"
                );
                return Ok(distance);
            }
        }
    }

    fn check_budget(&self, started: Instant, states: usize) -> Result<(), OracleError> {
        let out_of_time = self
            .budget
            .timeout
            .is_some_and(|limit| started.elapsed() > limit);
        if out_of_time || states > self.budget.max_states {
            return Err(OracleError::Timeout(started.elapsed()));
        }
        Ok(())
    }
}

impl RsprOracle for SprNeighborhood {
    fn distance(&self, a: &Tree, b: &Tree) -> Result<u32, OracleError> {
        self.search(a, b)
    }

    fn neighbors(&self, tree: &Tree) -> Result<Vec<Tree>, OracleError> {
        Ok(Self::neighborhood(tree))
    }
}

/// One side of the bidirectional search.
struct Frontier {
    seen: HashMap<CanonicalKey, u32>,
    trees: Vec<Tree>,
    depth: u32,
}

impl Frontier {
    fn new(key: CanonicalKey, tree: Tree) -> Self {
        Self {
            seen: HashMap::from([(key, 0)]),
            trees: vec![tree],
            depth: 0,
        }
    }
}

/// Detach `pruned` from `parent` and hang it above `target` under a fresh joint node.
fn regraft(
    tree: &Tree,
    children: &[Vec<NodeId>],
    labels: &[Option<String>],
    pruned: NodeId,
    parent: NodeId,
    target: NodeId,
) -> Option<Tree> {
    let joint = children.len();
    let mut children = children.to_vec();
    children.push(vec![target, pruned]);
    children[parent].retain(|&child| child != pruned);

    let root = match tree.parent(target) {
        Some(above) => {
            for child in children[above].iter_mut().filter(|child| **child == target) {
                *child = joint;
            }
            tree.root()
        }
        None => joint,
    };
    Tree::from_child_lists(root, &children, labels)
}

#[cfg(test)]
mod tests {
    use super::*;
    use itertools::Itertools;
    use std::collections::BTreeSet;
    use std::time::Duration;

    fn tree(text: &str) -> Tree {
        Tree::from_newick(text).unwrap()
    }

    fn keys(trees: &[Tree]) -> BTreeSet<String> {
        trees
            .iter()
            .map(|t| t.canonical_form().as_str().to_string())
            .collect()
    }

    const ROOTED_THREE: [&str; 3] = ["(a,(b,c));", "((a,b),c);", "((a,c),b);"];

    const FOUR_LEAF: [&str; 5] = [
        "(((a,b),c),d);",
        "((a,b),(c,d));",
        "((a,c),(b,d));",
        "(a,(b,(c,d)));",
        "((a,(b,c)),d);",
    ];

    #[test]
    fn test_three_leaf_topologies_are_one_move_apart() {
        for text in ROOTED_THREE {
            let around = keys(&SprNeighborhood::neighborhood(&tree(text)));
            let others: BTreeSet<String> = ROOTED_THREE
                .iter()
                .filter(|&&other| other != text)
                .map(|other| tree(other).canonical_form().as_str().to_string())
                .collect();
            assert_eq!(around, others, "{text}");
        }
    }

    #[test]
    fn test_neighborhood_excludes_self_and_keeps_taxa() {
        for text in FOUR_LEAF {
            let t = tree(text);
            let around = SprNeighborhood::neighborhood(&t);
            assert!(!around.is_empty());
            assert_eq!(keys(&around).len(), around.len());
            let clusters = TreeSnapshot::from_tree(&t).cluster_set();
            for next in &around {
                assert_ne!(next.canonical_form(), t.canonical_form());
                assert_ne!(TreeSnapshot::from_tree(next).cluster_set(), clusters);
                assert_eq!(next.leaf_set(), t.leaf_set());
                assert!(next.is_binary());
            }
        }
    }

    #[test]
    fn test_neighborhood_is_symmetric() {
        for text in FOUR_LEAF {
            let t = tree(text);
            for next in SprNeighborhood::neighborhood(&t) {
                let back = keys(&SprNeighborhood::neighborhood(&next));
                assert!(back.contains(t.canonical_form().as_str()), "{text} -> {next}");
            }
        }
    }

    #[test]
    fn test_regraft_above_root() {
        let around = keys(&SprNeighborhood::neighborhood(&tree("(((a,b),c),d);")));
        // prune c, regraft above the root
        assert!(around.contains("((a,b),(c,d));"));
        assert!(around.contains("(((a,b),d),c);"));
    }

    #[test]
    fn test_distance_contract() {
        let oracle = SprNeighborhood::default();
        for text in FOUR_LEAF {
            assert_eq!(oracle.distance(&tree(text), &tree(text)).unwrap(), 0);
        }
        for pair in FOUR_LEAF.iter().combinations(2) {
            let (a, b) = (tree(pair[0]), tree(pair[1]));
            let forward = oracle.distance(&a, &b).unwrap();
            assert_eq!(forward, oracle.distance(&b, &a).unwrap());
            let adjacent = keys(&SprNeighborhood::neighborhood(&a))
                .contains(b.canonical_form().as_str());
            assert_eq!(forward == 1, adjacent, "{} vs {}", pair[0], pair[1]);
        }
    }

    #[test]
    fn test_distance_two() {
        let oracle = SprNeighborhood::default();
        let d = oracle
            .distance(&tree("((a,b),(c,d));"), &tree("((a,c),(b,d));"))
            .unwrap();
        assert_eq!(d, 2);
    }

    #[test]
    fn test_distance_rejects_different_taxa() {
        let err = SprNeighborhood::default()
            .distance(&tree("((a,b),c);"), &tree("((a,b),d);"))
            .unwrap_err();
        assert_eq!(
            err,
            OracleError::IncompatibleLeafSets(vec!["c".into(), "d".into()])
        );
    }

    #[test]
    fn test_state_budget_times_out() {
        let oracle = SprNeighborhood::new(SearchBudget {
            max_states: 2,
            timeout: Some(Duration::from_secs(60)),
        });
        let err = oracle
            .distance(&tree("((a,b),(c,d));"), &tree("((a,c),(b,d));"))
            .unwrap_err();
        assert!(matches!(err, OracleError::Timeout(_)));
    }
}
