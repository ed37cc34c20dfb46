//! Cluster snapshots of rooted trees.
//!
//! # Overview
//! A [`TreeSnapshot`] records, for every node of a [`Tree`], the cluster of
//! leaves below it as a [`Bitset`]. The snapshot is immutable and can be
//! shared across rayon workers.
//!
//! # Leaf indices come from labels, not node ids
//! Node ids depend on how a tree was built. Labels are stable, so leaves are
//! sorted alphabetically and numbered in that order: identical taxa always
//! map to the same bit in every snapshot.
//!
//! ```text
//!       root          a=0 b=1 c=2
//!      /    \
//!     a     node1     node1 = {b,c} = 0b110
//!           /   \     root  = {a,b,c} = 0b111
//!          b     c
//! ```

use crate::bitset::Bitset;
use crate::model::{NodeId, Tree};
use std::collections::{BTreeSet, HashMap};

#[derive(Debug, Clone)]
pub struct TreeSnapshot {
    /// Leaf labels sorted alphabetically; position = bit index.
    pub leaf_names: Vec<String>,
    /// Cluster of every node, indexed by [`NodeId`].
    pub clusters: Vec<Bitset>,
    pub words: usize,
}

impl TreeSnapshot {
    pub fn from_tree(tree: &Tree) -> Self {
        let leaf_names: Vec<String> = tree.leaf_set().into_iter().collect();
        let words = Bitset::words_for(leaf_names.len());
        let index: HashMap<&str, usize> = leaf_names
            .iter()
            .enumerate()
            .map(|(k, name)| (name.as_str(), k))
            .collect();

        let mut clusters = vec![Bitset::zeros(words); tree.len()];
        // Reverse preorder visits children before parents.
        for id in tree.preorder().into_iter().rev() {
            let node = tree.node(id);
            if node.is_leaf() {
                if let Some(&bit) = node.label.as_deref().and_then(|l| index.get(l)) {
                    clusters[id].set(bit);
                }
            } else {
                let mut cluster = Bitset::zeros(words);
                for &child in &node.children {
                    cluster.or_assign(&clusters[child]);
                }
                clusters[id] = cluster;
            }
        }

        TreeSnapshot {
            leaf_names,
            clusters,
            words,
        }
    }

    pub fn num_leaves(&self) -> usize {
        self.leaf_names.len()
    }

    /// Whether `node` lies in the subtree rooted at `ancestor` (inclusive).
    ///
    /// Valid for trees without unary nodes, where distinct nodes on one
    /// root path have distinct clusters.
    #[inline]
    pub fn in_subtree(&self, node: NodeId, ancestor: NodeId) -> bool {
        self.clusters[node].is_subset(&self.clusters[ancestor])
    }

    /// The set of clusters; two rooted trees on the same taxa are isomorphic
    /// iff these sets are equal.
    pub fn cluster_set(&self) -> BTreeSet<Bitset> {
        self.clusters.iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use itertools::Itertools;

    fn snap(text: &str) -> TreeSnapshot {
        TreeSnapshot::from_tree(&Tree::from_newick(text).unwrap())
    }

    #[test]
    fn test_clusters_use_label_order() {
        let s = snap("(a,(b,c));");
        assert_eq!(s.leaf_names, vec!["a", "b", "c"]);
        let root = &s.clusters[0];
        assert_eq!(root.0[0], 0b111);
        assert!(s.clusters.iter().any(|c| c.0[0] == 0b110));
    }

    /// Same taxa written in different orders give the same cluster set.
    #[test]
    fn test_cluster_set_matches_canonical_form() {
        let trees = [
            "((a,b),(c,d));",
            "((d,c),(b,a));",
            "(((a,b),c),d);",
            "(a,(b,(c,d)));",
            "((a,c),(b,d));",
        ];
        for pair in trees.iter().combinations(2) {
            let (x, y) = (pair[0], pair[1]);
            let same_key = Tree::from_newick(x).unwrap().canonical_form()
                == Tree::from_newick(y).unwrap().canonical_form();
            assert_eq!(snap(x).cluster_set() == snap(y).cluster_set(), same_key, "{x} vs {y}");
        }
    }

    #[test]
    fn test_in_subtree() {
        let tree = Tree::from_newick("((a,b),c);").unwrap();
        let s = TreeSnapshot::from_tree(&tree);
        let root = tree.root();
        let ab = tree.children(root)[0];
        let a = tree.children(ab)[0];
        let c = tree.children(root)[1];
        assert!(s.in_subtree(a, ab));
        assert!(s.in_subtree(ab, root));
        assert!(!s.in_subtree(c, ab));
        assert!(!s.in_subtree(root, ab));
    }
}
