//! Compact bitset for leaf clusters of rooted trees.
//!
//! # Overview
//! A cluster is the set of leaves below a node. With leaves mapped to indices
//! (sorted by label), a cluster is stored one bit per leaf.
//!
//! # Example
//! For leaves [a, b, c, d] mapped to indices [0, 1, 2, 3]:
//! - cluster {a, c}    → `0b0101`
//! - cluster {b, c, d} → `0b1110`
//!
//! Cluster containment answers "is node w inside the subtree of v", which the
//! rSPR neighborhood needs for every prune/regraft pair.

/// A compact bitset over leaf indices, stored in `u64` words.
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Bitset(pub Vec<u64>);

impl Bitset {
    /// All-zero bitset with room for `words * 64` leaves.
    ///
    /// ```
    /// # use phylonet_rspr::bitset::Bitset;
    /// let bs = Bitset::zeros(2);
    /// assert_eq!(bs.0.len(), 2);
    /// ```
    pub fn zeros(words: usize) -> Self {
        Bitset(vec![0u64; words])
    }

    /// Number of words needed for `n` leaves.
    pub fn words_for(n: usize) -> usize {
        n.div_ceil(64).max(1)
    }

    /// Marks leaf `idx` as present.
    ///
    /// ```
    /// # use phylonet_rspr::bitset::Bitset;
    /// let mut bs = Bitset::zeros(1);
    /// bs.set(0);
    /// bs.set(5);
    /// assert_eq!(bs.0[0], 0b00100001);
    /// ```
    #[inline]
    pub fn set(&mut self, idx: usize) {
        self.0[idx >> 6] |= 1u64 << (idx & 63);
    }

    /// Union in place: `self` becomes `self ∪ other`.
    #[inline]
    pub fn or_assign(&mut self, other: &Bitset) {
        for (a, b) in self.0.iter_mut().zip(&other.0) {
            *a |= *b;
        }
    }

    /// `self ⊆ other`.
    ///
    /// ```
    /// # use phylonet_rspr::bitset::Bitset;
    /// let mut small = Bitset::zeros(1);
    /// small.set(1);
    /// let mut big = small.clone();
    /// big.set(2);
    /// assert!(small.is_subset(&big));
    /// assert!(!big.is_subset(&small));
    /// ```
    #[inline]
    pub fn is_subset(&self, other: &Bitset) -> bool {
        self.0.iter().zip(&other.0).all(|(a, b)| a & !b == 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bitset_basic() {
        let mut bs = Bitset::zeros(1);
        bs.set(0);
        bs.set(2);
        assert_eq!(bs.0[0], 0b0101);
    }

    /// ```text
    ///           root
    ///          /    \
    ///        node1   d
    ///        /   \
    ///       a    node2
    ///            /   \
    ///           b     c
    /// ```
    /// node2 = {b, c} ⊆ node1 = {a, b, c}, while {d} is outside node1.
    #[test]
    fn test_cluster_containment() {
        let mut node2 = Bitset::zeros(1);
        node2.set(1);
        node2.set(2);

        let mut node1 = Bitset::zeros(1);
        node1.set(0);
        node1.or_assign(&node2);
        assert_eq!(node1.0[0], 0b0111);

        let mut d = Bitset::zeros(1);
        d.set(3);

        assert!(node2.is_subset(&node1));
        assert!(!d.is_subset(&node1));
        assert!(node1.is_subset(&node1));
    }

    #[test]
    fn test_large_tree() {
        let mut bs = Bitset::zeros(Bitset::words_for(128));
        bs.set(0);
        bs.set(63);
        bs.set(64);
        bs.set(127);

        let edges = 1u64 | (1u64 << 63);
        assert_eq!(bs.0, vec![edges, edges]);
    }

    #[test]
    fn test_words_for() {
        assert_eq!(Bitset::words_for(0), 1);
        assert_eq!(Bitset::words_for(64), 1);
        assert_eq!(Bitset::words_for(65), 2);
    }
}
