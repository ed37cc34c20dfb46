//! Canonical tree model: arena trees and networks addressed by integer index.
//!
//! # Overview
//! Both [`Tree`] and [`Network`] store their nodes in a `Vec` and refer to
//! each other by [`NodeId`]. A network node lists all its parents
//! explicitly; nodes with two or more parents are reticulation vertices.
//!
//! # Identity
//! Two trees are "the same" exactly when their [`CanonicalKey`]s are equal.
//! The key is a Newick string in which the children of every node are
//! sorted by their own key, so it is independent of input child order and
//! of arena numbering:
//! ```text
//! (c,(b,a));   ->  ((a,b),c);
//! ((a,b),c);   ->  ((a,b),c);
//! ```
//! Only leaf labels take part; internal labels are dropped at parse time.

use crate::error::FormatError;
use crate::newick::{self, RawTree, quote_label};
use itertools::Itertools;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;

pub type NodeId = usize;

/// Deduplication key of a tree topology.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct CanonicalKey(String);

impl CanonicalKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CanonicalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TreeNode {
    pub label: Option<String>,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
}

impl TreeNode {
    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }
}

/// An immutable rooted tree.
#[derive(Debug, Clone)]
pub struct Tree {
    nodes: Vec<TreeNode>,
    root: NodeId,
}

impl Tree {
    /// Parse a standard Newick tree. Every leaf must be labelled.
    ///
    /// ```
    /// # use phylonet_rspr::model::Tree;
    /// let a = Tree::from_newick("(c,(b,a));").unwrap();
    /// let b = Tree::from_newick("((a,b),c);").unwrap();
    /// assert_eq!(a.canonical_form(), b.canonical_form());
    /// ```
    pub fn from_newick(text: &str) -> Result<Self, FormatError> {
        let network = Network::from_newick(text)?;
        let reticulations = network.num_reticulations();
        if reticulations > 0 {
            return Err(FormatError::UnexpectedReticulation(reticulations));
        }
        if network
            .leaves()
            .any(|id| network.node(id).label.is_none())
        {
            return Err(FormatError::UnlabelledLeaf);
        }
        network
            .displayed_tree(&[], None)
            .ok_or(FormatError::NoLabelledLeaf)
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, id: NodeId) -> &TreeNode {
        &self.nodes[id]
    }

    pub fn nodes(&self) -> &[TreeNode] {
        &self.nodes
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id].parent
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id].children
    }

    pub fn leaves(&self) -> impl Iterator<Item = NodeId> + '_ {
        (0..self.nodes.len()).filter(|&id| self.nodes[id].is_leaf())
    }

    pub fn num_leaves(&self) -> usize {
        self.leaves().count()
    }

    /// Set of leaf labels.
    pub fn leaf_set(&self) -> BTreeSet<String> {
        self.leaves()
            .filter_map(|id| self.nodes[id].label.clone())
            .collect()
    }

    pub fn is_binary(&self) -> bool {
        self.nodes
            .iter()
            .all(|n| n.children.is_empty() || n.children.len() == 2)
    }

    /// Node ids in preorder from the root.
    pub fn preorder(&self) -> Vec<NodeId> {
        let mut order = Vec::with_capacity(self.nodes.len());
        let mut stack = vec![self.root];
        while let Some(id) = stack.pop() {
            order.push(id);
            stack.extend(self.nodes[id].children.iter().rev());
        }
        order
    }

    /// Sorted nested-label encoding; equal iff the trees are isomorphic.
    pub fn canonical_form(&self) -> CanonicalKey {
        let mut encoded: Vec<String> = vec![String::new(); self.nodes.len()];
        for id in self.preorder().into_iter().rev() {
            let node = &self.nodes[id];
            encoded[id] = if node.is_leaf() {
                quote_label(node.label.as_deref().unwrap_or("")).into_owned()
            } else {
                let mut parts: Vec<String> = node
                    .children
                    .iter()
                    .map(|&c| std::mem::take(&mut encoded[c]))
                    .collect();
                parts.sort_unstable();
                format!("({})", parts.join(","))
            };
        }
        let mut key = std::mem::take(&mut encoded[self.root]);
        key.push(';');
        CanonicalKey(key)
    }

    /// Newick string in stored child order.
    pub fn to_newick(&self) -> String {
        let mut out = String::new();
        self.write_newick(self.root, &mut out);
        out.push(';');
        out
    }

    fn write_newick(&self, id: NodeId, out: &mut String) {
        let node = &self.nodes[id];
        if node.is_leaf() {
            out.push_str(&quote_label(node.label.as_deref().unwrap_or("")));
            return;
        }
        out.push('(');
        for (k, &child) in node.children.iter().enumerate() {
            if k > 0 {
                out.push(',');
            }
            self.write_newick(child, out);
        }
        out.push(')');
    }

    /// Restrict the tree to the given leaf labels, suppressing nodes left with
    /// a single child. Returns `None` when no leaf survives.
    pub fn restrict(&self, keep: &BTreeSet<String>) -> Option<Tree> {
        TreeAssembler::assemble(
            self.root,
            |id| self.nodes[id].children.clone(),
            |id| {
                self.nodes[id]
                    .label
                    .as_ref()
                    .filter(|label| keep.contains(*label))
                    .cloned()
            },
        )
    }

    /// Build a tree from parent-free child lists, keeping every labelled leaf.
    pub(crate) fn from_child_lists(
        root: NodeId,
        children: &[Vec<NodeId>],
        labels: &[Option<String>],
    ) -> Option<Tree> {
        TreeAssembler::assemble(root, |id| children[id].clone(), |id| labels[id].clone())
    }
}

impl PartialEq for Tree {
    fn eq(&self, other: &Self) -> bool {
        self.canonical_form() == other.canonical_form()
    }
}

impl Eq for Tree {}

impl fmt::Display for Tree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_newick())
    }
}

/// Copies a rooted structure into a fresh compact arena.
///
/// A leaf survives when `keep_leaf` yields a label; internal nodes with no
/// surviving child are dropped and nodes with a single surviving child are
/// suppressed (replaced by that child).
struct TreeAssembler {
    nodes: Vec<TreeNode>,
}

impl TreeAssembler {
    fn assemble(
        root: NodeId,
        children_of: impl Fn(NodeId) -> Vec<NodeId>,
        keep_leaf: impl Fn(NodeId) -> Option<String>,
    ) -> Option<Tree> {
        let mut assembler = TreeAssembler { nodes: Vec::new() };
        let new_root = assembler.copy(root, &children_of, &keep_leaf)?;
        assembler.nodes[new_root].parent = None;
        Some(assembler.reindexed(new_root))
    }

    fn copy(
        &mut self,
        id: NodeId,
        children_of: &impl Fn(NodeId) -> Vec<NodeId>,
        keep_leaf: &impl Fn(NodeId) -> Option<String>,
    ) -> Option<NodeId> {
        let children = children_of(id);
        if children.is_empty() {
            let label = keep_leaf(id)?;
            return Some(self.push(Some(label), Vec::new()));
        }

        let kept: Vec<NodeId> = children
            .into_iter()
            .filter_map(|child| self.copy(child, children_of, keep_leaf))
            .collect();

        match kept.len() {
            0 => None,
            1 => Some(kept[0]),
            _ => {
                let new_id = self.push(None, kept.clone());
                for child in kept {
                    self.nodes[child].parent = Some(new_id);
                }
                Some(new_id)
            }
        }
    }

    fn push(&mut self, label: Option<String>, children: Vec<NodeId>) -> NodeId {
        self.nodes.push(TreeNode {
            label,
            parent: None,
            children,
        });
        self.nodes.len() - 1
    }

    /// Renumber reachable nodes in preorder so the root is node 0.
    fn reindexed(self, root: NodeId) -> Tree {
        let mut order = Vec::with_capacity(self.nodes.len());
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            order.push(id);
            stack.extend(self.nodes[id].children.iter().rev());
        }

        let mut new_index = vec![usize::MAX; self.nodes.len()];
        for (k, &old) in order.iter().enumerate() {
            new_index[old] = k;
        }

        let nodes = order
            .iter()
            .map(|&old| {
                let node = &self.nodes[old];
                TreeNode {
                    label: node.label.clone(),
                    parent: node.parent.map(|p| new_index[p]),
                    children: node.children.iter().map(|&c| new_index[c]).collect(),
                }
            })
            .collect();

        Tree { nodes, root: 0 }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NetworkNode {
    pub label: Option<String>,
    /// Reticulation identifier without the leading `#`.
    pub tag: Option<String>,
    pub parents: Vec<NodeId>,
    pub children: Vec<NodeId>,
}

impl NetworkNode {
    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    pub fn is_reticulation(&self) -> bool {
        self.parents.len() >= 2
    }
}

/// A rooted phylogenetic network (a DAG whose in-degree ≥ 2 nodes are reticulations).
#[derive(Debug, Clone)]
pub struct Network {
    nodes: Vec<NetworkNode>,
    root: NodeId,
}

impl Network {
    /// Parse extended Newick, merging occurrences that share a `#tag`.
    ///
    /// ```
    /// # use phylonet_rspr::model::Network;
    /// let net = Network::from_newick("((a,(b)#H1),(#H1,c));").unwrap();
    /// assert_eq!(net.num_reticulations(), 1);
    /// assert_eq!(net.choice_count(), Some(2));
    /// ```
    pub fn from_newick(text: &str) -> Result<Self, FormatError> {
        let raw = newick::parse_raw(text)?;
        let network = Self::from_raw(raw)?;
        network.validate()?;
        Ok(network)
    }

    fn from_raw(raw: RawTree) -> Result<Self, FormatError> {
        // Every raw occurrence maps to a network node; tagged occurrences share one.
        let mut by_tag: BTreeMap<String, Vec<usize>> = BTreeMap::new();
        for (idx, node) in raw.nodes.iter().enumerate() {
            if let Some(tag) = &node.tag {
                by_tag.entry(tag.clone()).or_default().push(idx);
            }
        }

        let mut target: Vec<NodeId> = (0..raw.nodes.len()).collect();
        for (tag, occurrences) in &by_tag {
            if occurrences.len() < 2 {
                return Err(FormatError::UnmatchedReticulation(tag.clone()));
            }
            let defining: Vec<usize> = occurrences
                .iter()
                .copied()
                .filter(|&idx| !raw.nodes[idx].children.is_empty())
                .collect();
            let representative = match defining.as_slice() {
                [] => return Err(FormatError::ReticulateLeaf(tag.clone())),
                [single] => *single,
                _ => return Err(FormatError::DuplicateReticulation(tag.clone())),
            };
            for &idx in occurrences {
                target[idx] = representative;
            }
        }

        // Compact the surviving representatives into a dense arena.
        let mut dense: HashMap<usize, NodeId> = HashMap::new();
        let mut nodes: Vec<NetworkNode> = Vec::new();
        for (idx, raw_node) in raw.nodes.iter().enumerate() {
            if target[idx] != idx {
                continue;
            }
            dense.insert(idx, nodes.len());
            nodes.push(NetworkNode {
                label: None,
                tag: raw_node.tag.clone(),
                parents: Vec::new(),
                children: Vec::new(),
            });
        }

        for (idx, raw_node) in raw.nodes.iter().enumerate() {
            let id = dense[&target[idx]];
            // Only leaves keep labels; a reticulation leaf label may sit on any occurrence.
            if raw_node.children.is_empty() && nodes[id].label.is_none() {
                nodes[id].label = raw_node.label.clone();
            }
            for &child in &raw_node.children {
                let child_id = dense[&target[child]];
                nodes[id].children.push(child_id);
                nodes[child_id].parents.push(id);
            }
        }

        let root = dense[&target[raw.root]];
        for node in nodes.iter_mut().filter(|n| !n.is_leaf()) {
            node.label = None;
        }

        Ok(Network { nodes, root })
    }

    fn validate(&self) -> Result<(), FormatError> {
        if !self.nodes[self.root].parents.is_empty() {
            return Err(FormatError::Cycle);
        }
        self.check_acyclic()?;

        for node in self.nodes.iter().filter(|n| n.is_reticulation()) {
            if node.parents.iter().duplicates().next().is_some() {
                return Err(FormatError::ParallelArcs(node.tag.clone().unwrap_or_default()));
            }
        }

        let mut seen = BTreeSet::new();
        for id in self.leaves() {
            if let Some(label) = &self.nodes[id].label {
                if !seen.insert(label.as_str()) {
                    return Err(FormatError::DuplicateLabel(label.clone()));
                }
            }
        }
        if seen.is_empty() {
            return Err(FormatError::NoLabelledLeaf);
        }
        Ok(())
    }

    /// Iterative three-colour DFS from the root.
    fn check_acyclic(&self) -> Result<(), FormatError> {
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            New,
            Active,
            Done,
        }

        let mut marks = vec![Mark::New; self.nodes.len()];
        let mut stack = vec![(self.root, 0usize)];
        marks[self.root] = Mark::Active;

        while let Some((id, next)) = stack.pop() {
            if let Some(&child) = self.nodes[id].children.get(next) {
                stack.push((id, next + 1));
                match marks[child] {
                    Mark::Active => return Err(FormatError::Cycle),
                    Mark::New => {
                        marks[child] = Mark::Active;
                        stack.push((child, 0));
                    }
                    Mark::Done => {}
                }
            } else {
                marks[id] = Mark::Done;
            }
        }
        Ok(())
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn node(&self, id: NodeId) -> &NetworkNode {
        &self.nodes[id]
    }

    pub fn nodes(&self) -> &[NetworkNode] {
        &self.nodes
    }

    pub fn leaves(&self) -> impl Iterator<Item = NodeId> + '_ {
        (0..self.nodes.len()).filter(|&id| self.nodes[id].is_leaf())
    }

    /// Labelled leaves, sorted.
    pub fn leaf_labels(&self) -> BTreeSet<String> {
        self.leaves()
            .filter_map(|id| self.nodes[id].label.clone())
            .collect()
    }

    /// Reticulation vertices in ascending id order.
    pub fn reticulations(&self) -> Vec<NodeId> {
        (0..self.nodes.len())
            .filter(|&id| self.nodes[id].is_reticulation())
            .collect()
    }

    pub fn num_reticulations(&self) -> usize {
        self.nodes.iter().filter(|n| n.is_reticulation()).count()
    }

    /// Product of reticulation in-degrees, `None` on overflow.
    pub fn choice_count(&self) -> Option<u128> {
        self.nodes
            .iter()
            .filter(|n| n.is_reticulation())
            .try_fold(1u128, |acc, n| acc.checked_mul(n.parents.len() as u128))
    }

    /// The displayed tree for one parent choice per reticulation.
    ///
    /// `choice[k]` indexes into the parent list of the k-th entry of
    /// [`Network::reticulations`]. Unlabelled leaves are removed, leaves
    /// outside `leaf_filter` (when given) are removed, and pass-through
    /// nodes are suppressed.
    pub fn displayed_tree(
        &self,
        choice: &[usize],
        leaf_filter: Option<&BTreeSet<String>>,
    ) -> Option<Tree> {
        let mut active_parent: Vec<Option<NodeId>> = vec![None; self.nodes.len()];
        for (&reticulation, &pick) in self.reticulations().iter().zip(choice) {
            active_parent[reticulation] = self.nodes[reticulation].parents.get(pick).copied();
        }

        TreeAssembler::assemble(
            self.root,
            |id| {
                self.nodes[id]
                    .children
                    .iter()
                    .copied()
                    .filter(|&child| {
                        !self.nodes[child].is_reticulation() || active_parent[child] == Some(id)
                    })
                    .collect()
            },
            |id| {
                let label = self.nodes[id].label.as_ref()?;
                match leaf_filter {
                    Some(filter) if !filter.contains(label) => None,
                    _ => Some(label.clone()),
                }
            },
        )
    }

    /// The network as a tree, when it has no reticulations.
    pub fn as_tree(&self) -> Option<Tree> {
        if self.num_reticulations() > 0 {
            return None;
        }
        self.displayed_tree(&[], None)
    }
}

/// A tree together with the name it is reported under (`t1`, `t2`, ...).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamedTree {
    pub name: String,
    pub tree: Tree,
}

impl NamedTree {
    pub fn new(name: impl Into<String>, tree: Tree) -> Self {
        Self {
            name: name.into(),
            tree,
        }
    }
}

/// Either kind of parsed input.
#[derive(Debug, Clone)]
pub enum Phylogeny {
    Tree(Tree),
    Network(Network),
}

impl Phylogeny {
    /// Parse text as a tree when it has no reticulations and no unlabelled
    /// leaves, as a network otherwise.
    pub fn parse(text: &str) -> Result<Self, FormatError> {
        let network = Network::from_newick(text)?;
        let has_dummy_leaf = network
            .leaves()
            .any(|id| network.node(id).label.is_none());
        if network.num_reticulations() == 0 && !has_dummy_leaf {
            if let Some(tree) = network.as_tree() {
                return Ok(Phylogeny::Tree(tree));
            }
        }
        Ok(Phylogeny::Network(network))
    }

    pub fn leaf_set(&self) -> BTreeSet<String> {
        match self {
            Phylogeny::Tree(tree) => tree.leaf_set(),
            Phylogeny::Network(network) => network.leaf_labels(),
        }
    }
}
