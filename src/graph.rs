//! rSPR graph builder.
//!
//! Three ways of relating a set of trees through an [`RsprOracle`]:
//!
//! - [`pairwise_distances`]: the full symmetric distance matrix. Oracle calls
//!   are made once per unordered pair of distinct canonical forms.
//! - [`build_graph`]: breadth-first expansion of one-move neighborhoods from
//!   a set of seeds, bounded by [`GraphConfig::max_nodes`].
//! - [`induced_graph`]: only the input trees as nodes, joined when they are
//!   one move apart.
//!
//! Oracle failures never abort a computation. They are recorded on the result
//! and reported by its `completion()` method; only cancellation is an `Err`.

use crate::config::{
    CancellationToken, GraphConfig, HAMILTONIAN_NODE_LIMIT, PairwiseConfig, cancelled,
};
use crate::error::{OracleError, PhyloError, Result};
use crate::model::{CanonicalKey, NamedTree, Tree};
use crate::oracle::{Comparison, RsprOracle, require_same_taxa};
use itertools::Itertools;
use rayon::prelude::*;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::{debug, info, warn};

/// An oracle call that failed for the pair `(first, second)` of input trees.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairFailure {
    pub first: usize,
    pub second: usize,
    pub error: OracleError,
}

/// Symmetric matrix of rSPR distances; `None` marks an unknown entry.
#[derive(Debug, Clone)]
pub struct DistanceMatrix {
    names: Vec<String>,
    cells: Vec<Vec<Option<u32>>>,
    failures: Vec<PairFailure>,
    forests: BTreeMap<(usize, usize), Vec<String>>,
}

impl DistanceMatrix {
    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn get(&self, i: usize, j: usize) -> Option<u32> {
        self.cells[i][j]
    }

    pub fn rows(&self) -> &[Vec<Option<u32>>] {
        &self.cells
    }

    pub fn failures(&self) -> &[PairFailure] {
        &self.failures
    }

    /// Why the entry `(i, j)` is unknown, if it is.
    pub fn failure(&self, i: usize, j: usize) -> Option<&OracleError> {
        let (first, second) = (i.min(j), i.max(j));
        self.failures
            .iter()
            .find(|f| f.first == first && f.second == second)
            .map(|f| &f.error)
    }

    /// Maximum agreement forest of a pair, when one was requested and produced.
    pub fn forest(&self, i: usize, j: usize) -> Option<&[String]> {
        self.forests.get(&(i.min(j), i.max(j))).map(Vec::as_slice)
    }

    /// Number of unordered pairs of distinct inputs.
    pub fn pair_count(&self) -> usize {
        let n = self.len();
        n * n.saturating_sub(1) / 2
    }

    pub fn known_pairs(&self) -> usize {
        self.pair_count() - self.failures.len()
    }

    /// `Err(PartialResult)` when some entries are unknown.
    pub fn completion(&self) -> Result<()> {
        if self.failures.is_empty() {
            return Ok(());
        }
        Err(PhyloError::PartialResult {
            failed: self.failures.len(),
            total: self.pair_count(),
        })
    }
}

fn ordered(a: &CanonicalKey, b: &CanonicalKey) -> (CanonicalKey, CanonicalKey) {
    if a <= b {
        (a.clone(), b.clone())
    } else {
        (b.clone(), a.clone())
    }
}

/// Run `job` over `items`, on the rayon pool when `parallel`, stopping with
/// `Cancelled` once the token fires.
fn run_jobs<I, T, F>(
    items: &[I],
    parallel: bool,
    cancel: &Option<CancellationToken>,
    job: F,
) -> Result<Vec<T>>
where
    I: Sync,
    T: Send,
    F: Fn(&I) -> T + Sync + Send,
{
    let guarded = |item: &I| (!cancelled(cancel)).then(|| job(item));
    let results: Vec<Option<T>> = if parallel {
        items.par_iter().map(guarded).collect()
    } else {
        items.iter().map(guarded).collect()
    };
    results
        .into_iter()
        .collect::<Option<Vec<T>>>()
        .ok_or(PhyloError::Cancelled)
}

/// Pairwise rSPR distances between all input trees.
///
/// Trees with different taxa are never sent to the oracle; their entries are
/// unknown with [`OracleError::IncompatibleLeafSets`].
pub fn pairwise_distances<O: RsprOracle + ?Sized>(
    trees: &[NamedTree],
    oracle: &O,
    config: &PairwiseConfig,
) -> Result<DistanceMatrix> {
    let n = trees.len();
    let keys: Vec<CanonicalKey> = trees.iter().map(|t| t.tree.canonical_form()).collect();

    // One representative input pair per unordered pair of distinct topologies.
    let mut unique: BTreeMap<(CanonicalKey, CanonicalKey), (usize, usize)> = BTreeMap::new();
    for (i, j) in (0..n).tuple_combinations() {
        if keys[i] != keys[j] {
            unique.entry(ordered(&keys[i], &keys[j])).or_insert((i, j));
        }
    }
    let jobs: Vec<((CanonicalKey, CanonicalKey), (usize, usize))> = unique.into_iter().collect();
    info!(
        trees = n,
        pairs = n * n.saturating_sub(1) / 2,
        oracle_calls = jobs.len(),
        "computing pairwise rSPR distances"
    );

    let comparisons = run_jobs(&jobs, config.parallel, &config.cancel, |(_, (i, j))| {
        let (a, b) = (&trees[*i].tree, &trees[*j].tree);
        require_same_taxa(a, b).and_then(|_| {
            if config.forests {
                oracle.compare(a, b)
            } else {
                oracle.distance(a, b).map(|distance| Comparison {
                    distance,
                    forest: None,
                })
            }
        })
    })?;

    let memo: HashMap<&(CanonicalKey, CanonicalKey), &std::result::Result<Comparison, OracleError>> =
        jobs.iter().map(|(pair, _)| pair).zip(&comparisons).collect();

    let mut cells = vec![vec![None; n]; n];
    let mut failures = Vec::new();
    let mut forest_cells = BTreeMap::new();
    for i in 0..n {
        cells[i][i] = Some(0);
    }
    for (i, j) in (0..n).tuple_combinations() {
        if keys[i] == keys[j] {
            cells[i][j] = Some(0);
            cells[j][i] = Some(0);
            continue;
        }
        let pair = ordered(&keys[i], &keys[j]);
        match memo.get(&pair) {
            Some(Ok(comparison)) => {
                cells[i][j] = Some(comparison.distance);
                cells[j][i] = Some(comparison.distance);
                if let Some(forest) = &comparison.forest {
                    forest_cells.insert((i, j), forest.clone());
                }
            }
            Some(Err(error)) => {
                warn!(first = %trees[i].name, second = %trees[j].name, %error, "rSPR distance unknown");
                failures.push(PairFailure {
                    first: i,
                    second: j,
                    error: error.clone(),
                });
            }
            None => {}
        }
    }

    Ok(DistanceMatrix {
        names: trees.iter().map(|t| t.name.clone()).collect(),
        cells,
        failures,
        forests: forest_cells,
    })
}

/// A distinct topology in an [`RsprGraph`].
#[derive(Debug, Clone)]
pub struct GraphNode {
    /// Name of the first seed with this topology, or `n1`, `n2`, ... for discovered trees.
    pub label: String,
    /// Names of further seeds sharing the topology.
    pub aliases: Vec<String>,
    pub tree: Tree,
    pub key: CanonicalKey,
    pub seed: bool,
    /// The node's full neighborhood has been merged into the graph.
    pub expanded: bool,
}

/// Undirected graph of trees, one node per canonical form, edges between
/// trees one rSPR move apart.
#[derive(Debug, Clone, Default)]
pub struct RsprGraph {
    nodes: Vec<GraphNode>,
    index: HashMap<CanonicalKey, usize>,
    edges: BTreeSet<(usize, usize)>,
    limit: Option<usize>,
    failures: Vec<(usize, OracleError)>,
    discovered: usize,
}

impl RsprGraph {
    pub fn nodes(&self) -> &[GraphNode] {
        &self.nodes
    }

    pub fn node(&self, id: usize) -> &GraphNode {
        &self.nodes[id]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Node holding the topology of `tree`.
    pub fn find(&self, tree: &Tree) -> Option<usize> {
        self.index.get(&tree.canonical_form()).copied()
    }

    /// Edges as `(smaller id, larger id)`, in ascending order.
    pub fn edges(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.edges.iter().copied()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn has_edge(&self, a: usize, b: usize) -> bool {
        self.edges.contains(&(a.min(b), a.max(b)))
    }

    /// Sorted neighbor ids of every node.
    pub fn adjacency(&self) -> Vec<Vec<usize>> {
        let mut adjacency = vec![Vec::new(); self.len()];
        for &(a, b) in &self.edges {
            adjacency[a].push(b);
            adjacency[b].push(a);
        }
        for list in &mut adjacency {
            list.sort_unstable();
        }
        adjacency
    }

    pub fn unexpanded(&self) -> usize {
        self.nodes.iter().filter(|node| !node.expanded).count()
    }

    pub fn failures(&self) -> &[(usize, OracleError)] {
        &self.failures
    }

    /// `Err(GraphSizeLimitExceeded)` when the node bound stopped construction
    /// (with the count of failed neighborhoods), otherwise `Err(PartialResult)`
    /// when some neighborhoods could not be computed.
    pub fn completion(&self) -> Result<()> {
        if let Some(limit) = self.limit {
            return Err(PhyloError::GraphSizeLimitExceeded {
                limit,
                unexpanded: self.unexpanded(),
                failed: self.failures.len(),
            });
        }
        if !self.failures.is_empty() {
            return Err(PhyloError::PartialResult {
                failed: self.failures.len(),
                total: self.len(),
            });
        }
        Ok(())
    }

    /// A cycle through every node exactly once, as node ids starting and
    /// ending at node 0. Graphs with fewer than three nodes have none.
    pub fn hamiltonian_cycle(&self) -> Result<Option<Vec<usize>>> {
        let n = self.len();
        if n > HAMILTONIAN_NODE_LIMIT {
            return Err(PhyloError::CycleSearchTooLarge {
                nodes: n,
                limit: HAMILTONIAN_NODE_LIMIT,
            });
        }
        if n < 3 {
            return Ok(None);
        }

        let adjacency = self.adjacency();
        let mut path = vec![0];
        let mut on_path = vec![false; n];
        on_path[0] = true;
        if extend_cycle(&adjacency, &mut path, &mut on_path) {
            path.push(0);
            Ok(Some(path))
        } else {
            Ok(None)
        }
    }

    fn insert_seed(&mut self, seed: &NamedTree) -> Option<usize> {
        let key = seed.tree.canonical_form();
        if let Some(&existing) = self.index.get(&key) {
            self.nodes[existing].aliases.push(seed.name.clone());
            return None;
        }
        Some(self.push(seed.name.clone(), seed.tree.clone(), key, true))
    }

    fn insert_discovered(&mut self, tree: Tree, key: CanonicalKey) -> usize {
        self.discovered += 1;
        let label = format!("n{}", self.discovered);
        self.push(label, tree, key, false)
    }

    fn push(&mut self, label: String, tree: Tree, key: CanonicalKey, seed: bool) -> usize {
        let id = self.nodes.len();
        self.index.insert(key.clone(), id);
        self.nodes.push(GraphNode {
            label,
            aliases: Vec::new(),
            tree,
            key,
            seed,
            expanded: false,
        });
        id
    }

    fn link(&mut self, a: usize, b: usize) {
        if a != b {
            self.edges.insert((a.min(b), a.max(b)));
        }
    }

    /// Neighborhoods of `ids`, in the order of `ids`.
    fn expand<O: RsprOracle + ?Sized>(
        &self,
        ids: &[usize],
        oracle: &O,
        parallel: bool,
        cancel: &Option<CancellationToken>,
    ) -> Result<Vec<std::result::Result<Vec<Tree>, OracleError>>> {
        run_jobs(ids, parallel, cancel, |&id| oracle.neighbors(&self.nodes[id].tree))
    }
}

fn extend_cycle(adjacency: &[Vec<usize>], path: &mut Vec<usize>, on_path: &mut [bool]) -> bool {
    let last = path[path.len() - 1];
    if path.len() == adjacency.len() {
        return adjacency[last].contains(&path[0]);
    }
    for &next in &adjacency[last] {
        if on_path[next] {
            continue;
        }
        on_path[next] = true;
        path.push(next);
        if extend_cycle(adjacency, path, on_path) {
            return true;
        }
        path.pop();
        on_path[next] = false;
    }
    false
}

/// Breadth-first rSPR graph from `seeds`.
///
/// Every distinct topology is expanded at most once. When the node bound is
/// reached the current level is finished (edges to already known trees are
/// still added) and construction stops; see [`RsprGraph::completion`].
pub fn build_graph<O: RsprOracle + ?Sized>(
    seeds: &[NamedTree],
    oracle: &O,
    config: &GraphConfig,
) -> Result<RsprGraph> {
    let mut graph = RsprGraph::default();
    let mut frontier: Vec<usize> = seeds.iter().filter_map(|s| graph.insert_seed(s)).collect();

    let mut depth = 0usize;
    while !frontier.is_empty() {
        if cancelled(&config.cancel) {
            return Err(PhyloError::Cancelled);
        }
        debug!(depth, frontier = frontier.len(), nodes = graph.len(), "expanding rSPR frontier");
        let expansions = graph.expand(&frontier, oracle, config.parallel, &config.cancel)?;

        let mut next = Vec::new();
        for (&id, expansion) in frontier.iter().zip(expansions) {
            let neighbors = match expansion {
                Ok(neighbors) => neighbors,
                Err(error) => {
                    warn!(node = %graph.nodes[id].label, %error, "neighborhood unavailable");
                    graph.failures.push((id, error));
                    continue;
                }
            };
            let mut complete = true;
            for tree in neighbors {
                let key = tree.canonical_form();
                let target = match graph.index.get(&key) {
                    Some(&known) => known,
                    None if graph.len() >= config.max_nodes => {
                        complete = false;
                        graph.limit = Some(config.max_nodes);
                        continue;
                    }
                    None => {
                        let added = graph.insert_discovered(tree, key);
                        next.push(added);
                        added
                    }
                };
                graph.link(id, target);
            }
            graph.nodes[id].expanded = complete;
        }

        if graph.limit.is_some() {
            warn!(
                limit = config.max_nodes,
                unexpanded = graph.unexpanded(),
                "rSPR graph reached its node bound"
            );
            break;
        }
        frontier = next;
        depth += 1;
    }

    info!(nodes = graph.len(), edges = graph.edge_count(), "rSPR graph built");
    Ok(graph)
}

/// Graph over the input trees only, with an edge wherever two of them are
/// one rSPR move apart.
pub fn induced_graph<O: RsprOracle + ?Sized>(
    trees: &[NamedTree],
    oracle: &O,
    config: &GraphConfig,
) -> Result<RsprGraph> {
    let mut graph = RsprGraph::default();
    let ids: Vec<usize> = trees.iter().filter_map(|t| graph.insert_seed(t)).collect();
    let expansions = graph.expand(&ids, oracle, config.parallel, &config.cancel)?;

    for (&id, expansion) in ids.iter().zip(expansions) {
        match expansion {
            Ok(neighbors) => {
                for tree in neighbors {
                    if let Some(target) = graph.find(&tree) {
                        graph.link(id, target);
                    }
                }
                graph.nodes[id].expanded = true;
            }
            Err(error) => {
                warn!(node = %graph.nodes[id].label, %error, "neighborhood unavailable");
                graph.failures.push((id, error));
            }
        }
    }

    info!(nodes = graph.len(), edges = graph.edge_count(), "induced rSPR graph built");
    Ok(graph)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::stub::TableOracle;
    use crate::spr::SprNeighborhood;

    fn named(texts: &[&str]) -> Vec<NamedTree> {
        texts
            .iter()
            .enumerate()
            .map(|(k, text)| NamedTree::new(format!("t{}", k + 1), Tree::from_newick(text).unwrap()))
            .collect()
    }

    fn sequential() -> PairwiseConfig {
        PairwiseConfig {
            parallel: false,
            ..PairwiseConfig::default()
        }
    }

    /// Refuses every neighborhood request.
    struct NoNeighbors;

    impl RsprOracle for NoNeighbors {
        fn distance(&self, _a: &Tree, _b: &Tree) -> std::result::Result<u32, OracleError> {
            Err(OracleError::Unavailable("down".to_string()))
        }

        fn neighbors(&self, _tree: &Tree) -> std::result::Result<Vec<Tree>, OracleError> {
            Err(OracleError::Unavailable("down".to_string()))
        }
    }

    #[test]
    fn test_two_seeds_one_edge() {
        let oracle = TableOracle::default().with_neighbors("(a,(b,c));", &["((a,b),c);"]);
        let seeds = named(&["(a,(b,c));", "((a,b),c);"]);
        let graph = build_graph(&seeds, &oracle, &GraphConfig::default()).unwrap();
        assert_eq!(graph.len(), 2);
        assert_eq!(graph.edge_count(), 1);
        assert!(graph.has_edge(0, 1));
        assert!(graph.completion().is_ok());
        assert_eq!(graph.node(0).label, "t1");
        assert_eq!(graph.node(1).label, "t2");
    }

    #[test]
    fn test_edges_follow_neighborhoods() {
        let oracle = SprNeighborhood::default();
        let seeds = named(&["(a,(b,c));"]);
        let graph = build_graph(&seeds, &oracle, &GraphConfig::default()).unwrap();
        assert_eq!(graph.len(), 3);
        assert_eq!(graph.edge_count(), 3);
        for (x, y) in graph.edges() {
            let around = oracle.neighbors(&graph.node(x).tree).unwrap();
            assert!(around.contains(&graph.node(y).tree));
        }
        let keys: BTreeSet<&CanonicalKey> = graph.nodes().iter().map(|n| &n.key).collect();
        assert_eq!(keys.len(), graph.len());
        assert_eq!(graph.node(1).label, "n1");
    }

    #[test]
    fn test_four_leaf_graph_reaches_every_rooted_tree() {
        let seeds = named(&["(((a,b),c),d);"]);
        let graph = build_graph(&seeds, &SprNeighborhood::default(), &GraphConfig::default())
            .unwrap();
        assert_eq!(graph.len(), 15);
        assert_eq!(graph.unexpanded(), 0);
        assert!(graph.completion().is_ok());
    }

    #[test]
    fn test_node_bound_is_reported() {
        let seeds = named(&["(((a,b),c),d);"]);
        let config = GraphConfig {
            parallel: false,
            ..GraphConfig::default()
        }
        .with_max_nodes(5);
        let graph = build_graph(&seeds, &SprNeighborhood::default(), &config).unwrap();
        assert_eq!(graph.len(), 5);
        match graph.completion() {
            Err(PhyloError::GraphSizeLimitExceeded {
                limit,
                unexpanded,
                failed,
            }) => {
                assert_eq!(limit, 5);
                assert!(unexpanded > 0);
                assert_eq!(failed, 0);
            }
            other => panic!("unexpected completion {other:?}"),
        }
    }

    /// Native neighborhoods, except for one topology.
    struct FailsOn(CanonicalKey);

    impl RsprOracle for FailsOn {
        fn distance(&self, a: &Tree, b: &Tree) -> std::result::Result<u32, OracleError> {
            SprNeighborhood::default().distance(a, b)
        }

        fn neighbors(&self, tree: &Tree) -> std::result::Result<Vec<Tree>, OracleError> {
            if tree.canonical_form() == self.0 {
                return Err(OracleError::Unavailable("down".to_string()));
            }
            Ok(SprNeighborhood::neighborhood(tree))
        }
    }

    #[test]
    fn test_node_bound_keeps_failure_count() {
        let seeds = named(&["((a,b),c);", "((a,c),(b,d));"]);
        let oracle = FailsOn(seeds[1].tree.canonical_form());
        let config = GraphConfig {
            parallel: false,
            ..GraphConfig::default()
        }
        .with_max_nodes(3);
        let graph = build_graph(&seeds, &oracle, &config).unwrap();
        assert_eq!(graph.len(), 3);
        assert_eq!(graph.failures().len(), 1);
        assert!(matches!(
            graph.completion(),
            Err(PhyloError::GraphSizeLimitExceeded {
                limit: 3,
                unexpanded: 3,
                failed: 1
            })
        ));
        let message = graph.completion().unwrap_err().to_string();
        assert!(message.contains("1 neighborhood(s) failed"), "{message}");
    }

    #[test]
    fn test_duplicate_seeds_merge() {
        let oracle = TableOracle::default();
        let seeds = named(&["((a,b),c);", "(c,(b,a));"]);
        let graph = build_graph(&seeds, &oracle, &GraphConfig::default()).unwrap();
        assert_eq!(graph.len(), 1);
        assert_eq!(graph.node(0).aliases, vec!["t2"]);
        assert_eq!(oracle.call_count(), 1);
    }

    #[test]
    fn test_neighbor_failures_leave_nodes_unexpanded() {
        let seeds = named(&["((a,b),c);", "((a,c),b);"]);
        let graph = build_graph(&seeds, &NoNeighbors, &GraphConfig::default()).unwrap();
        assert_eq!(graph.len(), 2);
        assert_eq!(graph.unexpanded(), 2);
        assert!(matches!(
            graph.completion(),
            Err(PhyloError::PartialResult { failed: 2, total: 2 })
        ));
    }

    #[test]
    fn test_cancelled_construction() {
        let token = CancellationToken::new();
        token.cancel();
        let config = GraphConfig {
            cancel: Some(token),
            ..GraphConfig::default()
        };
        let result = build_graph(&named(&["((a,b),c);"]), &SprNeighborhood::default(), &config);
        assert!(matches!(result, Err(PhyloError::Cancelled)));
    }

    #[test]
    fn test_pairwise_partial_matrix() {
        let oracle = TableOracle::default()
            .with_distance("((a,b),c);", "((a,c),b);", 1)
            .with_distance("((a,b),c);", "(a,(b,c));", 1)
            .failing_on("((a,c),b);", "(a,(b,c));");
        let trees = named(&["((a,b),c);", "((a,c),b);", "(a,(b,c));"]);
        let matrix = pairwise_distances(&trees, &oracle, &sequential()).unwrap();

        assert_eq!(matrix.known_pairs(), 2);
        assert_eq!(matrix.failures().len(), 1);
        assert_eq!(matrix.get(0, 1), Some(1));
        assert_eq!(matrix.get(2, 0), Some(1));
        assert_eq!(matrix.get(1, 2), None);
        assert_eq!(matrix.get(2, 1), None);
        assert!(matrix.failure(2, 1).is_some());
        assert!(matches!(
            matrix.completion(),
            Err(PhyloError::PartialResult { failed: 1, total: 3 })
        ));
    }

    #[test]
    fn test_pairwise_memoizes_identical_topologies() {
        let oracle = TableOracle::default().with_distance("((a,b),c);", "((a,c),b);", 1);
        let trees = named(&["((a,b),c);", "(c,(a,b));", "((a,c),b);", "(b,(c,a));"]);
        let matrix = pairwise_distances(&trees, &oracle, &PairwiseConfig::default()).unwrap();
        assert_eq!(oracle.call_count(), 1);
        assert_eq!(matrix.get(0, 1), Some(0));
        assert_eq!(matrix.get(1, 3), Some(1));
        assert!(matrix.completion().is_ok());
    }

    #[test]
    fn test_pairwise_forests_share_the_distance_call() {
        let oracle = TableOracle::default()
            .with_distance("((a,b),c);", "((a,c),b);", 1)
            .with_forest("((a,b),c);", "((a,c),b);", &["(a,c)", "b"]);
        let trees = named(&["((a,b),c);", "((a,c),b);", "(c,(b,a));"]);
        let config = PairwiseConfig {
            forests: true,
            ..sequential()
        };
        let matrix = pairwise_distances(&trees, &oracle, &config).unwrap();
        assert_eq!(oracle.call_count(), 1);
        assert_eq!(matrix.get(0, 1), Some(1));
        assert_eq!(
            matrix.forest(0, 1),
            Some(&["(a,c)".to_string(), "b".to_string()][..])
        );
        assert_eq!(matrix.forest(2, 1), matrix.forest(0, 1));
        assert_eq!(matrix.forest(0, 2), None);
    }

    #[test]
    fn test_pairwise_different_taxa_skip_oracle() {
        let oracle = TableOracle::default();
        let trees = named(&["((a,b),c);", "((a,b),d);"]);
        let matrix = pairwise_distances(&trees, &oracle, &sequential()).unwrap();
        assert_eq!(oracle.call_count(), 0);
        assert_eq!(matrix.get(0, 1), None);
        assert_eq!(
            matrix.failure(0, 1),
            Some(&OracleError::IncompatibleLeafSets(vec!["c".into(), "d".into()]))
        );
    }

    #[test]
    fn test_pairwise_native_is_symmetric() {
        let trees = named(&["(((a,b),c),d);", "((a,b),(c,d));", "((a,c),(b,d));"]);
        let matrix =
            pairwise_distances(&trees, &SprNeighborhood::default(), &PairwiseConfig::default())
                .unwrap();
        for (i, j) in (0..3).tuple_combinations() {
            assert_eq!(matrix.get(i, j), matrix.get(j, i));
        }
        assert_eq!(matrix.get(0, 1), Some(1));
        assert_eq!(matrix.get(1, 2), Some(2));
        assert!(matrix.forest(0, 1).is_none());
    }

    #[test]
    fn test_pairwise_cancelled() {
        let token = CancellationToken::new();
        token.cancel();
        let config = PairwiseConfig {
            cancel: Some(token),
            ..PairwiseConfig::default()
        };
        let trees = named(&["((a,b),c);", "((a,c),b);"]);
        let result = pairwise_distances(&trees, &SprNeighborhood::default(), &config);
        assert!(matches!(result, Err(PhyloError::Cancelled)));
    }

    #[test]
    fn test_induced_graph_keeps_inputs_only() {
        let trees = named(&["(((a,b),c),d);", "((a,b),(c,d));", "((a,c),(b,d));"]);
        let oracle = SprNeighborhood::default();
        let graph = induced_graph(&trees, &oracle, &GraphConfig::default()).unwrap();
        assert_eq!(graph.len(), 3);
        assert!(graph.has_edge(0, 1));
        assert!(!graph.has_edge(1, 2));
        for (x, y) in graph.edges() {
            let around = oracle.neighbors(&graph.node(x).tree).unwrap();
            assert!(around.contains(&graph.node(y).tree));
        }
        assert!(graph.completion().is_ok());
    }

    #[test]
    fn test_hamiltonian_cycle_of_three_leaf_graph() {
        let graph = build_graph(
            &named(&["(a,(b,c));"]),
            &SprNeighborhood::default(),
            &GraphConfig::default(),
        )
        .unwrap();
        assert_eq!(graph.hamiltonian_cycle().unwrap(), Some(vec![0, 1, 2, 0]));
    }

    #[test]
    fn test_hamiltonian_cycle_absent_on_path() {
        let oracle = TableOracle::default()
            .with_neighbors("((a,b),c);", &["((a,c),b);"])
            .with_neighbors("((a,c),b);", &["(a,(b,c));"]);
        let trees = named(&["((a,b),c);", "((a,c),b);", "(a,(b,c));"]);
        let graph = induced_graph(&trees, &oracle, &GraphConfig::default()).unwrap();
        assert_eq!(graph.edge_count(), 2);
        assert_eq!(graph.hamiltonian_cycle().unwrap(), None);
    }

    #[test]
    fn test_hamiltonian_cycle_refuses_large_graphs() {
        let graph = build_graph(
            &named(&["((((a,b),c),d),e);"]),
            &SprNeighborhood::default(),
            &GraphConfig::default(),
        )
        .unwrap();
        assert_eq!(graph.len(), 105);
        assert!(matches!(
            graph.hamiltonian_cycle(),
            Err(PhyloError::CycleSearchTooLarge { nodes: 105, .. })
        ));
    }
}
