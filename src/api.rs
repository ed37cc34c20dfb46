//! Python binding layer for network embeddings and rSPR computations.
//!
//! Trees and networks are passed as Newick strings; results come back as
//! plain lists and tuples.

use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;
use std::fmt::Display;

use crate::config::{EmbeddingConfig, GraphConfig, PairwiseConfig, SearchBudget, timeout_from_secs};
use crate::embedding::enumerate;
use crate::external::ExternalRspr;
use crate::graph::{build_graph, induced_graph, pairwise_distances};
use crate::io::{TreeRecord, parse_network, valid_trees};
use crate::model::{NamedTree, Tree};
use crate::oracle::RsprOracle;
use crate::report::ordered_entries;
use crate::spr::SprNeighborhood;

type GraphTuple = (Vec<(String, String, bool)>, Vec<(usize, usize)>, Option<String>);

fn value_error(e: impl Display) -> PyErr {
    PyValueError::new_err(e.to_string())
}

/// Parse a list of Newick trees named `t1..tn`; any malformed tree is an error.
fn parse_trees(trees: &[String], required: usize) -> PyResult<Vec<NamedTree>> {
    let records: Vec<TreeRecord> = trees
        .iter()
        .enumerate()
        .map(|(k, text)| TreeRecord {
            name: format!("t{}", k + 1),
            text: text.clone(),
            tree: Tree::from_newick(text),
        })
        .collect();
    if let Some(bad) = records.iter().find(|r| !r.is_valid()) {
        let reason = bad.tree.as_ref().err().map(ToString::to_string).unwrap_or_default();
        return Err(PyValueError::new_err(format!(
            "Tree {} is malformed: {reason}",
            bad.name
        )));
    }
    valid_trees(&records, required).map_err(value_error)
}

fn oracle(rspr_path: Option<String>, timeout_secs: f64) -> PyResult<Box<dyn RsprOracle>> {
    let timeout = timeout_from_secs(timeout_secs).map_err(value_error)?;
    let oracle: Box<dyn RsprOracle> = match rspr_path {
        Some(path) => Box::new(ExternalRspr::new(path).with_timeout(timeout)),
        None => Box::new(SprNeighborhood::new(SearchBudget {
            timeout,
            ..SearchBudget::default()
        })),
    };
    Ok(oracle)
}

/// Distinct trees displayed by a network.
///
/// Args:
///     network: Extended Newick string of one network
///     leaves: Optional leaf subset to restrict the displayed trees to
///     max_combinations: Ceiling on reticulation-choice combinations (default: 1024)
///
/// Returns:
///     A list of (newick, count) tuples, most frequent first
///
/// Raises:
///     ValueError: On malformed input, an invalid leaf subset or too many combinations
#[pyfunction]
#[pyo3(signature = (network, leaves=None, max_combinations=None))]
fn displayed_trees(
    network: &str,
    leaves: Option<Vec<String>>,
    max_combinations: Option<u64>,
) -> PyResult<Vec<(String, u64)>> {
    let network = parse_network(network).map_err(value_error)?;
    let mut config = EmbeddingConfig::default();
    if let Some(max) = max_combinations {
        config = config.with_max_combinations(u128::from(max));
    }
    let multiset = enumerate(&network, leaves.as_deref(), &config).map_err(value_error)?;
    Ok(ordered_entries(&multiset)
        .into_iter()
        .map(|entry| (entry.tree.to_newick(), entry.count))
        .collect())
}

/// Pairwise rSPR distances.
///
/// Args:
///     trees: List of Newick trees
///     rspr_path: Path of the `rspr` executable; the in-process search is used when omitted
///     timeout_secs: Per-pair time budget, 0 disables (default: 30)
///
/// Returns:
///     A tuple of (tree_names, distance_matrix); unknown entries are None
///
/// Raises:
///     ValueError: On malformed trees or a timeout that cannot be represented
#[pyfunction]
#[pyo3(signature = (trees, rspr_path=None, timeout_secs=30.0))]
fn pairwise_rspr(
    trees: Vec<String>,
    rspr_path: Option<String>,
    timeout_secs: f64,
) -> PyResult<(Vec<String>, Vec<Vec<Option<u32>>>)> {
    let trees = parse_trees(&trees, 2)?;
    let matrix = pairwise_distances(
        &trees,
        &oracle(rspr_path, timeout_secs)?,
        &PairwiseConfig::default(),
    )
    .map_err(value_error)?;
    Ok((matrix.names().to_vec(), matrix.rows().to_vec()))
}

/// rSPR graph of a tree list.
///
/// Args:
///     trees: List of Newick trees
///     expand: Explore neighborhoods breadth-first instead of joining the inputs only (default: False)
///     max_nodes: Bound on the number of trees of an expanded graph (default: 1000)
///
/// Returns:
///     A tuple of (nodes, edges, incomplete): nodes are (label, newick, expanded)
///     triples, edges index into nodes, and incomplete is None for a complete
///     graph or the reason it was cut short (node bound, failed neighborhoods)
#[pyfunction]
#[pyo3(signature = (trees, expand=false, max_nodes=1000))]
fn rspr_graph(
    trees: Vec<String>,
    expand: bool,
    max_nodes: usize,
) -> PyResult<GraphTuple> {
    let trees = parse_trees(&trees, if expand { 1 } else { 2 })?;
    let oracle = SprNeighborhood::default();
    let config = GraphConfig::default().with_max_nodes(max_nodes);
    let graph = if expand {
        build_graph(&trees, &oracle, &config)
    } else {
        induced_graph(&trees, &oracle, &config)
    }
    .map_err(value_error)?;

    let nodes = graph
        .nodes()
        .iter()
        .map(|node| (node.label.clone(), node.tree.to_newick(), node.expanded))
        .collect();
    let incomplete = graph.completion().err().map(|e| e.to_string());
    Ok((nodes, graph.edges().collect(), incomplete))
}

/// All trees one rSPR move away from a tree.
#[pyfunction]
fn rspr_neighbors(tree: &str) -> PyResult<Vec<String>> {
    let tree = Tree::from_newick(tree).map_err(value_error)?;
    Ok(SprNeighborhood::neighborhood(&tree)
        .iter()
        .map(Tree::to_newick)
        .collect())
}

/// Python module definition
#[pymodule]
fn phylonet_rspr(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_function(wrap_pyfunction!(displayed_trees, m)?)?;
    m.add_function(wrap_pyfunction!(pairwise_rspr, m)?)?;
    m.add_function(wrap_pyfunction!(rspr_graph, m)?)?;
    m.add_function(wrap_pyfunction!(rspr_neighbors, m)?)?;
    Ok(())
}
