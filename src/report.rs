//! Result assembler: one object holding whatever an invocation computed,
//! with stable ordering, text rendering and JSON export.
//!
//! Multiset entries are listed by descending occurrence count, then by
//! canonical form. Graph-derived data (adjacency, Hamiltonian cycle) is
//! computed once when the graph is attached.

use crate::embedding::{MultisetEntry, NetworkSummary, TreeMultiset};
use crate::graph::{DistanceMatrix, RsprGraph};
use crate::io::TreeRecord;
use crate::model::{CanonicalKey, NodeId, Tree};
use serde::Serialize;
use std::fmt::{self, Write as _};

const EXCLUDED_TREE: &str = "Error with tree format, tree has been excluded";

/// Distance matrix cell as printed: the distance, or `X` when unknown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DistanceCell(pub Option<u32>);

impl fmt::Display for DistanceCell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(d) => write!(f, "{d}"),
            None => f.write_str("X"),
        }
    }
}

/// Printable rows of a matrix, for [`crate::io::write_matrix_tsv`].
pub fn matrix_cells(matrix: &DistanceMatrix) -> Vec<Vec<DistanceCell>> {
    matrix
        .rows()
        .iter()
        .map(|row| row.iter().map(|&d| DistanceCell(d)).collect())
        .collect()
}

/// Entries ordered by descending count, then canonical form.
pub fn ordered_entries(multiset: &TreeMultiset) -> Vec<&MultisetEntry> {
    let mut entries: Vec<&MultisetEntry> = multiset.iter().collect();
    entries.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.key.cmp(&b.key)));
    entries
}

/// Plain structure of a tree for an external renderer.
#[derive(Debug, Clone, Serialize)]
pub struct TreeLayout {
    pub newick: String,
    pub nodes: Vec<LayoutNode>,
    /// `(parent, child)` pairs.
    pub edges: Vec<(NodeId, NodeId)>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LayoutNode {
    pub id: NodeId,
    pub label: Option<String>,
    pub depth: usize,
    /// Left-to-right position among the leaves.
    pub leaf_rank: Option<usize>,
}

impl TreeLayout {
    pub fn of(tree: &Tree) -> Self {
        let mut depth = vec![0usize; tree.len()];
        let mut nodes = Vec::with_capacity(tree.len());
        let mut edges = Vec::new();
        let mut leaf_rank = 0;
        for id in tree.preorder() {
            if let Some(parent) = tree.parent(id) {
                depth[id] = depth[parent] + 1;
                edges.push((parent, id));
            }
            let node = tree.node(id);
            let rank = node.is_leaf().then(|| {
                leaf_rank += 1;
                leaf_rank - 1
            });
            nodes.push(LayoutNode {
                id,
                label: node.label.clone(),
                depth: depth[id],
                leaf_rank: rank,
            });
        }
        TreeLayout {
            newick: tree.to_newick(),
            nodes,
            edges,
        }
    }
}

/// Plain structure of an rSPR graph for an external renderer.
#[derive(Debug, Clone, Serialize)]
pub struct GraphLayout {
    pub nodes: Vec<GraphLayoutNode>,
    pub edges: Vec<(usize, usize)>,
}

#[derive(Debug, Clone, Serialize)]
pub struct GraphLayoutNode {
    pub id: usize,
    pub label: String,
    pub aliases: Vec<String>,
    pub newick: String,
    pub key: CanonicalKey,
    pub seed: bool,
    pub expanded: bool,
}

impl GraphLayout {
    pub fn of(graph: &RsprGraph) -> Self {
        let nodes = graph
            .nodes()
            .iter()
            .enumerate()
            .map(|(id, node)| GraphLayoutNode {
                id,
                label: node.label.clone(),
                aliases: node.aliases.clone(),
                newick: node.tree.to_newick(),
                key: node.key.clone(),
                seed: node.seed,
                expanded: node.expanded,
            })
            .collect();
        GraphLayout {
            nodes,
            edges: graph.edges().collect(),
        }
    }
}

/// Outcome of the Hamiltonian cycle search over an attached graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    Found(Vec<usize>),
    Absent,
    Skipped(String),
}

#[derive(Debug, Clone)]
struct AttachedNetwork {
    newick: String,
    summary: NetworkSummary,
}

#[derive(Debug, Clone)]
struct AttachedMultiset {
    leaves: Vec<String>,
    combinations: u128,
    entries: Vec<MultisetEntry>,
}

#[derive(Debug, Clone)]
struct AttachedGraph {
    graph: RsprGraph,
    adjacency: Vec<Vec<usize>>,
    cycle: CycleOutcome,
}

/// Everything one invocation computed.
#[derive(Debug, Clone, Default)]
pub struct ResultSet {
    network: Option<AttachedNetwork>,
    multiset: Option<AttachedMultiset>,
    inputs: Vec<TreeRecord>,
    matrix: Option<DistanceMatrix>,
    graph: Option<AttachedGraph>,
}

impl ResultSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_network(mut self, newick: impl Into<String>, summary: NetworkSummary) -> Self {
        self.network = Some(AttachedNetwork {
            newick: newick.into(),
            summary,
        });
        self
    }

    pub fn with_multiset(mut self, multiset: &TreeMultiset) -> Self {
        self.multiset = Some(AttachedMultiset {
            leaves: multiset.leaves().to_vec(),
            combinations: multiset.combinations(),
            entries: ordered_entries(multiset).into_iter().cloned().collect(),
        });
        self
    }

    pub fn with_inputs(mut self, inputs: Vec<TreeRecord>) -> Self {
        self.inputs = inputs;
        self
    }

    pub fn with_matrix(mut self, matrix: DistanceMatrix) -> Self {
        self.matrix = Some(matrix);
        self
    }

    pub fn with_graph(mut self, graph: RsprGraph) -> Self {
        let cycle = match graph.hamiltonian_cycle() {
            Ok(Some(path)) => CycleOutcome::Found(path),
            Ok(None) => CycleOutcome::Absent,
            Err(e) => CycleOutcome::Skipped(e.to_string()),
        };
        self.graph = Some(AttachedGraph {
            adjacency: graph.adjacency(),
            graph,
            cycle,
        });
        self
    }

    pub fn network_summary(&self) -> Option<&NetworkSummary> {
        self.network.as_ref().map(|n| &n.summary)
    }

    /// Multiset entries in reporting order.
    pub fn entries(&self) -> &[MultisetEntry] {
        self.multiset
            .as_ref()
            .map(|m| m.entries.as_slice())
            .unwrap_or_default()
    }

    pub fn trees(&self) -> impl Iterator<Item = &Tree> {
        self.entries().iter().map(|entry| &entry.tree)
    }

    pub fn inputs(&self) -> &[TreeRecord] {
        &self.inputs
    }

    pub fn matrix(&self) -> Option<&DistanceMatrix> {
        self.matrix.as_ref()
    }

    pub fn graph(&self) -> Option<&RsprGraph> {
        self.graph.as_ref().map(|g| &g.graph)
    }

    pub fn cycle(&self) -> Option<&CycleOutcome> {
        self.graph.as_ref().map(|g| &g.cycle)
    }

    /// Newick export of the multiset; the count rides along as a comment.
    ///
    /// ```text
    /// ((a,b),c)[&count=3];
    /// ```
    pub fn newick_lines(&self) -> Vec<String> {
        self.entries()
            .iter()
            .map(|entry| {
                let newick = entry.tree.to_newick();
                let body = newick.strip_suffix(';').unwrap_or(&newick);
                format!("{body}[&count={}];", entry.count)
            })
            .collect()
    }

    pub fn text(&self) -> String {
        let mut out = String::new();
        if let Some(network) = &self.network {
            write_network(&mut out, network);
        }
        if let Some(multiset) = &self.multiset {
            write_multiset(&mut out, multiset);
        }
        if !self.inputs.is_empty() {
            write_inputs(&mut out, &self.inputs);
        }
        if let Some(matrix) = &self.matrix {
            write_distances(&mut out, matrix);
        }
        if let Some(graph) = &self.graph {
            write_graph(&mut out, graph);
        }
        out
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&JsonReport::of(self))
    }
}

fn write_network(out: &mut String, network: &AttachedNetwork) {
    let summary = &network.summary;
    let _ = writeln!(out, "NETWORK:\n{}\n", network.newick);
    let _ = writeln!(out, "Reticulations: {}", summary.reticulations);
    let _ = writeln!(out, "Network leaves:\n{}", summary.leaves.join(", "));
    match summary.combinations {
        Some(n) => {
            let _ = writeln!(out, "Combinations: {n}");
        }
        None => {
            let _ = writeln!(out, "Combinations: more than 2^128");
        }
    }
}

fn write_multiset(out: &mut String, multiset: &AttachedMultiset) {
    let _ = writeln!(out, "\nTREES\nLeaves\n{}\n", multiset.leaves.join(", "));
    let _ = writeln!(out, "Total trees: {}", multiset.combinations);
    let _ = writeln!(out, "Distinct trees: {}\n", multiset.entries.len());
    for entry in &multiset.entries {
        let _ = writeln!(out, "{}  x{}", entry.tree, entry.count);
    }
}

fn write_inputs(out: &mut String, inputs: &[TreeRecord]) {
    let _ = writeln!(out, "TREES:");
    for record in inputs {
        match &record.tree {
            Ok(_) => {
                let _ = writeln!(out, "{}:\n{}\n", record.name, record.text);
            }
            Err(e) => {
                let _ = writeln!(out, "{}:\n{}\n{EXCLUDED_TREE}: {e}\n", record.name, record.text);
            }
        }
    }
}

fn write_distances(out: &mut String, matrix: &DistanceMatrix) {
    let names = matrix.names();
    if matrix.len() == 2 {
        let _ = writeln!(out, "drSPR = {}", DistanceCell(matrix.get(0, 1)));
    } else {
        let _ = writeln!(out, "DISTANCE MATRIX:\n\t{}", names.join("\t"));
        for (name, row) in names.iter().zip(matrix.rows()) {
            let cells: Vec<String> = row.iter().map(|&d| DistanceCell(d).to_string()).collect();
            let _ = writeln!(out, "{name}\t{}", cells.join("\t"));
        }
    }

    if !matrix.failures().is_empty() {
        let _ = writeln!(out, "\nUNKNOWN DISTANCES:");
        for failure in matrix.failures() {
            let _ = writeln!(
                out,
                "{} - {}: {}",
                names[failure.first], names[failure.second], failure.error
            );
        }
    }

    let has_forests = (0..matrix.len())
        .any(|i| (i + 1..matrix.len()).any(|j| matrix.forest(i, j).is_some()));
    if has_forests {
        let _ = write!(out, "\nCLUSTERS:");
        for i in 0..matrix.len().saturating_sub(1) {
            let _ = writeln!(out, "\nClusters compared with {}:", names[i]);
            for j in i + 1..matrix.len() {
                if let Some(forest) = matrix.forest(i, j) {
                    let _ = writeln!(
                        out,
                        "{} (drSPR = {}): {}",
                        names[j],
                        DistanceCell(matrix.get(i, j)),
                        forest.join(" ")
                    );
                }
            }
        }
    }
    let _ = writeln!(out);
}

fn write_graph(out: &mut String, attached: &AttachedGraph) {
    let graph = &attached.graph;
    let label = |id: usize| graph.node(id).label.as_str();

    let _ = writeln!(
        out,
        "rSPR GRAPH: {} trees, {} moves",
        graph.len(),
        graph.edge_count()
    );
    if let Err(e) = graph.completion() {
        let _ = writeln!(out, "Incomplete: {e}");
    }
    for node in graph.nodes().iter().filter(|node| !node.seed) {
        let _ = writeln!(out, "{}: {}", node.label, node.tree);
    }

    let _ = write!(out, "\nHAMILTONIAN CYCLE: ");
    match &attached.cycle {
        CycleOutcome::Found(path) => {
            let names: Vec<&str> = path.iter().map(|&id| label(id)).collect();
            let _ = writeln!(out, "Yes\n{}", names.join(" -> "));
        }
        CycleOutcome::Absent => {
            let _ = writeln!(out, "No");
        }
        CycleOutcome::Skipped(reason) => {
            let _ = writeln!(out, "not searched ({reason})");
        }
    }

    let _ = writeln!(out, "\nADJACENCY LIST:");
    for (id, neighbors) in attached.adjacency.iter().enumerate() {
        let names: Vec<&str> = neighbors.iter().map(|&n| label(n)).collect();
        let _ = writeln!(out, "{}: {}", label(id), names.join(", "));
    }
}

#[derive(Serialize)]
struct JsonEntry<'a> {
    #[serde(flatten)]
    layout: TreeLayout,
    key: &'a CanonicalKey,
    count: u64,
    witness: &'a [usize],
}

#[derive(Serialize)]
struct JsonInput<'a> {
    name: &'a str,
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

#[derive(Serialize)]
struct JsonFailure<'a> {
    first: &'a str,
    second: &'a str,
    error: String,
}

#[derive(Serialize)]
struct JsonMatrix<'a> {
    names: &'a [String],
    rows: &'a [Vec<Option<u32>>],
    unknown: Vec<JsonFailure<'a>>,
}

#[derive(Serialize)]
struct JsonGraph<'a> {
    #[serde(flatten)]
    layout: GraphLayout,
    complete: bool,
    hamiltonian_cycle: Option<Vec<&'a str>>,
}

#[derive(Serialize)]
struct JsonReport<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    network: Option<&'a NetworkSummary>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    trees: Vec<JsonEntry<'a>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    inputs: Vec<JsonInput<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    matrix: Option<JsonMatrix<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    graph: Option<JsonGraph<'a>>,
}

impl<'a> JsonReport<'a> {
    fn of(result: &'a ResultSet) -> Self {
        let trees = result
            .entries()
            .iter()
            .map(|entry| JsonEntry {
                layout: TreeLayout::of(&entry.tree),
                key: &entry.key,
                count: entry.count,
                witness: &entry.witness,
            })
            .collect();
        let inputs = result
            .inputs
            .iter()
            .map(|record| JsonInput {
                name: &record.name,
                text: &record.text,
                error: record.tree.as_ref().err().map(ToString::to_string),
            })
            .collect();
        let matrix = result.matrix.as_ref().map(|matrix| JsonMatrix {
            names: matrix.names(),
            rows: matrix.rows(),
            unknown: matrix
                .failures()
                .iter()
                .map(|f| JsonFailure {
                    first: &matrix.names()[f.first],
                    second: &matrix.names()[f.second],
                    error: f.error.to_string(),
                })
                .collect(),
        });
        let graph = result.graph.as_ref().map(|attached| JsonGraph {
            layout: GraphLayout::of(&attached.graph),
            complete: attached.graph.completion().is_ok(),
            hamiltonian_cycle: match &attached.cycle {
                CycleOutcome::Found(path) => Some(
                    path.iter()
                        .map(|&id| attached.graph.node(id).label.as_str())
                        .collect(),
                ),
                _ => None,
            },
        });
        JsonReport {
            network: result.network_summary(),
            trees,
            inputs,
            matrix,
            graph,
        }
    }
}
