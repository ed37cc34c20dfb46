//! Error taxonomy shared by the parser, the enumerator and the rSPR engines.
//!
//! Parsing and leaf-subset errors abort the requesting operation. Oracle
//! failures are recoverable per call and are folded into partial results by
//! the graph builder. Nothing here is fatal to the hosting process.

use std::time::Duration;
use thiserror::Error;

/// Malformed network or tree text.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FormatError {
    #[error("input is empty")]
    EmptyInput,
    #[error("string is not terminated by ';'")]
    MissingSemicolon,
    #[error("unexpected input after ';' at position {0}")]
    TrailingInput(usize),
    #[error("unbalanced brackets at position {0}")]
    UnbalancedBrackets(usize),
    #[error("unexpected character '{ch}' at position {position}")]
    UnexpectedCharacter { ch: char, position: usize },
    #[error("unterminated quoted label starting at position {0}")]
    UnterminatedQuote(usize),
    #[error("unterminated comment starting at position {0}")]
    UnterminatedComment(usize),
    #[error("invalid branch length '{value}' at position {position}")]
    InvalidBranchLength { value: String, position: usize },
    #[error("no labelled leaf in input")]
    NoLabelledLeaf,
    #[error("tree contains an unlabelled leaf")]
    UnlabelledLeaf,
    #[error("leaf label '{0}' occurs more than once")]
    DuplicateLabel(String),
    #[error("reticulation '#{0}' has an empty identifier")]
    EmptyReticulationTag(String),
    #[error("reticulation '#{0}' occurs only once")]
    UnmatchedReticulation(String),
    #[error("reticulation '#{0}' is given children more than once")]
    DuplicateReticulation(String),
    #[error("reticulation '#{0}' has no children")]
    ReticulateLeaf(String),
    #[error("reticulation '#{0}' is entered twice from the same parent")]
    ParallelArcs(String),
    #[error("network contains a directed cycle")]
    Cycle,
    #[error("expected a tree but found {0} reticulation(s)")]
    UnexpectedReticulation(usize),
    #[error("expected exactly one network, found {0}")]
    NetworkCount(usize),
}

/// Leaf filter handed to the enumerator is not a non-empty subset of the network's leaves.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LeafSubsetError {
    #[error("leaf subset is empty")]
    Empty,
    #[error("leaves not present in the network: {}", .0.join(", "))]
    Unknown(Vec<String>),
}

/// Failure of a single distance or neighborhood computation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum OracleError {
    #[error("rSPR oracle unavailable: {0}")]
    Unavailable(String),
    #[error("rSPR oracle exceeded its budget after {0:?}")]
    Timeout(Duration),
    #[error("trees do not share the same taxa, missing: {}", .0.join(", "))]
    IncompatibleLeafSets(Vec<String>),
}

#[derive(Debug, Error)]
pub enum PhyloError {
    #[error("format error: {0}")]
    Format(#[from] FormatError),
    #[error("invalid leaf subset: {0}")]
    InvalidLeafSubset(#[from] LeafSubsetError),
    #[error(
        "{combinations} reticulation choices exceed the configured ceiling of {ceiling}; \
         disable rendering or raise the ceiling"
    )]
    UnsupportedScale { combinations: u128, ceiling: u128 },
    #[error(transparent)]
    Oracle(#[from] OracleError),
    #[error("{failed} of {total} oracle calls failed; result is incomplete")]
    PartialResult { failed: usize, total: usize },
    #[error(
        "graph construction stopped at {limit} nodes with {unexpanded} node(s) left unexpanded \
         ({failed} neighborhood(s) failed)"
    )]
    GraphSizeLimitExceeded {
        limit: usize,
        unexpanded: usize,
        failed: usize,
    },
    #[error("Hamiltonian cycle search is limited to {limit} nodes, graph has {nodes}")]
    CycleSearchTooLarge { nodes: usize, limit: usize },
    #[error("computation cancelled")]
    Cancelled,
    #[error("need at least {required} valid trees, found {found}")]
    InsufficientTrees { found: usize, required: usize },
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T, E = PhyloError> = std::result::Result<T, E>;
