//! Crate root: module orchestration and public re-exports.
//!
//! Modules:
//! - `newick`, `model`: extended-Newick parsing and the canonical tree / network model.
//! - `embedding`: trees displayed by a network, counted per canonical form.
//! - `oracle`: the rSPR distance / neighborhood boundary; `spr` and `external` implement it.
//! - `graph`: pairwise distance matrices and rSPR graphs built through an oracle.
//! - `report`: ordered results, text report and JSON export.
//! - `io`: reading tree lists and networks, TSV / Newick writers.
//! - `bitset`, `snapshot`: leaf clusters used by the native rSPR neighborhood.
//! - `config`, `error`: engine settings and the error taxonomy.
//! - `api`: Python bindings via `pyo3` (gated behind "python" feature).

pub mod bitset;
pub mod config;
pub mod embedding;
pub mod error;
pub mod external;
pub mod graph;
pub mod io;
pub mod model;
pub mod newick;
pub mod oracle;
pub mod report;
pub mod snapshot;
pub mod spr;

#[cfg(feature = "python")]
pub mod api;

// Re-export frequently used types & functions
pub use bitset::Bitset;
pub use config::{CancellationToken, EmbeddingConfig, GraphConfig, PairwiseConfig, SearchBudget};
pub use embedding::{EmbeddingCache, TreeMultiset, enumerate};
pub use error::{FormatError, OracleError, PhyloError, Result};
pub use graph::{DistanceMatrix, RsprGraph, build_graph, induced_graph, pairwise_distances};
pub use io::{read_network, read_tree_list, write_matrix_tsv};
pub use model::{CanonicalKey, NamedTree, Network, Phylogeny, Tree};
pub use oracle::{Comparison, RsprOracle};
pub use report::ResultSet;
pub use snapshot::TreeSnapshot;
pub use spr::SprNeighborhood;
