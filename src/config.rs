//! Engine configuration, scale guidance and cancellation.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, TryFromFloatSecsError};

/// Informational limits under which the engines are known to be comfortable.
/// Nothing enforces these; they feed defaults and CLI help.
pub struct ScaleGuidance;

impl ScaleGuidance {
    pub const RENDERED_RETICULATIONS: usize = 7;
    pub const RENDERED_LEAVES: usize = 10;
    pub const HEADLESS_RETICULATIONS: usize = 10;
    pub const HEADLESS_LEAVES: usize = 20;
    pub const RSPR_TREES: usize = 20;
    pub const RSPR_LEAVES: usize = 20;
}

/// Shared flag checked between combinations, pairs and frontier expansions.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// `true` when an optional token has fired.
pub(crate) fn cancelled(token: &Option<CancellationToken>) -> bool {
    token.as_ref().is_some_and(CancellationToken::is_cancelled)
}

#[derive(Debug, Clone)]
pub struct EmbeddingConfig {
    /// Advisory ceiling on the number of reticulation-choice combinations.
    pub max_combinations: u128,
    pub cancel: Option<CancellationToken>,
}

impl EmbeddingConfig {
    /// Stricter ceiling for callers that will render every displayed tree.
    pub fn for_rendering() -> Self {
        Self {
            max_combinations: 1 << ScaleGuidance::RENDERED_RETICULATIONS,
            cancel: None,
        }
    }

    pub fn with_max_combinations(mut self, max: u128) -> Self {
        self.max_combinations = max;
        self
    }

    pub fn with_cancel(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            max_combinations: 1 << ScaleGuidance::HEADLESS_RETICULATIONS,
            cancel: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PairwiseConfig {
    /// Run independent oracle calls on the rayon pool.
    pub parallel: bool,
    /// Also ask the oracle for a maximum agreement forest of every pair.
    pub forests: bool,
    pub cancel: Option<CancellationToken>,
}

impl Default for PairwiseConfig {
    fn default() -> Self {
        Self {
            parallel: true,
            forests: false,
            cancel: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct GraphConfig {
    /// Bound on distinct trees held by the graph.
    pub max_nodes: usize,
    pub parallel: bool,
    pub cancel: Option<CancellationToken>,
}

impl GraphConfig {
    pub fn with_max_nodes(mut self, max_nodes: usize) -> Self {
        self.max_nodes = max_nodes;
        self
    }
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            max_nodes: 1000,
            parallel: true,
            cancel: None,
        }
    }
}

/// Budget of the native exact-distance search.
#[derive(Debug, Clone, Copy)]
pub struct SearchBudget {
    /// Distinct trees the bidirectional search may hold before giving up.
    pub max_states: usize,
    pub timeout: Option<Duration>,
}

impl Default for SearchBudget {
    fn default() -> Self {
        Self {
            max_states: 200_000,
            timeout: Some(Duration::from_secs(30)),
        }
    }
}

/// Per-call time budget from a caller-supplied number of seconds; zero or
/// less disables it. Values no `Duration` can hold (NaN, infinite, huge) are errors.
pub fn timeout_from_secs(secs: f64) -> Result<Option<Duration>, TryFromFloatSecsError> {
    if secs <= 0.0 {
        return Ok(None);
    }
    Duration::try_from_secs_f64(secs).map(Some)
}

/// Largest graph the Hamiltonian cycle search will attempt.
pub const HAMILTONIAN_NODE_LIMIT: usize = ScaleGuidance::RSPR_TREES;
