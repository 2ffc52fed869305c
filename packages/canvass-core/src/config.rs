//! Analysis configuration
//!
//! All knobs for one analysis run. Nothing here is global: each analysis
//! instance owns its configuration and cancellation flag.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Solver resource limits. Every query honors the timeout and the decision
/// budget; exhausting either yields `Unknown`, never an error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolverConfig {
    /// Wall-clock budget per query in milliseconds
    pub timeout_ms: u64,

    /// Maximum boolean/branching decisions per query
    pub max_decisions: u64,

    /// Fixpoint cap for interval propagation rounds
    pub max_propagation_rounds: u32,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 5_000,
            max_decisions: 200_000,
            max_propagation_rounds: 128,
        }
    }
}

/// Top-level analysis configuration.
#[derive(Debug, Clone, Default)]
pub struct AnalysisConfig {
    pub solver: SolverConfig,
    pub cancel: CancelFlag,
}

/// Cooperative cancellation flag, polled between items.
///
/// Cloning shares the underlying flag.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. The analyzer aborts at the next item boundary,
    /// returning all verdicts produced so far.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = SolverConfig::default();
        assert_eq!(cfg.timeout_ms, 5_000);
        assert!(cfg.max_decisions > 0);
    }

    #[test]
    fn test_cancel_flag_shared() {
        let flag = CancelFlag::new();
        let clone = flag.clone();
        assert!(!clone.is_cancelled());
        flag.cancel();
        assert!(clone.is_cancelled());
    }
}
