/*
 * canvass-core - Questionnaire Static Analysis Engine
 *
 * Feature-first architecture:
 * - features/questionnaire : YAML loader + typed model
 * - features/expr          : predicate language (lexer, parser, lowering)
 * - features/smt           : constraint terms + in-tree QF_LIA solver
 * - features/analysis      : static builder, topology, validation levels 1-3
 * - pipeline/              : orchestration + JSON report
 *
 * The three validation levels answer, for every item of a questionnaire:
 * can it be reached, can it be answered, and do accumulated upstream
 * constraints silently kill it (dead code)?
 */

#![allow(clippy::new_without_default)]
#![allow(clippy::module_inception)]
#![allow(clippy::only_used_in_recursion)]

/// Feature modules
pub mod features;

/// Pipeline orchestration
pub mod pipeline;

/// Configuration system
pub mod config;

/// Error types
pub mod errors;

// Re-exports for the public API
pub use config::{AnalysisConfig, CancelFlag, SolverConfig};
pub use errors::{CanvassError, ItemError, ItemErrorKind, Result};
pub use features::analysis::{
    GlobalOutcome, GlobalVerdict, ItemClassification, PathVerdict, PostStatus, Reachability,
    Topology,
};
pub use features::questionnaire::{AnswerDomain, Item, ItemKind, Questionnaire};
pub use pipeline::{AnalysisOutcome, AnalysisStats, Analyzer, Report};
