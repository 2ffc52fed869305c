//! SMT Module
//!
//! Typed constraint terms and the in-tree decision procedure for
//! quantifier-free linear integer arithmetic plus booleans.
//!
//! ## Architecture
//!
//! ```text
//! smt
//! ├── domain/             # LinExpr, Atom, Formula
//! └── infrastructure/     # SolverContext, search core, intervals
//! ```
//!
//! All three validation levels share one [`SolverContext`] preloaded with
//! the base constraint; queries are delimited by push/pop frames.

pub mod domain;
pub mod infrastructure;

pub use domain::{Atom, Formula, LinExpr, Rel, VarId};
pub use infrastructure::{Model, ModelValue, SolverContext, SolverResult};
