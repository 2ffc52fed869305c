//! Incremental Solver Context
//!
//! Assertion stack with push/pop frames, shared by all three validation
//! levels so the base constraint is loaded once per analysis and each query
//! only pushes its own delta.

use tracing::trace;

use crate::config::{CancelFlag, SolverConfig};
use crate::features::smt::domain::Formula;

use super::search;
use super::SolverResult;

/// Incremental solver context over an assertion stack.
#[derive(Debug, Clone)]
pub struct SolverContext {
    assertions: Vec<Formula>,
    frames: Vec<usize>,
    config: SolverConfig,
    cancel: CancelFlag,
}

impl SolverContext {
    pub fn new(config: SolverConfig, cancel: CancelFlag) -> Self {
        Self {
            assertions: Vec::new(),
            frames: Vec::new(),
            config,
            cancel,
        }
    }

    /// Assert a formula in the current frame.
    pub fn assert_formula(&mut self, formula: Formula) {
        if !formula.is_true() {
            self.assertions.push(formula);
        }
    }

    /// Open a new assertion frame.
    pub fn push(&mut self) {
        self.frames.push(self.assertions.len());
    }

    /// Discard every assertion made since the matching [`push`].
    ///
    /// [`push`]: SolverContext::push
    pub fn pop(&mut self) {
        let mark = self.frames.pop().expect("pop without matching push");
        self.assertions.truncate(mark);
    }

    /// Decide the conjunction of all asserted formulas.
    pub fn check(&self) -> SolverResult {
        trace!(assertions = self.assertions.len(), "solver check");
        search::solve(&self.assertions, &self.config, &self.cancel)
    }

    /// Check the current stack plus the given assumptions, without
    /// disturbing the stack.
    pub fn check_with(&mut self, assumptions: &[Formula]) -> SolverResult {
        self.push();
        for formula in assumptions {
            self.assert_formula(formula.clone());
        }
        let result = self.check();
        self.pop();
        result
    }

    pub fn assertion_count(&self) -> usize {
        self.assertions.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::smt::domain::{Atom, LinExpr};

    fn ctx() -> SolverContext {
        SolverContext::new(SolverConfig::default(), CancelFlag::new())
    }

    fn x_gt(value: i64) -> Formula {
        Formula::Atom(Atom::gt(&LinExpr::var("x"), &LinExpr::constant(value)))
    }

    fn x_lt(value: i64) -> Formula {
        Formula::Atom(Atom::lt(&LinExpr::var("x"), &LinExpr::constant(value)))
    }

    #[test]
    fn test_empty_context_sat() {
        assert!(ctx().check().is_sat());
    }

    #[test]
    fn test_push_pop_restores() {
        let mut ctx = ctx();
        ctx.assert_formula(x_gt(0));
        assert!(ctx.check().is_sat());

        ctx.push();
        ctx.assert_formula(x_lt(-5));
        assert!(ctx.check().is_unsat());
        ctx.pop();

        assert!(ctx.check().is_sat());
    }

    #[test]
    fn test_check_with_leaves_stack_unchanged() {
        let mut ctx = ctx();
        ctx.assert_formula(x_gt(0));
        let before = ctx.assertion_count();
        assert!(ctx.check_with(&[x_lt(-5)]).is_unsat());
        assert_eq!(ctx.assertion_count(), before);
        assert!(ctx.check().is_sat());
    }

    #[test]
    fn test_true_assertions_elided() {
        let mut ctx = ctx();
        ctx.assert_formula(Formula::True);
        assert_eq!(ctx.assertion_count(), 0);
    }
}
