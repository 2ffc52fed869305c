//! Path-Based Analysis (Level 3)
//!
//! Accumulated reachability per item:
//!
//! `A_i := B★ ∧ ⋀_{j ∈ Pred*(i)} (P_j ⇒ Q_j)`
//!
//! where `Pred*(i)` is the set of canonical-order predecessors inside the
//! item's weakly-connected component. The dead-code query is
//! `A_i ∧ P_i ∧ Q_i` (`Q_i = true` when the item has no postcondition):
//! UNSAT for a reachable item means accumulated upstream constraints forbid
//! ever answering it — dead code, even when Level 1 said CONDITIONAL or
//! ALWAYS.
//!
//! Visited booleans of every `j ∈ Pred*(i)` are asserted true inside the
//! frame: on any path reaching `i`, its dependency closure has been
//! visited. Each item pushes its accumulated frame onto the shared base
//! context, queries, and pops.

use tracing::debug;

use crate::config::AnalysisConfig;
use crate::errors::{ItemError, ItemErrorKind};
use crate::features::expr::infrastructure::lowering::visited_var;
use crate::features::smt::domain::Formula;
use crate::features::smt::infrastructure::{SolverContext, SolverResult};

use super::classifier::Reachability;
use super::static_builder::StaticModel;
use super::topology::Topology;

/// Level-3 verdict for one item.
#[derive(Debug, Clone, PartialEq)]
pub struct PathVerdict {
    pub id: String,
    /// Dead: reachable per-item, forbidden under accumulated constraints
    pub dead: bool,
    /// SAT of `A_i ∧ P_i ∧ Q_i`; `None` when not decidable
    pub accumulated_reachable: Option<bool>,
    pub predecessors: Vec<String>,
    pub errors: Vec<ItemError>,
}

/// Level-3 validator sharing one base-loaded context across items.
pub struct PathValidator<'a> {
    model: &'a StaticModel,
    topology: &'a Topology,
    ctx: SolverContext,
}

impl<'a> PathValidator<'a> {
    pub fn new(model: &'a StaticModel, topology: &'a Topology, config: &AnalysisConfig) -> Self {
        let mut ctx = SolverContext::new(config.solver.clone(), config.cancel.clone());
        model.assert_base(&mut ctx);
        Self {
            model,
            topology,
            ctx,
        }
    }

    /// Check accumulated reachability for one item, given its Level-1
    /// reachability class.
    pub fn validate_item(&mut self, id: &str, reach: Option<Reachability>) -> PathVerdict {
        let record = match self.model.item(id) {
            Some(record) => record,
            None => return PathVerdict::skipped(id),
        };
        if !record.compiled() {
            // The item's own record already carries its compile errors
            return PathVerdict::skipped(id);
        }

        let predecessors = self.topology.accumulated_predecessors(id);

        // A failed predecessor's implication cannot be built; every query
        // that would need it is undecided
        if let Some(failed) = predecessors
            .iter()
            .find(|j| self.model.item(j).map(|r| !r.compiled()).unwrap_or(true))
            .cloned()
        {
            return PathVerdict {
                id: id.to_string(),
                dead: false,
                accumulated_reachable: None,
                predecessors,
                errors: vec![ItemError::new(
                    ItemErrorKind::SolverUndecided,
                    format!(
                        "accumulated formula requires predecessor `{}`, which failed to compile",
                        failed
                    ),
                )],
            };
        }

        if reach == Some(Reachability::Never) {
            // Unreachable per-item is not dead code; nothing accumulated
            // changes that
            return PathVerdict {
                id: id.to_string(),
                dead: false,
                accumulated_reachable: Some(false),
                predecessors,
                errors: Vec::new(),
            };
        }

        self.ctx.push();
        for j in &predecessors {
            let pred = self.model.item(j).expect("predecessor compiled");
            self.ctx
                .assert_formula(Formula::BoolVar(visited_var(j)));
            self.ctx.assert_formula(Formula::implies(
                pred.pre.clone().expect("compiled"),
                pred.post.clone().expect("compiled"),
            ));
        }
        self.ctx
            .assert_formula(record.pre.clone().expect("compiled"));
        self.ctx
            .assert_formula(record.post.clone().expect("compiled"));
        let result = self.ctx.check();
        self.ctx.pop();

        match result {
            SolverResult::Sat(_) => PathVerdict {
                id: id.to_string(),
                dead: false,
                accumulated_reachable: Some(true),
                predecessors,
                errors: Vec::new(),
            },
            SolverResult::Unsat => {
                debug!(item = id, "dead code: accumulated constraints forbid item");
                PathVerdict {
                    id: id.to_string(),
                    dead: reach.is_some(),
                    accumulated_reachable: Some(false),
                    predecessors,
                    errors: Vec::new(),
                }
            }
            SolverResult::Unknown => PathVerdict {
                id: id.to_string(),
                dead: false,
                accumulated_reachable: None,
                predecessors,
                errors: vec![ItemError::new(
                    ItemErrorKind::SolverUndecided,
                    "solver undecided on accumulated reachability",
                )],
            },
        }
    }
}

impl PathVerdict {
    fn skipped(id: &str) -> Self {
        Self {
            id: id.to_string(),
            dead: false,
            accumulated_reachable: None,
            predecessors: Vec::new(),
            errors: Vec::new(),
        }
    }
}
