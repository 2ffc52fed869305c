//! Item Classifier (Level 1)
//!
//! Per-item classification against a context preloaded with `B★`:
//!
//! | Query | Term          | UNSAT means          |
//! |-------|---------------|----------------------|
//! | R1    | `B★ ∧ ¬P`     | reach = ALWAYS       |
//! | R2    | `B★ ∧ P`      | reach = NEVER        |
//! | T1    | `B★ ∧ P ∧ Q`  | post = INFEASIBLE    |
//! | T2    | `B★ ∧ P ∧ ¬Q` | post = TAUTOLOGICAL  |
//!
//! Both R-queries SAT ⇒ CONDITIONAL; both T-queries SAT ⇒ CONSTRAINING.
//! Items without postconditions get `post = NONE` and skip T1/T2; NEVER
//! items keep a vacuously tautological postcondition flagged unobservable.
//! SAT models, restricted to referenced outcome variables, are kept as
//! witnesses. Solver `Unknown` surfaces as an undecided verdict naming the
//! query.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::AnalysisConfig;
use crate::errors::{ItemError, ItemErrorKind};
use crate::features::smt::domain::Formula;
use crate::features::smt::infrastructure::{Model, SolverContext, SolverResult};

use super::static_builder::{ItemConstraints, StaticModel};

/// Precondition reachability class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Reachability {
    Always,
    Conditional,
    Never,
}

impl std::fmt::Display for Reachability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Always => write!(f, "ALWAYS"),
            Self::Conditional => write!(f, "CONDITIONAL"),
            Self::Never => write!(f, "NEVER"),
        }
    }
}

/// Postcondition class relative to the precondition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PostStatus {
    Tautological,
    Constraining,
    Infeasible,
    None,
}

impl std::fmt::Display for PostStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Tautological => write!(f, "TAUTOLOGICAL"),
            Self::Constraining => write!(f, "CONSTRAINING"),
            Self::Infeasible => write!(f, "INFEASIBLE"),
            Self::None => write!(f, "NONE"),
        }
    }
}

/// Level-1 verdict for one item.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemClassification {
    pub id: String,
    /// `None` when compilation failed or the solver was undecided
    pub reach: Option<Reachability>,
    pub post: Option<PostStatus>,
    /// Postcondition verdict is unobservable (item NEVER reachable)
    pub vacuous: bool,
    /// UNSAT(`B★ ∧ ¬Q`): the postcondition holds in every valid state
    pub q_globally_true: bool,
    /// UNSAT(`B★ ∧ Q`): the postcondition holds in no valid state
    pub q_globally_false: bool,
    /// SAT model restricted to referenced outcome variables
    pub witness: Option<Model>,
    pub errors: Vec<ItemError>,
}

/// Level-1 classifier sharing one base-loaded context across items.
pub struct ItemClassifier<'a> {
    model: &'a StaticModel,
    ctx: SolverContext,
}

impl<'a> ItemClassifier<'a> {
    pub fn new(model: &'a StaticModel, config: &AnalysisConfig) -> Self {
        let mut ctx = SolverContext::new(config.solver.clone(), config.cancel.clone());
        model.assert_base(&mut ctx);
        Self { model, ctx }
    }

    /// Classify a single item.
    pub fn classify_item(&mut self, id: &str) -> ItemClassification {
        let record = match self.model.item(id) {
            Some(record) => record,
            None => {
                return ItemClassification {
                    id: id.to_string(),
                    reach: None,
                    post: None,
                    vacuous: false,
                    q_globally_true: false,
                    q_globally_false: false,
                    witness: None,
                    errors: vec![ItemError::new(
                        ItemErrorKind::SolverUndecided,
                        "item unknown to the static builder",
                    )],
                }
            }
        };

        if !record.compiled() {
            return ItemClassification {
                id: id.to_string(),
                reach: None,
                post: None,
                vacuous: false,
                q_globally_true: false,
                q_globally_false: false,
                witness: None,
                errors: record.errors.clone(),
            };
        }

        let pre = record.pre.clone().expect("compiled item has precondition");
        let post = record.post.clone().expect("compiled item has postcondition");
        let mut errors = Vec::new();
        let mut witness = None;

        // Reachability: R1 = B★ ∧ ¬P, R2 = B★ ∧ P
        let r1 = self.ctx.check_with(&[Formula::not(pre.clone())]);
        let r2 = self.ctx.check_with(&[pre.clone()]);
        if let SolverResult::Sat(model) = &r2 {
            witness = Some(restrict(model, record));
        }
        let reach = match (&r1, &r2) {
            (SolverResult::Unsat, _) => Some(Reachability::Always),
            (_, SolverResult::Unsat) => Some(Reachability::Never),
            (SolverResult::Sat(_), SolverResult::Sat(_)) => Some(Reachability::Conditional),
            _ => {
                let query = if r1.is_unknown() { "R1" } else { "R2" };
                errors.push(ItemError::new(
                    ItemErrorKind::SolverUndecided,
                    format!("solver undecided on {}", query),
                ));
                None
            }
        };

        // Postcondition relative to P: T1 = B★ ∧ P ∧ Q, T2 = B★ ∧ P ∧ ¬Q
        let vacuous = reach == Some(Reachability::Never) && record.has_post;
        let post_status = if !record.has_post {
            Some(PostStatus::None)
        } else if vacuous {
            // Unobservable: vacuously tautological under an unreachable P
            Some(PostStatus::Tautological)
        } else {
            let t1 = self.ctx.check_with(&[pre.clone(), post.clone()]);
            let t2 = self.ctx.check_with(&[pre.clone(), Formula::not(post.clone())]);
            if let SolverResult::Sat(model) = &t1 {
                witness = Some(restrict(model, record));
            }
            match (&t1, &t2) {
                (SolverResult::Unsat, _) => Some(PostStatus::Infeasible),
                (_, SolverResult::Unsat) => Some(PostStatus::Tautological),
                (SolverResult::Sat(_), SolverResult::Sat(_)) => Some(PostStatus::Constraining),
                _ => {
                    let query = if t1.is_unknown() { "T1" } else { "T2" };
                    errors.push(ItemError::new(
                        ItemErrorKind::SolverUndecided,
                        format!("solver undecided on {}", query),
                    ));
                    None
                }
            }
        };

        // Global Q flags, independent of P
        let (q_globally_true, q_globally_false) = if record.has_post {
            let q_false = self.ctx.check_with(&[post.clone()]).is_unsat();
            let q_true = self.ctx.check_with(&[Formula::not(post)]).is_unsat();
            (q_true, q_false)
        } else {
            (false, false)
        };

        debug!(
            item = id,
            reach = ?reach,
            post = ?post_status,
            "item classified"
        );

        ItemClassification {
            id: id.to_string(),
            reach,
            post: post_status,
            vacuous,
            q_globally_true,
            q_globally_false,
            witness,
            errors,
        }
    }
}

/// Restrict a model to the item's referenced outcome variables.
fn restrict(model: &Model, record: &ItemConstraints) -> Model {
    model
        .iter()
        .filter(|(var, _)| record.witness_vars.contains(*var))
        .map(|(var, value)| (var.clone(), *value))
        .collect()
}
