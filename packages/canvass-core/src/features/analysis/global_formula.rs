//! Global Formula (Level 2)
//!
//! Builds `F := B★ ∧ ⋀ᵢ (P_i ⇒ Q_i)` and issues one query:
//!
//! - SAT ⇒ `VALID` with a full model witness over the outcome variables
//! - UNSAT ⇒ `INCONSISTENT`, with a deletion-minimized conflict set over
//!   the implications standing in for an unsat core
//!
//! NEVER-reachable items and items that failed compilation are excluded
//! from the conjunction: their implications are unobservable or unknown.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::AnalysisConfig;
use crate::features::smt::domain::Formula;
use crate::features::smt::infrastructure::{Model, SolverContext, SolverResult};

use super::classifier::{ItemClassification, Reachability};
use super::static_builder::StaticModel;

/// Global satisfiability verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GlobalVerdict {
    Valid,
    Inconsistent,
    Undecided,
}

impl std::fmt::Display for GlobalVerdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Valid => write!(f, "VALID"),
            Self::Inconsistent => write!(f, "INCONSISTENT"),
            Self::Undecided => write!(f, "UNDECIDED"),
        }
    }
}

/// Level-2 result.
#[derive(Debug, Clone, PartialEq)]
pub struct GlobalOutcome {
    pub verdict: GlobalVerdict,
    /// Satisfying assignment over outcome variables when VALID
    pub witness: Option<Model>,
    /// Items whose implications are jointly in conflict when INCONSISTENT
    pub conflict: Option<Vec<String>>,
}

/// Check global satisfiability.
pub fn check_global(
    model: &StaticModel,
    classifications: &[ItemClassification],
    config: &AnalysisConfig,
) -> GlobalOutcome {
    let implications = collect_implications(model, classifications);

    let mut ctx = SolverContext::new(config.solver.clone(), config.cancel.clone());
    model.assert_base(&mut ctx);
    for (_, implication) in &implications {
        ctx.assert_formula(implication.clone());
    }

    debug!(implications = implications.len(), "global formula built");

    match ctx.check() {
        SolverResult::Sat(witness) => {
            let witness = restrict_to_outcomes(&witness, model);
            GlobalOutcome {
                verdict: GlobalVerdict::Valid,
                witness: Some(witness),
                conflict: None,
            }
        }
        SolverResult::Unsat => {
            let conflict = minimize_conflict(model, &implications, config);
            info!(conflict = ?conflict, "global formula inconsistent");
            GlobalOutcome {
                verdict: GlobalVerdict::Inconsistent,
                witness: None,
                conflict: Some(conflict),
            }
        }
        SolverResult::Unknown => GlobalOutcome {
            verdict: GlobalVerdict::Undecided,
            witness: None,
            conflict: None,
        },
    }
}

/// Implications `P_i ⇒ Q_i` for every item that compiled, has a
/// postcondition, and is not NEVER-reachable.
fn collect_implications(
    model: &StaticModel,
    classifications: &[ItemClassification],
) -> Vec<(String, Formula)> {
    let mut implications = Vec::new();
    for record in &model.items {
        if !record.compiled() || !record.has_post {
            continue;
        }
        let classification = classifications.iter().find(|c| c.id == record.id);
        if let Some(c) = classification {
            if c.reach == Some(Reachability::Never) {
                continue;
            }
        }
        let pre = record.pre.clone().expect("compiled");
        let post = record.post.clone().expect("compiled");
        implications.push((record.id.clone(), Formula::implies(pre, post)));
    }
    implications
}

/// Deletion-based minimization: drop each implication whose removal keeps
/// the formula UNSAT. What remains is a minimal conflicting set.
fn minimize_conflict(
    model: &StaticModel,
    implications: &[(String, Formula)],
    config: &AnalysisConfig,
) -> Vec<String> {
    let mut kept: Vec<usize> = (0..implications.len()).collect();

    for candidate in 0..implications.len() {
        let trial: Vec<usize> = kept
            .iter()
            .copied()
            .filter(|&i| i != candidate)
            .collect();
        if trial.len() == kept.len() {
            continue;
        }
        let mut ctx = SolverContext::new(config.solver.clone(), config.cancel.clone());
        model.assert_base(&mut ctx);
        for &i in &trial {
            ctx.assert_formula(implications[i].1.clone());
        }
        // Unknown keeps the candidate: only a definite UNSAT may shrink
        // the set
        if ctx.check().is_unsat() {
            kept = trial;
        }
    }

    kept.into_iter()
        .map(|i| implications[i].0.clone())
        .collect()
}

fn restrict_to_outcomes(witness: &Model, model: &StaticModel) -> Model {
    witness
        .iter()
        .filter(|(var, _)| {
            model
                .item(var)
                .map(|record| record.has_outcome)
                .unwrap_or(false)
        })
        .map(|(var, value)| (var.clone(), *value))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::analysis::classifier::ItemClassifier;
    use crate::features::questionnaire::load_from_str;

    fn global(yaml: &str) -> GlobalOutcome {
        let questionnaire = load_from_str(yaml).unwrap();
        let config = AnalysisConfig::default();
        let model = StaticModel::build(&questionnaire, &config).unwrap();
        let mut classifier = ItemClassifier::new(&model, &config);
        let classifications: Vec<_> = questionnaire
            .items
            .iter()
            .map(|item| classifier.classify_item(&item.id))
            .collect();
        check_global(&model, &classifications, &config)
    }

    #[test]
    fn test_no_postconditions_valid() {
        let outcome = global(
            r#"
questionnaire:
  title: T
  blocks:
    - id: b
      items:
        - { id: q_a, kind: Question, input: { control: Editbox, min: 0, max: 10 } }
"#,
        );
        assert_eq!(outcome.verdict, GlobalVerdict::Valid);
        assert!(outcome.witness.is_some());
    }

    #[test]
    fn test_conflicting_postconditions_inconsistent() {
        let outcome = global(
            r#"
questionnaire:
  title: T
  blocks:
    - id: b
      items:
        - { id: q_rating, kind: Question, input: { control: Editbox, min: 0, max: 100 } }
        - id: q_high
          kind: Question
          input: { control: Editbox, min: 0, max: 100 }
          postcondition: [ { predicate: "q_rating.outcome > 50" } ]
        - id: q_low
          kind: Question
          input: { control: Editbox, min: 0, max: 100 }
          postcondition: [ { predicate: "q_rating.outcome < 30" } ]
"#,
        );
        assert_eq!(outcome.verdict, GlobalVerdict::Inconsistent);
        let conflict = outcome.conflict.expect("conflict set");
        assert_eq!(conflict, vec!["q_high".to_string(), "q_low".to_string()]);
    }

    #[test]
    fn test_satisfiable_constraints_valid_with_witness() {
        let outcome = global(
            r#"
questionnaire:
  title: T
  blocks:
    - id: b
      items:
        - { id: q_age, kind: Question, input: { control: Editbox, min: 0, max: 120 } }
        - id: q_exp
          kind: Question
          input: { control: Editbox, min: 0, max: 120 }
          precondition: [ { predicate: "q_age.outcome >= 16" } ]
          postcondition: [ { predicate: "q_exp.outcome <= q_age.outcome - 16" } ]
"#,
        );
        assert_eq!(outcome.verdict, GlobalVerdict::Valid);
        let witness = outcome.witness.expect("witness");
        let age = witness["q_age"].as_int().unwrap();
        let exp = witness["q_exp"].as_int().unwrap();
        // implication must hold in the witness
        assert!(age < 16 || exp <= age - 16);
    }

    #[test]
    fn test_never_items_excluded() {
        // q_b is unreachable and its infeasible postcondition must not
        // poison the global verdict
        let outcome = global(
            r#"
questionnaire:
  title: T
  blocks:
    - id: b
      items:
        - { id: q_a, kind: Question, input: { control: Editbox, min: 0, max: 10 } }
        - id: q_b
          kind: Question
          input: { control: Editbox, min: 0, max: 10 }
          precondition: [ { predicate: "q_a.outcome > 50" } ]
          postcondition: [ { predicate: "q_b.outcome > 100" } ]
"#,
        );
        assert_eq!(outcome.verdict, GlobalVerdict::Valid);
    }

    #[test]
    fn test_reachable_infeasible_forces_inconsistent() {
        // Always reachable + infeasible postcondition ⇒ INCONSISTENT
        let outcome = global(
            r#"
questionnaire:
  title: T
  blocks:
    - id: b
      items:
        - id: q
          kind: Question
          input: { control: Editbox, min: 0, max: 10 }
          postcondition: [ { predicate: "q.outcome > 100" } ]
"#,
        );
        assert_eq!(outcome.verdict, GlobalVerdict::Inconsistent);
        assert_eq!(outcome.conflict, Some(vec!["q".to_string()]));
    }
}
