//! Analysis Report
//!
//! JSON-serializable report and the batch-validator exit codes:
//!
//! | code | meaning |
//! |------|---------|
//! | 0    | all items live, global VALID |
//! | 1    | static errors |
//! | 2    | dependency cycle |
//! | 3    | any NEVER / INFEASIBLE / dead item |
//! | 4    | global INCONSISTENT |
//! | 5    | solver UNDECIDED anywhere |
//!
//! Codes are tested in that order; the first match wins.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::errors::{CanvassError, ItemError, ItemErrorKind};
use crate::features::analysis::{GlobalVerdict, PathVerdict};
use crate::features::smt::infrastructure::{Model, ModelValue};

use super::analyzer::{AnalysisOutcome, AnalysisStats};

/// Full report for one questionnaire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    pub valid: bool,
    pub cycle: Option<Vec<String>>,
    pub items: Vec<ItemReport>,
    pub global: GlobalReport,
    pub summary: AnalysisStats,
    /// Structural error, when the analysis aborted
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Per-item record, in canonical topological order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemReport {
    pub id: String,
    /// `ALWAYS` / `CONDITIONAL` / `NEVER`, or null when not decided
    pub reach: Option<String>,
    /// `TAUTOLOGICAL` / `CONSTRAINING` / `INFEASIBLE` / `NONE` /
    /// `UNDECIDED`, or null when compilation failed
    pub post: Option<String>,
    pub dead: bool,
    pub vacuous: bool,
    pub q_globally_true: bool,
    pub q_globally_false: bool,
    pub witness: Option<BTreeMap<String, serde_json::Value>>,
    pub errors: Vec<ItemError>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlobalReport {
    pub verdict: GlobalVerdict,
    pub conflict: Option<Vec<String>>,
}

impl Report {
    /// Build the report from a completed analysis.
    pub fn from_outcome(outcome: &AnalysisOutcome) -> Report {
        let path_by_id: BTreeMap<&str, &PathVerdict> = outcome
            .path_verdicts
            .iter()
            .map(|v| (v.id.as_str(), v))
            .collect();

        let items = outcome
            .classifications
            .iter()
            .map(|c| {
                let path = path_by_id.get(c.id.as_str());
                let undecided = c
                    .errors
                    .iter()
                    .any(|e| e.kind == ItemErrorKind::SolverUndecided);
                let mut errors = c.errors.clone();
                if let Some(path) = path {
                    errors.extend(path.errors.iter().cloned());
                }
                ItemReport {
                    id: c.id.clone(),
                    reach: c.reach.map(|r| r.to_string()),
                    post: match c.post {
                        Some(status) => Some(status.to_string()),
                        None if undecided => Some("UNDECIDED".to_string()),
                        None => None,
                    },
                    dead: path.map(|p| p.dead).unwrap_or(false),
                    vacuous: c.vacuous,
                    q_globally_true: c.q_globally_true,
                    q_globally_false: c.q_globally_false,
                    witness: c.witness.as_ref().map(witness_json),
                    errors,
                }
            })
            .collect();

        Report {
            valid: outcome.global.verdict == GlobalVerdict::Valid,
            cycle: None,
            items,
            global: GlobalReport {
                verdict: outcome.global.verdict,
                conflict: outcome.global.conflict.clone(),
            },
            summary: outcome.stats.clone(),
            error: None,
        }
    }

    /// Build the report for a structurally failed analysis.
    pub fn from_structural(error: &CanvassError) -> Report {
        let cycle = match error {
            CanvassError::CycleDetected(path) => Some(path.clone()),
            _ => None,
        };
        Report {
            valid: false,
            cycle,
            items: Vec::new(),
            global: GlobalReport {
                verdict: GlobalVerdict::Undecided,
                conflict: None,
            },
            summary: AnalysisStats::default(),
            error: Some(error.to_string()),
        }
    }

    /// Batch-validator exit code, first matching rule wins.
    pub fn exit_code(&self) -> i32 {
        let static_item_error = self.items.iter().any(|item| {
            item.errors.iter().any(|e| {
                matches!(
                    e.kind,
                    ItemErrorKind::ParseError
                        | ItemErrorKind::UnknownFunction
                        | ItemErrorKind::TypeMismatch
                )
            })
        });
        if static_item_error || (self.error.is_some() && self.cycle.is_none()) {
            return 1;
        }
        if self.cycle.is_some() {
            return 2;
        }
        let problem_item = self.items.iter().any(|item| {
            item.dead
                || item.reach.as_deref() == Some("NEVER")
                || (item.post.as_deref() == Some("INFEASIBLE") && !item.vacuous)
        });
        if problem_item {
            return 3;
        }
        if self.global.verdict == GlobalVerdict::Inconsistent {
            return 4;
        }
        let undecided = self.global.verdict == GlobalVerdict::Undecided
            || self.items.iter().any(|item| {
                item.errors
                    .iter()
                    .any(|e| e.kind == ItemErrorKind::SolverUndecided)
            });
        if undecided {
            return 5;
        }
        0
    }
}

fn witness_json(model: &Model) -> BTreeMap<String, serde_json::Value> {
    model
        .iter()
        .map(|(var, value)| {
            let json = match value {
                ModelValue::Int(v) => serde_json::Value::from(*v),
                ModelValue::Bool(v) => serde_json::Value::from(*v),
            };
            (var.clone(), json)
        })
        .collect()
}
