//! Analysis Pipeline
//!
//! End-to-end orchestration: load → build → topology → Level 1 → Level 2 →
//! Level 3 → report. Verdicts are produced in canonical topological order;
//! the cancellation flag is polled between items and aborts with whatever
//! verdicts exist so far.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::AnalysisConfig;
use crate::errors::Result;
use crate::features::analysis::{
    check_global, GlobalOutcome, GlobalVerdict, ItemClassification, ItemClassifier, PathValidator,
    PathVerdict, PostStatus, Reachability, StaticModel, Topology,
};
use crate::features::questionnaire::{self, Questionnaire};

/// Aggregate counters for one analysis run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisStats {
    pub items: usize,
    pub questions: usize,
    pub always: usize,
    pub conditional: usize,
    pub never: usize,
    pub tautological: usize,
    pub constraining: usize,
    pub infeasible: usize,
    pub dead: usize,
    pub item_errors: usize,
}

/// Everything one analysis run produces. The flow engine consumes `order`
/// and `classifications`; the report module serializes the rest.
#[derive(Debug, Clone)]
pub struct AnalysisOutcome {
    pub questionnaire: Questionnaire,
    /// Canonical topological order
    pub order: Vec<String>,
    /// Level-1 verdicts, in canonical order
    pub classifications: Vec<ItemClassification>,
    /// Level-3 verdicts, in canonical order
    pub path_verdicts: Vec<PathVerdict>,
    /// Level-2 verdict
    pub global: GlobalOutcome,
    /// True when cancellation cut the run short
    pub cancelled: bool,
    pub stats: AnalysisStats,
}

/// Analyzer facade owning the configuration for a run.
#[derive(Debug, Clone, Default)]
pub struct Analyzer {
    config: AnalysisConfig,
}

impl Analyzer {
    pub fn new(config: AnalysisConfig) -> Self {
        Self { config }
    }

    /// Analyze YAML text.
    pub fn analyze_str(&self, source: &str) -> Result<AnalysisOutcome> {
        let questionnaire = questionnaire::load_from_str(source)?;
        self.analyze(questionnaire)
    }

    /// Analyze a file.
    pub fn analyze_path(&self, path: &Path) -> Result<AnalysisOutcome> {
        let questionnaire = questionnaire::load_from_path(path)?;
        self.analyze(questionnaire)
    }

    /// Run the full pipeline over a loaded questionnaire.
    pub fn analyze(&self, questionnaire: Questionnaire) -> Result<AnalysisOutcome> {
        let model = StaticModel::build(&questionnaire, &self.config)?;
        let topology = Topology::build(&model, &self.config)?;
        let order: Vec<String> = topology.order().to_vec();

        // Level 1, in canonical order
        let mut classifier = ItemClassifier::new(&model, &self.config);
        let mut classifications = Vec::with_capacity(order.len());
        let mut cancelled = false;
        for id in &order {
            if self.config.cancel.is_cancelled() {
                warn!(done = classifications.len(), "analysis cancelled during level 1");
                cancelled = true;
                break;
            }
            classifications.push(classifier.classify_item(id));
        }

        // Level 2
        let global = if cancelled {
            GlobalOutcome {
                verdict: GlobalVerdict::Undecided,
                witness: None,
                conflict: None,
            }
        } else {
            check_global(&model, &classifications, &self.config)
        };

        // Level 3, in canonical order
        let mut validator = PathValidator::new(&model, &topology, &self.config);
        let mut path_verdicts = Vec::with_capacity(order.len());
        if !cancelled {
            for classification in &classifications {
                if self.config.cancel.is_cancelled() {
                    warn!(done = path_verdicts.len(), "analysis cancelled during level 3");
                    cancelled = true;
                    break;
                }
                path_verdicts
                    .push(validator.validate_item(&classification.id, classification.reach));
            }
        }

        let stats = compute_stats(&questionnaire, &classifications, &path_verdicts);
        info!(
            items = stats.items,
            dead = stats.dead,
            global = %global.verdict,
            cancelled,
            "analysis finished"
        );

        Ok(AnalysisOutcome {
            questionnaire,
            order,
            classifications,
            path_verdicts,
            global,
            cancelled,
            stats,
        })
    }
}

fn compute_stats(
    questionnaire: &Questionnaire,
    classifications: &[ItemClassification],
    path_verdicts: &[PathVerdict],
) -> AnalysisStats {
    let mut stats = AnalysisStats {
        items: questionnaire.items.len(),
        questions: questionnaire.question_count(),
        ..AnalysisStats::default()
    };
    for c in classifications {
        match c.reach {
            Some(Reachability::Always) => stats.always += 1,
            Some(Reachability::Conditional) => stats.conditional += 1,
            Some(Reachability::Never) => stats.never += 1,
            None => {}
        }
        match c.post {
            Some(PostStatus::Tautological) => stats.tautological += 1,
            Some(PostStatus::Constraining) => stats.constraining += 1,
            Some(PostStatus::Infeasible) => stats.infeasible += 1,
            _ => {}
        }
        if !c.errors.is_empty() {
            stats.item_errors += 1;
        }
    }
    stats.dead = path_verdicts.iter().filter(|v| v.dead).count();
    stats
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_pipeline_linear_survey() {
        let outcome = Analyzer::default()
            .analyze_str(
                r#"
questionnaire:
  title: T
  blocks:
    - id: b
      items:
        - { id: q_age, kind: Question, input: { control: Editbox, min: 0, max: 120 } }
        - id: q_gender
          kind: Question
          input:
            control: RadioButton
            options: [ { value: 1, label: a }, { value: 2, label: b } ]
        - { id: c_thanks, kind: Comment }
"#,
            )
            .unwrap();
        assert_eq!(outcome.order.len(), 3);
        assert_eq!(outcome.stats.always, 3);
        assert_eq!(outcome.stats.dead, 0);
        assert_eq!(outcome.global.verdict, GlobalVerdict::Valid);
        assert!(!outcome.cancelled);
    }

    #[test]
    fn test_cancellation_returns_structural_state() {
        let config = AnalysisConfig::default();
        config.cancel.cancel();
        let outcome = Analyzer::new(config)
            .analyze_str(
                r#"
questionnaire:
  title: T
  blocks:
    - id: b
      items:
        - { id: q, kind: Question, input: { control: Editbox, min: 0, max: 9 } }
"#,
            )
            .unwrap();
        assert!(outcome.cancelled);
        assert!(outcome.classifications.is_empty());
        assert_eq!(outcome.global.verdict, GlobalVerdict::Undecided);
    }

    #[test]
    fn test_verdicts_in_canonical_order() {
        let outcome = Analyzer::default()
            .analyze_str(
                r#"
questionnaire:
  title: T
  blocks:
    - id: b
      items:
        - id: q_late
          kind: Question
          input: { control: Editbox, min: 0, max: 9 }
          precondition: [ { predicate: "q_early.outcome > 1" } ]
        - { id: q_early, kind: Question, input: { control: Editbox, min: 0, max: 9 } }
"#,
            )
            .unwrap();
        assert_eq!(outcome.order, vec!["q_early".to_string(), "q_late".to_string()]);
        assert_eq!(outcome.classifications[0].id, "q_early");
        assert_eq!(outcome.path_verdicts[1].id, "q_late");
    }
}
