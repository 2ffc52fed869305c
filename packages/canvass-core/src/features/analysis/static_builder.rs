//! Static Builder
//!
//! Single left-to-right pass over the questionnaire that produces
//! everything the three validation levels consume:
//!
//! - outcome variable declarations and the frozen base constraint
//!   `B★ = ⋀ ⟦D_i⟧` (rejecting unsatisfiable domains),
//! - compiled `⟦P_i⟧` / `⟦Q_i⟧` per item,
//! - SSA versions for every write (codeInit first, then each item's code
//!   fragment in file order), with defining constraints guarded by the
//!   writing item's own precondition,
//! - the dependency edge set `{j → i : i references S_j}`.
//!
//! `P_i` and `Q_i` read the versions live before item `i`'s own fragment
//! runs; downstream items read the post-fragment versions.

use std::collections::BTreeSet;

use rustc_hash::FxHashMap;
use tracing::debug;

use crate::config::AnalysisConfig;
use crate::errors::{CanvassError, ItemError, ItemErrorKind, Result};
use crate::features::expr::domain::{AssignTarget, Spanned, Stmt};
use crate::features::expr::infrastructure::lowering::{
    Lowerer, Value, VarSort, VersionMap,
};
use crate::features::expr::infrastructure::{parse_fragment, parse_predicate, CompileIssue};
use crate::features::expr::SymbolTable;
use crate::features::questionnaire::domain::{AnswerDomain, Condition, Questionnaire};
use crate::features::smt::domain::{Atom, Formula, LinExpr};
use crate::features::smt::infrastructure::SolverContext;

/// Compiled constraints for one item.
#[derive(Debug, Clone)]
pub struct ItemConstraints {
    pub id: String,
    pub origin_index: usize,
    pub has_outcome: bool,
    /// `⟦P_i⟧`; `None` when compilation failed
    pub pre: Option<Formula>,
    /// `⟦Q_i⟧`; `None` when compilation failed
    pub post: Option<Formula>,
    /// Whether the item declared any postcondition at all
    pub has_post: bool,
    /// Items this item depends on (self excluded): the edge set sources
    pub deps: BTreeSet<String>,
    /// Outcome variables a witness should be restricted to
    pub witness_vars: BTreeSet<String>,
    pub errors: Vec<ItemError>,
}

impl ItemConstraints {
    /// True when every predicate of the item compiled.
    pub fn compiled(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Frozen output of the static builder, shared by all validation levels.
#[derive(Debug, Clone)]
pub struct StaticModel {
    /// Item records in file order
    pub items: Vec<ItemConstraints>,
    /// Domain constraints: `B★`
    pub base: Vec<Formula>,
    /// Global defining constraints (SSA writes, div/mod decompositions)
    pub defs: Vec<Formula>,
    index: FxHashMap<String, usize>,
}

impl StaticModel {
    /// Run the full builder pass.
    pub fn build(questionnaire: &Questionnaire, config: &AnalysisConfig) -> Result<StaticModel> {
        Builder::new(questionnaire, config).run()
    }

    pub fn item(&self, id: &str) -> Option<&ItemConstraints> {
        self.index.get(id).map(|&i| &self.items[i])
    }

    /// Load `B★` and the defining constraints into a solver context.
    pub fn assert_base(&self, ctx: &mut SolverContext) {
        for formula in self.base.iter().chain(self.defs.iter()) {
            ctx.assert_formula(formula.clone());
        }
    }

    /// Dependency edges `j → i`.
    pub fn edges(&self) -> Vec<(String, String)> {
        let mut edges = Vec::new();
        for item in &self.items {
            for dep in &item.deps {
                edges.push((dep.clone(), item.id.clone()));
            }
        }
        edges
    }
}

struct Builder<'a> {
    questionnaire: &'a Questionnaire,
    config: &'a AnalysisConfig,
    symbols: SymbolTable,
    versions: VersionMap,
    base: Vec<Formula>,
    defs: Vec<Formula>,
    free_items: BTreeSet<String>,
}

impl<'a> Builder<'a> {
    fn new(questionnaire: &'a Questionnaire, config: &'a AnalysisConfig) -> Self {
        Self {
            questionnaire,
            config,
            symbols: SymbolTable::new(),
            versions: VersionMap::new(),
            base: Vec::new(),
            defs: Vec::new(),
            free_items: BTreeSet::new(),
        }
    }

    fn run(mut self) -> Result<StaticModel> {
        self.declare_items()?;

        if let Some(code) = &self.questionnaire.code_init {
            self.process_init_fragment(code)?;
        }

        let mut records = Vec::with_capacity(self.questionnaire.items.len());
        let mut predicate_refs: Vec<(String, BTreeSet<String>)> = Vec::new();

        for item in &self.questionnaire.items {
            let mut errors = Vec::new();
            let mut pre_deps = BTreeSet::new();
            let mut post_deps = BTreeSet::new();
            let mut code_deps = BTreeSet::new();

            let pre = self.compile_conditions(
                &item.id,
                &item.preconditions,
                'p',
                &mut pre_deps,
                &mut errors,
            )?;
            // An item gating itself is a self-edge
            if pre_deps.contains(&item.id) {
                return Err(CanvassError::CycleDetected(vec![
                    item.id.clone(),
                    item.id.clone(),
                ]));
            }

            let post = self.compile_conditions(
                &item.id,
                &item.postconditions,
                'q',
                &mut post_deps,
                &mut errors,
            )?;

            if let Some(code) = &item.code_block {
                // With an uncompilable precondition the write guard is
                // unknown; versions still advance but the written values
                // stay unconstrained.
                let emit_defs = pre.is_some();
                let cond = pre.clone().filter(|f| !f.is_true());
                self.process_item_fragment(
                    &item.id,
                    cond.as_ref(),
                    code,
                    emit_defs,
                    &mut code_deps,
                    &mut errors,
                )?;
                if code_deps.contains(&item.id) {
                    return Err(CanvassError::CycleDetected(vec![
                        item.id.clone(),
                        item.id.clone(),
                    ]));
                }
            }

            predicate_refs.push((
                item.id.clone(),
                pre_deps.union(&post_deps).cloned().collect(),
            ));

            let mut deps: BTreeSet<String> = BTreeSet::new();
            deps.extend(pre_deps);
            deps.extend(post_deps);
            deps.extend(code_deps);
            deps.remove(&item.id); // postcondition self-references are not edges

            let mut witness_vars = deps.clone();
            if item.kind.has_outcome() {
                witness_vars.insert(item.id.clone());
            }

            debug!(
                item = %item.id,
                deps = deps.len(),
                errors = errors.len(),
                "item constraints built"
            );

            records.push(ItemConstraints {
                id: item.id.clone(),
                origin_index: item.origin_index,
                has_outcome: item.kind.has_outcome(),
                pre,
                post,
                has_post: !item.postconditions.is_empty(),
                deps,
                witness_vars,
                errors,
            });
        }

        // Free domains are only legal while nothing references them
        for (item_id, refs) in &predicate_refs {
            for referenced in refs {
                if self.free_items.contains(referenced) {
                    return Err(CanvassError::Schema(format!(
                        "item `{}` references `{}`, which has an unconstrained (free) domain",
                        item_id, referenced
                    )));
                }
            }
        }

        let index = records
            .iter()
            .enumerate()
            .map(|(i, r)| (r.id.clone(), i))
            .collect();

        Ok(StaticModel {
            items: records,
            base: self.base,
            defs: self.defs,
            index,
        })
    }

    fn declare_items(&mut self) -> Result<()> {
        for item in &self.questionnaire.items {
            self.symbols.declare(&item.id, item.kind.has_outcome());
        }
        for item in &self.questionnaire.items {
            let domain = match &item.domain {
                Some(domain) => domain,
                None => continue,
            };
            self.versions.declare_outcome(&item.id);
            let constraint = domain.constraint(&item.id);

            let mut ctx =
                SolverContext::new(self.config.solver.clone(), self.config.cancel.clone());
            ctx.assert_formula(constraint.clone());
            if ctx.check().is_unsat() {
                return Err(CanvassError::EmptyDomain(item.id.clone()));
            }

            if matches!(domain, AnswerDomain::Free) {
                self.free_items.insert(item.id.clone());
            }
            if !constraint.is_true() {
                self.base.push(constraint);
            }
        }
        Ok(())
    }

    /// Conjoin and lower a condition list. `Ok(None)` when a per-item error
    /// was recorded; structural issues abort.
    fn compile_conditions(
        &mut self,
        item_id: &str,
        conditions: &[Condition],
        kind: char,
        deps: &mut BTreeSet<String>,
        errors: &mut Vec<ItemError>,
    ) -> Result<Option<Formula>> {
        let mut parts = Vec::with_capacity(conditions.len());
        let mut failed = false;

        for (idx, condition) in conditions.iter().enumerate() {
            let prefix = format!("{}.{}{}", item_id, kind, idx);
            let outcome = parse_predicate(&condition.predicate).and_then(|ast| {
                Lowerer::new(&self.symbols, &self.versions, &prefix).lower_predicate(&ast)
            });
            match outcome {
                Ok(lowered) => {
                    deps.extend(lowered.deps);
                    self.defs.extend(lowered.defs);
                    parts.push(lowered.formula);
                }
                Err(issue) => {
                    self.per_item_issue(item_id, issue, errors)?;
                    failed = true;
                }
            }
        }

        if failed {
            Ok(None)
        } else {
            Ok(Some(Formula::and(parts)))
        }
    }

    fn process_init_fragment(&mut self, code: &str) -> Result<()> {
        let mut deps = BTreeSet::new();
        let mut errors = Vec::new();
        self.process_fragment("init", None, code, true, &mut deps, &mut errors)?;
        // codeInit belongs to no item; its compilation problems are
        // structural
        if let Some(error) = errors.first() {
            return Err(CanvassError::Schema(format!("codeInit: {}", error)));
        }
        Ok(())
    }

    fn process_item_fragment(
        &mut self,
        item_id: &str,
        cond: Option<&Formula>,
        code: &str,
        emit_defs: bool,
        deps: &mut BTreeSet<String>,
        errors: &mut Vec<ItemError>,
    ) -> Result<()> {
        self.process_fragment(item_id, cond, code, emit_defs, deps, errors)
    }

    fn process_fragment(
        &mut self,
        owner: &str,
        cond: Option<&Formula>,
        code: &str,
        emit_defs: bool,
        deps: &mut BTreeSet<String>,
        errors: &mut Vec<ItemError>,
    ) -> Result<()> {
        let stmts = match parse_fragment(code) {
            Ok(stmts) => stmts,
            Err(issue) => return self.per_item_issue(owner, issue, errors),
        };

        let prefix = format!("{}.c", owner);
        let mut aux_counter = 0;

        for stmt in &stmts {
            let mut lowerer = Lowerer::new(&self.symbols, &self.versions, &prefix);
            lowerer.aux_counter = aux_counter;

            let outcome = match stmt {
                Stmt::Expr(expr) => lowerer.lower_expr(expr).map(|_| None),
                Stmt::Assign { target, op, value } => {
                    lower_assignment(&mut lowerer, &self.symbols, target, *op, value)
                }
            };

            aux_counter = lowerer.aux_counter;
            deps.extend(std::mem::take(&mut lowerer.deps));
            self.defs.append(&mut lowerer.defs);
            let guards = std::mem::take(&mut lowerer.guards);
            drop(lowerer);

            match outcome {
                Ok(Some(write)) => {
                    let new_name = self.versions.bump(&write.base, write.sort);
                    if !emit_defs {
                        continue;
                    }
                    let eq = match write.value {
                        Value::Int(expr) => {
                            Formula::Atom(Atom::eq(&LinExpr::var(new_name), &expr))
                        }
                        Value::Bool(formula) => {
                            Formula::iff(Formula::BoolVar(new_name), formula)
                        }
                    };
                    let mut antecedent = Vec::new();
                    if let Some(cond) = cond {
                        antecedent.push(cond.clone());
                    }
                    antecedent.extend(guards);
                    let def = if antecedent.is_empty() {
                        eq
                    } else {
                        Formula::implies(Formula::and(antecedent), eq)
                    };
                    self.defs.push(def);
                }
                Ok(None) => {}
                Err(issue) => self.per_item_issue(owner, issue, errors)?,
            }
        }

        Ok(())
    }

    /// Route a compile issue: structural kinds abort, the rest attach to
    /// the item record.
    fn per_item_issue(
        &self,
        item_id: &str,
        issue: CompileIssue,
        errors: &mut Vec<ItemError>,
    ) -> Result<()> {
        match issue {
            CompileIssue::Unsupported { message, offset } => {
                Err(CanvassError::UnsupportedExpression {
                    item: item_id.to_string(),
                    message,
                    offset,
                })
            }
            CompileIssue::Unresolved { name, offset } => Err(CanvassError::UnresolvedIdentifier {
                item: item_id.to_string(),
                name,
                offset,
            }),
            CompileIssue::Parse { message, offset } => {
                errors.push(ItemError::at(ItemErrorKind::ParseError, message, offset));
                Ok(())
            }
            CompileIssue::UnknownFunction { name, offset } => {
                errors.push(ItemError::at(
                    ItemErrorKind::UnknownFunction,
                    format!("unknown function `{}`", name),
                    offset,
                ));
                Ok(())
            }
            CompileIssue::TypeMismatch { message, offset } => {
                errors.push(ItemError::at(ItemErrorKind::TypeMismatch, message, offset));
                Ok(())
            }
        }
    }
}

/// A resolved write: base name, sort, and the value to bind.
struct Write {
    base: String,
    sort: VarSort,
    value: Value,
}

/// Lower one assignment statement's right-hand side against the pre-write
/// version map and resolve its target.
fn lower_assignment(
    lowerer: &mut Lowerer<'_>,
    symbols: &SymbolTable,
    target: &Spanned<AssignTarget>,
    op: Option<crate::features::expr::domain::ArithOp>,
    value: &Spanned<crate::features::expr::domain::Expr>,
) -> std::result::Result<Option<Write>, CompileIssue> {
    let rhs = lowerer.lower_expr(value)?;
    let offset = target.span.start;

    match &target.node {
        AssignTarget::Local(name) => {
            if symbols.is_known(name) {
                return Err(CompileIssue::TypeMismatch {
                    message: format!("assign to `{}.outcome`, not the bare item id", name),
                    offset,
                });
            }
            let combined = match op {
                None => rhs,
                Some(op) => {
                    let current = match lowerer.current_int_version(name) {
                        Some(expr) => expr,
                        None => {
                            return Err(CompileIssue::Unresolved {
                                name: name.clone(),
                                offset,
                            })
                        }
                    };
                    let rhs_int = lowerer.to_int(rhs, value.span.start)?;
                    Value::Int(lowerer.arith_values(op, current, rhs_int, offset)?)
                }
            };
            let sort = match &combined {
                Value::Int(_) => VarSort::Int,
                Value::Bool(_) => VarSort::Bool,
            };
            Ok(Some(Write {
                base: name.clone(),
                sort,
                value: combined,
            }))
        }
        AssignTarget::Outcome(id) => {
            if !symbols.is_known(id) || !symbols.is_question(id) {
                return Err(CompileIssue::Unresolved {
                    name: id.clone(),
                    offset,
                });
            }
            lowerer.deps.insert(id.clone());
            let combined = match op {
                None => Value::Int(lowerer.to_int(rhs, value.span.start)?),
                Some(op) => {
                    let current = lowerer
                        .current_int_version(id)
                        .unwrap_or_else(|| LinExpr::var(id.clone()));
                    let rhs_int = lowerer.to_int(rhs, value.span.start)?;
                    Value::Int(lowerer.arith_values(op, current, rhs_int, offset)?)
                }
            };
            Ok(Some(Write {
                base: id.clone(),
                sort: VarSort::Int,
                value: combined,
            }))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::questionnaire::load_from_str;

    fn build(yaml: &str) -> Result<StaticModel> {
        let questionnaire = load_from_str(yaml)?;
        StaticModel::build(&questionnaire, &AnalysisConfig::default())
    }

    #[test]
    fn test_basic_survey_builds() {
        let model = build(
            r#"
questionnaire:
  title: T
  blocks:
    - id: b
      items:
        - { id: q_age, kind: Question, input: { control: Editbox, min: 0, max: 120 } }
        - { id: c_note, kind: Comment }
"#,
        )
        .unwrap();
        assert_eq!(model.items.len(), 2);
        assert_eq!(model.base.len(), 1);
        assert!(model.items[0].compiled());
        assert_eq!(model.items[0].pre, Some(Formula::True));
        assert_eq!(model.items[0].post, Some(Formula::True));
        assert!(!model.items[0].has_post);
    }

    #[test]
    fn test_dependency_edges() {
        let model = build(
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
          precondition:
            - { predicate: "q_a.outcome > 5" }
"#,
        )
        .unwrap();
        let edges = model.edges();
        assert_eq!(edges, vec![("q_a".to_string(), "q_b".to_string())]);
    }

    #[test]
    fn test_postcondition_self_reference_is_not_an_edge() {
        let model = build(
            r#"
questionnaire:
  title: T
  blocks:
    - id: b
      items:
        - id: q
          kind: Question
          input: { control: Editbox, min: 0, max: 100 }
          postcondition:
            - { predicate: "q.outcome >= 10" }
"#,
        )
        .unwrap();
        assert!(model.edges().is_empty());
        assert!(model.items[0].witness_vars.contains("q"));
    }

    #[test]
    fn test_precondition_self_reference_rejected() {
        let result = build(
            r#"
questionnaire:
  title: T
  blocks:
    - id: b
      items:
        - id: q
          kind: Question
          input: { control: Editbox, min: 0, max: 100 }
          precondition:
            - { predicate: "q.outcome > 5" }
"#,
        );
        assert!(matches!(
            result,
            Err(CanvassError::CycleDetected(path)) if path == vec!["q".to_string(), "q".to_string()]
        ));
    }

    #[test]
    fn test_empty_domain_rejected() {
        let result = build(
            r#"
questionnaire:
  title: T
  blocks:
    - id: b
      items:
        - { id: q, kind: Question, input: { control: Editbox, min: 10, max: 5 } }
"#,
        );
        assert!(matches!(result, Err(CanvassError::EmptyDomain(id)) if id == "q"));
    }

    #[test]
    fn test_parse_error_is_per_item() {
        let model = build(
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
          precondition:
            - { predicate: "q_a.outcome >" }
"#,
        )
        .unwrap();
        assert!(model.items[0].compiled());
        assert!(!model.items[1].compiled());
        assert_eq!(model.items[1].pre, None);
        assert_eq!(model.items[1].errors[0].kind, ItemErrorKind::ParseError);
    }

    #[test]
    fn test_unknown_function_is_per_item() {
        let model = build(
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
          precondition:
            - { predicate: "undefined_function(q_a.outcome)" }
"#,
        )
        .unwrap();
        assert_eq!(model.items[1].errors[0].kind, ItemErrorKind::UnknownFunction);
    }

    #[test]
    fn test_unresolved_identifier_is_structural() {
        let result = build(
            r#"
questionnaire:
  title: T
  blocks:
    - id: b
      items:
        - id: q
          kind: Question
          input: { control: Editbox, min: 0, max: 10 }
          precondition:
            - { predicate: "q_missing.outcome > 1" }
"#,
        );
        assert!(matches!(
            result,
            Err(CanvassError::UnresolvedIdentifier { name, .. }) if name == "q_missing"
        ));
    }

    #[test]
    fn test_code_init_versions_flow_into_predicates() {
        let model = build(
            r#"
questionnaire:
  title: T
  codeInit: |
    threshold = 50000
  blocks:
    - id: b
      items:
        - id: q_income
          kind: Question
          input: { control: Editbox, min: 0, max: 1000000 }
          postcondition:
            - { predicate: "q_income.outcome >= threshold" }
"#,
        )
        .unwrap();
        // one def for the init assignment
        assert_eq!(model.defs.len(), 1);
        assert!(model.items[0].compiled());
    }

    #[test]
    fn test_conditional_write_guarded() {
        let model = build(
            r#"
questionnaire:
  title: T
  codeInit: "bonus = 0"
  blocks:
    - id: b
      items:
        - id: q_a
          kind: Question
          input: { control: Editbox, min: 0, max: 10 }
          precondition:
            - { predicate: "bonus == 0" }
          codeBlock: "bonus = 1"
"#,
        )
        .unwrap();
        // init def unconditional, item def guarded
        assert_eq!(model.defs.len(), 2);
        assert!(matches!(model.defs[1], Formula::Implies(_, _)));
    }

    #[test]
    fn test_free_domain_referenced_rejected() {
        let result = build(
            r#"
questionnaire:
  title: T
  blocks:
    - id: b
      items:
        - { id: q_free, kind: Question }
        - id: q_b
          kind: Question
          input: { control: Editbox, min: 0, max: 10 }
          precondition:
            - { predicate: "q_free.outcome > 5" }
"#,
        );
        assert!(matches!(result, Err(CanvassError::Schema(_))));
    }

    #[test]
    fn test_loop_in_fragment_rejected() {
        let result = build(
            r#"
questionnaire:
  title: T
  blocks:
    - id: b
      items:
        - id: q
          kind: Question
          input: { control: Editbox, min: 0, max: 10 }
          codeBlock: "while x > 0\n  x = 1"
"#,
        );
        assert!(matches!(
            result,
            Err(CanvassError::UnsupportedExpression { .. })
        ));
    }

    #[test]
    fn test_write_to_other_outcome_is_edge() {
        let model = build(
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
          codeBlock: "q_a.outcome = 5"
"#,
        )
        .unwrap();
        assert_eq!(
            model.edges(),
            vec![("q_a".to_string(), "q_b".to_string())]
        );
        // the write bumped q_a's version
        assert_eq!(model.defs.len(), 1);
    }
}
