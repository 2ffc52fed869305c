//! Predicate Lowering
//!
//! Turns parsed expressions into solver [`Formula`]s:
//!
//! - identifiers resolve through the symbol table and the SSA version map
//! - `qid.outcome` reads record a dependency on `qid`
//! - `is [not] None` lowers to the item's visited boolean
//! - `//` and `%` by a literal lower exactly via auxiliary quotient and
//!   remainder variables (floor semantics); their defining constraints are
//!   global so they never fall under a query's negation
//! - division by a non-literal yields a fresh unconstrained result plus the
//!   guard `divisor ≠ 0` conjoined into the enclosing predicate
//!
//! Typing: comparisons yield booleans; integers coerce to boolean as
//! `e ≠ 0`; booleans in arithmetic are a type mismatch.

use std::collections::BTreeSet;

use rustc_hash::{FxHashMap, FxHashSet};

use crate::features::expr::domain::{
    ArithOp, BoolOp, CmpOp, Expr, Spanned, UnaryOp,
};
use crate::features::smt::domain::{Atom, Formula, LinExpr};

use super::CompileIssue;

/// Variable sort tracked for locals (outcomes are always integers).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarSort {
    Int,
    Bool,
}

/// Item ids known to the analysis, split by whether they carry an outcome.
#[derive(Debug, Default, Clone)]
pub struct SymbolTable {
    known: FxHashSet<String>,
    questions: FxHashSet<String>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn declare(&mut self, id: &str, has_outcome: bool) {
        self.known.insert(id.to_string());
        if has_outcome {
            self.questions.insert(id.to_string());
        }
    }

    pub fn is_known(&self, id: &str) -> bool {
        self.known.contains(id)
    }

    pub fn is_question(&self, id: &str) -> bool {
        self.questions.contains(id)
    }
}

/// SSA version state: base name → current version and sort.
///
/// Version 0 of an outcome is its declaration and keeps the bare item id as
/// its solver name; later versions and all locals are suffixed `@v`.
#[derive(Debug, Default, Clone)]
pub struct VersionMap {
    versions: FxHashMap<String, u32>,
    sorts: FxHashMap<String, VarSort>,
}

impl VersionMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self, base: &str) -> Option<u32> {
        self.versions.get(base).copied()
    }

    pub fn sort(&self, base: &str) -> Option<VarSort> {
        self.sorts.get(base).copied()
    }

    /// Declare an outcome variable at version 0.
    pub fn declare_outcome(&mut self, id: &str) {
        self.versions.insert(id.to_string(), 0);
        self.sorts.insert(id.to_string(), VarSort::Int);
    }

    /// Record a write, returning the new version's solver name.
    pub fn bump(&mut self, base: &str, sort: VarSort) -> String {
        let next = match self.versions.get(base) {
            Some(v) => v + 1,
            None => 0,
        };
        self.versions.insert(base.to_string(), next);
        self.sorts.insert(base.to_string(), sort);
        versioned_name(base, next)
    }

    /// Solver name of the current version of `base`.
    pub fn current_name(&self, base: &str) -> Option<String> {
        self.current(base).map(|v| versioned_name(base, v))
    }
}

/// Solver variable name for `base` at `version`.
pub fn versioned_name(base: &str, version: u32) -> String {
    if version == 0 {
        base.to_string()
    } else {
        format!("{}@{}", base, version)
    }
}

/// Visited-boolean solver name for item `id`.
pub fn visited_var(id: &str) -> String {
    format!("visited.{}", id)
}

/// Result of lowering one predicate.
#[derive(Debug, Clone)]
pub struct LoweredPredicate {
    /// The predicate itself, guards conjoined
    pub formula: Formula,
    /// Item ids whose outcome (or visitedness) the predicate reads
    pub deps: BTreeSet<String>,
    /// Global defining constraints for auxiliary variables
    pub defs: Vec<Formula>,
}

/// Lowered value of an expression: integer term or boolean formula.
#[derive(Debug, Clone)]
pub enum Value {
    Int(LinExpr),
    Bool(Formula),
}

/// Lowering context for one predicate or one fragment statement.
pub struct Lowerer<'a> {
    symbols: &'a SymbolTable,
    versions: &'a VersionMap,
    /// Unique prefix for auxiliary variables (item id + predicate index)
    aux_prefix: String,
    /// Carried across statements of one fragment for unique aux names
    pub aux_counter: u32,
    pub deps: BTreeSet<String>,
    pub defs: Vec<Formula>,
    pub guards: Vec<Formula>,
}

impl<'a> Lowerer<'a> {
    pub fn new(symbols: &'a SymbolTable, versions: &'a VersionMap, aux_prefix: &str) -> Self {
        Self {
            symbols,
            versions,
            aux_prefix: aux_prefix.to_string(),
            aux_counter: 0,
            deps: BTreeSet::new(),
            defs: Vec::new(),
            guards: Vec::new(),
        }
    }

    /// Lower a full predicate to a boolean formula with guards conjoined.
    pub fn lower_predicate(mut self, expr: &Spanned<Expr>) -> Result<LoweredPredicate, CompileIssue> {
        let value = self.lower_expr(expr)?;
        let main = self.to_bool(value);
        let mut parts = std::mem::take(&mut self.guards);
        parts.push(main);
        Ok(LoweredPredicate {
            formula: Formula::and(parts),
            deps: self.deps,
            defs: self.defs,
        })
    }

    /// Lower an expression to a typed value.
    pub fn lower_expr(&mut self, expr: &Spanned<Expr>) -> Result<Value, CompileIssue> {
        let offset = expr.span.start;
        match &expr.node {
            Expr::Int(value) => Ok(Value::Int(LinExpr::constant(*value))),
            Expr::Bool(value) => Ok(Value::Bool(if *value {
                Formula::True
            } else {
                Formula::False
            })),
            Expr::NoneLit => Err(CompileIssue::TypeMismatch {
                message: "`None` is only comparable with `is` / `is not`".to_string(),
                offset,
            }),
            Expr::Local(name) => self.lower_local(name, offset),
            Expr::Outcome(id) => self.lower_outcome(id, offset).map(Value::Int),
            Expr::Unary { op, operand } => match op {
                UnaryOp::Not => {
                    let inner = self.lower_expr(operand)?;
                    let formula = self.to_bool(inner);
                    Ok(Value::Bool(Formula::not(formula)))
                }
                UnaryOp::Neg => {
                    let inner = self.lower_expr(operand)?;
                    let term = self.to_int(inner, operand.span.start)?;
                    Ok(Value::Int(term.neg()))
                }
            },
            Expr::Arith { op, lhs, rhs } => self.lower_arith(*op, lhs, rhs, offset),
            Expr::Cmp { op, lhs, rhs } => self.lower_cmp(*op, lhs, rhs),
            Expr::BoolChain { op, operands } => {
                let mut formulas = Vec::with_capacity(operands.len());
                for operand in operands {
                    let value = self.lower_expr(operand)?;
                    formulas.push(self.to_bool(value));
                }
                Ok(Value::Bool(match op {
                    BoolOp::And => Formula::and(formulas),
                    BoolOp::Or => Formula::or(formulas),
                }))
            }
            Expr::IsNone { operand, negated } => {
                let id = match &operand.node {
                    Expr::Outcome(id) => id,
                    _ => {
                        return Err(CompileIssue::TypeMismatch {
                            message: "`is None` applies only to `qid.outcome`".to_string(),
                            offset: operand.span.start,
                        })
                    }
                };
                if !self.symbols.is_known(id) {
                    return Err(CompileIssue::Unresolved {
                        name: id.clone(),
                        offset: operand.span.start,
                    });
                }
                self.deps.insert(id.clone());
                let visited = Formula::BoolVar(visited_var(id));
                Ok(Value::Bool(if *negated {
                    visited
                } else {
                    Formula::not(visited)
                }))
            }
            Expr::Call { name, .. } => Err(CompileIssue::UnknownFunction {
                name: name.clone(),
                offset,
            }),
        }
    }

    fn lower_local(&mut self, name: &str, offset: usize) -> Result<Value, CompileIssue> {
        // A bare item id is not a value; outcomes are read via `.outcome`
        if self.symbols.is_known(name) {
            return Err(CompileIssue::TypeMismatch {
                message: format!("item `{}` must be read as `{}.outcome`", name, name),
                offset,
            });
        }
        match (self.versions.current_name(name), self.versions.sort(name)) {
            (Some(var), Some(VarSort::Int)) => Ok(Value::Int(LinExpr::var(var))),
            (Some(var), Some(VarSort::Bool)) => Ok(Value::Bool(Formula::BoolVar(var))),
            _ => Err(CompileIssue::Unresolved {
                name: name.to_string(),
                offset,
            }),
        }
    }

    fn lower_outcome(&mut self, id: &str, offset: usize) -> Result<LinExpr, CompileIssue> {
        if !self.symbols.is_known(id) {
            return Err(CompileIssue::Unresolved {
                name: id.to_string(),
                offset,
            });
        }
        if !self.symbols.is_question(id) {
            return Err(CompileIssue::Unresolved {
                name: format!("{} (item has no outcome)", id),
                offset,
            });
        }
        self.deps.insert(id.to_string());
        let version = self.versions.current(id).unwrap_or(0);
        Ok(LinExpr::var(versioned_name(id, version)))
    }

    fn lower_arith(
        &mut self,
        op: ArithOp,
        lhs: &Spanned<Expr>,
        rhs: &Spanned<Expr>,
        offset: usize,
    ) -> Result<Value, CompileIssue> {
        let left_value = self.lower_expr(lhs)?;
        let left = self.to_int(left_value, lhs.span.start)?;
        let right_value = self.lower_expr(rhs)?;
        let right = self.to_int(right_value, rhs.span.start)?;
        self.arith_values(op, left, right, offset).map(Value::Int)
    }

    /// Arithmetic over already-lowered integer terms (also used for
    /// augmented assignments in code fragments).
    pub fn arith_values(
        &mut self,
        op: ArithOp,
        left: LinExpr,
        right: LinExpr,
        offset: usize,
    ) -> Result<LinExpr, CompileIssue> {
        match op {
            ArithOp::Add => Ok(left.add(&right)),
            ArithOp::Sub => Ok(left.sub(&right)),
            ArithOp::Mul => {
                // Linear arithmetic only: one factor must be a literal
                if left.is_constant() {
                    Ok(right.scale(left.constant))
                } else if right.is_constant() {
                    Ok(left.scale(right.constant))
                } else {
                    Err(CompileIssue::Unsupported {
                        message: "non-linear multiplication (neither factor is a literal)"
                            .to_string(),
                        offset,
                    })
                }
            }
            ArithOp::FloorDiv | ArithOp::Mod => {
                match self.lower_div_mod(op, left, right, offset)? {
                    Value::Int(expr) => Ok(expr),
                    Value::Bool(_) => unreachable!("div/mod lowers to an integer"),
                }
            }
        }
    }

    fn lower_div_mod(
        &mut self,
        op: ArithOp,
        dividend: LinExpr,
        divisor: LinExpr,
        offset: usize,
    ) -> Result<Value, CompileIssue> {
        if divisor.is_constant() {
            let k = divisor.constant;
            if k == 0 {
                return Err(CompileIssue::Parse {
                    message: "division or modulo by literal zero".to_string(),
                    offset,
                });
            }
            // dividend = k*q + r with floor semantics:
            //   k > 0  →  0 ≤ r ≤ k−1
            //   k < 0  →  k+1 ≤ r ≤ 0
            let quotient = LinExpr::var(self.fresh_aux("q"));
            let remainder = LinExpr::var(self.fresh_aux("r"));
            let recomposed = quotient.scale(k).add(&remainder);
            self.defs.push(Formula::Atom(Atom::eq(&dividend, &recomposed)));
            if k > 0 {
                self.defs
                    .push(Formula::Atom(Atom::ge(&remainder, &LinExpr::constant(0))));
                self.defs
                    .push(Formula::Atom(Atom::le(&remainder, &LinExpr::constant(k - 1))));
            } else {
                self.defs
                    .push(Formula::Atom(Atom::ge(&remainder, &LinExpr::constant(k + 1))));
                self.defs
                    .push(Formula::Atom(Atom::le(&remainder, &LinExpr::constant(0))));
            }
            Ok(Value::Int(match op {
                ArithOp::FloorDiv => quotient,
                _ => remainder,
            }))
        } else {
            // Non-literal divisor: guard divisor ≠ 0 and over-approximate
            // the result with a fresh unconstrained integer
            self.guards
                .push(Formula::Atom(Atom::ne(&divisor, &LinExpr::constant(0))));
            let result = LinExpr::var(self.fresh_aux(match op {
                ArithOp::FloorDiv => "q",
                _ => "r",
            }));
            Ok(Value::Int(result))
        }
    }

    fn fresh_aux(&mut self, kind: &str) -> String {
        let name = format!("{}.{}{}", self.aux_prefix, kind, self.aux_counter);
        self.aux_counter += 1;
        name
    }

    /// Current SSA version of an integer-sorted base name, as a term.
    pub fn current_int_version(&self, base: &str) -> Option<LinExpr> {
        match (self.versions.current_name(base), self.versions.sort(base)) {
            (Some(var), Some(VarSort::Int)) => Some(LinExpr::var(var)),
            _ => None,
        }
    }

    /// Boolean coercion: integers become `e ≠ 0`.
    pub fn to_bool(&self, value: Value) -> Formula {
        match value {
            Value::Bool(formula) => formula,
            Value::Int(expr) => Formula::Atom(Atom::ne(&expr, &LinExpr::constant(0))),
        }
    }

    /// Integer view of a value; booleans do not coerce.
    pub fn to_int(&self, value: Value, offset: usize) -> Result<LinExpr, CompileIssue> {
        match value {
            Value::Int(expr) => Ok(expr),
            Value::Bool(_) => Err(CompileIssue::TypeMismatch {
                message: "boolean value used in arithmetic".to_string(),
                offset,
            }),
        }
    }

    fn lower_cmp(
        &mut self,
        op: CmpOp,
        lhs: &Spanned<Expr>,
        rhs: &Spanned<Expr>,
    ) -> Result<Value, CompileIssue> {
        let left = self.lower_expr(lhs)?;
        let right = self.lower_expr(rhs)?;

        match (left, right) {
            (Value::Int(l), Value::Int(r)) => {
                let atom = match op {
                    CmpOp::Eq => Atom::eq(&l, &r),
                    CmpOp::Ne => Atom::ne(&l, &r),
                    CmpOp::Lt => Atom::lt(&l, &r),
                    CmpOp::Le => Atom::le(&l, &r),
                    CmpOp::Gt => Atom::gt(&l, &r),
                    CmpOp::Ge => Atom::ge(&l, &r),
                };
                Ok(Value::Bool(Formula::Atom(atom)))
            }
            (Value::Bool(l), Value::Bool(r)) => match op {
                CmpOp::Eq => Ok(Value::Bool(Formula::iff(l, r))),
                CmpOp::Ne => Ok(Value::Bool(Formula::not(Formula::iff(l, r)))),
                _ => Err(CompileIssue::TypeMismatch {
                    message: format!("ordering comparison `{}` on booleans", op),
                    offset: lhs.span.start,
                }),
            },
            _ => Err(CompileIssue::TypeMismatch {
                message: format!("comparison `{}` between integer and boolean", op),
                offset: lhs.span.start,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::expr::infrastructure::parser::parse_predicate;
    use crate::features::smt::domain::Rel;

    fn table() -> SymbolTable {
        let mut symbols = SymbolTable::new();
        symbols.declare("q_age", true);
        symbols.declare("q_exp", true);
        symbols.declare("c_note", false);
        symbols
    }

    fn outcomes() -> VersionMap {
        let mut versions = VersionMap::new();
        versions.declare_outcome("q_age");
        versions.declare_outcome("q_exp");
        versions
    }

    fn lower(src: &str) -> Result<LoweredPredicate, CompileIssue> {
        let symbols = table();
        let versions = outcomes();
        let ast = parse_predicate(src)?;
        Lowerer::new(&symbols, &versions, "t.p0").lower_predicate(&ast)
    }

    #[test]
    fn test_outcome_comparison() {
        let lowered = lower("q_age.outcome >= 16").unwrap();
        assert_eq!(lowered.deps.len(), 1);
        assert!(lowered.deps.contains("q_age"));
        match &lowered.formula {
            Formula::Atom(atom) => assert_eq!(atom.rel, Rel::Le),
            other => panic!("expected atom, got {:?}", other),
        }
    }

    #[test]
    fn test_dependency_collection() {
        let lowered = lower("q_exp.outcome <= q_age.outcome - 16").unwrap();
        assert!(lowered.deps.contains("q_age"));
        assert!(lowered.deps.contains("q_exp"));
    }

    #[test]
    fn test_unknown_item() {
        let err = lower("q_missing.outcome > 1").unwrap_err();
        assert!(matches!(err, CompileIssue::Unresolved { .. }));
    }

    #[test]
    fn test_comment_item_has_no_outcome() {
        let err = lower("c_note.outcome > 1").unwrap_err();
        assert!(matches!(err, CompileIssue::Unresolved { .. }));
    }

    #[test]
    fn test_unknown_local() {
        let err = lower("salary > 100").unwrap_err();
        assert!(matches!(err, CompileIssue::Unresolved { .. }));
    }

    #[test]
    fn test_unknown_function() {
        let err = lower("undefined_function(q_age.outcome)").unwrap_err();
        assert!(matches!(
            err,
            CompileIssue::UnknownFunction { name, .. } if name == "undefined_function"
        ));
    }

    #[test]
    fn test_nonlinear_multiplication_rejected() {
        let err = lower("q_age.outcome * q_exp.outcome > 10").unwrap_err();
        assert!(matches!(err, CompileIssue::Unsupported { .. }));
    }

    #[test]
    fn test_literal_multiplication_ok() {
        let lowered = lower("2 * q_age.outcome > 10").unwrap();
        assert!(lowered.defs.is_empty());
        assert!(matches!(lowered.formula, Formula::Atom(_)));
    }

    #[test]
    fn test_div_by_literal_emits_defs() {
        let lowered = lower("q_age.outcome // 10 == 3").unwrap();
        // quotient/remainder decomposition plus remainder range
        assert_eq!(lowered.defs.len(), 3);
    }

    #[test]
    fn test_div_by_zero_literal() {
        let err = lower("q_age.outcome // 0 == 1").unwrap_err();
        assert!(matches!(err, CompileIssue::Parse { .. }));
    }

    #[test]
    fn test_div_by_variable_guards() {
        let lowered = lower("q_age.outcome // q_exp.outcome == 2").unwrap();
        // guard conjoined into the predicate: And(guard, comparison)
        match &lowered.formula {
            Formula::And(parts) => assert_eq!(parts.len(), 2),
            other => panic!("expected conjunction with guard, got {:?}", other),
        }
    }

    #[test]
    fn test_is_none_visited() {
        let lowered = lower("q_age.outcome is not None").unwrap();
        assert_eq!(lowered.formula, Formula::BoolVar(visited_var("q_age")));
        assert!(lowered.deps.contains("q_age"));

        let lowered = lower("q_age.outcome is None").unwrap();
        assert!(matches!(lowered.formula, Formula::Not(_)));
    }

    #[test]
    fn test_none_outside_is() {
        let err = lower("q_age.outcome == None").unwrap_err();
        assert!(matches!(err, CompileIssue::TypeMismatch { .. }));
    }

    #[test]
    fn test_bool_in_arith_rejected() {
        let err = lower("True + 1 > 0").unwrap_err();
        assert!(matches!(err, CompileIssue::TypeMismatch { .. }));
    }

    #[test]
    fn test_int_coerces_to_bool() {
        let lowered = lower("q_age.outcome and q_exp.outcome > 1").unwrap();
        match &lowered.formula {
            Formula::And(parts) => {
                assert!(matches!(&parts[0], Formula::Atom(a) if a.rel == Rel::Ne));
            }
            other => panic!("expected conjunction, got {:?}", other),
        }
    }

    #[test]
    fn test_bare_item_id_rejected() {
        let err = lower("q_age > 16").unwrap_err();
        assert!(matches!(err, CompileIssue::TypeMismatch { .. }));
    }
}
