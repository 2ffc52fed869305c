//! Search Core
//!
//! Decides satisfiability of a conjunction of [`Formula`]s by DPLL-style
//! case splitting over atoms and boolean variables, with a linear integer
//! arithmetic theory core underneath:
//!
//! 1. **Equality substitution**: equalities with a ±1 coefficient are solved
//!    for that variable and substituted away (SSA definitions all have this
//!    shape), with bindings replayed for model reconstruction.
//! 2. **Divisibility check**: remaining equalities whose coefficient gcd
//!    does not divide the constant are rejected outright.
//! 3. **Interval propagation**: bound tightening to fixpoint over all
//!    constraints.
//! 4. **Branch and bound**: deterministic search over the narrowest
//!    variable until a concrete model verifies, or the space is exhausted.
//!
//! Budget or deadline exhaustion anywhere surfaces as `Unknown`.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use crate::config::{CancelFlag, SolverConfig};
use crate::features::smt::domain::{Atom, Formula, LinExpr, Rel, VarId};

use super::interval::{ceil_div, floor_div, Interval};
use super::{Model, ModelValue, SolverResult};

/// Enumerate values directly when an interval is at most this wide;
/// otherwise bisect.
const ENUM_WIDTH: u128 = 8;

/// Decide a conjunction of formulas.
pub fn solve(assertions: &[Formula], config: &SolverConfig, cancel: &CancelFlag) -> SolverResult {
    let mut search = Search {
        deadline: Instant::now() + Duration::from_millis(config.timeout_ms),
        budget: config.max_decisions,
        max_rounds: config.max_propagation_rounds,
        cancel: cancel.clone(),
    };
    let mut assignment = Assignment::default();
    search.split(assertions, &mut assignment)
}

/// A branching literal: an atom or a free boolean variable.
#[derive(Debug, Clone)]
enum Lit {
    Atom(Atom),
    Bool(VarId),
}

/// Partial truth assignment to literals.
#[derive(Debug, Default)]
struct Assignment {
    atoms: BTreeMap<Atom, bool>,
    bools: BTreeMap<VarId, bool>,
}

/// Theory verdict for a conjunction of assigned atoms.
enum TheoryOutcome {
    Model(BTreeMap<VarId, i64>),
    Infeasible,
    Exhausted,
}

struct Search {
    deadline: Instant,
    budget: u64,
    max_rounds: u32,
    cancel: CancelFlag,
}

impl Search {
    fn out_of_resources(&mut self) -> bool {
        if self.budget == 0 {
            return true;
        }
        self.budget -= 1;
        // Check the clock sparsely; Instant::now is not free
        if self.budget % 256 == 0 && (Instant::now() >= self.deadline || self.cancel.is_cancelled())
        {
            self.budget = 0;
            return true;
        }
        false
    }

    fn split(&mut self, assertions: &[Formula], assignment: &mut Assignment) -> SolverResult {
        if self.out_of_resources() {
            return SolverResult::Unknown;
        }

        let mut undecided = None;
        for formula in assertions {
            match eval(formula, assignment) {
                Some(false) => return SolverResult::Unsat,
                Some(true) => {}
                None => {
                    if undecided.is_none() {
                        undecided = pick(formula, assignment);
                    }
                }
            }
        }

        let lit = match undecided {
            Some(lit) => lit,
            // All assertions true under the partial assignment: the theory
            // has the final word on the assigned atoms.
            None => return self.theory_check(assignment),
        };

        let mut saw_unknown = false;
        for value in [true, false] {
            set_lit(assignment, &lit, value);
            match self.split(assertions, assignment) {
                SolverResult::Sat(model) => {
                    unset_lit(assignment, &lit);
                    return SolverResult::Sat(model);
                }
                SolverResult::Unknown => saw_unknown = true,
                SolverResult::Unsat => {}
            }
            unset_lit(assignment, &lit);
        }

        if saw_unknown {
            SolverResult::Unknown
        } else {
            SolverResult::Unsat
        }
    }

    fn theory_check(&mut self, assignment: &Assignment) -> SolverResult {
        let constraints: Vec<Atom> = assignment
            .atoms
            .iter()
            .map(|(atom, &value)| if value { atom.clone() } else { atom.negate() })
            .collect();

        match self.lia_feasible(&constraints) {
            TheoryOutcome::Model(ints) => {
                let mut model = Model::new();
                for (var, value) in ints {
                    model.insert(var, ModelValue::Int(value));
                }
                for (var, value) in &assignment.bools {
                    model.insert(var.clone(), ModelValue::Bool(*value));
                }
                SolverResult::Sat(model)
            }
            TheoryOutcome::Infeasible => SolverResult::Unsat,
            TheoryOutcome::Exhausted => SolverResult::Unknown,
        }
    }

    /// Integer feasibility of a conjunction of linear atoms.
    fn lia_feasible(&mut self, constraints: &[Atom]) -> TheoryOutcome {
        let mut constraints = constraints.to_vec();
        let mut bindings: Vec<(VarId, LinExpr)> = Vec::new();

        // Phase 1: eliminate unit-coefficient equalities by substitution.
        loop {
            let target = constraints.iter().enumerate().find_map(|(idx, atom)| {
                if atom.rel != Rel::Eq {
                    return None;
                }
                atom.expr
                    .terms
                    .iter()
                    .find(|(_, c)| c.abs() == 1)
                    .map(|(var, c)| (idx, var.clone(), *c))
            });
            let (idx, var, coeff) = match target {
                Some(t) => t,
                None => break,
            };
            let atom = constraints.remove(idx);
            // c*x + rest = 0  →  x = -rest / c  (c = ±1)
            let mut rest = atom.expr.clone();
            rest.terms.remove(&var);
            let solved = if coeff == 1 { rest.neg() } else { rest };
            for other in &mut constraints {
                if let Some(c) = other.expr.terms.remove(&var) {
                    other.expr = other.expr.add(&solved.scale(c));
                }
            }
            bindings.push((var, solved));

            // Substitution can collapse constraints to constants
            let mut contradiction = false;
            constraints.retain(|atom| {
                if !atom.expr.is_constant() {
                    return true;
                }
                let holds = match atom.rel {
                    Rel::Le => atom.expr.constant <= 0,
                    Rel::Eq => atom.expr.constant == 0,
                    Rel::Ne => atom.expr.constant != 0,
                };
                if !holds {
                    contradiction = true;
                }
                false
            });
            if contradiction {
                return TheoryOutcome::Infeasible;
            }
        }

        // Phase 2: divisibility check on remaining equalities.
        for atom in &constraints {
            if atom.rel == Rel::Eq {
                let g = atom.expr.terms.values().fold(0i64, |g, c| gcd(g, c.abs()));
                if g > 0 && atom.expr.constant % g != 0 {
                    return TheoryOutcome::Infeasible;
                }
            }
        }

        // Phase 3: propagate and search.
        let mut intervals: BTreeMap<VarId, Interval> = BTreeMap::new();
        for atom in &constraints {
            for var in atom.expr.variables() {
                intervals.entry(var.clone()).or_insert_with(Interval::full);
            }
        }
        if !self.propagate(&constraints, &mut intervals) {
            return TheoryOutcome::Infeasible;
        }

        match self.search_model(&constraints, &intervals) {
            TheoryOutcome::Model(mut values) => {
                // Replay eliminated variables, most recent first: each
                // binding only references variables bound later or survivors.
                for (var, expr) in bindings.iter().rev() {
                    let mut total: i128 = expr.constant as i128;
                    for (v, c) in &expr.terms {
                        total += (*c as i128) * (*values.get(v).unwrap_or(&0) as i128);
                    }
                    values.insert(var.clone(), total as i64);
                }
                TheoryOutcome::Model(values)
            }
            other => other,
        }
    }

    /// Bound tightening to fixpoint. Returns false when an interval empties.
    fn propagate(&self, constraints: &[Atom], intervals: &mut BTreeMap<VarId, Interval>) -> bool {
        for _ in 0..self.max_rounds {
            let mut changed = false;
            for atom in constraints {
                match atom.rel {
                    Rel::Le => {
                        if !propagate_le(&atom.expr, intervals, &mut changed) {
                            return false;
                        }
                    }
                    Rel::Eq => {
                        if !propagate_le(&atom.expr, intervals, &mut changed)
                            || !propagate_le(&atom.expr.neg(), intervals, &mut changed)
                        {
                            return false;
                        }
                    }
                    Rel::Ne => {
                        if !propagate_ne(&atom.expr, intervals, &mut changed) {
                            return false;
                        }
                    }
                }
            }
            if !changed {
                break;
            }
        }
        true
    }

    /// Deterministic branch-and-bound over the narrowest unfixed variable.
    fn search_model(
        &mut self,
        constraints: &[Atom],
        intervals: &BTreeMap<VarId, Interval>,
    ) -> TheoryOutcome {
        if self.out_of_resources() {
            return TheoryOutcome::Exhausted;
        }

        // Narrowest unfixed variable; name breaks ties
        let branch_var = intervals
            .iter()
            .filter(|(_, iv)| !iv.is_fixed())
            .min_by_key(|(name, iv)| (iv.width(), name.as_str()))
            .map(|(name, _)| name.clone());

        let var = match branch_var {
            Some(v) => v,
            None => {
                let values: BTreeMap<VarId, i64> = intervals
                    .iter()
                    .map(|(name, iv)| (name.clone(), iv.lo as i64))
                    .collect();
                let ok = constraints
                    .iter()
                    .all(|atom| atom.evaluate(&values).unwrap_or(false));
                return if ok {
                    TheoryOutcome::Model(values)
                } else {
                    TheoryOutcome::Infeasible
                };
            }
        };

        let iv = intervals[&var];
        let mut saw_exhausted = false;

        let mut try_range = |search: &mut Self, lo: i128, hi: i128| -> Option<TheoryOutcome> {
            let mut narrowed = intervals.clone();
            narrowed.insert(var.clone(), Interval { lo, hi });
            if !search.propagate(constraints, &mut narrowed) {
                return None;
            }
            match search.search_model(constraints, &narrowed) {
                TheoryOutcome::Model(m) => Some(TheoryOutcome::Model(m)),
                TheoryOutcome::Exhausted => {
                    saw_exhausted = true;
                    None
                }
                TheoryOutcome::Infeasible => None,
            }
        };

        if iv.width() <= ENUM_WIDTH {
            let mut v = iv.lo;
            while v <= iv.hi {
                if let Some(found) = try_range(self, v, v) {
                    return found;
                }
                v += 1;
            }
        } else {
            let mid = iv.lo + (iv.hi - iv.lo) / 2;
            for (lo, hi) in [(iv.lo, mid), (mid + 1, iv.hi)] {
                if let Some(found) = try_range(self, lo, hi) {
                    return found;
                }
            }
        }

        if saw_exhausted {
            TheoryOutcome::Exhausted
        } else {
            TheoryOutcome::Infeasible
        }
    }
}

/// Tighten every variable of `expr ≤ 0` against the others' extremes.
fn propagate_le(
    expr: &LinExpr,
    intervals: &mut BTreeMap<VarId, Interval>,
    changed: &mut bool,
) -> bool {
    // Infeasible already when the minimum of the expression is positive
    let mut min_total: i128 = expr.constant as i128;
    for (var, coeff) in &expr.terms {
        min_total += intervals[var].min_scaled(*coeff as i128);
    }
    if min_total > 0 {
        return false;
    }

    for (var, coeff) in &expr.terms {
        let c = *coeff as i128;
        // c*x ≤ -constant - Σ_{j≠x} min(c_j·x_j)
        let mut rest_min: i128 = expr.constant as i128;
        for (other, other_coeff) in &expr.terms {
            if other != var {
                rest_min += intervals[other].min_scaled(*other_coeff as i128);
            }
        }
        let bound = -rest_min;
        let iv = intervals.get_mut(var).expect("interval for constrained var");
        if c > 0 {
            *changed |= iv.tighten_hi(floor_div(bound, c));
        } else {
            *changed |= iv.tighten_lo(ceil_div(bound, c));
        }
        if iv.is_empty() {
            return false;
        }
    }
    true
}

/// Endpoint pruning for `expr ≠ 0` with a single variable.
fn propagate_ne(
    expr: &LinExpr,
    intervals: &mut BTreeMap<VarId, Interval>,
    changed: &mut bool,
) -> bool {
    if expr.terms.len() != 1 {
        return true; // checked exactly at full assignment
    }
    let (var, coeff) = expr.terms.iter().next().expect("single term");
    let c = *coeff as i128;
    let k = -(expr.constant as i128);
    if k % c != 0 {
        return true; // never equal on integers
    }
    let forbidden = k / c;
    let iv = intervals.get_mut(var).expect("interval for constrained var");
    if iv.is_fixed() && iv.lo == forbidden {
        iv.lo = iv.hi + 1; // empty
        return false;
    }
    if iv.lo == forbidden {
        iv.lo += 1;
        *changed = true;
    } else if iv.hi == forbidden {
        iv.hi -= 1;
        *changed = true;
    }
    !iv.is_empty()
}

fn gcd(a: i64, b: i64) -> i64 {
    if b == 0 {
        a
    } else {
        gcd(b, a % b)
    }
}

/// Three-valued evaluation under a partial assignment.
fn eval(formula: &Formula, assignment: &Assignment) -> Option<bool> {
    match formula {
        Formula::True => Some(true),
        Formula::False => Some(false),
        Formula::Atom(atom) => {
            if atom.expr.is_constant() {
                return Some(match atom.rel {
                    Rel::Le => atom.expr.constant <= 0,
                    Rel::Eq => atom.expr.constant == 0,
                    Rel::Ne => atom.expr.constant != 0,
                });
            }
            assignment.atoms.get(atom).copied()
        }
        Formula::BoolVar(name) => assignment.bools.get(name).copied(),
        Formula::Not(inner) => eval(inner, assignment).map(|v| !v),
        Formula::And(operands) => {
            let mut all_true = true;
            for op in operands {
                match eval(op, assignment) {
                    Some(false) => return Some(false),
                    Some(true) => {}
                    None => all_true = false,
                }
            }
            if all_true {
                Some(true)
            } else {
                None
            }
        }
        Formula::Or(operands) => {
            let mut all_false = true;
            for op in operands {
                match eval(op, assignment) {
                    Some(true) => return Some(true),
                    Some(false) => {}
                    None => all_false = false,
                }
            }
            if all_false {
                Some(false)
            } else {
                None
            }
        }
        Formula::Implies(a, b) => match (eval(a, assignment), eval(b, assignment)) {
            (Some(false), _) | (_, Some(true)) => Some(true),
            (Some(true), Some(false)) => Some(false),
            _ => None,
        },
    }
}

/// First unassigned literal inside an undecided region of the formula.
fn pick(formula: &Formula, assignment: &Assignment) -> Option<Lit> {
    if eval(formula, assignment).is_some() {
        return None;
    }
    match formula {
        Formula::True | Formula::False => None,
        Formula::Atom(atom) => Some(Lit::Atom(atom.clone())),
        Formula::BoolVar(name) => Some(Lit::Bool(name.clone())),
        Formula::Not(inner) => pick(inner, assignment),
        Formula::And(operands) | Formula::Or(operands) => {
            operands.iter().find_map(|op| pick(op, assignment))
        }
        Formula::Implies(a, b) => pick(a, assignment).or_else(|| pick(b, assignment)),
    }
}

fn set_lit(assignment: &mut Assignment, lit: &Lit, value: bool) {
    match lit {
        Lit::Atom(atom) => {
            assignment.atoms.insert(atom.clone(), value);
        }
        Lit::Bool(name) => {
            assignment.bools.insert(name.clone(), value);
        }
    }
}

fn unset_lit(assignment: &mut Assignment, lit: &Lit) {
    match lit {
        Lit::Atom(atom) => {
            assignment.atoms.remove(atom);
        }
        Lit::Bool(name) => {
            assignment.bools.remove(name);
        }
    }
}
