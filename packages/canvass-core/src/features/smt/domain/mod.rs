//! Constraint Domain Model
//!
//! Typed terms for quantifier-free linear integer arithmetic plus booleans:
//! - [`LinExpr`]: normalized linear term `Σ cᵢ·xᵢ + c`
//! - [`Atom`]: linear constraint `expr ⋈ 0` with `⋈ ∈ {≤, =, ≠}`
//! - [`Formula`]: boolean structure over atoms and boolean variables
//!
//! The atom relations are closed under integer negation, so formulas can be
//! pushed to negation normal form without leaving the representation:
//! `¬(e ≤ 0) ⇔ (1 − e ≤ 0)`, `¬(e = 0) ⇔ (e ≠ 0)`.

use std::collections::BTreeMap;
use std::fmt;

/// Variable identifier in constraints
pub type VarId = String;

/// Normalized linear integer expression: `Σ cᵢ·xᵢ + constant`.
///
/// Zero coefficients are never stored; two equal expressions compare equal.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct LinExpr {
    /// Variable → coefficient (non-zero)
    pub terms: BTreeMap<VarId, i64>,
    pub constant: i64,
}

impl LinExpr {
    pub fn constant(value: i64) -> Self {
        Self {
            terms: BTreeMap::new(),
            constant: value,
        }
    }

    pub fn var(name: impl Into<VarId>) -> Self {
        let mut terms = BTreeMap::new();
        terms.insert(name.into(), 1);
        Self { terms, constant: 0 }
    }

    pub fn is_constant(&self) -> bool {
        self.terms.is_empty()
    }

    pub fn add(&self, other: &LinExpr) -> LinExpr {
        let mut terms = self.terms.clone();
        for (var, coeff) in &other.terms {
            let entry = terms.entry(var.clone()).or_insert(0);
            *entry += coeff;
            if *entry == 0 {
                terms.remove(var);
            }
        }
        LinExpr {
            terms,
            constant: self.constant + other.constant,
        }
    }

    pub fn sub(&self, other: &LinExpr) -> LinExpr {
        self.add(&other.neg())
    }

    pub fn neg(&self) -> LinExpr {
        self.scale(-1)
    }

    pub fn scale(&self, factor: i64) -> LinExpr {
        if factor == 0 {
            return LinExpr::constant(0);
        }
        LinExpr {
            terms: self
                .terms
                .iter()
                .map(|(v, c)| (v.clone(), c * factor))
                .collect(),
            constant: self.constant * factor,
        }
    }

    pub fn offset(&self, delta: i64) -> LinExpr {
        LinExpr {
            terms: self.terms.clone(),
            constant: self.constant + delta,
        }
    }

    /// Variables referenced by this expression
    pub fn variables(&self) -> impl Iterator<Item = &VarId> {
        self.terms.keys()
    }
}

impl fmt::Display for LinExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (var, coeff) in &self.terms {
            if first {
                match coeff {
                    1 => write!(f, "{}", var)?,
                    -1 => write!(f, "-{}", var)?,
                    c => write!(f, "{}*{}", c, var)?,
                }
                first = false;
            } else if *coeff >= 0 {
                if *coeff == 1 {
                    write!(f, " + {}", var)?;
                } else {
                    write!(f, " + {}*{}", coeff, var)?;
                }
            } else if *coeff == -1 {
                write!(f, " - {}", var)?;
            } else {
                write!(f, " - {}*{}", -coeff, var)?;
            }
        }
        if first {
            write!(f, "{}", self.constant)?;
        } else if self.constant > 0 {
            write!(f, " + {}", self.constant)?;
        } else if self.constant < 0 {
            write!(f, " - {}", -self.constant)?;
        }
        Ok(())
    }
}

/// Relation of an [`Atom`] against zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Rel {
    /// expr ≤ 0
    Le,
    /// expr = 0
    Eq,
    /// expr ≠ 0
    Ne,
}

impl fmt::Display for Rel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rel::Le => write!(f, "<="),
            Rel::Eq => write!(f, "=="),
            Rel::Ne => write!(f, "!="),
        }
    }
}

/// Linear constraint `expr ⋈ 0`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Atom {
    pub expr: LinExpr,
    pub rel: Rel,
}

impl Atom {
    pub fn new(expr: LinExpr, rel: Rel) -> Self {
        Self { expr, rel }
    }

    /// lhs < rhs  ⇔  lhs − rhs + 1 ≤ 0
    pub fn lt(lhs: &LinExpr, rhs: &LinExpr) -> Self {
        Self::new(lhs.sub(rhs).offset(1), Rel::Le)
    }

    /// lhs ≤ rhs  ⇔  lhs − rhs ≤ 0
    pub fn le(lhs: &LinExpr, rhs: &LinExpr) -> Self {
        Self::new(lhs.sub(rhs), Rel::Le)
    }

    /// lhs > rhs  ⇔  rhs < lhs
    pub fn gt(lhs: &LinExpr, rhs: &LinExpr) -> Self {
        Self::lt(rhs, lhs)
    }

    /// lhs ≥ rhs  ⇔  rhs ≤ lhs
    pub fn ge(lhs: &LinExpr, rhs: &LinExpr) -> Self {
        Self::le(rhs, lhs)
    }

    pub fn eq(lhs: &LinExpr, rhs: &LinExpr) -> Self {
        Self::new(lhs.sub(rhs), Rel::Eq)
    }

    pub fn ne(lhs: &LinExpr, rhs: &LinExpr) -> Self {
        Self::new(lhs.sub(rhs), Rel::Ne)
    }

    /// Exact integer negation, staying inside the atom language.
    pub fn negate(&self) -> Atom {
        match self.rel {
            // ¬(e ≤ 0) ⇔ e ≥ 1 ⇔ 1 − e ≤ 0
            Rel::Le => Atom::new(self.expr.neg().offset(1), Rel::Le),
            Rel::Eq => Atom::new(self.expr.clone(), Rel::Ne),
            Rel::Ne => Atom::new(self.expr.clone(), Rel::Eq),
        }
    }

    /// Evaluate against a full integer assignment. `None` if a variable is
    /// missing from the assignment.
    pub fn evaluate(&self, values: &BTreeMap<VarId, i64>) -> Option<bool> {
        let mut total: i128 = self.expr.constant as i128;
        for (var, coeff) in &self.expr.terms {
            total += (*coeff as i128) * (*values.get(var)? as i128);
        }
        Some(match self.rel {
            Rel::Le => total <= 0,
            Rel::Eq => total == 0,
            Rel::Ne => total != 0,
        })
    }
}

impl fmt::Display for Atom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} 0", self.expr, self.rel)
    }
}

/// Boolean formula over linear atoms and boolean variables.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Formula {
    True,
    False,
    Atom(Atom),
    /// Free boolean variable (visitedness proxies)
    BoolVar(VarId),
    Not(Box<Formula>),
    And(Vec<Formula>),
    Or(Vec<Formula>),
    Implies(Box<Formula>, Box<Formula>),
}

impl Formula {
    /// Conjunction with constant folding and flattening.
    pub fn and(operands: Vec<Formula>) -> Formula {
        let mut flat = Vec::new();
        for op in operands {
            match op {
                Formula::True => {}
                Formula::False => return Formula::False,
                Formula::And(inner) => flat.extend(inner),
                other => flat.push(other),
            }
        }
        match flat.len() {
            0 => Formula::True,
            1 => flat.pop().unwrap(),
            _ => Formula::And(flat),
        }
    }

    /// Disjunction with constant folding and flattening.
    pub fn or(operands: Vec<Formula>) -> Formula {
        let mut flat = Vec::new();
        for op in operands {
            match op {
                Formula::False => {}
                Formula::True => return Formula::True,
                Formula::Or(inner) => flat.extend(inner),
                other => flat.push(other),
            }
        }
        match flat.len() {
            0 => Formula::False,
            1 => flat.pop().unwrap(),
            _ => Formula::Or(flat),
        }
    }

    pub fn not(operand: Formula) -> Formula {
        match operand {
            Formula::True => Formula::False,
            Formula::False => Formula::True,
            Formula::Atom(a) => Formula::Atom(a.negate()),
            Formula::Not(inner) => *inner,
            other => Formula::Not(Box::new(other)),
        }
    }

    pub fn implies(antecedent: Formula, consequent: Formula) -> Formula {
        match (&antecedent, &consequent) {
            (Formula::True, _) => consequent,
            (Formula::False, _) => Formula::True,
            (_, Formula::True) => Formula::True,
            _ => Formula::Implies(Box::new(antecedent), Box::new(consequent)),
        }
    }

    /// a ↔ b, encoded as (a ⇒ b) ∧ (b ⇒ a)
    pub fn iff(a: Formula, b: Formula) -> Formula {
        Formula::and(vec![
            Formula::implies(a.clone(), b.clone()),
            Formula::implies(b, a),
        ])
    }

    pub fn is_true(&self) -> bool {
        matches!(self, Formula::True)
    }

    /// Collect every integer variable referenced by the formula.
    pub fn collect_int_vars(&self, out: &mut std::collections::BTreeSet<VarId>) {
        match self {
            Formula::True | Formula::False | Formula::BoolVar(_) => {}
            Formula::Atom(a) => out.extend(a.expr.variables().cloned()),
            Formula::Not(inner) => inner.collect_int_vars(out),
            Formula::And(ops) | Formula::Or(ops) => {
                for op in ops {
                    op.collect_int_vars(out);
                }
            }
            Formula::Implies(a, b) => {
                a.collect_int_vars(out);
                b.collect_int_vars(out);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn x() -> LinExpr {
        LinExpr::var("x")
    }

    #[test]
    fn test_linexpr_normalization() {
        // x + 1 - x == 1
        let e = x().offset(1).sub(&x());
        assert!(e.is_constant());
        assert_eq!(e.constant, 1);
    }

    #[test]
    fn test_atom_lt_encoding() {
        // x < 5 → x - 5 + 1 <= 0 → x - 4 <= 0
        let a = Atom::lt(&x(), &LinExpr::constant(5));
        assert_eq!(a.rel, Rel::Le);
        assert_eq!(a.expr.constant, -4);
    }

    #[test]
    fn test_atom_negation_roundtrip() {
        let a = Atom::le(&x(), &LinExpr::constant(3));
        let mut values = BTreeMap::new();
        for v in [-1, 3, 4, 10] {
            values.insert("x".to_string(), v);
            let direct = a.evaluate(&values).unwrap();
            let negated = a.negate().evaluate(&values).unwrap();
            assert_ne!(direct, negated, "negation must flip at x={}", v);
        }
    }

    #[test]
    fn test_formula_folding() {
        assert_eq!(Formula::and(vec![Formula::True, Formula::True]), Formula::True);
        assert_eq!(
            Formula::and(vec![Formula::True, Formula::False]),
            Formula::False
        );
        assert_eq!(Formula::or(vec![Formula::False]), Formula::False);
        assert_eq!(Formula::not(Formula::False), Formula::True);
    }

    #[test]
    fn test_atom_display() {
        let a = Atom::ge(&x(), &LinExpr::constant(2));
        assert_eq!(a.to_string(), "-x + 2 <= 0");
    }
}
