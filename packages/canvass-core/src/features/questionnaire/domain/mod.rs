//! Questionnaire Domain Model
//!
//! Immutable, typed questionnaire as produced by the loader: an ordered
//! sequence of items with preconditions, postconditions, optional code
//! fragments, and (for questions) an answer domain.

use serde::{Deserialize, Serialize};

use crate::features::smt::domain::{Atom, Formula, LinExpr};

/// Default integer domain bounds when `min`/`max` are absent: ±2³¹.
pub const DEFAULT_MIN: i64 = -(1 << 31);
pub const DEFAULT_MAX: i64 = (1 << 31) - 1;

/// Item kind. Only `Question` carries an outcome variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ItemKind {
    Question,
    Comment,
    Group,
}

impl ItemKind {
    pub fn has_outcome(&self) -> bool {
        matches!(self, ItemKind::Question)
    }
}

/// Value space of a question's outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AnswerDomain {
    /// Inclusive integer range
    Integer { lo: i64, hi: i64 },
    /// Finite integer-labeled choice set
    Enum(Vec<i64>),
    Boolean,
    /// Unconstrained integer; only legal when no predicate references it
    Free,
}

impl AnswerDomain {
    /// Domain contribution `⟦D_i⟧` over the outcome variable.
    pub fn constraint(&self, outcome: &str) -> Formula {
        let var = LinExpr::var(outcome);
        match self {
            AnswerDomain::Integer { lo, hi } => Formula::and(vec![
                Formula::Atom(Atom::ge(&var, &LinExpr::constant(*lo))),
                Formula::Atom(Atom::le(&var, &LinExpr::constant(*hi))),
            ]),
            AnswerDomain::Enum(values) => Formula::or(
                values
                    .iter()
                    .map(|v| Formula::Atom(Atom::eq(&var, &LinExpr::constant(*v))))
                    .collect(),
            ),
            AnswerDomain::Boolean => Formula::and(vec![
                Formula::Atom(Atom::ge(&var, &LinExpr::constant(0))),
                Formula::Atom(Atom::le(&var, &LinExpr::constant(1))),
            ]),
            AnswerDomain::Free => Formula::True,
        }
    }

    /// Whether `value` lies inside the domain.
    pub fn contains(&self, value: i64) -> bool {
        match self {
            AnswerDomain::Integer { lo, hi } => (*lo..=*hi).contains(&value),
            AnswerDomain::Enum(values) => values.contains(&value),
            AnswerDomain::Boolean => value == 0 || value == 1,
            AnswerDomain::Free => true,
        }
    }
}

/// One predicate with an optional author-facing hint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Condition {
    pub predicate: String,
    pub hint: Option<String>,
}

/// One questionnaire item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    /// Unique id; stable key for all cross-references
    pub id: String,
    pub kind: ItemKind,
    pub title: Option<String>,
    /// Present iff `kind` is `Question`
    pub domain: Option<AnswerDomain>,
    /// Conjoined; empty means `true`
    pub preconditions: Vec<Condition>,
    /// Conjoined; empty means `true`
    pub postconditions: Vec<Condition>,
    /// Post-response code fragment, analyzed as a write set only
    pub code_block: Option<String>,
    /// Position in the source file; topological tie-breaker
    pub origin_index: usize,
    /// Owning block (flat grouping, no analysis effect)
    pub block_id: String,
}

/// Block metadata. Blocks group items for presentation only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub id: String,
    pub title: Option<String>,
}

/// Immutable questionnaire: the loader's output and the analysis input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Questionnaire {
    pub title: String,
    /// Initialization fragment, versioned before any item
    pub code_init: Option<String>,
    pub blocks: Vec<Block>,
    /// Items in file order
    pub items: Vec<Item>,
}

impl Questionnaire {
    pub fn item(&self, id: &str) -> Option<&Item> {
        self.items.iter().find(|item| item.id == id)
    }

    pub fn question_count(&self) -> usize {
        self.items.iter().filter(|i| i.kind.has_outcome()).count()
    }
}
