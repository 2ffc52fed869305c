//! Questionnaire Module
//!
//! Typed questionnaire model and the YAML loader that produces it.

pub mod domain;
pub mod infrastructure;

pub use domain::{
    AnswerDomain, Block, Condition, Item, ItemKind, Questionnaire, DEFAULT_MAX, DEFAULT_MIN,
};
pub use infrastructure::loader::{load_from_path, load_from_str};
