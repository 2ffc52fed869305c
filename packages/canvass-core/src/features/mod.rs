//! Feature modules
//!
//! Each feature is a vertical slice; the layered ones split into
//! `domain/` (pure models) and `infrastructure/` (implementation).

pub mod analysis;
pub mod expr;
pub mod questionnaire;
pub mod smt;
