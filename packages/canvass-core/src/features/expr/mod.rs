//! Expression Compiler Module
//!
//! The restricted predicate/code-fragment language: spanned AST, lexer,
//! recursive-descent parser, and lowering to solver formulas.
//!
//! ```text
//! expr
//! ├── domain/           # AST (Expr, Stmt, Span)
//! └── infrastructure/   # lexer, parser, lowering
//! ```

pub mod domain;
pub mod infrastructure;

pub use domain::{ArithOp, AssignTarget, BoolOp, CmpOp, Expr, Span, Spanned, Stmt, UnaryOp};
pub use infrastructure::{
    parse_fragment, parse_predicate, CompileIssue, LoweredPredicate, Lowerer, SymbolTable,
    VarSort, VersionMap,
};
