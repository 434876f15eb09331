//! Symbolic expressions, typed symbol references and the algebra service.

pub mod algebra;
pub mod parser;
pub mod symbols;

pub use algebra::{
    as_int, definitely_equal, is_constant, polynomial_terms, simplify, symbolic_cmp, PolyTerms,
};
pub use parser::parse_expression;
pub use symbols::{ComparisonOp, DataType, Expr, Intent, LoopRange, SymbolType, VarRef};
