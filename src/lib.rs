//! fortopt: a source-to-source restructuring toolkit for numerical
//! kernels.
//!
//! The crate assembles procedures from the raw output of three different
//! parsers into one internal representation, binds every symbol
//! reference to a hierarchical scope tree, infers deferred array shapes
//! from allocations, and applies directive-driven polyhedral loop
//! transformations (fusion and fission) on the result.
//!
//! # Example
//!
//! ```
//! use fortopt::prelude::*;
//!
//! let mut scopes = ScopeTree::new();
//! let mut routine = Procedure::new("kernel", false, &mut scopes, None);
//! routine.rescope_variables(&mut scopes);
//! loop_fusion(&mut routine).unwrap();
//! ```

#![warn(clippy::all)]

pub mod expression;
pub mod frontend;
pub mod ir;
pub mod polyhedral;
pub mod pragma;
pub mod procedure;
pub mod scope;
pub mod transform;
pub mod utils;

/// Commonly used types and entry points.
pub mod prelude {
    pub use crate::expression::{DataType, Expr, LoopRange, SymbolType, VarRef};
    pub use crate::frontend::{build_procedure, Frontend, RawAst};
    pub use crate::ir::{Pragma, Section, Stmt, StmtKind};
    pub use crate::polyhedral::Polyhedron;
    pub use crate::procedure::Procedure;
    pub use crate::scope::{ScopeId, ScopeTree};
    pub use crate::transform::{loop_fission, loop_fusion};
    pub use crate::utils::errors::{FortoptError, FortoptResult, FrontendError, TransformError};
}

pub use frontend::build_procedure;
pub use transform::{loop_fission, loop_fusion};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
