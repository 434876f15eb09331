//! Frontend adapters.
//!
//! Three parser outputs feed the toolkit, each with its own shape and
//! its own quirks. Every adapter assembles the same [`Procedure`]
//! structure from its raw input; [`build_procedure`] dispatches and then
//! runs the shared finalization (rescoping, allocatable shape
//! inference), so downstream transformations never see frontend
//! differences.

pub mod classic;
pub mod native;
pub mod xmod;

use crate::procedure::Procedure;
use crate::scope::ScopeTree;
use crate::utils::errors::FrontendError;
use serde::{Deserialize, Serialize};
use std::fmt;

pub use classic::{RawEntry, RawTree};
pub use native::RawSubprogram;
pub use xmod::{RawDefinition, RawTypeEntry, RawUnit};

/// The parser a raw tree came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Frontend {
    /// The legacy parser: a flat tree with tagged entries.
    Classic,
    /// The cross-module parser: type table plus definition, types by id.
    Xmod,
    /// The in-house parser: explicit spec/exec/internal parts.
    Native,
}

impl fmt::Display for Frontend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Frontend::Classic => write!(f, "classic"),
            Frontend::Xmod => write!(f, "xmod"),
            Frontend::Native => write!(f, "native"),
        }
    }
}

/// A raw parser output, tagged by frontend.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "frontend", rename_all = "lowercase")]
pub enum RawAst {
    Classic(RawTree),
    Xmod(RawUnit),
    Native(RawSubprogram),
}

impl RawAst {
    /// Which frontend produced this tree.
    pub fn frontend(&self) -> Frontend {
        match self {
            RawAst::Classic(_) => Frontend::Classic,
            RawAst::Xmod(_) => Frontend::Xmod,
            RawAst::Native(_) => Frontend::Native,
        }
    }
}

/// Assemble a procedure from a raw parser output.
///
/// Whatever the frontend, the result satisfies the same contract: every
/// symbol reference is bound to the scope it resolves in, and
/// allocatables with visible allocations carry their inferred shape.
pub fn build_procedure(raw: &RawAst, scopes: &mut ScopeTree) -> Result<Procedure, FrontendError> {
    let mut routine = match raw {
        RawAst::Classic(tree) => classic::assemble(tree, scopes)?,
        RawAst::Xmod(unit) => xmod::assemble(unit, scopes)?,
        RawAst::Native(subprogram) => native::assemble(subprogram, scopes)?,
    };
    finalize(&mut routine, scopes);
    Ok(routine)
}

/// Shared post-assembly pass, applied to members first so their symbol
/// tables are complete before the enclosing procedure resolves calls to
/// them.
fn finalize(routine: &mut Procedure, scopes: &mut ScopeTree) {
    for member in &mut routine.members {
        finalize(member, scopes);
    }
    routine.rescope_variables(scopes);
    routine.infer_allocatable_shapes(scopes);
}
