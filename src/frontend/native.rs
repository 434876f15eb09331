//! Adapter for the in-house parser.
//!
//! The tidiest of the three inputs: spec, exec and internal parts arrive
//! pre-separated. Its one quirk is comment placement: the doc header is
//! glued to the front of the spec part, and comments or pragmas written
//! between the declarations and the first executable statement end up at
//! the tail of the spec part. Both are moved where they belong, so loop
//! pragmas written just before a loop nest stay adjacent to it.

use crate::expression::symbols::SymbolType;
use crate::ir::{Section, Stmt};
use crate::procedure::Procedure;
use crate::scope::{ScopeId, ScopeTree};
use crate::utils::errors::FrontendError;
use crate::utils::location::Span;
use serde::{Deserialize, Serialize};

use super::Frontend;

/// Raw output of the in-house parser.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawSubprogram {
    /// Unit kind, `subroutine` or `function`.
    pub kind: String,
    pub name: String,
    #[serde(default)]
    pub dummy_args: Vec<String>,
    #[serde(default)]
    pub spec_part: Vec<Stmt>,
    #[serde(default)]
    pub exec_part: Vec<Stmt>,
    /// Contained procedures.
    #[serde(default)]
    pub internal_part: Vec<RawSubprogram>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub span: Option<Span>,
}

/// Assemble a top-level procedure from an in-house parse tree.
pub fn assemble(
    subprogram: &RawSubprogram,
    scopes: &mut ScopeTree,
) -> Result<Procedure, FrontendError> {
    assemble_in(subprogram, scopes, None)
}

fn assemble_in(
    subprogram: &RawSubprogram,
    scopes: &mut ScopeTree,
    parent: Option<ScopeId>,
) -> Result<Procedure, FrontendError> {
    let is_function = match subprogram.kind.to_lowercase().as_str() {
        "subroutine" => false,
        "function" => true,
        other => {
            return Err(FrontendError::new(
                Frontend::Native,
                format!("unexpected unit kind `{}` for `{}`", other, subprogram.name),
            ))
        }
    };

    let mut routine = Procedure::new(&subprogram.name, is_function, scopes, parent);
    routine.dummies = subprogram.dummy_args.iter().map(|a| a.to_lowercase()).collect();
    routine.source = subprogram.span;

    let mut spec = subprogram.spec_part.clone();
    let doc_end = spec.iter().position(|s| !s.is_comment_like()).unwrap_or(spec.len());
    routine.docstring = spec.drain(..doc_end).collect();

    // Comment-likes trailing the declarations belong to the first
    // executable statement; move them to the head of the body.
    let mut promoted = Vec::new();
    while matches!(spec.last(), Some(s) if s.is_comment_like()) {
        promoted.push(spec.pop().unwrap());
    }
    promoted.reverse();

    routine.spec = Section::new(spec);
    routine.register_spec_symbols(scopes);

    for member in &subprogram.internal_part {
        let is_fn = member.kind.eq_ignore_ascii_case("function");
        scopes.declare(routine.scope, &member.name, SymbolType::procedure(is_fn));
    }
    let mut members = Vec::with_capacity(subprogram.internal_part.len());
    for member in &subprogram.internal_part {
        members.push(assemble_in(member, scopes, Some(routine.scope))?);
    }
    routine.members = members;

    promoted.extend(subprogram.exec_part.iter().cloned());
    routine.body = Section::new(promoted);
    Ok(routine)
}
