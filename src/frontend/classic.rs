//! Adapter for the legacy parser.
//!
//! This parser hands us a flat tagged tree: the unit tag says whether we
//! have a subroutine or a function, the entry list mixes the leading
//! documentation comments, one specification entry and the executable
//! statements, and contained procedures arrive as nested trees.

use crate::expression::symbols::SymbolType;
use crate::ir::{Section, Stmt};
use crate::procedure::Procedure;
use crate::scope::{ScopeId, ScopeTree};
use crate::utils::errors::FrontendError;
use crate::utils::location::Span;
use serde::{Deserialize, Serialize};

use super::Frontend;

/// Raw output of the legacy parser.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawTree {
    /// Unit tag, `subroutine` or `function`.
    pub tag: String,
    pub name: String,
    /// Dummy-argument names in declaration order.
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub body: Vec<RawEntry>,
    /// Contained procedures.
    #[serde(default)]
    pub members: Vec<RawTree>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub span: Option<Span>,
}

/// One entry of the flat tree: either the single specification part or
/// an executable/comment statement.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "entry", rename_all = "lowercase")]
pub enum RawEntry {
    Spec { body: Vec<Stmt> },
    Node { stmt: Stmt },
}

/// Assemble a top-level procedure from a legacy tree.
pub fn assemble(tree: &RawTree, scopes: &mut ScopeTree) -> Result<Procedure, FrontendError> {
    assemble_in(tree, scopes, None)
}

fn assemble_in(
    tree: &RawTree,
    scopes: &mut ScopeTree,
    parent: Option<ScopeId>,
) -> Result<Procedure, FrontendError> {
    let is_function = match tree.tag.to_lowercase().as_str() {
        "subroutine" => false,
        "function" => true,
        other => {
            return Err(FrontendError::new(
                Frontend::Classic,
                format!("unexpected unit tag `{}` for `{}`", other, tree.name),
            ))
        }
    };

    let spec_index = tree
        .body
        .iter()
        .position(|e| matches!(e, RawEntry::Spec { .. }))
        .ok_or_else(|| {
            FrontendError::new(
                Frontend::Classic,
                format!("no specification part in `{}`", tree.name),
            )
        })?;

    let mut routine = Procedure::new(&tree.name, is_function, scopes, parent);
    routine.dummies = tree.args.iter().map(|a| a.to_lowercase()).collect();
    routine.source = tree.span;

    // Everything ahead of the specification entry is the doc header.
    for entry in &tree.body[..spec_index] {
        match entry {
            RawEntry::Node { stmt } if stmt.is_comment_like() => {
                routine.docstring.push(stmt.clone());
            }
            _ => {
                return Err(FrontendError::new(
                    Frontend::Classic,
                    format!("non-comment entry before specification in `{}`", tree.name),
                ))
            }
        }
    }

    if let RawEntry::Spec { body } = &tree.body[spec_index] {
        routine.spec = Section::new(body.clone());
    }
    routine.register_spec_symbols(scopes);

    // Member names go into the table before any member body is built, so
    // members can call each other regardless of definition order.
    for member in &tree.members {
        let is_fn = member.tag.eq_ignore_ascii_case("function");
        scopes.declare(routine.scope, &member.name, SymbolType::procedure(is_fn));
    }
    let mut members = Vec::with_capacity(tree.members.len());
    for member in &tree.members {
        members.push(assemble_in(member, scopes, Some(routine.scope))?);
    }
    routine.members = members;

    let mut body = Vec::new();
    for entry in &tree.body[spec_index + 1..] {
        match entry {
            RawEntry::Node { stmt } => body.push(stmt.clone()),
            RawEntry::Spec { .. } => {
                return Err(FrontendError::new(
                    Frontend::Classic,
                    format!("duplicate specification part in `{}`", tree.name),
                ))
            }
        }
    }
    routine.body = Section::new(body);
    Ok(routine)
}
