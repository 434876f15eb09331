//! Adapter for the cross-module parser.
//!
//! This parser separates types from code: a type table maps opaque ids
//! to signatures, and the definition references its own signature by id.
//! Two quirks are papered over here: subroutine definitions redundantly
//! declare their own name as a local symbol, and implicit typing is
//! never recorded, so an `IMPLICIT NONE` marker is reinstated at the top
//! of the declarations.

use crate::ir::{Section, Stmt, StmtKind};
use crate::procedure::Procedure;
use crate::scope::{ScopeId, ScopeTree};
use crate::utils::errors::FrontendError;
use crate::utils::location::Span;
use serde::{Deserialize, Serialize};

use super::Frontend;

/// Raw output of the cross-module parser.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawUnit {
    /// Signatures keyed by id.
    #[serde(default)]
    pub type_table: Vec<RawTypeEntry>,
    /// The procedure definition, absent for bare module files.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub definition: Option<RawDefinition>,
}

/// One signature in the type table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawTypeEntry {
    pub id: String,
    /// Return type name; `void` or absent for subroutines.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub return_type: Option<String>,
    /// Parameter names in signature order.
    #[serde(default)]
    pub params: Vec<String>,
}

/// A procedure definition referencing its signature by id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawDefinition {
    pub name: String,
    /// Id of this procedure's signature in the type table.
    pub type_id: String,
    /// Leading comments, imports and declarations, in source order.
    #[serde(default)]
    pub declarations: Vec<Stmt>,
    #[serde(default)]
    pub body: Vec<Stmt>,
    /// Contained procedures, each a complete nested unit.
    #[serde(default)]
    pub contains: Vec<RawUnit>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<usize>,
}

/// Assemble a top-level procedure from a cross-module unit.
pub fn assemble(unit: &RawUnit, scopes: &mut ScopeTree) -> Result<Procedure, FrontendError> {
    assemble_in(unit, scopes, None)
}

fn assemble_in(
    unit: &RawUnit,
    scopes: &mut ScopeTree,
    parent: Option<ScopeId>,
) -> Result<Procedure, FrontendError> {
    let definition = unit.definition.as_ref().ok_or_else(|| {
        FrontendError::new(Frontend::Xmod, "unit carries no procedure definition")
    })?;

    let signature = unit
        .type_table
        .iter()
        .find(|e| e.id == definition.type_id)
        .ok_or_else(|| {
            FrontendError::new(
                Frontend::Xmod,
                format!("signature `{}` of `{}` not in type table", definition.type_id, definition.name),
            )
        })?;
    let is_function = signature.return_type.as_deref().map_or(false, |r| r != "void");

    let mut routine = Procedure::new(&definition.name, is_function, scopes, parent);
    routine.dummies = signature.params.iter().map(|p| p.to_lowercase()).collect();
    routine.source = definition.line.map(Span::line);

    // The declaration list opens with the doc header, when there is one.
    let mut declarations = definition.declarations.clone();
    let doc_end = declarations.iter().position(|s| !s.is_comment_like()).unwrap_or(declarations.len());
    routine.docstring = declarations.drain(..doc_end).collect();

    // Subroutines carry a spurious self-declaration; drop it.
    if !is_function {
        declarations.retain(|stmt| match &stmt.kind {
            StmtKind::Declaration { variables } => {
                !(variables.len() == 1 && variables[0].name_eq(&definition.name))
            }
            _ => true,
        });
    }

    // Implicit typing information is lost by this parser; reinstate the
    // marker right after the imports.
    let insert_at = declarations
        .iter()
        .position(|s| !matches!(s.kind, StmtKind::Import { .. }))
        .unwrap_or(declarations.len());
    declarations.insert(insert_at, Stmt::new(StmtKind::Intrinsic { text: "IMPLICIT NONE".into() }));

    routine.spec = Section::new(declarations);
    routine.register_spec_symbols(scopes);

    let mut members = Vec::with_capacity(definition.contains.len());
    for nested in &definition.contains {
        members.push(assemble_in(nested, scopes, Some(routine.scope))?);
    }
    routine.members = members;
    routine.body = Section::new(definition.body.clone());
    Ok(routine)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expression::symbols::VarRef;

    fn unit(return_type: Option<&str>, declarations: Vec<Stmt>) -> RawUnit {
        RawUnit {
            type_table: vec![RawTypeEntry {
                id: "F1".into(),
                return_type: return_type.map(String::from),
                params: vec!["n".into()],
            }],
            definition: Some(RawDefinition {
                name: "demo".into(),
                type_id: "F1".into(),
                declarations,
                body: vec![],
                contains: vec![],
                line: Some(12),
            }),
        }
    }

    #[test]
    fn test_self_declaration_filtered() {
        let raw = unit(
            Some("void"),
            vec![
                Stmt::comment("! header"),
                Stmt::new(StmtKind::Declaration { variables: vec![VarRef::deferred("demo")] }),
                Stmt::new(StmtKind::Declaration { variables: vec![VarRef::integer("n")] }),
            ],
        );
        let mut scopes = ScopeTree::new();
        let routine = assemble(&raw, &mut scopes).unwrap();
        assert!(!routine.is_function);
        assert_eq!(routine.docstring.len(), 1);
        let names: Vec<String> = routine.variables().iter().map(|v| v.name_lower()).collect();
        assert_eq!(names, vec!["n"]);
    }

    #[test]
    fn test_implicit_none_after_imports() {
        let raw = unit(
            None,
            vec![
                Stmt::new(StmtKind::Import {
                    module: "kinds".into(),
                    symbols: vec![VarRef::deferred("wp")],
                }),
                Stmt::new(StmtKind::Declaration { variables: vec![VarRef::integer("n")] }),
            ],
        );
        let mut scopes = ScopeTree::new();
        let routine = assemble(&raw, &mut scopes).unwrap();
        assert!(matches!(routine.spec.body[0].kind, StmtKind::Import { .. }));
        assert!(
            matches!(&routine.spec.body[1].kind, StmtKind::Intrinsic { text } if text == "IMPLICIT NONE")
        );
        assert_eq!(routine.source, Some(Span::line(12)));
    }

    #[test]
    fn test_function_keeps_result_declaration() {
        let raw = unit(
            Some("real"),
            vec![Stmt::new(StmtKind::Declaration {
                variables: vec![VarRef::new(
                    "demo",
                    crate::expression::SymbolType::new(crate::expression::DataType::Real),
                )],
            })],
        );
        let mut scopes = ScopeTree::new();
        let routine = assemble(&raw, &mut scopes).unwrap();
        assert!(routine.is_function);
        // The result variable declaration survives for functions
        assert!(routine.variables().iter().any(|v| v.name_eq("demo")));
    }

    #[test]
    fn test_missing_definition() {
        let raw = RawUnit { type_table: vec![], definition: None };
        let mut scopes = ScopeTree::new();
        assert!(assemble(&raw, &mut scopes).is_err());
    }
}
