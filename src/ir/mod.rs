//! Internal representation of procedure bodies.
//!
//! Statements form a tree ([`Stmt`] / [`StmtKind`]) with stable node
//! identities: every statement gets a fresh [`NodeId`] at construction,
//! and transformations address nodes through those ids rather than
//! through positions, so replacement maps stay valid while the tree is
//! rewritten. Ids are never serialized; deserialization mints new ones.

pub mod visit;

use crate::expression::symbols::{Expr, LoopRange, VarRef};
use crate::utils::location::Span;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_NODE_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of a statement node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeId(pub u64);

impl NodeId {
    /// Mint a fresh, never-before-used id.
    pub fn fresh() -> Self {
        NodeId(NEXT_NODE_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// A compiler directive attached to or between statements.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pragma {
    /// Namespace keyword, e.g. `fortopt` for our own directives.
    pub keyword: String,
    /// Everything after the keyword, verbatim.
    pub content: String,
}

impl Pragma {
    pub fn new(keyword: impl Into<String>, content: impl Into<String>) -> Self {
        Self { keyword: keyword.into(), content: content.into() }
    }
}

/// A statement node: identity plus payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stmt {
    /// Stable in-process identity; skipped on the wire.
    #[serde(skip, default = "NodeId::fresh")]
    pub id: NodeId,
    pub kind: StmtKind,
    /// Source location, when the frontend provided one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<Span>,
}

/// Statement payloads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "stmt", rename_all = "snake_case")]
pub enum StmtKind {
    /// A single comment line, text includes the leading `!`.
    Comment { text: String },
    /// A run of consecutive comment lines kept together.
    CommentBlock { comments: Vec<String> },
    /// A free-standing directive.
    Pragma(Pragma),
    /// An opaque statement carried through verbatim (e.g. `IMPLICIT NONE`).
    Intrinsic { text: String },
    /// A module import with the symbols it brings into scope.
    Import { module: String, symbols: Vec<VarRef> },
    /// An interface block; the body is carried but not interpreted.
    Interface { body: Vec<Stmt> },
    /// A declaration of one or more variables, types on the symbols.
    Declaration { variables: Vec<VarRef> },
    /// Dynamic allocation, optionally sourced from another array.
    Allocation {
        variables: Vec<VarRef>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        data_source: Option<VarRef>,
    },
    Deallocation { variables: Vec<VarRef> },
    Assignment {
        target: Expr,
        value: Expr,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pragma: Option<Pragma>,
    },
    Call {
        name: VarRef,
        args: Vec<Expr>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pragma: Option<Pragma>,
    },
    Loop {
        variable: VarRef,
        bounds: LoopRange,
        body: Vec<Stmt>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pragma: Option<Pragma>,
    },
    Conditional {
        condition: Expr,
        body: Vec<Stmt>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        else_body: Vec<Stmt>,
    },
}

impl PartialEq for Stmt {
    /// Structural equality; node ids are identity, not content.
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind
    }
}

impl Stmt {
    pub fn new(kind: StmtKind) -> Self {
        Self { id: NodeId::fresh(), kind, source: None }
    }

    pub fn with_source(mut self, source: Span) -> Self {
        self.source = Some(source);
        self
    }

    pub fn comment(text: impl Into<String>) -> Self {
        Self::new(StmtKind::Comment { text: text.into() })
    }

    /// Comments, comment blocks and free-standing pragmas.
    pub fn is_comment_like(&self) -> bool {
        matches!(
            self.kind,
            StmtKind::Comment { .. } | StmtKind::CommentBlock { .. } | StmtKind::Pragma(_)
        )
    }

    /// The pragma attached to this statement, if its kind carries one.
    pub fn attached_pragma(&self) -> Option<&Pragma> {
        match &self.kind {
            StmtKind::Assignment { pragma, .. }
            | StmtKind::Call { pragma, .. }
            | StmtKind::Loop { pragma, .. } => pragma.as_ref(),
            _ => None,
        }
    }

    /// A copy of this statement with the attached pragma slot replaced.
    pub fn with_pragma(mut self, new_pragma: Option<Pragma>) -> Self {
        match &mut self.kind {
            StmtKind::Assignment { pragma, .. }
            | StmtKind::Call { pragma, .. }
            | StmtKind::Loop { pragma, .. } => *pragma = new_pragma,
            _ => {}
        }
        self
    }
}

/// An ordered sequence of statements, the building block of procedure
/// spec and body parts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Section {
    pub body: Vec<Stmt>,
}

impl Section {
    pub fn new(body: Vec<Stmt>) -> Self {
        Self { body }
    }

    /// Append a statement at the end of the section.
    pub fn append(&mut self, stmt: Stmt) {
        self.body.push(stmt);
    }

    /// Insert a statement at the front of the section.
    pub fn prepend(&mut self, stmt: Stmt) {
        self.body.insert(0, stmt);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_ids_are_unique() {
        let a = Stmt::comment("! a");
        let b = Stmt::comment("! a");
        assert_ne!(a.id, b.id);
        // Structural equality ignores identity
        assert_eq!(a, b);
    }

    #[test]
    fn test_attached_pragma() {
        let p = Pragma::new("fortopt", "loop-fusion");
        let stmt = Stmt::new(StmtKind::Loop {
            variable: crate::expression::VarRef::integer("i"),
            bounds: crate::expression::LoopRange::new(Expr::int(1), Expr::int(10)),
            body: vec![],
            pragma: Some(p.clone()),
        });
        assert_eq!(stmt.attached_pragma(), Some(&p));
        let stripped = stmt.clone().with_pragma(None);
        assert_eq!(stripped.attached_pragma(), None);
        assert!(!stmt.is_comment_like());
    }

    #[test]
    fn test_serde_mints_new_ids() {
        let stmt = Stmt::comment("! note");
        let json = serde_json::to_string(&stmt).unwrap();
        assert!(!json.contains("\"id\""));
        let back: Stmt = serde_json::from_str(&json).unwrap();
        assert_eq!(back, stmt);
        assert_ne!(back.id, stmt.id);
    }
}
