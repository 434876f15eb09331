//! Hierarchical symbol tables.
//!
//! Scopes live in an arena ([`ScopeTree`]) and refer to their parent by
//! index, never the reverse: a parent scope holds no list of its children,
//! it only ever learns about a nested procedure through that procedure's
//! callable symbol being declared into it. Lookups walk the parent chain;
//! declarations only ever mutate the local table.
//!
//! All name handling is case-insensitive; keys are stored lower-cased.

use crate::expression::symbols::SymbolType;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Index of a scope inside a [`ScopeTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScopeId(pub usize);

impl fmt::Display for ScopeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "scope#{}", self.0)
    }
}

/// A single lexical scope: a symbol table plus an optional parent link.
#[derive(Debug, Default, Clone)]
pub struct Scope {
    symbols: HashMap<String, SymbolType>,
    parent: Option<ScopeId>,
}

/// Arena of scopes forming one or more scope trees.
#[derive(Debug, Default, Clone)]
pub struct ScopeTree {
    scopes: Vec<Scope>,
}

impl ScopeTree {
    /// Create an empty arena.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new scope, optionally chained to a parent.
    pub fn create(&mut self, parent: Option<ScopeId>) -> ScopeId {
        self.scopes.push(Scope { symbols: HashMap::new(), parent });
        ScopeId(self.scopes.len() - 1)
    }

    /// Declare (or redeclare) a name in the given scope's local table.
    pub fn declare(&mut self, scope: ScopeId, name: &str, ty: SymbolType) {
        self.scopes[scope.0].symbols.insert(name.to_lowercase(), ty);
    }

    /// Look up a name. With `recursive` the parent chain is walked; without
    /// it only the local table is consulted.
    pub fn lookup(&self, scope: ScopeId, name: &str, recursive: bool) -> Option<&SymbolType> {
        let key = name.to_lowercase();
        let mut current = Some(scope);
        while let Some(id) = current {
            if let Some(ty) = self.scopes[id.0].symbols.get(&key) {
                return Some(ty);
            }
            if !recursive {
                return None;
            }
            current = self.scopes[id.0].parent;
        }
        None
    }

    /// The parent of a scope, if any.
    pub fn parent(&self, scope: ScopeId) -> Option<ScopeId> {
        self.scopes[scope.0].parent
    }

    /// The scope itself followed by all its ancestors, innermost first.
    pub fn ancestry(&self, scope: ScopeId) -> Vec<ScopeId> {
        let mut out = Vec::new();
        let mut current = Some(scope);
        while let Some(id) = current {
            out.push(id);
            current = self.scopes[id.0].parent;
        }
        out
    }

    /// Number of scopes in the arena.
    pub fn len(&self) -> usize {
        self.scopes.len()
    }

    /// Whether the arena holds no scopes.
    pub fn is_empty(&self) -> bool {
        self.scopes.is_empty()
    }
}
