//! Procedures: the unit of transformation.
//!
//! A [`Procedure`] owns a documentation header, a specification part
//! (imports and declarations), an executable body and any contained
//! member procedures. It does not own its symbol table; it holds a
//! [`ScopeId`] into the shared [`ScopeTree`], and its members' scopes
//! chain to it through the arena.

use crate::expression::symbols::{DataType, SymbolType, VarRef};
use crate::ir::visit::{clone_with_fresh_ids, find_nodes, map_variables};
use crate::ir::{Section, Stmt, StmtKind};
use crate::scope::{ScopeId, ScopeTree};
use crate::utils::location::Span;
use log::{debug, warn};
use std::collections::HashMap;

/// A subroutine or function.
#[derive(Debug, Clone)]
pub struct Procedure {
    /// Procedure name as written in the source.
    pub name: String,
    /// Dummy-argument names in declaration order, lower-cased.
    pub dummies: Vec<String>,
    /// Leading comment block, kept verbatim.
    pub docstring: Vec<Stmt>,
    /// Specification part: imports, interfaces, declarations.
    pub spec: Section,
    /// Executable part.
    pub body: Section,
    /// Contained member procedures.
    pub members: Vec<Procedure>,
    /// Whether this procedure returns a value.
    pub is_function: bool,
    /// The scope all names inside this procedure resolve in.
    pub scope: ScopeId,
    /// Source extent, when the frontend provided one.
    pub source: Option<Span>,
}

impl Procedure {
    /// Create an empty procedure with its own scope chained under
    /// `parent`, and register its name as a callable in the parent scope
    /// so sibling and parent code can resolve calls to it.
    pub fn new(
        name: impl Into<String>,
        is_function: bool,
        scopes: &mut ScopeTree,
        parent: Option<ScopeId>,
    ) -> Self {
        let name = name.into();
        let scope = scopes.create(parent);
        if let Some(parent) = parent {
            scopes.declare(parent, &name, SymbolType::procedure(is_function));
        }
        Self {
            name,
            dummies: Vec::new(),
            docstring: Vec::new(),
            spec: Section::default(),
            body: Section::default(),
            members: Vec::new(),
            is_function,
            scope,
            source: None,
        }
    }

    /// All variables declared in the specification part, in order.
    pub fn variables(&self) -> Vec<VarRef> {
        let mut out = Vec::new();
        for stmt in &self.spec.body {
            if let StmtKind::Declaration { variables } = &stmt.kind {
                out.extend(variables.iter().cloned());
            }
        }
        out
    }

    /// Declared variables keyed by lower-cased name.
    pub fn variable_map(&self) -> HashMap<String, VarRef> {
        self.variables().into_iter().map(|v| (v.name_lower(), v)).collect()
    }

    /// Replace the declared variables.
    ///
    /// Existing declarations are rewritten in place to the updated
    /// references, entries removed from the list are dropped (emptied
    /// declarations disappear), and genuinely new variables get a fresh
    /// declaration appended to the spec. The scope table is updated to
    /// match.
    pub fn set_variables(&mut self, variables: Vec<VarRef>, scopes: &mut ScopeTree) {
        let mut updated: HashMap<String, VarRef> =
            variables.iter().map(|v| (v.name_lower(), v.clone())).collect();
        for v in &variables {
            scopes.declare(self.scope, &v.name, v.ty.clone());
        }

        let mut seen: Vec<String> = Vec::new();
        let mut new_body = Vec::with_capacity(self.spec.body.len());
        for stmt in std::mem::take(&mut self.spec.body) {
            if let StmtKind::Declaration { variables: declared } = &stmt.kind {
                let kept: Vec<VarRef> = declared
                    .iter()
                    .filter_map(|v| {
                        let key = v.name_lower();
                        updated.get(&key).cloned().map(|v| {
                            seen.push(key);
                            v
                        })
                    })
                    .collect();
                if kept.is_empty() {
                    continue;
                }
                new_body.push(Stmt::new(StmtKind::Declaration { variables: kept }));
            } else {
                new_body.push(stmt);
            }
        }
        for key in &seen {
            updated.remove(key);
        }
        for v in &variables {
            if updated.remove(&v.name_lower()).is_some() {
                new_body.push(Stmt::new(StmtKind::Declaration { variables: vec![v.clone()] }));
            }
        }
        self.spec.body = new_body;

        // Dummies whose declaration went away leave the argument list too.
        let names: Vec<String> = variables.iter().map(|v| v.name_lower()).collect();
        self.dummies.retain(|d| names.contains(d));
    }

    /// Dummy-argument references, in argument order. Arguments without a
    /// matching declaration are silently skipped.
    pub fn arguments(&self) -> Vec<VarRef> {
        let map = self.variable_map();
        self.dummies.iter().filter_map(|name| map.get(name).cloned()).collect()
    }

    /// Replace the dummy-argument list. Arguments not yet declared get a
    /// declaration appended.
    pub fn set_arguments(&mut self, arguments: Vec<VarRef>, scopes: &mut ScopeTree) {
        let declared = self.variable_map();
        for arg in &arguments {
            scopes.declare(self.scope, &arg.name, arg.ty.clone());
            if !declared.contains_key(&arg.name_lower()) {
                self.spec
                    .body
                    .push(Stmt::new(StmtKind::Declaration { variables: vec![arg.clone()] }));
            }
        }
        self.dummies = arguments.iter().map(|a| a.name_lower()).collect();
    }

    /// Dummy-argument names, lower-cased, in order.
    pub fn argnames(&self) -> Vec<String> {
        self.dummies.clone()
    }

    /// Symbols brought into scope by imports in the spec.
    pub fn imported_symbols(&self) -> Vec<VarRef> {
        let mut out = Vec::new();
        for stmt in &self.spec.body {
            if let StmtKind::Import { symbols, .. } = &stmt.kind {
                out.extend(symbols.iter().cloned());
            }
        }
        out
    }

    /// Imported symbols keyed by lower-cased name.
    pub fn imported_symbol_map(&self) -> HashMap<String, VarRef> {
        self.imported_symbols().into_iter().map(|v| (v.name_lower(), v)).collect()
    }

    /// Contained member procedures.
    pub fn members(&self) -> &[Procedure] {
        &self.members
    }

    /// Replace the member procedures.
    pub fn set_members(&mut self, members: Vec<Procedure>) {
        self.members = members;
    }

    /// Populate this procedure's symbol table from its specification
    /// part. Must run before member procedures are built so they can
    /// resolve symbols of the enclosing scope.
    pub fn register_spec_symbols(&self, scopes: &mut ScopeTree) {
        for stmt in &self.spec.body {
            match &stmt.kind {
                StmtKind::Declaration { variables } => {
                    for v in variables {
                        scopes.declare(self.scope, &v.name, v.ty.clone());
                    }
                }
                StmtKind::Import { symbols, .. } => {
                    for v in symbols {
                        scopes.declare(self.scope, &v.name, v.ty.clone());
                    }
                }
                _ => {}
            }
        }
    }

    /// Attach every symbol reference in the spec and body to the scope it
    /// resolves in, walking the ancestor chain from the local scope
    /// outwards. References already bound to a scope within the ancestor
    /// chain are respected, so inlined code keeps deliberate bindings,
    /// except when a local declaration shadows the name: the local
    /// binding always wins inside this procedure.
    /// A deferred carried type is replaced by the declared one; a carried
    /// type that disagrees with the declaration is replaced too, with a
    /// warning. References that resolve nowhere are bound to the local
    /// scope unchanged.
    ///
    /// Idempotent: a second invocation leaves the tree untouched.
    pub fn rescope_variables(&mut self, scopes: &mut ScopeTree) {
        self.register_spec_symbols(scopes);
        let own_scope = self.scope;
        let ancestors = scopes.ancestry(own_scope);
        let routine = self.name.clone();

        let rescope = |v: &VarRef| -> Option<VarRef> {
            if let Some(s) = v.scope {
                if s == own_scope {
                    return None;
                }
                // An ancestor binding stands unless a local declaration
                // shadows the name.
                if ancestors.contains(&s) && scopes.lookup(own_scope, &v.name, false).is_none() {
                    return None;
                }
            }
            for &ancestor in &ancestors {
                if let Some(declared) = scopes.lookup(ancestor, &v.name, false) {
                    let mut rebound = v.clone().with_scope(ancestor);
                    if v.ty.dtype == DataType::Deferred {
                        rebound.ty = declared.clone();
                    } else if !declared.compare(&v.ty) {
                        warn!(
                            "[{}] type mismatch for `{}`: declared {:?}, carried {:?}",
                            routine, v.name, declared.dtype, v.ty.dtype
                        );
                        rebound.ty = declared.clone();
                    }
                    return Some(rebound);
                }
            }
            debug!("[{}] `{}` resolves nowhere, binding locally", routine, v.name);
            Some(v.clone().with_scope(own_scope))
        };

        map_variables(&mut self.spec.body, &rescope);
        map_variables(&mut self.body.body, &rescope);
    }

    /// Infer deferred shapes of allocatables from the allocations in the
    /// body, and propagate the inferred shape to the declaration, every
    /// use and the symbol table. When a variable is allocated more than
    /// once, the last allocation wins.
    pub fn infer_allocatable_shapes(&mut self, scopes: &mut ScopeTree) {
        let mut alloc_map: HashMap<String, Vec<crate::expression::Expr>> = HashMap::new();
        let allocations = find_nodes(&self.body.body, &|s| {
            matches!(s.kind, StmtKind::Allocation { .. })
        });
        for stmt in allocations {
            if let StmtKind::Allocation { variables, data_source } = &stmt.kind {
                let source_shape = data_source.as_ref().and_then(|src| {
                    src.ty.shape.clone().or_else(|| {
                        src.scope
                            .and_then(|s| scopes.lookup(s, &src.name, true))
                            .and_then(|ty| ty.shape.clone())
                    })
                });
                for v in variables {
                    let shape = source_shape.clone().or_else(|| v.dimensions.clone());
                    if let Some(shape) = shape {
                        alloc_map.insert(v.name_lower(), shape);
                    }
                }
            }
        }
        if alloc_map.is_empty() {
            return;
        }

        let apply = |v: &VarRef| -> Option<VarRef> {
            let shape = alloc_map.get(&v.name_lower())?;
            if v.ty.shape.as_ref() == Some(shape) {
                return None;
            }
            let mut updated = v.clone();
            updated.ty.shape = Some(shape.clone());
            Some(updated)
        };
        map_variables(&mut self.spec.body, &apply);
        map_variables(&mut self.body.body, &apply);

        for v in self.variables() {
            if alloc_map.contains_key(&v.name_lower()) {
                scopes.declare(self.scope, &v.name, v.ty.clone());
            }
        }
    }

    /// Deep-copy this procedure (and its members) into a new scope
    /// chained under `parent`, with fresh node ids throughout, and
    /// resolve all references against the new scope chain.
    pub fn clone_into(&self, scopes: &mut ScopeTree, parent: Option<ScopeId>) -> Procedure {
        let mut copy = Procedure::new(self.name.clone(), self.is_function, scopes, parent);
        copy.dummies = self.dummies.clone();
        copy.docstring = clone_with_fresh_ids(&self.docstring);
        copy.spec = Section::new(clone_with_fresh_ids(&self.spec.body));
        copy.body = Section::new(clone_with_fresh_ids(&self.body.body));
        copy.source = self.source;
        copy.register_spec_symbols(scopes);
        copy.members =
            self.members.iter().map(|m| m.clone_into(scopes, Some(copy.scope))).collect();
        copy.rescope_variables(scopes);
        copy
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expression::symbols::{Expr, Intent};
    use crate::ir::visit::for_each_var_in_stmts;

    fn real_array(name: &str, dim: &str) -> VarRef {
        VarRef::new(
            name,
            SymbolType::new(DataType::Real).with_shape(vec![Expr::var(dim)]),
        )
    }

    #[test]
    fn test_arguments_follow_dummy_order() {
        let mut scopes = ScopeTree::new();
        let mut routine = Procedure::new("saxpy", false, &mut scopes, None);
        routine.spec.body.push(Stmt::new(StmtKind::Declaration {
            variables: vec![
                VarRef::new("n", SymbolType::new(DataType::Integer).with_intent(Intent::In)),
                real_array("x", "n"),
                real_array("y", "n"),
            ],
        }));
        routine.dummies = vec!["n".into(), "x".into(), "y".into()];

        let args = routine.arguments();
        assert_eq!(args.len(), 3);
        assert_eq!(args[0].name, "n");
        assert_eq!(routine.argnames(), vec!["n", "x", "y"]);
    }

    #[test]
    fn test_set_variables_drops_and_appends() {
        let mut scopes = ScopeTree::new();
        let mut routine = Procedure::new("work", false, &mut scopes, None);
        routine.spec.body.push(Stmt::new(StmtKind::Declaration {
            variables: vec![VarRef::integer("i"), VarRef::integer("j")],
        }));

        // Drop j, keep i, add tmp
        routine.set_variables(vec![VarRef::integer("i"), VarRef::integer("tmp")], &mut scopes);
        let names: Vec<String> = routine.variables().iter().map(|v| v.name_lower()).collect();
        assert_eq!(names, vec!["i", "tmp"]);
        assert!(scopes.lookup(routine.scope, "tmp", false).is_some());
    }

    #[test]
    fn test_rescope_binds_locals_and_parents() {
        let mut scopes = ScopeTree::new();
        let mut outer = Procedure::new("outer", false, &mut scopes, None);
        outer.spec.body.push(Stmt::new(StmtKind::Declaration {
            variables: vec![VarRef::integer("n")],
        }));
        outer.register_spec_symbols(&mut scopes);

        let mut inner = Procedure::new("inner", false, &mut scopes, Some(outer.scope));
        inner.spec.body.push(Stmt::new(StmtKind::Declaration {
            variables: vec![VarRef::integer("i")],
        }));
        // `n` is only declared in the parent
        inner.body.body.push(Stmt::new(StmtKind::Assignment {
            target: Expr::var("i"),
            value: Expr::var("n"),
            pragma: None,
        }));
        inner.rescope_variables(&mut scopes);

        let mut seen = HashMap::new();
        for_each_var_in_stmts(&inner.body.body, &mut |v: &VarRef| {
            seen.insert(v.name_lower(), v.scope);
        });
        assert_eq!(seen["i"], Some(inner.scope));
        assert_eq!(seen["n"], Some(outer.scope));

        // Idempotence
        let before = inner.body.clone();
        inner.rescope_variables(&mut scopes);
        assert_eq!(inner.body, before);
    }

    #[test]
    fn test_local_shadow_rebinds_parent_bound_reference() {
        let mut scopes = ScopeTree::new();
        let mut outer = Procedure::new("outer", false, &mut scopes, None);
        outer.spec.body.push(Stmt::new(StmtKind::Declaration {
            variables: vec![VarRef::new("x", SymbolType::new(DataType::Real))],
        }));
        outer.register_spec_symbols(&mut scopes);

        let mut inner = Procedure::new("inner", false, &mut scopes, Some(outer.scope));
        inner.spec.body.push(Stmt::new(StmtKind::Declaration {
            variables: vec![VarRef::integer("x")],
        }));
        // A reference carried in already bound to the parent scope, as
        // inlined code would bring along.
        inner.body.body.push(Stmt::new(StmtKind::Assignment {
            target: Expr::Var(
                VarRef::new("x", SymbolType::new(DataType::Real)).with_scope(outer.scope),
            ),
            value: Expr::int(0),
            pragma: None,
        }));
        inner.rescope_variables(&mut scopes);

        // The local declaration shadows the parent one, so the reference
        // rebinds to the inner scope and adopts the declared type.
        let mut seen = Vec::new();
        for_each_var_in_stmts(&inner.body.body, &mut |v: &VarRef| {
            if v.name_eq("x") {
                seen.push((v.scope, v.ty.dtype.clone()));
            }
        });
        assert_eq!(seen, vec![(Some(inner.scope), DataType::Integer)]);
    }

    #[test]
    fn test_infer_allocatable_shape() {
        let mut scopes = ScopeTree::new();
        let mut routine = Procedure::new("alloc", false, &mut scopes, None);
        let x = VarRef::new("x", SymbolType::new(DataType::Real).with_allocatable());
        routine.spec.body.push(Stmt::new(StmtKind::Declaration { variables: vec![x.clone()] }));
        routine.body.body.push(Stmt::new(StmtKind::Allocation {
            variables: vec![x.with_dimensions(vec![Expr::var("n")])],
            data_source: None,
        }));
        routine.infer_allocatable_shapes(&mut scopes);

        let declared = &routine.variables()[0];
        assert_eq!(declared.ty.shape, Some(vec![Expr::var("n")]));
        assert!(declared.ty.allocatable);
        let stored = scopes.lookup(routine.scope, "x", false).unwrap();
        assert_eq!(stored.shape, Some(vec![Expr::var("n")]));
    }

    #[test]
    fn test_clone_into_fresh_scope() {
        let mut scopes = ScopeTree::new();
        let mut routine = Procedure::new("kernel", false, &mut scopes, None);
        routine.spec.body.push(Stmt::new(StmtKind::Declaration {
            variables: vec![VarRef::integer("i")],
        }));
        routine.body.body.push(Stmt::new(StmtKind::Assignment {
            target: Expr::var("i"),
            value: Expr::int(0),
            pragma: None,
        }));
        routine.rescope_variables(&mut scopes);

        let copy = routine.clone_into(&mut scopes, None);
        assert_ne!(copy.scope, routine.scope);
        assert_eq!(copy.body.body.len(), routine.body.body.len());
        let mut seen = Vec::new();
        for_each_var_in_stmts(&copy.body.body, &mut |v: &VarRef| seen.push(v.scope));
        assert!(seen.iter().all(|s| *s == Some(copy.scope)));
    }
}
