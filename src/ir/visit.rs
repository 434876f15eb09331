//! Tree traversal and rewriting utilities.
//!
//! Read-only walks are plain recursive functions; rewriting goes through
//! [`Transformer`], which carries a map from node ids to replacements and
//! applies it in a single pass. Replacements are spliced in verbatim and
//! not themselves revisited, so a replacement may safely contain the node
//! it replaces.

use crate::expression::symbols::{Expr, VarRef};
use crate::ir::{NodeId, Section, Stmt, StmtKind};
use std::collections::HashMap;

/// Collect all statements matching a predicate, pre-order.
pub fn find_nodes<'a>(body: &'a [Stmt], pred: &dyn Fn(&Stmt) -> bool) -> Vec<&'a Stmt> {
    let mut out = Vec::new();
    collect(body, pred, &mut out);
    out
}

fn collect<'a>(body: &'a [Stmt], pred: &dyn Fn(&Stmt) -> bool, out: &mut Vec<&'a Stmt>) {
    for stmt in body {
        if pred(stmt) {
            out.push(stmt);
        }
        match &stmt.kind {
            StmtKind::Loop { body, .. } | StmtKind::Interface { body } => {
                collect(body, pred, out);
            }
            StmtKind::Conditional { body, else_body, .. } => {
                collect(body, pred, out);
                collect(else_body, pred, out);
            }
            _ => {}
        }
    }
}

/// All loops in the tree, pre-order (outer before inner).
pub fn find_loops(body: &[Stmt]) -> Vec<&Stmt> {
    find_nodes(body, &|s| matches!(s.kind, StmtKind::Loop { .. }))
}

/// Visit every symbol reference in an expression, including parent chains,
/// subscript dimensions and shapes carried on the type.
pub fn for_each_var_in_expr(expr: &Expr, f: &mut dyn FnMut(&VarRef)) {
    match expr {
        Expr::Var(v) => for_each_var(v, f),
        Expr::Sum(parts) | Expr::Product(parts) | Expr::LogicalAnd(parts)
        | Expr::LogicalOr(parts) => {
            for p in parts {
                for_each_var_in_expr(p, f);
            }
        }
        Expr::Quotient { numerator, denominator } => {
            for_each_var_in_expr(numerator, f);
            for_each_var_in_expr(denominator, f);
        }
        Expr::Comparison { left, right, .. } => {
            for_each_var_in_expr(left, f);
            for_each_var_in_expr(right, f);
        }
        Expr::InlineCall { function, args } => {
            for_each_var(function, f);
            for p in args {
                for_each_var_in_expr(p, f);
            }
        }
        Expr::IntLiteral(_)
        | Expr::FloatLiteral(_)
        | Expr::LogicLiteral(_)
        | Expr::StringLiteral(_) => {}
    }
}

/// Visit a symbol reference and everything hanging off it.
pub fn for_each_var(var: &VarRef, f: &mut dyn FnMut(&VarRef)) {
    f(var);
    if let Some(parent) = &var.parent {
        for_each_var(parent, f);
    }
    if let Some(dims) = &var.dimensions {
        for d in dims {
            for_each_var_in_expr(d, f);
        }
    }
    if let Some(shape) = &var.ty.shape {
        for d in shape {
            for_each_var_in_expr(d, f);
        }
    }
    if let Some(kind) = &var.ty.kind {
        for_each_var_in_expr(kind, f);
    }
}

/// Visit every symbol reference in a statement subtree.
pub fn for_each_var_in_stmts(body: &[Stmt], f: &mut dyn FnMut(&VarRef)) {
    for stmt in body {
        match &stmt.kind {
            StmtKind::Declaration { variables }
            | StmtKind::Deallocation { variables } => {
                for v in variables {
                    for_each_var(v, f);
                }
            }
            StmtKind::Allocation { variables, data_source } => {
                for v in variables {
                    for_each_var(v, f);
                }
                if let Some(src) = data_source {
                    for_each_var(src, f);
                }
            }
            StmtKind::Import { symbols, .. } => {
                for v in symbols {
                    for_each_var(v, f);
                }
            }
            StmtKind::Assignment { target, value, .. } => {
                for_each_var_in_expr(target, f);
                for_each_var_in_expr(value, f);
            }
            StmtKind::Call { name, args, .. } => {
                for_each_var(name, f);
                for a in args {
                    for_each_var_in_expr(a, f);
                }
            }
            StmtKind::Loop { variable, bounds, body, .. } => {
                for_each_var(variable, f);
                for_each_var_in_expr(&bounds.start, f);
                for_each_var_in_expr(&bounds.stop, f);
                if let Some(step) = &bounds.step {
                    for_each_var_in_expr(step, f);
                }
                for_each_var_in_stmts(body, f);
            }
            StmtKind::Conditional { condition, body, else_body } => {
                for_each_var_in_expr(condition, f);
                for_each_var_in_stmts(body, f);
                for_each_var_in_stmts(else_body, f);
            }
            StmtKind::Interface { body } => for_each_var_in_stmts(body, f),
            StmtKind::Comment { .. }
            | StmtKind::CommentBlock { .. }
            | StmtKind::Pragma(_)
            | StmtKind::Intrinsic { .. } => {}
        }
    }
}

/// Rewrite symbol references bottom-up throughout a statement subtree.
///
/// The mapper sees each reference after its parent chain, dimensions and
/// type shape have already been rewritten; returning `None` keeps the
/// (rebuilt) reference as-is.
pub fn map_variables(body: &mut [Stmt], f: &dyn Fn(&VarRef) -> Option<VarRef>) {
    for stmt in body {
        map_variables_in_stmt(stmt, f);
    }
}

fn map_variables_in_stmt(stmt: &mut Stmt, f: &dyn Fn(&VarRef) -> Option<VarRef>) {
    match &mut stmt.kind {
        StmtKind::Declaration { variables } | StmtKind::Deallocation { variables } => {
            for v in variables {
                *v = map_var(v, f);
            }
        }
        StmtKind::Allocation { variables, data_source } => {
            for v in variables {
                *v = map_var(v, f);
            }
            if let Some(src) = data_source {
                *src = map_var(src, f);
            }
        }
        StmtKind::Import { symbols, .. } => {
            for v in symbols {
                *v = map_var(v, f);
            }
        }
        StmtKind::Assignment { target, value, .. } => {
            *target = map_expr(target, f);
            *value = map_expr(value, f);
        }
        StmtKind::Call { name, args, .. } => {
            *name = map_var(name, f);
            for a in args {
                *a = map_expr(a, f);
            }
        }
        StmtKind::Loop { variable, bounds, body, .. } => {
            *variable = map_var(variable, f);
            bounds.start = map_expr(&bounds.start, f);
            bounds.stop = map_expr(&bounds.stop, f);
            if let Some(step) = &mut bounds.step {
                *step = map_expr(step, f);
            }
            map_variables(body, f);
        }
        StmtKind::Conditional { condition, body, else_body } => {
            *condition = map_expr(condition, f);
            map_variables(body, f);
            map_variables(else_body, f);
        }
        StmtKind::Interface { body } => map_variables(body, f),
        StmtKind::Comment { .. }
        | StmtKind::CommentBlock { .. }
        | StmtKind::Pragma(_)
        | StmtKind::Intrinsic { .. } => {}
    }
}

/// Rewrite one symbol reference bottom-up.
pub fn map_var(var: &VarRef, f: &dyn Fn(&VarRef) -> Option<VarRef>) -> VarRef {
    let mut rebuilt = var.clone();
    if let Some(parent) = &var.parent {
        rebuilt.parent = Some(Box::new(map_var(parent, f)));
    }
    if let Some(dims) = &var.dimensions {
        rebuilt.dimensions = Some(dims.iter().map(|d| map_expr(d, f)).collect());
    }
    if let Some(shape) = &var.ty.shape {
        rebuilt.ty.shape = Some(shape.iter().map(|d| map_expr(d, f)).collect());
    }
    f(&rebuilt).unwrap_or(rebuilt)
}

/// Rewrite every symbol reference inside an expression.
pub fn map_expr(expr: &Expr, f: &dyn Fn(&VarRef) -> Option<VarRef>) -> Expr {
    match expr {
        Expr::Var(v) => Expr::Var(map_var(v, f)),
        Expr::Sum(parts) => Expr::Sum(parts.iter().map(|p| map_expr(p, f)).collect()),
        Expr::Product(parts) => Expr::Product(parts.iter().map(|p| map_expr(p, f)).collect()),
        Expr::LogicalAnd(parts) => {
            Expr::LogicalAnd(parts.iter().map(|p| map_expr(p, f)).collect())
        }
        Expr::LogicalOr(parts) => Expr::LogicalOr(parts.iter().map(|p| map_expr(p, f)).collect()),
        Expr::Quotient { numerator, denominator } => Expr::Quotient {
            numerator: Box::new(map_expr(numerator, f)),
            denominator: Box::new(map_expr(denominator, f)),
        },
        Expr::Comparison { left, op, right } => Expr::Comparison {
            left: Box::new(map_expr(left, f)),
            op: *op,
            right: Box::new(map_expr(right, f)),
        },
        Expr::InlineCall { function, args } => Expr::InlineCall {
            function: Box::new(map_var(function, f)),
            args: args.iter().map(|a| map_expr(a, f)).collect(),
        },
        _ => expr.clone(),
    }
}

/// How a mapped node is rewritten.
#[derive(Debug, Clone)]
pub enum Replacement {
    /// Delete the node.
    Remove,
    /// Splice these statements in its place.
    With(Vec<Stmt>),
}

/// A single-pass tree rewriter keyed on node identity.
#[derive(Debug, Default)]
pub struct Transformer {
    map: HashMap<NodeId, Replacement>,
}

impl Transformer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule a node for removal.
    pub fn remove(&mut self, id: NodeId) {
        self.map.insert(id, Replacement::Remove);
    }

    /// Schedule a node for replacement by the given statements.
    pub fn replace(&mut self, id: NodeId, with: Vec<Stmt>) {
        self.map.insert(id, Replacement::With(with));
    }

    /// Whether any rewrites are scheduled.
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Apply all scheduled rewrites to a section.
    pub fn apply(&self, section: &mut Section) {
        section.body = self.apply_body(std::mem::take(&mut section.body));
    }

    fn apply_body(&self, body: Vec<Stmt>) -> Vec<Stmt> {
        let mut out = Vec::with_capacity(body.len());
        for mut stmt in body {
            match self.map.get(&stmt.id) {
                Some(Replacement::Remove) => {}
                Some(Replacement::With(stmts)) => {
                    // Spliced statements are taken verbatim, not revisited
                    out.extend(stmts.iter().cloned());
                }
                None => {
                    match &mut stmt.kind {
                        StmtKind::Loop { body, .. } | StmtKind::Interface { body } => {
                            *body = self.apply_body(std::mem::take(body));
                        }
                        StmtKind::Conditional { body, else_body, .. } => {
                            *body = self.apply_body(std::mem::take(body));
                            *else_body = self.apply_body(std::mem::take(else_body));
                        }
                        _ => {}
                    }
                    out.push(stmt);
                }
            }
        }
        out
    }
}

/// Deep-copy a statement list, minting fresh node ids throughout.
pub fn clone_with_fresh_ids(body: &[Stmt]) -> Vec<Stmt> {
    body.iter()
        .map(|stmt| {
            let mut copy = stmt.clone();
            copy.id = NodeId::fresh();
            match &mut copy.kind {
                StmtKind::Loop { body, .. } | StmtKind::Interface { body } => {
                    *body = clone_with_fresh_ids(body);
                }
                StmtKind::Conditional { body, else_body, .. } => {
                    *body = clone_with_fresh_ids(body);
                    *else_body = clone_with_fresh_ids(else_body);
                }
                _ => {}
            }
            copy
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expression::symbols::{Expr, LoopRange, VarRef};

    fn assign(name: &str) -> Stmt {
        Stmt::new(StmtKind::Assignment {
            target: Expr::var(name),
            value: Expr::int(0),
            pragma: None,
        })
    }

    fn simple_loop(var: &str, body: Vec<Stmt>) -> Stmt {
        Stmt::new(StmtKind::Loop {
            variable: VarRef::integer(var),
            bounds: LoopRange::new(Expr::int(1), Expr::int(10)),
            body,
            pragma: None,
        })
    }

    #[test]
    fn test_find_loops_preorder() {
        let inner = simple_loop("j", vec![assign("a")]);
        let outer = simple_loop("i", vec![inner]);
        let body = vec![outer];
        let loops = find_loops(&body);
        assert_eq!(loops.len(), 2);
        assert!(matches!(&loops[0].kind, StmtKind::Loop { variable, .. } if variable.name == "i"));
        assert!(matches!(&loops[1].kind, StmtKind::Loop { variable, .. } if variable.name == "j"));
    }

    #[test]
    fn test_transformer_remove_and_replace() {
        let keep = assign("a");
        let drop = assign("b");
        let swap = assign("c");
        let drop_id = drop.id;
        let swap_id = swap.id;

        let mut section = Section::new(vec![keep, drop, swap]);
        let mut mapper = Transformer::new();
        mapper.remove(drop_id);
        mapper.replace(swap_id, vec![assign("x"), assign("y")]);
        mapper.apply(&mut section);

        assert_eq!(section.body.len(), 3);
        assert_eq!(section.body[1], assign("x"));
        assert_eq!(section.body[2], assign("y"));
    }

    #[test]
    fn test_transformer_does_not_recurse_into_replacements() {
        // Replace a loop with a copy of itself; the copy must survive.
        let looped = simple_loop("i", vec![assign("a")]);
        let id = looped.id;
        let mut section = Section::new(vec![looped.clone()]);
        let mut mapper = Transformer::new();
        mapper.replace(id, vec![looped.clone()]);
        mapper.apply(&mut section);
        assert_eq!(section.body, vec![looped]);
    }

    #[test]
    fn test_map_variables_substitution() {
        let mut body = vec![simple_loop("i", vec![assign("a")])];
        map_variables(&mut body, &|v| {
            if v.name_lower() == "a" {
                Some(VarRef::integer("b"))
            } else {
                None
            }
        });
        match &body[0].kind {
            StmtKind::Loop { body, .. } => match &body[0].kind {
                StmtKind::Assignment { target, .. } => {
                    assert_eq!(*target, Expr::Var(VarRef::integer("b")));
                }
                other => panic!("unexpected kind: {:?}", other),
            },
            other => panic!("unexpected kind: {:?}", other),
        }
    }

    #[test]
    fn test_clone_with_fresh_ids() {
        let original = vec![simple_loop("i", vec![assign("a")])];
        let copy = clone_with_fresh_ids(&original);
        assert_eq!(copy, original);
        assert_ne!(copy[0].id, original[0].id);
    }
}
