//! Directive-driven loop fusion.
//!
//! Loops annotated `!$fortopt loop-fusion [group(g)] [collapse(n)]
//! [range(a:b,...)]` are merged per group into a single nest iterating
//! the union of the member iteration spaces. Members whose own range is
//! narrower than the fused range get their body wrapped in a guard, so
//! fusion never changes which iterations execute.
//!
//! A failing group is skipped with a warning and the remaining groups
//! are still applied; the first failure is reported after the pass.

use crate::expression::algebra::{definitely_equal, symbolic_cmp};
use crate::expression::parser::parse_expression;
use crate::expression::symbols::{ComparisonOp, Expr, LoopRange, VarRef};
use crate::ir::visit::{find_loops, for_each_var_in_expr, map_variables, Transformer};
use crate::ir::{NodeId, Stmt, StmtKind};
use crate::polyhedral::Polyhedron;
use crate::pragma::{is_tool_pragma, pragma_parameters};
use crate::procedure::Procedure;
use crate::scope::ScopeId;
use crate::utils::errors::TransformError;
use log::{info, warn};
use std::cmp::Ordering;
use std::collections::HashMap;

const DIRECTIVE: &str = "loop-fusion";

/// Fuse all annotated loop groups in a procedure body.
pub fn loop_fusion(routine: &mut Procedure) -> Result<(), TransformError> {
    let annotated: Vec<Stmt> = find_loops(&routine.body.body)
        .into_iter()
        .filter(|s| s.attached_pragma().map_or(false, |p| is_tool_pragma(p, DIRECTIVE)))
        .cloned()
        .collect();
    if annotated.is_empty() {
        return Ok(());
    }

    // Group membership in first-appearance order.
    let mut groups: Vec<(String, Vec<Stmt>)> = Vec::new();
    for stmt in annotated {
        let pragma = stmt.attached_pragma().cloned().unwrap_or_else(|| unreachable!());
        let params = pragma_parameters(&pragma, DIRECTIVE);
        let name = match params.get("group") {
            Some(g) if !g.is_empty() => g.clone(),
            _ => "default".to_string(),
        };
        match groups.iter_mut().find(|(g, _)| *g == name) {
            Some((_, members)) => members.push(stmt),
            None => groups.push((name, vec![stmt])),
        }
    }

    let mut mapper = Transformer::new();
    let mut first_error: Option<TransformError> = None;
    let mut fused = 0usize;
    for (name, members) in &groups {
        match fuse_group(name, members, routine.scope) {
            Ok((first, rest, replacement)) => {
                mapper.replace(first, replacement);
                for id in rest {
                    mapper.remove(id);
                }
                fused += 1;
            }
            Err(err) => {
                warn!("[{}] skipping fusion group \"{}\": {}", routine.name, name, err);
                first_error.get_or_insert(err);
            }
        }
    }
    mapper.apply(&mut routine.body);
    info!("[{}] fused {} of {} loop group(s)", routine.name, fused, groups.len());

    match first_error {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

/// One member of a fusion group, reduced to its perfect nest.
struct Nest {
    id: NodeId,
    variables: Vec<VarRef>,
    ranges: Vec<LoopRange>,
    body: Vec<Stmt>,
}

fn fuse_group(
    name: &str,
    members: &[Stmt],
    scope: ScopeId,
) -> Result<(NodeId, Vec<NodeId>, Vec<Stmt>), TransformError> {
    let conflict = |message: String| TransformError::ConflictingDirective {
        group: name.to_string(),
        message,
    };

    // All members must agree on their collapse depth and explicit range.
    let mut collapse_values: Vec<Option<String>> = Vec::new();
    let mut range_values: Vec<String> = Vec::new();
    for stmt in members {
        let pragma = stmt.attached_pragma().cloned().unwrap_or_else(|| unreachable!());
        let params = pragma_parameters(&pragma, DIRECTIVE);
        let collapse = params.get("collapse").cloned();
        if !collapse_values.contains(&collapse) {
            collapse_values.push(collapse);
        }
        if let Some(range) = params.get("range") {
            if !range_values.contains(range) {
                range_values.push(range.clone());
            }
        }
    }
    if collapse_values.len() > 1 {
        return Err(conflict(format!(
            "members disagree on collapse depth ({:?})",
            collapse_values
        )));
    }
    if range_values.len() > 1 {
        return Err(conflict(format!("members disagree on range ({:?})", range_values)));
    }
    let depth = match collapse_values.pop().flatten() {
        Some(raw) => raw.parse::<usize>().map_err(|_| {
            TransformError::MalformedPragma(format!("invalid collapse depth `{}`", raw))
        })?,
        None => 1,
    };
    if depth == 0 {
        return Err(TransformError::MalformedPragma("collapse depth must be positive".into()));
    }

    let nests: Vec<Nest> =
        members.iter().map(|s| extract_nest(s, depth)).collect::<Result<_, _>>()?;

    // The fused iteration space per level, either dictated by an
    // explicit range or the union of the member spaces.
    let fused_ranges = match range_values.pop() {
        Some(raw) => parse_ranges(name, &raw, depth, scope)?,
        None => union_ranges(&nests, depth, scope)?,
    };
    let fusion_variables: Vec<VarRef> = nests[0].variables.clone();

    let mut fused_body: Vec<Stmt> = Vec::new();
    for (index, nest) in nests.iter().enumerate() {
        let mut stmts = nest.body.clone();

        let mut conditions = Vec::new();
        for level in 0..depth {
            let range = &nest.ranges[level];
            let fvar = Expr::Var(fusion_variables[level].clone());
            if !definitely_equal(&range.start, &fused_ranges[level].start) {
                conditions.push(Expr::comparison(fvar.clone(), ComparisonOp::Ge, range.start.clone()));
            }
            if !definitely_equal(&range.stop, &fused_ranges[level].stop) {
                conditions.push(Expr::comparison(fvar, ComparisonOp::Le, range.stop.clone()));
            }
        }
        if !conditions.is_empty() {
            let condition = if conditions.len() == 1 {
                conditions.pop().unwrap()
            } else {
                Expr::LogicalAnd(conditions)
            };
            stmts = vec![Stmt::new(StmtKind::Conditional {
                condition,
                body: stmts,
                else_body: vec![],
            })];
        }

        // Rename this member's loop variables to the fused ones,
        // including inside the guard bounds.
        let rename: HashMap<String, VarRef> = nest
            .variables
            .iter()
            .zip(&fusion_variables)
            .filter(|(own, fused)| own.name_lower() != fused.name_lower())
            .map(|(own, fused)| (own.name_lower(), fused.clone()))
            .collect();
        if !rename.is_empty() {
            map_variables(&mut stmts, &|v| rename.get(&v.name_lower()).cloned());
        }

        fused_body.push(Stmt::comment(format!("! fortopt loop-fusion - body {} begin", index)));
        fused_body.extend(stmts);
        fused_body.push(Stmt::comment(format!("! fortopt loop-fusion - body {} end", index)));
    }

    let mut nest_stmt = fused_body;
    for level in (0..depth).rev() {
        nest_stmt = vec![Stmt::new(StmtKind::Loop {
            variable: fusion_variables[level].clone(),
            bounds: fused_ranges[level].clone(),
            body: nest_stmt,
            pragma: None,
        })];
    }

    let mut replacement = vec![Stmt::comment(format!("! fortopt loop-fusion group({})", name))];
    replacement.extend(nest_stmt);
    let rest = nests[1..].iter().map(|n| n.id).collect();
    Ok((nests[0].id, rest, replacement))
}

/// Reduce a member to the perfect nest of the requested depth. Below the
/// annotated loop, every level must hold exactly one loop; comments may
/// sit alongside it, anything else makes the nest imperfect.
fn extract_nest(stmt: &Stmt, depth: usize) -> Result<Nest, TransformError> {
    let (variable, bounds, mut body) = match &stmt.kind {
        StmtKind::Loop { variable, bounds, body, .. } => (variable, bounds, body.clone()),
        _ => unreachable!("fusion members are loops"),
    };
    let mut variables = vec![variable.clone()];
    let mut ranges = vec![bounds.clone()];
    for level in 1..depth {
        let inner: Vec<&Stmt> = body
            .iter()
            .filter(|s| matches!(s.kind, StmtKind::Loop { .. }))
            .collect();
        if inner.len() != 1 || body.iter().any(|s| !s.is_comment_like() && !matches!(s.kind, StmtKind::Loop { .. })) {
            return Err(TransformError::UnsupportedLoopShape(format!(
                "no perfect nest of depth {} below loop over `{}` (level {})",
                depth, variables[0].name, level
            )));
        }
        match &inner[0].kind {
            StmtKind::Loop { variable, bounds, body: inner_body, .. } => {
                variables.push(variable.clone());
                ranges.push(bounds.clone());
                body = inner_body.clone();
            }
            _ => unreachable!(),
        }
    }
    Ok(Nest { id: stmt.id, variables, ranges, body })
}

/// Parse an explicit `range(a:b,c:d)` clause, one range per level.
fn parse_ranges(
    group: &str,
    raw: &str,
    depth: usize,
    scope: ScopeId,
) -> Result<Vec<LoopRange>, TransformError> {
    let parts: Vec<&str> = raw.split(',').map(str::trim).collect();
    if parts.len() != depth {
        return Err(TransformError::ConflictingDirective {
            group: group.to_string(),
            message: format!(
                "range clause has {} dimension(s), collapse depth is {}",
                parts.len(),
                depth
            ),
        });
    }
    let mut ranges = Vec::with_capacity(depth);
    for part in parts {
        let (start, stop) = part.split_once(':').ok_or_else(|| {
            TransformError::MalformedPragma(format!("range dimension `{}` lacks a `:`", part))
        })?;
        ranges.push(LoopRange::new(
            parse_expression(start, Some(scope))?,
            parse_expression(stop, Some(scope))?,
        ));
    }
    Ok(ranges)
}

/// Compute the per-level union of the member iteration spaces.
///
/// Each member nest is lifted to its polyhedron, which validates unit
/// steps and affine bounds and yields the per-level bound expressions.
/// Bounds that still mention a loop variable of the nest are not usable
/// as fused bounds. Incomparable candidates are kept and wrapped in
/// `min`/`max` at the end.
fn union_ranges(
    nests: &[Nest],
    depth: usize,
    scope: ScopeId,
) -> Result<Vec<LoopRange>, TransformError> {
    let mut lowers: Vec<Vec<Expr>> = vec![Vec::new(); depth];
    let mut uppers: Vec<Vec<Expr>> = vec![Vec::new(); depth];

    for nest in nests {
        let polyhedron = Polyhedron::from_loop_ranges(&nest.variables, &nest.ranges)?;
        let loop_names: Vec<String> = nest.variables.iter().map(|v| v.name_lower()).collect();
        for level in 0..depth {
            let usable = |exprs: Vec<Expr>| -> Vec<Expr> {
                exprs.into_iter().filter(|e| !mentions_any(e, &loop_names)).collect()
            };
            let nest_lowers = usable(polyhedron.lower_bounds(level));
            let nest_uppers = usable(polyhedron.upper_bounds(level));
            if nest_lowers.is_empty() || nest_uppers.is_empty() {
                return Err(TransformError::UnsupportedLoopShape(format!(
                    "bounds of loop over `{}` depend on other loop variables",
                    nest.variables[level].name
                )));
            }
            for bound in nest_lowers {
                merge_bound(&mut lowers[level], bound, true);
            }
            for bound in nest_uppers {
                merge_bound(&mut uppers[level], bound, false);
            }
        }
    }

    Ok((0..depth)
        .map(|level| {
            LoopRange::new(
                wrap_bounds(lowers[level].clone(), "min", scope),
                wrap_bounds(uppers[level].clone(), "max", scope),
            )
        })
        .collect())
}

/// Whether an expression references any of the given variable names.
fn mentions_any(expr: &Expr, names: &[String]) -> bool {
    let mut found = false;
    for_each_var_in_expr(expr, &mut |v: &VarRef| {
        if names.contains(&v.name_lower()) {
            found = true;
        }
    });
    found
}

/// Insert a candidate into an antichain of bounds. With `keep_smaller`
/// the set retains the candidates for the minimum (lower bounds),
/// otherwise for the maximum (upper bounds); incomparable candidates
/// coexist.
fn merge_bound(candidates: &mut Vec<Expr>, bound: Expr, keep_smaller: bool) {
    for existing in candidates.iter() {
        match symbolic_cmp(existing, &bound) {
            Some(Ordering::Equal) => return,
            Some(Ordering::Less) if keep_smaller => return,
            Some(Ordering::Greater) if !keep_smaller => return,
            _ => {}
        }
    }
    candidates.retain(|existing| match symbolic_cmp(existing, &bound) {
        Some(Ordering::Greater) => !keep_smaller,
        Some(Ordering::Less) => keep_smaller,
        _ => true,
    });
    candidates.push(bound);
}

/// A single candidate stands alone; several incomparable candidates are
/// wrapped in an intrinsic `min`/`max` call.
fn wrap_bounds(mut candidates: Vec<Expr>, function: &str, scope: ScopeId) -> Expr {
    if candidates.len() == 1 {
        candidates.pop().unwrap()
    } else {
        Expr::InlineCall {
            function: Box::new(VarRef::deferred(function).with_scope(scope)),
            args: candidates,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expression::symbols::{DataType, SymbolType};
    use crate::ir::Pragma;
    use crate::scope::ScopeTree;

    fn fusion_loop(var: &str, start: i64, stop: i64, content: &str, body: Vec<Stmt>) -> Stmt {
        Stmt::new(StmtKind::Loop {
            variable: VarRef::integer(var),
            bounds: LoopRange::new(Expr::int(start), Expr::int(stop)),
            body,
            pragma: Some(Pragma::new("fortopt", content)),
        })
    }

    fn assign(target: &str, index: &str) -> Stmt {
        Stmt::new(StmtKind::Assignment {
            target: Expr::Var(
                VarRef::new(target, SymbolType::new(DataType::Real))
                    .with_dimensions(vec![Expr::var(index)]),
            ),
            value: Expr::int(0),
            pragma: None,
        })
    }

    fn routine_with(body: Vec<Stmt>) -> (Procedure, ScopeTree) {
        let mut scopes = ScopeTree::new();
        let mut routine = Procedure::new("kernel", false, &mut scopes, None);
        routine.body.body = body;
        (routine, scopes)
    }

    fn loops_of(body: &[Stmt]) -> Vec<&Stmt> {
        find_loops(body)
    }

    #[test]
    fn test_union_fusion_guards_shorter_member() {
        let a = fusion_loop("i", 1, 10, "loop-fusion", vec![assign("x", "i")]);
        let b = fusion_loop("i", 1, 20, "loop-fusion", vec![assign("y", "i")]);
        let (mut routine, _) = routine_with(vec![a, b]);
        loop_fusion(&mut routine).unwrap();

        let loops = loops_of(&routine.body.body);
        assert_eq!(loops.len(), 1);
        match &loops[0].kind {
            StmtKind::Loop { bounds, body, .. } => {
                assert_eq!(bounds.start, Expr::int(1));
                assert_eq!(bounds.stop, Expr::int(20));
                // First body guarded to its original 1..10, second bare
                let conditionals: Vec<&Stmt> = body
                    .iter()
                    .filter(|s| matches!(s.kind, StmtKind::Conditional { .. }))
                    .collect();
                assert_eq!(conditionals.len(), 1);
                match &conditionals[0].kind {
                    StmtKind::Conditional { condition, .. } => {
                        assert_eq!(
                            *condition,
                            Expr::comparison(
                                Expr::Var(VarRef::integer("i")),
                                ComparisonOp::Le,
                                Expr::int(10)
                            )
                        );
                    }
                    _ => unreachable!(),
                }
            }
            other => panic!("expected fused loop, got {:?}", other),
        }
    }

    #[test]
    fn test_variable_renaming_to_fused() {
        let a = fusion_loop("i", 1, 10, "loop-fusion", vec![assign("x", "i")]);
        let b = fusion_loop("k", 1, 10, "loop-fusion", vec![assign("y", "k")]);
        let (mut routine, _) = routine_with(vec![a, b]);
        loop_fusion(&mut routine).unwrap();

        let loops = loops_of(&routine.body.body);
        assert_eq!(loops.len(), 1);
        let mut names = Vec::new();
        crate::ir::visit::for_each_var_in_stmts(&routine.body.body, &mut |v: &VarRef| {
            names.push(v.name_lower());
        });
        assert!(!names.contains(&"k".to_string()));
    }

    #[test]
    fn test_disjoint_groups_fuse_separately() {
        let body = vec![
            fusion_loop("i", 1, 10, "loop-fusion group(a)", vec![assign("x", "i")]),
            fusion_loop("i", 1, 10, "loop-fusion group(b)", vec![assign("y", "i")]),
            fusion_loop("i", 1, 10, "loop-fusion group(a)", vec![assign("z", "i")]),
        ];
        let (mut routine, _) = routine_with(body);
        loop_fusion(&mut routine).unwrap();
        assert_eq!(loops_of(&routine.body.body).len(), 2);
    }

    #[test]
    fn test_conflicting_collapse_leaves_tree_untouched() {
        let body = vec![
            fusion_loop("i", 1, 10, "loop-fusion collapse(1)", vec![assign("x", "i")]),
            fusion_loop("i", 1, 10, "loop-fusion collapse(2)", vec![assign("y", "i")]),
        ];
        let (mut routine, _) = routine_with(body);
        let before = routine.body.clone();
        let err = loop_fusion(&mut routine).unwrap_err();
        assert!(matches!(err, TransformError::ConflictingDirective { .. }));
        assert_eq!(routine.body, before);
    }

    #[test]
    fn test_explicit_range_guards_all_members() {
        let body = vec![
            fusion_loop("i", 1, 10, "loop-fusion range(1:30)", vec![assign("x", "i")]),
            fusion_loop("i", 1, 20, "loop-fusion range(1:30)", vec![assign("y", "i")]),
        ];
        let (mut routine, _) = routine_with(body);
        loop_fusion(&mut routine).unwrap();
        let loops = loops_of(&routine.body.body);
        assert_eq!(loops.len(), 1);
        match &loops[0].kind {
            StmtKind::Loop { bounds, body, .. } => {
                assert_eq!(bounds.stop, Expr::int(30));
                let guards = body
                    .iter()
                    .filter(|s| matches!(s.kind, StmtKind::Conditional { .. }))
                    .count();
                assert_eq!(guards, 2);
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_conflicting_range_leaves_tree_untouched() {
        let body = vec![
            fusion_loop("i", 1, 10, "loop-fusion range(1:30)", vec![assign("x", "i")]),
            fusion_loop("i", 1, 20, "loop-fusion range(1:40)", vec![assign("y", "i")]),
        ];
        let (mut routine, _) = routine_with(body);
        let before = routine.body.clone();
        let err = loop_fusion(&mut routine).unwrap_err();
        assert!(matches!(err, TransformError::ConflictingDirective { .. }));
        assert_eq!(routine.body, before);
    }

    #[test]
    fn test_range_dimension_count_must_match_collapse() {
        let inner = Stmt::new(StmtKind::Loop {
            variable: VarRef::integer("j"),
            bounds: LoopRange::new(Expr::int(1), Expr::int(5)),
            body: vec![assign("x", "j")],
            pragma: None,
        });
        // One range dimension for a depth-two collapse
        let body =
            vec![fusion_loop("i", 1, 8, "loop-fusion collapse(2) range(1:8)", vec![inner])];
        let (mut routine, _) = routine_with(body);
        let before = routine.body.clone();
        let err = loop_fusion(&mut routine).unwrap_err();
        assert!(matches!(err, TransformError::ConflictingDirective { .. }));
        assert_eq!(routine.body, before);
    }

    #[test]
    fn test_collapse_two_builds_single_nest() {
        let inner_a = Stmt::new(StmtKind::Loop {
            variable: VarRef::integer("j"),
            bounds: LoopRange::new(Expr::int(1), Expr::int(5)),
            body: vec![assign("x", "j")],
            pragma: None,
        });
        let inner_b = Stmt::new(StmtKind::Loop {
            variable: VarRef::integer("l"),
            bounds: LoopRange::new(Expr::int(1), Expr::int(5)),
            body: vec![assign("y", "l")],
            pragma: None,
        });
        let body = vec![
            fusion_loop("i", 1, 8, "loop-fusion collapse(2)", vec![inner_a]),
            fusion_loop("k", 1, 8, "loop-fusion collapse(2)", vec![inner_b]),
        ];
        let (mut routine, _) = routine_with(body);
        loop_fusion(&mut routine).unwrap();

        let loops = loops_of(&routine.body.body);
        assert_eq!(loops.len(), 2);
        match (&loops[0].kind, &loops[1].kind) {
            (
                StmtKind::Loop { variable: outer, .. },
                StmtKind::Loop { variable: inner, .. },
            ) => {
                assert!(outer.name_eq("i"));
                assert!(inner.name_eq("j"));
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_imperfect_nest_rejected() {
        let inner = Stmt::new(StmtKind::Loop {
            variable: VarRef::integer("j"),
            bounds: LoopRange::new(Expr::int(1), Expr::int(5)),
            body: vec![assign("x", "j")],
            pragma: None,
        });
        // A statement next to the inner loop breaks the perfect nest.
        let body = vec![fusion_loop(
            "i",
            1,
            8,
            "loop-fusion collapse(2)",
            vec![assign("y", "i"), inner],
        )];
        let (mut routine, _) = routine_with(body);
        let err = loop_fusion(&mut routine).unwrap_err();
        assert!(matches!(err, TransformError::UnsupportedLoopShape(_)));
    }

    #[test]
    fn test_symbolic_bounds_wrapped_in_max() {
        let a = Stmt::new(StmtKind::Loop {
            variable: VarRef::integer("i"),
            bounds: LoopRange::new(Expr::int(1), Expr::var("n")),
            body: vec![assign("x", "i")],
            pragma: Some(Pragma::new("fortopt", "loop-fusion")),
        });
        let b = Stmt::new(StmtKind::Loop {
            variable: VarRef::integer("i"),
            bounds: LoopRange::new(Expr::int(1), Expr::var("m")),
            body: vec![assign("y", "i")],
            pragma: Some(Pragma::new("fortopt", "loop-fusion")),
        });
        let (mut routine, _) = routine_with(vec![a, b]);
        loop_fusion(&mut routine).unwrap();

        let loops = loops_of(&routine.body.body);
        match &loops[0].kind {
            StmtKind::Loop { bounds, .. } => match &bounds.stop {
                Expr::InlineCall { function, args } => {
                    assert!(function.name_eq("max"));
                    assert_eq!(args.len(), 2);
                }
                other => panic!("expected max() upper bound, got {:?}", other),
            },
            _ => unreachable!(),
        }
    }
}
