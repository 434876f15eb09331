//! Directive-driven loop fission.
//!
//! A `!$fortopt loop-fission [promote(a,b)]` marker inside a loop body
//! splits the loop at that point into consecutive loops over the same
//! range. A free-standing marker is consumed by the split; a marker
//! attached to a statement splits in front of that statement. Variables
//! named in `promote(...)` gain a trailing dimension sized to the loop
//! trip count, so values written before a split point survive into the
//! loops after it.

use crate::expression::algebra::{simplify, symbolic_cmp};
use crate::expression::symbols::Expr;
use crate::ir::visit::{find_loops, map_variables, Transformer};
use crate::ir::{Stmt, StmtKind};
use crate::pragma::{is_tool_pragma, pragma_parameters};
use crate::procedure::Procedure;
use crate::scope::ScopeTree;
use crate::utils::errors::TransformError;
use log::{info, warn};
use std::cmp::Ordering;

const DIRECTIVE: &str = "loop-fission";

/// Split all marked loops in a procedure body and promote the requested
/// variables.
pub fn loop_fission(
    routine: &mut Procedure,
    scopes: &mut ScopeTree,
) -> Result<(), TransformError> {
    let declared = routine.variable_map();

    // Promoted variable name -> its post-promotion shape, in promotion
    // order. A variable promoted in several loops keeps the largest trip
    // count as its trailing dimension.
    let mut promotions: Vec<(String, Vec<Expr>)> = Vec::new();
    let mut mapper = Transformer::new();
    let mut split = 0usize;

    for stmt in find_loops(&routine.body.body) {
        let (variable, bounds, body) = match &stmt.kind {
            StmtKind::Loop { variable, bounds, body, .. } => (variable, bounds, body),
            _ => unreachable!(),
        };

        // Partition the direct body at the fission markers.
        let mut segments: Vec<Vec<Stmt>> = vec![Vec::new()];
        let mut promote_names: Vec<String> = Vec::new();
        let mut marked = false;
        for inner in body {
            if let StmtKind::Pragma(pragma) = &inner.kind {
                if is_tool_pragma(pragma, DIRECTIVE) {
                    collect_promotes(pragma, &mut promote_names);
                    segments.push(Vec::new());
                    marked = true;
                    continue;
                }
            }
            if let Some(pragma) = inner.attached_pragma() {
                if is_tool_pragma(pragma, DIRECTIVE) {
                    collect_promotes(pragma, &mut promote_names);
                    segments.push(vec![inner.clone().with_pragma(None)]);
                    marked = true;
                    continue;
                }
            }
            segments.last_mut().unwrap().push(inner.clone());
        }
        if !marked {
            continue;
        }

        let trip = simplify(&Expr::sum(vec![
            bounds.stop.clone(),
            Expr::neg(bounds.start.clone()),
            Expr::int(1),
        ]));

        // Record promotions and rewrite the promoted uses with the loop
        // variable as trailing subscript.
        let mut promoted_here: Vec<String> = Vec::new();
        for name in promote_names {
            let var = match declared.get(&name) {
                Some(var) => var,
                None => {
                    warn!(
                        "[{}] cannot promote `{}`: not declared in this procedure",
                        routine.name, name
                    );
                    continue;
                }
            };
            match promotions.iter_mut().find(|(n, _)| *n == name) {
                Some((_, shape)) => {
                    // Keep the larger of the competing trip counts.
                    let last = shape.last_mut().unwrap_or_else(|| unreachable!());
                    if symbolic_cmp(last, &trip) == Some(Ordering::Less) {
                        *last = trip.clone();
                    }
                }
                None => {
                    let mut shape = var.ty.shape.clone().unwrap_or_default();
                    shape.push(trip.clone());
                    promotions.push((name.clone(), shape));
                }
            }
            promoted_here.push(name);
        }
        if !promoted_here.is_empty() {
            let index = Expr::Var(variable.clone());
            for segment in &mut segments {
                map_variables(segment, &|v| {
                    if !promoted_here.contains(&v.name_lower()) {
                        return None;
                    }
                    let mut dims = v.dimensions.clone().unwrap_or_default();
                    dims.push(index.clone());
                    Some(v.clone().with_dimensions(dims))
                });
            }
        }

        let mut replacement = Vec::new();
        for (index, segment) in segments.into_iter().enumerate() {
            // A marker at the head or tail of the body, or two adjacent
            // markers, leave an empty segment; no loop is emitted for it.
            if segment.is_empty() {
                continue;
            }
            replacement.push(Stmt::comment(format!(
                "! fortopt loop-fission - loop {}",
                index
            )));
            replacement.push(Stmt::new(StmtKind::Loop {
                variable: variable.clone(),
                bounds: bounds.clone(),
                body: segment,
                pragma: None,
            }));
        }
        mapper.replace(stmt.id, replacement);
        split += 1;
    }

    if mapper.is_empty() {
        return Ok(());
    }
    mapper.apply(&mut routine.body);

    // Propagate the promoted shapes to the declarations and the symbol
    // table in one pass at the end, after every loop has had its say on
    // the trailing dimension.
    if !promotions.is_empty() {
        map_variables(&mut routine.spec.body, &|v| {
            let (_, shape) = promotions.iter().find(|(n, _)| *n == v.name_lower())?;
            let mut updated = v.clone();
            updated.ty.shape = Some(shape.clone());
            Some(updated)
        });
        for (name, _) in &promotions {
            if let Some(var) = routine.variable_map().get(name) {
                scopes.declare(routine.scope, &var.name, var.ty.clone());
            }
        }
    }
    if promotions.is_empty() {
        info!("[{}] split {} loop(s)", routine.name, split);
    } else {
        let names: Vec<&str> = promotions.iter().map(|(n, _)| n.as_str()).collect();
        info!(
            "[{}] split {} loop(s), promoted variable(s): {}",
            routine.name,
            split,
            names.join(", ")
        );
    }
    Ok(())
}

fn collect_promotes(pragma: &crate::ir::Pragma, names: &mut Vec<String>) {
    let params = pragma_parameters(pragma, DIRECTIVE);
    if let Some(list) = params.get("promote") {
        for name in list.split(',') {
            let name = name.trim().to_lowercase();
            if !name.is_empty() && !names.contains(&name) {
                names.push(name);
            }
        }
    }
}
