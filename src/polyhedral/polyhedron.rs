//! Integer polyhedra built from loop nests.
//!
//! An iteration space is modelled as `A x <= b` over integer points. The
//! variable vector `x` holds the loop variables of the nest first, in
//! nesting order, followed by any additional symbols appearing in the
//! bounds, sorted by name. Each loop level contributes exactly two rows:
//! its lower bound first, then its upper bound.

use crate::expression::algebra::{polynomial_terms, simplify, PolyTerms};
use crate::expression::symbols::{Expr, LoopRange, VarRef};
use crate::utils::errors::TransformError;

/// An integer polyhedron `A x <= b`.
#[derive(Debug, Clone, PartialEq)]
pub struct Polyhedron {
    /// Constraint matrix, one row per halfspace.
    pub a: Vec<Vec<i64>>,
    /// Right-hand side, one entry per row.
    pub b: Vec<i64>,
    /// The symbols behind the columns of `a`.
    pub variables: Vec<VarRef>,
}

impl Polyhedron {
    /// Build the iteration-space polyhedron of a loop nest.
    ///
    /// Requires unit steps and bounds affine in the loop variables and
    /// bound symbols. Loop variables occupy the leading columns in
    /// nesting order; bound-only symbols follow, sorted by name.
    pub fn from_loop_ranges(
        loop_variables: &[VarRef],
        ranges: &[LoopRange],
    ) -> Result<Self, TransformError> {
        debug_assert_eq!(loop_variables.len(), ranges.len());

        for (var, range) in loop_variables.iter().zip(ranges) {
            if let Some(step) = &range.step {
                if !matches!(step, Expr::IntLiteral(1)) {
                    return Err(TransformError::UnsupportedLoopShape(format!(
                        "loop over `{}` has step `{}`, only unit steps are supported",
                        var.name, step
                    )));
                }
            }
        }

        // Decompose every bound and collect the symbols they mention.
        let mut bound_terms: Vec<(PolyTerms, PolyTerms)> = Vec::with_capacity(ranges.len());
        for (var, range) in loop_variables.iter().zip(ranges) {
            let start = affine_terms(&range.start, var)?;
            let stop = affine_terms(&range.stop, var)?;
            bound_terms.push((start, stop));
        }

        let mut variables: Vec<VarRef> = loop_variables.to_vec();
        let loop_names: Vec<String> = loop_variables.iter().map(|v| v.name_lower()).collect();
        let mut extra: Vec<VarRef> = Vec::new();
        for (start, stop) in &bound_terms {
            for terms in [start, stop] {
                for mono in terms.terms.keys() {
                    for name in mono {
                        if loop_names.contains(name)
                            || extra.iter().any(|v| &v.name_lower() == name)
                        {
                            continue;
                        }
                        if let Some(var) = terms.var_ref(name) {
                            extra.push(var.clone());
                        }
                    }
                }
            }
        }
        extra.sort_by_key(|v| v.name_lower());
        variables.extend(extra);

        let column = |name: &str| variables.iter().position(|v| v.name_lower() == name);
        let width = variables.len();
        let mut a = Vec::with_capacity(2 * ranges.len());
        let mut b = Vec::with_capacity(2 * ranges.len());

        for (i, (start, stop)) in bound_terms.iter().enumerate() {
            // x_i >= start  <=>  -x_i + start <= 0
            let mut lower = vec![0i64; width];
            lower[i] = -1;
            for (mono, coef) in &start.terms {
                let col = column(&mono[0]).unwrap();
                lower[col] += coef;
            }
            a.push(lower);
            b.push(-start.constant);

            // x_i <= stop
            let mut upper = vec![0i64; width];
            upper[i] = 1;
            for (mono, coef) in &stop.terms {
                let col = column(&mono[0]).unwrap();
                upper[col] -= coef;
            }
            a.push(upper);
            b.push(stop.constant);
        }

        Ok(Self { a, b, variables })
    }

    /// Number of constraint rows.
    pub fn rows(&self) -> usize {
        self.a.len()
    }

    /// Column index of a variable, by case-insensitive name.
    pub fn column_of(&self, name: &str) -> Option<usize> {
        let key = name.to_lowercase();
        self.variables.iter().position(|v| v.name_lower() == key)
    }

    /// All lower bounds the constraints impose on column `j`, as
    /// simplified expressions over the other variables.
    pub fn lower_bounds(&self, j: usize) -> Vec<Expr> {
        self.bounds_of(j, true)
    }

    /// All upper bounds the constraints impose on column `j`.
    pub fn upper_bounds(&self, j: usize) -> Vec<Expr> {
        self.bounds_of(j, false)
    }

    fn bounds_of(&self, j: usize, lower: bool) -> Vec<Expr> {
        let mut out = Vec::new();
        for (row, rhs) in self.a.iter().zip(&self.b) {
            let coef = row[j];
            if (lower && coef >= 0) || (!lower && coef <= 0) {
                continue;
            }
            // Isolate x_j in: sum_k a_k x_k <= rhs
            let mut parts = Vec::new();
            for (k, &c) in row.iter().enumerate() {
                if k == j || c == 0 {
                    continue;
                }
                // For a lower bound the row coefficient on x_j is negative
                // and the inequality flips when dividing by it.
                let c = if lower { c } else { -c };
                parts.push(Expr::product(vec![Expr::int(c), Expr::Var(self.variables[k].clone())]));
            }
            parts.push(Expr::int(if lower { -rhs } else { *rhs }));
            let numerator = Expr::sum(parts);
            let divisor = coef.abs();
            let expr = if divisor == 1 {
                numerator
            } else {
                Expr::Quotient {
                    numerator: Box::new(numerator),
                    denominator: Box::new(Expr::int(divisor)),
                }
            };
            out.push(simplify(&expr));
        }
        out
    }
}

/// Decompose a bound into affine terms, rejecting anything the matrix
/// representation cannot carry.
fn affine_terms(expr: &Expr, var: &VarRef) -> Result<PolyTerms, TransformError> {
    let terms = polynomial_terms(&simplify(expr)).ok_or_else(|| {
        TransformError::NonAffineBound(format!(
            "bound `{}` of loop over `{}` is not a polynomial",
            expr, var.name
        ))
    })?;
    if terms.degree() > 1 {
        return Err(TransformError::NonAffineBound(format!(
            "bound `{}` of loop over `{}` has degree {}",
            expr,
            var.name,
            terms.degree()
        )));
    }
    Ok(terms)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expression::algebra::definitely_equal;

    fn var(name: &str) -> VarRef {
        VarRef::integer(name)
    }

    #[test]
    fn test_rectangular_nest() {
        // do i = 1, n; do j = 1, 10
        let p = Polyhedron::from_loop_ranges(
            &[var("i"), var("j")],
            &[
                LoopRange::new(Expr::int(1), Expr::var("n")),
                LoopRange::new(Expr::int(1), Expr::int(10)),
            ],
        )
        .unwrap();

        assert_eq!(p.rows(), 4);
        // Columns: i, j, then n sorted in
        assert_eq!(p.column_of("i"), Some(0));
        assert_eq!(p.column_of("j"), Some(1));
        assert_eq!(p.column_of("n"), Some(2));
        assert_eq!(p.a[0], vec![-1, 0, 0]);
        assert_eq!(p.b[0], -1);
        assert_eq!(p.a[1], vec![1, 0, -1]);
        assert_eq!(p.b[1], 0);

        let lowers = p.lower_bounds(0);
        assert_eq!(lowers.len(), 1);
        assert!(definitely_equal(&lowers[0], &Expr::int(1)));
        let uppers = p.upper_bounds(0);
        assert_eq!(uppers.len(), 1);
        assert!(definitely_equal(&uppers[0], &Expr::var("n")));
    }

    #[test]
    fn test_triangular_bound() {
        // do i = 1, n; do j = i+1, n
        let p = Polyhedron::from_loop_ranges(
            &[var("i"), var("j")],
            &[
                LoopRange::new(Expr::int(1), Expr::var("n")),
                LoopRange::new(Expr::Sum(vec![Expr::var("i"), Expr::int(1)]), Expr::var("n")),
            ],
        )
        .unwrap();
        // j >= i + 1  =>  -j + i <= -1
        assert_eq!(p.a[2], vec![1, -1, 0]);
        assert_eq!(p.b[2], -1);
        let lowers = p.lower_bounds(1);
        assert!(definitely_equal(
            &lowers[0],
            &Expr::Sum(vec![Expr::var("i"), Expr::int(1)])
        ));
    }

    #[test]
    fn test_non_unit_step_rejected() {
        let err = Polyhedron::from_loop_ranges(
            &[var("i")],
            &[LoopRange::with_step(Expr::int(1), Expr::int(10), Expr::int(2))],
        )
        .unwrap_err();
        assert!(matches!(err, TransformError::UnsupportedLoopShape(_)));
    }

    #[test]
    fn test_non_affine_bound_rejected() {
        let err = Polyhedron::from_loop_ranges(
            &[var("i")],
            &[LoopRange::new(
                Expr::int(1),
                Expr::Product(vec![Expr::var("n"), Expr::var("m")]),
            )],
        )
        .unwrap_err();
        assert!(matches!(err, TransformError::NonAffineBound(_)));
    }
}
