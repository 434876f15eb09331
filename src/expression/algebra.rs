//! Symbolic expression algebra.
//!
//! This is the narrow service surface the rest of the toolkit relies on:
//! simplification, constant detection, relational comparison of symbolic
//! values and polynomial term extraction. The polyhedral engine and the
//! loop transformations are written against these functions only, not
//! against the expression representation itself.

use crate::expression::symbols::{Expr, VarRef};
use num_integer::Integer;
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};

/// An expression decomposed into polynomial terms.
///
/// Each key is a sorted list of lower-cased variable names forming a
/// monomial; the value is its integer coefficient. An affine expression
/// is one where every monomial has degree 1.
#[derive(Debug, Clone)]
pub struct PolyTerms {
    /// Constant term
    pub constant: i64,
    /// Monomial -> coefficient, keys sorted and non-empty, values non-zero
    pub terms: BTreeMap<Vec<String>, i64>,
    /// Original symbol references, keyed by lower-cased name, so rebuilt
    /// expressions keep scope and type information
    vars: HashMap<String, VarRef>,
}

impl PolyTerms {
    fn from_constant(constant: i64) -> Self {
        Self { constant, terms: BTreeMap::new(), vars: HashMap::new() }
    }

    fn from_var(var: &VarRef) -> Self {
        let key = var.name_lower();
        let mut terms = BTreeMap::new();
        terms.insert(vec![key.clone()], 1);
        let mut vars = HashMap::new();
        vars.insert(key, var.clone());
        Self { constant: 0, terms, vars }
    }

    fn add(mut self, other: PolyTerms) -> Self {
        self.constant += other.constant;
        for (mono, coef) in other.terms {
            let entry = self.terms.entry(mono).or_insert(0);
            *entry += coef;
        }
        self.terms.retain(|_, c| *c != 0);
        self.vars.extend(other.vars);
        self
    }

    fn mul(self, other: PolyTerms) -> Self {
        let mut result = Self::from_constant(self.constant * other.constant);
        for (mono, coef) in &self.terms {
            let c = coef * other.constant;
            if c != 0 {
                *result.terms.entry(mono.clone()).or_insert(0) += c;
            }
        }
        for (mono, coef) in &other.terms {
            let c = coef * self.constant;
            if c != 0 {
                *result.terms.entry(mono.clone()).or_insert(0) += c;
            }
        }
        for (m1, c1) in &self.terms {
            for (m2, c2) in &other.terms {
                let mut mono = m1.clone();
                mono.extend(m2.iter().cloned());
                mono.sort();
                *result.terms.entry(mono).or_insert(0) += c1 * c2;
            }
        }
        result.terms.retain(|_, c| *c != 0);
        result.vars = self.vars;
        result.vars.extend(other.vars);
        result
    }

    /// Whether the expression reduced to a constant.
    pub fn is_constant(&self) -> bool {
        self.terms.is_empty()
    }

    /// Highest monomial degree (0 for constants).
    pub fn degree(&self) -> usize {
        self.terms.keys().map(|m| m.len()).max().unwrap_or(0)
    }

    /// The original symbol reference behind a monomial component.
    pub fn var_ref(&self, name: &str) -> Option<&VarRef> {
        self.vars.get(&name.to_lowercase())
    }

    /// GCD of all coefficients including the constant term.
    pub fn coeff_gcd(&self) -> i64 {
        let mut g = self.constant.abs();
        for c in self.terms.values() {
            g = g.gcd(&c.abs());
        }
        if g == 0 {
            1
        } else {
            g
        }
    }

    /// Exact division by a constant, `None` unless every coefficient is
    /// divisible.
    pub fn div_exact(&self, divisor: i64) -> Option<PolyTerms> {
        if divisor == 0 || self.constant % divisor != 0 {
            return None;
        }
        if self.terms.values().any(|c| c % divisor != 0) {
            return None;
        }
        let mut out = self.clone();
        out.constant /= divisor;
        for c in out.terms.values_mut() {
            *c /= divisor;
        }
        Some(out)
    }

    /// Rebuild a canonical expression from the terms, monomials in sorted
    /// order, constant last.
    pub fn to_expr(&self) -> Expr {
        let mut parts = Vec::new();
        for (mono, coef) in &self.terms {
            let mut factors: Vec<Expr> = Vec::new();
            if *coef != 1 {
                factors.push(Expr::int(*coef));
            }
            for name in mono {
                let var = self
                    .vars
                    .get(name)
                    .cloned()
                    .unwrap_or_else(|| VarRef::deferred(name.clone()));
                factors.push(Expr::Var(var));
            }
            parts.push(Expr::product(factors));
        }
        if self.constant != 0 || parts.is_empty() {
            parts.push(Expr::int(self.constant));
        }
        Expr::sum(parts)
    }
}

/// Decompose an expression into polynomial terms, or `None` if it is not
/// a polynomial over its symbols (quotients by non-constants, calls,
/// comparisons, non-integer literals).
pub fn polynomial_terms(expr: &Expr) -> Option<PolyTerms> {
    match expr {
        Expr::IntLiteral(v) => Some(PolyTerms::from_constant(*v)),
        Expr::Var(v) => Some(PolyTerms::from_var(v)),
        Expr::Sum(parts) => {
            let mut acc = PolyTerms::from_constant(0);
            for p in parts {
                acc = acc.add(polynomial_terms(p)?);
            }
            Some(acc)
        }
        Expr::Product(parts) => {
            let mut acc = PolyTerms::from_constant(1);
            for p in parts {
                acc = acc.mul(polynomial_terms(p)?);
            }
            Some(acc)
        }
        Expr::Quotient { numerator, denominator } => {
            let den = polynomial_terms(denominator)?;
            if !den.is_constant() {
                return None;
            }
            polynomial_terms(numerator)?.div_exact(den.constant)
        }
        Expr::FloatLiteral(_)
        | Expr::LogicLiteral(_)
        | Expr::StringLiteral(_)
        | Expr::Comparison { .. }
        | Expr::LogicalAnd(_)
        | Expr::LogicalOr(_)
        | Expr::InlineCall { .. } => None,
    }
}

/// Simplify an expression: polynomial parts are folded and canonicalized,
/// everything else is rebuilt with simplified children.
pub fn simplify(expr: &Expr) -> Expr {
    if let Some(p) = polynomial_terms(expr) {
        return p.to_expr();
    }
    match expr {
        Expr::Sum(parts) => Expr::sum(parts.iter().map(simplify).collect()),
        Expr::Product(parts) => Expr::product(parts.iter().map(simplify).collect()),
        Expr::Quotient { numerator, denominator } => {
            let num = simplify(numerator);
            let den = simplify(denominator);
            if let Expr::IntLiteral(1) = den {
                return num;
            }
            if let (Some(np), Some(d)) = (polynomial_terms(&num), as_int(&den)) {
                if d != 0 {
                    if let Some(exact) = np.div_exact(d) {
                        return exact.to_expr();
                    }
                    let g = np.coeff_gcd().gcd(&d.abs());
                    if g > 1 {
                        // Reduce the fraction; division stays inexact
                        let reduced = np.div_exact(g).map(|p| p.to_expr()).unwrap_or(num.clone());
                        return Expr::Quotient {
                            numerator: Box::new(reduced),
                            denominator: Box::new(Expr::int(d / g)),
                        };
                    }
                }
            }
            Expr::Quotient { numerator: Box::new(num), denominator: Box::new(den) }
        }
        Expr::Comparison { left, op, right } => {
            Expr::comparison(simplify(left), *op, simplify(right))
        }
        Expr::LogicalAnd(parts) => Expr::LogicalAnd(parts.iter().map(simplify).collect()),
        Expr::LogicalOr(parts) => Expr::LogicalOr(parts.iter().map(simplify).collect()),
        Expr::InlineCall { function, args } => Expr::InlineCall {
            function: function.clone(),
            args: args.iter().map(simplify).collect(),
        },
        _ => expr.clone(),
    }
}

/// Whether the expression simplifies to an integer constant.
pub fn is_constant(expr: &Expr) -> bool {
    polynomial_terms(expr).map_or(false, |p| p.is_constant())
}

/// The integer value of a constant expression.
pub fn as_int(expr: &Expr) -> Option<i64> {
    let p = polynomial_terms(expr)?;
    if p.is_constant() {
        Some(p.constant)
    } else {
        None
    }
}

/// Compare two symbolic values. Returns `None` when their difference does
/// not reduce to a constant (incomparable symbolic expressions).
pub fn symbolic_cmp(a: &Expr, b: &Expr) -> Option<Ordering> {
    let diff = simplify(&Expr::minus(a.clone(), b.clone()));
    as_int(&diff).map(|v| v.cmp(&0))
}

/// Whether two symbolic values are provably equal.
pub fn definitely_equal(a: &Expr, b: &Expr) -> bool {
    symbolic_cmp(a, b) == Some(Ordering::Equal)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constant_folding() {
        let e = Expr::Sum(vec![Expr::int(2), Expr::int(3)]);
        assert_eq!(simplify(&e), Expr::int(5));
        assert!(is_constant(&e));
        assert_eq!(as_int(&e), Some(5));
    }

    #[test]
    fn test_like_terms_cancel() {
        // (n + 1) - n == 1
        let e = Expr::minus(
            Expr::Sum(vec![Expr::var("n"), Expr::int(1)]),
            Expr::var("n"),
        );
        assert_eq!(simplify(&e), Expr::int(1));
    }

    #[test]
    fn test_non_affine_terms() {
        let e = Expr::Product(vec![Expr::var("i"), Expr::var("j")]);
        let p = polynomial_terms(&e).unwrap();
        assert_eq!(p.degree(), 2);
    }

    #[test]
    fn test_non_polynomial() {
        let e = Expr::InlineCall {
            function: Box::new(VarRef::deferred("min")),
            args: vec![Expr::int(1)],
        };
        assert!(polynomial_terms(&e).is_none());
        assert!(!is_constant(&e));
    }

    #[test]
    fn test_symbolic_cmp() {
        let n = Expr::var("n");
        let n1 = Expr::Sum(vec![Expr::var("n"), Expr::int(1)]);
        assert_eq!(symbolic_cmp(&n1, &n), Some(Ordering::Greater));
        assert_eq!(symbolic_cmp(&n, &n), Some(Ordering::Equal));
        assert_eq!(symbolic_cmp(&n, &Expr::var("m")), None);
        assert!(definitely_equal(&n, &Expr::var("N")));
    }

    #[test]
    fn test_quotient_exact() {
        let e = Expr::Quotient {
            numerator: Box::new(Expr::Product(vec![Expr::int(4), Expr::var("n")])),
            denominator: Box::new(Expr::int(2)),
        };
        let p = polynomial_terms(&e).unwrap();
        assert_eq!(p.terms.values().copied().collect::<Vec<_>>(), vec![2]);
    }

    #[test]
    fn test_trip_count() {
        // stop - start + 1 for 1:5
        let e = Expr::Sum(vec![
            Expr::int(5),
            Expr::neg(Expr::int(1)),
            Expr::int(1),
        ]);
        assert_eq!(simplify(&e), Expr::int(5));
    }
}
