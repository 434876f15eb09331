//! A small expression parser for pragma parameters.
//!
//! Loop directives can carry bound expressions (`range(1:2*n+1)`), which
//! arrive as plain strings inside the pragma text. This hand-written
//! recursive-descent parser covers the subset needed there: integer
//! literals, identifiers, `+ - * /` and parentheses.

use crate::expression::symbols::{Expr, VarRef};
use crate::scope::ScopeId;
use crate::utils::errors::TransformError;

struct Parser<'a> {
    chars: std::iter::Peekable<std::str::Chars<'a>>,
    scope: Option<ScopeId>,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str, scope: Option<ScopeId>) -> Self {
        Self { chars: input.chars().peekable(), scope }
    }

    fn skip_ws(&mut self) {
        while matches!(self.chars.peek(), Some(c) if c.is_whitespace()) {
            self.chars.next();
        }
    }

    fn peek(&mut self) -> Option<char> {
        self.skip_ws();
        self.chars.peek().copied()
    }

    fn error(&self, message: impl Into<String>) -> TransformError {
        TransformError::MalformedPragma(message.into())
    }

    fn expr(&mut self) -> Result<Expr, TransformError> {
        let mut parts = vec![self.term()?];
        loop {
            match self.peek() {
                Some('+') => {
                    self.chars.next();
                    parts.push(self.term()?);
                }
                Some('-') => {
                    self.chars.next();
                    parts.push(Expr::neg(self.term()?));
                }
                _ => break,
            }
        }
        Ok(Expr::sum(parts))
    }

    fn term(&mut self) -> Result<Expr, TransformError> {
        let mut result = self.factor()?;
        loop {
            match self.peek() {
                Some('*') => {
                    self.chars.next();
                    let rhs = self.factor()?;
                    result = Expr::Product(vec![result, rhs]);
                }
                Some('/') => {
                    self.chars.next();
                    let rhs = self.factor()?;
                    result = Expr::Quotient {
                        numerator: Box::new(result),
                        denominator: Box::new(rhs),
                    };
                }
                _ => break,
            }
        }
        Ok(result)
    }

    fn factor(&mut self) -> Result<Expr, TransformError> {
        match self.peek() {
            Some('(') => {
                self.chars.next();
                let inner = self.expr()?;
                if self.peek() != Some(')') {
                    return Err(self.error("expected closing parenthesis"));
                }
                self.chars.next();
                Ok(inner)
            }
            Some('-') => {
                self.chars.next();
                Ok(Expr::neg(self.factor()?))
            }
            Some(c) if c.is_ascii_digit() => {
                let mut digits = String::new();
                while matches!(self.chars.peek(), Some(c) if c.is_ascii_digit()) {
                    digits.push(self.chars.next().unwrap());
                }
                digits
                    .parse::<i64>()
                    .map(Expr::int)
                    .map_err(|_| self.error(format!("invalid integer literal `{}`", digits)))
            }
            Some(c) if c.is_alphabetic() || c == '_' => {
                let mut name = String::new();
                while matches!(self.chars.peek(), Some(c) if c.is_alphanumeric() || *c == '_') {
                    name.push(self.chars.next().unwrap());
                }
                let mut var = VarRef::deferred(name);
                if let Some(scope) = self.scope {
                    var = var.with_scope(scope);
                }
                Ok(Expr::Var(var))
            }
            Some(c) => Err(self.error(format!("unexpected character `{}`", c))),
            None => Err(self.error("unexpected end of expression")),
        }
    }
}

/// Parse a bound expression from a pragma parameter string.
///
/// Symbol references in the result carry the given scope so that later
/// rescoping can resolve them against the annotated procedure.
pub fn parse_expression(input: &str, scope: Option<ScopeId>) -> Result<Expr, TransformError> {
    let mut parser = Parser::new(input, scope);
    let expr = parser.expr()?;
    if let Some(c) = parser.peek() {
        return Err(TransformError::MalformedPragma(format!(
            "trailing input `{}` in expression `{}`",
            c, input
        )));
    }
    Ok(expr)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expression::algebra::{as_int, simplify};

    #[test]
    fn test_parse_literal() {
        assert_eq!(parse_expression("42", None).unwrap(), Expr::int(42));
        assert_eq!(as_int(&parse_expression("-3", None).unwrap()), Some(-3));
    }

    #[test]
    fn test_parse_arithmetic() {
        let e = parse_expression("2*3 + 4", None).unwrap();
        assert_eq!(as_int(&e), Some(10));
        let e = parse_expression("(8 - 2) / 3", None).unwrap();
        assert_eq!(as_int(&e), Some(2));
    }

    #[test]
    fn test_parse_symbolic() {
        let e = parse_expression("2*n + 1", None).unwrap();
        let simplified = simplify(&e);
        assert!(matches!(simplified, Expr::Sum(_)));
    }

    #[test]
    fn test_parse_errors() {
        assert!(parse_expression("1 +", None).is_err());
        assert!(parse_expression("(1", None).is_err());
        assert!(parse_expression("1 ?", None).is_err());
    }
}
