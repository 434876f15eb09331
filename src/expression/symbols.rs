//! Symbolic expressions and typed symbols.
//!
//! Expressions form a closed variant hierarchy; every tree-walking utility
//! matches exhaustively over it. A [`VarRef`] is the single kind of symbol
//! reference: it carries its name, its (possibly unresolved) type, a
//! non-owning link to the scope it must resolve in, an optional parent
//! reference for derived-type member access (`a%b`) and an optional
//! subscript when used as an array reference.

use crate::scope::ScopeId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Dummy-argument intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Intent {
    /// Read-only argument
    In,
    /// Write-only argument
    Out,
    /// Read-write argument
    InOut,
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Intent::In => write!(f, "in"),
            Intent::Out => write!(f, "out"),
            Intent::InOut => write!(f, "inout"),
        }
    }
}

/// Basic data type of a symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DataType {
    /// Integer scalar or array element type
    Integer,
    /// Floating point scalar or array element type
    Real,
    /// Boolean
    Logical,
    /// Character
    Character,
    /// Derived type with the given type name
    Derived(String),
    /// A callable procedure
    Procedure {
        /// Whether the procedure returns a value
        is_function: bool,
    },
    /// Not yet resolved
    Deferred,
}

/// Type attributes attached to a symbol.
///
/// The shape, when present, is the ordered list of dimension bound
/// expressions of an array. A `None` shape on an allocatable means the
/// shape is deferred until an allocation is seen.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymbolType {
    /// Basic data type
    pub dtype: DataType,
    /// Kind parameter, if any
    pub kind: Option<Box<Expr>>,
    /// Dummy-argument intent, if any
    pub intent: Option<Intent>,
    /// Array shape (dimension bounds), if known
    pub shape: Option<Vec<Expr>>,
    /// Whether the symbol is allocatable
    pub allocatable: bool,
}

impl SymbolType {
    /// Create plain type attributes for the given data type.
    pub fn new(dtype: DataType) -> Self {
        Self { dtype, kind: None, intent: None, shape: None, allocatable: false }
    }

    /// Type attributes for a not-yet-resolved symbol.
    pub fn deferred() -> Self {
        Self::new(DataType::Deferred)
    }

    /// Type attributes for a callable procedure.
    pub fn procedure(is_function: bool) -> Self {
        Self::new(DataType::Procedure { is_function })
    }

    /// Attach a shape.
    pub fn with_shape(mut self, shape: Vec<Expr>) -> Self {
        self.shape = Some(shape);
        self
    }

    /// Attach an intent.
    pub fn with_intent(mut self, intent: Intent) -> Self {
        self.intent = Some(intent);
        self
    }

    /// Mark as allocatable.
    pub fn with_allocatable(mut self) -> Self {
        self.allocatable = true;
        self
    }

    /// Compare against another type, ignoring components that are still
    /// unresolved on either side. Used by the rescoper to decide whether a
    /// reference's carried type agrees with a stored declaration.
    pub fn compare(&self, other: &SymbolType) -> bool {
        if self.dtype != other.dtype {
            return false;
        }
        if let (Some(a), Some(b)) = (&self.intent, &other.intent) {
            if a != b {
                return false;
            }
        }
        if let (Some(a), Some(b)) = (&self.shape, &other.shape) {
            if a.len() != b.len() {
                return false;
            }
            // Shapes match up to symbolic equality, so scope decoration
            // on the dimension expressions never causes a mismatch.
            if !a.iter().zip(b).all(|(x, y)| crate::expression::algebra::definitely_equal(x, y)) {
                return false;
            }
        }
        true
    }
}

/// A reference to a typed symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VarRef {
    /// Local name component (for `a%b` this is `b`, with `a` in `parent`)
    pub name: String,
    /// Carried type attributes
    pub ty: SymbolType,
    /// Scope this reference must resolve in; non-owning
    pub scope: Option<ScopeId>,
    /// Base reference for derived-type member access; acyclic by construction
    pub parent: Option<Box<VarRef>>,
    /// Subscript indices when used as an array reference
    pub dimensions: Option<Vec<Expr>>,
}

impl VarRef {
    /// Create a reference with the given name and type.
    pub fn new(name: impl Into<String>, ty: SymbolType) -> Self {
        Self { name: name.into(), ty, scope: None, parent: None, dimensions: None }
    }

    /// Create a reference with a deferred type.
    pub fn deferred(name: impl Into<String>) -> Self {
        Self::new(name, SymbolType::deferred())
    }

    /// Create an integer-typed reference (the common loop-variable case).
    pub fn integer(name: impl Into<String>) -> Self {
        Self::new(name, SymbolType::new(DataType::Integer))
    }

    /// Attach the scope the reference resolves in.
    pub fn with_scope(mut self, scope: ScopeId) -> Self {
        self.scope = Some(scope);
        self
    }

    /// Attach a subscript.
    pub fn with_dimensions(mut self, dimensions: Vec<Expr>) -> Self {
        self.dimensions = Some(dimensions);
        self
    }

    /// Attach a parent reference for derived-type member access.
    pub fn with_parent(mut self, parent: VarRef) -> Self {
        self.parent = Some(Box::new(parent));
        self
    }

    /// Lower-cased name, the canonical lookup key.
    pub fn name_lower(&self) -> String {
        self.name.to_lowercase()
    }

    /// Case-insensitive name comparison.
    pub fn name_eq(&self, other: &str) -> bool {
        self.name.eq_ignore_ascii_case(other)
    }

    /// Fully qualified name including the parent chain (`a%b%c`).
    pub fn qualified_name(&self) -> String {
        match &self.parent {
            Some(p) => format!("{}%{}", p.qualified_name(), self.name),
            None => self.name.clone(),
        }
    }

    /// Length of the parent chain. Parent chains decrease strictly in
    /// depth, so this always terminates.
    pub fn depth(&self) -> usize {
        match &self.parent {
            Some(p) => 1 + p.depth(),
            None => 0,
        }
    }
}

impl fmt::Display for VarRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.qualified_name())?;
        if let Some(dims) = &self.dimensions {
            write!(f, "(")?;
            for (i, d) in dims.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{}", d)?;
            }
            write!(f, ")")?;
        }
        Ok(())
    }
}

/// Comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ComparisonOp {
    /// Equal
    Eq,
    /// Not equal
    Ne,
    /// Less than
    Lt,
    /// Less than or equal
    Le,
    /// Greater than
    Gt,
    /// Greater than or equal
    Ge,
}

impl fmt::Display for ComparisonOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ComparisonOp::Eq => "==",
            ComparisonOp::Ne => "/=",
            ComparisonOp::Lt => "<",
            ComparisonOp::Le => "<=",
            ComparisonOp::Gt => ">",
            ComparisonOp::Ge => ">=",
        };
        write!(f, "{}", s)
    }
}

/// A symbolic expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    /// Integer literal
    IntLiteral(i64),
    /// Floating point literal
    FloatLiteral(f64),
    /// Logical literal
    LogicLiteral(bool),
    /// String literal
    StringLiteral(String),
    /// Symbol reference
    Var(VarRef),
    /// Sum of the given parts
    Sum(Vec<Expr>),
    /// Product of the given parts
    Product(Vec<Expr>),
    /// Integer quotient
    Quotient {
        /// Dividend
        numerator: Box<Expr>,
        /// Divisor
        denominator: Box<Expr>,
    },
    /// Relational comparison
    Comparison {
        /// Left operand
        left: Box<Expr>,
        /// Operator
        op: ComparisonOp,
        /// Right operand
        right: Box<Expr>,
    },
    /// Conjunction
    LogicalAnd(Vec<Expr>),
    /// Disjunction
    LogicalOr(Vec<Expr>),
    /// Call to a function symbol inside an expression
    InlineCall {
        /// The called procedure symbol
        function: Box<VarRef>,
        /// Call arguments
        args: Vec<Expr>,
    },
}

impl Expr {
    /// Integer literal shorthand.
    pub fn int(value: i64) -> Self {
        Expr::IntLiteral(value)
    }

    /// Deferred-typed variable shorthand.
    pub fn var(name: impl Into<String>) -> Self {
        Expr::Var(VarRef::deferred(name))
    }

    /// Build a sum, unwrapping the trivial single-part case.
    pub fn sum(mut parts: Vec<Expr>) -> Self {
        if parts.len() == 1 {
            parts.pop().unwrap()
        } else {
            Expr::Sum(parts)
        }
    }

    /// Build a product, unwrapping the trivial single-part case.
    pub fn product(mut parts: Vec<Expr>) -> Self {
        if parts.len() == 1 {
            parts.pop().unwrap()
        } else {
            Expr::Product(parts)
        }
    }

    /// Negation as a `(-1) * expr` product.
    pub fn neg(expr: Expr) -> Self {
        Expr::Product(vec![Expr::int(-1), expr])
    }

    /// Difference `left - right`.
    pub fn minus(left: Expr, right: Expr) -> Self {
        Expr::Sum(vec![left, Expr::neg(right)])
    }

    /// Relational comparison shorthand.
    pub fn comparison(left: Expr, op: ComparisonOp, right: Expr) -> Self {
        Expr::Comparison { left: Box::new(left), op, right: Box::new(right) }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::IntLiteral(v) => write!(f, "{}", v),
            Expr::FloatLiteral(v) => write!(f, "{}", v),
            Expr::LogicLiteral(v) => write!(f, "{}", if *v { ".true." } else { ".false." }),
            Expr::StringLiteral(s) => write!(f, "'{}'", s),
            Expr::Var(v) => write!(f, "{}", v),
            Expr::Sum(parts) => {
                for (i, p) in parts.iter().enumerate() {
                    if i > 0 {
                        write!(f, " + ")?;
                    }
                    write!(f, "{}", p)?;
                }
                Ok(())
            }
            Expr::Product(parts) => {
                for (i, p) in parts.iter().enumerate() {
                    if i > 0 {
                        write!(f, "*")?;
                    }
                    match p {
                        Expr::Sum(_) => write!(f, "({})", p)?,
                        _ => write!(f, "{}", p)?,
                    }
                }
                Ok(())
            }
            Expr::Quotient { numerator, denominator } => {
                write!(f, "({}) / ({})", numerator, denominator)
            }
            Expr::Comparison { left, op, right } => write!(f, "{} {} {}", left, op, right),
            Expr::LogicalAnd(parts) => {
                for (i, p) in parts.iter().enumerate() {
                    if i > 0 {
                        write!(f, " .and. ")?;
                    }
                    write!(f, "{}", p)?;
                }
                Ok(())
            }
            Expr::LogicalOr(parts) => {
                for (i, p) in parts.iter().enumerate() {
                    if i > 0 {
                        write!(f, " .or. ")?;
                    }
                    write!(f, "{}", p)?;
                }
                Ok(())
            }
            Expr::InlineCall { function, args } => {
                write!(f, "{}(", function.name)?;
                for (i, a) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", a)?;
                }
                write!(f, ")")
            }
        }
    }
}

/// A loop iteration range with symbolic bounds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoopRange {
    /// First iteration value
    pub start: Expr,
    /// Last iteration value (inclusive)
    pub stop: Expr,
    /// Step, if not the default of 1
    pub step: Option<Expr>,
}

impl LoopRange {
    /// Create a unit-step range.
    pub fn new(start: Expr, stop: Expr) -> Self {
        Self { start, stop, step: None }
    }

    /// Create a range with an explicit step.
    pub fn with_step(start: Expr, stop: Expr, step: Expr) -> Self {
        Self { start, stop, step: Some(step) }
    }
}

impl fmt::Display for LoopRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.start, self.stop)?;
        if let Some(step) = &self.step {
            write!(f, ":{}", step)?;
        }
        Ok(())
    }
}
