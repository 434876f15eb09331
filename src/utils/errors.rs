//! Error types for the restructuring toolkit.
//!
//! This module defines all error types used throughout the crate, organized
//! by the phase that produces them. Scope-resolution ambiguities are
//! deliberately *not* errors: they are recovered locally and surfaced as
//! `log` warnings, so a build never fails over an imperfect rescope.

use crate::frontend::Frontend;
use thiserror::Error;

/// Top-level error type for the toolkit.
#[derive(Error, Debug)]
pub enum FortoptError {
    /// Error while assembling a procedure from a raw parse tree
    #[error("Frontend error: {0}")]
    Frontend(#[from] FrontendError),

    /// Error during a loop transformation
    #[error("Transformation error: {0}")]
    Transform(#[from] TransformError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Raw parse tree does not match the selected adapter's procedure shape.
///
/// This is fatal for the procedure being built; the offending parser
/// identifier is carried so multi-frontend drivers can report which
/// back-end produced the unusable tree.
#[derive(Error, Debug, Clone)]
#[error("frontend {frontend}: {message}")]
pub struct FrontendError {
    /// The parser identifier whose adapter rejected the tree
    pub frontend: Frontend,
    /// Description of the mismatch
    pub message: String,
}

impl FrontendError {
    /// Create a new frontend error for the given parser identifier.
    pub fn new(frontend: Frontend, message: impl Into<String>) -> Self {
        Self { frontend, message: message.into() }
    }
}

/// Error during a loop restructuring transformation.
///
/// These abort the transformation of one loop nest or fusion group only;
/// already-rewritten parts of the tree outside that loop/group are left
/// intact.
#[derive(Error, Debug, Clone)]
pub enum TransformError {
    /// Loop step other than 1 (or a nest shape the pass cannot handle)
    #[error("unsupported loop shape: {0}")]
    UnsupportedLoopShape(String),

    /// A loop bound is not constant-plus-affine in the known variables
    #[error("non-affine loop bound: {0}")]
    NonAffineBound(String),

    /// Contradictory collapse depths or explicit ranges in one fusion group
    #[error("conflicting directives in group \"{group}\": {message}")]
    ConflictingDirective {
        /// The fusion group identifier
        group: String,
        /// Description of the contradiction
        message: String,
    },

    /// Pragma parameters that cannot be parsed
    #[error("malformed pragma: {0}")]
    MalformedPragma(String),
}

/// Result type using [`FortoptError`].
pub type FortoptResult<T> = Result<T, FortoptError>;
