//! Utility modules shared across the toolkit:
//! - Error types
//! - Source location tracking

pub mod errors;
pub mod location;

// Re-exports
pub use errors::*;
pub use location::Span;
