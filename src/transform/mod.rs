//! Directive-driven loop restructuring passes.

pub mod fission;
pub mod fusion;

pub use fission::loop_fission;
pub use fusion::loop_fusion;
