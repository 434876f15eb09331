//! Polyhedral representation of loop iteration spaces.

pub mod polyhedron;

pub use polyhedron::Polyhedron;
