//! Document model for lattices and the projects that embed them.
//!
//! # Responsibility
//! - Define the persisted record shapes (camelCase JSON).
//! - Keep canonical lattices and embedded scene copies as distinct types.
//!
//! # Invariants
//! - Every document is identified by a stable UUID.
//! - Scene copies point at lattices by weak reference only.

pub mod lattice;
pub mod project;
pub mod vector;
