//! Document persistence.
//!
//! # Responsibility
//! - Define the `StorageService` contract the lattice store is written
//!   against.
//! - Provide in-memory and SQLite implementations of it.
//!
//! # Invariants
//! - Backends store whole documents; they hold no lattice semantics.

pub mod memory_storage;
pub mod sqlite_storage;
pub mod storage;
