//! Use-case layer over storage and geometry.
//!
//! # Responsibility
//! - `lattice_store`: document CRUD, derivation, relationship bookkeeping.
//! - `workspace`: edit-to-scene propagation on top of the store.
//!
//! # Invariants
//! - Services are storage-agnostic; they only see `StorageService`.

pub mod lattice_store;
pub mod workspace;
