//! Propagation of canonical lattice edits into scene copies.
//!
//! # Responsibility
//! - Queue synchronization work as explicit deferred tasks.
//! - Rewrite embedded lattice copies and notify the viewport, guarded
//!   against reentrant runs.
//!
//! # Invariants
//! - At most one synchronization runs at a time.
//! - The sync state returns to idle however a run ends.

pub mod queue;
pub mod scene_sync;
