//! Lattice geometry and consistency engine.
//!
//! Derives reciprocal-space data from real-space bases, classifies lattice
//! families, stores lattice and project documents, and keeps the lattice
//! copies embedded in project scenes in step with their canonical document.

pub mod config;
pub mod db;
pub mod geometry;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;
pub mod sync;

pub use config::{ClassifierTolerances, ConfigError, EngineConfig};
pub use db::{open_db, open_db_in_memory, DbError};
pub use geometry::classifier::{
    classify, suggest_corrections, validate, Classification, LatticeMeasurements,
    LatticeValidation, LatticeViolation,
};
pub use geometry::native::{NativeNumerics, PureNumerics, TransformBundle};
pub use geometry::reciprocal::{reciprocal_lattice, ReciprocalCalculator, ReciprocalLattice};
pub use geometry::symmetry_points::high_symmetry_positions;
pub use geometry::{GeometryError, GeometryResult, NativeModuleError};
pub use logging::{default_log_level, init_logging, init_stderr_logging, logging_status};
pub use model::lattice::{Lattice, LatticeId, LatticeType, MeepLattice};
pub use model::project::{CanvasLatticeElement, Project, ProjectId, Scene, SceneElement};
pub use model::vector::{Vec2, Vec3};
pub use repo::memory_storage::InMemoryStorage;
pub use repo::sqlite_storage::SqliteStorage;
pub use repo::storage::{StorageError, StorageResult, StorageService};
pub use service::lattice_store::{
    LatticeDraft, LatticePatch, LatticeStore, ProjectDraft, ProjectPatch, ReconciliationReport,
};
pub use service::workspace::{ResolvedLattice, SceneObserver, SyncRequest, Workspace};
pub use sync::scene_sync::{NullViewport, SyncOutcome, SyncState, Viewport};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
