//! Storage contract shared by every document backend.
//!
//! # Responsibility
//! - Define fetch/get/create/update/delete for lattices and projects.
//! - Map backend failures onto one semantic error type.
//!
//! # Invariants
//! - `update_*` and `delete_*` fail with `*NotFound` for unknown ids; they
//!   never create documents.
//! - `create_*` fails with `Duplicate` when the id is already stored.
//! - `fetch_*` returns documents ordered by `created_at`, then id.

use crate::db::DbError;
use crate::model::lattice::{Lattice, LatticeId};
use crate::model::project::{Project, ProjectId};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

pub type StorageResult<T> = Result<T, StorageError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Lattice,
    Project,
}

impl Display for DocumentKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Lattice => "lattice",
            Self::Project => "project",
        })
    }
}

#[derive(Debug)]
pub enum StorageError {
    Db(DbError),
    LatticeNotFound(LatticeId),
    ProjectNotFound(ProjectId),
    Duplicate { kind: DocumentKind, id: Uuid },
    InvalidData(String),
    Serialization(serde_json::Error),
}

impl StorageError {
    pub fn not_found(kind: DocumentKind, id: Uuid) -> Self {
        match kind {
            DocumentKind::Lattice => Self::LatticeNotFound(id),
            DocumentKind::Project => Self::ProjectNotFound(id),
        }
    }
}

impl Display for StorageError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::LatticeNotFound(id) => write!(f, "lattice not found: {id}"),
            Self::ProjectNotFound(id) => write!(f, "project not found: {id}"),
            Self::Duplicate { kind, id } => write!(f, "{kind} already exists: {id}"),
            Self::InvalidData(message) => write!(f, "invalid persisted data: {message}"),
            Self::Serialization(err) => write!(f, "document serialization failed: {err}"),
        }
    }
}

impl Error for StorageError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::Serialization(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DbError> for StorageError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for StorageError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serialization(value)
    }
}

/// Document persistence used by the lattice store.
///
/// Methods take `&self`; backends use interior mutability where needed.
pub trait StorageService {
    /// Short backend label for log lines.
    fn backend_name(&self) -> &'static str;

    fn fetch_lattices(&self) -> StorageResult<Vec<Lattice>>;
    fn get_lattice(&self, id: LatticeId) -> StorageResult<Option<Lattice>>;
    fn create_lattice(&self, lattice: &Lattice) -> StorageResult<()>;
    fn update_lattice(&self, lattice: &Lattice) -> StorageResult<()>;
    fn delete_lattice(&self, id: LatticeId) -> StorageResult<()>;

    fn fetch_projects(&self) -> StorageResult<Vec<Project>>;
    fn get_project(&self, id: ProjectId) -> StorageResult<Option<Project>>;
    fn create_project(&self, project: &Project) -> StorageResult<()>;
    fn update_project(&self, project: &Project) -> StorageResult<()>;
    fn delete_project(&self, id: ProjectId) -> StorageResult<()>;
}
