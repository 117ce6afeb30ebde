//! SQLite storage backend.
//!
//! # Responsibility
//! - Persist documents as JSON payloads with indexed scalar columns.
//! - Reject rows whose payload disagrees with their key.
//!
//! # Invariants
//! - The connection must come from `db::open_db*` (schema applied).
//! - Scalar columns are rewritten from the payload on every write.

use super::storage::{DocumentKind, StorageError, StorageResult, StorageService};
use crate::model::lattice::{Lattice, LatticeId};
use crate::model::project::{Project, ProjectId};
use rusqlite::{params, Connection, ErrorCode, OptionalExtension};
use serde::de::DeserializeOwned;
use uuid::Uuid;

pub struct SqliteStorage<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteStorage<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }

    fn fetch<D: DeserializeOwned>(&self, table: &str, kind: DocumentKind) -> StorageResult<Vec<D>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT document_id, payload FROM {table} ORDER BY created_at ASC, document_id ASC;"
        ))?;
        let mut rows = stmt.query([])?;
        let mut documents = Vec::new();
        while let Some(row) = rows.next()? {
            let key: String = row.get(0)?;
            let payload: String = row.get(1)?;
            documents.push(decode(kind, &key, &payload)?);
        }
        Ok(documents)
    }

    fn get<D: DeserializeOwned>(
        &self,
        table: &str,
        kind: DocumentKind,
        id: Uuid,
    ) -> StorageResult<Option<D>> {
        let key = id.to_string();
        let payload: Option<String> = self
            .conn
            .query_row(
                &format!("SELECT payload FROM {table} WHERE document_id = ?1;"),
                [&key],
                |row| row.get(0),
            )
            .optional()?;
        payload
            .map(|payload| decode(kind, &key, &payload))
            .transpose()
    }

    fn delete(&self, table: &str, kind: DocumentKind, id: Uuid) -> StorageResult<()> {
        let changed = self.conn.execute(
            &format!("DELETE FROM {table} WHERE document_id = ?1;"),
            [id.to_string()],
        )?;
        if changed == 0 {
            return Err(StorageError::not_found(kind, id));
        }
        Ok(())
    }
}

fn decode<D: DeserializeOwned>(kind: DocumentKind, key: &str, payload: &str) -> StorageResult<D> {
    let value: serde_json::Value = serde_json::from_str(payload)?;
    let embedded = value
        .get("documentId")
        .and_then(serde_json::Value::as_str)
        .unwrap_or_default();
    if embedded != key {
        return Err(StorageError::InvalidData(format!(
            "{kind} row `{key}` carries payload for `{embedded}`"
        )));
    }
    Ok(serde_json::from_value(value)?)
}

fn map_insert_error(err: rusqlite::Error, kind: DocumentKind, id: Uuid) -> StorageError {
    match &err {
        rusqlite::Error::SqliteFailure(failure, _)
            if failure.code == ErrorCode::ConstraintViolation =>
        {
            StorageError::Duplicate { kind, id }
        }
        _ => err.into(),
    }
}

impl StorageService for SqliteStorage<'_> {
    fn backend_name(&self) -> &'static str {
        "sqlite"
    }

    fn fetch_lattices(&self) -> StorageResult<Vec<Lattice>> {
        self.fetch("lattices", DocumentKind::Lattice)
    }

    fn get_lattice(&self, id: LatticeId) -> StorageResult<Option<Lattice>> {
        self.get("lattices", DocumentKind::Lattice, id)
    }

    fn create_lattice(&self, lattice: &Lattice) -> StorageResult<()> {
        let payload = serde_json::to_string(lattice)?;
        self.conn
            .execute(
                "INSERT INTO lattices (document_id, title, lattice_type, created_at, updated_at, payload)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6);",
                params![
                    lattice.document_id.to_string(),
                    lattice.title,
                    lattice.lattice_type.as_str(),
                    lattice.created_at,
                    lattice.updated_at,
                    payload,
                ],
            )
            .map_err(|err| map_insert_error(err, DocumentKind::Lattice, lattice.document_id))?;
        Ok(())
    }

    fn update_lattice(&self, lattice: &Lattice) -> StorageResult<()> {
        let payload = serde_json::to_string(lattice)?;
        let changed = self.conn.execute(
            "UPDATE lattices
             SET title = ?1, lattice_type = ?2, updated_at = ?3, payload = ?4
             WHERE document_id = ?5;",
            params![
                lattice.title,
                lattice.lattice_type.as_str(),
                lattice.updated_at,
                payload,
                lattice.document_id.to_string(),
            ],
        )?;
        if changed == 0 {
            return Err(StorageError::LatticeNotFound(lattice.document_id));
        }
        Ok(())
    }

    fn delete_lattice(&self, id: LatticeId) -> StorageResult<()> {
        self.delete("lattices", DocumentKind::Lattice, id)
    }

    fn fetch_projects(&self) -> StorageResult<Vec<Project>> {
        self.fetch("projects", DocumentKind::Project)
    }

    fn get_project(&self, id: ProjectId) -> StorageResult<Option<Project>> {
        self.get("projects", DocumentKind::Project, id)
    }

    fn create_project(&self, project: &Project) -> StorageResult<()> {
        let payload = serde_json::to_string(project)?;
        self.conn
            .execute(
                "INSERT INTO projects (document_id, title, created_at, updated_at, payload)
                 VALUES (?1, ?2, ?3, ?4, ?5);",
                params![
                    project.document_id.to_string(),
                    project.title,
                    project.created_at,
                    project.updated_at,
                    payload,
                ],
            )
            .map_err(|err| map_insert_error(err, DocumentKind::Project, project.document_id))?;
        Ok(())
    }

    fn update_project(&self, project: &Project) -> StorageResult<()> {
        let payload = serde_json::to_string(project)?;
        let changed = self.conn.execute(
            "UPDATE projects
             SET title = ?1, updated_at = ?2, payload = ?3
             WHERE document_id = ?4;",
            params![
                project.title,
                project.updated_at,
                payload,
                project.document_id.to_string(),
            ],
        )?;
        if changed == 0 {
            return Err(StorageError::ProjectNotFound(project.document_id));
        }
        Ok(())
    }

    fn delete_project(&self, id: ProjectId) -> StorageResult<()> {
        self.delete("projects", DocumentKind::Project, id)
    }
}
