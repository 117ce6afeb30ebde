//! In-process storage backend.
//!
//! Documents live in ordered maps behind `RefCell`; clones go in and out,
//! so callers never alias stored state.

use super::storage::{DocumentKind, StorageError, StorageResult, StorageService};
use crate::model::lattice::{Lattice, LatticeId};
use crate::model::project::{Project, ProjectId};
use std::cell::RefCell;
use std::collections::BTreeMap;
use uuid::Uuid;

#[derive(Debug, Default)]
pub struct InMemoryStorage {
    lattices: RefCell<BTreeMap<LatticeId, Lattice>>,
    projects: RefCell<BTreeMap<ProjectId, Project>>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

trait Document: Clone {
    const KIND: DocumentKind;
    fn id(&self) -> Uuid;
    fn created_at(&self) -> i64;
}

impl Document for Lattice {
    const KIND: DocumentKind = DocumentKind::Lattice;
    fn id(&self) -> Uuid {
        self.document_id
    }
    fn created_at(&self) -> i64 {
        self.created_at
    }
}

impl Document for Project {
    const KIND: DocumentKind = DocumentKind::Project;
    fn id(&self) -> Uuid {
        self.document_id
    }
    fn created_at(&self) -> i64 {
        self.created_at
    }
}

fn fetch<D: Document>(map: &RefCell<BTreeMap<Uuid, D>>) -> Vec<D> {
    let mut documents: Vec<D> = map.borrow().values().cloned().collect();
    documents.sort_by_key(|doc| (doc.created_at(), doc.id()));
    documents
}

fn insert<D: Document>(map: &RefCell<BTreeMap<Uuid, D>>, doc: &D) -> StorageResult<()> {
    let mut map = map.borrow_mut();
    if map.contains_key(&doc.id()) {
        return Err(StorageError::Duplicate {
            kind: D::KIND,
            id: doc.id(),
        });
    }
    map.insert(doc.id(), doc.clone());
    Ok(())
}

fn replace<D: Document>(map: &RefCell<BTreeMap<Uuid, D>>, doc: &D) -> StorageResult<()> {
    match map.borrow_mut().get_mut(&doc.id()) {
        Some(slot) => {
            *slot = doc.clone();
            Ok(())
        }
        None => Err(StorageError::not_found(D::KIND, doc.id())),
    }
}

fn remove<D: Document>(map: &RefCell<BTreeMap<Uuid, D>>, id: Uuid) -> StorageResult<()> {
    map.borrow_mut()
        .remove(&id)
        .map(|_| ())
        .ok_or_else(|| StorageError::not_found(D::KIND, id))
}

impl StorageService for InMemoryStorage {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    fn fetch_lattices(&self) -> StorageResult<Vec<Lattice>> {
        Ok(fetch(&self.lattices))
    }

    fn get_lattice(&self, id: LatticeId) -> StorageResult<Option<Lattice>> {
        Ok(self.lattices.borrow().get(&id).cloned())
    }

    fn create_lattice(&self, lattice: &Lattice) -> StorageResult<()> {
        insert(&self.lattices, lattice)
    }

    fn update_lattice(&self, lattice: &Lattice) -> StorageResult<()> {
        replace(&self.lattices, lattice)
    }

    fn delete_lattice(&self, id: LatticeId) -> StorageResult<()> {
        remove(&self.lattices, id)
    }

    fn fetch_projects(&self) -> StorageResult<Vec<Project>> {
        Ok(fetch(&self.projects))
    }

    fn get_project(&self, id: ProjectId) -> StorageResult<Option<Project>> {
        Ok(self.projects.borrow().get(&id).cloned())
    }

    fn create_project(&self, project: &Project) -> StorageResult<()> {
        insert(&self.projects, project)
    }

    fn update_project(&self, project: &Project) -> StorageResult<()> {
        replace(&self.projects, project)
    }

    fn delete_project(&self, id: ProjectId) -> StorageResult<()> {
        remove(&self.projects, id)
    }
}
