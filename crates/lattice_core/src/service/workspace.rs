//! Workspace facade: store, synchronizer and task queue in one place.
//!
//! # Responsibility
//! - Route lattice edits through the store and schedule scene sync.
//! - Drain deferred sync tasks on request ("later turn").
//! - Resolve embedded lattice copies against canonical documents.
//!
//! # Invariants
//! - A lattice update for the lattice currently being synchronized is
//!   rejected; this is what breaks the observer feedback loop.
//! - Sync requests made while a sync runs are dropped, not queued.
//! - Canonical writes finish before their sync task is enqueued.

use crate::config::EngineConfig;
use crate::geometry::classifier::LatticeValidation;
use crate::geometry::reciprocal::ReciprocalCalculator;
use crate::model::lattice::{Lattice, LatticeId};
use crate::model::project::{CanvasLatticeElement, Project, ProjectId, SceneElement};
use crate::repo::storage::{StorageError, StorageResult, StorageService};
use crate::service::lattice_store::{
    LatticeDraft, LatticePatch, LatticeStore, ProjectDraft, ProjectPatch,
};
use crate::sync::queue::{Enqueued, SyncQueue};
use crate::sync::scene_sync::{SceneSynchronizer, SyncOutcome, SyncState, Viewport};
use log::{debug, info};
use std::cell::RefCell;
use std::rc::Rc;

/// Notified after the synchronizer writes a scene.
///
/// Implementations may call back into the workspace.
pub trait SceneObserver<S: StorageService> {
    fn scene_rewritten(&self, workspace: &Workspace<S>, project: &Project);
}

/// Outcome of resolving an embedded lattice element.
#[derive(Debug, Clone, PartialEq)]
pub enum ResolvedLattice {
    Linked(Lattice),
    /// Target was deleted; render a placeholder.
    Missing(LatticeId),
    /// Element carries no lattice reference.
    Unlinked,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncRequest {
    Scheduled(Enqueued),
    Dropped { active: LatticeId },
}

pub struct Workspace<S: StorageService> {
    store: LatticeStore<S>,
    synchronizer: SceneSynchronizer,
    queue: SyncQueue,
    observers: RefCell<Vec<Rc<dyn SceneObserver<S>>>>,
}

impl<S: StorageService> Workspace<S> {
    pub fn new(storage: S, config: &EngineConfig) -> Self {
        Self::from_store(LatticeStore::new(storage, config), config)
    }

    pub fn with_calculator(
        storage: S,
        config: &EngineConfig,
        calculator: ReciprocalCalculator,
    ) -> Self {
        Self::from_store(
            LatticeStore::with_calculator(storage, config, calculator),
            config,
        )
    }

    fn from_store(store: LatticeStore<S>, config: &EngineConfig) -> Self {
        Self {
            store,
            synchronizer: SceneSynchronizer::new(),
            queue: SyncQueue::new(config.coalesce_sync_tasks),
            observers: RefCell::new(Vec::new()),
        }
    }

    pub fn store(&self) -> &LatticeStore<S> {
        &self.store
    }

    pub fn sync_state(&self) -> SyncState {
        self.synchronizer.state()
    }

    pub fn pending_sync_tasks(&self) -> usize {
        self.queue.len()
    }

    pub fn set_viewport(&self, viewport: Rc<dyn Viewport>) {
        self.synchronizer.set_viewport(viewport);
    }

    pub fn add_scene_observer(&self, observer: Rc<dyn SceneObserver<S>>) {
        self.observers.borrow_mut().push(observer);
    }

    pub fn create_lattice(&self, draft: LatticeDraft) -> StorageResult<Lattice> {
        self.store.create_lattice(draft)
    }

    /// Updates a lattice and schedules synchronization of its scene copies.
    ///
    /// Returns `Ok(None)` when rejected: either the lattice is being
    /// synchronized right now or another update of it is in flight.
    pub fn update_lattice(
        &self,
        id: LatticeId,
        patch: LatticePatch,
    ) -> StorageResult<Option<Lattice>> {
        if self.synchronizer.state() == SyncState::Updating(id) {
            info!(
                "event=lattice_update module=workspace status=rejected reason=syncing lattice_id={id}"
            );
            return Ok(None);
        }

        let updated = self.store.update_lattice(id, patch)?;
        if updated.is_some() {
            self.request_sync(id);
        }
        Ok(updated)
    }

    pub fn delete_lattice(&self, id: LatticeId) -> StorageResult<()> {
        self.store.delete_lattice(id)
    }

    pub fn create_project(&self, draft: ProjectDraft) -> StorageResult<Project> {
        self.store.create_project(draft)
    }

    pub fn update_project(&self, id: ProjectId, patch: ProjectPatch) -> StorageResult<Project> {
        self.store.update_project(id, patch)
    }

    /// Places a copy of the lattice into the project's scene and links them.
    pub fn embed_lattice(
        &self,
        project_id: ProjectId,
        lattice_id: LatticeId,
        element_id: impl Into<String>,
    ) -> StorageResult<Project> {
        let lattice = self.store.require_lattice(lattice_id)?;
        let mut scene = self.store.require_project(project_id)?.scene;
        scene.elements.push(SceneElement::Lattice(CanvasLatticeElement::linked(
            element_id,
            lattice_id,
            lattice.meep_lattice.scaled_planar_basis(),
        )));
        let project = self.store.update_project(
            project_id,
            ProjectPatch {
                scene: Some(scene),
                ..ProjectPatch::default()
            },
        )?;
        self.store.link_lattice_to_project(lattice_id, project_id)?;
        Ok(project)
    }

    /// Enqueues a sync task unless a synchronization is running.
    pub fn request_sync(&self, lattice_id: LatticeId) -> SyncRequest {
        if let Some(active) = self.synchronizer.state().active_lattice() {
            info!(
                "event=sync_request module=workspace status=dropped lattice_id={lattice_id} active_lattice_id={active}"
            );
            return SyncRequest::Dropped { active };
        }
        let enqueued = self.queue.push(lattice_id);
        debug!(
            "event=sync_request module=workspace status=queued lattice_id={lattice_id} result={enqueued:?}"
        );
        SyncRequest::Scheduled(enqueued)
    }

    /// Drains the task queue, running each synchronization in order.
    pub fn run_pending(&self) -> StorageResult<Vec<SyncOutcome>> {
        let mut outcomes = Vec::new();
        while let Some(task) = self.queue.pop() {
            outcomes.push(self.synchronize(task.lattice_id)?);
        }
        Ok(outcomes)
    }

    /// Runs one synchronization immediately, bypassing the queue.
    pub fn synchronize(&self, lattice_id: LatticeId) -> StorageResult<SyncOutcome> {
        self.synchronizer
            .synchronize(&self.store, lattice_id, |project| {
                let observers: Vec<_> = self.observers.borrow().iter().cloned().collect();
                for observer in observers {
                    observer.scene_rewritten(self, project);
                }
            })
    }

    /// Follows an element's weak reference.
    ///
    /// Returns `Ok(None)` when the scene has no lattice element `element_id`.
    pub fn resolve_element(
        &self,
        project_id: ProjectId,
        element_id: &str,
    ) -> StorageResult<Option<ResolvedLattice>> {
        let project = self.store.require_project(project_id)?;
        let Some(element) = project
            .scene
            .find_element(element_id)
            .and_then(SceneElement::as_lattice)
        else {
            return Ok(None);
        };
        let Some(lattice_id) = element.lattice_document_id else {
            return Ok(Some(ResolvedLattice::Unlinked));
        };
        Ok(Some(match self.store.get_lattice(lattice_id)? {
            Some(lattice) => ResolvedLattice::Linked(lattice),
            None => ResolvedLattice::Missing(lattice_id),
        }))
    }

    pub fn check_lattice_type(&self, id: LatticeId) -> StorageResult<LatticeValidation> {
        self.store.check_lattice_type(id)
    }

    /// Lattice for `id`, or `LatticeNotFound`.
    pub fn lattice(&self, id: LatticeId) -> StorageResult<Lattice> {
        self.store.require_lattice(id)
    }

    pub fn project(&self, id: ProjectId) -> StorageResult<Project> {
        self.store
            .get_project(id)?
            .ok_or(StorageError::ProjectNotFound(id))
    }
}
