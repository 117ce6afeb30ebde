//! Scene synchronizer.
//!
//! # Responsibility
//! - Rewrite every embedded copy of a lattice to the canonical scaled basis.
//! - Notify the viewport once per completed run.
//!
//! # Invariants
//! - While a run is active, any further run is dropped, not deferred.
//! - State is reset to `Idle` on every exit path, errors included.
//! - Only `basis1`/`basis2` of referencing elements are rewritten; scenes
//!   already in step are not written again.

use crate::model::lattice::{LatticeId, LatticeType};
use crate::model::project::Project;
use crate::model::vector::Vec2;
use crate::repo::storage::{StorageResult, StorageService};
use crate::service::lattice_store::{LatticeStore, ProjectPatch};
use log::{info, warn};
use std::cell::{Cell, RefCell};
use std::rc::Rc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncState {
    #[default]
    Idle,
    Updating(LatticeId),
}

impl SyncState {
    pub fn active_lattice(self) -> Option<LatticeId> {
        match self {
            Self::Idle => None,
            Self::Updating(id) => Some(id),
        }
    }
}

/// Rendering collaborator; purely observational.
pub trait Viewport {
    fn basis_changed(&self, basis1: Vec2, basis2: Vec2, lattice_type: LatticeType);
    fn request_redraw(&self);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NullViewport;

impl Viewport for NullViewport {
    fn basis_changed(&self, _basis1: Vec2, _basis2: Vec2, _lattice_type: LatticeType) {}

    fn request_redraw(&self) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    Completed {
        lattice_id: LatticeId,
        scenes_rewritten: usize,
    },
    /// Another run was active; nothing was done and nothing is retried.
    Dropped {
        requested: LatticeId,
        active: LatticeId,
    },
    LatticeMissing(LatticeId),
}

struct StateGuard<'a> {
    state: &'a Cell<SyncState>,
}

impl Drop for StateGuard<'_> {
    fn drop(&mut self) {
        self.state.set(SyncState::Idle);
    }
}

pub struct SceneSynchronizer {
    state: Cell<SyncState>,
    viewport: RefCell<Rc<dyn Viewport>>,
}

impl Default for SceneSynchronizer {
    fn default() -> Self {
        Self::new()
    }
}

impl SceneSynchronizer {
    pub fn new() -> Self {
        Self {
            state: Cell::new(SyncState::Idle),
            viewport: RefCell::new(Rc::new(NullViewport)),
        }
    }

    pub fn state(&self) -> SyncState {
        self.state.get()
    }

    pub fn set_viewport(&self, viewport: Rc<dyn Viewport>) {
        *self.viewport.borrow_mut() = viewport;
    }

    /// Runs one synchronization of `lattice_id`.
    ///
    /// `on_scene_written` is called after each scene write and may call
    /// back into the store; nested runs started from it are dropped.
    pub fn synchronize<S: StorageService>(
        &self,
        store: &LatticeStore<S>,
        lattice_id: LatticeId,
        mut on_scene_written: impl FnMut(&Project),
    ) -> StorageResult<SyncOutcome> {
        if let SyncState::Updating(active) = self.state.get() {
            info!(
                "event=scene_sync module=sync status=dropped lattice_id={lattice_id} active_lattice_id={active}"
            );
            return Ok(SyncOutcome::Dropped {
                requested: lattice_id,
                active,
            });
        }

        self.state.set(SyncState::Updating(lattice_id));
        let _guard = StateGuard { state: &self.state };

        let Some(lattice) = store.get_lattice(lattice_id)? else {
            warn!("event=scene_sync module=sync status=missing lattice_id={lattice_id}");
            return Ok(SyncOutcome::LatticeMissing(lattice_id));
        };
        let (basis1, basis2) = lattice.meep_lattice.scaled_planar_basis();

        let mut scenes_rewritten = 0;
        for project in store.projects_using_lattice(lattice_id)? {
            let mut scene = project.scene;
            let mut changed = false;
            for element in scene.lattice_elements_mut() {
                if element.references(&lattice_id)
                    && (element.basis1 != basis1 || element.basis2 != basis2)
                {
                    element.basis1 = basis1;
                    element.basis2 = basis2;
                    changed = true;
                }
            }
            if !changed {
                continue;
            }

            let written = store.update_project(
                project.document_id,
                ProjectPatch {
                    scene: Some(scene),
                    ..ProjectPatch::default()
                },
            )?;
            scenes_rewritten += 1;
            on_scene_written(&written);
        }

        let viewport = Rc::clone(&self.viewport.borrow());
        viewport.basis_changed(basis1, basis2, lattice.lattice_type);
        viewport.request_redraw();

        info!(
            "event=scene_sync module=sync status=ok lattice_id={lattice_id} scenes_rewritten={scenes_rewritten}"
        );
        Ok(SyncOutcome::Completed {
            lattice_id,
            scenes_rewritten,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::model::project::{CanvasLatticeElement, SceneElement};
    use crate::model::vector::Vec3;
    use crate::repo::memory_storage::InMemoryStorage;
    use crate::service::lattice_store::{LatticeDraft, LatticePatch, ProjectDraft};

    #[test]
    fn nested_run_is_dropped_and_state_resets() {
        let store = LatticeStore::new(InMemoryStorage::new(), &EngineConfig::default());
        let outer = store.create_lattice(LatticeDraft::default()).unwrap();
        let inner = store.create_lattice(LatticeDraft::default()).unwrap();
        let project = store.create_project(ProjectDraft::default()).unwrap();
        let mut scene = project.scene.clone();
        scene.elements.push(SceneElement::Lattice(CanvasLatticeElement::linked(
            "l1",
            outer.document_id,
            (Vec2::new(0.0, 0.0), Vec2::new(0.0, 0.0)),
        )));
        store
            .update_project(
                project.document_id,
                ProjectPatch {
                    scene: Some(scene),
                    ..ProjectPatch::default()
                },
            )
            .unwrap();

        let sync = SceneSynchronizer::new();
        let mut nested = None;
        let outcome = sync
            .synchronize(&store, outer.document_id, |_| {
                nested = Some(sync.synchronize(&store, inner.document_id, |_| {}).unwrap());
            })
            .unwrap();

        assert_eq!(
            outcome,
            SyncOutcome::Completed {
                lattice_id: outer.document_id,
                scenes_rewritten: 1
            }
        );
        assert_eq!(
            nested,
            Some(SyncOutcome::Dropped {
                requested: inner.document_id,
                active: outer.document_id
            })
        );
        assert_eq!(sync.state(), SyncState::Idle);
    }

    #[test]
    fn missing_lattice_resets_state() {
        let store = LatticeStore::new(InMemoryStorage::new(), &EngineConfig::default());
        let sync = SceneSynchronizer::new();
        let id = uuid::Uuid::new_v4();
        let outcome = sync.synchronize(&store, id, |_| {}).unwrap();
        assert_eq!(outcome, SyncOutcome::LatticeMissing(id));
        assert_eq!(sync.state(), SyncState::Idle);
    }

    #[test]
    fn scenes_already_in_step_are_not_rewritten() {
        let store = LatticeStore::new(InMemoryStorage::new(), &EngineConfig::default());
        let lattice = store.create_lattice(LatticeDraft::default()).unwrap();
        let basis = lattice.meep_lattice.scaled_planar_basis();
        let mut scene = crate::model::project::Scene::default();
        scene.elements.push(SceneElement::Lattice(CanvasLatticeElement::linked(
            "l1",
            lattice.document_id,
            basis,
        )));
        store
            .create_project(ProjectDraft {
                scene: Some(scene),
                ..ProjectDraft::default()
            })
            .unwrap();

        let sync = SceneSynchronizer::new();
        let outcome = sync.synchronize(&store, lattice.document_id, |_| {}).unwrap();
        assert!(matches!(
            outcome,
            SyncOutcome::Completed {
                scenes_rewritten: 0,
                ..
            }
        ));

        store
            .update_lattice(
                lattice.document_id,
                LatticePatch {
                    basis_size: Some(Vec3::new(2.0, 2.0, 1.0)),
                    ..LatticePatch::default()
                },
            )
            .unwrap();
        let outcome = sync.synchronize(&store, lattice.document_id, |_| {}).unwrap();
        assert!(matches!(
            outcome,
            SyncOutcome::Completed {
                scenes_rewritten: 1,
                ..
            }
        ));
    }
}
