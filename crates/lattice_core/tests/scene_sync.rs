use lattice_core::sync::queue::Enqueued;
use lattice_core::{
    CanvasLatticeElement, EngineConfig, InMemoryStorage, Lattice, LatticeDraft, LatticeId,
    LatticePatch, LatticeType, Project, ProjectDraft, ProjectPatch, ResolvedLattice,
    SceneElement, SceneObserver, StorageError, StorageResult, StorageService, SyncOutcome,
    SyncRequest, SyncState, Vec2, Vec3, Viewport, Workspace,
};
use std::cell::{Cell, RefCell};
use std::rc::Rc;

/// In-memory storage counting canonical lattice writes.
#[derive(Default)]
struct CountingStorage {
    inner: InMemoryStorage,
    lattice_writes: Cell<usize>,
    /// Makes every project write fail while set.
    fail_project_updates: Cell<bool>,
}

impl StorageService for CountingStorage {
    fn backend_name(&self) -> &'static str {
        "counting"
    }

    fn fetch_lattices(&self) -> StorageResult<Vec<Lattice>> {
        self.inner.fetch_lattices()
    }

    fn get_lattice(&self, id: uuid::Uuid) -> StorageResult<Option<Lattice>> {
        self.inner.get_lattice(id)
    }

    fn create_lattice(&self, lattice: &Lattice) -> StorageResult<()> {
        self.inner.create_lattice(lattice)
    }

    fn update_lattice(&self, lattice: &Lattice) -> StorageResult<()> {
        self.lattice_writes.set(self.lattice_writes.get() + 1);
        self.inner.update_lattice(lattice)
    }

    fn delete_lattice(&self, id: uuid::Uuid) -> StorageResult<()> {
        self.inner.delete_lattice(id)
    }

    fn fetch_projects(&self) -> StorageResult<Vec<Project>> {
        self.inner.fetch_projects()
    }

    fn get_project(&self, id: uuid::Uuid) -> StorageResult<Option<Project>> {
        self.inner.get_project(id)
    }

    fn create_project(&self, project: &Project) -> StorageResult<()> {
        self.inner.create_project(project)
    }

    fn update_project(&self, project: &Project) -> StorageResult<()> {
        if self.fail_project_updates.get() {
            return Err(StorageError::InvalidData("disk full".to_string()));
        }
        self.inner.update_project(project)
    }

    fn delete_project(&self, id: uuid::Uuid) -> StorageResult<()> {
        self.inner.delete_project(id)
    }
}

fn workspace() -> Workspace<CountingStorage> {
    Workspace::new(CountingStorage::default(), &EngineConfig::default())
}

fn embedded_basis(project: &Project, element_id: &str) -> (Vec2, Vec2) {
    let element = project
        .scene
        .find_element(element_id)
        .and_then(SceneElement::as_lattice)
        .unwrap();
    (element.basis1, element.basis2)
}

/// Writes the lattice back from the scene, like an editor echoing a change.
struct EchoObserver {
    lattice_id: LatticeId,
    results: RefCell<Vec<bool>>,
}

impl SceneObserver<CountingStorage> for EchoObserver {
    fn scene_rewritten(&self, workspace: &Workspace<CountingStorage>, _project: &Project) {
        let accepted = workspace
            .update_lattice(
                self.lattice_id,
                LatticePatch::basis(Vec3::new(5.0, 0.0, 0.0), Vec3::new(0.0, 5.0, 0.0)),
            )
            .unwrap()
            .is_some();
        self.results.borrow_mut().push(accepted);
    }
}

#[test]
fn observer_echo_does_not_loop() {
    let workspace = workspace();
    let lattice = workspace.create_lattice(LatticeDraft::default()).unwrap();
    let project = workspace.create_project(ProjectDraft::default()).unwrap();
    workspace
        .embed_lattice(project.document_id, lattice.document_id, "l1")
        .unwrap();

    let observer = Rc::new(EchoObserver {
        lattice_id: lattice.document_id,
        results: RefCell::new(Vec::new()),
    });
    workspace.add_scene_observer(observer.clone());

    let writes_before = workspace.store().storage().lattice_writes.get();
    let updated = workspace
        .update_lattice(
            lattice.document_id,
            LatticePatch::basis(Vec3::new(1.0, 0.0, 0.0), Vec3::new(0.0, 2.0, 0.0)),
        )
        .unwrap()
        .unwrap();
    assert_eq!(workspace.pending_sync_tasks(), 1);

    let outcomes = workspace.run_pending().unwrap();
    assert_eq!(
        outcomes,
        vec![SyncOutcome::Completed {
            lattice_id: lattice.document_id,
            scenes_rewritten: 1,
        }]
    );
    assert_eq!(*observer.results.borrow(), vec![false]);
    assert_eq!(
        workspace.store().storage().lattice_writes.get() - writes_before,
        1
    );
    assert_eq!(workspace.pending_sync_tasks(), 0);
    assert_eq!(workspace.sync_state(), SyncState::Idle);

    let stored = workspace.lattice(lattice.document_id).unwrap();
    assert_eq!(stored.meep_lattice.basis2, updated.meep_lattice.basis2);
}

#[test]
fn every_scene_converges_after_pending_tasks_run() {
    let workspace = workspace();
    let lattice = workspace.create_lattice(LatticeDraft::default()).unwrap();
    let first = workspace.create_project(ProjectDraft::default()).unwrap();
    let second = workspace.create_project(ProjectDraft::default()).unwrap();
    workspace
        .embed_lattice(first.document_id, lattice.document_id, "a")
        .unwrap();
    workspace
        .embed_lattice(second.document_id, lattice.document_id, "b")
        .unwrap();

    workspace
        .update_lattice(
            lattice.document_id,
            LatticePatch {
                basis_size: Some(Vec3::new(2.0, 3.0, 1.0)),
                ..LatticePatch::default()
            },
        )
        .unwrap()
        .unwrap();

    // Deferred: copies are stale until the queue is drained.
    let stale = workspace.project(first.document_id).unwrap();
    assert_eq!(
        embedded_basis(&stale, "a"),
        (Vec2::new(1.0, 0.0), Vec2::new(0.0, 1.0))
    );

    workspace.run_pending().unwrap();

    let canonical = workspace
        .lattice(lattice.document_id)
        .unwrap()
        .meep_lattice
        .scaled_planar_basis();
    assert_eq!(canonical, (Vec2::new(2.0, 0.0), Vec2::new(0.0, 3.0)));
    for (project_id, element_id) in [(first.document_id, "a"), (second.document_id, "b")] {
        let project = workspace.project(project_id).unwrap();
        assert_eq!(embedded_basis(&project, element_id), canonical);
    }
    assert!(workspace.store().reconcile().unwrap().is_consistent());
}

#[derive(Default)]
struct RecordingViewport {
    bases: RefCell<Vec<(Vec2, Vec2, LatticeType)>>,
    redraws: Cell<usize>,
}

impl Viewport for RecordingViewport {
    fn basis_changed(&self, basis1: Vec2, basis2: Vec2, lattice_type: LatticeType) {
        self.bases.borrow_mut().push((basis1, basis2, lattice_type));
    }

    fn request_redraw(&self) {
        self.redraws.set(self.redraws.get() + 1);
    }
}

#[test]
fn viewport_is_told_about_the_new_basis() {
    let workspace = workspace();
    let viewport = Rc::new(RecordingViewport::default());
    workspace.set_viewport(viewport.clone());

    let lattice = workspace.create_lattice(LatticeDraft::default()).unwrap();
    workspace
        .update_lattice(
            lattice.document_id,
            LatticePatch::basis(Vec3::new(1.0, 0.0, 0.0), Vec3::new(0.0, 2.0, 0.0)),
        )
        .unwrap();
    workspace.run_pending().unwrap();

    assert_eq!(
        *viewport.bases.borrow(),
        vec![(
            Vec2::new(1.0, 0.0),
            Vec2::new(0.0, 2.0),
            LatticeType::Rectangular
        )]
    );
    assert_eq!(viewport.redraws.get(), 1);
}

#[test]
fn repeated_updates_coalesce_into_one_task() {
    let workspace = workspace();
    let lattice = workspace.create_lattice(LatticeDraft::default()).unwrap();

    let first = workspace.request_sync(lattice.document_id);
    let second = workspace.request_sync(lattice.document_id);
    assert!(matches!(first, SyncRequest::Scheduled(Enqueued::Queued(_))));
    assert!(matches!(
        second,
        SyncRequest::Scheduled(Enqueued::Coalesced(_))
    ));
    assert_eq!(workspace.pending_sync_tasks(), 1);
    assert_eq!(workspace.run_pending().unwrap().len(), 1);
}

#[test]
fn queue_keeps_duplicates_when_coalescing_is_off() {
    let config = EngineConfig {
        coalesce_sync_tasks: false,
        ..EngineConfig::default()
    };
    let workspace = Workspace::new(CountingStorage::default(), &config);
    let lattice = workspace.create_lattice(LatticeDraft::default()).unwrap();
    workspace.request_sync(lattice.document_id);
    workspace.request_sync(lattice.document_id);
    assert_eq!(workspace.pending_sync_tasks(), 2);
}

/// Asks for another sync from inside a running one.
struct NestedRequester {
    other: LatticeId,
    requests: RefCell<Vec<SyncRequest>>,
}

impl SceneObserver<CountingStorage> for NestedRequester {
    fn scene_rewritten(&self, workspace: &Workspace<CountingStorage>, _project: &Project) {
        self.requests
            .borrow_mut()
            .push(workspace.request_sync(self.other));
    }
}

#[test]
fn sync_requested_during_a_run_is_dropped() {
    let workspace = workspace();
    let lattice = workspace.create_lattice(LatticeDraft::default()).unwrap();
    let other = workspace.create_lattice(LatticeDraft::default()).unwrap();
    let project = workspace.create_project(ProjectDraft::default()).unwrap();
    workspace
        .embed_lattice(project.document_id, lattice.document_id, "l1")
        .unwrap();

    let observer = Rc::new(NestedRequester {
        other: other.document_id,
        requests: RefCell::new(Vec::new()),
    });
    workspace.add_scene_observer(observer.clone());

    workspace
        .update_lattice(
            lattice.document_id,
            LatticePatch::basis(Vec3::new(2.0, 0.0, 0.0), Vec3::new(0.0, 1.0, 0.0)),
        )
        .unwrap();
    workspace.run_pending().unwrap();

    assert_eq!(
        *observer.requests.borrow(),
        vec![SyncRequest::Dropped {
            active: lattice.document_id
        }]
    );
    assert_eq!(workspace.pending_sync_tasks(), 0);
}

#[test]
fn sync_of_deleted_lattice_reports_missing() {
    let workspace = workspace();
    let lattice = workspace.create_lattice(LatticeDraft::default()).unwrap();
    workspace.request_sync(lattice.document_id);
    workspace.delete_lattice(lattice.document_id).unwrap();

    assert_eq!(
        workspace.run_pending().unwrap(),
        vec![SyncOutcome::LatticeMissing(lattice.document_id)]
    );
    assert_eq!(workspace.sync_state(), SyncState::Idle);
}

#[test]
fn elements_resolve_to_linked_missing_or_unlinked() {
    let workspace = workspace();
    let lattice = workspace.create_lattice(LatticeDraft::default()).unwrap();
    let project = workspace.create_project(ProjectDraft::default()).unwrap();
    let project = workspace
        .embed_lattice(project.document_id, lattice.document_id, "linked")
        .unwrap();

    let mut scene = project.scene.clone();
    let mut loose = CanvasLatticeElement::linked(
        "loose",
        lattice.document_id,
        (Vec2::new(1.0, 0.0), Vec2::new(0.0, 1.0)),
    );
    loose.lattice_document_id = None;
    scene.elements.push(SceneElement::Lattice(loose));
    workspace
        .update_project(
            project.document_id,
            ProjectPatch {
                scene: Some(scene),
                ..ProjectPatch::default()
            },
        )
        .unwrap();

    match workspace
        .resolve_element(project.document_id, "linked")
        .unwrap()
    {
        Some(ResolvedLattice::Linked(found)) => assert_eq!(found.document_id, lattice.document_id),
        other => panic!("unexpected resolution: {other:?}"),
    }
    assert_eq!(
        workspace.resolve_element(project.document_id, "loose").unwrap(),
        Some(ResolvedLattice::Unlinked)
    );
    assert_eq!(
        workspace.resolve_element(project.document_id, "absent").unwrap(),
        None
    );

    workspace.delete_lattice(lattice.document_id).unwrap();
    assert_eq!(
        workspace
            .resolve_element(project.document_id, "linked")
            .unwrap(),
        Some(ResolvedLattice::Missing(lattice.document_id))
    );
}

#[test]
fn storage_failure_mid_run_returns_to_idle() {
    let workspace = workspace();
    let lattice = workspace.create_lattice(LatticeDraft::default()).unwrap();
    let project = workspace.create_project(ProjectDraft::default()).unwrap();
    workspace
        .embed_lattice(project.document_id, lattice.document_id, "l1")
        .unwrap();
    workspace
        .store()
        .update_lattice(
            lattice.document_id,
            LatticePatch::basis(Vec3::new(1.0, 0.0, 0.0), Vec3::new(0.0, 2.0, 0.0)),
        )
        .unwrap()
        .unwrap();

    workspace.store().storage().fail_project_updates.set(true);
    let err = workspace.synchronize(lattice.document_id).unwrap_err();
    assert!(matches!(err, StorageError::InvalidData(_)));
    assert_eq!(workspace.sync_state(), SyncState::Idle);

    assert!(matches!(
        workspace.request_sync(lattice.document_id),
        SyncRequest::Scheduled(Enqueued::Queued(_))
    ));

    workspace.store().storage().fail_project_updates.set(false);
    assert_eq!(
        workspace.run_pending().unwrap(),
        vec![SyncOutcome::Completed {
            lattice_id: lattice.document_id,
            scenes_rewritten: 1,
        }]
    );
    let synced = workspace.project(project.document_id).unwrap();
    assert_eq!(
        embedded_basis(&synced, "l1"),
        (Vec2::new(1.0, 0.0), Vec2::new(0.0, 2.0))
    );
}
