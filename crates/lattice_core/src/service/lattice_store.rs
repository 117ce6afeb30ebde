//! Lattice document store.
//!
//! # Responsibility
//! - CRUD over lattices and projects on top of a `StorageService`.
//! - Keep derived reciprocal data and `parameters` in step with the basis.
//! - Maintain `projectIds` back-references and report drift between them
//!   and scene contents.
//!
//! # Invariants
//! - A lattice update is rejected (`Ok(None)`) while another update of the
//!   same document is still running.
//! - Geometry failures never abort a write: the basis is saved and the
//!   previous derived fields are kept.
//! - `updated_at` strictly increases on every write.
//! - Basis edits reclassify the lattice unless the caller chose `custom`;
//!   a `custom` label that came from degenerate input is not kept.
//! - Deleting a document never touches other documents.

use crate::config::{ClassifierTolerances, EngineConfig};
use crate::geometry::classifier::{classify, measure, validate, LatticeValidation};
use crate::geometry::reciprocal::{scaled_basis, ReciprocalCalculator};
use crate::model::lattice::{
    DisplaySettings, Lattice, LatticeId, LatticeParameters, LatticeType, MeepLattice, VoronoiData,
};
use crate::model::project::{Project, ProjectId, Scene};
use crate::model::vector::Vec3;
use crate::repo::storage::{StorageError, StorageResult, StorageService};
use log::{debug, info, warn};
use nalgebra::Vector3;
use std::cell::RefCell;
use std::collections::BTreeSet;
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// Input for [`LatticeStore::create_lattice`]; unset fields take defaults.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LatticeDraft {
    pub title: Option<String>,
    pub description: Option<String>,
    /// Classified from the basis when unset.
    pub lattice_type: Option<LatticeType>,
    pub meep_lattice: Option<MeepLattice>,
    pub display_settings: Option<DisplaySettings>,
}

/// Partial lattice update. `None` leaves a field unchanged.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LatticePatch {
    pub title: Option<String>,
    pub description: Option<Option<String>>,
    pub lattice_type: Option<LatticeType>,
    pub basis1: Option<Vec3>,
    pub basis2: Option<Vec3>,
    pub basis3: Option<Vec3>,
    pub basis_size: Option<Vec3>,
    pub display_settings: Option<DisplaySettings>,
    pub voronoi_data: Option<Option<VoronoiData>>,
}

impl LatticePatch {
    pub fn basis(basis1: Vec3, basis2: Vec3) -> Self {
        Self {
            basis1: Some(basis1),
            basis2: Some(basis2),
            ..Self::default()
        }
    }

    pub fn touches_basis(&self) -> bool {
        self.basis1.is_some()
            || self.basis2.is_some()
            || self.basis3.is_some()
            || self.basis_size.is_some()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProjectDraft {
    pub title: Option<String>,
    pub description: Option<String>,
    pub scene: Option<Scene>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProjectPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub scene: Option<Scene>,
}

/// Scene element pointing at a lattice that no longer exists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DanglingReference {
    pub project_id: ProjectId,
    pub element_id: String,
    pub lattice_id: LatticeId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct LinkRef {
    pub lattice_id: LatticeId,
    pub project_id: ProjectId,
}

/// Read-only comparison of back-references against scene contents.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconciliationReport {
    pub dangling: Vec<DanglingReference>,
    /// Lattice lists a project whose scene no longer references it.
    pub stale_links: Vec<LinkRef>,
    /// Scene references a lattice that does not list the project.
    pub missing_links: Vec<LinkRef>,
}

impl ReconciliationReport {
    pub fn is_consistent(&self) -> bool {
        self.dangling.is_empty() && self.stale_links.is_empty() && self.missing_links.is_empty()
    }
}

pub(crate) fn now_epoch_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX))
        .unwrap_or_default()
}

fn next_timestamp(previous: i64) -> i64 {
    now_epoch_ms().max(previous.saturating_add(1))
}

/// Removes its id from the in-flight set on drop, including on early return.
struct InFlightGuard<'a> {
    in_flight: &'a RefCell<BTreeSet<LatticeId>>,
    id: LatticeId,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.in_flight.borrow_mut().remove(&self.id);
    }
}

pub struct LatticeStore<S: StorageService> {
    storage: S,
    calculator: ReciprocalCalculator,
    tolerances: ClassifierTolerances,
    in_flight: RefCell<BTreeSet<LatticeId>>,
}

impl<S: StorageService> LatticeStore<S> {
    pub fn new(storage: S, config: &EngineConfig) -> Self {
        Self::with_calculator(storage, config, ReciprocalCalculator::new(config))
    }

    /// Store whose derivations go through `calculator` (e.g. one with a
    /// native numerics module attached).
    pub fn with_calculator(
        storage: S,
        config: &EngineConfig,
        calculator: ReciprocalCalculator,
    ) -> Self {
        Self {
            storage,
            calculator,
            tolerances: config.tolerances,
            in_flight: RefCell::new(BTreeSet::new()),
        }
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn tolerances(&self) -> &ClassifierTolerances {
        &self.tolerances
    }

    pub fn is_update_in_flight(&self, id: LatticeId) -> bool {
        self.in_flight.borrow().contains(&id)
    }

    pub fn fetch_lattices(&self) -> StorageResult<Vec<Lattice>> {
        self.storage.fetch_lattices()
    }

    pub fn get_lattice(&self, id: LatticeId) -> StorageResult<Option<Lattice>> {
        self.storage.get_lattice(id)
    }

    pub fn require_lattice(&self, id: LatticeId) -> StorageResult<Lattice> {
        self.storage
            .get_lattice(id)?
            .ok_or(StorageError::LatticeNotFound(id))
    }

    /// Creates a lattice, deriving reciprocal data from its basis.
    pub fn create_lattice(&self, draft: LatticeDraft) -> StorageResult<Lattice> {
        let mut lattice = Lattice::new(Uuid::new_v4(), now_epoch_ms());
        if let Some(title) = draft.title {
            lattice.title = title;
        }
        lattice.description = draft.description;
        if let Some(meep_lattice) = draft.meep_lattice {
            lattice.meep_lattice = meep_lattice;
        }
        if let Some(display_settings) = draft.display_settings {
            lattice.display_settings = display_settings;
        }

        self.derive(&mut lattice);
        lattice.explicit_type = draft.lattice_type.is_some();
        lattice.lattice_type = match draft.lattice_type {
            Some(explicit) => {
                self.warn_on_violations(&lattice, explicit);
                explicit
            }
            None => self.classify_basis(&lattice.meep_lattice),
        };

        self.storage.create_lattice(&lattice)?;
        info!(
            "event=lattice_create module=store status=ok lattice_id={} lattice_type={} backend={}",
            lattice.document_id,
            lattice.lattice_type,
            self.storage.backend_name()
        );
        Ok(lattice)
    }

    /// Merges `patch` into the stored lattice.
    ///
    /// Returns `Ok(None)` when an update of the same document is already in
    /// flight; the patch is dropped.
    ///
    /// # Errors
    /// - `LatticeNotFound` for unknown ids.
    /// - Backend failures from the storage service.
    pub fn update_lattice(
        &self,
        id: LatticeId,
        patch: LatticePatch,
    ) -> StorageResult<Option<Lattice>> {
        if !self.in_flight.borrow_mut().insert(id) {
            info!(
                "event=lattice_update module=store status=rejected reason=in_flight lattice_id={id}"
            );
            return Ok(None);
        }
        let _guard = InFlightGuard {
            in_flight: &self.in_flight,
            id,
        };

        let mut lattice = self.require_lattice(id)?;
        let touches_basis = patch.touches_basis();

        if let Some(title) = patch.title {
            lattice.title = title;
        }
        if let Some(description) = patch.description {
            lattice.description = description;
        }
        if let Some(display_settings) = patch.display_settings {
            lattice.display_settings = display_settings;
        }

        if touches_basis {
            let meep = &mut lattice.meep_lattice;
            meep.basis1 = patch.basis1.unwrap_or(meep.basis1);
            meep.basis2 = patch.basis2.unwrap_or(meep.basis2);
            meep.basis3 = patch.basis3.unwrap_or(meep.basis3);
            meep.basis_size = patch.basis_size.unwrap_or(meep.basis_size);
            // Cached cells were computed for the previous basis.
            lattice.voronoi_data = None;
            self.derive(&mut lattice);
        }
        if let Some(voronoi_data) = patch.voronoi_data {
            lattice.voronoi_data = voronoi_data;
        }

        match patch.lattice_type {
            Some(explicit) => {
                self.warn_on_violations(&lattice, explicit);
                lattice.lattice_type = explicit;
                lattice.explicit_type = true;
            }
            // Only a custom type chosen by the caller survives basis edits.
            None if touches_basis && !lattice.is_custom_by_choice() => {
                lattice.lattice_type = self.classify_basis(&lattice.meep_lattice);
                lattice.explicit_type = false;
            }
            None => {}
        }

        lattice.updated_at = next_timestamp(lattice.updated_at);
        self.storage.update_lattice(&lattice)?;
        info!(
            "event=lattice_update module=store status=ok lattice_id={id} basis_changed={touches_basis} lattice_type={} backend={}",
            lattice.lattice_type,
            self.storage.backend_name()
        );
        Ok(Some(lattice))
    }

    /// Deletes the lattice only; scene references to it become dangling.
    pub fn delete_lattice(&self, id: LatticeId) -> StorageResult<()> {
        self.storage.delete_lattice(id)?;
        info!("event=lattice_delete module=store status=ok lattice_id={id}");
        Ok(())
    }

    pub fn fetch_projects(&self) -> StorageResult<Vec<Project>> {
        self.storage.fetch_projects()
    }

    pub fn get_project(&self, id: ProjectId) -> StorageResult<Option<Project>> {
        self.storage.get_project(id)
    }

    pub fn require_project(&self, id: ProjectId) -> StorageResult<Project> {
        self.storage
            .get_project(id)?
            .ok_or(StorageError::ProjectNotFound(id))
    }

    pub fn create_project(&self, draft: ProjectDraft) -> StorageResult<Project> {
        let mut project = Project::new(Uuid::new_v4(), now_epoch_ms());
        if let Some(title) = draft.title {
            project.title = title;
        }
        if let Some(description) = draft.description {
            project.description = description;
        }
        if let Some(scene) = draft.scene {
            project.scene = scene;
        }
        self.storage.create_project(&project)?;
        info!(
            "event=project_create module=store status=ok project_id={}",
            project.document_id
        );
        Ok(project)
    }

    pub fn update_project(&self, id: ProjectId, patch: ProjectPatch) -> StorageResult<Project> {
        let mut project = self.require_project(id)?;
        if let Some(title) = patch.title {
            project.title = title;
        }
        if let Some(description) = patch.description {
            project.description = description;
        }
        if let Some(scene) = patch.scene {
            project.scene = scene;
        }
        project.updated_at = next_timestamp(project.updated_at);
        self.storage.update_project(&project)?;
        debug!("event=project_update module=store status=ok project_id={id}");
        Ok(project)
    }

    /// Deletes the project only; lattices keep listing it until pruned.
    pub fn delete_project(&self, id: ProjectId) -> StorageResult<()> {
        self.storage.delete_project(id)?;
        info!("event=project_delete module=store status=ok project_id={id}");
        Ok(())
    }

    /// Adds `project_id` to the lattice's back-references.
    ///
    /// Returns whether anything changed; a repeated link writes nothing.
    pub fn link_lattice_to_project(
        &self,
        lattice_id: LatticeId,
        project_id: ProjectId,
    ) -> StorageResult<bool> {
        self.require_project(project_id)?;
        let mut lattice = self.require_lattice(lattice_id)?;
        if !lattice.project_ids.insert(project_id) {
            return Ok(false);
        }
        lattice.updated_at = next_timestamp(lattice.updated_at);
        self.storage.update_lattice(&lattice)?;
        info!(
            "event=lattice_link module=store status=ok lattice_id={lattice_id} project_id={project_id}"
        );
        Ok(true)
    }

    /// Removes `project_id` from the back-references; idempotent.
    ///
    /// The project itself need not exist, so links to deleted projects can
    /// be cleaned up.
    pub fn unlink_lattice_from_project(
        &self,
        lattice_id: LatticeId,
        project_id: ProjectId,
    ) -> StorageResult<bool> {
        let mut lattice = self.require_lattice(lattice_id)?;
        if !lattice.project_ids.remove(&project_id) {
            return Ok(false);
        }
        lattice.updated_at = next_timestamp(lattice.updated_at);
        self.storage.update_lattice(&lattice)?;
        info!(
            "event=lattice_unlink module=store status=ok lattice_id={lattice_id} project_id={project_id}"
        );
        Ok(true)
    }

    /// Projects whose scene holds at least one element referencing `lattice_id`.
    pub fn projects_using_lattice(&self, lattice_id: LatticeId) -> StorageResult<Vec<Project>> {
        Ok(self
            .storage
            .fetch_projects()?
            .into_iter()
            .filter(|project| project.scene.references(&lattice_id))
            .collect())
    }

    /// Existing lattices referenced by the project's scene.
    pub fn lattices_used_by_project(&self, project_id: ProjectId) -> StorageResult<Vec<Lattice>> {
        let project = self.require_project(project_id)?;
        let mut lattices = Vec::new();
        for lattice_id in project.scene.referenced_lattices() {
            if let Some(lattice) = self.storage.get_lattice(lattice_id)? {
                lattices.push(lattice);
            }
        }
        Ok(lattices)
    }

    /// Validates the stored lattice against its own declared type.
    pub fn check_lattice_type(&self, id: LatticeId) -> StorageResult<LatticeValidation> {
        let lattice = self.require_lattice(id)?;
        let [a1, a2, _] = scaled_real_basis(&lattice.meep_lattice);
        Ok(validate(&a1, &a2, lattice.lattice_type, &self.tolerances))
    }

    /// Compares every back-reference with every scene; writes nothing.
    pub fn reconcile(&self) -> StorageResult<ReconciliationReport> {
        let lattices = self.storage.fetch_lattices()?;
        let projects = self.storage.fetch_projects()?;
        let mut report = ReconciliationReport::default();

        for project in &projects {
            for element in project.scene.lattice_elements() {
                let Some(lattice_id) = element.lattice_document_id else {
                    continue;
                };
                match lattices.iter().find(|l| l.document_id == lattice_id) {
                    None => report.dangling.push(DanglingReference {
                        project_id: project.document_id,
                        element_id: element.id.clone(),
                        lattice_id,
                    }),
                    Some(lattice) if !lattice.is_linked_to(&project.document_id) => {
                        let link = LinkRef {
                            lattice_id,
                            project_id: project.document_id,
                        };
                        if !report.missing_links.contains(&link) {
                            report.missing_links.push(link);
                        }
                    }
                    Some(_) => {}
                }
            }
        }

        for lattice in &lattices {
            for project_id in &lattice.project_ids {
                let still_referenced = projects
                    .iter()
                    .find(|project| project.document_id == *project_id)
                    .is_some_and(|project| project.scene.references(&lattice.document_id));
                if !still_referenced {
                    report.stale_links.push(LinkRef {
                        lattice_id: lattice.document_id,
                        project_id: *project_id,
                    });
                }
            }
        }

        info!(
            "event=reconcile module=store status=ok dangling={} stale_links={} missing_links={}",
            report.dangling.len(),
            report.stale_links.len(),
            report.missing_links.len()
        );
        Ok(report)
    }

    /// Unlinks every stale back-reference found by [`Self::reconcile`].
    pub fn prune_stale_links(&self) -> StorageResult<usize> {
        let report = self.reconcile()?;
        let mut pruned = 0;
        for link in &report.stale_links {
            if self.unlink_lattice_from_project(link.lattice_id, link.project_id)? {
                pruned += 1;
            }
        }
        Ok(pruned)
    }

    fn classify_basis(&self, meep: &MeepLattice) -> LatticeType {
        let [a1, a2, _] = scaled_real_basis(meep);
        classify(&a1, &a2, &self.tolerances).lattice_type
    }

    fn warn_on_violations(&self, lattice: &Lattice, expected: LatticeType) {
        let [a1, a2, _] = scaled_real_basis(&lattice.meep_lattice);
        let report = validate(&a1, &a2, expected, &self.tolerances);
        for violation in &report.violations {
            warn!(
                "event=lattice_validate module=store status=violation lattice_id={} lattice_type={expected} violation=\"{violation}\"",
                lattice.document_id
            );
        }
    }

    /// Recomputes derived fields; on failure keeps the previous ones.
    fn derive(&self, lattice: &mut Lattice) {
        let meep = &lattice.meep_lattice;
        let basis3: Vector3<f64> = meep.basis3.into();
        let result = self.calculator.compute(
            &meep.basis1.into(),
            &meep.basis2.into(),
            Some(&basis3),
            &meep.basis_size.into(),
        );

        let [a1, a2, _] = scaled_real_basis(meep);
        if let Some(m) = measure(&a1, &a2) {
            lattice.parameters = LatticeParameters {
                a: a1.norm(),
                b: a2.norm(),
                alpha: m.angle_deg,
            };
        }

        match result {
            Ok(derived) => lattice.meep_lattice.apply_derived(&derived),
            Err(err) => warn!(
                "event=lattice_derive module=store status=error lattice_id={} kept_previous={} error=\"{err}\"",
                lattice.document_id,
                lattice.meep_lattice.has_derived()
            ),
        }
    }
}

fn scaled_real_basis(meep: &MeepLattice) -> [Vector3<f64>; 3] {
    let basis3: Vector3<f64> = meep.basis3.into();
    scaled_basis(
        &meep.basis1.into(),
        &meep.basis2.into(),
        Some(&basis3),
        &meep.basis_size.into(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repo::memory_storage::InMemoryStorage;

    fn store() -> LatticeStore<InMemoryStorage> {
        LatticeStore::new(InMemoryStorage::new(), &EngineConfig::default())
    }

    #[test]
    fn create_applies_defaults_and_derives() {
        let lattice = store().create_lattice(LatticeDraft::default()).unwrap();
        assert_eq!(lattice.title, Lattice::DEFAULT_TITLE);
        assert_eq!(lattice.lattice_type, LatticeType::Quadratic);
        assert!(lattice.meep_lattice.has_derived());
        assert_eq!(lattice.parameters.a, 1.0);
        assert!((lattice.parameters.alpha - 90.0).abs() < 1e-9);
    }

    #[test]
    fn basis_patch_reclassifies_and_clears_cached_cells() {
        let store = store();
        let lattice = store.create_lattice(LatticeDraft::default()).unwrap();
        store
            .update_lattice(
                lattice.document_id,
                LatticePatch {
                    voronoi_data: Some(Some(VoronoiData::default())),
                    ..LatticePatch::default()
                },
            )
            .unwrap();

        let updated = store
            .update_lattice(
                lattice.document_id,
                LatticePatch::basis(Vec3::new(1.0, 0.0, 0.0), Vec3::new(0.0, 2.0, 0.0)),
            )
            .unwrap()
            .unwrap();
        assert_eq!(updated.lattice_type, LatticeType::Rectangular);
        assert!(updated.voronoi_data.is_none());
        assert!(updated.updated_at > lattice.updated_at);
        assert_eq!(updated.parameters.b, 2.0);
    }

    #[test]
    fn custom_type_survives_basis_edits() {
        let store = store();
        let lattice = store
            .create_lattice(LatticeDraft {
                lattice_type: Some(LatticeType::Custom),
                ..LatticeDraft::default()
            })
            .unwrap();
        let updated = store
            .update_lattice(
                lattice.document_id,
                LatticePatch::basis(Vec3::new(1.0, 0.0, 0.0), Vec3::new(0.0, 3.0, 0.0)),
            )
            .unwrap()
            .unwrap();
        assert_eq!(updated.lattice_type, LatticeType::Custom);
    }

    #[test]
    fn degenerate_basis_is_saved_with_previous_derived_fields() {
        let store = store();
        let lattice = store.create_lattice(LatticeDraft::default()).unwrap();
        let before = lattice.meep_lattice.reciprocal_basis().unwrap();

        let updated = store
            .update_lattice(
                lattice.document_id,
                LatticePatch::basis(Vec3::new(1.0, 0.0, 0.0), Vec3::new(2.0, 0.0, 0.0)),
            )
            .unwrap()
            .unwrap();
        assert_eq!(updated.meep_lattice.basis2, Vec3::new(2.0, 0.0, 0.0));
        assert_eq!(updated.meep_lattice.reciprocal_basis().unwrap(), before);
        assert_eq!(updated.lattice_type, LatticeType::Custom);
    }

    #[test]
    fn collinear_edit_does_not_pin_custom() {
        let store = store();
        let lattice = store.create_lattice(LatticeDraft::default()).unwrap();

        let collinear = store
            .update_lattice(
                lattice.document_id,
                LatticePatch::basis(Vec3::new(1.0, 0.0, 0.0), Vec3::new(2.0, 0.0, 0.0)),
            )
            .unwrap()
            .unwrap();
        assert_eq!(collinear.lattice_type, LatticeType::Custom);
        assert!(!collinear.is_custom_by_choice());

        let back = store
            .update_lattice(
                lattice.document_id,
                LatticePatch::basis(Vec3::new(1.0, 0.0, 0.0), Vec3::new(0.0, 1.0, 0.0)),
            )
            .unwrap()
            .unwrap();
        assert_eq!(back.lattice_type, LatticeType::Quadratic);
    }

    #[test]
    fn patching_custom_pins_it_until_another_type_is_chosen() {
        let store = store();
        let lattice = store.create_lattice(LatticeDraft::default()).unwrap();
        let id = lattice.document_id;

        store
            .update_lattice(
                id,
                LatticePatch {
                    lattice_type: Some(LatticeType::Custom),
                    ..LatticePatch::default()
                },
            )
            .unwrap();
        let edited = store
            .update_lattice(
                id,
                LatticePatch::basis(Vec3::new(1.0, 0.0, 0.0), Vec3::new(0.0, 2.0, 0.0)),
            )
            .unwrap()
            .unwrap();
        assert_eq!(edited.lattice_type, LatticeType::Custom);

        store
            .update_lattice(
                id,
                LatticePatch {
                    lattice_type: Some(LatticeType::Rectangular),
                    ..LatticePatch::default()
                },
            )
            .unwrap();
        let reclassified = store
            .update_lattice(
                id,
                LatticePatch::basis(Vec3::new(1.0, 0.0, 0.0), Vec3::new(0.0, 1.0, 0.0)),
            )
            .unwrap()
            .unwrap();
        assert_eq!(reclassified.lattice_type, LatticeType::Quadratic);
        assert!(!reclassified.explicit_type);
    }

    #[test]
    fn update_of_unknown_lattice_is_not_found() {
        let err = store()
            .update_lattice(Uuid::new_v4(), LatticePatch::default())
            .unwrap_err();
        assert!(matches!(err, StorageError::LatticeNotFound(_)));
    }

    #[test]
    fn in_flight_guard_is_released_after_errors() {
        let store = store();
        let id = Uuid::new_v4();
        assert!(store.update_lattice(id, LatticePatch::default()).is_err());
        assert!(!store.is_update_in_flight(id));
    }
}
