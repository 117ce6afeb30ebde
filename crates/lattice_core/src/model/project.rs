//! Project document and its scene.
//!
//! # Responsibility
//! - Define the persisted `Project` record and the closed set of scene
//!   element kinds.
//! - Offer scene queries used by relationship bookkeeping and sync.
//!
//! # Invariants
//! - `CanvasLatticeElement::lattice_document_id` is a weak reference; the
//!   target lattice may be missing.
//! - Element `id`s are scene-local and not globally unique.

use super::lattice::LatticeId;
use super::vector::Vec2;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;

pub type ProjectId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LatticeShowMode {
    #[default]
    Points,
    Geometry,
}

/// Scene-local, denormalized copy of a lattice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanvasLatticeElement {
    pub id: String,
    pub pos: Vec2,
    pub basis1: Vec2,
    pub basis2: Vec2,
    pub multiplier: u32,
    #[serde(default)]
    pub show_mode: LatticeShowMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lattice_document_id: Option<LatticeId>,
}

impl CanvasLatticeElement {
    /// Element embedding `lattice_id` with the given planar basis.
    pub fn linked(id: impl Into<String>, lattice_id: LatticeId, basis: (Vec2, Vec2)) -> Self {
        Self {
            id: id.into(),
            pos: Vec2::default(),
            basis1: basis.0,
            basis2: basis.1,
            multiplier: 3,
            show_mode: LatticeShowMode::Points,
            lattice_document_id: Some(lattice_id),
        }
    }

    pub fn references(&self, lattice_id: &LatticeId) -> bool {
        self.lattice_document_id.as_ref() == Some(lattice_id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum GeometryShape {
    Cylinder { radius: f64 },
    Rectangle { width: f64, height: f64 },
    Triangle { vertices: [Vec2; 3] },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeometryElement {
    pub id: String,
    pub pos: Vec2,
    pub shape: GeometryShape,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum SourceKind {
    Continuous {
        frequency: f64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        width: Option<f64>,
    },
    Gaussian {
        frequency: f64,
        width: f64,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceElement {
    pub id: String,
    pub pos: Vec2,
    /// Field component, e.g. `Ez`.
    pub component: String,
    pub source: SourceKind,
}

/// Closed set of element kinds a scene can hold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum SceneElement {
    Lattice(CanvasLatticeElement),
    Geometry(GeometryElement),
    Source(SourceElement),
}

impl SceneElement {
    pub fn id(&self) -> &str {
        match self {
            Self::Lattice(element) => &element.id,
            Self::Geometry(element) => &element.id,
            Self::Source(element) => &element.id,
        }
    }

    pub fn as_lattice(&self) -> Option<&CanvasLatticeElement> {
        match self {
            Self::Lattice(element) => Some(element),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Scene {
    pub rect_width: f64,
    pub rect_height: f64,
    pub resolution: u32,
    pub elements: Vec<SceneElement>,
}

impl Default for Scene {
    fn default() -> Self {
        Self {
            rect_width: 10.0,
            rect_height: 10.0,
            resolution: 4,
            elements: Vec::new(),
        }
    }
}

impl Scene {
    pub fn lattice_elements(&self) -> impl Iterator<Item = &CanvasLatticeElement> {
        self.elements.iter().filter_map(SceneElement::as_lattice)
    }

    pub fn lattice_elements_mut(&mut self) -> impl Iterator<Item = &mut CanvasLatticeElement> {
        self.elements.iter_mut().filter_map(|element| match element {
            SceneElement::Lattice(lattice) => Some(lattice),
            _ => None,
        })
    }

    pub fn references(&self, lattice_id: &LatticeId) -> bool {
        self.lattice_elements()
            .any(|element| element.references(lattice_id))
    }

    /// Distinct lattice ids referenced by lattice elements.
    pub fn referenced_lattices(&self) -> BTreeSet<LatticeId> {
        self.lattice_elements()
            .filter_map(|element| element.lattice_document_id)
            .collect()
    }

    pub fn find_element(&self, element_id: &str) -> Option<&SceneElement> {
        self.elements
            .iter()
            .find(|element| element.id() == element_id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub document_id: ProjectId,
    pub created_at: i64,
    pub updated_at: i64,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub scene: Scene,
}

impl Project {
    pub fn new(document_id: ProjectId, now_ms: i64) -> Self {
        Self {
            document_id,
            created_at: now_ms,
            updated_at: now_ms,
            title: String::new(),
            description: String::new(),
            scene: Scene::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scene_elements_are_tagged_by_type() {
        let lattice_id = Uuid::new_v4();
        let mut scene = Scene::default();
        scene.elements.push(SceneElement::Lattice(CanvasLatticeElement::linked(
            "l1",
            lattice_id,
            (Vec2::new(1.0, 0.0), Vec2::new(0.0, 1.0)),
        )));
        scene.elements.push(SceneElement::Geometry(GeometryElement {
            id: "g1".to_string(),
            pos: Vec2::new(0.5, 0.5),
            shape: GeometryShape::Cylinder { radius: 0.2 },
        }));

        let value = serde_json::to_value(&scene).unwrap();
        assert_eq!(value["elements"][0]["type"], "lattice");
        assert_eq!(value["elements"][0]["showMode"], "points");
        assert_eq!(value["elements"][1]["type"], "geometry");
        assert_eq!(value["elements"][1]["shape"]["kind"], "cylinder");

        let back: Scene = serde_json::from_value(value).unwrap();
        assert_eq!(back, scene);
    }

    #[test]
    fn referenced_lattices_skips_unlinked_elements() {
        let lattice_id = Uuid::new_v4();
        let basis = (Vec2::new(1.0, 0.0), Vec2::new(0.0, 1.0));
        let mut unlinked = CanvasLatticeElement::linked("free", lattice_id, basis);
        unlinked.lattice_document_id = None;

        let mut scene = Scene::default();
        scene.elements.push(SceneElement::Lattice(unlinked));
        scene.elements.push(SceneElement::Lattice(CanvasLatticeElement::linked(
            "a", lattice_id, basis,
        )));
        scene.elements.push(SceneElement::Lattice(CanvasLatticeElement::linked(
            "b", lattice_id, basis,
        )));

        assert!(scene.references(&lattice_id));
        assert_eq!(scene.referenced_lattices().len(), 1);
        assert!(scene.find_element("free").is_some());
    }
}
