//! Canonical lattice document.
//!
//! # Responsibility
//! - Define the persisted `Lattice` record and its `MeepLattice` core.
//! - Keep reciprocal-space fields consistent with the basis they came from.
//!
//! # Invariants
//! - `basis3` defaults to `(0, 0, 1)`, `basis_size` to `(1, 1, 1)`.
//! - Derived fields (`reciprocal_basis1..3`, `transformationMatrices`) are
//!   only written through `MeepLattice::apply_derived`, all at once.
//! - `project_ids` are back-references; the lattice does not own projects.

use super::project::ProjectId;
use super::vector::{MatrixRows, Vec2, Vec3};
use crate::geometry::kernel::{from_rows, to_rows};
use crate::geometry::native::{MatrixBundle, TransformBundle};
use crate::geometry::reciprocal::ReciprocalLattice;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt::{Display, Formatter};
use std::str::FromStr;
use uuid::Uuid;

pub type LatticeId = Uuid;

/// Planar lattice family.
///
/// Legacy names `square` and `hexagonal` are accepted when reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LatticeType {
    #[serde(alias = "square")]
    Quadratic,
    Rectangular,
    #[serde(alias = "hexagonal")]
    Triangular,
    Rhombic,
    Oblique,
    Custom,
}

impl LatticeType {
    pub const ALL: [LatticeType; 6] = [
        Self::Quadratic,
        Self::Rectangular,
        Self::Triangular,
        Self::Rhombic,
        Self::Oblique,
        Self::Custom,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Quadratic => "quadratic",
            Self::Rectangular => "rectangular",
            Self::Triangular => "triangular",
            Self::Rhombic => "rhombic",
            Self::Oblique => "oblique",
            Self::Custom => "custom",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Self::Quadratic => "Square lattice with equal sides and 90° angles",
            Self::Rectangular => "Rectangular lattice with unequal sides and 90° angles",
            Self::Triangular => {
                "Triangular/hexagonal lattice with equal sides and 60° or 120° angles"
            }
            Self::Rhombic => "Rhombic lattice with equal sides and non-90° angles",
            Self::Oblique => "General oblique lattice with unequal sides and non-90° angles",
            Self::Custom => "User-defined lattice without symmetry constraints",
        }
    }
}

impl Display for LatticeType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownLatticeType(pub String);

impl Display for UnknownLatticeType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "unknown lattice type `{}`", self.0)
    }
}

impl std::error::Error for UnknownLatticeType {}

impl FromStr for LatticeType {
    type Err = UnknownLatticeType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "quadratic" | "square" => Ok(Self::Quadratic),
            "rectangular" => Ok(Self::Rectangular),
            "triangular" | "hexagonal" => Ok(Self::Triangular),
            "rhombic" => Ok(Self::Rhombic),
            "oblique" => Ok(Self::Oblique),
            "custom" => Ok(Self::Custom),
            _ => Err(UnknownLatticeType(s.to_string())),
        }
    }
}

/// Convenience parameters derived from the scaled basis.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatticeParameters {
    pub a: f64,
    pub b: f64,
    /// Angle between `a1` and `a2` in degrees.
    pub alpha: f64,
}

impl Default for LatticeParameters {
    fn default() -> Self {
        Self {
            a: 1.0,
            b: 1.0,
            alpha: 90.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DisplaySettings {
    pub show_wigner_seitz: bool,
    pub show_brillouin_zone: bool,
    pub show_high_symmetry_points: bool,
    pub show_reciprocal: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoronoiCell {
    pub vertices: Vec<Vec3>,
    pub zone: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoronoiParams {
    pub max_zone: u32,
    pub search_range: u32,
    pub timestamp: String,
}

/// Cached boundary cells computed by the external numerics module.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct VoronoiData {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wigner_seitz_cell: Option<VoronoiCell>,
    pub real_space_zones: Vec<VoronoiCell>,
    pub brillouin_zones: Vec<VoronoiCell>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub calculation_params: Option<VoronoiParams>,
}

/// Six change-of-basis matrices, row-major.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TransformationMatrices {
    #[serde(rename = "MA")]
    pub ma: MatrixRows,
    #[serde(rename = "MA_inv")]
    pub ma_inv: MatrixRows,
    #[serde(rename = "MB")]
    pub mb: MatrixRows,
    #[serde(rename = "MB_inv")]
    pub mb_inv: MatrixRows,
    #[serde(rename = "realToReciprocal")]
    pub real_to_reciprocal: MatrixRows,
    #[serde(rename = "reciprocalToReal")]
    pub reciprocal_to_real: MatrixRows,
}

impl From<&TransformBundle> for TransformationMatrices {
    fn from(value: &TransformBundle) -> Self {
        Self {
            ma: to_rows(&value.ma),
            ma_inv: to_rows(&value.ma_inv),
            mb: to_rows(&value.mb),
            mb_inv: to_rows(&value.mb_inv),
            real_to_reciprocal: to_rows(&value.real_to_reciprocal),
            reciprocal_to_real: to_rows(&value.reciprocal_to_real),
        }
    }
}

impl TransformationMatrices {
    pub fn to_bundle(&self) -> TransformBundle {
        MatrixBundle {
            ma: from_rows(&self.ma),
            ma_inv: from_rows(&self.ma_inv),
            mb: from_rows(&self.mb),
            mb_inv: from_rows(&self.mb_inv),
            real_to_reciprocal: from_rows(&self.real_to_reciprocal),
            reciprocal_to_real: from_rows(&self.reciprocal_to_real),
        }
    }
}

fn default_basis3() -> Vec3 {
    Vec3::unit_z()
}

fn default_basis_size() -> Vec3 {
    Vec3::ones()
}

/// Real basis plus reciprocal-space data derived from it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeepLattice {
    pub basis1: Vec3,
    pub basis2: Vec3,
    #[serde(default = "default_basis3")]
    pub basis3: Vec3,
    #[serde(default = "default_basis_size")]
    pub basis_size: Vec3,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    reciprocal_basis1: Option<Vec3>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    reciprocal_basis2: Option<Vec3>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    reciprocal_basis3: Option<Vec3>,
    #[serde(
        default,
        rename = "transformationMatrices",
        skip_serializing_if = "Option::is_none"
    )]
    transformation_matrices: Option<TransformationMatrices>,
}

impl Default for MeepLattice {
    fn default() -> Self {
        Self::new(
            Vec3::new(1.0, 0.0, 0.0),
            Vec3::new(0.0, 1.0, 0.0),
            Vec3::unit_z(),
            Vec3::ones(),
        )
    }
}

impl MeepLattice {
    /// Basis without derived data.
    pub fn new(basis1: Vec3, basis2: Vec3, basis3: Vec3, basis_size: Vec3) -> Self {
        Self {
            basis1,
            basis2,
            basis3,
            basis_size,
            reciprocal_basis1: None,
            reciprocal_basis2: None,
            reciprocal_basis3: None,
            transformation_matrices: None,
        }
    }

    pub fn reciprocal_basis(&self) -> Option<[Vec3; 3]> {
        Some([
            self.reciprocal_basis1?,
            self.reciprocal_basis2?,
            self.reciprocal_basis3?,
        ])
    }

    pub fn transformation_matrices(&self) -> Option<&TransformationMatrices> {
        self.transformation_matrices.as_ref()
    }

    pub fn has_derived(&self) -> bool {
        self.reciprocal_basis().is_some() && self.transformation_matrices.is_some()
    }

    /// Scaled in-plane basis as shown on a scene.
    pub fn scaled_planar_basis(&self) -> (Vec2, Vec2) {
        let size = self.basis_size;
        (
            Vec2::new(self.basis1.x * size.x, self.basis1.y * size.y),
            Vec2::new(self.basis2.x * size.x, self.basis2.y * size.y),
        )
    }

    pub(crate) fn apply_derived(&mut self, derived: &ReciprocalLattice) {
        let [b1, b2, b3] = derived.reciprocal;
        self.reciprocal_basis1 = Some(b1.into());
        self.reciprocal_basis2 = Some(b2.into());
        self.reciprocal_basis3 = Some(b3.into());
        self.transformation_matrices = Some(TransformationMatrices::from(&derived.transforms));
    }
}

/// Canonical lattice record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Lattice {
    pub document_id: LatticeId,
    /// Unix epoch milliseconds.
    pub created_at: i64,
    /// Unix epoch milliseconds; strictly increases on every update.
    pub updated_at: i64,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub lattice_type: LatticeType,
    /// `lattice_type` was chosen by the caller rather than classified.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub explicit_type: bool,
    pub meep_lattice: MeepLattice,
    #[serde(default)]
    pub parameters: LatticeParameters,
    #[serde(default)]
    pub display_settings: DisplaySettings,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voronoi_data: Option<VoronoiData>,
    #[serde(default)]
    pub project_ids: BTreeSet<ProjectId>,
}

impl Lattice {
    pub const DEFAULT_TITLE: &'static str = "Untitled Lattice";

    /// Unit square lattice with no derived data and no links.
    pub fn new(document_id: LatticeId, now_ms: i64) -> Self {
        Self {
            document_id,
            created_at: now_ms,
            updated_at: now_ms,
            title: Self::DEFAULT_TITLE.to_string(),
            description: None,
            lattice_type: LatticeType::Quadratic,
            explicit_type: false,
            meep_lattice: MeepLattice::default(),
            parameters: LatticeParameters::default(),
            display_settings: DisplaySettings::default(),
            voronoi_data: None,
            project_ids: BTreeSet::new(),
        }
    }

    pub fn is_linked_to(&self, project_id: &ProjectId) -> bool {
        self.project_ids.contains(project_id)
    }

    /// `custom` set by the caller, as opposed to classified from bad input.
    pub fn is_custom_by_choice(&self) -> bool {
        self.explicit_type && self.lattice_type == LatticeType::Custom
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::reciprocal::reciprocal_lattice;

    #[test]
    fn legacy_type_names_are_accepted() {
        let square: LatticeType = serde_json::from_str("\"square\"").unwrap();
        let hexagonal: LatticeType = serde_json::from_str("\"hexagonal\"").unwrap();
        assert_eq!(square, LatticeType::Quadratic);
        assert_eq!(hexagonal, LatticeType::Triangular);
        assert_eq!(serde_json::to_string(&square).unwrap(), "\"quadratic\"");
        assert_eq!("Hexagonal".parse::<LatticeType>().unwrap(), LatticeType::Triangular);
    }

    #[test]
    fn missing_basis3_and_size_get_defaults() {
        let raw = r#"{"basis1":{"x":1,"y":0,"z":0},"basis2":{"x":0,"y":2,"z":0}}"#;
        let meep: MeepLattice = serde_json::from_str(raw).unwrap();
        assert_eq!(meep.basis3, Vec3::unit_z());
        assert_eq!(meep.basis_size, Vec3::ones());
        assert!(!meep.has_derived());
    }

    #[test]
    fn persisted_shape_uses_wire_names() {
        let mut lattice = Lattice::new(Uuid::new_v4(), 1_700_000_000_000);
        let derived = reciprocal_lattice(
            &lattice.meep_lattice.basis1.into(),
            &lattice.meep_lattice.basis2.into(),
            None,
        )
        .unwrap();
        lattice.meep_lattice.apply_derived(&derived);

        let value = serde_json::to_value(&lattice).unwrap();
        assert!(value.get("documentId").is_some());
        assert!(value.get("createdAt").is_some());
        assert_eq!(value["latticeType"], "quadratic");
        let meep = &value["meepLattice"];
        assert!(meep.get("basis_size").is_some());
        assert!(meep.get("reciprocal_basis1").is_some());
        let matrices = &meep["transformationMatrices"];
        for key in ["MA", "MA_inv", "MB", "MB_inv", "realToReciprocal", "reciprocalToReal"] {
            assert!(matrices.get(key).is_some(), "missing {key}");
        }
        assert_eq!(value["parameters"]["alpha"], 90.0);
        assert!(value["projectIds"].as_array().unwrap().is_empty());
    }

    #[test]
    fn matrices_survive_row_conversion() {
        let derived = reciprocal_lattice(
            &nalgebra::Vector3::new(1.0, 0.0, 0.0),
            &nalgebra::Vector3::new(0.5, 0.8, 0.0),
            None,
        )
        .unwrap();
        let rows = TransformationMatrices::from(&derived.transforms);
        assert_eq!(rows.to_bundle(), derived.transforms);
    }
}
