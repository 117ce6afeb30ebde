//! High-symmetry points and band paths of the planar lattice families.
//!
//! Points are given as fractions of the reciprocal vectors `b1`, `b2`.
//! Custom lattices only carry Γ.

use crate::model::lattice::{Lattice, LatticeType};
use crate::model::vector::Vec2;
use nalgebra::{Vector2, Vector3};

pub const GAMMA: &str = "Γ";

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HighSymmetryPoint {
    pub label: &'static str,
    /// Fraction of `b1`.
    pub b1: f64,
    /// Fraction of `b2`.
    pub b2: f64,
}

impl HighSymmetryPoint {
    const fn new(label: &'static str, b1: f64, b2: f64) -> Self {
        Self { label, b1, b2 }
    }

    /// Cartesian in-plane position for the given reciprocal vectors.
    pub fn position(&self, b1: &Vector3<f64>, b2: &Vector3<f64>) -> Vector2<f64> {
        Vector2::new(
            self.b1 * b1.x + self.b2 * b2.x,
            self.b1 * b1.y + self.b2 * b2.y,
        )
    }
}

/// One leg of a band path, by point label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PathSegment {
    pub from: &'static str,
    pub to: &'static str,
}

const GAMMA_ONLY: &[HighSymmetryPoint] = &[HighSymmetryPoint::new(GAMMA, 0.0, 0.0)];

const RECTANGULAR_POINTS: &[HighSymmetryPoint] = &[
    HighSymmetryPoint::new(GAMMA, 0.0, 0.0),
    HighSymmetryPoint::new("X", 0.5, 0.0),
    HighSymmetryPoint::new("M", 0.5, 0.5),
    HighSymmetryPoint::new("Y", 0.0, 0.5),
];

const QUADRATIC_POINTS: &[HighSymmetryPoint] = &[
    HighSymmetryPoint::new(GAMMA, 0.0, 0.0),
    HighSymmetryPoint::new("X", 0.5, 0.0),
    HighSymmetryPoint::new("M", 0.5, 0.5),
];

const TRIANGULAR_POINTS: &[HighSymmetryPoint] = &[
    HighSymmetryPoint::new(GAMMA, 0.0, 0.0),
    HighSymmetryPoint::new("M", 0.5, 0.0),
    HighSymmetryPoint::new("K", 2.0 / 3.0, 1.0 / 3.0),
];

// Centered-rectangular convention.
const RHOMBIC_POINTS: &[HighSymmetryPoint] = &[
    HighSymmetryPoint::new(GAMMA, 0.0, 0.0),
    HighSymmetryPoint::new("X", 0.5, 0.0),
    HighSymmetryPoint::new("M", 0.5, -0.5),
    HighSymmetryPoint::new("Y", 0.0, 0.5),
];

const fn seg(from: &'static str, to: &'static str) -> PathSegment {
    PathSegment { from, to }
}

const RECTANGULAR_PATH: &[PathSegment] = &[
    seg(GAMMA, "X"),
    seg("X", "M"),
    seg("M", "Y"),
    seg("Y", GAMMA),
];
const QUADRATIC_PATH: &[PathSegment] = &[seg(GAMMA, "X"), seg("X", "M"), seg("M", GAMMA)];
const TRIANGULAR_PATH: &[PathSegment] = &[seg(GAMMA, "M"), seg("M", "K"), seg("K", GAMMA)];

pub fn points_for(lattice_type: LatticeType) -> &'static [HighSymmetryPoint] {
    match lattice_type {
        LatticeType::Quadratic => QUADRATIC_POINTS,
        LatticeType::Rectangular => RECTANGULAR_POINTS,
        LatticeType::Triangular => TRIANGULAR_POINTS,
        LatticeType::Rhombic => RHOMBIC_POINTS,
        LatticeType::Oblique | LatticeType::Custom => GAMMA_ONLY,
    }
}

pub fn path_for(lattice_type: LatticeType) -> &'static [PathSegment] {
    match lattice_type {
        LatticeType::Quadratic => QUADRATIC_PATH,
        // Rhombic shares the rectangular loop in the centered convention.
        LatticeType::Rectangular | LatticeType::Rhombic => RECTANGULAR_PATH,
        LatticeType::Triangular => TRIANGULAR_PATH,
        LatticeType::Oblique | LatticeType::Custom => &[],
    }
}

/// Resolves every point of `lattice_type` against `b1`, `b2`.
pub fn positions(
    lattice_type: LatticeType,
    b1: &Vector3<f64>,
    b2: &Vector3<f64>,
) -> Vec<(&'static str, Vector2<f64>)> {
    points_for(lattice_type)
        .iter()
        .map(|point| (point.label, point.position(b1, b2)))
        .collect()
}

/// Points of the lattice's family in its stored reciprocal basis.
///
/// Empty when the lattice has no derived reciprocal data yet.
pub fn high_symmetry_positions(lattice: &Lattice) -> Vec<(&'static str, Vec2)> {
    let Some([b1, b2, _]) = lattice.meep_lattice.reciprocal_basis() else {
        return Vec::new();
    };
    positions(lattice.lattice_type, &b1.into(), &b2.into())
        .into_iter()
        .map(|(label, position)| (label, position.into()))
        .collect()
}
