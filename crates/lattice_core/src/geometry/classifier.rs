//! Lattice symmetry classifier.
//!
//! # Responsibility
//! - Bucket a basis-vector pair into one of the five planar families.
//! - Validate a pair against an explicitly selected family.
//!
//! # Invariants
//! - Only the in-plane (x, y) components are considered.
//! - Classification never fails: unusable input maps to `Custom`.
//! - Length equality is relative; angle checks are absolute degrees.

use crate::config::ClassifierTolerances;
use crate::model::lattice::LatticeType;
use nalgebra::Vector3;
use std::fmt::{Display, Formatter};

/// Planar lengths and enclosed angle of a basis pair.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LatticeMeasurements {
    pub length_a: f64,
    pub length_b: f64,
    /// Degrees in `[0, 180]`.
    pub angle_deg: f64,
    /// `length_b / length_a`.
    pub length_ratio: f64,
}

/// Result of [`classify`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Classification {
    pub lattice_type: LatticeType,
    /// `1.0` for exact matches; reduced by relative errors for quadratic and
    /// triangular, `0.0` for unusable input.
    pub confidence: f64,
    /// `None` when a vector has zero or non-finite planar length.
    pub measurements: Option<LatticeMeasurements>,
}

/// One violated condition reported by [`validate`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LatticeViolation {
    LengthsMustBeEqual { length_a: f64, length_b: f64 },
    LengthsMustDiffer { length_a: f64, length_b: f64 },
    AngleMustBeRight { angle_deg: f64 },
    AngleMustNotBeRight { angle_deg: f64 },
    AngleMustBeTriangular { angle_deg: f64 },
    DegenerateVectors,
}

impl Display for LatticeViolation {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::LengthsMustBeEqual { length_a, length_b } => write!(
                f,
                "lengths must be equal (a={length_a:.6}, b={length_b:.6})"
            ),
            Self::LengthsMustDiffer { length_a, length_b } => write!(
                f,
                "lengths must be different (a={length_a:.6}, b={length_b:.6})"
            ),
            Self::AngleMustBeRight { angle_deg } => {
                write!(f, "angle must be 90° (actual: {angle_deg:.2}°)")
            }
            Self::AngleMustNotBeRight { angle_deg } => {
                write!(f, "angle must not be 90° (actual: {angle_deg:.2}°)")
            }
            Self::AngleMustBeTriangular { angle_deg } => {
                write!(f, "angle must be 60° or 120° (actual: {angle_deg:.2}°)")
            }
            Self::DegenerateVectors => write!(f, "basis vectors must have non-zero length"),
        }
    }
}

/// Result of [`validate`].
#[derive(Debug, Clone, PartialEq)]
pub struct LatticeValidation {
    pub expected: LatticeType,
    pub violations: Vec<LatticeViolation>,
    pub measurements: Option<LatticeMeasurements>,
}

impl LatticeValidation {
    pub fn is_valid(&self) -> bool {
        self.violations.is_empty()
    }
}

/// Measures the planar projection of a basis pair.
pub fn measure(v1: &Vector3<f64>, v2: &Vector3<f64>) -> Option<LatticeMeasurements> {
    let a = planar(v1);
    let b = planar(v2);
    let length_a = a.norm();
    let length_b = b.norm();
    if !(length_a.is_finite() && length_b.is_finite()) || length_a == 0.0 || length_b == 0.0 {
        return None;
    }
    let cosine = (a.dot(&b) / (length_a * length_b)).clamp(-1.0, 1.0);
    Some(LatticeMeasurements {
        length_a,
        length_b,
        angle_deg: cosine.acos().to_degrees(),
        length_ratio: length_b / length_a,
    })
}

/// Relative comparison against the mean magnitude; absolute when both are 0.
pub fn relative_eq(a: f64, b: f64, tolerance: f64) -> bool {
    let mean = (a.abs() + b.abs()) / 2.0;
    if mean == 0.0 {
        return (a - b).abs() < tolerance;
    }
    (a - b).abs() / mean < tolerance
}

fn angle_near(angle_deg: f64, target_deg: f64, tolerance_deg: f64) -> bool {
    (angle_deg - target_deg).abs() <= tolerance_deg
}

fn is_right(m: &LatticeMeasurements, tol: &ClassifierTolerances) -> bool {
    angle_near(m.angle_deg, 90.0, tol.angle)
}

fn is_triangular_angle(m: &LatticeMeasurements, tol: &ClassifierTolerances) -> bool {
    angle_near(m.angle_deg, 60.0, tol.triangular) || angle_near(m.angle_deg, 120.0, tol.triangular)
}

fn lengths_equal(m: &LatticeMeasurements, tol: &ClassifierTolerances) -> bool {
    relative_eq(m.length_a, m.length_b, tol.length)
}

/// Classifies a basis pair into a lattice family.
pub fn classify(
    v1: &Vector3<f64>,
    v2: &Vector3<f64>,
    tol: &ClassifierTolerances,
) -> Classification {
    let Some(m) = measure(v1, v2) else {
        return Classification {
            lattice_type: LatticeType::Custom,
            confidence: 0.0,
            measurements: None,
        };
    };

    // Parallel vectors span no cell; no family applies.
    if m.angle_deg < tol.angle || m.angle_deg > 180.0 - tol.angle {
        return Classification {
            lattice_type: LatticeType::Custom,
            confidence: 0.0,
            measurements: Some(m),
        };
    }

    let equal = lengths_equal(&m, tol);
    let right = is_right(&m, tol);
    let triangular = is_triangular_angle(&m, tol);

    let lattice_type = match (equal, right, triangular) {
        (true, true, _) => LatticeType::Quadratic,
        (false, true, _) => LatticeType::Rectangular,
        (true, false, true) => LatticeType::Triangular,
        (true, false, false) => LatticeType::Rhombic,
        (false, false, _) => LatticeType::Oblique,
    };

    let length_error = (m.length_a - m.length_b).abs() / m.length_a.max(m.length_b);
    let confidence = match lattice_type {
        LatticeType::Quadratic => {
            let angle_error = (m.angle_deg - 90.0).abs() / 90.0;
            (1.0 - length_error - angle_error).max(0.0)
        }
        LatticeType::Triangular => {
            let angle_error =
                (m.angle_deg - 60.0).abs().min((m.angle_deg - 120.0).abs()) / 60.0;
            (1.0 - length_error - angle_error).max(0.0)
        }
        _ => 1.0,
    };

    Classification {
        lattice_type,
        confidence,
        measurements: Some(m),
    }
}

/// Checks a pair against an explicitly chosen family.
///
/// Returns every violated condition instead of reclassifying.
pub fn validate(
    v1: &Vector3<f64>,
    v2: &Vector3<f64>,
    expected: LatticeType,
    tol: &ClassifierTolerances,
) -> LatticeValidation {
    let measurements = measure(v1, v2);
    let mut violations = Vec::new();

    match (expected, measurements.as_ref()) {
        (LatticeType::Custom, _) => {}
        (_, None) => violations.push(LatticeViolation::DegenerateVectors),
        (expected, Some(m)) => {
            let lengths = (m.length_a, m.length_b);
            let equal = lengths_equal(m, tol);
            let right = is_right(m, tol);

            let wants_equal = matches!(
                expected,
                LatticeType::Quadratic | LatticeType::Triangular | LatticeType::Rhombic
            );
            if wants_equal && !equal {
                violations.push(LatticeViolation::LengthsMustBeEqual {
                    length_a: lengths.0,
                    length_b: lengths.1,
                });
            }
            if !wants_equal && equal {
                violations.push(LatticeViolation::LengthsMustDiffer {
                    length_a: lengths.0,
                    length_b: lengths.1,
                });
            }

            match expected {
                LatticeType::Quadratic | LatticeType::Rectangular if !right => {
                    violations.push(LatticeViolation::AngleMustBeRight {
                        angle_deg: m.angle_deg,
                    });
                }
                LatticeType::Rhombic | LatticeType::Oblique if right => {
                    violations.push(LatticeViolation::AngleMustNotBeRight {
                        angle_deg: m.angle_deg,
                    });
                }
                LatticeType::Triangular if !is_triangular_angle(m, tol) => {
                    violations.push(LatticeViolation::AngleMustBeTriangular {
                        angle_deg: m.angle_deg,
                    });
                }
                _ => {}
            }
        }
    }

    LatticeValidation {
        expected,
        violations,
        measurements,
    }
}

/// Nearest pair conforming to `target`, keeping `v1` fixed.
///
/// z components of the input are preserved; `Oblique` and `Custom` return
/// the input unchanged, as does a zero-length `v1`.
pub fn suggest_corrections(
    v1: &Vector3<f64>,
    v2: &Vector3<f64>,
    target: LatticeType,
    tol: &ClassifierTolerances,
) -> (Vector3<f64>, Vector3<f64>) {
    let Some(m) = measure(v1, v2) else {
        return (*v1, *v2);
    };

    let corrected = match target {
        LatticeType::Quadratic => rotate_planar(v1, 90.0, v2.z),
        LatticeType::Rectangular => rotate_planar(v1, 90.0, v2.z).scale_planar(m.length_ratio),
        LatticeType::Triangular => rotate_planar(v1, 60.0, v2.z),
        LatticeType::Rhombic => {
            let rotated = if is_right(&m, tol) {
                rotate_planar(v2, 30.0, v2.z)
            } else {
                *v2
            };
            rotated.scale_planar(m.length_a / planar(&rotated).norm())
        }
        LatticeType::Oblique | LatticeType::Custom => *v2,
    };

    (*v1, corrected)
}

fn planar(v: &Vector3<f64>) -> Vector3<f64> {
    Vector3::new(v.x, v.y, 0.0)
}

fn rotate_planar(v: &Vector3<f64>, degrees: f64, z: f64) -> Vector3<f64> {
    let (sin, cos) = degrees.to_radians().sin_cos();
    Vector3::new(v.x * cos - v.y * sin, v.x * sin + v.y * cos, z)
}

trait ScalePlanar {
    fn scale_planar(self, factor: f64) -> Self;
}

impl ScalePlanar for Vector3<f64> {
    fn scale_planar(self, factor: f64) -> Self {
        Vector3::new(self.x * factor, self.y * factor, self.z)
    }
}
