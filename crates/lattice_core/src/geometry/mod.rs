//! Lattice geometry: linear-algebra kernel, reciprocal calculator, classifier.
//!
//! # Responsibility
//! - Derive reciprocal bases and change-of-basis matrices from real bases.
//! - Bucket basis-vector pairs into lattice families under tolerance.
//!
//! # Invariants
//! - Everything in this module is pure; no storage or logging side effects
//!   except fallback diagnostics in the calculator.
//! - Degenerate and singular inputs surface as `GeometryError`, never panics.

use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod classifier;
pub mod kernel;
pub mod native;
pub mod reciprocal;
pub mod symmetry_points;

pub use native::NativeModuleError;

pub type GeometryResult<T> = Result<T, GeometryError>;

/// Failures raised while deriving reciprocal-space data.
#[derive(Debug, Clone, PartialEq)]
pub enum GeometryError {
    /// Basis vectors are collinear/coplanar; `measure` is the cell area or volume.
    DegenerateLattice { measure: f64 },
    /// Matrix inversion hit a determinant below the singularity threshold.
    SingularMatrix { determinant: f64 },
    /// External numerics failed and no fallback was allowed.
    NativeModule(NativeModuleError),
}

impl Display for GeometryError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DegenerateLattice { measure } => write!(
                f,
                "basis vectors are collinear or coplanar (cell measure {measure:e})"
            ),
            Self::SingularMatrix { determinant } => {
                write!(f, "matrix is singular (determinant {determinant:e})")
            }
            Self::NativeModule(err) => write!(f, "{err}"),
        }
    }
}

impl Error for GeometryError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::NativeModule(err) => Some(err),
            _ => None,
        }
    }
}

impl From<NativeModuleError> for GeometryError {
    fn from(value: NativeModuleError) -> Self {
        Self::NativeModule(value)
    }
}
