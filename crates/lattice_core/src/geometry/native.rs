//! Numerics module seam for transformation-matrix computation.
//!
//! # Responsibility
//! - Describe the narrow, flat-argument call surface of an external
//!   numerics module (WASM/FFI in a host application).
//! - Provide `PureNumerics`, the built-in implementation used as fallback.
//!
//! # Invariants
//! - Inputs are flat component arrays: `[a1x, a1y, a1z, a2x, ..., a3z]` for
//!   3D and `[a1x, a1y, a2x, a2y]` for 2D; same layout for reciprocal vectors.
//! - A module may lack the 3D entry point; callers must handle `None`.

use super::kernel::{invert_2x2, invert_3x3, SINGULARITY_EPSILON};
use super::GeometryError;
use nalgebra::{Matrix2, Matrix3, Vector3};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// The six change-of-basis matrices derived from one basis pair.
///
/// The set is redundant on purpose: consumers pick whichever orientation
/// they need without re-deriving it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatrixBundle<M> {
    /// Real basis as columns.
    pub ma: M,
    pub ma_inv: M,
    /// Reciprocal basis as columns.
    pub mb: M,
    pub mb_inv: M,
    /// Cartesian real-space coordinates to fractional lattice coordinates.
    pub real_to_reciprocal: M,
    pub reciprocal_to_real: M,
}

pub type TransformBundle = MatrixBundle<Matrix3<f64>>;
pub type PlanarBundle = MatrixBundle<Matrix2<f64>>;

impl<M> MatrixBundle<M> {
    /// Builds the bundle from the two basis matrices and their inverses.
    pub fn from_parts(ma: M, ma_inv: M, mb: M, mb_inv: M) -> Self
    where
        M: Copy,
    {
        Self {
            ma,
            ma_inv,
            mb,
            mb_inv,
            real_to_reciprocal: ma_inv,
            reciprocal_to_real: ma,
        }
    }
}

/// Failure reported by (or about) an external numerics module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NativeModuleError {
    pub module: String,
    pub entry_point: &'static str,
    pub message: String,
}

impl NativeModuleError {
    pub fn new(
        module: impl Into<String>,
        entry_point: &'static str,
        message: impl Into<String>,
    ) -> Self {
        Self {
            module: module.into(),
            entry_point,
            message: message.into(),
        }
    }

    pub fn missing_entry_point(module: impl Into<String>, entry_point: &'static str) -> Self {
        Self::new(module, entry_point, "entry point not available")
    }
}

impl Display for NativeModuleError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "numerics module `{}` failed in `{}`: {}",
            self.module, self.entry_point, self.message
        )
    }
}

impl Error for NativeModuleError {}

pub type NativeResult<T> = Result<T, NativeModuleError>;

/// Call surface of a numerics module.
pub trait NativeNumerics {
    /// Stable module name used in diagnostics.
    fn module_name(&self) -> &str;

    /// 3D entry point. Returns `None` when the module does not provide one.
    fn transformations_3d(
        &self,
        _real: [f64; 9],
        _reciprocal: [f64; 9],
    ) -> Option<NativeResult<TransformBundle>> {
        None
    }

    /// 2D entry point working on the in-plane components only.
    fn transformations_2d(&self, real: [f64; 4], reciprocal: [f64; 4])
        -> NativeResult<PlanarBundle>;
}

/// Built-in numerics on top of the cofactor kernel.
#[derive(Debug, Clone, Copy)]
pub struct PureNumerics {
    epsilon: f64,
}

impl Default for PureNumerics {
    fn default() -> Self {
        Self::new(SINGULARITY_EPSILON)
    }
}

impl PureNumerics {
    pub const MODULE_NAME: &'static str = "pure";

    pub fn new(epsilon: f64) -> Self {
        Self { epsilon }
    }

    /// Same computation as the trait entry point, with typed errors.
    pub fn bundle_3d(
        &self,
        real: &[Vector3<f64>; 3],
        reciprocal: &[Vector3<f64>; 3],
    ) -> Result<TransformBundle, GeometryError> {
        let ma = Matrix3::from_columns(real);
        let mb = Matrix3::from_columns(reciprocal);
        let ma_inv = invert_3x3(&ma, self.epsilon)?;
        let mb_inv = invert_3x3(&mb, self.epsilon)?;
        Ok(MatrixBundle::from_parts(ma, ma_inv, mb, mb_inv))
    }

    pub fn bundle_2d(
        &self,
        real: &[f64; 4],
        reciprocal: &[f64; 4],
    ) -> Result<PlanarBundle, GeometryError> {
        let ma = planar_columns(real);
        let mb = planar_columns(reciprocal);
        let ma_inv = invert_2x2(&ma, self.epsilon)?;
        let mb_inv = invert_2x2(&mb, self.epsilon)?;
        Ok(MatrixBundle::from_parts(ma, ma_inv, mb, mb_inv))
    }
}

impl NativeNumerics for PureNumerics {
    fn module_name(&self) -> &str {
        Self::MODULE_NAME
    }

    fn transformations_3d(
        &self,
        real: [f64; 9],
        reciprocal: [f64; 9],
    ) -> Option<NativeResult<TransformBundle>> {
        let result = self
            .bundle_3d(&unflatten_3d(&real), &unflatten_3d(&reciprocal))
            .map_err(|err| {
                NativeModuleError::new(Self::MODULE_NAME, "transformations_3d", err.to_string())
            });
        Some(result)
    }

    fn transformations_2d(
        &self,
        real: [f64; 4],
        reciprocal: [f64; 4],
    ) -> NativeResult<PlanarBundle> {
        self.bundle_2d(&real, &reciprocal).map_err(|err| {
            NativeModuleError::new(Self::MODULE_NAME, "transformations_2d", err.to_string())
        })
    }
}

/// Flattens three vectors into the 9-component call layout.
pub fn flatten_3d(vectors: &[Vector3<f64>; 3]) -> [f64; 9] {
    let [a, b, c] = vectors;
    [a.x, a.y, a.z, b.x, b.y, b.z, c.x, c.y, c.z]
}

/// Flattens the in-plane components of the first two vectors.
pub fn flatten_2d(vectors: &[Vector3<f64>; 3]) -> [f64; 4] {
    [vectors[0].x, vectors[0].y, vectors[1].x, vectors[1].y]
}

fn unflatten_3d(values: &[f64; 9]) -> [Vector3<f64>; 3] {
    [
        Vector3::new(values[0], values[1], values[2]),
        Vector3::new(values[3], values[4], values[5]),
        Vector3::new(values[6], values[7], values[8]),
    ]
}

fn planar_columns(values: &[f64; 4]) -> Matrix2<f64> {
    Matrix2::new(values[0], values[2], values[1], values[3])
}
