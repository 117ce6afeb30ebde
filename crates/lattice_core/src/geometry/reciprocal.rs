//! Reciprocal lattice calculator.
//!
//! # Responsibility
//! - Scale a real basis by `basis_size` and derive `b1, b2, b3` with
//!   `bᵢ·aⱼ = 2π·δᵢⱼ`.
//! - Produce the six-matrix transform bundle, delegating to a numerics
//!   module when one is configured.
//!
//! # Invariants
//! - Reciprocal vectors and the bundle are always produced together from
//!   the same scaled basis.
//! - For 2D lattices the padded planar path yields the same matrices as the
//!   3D path.

use super::kernel::{pad_2x2, scale_componentwise, unit_z, SINGULARITY_EPSILON};
use super::native::{
    flatten_2d, flatten_3d, MatrixBundle, NativeModuleError, NativeNumerics, PlanarBundle,
    PureNumerics, TransformBundle,
};
use super::{GeometryError, GeometryResult};
use crate::config::EngineConfig;
use log::{debug, warn};
use nalgebra::Vector3;
use std::f64::consts::PI;

const TAU: f64 = 2.0 * PI;

/// Output of one reciprocal derivation.
#[derive(Debug, Clone, PartialEq)]
pub struct ReciprocalLattice {
    /// Scaled real basis `a1, a2, a3` the derivation ran on.
    pub real: [Vector3<f64>; 3],
    pub reciprocal: [Vector3<f64>; 3],
    pub transforms: TransformBundle,
    pub is_2d: bool,
}

/// Applies per-axis scaling; `a3` defaults to the z unit vector.
pub fn scaled_basis(
    a1: &Vector3<f64>,
    a2: &Vector3<f64>,
    a3: Option<&Vector3<f64>>,
    scale: &Vector3<f64>,
) -> [Vector3<f64>; 3] {
    let a3 = a3.copied().unwrap_or_else(unit_z);
    [
        scale_componentwise(a1, scale),
        scale_componentwise(a2, scale),
        scale_componentwise(&a3, scale),
    ]
}

/// Whether the first two (scaled) vectors lie in the xy-plane.
pub fn is_planar(real: &[Vector3<f64>; 3], tolerance: f64) -> bool {
    real[0].z.abs() < tolerance && real[1].z.abs() < tolerance
}

/// General 3D reciprocal basis via the scalar triple product.
///
/// # Errors
/// - `DegenerateLattice` when `|a1·(a2×a3)| < epsilon`.
pub fn reciprocal_vectors_3d(
    real: &[Vector3<f64>; 3],
    epsilon: f64,
) -> GeometryResult<[Vector3<f64>; 3]> {
    let [a1, a2, a3] = real;
    let volume = a1.dot(&a2.cross(a3));
    if !volume.is_finite() || volume.abs() < epsilon {
        return Err(GeometryError::DegenerateLattice { measure: volume });
    }
    let factor = TAU / volume;
    Ok([
        a2.cross(a3) * factor,
        a3.cross(a1) * factor,
        a1.cross(a2) * factor,
    ])
}

/// Planar reciprocal basis; `b3` only depends on `a3.z`.
///
/// # Errors
/// - `DegenerateLattice` when the planar determinant or `a3.z` vanishes.
pub fn reciprocal_vectors_2d(
    real: &[Vector3<f64>; 3],
    epsilon: f64,
) -> GeometryResult<[Vector3<f64>; 3]> {
    let [a1, a2, a3] = real;
    let det = a1.x * a2.y - a1.y * a2.x;
    if !det.is_finite() || det.abs() < epsilon {
        return Err(GeometryError::DegenerateLattice { measure: det });
    }
    if a3.z.abs() < epsilon {
        return Err(GeometryError::DegenerateLattice { measure: a3.z });
    }
    let factor = TAU / det;
    Ok([
        Vector3::new(a2.y, -a2.x, 0.0) * factor,
        Vector3::new(-a1.y, a1.x, 0.0) * factor,
        Vector3::new(0.0, 0.0, TAU / a3.z),
    ])
}

/// Lifts a planar bundle to 3x3 using the real z-axis entries.
///
/// The bottom-right entries are `a3.z`, `b3.z` and their reciprocals, which
/// reduces to `1` for the default `a3 = (0,0,1)` on `MA`/`MA_inv`.
pub fn pad_planar_bundle(planar: &PlanarBundle, a3_z: f64, b3_z: f64) -> TransformBundle {
    MatrixBundle::from_parts(
        pad_2x2(&planar.ma, a3_z),
        pad_2x2(&planar.ma_inv, 1.0 / a3_z),
        pad_2x2(&planar.mb, b3_z),
        pad_2x2(&planar.mb_inv, 1.0 / b3_z),
    )
}

/// Reciprocal calculator with optional external numerics.
pub struct ReciprocalCalculator {
    native: Option<Box<dyn NativeNumerics>>,
    pure: PureNumerics,
    epsilon: f64,
    planar_tolerance: f64,
    allow_pure_fallback: bool,
}

impl Default for ReciprocalCalculator {
    fn default() -> Self {
        Self::new(&EngineConfig::default())
    }
}

impl ReciprocalCalculator {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            native: None,
            pure: PureNumerics::new(config.epsilon),
            epsilon: config.epsilon,
            planar_tolerance: config.planar_tolerance,
            allow_pure_fallback: config.allow_pure_fallback,
        }
    }

    /// Routes matrix computation through `native` first.
    pub fn with_native(mut self, native: Box<dyn NativeNumerics>) -> Self {
        self.native = Some(native);
        self
    }

    pub fn native_module_name(&self) -> Option<&str> {
        self.native.as_deref().map(|native| native.module_name())
    }

    /// Derives reciprocal vectors and the transform bundle.
    ///
    /// # Errors
    /// - `DegenerateLattice` for collinear/coplanar input.
    /// - `SingularMatrix` if a basis matrix cannot be inverted.
    /// - `NativeModule` when the numerics module fails and fallback is off.
    pub fn compute(
        &self,
        a1: &Vector3<f64>,
        a2: &Vector3<f64>,
        a3: Option<&Vector3<f64>>,
        scale: &Vector3<f64>,
    ) -> GeometryResult<ReciprocalLattice> {
        let real = scaled_basis(a1, a2, a3, scale);
        let is_2d = is_planar(&real, self.planar_tolerance);
        let reciprocal = if is_2d {
            reciprocal_vectors_2d(&real, self.epsilon)?
        } else {
            reciprocal_vectors_3d(&real, self.epsilon)?
        };
        let transforms = self.transforms(&real, &reciprocal, is_2d)?;

        Ok(ReciprocalLattice {
            real,
            reciprocal,
            transforms,
            is_2d,
        })
    }

    fn transforms(
        &self,
        real: &[Vector3<f64>; 3],
        reciprocal: &[Vector3<f64>; 3],
        is_2d: bool,
    ) -> GeometryResult<TransformBundle> {
        if let Some(native) = self.native.as_deref() {
            match native_transforms(native, real, reciprocal, is_2d) {
                Ok(bundle) => return Ok(bundle),
                Err(err) if self.allow_pure_fallback => {
                    warn!(
                        "event=native_numerics module=geometry status=fallback native={} entry_point={} error={}",
                        err.module, err.entry_point, err.message
                    );
                }
                Err(err) => return Err(err.into()),
            }
        }

        self.pure.bundle_3d(real, reciprocal)
    }
}

fn native_transforms(
    native: &dyn NativeNumerics,
    real: &[Vector3<f64>; 3],
    reciprocal: &[Vector3<f64>; 3],
    is_2d: bool,
) -> Result<TransformBundle, NativeModuleError> {
    match native.transformations_3d(flatten_3d(real), flatten_3d(reciprocal)) {
        Some(Ok(bundle)) => return Ok(bundle),
        Some(Err(err)) if !is_2d => return Err(err),
        Some(Err(err)) => debug!(
            "event=native_numerics module=geometry status=retry native={} entry_point=transformations_2d error={}",
            err.module, err.message
        ),
        None if !is_2d => {
            return Err(NativeModuleError::missing_entry_point(
                native.module_name(),
                "transformations_3d",
            ))
        }
        None => {}
    }

    let planar = native.transformations_2d(flatten_2d(real), flatten_2d(reciprocal))?;
    Ok(pad_planar_bundle(&planar, real[2].z, reciprocal[2].z))
}

/// Convenience wrapper using default tolerances and pure numerics.
pub fn reciprocal_lattice(
    a1: &Vector3<f64>,
    a2: &Vector3<f64>,
    a3: Option<&Vector3<f64>>,
) -> GeometryResult<ReciprocalLattice> {
    let calculator = ReciprocalCalculator {
        native: None,
        pure: PureNumerics::new(SINGULARITY_EPSILON),
        epsilon: SINGULARITY_EPSILON,
        planar_tolerance: EngineConfig::default().planar_tolerance,
        allow_pure_fallback: true,
    };
    calculator.compute(a1, a2, a3, &Vector3::new(1.0, 1.0, 1.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::kernel::max_abs_diff;
    use nalgebra::Matrix3;

    #[test]
    fn square_lattice_reciprocal_is_two_pi_scaled() {
        let result = reciprocal_lattice(
            &Vector3::new(1.0, 0.0, 0.0),
            &Vector3::new(0.0, 1.0, 0.0),
            None,
        )
        .unwrap();
        assert!(result.is_2d);
        assert!((result.reciprocal[0] - Vector3::new(TAU, 0.0, 0.0)).norm() < 1e-12);
        assert!((result.reciprocal[1] - Vector3::new(0.0, TAU, 0.0)).norm() < 1e-12);
        assert!((result.reciprocal[2] - Vector3::new(0.0, 0.0, TAU)).norm() < 1e-12);
    }

    #[test]
    fn duality_holds_for_general_3d_basis() {
        let real = [
            Vector3::new(1.0, 0.2, 0.1),
            Vector3::new(-0.3, 1.5, 0.4),
            Vector3::new(0.2, -0.1, 2.0),
        ];
        let reciprocal = reciprocal_vectors_3d(&real, SINGULARITY_EPSILON).unwrap();
        for (i, b) in reciprocal.iter().enumerate() {
            for (j, a) in real.iter().enumerate() {
                let expected = if i == j { TAU } else { 0.0 };
                assert!((b.dot(a) - expected).abs() < 1e-9);
            }
        }
    }

    #[test]
    fn scaling_is_applied_before_derivation() {
        let calculator = ReciprocalCalculator::default();
        let result = calculator
            .compute(
                &Vector3::new(1.0, 0.0, 0.0),
                &Vector3::new(0.0, 1.0, 0.0),
                None,
                &Vector3::new(2.0, 4.0, 1.0),
            )
            .unwrap();
        assert_eq!(result.real[0], Vector3::new(2.0, 0.0, 0.0));
        assert!((result.reciprocal[1].y - TAU / 4.0).abs() < 1e-12);
    }

    #[test]
    fn planar_padding_matches_3d_bundle() {
        let real = [
            Vector3::new(1.0, 0.0, 0.0),
            Vector3::new(0.5, 3.0_f64.sqrt() / 2.0, 0.0),
            Vector3::new(0.0, 0.0, 2.0),
        ];
        let reciprocal = reciprocal_vectors_2d(&real, SINGULARITY_EPSILON).unwrap();
        let pure = PureNumerics::default();
        let full = pure.bundle_3d(&real, &reciprocal).unwrap();
        let planar = pure
            .bundle_2d(&flatten_2d(&real), &flatten_2d(&reciprocal))
            .unwrap();
        let padded = pad_planar_bundle(&planar, real[2].z, reciprocal[2].z);

        let pairs: [(&Matrix3<f64>, &Matrix3<f64>); 6] = [
            (&full.ma, &padded.ma),
            (&full.ma_inv, &padded.ma_inv),
            (&full.mb, &padded.mb),
            (&full.mb_inv, &padded.mb_inv),
            (&full.real_to_reciprocal, &padded.real_to_reciprocal),
            (&full.reciprocal_to_real, &padded.reciprocal_to_real),
        ];
        for (lhs, rhs) in pairs {
            assert!(max_abs_diff(lhs, rhs) < 1e-12);
        }
    }

    #[test]
    fn coplanar_3d_basis_is_degenerate() {
        let real = [
            Vector3::new(1.0, 0.0, 1.0),
            Vector3::new(0.0, 1.0, 1.0),
            Vector3::new(1.0, 1.0, 2.0),
        ];
        let err = reciprocal_vectors_3d(&real, SINGULARITY_EPSILON).unwrap_err();
        assert!(matches!(err, GeometryError::DegenerateLattice { .. }));
    }
}
