//! Vector/matrix kernel shared by the calculator and classifier.
//!
//! Matrices follow the column convention: `matrix_from_columns(a1, a2, a3)`
//! puts `a1` in column 0. Angles are reported in degrees.

use super::{GeometryError, GeometryResult};
use nalgebra::{Matrix2, Matrix3, Vector3};

/// Determinant/volume threshold below which a matrix or cell is degenerate.
pub const SINGULARITY_EPSILON: f64 = 1e-14;

/// Cartesian unit vector used whenever a third basis vector is absent.
pub fn unit_z() -> Vector3<f64> {
    Vector3::new(0.0, 0.0, 1.0)
}

pub fn length(v: &Vector3<f64>) -> f64 {
    v.norm()
}

/// Angle between two vectors in degrees.
///
/// Returns `None` when either vector has zero length. The cosine is clamped
/// to `[-1, 1]` before `acos`, since rounding can push it slightly outside.
pub fn angle_between_deg(a: &Vector3<f64>, b: &Vector3<f64>) -> Option<f64> {
    let denominator = a.norm() * b.norm();
    if denominator == 0.0 || !denominator.is_finite() {
        return None;
    }
    let cosine = (a.dot(b) / denominator).clamp(-1.0, 1.0);
    Some(cosine.acos().to_degrees())
}

/// Componentwise product, used to apply `basis_size` to a basis vector.
pub fn scale_componentwise(v: &Vector3<f64>, scale: &Vector3<f64>) -> Vector3<f64> {
    v.component_mul(scale)
}

/// Builds a change-of-basis matrix whose columns are the given vectors.
pub fn matrix_from_columns(
    c1: &Vector3<f64>,
    c2: &Vector3<f64>,
    c3: Option<&Vector3<f64>>,
) -> Matrix3<f64> {
    let c3 = c3.copied().unwrap_or_else(unit_z);
    Matrix3::from_columns(&[*c1, *c2, c3])
}

/// Determinant by cofactor expansion along the first row.
pub fn determinant_3x3(m: &Matrix3<f64>) -> f64 {
    m[(0, 0)] * (m[(1, 1)] * m[(2, 2)] - m[(1, 2)] * m[(2, 1)])
        - m[(0, 1)] * (m[(1, 0)] * m[(2, 2)] - m[(1, 2)] * m[(2, 0)])
        + m[(0, 2)] * (m[(1, 0)] * m[(2, 1)] - m[(1, 1)] * m[(2, 0)])
}

/// Inverts a 3x3 matrix with the adjugate method.
///
/// # Errors
/// - `SingularMatrix` when `|det| < epsilon`.
pub fn invert_3x3(m: &Matrix3<f64>, epsilon: f64) -> GeometryResult<Matrix3<f64>> {
    let det = determinant_3x3(m);
    if !det.is_finite() || det.abs() < epsilon {
        return Err(GeometryError::SingularMatrix { determinant: det });
    }

    let inv_det = 1.0 / det;
    // Adjugate = transposed cofactor matrix, written out row by row.
    let adjugate = Matrix3::new(
        m[(1, 1)] * m[(2, 2)] - m[(1, 2)] * m[(2, 1)],
        m[(0, 2)] * m[(2, 1)] - m[(0, 1)] * m[(2, 2)],
        m[(0, 1)] * m[(1, 2)] - m[(0, 2)] * m[(1, 1)],
        m[(1, 2)] * m[(2, 0)] - m[(1, 0)] * m[(2, 2)],
        m[(0, 0)] * m[(2, 2)] - m[(0, 2)] * m[(2, 0)],
        m[(0, 2)] * m[(1, 0)] - m[(0, 0)] * m[(1, 2)],
        m[(1, 0)] * m[(2, 1)] - m[(1, 1)] * m[(2, 0)],
        m[(0, 1)] * m[(2, 0)] - m[(0, 0)] * m[(2, 1)],
        m[(0, 0)] * m[(1, 1)] - m[(0, 1)] * m[(1, 0)],
    );
    Ok(adjugate * inv_det)
}

/// Inverts a 2x2 matrix; same failure rule as [`invert_3x3`].
pub fn invert_2x2(m: &Matrix2<f64>, epsilon: f64) -> GeometryResult<Matrix2<f64>> {
    let det = m[(0, 0)] * m[(1, 1)] - m[(0, 1)] * m[(1, 0)];
    if !det.is_finite() || det.abs() < epsilon {
        return Err(GeometryError::SingularMatrix { determinant: det });
    }
    let inv_det = 1.0 / det;
    Ok(Matrix2::new(
        m[(1, 1)] * inv_det,
        -m[(0, 1)] * inv_det,
        -m[(1, 0)] * inv_det,
        m[(0, 0)] * inv_det,
    ))
}

/// Embeds a 2x2 block in the top-left of a 3x3 matrix.
///
/// The z row/column is zero except for `corner` in the bottom-right.
pub fn pad_2x2(block: &Matrix2<f64>, corner: f64) -> Matrix3<f64> {
    Matrix3::new(
        block[(0, 0)],
        block[(0, 1)],
        0.0,
        block[(1, 0)],
        block[(1, 1)],
        0.0,
        0.0,
        0.0,
        corner,
    )
}

/// Row-major copy used by the persisted record shape.
pub fn to_rows(m: &Matrix3<f64>) -> [[f64; 3]; 3] {
    [
        [m[(0, 0)], m[(0, 1)], m[(0, 2)]],
        [m[(1, 0)], m[(1, 1)], m[(1, 2)]],
        [m[(2, 0)], m[(2, 1)], m[(2, 2)]],
    ]
}

pub fn from_rows(rows: &[[f64; 3]; 3]) -> Matrix3<f64> {
    Matrix3::new(
        rows[0][0], rows[0][1], rows[0][2], rows[1][0], rows[1][1], rows[1][2], rows[2][0],
        rows[2][1], rows[2][2],
    )
}

/// Largest absolute entry-wise difference between two matrices.
pub fn max_abs_diff(a: &Matrix3<f64>, b: &Matrix3<f64>) -> f64 {
    (a - b).iter().fold(0.0_f64, |acc, value| acc.max(value.abs()))
}
