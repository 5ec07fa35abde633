//! 3x3 rotation matrices for frame changes on the unit sphere.
//!
//! Frame conversions in the clustering engine (equatorial to survey, ICRS to
//! galactic) are fixed rotations. Building them once as a matrix and applying
//! the matrix to unit vectors keeps the round trip exact to a few ulps: the
//! inverse is the transpose.
//!
//! Rotations follow the ERFA sign convention: `rotate_z(psi)` maps a vector at
//! longitude `a` to longitude `a - psi`.

use super::Vector3;
use std::fmt;

/// A 3x3 rotation matrix stored row-major.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RotationMatrix3 {
    elements: [[f64; 3]; 3],
}

impl RotationMatrix3 {
    pub fn identity() -> Self {
        Self {
            elements: [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]],
        }
    }

    /// Creates a matrix from row-major elements without validating orthogonality.
    pub const fn from_array(elements: [[f64; 3]; 3]) -> Self {
        Self { elements }
    }

    pub fn elements(&self) -> &[[f64; 3]; 3] {
        &self.elements
    }

    /// Pre-multiplies by a rotation of `phi` radians about the X axis.
    pub fn rotate_x(&mut self, phi: f64) {
        let (s, c) = libm::sincos(phi);
        let e = self.elements;
        for col in 0..3 {
            self.elements[1][col] = c * e[1][col] + s * e[2][col];
            self.elements[2][col] = -s * e[1][col] + c * e[2][col];
        }
    }

    /// Pre-multiplies by a rotation of `psi` radians about the Z axis.
    pub fn rotate_z(&mut self, psi: f64) {
        let (s, c) = libm::sincos(psi);
        let e = self.elements;
        for col in 0..3 {
            self.elements[0][col] = c * e[0][col] + s * e[1][col];
            self.elements[1][col] = -s * e[0][col] + c * e[1][col];
        }
    }

    pub fn multiply(&self, other: &Self) -> Self {
        let mut result = [[0.0; 3]; 3];

        for (i, row) in result.iter_mut().enumerate() {
            for (j, cell) in row.iter_mut().enumerate() {
                for k in 0..3 {
                    *cell += self.elements[i][k] * other.elements[k][j];
                }
            }
        }

        Self::from_array(result)
    }

    /// Computes `M v`.
    pub fn apply(&self, v: &Vector3) -> Vector3 {
        let m = &self.elements;
        Vector3::new(
            m[0][0] * v.x + m[0][1] * v.y + m[0][2] * v.z,
            m[1][0] * v.x + m[1][1] * v.y + m[1][2] * v.z,
            m[2][0] * v.x + m[2][1] * v.y + m[2][2] * v.z,
        )
    }

    /// Computes `Mᵀ v`, the inverse rotation.
    pub fn apply_transpose(&self, v: &Vector3) -> Vector3 {
        let m = &self.elements;
        Vector3::new(
            m[0][0] * v.x + m[1][0] * v.y + m[2][0] * v.z,
            m[0][1] * v.x + m[1][1] * v.y + m[2][1] * v.z,
            m[0][2] * v.x + m[1][2] * v.y + m[2][2] * v.z,
        )
    }

    pub fn transpose(&self) -> Self {
        let m = &self.elements;
        Self::from_array([
            [m[0][0], m[1][0], m[2][0]],
            [m[0][1], m[1][1], m[2][1]],
            [m[0][2], m[1][2], m[2][2]],
        ])
    }

    pub fn determinant(&self) -> f64 {
        let m = &self.elements;

        m[0][0] * (m[1][1] * m[2][2] - m[1][2] * m[2][1])
            - m[0][1] * (m[1][0] * m[2][2] - m[1][2] * m[2][0])
            + m[0][2] * (m[1][0] * m[2][1] - m[1][1] * m[2][0])
    }

    /// True when `M Mᵀ = I` and `det M = +1` within `tolerance`.
    pub fn is_rotation_matrix(&self, tolerance: f64) -> bool {
        let product = self.multiply(&self.transpose());
        let identity = Self::identity();
        for i in 0..3 {
            for j in 0..3 {
                if (product.elements[i][j] - identity.elements[i][j]).abs() > tolerance {
                    return false;
                }
            }
        }
        (self.determinant() - 1.0).abs() <= tolerance
    }
}

impl std::ops::Mul<Vector3> for &RotationMatrix3 {
    type Output = Vector3;

    fn mul(self, rhs: Vector3) -> Vector3 {
        self.apply(&rhs)
    }
}

impl fmt::Display for RotationMatrix3 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for row in &self.elements {
            writeln!(f, "[{:>15.12} {:>15.12} {:>15.12}]", row[0], row[1], row[2])?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use std::f64::consts::FRAC_PI_2;

    #[test]
    fn test_rotate_z_shifts_longitude() {
        let mut m = RotationMatrix3::identity();
        m.rotate_z(FRAC_PI_2);
        let v = m.apply(&Vector3::x_axis());
        assert_abs_diff_eq!(v.x, 0.0, epsilon = 1e-15);
        assert_abs_diff_eq!(v.y, -1.0, epsilon = 1e-15);
        assert_abs_diff_eq!(v.z, 0.0, epsilon = 1e-15);
    }

    #[test]
    fn test_rotate_x_moves_y_to_minus_z() {
        let mut m = RotationMatrix3::identity();
        m.rotate_x(FRAC_PI_2);
        let v = &m * Vector3::y_axis();
        assert_abs_diff_eq!(v.y, 0.0, epsilon = 1e-15);
        assert_abs_diff_eq!(v.z, -1.0, epsilon = 1e-15);
    }

    #[test]
    fn test_transpose_inverts() {
        let mut m = RotationMatrix3::identity();
        m.rotate_z(0.5);
        m.rotate_x(0.3);
        assert!(m.is_rotation_matrix(1e-14));

        let v = Vector3::new(0.2, -0.4, 0.8);
        let back = m.apply_transpose(&m.apply(&v));
        assert_abs_diff_eq!(back.x, v.x, epsilon = 1e-15);
        assert_abs_diff_eq!(back.y, v.y, epsilon = 1e-15);
        assert_abs_diff_eq!(back.z, v.z, epsilon = 1e-15);
        assert_eq!(m.transpose().transpose(), m);
    }

    #[test]
    fn test_galactic_matrix_is_rotation() {
        let m = RotationMatrix3::from_array(crate::constants::ICRS_TO_GALACTIC);
        assert!(m.is_rotation_matrix(1e-12));
    }
}
