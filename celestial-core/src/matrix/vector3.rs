//! 3D Cartesian vectors for points on the unit sphere.
//!
//! Every sky position is carried as a unit vector once it enters the
//! clustering engine. Separations, containment tests and polygon areas are
//! all dot and cross products on these vectors, which avoids the
//! longitude wrap-around and pole singularities of angle arithmetic.
//!
//! ```
//! use celestial_core::Vector3;
//!
//! let a = Vector3::x_axis();
//! let b = Vector3::y_axis();
//! assert_eq!(a.dot(&b), 0.0);
//! assert_eq!(a.cross(&b), Vector3::z_axis());
//! ```
//!
//! The spherical convention matches astronomical practice: `theta` is the
//! longitude measured from +X toward +Y and `phi` is the latitude above the
//! XY plane, both in radians.
use crate::{AstroError, AstroResult, MathErrorKind};
use std::fmt;

/// A 3D Cartesian vector.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Vector3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vector3 {
    #[inline]
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    #[inline]
    pub fn zeros() -> Self {
        Self::new(0.0, 0.0, 0.0)
    }

    #[inline]
    pub fn x_axis() -> Self {
        Self::new(1.0, 0.0, 0.0)
    }

    #[inline]
    pub fn y_axis() -> Self {
        Self::new(0.0, 1.0, 0.0)
    }

    #[inline]
    pub fn z_axis() -> Self {
        Self::new(0.0, 0.0, 1.0)
    }

    #[inline]
    pub fn magnitude(&self) -> f64 {
        libm::sqrt(self.magnitude_squared())
    }

    #[inline]
    pub fn magnitude_squared(&self) -> f64 {
        self.x * self.x + self.y * self.y + self.z * self.z
    }

    /// Returns a unit vector pointing in the same direction.
    ///
    /// The zero vector is returned unchanged rather than producing NaN.
    pub fn normalize(&self) -> Self {
        let mag = self.magnitude();
        if mag == 0.0 {
            *self
        } else {
            Self::new(self.x / mag, self.y / mag, self.z / mag)
        }
    }

    /// Like [`normalize`](Self::normalize) but fails on zero or non-finite
    /// vectors instead of passing them through.
    pub fn try_normalize(&self) -> AstroResult<Self> {
        let mag = self.magnitude();
        if !mag.is_finite() {
            return Err(AstroError::math_error(
                "Vector3::try_normalize",
                MathErrorKind::NotFinite,
                "vector has non-finite components",
            ));
        }
        if mag == 0.0 {
            return Err(AstroError::math_error(
                "Vector3::try_normalize",
                MathErrorKind::Degenerate,
                "cannot normalize the zero vector",
            ));
        }
        Ok(Self::new(self.x / mag, self.y / mag, self.z / mag))
    }

    /// Inner product. For unit vectors this is the cosine of their separation.
    #[inline]
    pub fn dot(&self, other: &Self) -> f64 {
        self.x * other.x + self.y * other.y + self.z * other.z
    }

    /// Right-handed cross product; `|a × b| = |a||b| sin θ`.
    #[inline]
    pub fn cross(&self, other: &Self) -> Self {
        Self::new(
            self.y * other.z - self.z * other.y,
            self.z * other.x - self.x * other.z,
            self.x * other.y - self.y * other.x,
        )
    }

    /// Creates a unit vector from longitude `theta` and latitude `phi` in radians.
    ///
    /// ```
    /// use celestial_core::Vector3;
    /// use std::f64::consts::FRAC_PI_2;
    ///
    /// let v = Vector3::from_spherical(0.0, FRAC_PI_2);
    /// assert!((v.z - 1.0).abs() < 1e-15);
    /// ```
    pub fn from_spherical(theta: f64, phi: f64) -> Self {
        let (sin_t, cos_t) = libm::sincos(theta);
        let (sin_p, cos_p) = libm::sincos(phi);
        Self::new(cos_p * cos_t, cos_p * sin_t, sin_p)
    }

    /// Returns `(theta, phi)` in radians with `theta` in `(-π, π]`.
    ///
    /// The vector need not be normalized. Points on the Z axis report
    /// `theta = 0`.
    pub fn to_spherical(&self) -> (f64, f64) {
        let d2 = self.x * self.x + self.y * self.y;

        let theta = if d2 == 0.0 {
            0.0
        } else {
            libm::atan2(self.y, self.x)
        };
        let phi = if self.z == 0.0 {
            0.0
        } else {
            libm::atan2(self.z, libm::sqrt(d2))
        };

        (theta, phi)
    }
}

impl std::ops::Add for Vector3 {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl std::ops::AddAssign for Vector3 {
    fn add_assign(&mut self, rhs: Self) {
        self.x += rhs.x;
        self.y += rhs.y;
        self.z += rhs.z;
    }
}

impl std::ops::Sub for Vector3 {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Self::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl std::ops::Mul<f64> for Vector3 {
    type Output = Self;

    fn mul(self, scalar: f64) -> Self {
        Self::new(self.x * scalar, self.y * scalar, self.z * scalar)
    }
}

impl std::ops::Neg for Vector3 {
    type Output = Self;

    fn neg(self) -> Self {
        Self::new(-self.x, -self.y, -self.z)
    }
}

impl fmt::Display for Vector3 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:.12}, {:.12}, {:.12}]", self.x, self.y, self.z)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f64::consts::{FRAC_PI_2, FRAC_PI_4};

    #[test]
    fn test_vector3_arithmetic() {
        let a = Vector3::new(1.0, 2.0, 3.0);
        let b = Vector3::new(4.0, 5.0, 6.0);
        assert_eq!(a + b, Vector3::new(5.0, 7.0, 9.0));
        assert_eq!(b - a, Vector3::new(3.0, 3.0, 3.0));
        assert_eq!(a * 2.0, Vector3::new(2.0, 4.0, 6.0));
        assert_eq!(-a, Vector3::new(-1.0, -2.0, -3.0));

        let mut c = a;
        c += b;
        assert_eq!(c, Vector3::new(5.0, 7.0, 9.0));
    }

    #[test]
    fn test_vector3_dot_cross() {
        let a = Vector3::new(1.0, 2.0, 3.0);
        let b = Vector3::new(4.0, 5.0, 6.0);
        assert_eq!(a.dot(&b), 32.0);
        assert_eq!(a.cross(&b), Vector3::new(-3.0, 6.0, -3.0));
        assert_eq!(a.cross(&b).dot(&a), 0.0);
    }

    #[test]
    fn test_spherical_roundtrip() {
        for &(theta, phi) in &[(0.3, -0.7), (-2.5, 1.2), (FRAC_PI_4, 0.0)] {
            let v = Vector3::from_spherical(theta, phi);
            assert_relative_eq!(v.magnitude(), 1.0, epsilon = 1e-15);
            let (t, p) = v.to_spherical();
            assert_relative_eq!(t, theta, epsilon = 1e-14);
            assert_relative_eq!(p, phi, epsilon = 1e-14);
        }
    }

    #[test]
    fn test_to_spherical_poles() {
        let (theta, phi) = Vector3::z_axis().to_spherical();
        assert_eq!(theta, 0.0);
        assert_eq!(phi, FRAC_PI_2);

        let (theta, phi) = (-Vector3::z_axis()).to_spherical();
        assert_eq!(theta, 0.0);
        assert_eq!(phi, -FRAC_PI_2);
    }

    #[test]
    fn test_normalize_zero_vector() {
        assert_eq!(Vector3::zeros().normalize(), Vector3::zeros());
        assert!(Vector3::zeros().try_normalize().is_err());
        assert!(Vector3::new(f64::NAN, 0.0, 0.0).try_normalize().is_err());

        let unit = Vector3::new(3.0, 4.0, 0.0).try_normalize().unwrap();
        assert_relative_eq!(unit.x, 0.6, epsilon = 1e-15);
        assert_relative_eq!(unit.y, 0.8, epsilon = 1e-15);
    }

    #[test]
    fn test_display_formatting() {
        let v = Vector3::new(1.0, 0.5, -0.25);
        assert_eq!(
            v.to_string(),
            "[1.000000000000, 0.500000000000, -0.250000000000]"
        );
    }
}
