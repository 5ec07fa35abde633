//! Distance measures for converting angles to projected separations.
//!
//! Distances are in Mpc/h so that the Hubble constant drops out. The
//! comoving line-of-sight distance is
//!
//! ```text
//! D_C(z) = D_H ∫₀ᶻ dz' / E(z'),   E(z) = √(Ωm(1+z)³ + Ωk(1+z)² + ΩΛ)
//! ```
//!
//! and the transverse comoving distance `D_M` folds in curvature. A pair at
//! angular separation θ around a point at redshift z is `D_M(z) θ` apart.

use celestial_core::constants::HUBBLE_DISTANCE_MPC_H;
use celestial_core::math::simpson;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::errors::{ClusteringError, ClusteringResult};

/// Integration steps per unit redshift.
const STEPS_PER_UNIT_Z: f64 = 512.0;
const MIN_STEPS: usize = 64;

/// A ΛCDM background. Curvature is `1 - Ωm - ΩΛ`.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Cosmology {
    omega_m: f64,
    omega_lambda: f64,
}

impl Default for Cosmology {
    fn default() -> Self {
        Self {
            omega_m: 0.3,
            omega_lambda: 0.7,
        }
    }
}

impl Cosmology {
    pub fn new(omega_m: f64, omega_lambda: f64) -> ClusteringResult<Self> {
        if !omega_m.is_finite() || !omega_lambda.is_finite() {
            return Err(ClusteringError::invalid_cosmology(
                "density parameters must be finite",
            ));
        }
        if omega_m < 0.0 {
            return Err(ClusteringError::invalid_cosmology(format!(
                "matter density {} is negative",
                omega_m
            )));
        }
        Ok(Self {
            omega_m,
            omega_lambda,
        })
    }

    /// Flat universe with the given matter density.
    pub fn flat(omega_m: f64) -> ClusteringResult<Self> {
        Self::new(omega_m, 1.0 - omega_m)
    }

    pub fn omega_m(&self) -> f64 {
        self.omega_m
    }

    pub fn omega_lambda(&self) -> f64 {
        self.omega_lambda
    }

    pub fn omega_k(&self) -> f64 {
        1.0 - self.omega_m - self.omega_lambda
    }

    /// Dimensionless Hubble rate E(z).
    pub fn e_of_z(&self, z: f64) -> f64 {
        let a = 1.0 + z;
        libm::sqrt(self.omega_m * a * a * a + self.omega_k() * a * a + self.omega_lambda)
    }

    fn check_redshift(&self, z: f64) -> ClusteringResult<()> {
        if !z.is_finite() || z < 0.0 {
            return Err(ClusteringError::invalid_coordinate(format!(
                "redshift {} must be finite and non-negative",
                z
            )));
        }
        let e_sq = self.e_of_z(z).powi(2);
        if e_sq.is_nan() || e_sq <= 0.0 {
            return Err(ClusteringError::invalid_cosmology(format!(
                "expansion rate vanishes before z = {}",
                z
            )));
        }
        Ok(())
    }

    /// Line-of-sight comoving distance in Mpc/h.
    pub fn comoving_distance(&self, z: f64) -> ClusteringResult<f64> {
        self.check_redshift(z)?;
        let steps = ((z * STEPS_PER_UNIT_Z).ceil() as usize).max(MIN_STEPS);
        let integral = simpson(|zp| 1.0 / self.e_of_z(zp), 0.0, z, steps);
        if !integral.is_finite() {
            return Err(ClusteringError::invalid_cosmology(format!(
                "comoving distance diverges before z = {}",
                z
            )));
        }
        Ok(HUBBLE_DISTANCE_MPC_H * integral)
    }

    /// Transverse comoving distance D_M in Mpc/h.
    pub fn transverse_comoving_distance(&self, z: f64) -> ClusteringResult<f64> {
        let d_c = self.comoving_distance(z)?;
        let omega_k = self.omega_k();
        if omega_k.abs() < 1e-12 {
            return Ok(d_c);
        }
        let sqrt_k = libm::sqrt(omega_k.abs());
        let x = sqrt_k * d_c / HUBBLE_DISTANCE_MPC_H;
        let d_m = if omega_k > 0.0 {
            libm::sinh(x)
        } else {
            libm::sin(x)
        };
        Ok(HUBBLE_DISTANCE_MPC_H * d_m / sqrt_k)
    }

    /// Angular diameter distance D_A = D_M / (1 + z) in Mpc/h.
    pub fn angular_diameter_distance(&self, z: f64) -> ClusteringResult<f64> {
        Ok(self.transverse_comoving_distance(z)? / (1.0 + z))
    }

    /// Projected comoving separation in Mpc/h of two points at redshift `z`
    /// separated by `theta_deg` on the sky.
    pub fn projected_separation(&self, z: f64, theta_deg: f64) -> ClusteringResult<f64> {
        Ok(self.transverse_comoving_distance(z)? * theta_deg.to_radians())
    }
}
