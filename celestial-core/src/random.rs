//! Seeded random sampling on the sphere.
//!
//! [`SkyRng`] wraps a ChaCha8 generator so that synthetic catalogs are
//! reproducible from a single `u64` seed on every platform. Area-uniform
//! sampling draws longitude uniformly and `z = sin(latitude)` uniformly,
//! which is exact for any longitude/`z` band.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::Vector3;

/// Deterministic random source for synthetic catalogs.
#[derive(Debug, Clone)]
pub struct SkyRng {
    rng: ChaCha8Rng,
}

impl SkyRng {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    /// Uniform draw in `[0, 1)`.
    #[inline]
    pub fn uniform(&mut self) -> f64 {
        self.rng.gen::<f64>()
    }

    /// Uniform draw in `[low, high)`. Returns `low` for an empty range.
    #[inline]
    pub fn uniform_range(&mut self, low: f64, high: f64) -> f64 {
        if high <= low {
            return low;
        }
        low + (high - low) * self.uniform()
    }

    /// Uniform index in `0..len`. `len` must be non-zero.
    #[inline]
    pub fn index(&mut self, len: usize) -> usize {
        self.rng.gen_range(0..len)
    }

    /// Area-uniform point in the band `lon ∈ [lon_min, lon_max)`,
    /// `sin(lat) ∈ [z_min, z_max)`, longitudes in radians.
    pub fn point_in_band(&mut self, lon_min: f64, lon_max: f64, z_min: f64, z_max: f64) -> Vector3 {
        let lon = self.uniform_range(lon_min, lon_max);
        let z = self.uniform_range(z_min, z_max).clamp(-1.0, 1.0);
        let r = libm::sqrt((1.0 - z * z).max(0.0));
        let (sin_lon, cos_lon) = libm::sincos(lon);
        Vector3::new(r * cos_lon, r * sin_lon, z)
    }

    /// Area-uniform point anywhere on the sphere.
    pub fn point_on_sphere(&mut self) -> Vector3 {
        self.point_in_band(0.0, crate::constants::TWOPI, -1.0, 1.0)
    }
}
