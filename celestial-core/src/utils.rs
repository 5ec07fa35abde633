//! Angle normalization and validation helpers.
//!
//! | Function | Input | Output Range |
//! |----------|-------|--------------|
//! | [`wrap_degrees`] | degrees | [0°, 360°) |
//! | [`normalize_angle_to_positive`] | radians | [0, 2π) |
//!
//! [`validate_latitude`] and [`validate_longitude`] reject non-finite and
//! out-of-range input instead of silently repairing it.

use crate::constants::TWOPI;
use crate::{AstroError, AstroResult, MathErrorKind};

/// Wraps an angle in degrees into `[0°, 360°)`.
///
/// ```
/// use celestial_core::utils::wrap_degrees;
///
/// assert_eq!(wrap_degrees(-90.0), 270.0);
/// assert_eq!(wrap_degrees(720.0), 0.0);
/// assert!(wrap_degrees(-1e-20) < 360.0);
/// ```
#[inline]
pub fn wrap_degrees(angle: f64) -> f64 {
    let mut wrapped = angle % 360.0;
    if wrapped < 0.0 {
        wrapped += 360.0;
    }
    // -tiny + 360 rounds to 360
    if wrapped >= 360.0 {
        wrapped = 0.0;
    }
    wrapped
}

/// Normalizes an angle in radians to the range [0, 2π).
#[inline]
pub fn normalize_angle_to_positive(angle: f64) -> f64 {
    let mut a = angle % TWOPI;
    if a < 0.0 {
        a += TWOPI;
    }
    if a >= TWOPI {
        a = 0.0;
    }
    a
}

/// Accepts a finite latitude in [-90°, 90°].
pub fn validate_latitude(lat_deg: f64) -> AstroResult<f64> {
    if !lat_deg.is_finite() {
        return Err(AstroError::math_error(
            "validate_latitude",
            MathErrorKind::NotFinite,
            "latitude not finite",
        ));
    }
    if !(-90.0..=90.0).contains(&lat_deg) {
        return Err(AstroError::math_error(
            "validate_latitude",
            MathErrorKind::OutOfRange,
            &format!("latitude {:.6}° out of range [-90°, +90°]", lat_deg),
        ));
    }
    Ok(lat_deg)
}

/// Accepts any finite longitude and wraps it into [0°, 360°).
pub fn validate_longitude(lon_deg: f64) -> AstroResult<f64> {
    if !lon_deg.is_finite() {
        return Err(AstroError::math_error(
            "validate_longitude",
            MathErrorKind::NotFinite,
            "longitude not finite",
        ));
    }
    Ok(wrap_degrees(lon_deg))
}
