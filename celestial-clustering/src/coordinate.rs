//! Sky positions in survey, equatorial and galactic angles.
//!
//! An [`AngularCoordinate`] keeps the two angles it was built from together
//! with the equatorial unit vector used for all distance math. Conversion to
//! another frame is computed on request, never stored.
//!
//! The survey frame is the SDSS (λ, η) system: a great-circle coordinate
//! system whose pole sits at (RA, Dec) = (275°, 0°) and whose node is at
//! RA 95°. λ plays the latitude role and η the longitude role; η is kept in
//! [0°, 360°) like every other longitude here.

use std::sync::OnceLock;

use celestial_core::constants::{ICRS_TO_GALACTIC, SURVEY_ETA_POLE_DEG, SURVEY_NODE_DEG};
use celestial_core::utils::{validate_latitude, validate_longitude, wrap_degrees};
use celestial_core::{spherical, RotationMatrix3, Vector3};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::cosmology::Cosmology;
use crate::errors::{ClusteringError, ClusteringResult};

/// Angular coordinate systems.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Frame {
    /// SDSS survey coordinates (λ, η).
    Survey,
    /// Right ascension and declination.
    Equatorial,
    /// Galactic longitude and latitude.
    Galactic,
}

fn survey_rotation() -> &'static RotationMatrix3 {
    static SURVEY: OnceLock<RotationMatrix3> = OnceLock::new();
    SURVEY.get_or_init(|| {
        let mut m = RotationMatrix3::identity();
        m.rotate_z(SURVEY_NODE_DEG.to_radians());
        m.rotate_x(SURVEY_ETA_POLE_DEG.to_radians());
        m
    })
}

fn galactic_rotation() -> &'static RotationMatrix3 {
    static GALACTIC: RotationMatrix3 = RotationMatrix3::from_array(ICRS_TO_GALACTIC);
    &GALACTIC
}

/// Survey-frame Cartesian vector: x = -sin λ, (y, z) span η.
fn survey_vector(lambda_deg: f64, eta_deg: f64) -> Vector3 {
    let (sin_l, cos_l) = libm::sincos(lambda_deg.to_radians());
    let (sin_e, cos_e) = libm::sincos(eta_deg.to_radians());
    Vector3::new(-sin_l, cos_l * cos_e, cos_l * sin_e)
}

fn equatorial_to_frame(unit: &Vector3, frame: Frame) -> (f64, f64) {
    match frame {
        Frame::Equatorial => {
            let (ra, dec) = unit.to_spherical();
            (wrap_degrees(ra.to_degrees()), dec.to_degrees())
        }
        Frame::Galactic => {
            let (l, b) = galactic_rotation().apply(unit).to_spherical();
            (wrap_degrees(l.to_degrees()), b.to_degrees())
        }
        Frame::Survey => {
            let s = survey_rotation().apply(unit);
            let lambda = -libm::asin(s.x.clamp(-1.0, 1.0));
            let eta = if s.y == 0.0 && s.z == 0.0 {
                0.0
            } else {
                libm::atan2(s.z, s.y)
            };
            (wrap_degrees(eta.to_degrees()), lambda.to_degrees())
        }
    }
}

fn frame_to_equatorial(longitude: f64, latitude: f64, frame: Frame) -> Vector3 {
    match frame {
        Frame::Equatorial => Vector3::from_spherical(longitude.to_radians(), latitude.to_radians()),
        Frame::Galactic => galactic_rotation().apply_transpose(&Vector3::from_spherical(
            longitude.to_radians(),
            latitude.to_radians(),
        )),
        Frame::Survey => survey_rotation().apply_transpose(&survey_vector(latitude, longitude)),
    }
}

/// A point on the sphere.
///
/// Longitudes are stored in [0°, 360°) and latitudes in [-90°, 90°].
///
/// ```
/// use celestial_clustering::{AngularCoordinate, Frame};
///
/// let c = AngularCoordinate::from_equatorial(185.0, 0.0).unwrap();
/// let s = c.to_frame(Frame::Survey);
/// let back = s.to_frame(Frame::Equatorial);
/// assert!((back.ra() - 185.0).abs() < 1e-9);
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct AngularCoordinate {
    frame: Frame,
    longitude: f64,
    latitude: f64,
    unit: Vector3,
}

impl AngularCoordinate {
    /// Builds a coordinate from `(longitude, latitude)` in degrees.
    ///
    /// For [`Frame::Survey`] the longitude is η and the latitude is λ.
    pub fn new(longitude: f64, latitude: f64, frame: Frame) -> ClusteringResult<Self> {
        let latitude = validate_latitude(latitude)?;
        let longitude = validate_longitude(longitude)?;
        Ok(Self {
            frame,
            longitude,
            latitude,
            unit: frame_to_equatorial(longitude, latitude, frame),
        })
    }

    pub fn from_equatorial(ra: f64, dec: f64) -> ClusteringResult<Self> {
        Self::new(ra, dec, Frame::Equatorial)
    }

    pub fn from_galactic(l: f64, b: f64) -> ClusteringResult<Self> {
        Self::new(l, b, Frame::Galactic)
    }

    /// Survey coordinates take λ first, matching the usual (λ, η) ordering.
    pub fn from_survey(lambda: f64, eta: f64) -> ClusteringResult<Self> {
        Self::new(eta, lambda, Frame::Survey)
    }

    /// Builds a coordinate from an equatorial Cartesian direction of any length.
    pub fn from_unit_vector(direction: Vector3, frame: Frame) -> ClusteringResult<Self> {
        let unit = direction.try_normalize()?;
        let (longitude, latitude) = equatorial_to_frame(&unit, frame);
        Ok(Self {
            frame,
            longitude,
            latitude: latitude.clamp(-90.0, 90.0),
            unit,
        })
    }

    /// Survey coordinate from angles already known to be in range; λ is
    /// clamped and η wrapped instead of validated.
    pub(crate) fn survey_unchecked(lambda: f64, eta: f64) -> Self {
        let latitude = lambda.clamp(-90.0, 90.0);
        let longitude = wrap_degrees(eta);
        Self {
            frame: Frame::Survey,
            longitude,
            latitude,
            unit: frame_to_equatorial(longitude, latitude, Frame::Survey),
        }
    }

    pub fn frame(&self) -> Frame {
        self.frame
    }

    /// Longitude in the native frame, degrees in [0, 360).
    pub fn longitude(&self) -> f64 {
        self.longitude
    }

    /// Latitude in the native frame, degrees in [-90, 90].
    pub fn latitude(&self) -> f64 {
        self.latitude
    }

    /// Equatorial unit vector.
    #[inline]
    pub fn unit_vector(&self) -> &Vector3 {
        &self.unit
    }

    /// Re-expresses the same point in another frame.
    pub fn to_frame(&self, frame: Frame) -> Self {
        if frame == self.frame {
            return *self;
        }
        let (longitude, latitude) = self.angles_in(frame);
        Self {
            frame,
            longitude,
            latitude,
            unit: self.unit,
        }
    }

    /// `(longitude, latitude)` in the requested frame, degrees.
    pub fn angles_in(&self, frame: Frame) -> (f64, f64) {
        if frame == self.frame {
            (self.longitude, self.latitude)
        } else {
            let (lon, lat) = equatorial_to_frame(&self.unit, frame);
            (lon, lat.clamp(-90.0, 90.0))
        }
    }

    pub fn ra(&self) -> f64 {
        self.angles_in(Frame::Equatorial).0
    }

    pub fn dec(&self) -> f64 {
        self.angles_in(Frame::Equatorial).1
    }

    pub fn gal_l(&self) -> f64 {
        self.angles_in(Frame::Galactic).0
    }

    pub fn gal_b(&self) -> f64 {
        self.angles_in(Frame::Galactic).1
    }

    pub fn lambda(&self) -> f64 {
        self.angles_in(Frame::Survey).1
    }

    pub fn eta(&self) -> f64 {
        self.angles_in(Frame::Survey).0
    }

    /// `(sin λ, η)` with η in degrees, the pair the pixelization consumes.
    pub(crate) fn survey_sin_lambda_eta(&self) -> (f64, f64) {
        if self.frame == Frame::Survey {
            return (libm::sin(self.latitude.to_radians()), self.longitude);
        }
        let s = survey_rotation().apply(&self.unit);
        let eta = if s.y == 0.0 && s.z == 0.0 {
            0.0
        } else {
            wrap_degrees(libm::atan2(s.z, s.y).to_degrees())
        };
        ((-s.x).clamp(-1.0, 1.0), eta)
    }

    /// Great-circle distance in degrees.
    pub fn angular_distance(&self, other: &Self) -> f64 {
        spherical::angular_separation(&self.unit, &other.unit).to_degrees()
    }

    /// Cosine of the separation.
    #[inline]
    pub fn dot(&self, other: &Self) -> f64 {
        self.unit.dot(&other.unit)
    }

    /// Equatorial position angle of `other`, degrees east of north in [0, 360).
    pub fn position_angle(&self, other: &Self) -> f64 {
        spherical::position_angle(&self.unit, &other.unit).to_degrees()
    }

    /// The point `distance` degrees away along equatorial position angle
    /// `position_angle`, expressed in this coordinate's frame.
    pub fn offset(&self, distance: f64, position_angle: f64) -> ClusteringResult<Self> {
        if !distance.is_finite() || !position_angle.is_finite() {
            return Err(ClusteringError::invalid_coordinate(
                "offset distance and position angle must be finite",
            ));
        }
        let moved = spherical::offset(&self.unit, distance.to_radians(), position_angle.to_radians());
        Self::from_unit_vector(moved, self.frame)
    }
}

/// Anything that can be stored in a point tree and paired in a correlation.
pub trait CatalogPoint: Clone + Send + Sync {
    fn coordinate(&self) -> &AngularCoordinate;

    fn weight(&self) -> f64 {
        1.0
    }

    /// A copy of this point moved to `coordinate`, keeping every other
    /// attribute. Random catalogs are built this way.
    fn relocated(&self, coordinate: AngularCoordinate) -> Self;
}

impl CatalogPoint for AngularCoordinate {
    fn coordinate(&self) -> &AngularCoordinate {
        self
    }

    fn relocated(&self, coordinate: AngularCoordinate) -> Self {
        coordinate
    }
}

fn check_weight(weight: f64) -> ClusteringResult<f64> {
    if weight.is_finite() {
        Ok(weight)
    } else {
        Err(ClusteringError::invalid_weight(weight, "point weights must be finite"))
    }
}

/// A coordinate with a scalar weight (intensity).
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct WeightedAngularCoordinate {
    coordinate: AngularCoordinate,
    weight: f64,
}

impl WeightedAngularCoordinate {
    pub fn new(coordinate: AngularCoordinate, weight: f64) -> ClusteringResult<Self> {
        Ok(Self {
            coordinate,
            weight: check_weight(weight)?,
        })
    }

    pub fn set_weight(&mut self, weight: f64) -> ClusteringResult<()> {
        self.weight = check_weight(weight)?;
        Ok(())
    }
}

impl CatalogPoint for WeightedAngularCoordinate {
    fn coordinate(&self) -> &AngularCoordinate {
        &self.coordinate
    }

    fn weight(&self) -> f64 {
        self.weight
    }

    fn relocated(&self, coordinate: AngularCoordinate) -> Self {
        Self {
            coordinate,
            weight: self.weight,
        }
    }
}

/// A weighted coordinate with a redshift and its transverse comoving distance.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CosmoCoordinate {
    coordinate: AngularCoordinate,
    weight: f64,
    redshift: f64,
    transverse_distance: f64,
}

impl CosmoCoordinate {
    pub fn new(
        coordinate: AngularCoordinate,
        weight: f64,
        redshift: f64,
        cosmology: &Cosmology,
    ) -> ClusteringResult<Self> {
        let transverse_distance = cosmology.transverse_comoving_distance(redshift)?;
        Ok(Self {
            coordinate,
            weight: check_weight(weight)?,
            redshift,
            transverse_distance,
        })
    }

    pub fn redshift(&self) -> f64 {
        self.redshift
    }

    /// Transverse comoving distance in Mpc/h.
    pub fn transverse_distance(&self) -> f64 {
        self.transverse_distance
    }

    /// Projected separation to `other` at this point's distance, Mpc/h.
    pub fn projected_distance(&self, other: &AngularCoordinate) -> f64 {
        self.transverse_distance * self.coordinate.angular_distance(other).to_radians()
    }
}

impl CatalogPoint for CosmoCoordinate {
    fn coordinate(&self) -> &AngularCoordinate {
        &self.coordinate
    }

    fn weight(&self) -> f64 {
        self.weight
    }

    fn relocated(&self, coordinate: AngularCoordinate) -> Self {
        Self { coordinate, ..*self }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_longitude_wraps_and_latitude_validated() {
        let c = AngularCoordinate::from_equatorial(-10.0, 5.0).unwrap();
        assert_eq!(c.longitude(), 350.0);
        assert!(AngularCoordinate::from_equatorial(10.0, 90.5).is_err());
        assert!(AngularCoordinate::from_equatorial(f64::NAN, 0.0).is_err());
    }

    #[test]
    fn test_survey_origin_sits_at_node() {
        // (λ, η) = (0, 0) lies at the survey node rotated by the η pole
        let c = AngularCoordinate::from_survey(0.0, 0.0).unwrap();
        let (ra, dec) = c.angles_in(Frame::Equatorial);
        assert_abs_diff_eq!(ra, 185.0, epsilon = 1e-9);
        assert_abs_diff_eq!(dec, 32.5, epsilon = 1e-9);
    }

    #[test]
    fn test_survey_pole() {
        // λ = 90 is the survey pole at RA 275, Dec 0
        let c = AngularCoordinate::from_survey(90.0, 0.0).unwrap();
        assert_abs_diff_eq!(c.ra(), 275.0, epsilon = 1e-9);
        assert_abs_diff_eq!(c.dec(), 0.0, epsilon = 1e-9);
    }

    #[test]
    fn test_frame_round_trips() {
        for &(ra, dec) in &[(0.0, 0.0), (123.4, -56.7), (359.9, 89.0), (200.0, 10.0)] {
            let c = AngularCoordinate::from_equatorial(ra, dec).unwrap();
            for frame in [Frame::Survey, Frame::Galactic] {
                let other = c.to_frame(frame);
                let rebuilt =
                    AngularCoordinate::new(other.longitude(), other.latitude(), frame).unwrap();
                assert!(rebuilt.angular_distance(&c) < 1e-9);
                assert_abs_diff_eq!(rebuilt.ra(), ra, epsilon = 1e-8);
                assert_abs_diff_eq!(rebuilt.dec(), dec, epsilon = 1e-8);
            }
        }
    }

    #[test]
    fn test_galactic_center_direction() {
        let gc = AngularCoordinate::from_galactic(0.0, 0.0).unwrap();
        assert_abs_diff_eq!(gc.ra(), 266.40499, epsilon = 1e-3);
        assert_abs_diff_eq!(gc.dec(), -28.93617, epsilon = 1e-3);
    }

    #[test]
    fn test_survey_sin_lambda_eta_consistent() {
        let c = AngularCoordinate::from_equatorial(150.0, 20.0).unwrap();
        let (sin_lambda, eta) = c.survey_sin_lambda_eta();
        let s = c.to_frame(Frame::Survey);
        let (sin_native, eta_native) = s.survey_sin_lambda_eta();
        assert_abs_diff_eq!(sin_lambda, sin_native, epsilon = 1e-12);
        assert_abs_diff_eq!(eta, eta_native, epsilon = 1e-9);
    }

    #[test]
    fn test_distance_and_offset() {
        let a = AngularCoordinate::from_equatorial(10.0, 10.0).unwrap();
        assert_eq!(a.angular_distance(&a), 0.0);

        let b = a.offset(2.0, 90.0).unwrap();
        assert_abs_diff_eq!(a.angular_distance(&b), 2.0, epsilon = 1e-10);
        assert_abs_diff_eq!(a.position_angle(&b), 90.0, epsilon = 1e-8);
        assert!(b.ra() > a.ra());
        assert!(a.offset(f64::INFINITY, 0.0).is_err());
    }

    #[test]
    fn test_antipodal_distance_is_exact() {
        let a = AngularCoordinate::from_unit_vector(Vector3::x_axis(), Frame::Equatorial).unwrap();
        let b = AngularCoordinate::from_unit_vector(-Vector3::x_axis(), Frame::Equatorial).unwrap();
        assert_abs_diff_eq!(a.angular_distance(&b), 180.0, epsilon = 1e-12);
    }

    #[test]
    fn test_weighted_coordinate_rejects_nan_weight() {
        let c = AngularCoordinate::from_equatorial(1.0, 1.0).unwrap();
        assert!(WeightedAngularCoordinate::new(c, f64::NAN).is_err());
        let mut w = WeightedAngularCoordinate::new(c, 2.5).unwrap();
        assert_eq!(w.weight(), 2.5);
        assert!(w.set_weight(f64::INFINITY).is_err());
        assert_eq!(w.weight(), 2.5);
    }

    #[test]
    fn test_relocated_keeps_attributes() {
        let cosmo = Cosmology::default();
        let c = AngularCoordinate::from_equatorial(1.0, 1.0).unwrap();
        let p = CosmoCoordinate::new(c, 0.5, 0.3, &cosmo).unwrap();
        let elsewhere = AngularCoordinate::from_equatorial(100.0, -20.0).unwrap();
        let moved = p.relocated(elsewhere);
        assert_eq!(moved.coordinate(), &elsewhere);
        assert_eq!(moved.weight(), 0.5);
        assert_eq!(moved.redshift(), 0.3);
        assert_eq!(moved.transverse_distance(), p.transverse_distance());
    }
}
