//! Analytic footprint shapes that can be pixelized into a [`Map`](crate::Map).
//!
//! A [`Bound`] answers two questions: is a point inside, and where does a
//! spherical cap sit relative to the region. The second drives the recursive
//! pixelization in [`Map::from_bound`](crate::Map::from_bound): pixels whose
//! bounding cap is wholly inside are kept whole, wholly outside are dropped,
//! and the rest are split until the finest requested level, where the pixel
//! centre decides.

use celestial_core::constants::{PI, STRAD_TO_DEG2};
use celestial_core::{spherical, CapOverlap, SphericalPolygon, Vector3};

use crate::coordinate::AngularCoordinate;
use crate::errors::{ClusteringError, ClusteringResult};
use crate::pixel::Pixel;

pub trait Bound {
    fn contains(&self, coord: &AngularCoordinate) -> bool;

    /// Exact area in square degrees.
    fn area(&self) -> f64;

    /// Conservative placement of a cap of `radius` radians about `center`.
    fn cap_overlap(&self, center: &Vector3, radius: f64) -> CapOverlap;

    /// Placement of a pixel, via its bounding cap.
    fn classify(&self, pixel: &Pixel) -> CapOverlap {
        self.cap_overlap(&pixel.center_vector(), pixel.bounding_radius())
    }
}

fn check_radius(name: &str, radius: f64) -> ClusteringResult<f64> {
    if !radius.is_finite() || radius < 0.0 {
        return Err(ClusteringError::invalid_coordinate(format!(
            "{} radius {} must be finite and non-negative",
            name, radius
        )));
    }
    Ok(radius.min(180.0))
}

/// A spherical cap.
#[derive(Debug, Clone, PartialEq)]
pub struct CircleBound {
    center: AngularCoordinate,
    radius: f64,
}

impl CircleBound {
    /// Cap of `radius` degrees about `center`.
    pub fn new(center: AngularCoordinate, radius: f64) -> ClusteringResult<Self> {
        Ok(Self {
            center,
            radius: check_radius("circle", radius)?,
        })
    }

    pub fn center(&self) -> &AngularCoordinate {
        &self.center
    }

    pub fn radius(&self) -> f64 {
        self.radius
    }
}

impl Bound for CircleBound {
    fn contains(&self, coord: &AngularCoordinate) -> bool {
        self.center.angular_distance(coord) <= self.radius
    }

    fn area(&self) -> f64 {
        spherical::cap_area(self.radius.to_radians()) * STRAD_TO_DEG2
    }

    fn cap_overlap(&self, center: &Vector3, radius: f64) -> CapOverlap {
        let d = spherical::angular_separation(self.center.unit_vector(), center);
        let r = self.radius.to_radians();
        if d + radius <= r {
            CapOverlap::Inside
        } else if d - radius > r {
            CapOverlap::Outside
        } else {
            CapOverlap::Partial
        }
    }
}

/// The ring between two concentric caps.
#[derive(Debug, Clone, PartialEq)]
pub struct AnnulusBound {
    center: AngularCoordinate,
    inner: f64,
    outer: f64,
}

impl AnnulusBound {
    /// Ring of points between `inner` and `outer` degrees from `center`.
    pub fn new(center: AngularCoordinate, inner: f64, outer: f64) -> ClusteringResult<Self> {
        let inner = check_radius("inner", inner)?;
        let outer = check_radius("outer", outer)?;
        if outer < inner {
            return Err(ClusteringError::invalid_coordinate(format!(
                "outer radius {} is smaller than inner radius {}",
                outer, inner
            )));
        }
        Ok(Self {
            center,
            inner,
            outer,
        })
    }
}

impl Bound for AnnulusBound {
    fn contains(&self, coord: &AngularCoordinate) -> bool {
        let d = self.center.angular_distance(coord);
        d >= self.inner && d <= self.outer
    }

    fn area(&self) -> f64 {
        (spherical::cap_area(self.outer.to_radians()) - spherical::cap_area(self.inner.to_radians()))
            * STRAD_TO_DEG2
    }

    fn cap_overlap(&self, center: &Vector3, radius: f64) -> CapOverlap {
        let d = spherical::angular_separation(self.center.unit_vector(), center);
        let (lo, hi) = (self.inner.to_radians(), self.outer.to_radians());
        if d - radius >= lo && d + radius <= hi {
            CapOverlap::Inside
        } else if d + radius < lo || d - radius > hi || (lo >= PI) {
            CapOverlap::Outside
        } else {
            CapOverlap::Partial
        }
    }
}

/// A convex polygon with great-circle edges.
#[derive(Debug, Clone, PartialEq)]
pub struct PolygonBound {
    polygon: SphericalPolygon,
}

impl PolygonBound {
    /// Polygon through `vertices` in either winding order.
    pub fn new(vertices: &[AngularCoordinate]) -> ClusteringResult<Self> {
        let polygon = SphericalPolygon::new(vertices.iter().map(|v| *v.unit_vector()).collect())?;
        Ok(Self { polygon })
    }
}

impl Bound for PolygonBound {
    fn contains(&self, coord: &AngularCoordinate) -> bool {
        self.polygon.contains(coord.unit_vector())
    }

    fn area(&self) -> f64 {
        self.polygon.area() * STRAD_TO_DEG2
    }

    fn cap_overlap(&self, center: &Vector3, radius: f64) -> CapOverlap {
        self.polygon.cap_overlap(center, radius)
    }
}
