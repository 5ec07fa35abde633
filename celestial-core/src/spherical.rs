//! Spherical trigonometry on unit vectors.
//!
//! All angles here are radians and all positions are unit [`Vector3`]s.
//!
//! | Function | Returns |
//! |----------|---------|
//! | [`angular_separation`] | great-circle distance in [0, π] |
//! | [`position_angle`] | bearing from north through east in [0, 2π) |
//! | [`offset`] | point at a given distance and bearing |
//! | [`triangle_area`] / [`polygon_area`] | solid angle in steradians |
//! | [`cap_area`] | solid angle of a spherical cap |
//!
//! [`SphericalPolygon`] is a convex region bounded by great circles, with an
//! exact containment test and a conservative cap overlap classification.

use crate::constants::{PI, TWOPI};
use crate::utils::normalize_angle_to_positive;
use crate::{AstroError, AstroResult, MathErrorKind, Vector3};

/// Great-circle distance between two unit vectors, in radians.
///
/// Identical vectors return exactly 0 and exact antipodes return exactly π.
/// Everything else uses `atan2(|a × b|, a · b)`, which stays accurate at both
/// small and near-antipodal separations where `acos` loses precision.
#[inline]
pub fn angular_separation(a: &Vector3, b: &Vector3) -> f64 {
    if a == b {
        return 0.0;
    }
    if a.x == -b.x && a.y == -b.y && a.z == -b.z {
        return PI;
    }
    libm::atan2(a.cross(b).magnitude(), a.dot(b))
}

/// Local (east, north) tangent directions at `center`.
///
/// At the poles, where east is undefined, the meridian of zero longitude
/// supplies the reference direction.
fn tangent_frame(center: &Vector3) -> (Vector3, Vector3) {
    let east = Vector3::z_axis().cross(center);
    let east = if east.magnitude_squared() == 0.0 {
        Vector3::y_axis()
    } else {
        east.normalize()
    };
    let north = center.cross(&east);
    (east, north)
}

/// Bearing of `target` as seen from `center`, measured from north through
/// east, in `[0, 2π)`.
pub fn position_angle(center: &Vector3, target: &Vector3) -> f64 {
    let (east, north) = tangent_frame(center);
    let e = target.dot(&east);
    let n = target.dot(&north);
    if e == 0.0 && n == 0.0 {
        return 0.0;
    }
    normalize_angle_to_positive(libm::atan2(e, n))
}

/// Point reached by travelling `distance` radians from `center` along
/// bearing `angle` (north through east).
pub fn offset(center: &Vector3, distance: f64, angle: f64) -> Vector3 {
    let (east, north) = tangent_frame(center);
    let (sin_d, cos_d) = libm::sincos(distance);
    let (sin_a, cos_a) = libm::sincos(angle);
    let direction = north * cos_a + east * sin_a;
    (*center * cos_d + direction * sin_d).normalize()
}

/// Solid angle of the spherical triangle `abc`, in steradians.
///
/// Uses the Eriksson (1990) form `tan(E/2) = |a·(b×c)| / (1 + a·b + b·c + c·a)`.
pub fn triangle_area(a: &Vector3, b: &Vector3, c: &Vector3) -> f64 {
    let numerator = a.dot(&b.cross(c)).abs();
    let denominator = 1.0 + a.dot(b) + b.dot(c) + c.dot(a);
    2.0 * libm::atan2(numerator, denominator)
}

/// Solid angle of a convex spherical polygon, in steradians.
pub fn polygon_area(vertices: &[Vector3]) -> AstroResult<f64> {
    if vertices.len() < 3 {
        return Err(AstroError::math_error(
            "polygon_area",
            MathErrorKind::InvalidInput,
            &format!("need at least 3 vertices, got {}", vertices.len()),
        ));
    }
    let anchor = &vertices[0];
    Ok(vertices[1..]
        .windows(2)
        .map(|pair| triangle_area(anchor, &pair[0], &pair[1]))
        .sum())
}

/// Solid angle of a cap of angular `radius`, in steradians.
#[inline]
pub fn cap_area(radius: f64) -> f64 {
    if radius <= 0.0 {
        return 0.0;
    }
    if radius >= PI {
        return 2.0 * TWOPI;
    }
    TWOPI * (1.0 - libm::cos(radius))
}

/// How a spherical cap relates to a region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapOverlap {
    /// The cap lies entirely inside the region.
    Inside,
    /// The cap may straddle the region boundary.
    Partial,
    /// The cap lies entirely outside the region.
    Outside,
}

/// A convex polygon on the sphere bounded by great-circle edges.
///
/// Vertices may be given in either winding; they are stored
/// counter-clockwise as seen from outside the sphere so every edge normal
/// points into the polygon.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SphericalPolygon {
    vertices: Vec<Vector3>,
    normals: Vec<Vector3>,
}

impl SphericalPolygon {
    pub fn new(vertices: Vec<Vector3>) -> AstroResult<Self> {
        if vertices.len() < 3 {
            return Err(AstroError::math_error(
                "SphericalPolygon::new",
                MathErrorKind::InvalidInput,
                &format!("need at least 3 vertices, got {}", vertices.len()),
            ));
        }
        let mut vertices = vertices
            .iter()
            .map(|v| v.try_normalize())
            .collect::<AstroResult<Vec<_>>>()?;

        let centroid = vertices
            .iter()
            .fold(Vector3::zeros(), |acc, v| acc + *v)
            .try_normalize()
            .map_err(|_| {
                AstroError::calculation_error("SphericalPolygon::new", "vertices have no centroid")
            })?;

        let mut normals = edge_normals(&vertices)?;
        if normals.iter().all(|n| n.dot(&centroid) < 0.0) {
            vertices.reverse();
            normals = edge_normals(&vertices)?;
        }
        if !normals.iter().all(|n| n.dot(&centroid) > 0.0) {
            return Err(AstroError::calculation_error(
                "SphericalPolygon::new",
                "vertices do not describe a convex polygon",
            ));
        }

        Ok(Self { vertices, normals })
    }

    pub fn vertices(&self) -> &[Vector3] {
        &self.vertices
    }

    /// Point-in-polygon test. Points on an edge count as inside.
    pub fn contains(&self, point: &Vector3) -> bool {
        self.normals.iter().all(|n| n.dot(point) >= 0.0)
    }

    /// Solid angle in steradians.
    pub fn area(&self) -> f64 {
        self.vertices[1..]
            .windows(2)
            .map(|pair| triangle_area(&self.vertices[0], &pair[0], &pair[1]))
            .sum()
    }

    /// Classifies a cap of angular `radius` around `center`.
    ///
    /// Never reports `Inside` or `Outside` wrongly; uncertain cases are `Partial`.
    pub fn cap_overlap(&self, center: &Vector3, radius: f64) -> CapOverlap {
        if radius >= PI / 2.0 {
            return CapOverlap::Partial;
        }
        let sin_r = libm::sin(radius);
        let mut inside = true;
        for n in &self.normals {
            let s = n.dot(center);
            if s < -sin_r {
                return CapOverlap::Outside;
            }
            if s < sin_r {
                inside = false;
            }
        }
        if inside {
            CapOverlap::Inside
        } else {
            CapOverlap::Partial
        }
    }
}

fn edge_normals(vertices: &[Vector3]) -> AstroResult<Vec<Vector3>> {
    let count = vertices.len();
    (0..count)
        .map(|i| {
            let a = &vertices[i];
            let b = &vertices[(i + 1) % count];
            a.cross(b).try_normalize().map_err(|_| {
                AstroError::calculation_error(
                    "SphericalPolygon::new",
                    &format!("edge {} joins coincident or antipodal vertices", i),
                )
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f64::consts::FRAC_PI_2;

    fn radec(ra_deg: f64, dec_deg: f64) -> Vector3 {
        Vector3::from_spherical(ra_deg.to_radians(), dec_deg.to_radians())
    }

    #[test]
    fn test_angular_separation_exact_branches() {
        let a = radec(12.0, -34.0);
        assert_eq!(angular_separation(&a, &a), 0.0);
        assert_eq!(angular_separation(&a, &-a), PI);
        assert_relative_eq!(
            angular_separation(&Vector3::x_axis(), &Vector3::y_axis()),
            FRAC_PI_2,
            epsilon = 1e-15
        );
    }

    #[test]
    fn test_angular_separation_small_angles() {
        let a = radec(10.0, 10.0);
        let b = radec(10.0, 10.0 + 1e-7);
        assert_relative_eq!(
            angular_separation(&a, &b).to_degrees(),
            1e-7,
            max_relative = 1e-6
        );
    }

    #[test]
    fn test_position_angle_cardinal() {
        let center = radec(0.0, 0.0);
        assert_relative_eq!(position_angle(&center, &radec(0.0, 1.0)), 0.0, epsilon = 1e-12);
        assert_relative_eq!(
            position_angle(&center, &radec(1.0, 0.0)),
            FRAC_PI_2,
            epsilon = 1e-12
        );
        assert_relative_eq!(position_angle(&center, &radec(0.0, -1.0)), PI, epsilon = 1e-12);
    }

    #[test]
    fn test_offset_inverts_position_angle() {
        let center = radec(123.0, -45.0);
        let target = offset(&center, 0.1, 1.0);
        assert_relative_eq!(angular_separation(&center, &target), 0.1, epsilon = 1e-12);
        assert_relative_eq!(position_angle(&center, &target), 1.0, epsilon = 1e-10);
    }

    #[test]
    fn test_octant_area() {
        let area = triangle_area(&Vector3::x_axis(), &Vector3::y_axis(), &Vector3::z_axis());
        assert_relative_eq!(area, PI / 2.0, epsilon = 1e-14);
    }

    #[test]
    fn test_polygon_area_requires_three_vertices() {
        assert!(polygon_area(&[Vector3::x_axis(), Vector3::y_axis()]).is_err());
    }

    #[test]
    fn test_cap_area_limits() {
        assert_eq!(cap_area(0.0), 0.0);
        assert_relative_eq!(cap_area(FRAC_PI_2), TWOPI, epsilon = 1e-14);
        assert_relative_eq!(cap_area(PI), 2.0 * TWOPI, epsilon = 1e-14);
    }

    #[test]
    fn test_polygon_contains_and_winding() {
        let ccw = vec![radec(0.0, 0.0), radec(10.0, 0.0), radec(10.0, 10.0), radec(0.0, 10.0)];
        let mut cw = ccw.clone();
        cw.reverse();

        for vertices in [ccw, cw] {
            let poly = SphericalPolygon::new(vertices).unwrap();
            assert!(poly.contains(&radec(5.0, 5.0)));
            assert!(!poly.contains(&radec(15.0, 5.0)));
            assert!(!poly.contains(&radec(5.0, -1.0)));
        }
    }

    #[test]
    fn test_polygon_area_matches_octant() {
        let poly =
            SphericalPolygon::new(vec![Vector3::x_axis(), Vector3::y_axis(), Vector3::z_axis()])
                .unwrap();
        assert_relative_eq!(poly.area(), PI / 2.0, epsilon = 1e-14);
        assert_relative_eq!(
            polygon_area(poly.vertices()).unwrap(),
            PI / 2.0,
            epsilon = 1e-14
        );
    }

    #[test]
    fn test_polygon_rejects_degenerate_edges() {
        let a = radec(0.0, 0.0);
        assert!(SphericalPolygon::new(vec![a, a, radec(1.0, 1.0)]).is_err());
    }

    #[test]
    fn test_cap_overlap() {
        let poly = SphericalPolygon::new(vec![
            radec(0.0, 0.0),
            radec(10.0, 0.0),
            radec(10.0, 10.0),
            radec(0.0, 10.0),
        ])
        .unwrap();
        let r = 1.0_f64.to_radians();
        assert_eq!(poly.cap_overlap(&radec(5.0, 5.0), r), CapOverlap::Inside);
        assert_eq!(poly.cap_overlap(&radec(30.0, 5.0), r), CapOverlap::Outside);
        assert_eq!(poly.cap_overlap(&radec(10.0, 5.0), r), CapOverlap::Partial);
    }
}
