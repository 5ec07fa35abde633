//! Hierarchical equal-area pixelization of the sphere.
//!
//! Pixels are cells of a latitude/longitude grid in survey coordinates. At
//! level `L` the grid has `36·2^L` columns in η and `13·2^L` rows in `sin λ`,
//! so every cell at a level has the same area and each cell splits into
//! exactly four children. Cell edges are meridians and parallels, which makes
//! containment an exact index computation rather than a polygon test.
//!
//! # Indexing
//!
//! The nested index of a pixel is its level-0 base cell followed by the
//! Z-order interleaving of its local column and row bits:
//!
//! ```text
//! index = (base_row · 36 + base_col) · 4^L + morton(local_col, local_row)
//! ```
//!
//! Parents and children are bit shifts, and every descendant of a pixel falls
//! in one contiguous index range. [`Pixel`]'s `Ord` implementation compares
//! pixels by their first max-level descendant, then by level, so a pixel sorts
//! immediately before all of its descendants. Sorted collections use this to
//! find overlaps with a single range query.
//!
//! | Level | Pixels | Pixel side |
//! |-------|--------|-----------|
//! | 0 | 468 | ~9.4° |
//! | 4 | 119,808 | ~0.59° |
//! | 8 | 30.7M | ~0.037° |
//! | 15 | 5.0e11 | ~1.0″ |

use std::cmp::Ordering;
use std::fmt;

use celestial_core::constants::FULL_SKY_DEG2;
use celestial_core::utils::wrap_degrees;
use celestial_core::{spherical, SkyRng, Vector3};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::coordinate::AngularCoordinate;
use crate::errors::{ClusteringError, ClusteringResult};

/// Finest supported level.
pub const MAX_LEVEL: u8 = 15;

/// Columns (η) in the level-0 grid.
pub const BASE_NX: u64 = 36;

/// Rows (sin λ) in the level-0 grid.
pub const BASE_NY: u64 = 13;

/// Cells in the level-0 grid.
pub const BASE_PIXELS: u64 = BASE_NX * BASE_NY;

/// η of the western edge of column 0, degrees.
pub const ETA_OFFSET_DEG: f64 = 91.25;

/// Slack added to bounding caps to absorb rounding in the corner distances.
const RADIUS_PAD_RAD: f64 = 1e-12;

const RANDOM_POINT_ATTEMPTS: usize = 32;

/// Columns at `level`.
#[inline]
pub fn nx(level: u8) -> u64 {
    BASE_NX << level
}

/// Rows at `level`.
#[inline]
pub fn ny(level: u8) -> u64 {
    BASE_NY << level
}

/// Number of pixels covering the sphere at `level`.
#[inline]
pub fn pixel_count(level: u8) -> u64 {
    BASE_PIXELS << (2 * level as u32)
}

/// Area of one pixel at `level`, square degrees.
#[inline]
pub fn pixel_area(level: u8) -> f64 {
    FULL_SKY_DEG2 / pixel_count(level) as f64
}

pub(crate) fn check_level(level: u8) -> ClusteringResult<()> {
    if level > MAX_LEVEL {
        return Err(ClusteringError::ResolutionExceeded {
            level,
            max: MAX_LEVEL,
        });
    }
    Ok(())
}

fn interleave(lx: u64, ly: u64, level: u8) -> u64 {
    let mut result: u64 = 0;
    for i in 0..level as u64 {
        let bit_x = (lx >> i) & 1;
        let bit_y = (ly >> i) & 1;
        result |= (bit_x << (2 * i)) | (bit_y << (2 * i + 1));
    }
    result
}

fn deinterleave(local: u64, level: u8) -> (u64, u64) {
    let mut lx = 0;
    let mut ly = 0;
    for i in 0..level as u64 {
        lx |= ((local >> (2 * i)) & 1) << i;
        ly |= ((local >> (2 * i + 1)) & 1) << i;
    }
    (lx, ly)
}

/// Grid position of `coord` at the finest level. Coarser positions are
/// right shifts of this one, which keeps every level consistent.
pub(crate) fn locate(coord: &AngularCoordinate) -> (u64, u64) {
    let (sin_lambda, eta) = coord.survey_sin_lambda_eta();
    let nx_max = nx(MAX_LEVEL);
    let ny_max = ny(MAX_LEVEL);

    let u = wrap_degrees(eta - ETA_OFFSET_DEG) / 360.0;
    let x = ((u * nx_max as f64) as u64).min(nx_max - 1);

    let t = ((1.0 - sin_lambda) / 2.0).clamp(0.0, 1.0);
    let y = ((t * ny_max as f64) as u64).min(ny_max - 1);
    (x, y)
}

/// One cell of the pixelization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Pixel {
    level: u8,
    index: u64,
}

impl Pixel {
    /// Pixel `index` at `level`.
    pub fn new(level: u8, index: u64) -> ClusteringResult<Self> {
        check_level(level)?;
        if index >= pixel_count(level) {
            return Err(ClusteringError::invalid_pixel(format!(
                "index {} out of range for level {} ({} pixels)",
                index,
                level,
                pixel_count(level)
            )));
        }
        Ok(Self { level, index })
    }

    /// Pixel at column `x` (η) and row `y` (sin λ, north first).
    pub fn from_xy(level: u8, x: u64, y: u64) -> ClusteringResult<Self> {
        check_level(level)?;
        if x >= nx(level) || y >= ny(level) {
            return Err(ClusteringError::invalid_pixel(format!(
                "grid position ({}, {}) out of range for level {}",
                x, y, level
            )));
        }
        Ok(Self::from_xy_unchecked(level, x, y))
    }

    /// The pixel at `level` containing `coord`.
    pub fn from_coordinate(coord: &AngularCoordinate, level: u8) -> ClusteringResult<Self> {
        check_level(level)?;
        let (x, y) = locate(coord);
        Ok(Self::from_max_xy(x, y, level))
    }

    pub(crate) fn from_max_xy(x: u64, y: u64, level: u8) -> Self {
        let shift = MAX_LEVEL - level;
        Self::from_xy_unchecked(level, x >> shift, y >> shift)
    }

    fn from_xy_unchecked(level: u8, x: u64, y: u64) -> Self {
        let mask = (1u64 << level) - 1;
        let base = (y >> level) * BASE_NX + (x >> level);
        let index = (base << (2 * level as u32)) | interleave(x & mask, y & mask, level);
        Self { level, index }
    }

    /// Subdivision depth; 0 is the coarsest grid.
    #[inline]
    pub fn level(&self) -> u8 {
        self.level
    }

    /// Cells per base-cell side, `2^level`.
    #[inline]
    pub fn resolution(&self) -> u32 {
        1 << self.level
    }

    #[inline]
    pub fn index(&self) -> u64 {
        self.index
    }

    /// `(column, row)` in the grid at this pixel's level.
    pub fn xy(&self) -> (u64, u64) {
        let shift = 2 * self.level as u32;
        let base = self.index >> shift;
        let local = self.index & ((1u64 << shift) - 1);
        let (lx, ly) = deinterleave(local, self.level);
        (
            ((base % BASE_NX) << self.level) | lx,
            ((base / BASE_NX) << self.level) | ly,
        )
    }

    /// Area in square degrees.
    #[inline]
    pub fn area(&self) -> f64 {
        pixel_area(self.level)
    }

    pub fn contains(&self, coord: &AngularCoordinate) -> bool {
        let (x, y) = locate(coord);
        Self::from_max_xy(x, y, self.level) == *self
    }

    /// True when `other` is this pixel or one of its descendants.
    pub fn contains_pixel(&self, other: &Pixel) -> bool {
        other.level >= self.level && other.index >> (2 * (other.level - self.level) as u32) == self.index
    }

    pub fn parent(&self) -> Option<Pixel> {
        self.ancestor(self.level.checked_sub(1)?)
    }

    /// The pixel at coarser `level` containing this one.
    pub fn ancestor(&self, level: u8) -> Option<Pixel> {
        if level > self.level {
            return None;
        }
        Some(Pixel {
            level,
            index: self.index >> (2 * (self.level - level) as u32),
        })
    }

    /// The four pixels one level finer, in nested order.
    pub fn children(&self) -> ClusteringResult<[Pixel; 4]> {
        if self.level >= MAX_LEVEL {
            return Err(ClusteringError::NotSubdivisible {
                level: self.level,
                index: self.index,
            });
        }
        let level = self.level + 1;
        let first = self.index << 2;
        Ok([
            Pixel { level, index: first },
            Pixel { level, index: first + 1 },
            Pixel { level, index: first + 2 },
            Pixel { level, index: first + 3 },
        ])
    }

    /// All descendants at finer `level`, in nested order.
    pub fn descendants(&self, level: u8) -> ClusteringResult<impl Iterator<Item = Pixel>> {
        check_level(level)?;
        if level < self.level {
            return Err(ClusteringError::invalid_pixel(format!(
                "level {} is coarser than pixel level {}",
                level, self.level
            )));
        }
        let shift = 2 * (level - self.level) as u32;
        let start = self.index << shift;
        let end = (self.index + 1) << shift;
        Ok((start..end).map(move |index| Pixel { level, index }))
    }

    /// The up-to-8 same-level cells sharing an edge or corner.
    ///
    /// Columns wrap around in η; rows stop at the poles.
    pub fn neighbors(&self) -> Vec<Pixel> {
        let (x, y) = self.xy();
        let cols = nx(self.level) as i64;
        let rows = ny(self.level) as i64;
        let mut out = Vec::with_capacity(8);
        for dy in -1i64..=1 {
            let row = y as i64 + dy;
            if row < 0 || row >= rows {
                continue;
            }
            for dx in -1i64..=1 {
                if dx == 0 && dy == 0 {
                    continue;
                }
                let col = (x as i64 + dx).rem_euclid(cols);
                out.push(Self::from_xy_unchecked(self.level, col as u64, row as u64));
            }
        }
        out.sort();
        out.dedup();
        out
    }

    /// `(η_min, η_max)` in degrees. `η_min` is in [0, 360); `η_max` may
    /// exceed 360 for the column that straddles η = 0.
    pub fn eta_bounds(&self) -> (f64, f64) {
        let (x, _) = self.xy();
        let width = 360.0 / nx(self.level) as f64;
        let eta_min = wrap_degrees(ETA_OFFSET_DEG + x as f64 * width);
        (eta_min, eta_min + width)
    }

    /// `(sin λ_min, sin λ_max)`.
    pub fn sin_lambda_bounds(&self) -> (f64, f64) {
        let (_, y) = self.xy();
        let rows = ny(self.level) as f64;
        (1.0 - 2.0 * (y + 1) as f64 / rows, 1.0 - 2.0 * y as f64 / rows)
    }

    /// `(λ_min, λ_max)` in degrees.
    pub fn lambda_bounds(&self) -> (f64, f64) {
        let (lo, hi) = self.sin_lambda_bounds();
        (
            libm::asin(lo.clamp(-1.0, 1.0)).to_degrees(),
            libm::asin(hi.clamp(-1.0, 1.0)).to_degrees(),
        )
    }

    /// Centre of the cell, halfway in η and in `sin λ`.
    pub fn center(&self) -> AngularCoordinate {
        let (eta_min, eta_max) = self.eta_bounds();
        let (s_min, s_max) = self.sin_lambda_bounds();
        let lambda = libm::asin((0.5 * (s_min + s_max)).clamp(-1.0, 1.0)).to_degrees();
        survey_point(lambda, 0.5 * (eta_min + eta_max))
    }

    #[inline]
    pub fn center_vector(&self) -> Vector3 {
        *self.center().unit_vector()
    }

    /// Corners ordered NW, NE, SE, SW in survey coordinates.
    pub fn corners(&self) -> [AngularCoordinate; 4] {
        let (eta_min, eta_max) = self.eta_bounds();
        let (lambda_min, lambda_max) = self.lambda_bounds();
        [
            survey_point(lambda_max, eta_min),
            survey_point(lambda_max, eta_max),
            survey_point(lambda_min, eta_max),
            survey_point(lambda_min, eta_min),
        ]
    }

    /// Radius in radians of a cap about [`center`](Self::center) that
    /// encloses the whole cell.
    ///
    /// For a cell bounded by meridians and parallels the farthest boundary
    /// point from the centre is always a corner.
    pub fn bounding_radius(&self) -> f64 {
        let center = self.center_vector();
        self.corners()
            .iter()
            .map(|c| spherical::angular_separation(&center, c.unit_vector()))
            .fold(0.0, f64::max)
            + RADIUS_PAD_RAD
    }

    /// Area-uniform random point inside the cell.
    pub fn random_point(&self, rng: &mut SkyRng) -> AngularCoordinate {
        let (eta_min, eta_max) = self.eta_bounds();
        let (s_min, s_max) = self.sin_lambda_bounds();
        for _ in 0..RANDOM_POINT_ATTEMPTS {
            let eta = rng.uniform_range(eta_min, eta_max);
            let s = rng.uniform_range(s_min, s_max);
            let lambda = libm::asin(s.clamp(-1.0, 1.0)).to_degrees();
            let point = survey_point(lambda, eta);
            // rounding can push a draw on an edge into the neighbouring cell
            if self.contains(&point) {
                return point;
            }
        }
        self.center()
    }

    /// Same-level pixels whose centres lie within `radius` degrees of this
    /// pixel's centre (this pixel included).
    pub fn within_radius(&self, radius: f64) -> Vec<Pixel> {
        pixels_within_annulus(&self.center(), self.level, 0.0, radius)
    }

    /// Same-level pixels whose centres lie in `[inner, outer]` degrees of this
    /// pixel's centre.
    pub fn within_annulus(&self, inner: f64, outer: f64) -> Vec<Pixel> {
        pixels_within_annulus(&self.center(), self.level, inner, outer)
    }

    fn sort_key(&self) -> u64 {
        self.index << (2 * (MAX_LEVEL - self.level) as u32)
    }
}

#[inline]
fn survey_point(lambda: f64, eta: f64) -> AngularCoordinate {
    AngularCoordinate::survey_unchecked(lambda, eta)
}

/// Pixels at `level` whose centres lie within `[inner, outer]` degrees of
/// `center`, in nested order.
pub fn pixels_within_annulus(
    center: &AngularCoordinate,
    level: u8,
    inner: f64,
    outer: f64,
) -> Vec<Pixel> {
    let level = level.min(MAX_LEVEL);
    if outer < 0.0 || outer < inner {
        return Vec::new();
    }
    let cols = nx(level);
    let rows = ny(level);
    let (sin_lambda_c, eta_c) = center.survey_sin_lambda_eta();
    let lambda_c = libm::asin(sin_lambda_c).to_degrees();
    let outer_capped = outer.min(180.0);

    let lambda_hi = (lambda_c + outer_capped).min(90.0);
    let lambda_lo = (lambda_c - outer_capped).max(-90.0);
    let row_of = |lambda: f64| -> u64 {
        let t = ((1.0 - libm::sin(lambda.to_radians())) / 2.0).clamp(0.0, 1.0);
        ((t * rows as f64) as u64).min(rows - 1)
    };
    let (y_first, y_last) = (row_of(lambda_hi), row_of(lambda_lo));

    let covers_pole = lambda_c + outer_capped >= 90.0 || lambda_c - outer_capped <= -90.0;
    let column_width = 360.0 / cols as f64;
    let x_center = ((wrap_degrees(eta_c - ETA_OFFSET_DEG) / column_width) as u64).min(cols - 1);
    let half_span = if covers_pole {
        cols
    } else {
        let ratio = libm::sin(outer_capped.to_radians()) / libm::cos(lambda_c.to_radians());
        let delta_eta = libm::asin(ratio.min(1.0)).to_degrees();
        (delta_eta / column_width).ceil() as u64 + 1
    };

    let center_vec = center.unit_vector();
    let (inner_rad, outer_rad) = (inner.max(0.0).to_radians(), outer_capped.to_radians());
    let mut out = Vec::new();
    for y in y_first..=y_last {
        let columns: Box<dyn Iterator<Item = u64>> = if 2 * half_span + 1 >= cols {
            Box::new(0..cols)
        } else {
            let start = x_center + cols - half_span;
            Box::new((0..=2 * half_span).map(move |k| (start + k) % cols))
        };
        for x in columns {
            let pixel = Pixel::from_xy_unchecked(level, x, y);
            let d = spherical::angular_separation(center_vec, &pixel.center_vector());
            if d >= inner_rad && d <= outer_rad {
                out.push(pixel);
            }
        }
    }
    out.sort();
    out
}

impl Ord for Pixel {
    fn cmp(&self, other: &Self) -> Ordering {
        self.sort_key()
            .cmp(&other.sort_key())
            .then(self.level.cmp(&other.level))
    }
}

impl PartialOrd for Pixel {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Pixel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Pixel(level={}, index={})", self.level, self.index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn sample_pixels() -> Vec<Pixel> {
        let mut rng = SkyRng::new(99);
        (0..200)
            .map(|i| {
                let level = 1 + (i % MAX_LEVEL as usize) as u8;
                let v = rng.point_on_sphere();
                let c = AngularCoordinate::from_unit_vector(v, crate::Frame::Equatorial).unwrap();
                Pixel::from_coordinate(&c, level).unwrap()
            })
            .collect()
    }

    #[test]
    fn test_interleave() {
        assert_eq!(interleave(0, 0, 2), 0);
        assert_eq!(interleave(1, 0, 2), 1);
        assert_eq!(interleave(0, 1, 2), 2);
        assert_eq!(interleave(1, 1, 2), 3);
        assert_eq!(deinterleave(interleave(5, 9, 4), 4), (5, 9));
    }

    #[test]
    fn test_level_zero_partition() {
        let total: f64 = (0..pixel_count(0))
            .map(|i| Pixel::new(0, i).unwrap().area())
            .sum();
        assert_relative_eq!(total, FULL_SKY_DEG2, max_relative = 1e-12);
        assert_eq!(pixel_count(0), 468);
    }

    #[test]
    fn test_parent_children_contains_self_once() {
        for p in sample_pixels() {
            let parent = p.parent().unwrap();
            let children = parent.children().unwrap();
            assert_eq!(children.iter().filter(|c| **c == p).count(), 1);
            let child_area: f64 = children.iter().map(|c| c.area()).sum();
            assert_relative_eq!(child_area, parent.area(), max_relative = 1e-12);
        }
    }

    #[test]
    fn test_xy_round_trip() {
        for p in sample_pixels() {
            let (x, y) = p.xy();
            assert_eq!(Pixel::from_xy(p.level(), x, y).unwrap(), p);
        }
    }

    #[test]
    fn test_coordinate_hierarchy_consistent() {
        let c = AngularCoordinate::from_equatorial(211.3, -4.7).unwrap();
        let fine = Pixel::from_coordinate(&c, MAX_LEVEL).unwrap();
        for level in 0..=MAX_LEVEL {
            let p = Pixel::from_coordinate(&c, level).unwrap();
            assert!(p.contains(&c));
            assert_eq!(fine.ancestor(level), Some(p));
            assert!(p.contains_pixel(&fine));
        }
    }

    #[test]
    fn test_resolution_limits() {
        let c = AngularCoordinate::from_equatorial(0.0, 0.0).unwrap();
        assert!(matches!(
            Pixel::from_coordinate(&c, MAX_LEVEL + 1),
            Err(ClusteringError::ResolutionExceeded { .. })
        ));
        let finest = Pixel::from_coordinate(&c, MAX_LEVEL).unwrap();
        assert!(matches!(
            finest.children(),
            Err(ClusteringError::NotSubdivisible { .. })
        ));
        assert!(Pixel::new(0, 468).is_err());
        assert!(Pixel::new(16, 0).is_err());
        assert_eq!(Pixel::new(0, 0).unwrap().parent(), None);
    }

    #[test]
    fn test_center_and_random_points_are_contained() {
        let mut rng = SkyRng::new(5);
        for p in sample_pixels().into_iter().take(50) {
            assert!(p.contains(&p.center()));
            let radius = p.bounding_radius();
            let center = p.center_vector();
            for _ in 0..20 {
                let point = p.random_point(&mut rng);
                assert!(p.contains(&point));
                assert!(spherical::angular_separation(&center, point.unit_vector()) <= radius);
            }
        }
    }

    #[test]
    fn test_random_point_deterministic() {
        let p = Pixel::new(3, 12345).unwrap();
        let a: Vec<_> = {
            let mut rng = SkyRng::new(8);
            (0..10).map(|_| p.random_point(&mut rng)).collect()
        };
        let b: Vec<_> = {
            let mut rng = SkyRng::new(8);
            (0..10).map(|_| p.random_point(&mut rng)).collect()
        };
        assert_eq!(a, b);
    }

    #[test]
    fn test_neighbors() {
        let level = 3;
        let mid = Pixel::from_xy(level, 10, 40).unwrap();
        let n = mid.neighbors();
        assert_eq!(n.len(), 8);
        assert!(!n.contains(&mid));

        // column 0 wraps to the last column
        let edge = Pixel::from_xy(level, 0, 40).unwrap();
        let wrapped = Pixel::from_xy(level, nx(level) - 1, 40).unwrap();
        assert!(edge.neighbors().contains(&wrapped));

        // polar row has no row above it
        let polar = Pixel::from_xy(level, 7, 0).unwrap();
        assert_eq!(polar.neighbors().len(), 5);
    }

    #[test]
    fn test_ordering_keeps_descendants_contiguous() {
        let p = Pixel::new(2, 777).unwrap();
        let mut all: Vec<Pixel> = p.descendants(4).unwrap().collect();
        all.push(p);
        all.extend(p.children().unwrap());
        all.push(Pixel::new(2, 776).unwrap());
        all.push(Pixel::new(2, 778).unwrap());
        all.sort();

        assert_eq!(all[0], Pixel::new(2, 776).unwrap());
        assert_eq!(all[1], p);
        assert_eq!(*all.last().unwrap(), Pixel::new(2, 778).unwrap());
        for q in &all[1..all.len() - 1] {
            assert!(p.contains_pixel(q));
        }
    }

    #[test]
    fn test_within_radius_matches_brute_force() {
        let level = 2;
        let center = Pixel::from_coordinate(&AngularCoordinate::from_survey(60.0, 20.0).unwrap(), level)
            .unwrap();
        let radius = 25.0;
        let found = center.within_radius(radius);
        let c = center.center_vector();
        let expected: Vec<Pixel> = (0..pixel_count(level))
            .map(|i| Pixel::new(level, i).unwrap())
            .filter(|p| {
                spherical::angular_separation(&c, &p.center_vector()).to_degrees() <= radius
            })
            .collect();
        assert!(found.contains(&center));
        assert_eq!(found, expected);

        let ring = center.within_annulus(10.0, 25.0);
        assert!(!ring.contains(&center));
        assert!(ring.iter().all(|p| found.contains(p)));
    }

    #[test]
    fn test_within_radius_over_pole() {
        let level = 1;
        let center = Pixel::from_xy(level, 3, 0).unwrap();
        let found = center.within_radius(30.0);
        let c = center.center_vector();
        let expected = (0..pixel_count(level))
            .map(|i| Pixel::new(level, i).unwrap())
            .filter(|p| spherical::angular_separation(&c, &p.center_vector()).to_degrees() <= 30.0)
            .count();
        assert_eq!(found.len(), expected);
    }
}
