//! Scalar fields sampled on a footprint at a single pixel level.
//!
//! A [`ScalarMap`] resamples a [`Map`] at one level and attaches an
//! intensity and a point count to each pixel. Three kinds of field are
//! supported:
//!
//! - [`FieldKind::ScalarField`]: the intensity is a measured value per pixel
//!   (a temperature, a shear component). Adding a point sets the value.
//! - [`FieldKind::DensityField`]: the intensity is the summed weight of the
//!   points that fell in the pixel, and the mean is per unit area.
//! - [`FieldKind::SampledField`]: the intensity is the summed weight and the
//!   mean is per point, so the field is the mean weight of its points.
//!
//! Converting to overdensity replaces each intensity by its fractional
//! deviation from the mean, the form used by the pixel correlation
//! estimator.

use std::collections::BTreeMap;

use rayon::prelude::*;
use tracing::debug;

use crate::bins::{AngularBins, PixelCounts};
use crate::coordinate::{AngularCoordinate, CatalogPoint};
use crate::errors::{ClusteringError, ClusteringResult};
use crate::map::{Map, PixelMap, PixelPayload};
use crate::pixel::{check_level, pixels_within_annulus, Pixel};

/// Pixels covered by less than this fraction of their area are dropped.
pub const DEFAULT_MIN_UNMASKED: f64 = 1e-7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldKind {
    ScalarField,
    DensityField,
    SampledField,
}

/// The payload of a [`ScalarMap`] pixel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScalarCell {
    /// Footprint weight times unmasked fraction.
    pub weight: f64,
    pub intensity: f64,
    pub n_points: u32,
}

impl PixelPayload for ScalarCell {
    fn weight(&self) -> f64 {
        self.weight
    }

    fn merge(_children: [&Self; 4]) -> Option<Self> {
        None
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScalarMap {
    cells: PixelMap<ScalarCell>,
    kind: FieldKind,
    level: u8,
    min_unmasked: f64,
    overdensity: bool,
    mean: f64,
}

impl ScalarMap {
    /// Resamples `map` at `level`, keeping pixels covered by at least
    /// `min_unmasked` of their area. Intensities start at zero.
    pub fn from_map(
        map: &Map,
        level: u8,
        kind: FieldKind,
        min_unmasked: f64,
    ) -> ClusteringResult<Self> {
        check_level(level)?;
        let mut cells = PixelMap::new();
        for pixel in map.coverage(level)? {
            let unmasked = map.unmasked_fraction(&pixel);
            if unmasked < min_unmasked || unmasked <= 0.0 {
                continue;
            }
            let weight = map.weighted_fraction(&pixel);
            cells.insert_cell(
                pixel,
                ScalarCell {
                    weight,
                    intensity: 0.0,
                    n_points: 0,
                },
            );
        }
        if cells.is_empty() {
            return Err(ClusteringError::empty_footprint(format!(
                "no pixel at level {} passes the unmasked threshold {}",
                level, min_unmasked
            )));
        }
        debug!(level, pixels = cells.len(), ?kind, "built scalar map");
        Ok(Self {
            cells,
            kind,
            level,
            min_unmasked,
            overdensity: false,
            mean: 0.0,
        })
    }

    pub fn kind(&self) -> FieldKind {
        self.kind
    }

    pub fn level(&self) -> u8 {
        self.level
    }

    pub fn min_unmasked(&self) -> f64 {
        self.min_unmasked
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn cells(&self) -> &PixelMap<ScalarCell> {
        &self.cells
    }

    pub fn is_overdensity(&self) -> bool {
        self.overdensity
    }

    /// The mean recorded by the last conversion to overdensity.
    pub fn mean(&self) -> f64 {
        self.mean
    }

    fn check_raw(&self, operation: &str) -> ClusteringResult<()> {
        if self.overdensity {
            return Err(ClusteringError::incompatible_maps(format!(
                "cannot {} while the field holds overdensities",
                operation
            )));
        }
        Ok(())
    }

    /// Adds a point to the pixel containing it.
    pub fn add_point<T: CatalogPoint>(&mut self, point: &T) -> ClusteringResult<()> {
        self.check_raw("add points")?;
        let weight = point.weight();
        if !weight.is_finite() {
            return Err(ClusteringError::invalid_weight(
                weight,
                "point weights must be finite",
            ));
        }
        let pixel = Pixel::from_coordinate(point.coordinate(), self.level)?;
        let kind = self.kind;
        let cell = self.cells.get_mut(&pixel).ok_or_else(|| {
            ClusteringError::out_of_bounds(format!("{} is not part of the scalar map", pixel))
        })?;
        match kind {
            FieldKind::ScalarField => cell.intensity = weight,
            FieldKind::DensityField | FieldKind::SampledField => cell.intensity += weight,
        }
        cell.n_points += 1;
        Ok(())
    }

    /// Overwrites the intensity of `pixel`.
    pub fn set_intensity(&mut self, pixel: &Pixel, intensity: f64) -> ClusteringResult<()> {
        self.check_raw("set intensities")?;
        let cell = self.cells.get_mut(pixel).ok_or_else(|| {
            ClusteringError::out_of_bounds(format!("{} is not part of the scalar map", pixel))
        })?;
        cell.intensity = intensity;
        Ok(())
    }

    /// A copy at coarser `level`. Scalar fields average by effective area;
    /// density and sampled fields add up.
    pub fn resample(&self, level: u8) -> ClusteringResult<ScalarMap> {
        self.check_raw("resample")?;
        check_level(level)?;
        if level > self.level {
            return Err(ClusteringError::invalid_pixel(format!(
                "cannot resample level {} up to finer level {}",
                self.level, level
            )));
        }
        let children_per_parent = (1u64 << (2 * (self.level - level) as u32)) as f64;
        let mut merged: BTreeMap<Pixel, (f64, f64, u32)> = BTreeMap::new();
        for (pixel, cell) in self.cells.iter() {
            let Some(parent) = pixel.ancestor(level) else {
                continue;
            };
            let slot = merged.entry(parent).or_insert((0.0, 0.0, 0));
            slot.0 += cell.weight;
            slot.1 += match self.kind {
                FieldKind::ScalarField => cell.intensity * cell.weight,
                _ => cell.intensity,
            };
            slot.2 += cell.n_points;
        }
        let mut cells = PixelMap::new();
        for (parent, (weight_sum, intensity, n_points)) in merged {
            let intensity = match self.kind {
                FieldKind::ScalarField if weight_sum > 0.0 => intensity / weight_sum,
                FieldKind::ScalarField => 0.0,
                _ => intensity,
            };
            let weight = weight_sum / children_per_parent;
            if weight < self.min_unmasked {
                continue;
            }
            cells.insert_cell(
                parent,
                ScalarCell {
                    weight,
                    intensity,
                    n_points,
                },
            );
        }
        Ok(ScalarMap {
            cells,
            kind: self.kind,
            level,
            min_unmasked: self.min_unmasked,
            overdensity: false,
            mean: 0.0,
        })
    }

    /// Effective area, `Σ area × weight`.
    pub fn area(&self) -> f64 {
        self.cells.area()
    }

    pub fn contains(&self, coord: &AngularCoordinate) -> bool {
        self.cells.contains(coord)
    }

    /// Total intensity.
    pub fn intensity(&self) -> f64 {
        self.cells.iter().map(|(_, c)| c.intensity).sum()
    }

    pub fn n_points(&self) -> u64 {
        self.cells.iter().map(|(_, c)| c.n_points as u64).sum()
    }

    /// Intensity per square degree.
    pub fn density(&self) -> f64 {
        ratio(self.intensity(), self.area())
    }

    /// Points per square degree.
    pub fn point_density(&self) -> f64 {
        ratio(self.n_points() as f64, self.area())
    }

    /// Mean of the raw field, in the sense of its kind.
    pub fn mean_intensity(&self) -> f64 {
        match self.kind {
            FieldKind::ScalarField => {
                let (sum, weight) = self
                    .cells
                    .iter()
                    .fold((0.0, 0.0), |(s, w), (_, c)| (s + c.intensity * c.weight, w + c.weight));
                ratio(sum, weight)
            }
            FieldKind::DensityField => self.density(),
            FieldKind::SampledField => ratio(self.intensity(), self.n_points() as f64),
        }
    }

    fn delta(&self, pixel: &Pixel, cell: &ScalarCell, mean: f64) -> f64 {
        match self.kind {
            FieldKind::ScalarField => cell.intensity - mean,
            FieldKind::DensityField => {
                let expected = mean * pixel.area() * cell.weight;
                if expected > 0.0 {
                    cell.intensity / expected - 1.0
                } else {
                    0.0
                }
            }
            FieldKind::SampledField => {
                if cell.n_points > 0 {
                    cell.intensity / cell.n_points as f64 - mean
                } else {
                    0.0
                }
            }
        }
    }

    /// Replaces intensities by their deviation from the mean. Does nothing
    /// when already converted.
    pub fn convert_to_overdensity(&mut self) {
        if self.overdensity {
            return;
        }
        let mean = self.mean_intensity();
        let deltas: Vec<(Pixel, f64)> = self
            .cells
            .iter()
            .map(|(p, c)| (*p, self.delta(p, c, mean)))
            .collect();
        for (pixel, delta) in deltas {
            if let Some(cell) = self.cells.get_mut(&pixel) {
                cell.intensity = delta;
            }
        }
        self.mean = mean;
        self.overdensity = true;
    }

    /// Undoes [`convert_to_overdensity`](Self::convert_to_overdensity).
    pub fn convert_from_overdensity(&mut self) {
        if !self.overdensity {
            return;
        }
        let (kind, mean) = (self.kind, self.mean);
        let areas: Vec<(Pixel, f64)> = self.cells.pixels().map(|p| (*p, p.area())).collect();
        for (pixel, area) in areas {
            if let Some(cell) = self.cells.get_mut(&pixel) {
                cell.intensity = match kind {
                    FieldKind::ScalarField => cell.intensity + mean,
                    FieldKind::DensityField => (cell.intensity + 1.0) * mean * area * cell.weight,
                    FieldKind::SampledField => (cell.intensity + mean) * cell.n_points as f64,
                };
            }
        }
        self.overdensity = false;
    }

    /// Overdensity of every pixel, whichever form the field is in.
    fn overdensities(&self) -> Vec<(Pixel, f64, f64)> {
        let mean = self.mean_intensity();
        self.cells
            .iter()
            .map(|(p, c)| {
                let delta = if self.overdensity {
                    c.intensity
                } else {
                    self.delta(p, c, mean)
                };
                (*p, c.weight, delta)
            })
            .collect()
    }

    fn local_cells(
        &self,
        center: &AngularCoordinate,
        theta_max: f64,
        theta_min: f64,
    ) -> impl Iterator<Item = (Pixel, &ScalarCell)> {
        pixels_within_annulus(center, self.level, theta_min, theta_max)
            .into_iter()
            .filter_map(move |p| self.cells.get(&p).map(|c| (p, c)))
    }

    /// Effective area of the pixels centred between `theta_min` and
    /// `theta_max` degrees of `center`.
    pub fn local_area(&self, center: &AngularCoordinate, theta_max: f64, theta_min: f64) -> f64 {
        self.local_cells(center, theta_max, theta_min)
            .map(|(p, c)| p.area() * c.weight)
            .sum()
    }

    pub fn local_intensity(
        &self,
        center: &AngularCoordinate,
        theta_max: f64,
        theta_min: f64,
    ) -> f64 {
        self.local_cells(center, theta_max, theta_min)
            .map(|(_, c)| c.intensity)
            .sum()
    }

    pub fn local_density(&self, center: &AngularCoordinate, theta_max: f64, theta_min: f64) -> f64 {
        ratio(
            self.local_intensity(center, theta_max, theta_min),
            self.local_area(center, theta_max, theta_min),
        )
    }

    pub fn local_point_density(
        &self,
        center: &AngularCoordinate,
        theta_max: f64,
        theta_min: f64,
    ) -> f64 {
        let (n, area) = self
            .local_cells(center, theta_max, theta_min)
            .fold((0.0, 0.0), |(n, a), (p, c)| {
                (n + c.n_points as f64, a + p.area() * c.weight)
            });
        ratio(n, area)
    }

    /// Variance of the overdensity field, each pixel weighted by `w²` so
    /// that it is the zero-lag value of the pixel correlation.
    pub fn variance(&self) -> f64 {
        let (sum, weight) = self
            .overdensities()
            .iter()
            .fold((0.0, 0.0), |(s, ws), (_, w, d)| (s + w * w * d * d, ws + w * w));
        ratio(sum, weight)
    }

    /// Covariance of two overdensity fields over their common pixels, each
    /// pixel weighted by `w_a · w_b`.
    pub fn covariance(&self, other: &ScalarMap) -> ClusteringResult<f64> {
        self.check_compatible(other)?;
        let theirs = other.overdensities();
        let theirs: BTreeMap<Pixel, (f64, f64)> =
            theirs.into_iter().map(|(p, w, d)| (p, (w, d))).collect();
        let (sum, weight) = self
            .overdensities()
            .iter()
            .filter_map(|(p, w, d)| theirs.get(p).map(|(w2, d2)| (w * w2, d * d2)))
            .fold((0.0, 0.0), |(s, ws), (w, dd)| (s + w * dd, ws + w));
        Ok(ratio(sum, weight))
    }

    fn check_compatible(&self, other: &ScalarMap) -> ClusteringResult<()> {
        if self.level != other.level {
            return Err(ClusteringError::incompatible_maps(format!(
                "levels differ: {} and {}",
                self.level, other.level
            )));
        }
        Ok(())
    }

    /// Pixel-estimator auto-correlation into every bin's pixel accumulators.
    pub fn auto_correlate(&self, bins: &mut AngularBins) -> ClusteringResult<()> {
        self.correlate_with(self, bins, true, false)
    }

    /// Pixel-estimator cross-correlation with a field at the same level.
    pub fn cross_correlate(&self, other: &ScalarMap, bins: &mut AngularBins) -> ClusteringResult<()> {
        self.check_compatible(other)?;
        self.correlate_with(other, bins, false, false)
    }

    /// Auto-correlation restricted to the bins assigned to this map's level.
    pub(crate) fn auto_correlate_own_level(&self, bins: &mut AngularBins) -> ClusteringResult<()> {
        self.correlate_with(self, bins, true, true)
    }

    /// Cross-correlation restricted to the bins assigned to this map's level.
    pub(crate) fn cross_correlate_own_level(
        &self,
        other: &ScalarMap,
        bins: &mut AngularBins,
    ) -> ClusteringResult<()> {
        self.check_compatible(other)?;
        self.correlate_with(other, bins, false, true)
    }

    fn correlate_with(
        &self,
        other: &ScalarMap,
        bins: &mut AngularBins,
        skip_self: bool,
        own_level_only: bool,
    ) -> ClusteringResult<()> {
        let ours = self.overdensities();
        let theirs: BTreeMap<Pixel, (f64, f64)> = other
            .overdensities()
            .into_iter()
            .map(|(p, w, d)| (p, (w, d)))
            .collect();
        let level = self.level;
        for bin in bins.bins_mut() {
            if own_level_only && bin.level() != Some(level) {
                continue;
            }
            let (lower, upper) = (bin.lower(), bin.upper());
            let counts = ours
                .par_iter()
                .map(|(pixel, w_i, d_i)| {
                    let mut counts = PixelCounts::default();
                    let center = pixel.center();
                    for q in pixels_within_annulus(&center, level, lower, upper) {
                        if skip_self && q == *pixel {
                            continue;
                        }
                        let Some((w_j, d_j)) = theirs.get(&q) else {
                            continue;
                        };
                        // the annulus is closed at its outer edge, the bin is not
                        if center.angular_distance(&q.center()) >= upper {
                            continue;
                        }
                        counts.product += w_i * w_j * d_i * d_j;
                        counts.weight += w_i * w_j;
                    }
                    counts
                })
                .reduce(PixelCounts::default, |a, b| PixelCounts {
                    product: a.product + b.product,
                    weight: a.weight + b.weight,
                });
            bin.pixel = counts;
        }
        Ok(())
    }
}

fn ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator > 0.0 {
        numerator / denominator
    } else {
        0.0
    }
}
