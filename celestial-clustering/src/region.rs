//! Jackknife regions: a footprint cut into roughly equal-area pieces.
//!
//! The footprint's coverage pixels at a chosen level are walked in nested
//! order and cut into `n` runs of about `area / n` each. Nested order keeps
//! each run spatially compact, and using pixels rather than arbitrary shapes
//! makes the region of a point a single lookup.

use std::collections::BTreeMap;

use tracing::debug;

use crate::coordinate::AngularCoordinate;
use crate::errors::{ClusteringError, ClusteringResult};
use crate::map::Map;
use crate::pixel::{check_level, Pixel, MAX_LEVEL};

/// Coverage pixels wanted per region when the level is chosen automatically.
const PIXELS_PER_REGION: usize = 10;

#[derive(Debug, Clone, PartialEq)]
pub struct RegionMap {
    level: u8,
    regions: BTreeMap<Pixel, u16>,
    areas: Vec<f64>,
}

impl RegionMap {
    /// Splits `map` into `n_regions` regions at `level`, or at the coarsest
    /// level with at least ten coverage pixels per region when `level` is
    /// `None`.
    pub fn new(map: &Map, n_regions: u16, level: Option<u8>) -> ClusteringResult<Self> {
        if n_regions == 0 {
            return Err(ClusteringError::regionation("at least one region is needed"));
        }
        if map.is_empty() {
            return Err(ClusteringError::empty_footprint("cannot split an empty map"));
        }
        let n = n_regions as usize;
        let (level, coverage) = match level {
            Some(level) => {
                check_level(level)?;
                (level, map.coverage(level)?)
            }
            None => auto_level(map, n)?,
        };
        if coverage.len() < n {
            return Err(ClusteringError::regionation(format!(
                "{} coverage pixels at level {} cannot make {} regions",
                coverage.len(),
                level,
                n
            )));
        }

        let pieces: Vec<(Pixel, f64)> = coverage
            .into_iter()
            .map(|p| (p, p.area() * map.unmasked_fraction(&p)))
            .collect();
        let total: f64 = pieces.iter().map(|(_, a)| a).sum();
        let share = total / n as f64;

        let mut regions = BTreeMap::new();
        let mut areas = vec![0.0; n];
        let mut cumulative = 0.0;
        for (pixel, area) in pieces {
            let region = (((cumulative + 0.5 * area) / share) as usize).min(n - 1);
            cumulative += area;
            areas[region] += area;
            regions.insert(pixel, region as u16);
        }
        if let Some(empty) = areas.iter().position(|a| *a <= 0.0) {
            return Err(ClusteringError::regionation(format!(
                "region {} received no area at level {}",
                empty, level
            )));
        }
        debug!(level, n_regions, total_area = total, "built jackknife regions");
        Ok(Self {
            level,
            regions,
            areas,
        })
    }

    pub fn level(&self) -> u8 {
        self.level
    }

    pub fn n_regions(&self) -> usize {
        self.areas.len()
    }

    /// Footprint area of `region`, square degrees.
    pub fn region_area(&self, region: usize) -> Option<f64> {
        self.areas.get(region).copied()
    }

    pub fn region_of(&self, coord: &AngularCoordinate) -> Option<u16> {
        let pixel = Pixel::from_coordinate(coord, self.level).ok()?;
        self.regions.get(&pixel).copied()
    }

    /// Region of a pixel at or below the regionation level.
    pub fn region_of_pixel(&self, pixel: &Pixel) -> Option<u16> {
        self.regions.get(&pixel.ancestor(self.level)?).copied()
    }
}

fn auto_level(map: &Map, n: usize) -> ClusteringResult<(u8, Vec<Pixel>)> {
    let start = map.min_level().unwrap_or(0);
    for level in start..=MAX_LEVEL {
        let coverage = map.coverage(level)?;
        if coverage.len() >= PIXELS_PER_REGION * n {
            return Ok((level, coverage));
        }
    }
    Err(ClusteringError::regionation(format!(
        "no level up to {} gives {} pixels per region",
        MAX_LEVEL, PIXELS_PER_REGION
    )))
}
