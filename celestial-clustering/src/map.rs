//! Weighted pixel footprints.
//!
//! A [`PixelMap`] is a sorted set of non-overlapping pixels, possibly at
//! different levels, each carrying a payload. [`Map`] is the footprint case
//! where the payload is a weight in `[0, 1]`; [`ScalarMap`](crate::ScalarMap)
//! stores a sampled field on the same structure.
//!
//! Containment, area, coverage and random sampling are shared by every
//! payload. Only `Map` supports overlapping inserts and set algebra, since
//! only a weight has an obvious meaning when a pixel is split or merged.
//!
//! ```
//! use celestial_clustering::{AngularCoordinate, Map, Pixel};
//!
//! let mut map = Map::new();
//! map.add_pixel(Pixel::new(0, 10).unwrap(), 1.0).unwrap();
//! let inside = Pixel::new(0, 10).unwrap().center();
//! assert!(map.contains(&inside));
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::ops::Bound as RangeBound;

use celestial_core::{CapOverlap, SkyRng};
use tracing::debug;

use crate::bounds::{AnnulusBound, Bound};
use crate::coordinate::{AngularCoordinate, CatalogPoint};
use crate::errors::{ClusteringError, ClusteringResult};
use crate::pixel::{check_level, locate, Pixel, BASE_PIXELS, MAX_LEVEL};

/// Finest level used when an analytic bound cuts through a map pixel and
/// the map itself is coarser.
const BOUND_REFINE_LEVEL: u8 = 10;

/// Per-pixel data stored in a [`PixelMap`].
pub trait PixelPayload: Clone + PartialEq + Send + Sync {
    /// Fraction of the pixel's area that counts towards the footprint.
    fn weight(&self) -> f64;

    /// The payload of a parent whose four children carry `children`, or
    /// `None` when they must stay separate.
    fn merge(children: [&Self; 4]) -> Option<Self>;
}

impl PixelPayload for f64 {
    fn weight(&self) -> f64 {
        *self
    }

    fn merge(children: [&Self; 4]) -> Option<Self> {
        let first = *children[0];
        children.iter().all(|w| **w == first).then_some(first)
    }
}

/// Sorted, non-overlapping pixels with a payload each.
#[derive(Debug, Clone)]
pub struct PixelMap<P> {
    cells: BTreeMap<Pixel, P>,
    /// Bit `L` set when some pixel at level `L` may be present.
    level_mask: u16,
}

/// A survey footprint with per-pixel weights in `[0, 1]`.
pub type Map = PixelMap<f64>;

impl<P> Default for PixelMap<P> {
    fn default() -> Self {
        Self {
            cells: BTreeMap::new(),
            level_mask: 0,
        }
    }
}

impl<P: PartialEq> PartialEq for PixelMap<P> {
    fn eq(&self, other: &Self) -> bool {
        self.cells == other.cells
    }
}

impl<P: PixelPayload> PixelMap<P> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Pixels and payloads in nested order.
    pub fn iter(&self) -> impl Iterator<Item = (&Pixel, &P)> {
        self.cells.iter()
    }

    pub fn pixels(&self) -> impl Iterator<Item = &Pixel> {
        self.cells.keys()
    }

    pub fn get(&self, pixel: &Pixel) -> Option<&P> {
        self.cells.get(pixel)
    }

    pub(crate) fn get_mut(&mut self, pixel: &Pixel) -> Option<&mut P> {
        self.cells.get_mut(pixel)
    }

    pub fn min_level(&self) -> Option<u8> {
        self.levels().next()
    }

    pub fn max_level(&self) -> Option<u8> {
        self.levels().last()
    }

    fn levels(&self) -> impl Iterator<Item = u8> + '_ {
        (0..=MAX_LEVEL).filter(move |l| self.level_mask & (1u16 << l) != 0)
    }

    fn refresh_levels(&mut self) {
        self.level_mask = self
            .cells
            .keys()
            .fold(0u16, |mask, p| mask | (1u16 << p.level()));
    }

    /// Inserts without checking for overlap. Callers keep cells disjoint.
    pub(crate) fn insert_cell(&mut self, pixel: Pixel, payload: P) {
        self.level_mask |= 1u16 << pixel.level();
        self.cells.insert(pixel, payload);
    }

    /// Weighted area in square degrees, `Σ area × weight`.
    pub fn area(&self) -> f64 {
        self.cells.iter().map(|(p, v)| p.area() * v.weight()).sum()
    }

    /// Area covered regardless of weight.
    pub fn covered_area(&self) -> f64 {
        self.cells.keys().map(Pixel::area).sum()
    }

    /// Area-weighted mean of the pixel weights.
    pub fn average_weight(&self) -> f64 {
        let covered = self.covered_area();
        if covered > 0.0 {
            self.area() / covered
        } else {
            0.0
        }
    }

    /// The stored pixel containing `coord`, with its payload.
    pub fn find(&self, coord: &AngularCoordinate) -> Option<(Pixel, &P)> {
        let (x, y) = locate(coord);
        self.levels().find_map(|level| {
            let pixel = Pixel::from_max_xy(x, y, level);
            self.cells.get(&pixel).map(|v| (pixel, v))
        })
    }

    pub fn contains(&self, coord: &AngularCoordinate) -> bool {
        self.find(coord).is_some()
    }

    /// Weight at `coord`, `None` outside the footprint.
    pub fn find_weight(&self, coord: &AngularCoordinate) -> Option<f64> {
        self.find(coord).map(|(_, v)| v.weight())
    }

    /// The stored pixel equal to or containing `pixel`.
    pub(crate) fn find_ancestor_or_self(&self, pixel: &Pixel) -> Option<(Pixel, &P)> {
        self.levels()
            .filter(|level| *level <= pixel.level())
            .find_map(|level| {
                let ancestor = pixel.ancestor(level)?;
                self.cells.get(&ancestor).map(|v| (ancestor, v))
            })
    }

    /// Stored pixels strictly inside `pixel`. They follow `pixel` contiguously
    /// in nested order.
    pub(crate) fn descendant_cells<'a>(
        &'a self,
        pixel: &'a Pixel,
    ) -> impl Iterator<Item = (&'a Pixel, &'a P)> + 'a {
        self.cells
            .range((RangeBound::Excluded(*pixel), RangeBound::Unbounded))
            .take_while(move |(q, _)| pixel.contains_pixel(q))
    }

    /// Fraction of `pixel` covered by the map, ignoring weights.
    pub fn unmasked_fraction(&self, pixel: &Pixel) -> f64 {
        if self.find_ancestor_or_self(pixel).is_some() {
            return 1.0;
        }
        let covered: f64 = self.descendant_cells(pixel).map(|(q, _)| q.area()).sum();
        (covered / pixel.area()).min(1.0)
    }

    /// Weighted fraction of `pixel` inside the map, `Σ area × weight` of the
    /// overlap over the pixel's area.
    pub fn weighted_fraction(&self, pixel: &Pixel) -> f64 {
        if let Some((_, v)) = self.find_ancestor_or_self(pixel) {
            return v.weight();
        }
        let covered: f64 = self
            .descendant_cells(pixel)
            .map(|(q, v)| q.area() * v.weight())
            .sum();
        covered / pixel.area()
    }

    /// Every pixel at `level` that the map touches, in nested order.
    pub fn coverage(&self, level: u8) -> ClusteringResult<Vec<Pixel>> {
        check_level(level)?;
        let mut out = BTreeSet::new();
        for pixel in self.cells.keys() {
            if pixel.level() <= level {
                out.extend(pixel.descendants(level)?);
            } else if let Some(ancestor) = pixel.ancestor(level) {
                out.insert(ancestor);
            }
        }
        Ok(out.into_iter().collect())
    }

    /// Merges complete sibling groups upward, finest level first.
    pub fn normalize(&mut self) {
        let before = self.cells.len();
        for level in (1..=MAX_LEVEL).rev() {
            let parents: BTreeSet<Pixel> = self
                .cells
                .keys()
                .filter(|p| p.level() == level)
                .filter_map(Pixel::parent)
                .collect();
            for parent in parents {
                let Ok(children) = parent.children() else {
                    continue;
                };
                let merged = match (
                    self.cells.get(&children[0]),
                    self.cells.get(&children[1]),
                    self.cells.get(&children[2]),
                    self.cells.get(&children[3]),
                ) {
                    (Some(a), Some(b), Some(c), Some(d)) => P::merge([a, b, c, d]),
                    _ => None,
                };
                if let Some(payload) = merged {
                    for child in &children {
                        self.cells.remove(child);
                    }
                    self.cells.insert(parent, payload);
                }
            }
        }
        self.refresh_levels();
        debug!(before, after = self.cells.len(), "normalized pixel map");
    }

    /// Weighted area inside `bound`. Pixels the bound cuts through are
    /// refined until the map's finest level (at least level 10) and then
    /// decided by their centre.
    pub fn bound_area<B: Bound + ?Sized>(&self, bound: &B) -> f64 {
        let finest = self
            .max_level()
            .unwrap_or(0)
            .max(BOUND_REFINE_LEVEL)
            .min(MAX_LEVEL);
        self.cells
            .iter()
            .map(|(p, v)| area_inside(bound, *p, finest) * v.weight())
            .sum()
    }

    /// Weighted footprint area between `theta_min` and `theta_max` degrees of
    /// `center`.
    pub fn local_area(
        &self,
        center: &AngularCoordinate,
        theta_max: f64,
        theta_min: f64,
    ) -> ClusteringResult<f64> {
        let annulus = AnnulusBound::new(*center, theta_min, theta_max)?;
        Ok(self.bound_area(&annulus))
    }

    /// `n` random points inside the footprint, reproducible from `seed`.
    ///
    /// Pixels are chosen in proportion to their area (times their weight when
    /// `weighted`), then a point is drawn uniformly inside the pixel.
    pub fn generate_random_points(
        &self,
        n: usize,
        weighted: bool,
        seed: u64,
    ) -> ClusteringResult<Vec<AngularCoordinate>> {
        let sampler = Sampler::new(self, weighted)?;
        let mut rng = SkyRng::new(seed);
        Ok((0..n).map(|_| sampler.draw(&mut rng)).collect())
    }

    /// A random catalog with `multiplier` times as many points as `catalog`,
    /// each a copy of a randomly chosen catalog point moved to a random
    /// footprint position. Weights and other attributes carry over.
    pub fn generate_random_points_like<T: CatalogPoint>(
        &self,
        catalog: &[T],
        multiplier: f64,
        weighted: bool,
        seed: u64,
    ) -> ClusteringResult<Vec<T>> {
        if catalog.is_empty() {
            return Err(ClusteringError::empty_catalog(
                "cannot model randoms on an empty catalog",
            ));
        }
        if !multiplier.is_finite() || multiplier <= 0.0 {
            return Err(ClusteringError::invalid_weight(
                multiplier,
                "random multiplier must be positive",
            ));
        }
        let sampler = Sampler::new(self, weighted)?;
        let mut rng = SkyRng::new(seed);
        let n = ((catalog.len() as f64) * multiplier).round().max(1.0) as usize;
        Ok((0..n)
            .map(|_| {
                let template = &catalog[rng.index(catalog.len())];
                template.relocated(sampler.draw(&mut rng))
            })
            .collect())
    }
}

fn area_inside<B: Bound + ?Sized>(bound: &B, pixel: Pixel, finest: u8) -> f64 {
    match bound.classify(&pixel) {
        CapOverlap::Inside => pixel.area(),
        CapOverlap::Outside => 0.0,
        CapOverlap::Partial => match pixel.children() {
            Ok(children) if pixel.level() < finest => children
                .iter()
                .map(|c| area_inside(bound, *c, finest))
                .sum(),
            _ => {
                if bound.contains(&pixel.center()) {
                    pixel.area()
                } else {
                    0.0
                }
            }
        },
    }
}

/// Cumulative-area table for picking pixels.
struct Sampler {
    cumulative: Vec<f64>,
    pixels: Vec<Pixel>,
}

impl Sampler {
    fn new<P: PixelPayload>(map: &PixelMap<P>, weighted: bool) -> ClusteringResult<Self> {
        let mut total = 0.0;
        let mut cumulative = Vec::with_capacity(map.len());
        let mut pixels = Vec::with_capacity(map.len());
        for (p, v) in map.iter() {
            let share = if weighted { p.area() * v.weight() } else { p.area() };
            if share > 0.0 {
                total += share;
                cumulative.push(total);
                pixels.push(*p);
            }
        }
        if pixels.is_empty() {
            return Err(ClusteringError::empty_footprint(
                "no area to place random points in",
            ));
        }
        Ok(Self { cumulative, pixels })
    }

    fn draw(&self, rng: &mut SkyRng) -> AngularCoordinate {
        let total = self.cumulative[self.cumulative.len() - 1];
        let target = rng.uniform() * total;
        let slot = self
            .cumulative
            .partition_point(|c| *c <= target)
            .min(self.pixels.len() - 1);
        self.pixels[slot].random_point(rng)
    }
}

fn check_map_weight(weight: f64) -> ClusteringResult<f64> {
    if weight.is_finite() && (0.0..=1.0).contains(&weight) {
        Ok(weight)
    } else {
        Err(ClusteringError::invalid_weight(
            weight,
            "map weights must lie in [0, 1]",
        ))
    }
}

/// Which inputs of a set operation cover a piece of sky.
#[derive(Debug, Clone, Copy)]
enum Overlay {
    Both(f64),
    Left(f64),
    Right(f64),
}

/// `cell` with every pixel of `holes` (all strict descendants) cut out, as
/// the fewest pixels.
fn subtract(cell: Pixel, holes: &[Pixel], out: &mut Vec<Pixel>) {
    if holes.is_empty() {
        out.push(cell);
        return;
    }
    if holes.contains(&cell) {
        return;
    }
    let Ok(children) = cell.children() else {
        return;
    };
    for child in children {
        let inner: Vec<Pixel> = holes
            .iter()
            .copied()
            .filter(|h| child.contains_pixel(h))
            .collect();
        subtract(child, &inner, out);
    }
}

impl Map {
    /// Every level-0 pixel at weight 1.
    pub fn full_sky() -> Self {
        let mut map = Self::new();
        for index in 0..BASE_PIXELS {
            if let Ok(pixel) = Pixel::new(0, index) {
                map.insert_cell(pixel, 1.0);
            }
        }
        map
    }

    /// Builds a normalized map from `(pixel, weight)` pairs, later pairs
    /// overriding earlier ones where they overlap.
    pub fn from_pixels<I>(pixels: I) -> ClusteringResult<Self>
    where
        I: IntoIterator<Item = (Pixel, f64)>,
    {
        let mut map = Self::new();
        for (pixel, weight) in pixels {
            map.add_pixel(pixel, weight)?;
        }
        map.normalize();
        Ok(map)
    }

    /// Sets the weight of the area covered by `pixel`.
    ///
    /// A stored ancestor is split so the rest of its area keeps its weight;
    /// stored descendants are replaced. The map is left unchanged on error.
    pub fn add_pixel(&mut self, pixel: Pixel, weight: f64) -> ClusteringResult<()> {
        let weight = check_map_weight(weight)?;
        if let Some((ancestor, &old)) = self.find_ancestor_or_self(&pixel) {
            if ancestor != pixel {
                self.cells.remove(&ancestor);
                let mut pieces = Vec::new();
                subtract(ancestor, &[pixel], &mut pieces);
                for piece in pieces {
                    self.insert_cell(piece, old);
                }
            }
        } else {
            let inner: Vec<Pixel> = self.descendant_cells(&pixel).map(|(q, _)| *q).collect();
            for q in inner {
                self.cells.remove(&q);
            }
        }
        self.insert_cell(pixel, weight);
        Ok(())
    }

    /// Pixelizes an analytic bound, refining cut pixels down to `max_level`,
    /// where a pixel is kept when its centre is inside.
    pub fn from_bound<B: Bound + ?Sized>(bound: &B, max_level: u8) -> ClusteringResult<Self> {
        check_level(max_level)?;
        let mut map = Self::new();
        for index in 0..BASE_PIXELS {
            collect_bound(bound, Pixel::new(0, index)?, max_level, &mut map);
        }
        map.normalize();
        debug!(
            pixels = map.len(),
            area = map.area(),
            bound_area = bound.area(),
            "pixelized bound"
        );
        Ok(map)
    }

    fn overlay(&self, other: &Map) -> Vec<(Pixel, Overlay)> {
        let mut out = Vec::new();
        for (&pa, &wa) in &self.cells {
            if other.find_ancestor_or_self(&pa).is_some() {
                out.push((pa, Overlay::Both(wa)));
                continue;
            }
            let holes: Vec<Pixel> = other.descendant_cells(&pa).map(|(q, _)| *q).collect();
            out.extend(holes.iter().map(|q| (*q, Overlay::Both(wa))));
            let mut pieces = Vec::new();
            subtract(pa, &holes, &mut pieces);
            out.extend(pieces.into_iter().map(|q| (q, Overlay::Left(wa))));
        }
        for (&pb, &wb) in &other.cells {
            if self.find_ancestor_or_self(&pb).is_some() {
                continue;
            }
            let holes: Vec<Pixel> = self.descendant_cells(&pb).map(|(q, _)| *q).collect();
            let mut pieces = Vec::new();
            subtract(pb, &holes, &mut pieces);
            out.extend(pieces.into_iter().map(|q| (q, Overlay::Right(wb))));
        }
        out
    }

    fn combine<F>(&self, other: &Map, keep: F) -> Map
    where
        F: Fn(Overlay) -> Option<f64>,
    {
        let mut map = Map::new();
        for (pixel, side) in self.overlay(other) {
            if let Some(weight) = keep(side) {
                map.insert_cell(pixel, weight);
            }
        }
        map.normalize();
        map
    }

    /// Area covered by both maps, carrying this map's weights.
    pub fn intersect(&self, other: &Map) -> Map {
        self.combine(other, |side| match side {
            Overlay::Both(w) => Some(w),
            _ => None,
        })
    }

    /// Area covered by either map. Where both cover, this map's weight wins.
    pub fn unify(&self, other: &Map) -> Map {
        self.combine(other, |side| match side {
            Overlay::Both(w) | Overlay::Left(w) | Overlay::Right(w) => Some(w),
        })
    }

    /// Area covered by this map but not by `other`.
    pub fn difference(&self, other: &Map) -> Map {
        self.combine(other, |side| match side {
            Overlay::Left(w) => Some(w),
            _ => None,
        })
    }

    /// Area covered by exactly one of the maps.
    pub fn symmetric_difference(&self, other: &Map) -> Map {
        self.combine(other, |side| match side {
            Overlay::Left(w) | Overlay::Right(w) => Some(w),
            Overlay::Both(_) => None,
        })
    }

    /// A copy with nothing finer than `level`. Finer pixels fold into their
    /// ancestor with the area-weighted weight, so the total area is kept.
    pub fn degrade(&self, level: u8) -> ClusteringResult<Map> {
        check_level(level)?;
        let mut map = Map::new();
        let mut folded: BTreeMap<Pixel, f64> = BTreeMap::new();
        for (&p, &w) in &self.cells {
            match p.ancestor(level) {
                Some(ancestor) if p.level() > level => {
                    *folded.entry(ancestor).or_insert(0.0) += p.area() * w;
                }
                _ => map.insert_cell(p, w),
            }
        }
        for (ancestor, area) in folded {
            map.insert_cell(ancestor, (area / ancestor.area()).min(1.0));
        }
        map.normalize();
        Ok(map)
    }
}

fn collect_bound<B: Bound + ?Sized>(bound: &B, pixel: Pixel, max_level: u8, map: &mut Map) {
    match bound.classify(&pixel) {
        CapOverlap::Inside => map.insert_cell(pixel, 1.0),
        CapOverlap::Outside => {}
        CapOverlap::Partial => match pixel.children() {
            Ok(children) if pixel.level() < max_level => {
                for child in children {
                    collect_bound(bound, child, max_level, map);
                }
            }
            _ => {
                if bound.contains(&pixel.center()) {
                    map.insert_cell(pixel, 1.0);
                }
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bounds::CircleBound;
    use crate::coordinate::WeightedAngularCoordinate;
    use approx::assert_relative_eq;
    use celestial_core::constants::FULL_SKY_DEG2;

    fn px(level: u8, index: u64) -> Pixel {
        Pixel::new(level, index).unwrap()
    }

    fn overlaps(map: &Map) -> bool {
        let cells: Vec<Pixel> = map.pixels().copied().collect();
        cells.iter().enumerate().any(|(i, a)| {
            cells
                .iter()
                .skip(i + 1)
                .any(|b| a.contains_pixel(b) || b.contains_pixel(a))
        })
    }

    #[test]
    fn test_full_sky() {
        let map = Map::full_sky();
        assert_eq!(map.len(), 468);
        assert_relative_eq!(map.area(), FULL_SKY_DEG2, max_relative = 1e-12);
        let c = AngularCoordinate::from_equatorial(12.0, -70.0).unwrap();
        assert!(map.contains(&c));
        assert_eq!(map.find_weight(&c), Some(1.0));
    }

    #[test]
    fn test_add_pixel_rejects_bad_weight() {
        let mut map = Map::new();
        assert!(map.add_pixel(px(0, 0), 1.5).is_err());
        assert!(map.add_pixel(px(0, 0), f64::NAN).is_err());
        assert!(map.is_empty());
    }

    #[test]
    fn test_normalize_merges_siblings_and_keeps_area() {
        let parent = px(3, 1000);
        let mut map = Map::new();
        for child in parent.children().unwrap() {
            for grandchild in child.children().unwrap() {
                map.add_pixel(grandchild, 0.5).unwrap();
            }
        }
        map.add_pixel(px(3, 2000), 1.0).unwrap();
        let before = map.area();
        map.normalize();
        assert_eq!(map.len(), 2);
        assert_eq!(map.get(&parent), Some(&0.5));
        assert_relative_eq!(map.area(), before, max_relative = 1e-12);
    }

    #[test]
    fn test_unequal_siblings_do_not_merge() {
        let parent = px(2, 77);
        let children = parent.children().unwrap();
        let map = Map::from_pixels(
            children
                .iter()
                .enumerate()
                .map(|(i, c)| (*c, if i == 0 { 0.9 } else { 1.0 })),
        )
        .unwrap();
        assert_eq!(map.len(), 4);
    }

    #[test]
    fn test_add_pixel_splits_ancestor() {
        let mut map = Map::new();
        let coarse = px(1, 40);
        map.add_pixel(coarse, 1.0).unwrap();
        let fine = coarse.descendants(3).unwrap().nth(5).unwrap();
        map.add_pixel(fine, 0.25).unwrap();
        assert!(!overlaps(&map));
        assert_eq!(map.len(), 7);
        assert_relative_eq!(
            map.area(),
            coarse.area() - 0.75 * fine.area(),
            max_relative = 1e-12
        );
        assert_eq!(map.find_weight(&fine.center()), Some(0.25));
    }

    #[test]
    fn test_add_pixel_replaces_descendants() {
        let mut map = Map::new();
        let coarse = px(1, 40);
        for child in coarse.children().unwrap() {
            map.add_pixel(child, 0.3).unwrap();
        }
        map.add_pixel(coarse, 1.0).unwrap();
        assert_eq!(map.len(), 1);
        assert_eq!(map.get(&coarse), Some(&1.0));
    }

    #[test]
    fn test_set_algebra() {
        let a = Map::from_pixels([(px(0, 5), 1.0), (px(0, 6), 1.0)]).unwrap();
        let b = Map::from_pixels([(px(0, 6), 1.0), (px(0, 7), 1.0)]).unwrap();
        let one = px(0, 0).area();

        assert_relative_eq!(a.intersect(&b).area(), one, max_relative = 1e-12);
        assert_relative_eq!(a.unify(&b).area(), 3.0 * one, max_relative = 1e-12);
        assert_relative_eq!(a.difference(&b).area(), one, max_relative = 1e-12);
        assert_relative_eq!(
            a.symmetric_difference(&b).area(),
            2.0 * one,
            max_relative = 1e-12
        );
        assert_eq!(
            a.unify(&b),
            a.intersect(&b).unify(&a.symmetric_difference(&b))
        );
    }

    #[test]
    fn test_set_algebra_mixed_levels() {
        let coarse = px(1, 100);
        let a = Map::from_pixels([(coarse, 1.0)]).unwrap();
        let fine = coarse.descendants(4).unwrap().nth(17).unwrap();
        let b = Map::from_pixels([(fine, 0.5), (px(1, 300), 1.0)]).unwrap();

        let inter = a.intersect(&b);
        assert_eq!(inter.len(), 1);
        assert_eq!(inter.get(&fine), Some(&1.0));

        let diff = a.difference(&b);
        assert!(!overlaps(&diff));
        assert_relative_eq!(
            diff.covered_area(),
            coarse.area() - fine.area(),
            max_relative = 1e-12
        );

        // b's weight survives where it is the only cover
        let union = b.unify(&a);
        assert_eq!(union.find_weight(&fine.center()), Some(0.5));
        assert_eq!(union.find_weight(&px(1, 300).center()), Some(1.0));
    }

    #[test]
    fn test_unmasked_fraction_and_coverage() {
        let parent = px(2, 300);
        let children = parent.children().unwrap();
        let map = Map::from_pixels([(children[0], 0.2), (children[3], 1.0)]).unwrap();
        assert_relative_eq!(map.unmasked_fraction(&parent), 0.5, max_relative = 1e-12);
        assert_eq!(map.unmasked_fraction(&children[0]), 1.0);
        assert_eq!(map.unmasked_fraction(&children[1]), 0.0);
        assert_eq!(map.coverage(2).unwrap(), vec![parent]);
        assert_eq!(map.coverage(3).unwrap(), vec![children[0], children[3]]);
        assert_eq!(map.coverage(4).unwrap().len(), 8);
        assert_relative_eq!(map.average_weight(), 0.6, max_relative = 1e-12);
    }

    #[test]
    fn test_degrade_keeps_area() {
        let parent = px(2, 300);
        let children = parent.children().unwrap();
        let map = Map::from_pixels([(children[0], 0.2), (children[3], 1.0), (px(1, 5), 1.0)])
            .unwrap();
        let coarse = map.degrade(2).unwrap();
        assert_relative_eq!(coarse.area(), map.area(), max_relative = 1e-12);
        assert_relative_eq!(coarse.get(&parent).copied().unwrap(), 0.3, max_relative = 1e-12);
        assert_eq!(coarse.get(&px(1, 5)), Some(&1.0));
        assert!(map.degrade(MAX_LEVEL + 1).is_err());
    }

    #[test]
    fn test_from_bound_matches_circle_area() {
        let center = AngularCoordinate::from_equatorial(150.0, 30.0).unwrap();
        let circle = CircleBound::new(center, 10.0).unwrap();
        let map = Map::from_bound(&circle, 7).unwrap();
        assert!(!overlaps(&map));
        assert_relative_eq!(map.area(), circle.area(), max_relative = 5e-3);
        assert!(map.contains(&center));
        assert!(!map.contains(&center.offset(12.0, 45.0).unwrap()));
    }

    #[test]
    fn test_local_area() {
        let map = Map::full_sky();
        let center = AngularCoordinate::from_equatorial(40.0, -10.0).unwrap();
        let local = map.local_area(&center, 5.0, 0.0).unwrap();
        let exact = CircleBound::new(center, 5.0).unwrap().area();
        assert_relative_eq!(local, exact, max_relative = 1e-2);
        assert!(map.local_area(&center, 1.0, 2.0).is_err());
    }

    #[test]
    fn test_random_points_deterministic_and_inside() {
        let map = Map::from_pixels([(px(1, 10), 1.0), (px(2, 900), 0.5)]).unwrap();
        let a = map.generate_random_points(500, true, 11).unwrap();
        let b = map.generate_random_points(500, true, 11).unwrap();
        assert_eq!(a, b);
        assert!(a.iter().all(|c| map.contains(c)));
        let c = map.generate_random_points(500, true, 12).unwrap();
        assert_ne!(a, c);
        assert!(Map::new().generate_random_points(1, false, 0).is_err());
    }

    #[test]
    fn test_random_points_follow_area() {
        let small = px(1, 10);
        let big = px(0, 200);
        let map = Map::from_pixels([(small, 1.0), (big, 1.0)]).unwrap();
        let points = map.generate_random_points(20_000, false, 3).unwrap();
        let in_big = points.iter().filter(|c| big.contains(c)).count() as f64;
        // big is four times the area of small
        assert_relative_eq!(in_big / points.len() as f64, 0.8, epsilon = 0.02);
    }

    #[test]
    fn test_random_points_like_copies_weights() {
        let map = Map::full_sky();
        let c = AngularCoordinate::from_equatorial(0.0, 0.0).unwrap();
        let catalog = vec![
            WeightedAngularCoordinate::new(c, 2.0).unwrap(),
            WeightedAngularCoordinate::new(c, 3.0).unwrap(),
        ];
        let randoms = map.generate_random_points_like(&catalog, 2.5, false, 7).unwrap();
        assert_eq!(randoms.len(), 5);
        assert!(randoms.iter().all(|r| r.weight() == 2.0 || r.weight() == 3.0));
        assert!(map
            .generate_random_points_like::<WeightedAngularCoordinate>(&[], 1.0, false, 7)
            .is_err());
    }
}
