//! Separation bins and their pair-count accumulators.
//!
//! A [`BinSet`] is an ordered list of half-open `[lower, upper)` intervals in
//! one unit: degrees for [`AngularBins`], Mpc/h for [`RadialBins`]. Bins are
//! contiguous unless built with [`BinSet::from_intervals`]. The last upper
//! edge may be infinite.
//!
//! Each [`Bin`] carries the raw DD, DR, RD and RR counts written by the
//! correlation estimators, so callers can apply any estimator afterwards.

use std::marker::PhantomData;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::errors::{ClusteringError, ClusteringResult};
use crate::estimator::Estimate;
use crate::pixel::{check_level, pixel_area, MAX_LEVEL};

/// Angular separations in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Degrees;

/// Projected comoving separations in Mpc/h.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MpcH;

pub type AngularBins = BinSet<Degrees>;
pub type RadialBins = BinSet<MpcH>;

/// Pair totals for one bin and one pair type.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PairCounts {
    /// Number of pairs.
    pub pairs: u64,
    /// Sum of `w_i · w_j` over the pairs.
    pub weight: f64,
    /// Expected pair weight over the whole sky of the two catalogs, summed
    /// over random iterations.
    pub normalization: f64,
    /// Pair weight involving a point in each jackknife region.
    pub region_weight: Vec<f64>,
    /// Normalization with each region left out.
    pub region_normalization: Vec<f64>,
}

impl PairCounts {
    /// `weight / normalization`, `None` when nothing normalizes the count.
    pub fn normalized(&self) -> Option<f64> {
        (self.normalization > 0.0).then(|| self.weight / self.normalization)
    }

    /// Normalized count with jackknife region `region` removed.
    pub fn normalized_without(&self, region: usize) -> Option<f64> {
        let touched = self.region_weight.get(region).copied().unwrap_or(0.0);
        let norm = self.region_normalization.get(region).copied()?;
        (norm > 0.0).then(|| (self.weight - touched) / norm)
    }

    pub(crate) fn resize_regions(&mut self, n_regions: usize) {
        self.region_weight.resize(n_regions, 0.0);
        self.region_normalization.resize(n_regions, 0.0);
    }

    fn clear(&mut self) {
        *self = PairCounts::default();
    }
}

/// Pixel-estimator sums: `Σ w_i w_j δ_i δ_j` and `Σ w_i w_j`.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PixelCounts {
    pub product: f64,
    pub weight: f64,
}

impl PixelCounts {
    /// Weighted mean of `δ_i δ_j`, the pixel estimate of ξ.
    pub fn value(&self) -> Estimate {
        Estimate::from((self.weight > 0.0).then(|| self.product / self.weight))
    }
}

/// One separation interval.
#[derive(Debug, Clone, PartialEq)]
pub struct Bin {
    lower: f64,
    upper: f64,
    center: f64,
    pub(crate) dd: PairCounts,
    pub(crate) dr: PairCounts,
    pub(crate) rd: PairCounts,
    pub(crate) rr: PairCounts,
    pub(crate) pixel: PixelCounts,
    level: Option<u8>,
}

impl Bin {
    fn new(lower: f64, upper: f64, center: f64) -> Self {
        Self {
            lower,
            upper,
            center,
            dd: PairCounts::default(),
            dr: PairCounts::default(),
            rd: PairCounts::default(),
            rr: PairCounts::default(),
            pixel: PixelCounts::default(),
            level: None,
        }
    }

    pub fn lower(&self) -> f64 {
        self.lower
    }

    pub fn upper(&self) -> f64 {
        self.upper
    }

    /// Representative separation: geometric mean for logarithmic sets,
    /// midpoint otherwise.
    pub fn center(&self) -> f64 {
        self.center
    }

    /// `lower <= separation < upper`.
    #[inline]
    pub fn contains(&self, separation: f64) -> bool {
        separation >= self.lower && separation < self.upper
    }

    pub fn dd(&self) -> &PairCounts {
        &self.dd
    }

    pub fn dr(&self) -> &PairCounts {
        &self.dr
    }

    pub fn rd(&self) -> &PairCounts {
        &self.rd
    }

    pub fn rr(&self) -> &PairCounts {
        &self.rr
    }

    pub fn pixel(&self) -> &PixelCounts {
        &self.pixel
    }

    /// Level of the pixel estimate for this bin, `None` when the bin is
    /// pair counted.
    pub fn level(&self) -> Option<u8> {
        self.level
    }

    /// Coarsest level whose pixel side is at most half the lower edge, or
    /// `None` when no level is fine enough (a zero lower edge included).
    pub fn suggested_level(&self) -> Option<u8> {
        level_for_scale(self.lower)
    }
}

fn level_for_scale(scale: f64) -> Option<u8> {
    if scale.is_nan() || scale <= 0.0 {
        return None;
    }
    (0..=MAX_LEVEL).find(|level| libm::sqrt(pixel_area(*level)) <= 0.5 * scale)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Spacing {
    Linear,
    Logarithmic,
}

/// Ordered, non-overlapping separation bins in unit `U`.
#[derive(Debug, Clone, PartialEq)]
pub struct BinSet<U> {
    bins: Vec<Bin>,
    contiguous: bool,
    _unit: PhantomData<U>,
}

fn check_edge(value: f64, allow_infinite: bool) -> ClusteringResult<()> {
    if value.is_nan() || value < 0.0 || (!allow_infinite && value.is_infinite()) {
        return Err(ClusteringError::invalid_bin_edges(format!(
            "edge {} must be a non-negative number",
            value
        )));
    }
    Ok(())
}

fn bin_center(lower: f64, upper: f64, spacing: Spacing) -> f64 {
    if upper.is_infinite() {
        return lower;
    }
    match spacing {
        Spacing::Logarithmic if lower > 0.0 => libm::sqrt(lower * upper),
        _ => 0.5 * (lower + upper),
    }
}

impl<U> BinSet<U> {
    fn from_bins(bins: Vec<Bin>, contiguous: bool) -> Self {
        Self {
            bins,
            contiguous,
            _unit: PhantomData,
        }
    }

    /// Contiguous bins between consecutive `edges`.
    pub fn from_edges(edges: &[f64]) -> ClusteringResult<Self> {
        if edges.len() < 2 {
            return Err(ClusteringError::invalid_bin_edges(
                "at least two edges are needed",
            ));
        }
        for (i, edge) in edges.iter().enumerate() {
            check_edge(*edge, i == edges.len() - 1)?;
        }
        if let Some(w) = edges.windows(2).find(|w| w[1] <= w[0]) {
            return Err(ClusteringError::invalid_bin_edges(format!(
                "edges must increase strictly, found {} then {}",
                w[0], w[1]
            )));
        }
        Ok(Self::from_bins(
            edges
                .windows(2)
                .map(|w| Bin::new(w[0], w[1], bin_center(w[0], w[1], Spacing::Linear)))
                .collect(),
            true,
        ))
    }

    /// Sparse bins from explicit `(lower, upper)` intervals, which must be
    /// sorted and may leave gaps but not overlap.
    pub fn from_intervals(intervals: &[(f64, f64)]) -> ClusteringResult<Self> {
        if intervals.is_empty() {
            return Err(ClusteringError::invalid_bin_edges("no intervals given"));
        }
        for (i, &(lower, upper)) in intervals.iter().enumerate() {
            check_edge(lower, false)?;
            check_edge(upper, i == intervals.len() - 1)?;
            if upper <= lower {
                return Err(ClusteringError::invalid_bin_edges(format!(
                    "interval [{}, {}) is empty",
                    lower, upper
                )));
            }
        }
        if let Some(w) = intervals.windows(2).find(|w| w[1].0 < w[0].1) {
            return Err(ClusteringError::invalid_bin_edges(format!(
                "interval starting at {} overlaps the one ending at {}",
                w[1].0, w[0].1
            )));
        }
        let contiguous = intervals.windows(2).all(|w| w[1].0 == w[0].1);
        Ok(Self::from_bins(
            intervals
                .iter()
                .map(|&(lo, hi)| Bin::new(lo, hi, bin_center(lo, hi, Spacing::Linear)))
                .collect(),
            contiguous,
        ))
    }

    /// `n` equal-width bins spanning `[min, max)`.
    pub fn linear(min: f64, max: f64, n: usize) -> ClusteringResult<Self> {
        Self::generated(min, max, n, Spacing::Linear)
    }

    /// `n` bins of equal width in `log10` spanning `[min, max)`.
    pub fn logarithmic(min: f64, max: f64, n: usize) -> ClusteringResult<Self> {
        if min.is_nan() || min <= 0.0 {
            return Err(ClusteringError::invalid_bin_edges(format!(
                "logarithmic bins need a positive lower edge, got {}",
                min
            )));
        }
        Self::generated(min, max, n, Spacing::Logarithmic)
    }

    /// Logarithmic bins with `per_decade` bins per factor of ten. The
    /// upper edge is `max` rounded to a whole number of bins.
    pub fn per_decade(min: f64, max: f64, per_decade: usize) -> ClusteringResult<Self> {
        if per_decade == 0 || min.is_nan() || min <= 0.0 || !max.is_finite() || max <= min {
            return Err(ClusteringError::invalid_bin_edges(format!(
                "cannot place {} bins per decade in [{}, {})",
                per_decade, min, max
            )));
        }
        let decades = libm::log10(max / min);
        let n = ((decades * per_decade as f64).round() as usize).max(1);
        let top = min * libm::pow(10.0, n as f64 / per_decade as f64);
        Self::generated(min, top, n, Spacing::Logarithmic)
    }

    fn generated(min: f64, max: f64, n: usize, spacing: Spacing) -> ClusteringResult<Self> {
        check_edge(min, false)?;
        check_edge(max, false)?;
        if n == 0 || max <= min {
            return Err(ClusteringError::invalid_bin_edges(format!(
                "cannot build {} bins in [{}, {})",
                n, min, max
            )));
        }
        let edge = |k: usize| -> f64 {
            let t = k as f64 / n as f64;
            match spacing {
                Spacing::Linear => min + t * (max - min),
                Spacing::Logarithmic => min * libm::pow(max / min, t),
            }
        };
        // pin the outer edges exactly
        let edges: Vec<f64> = (0..=n)
            .map(|k| match k {
                0 => min,
                k if k == n => max,
                k => edge(k),
            })
            .collect();
        Ok(Self::from_bins(
            edges
                .windows(2)
                .map(|w| Bin::new(w[0], w[1], bin_center(w[0], w[1], spacing)))
                .collect(),
            true,
        ))
    }

    pub fn len(&self) -> usize {
        self.bins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bins.is_empty()
    }

    /// False for sparse sets with gaps between bins.
    pub fn is_contiguous(&self) -> bool {
        self.contiguous
    }

    pub fn iter(&self) -> impl Iterator<Item = &Bin> {
        self.bins.iter()
    }

    pub fn get(&self, index: usize) -> Option<&Bin> {
        self.bins.get(index)
    }

    pub fn bins(&self) -> &[Bin] {
        &self.bins
    }

    pub(crate) fn bins_mut(&mut self) -> &mut [Bin] {
        &mut self.bins
    }

    pub fn centers(&self) -> Vec<f64> {
        self.bins.iter().map(Bin::center).collect()
    }

    pub fn min_separation(&self) -> f64 {
        self.bins.first().map_or(0.0, Bin::lower)
    }

    pub fn max_separation(&self) -> f64 {
        self.bins.last().map_or(0.0, Bin::upper)
    }

    /// Index of the bin holding `separation`, `None` when it falls outside
    /// every bin.
    pub fn assign(&self, separation: f64) -> Option<usize> {
        let index = self.bins.partition_point(|b| b.upper <= separation);
        self.bins
            .get(index)
            .filter(|b| b.contains(separation))
            .map(|_| index)
    }

    /// Number of leading bins that are pair counted. Pixel levels only grow
    /// coarser with separation, so these always come first.
    pub(crate) fn pair_bin_count(&self) -> usize {
        self.bins.iter().take_while(|b| b.level.is_none()).count()
    }

    /// Distinct pixel levels in use, finest first.
    pub(crate) fn pixel_levels(&self) -> Vec<u8> {
        let mut levels: Vec<u8> = self.bins.iter().filter_map(Bin::level).collect();
        levels.sort_unstable_by(|a, b| b.cmp(a));
        levels.dedup();
        levels
    }

    /// Marks every bin for pair counting.
    pub fn clear_levels(&mut self) {
        for bin in &mut self.bins {
            bin.level = None;
        }
    }

    /// Zeroes every accumulator. Pixel levels are kept.
    pub fn reset(&mut self) {
        for bin in &mut self.bins {
            bin.dd.clear();
            bin.dr.clear();
            bin.rd.clear();
            bin.rr.clear();
            bin.pixel = PixelCounts::default();
        }
    }
}

impl AngularBins {
    /// Level that resolves every bin: the one whose pixel side is at most
    /// half the smallest non-zero edge.
    pub fn suggested_level(&self) -> u8 {
        let scale = self
            .bins
            .iter()
            .flat_map(|b| [b.lower, b.upper])
            .filter(|e| *e > 0.0)
            .fold(f64::INFINITY, f64::min);
        level_for_scale(scale).unwrap_or(MAX_LEVEL)
    }

    /// Gives each bin its own pixel level, splitting the set into pair
    /// counted bins at small separations and pixel bins above them.
    /// A bin whose suggested level is finer than `max_level` is pair
    /// counted. Returns the number of pixel bins.
    pub fn assign_levels(&mut self, max_level: u8) -> usize {
        let mut n_pixel = 0;
        for bin in &mut self.bins {
            bin.level = level_for_scale(bin.lower).filter(|level| *level <= max_level);
            n_pixel += usize::from(bin.level.is_some());
        }
        n_pixel
    }

    /// Runs every bin through the pixel estimator at `level`.
    pub fn set_level(&mut self, level: u8) -> ClusteringResult<()> {
        check_level(level)?;
        for bin in &mut self.bins {
            bin.level = Some(level);
        }
        Ok(())
    }
}
