//! Two-point correlation functions from pair counts.
//!
//! A [`Correlation`] owns a bin set and fills its DD, DR, RD and RR counts
//! from a data catalog, a footprint [`Map`] and random catalogs drawn from
//! that footprint. The same counting serves both flavours:
//!
//! - [`AngularCorrelation`] bins great-circle separations in degrees.
//! - [`RadialCorrelation`] bins projected separations in Mpc/h, taken at the
//!   transverse comoving distance of each query centre.
//!
//! Each query centre turns its bins into angular windows through the
//! [`SeparationMetric`], then walks the point tree once. Centres are spread
//! over rayon workers, each folding into its own per-bin tallies, and the
//! tallies are summed before they reach the bins.
//!
//! # Pair convention
//!
//! Pairs are ordered: every pair of distinct catalog points is seen once
//! from each end. Auto-correlation counts drop a point's pairing with
//! itself and normalize by `W² − Σw²`. Cross-correlation counts keep every
//! pair and normalize by `W₁·W₂`. Random counts are summed over random
//! iterations together with their normalizations, so the ratio is an
//! average over iterations.
//!
//! # Pixel bins
//!
//! Wide angular bins can be estimated from density fields instead of pairs.
//! [`PixelBreak`] decides, per bin, whether a pixel level fine enough for
//! the bin is affordable; [`AngularCorrelation::find_auto_correlation`]
//! then counts pairs for the small-separation bins and correlates pixel
//! overdensities for the rest, one level at a time.
//!
//! # Jackknife
//!
//! With regions configured, every count also records the weight of the
//! pairs touching each region, and the normalization with that region left
//! out. Removing one region is then a subtraction, which gives the
//! jackknife estimates, their mean and covariance without recounting.

use std::marker::PhantomData;

use rayon::prelude::*;
use tracing::{debug, info, warn};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::bins::{Bin, BinSet, Degrees, MpcH, PairCounts};
use crate::coordinate::{CatalogPoint, CosmoCoordinate, WeightedAngularCoordinate};
use crate::errors::{ClusteringError, ClusteringResult};
use crate::estimator::{Estimate, Estimator};
use crate::map::Map;
use crate::pixel::check_level;
use crate::region::RegionMap;
use crate::scalar_map::{FieldKind, ScalarMap, DEFAULT_MIN_UNMASKED};
use crate::tree::{window_of, TreeMap, DEFAULT_NODE_CAPACITY};

/// How a bin's separation range maps onto angles around a query centre.
pub trait SeparationMetric {
    type Point: CatalogPoint;
    type Unit: std::fmt::Debug + Clone + PartialEq + Send + Sync;

    /// Angular window in radians covering separations `[lower, upper)` from
    /// `center`, or `None` when `center` cannot be paired at all.
    fn window(center: &Self::Point, lower: f64, upper: f64) -> Option<(f64, f64)>;
}

/// Great-circle separation in degrees.
#[derive(Debug, Clone, Copy, Default)]
pub struct AngularMetric;

impl SeparationMetric for AngularMetric {
    type Point = WeightedAngularCoordinate;
    type Unit = Degrees;

    fn window(_center: &Self::Point, lower: f64, upper: f64) -> Option<(f64, f64)> {
        Some((lower.to_radians(), upper.to_radians()))
    }
}

/// Projected separation in Mpc/h at the centre's transverse comoving
/// distance.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProjectedMetric;

impl SeparationMetric for ProjectedMetric {
    type Point = CosmoCoordinate;
    type Unit = MpcH;

    fn window(center: &Self::Point, lower: f64, upper: f64) -> Option<(f64, f64)> {
        let distance = center.transverse_distance();
        if distance.is_nan() || distance <= 0.0 {
            return None;
        }
        Some((lower / distance, upper / distance))
    }
}

pub type AngularCorrelation = Correlation<AngularMetric>;
pub type RadialCorrelation = Correlation<ProjectedMetric>;

/// Footprints larger than this, in square degrees, get the coarser
/// automatic pixel limits.
const LARGE_FOOTPRINT_DEG2: f64 = 500.0;

/// Finest pixel level the automatic break allows for `n_points` objects
/// over `area` square degrees.
pub fn auto_max_level(n_points: usize, area: f64) -> u8 {
    let base = if area > LARGE_FOOTPRINT_DEG2 { 6 } else { 8 };
    let step = match n_points {
        0..=499_999 => 0,
        500_000..=1_999_999 => 1,
        2_000_000..=9_999_999 => 2,
        _ => 3,
    };
    base + step
}

/// Where an angular correlation switches from pair counts to pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum PixelBreak {
    /// Finest level from [`auto_max_level`].
    #[default]
    Auto,
    /// Bins that would need pixels finer than this level are pair counted.
    MaxLevel(u8),
    /// Every bin is pair counted.
    PairsOnly,
}

/// Parameters of a correlation run.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CorrelationConfig {
    /// Random points drawn per data point, each iteration.
    pub random_multiplier: f64,
    /// Random catalogs always counted.
    pub random_iterations: usize,
    /// Upper limit on random catalogs when chasing `rr_tolerance`.
    pub max_random_iterations: usize,
    /// Largest accepted relative Poisson noise `1/√RR` over non-empty bins.
    pub rr_tolerance: Option<f64>,
    /// Draw randoms in proportion to footprint weight as well as area.
    pub weighted_randoms: bool,
    pub seed: u64,
    /// Level of the point tree roots.
    pub tree_level: u8,
    pub node_capacity: usize,
    /// Number of jackknife regions, if any.
    pub regions: Option<u16>,
    pub estimator: Estimator,
    /// Pair/pixel split used by the combined angular entry points.
    pub pixel_break: PixelBreak,
}

impl Default for CorrelationConfig {
    fn default() -> Self {
        Self {
            random_multiplier: 1.0,
            random_iterations: 1,
            max_random_iterations: 8,
            rr_tolerance: None,
            weighted_randoms: false,
            seed: 1,
            tree_level: 0,
            node_capacity: DEFAULT_NODE_CAPACITY,
            regions: None,
            estimator: Estimator::LandySzalay,
            pixel_break: PixelBreak::Auto,
        }
    }
}

impl CorrelationConfig {
    pub fn with_random_multiplier(mut self, multiplier: f64) -> Self {
        self.random_multiplier = multiplier;
        self
    }

    pub fn with_random_iterations(mut self, iterations: usize) -> Self {
        self.random_iterations = iterations;
        self.max_random_iterations = self.max_random_iterations.max(iterations);
        self
    }

    /// Keeps drawing random catalogs, up to `max_iterations`, until the RR
    /// noise in every non-empty bin is below `tolerance`.
    pub fn with_rr_tolerance(mut self, tolerance: f64, max_iterations: usize) -> Self {
        self.rr_tolerance = Some(tolerance);
        self.max_random_iterations = max_iterations;
        self
    }

    pub fn with_weighted_randoms(mut self, weighted: bool) -> Self {
        self.weighted_randoms = weighted;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_tree(mut self, level: u8, node_capacity: usize) -> Self {
        self.tree_level = level;
        self.node_capacity = node_capacity;
        self
    }

    pub fn with_regions(mut self, regions: u16) -> Self {
        self.regions = Some(regions);
        self
    }

    pub fn with_estimator(mut self, estimator: Estimator) -> Self {
        self.estimator = estimator;
        self
    }

    pub fn with_pixel_break(mut self, pixel_break: PixelBreak) -> Self {
        self.pixel_break = pixel_break;
        self
    }

    fn validate(&self) -> ClusteringResult<()> {
        if !self.random_multiplier.is_finite() || self.random_multiplier <= 0.0 {
            return Err(ClusteringError::invalid_config(format!(
                "random multiplier must be positive, got {}",
                self.random_multiplier
            )));
        }
        if self.random_iterations == 0 || self.max_random_iterations < self.random_iterations {
            return Err(ClusteringError::invalid_config(format!(
                "random iterations must satisfy 1 <= {} <= {}",
                self.random_iterations, self.max_random_iterations
            )));
        }
        if let Some(tolerance) = self.rr_tolerance {
            if tolerance.is_nan() || tolerance <= 0.0 {
                return Err(ClusteringError::invalid_config(format!(
                    "RR tolerance must be positive, got {}",
                    tolerance
                )));
            }
        }
        if self.node_capacity == 0 {
            return Err(ClusteringError::invalid_config(
                "node capacity must be at least one",
            ));
        }
        if self.regions == Some(0) {
            return Err(ClusteringError::invalid_config(
                "at least one jackknife region is needed",
            ));
        }
        if let PixelBreak::MaxLevel(level) = self.pixel_break {
            check_level(level)?;
        }
        check_level(self.tree_level)
    }
}

/// One row of a finished correlation.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct BinResult {
    pub lower: f64,
    pub upper: f64,
    pub center: f64,
    pub xi: Estimate,
    pub error: Estimate,
    pub dd_pairs: u64,
    pub dr_pairs: u64,
    pub rd_pairs: u64,
    pub rr_pairs: u64,
    /// Pixel-estimator value, when one was computed.
    pub pixel_xi: Estimate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PairKind {
    DataData,
    DataRandom,
    RandomData,
    RandomRandom,
}

impl PairKind {
    fn counts_mut(self, bin: &mut Bin) -> &mut PairCounts {
        match self {
            PairKind::DataData => &mut bin.dd,
            PairKind::DataRandom => &mut bin.dr,
            PairKind::RandomData => &mut bin.rd,
            PairKind::RandomRandom => &mut bin.rr,
        }
    }
}

/// Per-worker accumulator for one bin.
#[derive(Debug, Clone)]
struct BinTally {
    pairs: u64,
    weight: f64,
    regions: Vec<f64>,
}

impl BinTally {
    fn new(n_regions: usize) -> Self {
        Self {
            pairs: 0,
            weight: 0.0,
            regions: vec![0.0; n_regions],
        }
    }
}

fn merge_tallies(mut a: Vec<BinTally>, b: Vec<BinTally>) -> Vec<BinTally> {
    for (x, y) in a.iter_mut().zip(b) {
        x.pairs += y.pairs;
        x.weight += y.weight;
        for (r, w) in x.regions.iter_mut().zip(y.regions) {
            *r += w;
        }
    }
    a
}

/// Weight totals of a catalog, overall and per region.
#[derive(Debug, Clone, Default)]
struct WeightSums {
    total: f64,
    squares: f64,
    regions: Vec<(f64, f64)>,
}

impl WeightSums {
    fn new<P: CatalogPoint>(points: &[P], regions: Option<&RegionMap>) -> Self {
        let mut sums = Self {
            regions: vec![(0.0, 0.0); regions.map_or(0, RegionMap::n_regions)],
            ..Default::default()
        };
        for point in points {
            let w = point.weight();
            sums.total += w;
            sums.squares += w * w;
            let slot = regions
                .and_then(|r| r.region_of(point.coordinate()))
                .and_then(|r| sums.regions.get_mut(r as usize));
            if let Some(slot) = slot {
                slot.0 += w;
                slot.1 += w * w;
            }
        }
        sums
    }

    /// Sums with region `r` removed.
    fn without(&self, r: usize) -> (f64, f64) {
        let (w, s) = self.regions[r];
        (self.total - w, self.squares - s)
    }
}

/// Normalization of one pair type: overall, then with each region removed.
fn normalization(a: &WeightSums, b: Option<&WeightSums>) -> (f64, Vec<f64>) {
    match b {
        None => (
            a.total * a.total - a.squares,
            (0..a.regions.len())
                .map(|r| {
                    let (w, s) = a.without(r);
                    w * w - s
                })
                .collect(),
        ),
        Some(b) => (
            a.total * b.total,
            (0..a.regions.len())
                .map(|r| a.without(r).0 * b.without(r).0)
                .collect(),
        ),
    }
}

/// Tallies every pair between `centers` and the points in `tree`, per bin.
fn count_pairs<M: SeparationMetric>(
    bins: &[Bin],
    centers: &[M::Point],
    tree: &TreeMap<M::Point>,
    regions: Option<&RegionMap>,
    exclude_self: bool,
) -> Vec<BinTally> {
    let n_bins = bins.len();
    let n_regions = regions.map_or(0, RegionMap::n_regions);
    let empty = || vec![BinTally::new(n_regions); n_bins];
    centers
        .par_iter()
        .fold(empty, |mut tallies, center| {
            tally_center::<M>(&mut tallies, bins, center, tree, regions, exclude_self);
            tallies
        })
        .reduce(empty, merge_tallies)
}

fn tally_center<M: SeparationMetric>(
    tallies: &mut [BinTally],
    bins: &[Bin],
    center: &M::Point,
    tree: &TreeMap<M::Point>,
    regions: Option<&RegionMap>,
    exclude_self: bool,
) {
    let Some(windows) = bins
        .iter()
        .map(|b| M::window(center, b.lower(), b.upper()))
        .collect::<Option<Vec<_>>>()
    else {
        return;
    };
    let wc = center.weight();
    let home = regions.and_then(|r| r.region_of(center.coordinate()));

    tree.walk(
        center.coordinate().unit_vector(),
        &windows,
        &mut |k, count, weight, node_regions| {
            let bin = &mut tallies[k];
            bin.pairs += count;
            bin.weight += wc * weight;
            let Some(home) = home else {
                return;
            };
            // pairs reaching into another region touch it; every pair touches home
            for t in node_regions.iter().filter(|t| t.region != home) {
                if let Some(slot) = bin.regions.get_mut(t.region as usize) {
                    *slot += wc * t.weight;
                }
            }
            if let Some(slot) = bin.regions.get_mut(home as usize) {
                *slot += wc * weight;
            }
        },
    );

    if exclude_self {
        if let Some(k) = window_of(&windows, 0.0) {
            let bin = &mut tallies[k];
            bin.pairs = bin.pairs.saturating_sub(1);
            bin.weight -= wc * wc;
            if let Some(slot) = home.and_then(|h| bin.regions.get_mut(h as usize)) {
                *slot -= wc * wc;
            }
        }
    }
}

/// A pair-counting correlation estimator over bins in `M::Unit`.
#[derive(Debug, Clone)]
pub struct Correlation<M: SeparationMetric> {
    bins: BinSet<M::Unit>,
    config: CorrelationConfig,
    regions: Option<RegionMap>,
    _metric: PhantomData<fn() -> M>,
}

impl<M: SeparationMetric> Correlation<M> {
    pub fn new(bins: BinSet<M::Unit>, config: CorrelationConfig) -> ClusteringResult<Self> {
        config.validate()?;
        if bins.is_empty() {
            return Err(ClusteringError::invalid_bin_edges("no bins to fill"));
        }
        Ok(Self {
            bins,
            config,
            regions: None,
            _metric: PhantomData,
        })
    }

    pub fn bins(&self) -> &BinSet<M::Unit> {
        &self.bins
    }

    pub fn config(&self) -> &CorrelationConfig {
        &self.config
    }

    /// The jackknife regions of the last run, if regions were requested.
    pub fn regions(&self) -> Option<&RegionMap> {
        self.regions.as_ref()
    }

    pub fn n_regions(&self) -> usize {
        self.regions.as_ref().map_or(0, RegionMap::n_regions)
    }

    /// Hands the bins back, counts included.
    pub fn into_bins(self) -> BinSet<M::Unit> {
        self.bins
    }

    /// Correlates `catalog` with itself over `map`, pair counting every
    /// bin. Points outside the map are dropped with a warning.
    pub fn auto_correlate(&mut self, map: &Map, catalog: &[M::Point]) -> ClusteringResult<()> {
        self.prepare(map)?;
        self.bins.clear_levels();
        self.count_auto_pairs(map, catalog)
    }

    fn count_auto_pairs(&mut self, map: &Map, catalog: &[M::Point]) -> ClusteringResult<()> {
        let data = restrict(map, catalog, "data")?;
        let data_sums = WeightSums::new(&data, self.regions.as_ref());
        let data_tree = self.build_tree(&data)?;
        info!(points = data.len(), bins = self.bins.len(), "auto-correlating");

        let norm = normalization(&data_sums, None);
        self.count(PairKind::DataData, &data, &data_tree, true, norm);

        let mut iteration = 0;
        loop {
            let seed = self.config.seed.wrapping_add(iteration as u64);
            let randoms = self.randoms(map, &data, seed)?;
            let random_sums = WeightSums::new(&randoms, self.regions.as_ref());
            let random_tree = self.build_tree(&randoms)?;

            let dr = normalization(&data_sums, Some(&random_sums));
            self.count(PairKind::DataRandom, &data, &random_tree, false, dr);
            let rr = normalization(&random_sums, None);
            self.count(PairKind::RandomRandom, &randoms, &random_tree, true, rr);

            iteration += 1;
            debug!(iteration, randoms = randoms.len(), "finished random iteration");
            if self.randoms_done(iteration) {
                break;
            }
        }
        // DR and RD are the same count for a single catalog
        for bin in self.bins.bins_mut() {
            bin.rd = bin.dr.clone();
        }
        Ok(())
    }

    /// Correlates `first` against `second` over `map`, pair counting every
    /// bin. No pair is dropped: a point present in both catalogs pairs with
    /// itself.
    pub fn cross_correlate(
        &mut self,
        map: &Map,
        first: &[M::Point],
        second: &[M::Point],
    ) -> ClusteringResult<()> {
        self.prepare(map)?;
        self.bins.clear_levels();
        self.count_cross_pairs(map, first, second)
    }

    fn count_cross_pairs(
        &mut self,
        map: &Map,
        first: &[M::Point],
        second: &[M::Point],
    ) -> ClusteringResult<()> {
        let first = restrict(map, first, "first")?;
        let second = restrict(map, second, "second")?;
        let first_sums = WeightSums::new(&first, self.regions.as_ref());
        let second_sums = WeightSums::new(&second, self.regions.as_ref());
        let second_tree = self.build_tree(&second)?;
        info!(
            first = first.len(),
            second = second.len(),
            bins = self.bins.len(),
            "cross-correlating"
        );

        let dd = normalization(&first_sums, Some(&second_sums));
        self.count(PairKind::DataData, &first, &second_tree, false, dd);

        let mut iteration = 0;
        loop {
            let seed = self.config.seed.wrapping_add(2 * iteration as u64);
            let first_randoms = self.randoms(map, &first, seed)?;
            let second_randoms = self.randoms(map, &second, seed.wrapping_add(1))?;
            let first_random_sums = WeightSums::new(&first_randoms, self.regions.as_ref());
            let second_random_sums = WeightSums::new(&second_randoms, self.regions.as_ref());
            let second_random_tree = self.build_tree(&second_randoms)?;

            let dr = normalization(&first_sums, Some(&second_random_sums));
            self.count(PairKind::DataRandom, &first, &second_random_tree, false, dr);
            let rd = normalization(&first_random_sums, Some(&second_sums));
            self.count(PairKind::RandomData, &first_randoms, &second_tree, false, rd);
            let rr = normalization(&first_random_sums, Some(&second_random_sums));
            self.count(
                PairKind::RandomRandom,
                &first_randoms,
                &second_random_tree,
                false,
                rr,
            );

            iteration += 1;
            debug!(iteration, "finished random iteration");
            if self.randoms_done(iteration) {
                break;
            }
        }
        Ok(())
    }

    fn prepare(&mut self, map: &Map) -> ClusteringResult<()> {
        check_footprint(map)?;
        self.bins.reset();
        self.regions = match self.config.regions {
            Some(n) => Some(RegionMap::new(map, n, None)?),
            None => None,
        };
        Ok(())
    }

    fn build_tree(&self, points: &[M::Point]) -> ClusteringResult<TreeMap<M::Point>> {
        let mut tree = TreeMap::from_points(
            points.iter().cloned(),
            self.config.tree_level,
            self.config.node_capacity,
        )?;
        if let Some(regions) = &self.regions {
            tree.assign_regions(regions);
        }
        Ok(tree)
    }

    fn randoms(&self, map: &Map, like: &[M::Point], seed: u64) -> ClusteringResult<Vec<M::Point>> {
        map.generate_random_points_like(
            like,
            self.config.random_multiplier,
            self.config.weighted_randoms,
            seed,
        )
    }

    fn count(
        &mut self,
        kind: PairKind,
        centers: &[M::Point],
        tree: &TreeMap<M::Point>,
        exclude_self: bool,
        (norm, region_norms): (f64, Vec<f64>),
    ) {
        let n_pair_bins = self.bins.pair_bin_count();
        let tallies = count_pairs::<M>(
            &self.bins.bins()[..n_pair_bins],
            centers,
            tree,
            self.regions.as_ref(),
            exclude_self,
        );
        for (bin, tally) in self.bins.bins_mut().iter_mut().zip(tallies) {
            let counts = kind.counts_mut(bin);
            counts.resize_regions(region_norms.len());
            counts.pairs += tally.pairs;
            counts.weight += tally.weight;
            counts.normalization += norm;
            for (acc, w) in counts.region_weight.iter_mut().zip(tally.regions) {
                *acc += w;
            }
            for (acc, n) in counts.region_normalization.iter_mut().zip(&region_norms) {
                *acc += n;
            }
        }
    }

    /// Largest relative RR noise over bins with at least one RR pair.
    pub fn rr_noise(&self) -> f64 {
        self.bins
            .iter()
            .filter(|b| b.rr().pairs > 0)
            .map(|b| 1.0 / libm::sqrt(b.rr().pairs as f64))
            .fold(f64::NEG_INFINITY, f64::max)
    }

    fn randoms_done(&self, iteration: usize) -> bool {
        if iteration < self.config.random_iterations {
            return false;
        }
        let Some(tolerance) = self.config.rr_tolerance else {
            return true;
        };
        let noise = self.rr_noise();
        if noise.is_finite() && noise <= tolerance {
            debug!(iteration, noise, "RR noise within tolerance");
            return true;
        }
        if iteration >= self.config.max_random_iterations {
            warn!(
                iteration,
                noise, tolerance, "RR noise still above tolerance after the last random catalog"
            );
            return true;
        }
        false
    }

    /// ξ per bin with the configured estimator.
    pub fn estimate(&self) -> Vec<Estimate> {
        self.estimate_with(self.config.estimator)
    }

    /// ξ per bin with any estimator, from the stored counts. Pixel bins
    /// report their pixel estimate whatever the estimator.
    pub fn estimate_with(&self, estimator: Estimator) -> Vec<Estimate> {
        self.bins
            .iter()
            .map(|b| match b.level() {
                Some(_) => b.pixel().value(),
                None => apply(
                    estimator,
                    b.dd().normalized(),
                    b.dr().normalized(),
                    b.rd().normalized(),
                    b.rr().normalized(),
                ),
            })
            .collect()
    }

    /// ξ per bin with jackknife region `region` left out.
    pub fn jackknife_estimate(&self, estimator: Estimator, region: usize) -> Vec<Estimate> {
        self.bins
            .iter()
            .map(|b| {
                apply(
                    estimator,
                    b.dd().normalized_without(region),
                    b.dr().normalized_without(region),
                    b.rd().normalized_without(region),
                    b.rr().normalized_without(region),
                )
            })
            .collect()
    }

    fn jackknife_samples(&self, estimator: Estimator) -> Vec<Vec<Estimate>> {
        (0..self.n_regions())
            .map(|r| self.jackknife_estimate(estimator, r))
            .collect()
    }

    /// Mean of the leave-one-out estimates per bin, over the regions where
    /// the bin is defined.
    pub fn jackknife_mean(&self, estimator: Estimator) -> Vec<Estimate> {
        let samples = self.jackknife_samples(estimator);
        (0..self.bins.len())
            .map(|i| mean(samples.iter().filter_map(|s| s[i].value())))
            .collect()
    }

    /// Jackknife covariance between bins, `(n−1)/n · Σ (ξᵢ − ξ̄ᵢ)(ξⱼ − ξ̄ⱼ)`.
    /// `None` without regions.
    pub fn covariance(&self, estimator: Estimator) -> Option<Vec<Vec<f64>>> {
        let n = self.n_regions();
        if n < 2 {
            return None;
        }
        let samples = self.jackknife_samples(estimator);
        let means = self.jackknife_mean(estimator);
        let factor = (n as f64 - 1.0) / n as f64;
        let n_bins = self.bins.len();
        let mut covariance = vec![vec![0.0; n_bins]; n_bins];
        for (i, row) in covariance.iter_mut().enumerate() {
            for (j, cell) in row.iter_mut().enumerate() {
                let (Some(mi), Some(mj)) = (means[i].value(), means[j].value()) else {
                    *cell = f64::NAN;
                    continue;
                };
                let sum: f64 = samples
                    .iter()
                    .filter_map(|s| Some((s[i].value()? - mi) * (s[j].value()? - mj)))
                    .sum();
                *cell = factor * sum;
            }
        }
        Some(covariance)
    }

    /// One-sigma error per bin: jackknife when regions exist, otherwise
    /// Poisson `(1 + ξ)/√DD`.
    pub fn errors(&self, estimator: Estimator) -> Vec<Estimate> {
        if let Some(covariance) = self.covariance(estimator) {
            return covariance
                .iter()
                .enumerate()
                .map(|(i, row)| Estimate::from(Some(libm::sqrt(row[i]))))
                .collect();
        }
        self.bins
            .iter()
            .zip(self.estimate_with(estimator))
            .map(|(bin, xi)| match (xi, bin.dd().pairs) {
                (Estimate::Defined(xi), pairs) if pairs > 0 => {
                    Estimate::Defined((1.0 + xi) / libm::sqrt(pairs as f64))
                }
                _ => Estimate::Undefined,
            })
            .collect()
    }

    /// Per-bin summary with the configured estimator.
    pub fn results(&self) -> Vec<BinResult> {
        let estimator = self.config.estimator;
        self.bins
            .iter()
            .zip(self.estimate_with(estimator))
            .zip(self.errors(estimator))
            .map(|((bin, xi), error)| BinResult {
                lower: bin.lower(),
                upper: bin.upper(),
                center: bin.center(),
                xi,
                error,
                dd_pairs: bin.dd().pairs,
                dr_pairs: bin.dr().pairs,
                rd_pairs: bin.rd().pairs,
                rr_pairs: bin.rr().pairs,
                pixel_xi: bin.pixel().value(),
            })
            .collect()
    }
}

impl AngularCorrelation {
    /// Auto-correlation with the configured [`PixelBreak`]: bins that need
    /// finer pixels than the break allows are pair counted, the rest use the
    /// pixel estimator at their own level.
    pub fn find_auto_correlation(
        &mut self,
        map: &Map,
        catalog: &[WeightedAngularCoordinate],
    ) -> ClusteringResult<()> {
        self.prepare(map)?;
        self.split_bins(catalog.len(), map.area());
        if self.bins.pair_bin_count() > 0 {
            self.count_auto_pairs(map, catalog)?;
        }
        self.pixel_pass(map, catalog, None)
    }

    /// Cross-correlation counterpart of
    /// [`find_auto_correlation`](Self::find_auto_correlation).
    pub fn find_cross_correlation(
        &mut self,
        map: &Map,
        first: &[WeightedAngularCoordinate],
        second: &[WeightedAngularCoordinate],
    ) -> ClusteringResult<()> {
        self.prepare(map)?;
        self.split_bins(geometric_count(first, second), map.area());
        if self.bins.pair_bin_count() > 0 {
            self.count_cross_pairs(map, first, second)?;
        }
        self.pixel_pass(map, first, Some((map, second)))
    }

    /// Pixel-estimator auto-correlation alone. With `level` every bin is
    /// estimated there; otherwise each bin gets its own level, capped as
    /// in [`find_auto_correlation`](Self::find_auto_correlation), and bins
    /// too fine for the cap are left undefined.
    pub fn auto_correlate_pixels(
        &mut self,
        map: &Map,
        catalog: &[WeightedAngularCoordinate],
        level: Option<u8>,
    ) -> ClusteringResult<()> {
        self.prepare_pixels(map, catalog.len(), level)?;
        self.pixel_pass(map, catalog, None)
    }

    /// Pixel-estimator cross-correlation of `first` over `first_map` with
    /// `second` over `second_map`. Levels are chosen as in
    /// [`auto_correlate_pixels`](Self::auto_correlate_pixels), with the
    /// smaller footprint setting the cap.
    pub fn cross_correlate_pixels(
        &mut self,
        first_map: &Map,
        second_map: &Map,
        first: &[WeightedAngularCoordinate],
        second: &[WeightedAngularCoordinate],
        level: Option<u8>,
    ) -> ClusteringResult<()> {
        check_footprint(second_map)?;
        let map = if second_map.area() < first_map.area() {
            second_map
        } else {
            first_map
        };
        self.prepare_pixels(map, geometric_count(first, second), level)?;
        self.pixel_pass(first_map, first, Some((second_map, second)))
    }

    fn max_pixel_level(&self, n_points: usize, area: f64) -> Option<u8> {
        match self.config.pixel_break {
            PixelBreak::PairsOnly => None,
            PixelBreak::MaxLevel(level) => Some(level),
            PixelBreak::Auto => Some(auto_max_level(n_points, area)),
        }
    }

    fn split_bins(&mut self, n_points: usize, area: f64) {
        let Some(max_level) = self.max_pixel_level(n_points, area) else {
            self.bins.clear_levels();
            return;
        };
        let pixel_bins = self.bins.assign_levels(max_level);
        debug!(
            max_level,
            pixel_bins,
            pair_bins = self.bins.len() - pixel_bins,
            "split bins between estimators"
        );
    }

    fn prepare_pixels(&mut self, map: &Map, n_points: usize, level: Option<u8>) -> ClusteringResult<()> {
        check_footprint(map)?;
        self.bins.reset();
        self.regions = None;
        if let Some(level) = level {
            return self.bins.set_level(level);
        }
        let max_level = self
            .max_pixel_level(n_points, map.area())
            .unwrap_or_else(|| auto_max_level(n_points, map.area()));
        self.bins.assign_levels(max_level);
        let skipped = self.bins.pair_bin_count();
        if skipped > 0 {
            warn!(skipped, max_level, "bins finer than the pixel limit have no pixel estimate");
        }
        Ok(())
    }

    /// Fills the pixel counts of every bin that has a level, building the
    /// density fields once at the finest level and resampling from there.
    fn pixel_pass(
        &mut self,
        first_map: &Map,
        first: &[WeightedAngularCoordinate],
        second: Option<(&Map, &[WeightedAngularCoordinate])>,
    ) -> ClusteringResult<()> {
        let levels = self.bins.pixel_levels();
        let Some(&finest) = levels.first() else {
            return Ok(());
        };
        let first_field = density_field(first_map, first, finest, "first")?;
        let second_field = second
            .map(|(map, catalog)| density_field(map, catalog, finest, "second"))
            .transpose()?;
        for level in levels {
            let field = overdensity_at(&first_field, level)?;
            match &second_field {
                None => field.auto_correlate_own_level(&mut self.bins)?,
                Some(other) => {
                    let other = overdensity_at(other, level)?;
                    field.cross_correlate_own_level(&other, &mut self.bins)?;
                }
            }
            info!(level, pixels = field.len(), "pixel correlation");
        }
        Ok(())
    }
}

fn geometric_count<P>(first: &[P], second: &[P]) -> usize {
    libm::sqrt(first.len() as f64 * second.len() as f64) as usize
}

/// Density field of `catalog` over `map` at `level`. Points outside the
/// field are dropped with a warning.
fn density_field(
    map: &Map,
    catalog: &[WeightedAngularCoordinate],
    level: u8,
    label: &str,
) -> ClusteringResult<ScalarMap> {
    check_footprint(map)?;
    let mut field = ScalarMap::from_map(map, level, FieldKind::DensityField, DEFAULT_MIN_UNMASKED)?;
    let mut dropped = 0usize;
    for point in catalog {
        if field.contains(point.coordinate()) {
            field.add_point(point)?;
        } else {
            dropped += 1;
        }
    }
    if dropped > 0 {
        warn!(catalog = label, dropped, level, "points outside the density field were ignored");
    }
    Ok(field)
}

fn overdensity_at(field: &ScalarMap, level: u8) -> ClusteringResult<ScalarMap> {
    let mut at = if level == field.level() {
        field.clone()
    } else {
        field.resample(level)?
    };
    at.convert_to_overdensity();
    Ok(at)
}

/// Rejects footprints that cannot hold a random catalog.
fn check_footprint(map: &Map) -> ClusteringResult<()> {
    if map.is_empty() {
        return Err(ClusteringError::empty_footprint(
            "cannot correlate over an empty map",
        ));
    }
    let area = map.area();
    if area.is_nan() || area <= 0.0 {
        return Err(ClusteringError::empty_footprint(format!(
            "map of {} pixels has no effective area",
            map.len()
        )));
    }
    Ok(())
}

fn apply(
    estimator: Estimator,
    dd: Option<f64>,
    dr: Option<f64>,
    rd: Option<f64>,
    rr: Option<f64>,
) -> Estimate {
    match (dd, dr, rd, rr) {
        (Some(dd), Some(dr), Some(rd), Some(rr)) => estimator.apply(dd, dr, rd, rr),
        _ => Estimate::Undefined,
    }
}

fn mean(values: impl Iterator<Item = f64>) -> Estimate {
    let (sum, n) = values.fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    Estimate::from((n > 0).then(|| sum / n as f64))
}

/// Copies of the points inside `map`.
fn restrict<P: CatalogPoint>(map: &Map, catalog: &[P], label: &str) -> ClusteringResult<Vec<P>> {
    let kept: Vec<P> = catalog
        .iter()
        .filter(|p| map.contains(p.coordinate()))
        .cloned()
        .collect();
    let dropped = catalog.len() - kept.len();
    if dropped > 0 {
        warn!(catalog = label, dropped, "points outside the footprint were ignored");
    }
    if kept.is_empty() {
        return Err(ClusteringError::empty_catalog(format!(
            "no {} point lies inside the footprint",
            label
        )));
    }
    Ok(kept)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bins::{AngularBins, RadialBins};
    use crate::coordinate::AngularCoordinate;
    use crate::cosmology::Cosmology;
    use crate::pixel::{Pixel, MAX_LEVEL};
    use approx::assert_relative_eq;

    fn weighted(points: Vec<AngularCoordinate>) -> Vec<WeightedAngularCoordinate> {
        points
            .into_iter()
            .map(|c| WeightedAngularCoordinate::new(c, 1.0).unwrap())
            .collect()
    }

    fn patch() -> Map {
        let center = AngularCoordinate::from_equatorial(150.0, 20.0).unwrap();
        Map::from_bound(&crate::bounds::CircleBound::new(center, 6.0).unwrap(), 7).unwrap()
    }

    fn brute_dd(points: &[WeightedAngularCoordinate], bin: &Bin) -> u64 {
        let mut n = 0;
        for (i, a) in points.iter().enumerate() {
            for (j, b) in points.iter().enumerate() {
                if i != j && bin.contains(a.coordinate().angular_distance(b.coordinate())) {
                    n += 1;
                }
            }
        }
        n
    }

    #[test]
    fn test_config_validation() {
        let bins = AngularBins::logarithmic(0.1, 1.0, 3).unwrap();
        assert!(AngularCorrelation::new(bins.clone(), CorrelationConfig::default()).is_ok());
        for config in [
            CorrelationConfig::default().with_random_multiplier(0.0),
            CorrelationConfig::default().with_rr_tolerance(-1.0, 4),
            CorrelationConfig::default().with_tree(0, 0),
            CorrelationConfig::default().with_tree(16, 10),
            CorrelationConfig::default().with_regions(0),
            CorrelationConfig {
                random_iterations: 3,
                max_random_iterations: 2,
                ..Default::default()
            },
        ] {
            assert!(AngularCorrelation::new(bins.clone(), config).is_err());
        }
    }

    #[test]
    fn test_dd_matches_brute_force_without_self_pairs() {
        let map = patch();
        let data = weighted(map.generate_random_points(400, false, 11).unwrap());
        let bins = AngularBins::from_edges(&[0.0, 0.5, 1.0, 3.0, f64::INFINITY]).unwrap();
        let mut corr = AngularCorrelation::new(bins, CorrelationConfig::default().with_tree(2, 16)).unwrap();
        corr.auto_correlate(&map, &data).unwrap();

        let mut total = 0;
        for bin in corr.bins().iter() {
            assert_eq!(bin.dd().pairs, brute_dd(&data, bin));
            total += bin.dd().pairs;
        }
        assert_eq!(total, 400 * 399);
        assert_relative_eq!(corr.bins().bins()[0].dd().normalization, 400.0 * 399.0);
        assert_eq!(corr.bins().bins()[0].dr(), corr.bins().bins()[0].rd());
    }

    #[test]
    fn test_cross_with_itself_keeps_self_pairs() {
        let map = patch();
        let data = weighted(map.generate_random_points(200, false, 12).unwrap());
        let bins = AngularBins::from_edges(&[0.0, 1.0, f64::INFINITY]).unwrap();

        let mut auto = AngularCorrelation::new(bins.clone(), CorrelationConfig::default()).unwrap();
        auto.auto_correlate(&map, &data).unwrap();
        let mut cross = AngularCorrelation::new(bins, CorrelationConfig::default()).unwrap();
        cross.cross_correlate(&map, &data, &data).unwrap();

        let first_auto = auto.bins().bins()[0].dd().pairs;
        let first_cross = cross.bins().bins()[0].dd().pairs;
        assert_eq!(first_cross, first_auto + 200);
        assert_eq!(cross.bins().bins()[1].dd().pairs, auto.bins().bins()[1].dd().pairs);
    }

    #[test]
    fn test_points_outside_footprint_are_dropped() {
        let map = patch();
        let mut data = weighted(map.generate_random_points(50, false, 13).unwrap());
        let far = AngularCoordinate::from_equatorial(330.0, -40.0).unwrap();
        data.push(WeightedAngularCoordinate::new(far, 1.0).unwrap());
        let bins = AngularBins::from_edges(&[0.0, f64::INFINITY]).unwrap();
        let mut corr = AngularCorrelation::new(bins, CorrelationConfig::default()).unwrap();
        corr.auto_correlate(&map, &data).unwrap();
        assert_eq!(corr.bins().bins()[0].dd().pairs, 50 * 49);

        let outside = vec![WeightedAngularCoordinate::new(far, 1.0).unwrap()];
        assert!(matches!(
            corr.auto_correlate(&map, &outside),
            Err(ClusteringError::EmptyCatalog { .. })
        ));
        assert!(matches!(
            corr.auto_correlate(&Map::new(), &data),
            Err(ClusteringError::EmptyFootprint { .. })
        ));
    }

    #[test]
    fn test_zero_area_footprint_is_rejected() {
        let cell = Pixel::new(0, 150).unwrap();
        let live = Map::from_pixels([(cell, 1.0)]).unwrap();
        let data = weighted(live.generate_random_points(200, false, 31).unwrap());
        let dead = Map::from_pixels([(cell, 0.0)]).unwrap();
        assert_eq!(dead.area(), 0.0);

        let bins = AngularBins::from_edges(&[0.5, 2.0]).unwrap();
        let mut corr = AngularCorrelation::new(bins, CorrelationConfig::default()).unwrap();
        assert!(matches!(
            corr.auto_correlate(&dead, &data),
            Err(ClusteringError::EmptyFootprint { .. })
        ));
        assert!(matches!(
            corr.find_auto_correlation(&dead, &data),
            Err(ClusteringError::EmptyFootprint { .. })
        ));
        assert!(matches!(
            corr.auto_correlate_pixels(&dead, &data, Some(3)),
            Err(ClusteringError::EmptyFootprint { .. })
        ));
        assert!(matches!(
            corr.cross_correlate_pixels(&live, &dead, &data, &data, Some(3)),
            Err(ClusteringError::EmptyFootprint { .. })
        ));
    }

    #[test]
    fn test_randoms_look_unclustered() {
        let map = patch();
        let data = weighted(map.generate_random_points(1500, false, 14).unwrap());
        let bins = AngularBins::logarithmic(0.5, 4.0, 3).unwrap();
        let config = CorrelationConfig::default()
            .with_random_multiplier(2.0)
            .with_seed(99);
        let mut corr = AngularCorrelation::new(bins, config).unwrap();
        corr.auto_correlate(&map, &data).unwrap();
        for xi in corr.estimate() {
            assert!(xi.value().unwrap().abs() < 0.1);
        }
        for estimator in [Estimator::Hamilton, Estimator::Natural, Estimator::DavisPeebles] {
            assert!(corr.estimate_with(estimator).iter().all(Estimate::is_defined));
        }
    }

    #[test]
    fn test_empty_rr_bin_is_undefined() {
        let map = patch();
        let data = weighted(map.generate_random_points(100, false, 15).unwrap());
        // wider than the footprint: nothing can land in the last bin
        let bins = AngularBins::from_edges(&[0.0, 20.0, 90.0]).unwrap();
        let mut corr = AngularCorrelation::new(bins, CorrelationConfig::default()).unwrap();
        corr.auto_correlate(&map, &data).unwrap();
        let xi = corr.estimate();
        assert!(xi[0].is_defined());
        assert_eq!(xi[1], Estimate::Undefined);
        assert_eq!(corr.results()[1].error, Estimate::Undefined);
    }

    #[test]
    fn test_rr_tolerance_adds_iterations() {
        let map = patch();
        let data = weighted(map.generate_random_points(60, false, 16).unwrap());
        let bins = AngularBins::from_edges(&[0.0, 1.0]).unwrap();

        let mut once = AngularCorrelation::new(bins.clone(), CorrelationConfig::default()).unwrap();
        once.auto_correlate(&map, &data).unwrap();
        let single = once.bins().bins()[0].rr().pairs;

        let config = CorrelationConfig::default().with_rr_tolerance(1e-6, 3);
        let mut more = AngularCorrelation::new(bins, config).unwrap();
        more.auto_correlate(&map, &data).unwrap();
        let rr = more.bins().bins()[0].rr();
        assert!(rr.pairs > single);
        assert_relative_eq!(rr.normalization, 3.0 * 60.0 * 59.0);
    }

    #[test]
    fn test_jackknife_region_bookkeeping() {
        let map = patch();
        let data = weighted(map.generate_random_points(600, false, 17).unwrap());
        let bins = AngularBins::logarithmic(0.3, 3.0, 2).unwrap();
        let config = CorrelationConfig::default().with_regions(4);
        let mut corr = AngularCorrelation::new(bins, config).unwrap();
        corr.auto_correlate(&map, &data).unwrap();
        assert_eq!(corr.n_regions(), 4);

        let regions = corr.regions().unwrap();
        let bin = &corr.bins().bins()[1];
        for r in 0..4u16 {
            let rest: Vec<WeightedAngularCoordinate> = data
                .iter()
                .copied()
                .filter(|p| regions.region_of(p.coordinate()) != Some(r))
                .collect();
            let n = rest.len() as f64;
            let kept = bin.dd().weight - bin.dd().region_weight[r as usize];
            assert_relative_eq!(kept, brute_dd(&rest, bin) as f64, max_relative = 1e-9);
            assert_relative_eq!(bin.dd().region_normalization[r as usize], n * n - n, max_relative = 1e-9);
        }

        let covariance = corr.covariance(Estimator::LandySzalay).unwrap();
        assert_eq!(covariance.len(), 2);
        assert!(covariance[0][0] >= 0.0);
        assert_relative_eq!(covariance[0][1], covariance[1][0], max_relative = 1e-12);
        let errors = corr.errors(Estimator::LandySzalay);
        assert_relative_eq!(errors[1].value().unwrap(), covariance[1][1].sqrt());
        assert!(corr.jackknife_mean(Estimator::LandySzalay).iter().all(Estimate::is_defined));
    }

    #[test]
    fn test_poisson_errors_without_regions() {
        let map = patch();
        let data = weighted(map.generate_random_points(300, false, 18).unwrap());
        let bins = AngularBins::from_edges(&[0.5, 2.0]).unwrap();
        let mut corr = AngularCorrelation::new(bins, CorrelationConfig::default()).unwrap();
        corr.auto_correlate(&map, &data).unwrap();
        assert!(corr.covariance(Estimator::LandySzalay).is_none());
        let xi = corr.estimate()[0].value().unwrap();
        let pairs = corr.bins().bins()[0].dd().pairs as f64;
        assert_relative_eq!(
            corr.errors(Estimator::LandySzalay)[0].value().unwrap(),
            (1.0 + xi) / pairs.sqrt()
        );
    }

    #[test]
    fn test_radial_windows_scale_with_distance() {
        let cosmology = Cosmology::default();
        let c = AngularCoordinate::from_equatorial(10.0, 10.0).unwrap();
        let near = CosmoCoordinate::new(c, 1.0, 0.1, &cosmology).unwrap();
        let far = CosmoCoordinate::new(c, 1.0, 0.5, &cosmology).unwrap();
        let (_, near_hi) = ProjectedMetric::window(&near, 1.0, 10.0).unwrap();
        let (_, far_hi) = ProjectedMetric::window(&far, 1.0, 10.0).unwrap();
        assert!(far_hi < near_hi);
        assert_relative_eq!(near_hi, 10.0 / near.transverse_distance());

        let here = CosmoCoordinate::new(c, 1.0, 0.0, &cosmology).unwrap();
        assert!(ProjectedMetric::window(&here, 1.0, 10.0).is_none());
    }

    #[test]
    fn test_radial_auto_correlation_counts() {
        let cosmology = Cosmology::default();
        let footprint = Map::from_pixels([(Pixel::new(0, 150).unwrap(), 1.0)]).unwrap();
        let data: Vec<CosmoCoordinate> = footprint
            .generate_random_points(300, false, 19)
            .unwrap()
            .into_iter()
            .enumerate()
            .map(|(i, c)| CosmoCoordinate::new(c, 1.0, 0.1 + 0.001 * (i % 50) as f64, &cosmology).unwrap())
            .collect();
        let bins = RadialBins::logarithmic(1.0, 50.0, 4).unwrap();
        let mut corr = RadialCorrelation::new(bins, CorrelationConfig::default()).unwrap();
        corr.auto_correlate(&footprint, &data).unwrap();

        let bin = &corr.bins().bins()[2];
        let expected = data
            .iter()
            .flat_map(|a| data.iter().map(move |b| (a, b)))
            .filter(|(a, b)| a != b && bin.contains(a.projected_distance(b.coordinate())))
            .count() as u64;
        assert_eq!(bin.dd().pairs, expected);
        assert!(corr.estimate().iter().any(Estimate::is_defined));
    }

    #[test]
    fn test_pixel_auto_correlation_fills_pixel_counts() {
        let map = Map::full_sky();
        let data = weighted(map.generate_random_points(20_000, false, 20).unwrap());
        let bins = AngularBins::logarithmic(5.0, 20.0, 2).unwrap();
        let mut corr = AngularCorrelation::new(bins, CorrelationConfig::default()).unwrap();
        corr.auto_correlate_pixels(&map, &data, Some(2)).unwrap();
        for result in corr.results() {
            assert!(result.pixel_xi.value().unwrap().abs() < 0.05);
        }
    }

    #[test]
    fn test_auto_max_level_follows_catalog_size_and_area() {
        assert_eq!(auto_max_level(1_000, 100.0), 8);
        assert_eq!(auto_max_level(500_000, 100.0), 9);
        assert_eq!(auto_max_level(2_000_000, 100.0), 10);
        assert_eq!(auto_max_level(50_000_000, 100.0), 11);
        assert_eq!(auto_max_level(1_000, 5_000.0), 6);
        assert_eq!(auto_max_level(1_999_999, 5_000.0), 7);
        assert_eq!(auto_max_level(9_999_999, 5_000.0), 8);
        assert_eq!(auto_max_level(10_000_000, 41_253.0), 9);
    }

    #[test]
    fn test_pixel_break_level_is_validated() {
        let bins = AngularBins::logarithmic(1.0, 10.0, 2).unwrap();
        let config = CorrelationConfig::default().with_pixel_break(PixelBreak::MaxLevel(MAX_LEVEL + 1));
        assert!(AngularCorrelation::new(bins, config).is_err());
    }

    #[test]
    fn test_find_auto_correlation_splits_pairs_and_pixels() {
        let map = patch();
        let data = weighted(map.generate_random_points(3000, false, 41).unwrap());
        let bins = AngularBins::from_edges(&[0.05, 0.3, 0.6, 2.0, 3.0]).unwrap();
        let mut corr = AngularCorrelation::new(bins, CorrelationConfig::default()).unwrap();
        corr.find_auto_correlation(&map, &data).unwrap();

        let levels: Vec<Option<u8>> = corr.bins().iter().map(Bin::level).collect();
        assert_eq!(levels, vec![None, Some(6), Some(5), Some(4)]);

        let bins = corr.bins().bins();
        assert!(bins[0].dd().pairs > 0);
        assert!(bins[0].rr().pairs > 0);
        assert_eq!(bins[0].pixel().weight, 0.0);
        for bin in &bins[1..] {
            assert_eq!(bin.dd().pairs, 0);
            assert_eq!(bin.rr().pairs, 0);
            assert!(bin.pixel().weight > 0.0);
        }

        let results = corr.results();
        for result in &results[1..] {
            assert_eq!(result.xi, result.pixel_xi);
            assert_eq!(result.error, Estimate::Undefined);
        }
        for result in &results {
            assert!(result.xi.value().unwrap().abs() < 0.5);
        }
    }

    #[test]
    fn test_pairs_only_break_counts_every_bin() {
        let map = patch();
        let data = weighted(map.generate_random_points(800, false, 42).unwrap());
        let bins = AngularBins::from_edges(&[0.3, 0.6, 2.0]).unwrap();
        let config = CorrelationConfig::default().with_pixel_break(PixelBreak::PairsOnly);
        let mut corr = AngularCorrelation::new(bins, config).unwrap();
        corr.find_auto_correlation(&map, &data).unwrap();
        for bin in corr.bins().iter() {
            assert_eq!(bin.level(), None);
            assert!(bin.dd().pairs > 0);
            assert_eq!(bin.pixel().weight, 0.0);
        }
    }

    #[test]
    fn test_pixel_cross_correlation_of_a_catalog_with_itself_matches_auto() {
        let map = patch();
        let first = weighted(map.generate_random_points(2000, false, 43).unwrap());
        let second = weighted(map.generate_random_points(2000, false, 44).unwrap());
        let bins = AngularBins::from_edges(&[1.5, 3.0]).unwrap();

        let mut auto = AngularCorrelation::new(bins.clone(), CorrelationConfig::default()).unwrap();
        auto.auto_correlate_pixels(&map, &first, Some(4)).unwrap();
        let mut same = AngularCorrelation::new(bins.clone(), CorrelationConfig::default()).unwrap();
        same.cross_correlate_pixels(&map, &map, &first, &first, Some(4)).unwrap();
        let a = auto.bins().bins()[0].pixel();
        let b = same.bins().bins()[0].pixel();
        assert_relative_eq!(a.product, b.product, max_relative = 1e-9, epsilon = 1e-12);
        assert_relative_eq!(a.weight, b.weight, max_relative = 1e-9);

        let mut cross = AngularCorrelation::new(bins, CorrelationConfig::default()).unwrap();
        cross.cross_correlate_pixels(&map, &map, &first, &second, Some(4)).unwrap();
        assert_eq!(cross.bins().bins()[0].level(), Some(4));
        assert!(cross.results()[0].pixel_xi.value().unwrap().abs() < 0.1);
    }

    #[test]
    fn test_find_cross_correlation_fills_both_estimators() {
        let map = patch();
        let first = weighted(map.generate_random_points(1500, false, 45).unwrap());
        let second = weighted(map.generate_random_points(1500, false, 46).unwrap());
        let bins = AngularBins::from_edges(&[0.05, 0.3, 2.0, 3.0]).unwrap();
        let mut corr = AngularCorrelation::new(bins, CorrelationConfig::default()).unwrap();
        corr.find_cross_correlation(&map, &first, &second).unwrap();

        let bins = corr.bins().bins();
        assert_eq!(bins[0].level(), None);
        assert!(bins[0].dd().pairs > 0);
        assert_eq!(bins[2].level(), Some(4));
        assert!(bins[2].pixel().weight > 0.0);
        assert!(corr.estimate().iter().all(Estimate::is_defined));
    }
}
