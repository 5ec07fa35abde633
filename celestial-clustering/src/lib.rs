//! Hierarchical sky pixelization, survey footprints and two-point
//! correlation functions.
//!
//! Coordinates are assigned to [`Pixel`]s of a nested equal-area grid.
//! Footprints are weighted pixel sets ([`Map`]), scalar fields live on a
//! single level ([`ScalarMap`]), and catalogs are indexed by pixel-aligned
//! point trees ([`TreeMap`]). A [`Correlation`] counts pairs through those
//! trees against random catalogs drawn from the footprint.
//!
//! ```
//! use celestial_clustering::{AngularBins, AngularCorrelation, CorrelationConfig, Map};
//! use celestial_clustering::{CatalogPoint, WeightedAngularCoordinate};
//!
//! let map = Map::full_sky();
//! let catalog: Vec<WeightedAngularCoordinate> = map
//!     .generate_random_points(500, false, 7)?
//!     .into_iter()
//!     .map(|c| WeightedAngularCoordinate::new(c, 1.0))
//!     .collect::<Result<_, _>>()?;
//!
//! let bins = AngularBins::logarithmic(1.0, 10.0, 4)?;
//! let mut correlation = AngularCorrelation::new(bins, CorrelationConfig::default())?;
//! correlation.auto_correlate(&map, &catalog)?;
//! assert_eq!(correlation.results().len(), 4);
//! assert_eq!(catalog[0].weight(), 1.0);
//! # Ok::<(), celestial_clustering::ClusteringError>(())
//! ```
//!
//! # Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`coordinate`] | [`AngularCoordinate`] in survey, equatorial and galactic frames; catalog point types |
//! | [`pixel`] | [`Pixel`] addressing, containment, neighbours, annulus searches |
//! | [`bounds`] | Circle, annulus and polygon regions for building footprints |
//! | [`map`] | [`Map`] footprints: normalization, set algebra, random points |
//! | [`scalar_map`] | [`ScalarMap`] fields, overdensities, pixel correlations |
//! | [`region`] | [`RegionMap`] jackknife regions |
//! | [`tree`] | [`TreePixel`] and [`TreeMap`] point indexes |
//! | [`bins`] | [`AngularBins`] and [`RadialBins`] with their pair counts |
//! | [`estimator`] | Landy-Szalay and the other pair-count estimators |
//! | [`correlation`] | [`AngularCorrelation`] and [`RadialCorrelation`] |
//! | [`cosmology`] | Distances for the projected radial metric |
//! | [`errors`] | [`ClusteringError`], [`ClusteringResult`] |
//!
//! # Features
//!
//! - **`serde`**: derives `Serialize`/`Deserialize` on coordinates, pixels,
//!   pair counts, configuration and results.

pub mod bins;
pub mod bounds;
pub mod coordinate;
pub mod correlation;
pub mod cosmology;
pub mod errors;
pub mod estimator;
pub mod map;
pub mod pixel;
pub mod region;
pub mod scalar_map;
pub mod tree;

pub use bins::{AngularBins, Bin, BinSet, PairCounts, RadialBins};
pub use bounds::{AnnulusBound, Bound, CircleBound, PolygonBound};
pub use coordinate::{
    AngularCoordinate, CatalogPoint, CosmoCoordinate, Frame, WeightedAngularCoordinate,
};
pub use correlation::{
    auto_max_level, AngularCorrelation, AngularMetric, BinResult, Correlation,
    CorrelationConfig, PixelBreak, ProjectedMetric, RadialCorrelation, SeparationMetric,
};
pub use cosmology::Cosmology;
pub use errors::{ClusteringError, ClusteringResult};
pub use estimator::{Estimate, Estimator};
pub use map::{Map, PixelMap};
pub use pixel::{Pixel, MAX_LEVEL};
pub use region::RegionMap;
pub use scalar_map::{FieldKind, ScalarMap};
pub use tree::{ITreePixel, TreeMap, TreePixel};
