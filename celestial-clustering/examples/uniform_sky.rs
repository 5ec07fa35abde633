//! Angular correlation of an unclustered catalog over a survey cap.
//!
//! Run with `RUST_LOG=debug` to follow the tree building and random
//! iterations.

use celestial_clustering::{
    AngularBins, AngularCoordinate, AngularCorrelation, CircleBound, CorrelationConfig, Estimator,
    Map, WeightedAngularCoordinate,
};
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let center = AngularCoordinate::from_equatorial(185.0, 30.0)?;
    let footprint = Map::from_bound(&CircleBound::new(center, 20.0)?, 8)?;
    println!(
        "footprint: {} pixels, {:.1} deg^2",
        footprint.len(),
        footprint.area()
    );

    let catalog = footprint
        .generate_random_points(20_000, false, 42)?
        .into_iter()
        .map(|c| WeightedAngularCoordinate::new(c, 1.0))
        .collect::<Result<Vec<_>, _>>()?;

    let bins = AngularBins::per_decade(0.05, 10.0, 4)?;
    let config = CorrelationConfig::default()
        .with_random_multiplier(2.0)
        .with_rr_tolerance(0.01, 4)
        .with_regions(10);
    let mut correlation = AngularCorrelation::new(bins, config)?;
    correlation.auto_correlate(&footprint, &catalog)?;

    let natural = correlation.estimate_with(Estimator::Natural);
    println!(
        "{:>10} {:>10} {:>10} {:>10} {:>10}",
        "theta", "w(LS)", "error", "w(PH)", "DD"
    );
    for (result, ph) in correlation.results().iter().zip(natural) {
        println!(
            "{:>10.4} {:>10.4} {:>10.4} {:>10.4} {:>10}",
            result.center,
            result.xi.value().unwrap_or(f64::NAN),
            result.error.value().unwrap_or(f64::NAN),
            ph.value().unwrap_or(f64::NAN),
            result.dd_pairs
        );
    }
    Ok(())
}
