//! Pair-count estimators of the two-point correlation function.
//!
//! Each estimator takes the four normalized pair counts of a bin (data-data,
//! data-random, random-data, random-random) and returns ξ. For an
//! auto-correlation DR and RD are the same count.
//!
//! | Estimator | ξ |
//! |-----------|---|
//! | Landy-Szalay | (DD − DR − RD + RR) / RR |
//! | Hamilton | DD·RR / (DR·RD) − 1 |
//! | Natural (Peebles-Hauser) | DD / RR − 1 |
//! | Davis-Peebles | DD / DR − 1 |

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Estimator {
    #[default]
    LandySzalay,
    Hamilton,
    Natural,
    DavisPeebles,
}

/// A correlation value, or `Undefined` where its denominator vanished.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Estimate {
    Defined(f64),
    #[default]
    Undefined,
}

impl Estimate {
    pub fn value(&self) -> Option<f64> {
        match self {
            Estimate::Defined(v) => Some(*v),
            Estimate::Undefined => None,
        }
    }

    pub fn is_defined(&self) -> bool {
        matches!(self, Estimate::Defined(_))
    }

    fn ratio(numerator: f64, denominator: f64) -> Self {
        if denominator == 0.0 || !denominator.is_finite() || !numerator.is_finite() {
            Estimate::Undefined
        } else {
            Estimate::Defined(numerator / denominator)
        }
    }

    pub(crate) fn map(self, f: impl FnOnce(f64) -> f64) -> Self {
        match self {
            Estimate::Defined(v) => Estimate::Defined(f(v)),
            Estimate::Undefined => Estimate::Undefined,
        }
    }
}

impl From<Option<f64>> for Estimate {
    fn from(value: Option<f64>) -> Self {
        match value {
            Some(v) if v.is_finite() => Estimate::Defined(v),
            _ => Estimate::Undefined,
        }
    }
}

impl Estimator {
    /// ξ from normalized counts. A bin without random pairs is `Undefined`
    /// whichever estimator is asked for.
    pub fn apply(&self, dd: f64, dr: f64, rd: f64, rr: f64) -> Estimate {
        if rr == 0.0 {
            return Estimate::Undefined;
        }
        match self {
            Estimator::LandySzalay => Estimate::ratio(dd - dr - rd + rr, rr),
            Estimator::Hamilton => Estimate::ratio(dd * rr, dr * rd).map(|v| v - 1.0),
            Estimator::Natural => Estimate::ratio(dd, rr).map(|v| v - 1.0),
            Estimator::DavisPeebles => Estimate::ratio(dd, dr).map(|v| v - 1.0),
        }
    }
}
