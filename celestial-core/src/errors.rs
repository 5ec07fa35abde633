//! Error types for spherical geometry calculations.
//!
//! [`AstroError`] covers the failure modes of the geometry layer: invalid
//! numerical input and degenerate constructions.
//!
//! # Error Categories
//!
//! | Variant | Use Case |
//! |---------|----------|
//! | [`MathError`](AstroError::MathError) | Non-finite input, out-of-range angles, zero-length vectors |
//! | [`CalculationError`](AstroError::CalculationError) | Degenerate geometry (collinear polygon vertices, empty samplers) |
//!
//! # Usage
//!
//! Functions return [`AstroResult<T>`], which is `Result<T, AstroError>`.
//! Use the constructor methods for consistent error creation:
//!
//! ```
//! use celestial_core::{AstroError, MathErrorKind};
//!
//! fn checked_latitude(lat_deg: f64) -> Result<f64, AstroError> {
//!     if !(-90.0..=90.0).contains(&lat_deg) {
//!         return Err(AstroError::math_error(
//!             "checked_latitude",
//!             MathErrorKind::OutOfRange,
//!             "latitude outside [-90, 90]",
//!         ));
//!     }
//!     Ok(lat_deg)
//! }
//! ```

use thiserror::Error;

/// Classification of mathematical errors.
#[derive(Debug, Clone, PartialEq)]
pub enum MathErrorKind {
    /// Attempted division by zero or near-zero value.
    DivisionByZero,
    /// Input value is invalid for the operation.
    InvalidInput,
    /// Input is NaN or infinity.
    NotFinite,
    /// Value outside valid domain (e.g., latitude > 90°).
    OutOfRange,
    /// Geometry collapses (zero-length vector, coincident vertices).
    Degenerate,
}

/// Unified error type for the geometry layer.
#[derive(Error, Debug)]
pub enum AstroError {
    /// Numerical computation failure.
    #[error("Math error in {operation} ({kind:?}): {message}")]
    MathError {
        operation: String,
        kind: MathErrorKind,
        message: String,
    },

    /// Algorithm or calculation failure.
    #[error("Calculation error in {context}: {message}")]
    CalculationError { context: String, message: String },
}

/// Convenience alias for `Result<T, AstroError>`.
pub type AstroResult<T> = Result<T, AstroError>;

impl AstroError {
    /// Creates a [`MathError`](Self::MathError) with the given kind.
    pub fn math_error(operation: &str, kind: MathErrorKind, reason: &str) -> Self {
        Self::MathError {
            operation: operation.to_string(),
            kind,
            message: reason.to_string(),
        }
    }

    /// Creates a [`CalculationError`](Self::CalculationError).
    pub fn calculation_error(context: &str, reason: &str) -> Self {
        Self::CalculationError {
            context: context.to_string(),
            message: reason.to_string(),
        }
    }

    /// Returns the [`MathErrorKind`] if this is a math error.
    pub fn math_kind(&self) -> Option<&MathErrorKind> {
        match self {
            Self::MathError { kind, .. } => Some(kind),
            Self::CalculationError { .. } => None,
        }
    }
}
