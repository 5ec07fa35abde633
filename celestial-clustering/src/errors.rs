use celestial_core::AstroError;
use thiserror::Error;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

pub type ClusteringResult<T> = Result<T, ClusteringError>;

#[derive(Debug, Error, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ClusteringError {
    #[error("Resolution level {level} exceeds the maximum supported level {max}")]
    ResolutionExceeded { level: u8, max: u8 },

    #[error("Pixel {index} at level {level} is at the maximum resolution and cannot be subdivided")]
    NotSubdivisible { level: u8, index: u64 },

    #[error("Invalid pixel: {message}")]
    InvalidPixel { message: String },

    #[error("Out of bounds: {message}")]
    OutOfBounds { message: String },

    #[error("Invalid bin edges: {message}")]
    InvalidBinEdges { message: String },

    #[error("Invalid coordinate: {message}")]
    InvalidCoordinate { message: String },

    #[error("Invalid weight {weight}: {message}")]
    InvalidWeight { weight: f64, message: String },

    #[error("Empty footprint: {message}")]
    EmptyFootprint { message: String },

    #[error("Empty catalog: {message}")]
    EmptyCatalog { message: String },

    #[error("Incompatible maps: {message}")]
    IncompatibleMaps { message: String },

    #[error("Regionation failed: {message}")]
    Regionation { message: String },

    #[error("Invalid cosmology: {message}")]
    InvalidCosmology { message: String },

    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    #[error("Core geometry calculation failed: {message}")]
    CoreError { message: String },
}

impl ClusteringError {
    pub fn invalid_pixel(message: impl Into<String>) -> Self {
        Self::InvalidPixel {
            message: message.into(),
        }
    }

    pub fn out_of_bounds(message: impl Into<String>) -> Self {
        Self::OutOfBounds {
            message: message.into(),
        }
    }

    pub fn invalid_bin_edges(message: impl Into<String>) -> Self {
        Self::InvalidBinEdges {
            message: message.into(),
        }
    }

    pub fn invalid_coordinate(message: impl Into<String>) -> Self {
        Self::InvalidCoordinate {
            message: message.into(),
        }
    }

    pub fn invalid_weight(weight: f64, message: impl Into<String>) -> Self {
        Self::InvalidWeight {
            weight,
            message: message.into(),
        }
    }

    pub fn empty_footprint(message: impl Into<String>) -> Self {
        Self::EmptyFootprint {
            message: message.into(),
        }
    }

    pub fn empty_catalog(message: impl Into<String>) -> Self {
        Self::EmptyCatalog {
            message: message.into(),
        }
    }

    pub fn incompatible_maps(message: impl Into<String>) -> Self {
        Self::IncompatibleMaps {
            message: message.into(),
        }
    }

    pub fn regionation(message: impl Into<String>) -> Self {
        Self::Regionation {
            message: message.into(),
        }
    }

    pub fn invalid_cosmology(message: impl Into<String>) -> Self {
        Self::InvalidCosmology {
            message: message.into(),
        }
    }

    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    pub fn from_core(error: AstroError) -> Self {
        Self::CoreError {
            message: error.to_string(),
        }
    }
}

impl From<AstroError> for ClusteringError {
    fn from(error: AstroError) -> Self {
        Self::from_core(error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use celestial_core::MathErrorKind;

    #[test]
    fn test_resolution_exceeded_message() {
        let err = ClusteringError::ResolutionExceeded { level: 20, max: 15 };
        assert!(err.to_string().contains("level 20"));
        assert!(err.to_string().contains("15"));
    }

    #[test]
    fn test_from_core_error() {
        let core = AstroError::math_error("validate_latitude", MathErrorKind::OutOfRange, "91");
        let err: ClusteringError = core.into();
        assert!(matches!(err, ClusteringError::CoreError { .. }));
        assert!(err.to_string().contains("validate_latitude"));
    }

    #[test]
    fn test_invalid_weight_carries_value() {
        let err = ClusteringError::invalid_weight(-1.0, "negative");
        assert!(err.to_string().contains("-1"));
    }
}
