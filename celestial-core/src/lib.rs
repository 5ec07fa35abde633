//! Geometry foundations for sky pixelization and clustering statistics.
//!
//! Everything above this crate (pixels, footprint maps, point trees,
//! correlation estimators) reduces its spherical math to the primitives here.
//!
//! # Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`constants`] | Angle conversions, sphere area, survey frame and galactic pole constants |
//! | [`errors`] | [`AstroError`], [`MathErrorKind`], [`AstroResult`] |
//! | [`math`] | Simpson integration |
//! | [`matrix`] | [`Vector3`] and [`RotationMatrix3`] |
//! | [`spherical`] | Great-circle distance, position angle, polygon and cap areas |
//! | [`random`] | [`SkyRng`], the seeded sampler behind every synthetic catalog |
//! | [`utils`] | Angle wrapping and validation |
//!
//! # Features
//!
//! - **`serde`**: derives `Serialize`/`Deserialize` on the value types.

pub mod constants;
pub mod errors;
pub mod math;
pub mod matrix;
pub mod random;
pub mod spherical;
pub mod utils;

pub use errors::{AstroError, AstroResult, MathErrorKind};
pub use matrix::{RotationMatrix3, Vector3};
pub use random::SkyRng;
pub use spherical::{CapOverlap, SphericalPolygon};
