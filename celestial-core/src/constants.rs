#[allow(clippy::excessive_precision)]
#[allow(clippy::approx_constant)]
pub const PI: f64 = 3.141592653589793238462643;

#[allow(clippy::excessive_precision)]
#[allow(clippy::approx_constant)]
pub const HALF_PI: f64 = 1.5707963267948966192313216;

#[allow(clippy::excessive_precision)]
#[allow(clippy::approx_constant)]
pub const TWOPI: f64 = 6.283185307179586476925287;

#[allow(clippy::excessive_precision)]
pub const DEG_TO_RAD: f64 = 1.745329251994329576923691e-2;

#[allow(clippy::excessive_precision)]
pub const RAD_TO_DEG: f64 = 57.29577951308232087679815;

/// Square degrees per steradian, (180/π)².
#[allow(clippy::excessive_precision)]
pub const STRAD_TO_DEG2: f64 = 3282.806350011743794781694;

/// Area of the whole sphere in square degrees, 4π (180/π)².
#[allow(clippy::excessive_precision)]
pub const FULL_SKY_DEG2: f64 = 41252.96124941927103129646;

/// Speed of light in km/s.
pub const SPEED_OF_LIGHT_KM_S: f64 = 299_792.458;

/// Hubble distance c/H0 in Mpc/h (H0 = 100 h km/s/Mpc).
pub const HUBBLE_DISTANCE_MPC_H: f64 = SPEED_OF_LIGHT_KM_S / 100.0;

/// Declination-like angle of the SDSS survey pole, in degrees.
pub const SURVEY_ETA_POLE_DEG: f64 = 32.5;

/// Right ascension of the SDSS survey node, in degrees.
pub const SURVEY_NODE_DEG: f64 = 95.0;

/// Rotation taking ICRS unit vectors into galactic unit vectors (rows are
/// the galactic axes expressed in ICRS).
#[allow(clippy::excessive_precision)]
pub const ICRS_TO_GALACTIC: [[f64; 3]; 3] = [
    [
        -0.054875560416215368492398900454,
        -0.873437090234885048760383168409,
        -0.483835015548713226831774175116,
    ],
    [
        0.494109427875583673525222371358,
        -0.444829629960011178146614061616,
        0.746982244497218890527388004556,
    ],
    [
        -0.867666149019004701181616534570,
        -0.198076373431201528180486091412,
        0.455983776175066922272100478348,
    ],
];
