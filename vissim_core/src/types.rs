//! Identifiers shared across the engine: antennas, feeds, polarizations,
//! baselines.

use crate::error::SimError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Antenna number.
pub type AntNum = u32;

/// pyuvdata-style baseline integer.
pub type BaselineInt = u64;

/// (ant1, ant2, pol) identifying one baseline/polarization's samples.
pub type AntPairPol = (AntNum, AntNum, Polarization);

/// Speed of light in m/s.
pub const SPEED_OF_LIGHT: f64 = 299_792_458.0;

/// Length of a sidereal day in seconds.
pub const SIDEREAL_DAY_S: f64 = 86_164.0905;

/// Boltzmann constant in J/K.
pub const BOLTZMANN: f64 = 1.380_649e-23;

/// Largest antenna number the baseline integer can encode.
pub const MAX_ANTNUM: AntNum = 2047;

/// Converts antenna numbers to a baseline integer.
///
/// Uses `2048 * (a1 + 1) + (a2 + 1) + 2^16` for every array so that ordering
/// is consistent regardless of array size. Only unique for antenna numbers up
/// to [`MAX_ANTNUM`].
pub fn antnums_to_baseline(ant1: AntNum, ant2: AntNum) -> BaselineInt {
    2048 * (ant1 as u64 + 1) + (ant2 as u64 + 1) + (1 << 16)
}

/// Inverse of [`antnums_to_baseline`]. `None` for integers no antenna pair
/// encodes to.
pub fn baseline_to_antnums(bl: BaselineInt) -> Option<(AntNum, AntNum)> {
    let rest = bl.checked_sub((1 << 16) + 1)?;
    let ant2 = rest % 2048;
    let ant1 = (rest / 2048).checked_sub(1)?;
    if ant1 > MAX_ANTNUM as u64 {
        return None;
    }
    Some((ant1 as AntNum, ant2 as AntNum))
}

/// Converts a length in metres to light-nanoseconds.
pub fn meters_to_ns(meters: f64) -> f64 {
    meters / SPEED_OF_LIGHT * 1e9
}

/// A single receiver feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Feed {
    X,
    Y,
    E,
    N,
}

impl Feed {
    pub fn as_char(&self) -> char {
        match self {
            Feed::X => 'x',
            Feed::Y => 'y',
            Feed::E => 'e',
            Feed::N => 'n',
        }
    }
}

impl fmt::Display for Feed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_char())
    }
}

/// Visibility polarization: an ordered pair of feeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Polarization {
    Xx,
    Xy,
    Yx,
    Yy,
    Ee,
    En,
    Ne,
    Nn,
}

impl Polarization {
    /// Returns the (first, second) feeds of this polarization.
    pub fn feeds(&self) -> (Feed, Feed) {
        match self {
            Polarization::Xx => (Feed::X, Feed::X),
            Polarization::Xy => (Feed::X, Feed::Y),
            Polarization::Yx => (Feed::Y, Feed::X),
            Polarization::Yy => (Feed::Y, Feed::Y),
            Polarization::Ee => (Feed::E, Feed::E),
            Polarization::En => (Feed::E, Feed::N),
            Polarization::Ne => (Feed::N, Feed::E),
            Polarization::Nn => (Feed::N, Feed::N),
        }
    }

    /// Returns the polarization string.
    pub fn name(&self) -> &'static str {
        match self {
            Polarization::Xx => "xx",
            Polarization::Xy => "xy",
            Polarization::Yx => "yx",
            Polarization::Yy => "yy",
            Polarization::Ee => "ee",
            Polarization::En => "en",
            Polarization::Ne => "ne",
            Polarization::Nn => "nn",
        }
    }
}

impl fmt::Display for Polarization {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Polarization {
    type Err = SimError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "xx" => Ok(Polarization::Xx),
            "xy" => Ok(Polarization::Xy),
            "yx" => Ok(Polarization::Yx),
            "yy" => Ok(Polarization::Yy),
            "ee" => Ok(Polarization::Ee),
            "en" => Ok(Polarization::En),
            "ne" => Ok(Polarization::Ne),
            "nn" => Ok(Polarization::Nn),
            _ => Err(SimError::UnknownPolarization(s.to_string())),
        }
    }
}
