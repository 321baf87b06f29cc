//! Built-in effect models and the helpers they share.

mod crosstalk;
mod eor;
mod foregrounds;
mod noise;
mod rfi;
mod sigchain;

pub use crosstalk::{CrossCouplingCrosstalk, CrossCouplingParams, WhiteNoiseCrosstalk, WhiteNoiseCrosstalkParams};
pub use eor::{NoiselikeEor, NoiselikeEorParams};
pub use foregrounds::{DiffuseForeground, DiffuseForegroundParams, PointSourceForeground, PointSourceParams};
pub use noise::{ThermalNoise, ThermalNoiseParams};
pub use rfi::{RfiScatter, RfiScatterParams};
pub use sigchain::{Bandpass, BandpassParams, Reflections, ReflectionParams};

use crate::error::SimError;
use crate::model::{ModelError, Params};
use crate::registry::ModelRegistry;
use crate::types::{BOLTZMANN, SPEED_OF_LIGHT};
use ndarray::{Array1, Array2};
use num_complex::Complex64;
use rand::Rng;
use rand_distr::{Distribution, StandardNormal};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::f64::consts::{PI, TAU};

/// Registers every built-in model.
pub fn register_builtins(registry: &mut ModelRegistry) {
    registry.register("diffuse_foreground", &["DiffuseForeground"], DiffuseForeground::from_params);
    registry.register("pntsrc_foreground", &["PointSourceForeground"], PointSourceForeground::from_params);
    registry.register("noiselike_eor", &["NoiselikeEoR"], NoiselikeEor::from_params);
    registry.register("thermal_noise", &["ThermalNoise"], ThermalNoise::from_params);
    registry.register("rfi_scatter", &["RfiScatter"], RfiScatter::from_params);
    registry.register("gains", &["Bandpass", "bandpass"], Bandpass::from_params);
    registry.register("reflections", &["Reflections", "sigchain_reflections"], Reflections::from_params);
    registry.register("whitenoise_xtalk", &["WhiteNoiseCrosstalk", "gen_whitenoise_xtalk"], WhiteNoiseCrosstalk::from_params);
    registry.register("cross_coupling_xtalk", &["CrossCouplingCrosstalk", "gen_cross_coupling_xtalk"], CrossCouplingCrosstalk::from_params);
}

/// Deserializes a model's parameter struct.
pub(crate) fn parse_params<T: DeserializeOwned>(component: &str, params: &Params) -> Result<T, SimError> {
    serde_json::from_value(serde_json::Value::Object(params.clone())).map_err(|source| SimError::InvalidParams {
        component: component.to_string(),
        source,
    })
}

/// Serializes a model's parameter struct for the ledger.
pub(crate) fn to_params<T: Serialize>(params: &T) -> Params {
    match serde_json::to_value(params) {
        Ok(serde_json::Value::Object(map)) => map,
        _ => Params::new(),
    }
}

/// Sky temperature in Kelvin as a function of frequency.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SkyTemperature {
    Constant(f64),
    /// `t0 * (f / f0)^index`
    PowerLaw { t0: f64, f0: f64, index: f64 },
}

impl SkyTemperature {
    /// Shape (n_times, n_freqs).
    pub fn evaluate(&self, n_times: usize, freqs: &[f64]) -> Array2<f64> {
        Array2::from_shape_fn((n_times, freqs.len()), |(_, f)| match *self {
            SkyTemperature::Constant(t) => t,
            SkyTemperature::PowerLaw { t0, f0, index } => t0 * (freqs[f] / f0).powf(index),
        })
    }
}

/// Beam solid angle in steradians.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BeamArea {
    Constant(f64),
    PerChannel(Vec<f64>),
}

impl BeamArea {
    pub fn evaluate(&self, freqs: &[f64]) -> Result<Array1<f64>, ModelError> {
        match self {
            BeamArea::Constant(omega) => Ok(Array1::from_elem(freqs.len(), *omega)),
            BeamArea::PerChannel(values) if values.len() == freqs.len() => Ok(Array1::from_vec(values.clone())),
            BeamArea::PerChannel(values) => Err(ModelError::Invalid(format!(
                "omega_p has {} channels, data has {}",
                values.len(),
                freqs.len()
            ))),
        }
    }
}

/// Complex white noise with unit variance, shape (n_times, n_freqs).
pub fn white_noise<R: Rng + ?Sized>(shape: (usize, usize), rng: &mut R) -> Array2<Complex64> {
    Array2::from_shape_simple_fn(shape, || {
        let re: f64 = StandardNormal.sample(rng);
        let im: f64 = StandardNormal.sample(rng);
        Complex64::new(re, im) / 2f64.sqrt()
    })
}

/// Kelvin per Jansky for frequencies in GHz and beam areas in steradians.
pub fn jy_to_kelvin(freqs: &[f64], omega_p: &Array1<f64>) -> Array1<f64> {
    Array1::from_iter(freqs.iter().zip(omega_p.iter()).map(|(f, omega)| {
        let lambda = SPEED_OF_LIGHT / (f * 1e9);
        1e-26 * lambda * lambda / (2.0 * BOLTZMANN * omega)
    }))
}

/// Hour angles wrapped to [-pi, pi).
pub fn hour_angles(lsts: &[f64], ra: f64) -> Array1<f64> {
    Array1::from_iter(lsts.iter().map(|lst| (lst - ra + PI).rem_euclid(TAU) - PI))
}

/// Integration time in seconds implied by the LST step.
pub(crate) fn integration_time_from_lsts(lsts: &[f64]) -> Option<f64> {
    if lsts.len() < 2 {
        return None;
    }
    Some((lsts[1] - lsts[0]).rem_euclid(TAU) / TAU * crate::types::SIDEREAL_DAY_S)
}

/// Uniform draw from `[lo, hi)`, or `lo` when the range is empty.
pub(crate) fn uniform<R: Rng + ?Sized>(rng: &mut R, (lo, hi): (f64, f64)) -> f64 {
    if hi > lo {
        rng.gen_range(lo..hi)
    } else {
        lo
    }
}
