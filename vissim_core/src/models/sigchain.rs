//! Signal-chain effects: bandpass gains and cable reflections.
//!
//! Both are multiplicative and return one gain per antenna for the feed being
//! simulated.

use super::{parse_params, to_params, uniform};
use crate::error::SimError;
use crate::model::{EffectModel, ModelError, ModelInputs, ModelOutput, ParamRole, Params};
use crate::types::AntNum;
use ndarray::{Array1, Array2};
use num_complex::Complex64;
use rand::RngCore;
use rand_distr::{Distribution, StandardNormal};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::f64::consts::TAU;

fn broadcast(n_times: usize, spectrum: &Array1<Complex64>) -> Array2<Complex64> {
    Array2::from_shape_fn((n_times, spectrum.len()), |(_, f)| spectrum[f])
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BandpassParams {
    /// Fractional per-antenna amplitude scatter
    pub gain_spread: f64,

    /// Range of per-antenna delays (ns)
    pub dly_rng: (f64, f64),

    /// Polynomial in frequency (GHz), highest power first; empty means flat
    pub bp_poly: Vec<f64>,
}

impl Default for BandpassParams {
    fn default() -> Self {
        Self {
            gain_spread: 0.1,
            dly_rng: (-20.0, 20.0),
            bp_poly: Vec::new(),
        }
    }
}

/// Per-antenna bandpass amplitude times a random delay phase.
#[derive(Debug, Clone, Default)]
pub struct Bandpass {
    pub params: BandpassParams,
}

impl Bandpass {
    pub fn new(params: BandpassParams) -> Self {
        Self { params }
    }

    pub fn from_params(params: &Params) -> Result<Box<dyn EffectModel>, SimError> {
        Ok(Box::new(Self::new(parse_params("gains", params)?)))
    }

    fn base_bandpass(&self, freqs: &[f64]) -> Array1<f64> {
        if self.params.bp_poly.is_empty() {
            return Array1::ones(freqs.len());
        }
        Array1::from_iter(
            freqs
                .iter()
                .map(|f| self.params.bp_poly.iter().fold(0.0, |acc, c| acc * f + c)),
        )
    }
}

impl EffectModel for Bandpass {
    fn name(&self) -> &str {
        "gains"
    }

    fn is_multiplicative(&self) -> Option<bool> {
        Some(true)
    }

    fn roles(&self) -> &[ParamRole] {
        &[ParamRole::Freqs, ParamRole::AntennaPositions]
    }

    fn default_params(&self) -> Params {
        to_params(&self.params)
    }

    fn simulate(&self, inputs: &ModelInputs<'_>, rng: &mut dyn RngCore) -> Result<ModelOutput, ModelError> {
        let antpos = inputs.require_antpos()?;
        let base = self.base_bandpass(inputs.freqs);

        let mut gains = BTreeMap::new();
        for &ant in antpos.keys() {
            let z: f64 = StandardNormal.sample(rng);
            let amp = 1.0 + self.params.gain_spread * z;
            let dly = uniform(rng, self.params.dly_rng);
            let spectrum = Array1::from_iter(
                inputs
                    .freqs
                    .iter()
                    .zip(base.iter())
                    .map(|(f, b)| Complex64::from_polar(amp * b, TAU * dly * f)),
            );
            gains.insert(ant, broadcast(inputs.lsts.len(), &spectrum));
        }
        Ok(ModelOutput::Gains(gains))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReflectionParams {
    /// Reflection amplitude; drawn per antenna from `amp_rng` when absent
    pub amp: Option<f64>,

    /// Reflection delay (ns); drawn per antenna from `dly_rng` when absent
    pub dly: Option<f64>,

    /// Reflection phase (cycles); drawn per antenna from [0, 1) when absent
    pub phs: Option<f64>,

    pub amp_rng: (f64, f64),
    pub dly_rng: (f64, f64),

    /// Conjugate the reflection term
    pub conj: bool,
}

impl Default for ReflectionParams {
    fn default() -> Self {
        Self {
            amp: None,
            dly: None,
            phs: None,
            amp_rng: (0.0, 1e-2),
            dly_rng: (200.0, 300.0),
            conj: false,
        }
    }
}

/// `1 + amp * exp(2 pi i (dly * f + phs))` per antenna.
#[derive(Debug, Clone, Default)]
pub struct Reflections {
    pub params: ReflectionParams,
}

impl Reflections {
    pub fn new(params: ReflectionParams) -> Self {
        Self { params }
    }

    pub fn from_params(params: &Params) -> Result<Box<dyn EffectModel>, SimError> {
        Ok(Box::new(Self::new(parse_params("reflections", params)?)))
    }
}

impl EffectModel for Reflections {
    fn name(&self) -> &str {
        "reflections"
    }

    fn is_multiplicative(&self) -> Option<bool> {
        Some(true)
    }

    fn roles(&self) -> &[ParamRole] {
        &[ParamRole::Freqs, ParamRole::AntennaPositions]
    }

    fn default_params(&self) -> Params {
        to_params(&self.params)
    }

    fn simulate(&self, inputs: &ModelInputs<'_>, rng: &mut dyn RngCore) -> Result<ModelOutput, ModelError> {
        let p = &self.params;
        let antpos = inputs.require_antpos()?;

        let mut gains: BTreeMap<AntNum, Array2<Complex64>> = BTreeMap::new();
        for &ant in antpos.keys() {
            let amp = p.amp.unwrap_or_else(|| uniform(rng, p.amp_rng));
            let dly = p.dly.unwrap_or_else(|| uniform(rng, p.dly_rng));
            let phs = p.phs.unwrap_or_else(|| uniform(rng, (0.0, 1.0)));

            let spectrum = Array1::from_iter(inputs.freqs.iter().map(|f| {
                let term = Complex64::from_polar(amp, TAU * (dly * f + phs));
                Complex64::new(1.0, 0.0) + if p.conj { term.conj() } else { term }
            }));
            gains.insert(ant, broadcast(inputs.lsts.len(), &spectrum));
        }
        Ok(ModelOutput::Gains(gains))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::Vector3;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn antpos() -> BTreeMap<AntNum, Vector3<f64>> {
        (0..3).map(|i| (i, Vector3::new(i as f64 * 14.6, 0.0, 0.0))).collect()
    }

    fn gains(model: &dyn EffectModel, seed: u64) -> BTreeMap<AntNum, Array2<Complex64>> {
        let lsts = [0.0, 0.1, 0.2];
        let freqs = [0.1, 0.15, 0.2];
        let ants = antpos();
        let mut inputs = ModelInputs::new(&lsts, &freqs);
        inputs.antpos = Some(&ants);
        match model.simulate(&inputs, &mut ChaCha8Rng::seed_from_u64(seed)).unwrap() {
            ModelOutput::Gains(g) => g,
            ModelOutput::Vis(_) => panic!("expected gains"),
        }
    }

    #[test]
    fn test_flat_bandpass_is_unity() {
        let model = Bandpass::new(BandpassParams {
            gain_spread: 0.0,
            dly_rng: (0.0, 0.0),
            bp_poly: Vec::new(),
        });
        let g = gains(&model, 0);
        assert_eq!(g.len(), 3);
        for gain in g.values() {
            assert_eq!(gain.dim(), (3, 3));
            assert!(gain.iter().all(|v| (*v - Complex64::new(1.0, 0.0)).norm() < 1e-12));
        }
    }

    #[test]
    fn test_bandpass_poly() {
        let model = Bandpass::new(BandpassParams {
            gain_spread: 0.0,
            dly_rng: (0.0, 0.0),
            bp_poly: vec![2.0, 1.0],
        });
        let g = gains(&model, 0);
        assert_relative_eq!(g[&0][[0, 1]].re, 2.0 * 0.15 + 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_bandpass_constant_in_time() {
        let g = gains(&Bandpass::default(), 11);
        for gain in g.values() {
            assert_eq!(gain.row(0), gain.row(2));
        }
        assert_ne!(g[&0], g[&1]);
    }

    #[test]
    fn test_fixed_reflection() {
        let model = Reflections::new(ReflectionParams {
            amp: Some(0.1),
            dly: Some(100.0),
            phs: Some(0.25),
            ..Default::default()
        });
        let g = gains(&model, 0);
        let f = 0.15;
        let expected = Complex64::new(1.0, 0.0) + Complex64::from_polar(0.1, TAU * (100.0 * f + 0.25));
        assert_relative_eq!(g[&2][[1, 1]].re, expected.re, epsilon = 1e-12);
        assert_relative_eq!(g[&2][[1, 1]].im, expected.im, epsilon = 1e-12);
    }

    #[test]
    fn test_conjugated_reflection() {
        let params = ReflectionParams {
            amp: Some(0.1),
            dly: Some(100.0),
            phs: Some(0.0),
            ..Default::default()
        };
        let plain = gains(&Reflections::new(params.clone()), 0);
        let conj = gains(&Reflections::new(ReflectionParams { conj: true, ..params }), 0);
        assert_relative_eq!(plain[&0][[0, 0]].im, -conj[&0][[0, 0]].im, epsilon = 1e-12);
    }

    #[test]
    fn test_requires_antenna_positions() {
        let lsts = [0.0];
        let freqs = [0.1];
        let err = Reflections::default()
            .simulate(&ModelInputs::new(&lsts, &freqs), &mut ChaCha8Rng::seed_from_u64(0))
            .unwrap_err();
        assert!(matches!(err, ModelError::MissingInput(ParamRole::AntennaPositions)));
    }
}
