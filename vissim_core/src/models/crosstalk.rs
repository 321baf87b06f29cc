//! Crosstalk between signal paths.

use super::{parse_params, to_params, uniform};
use crate::error::SimError;
use crate::model::{EffectModel, ModelError, ModelInputs, ModelOutput, ParamRole, Params};
use ndarray::Array2;
use num_complex::Complex64;
use rand::RngCore;
use rand_distr::{Distribution, StandardNormal};
use serde::{Deserialize, Serialize};
use std::f64::consts::TAU;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WhiteNoiseCrosstalkParams {
    pub amplitude: f64,
}

impl Default for WhiteNoiseCrosstalkParams {
    fn default() -> Self {
        Self { amplitude: 3.0 }
    }
}

/// A random spectrum, constant in time.
#[derive(Debug, Clone, Default)]
pub struct WhiteNoiseCrosstalk {
    pub params: WhiteNoiseCrosstalkParams,
}

impl WhiteNoiseCrosstalk {
    pub fn new(params: WhiteNoiseCrosstalkParams) -> Self {
        Self { params }
    }

    pub fn from_params(params: &Params) -> Result<Box<dyn EffectModel>, SimError> {
        Ok(Box::new(Self::new(parse_params("whitenoise_xtalk", params)?)))
    }
}

impl EffectModel for WhiteNoiseCrosstalk {
    fn name(&self) -> &str {
        "whitenoise_xtalk"
    }

    fn is_multiplicative(&self) -> Option<bool> {
        Some(false)
    }

    fn roles(&self) -> &[ParamRole] {
        &[ParamRole::Freqs]
    }

    fn default_params(&self) -> Params {
        to_params(&self.params)
    }

    fn simulate(&self, inputs: &ModelInputs<'_>, rng: &mut dyn RngCore) -> Result<ModelOutput, ModelError> {
        let spectrum: Vec<Complex64> = inputs
            .freqs
            .iter()
            .map(|_| {
                let re: f64 = StandardNormal.sample(rng);
                let im: f64 = StandardNormal.sample(rng);
                Complex64::new(re, im) * self.params.amplitude
            })
            .collect();
        let xtalk = Array2::from_shape_fn(inputs.shape(), |(_, f)| spectrum[f]);
        Ok(ModelOutput::Vis(xtalk))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CrossCouplingParams {
    /// Coupling amplitude relative to the autocorrelation; drawn from
    /// `amp_rng` when absent
    pub amp: Option<f64>,

    /// Coupling delay (ns); drawn from `dly_rng` when absent
    pub dly: Option<f64>,

    /// Coupling phase (cycles); drawn from [0, 1) when absent
    pub phs: Option<f64>,

    pub amp_rng: (f64, f64),
    pub dly_rng: (f64, f64),

    /// Conjugate the coupling phase
    pub conj: bool,
}

impl Default for CrossCouplingParams {
    fn default() -> Self {
        Self {
            amp: None,
            dly: None,
            phs: None,
            amp_rng: (0.0, 1e-4),
            dly_rng: (-300.0, 300.0),
            conj: false,
        }
    }
}

/// A delayed, attenuated copy of the first antenna's autocorrelation.
#[derive(Debug, Clone, Default)]
pub struct CrossCouplingCrosstalk {
    pub params: CrossCouplingParams,
}

impl CrossCouplingCrosstalk {
    pub fn new(params: CrossCouplingParams) -> Self {
        Self { params }
    }

    pub fn from_params(params: &Params) -> Result<Box<dyn EffectModel>, SimError> {
        Ok(Box::new(Self::new(parse_params("cross_coupling_xtalk", params)?)))
    }
}

impl EffectModel for CrossCouplingCrosstalk {
    fn name(&self) -> &str {
        "cross_coupling_xtalk"
    }

    fn is_multiplicative(&self) -> Option<bool> {
        Some(false)
    }

    fn roles(&self) -> &[ParamRole] {
        &[ParamRole::Freqs, ParamRole::Autocorrelation]
    }

    fn default_params(&self) -> Params {
        to_params(&self.params)
    }

    fn simulate(&self, inputs: &ModelInputs<'_>, rng: &mut dyn RngCore) -> Result<ModelOutput, ModelError> {
        let p = &self.params;
        let autovis = inputs.require_autovis()?;
        if autovis.dim() != inputs.shape() {
            return Err(ModelError::Invalid(format!(
                "autocorrelation has shape {:?}, expected {:?}",
                autovis.dim(),
                inputs.shape()
            )));
        }

        let amp = p.amp.unwrap_or_else(|| uniform(rng, p.amp_rng));
        let dly = p.dly.unwrap_or_else(|| uniform(rng, p.dly_rng));
        let phs = p.phs.unwrap_or_else(|| uniform(rng, (0.0, 1.0)));

        let mut xtalk = autovis.to_owned();
        for mut row in xtalk.rows_mut() {
            for (v, f) in row.iter_mut().zip(inputs.freqs) {
                let coupling = Complex64::from_polar(amp, TAU * (dly * f + phs));
                *v *= if p.conj { coupling.conj() } else { coupling };
            }
        }
        Ok(ModelOutput::Vis(xtalk))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn vis(out: ModelOutput) -> Array2<Complex64> {
        match out {
            ModelOutput::Vis(v) => v,
            ModelOutput::Gains(_) => panic!("expected visibilities"),
        }
    }

    #[test]
    fn test_whitenoise_constant_in_time() {
        let lsts = [0.0, 0.1, 0.2, 0.3];
        let freqs: Vec<f64> = (0..16).map(|i| 0.1 + i as f64 * 0.001).collect();
        let xtalk = vis(WhiteNoiseCrosstalk::default()
            .simulate(&ModelInputs::new(&lsts, &freqs), &mut ChaCha8Rng::seed_from_u64(3))
            .unwrap());
        assert_eq!(xtalk.dim(), (4, 16));
        assert_eq!(xtalk.row(0), xtalk.row(3));
        assert!(xtalk.iter().any(|v| v.norm() > 0.0));
    }

    #[test]
    fn test_cross_coupling_scales_autos() {
        let lsts = [0.0, 0.1];
        let freqs = [0.1, 0.2];
        let autos = Array2::from_elem((2, 2), Complex64::new(50.0, 0.0));
        let mut inputs = ModelInputs::new(&lsts, &freqs);
        inputs.autovis = Some(autos.view());

        let model = CrossCouplingCrosstalk::new(CrossCouplingParams {
            amp: Some(1e-3),
            dly: Some(10.0),
            phs: Some(0.0),
            ..Default::default()
        });
        let xtalk = vis(model.simulate(&inputs, &mut ChaCha8Rng::seed_from_u64(0)).unwrap());
        let expected = Complex64::new(50.0, 0.0) * Complex64::from_polar(1e-3, TAU * 10.0 * 0.2);
        assert_relative_eq!(xtalk[[1, 1]].re, expected.re, epsilon = 1e-12);
        assert_relative_eq!(xtalk[[1, 1]].im, expected.im, epsilon = 1e-12);
    }

    #[test]
    fn test_cross_coupling_needs_autos() {
        let lsts = [0.0];
        let freqs = [0.1];
        let err = CrossCouplingCrosstalk::default()
            .simulate(&ModelInputs::new(&lsts, &freqs), &mut ChaCha8Rng::seed_from_u64(0))
            .unwrap_err();
        assert!(matches!(err, ModelError::MissingInput(ParamRole::Autocorrelation)));
    }
}
