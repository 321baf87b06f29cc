//! Radiometer noise.

use super::{integration_time_from_lsts, jy_to_kelvin, parse_params, to_params, white_noise, BeamArea, SkyTemperature};
use crate::error::SimError;
use crate::model::{EffectModel, ModelError, ModelInputs, ModelOutput, ParamRole, Params};
use rand::RngCore;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ThermalNoiseParams {
    /// Sky temperature model (K)
    #[serde(alias = "Tsky_mdl")]
    pub tsky_mdl: Option<SkyTemperature>,

    /// Beam solid angle (sr)
    pub omega_p: Option<BeamArea>,

    /// Seconds; derived from the LST step when absent
    pub integration_time: Option<f64>,

    /// Hz; derived from the frequency step when absent
    pub channel_width: Option<f64>,

    /// Receiver temperature (K)
    #[serde(alias = "Trx")]
    pub trx: f64,
}

/// Gaussian noise at the radiometer-equation level for the sky plus
/// receiver temperature.
#[derive(Debug, Clone, Default)]
pub struct ThermalNoise {
    pub params: ThermalNoiseParams,
}

impl ThermalNoise {
    pub fn new(params: ThermalNoiseParams) -> Self {
        Self { params }
    }

    pub fn from_params(params: &Params) -> Result<Box<dyn EffectModel>, SimError> {
        Ok(Box::new(Self::new(parse_params("thermal_noise", params)?)))
    }
}

impl EffectModel for ThermalNoise {
    fn name(&self) -> &str {
        "thermal_noise"
    }

    fn is_multiplicative(&self) -> Option<bool> {
        Some(false)
    }

    fn roles(&self) -> &[ParamRole] {
        &[ParamRole::Lsts, ParamRole::Freqs]
    }

    fn required_params(&self) -> &[&str] {
        &["tsky_mdl", "omega_p"]
    }

    fn default_params(&self) -> Params {
        to_params(&self.params)
    }

    fn simulate(&self, inputs: &ModelInputs<'_>, rng: &mut dyn RngCore) -> Result<ModelOutput, ModelError> {
        let p = &self.params;
        let tsky = p
            .tsky_mdl
            .as_ref()
            .ok_or_else(|| ModelError::MissingParameter("tsky_mdl".into()))?;
        let omega_p = p
            .omega_p
            .as_ref()
            .ok_or_else(|| ModelError::MissingParameter("omega_p".into()))?
            .evaluate(inputs.freqs)?;

        let channel_width = match p.channel_width {
            Some(width) => width,
            None if inputs.freqs.len() >= 2 => (inputs.freqs[1] - inputs.freqs[0]) * 1e9,
            None => return Err(ModelError::MissingParameter("channel_width".into())),
        };
        let integration_time = p
            .integration_time
            .or_else(|| integration_time_from_lsts(inputs.lsts))
            .ok_or_else(|| ModelError::MissingParameter("integration_time".into()))?;
        if channel_width <= 0.0 || integration_time <= 0.0 {
            return Err(ModelError::Invalid(
                "channel_width and integration_time must be positive".into(),
            ));
        }

        let jy2k = jy_to_kelvin(inputs.freqs, &omega_p);
        let mut sigma = tsky.evaluate(inputs.lsts.len(), inputs.freqs) + p.trx;
        sigma /= (integration_time * channel_width).sqrt();
        for mut row in sigma.rows_mut() {
            row.zip_mut_with(&jy2k, |s, k| *s /= *k);
        }

        let mut vis = white_noise(inputs.shape(), rng);
        vis.zip_mut_with(&sigma, |v, s| *v *= *s);
        Ok(ModelOutput::Vis(vis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::Array1;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn params() -> ThermalNoiseParams {
        ThermalNoiseParams {
            tsky_mdl: Some(SkyTemperature::Constant(300.0)),
            omega_p: Some(BeamArea::Constant(0.1)),
            integration_time: Some(10.0),
            channel_width: Some(1e5),
            trx: 100.0,
        }
    }

    #[test]
    fn test_noise_level_follows_radiometer_equation() {
        let lsts: Vec<f64> = (0..400).map(|i| i as f64 * 1e-3).collect();
        let freqs = vec![0.15; 50];
        let inputs = ModelInputs::new(&lsts, &freqs);
        let out = match ThermalNoise::new(params()).simulate(&inputs, &mut ChaCha8Rng::seed_from_u64(8)).unwrap() {
            ModelOutput::Vis(v) => v,
            ModelOutput::Gains(_) => panic!("expected visibilities"),
        };

        let jy2k = jy_to_kelvin(&[0.15], &Array1::from_elem(1, 0.1))[0];
        let expected = 400.0 / (10.0f64 * 1e5).sqrt() / jy2k;
        let rms = (out.iter().map(|v| v.norm_sqr()).sum::<f64>() / out.len() as f64).sqrt();
        assert_relative_eq!(rms, expected, max_relative = 0.05);
    }

    #[test]
    fn test_missing_beam() {
        let lsts = [0.0, 0.01];
        let freqs = [0.1, 0.2];
        let model = ThermalNoise::new(ThermalNoiseParams { omega_p: None, ..params() });
        let err = model
            .simulate(&ModelInputs::new(&lsts, &freqs), &mut ChaCha8Rng::seed_from_u64(0))
            .unwrap_err();
        assert!(matches!(err, ModelError::MissingParameter(p) if p == "omega_p"));
    }

    #[test]
    fn test_single_channel_needs_explicit_width() {
        let lsts = [0.0, 0.01];
        let freqs = [0.1];
        let model = ThermalNoise::new(ThermalNoiseParams { channel_width: None, ..params() });
        assert!(model
            .simulate(&ModelInputs::new(&lsts, &freqs), &mut ChaCha8Rng::seed_from_u64(0))
            .is_err());
    }
}
