//! Radio-frequency interference.

use super::{parse_params, to_params, uniform};
use crate::error::SimError;
use crate::model::{EffectModel, ModelError, ModelInputs, ModelOutput, ParamRole, Params};
use ndarray::Array2;
use num_complex::Complex64;
use rand::RngCore;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};
use std::f64::consts::TAU;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RfiScatterParams {
    /// Probability that any one sample is hit
    pub chance: f64,

    /// Mean spike amplitude (Jy)
    pub strength: f64,

    /// Spread of the spike amplitude (Jy)
    pub std: f64,
}

impl Default for RfiScatterParams {
    fn default() -> Self {
        Self {
            chance: 1e-4,
            strength: 10.0,
            std: 10.0,
        }
    }
}

/// Isolated single-sample spikes with random phase.
#[derive(Debug, Clone, Default)]
pub struct RfiScatter {
    pub params: RfiScatterParams,
}

impl RfiScatter {
    pub fn new(params: RfiScatterParams) -> Self {
        Self { params }
    }

    pub fn from_params(params: &Params) -> Result<Box<dyn EffectModel>, SimError> {
        Ok(Box::new(Self::new(parse_params("rfi_scatter", params)?)))
    }
}

impl EffectModel for RfiScatter {
    fn name(&self) -> &str {
        "rfi_scatter"
    }

    fn is_multiplicative(&self) -> Option<bool> {
        Some(false)
    }

    fn roles(&self) -> &[ParamRole] {
        &[ParamRole::Lsts, ParamRole::Freqs]
    }

    fn default_params(&self) -> Params {
        to_params(&self.params)
    }

    fn simulate(&self, inputs: &ModelInputs<'_>, rng: &mut dyn RngCore) -> Result<ModelOutput, ModelError> {
        let p = &self.params;
        if !(0.0..=1.0).contains(&p.chance) {
            return Err(ModelError::Invalid(format!("chance {} is not a probability", p.chance)));
        }
        let amplitude = Normal::new(p.strength, p.std).map_err(|e| ModelError::Invalid(e.to_string()))?;

        let mut rfi = Array2::<Complex64>::zeros(inputs.shape());
        for v in rfi.iter_mut() {
            if uniform(rng, (0.0, 1.0)) < p.chance {
                let amp = amplitude.sample(rng);
                *v = Complex64::from_polar(amp, uniform(rng, (0.0, TAU)));
            }
        }
        Ok(ModelOutput::Vis(rfi))
    }
}
