//! Noise-like epoch-of-reionization signal.

use super::{parse_params, to_params, white_noise};
use crate::error::SimError;
use crate::filters::{
    gen_delay_filter, gen_fringe_filter, rough_delay_filter, rough_fringe_filter, DelayFilterParams, DelayFilterType,
    FringeFilterParams,
};
use crate::model::{EffectModel, ModelError, ModelInputs, ModelOutput, ParamRole, Params};
use ndarray::CowArray;
use rand::RngCore;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NoiselikeEorParams {
    /// Amplitude of the signal (Jy)
    pub eor_amp: f64,

    /// Suppress delays below this magnitude (ns)
    pub min_delay: Option<f64>,

    /// Suppress delays above this magnitude (ns)
    pub max_delay: Option<f64>,

    pub fringe_filter_kwargs: FringeFilterParams,
}

impl Default for NoiselikeEorParams {
    fn default() -> Self {
        Self {
            eor_amp: 1e-5,
            min_delay: None,
            max_delay: None,
            fringe_filter_kwargs: FringeFilterParams::default(),
        }
    }
}

/// White noise restricted to the fringe rates of the sky.
#[derive(Debug, Clone, Default)]
pub struct NoiselikeEor {
    pub params: NoiselikeEorParams,
}

impl NoiselikeEor {
    pub fn new(params: NoiselikeEorParams) -> Self {
        Self { params }
    }

    pub fn from_params(params: &Params) -> Result<Box<dyn EffectModel>, SimError> {
        Ok(Box::new(Self::new(parse_params("noiselike_eor", params)?)))
    }
}

impl EffectModel for NoiselikeEor {
    fn name(&self) -> &str {
        "noiselike_eor"
    }

    fn is_multiplicative(&self) -> Option<bool> {
        Some(false)
    }

    fn roles(&self) -> &[ParamRole] {
        &[
            ParamRole::Lsts,
            ParamRole::Freqs,
            ParamRole::BaselineVector,
            ParamRole::FringeFilter,
        ]
    }

    fn default_params(&self) -> Params {
        to_params(&self.params)
    }

    fn simulate(&self, inputs: &ModelInputs<'_>, rng: &mut dyn RngCore) -> Result<ModelOutput, ModelError> {
        let bl_vec = inputs.require_bl_vec()?;
        let vis = white_noise(inputs.shape(), rng) * self.params.eor_amp;

        let fringe = match &inputs.fringe_filter {
            Some(cached) => CowArray::from(cached.view()),
            None => CowArray::from(gen_fringe_filter(
                inputs.lsts,
                inputs.freqs,
                bl_vec.x,
                &self.params.fringe_filter_kwargs,
            )),
        };
        let mut vis = rough_fringe_filter(&vis, fringe.view());

        if self.params.min_delay.is_some() || self.params.max_delay.is_some() {
            let bounds = DelayFilterParams {
                delay_filter_type: DelayFilterType::None,
                min_delay: self.params.min_delay,
                max_delay: self.params.max_delay,
                ..Default::default()
            };
            let delay = gen_delay_filter(inputs.freqs, bl_vec.norm(), &bounds);
            vis = rough_delay_filter(&vis, delay.view());
        }
        Ok(ModelOutput::Vis(vis))
    }
}
