//! Instrumented models shared by the unit tests.

use crate::model::{EffectModel, ModelError, ModelInputs, ModelOutput, ParamRole};
use crate::models::white_noise;
use ndarray::Array2;
use num_complex::Complex64;
use rand::RngCore;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Additive white noise that counts its invocations.
#[derive(Debug, Clone, Default)]
pub struct CountingNoise {
    calls: Arc<AtomicUsize>,
}

impl CountingNoise {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl EffectModel for CountingNoise {
    fn name(&self) -> &str {
        "counting_noise"
    }

    fn is_multiplicative(&self) -> Option<bool> {
        Some(false)
    }

    fn roles(&self) -> &[ParamRole] {
        &[ParamRole::Lsts, ParamRole::Freqs]
    }

    fn simulate(&self, inputs: &ModelInputs<'_>, rng: &mut dyn RngCore) -> Result<ModelOutput, ModelError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(ModelOutput::Vis(white_noise(inputs.shape(), rng)))
    }
}

/// Constant per-antenna gain `ant + 1`, identical for every feed.
#[derive(Debug, Clone, Copy)]
pub struct ScaledGains;

impl EffectModel for ScaledGains {
    fn name(&self) -> &str {
        "scaled_gains"
    }

    fn is_multiplicative(&self) -> Option<bool> {
        Some(true)
    }

    fn roles(&self) -> &[ParamRole] {
        &[ParamRole::AntennaPositions]
    }

    fn simulate(&self, inputs: &ModelInputs<'_>, _rng: &mut dyn RngCore) -> Result<ModelOutput, ModelError> {
        let gains = inputs
            .require_antpos()?
            .keys()
            .map(|&ant| (ant, Array2::from_elem(inputs.shape(), Complex64::new(ant as f64 + 1.0, 0.0))))
            .collect();
        Ok(ModelOutput::Gains(gains))
    }
}

/// Gains for antenna 0 only.
#[derive(Debug, Clone, Copy)]
pub struct PartialGains;

impl EffectModel for PartialGains {
    fn name(&self) -> &str {
        "partial_gains"
    }

    fn is_multiplicative(&self) -> Option<bool> {
        Some(true)
    }

    fn roles(&self) -> &[ParamRole] {
        &[]
    }

    fn simulate(&self, inputs: &ModelInputs<'_>, _rng: &mut dyn RngCore) -> Result<ModelOutput, ModelError> {
        let gains = BTreeMap::from([(0, Array2::from_elem(inputs.shape(), Complex64::new(2.0, 0.0)))]);
        Ok(ModelOutput::Gains(gains))
    }
}

/// Additive model that never says whether it is multiplicative.
#[derive(Debug, Clone, Copy)]
pub struct Unflagged;

impl EffectModel for Unflagged {
    fn name(&self) -> &str {
        "unflagged"
    }

    fn is_multiplicative(&self) -> Option<bool> {
        None
    }

    fn roles(&self) -> &[ParamRole] {
        &[]
    }

    fn simulate(&self, inputs: &ModelInputs<'_>, _rng: &mut dyn RngCore) -> Result<ModelOutput, ModelError> {
        Ok(ModelOutput::Vis(Array2::from_elem(inputs.shape(), Complex64::new(1.0, 1.0))))
    }
}

/// Returns a single sample regardless of the requested shape.
#[derive(Debug, Clone, Copy)]
pub struct BrokenShape;

impl EffectModel for BrokenShape {
    fn name(&self) -> &str {
        "broken_shape"
    }

    fn is_multiplicative(&self) -> Option<bool> {
        Some(false)
    }

    fn roles(&self) -> &[ParamRole] {
        &[]
    }

    fn simulate(&self, _inputs: &ModelInputs<'_>, _rng: &mut dyn RngCore) -> Result<ModelOutput, ModelError> {
        Ok(ModelOutput::Vis(Array2::zeros((1, 1))))
    }
}
