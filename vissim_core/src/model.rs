//! The effect-model contract.
//!
//! A model is a pure function of its resolved inputs and an explicit random
//! generator. It declares which inputs it needs through [`ParamRole`]s; the
//! engine resolves exactly those and nothing else.

use crate::types::{AntNum, Feed, Polarization};
use nalgebra::Vector3;
use ndarray::{Array2, ArrayView1, ArrayView2, CowArray, Ix2};
use num_complex::Complex64;
use rand::RngCore;
use std::collections::BTreeMap;
use thiserror::Error;

/// User-facing model parameters.
pub type Params = serde_json::Map<String, serde_json::Value>;

/// Per-(antenna, feed) complex gains, each of shape (n_times, n_freqs).
pub type Gains = BTreeMap<(AntNum, Feed), Array2<Complex64>>;

/// An input the engine can supply automatically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParamRole {
    /// LSTs in radians
    Lsts,
    /// Frequencies in GHz
    Freqs,
    /// Antenna ENU positions in metres
    AntennaPositions,
    /// ENU vector from ant1 to ant2 in light-nanoseconds
    BaselineVector,
    /// Current visibilities of (ant1, ant1, pol)
    Autocorrelation,
    /// Cached delay filter of the baseline's redundant group
    DelayFilter,
    /// Cached fringe filter, time-reversed for conjugate-direction members
    FringeFilter,
}

/// Failures raised by a model.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("missing required parameter '{0}'")]
    MissingParameter(String),

    #[error("input {0:?} was not supplied")]
    MissingInput(ParamRole),

    #[error("{0}")]
    Invalid(String),
}

/// Inputs resolved by the engine for one unit of work.
///
/// Axis slices are always present; everything else is only filled in when the
/// model lists the matching [`ParamRole`].
#[derive(Debug, Clone)]
pub struct ModelInputs<'a> {
    pub lsts: &'a [f64],
    pub freqs: &'a [f64],
    pub antpos: Option<&'a BTreeMap<AntNum, Vector3<f64>>>,
    pub antpair: Option<(AntNum, AntNum)>,
    pub pol: Option<Polarization>,
    /// Feed being simulated (multiplicative models only)
    pub feed: Option<Feed>,
    pub bl_vec_ns: Option<Vector3<f64>>,
    pub autovis: Option<ArrayView2<'a, Complex64>>,
    pub delay_filter: Option<ArrayView1<'a, f64>>,
    pub fringe_filter: Option<CowArray<'a, f64, Ix2>>,
}

impl<'a> ModelInputs<'a> {
    pub fn new(lsts: &'a [f64], freqs: &'a [f64]) -> Self {
        Self {
            lsts,
            freqs,
            antpos: None,
            antpair: None,
            pol: None,
            feed: None,
            bl_vec_ns: None,
            autovis: None,
            delay_filter: None,
            fringe_filter: None,
        }
    }

    /// Expected output shape (n_times, n_freqs).
    pub fn shape(&self) -> (usize, usize) {
        (self.lsts.len(), self.freqs.len())
    }

    pub fn require_bl_vec(&self) -> Result<Vector3<f64>, ModelError> {
        self.bl_vec_ns.ok_or(ModelError::MissingInput(ParamRole::BaselineVector))
    }

    pub fn require_antpos(&self) -> Result<&'a BTreeMap<AntNum, Vector3<f64>>, ModelError> {
        self.antpos.ok_or(ModelError::MissingInput(ParamRole::AntennaPositions))
    }

    pub fn require_autovis(&self) -> Result<ArrayView2<'a, Complex64>, ModelError> {
        self.autovis
            .clone()
            .ok_or(ModelError::MissingInput(ParamRole::Autocorrelation))
    }
}

/// What a model produces.
#[derive(Debug, Clone)]
pub enum ModelOutput {
    /// Additive contribution for one baseline/polarization
    Vis(Array2<Complex64>),
    /// Per-antenna gains for one feed
    Gains(BTreeMap<AntNum, Array2<Complex64>>),
}

impl ModelOutput {
    pub fn kind(&self) -> &'static str {
        match self {
            ModelOutput::Vis(_) => "visibility",
            ModelOutput::Gains(_) => "gain",
        }
    }
}

/// A systematic or sky effect that can be composed into a dataset.
pub trait EffectModel: Send + Sync {
    /// Canonical name used in history and the ledger.
    fn name(&self) -> &str;

    /// Whether the effect multiplies the data (per-antenna gains) rather than
    /// adding to it. `None` means the model does not say.
    fn is_multiplicative(&self) -> Option<bool>;

    /// Smooth-spectrum models receive the cached delay filter.
    fn is_smooth_in_freq(&self) -> bool {
        false
    }

    /// Inputs the engine should resolve.
    fn roles(&self) -> &[ParamRole];

    /// Parameters the caller must supply that the engine cannot resolve.
    fn required_params(&self) -> &[&str] {
        &[]
    }

    /// Parameters as configured on this instance, for the ledger.
    fn default_params(&self) -> Params {
        Params::new()
    }

    fn simulate(&self, inputs: &ModelInputs<'_>, rng: &mut dyn RngCore) -> Result<ModelOutput, ModelError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Constant;

    impl EffectModel for Constant {
        fn name(&self) -> &str {
            "constant"
        }

        fn is_multiplicative(&self) -> Option<bool> {
            Some(false)
        }

        fn roles(&self) -> &[ParamRole] {
            &[ParamRole::Lsts, ParamRole::Freqs]
        }

        fn simulate(&self, inputs: &ModelInputs<'_>, _rng: &mut dyn RngCore) -> Result<ModelOutput, ModelError> {
            Ok(ModelOutput::Vis(Array2::from_elem(inputs.shape(), Complex64::new(1.0, 0.0))))
        }
    }

    #[test]
    fn test_inputs_shape() {
        let lsts = [0.0, 0.1, 0.2];
        let freqs = [0.1, 0.2];
        let inputs = ModelInputs::new(&lsts, &freqs);
        assert_eq!(inputs.shape(), (3, 2));
    }

    #[test]
    fn test_missing_inputs_are_reported() {
        let inputs = ModelInputs::new(&[], &[]);
        assert!(matches!(
            inputs.require_bl_vec(),
            Err(ModelError::MissingInput(ParamRole::BaselineVector))
        ));
        assert!(matches!(
            inputs.require_autovis(),
            Err(ModelError::MissingInput(ParamRole::Autocorrelation))
        ));
        assert!(inputs.require_antpos().is_err());
    }

    #[test]
    fn test_trait_defaults() {
        let model = Constant;
        assert!(!model.is_smooth_in_freq());
        assert!(model.required_params().is_empty());
        assert!(model.default_params().is_empty());

        let lsts = [0.0];
        let freqs = [0.1, 0.2];
        let mut rng = rand::rngs::mock::StepRng::new(0, 1);
        let out = model.simulate(&ModelInputs::new(&lsts, &freqs), &mut rng).unwrap();
        assert_eq!(out.kind(), "visibility");
    }
}
