//! Error and warning types for the simulation engine.

use crate::model::ModelError;
use crate::types::{AntNum, Feed};
use std::fmt;
use thiserror::Error;
use vissim_env::EnvError;

/// Fatal simulation errors.
#[derive(Debug, Error)]
pub enum SimError {
    #[error("The component '{name}' wasn't found. The following aliases are known: {}", known.join(", "))]
    UnknownComponent { name: String, known: Vec<String> },

    #[error("Invalid seed specifier: {0}")]
    InvalidSeed(String),

    #[error("Seed policy '{policy}' cannot be used with component '{component}'")]
    IncompatibleSeedPolicy { component: String, policy: String },

    #[error("Component '{0}' has not been simulated")]
    NotSimulated(String),

    #[error("Antenna {0} is not in the array")]
    UnknownAntenna(AntNum),

    #[error("Baseline ({0}, {1}) is not in the array")]
    UnknownBaseline(AntNum, AntNum),

    #[error("Unknown polarization: {0}")]
    UnknownPolarization(String),

    #[error("Invalid array configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid parameters for '{component}': {source}")]
    InvalidParams {
        component: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Model '{component}' failed: {source}")]
    Model {
        component: String,
        #[source]
        source: ModelError,
    },

    #[error("Model '{component}' returned shape {found:?}, expected {expected:?}")]
    ShapeMismatch {
        component: String,
        expected: (usize, usize),
        found: (usize, usize),
    },

    #[error("Model '{component}' returned {found} output but was declared {declared}")]
    UnexpectedOutput {
        component: String,
        declared: &'static str,
        found: &'static str,
    },

    #[error("No gain for antenna {ant} feed {feed}")]
    MissingGain { ant: AntNum, feed: Feed },

    #[error(transparent)]
    Entropy(#[from] EnvError),
}

/// Advisory conditions. Logged and buffered, never fatal.
#[derive(Debug, Clone, PartialEq)]
pub enum SimWarning {
    /// Neither keep nor return was requested
    NothingToDo { component: String },

    /// The model does not declare whether it is multiplicative
    MissingMultiplicativeFlag { component: String },

    /// Multiplicative effect applied to an all-zero dataset
    MultiplicativeOnEmptyData { component: String },

    /// Additive effect applied after a multiplicative one
    AdditiveAfterMultiplicative { component: String },

    /// Required parameters the engine cannot resolve automatically
    UnresolvedParameters { component: String, missing: Vec<String> },

    /// Retrieval of an effect that was simulated without a seed
    UnseededRetrieval { component: String },
}

impl fmt::Display for SimWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SimWarning::NothingToDo { component } => write!(
                f,
                "Neither adding nor returning '{component}', so nothing will be computed"
            ),
            SimWarning::MissingMultiplicativeFlag { component } => write!(
                f,
                "'{component}' does not declare is_multiplicative; treating it as additive"
            ),
            SimWarning::MultiplicativeOnEmptyData { component } => write!(
                f,
                "Applying multiplicative effect '{component}' but no visibilities have been simulated yet"
            ),
            SimWarning::AdditiveAfterMultiplicative { component } => write!(
                f,
                "Adding '{component}' after multiplicative effects have been introduced"
            ),
            SimWarning::UnresolvedParameters { component, missing } => write!(
                f,
                "'{component}' is missing required parameters [{}]. Automatically resolved: \
                 lsts, freqs, antenna positions, baseline vectors, autocorrelations, \
                 cached delay/fringe filters",
                missing.join(", ")
            ),
            SimWarning::UnseededRetrieval { component } => write!(
                f,
                "'{component}' was simulated without a seed; the retrieved realization will differ"
            ),
        }
    }
}
