//! vissim core: composable visibility simulation for radio interferometers.
//!
//! A [`Simulator`] owns a dense visibility dataset and applies effect models
//! to it one at a time:
//! 1. **Additive effects** (sky foregrounds, EoR, noise, RFI, crosstalk) are
//!    simulated per (ant1, ant2, pol) and summed into the data
//! 2. **Multiplicative effects** (bandpass gains, reflections) are simulated
//!    per (antenna, feed) and applied as `g1 * conj(g2)`
//! 3. **Reproducibility** comes from per-component seed policies, so any kept
//!    effect can be recomputed later with [`Simulator::get`]

pub mod engine;
pub mod error;
pub mod filters;
pub mod geometry;
pub mod inclusion;
pub mod layouts;
pub mod ledger;
pub mod model;
pub mod models;
pub mod redundancy;
pub mod registry;
pub mod seeds;
pub mod simulator;
pub mod types;

#[cfg(test)]
mod testing;

// Re-export key types for convenience
pub use engine::ComponentOutput;
pub use error::{SimError, SimWarning};
pub use filters::{DelayFilterParams, FilterCache, FringeFilterParams};
pub use geometry::{ArrayConfig, ArrayGeometry, VisibilityData};
pub use inclusion::{FilterKey, InclusionFilter};
pub use ledger::{ComponentLedger, ComponentRecord};
pub use model::{EffectModel, Gains, ModelError, ModelInputs, ModelOutput, ParamRole, Params};
pub use redundancy::{RedundantBaselines, RedundantGroup};
pub use registry::ModelRegistry;
pub use seeds::{SeedKey, SeedManager, SeedPolicy};
pub use simulator::{AddOptions, PlanEntry, Simulator};
pub use types::{AntNum, BaselineInt, Feed, Polarization};
