//! Effect plans: the ordered list of components a run applies.

use crate::RunError;
use serde_json::json;
use std::fs;
use std::path::Path;
use tracing::debug;
use vissim_core::{Params, PlanEntry, SeedPolicy};

/// Reads a JSON list of plan entries.
pub fn load_plan(path: impl AsRef<Path>) -> Result<Vec<PlanEntry>, RunError> {
    let path = path.as_ref();
    let text = fs::read_to_string(path)?;
    let plan = parse_plan(&text)?;
    debug!("Loaded {} plan entries from {}", plan.len(), path.display());
    Ok(plan)
}

pub fn parse_plan(text: &str) -> Result<Vec<PlanEntry>, RunError> {
    let plan: Vec<PlanEntry> = serde_json::from_str(text)?;
    if plan.is_empty() {
        return Err(RunError::InvalidArgument("plan has no entries".into()));
    }
    Ok(plan)
}

fn entry(component: &str, params: serde_json::Value, seed: SeedPolicy) -> PlanEntry {
    let params: Params = match params {
        serde_json::Value::Object(map) => map,
        _ => Params::new(),
    };
    PlanEntry {
        params,
        seed,
        ..PlanEntry::new(component)
    }
}

/// Sky, EoR and noise, then RFI, crosstalk and bandpass gains.
///
/// Additive effects come first so the gains multiply every one of them.
pub fn default_plan() -> Vec<PlanEntry> {
    let tsky = json!({"t0": 185.0, "f0": 0.18, "index": -2.5});
    vec![
        entry(
            "diffuse_foreground",
            json!({"tsky_mdl": tsky, "omega_p": 0.32}),
            SeedPolicy::Redundant,
        ),
        entry("pntsrc_foreground", json!({"nsrcs": 200}), SeedPolicy::Once),
        entry("noiselike_eor", json!({"eor_amp": 1e-3}), SeedPolicy::Redundant),
        entry(
            "thermal_noise",
            json!({"tsky_mdl": tsky, "omega_p": 0.32, "trx": 100.0}),
            SeedPolicy::Initial,
        ),
        entry("rfi_scatter", json!({"chance": 1e-3}), SeedPolicy::Initial),
        entry("whitenoise_xtalk", json!({}), SeedPolicy::Once),
        entry("gains", json!({"gain_spread": 0.05}), SeedPolicy::Once),
    ]
}
