//! vissim simulation runner.
//!
//! Builds an array from a handful of settings, applies a plan of effects to
//! it and summarizes the result:
//!
//! ```text
//!  RunSettings ──► ArrayConfig ──► Simulator ──► run_plan ──► RunReport
//!                                      ▲
//!                       filters ───────┘ (optional)
//! ```
//!
//! A non-zero seed makes the whole run reproducible.

pub mod plan;
pub mod report;

pub use plan::{default_plan, load_plan, parse_plan};
pub use report::{ArraySummary, ReturnedSummary, RunReport};

use clap::ValueEnum;
use std::str::FromStr;
use thiserror::Error;
use tracing::info;
use vissim_core::layouts::{hex_array, linear_array};
use vissim_core::{
    ArrayConfig, DelayFilterParams, FringeFilterParams, PlanEntry, Polarization, SimError, Simulator,
};

/// Errors surfaced by a run.
#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Sim(#[from] SimError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid plan: {0}")]
    Plan(#[from] serde_json::Error),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

/// Antenna layout families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Layout {
    /// `ants` antennas on an east-west line
    Linear,
    /// Hexagon with `ants` antennas per side
    Hex,
}

/// Everything needed to set up and run one simulation.
#[derive(Debug, Clone)]
pub struct RunSettings {
    /// Master seed; 0 draws seeds from the wall clock
    pub seed: u64,
    pub layout: Layout,
    pub ants: usize,
    /// Antenna separation in metres
    pub sep: f64,
    pub n_freq: usize,
    pub n_times: usize,
    pub pols: Vec<String>,
    pub autos: bool,
    /// Precompute per-group delay and fringe filters before applying
    pub filters: bool,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            seed: 42,
            layout: Layout::Linear,
            ants: 4,
            sep: 14.6,
            n_freq: 64,
            n_times: 30,
            pols: vec!["xx".to_string()],
            autos: false,
            filters: false,
        }
    }
}

impl RunSettings {
    /// Instrument description for these settings.
    pub fn array_config(&self) -> Result<ArrayConfig, RunError> {
        if self.ants == 0 {
            return Err(RunError::InvalidArgument("need at least one antenna".into()));
        }
        if !(self.sep > 0.0) {
            return Err(RunError::InvalidArgument(format!(
                "antenna separation must be positive, got {}",
                self.sep
            )));
        }
        let antennas = match self.layout {
            Layout::Linear => linear_array(self.ants, self.sep),
            Layout::Hex => hex_array(self.ants, self.sep),
        };
        let pols = self
            .pols
            .iter()
            .map(|p| Polarization::from_str(p))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(ArrayConfig {
            antennas,
            n_freq: self.n_freq,
            n_times: self.n_times,
            pols,
            no_autos: !self.autos,
            ..Default::default()
        })
    }

    /// A fresh simulator for these settings.
    pub fn simulator(&self) -> Result<Simulator, RunError> {
        let config = self.array_config()?;
        let sim = if self.seed == 0 {
            Simulator::from_config(&config)?
        } else {
            Simulator::with_seed(&config, self.seed)?
        };
        Ok(sim)
    }
}

/// Builds the array, applies `plan` and summarizes the outcome.
pub fn run(settings: &RunSettings, plan: &[PlanEntry]) -> Result<(Simulator, RunReport), RunError> {
    let mut sim = settings.simulator()?;
    if settings.filters {
        sim.calculate_filters(&DelayFilterParams::default(), &FringeFilterParams::default())?;
        info!(
            "Cached filters for {} redundant groups",
            sim.filters().map_or(0, |f| f.len())
        );
    }

    let returned = sim.run_plan(plan)?;
    let report = RunReport::from_simulator(&mut sim, &returned);
    info!(
        "Applied {} components, data rms {:.3e}",
        report.components.len(),
        report.data_rms
    );
    Ok((sim, report))
}

#[cfg(test)]
mod tests {
    use super::*;
    use vissim_core::SeedPolicy;

    fn small() -> RunSettings {
        RunSettings {
            ants: 3,
            n_freq: 16,
            n_times: 6,
            ..Default::default()
        }
    }

    #[test]
    fn test_array_config_from_settings() {
        let config = RunSettings {
            pols: vec!["xx".into(), "yy".into()],
            ..small()
        }
        .array_config()
        .unwrap();
        assert_eq!(config.antennas.len(), 3);
        assert_eq!(config.pols, vec![Polarization::Xx, Polarization::Yy]);
        assert!(config.no_autos);

        let hex = RunSettings { layout: Layout::Hex, ..small() }.array_config().unwrap();
        assert_eq!(hex.antennas.len(), 19);
    }

    #[test]
    fn test_bad_settings() {
        assert!(matches!(
            RunSettings { ants: 0, ..small() }.array_config(),
            Err(RunError::InvalidArgument(_))
        ));
        assert!(matches!(
            RunSettings { pols: vec!["zz".into()], ..small() }.array_config(),
            Err(RunError::Sim(SimError::UnknownPolarization(_)))
        ));
    }

    #[test]
    fn test_default_plan_run_is_reproducible() {
        let (sim_a, report_a) = run(&small(), &default_plan()).unwrap();
        let (sim_b, report_b) = run(&small(), &default_plan()).unwrap();

        assert_eq!(report_a.components.len(), default_plan().len());
        assert_eq!(report_a.seed, Some(42));
        assert_eq!(sim_a.data().data, sim_b.data().data);
        assert_eq!(report_a.components, report_b.components);
        assert!(report_a.data_rms > 0.0);
    }

    #[test]
    fn test_run_with_filters_and_returned_output() {
        let mut plan = vec![PlanEntry {
            seed: SeedPolicy::Redundant,
            ret: true,
            ..PlanEntry::new("noiselike_eor")
        }];
        plan[0].params.insert("eor_amp".into(), serde_json::json!(1e-2));

        let settings = RunSettings { filters: true, ..small() };
        let (sim, report) = run(&settings, &plan).unwrap();
        assert!(sim.filters().is_some());
        assert_eq!(report.returned.len(), 1);
        assert_eq!(report.returned[0].kind, "visibility");
        assert_eq!(report.array.redundant_groups, 2);
    }
}
