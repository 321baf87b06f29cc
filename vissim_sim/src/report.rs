//! Run summary, printable as JSON.

use ndarray::Array3;
use num_complex::Complex64;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Write;
use vissim_core::{ArrayGeometry, ComponentOutput, ComponentRecord, Simulator};

/// Shape of the simulated dataset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArraySummary {
    pub n_ants: usize,
    pub n_bls: usize,
    pub n_times: usize,
    pub n_freqs: usize,
    pub pols: Vec<String>,
    pub redundant_groups: usize,
}

/// Statistics of an output that was returned rather than only kept.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReturnedSummary {
    pub component: String,

    /// "visibility" or "gain"
    pub kind: String,

    pub samples: usize,
    pub rms: f64,
}

impl ReturnedSummary {
    pub fn new(component: &str, output: &ComponentOutput) -> Self {
        let (kind, samples, rms) = match output {
            ComponentOutput::Visibilities(vis) => ("visibility", vis.len(), rms(vis.iter())),
            ComponentOutput::Gains(gains) => {
                let samples = gains.values().map(|g| g.len()).sum();
                ("gain", samples, rms(gains.values().flat_map(|g| g.iter())))
            }
        };
        Self {
            component: component.to_string(),
            kind: kind.to_string(),
            samples,
            rms,
        }
    }
}

fn rms<'a>(values: impl Iterator<Item = &'a Complex64>) -> f64 {
    let (sum, count) = values.fold((0.0, 0usize), |(s, n), v| (s + v.norm_sqr(), n + 1));
    if count == 0 {
        0.0
    } else {
        (sum / count as f64).sqrt()
    }
}

/// Everything a run produced, short of the visibilities themselves.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    /// Master seed, absent for wall-clock runs
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,

    pub array: ArraySummary,

    /// Kept components, in application order
    pub components: Vec<ComponentRecord>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub returned: Vec<ReturnedSummary>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,

    /// RMS amplitude of the final dataset
    pub data_rms: f64,

    pub history: String,
}

impl RunReport {
    /// Summarizes the simulator state after a run, draining its warnings.
    pub fn from_simulator(sim: &mut Simulator, returned: &[(String, ComponentOutput)]) -> Self {
        let warnings = sim.take_warnings().iter().map(ToString::to_string).collect();
        let data = sim.data();
        let array = ArraySummary {
            n_ants: data.antpos().len(),
            n_bls: data.n_bls(),
            n_times: data.n_times(),
            n_freqs: data.n_freqs(),
            pols: data.pols().iter().map(ToString::to_string).collect(),
            redundant_groups: sim.redundancy().len(),
        };
        Self {
            seed: sim.seeds().master_seed(),
            array,
            components: sim.ledger().records().to_vec(),
            returned: returned
                .iter()
                .map(|(name, output)| ReturnedSummary::new(name, output))
                .collect(),
            warnings,
            data_rms: data_rms(&data.data),
            history: data.history.clone(),
        }
    }

    /// Writes to a JSON file.
    pub fn write_to_file(&self, path: &str) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        let mut file = File::create(path)?;
        file.write_all(json.as_bytes())?;
        Ok(())
    }
}

fn data_rms(data: &Array3<Complex64>) -> f64 {
    rms(data.iter())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::Array2;
    use std::collections::BTreeMap;
    use vissim_core::Feed;

    #[test]
    fn test_rms_of_visibilities() {
        let vis = Array3::from_elem((2, 3, 1), Complex64::new(3.0, 4.0));
        let summary = ReturnedSummary::new("noiselike_eor", &ComponentOutput::Visibilities(vis));
        assert_eq!(summary.kind, "visibility");
        assert_eq!(summary.samples, 6);
        assert_relative_eq!(summary.rms, 5.0);
    }

    #[test]
    fn test_rms_of_gains() {
        let gains = BTreeMap::from([
            ((0, Feed::X), Array2::from_elem((2, 2), Complex64::new(1.0, 0.0))),
            ((1, Feed::X), Array2::from_elem((2, 2), Complex64::new(0.0, 1.0))),
        ]);
        let summary = ReturnedSummary::new("gains", &ComponentOutput::Gains(gains));
        assert_eq!(summary.kind, "gain");
        assert_eq!(summary.samples, 8);
        assert_relative_eq!(summary.rms, 1.0);
    }

    #[test]
    fn test_rms_of_nothing_is_zero() {
        assert_eq!(rms(std::iter::empty()), 0.0);
    }
}
