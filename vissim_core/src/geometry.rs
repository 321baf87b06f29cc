//! Array geometry and the in-memory visibility dataset.
//!
//! Storage is baseline-major: baseline `b` occupies rows
//! `b * n_times .. (b + 1) * n_times` of the data array, so every baseline
//! maps to one contiguous index range.

use crate::error::SimError;
use crate::types::{AntNum, AntPairPol, Feed, Polarization, MAX_ANTNUM};
use nalgebra::Vector3;
use ndarray::{s, Array2, Array3, ArrayView2};
use num_complex::Complex64;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::f64::consts::TAU;
use std::ops::Range;

/// Contract consumed by the redundancy calculator, the filter cache and the
/// effect engine.
pub trait ArrayGeometry {
    /// Antenna ENU positions in metres.
    fn antpos(&self) -> &BTreeMap<AntNum, Vector3<f64>>;

    /// Realized antenna pairs, in storage order.
    fn antpairs(&self) -> &[(AntNum, AntNum)];

    /// Polarizations, in storage order.
    fn pols(&self) -> &[Polarization];

    /// LSTs in radians, one per time, in time order.
    fn lsts(&self) -> &[f64];

    /// Frequencies in GHz.
    fn freqs(&self) -> &[f64];

    /// Storage rows of a baseline, exactly as stored (no conjugate lookup).
    fn antpair_range(&self, ant1: AntNum, ant2: AntNum) -> Option<Range<usize>>;

    /// Storage column of a polarization.
    fn pol_index(&self, pol: Polarization) -> Option<usize> {
        self.pols().iter().position(|p| *p == pol)
    }

    /// Every realized (ant1, ant2, pol), baseline-major then pol order.
    fn antpairpols(&self) -> Vec<AntPairPol> {
        self.antpairs()
            .iter()
            .flat_map(|&(a1, a2)| self.pols().iter().map(move |&p| (a1, a2, p)))
            .collect()
    }

    /// Unique feeds across all polarizations, sorted.
    fn feeds(&self) -> Vec<Feed> {
        let feeds: BTreeSet<Feed> = self
            .pols()
            .iter()
            .flat_map(|p| {
                let (f1, f2) = p.feeds();
                [f1, f2]
            })
            .collect();
        feeds.into_iter().collect()
    }

    /// ENU vector from `ant1` to `ant2` in metres.
    fn baseline_vector(&self, ant1: AntNum, ant2: AntNum) -> Option<Vector3<f64>> {
        let p1 = self.antpos().get(&ant1)?;
        let p2 = self.antpos().get(&ant2)?;
        Some(p2 - p1)
    }
}

/// Instrument description used to build an empty dataset.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ArrayConfig {
    /// Antenna number -> ENU position in metres
    pub antennas: BTreeMap<AntNum, [f64; 3]>,

    /// Number of frequency channels
    pub n_freq: usize,

    /// First channel frequency in GHz
    pub start_freq: f64,

    /// Channel width in GHz
    pub channel_width: f64,

    /// Number of integrations
    pub n_times: usize,

    /// First integration as a Julian date
    pub start_time: f64,

    /// Integration time in seconds
    pub integration_time: f64,

    /// Polarizations to store
    pub pols: Vec<Polarization>,

    /// Drop autocorrelations from the default antpair list
    pub no_autos: bool,

    /// Explicit antpair list (overrides the default enumeration)
    pub antpairs: Option<Vec<(AntNum, AntNum)>>,

    /// Site longitude in degrees (HERA by default)
    pub longitude_deg: f64,
}

impl Default for ArrayConfig {
    fn default() -> Self {
        Self {
            antennas: crate::layouts::linear_array(3, 14.6),
            n_freq: 100,
            start_freq: 0.1,
            channel_width: 0.001,
            n_times: 60,
            start_time: 2_458_119.5,
            integration_time: 10.737_418_24,
            pols: vec![Polarization::Xx],
            no_autos: false,
            antpairs: None,
            longitude_deg: 21.428_305_555_6,
        }
    }
}

/// Local sidereal time in radians for a Julian date and longitude.
///
/// Uses the Earth rotation angle, which is accurate to well under a second
/// of time for simulation purposes.
pub fn jd_to_lst(jd: f64, longitude_deg: f64) -> f64 {
    let era = TAU * (0.779_057_273_264_0 + 1.002_737_811_911_354_48 * (jd - 2_451_545.0));
    (era + longitude_deg.to_radians()).rem_euclid(TAU)
}

/// The dataset: dense complex visibilities plus their axes.
#[derive(Debug, Clone)]
pub struct VisibilityData {
    antpos: BTreeMap<AntNum, Vector3<f64>>,
    antpairs: Vec<(AntNum, AntNum)>,
    antpair_index: HashMap<(AntNum, AntNum), usize>,
    pols: Vec<Polarization>,
    times: Vec<f64>,
    lsts: Vec<f64>,
    freqs: Vec<f64>,

    /// Visibilities, shape (n_bls * n_times, n_freqs, n_pols)
    pub data: Array3<Complex64>,

    /// Free-text record of applied effects
    pub history: String,

    /// Seed bookkeeping and other metadata
    pub extra_keywords: BTreeMap<String, serde_json::Value>,
}

impl VisibilityData {
    /// Builds an all-zero dataset from an array configuration.
    pub fn new(config: &ArrayConfig) -> Result<Self, SimError> {
        if config.n_freq == 0 || config.n_times == 0 {
            return Err(SimError::InvalidConfig(
                "n_freq and n_times must be positive".into(),
            ));
        }
        if config.pols.is_empty() {
            return Err(SimError::InvalidConfig(
                "at least one polarization is required".into(),
            ));
        }

        if let Some(&ant) = config.antennas.keys().find(|&&ant| ant > MAX_ANTNUM) {
            return Err(SimError::InvalidConfig(format!(
                "antenna number {ant} exceeds {MAX_ANTNUM}, the largest a baseline integer can encode"
            )));
        }

        let antpos: BTreeMap<AntNum, Vector3<f64>> = config
            .antennas
            .iter()
            .map(|(&ant, p)| (ant, Vector3::new(p[0], p[1], p[2])))
            .collect();

        let antpairs = match &config.antpairs {
            Some(pairs) => pairs.clone(),
            None => {
                let ants: Vec<AntNum> = antpos.keys().copied().collect();
                let mut pairs = Vec::new();
                for (i, &a1) in ants.iter().enumerate() {
                    for &a2 in &ants[i..] {
                        if a1 == a2 && config.no_autos {
                            continue;
                        }
                        pairs.push((a1, a2));
                    }
                }
                pairs
            }
        };

        let mut antpair_index = HashMap::with_capacity(antpairs.len());
        for (idx, &(a1, a2)) in antpairs.iter().enumerate() {
            for ant in [a1, a2] {
                if !antpos.contains_key(&ant) {
                    return Err(SimError::InvalidConfig(format!(
                        "antpair ({a1}, {a2}) references unknown antenna {ant}"
                    )));
                }
            }
            if antpair_index.insert((a1, a2), idx).is_some() {
                return Err(SimError::InvalidConfig(format!(
                    "duplicate antpair ({a1}, {a2})"
                )));
            }
        }

        let mut pols = Vec::with_capacity(config.pols.len());
        for pol in &config.pols {
            if pols.contains(pol) {
                return Err(SimError::InvalidConfig(format!("duplicate polarization {pol}")));
            }
            pols.push(*pol);
        }

        let times: Vec<f64> = (0..config.n_times)
            .map(|i| config.start_time + i as f64 * config.integration_time / 86_400.0)
            .collect();
        let lsts = times
            .iter()
            .map(|&jd| jd_to_lst(jd, config.longitude_deg))
            .collect();
        let freqs = (0..config.n_freq)
            .map(|i| config.start_freq + i as f64 * config.channel_width)
            .collect();

        let data = Array3::zeros((antpairs.len() * config.n_times, config.n_freq, pols.len()));

        Ok(Self {
            antpos,
            antpairs,
            antpair_index,
            pols,
            times,
            lsts,
            freqs,
            data,
            history: String::new(),
            extra_keywords: BTreeMap::new(),
        })
    }

    pub fn n_times(&self) -> usize {
        self.times.len()
    }

    pub fn n_freqs(&self) -> usize {
        self.freqs.len()
    }

    pub fn n_pols(&self) -> usize {
        self.pols.len()
    }

    pub fn n_bls(&self) -> usize {
        self.antpairs.len()
    }

    /// Julian dates, one per integration.
    pub fn times(&self) -> &[f64] {
        &self.times
    }

    /// Whether the antenna is part of the array.
    pub fn has_antenna(&self, ant: AntNum) -> bool {
        self.antpos.contains_key(&ant)
    }

    /// Whether the pair is stored in either orientation.
    pub fn has_antpair(&self, ant1: AntNum, ant2: AntNum) -> bool {
        self.antpair_index.contains_key(&(ant1, ant2))
            || self.antpair_index.contains_key(&(ant2, ant1))
    }

    /// Samples for a stored (ant1, ant2, pol), shape (n_times, n_freqs).
    pub fn get_data(&self, ant1: AntNum, ant2: AntNum, pol: Polarization) -> Option<ArrayView2<'_, Complex64>> {
        let rows = self.antpair_range(ant1, ant2)?;
        let col = self.pol_index(pol)?;
        Some(self.data.slice(s![rows, .., col]))
    }

    /// Samples for (ant1, ant2, pol), conjugating when only the reverse
    /// orientation is stored.
    pub fn baseline_data(&self, ant1: AntNum, ant2: AntNum, pol: Polarization) -> Option<Array2<Complex64>> {
        if let Some(view) = self.get_data(ant1, ant2, pol) {
            return Some(view.to_owned());
        }
        self.get_data(ant2, ant1, pol).map(|view| view.mapv(|v| v.conj()))
    }

    /// True when every sample is exactly zero.
    pub fn is_zero(&self) -> bool {
        self.data.iter().all(|v| v.re == 0.0 && v.im == 0.0)
    }

    /// Zeros the visibilities and clears history and keywords.
    pub fn reset(&mut self) {
        self.data.fill(Complex64::new(0.0, 0.0));
        self.history.clear();
        self.extra_keywords.clear();
    }
}

impl ArrayGeometry for VisibilityData {
    fn antpos(&self) -> &BTreeMap<AntNum, Vector3<f64>> {
        &self.antpos
    }

    fn antpairs(&self) -> &[(AntNum, AntNum)] {
        &self.antpairs
    }

    fn pols(&self) -> &[Polarization] {
        &self.pols
    }

    fn lsts(&self) -> &[f64] {
        &self.lsts
    }

    fn freqs(&self) -> &[f64] {
        &self.freqs
    }

    fn antpair_range(&self, ant1: AntNum, ant2: AntNum) -> Option<Range<usize>> {
        let idx = *self.antpair_index.get(&(ant1, ant2))?;
        let n = self.times.len();
        Some(idx * n..(idx + 1) * n)
    }
}
