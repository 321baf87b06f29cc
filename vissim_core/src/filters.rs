//! Delay- and fringe-rate-domain filters, and the per-group filter cache.
//!
//! Filters depend only on a baseline's length (delay) or east-west length
//! (fringe), so one filter per redundant group serves every member. The
//! fringe filter of a conjugate-direction member is time-reversed.

use crate::error::SimError;
use crate::geometry::ArrayGeometry;
use crate::redundancy::RedundantBaselines;
use crate::types::{meters_to_ns, BaselineInt, SIDEREAL_DAY_S};
use ndarray::{s, Array1, Array2, ArrayView1, ArrayView2, Axis, CowArray, Ix2};
use num_complex::Complex64;
use rustfft::FftPlanner;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::f64::consts::TAU;
use tracing::debug;

/// Shape of a delay-domain filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DelayFilterType {
    None,
    #[default]
    Tophat,
    Gauss,
    TruncGauss,
}

/// Shape of a fringe-rate-domain filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FringeFilterType {
    None,
    #[default]
    Tophat,
    Gauss,
}

/// Delay filter settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DelayFilterParams {
    /// Added to the baseline length before computing the horizon (ns)
    pub standoff: f64,
    pub delay_filter_type: DelayFilterType,
    /// Zero all delays below this magnitude (ns)
    pub min_delay: Option<f64>,
    /// Zero all delays above this magnitude (ns)
    pub max_delay: Option<f64>,
    /// Rescale so the filter has this RMS
    pub normalize: Option<f64>,
}

impl Default for DelayFilterParams {
    fn default() -> Self {
        Self {
            standoff: 0.0,
            delay_filter_type: DelayFilterType::Tophat,
            min_delay: None,
            max_delay: None,
            normalize: None,
        }
    }
}

/// Fringe filter settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FringeFilterParams {
    pub fringe_filter_type: FringeFilterType,
    /// Gaussian width in Hz
    pub fr_width: f64,
}

impl Default for FringeFilterParams {
    fn default() -> Self {
        Self {
            fringe_filter_type: FringeFilterType::Tophat,
            fr_width: 1e-4,
        }
    }
}

/// Sample frequencies of a length-`n` DFT with spacing `d` (numpy ordering).
pub fn fftfreq(n: usize, d: f64) -> Array1<f64> {
    let half = (n + 1) / 2;
    Array1::from_iter((0..n).map(|i| {
        let k = if i < half { i as f64 } else { i as f64 - n as f64 };
        k / (n as f64 * d)
    }))
}

/// Delay axis (ns) for frequencies in GHz.
pub fn delays(freqs: &[f64]) -> Array1<f64> {
    let df = if freqs.len() >= 2 { freqs[1] - freqs[0] } else { 1.0 };
    fftfreq(freqs.len(), df)
}

/// Fringe-rate axis (Hz) for LSTs in radians.
pub fn fringe_rates(lsts: &[f64]) -> Array1<f64> {
    let dt = if lsts.len() >= 2 {
        (lsts[1] - lsts[0]).rem_euclid(TAU) / TAU * SIDEREAL_DAY_S
    } else {
        1.0
    };
    fftfreq(lsts.len(), dt)
}

/// Maximum fringe rate (Hz) per frequency for an east-west length in ns.
pub fn calc_max_fringe_rate(freqs: &[f64], ew_bl_len_ns: f64) -> Array1<f64> {
    Array1::from_iter(freqs.iter().map(|f| TAU / SIDEREAL_DAY_S * f * ew_bl_len_ns))
}

/// Builds a delay filter over the DFT of the frequency axis.
pub fn gen_delay_filter(freqs: &[f64], bl_len_ns: f64, params: &DelayFilterParams) -> Array1<f64> {
    let delays = delays(freqs);
    let one_sigma = (bl_len_ns + params.standoff) / 4.0;
    let horizon = one_sigma * 4.0;
    let gauss = |tau: f64| (-0.5 * (tau / one_sigma).powi(2)).exp();

    let mut filter = delays.mapv(|tau| match params.delay_filter_type {
        DelayFilterType::None => 1.0,
        DelayFilterType::Tophat => {
            if tau.abs() > horizon {
                0.0
            } else {
                1.0
            }
        }
        DelayFilterType::Gauss => gauss(tau),
        DelayFilterType::TruncGauss => {
            if tau.abs() > horizon {
                0.0
            } else {
                gauss(tau)
            }
        }
    });

    if let Some(min_delay) = params.min_delay {
        filter.zip_mut_with(&delays, |f, tau| {
            if tau.abs() < min_delay {
                *f = 0.0;
            }
        });
    }
    if let Some(max_delay) = params.max_delay {
        filter.zip_mut_with(&delays, |f, tau| {
            if tau.abs() > max_delay {
                *f = 0.0;
            }
        });
    }
    if let Some(normalize) = params.normalize {
        let norm = filter.mapv(|f| f * f).sum().sqrt();
        if norm > 0.0 {
            filter *= normalize / norm * (filter.len() as f64).sqrt();
        }
    }
    filter
}

/// Builds a fringe-rate filter, shape (n_times, n_freqs).
pub fn gen_fringe_filter(
    lsts: &[f64],
    freqs: &[f64],
    ew_bl_len_ns: f64,
    params: &FringeFilterParams,
) -> Array2<f64> {
    let rates = fringe_rates(lsts);
    let fr_max = calc_max_fringe_rate(freqs, ew_bl_len_ns);

    Array2::from_shape_fn((lsts.len(), freqs.len()), |(t, f)| {
        match params.fringe_filter_type {
            FringeFilterType::None => 1.0,
            FringeFilterType::Tophat => {
                if rates[t].abs() <= fr_max[f].abs() {
                    1.0
                } else {
                    0.0
                }
            }
            FringeFilterType::Gauss => {
                (-0.5 * ((rates[t] - fr_max[f]) / params.fr_width).powi(2)).exp()
            }
        }
    })
}

pub(crate) fn fft_lanes(data: &mut Array2<Complex64>, axis: Axis, inverse: bool) {
    let n = data.len_of(axis);
    if n == 0 {
        return;
    }
    let mut planner = FftPlanner::<f64>::new();
    let fft = if inverse {
        planner.plan_fft_inverse(n)
    } else {
        planner.plan_fft_forward(n)
    };
    let scale = if inverse { 1.0 / n as f64 } else { 1.0 };

    let mut buffer = vec![Complex64::new(0.0, 0.0); n];
    for mut lane in data.lanes_mut(axis) {
        for (b, v) in buffer.iter_mut().zip(lane.iter()) {
            *b = *v;
        }
        fft.process(&mut buffer);
        for (v, b) in lane.iter_mut().zip(buffer.iter()) {
            *v = *b * scale;
        }
    }
}

/// Applies a delay filter along the frequency axis of (n_times, n_freqs) data.
pub fn rough_delay_filter(data: &Array2<Complex64>, filter: ArrayView1<'_, f64>) -> Array2<Complex64> {
    let mut out = data.clone();
    fft_lanes(&mut out, Axis(1), false);
    for mut row in out.rows_mut() {
        row.zip_mut_with(&filter, |v, f| *v *= *f);
    }
    fft_lanes(&mut out, Axis(1), true);
    out
}

/// Applies a fringe-rate filter along the time axis of (n_times, n_freqs) data.
pub fn rough_fringe_filter(data: &Array2<Complex64>, filter: ArrayView2<'_, f64>) -> Array2<Complex64> {
    let mut out = data.clone();
    fft_lanes(&mut out, Axis(0), false);
    out.zip_mut_with(&filter, |v, f| *v *= *f);
    fft_lanes(&mut out, Axis(0), true);
    out
}

/// Precomputed filters keyed by redundant-group representative.
#[derive(Debug, Clone, Default)]
pub struct FilterCache {
    delay: HashMap<BaselineInt, Array1<f64>>,
    fringe: HashMap<BaselineInt, Array2<f64>>,
}

impl FilterCache {
    /// Computes one delay and one fringe filter per redundant group.
    pub fn build(
        geometry: &impl ArrayGeometry,
        reds: &RedundantBaselines,
        delay_params: &DelayFilterParams,
        fringe_params: &FringeFilterParams,
    ) -> Result<Self, SimError> {
        if fringe_params.fringe_filter_type == FringeFilterType::Gauss && fringe_params.fr_width <= 0.0 {
            return Err(SimError::InvalidConfig("fr_width must be positive".into()));
        }

        let mut cache = Self::default();
        for group in reds.groups() {
            let bl_len_ns = meters_to_ns(group.length);
            let ew_len_ns = meters_to_ns(group.vector.x);
            cache.delay.insert(
                group.representative,
                gen_delay_filter(geometry.freqs(), bl_len_ns, delay_params),
            );
            cache.fringe.insert(
                group.representative,
                gen_fringe_filter(geometry.lsts(), geometry.freqs(), ew_len_ns, fringe_params),
            );
        }
        debug!("Filter cache built for {} redundant groups", reds.len());
        Ok(cache)
    }

    pub fn delay_filter(&self, representative: BaselineInt) -> Option<ArrayView1<'_, f64>> {
        self.delay.get(&representative).map(|f| f.view())
    }

    /// Fringe filter for a group member; time-reversed for conjugate-direction
    /// members.
    pub fn fringe_filter(&self, representative: BaselineInt, conjugated: bool) -> Option<CowArray<'_, f64, Ix2>> {
        let filter = self.fringe.get(&representative)?;
        Some(if conjugated {
            CowArray::from(filter.slice(s![..;-1, ..]).to_owned())
        } else {
            CowArray::from(filter.view())
        })
    }

    pub fn len(&self) -> usize {
        self.delay.len()
    }

    pub fn is_empty(&self) -> bool {
        self.delay.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::white_noise;
    use crate::geometry::{ArrayConfig, VisibilityData};
    use crate::layouts::linear_array;
    use crate::redundancy::DEFAULT_TOLERANCE_M;
    use approx::assert_relative_eq;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn freqs() -> Vec<f64> {
        (0..100).map(|i| 0.1 + i as f64 * 0.001).collect()
    }

    fn lsts() -> Vec<f64> {
        (0..200).map(|i| i as f64 * TAU / 200.0).collect()
    }

    #[test]
    fn test_fftfreq_matches_numpy() {
        let f = fftfreq(5, 0.1);
        let expected = [0.0, 2.0, 4.0, -4.0, -2.0];
        for (a, b) in f.iter().zip(expected) {
            assert_relative_eq!(*a, b, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_delay_filter_tophat() {
        for (bl, standoff) in [(50.0, 0.0), (100.0, 20.0)] {
            let params = DelayFilterParams { standoff, ..Default::default() };
            let filter = gen_delay_filter(&freqs(), bl, &params);
            for (f, tau) in filter.iter().zip(delays(&freqs()).iter()) {
                let expected = if tau.abs() > bl + standoff { 0.0 } else { 1.0 };
                assert_eq!(*f, expected);
            }
        }
    }

    #[test]
    fn test_delay_filter_none() {
        let params = DelayFilterParams {
            delay_filter_type: DelayFilterType::None,
            ..Default::default()
        };
        assert!(gen_delay_filter(&freqs(), 120.0, &params).iter().all(|&f| f == 1.0));
    }

    #[test]
    fn test_delay_filter_gauss_and_trunc() {
        let bl = 60.0;
        let sigma = bl / 4.0;
        for kind in [DelayFilterType::Gauss, DelayFilterType::TruncGauss] {
            let params = DelayFilterParams { delay_filter_type: kind, ..Default::default() };
            let filter = gen_delay_filter(&freqs(), bl, &params);
            for (f, tau) in filter.iter().zip(delays(&freqs()).iter()) {
                let mut expected = (-0.5 * (tau / sigma).powi(2)).exp();
                if kind == DelayFilterType::TruncGauss && tau.abs() > bl {
                    expected = 0.0;
                }
                assert_relative_eq!(*f, expected, epsilon = 1e-12);
            }
        }
    }

    #[test]
    fn test_delay_filter_bounds() {
        let params = DelayFilterParams {
            delay_filter_type: DelayFilterType::None,
            min_delay: Some(100.0),
            max_delay: Some(300.0),
            ..Default::default()
        };
        let filter = gen_delay_filter(&freqs(), 100.0, &params);
        for (f, tau) in filter.iter().zip(delays(&freqs()).iter()) {
            if tau.abs() < 100.0 || tau.abs() > 300.0 {
                assert_eq!(*f, 0.0);
            } else {
                assert_eq!(*f, 1.0);
            }
        }
    }

    #[test]
    fn test_delay_filter_normalize() {
        for normalize in [0.5, 1.0, 2.0] {
            let params = DelayFilterParams {
                delay_filter_type: DelayFilterType::None,
                normalize: Some(normalize),
                ..Default::default()
            };
            for f in gen_delay_filter(&freqs(), 100.0, &params).iter() {
                assert_relative_eq!(*f, normalize, epsilon = 1e-9);
            }
        }
    }

    #[test]
    fn test_fringe_filter_tophat_symmetry() {
        for bl in [50.0, 150.0] {
            let filter = gen_fringe_filter(&lsts(), &freqs(), bl, &FringeFilterParams::default());
            let n = filter.nrows();
            for i in 1..n / 2 {
                assert_eq!(filter.row(i), filter.row(n - i));
            }
        }
    }

    #[test]
    fn test_fringe_filter_tophat_low_pass() {
        let bl = 50.0;
        let filter = gen_fringe_filter(&lsts(), &freqs(), bl, &FringeFilterParams::default());
        let rates = fringe_rates(&lsts());
        let fr_max = calc_max_fringe_rate(&freqs(), bl);
        for ((t, f), v) in filter.indexed_iter() {
            let expected = if rates[t].abs() <= fr_max[f] { 1.0 } else { 0.0 };
            assert_eq!(*v, expected);
        }
    }

    #[test]
    fn test_fringe_filter_none() {
        let params = FringeFilterParams {
            fringe_filter_type: FringeFilterType::None,
            ..Default::default()
        };
        assert!(gen_fringe_filter(&lsts(), &freqs(), 75.0, &params).iter().all(|&v| v == 1.0));
    }

    #[test]
    fn test_fringe_filter_gauss_peak() {
        let bl = 50.0;
        let params = FringeFilterParams {
            fringe_filter_type: FringeFilterType::Gauss,
            fr_width: 1e-4,
        };
        let filter = gen_fringe_filter(&lsts(), &freqs(), bl, &params);
        let rates = fringe_rates(&lsts());
        let step = rates[1] - rates[0];
        let fr_max = calc_max_fringe_rate(&freqs(), bl);
        for (f, column) in filter.axis_iter(Axis(1)).enumerate() {
            let (peak, _) = column
                .iter()
                .enumerate()
                .fold((0, f64::MIN), |best, (i, &v)| if v > best.1 { (i, v) } else { best });
            assert!((rates[peak] - fr_max[f]).abs() <= step);
        }
    }

    #[test]
    fn test_all_pass_filters_preserve_data() {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let data = white_noise((16, 8), &mut rng);

        let delay = Array1::ones(8);
        let out = rough_delay_filter(&data, delay.view());
        let fringe = Array2::ones((16, 8));
        let out2 = rough_fringe_filter(&out, fringe.view());

        for (a, b) in data.iter().zip(out2.iter()) {
            assert_relative_eq!(a.re, b.re, epsilon = 1e-9);
            assert_relative_eq!(a.im, b.im, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_zero_filter_kills_data() {
        let mut rng = ChaCha8Rng::seed_from_u64(4);
        let data = white_noise((4, 8), &mut rng);
        let out = rough_delay_filter(&data, Array1::zeros(8).view());
        assert!(out.iter().all(|v| v.norm() < 1e-12));
    }

    #[test]
    fn test_filter_cache_one_per_group_and_reversal() {
        let data = VisibilityData::new(&ArrayConfig {
            antennas: linear_array(4, 14.6),
            no_autos: true,
            n_freq: 16,
            n_times: 8,
            ..Default::default()
        })
        .unwrap();
        let reds = RedundantBaselines::compute(&data, DEFAULT_TOLERANCE_M);
        let cache = FilterCache::build(
            &data,
            &reds,
            &DelayFilterParams::default(),
            &FringeFilterParams::default(),
        )
        .unwrap();

        assert_eq!(cache.len(), reds.len());

        let rep = reds.groups()[0].representative;
        let forward = cache.fringe_filter(rep, false).unwrap();
        let reversed = cache.fringe_filter(rep, true).unwrap();
        let n = forward.nrows();
        for t in 0..n {
            assert_eq!(forward.row(t), reversed.row(n - 1 - t));
        }
        assert!(cache.delay_filter(rep).is_some());
        assert!(cache.delay_filter(0).is_none());
    }

    #[test]
    fn test_filter_params_serde_defaults() {
        let params: DelayFilterParams =
            serde_json::from_str(r#"{"delay_filter_type": "trunc_gauss"}"#).unwrap();
        assert_eq!(params.delay_filter_type, DelayFilterType::TruncGauss);
        assert_eq!(params.standoff, 0.0);
        assert!(serde_json::from_str::<DelayFilterParams>(r#"{"bogus": 1}"#).is_err());
    }
}
