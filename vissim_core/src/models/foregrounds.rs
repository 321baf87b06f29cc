//! Foreground models: diffuse emission and point sources.

use super::{hour_angles, jy_to_kelvin, parse_params, to_params, uniform, white_noise, BeamArea, SkyTemperature};
use crate::error::SimError;
use crate::filters::{
    fft_lanes, gen_delay_filter, gen_fringe_filter, rough_delay_filter, rough_fringe_filter, DelayFilterParams,
    FringeFilterParams,
};
use crate::model::{EffectModel, ModelError, ModelInputs, ModelOutput, ParamRole, Params};
use crate::types::SIDEREAL_DAY_S;
use ndarray::{Array2, Axis, CowArray};
use num_complex::Complex64;
use rand::RngCore;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};
use std::f64::consts::{FRAC_PI_2, TAU};

/// Parameters of [`DiffuseForeground`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DiffuseForegroundParams {
    /// Sky temperature model (K)
    #[serde(alias = "Tsky_mdl")]
    pub tsky_mdl: Option<SkyTemperature>,

    /// Beam solid angle (sr)
    pub omega_p: Option<BeamArea>,

    /// Used when no cached delay filter is supplied
    pub delay_filter_kwargs: DelayFilterParams,

    /// Used when no cached fringe filter is supplied
    pub fringe_filter_kwargs: FringeFilterParams,
}

/// Diffuse sky emission: white noise scaled to the sky temperature, then
/// fringe- and delay-filtered to the baseline's horizon.
#[derive(Debug, Clone, Default)]
pub struct DiffuseForeground {
    pub params: DiffuseForegroundParams,
}

impl DiffuseForeground {
    pub fn new(params: DiffuseForegroundParams) -> Self {
        Self { params }
    }

    pub fn from_params(params: &Params) -> Result<Box<dyn EffectModel>, SimError> {
        Ok(Box::new(Self::new(parse_params("diffuse_foreground", params)?)))
    }
}

impl EffectModel for DiffuseForeground {
    fn name(&self) -> &str {
        "diffuse_foreground"
    }

    fn is_multiplicative(&self) -> Option<bool> {
        Some(false)
    }

    fn is_smooth_in_freq(&self) -> bool {
        true
    }

    fn roles(&self) -> &[ParamRole] {
        &[
            ParamRole::Lsts,
            ParamRole::Freqs,
            ParamRole::BaselineVector,
            ParamRole::DelayFilter,
            ParamRole::FringeFilter,
        ]
    }

    fn required_params(&self) -> &[&str] {
        &["tsky_mdl", "omega_p"]
    }

    fn default_params(&self) -> Params {
        to_params(&self.params)
    }

    fn simulate(&self, inputs: &ModelInputs<'_>, rng: &mut dyn RngCore) -> Result<ModelOutput, ModelError> {
        let tsky = self
            .params
            .tsky_mdl
            .as_ref()
            .ok_or_else(|| ModelError::MissingParameter("tsky_mdl".into()))?;
        let omega_p = self
            .params
            .omega_p
            .as_ref()
            .ok_or_else(|| ModelError::MissingParameter("omega_p".into()))?
            .evaluate(inputs.freqs)?;
        let bl_vec = inputs.require_bl_vec()?;

        let jy2k = jy_to_kelvin(inputs.freqs, &omega_p);
        let mut vis = tsky.evaluate(inputs.lsts.len(), inputs.freqs).mapv(Complex64::from);
        for mut row in vis.rows_mut() {
            row.zip_mut_with(&jy2k, |v, k| *v /= *k);
        }

        // Autocorrelations see the unfiltered sky
        if bl_vec.norm() < 1e-8 {
            return Ok(ModelOutput::Vis(vis));
        }

        vis = vis * white_noise(inputs.shape(), rng);

        let fringe = match &inputs.fringe_filter {
            Some(cached) => CowArray::from(cached.view()),
            None => CowArray::from(gen_fringe_filter(
                inputs.lsts,
                inputs.freqs,
                bl_vec.x,
                &self.params.fringe_filter_kwargs,
            )),
        };
        let vis = rough_fringe_filter(&vis, fringe.view());

        let delay = match inputs.delay_filter {
            Some(cached) => CowArray::from(cached),
            None => CowArray::from(gen_delay_filter(inputs.freqs, bl_vec.norm(), &self.params.delay_filter_kwargs)),
        };
        Ok(ModelOutput::Vis(rough_delay_filter(&vis, delay.view())))
    }
}

/// Parameters of [`PointSourceForeground`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PointSourceParams {
    pub nsrcs: usize,

    /// Minimum flux density (Jy)
    #[serde(alias = "Smin")]
    pub smin: f64,

    /// Maximum flux density (Jy)
    #[serde(alias = "Smax")]
    pub smax: f64,

    /// Power-law slope of the source counts
    pub beta: f64,

    pub spectral_index_mean: f64,
    pub spectral_index_std: f64,

    /// Frequency at which fluxes are quoted (GHz)
    pub reference_freq: f64,
}

impl Default for PointSourceParams {
    fn default() -> Self {
        Self {
            nsrcs: 1000,
            smin: 0.3,
            smax: 300.0,
            beta: -1.5,
            spectral_index_mean: -1.0,
            spectral_index_std: 0.5,
            reference_freq: 0.15,
        }
    }
}

/// Randomly placed power-law point sources, convolved in time with a
/// Gaussian beam and the baseline's fringe.
#[derive(Debug, Clone, Default)]
pub struct PointSourceForeground {
    pub params: PointSourceParams,
}

impl PointSourceForeground {
    pub fn new(params: PointSourceParams) -> Self {
        Self { params }
    }

    pub fn from_params(params: &Params) -> Result<Box<dyn EffectModel>, SimError> {
        Ok(Box::new(Self::new(parse_params("pntsrc_foreground", params)?)))
    }
}

impl EffectModel for PointSourceForeground {
    fn name(&self) -> &str {
        "pntsrc_foreground"
    }

    fn is_multiplicative(&self) -> Option<bool> {
        Some(false)
    }

    fn roles(&self) -> &[ParamRole] {
        &[ParamRole::Lsts, ParamRole::Freqs, ParamRole::BaselineVector]
    }

    fn default_params(&self) -> Params {
        to_params(&self.params)
    }

    fn simulate(&self, inputs: &ModelInputs<'_>, rng: &mut dyn RngCore) -> Result<ModelOutput, ModelError> {
        let p = &self.params;
        if p.smin <= 0.0 || p.smax < p.smin {
            return Err(ModelError::Invalid(format!(
                "flux range [{}, {}] is not valid",
                p.smin, p.smax
            )));
        }
        let index_dist = Normal::new(p.spectral_index_mean, p.spectral_index_std)
            .map_err(|e| ModelError::Invalid(e.to_string()))?;

        let bl_len_ns = inputs.require_bl_vec()?.norm();
        let (lsts, freqs) = (inputs.lsts, inputs.freqs);
        let f0 = p.reference_freq;

        let ras: Vec<f64> = (0..p.nsrcs).map(|_| uniform(rng, (0.0, TAU))).collect();
        let indices: Vec<f64> = (0..p.nsrcs).map(|_| index_dist.sample(rng)).collect();
        let alpha = p.beta + 1.0;
        let fluxes: Vec<f64> = (0..p.nsrcs)
            .map(|_| {
                let u = uniform(rng, (0.0, 1.0));
                (p.smax.powf(alpha) + p.smin.powf(alpha) * (1.0 - u)).powf(1.0 / alpha)
            })
            .collect();

        let mut vis = Array2::<Complex64>::zeros(inputs.shape());
        if lsts.is_empty() {
            return Ok(ModelOutput::Vis(vis));
        }

        for ((ra, flux), index) in ras.iter().zip(&fluxes).zip(&indices) {
            let ha = hour_angles(lsts, *ra);
            let transit = ha
                .iter()
                .enumerate()
                .fold((0, f64::INFINITY), |best, (i, h)| if h.abs() < best.1 { (i, h.abs()) } else { best })
                .0;
            let dtau = uniform(rng, (-1.0, 1.0)) * 0.1 * bl_len_ns;

            let mut row = vis.row_mut(transit);
            for (v, f) in row.iter_mut().zip(freqs) {
                let amplitude = flux * (f / f0).powf(*index);
                *v += Complex64::from_polar(amplitude, TAU * f * dtau);
            }
        }

        // Beam width in radians of hour angle, hard-wired to a 40' drift
        let has = hour_angles(lsts, 0.0);
        let mut kernel = Array2::from_shape_fn(inputs.shape(), |(t, j)| {
            let width = 40.0 * 60.0 * (f0 / freqs[j]) / SIDEREAL_DAY_S * TAU;
            let ha = has[t];
            let beam = if ha.abs() > FRAC_PI_2 {
                0.0
            } else {
                (-ha * ha / (2.0 * width * width)).exp()
            };
            let w = 0.9 * bl_len_ns * ha.sin() * freqs[j];
            Complex64::from_polar(beam, TAU * w)
        });

        fft_lanes(&mut kernel, Axis(0), false);
        fft_lanes(&mut vis, Axis(0), false);
        vis *= &kernel;
        fft_lanes(&mut vis, Axis(0), true);
        Ok(ModelOutput::Vis(vis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Vector3;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn axes() -> (Vec<f64>, Vec<f64>) {
        let lsts = (0..50).map(|i| i as f64 * TAU / 50.0).collect();
        let freqs = (0..32).map(|i| 0.1 + i as f64 * 0.002).collect();
        (lsts, freqs)
    }

    fn diffuse() -> DiffuseForeground {
        DiffuseForeground::new(DiffuseForegroundParams {
            tsky_mdl: Some(SkyTemperature::PowerLaw { t0: 180.0, f0: 0.18, index: -2.5 }),
            omega_p: Some(BeamArea::Constant(0.1)),
            ..Default::default()
        })
    }

    fn vis(out: ModelOutput) -> Array2<Complex64> {
        match out {
            ModelOutput::Vis(v) => v,
            ModelOutput::Gains(_) => panic!("expected visibilities"),
        }
    }

    #[test]
    fn test_diffuse_requires_sky_model() {
        let (lsts, freqs) = axes();
        let mut inputs = ModelInputs::new(&lsts, &freqs);
        inputs.bl_vec_ns = Some(Vector3::new(50.0, 0.0, 0.0));
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let err = DiffuseForeground::default().simulate(&inputs, &mut rng).unwrap_err();
        assert!(matches!(err, ModelError::MissingParameter(p) if p == "tsky_mdl"));
    }

    #[test]
    fn test_diffuse_autocorrelation_is_unfiltered_sky() {
        let (lsts, freqs) = axes();
        let mut inputs = ModelInputs::new(&lsts, &freqs);
        inputs.bl_vec_ns = Some(Vector3::zeros());
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let out = vis(diffuse().simulate(&inputs, &mut rng).unwrap());
        assert_eq!(out.dim(), (50, 32));
        assert!(out.iter().all(|v| v.im == 0.0 && v.re > 0.0));
    }

    #[test]
    fn test_diffuse_reproducible_for_same_rng() {
        let (lsts, freqs) = axes();
        let mut inputs = ModelInputs::new(&lsts, &freqs);
        inputs.bl_vec_ns = Some(Vector3::new(48.7, 0.0, 0.0));
        let a = vis(diffuse().simulate(&inputs, &mut ChaCha8Rng::seed_from_u64(5)).unwrap());
        let b = vis(diffuse().simulate(&inputs, &mut ChaCha8Rng::seed_from_u64(5)).unwrap());
        assert_eq!(a, b);
        assert!(a.iter().any(|v| v.norm() > 0.0));
    }

    #[test]
    fn test_diffuse_params_accept_capitalized_keys() {
        let params: Params = serde_json::from_str(r#"{"Tsky_mdl": 200.0, "omega_p": 0.2}"#).unwrap();
        let model = DiffuseForeground::from_params(&params).unwrap();
        assert_eq!(model.default_params()["tsky_mdl"], serde_json::json!(200.0));
    }

    #[test]
    fn test_pntsrc_no_sources_is_zero() {
        let (lsts, freqs) = axes();
        let mut inputs = ModelInputs::new(&lsts, &freqs);
        inputs.bl_vec_ns = Some(Vector3::new(48.7, 0.0, 0.0));
        let model = PointSourceForeground::new(PointSourceParams { nsrcs: 0, ..Default::default() });
        let out = vis(model.simulate(&inputs, &mut ChaCha8Rng::seed_from_u64(1)).unwrap());
        assert!(out.iter().all(|v| v.norm() == 0.0));
    }

    #[test]
    fn test_pntsrc_produces_signal() {
        let (lsts, freqs) = axes();
        let mut inputs = ModelInputs::new(&lsts, &freqs);
        inputs.bl_vec_ns = Some(Vector3::new(48.7, 0.0, 0.0));
        let model = PointSourceForeground::new(PointSourceParams { nsrcs: 20, ..Default::default() });
        let a = vis(model.simulate(&inputs, &mut ChaCha8Rng::seed_from_u64(1)).unwrap());
        let b = vis(model.simulate(&inputs, &mut ChaCha8Rng::seed_from_u64(1)).unwrap());
        assert_eq!(a.dim(), (50, 32));
        assert_eq!(a, b);
        assert!(a.iter().any(|v| v.norm() > 0.0));
    }

    #[test]
    fn test_pntsrc_rejects_bad_flux_range() {
        let (lsts, freqs) = axes();
        let mut inputs = ModelInputs::new(&lsts, &freqs);
        inputs.bl_vec_ns = Some(Vector3::new(48.7, 0.0, 0.0));
        let model = PointSourceForeground::new(PointSourceParams { smin: 10.0, smax: 1.0, ..Default::default() });
        assert!(model.simulate(&inputs, &mut ChaCha8Rng::seed_from_u64(1)).is_err());
    }
}
