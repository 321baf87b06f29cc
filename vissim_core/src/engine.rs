//! The effect-application engine.
//!
//! Additive effects are accumulated into a zero-initialised delta buffer that
//! is added to the dataset only after the whole sweep succeeds. Multiplicative
//! effects compute every gain first, validate them, and then multiply the
//! dataset in place.

use crate::error::{SimError, SimWarning};
use crate::filters::FilterCache;
use crate::geometry::{ArrayGeometry, VisibilityData};
use crate::inclusion::{includes, InclusionFilter};
use crate::ledger::AntPairPolCache;
use crate::model::{EffectModel, Gains, ModelInputs, ModelOutput, ParamRole};
use crate::redundancy::RedundantBaselines;
use crate::seeds::{rng_from_seed, SeedKey, SeedManager, SeedPolicy};
use crate::types::{antnums_to_baseline, AntNum, Polarization, SPEED_OF_LIGHT};
use ndarray::{s, Array2, Array3, Zip};
use num_complex::Complex64;
use rand::RngCore;
use rand_chacha::ChaCha8Rng;
use std::ops::Range;
use tracing::{debug, info, warn};

/// What `apply` hands back when a result is requested.
#[derive(Debug, Clone)]
pub enum ComponentOutput {
    /// Additive contribution, or a per-baseline gain product
    Visibilities(Array3<Complex64>),
    /// Per-(antenna, feed) gains of a multiplicative effect
    Gains(Gains),
}

impl ComponentOutput {
    pub fn as_visibilities(&self) -> Option<&Array3<Complex64>> {
        match self {
            ComponentOutput::Visibilities(vis) => Some(vis),
            ComponentOutput::Gains(_) => None,
        }
    }

    pub fn as_gains(&self) -> Option<&Gains> {
        match self {
            ComponentOutput::Gains(gains) => Some(gains),
            ComponentOutput::Visibilities(_) => None,
        }
    }

    pub fn into_visibilities(self) -> Option<Array3<Complex64>> {
        match self {
            ComponentOutput::Visibilities(vis) => Some(vis),
            ComponentOutput::Gains(_) => None,
        }
    }

    pub fn into_gains(self) -> Option<Gains> {
        match self {
            ComponentOutput::Gains(gains) => Some(gains),
            ComponentOutput::Visibilities(_) => None,
        }
    }
}

/// Per-call switches.
#[derive(Debug, Clone, Copy)]
pub struct ApplyOptions<'a> {
    pub add_to_dataset: bool,
    pub return_result: bool,
    pub seed: SeedPolicy,
    pub filter: Option<&'a InclusionFilter>,
}

/// Mutable simulator state the engine works against.
pub struct ApplyContext<'a> {
    pub data: &'a mut VisibilityData,
    pub reds: &'a RedundantBaselines,
    pub filters: Option<&'a FilterCache>,
    pub seeds: &'a mut SeedManager,
    pub ambient_rng: &'a mut ChaCha8Rng,
    pub warnings: &'a mut Vec<SimWarning>,
}

/// Logs a warning and buffers it for the caller.
pub(crate) fn emit(warnings: &mut Vec<SimWarning>, warning: SimWarning) {
    warn!("{}", warning);
    warnings.push(warning);
}

/// Applies one model to the dataset.
///
/// Returns `Ok(None)` when no result was requested. `visited` receives every
/// (ant1, ant2, pol) the effect touched.
pub fn apply(
    ctx: ApplyContext<'_>,
    model: &dyn EffectModel,
    opts: &ApplyOptions<'_>,
    visited: &mut AntPairPolCache,
) -> Result<Option<ComponentOutput>, SimError> {
    let name = model.name().to_string();

    if !opts.add_to_dataset && !opts.return_result {
        emit(ctx.warnings, SimWarning::NothingToDo { component: name });
        return Ok(None);
    }

    let multiplicative = match model.is_multiplicative() {
        Some(flag) => flag,
        None => {
            emit(
                ctx.warnings,
                SimWarning::MissingMultiplicativeFlag { component: name.clone() },
            );
            false
        }
    };
    opts.seed.check_compatible(&name, multiplicative)?;

    let configured = model.default_params();
    let missing: Vec<String> = model
        .required_params()
        .iter()
        .filter(|key| configured.get(**key).map_or(true, |v| v.is_null()))
        .map(|key| key.to_string())
        .collect();
    if !missing.is_empty() {
        emit(
            ctx.warnings,
            SimWarning::UnresolvedParameters { component: name.clone(), missing },
        );
    }

    info!(
        "Applying {} ({}, seed={}, add={}, return={})",
        name,
        if multiplicative { "multiplicative" } else { "additive" },
        opts.seed,
        opts.add_to_dataset,
        opts.return_result
    );

    let mut sweep = Sweep::new(ctx, &name, opts.seed);
    if multiplicative {
        sweep.multiplicative(model, opts, visited)
    } else {
        sweep.additive(model, opts, visited)
    }
}

struct Sweep<'c, 'n> {
    data: &'c mut VisibilityData,
    reds: &'c RedundantBaselines,
    filters: Option<&'c FilterCache>,
    seeds: &'c mut SeedManager,
    ambient_rng: &'c mut ChaCha8Rng,
    name: &'n str,
    policy: SeedPolicy,
    /// Generator shared across the whole call (explicit and initial seeds)
    call_rng: Option<ChaCha8Rng>,
}

impl<'c, 'n> Sweep<'c, 'n> {
    fn new(ctx: ApplyContext<'c>, name: &'n str, policy: SeedPolicy) -> Self {
        let ApplyContext {
            data,
            reds,
            filters,
            seeds,
            ambient_rng,
            ..
        } = ctx;

        let call_rng = match policy {
            SeedPolicy::Explicit(seed) => Some(rng_from_seed(seed)),
            SeedPolicy::Initial => Some(rng_from_seed(seeds.get_seed(name, SeedKey::Index(-1)))),
            _ => None,
        };
        if policy == SeedPolicy::Redundant {
            seeds.generate_redundant_seeds(name, reds);
        }

        Self {
            data,
            reds,
            filters,
            seeds,
            ambient_rng,
            name,
            policy,
            call_rng,
        }
    }

    /// Generator reseeded for one unit of work, if the policy asks for it.
    fn unit_rng(&mut self, key: Option<SeedKey>) -> Option<ChaCha8Rng> {
        let key = key?;
        Some(rng_from_seed(self.seeds.get_seed(self.name, key)))
    }

    fn baseline_key(&self, ant1: AntNum, ant2: AntNum) -> Option<SeedKey> {
        match self.policy {
            SeedPolicy::Once => Some(SeedKey::Index(0)),
            SeedPolicy::Redundant => {
                let rep = self
                    .reds
                    .group_of(ant1, ant2)
                    .map(|(group, _)| group.representative)
                    .unwrap_or_else(|| antnums_to_baseline(ant1, ant2));
                Some(SeedKey::Group(rep))
            }
            _ => None,
        }
    }

    fn additive(
        &mut self,
        model: &dyn EffectModel,
        opts: &ApplyOptions<'_>,
        visited: &mut AntPairPolCache,
    ) -> Result<Option<ComponentOutput>, SimError> {
        let mut delta = Array3::<Complex64>::zeros(self.data.data.raw_dim());
        let shape = (self.data.n_times(), self.data.n_freqs());
        let (mut simulated, mut reused) = (0usize, 0usize);

        for (ant1, ant2, pol) in self.data.antpairpols() {
            if !includes(opts.filter, ant1, ant2, pol) {
                continue;
            }
            let Some((rows, col)) = self.location(ant1, ant2, pol) else {
                continue;
            };

            let key = self.baseline_key(ant1, ant2);
            let mut unit = self.unit_rng(key);

            if visited.contains_conjugate(ant1, ant2, pol) {
                if let Some((conj_rows, _)) = self.location(ant2, ant1, pol) {
                    let conj = delta.slice(s![conj_rows, .., col]).mapv(|v| v.conj());
                    delta.slice_mut(s![rows, .., col]).assign(&conj);
                    visited.insert(ant1, ant2, pol);
                    reused += 1;
                    continue;
                }
            }

            let data: &VisibilityData = self.data;
            let inputs = resolve_inputs(model, data, self.reds, self.filters, ant1, ant2, pol);
            let rng: &mut dyn RngCore = match (unit.as_mut(), self.call_rng.as_mut()) {
                (Some(rng), _) => rng,
                (None, Some(rng)) => rng,
                (None, None) => &mut *self.ambient_rng,
            };
            let vis = expect_vis(self.name, model.simulate(&inputs, rng), shape)?;
            delta.slice_mut(s![rows, .., col]).assign(&vis);
            visited.insert(ant1, ant2, pol);
            simulated += 1;
        }

        debug!(
            "{}: simulated {} antpairpols, reused {} conjugates",
            self.name, simulated, reused
        );

        if opts.add_to_dataset {
            self.data.data += &delta;
        }
        Ok(opts.return_result.then_some(ComponentOutput::Visibilities(delta)))
    }

    fn multiplicative(
        &mut self,
        model: &dyn EffectModel,
        opts: &ApplyOptions<'_>,
        visited: &mut AntPairPolCache,
    ) -> Result<Option<ComponentOutput>, SimError> {
        let shape = (self.data.n_times(), self.data.n_freqs());
        let mut gains: Gains = Gains::new();

        for feed in self.data.feeds() {
            let key = (self.policy == SeedPolicy::Once).then_some(SeedKey::Feed(feed));
            let mut unit = self.unit_rng(key);

            let data: &VisibilityData = self.data;
            let mut inputs = ModelInputs::new(data.lsts(), data.freqs());
            if model.roles().contains(&ParamRole::AntennaPositions) {
                inputs.antpos = Some(data.antpos());
            }
            inputs.feed = Some(feed);

            let rng: &mut dyn RngCore = match (unit.as_mut(), self.call_rng.as_mut()) {
                (Some(rng), _) => rng,
                (None, Some(rng)) => rng,
                (None, None) => &mut *self.ambient_rng,
            };
            let output = model.simulate(&inputs, rng).map_err(|source| SimError::Model {
                component: self.name.to_string(),
                source,
            })?;
            let per_ant = match output {
                ModelOutput::Gains(per_ant) => per_ant,
                other => {
                    return Err(SimError::UnexpectedOutput {
                        component: self.name.to_string(),
                        declared: "gain",
                        found: other.kind(),
                    })
                }
            };
            for (ant, gain) in per_ant {
                check_shape(self.name, &gain, shape)?;
                gains.insert((ant, feed), gain);
            }
        }

        // Validate every needed gain before touching the data
        let mut targets: Vec<(Range<usize>, usize, AntNum, AntNum, Polarization)> = Vec::new();
        for (ant1, ant2, pol) in self.data.antpairpols() {
            if !includes(opts.filter, ant1, ant2, pol) {
                continue;
            }
            let Some((rows, col)) = self.location(ant1, ant2, pol) else {
                continue;
            };
            let (feed1, feed2) = pol.feeds();
            for (ant, feed) in [(ant1, feed1), (ant2, feed2)] {
                if !gains.contains_key(&(ant, feed)) {
                    return Err(SimError::MissingGain { ant, feed });
                }
            }
            targets.push((rows, col, ant1, ant2, pol));
        }

        for (rows, col, ant1, ant2, pol) in &targets {
            let (feed1, feed2) = pol.feeds();
            if opts.add_to_dataset {
                let g1 = &gains[&(*ant1, feed1)];
                let g2 = &gains[&(*ant2, feed2)];
                let mut block = self.data.data.slice_mut(s![rows.clone(), .., *col]);
                Zip::from(&mut block)
                    .and(g1)
                    .and(g2)
                    .for_each(|d, a, b| *d *= a * b.conj());
            }
            visited.insert(*ant1, *ant2, *pol);
        }
        debug!("{}: applied gains to {} antpairpols", self.name, targets.len());

        Ok(opts.return_result.then_some(ComponentOutput::Gains(gains)))
    }

    fn location(&self, ant1: AntNum, ant2: AntNum, pol: Polarization) -> Option<(Range<usize>, usize)> {
        Some((self.data.antpair_range(ant1, ant2)?, self.data.pol_index(pol)?))
    }
}

/// Fills in exactly the inputs the model declares.
fn resolve_inputs<'d>(
    model: &dyn EffectModel,
    data: &'d VisibilityData,
    reds: &RedundantBaselines,
    filters: Option<&'d FilterCache>,
    ant1: AntNum,
    ant2: AntNum,
    pol: Polarization,
) -> ModelInputs<'d> {
    let mut inputs = ModelInputs::new(data.lsts(), data.freqs());
    inputs.antpair = Some((ant1, ant2));
    inputs.pol = Some(pol);

    let group = reds.group_of(ant1, ant2).map(|(g, conj)| (g.representative, conj));
    for role in model.roles() {
        match role {
            ParamRole::Lsts | ParamRole::Freqs => {}
            ParamRole::AntennaPositions => inputs.antpos = Some(data.antpos()),
            ParamRole::BaselineVector => {
                inputs.bl_vec_ns = data.baseline_vector(ant1, ant2).map(|v| v * 1e9 / SPEED_OF_LIGHT);
            }
            ParamRole::Autocorrelation => inputs.autovis = data.get_data(ant1, ant1, pol),
            ParamRole::DelayFilter => {
                if model.is_smooth_in_freq() {
                    inputs.delay_filter = filters
                        .zip(group)
                        .and_then(|(cache, (rep, _))| cache.delay_filter(rep));
                }
            }
            ParamRole::FringeFilter => {
                inputs.fringe_filter = filters
                    .zip(group)
                    .and_then(|(cache, (rep, conj))| cache.fringe_filter(rep, conj));
            }
        }
    }
    inputs
}

fn check_shape(component: &str, array: &Array2<Complex64>, expected: (usize, usize)) -> Result<(), SimError> {
    if array.dim() != expected {
        return Err(SimError::ShapeMismatch {
            component: component.to_string(),
            expected,
            found: array.dim(),
        });
    }
    Ok(())
}

fn expect_vis(
    component: &str,
    output: Result<ModelOutput, crate::model::ModelError>,
    shape: (usize, usize),
) -> Result<Array2<Complex64>, SimError> {
    let output = output.map_err(|source| SimError::Model {
        component: component.to_string(),
        source,
    })?;
    match output {
        ModelOutput::Vis(vis) => {
            check_shape(component, &vis, shape)?;
            Ok(vis)
        }
        other => Err(SimError::UnexpectedOutput {
            component: component.to_string(),
            declared: "visibility",
            found: other.kind(),
        }),
    }
}
