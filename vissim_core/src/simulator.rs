//! The simulator facade: owns the dataset and composes effects into it.

use crate::engine::{self, emit, ApplyContext, ApplyOptions, ComponentOutput};
use crate::error::{SimError, SimWarning};
use crate::filters::{DelayFilterParams, FilterCache, FringeFilterParams};
use crate::geometry::{ArrayConfig, ArrayGeometry, VisibilityData};
use crate::inclusion::{includes, InclusionFilter};
use crate::ledger::{AntPairPolCache, ComponentLedger, ComponentRecord};
use crate::model::{EffectModel, Gains, Params};
use crate::redundancy::{RedundantBaselines, DEFAULT_TOLERANCE_M};
use crate::registry::{ModelCtor, ModelRegistry};
use crate::seeds::{rng_from_seed, SeedManager, SeedPolicy};
use crate::types::{AntNum, Polarization};
use ndarray::{s, Array3, Axis};
use num_complex::Complex64;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::sync::Arc;
use tracing::{debug, info};
use vissim_env::{EntropySource, SeededEntropy, WallClockEntropy};

/// Options for a single `add`.
#[derive(Debug, Clone)]
pub struct AddOptions {
    /// Keep the effect in the dataset
    pub add_to_dataset: bool,

    /// Hand the effect back to the caller
    pub return_result: bool,

    pub seed: SeedPolicy,

    pub filter: Option<InclusionFilter>,

    /// Model parameters (registry models only)
    pub params: Params,
}

impl Default for AddOptions {
    fn default() -> Self {
        Self {
            add_to_dataset: true,
            return_result: false,
            seed: SeedPolicy::Unseeded,
            filter: None,
            params: Params::new(),
        }
    }
}

impl AddOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn param(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.params.insert(key.to_string(), value.into());
        self
    }

    pub fn params(mut self, params: Params) -> Self {
        self.params = params;
        self
    }

    pub fn seed(mut self, seed: impl Into<SeedPolicy>) -> Self {
        self.seed = seed.into();
        self
    }

    pub fn filter(mut self, filter: InclusionFilter) -> Self {
        self.filter = Some(filter);
        self
    }

    /// Compute and return the effect without keeping it.
    pub fn return_only(mut self) -> Self {
        self.add_to_dataset = false;
        self.return_result = true;
        self
    }

    pub fn keep_and_return(mut self) -> Self {
        self.add_to_dataset = true;
        self.return_result = true;
        self
    }
}

/// One step of a batch run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PlanEntry {
    pub component: String,

    #[serde(default)]
    pub params: Params,

    #[serde(default)]
    pub seed: SeedPolicy,

    #[serde(default)]
    pub filter: Option<InclusionFilter>,

    #[serde(default = "default_true")]
    pub add: bool,

    #[serde(default)]
    pub ret: bool,
}

fn default_true() -> bool {
    true
}

impl PlanEntry {
    pub fn new(component: &str) -> Self {
        Self {
            component: component.to_string(),
            params: Params::new(),
            seed: SeedPolicy::Unseeded,
            filter: None,
            add: true,
            ret: false,
        }
    }

    fn options(&self) -> AddOptions {
        AddOptions {
            add_to_dataset: self.add,
            return_result: self.ret,
            seed: self.seed,
            filter: self.filter.clone(),
            params: self.params.clone(),
        }
    }
}

/// Composes systematic and sky effects into a visibility dataset.
pub struct Simulator {
    data: VisibilityData,
    registry: ModelRegistry,
    ledger: ComponentLedger,
    seeds: SeedManager,
    reds: RedundantBaselines,
    filters: Option<FilterCache>,
    ambient_rng: ChaCha8Rng,
    warnings: Vec<SimWarning>,
}

impl Simulator {
    /// Wraps an existing dataset.
    pub fn new(data: VisibilityData, entropy: Box<dyn EntropySource>) -> Self {
        let mut seeds = SeedManager::new(entropy);
        let ambient_rng = rng_from_seed(seeds.fresh_seed());
        let reds = RedundantBaselines::compute(&data, DEFAULT_TOLERANCE_M);
        info!(
            "Simulator ready: {} baselines, {} times, {} freqs, {} pols, {} redundant groups",
            data.n_bls(),
            data.n_times(),
            data.n_freqs(),
            data.n_pols(),
            reds.len()
        );
        Self {
            data,
            registry: ModelRegistry::with_builtins(),
            ledger: ComponentLedger::new(),
            seeds,
            reds,
            filters: None,
            ambient_rng,
            warnings: Vec::new(),
        }
    }

    /// Empty dataset with seeds drawn from the wall clock.
    pub fn from_config(config: &ArrayConfig) -> Result<Self, SimError> {
        let entropy = WallClockEntropy::new()?;
        Ok(Self::new(VisibilityData::new(config)?, Box::new(entropy)))
    }

    /// Empty dataset whose every seed derives from `seed`.
    pub fn with_seed(config: &ArrayConfig, seed: u64) -> Result<Self, SimError> {
        Ok(Self::new(VisibilityData::new(config)?, Box::new(SeededEntropy::new(seed))))
    }

    /// Registers an additional model constructor.
    pub fn register(&mut self, name: &'static str, aliases: &[&'static str], ctor: ModelCtor) {
        self.registry.register(name, aliases, ctor);
    }

    /// Applies a registered model by name or alias.
    pub fn add(&mut self, component: &str, opts: AddOptions) -> Result<Option<ComponentOutput>, SimError> {
        let entry = self.registry.resolve(component)?;
        let name = entry.name.to_string();
        let model: Arc<dyn EffectModel> = Arc::from(entry.build(&opts.params)?);
        self.apply_component(name, model, opts, false)
    }

    /// Applies a model instance. It is kept in the ledger so `get` can re-run
    /// it.
    pub fn add_model(
        &mut self,
        model: Box<dyn EffectModel>,
        opts: AddOptions,
    ) -> Result<Option<ComponentOutput>, SimError> {
        let name = model.name().to_string();
        self.apply_component(name, Arc::from(model), opts, true)
    }

    fn apply_component(
        &mut self,
        name: String,
        model: Arc<dyn EffectModel>,
        opts: AddOptions,
        is_instance: bool,
    ) -> Result<Option<ComponentOutput>, SimError> {
        let multiplicative = model.is_multiplicative().unwrap_or(false);
        if opts.add_to_dataset {
            if multiplicative && self.data.is_zero() {
                emit(
                    &mut self.warnings,
                    SimWarning::MultiplicativeOnEmptyData { component: name.clone() },
                );
            }
            if !multiplicative && self.ledger.has_multiplicative() {
                emit(
                    &mut self.warnings,
                    SimWarning::AdditiveAfterMultiplicative { component: name.clone() },
                );
            }
        }

        let mut visited = AntPairPolCache::default();
        let output = engine::apply(
            self.context(),
            model.as_ref(),
            &ApplyOptions {
                add_to_dataset: opts.add_to_dataset,
                return_result: opts.return_result,
                seed: opts.seed,
                filter: opts.filter.as_ref(),
            },
            &mut visited,
        )?;

        if opts.add_to_dataset {
            let seeds = self.seeds.seed_keywords(&name, opts.seed);
            let single = format!("{name}_seed");
            let prefix = format!("{name}_seed_");
            self.data
                .extra_keywords
                .retain(|key, _| *key != single && !key.starts_with(&prefix));
            for (key, seed) in &seeds {
                self.data.extra_keywords.insert(key.clone(), serde_json::json!(seed));
            }

            let params = if is_instance { model.default_params() } else { opts.params };
            self.append_history(&name, &params);

            let record = ComponentRecord {
                name,
                params,
                seed: opts.seed,
                filter: opts.filter,
                is_multiplicative: multiplicative,
                seeds,
            };
            let instance = is_instance.then_some(model);
            self.ledger.record(record, visited, instance);
        }
        Ok(output)
    }

    fn append_history(&mut self, name: &str, params: &Params) {
        let history = &mut self.data.history;
        let _ = writeln!(
            history,
            "vissim v{}: Added {} using kwargs:",
            env!("CARGO_PKG_VERSION"),
            name
        );
        for (key, value) in params {
            let _ = writeln!(history, "{key} = {value}");
        }
    }

    fn context(&mut self) -> ApplyContext<'_> {
        ApplyContext {
            data: &mut self.data,
            reds: &self.reds,
            filters: self.filters.as_ref(),
            seeds: &mut self.seeds,
            ambient_rng: &mut self.ambient_rng,
            warnings: &mut self.warnings,
        }
    }

    /// Recomputes a kept effect without touching the dataset.
    ///
    /// Additive effects come back as visibilities, optionally restricted to
    /// one baseline and/or polarization. Multiplicative effects come back as
    /// gains, or as the per-baseline product `g1 * conj(g2)` when a baseline
    /// is requested.
    pub fn get(
        &mut self,
        component: &str,
        antpair: Option<(AntNum, AntNum)>,
        pol: Option<Polarization>,
    ) -> Result<ComponentOutput, SimError> {
        let name = self.kept_name(component)?;
        if let Some((ant1, ant2)) = antpair {
            for ant in [ant1, ant2] {
                if !self.data.has_antenna(ant) {
                    return Err(SimError::UnknownAntenna(ant));
                }
            }
            if !self.data.has_antpair(ant1, ant2) {
                return Err(SimError::UnknownBaseline(ant1, ant2));
            }
        }
        let pol_idx = match pol {
            Some(p) => Some(
                self.data
                    .pol_index(p)
                    .ok_or_else(|| SimError::UnknownPolarization(p.to_string()))?,
            ),
            None => None,
        };

        let record = self
            .ledger
            .get(&name)
            .cloned()
            .ok_or_else(|| SimError::NotSimulated(name.clone()))?;
        if !record.seed.is_seeded() {
            emit(
                &mut self.warnings,
                SimWarning::UnseededRetrieval { component: name.clone() },
            );
        }

        let requested_pols: Vec<Polarization> = match pol {
            Some(p) => vec![p],
            None => self.data.pols().to_vec(),
        };

        // A baseline the filter never touched has no contribution to re-run
        if let Some((ant1, ant2)) = antpair {
            let excluded = requested_pols
                .iter()
                .all(|&p| !includes(record.filter.as_ref(), ant1, ant2, p));
            if excluded {
                debug!("{}: ({}, {}) was excluded by the recorded filter", name, ant1, ant2);
                let fill = if record.is_multiplicative {
                    Complex64::new(1.0, 0.0)
                } else {
                    Complex64::new(0.0, 0.0)
                };
                return Ok(ComponentOutput::Visibilities(Array3::from_elem(
                    (self.data.n_times(), self.data.n_freqs(), requested_pols.len()),
                    fill,
                )));
            }
        }

        let model = self.ledger.model_for(&name, &self.registry)?;
        let mut scratch = AntPairPolCache::default();
        let output = engine::apply(
            self.context(),
            model.as_ref(),
            &ApplyOptions {
                add_to_dataset: false,
                return_result: true,
                seed: record.seed,
                filter: record.filter.as_ref(),
            },
            &mut scratch,
        )?
        .ok_or_else(|| SimError::NotSimulated(name.clone()))?;

        match output {
            ComponentOutput::Visibilities(delta) => Ok(ComponentOutput::Visibilities(
                self.slice_visibilities(delta, antpair, pol_idx),
            )),
            ComponentOutput::Gains(gains) => match antpair {
                Some((ant1, ant2)) => Ok(ComponentOutput::Visibilities(self.gain_product(
                    &gains,
                    ant1,
                    ant2,
                    &requested_pols,
                    record.filter.as_ref(),
                )?)),
                None => Ok(ComponentOutput::Gains(match pol {
                    Some(p) => {
                        let (f1, f2) = p.feeds();
                        gains
                            .into_iter()
                            .filter(|((_, feed), _)| *feed == f1 || *feed == f2)
                            .collect()
                    }
                    None => gains,
                })),
            },
        }
    }

    /// Resolves the ledger name of a kept component from a name or alias.
    fn kept_name(&self, component: &str) -> Result<String, SimError> {
        if self.ledger.get(component).is_some() {
            return Ok(component.to_string());
        }
        match self.registry.resolve(component) {
            Ok(entry) if self.ledger.get(entry.name).is_some() => Ok(entry.name.to_string()),
            _ => Err(SimError::NotSimulated(component.to_string())),
        }
    }

    fn slice_visibilities(
        &self,
        delta: Array3<Complex64>,
        antpair: Option<(AntNum, AntNum)>,
        pol_idx: Option<usize>,
    ) -> Array3<Complex64> {
        let delta = match pol_idx {
            Some(idx) => delta.slice(s![.., .., idx..idx + 1]).to_owned(),
            None => delta,
        };
        let Some((ant1, ant2)) = antpair else {
            return delta;
        };
        if let Some(rows) = self.data.antpair_range(ant1, ant2) {
            return delta.slice(s![rows, .., ..]).to_owned();
        }
        match self.data.antpair_range(ant2, ant1) {
            Some(rows) => delta.slice(s![rows, .., ..]).mapv(|v| v.conj()),
            None => Array3::zeros((0, delta.len_of(Axis(1)), delta.len_of(Axis(2)))),
        }
    }

    fn gain_product(
        &self,
        gains: &Gains,
        ant1: AntNum,
        ant2: AntNum,
        pols: &[Polarization],
        filter: Option<&InclusionFilter>,
    ) -> Result<Array3<Complex64>, SimError> {
        let mut product = Array3::from_elem(
            (self.data.n_times(), self.data.n_freqs(), pols.len()),
            Complex64::new(1.0, 0.0),
        );
        for (idx, &pol) in pols.iter().enumerate() {
            if !includes(filter, ant1, ant2, pol) {
                continue;
            }
            let (feed1, feed2) = pol.feeds();
            let g1 = gains
                .get(&(ant1, feed1))
                .ok_or(SimError::MissingGain { ant: ant1, feed: feed1 })?;
            let g2 = gains
                .get(&(ant2, feed2))
                .ok_or(SimError::MissingGain { ant: ant2, feed: feed2 })?;
            let mut plane = product.index_axis_mut(Axis(2), idx);
            ndarray::Zip::from(&mut plane)
                .and(g1)
                .and(g2)
                .for_each(|p, a, b| *p = a * b.conj());
        }
        Ok(product)
    }

    /// Zeros the dataset and forgets every applied effect and seed.
    pub fn refresh(&mut self) {
        self.data.reset();
        self.ledger.clear();
        self.seeds.clear();
        self.filters = None;
        info!("Simulator refreshed");
    }

    /// Precomputes delay and fringe filters for every redundant group.
    ///
    /// Kept effects were drawn with the filters in place at the time, so the
    /// cache is fixed once the first one lands; `refresh` unlocks it.
    pub fn calculate_filters(
        &mut self,
        delay_params: &DelayFilterParams,
        fringe_params: &FringeFilterParams,
    ) -> Result<(), SimError> {
        self.ensure_nothing_kept("filters")?;
        self.filters = Some(FilterCache::build(&self.data, &self.reds, delay_params, fringe_params)?);
        Ok(())
    }

    /// Regroups baselines with a new tolerance (metres). Invalidates any
    /// cached filters. Like the filters, the grouping is fixed once an
    /// effect has been kept.
    pub fn set_redundancy_tolerance(&mut self, tolerance: f64) -> Result<(), SimError> {
        self.ensure_nothing_kept("redundancy tolerance")?;
        if !(tolerance > 0.0) {
            return Err(SimError::InvalidConfig(format!(
                "redundancy tolerance must be positive, got {tolerance}"
            )));
        }
        self.reds = RedundantBaselines::compute(&self.data, tolerance);
        self.filters = None;
        Ok(())
    }

    fn ensure_nothing_kept(&self, what: &str) -> Result<(), SimError> {
        if self.ledger.is_empty() {
            return Ok(());
        }
        Err(SimError::InvalidConfig(format!(
            "cannot change {what} after {} effects have been kept; refresh first",
            self.ledger.len()
        )))
    }

    /// Applies a sequence of components and collects what they return.
    pub fn run_plan(&mut self, plan: &[PlanEntry]) -> Result<Vec<(String, ComponentOutput)>, SimError> {
        let mut outputs = Vec::new();
        for entry in plan {
            if let Some(output) = self.add(&entry.component, entry.options())? {
                outputs.push((entry.component.clone(), output));
            }
        }
        Ok(outputs)
    }

    pub fn data(&self) -> &VisibilityData {
        &self.data
    }

    pub fn ledger(&self) -> &ComponentLedger {
        &self.ledger
    }

    pub fn seeds(&self) -> &SeedManager {
        &self.seeds
    }

    pub fn redundancy(&self) -> &RedundantBaselines {
        &self.reds
    }

    pub fn filters(&self) -> Option<&FilterCache> {
        self.filters.as_ref()
    }

    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    pub fn warnings(&self) -> &[SimWarning] {
        &self.warnings
    }

    /// Drains the buffered warnings.
    pub fn take_warnings(&mut self) -> Vec<SimWarning> {
        std::mem::take(&mut self.warnings)
    }

    /// Consumes the simulator, returning the dataset.
    pub fn into_data(self) -> VisibilityData {
        self.data
    }
}

impl std::fmt::Debug for Simulator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Simulator")
            .field("n_bls", &self.data.n_bls())
            .field("ledger", &self.ledger)
            .field("seeds", &self.seeds)
            .finish()
    }
}
