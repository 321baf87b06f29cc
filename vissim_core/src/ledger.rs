//! Record of every effect kept in the dataset.
//!
//! A record carries enough to re-run the effect exactly: the canonical name,
//! the user parameters, the seed policy, the inclusion filter and the seeds
//! that were actually drawn. Models supplied as instances (rather than by
//! registry name) are kept alive here so they can be re-run too.

use crate::error::SimError;
use crate::inclusion::InclusionFilter;
use crate::model::{EffectModel, Params};
use crate::registry::ModelRegistry;
use crate::seeds::SeedPolicy;
use crate::types::{AntNum, AntPairPol, Polarization};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

/// The (ant1, ant2, pol) triples visited during one sweep.
#[derive(Debug, Clone, Default)]
pub struct AntPairPolCache {
    seen: HashSet<AntPairPol>,
}

impl AntPairPolCache {
    pub fn insert(&mut self, ant1: AntNum, ant2: AntNum, pol: Polarization) {
        self.seen.insert((ant1, ant2, pol));
    }

    pub fn contains(&self, ant1: AntNum, ant2: AntNum, pol: Polarization) -> bool {
        self.seen.contains(&(ant1, ant2, pol))
    }

    /// Whether (ant2, ant1, pol) was visited.
    pub fn contains_conjugate(&self, ant1: AntNum, ant2: AntNum, pol: Polarization) -> bool {
        self.seen.contains(&(ant2, ant1, pol))
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }

    pub fn clear(&mut self) {
        self.seen.clear();
    }
}

/// Serializable description of one kept effect.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentRecord {
    /// Canonical model name
    pub name: String,

    /// Parameters the model was built from
    pub params: Params,

    pub seed: SeedPolicy,

    pub filter: Option<InclusionFilter>,

    pub is_multiplicative: bool,

    /// Seeds drawn for this component, keyed as in the dataset keywords
    pub seeds: BTreeMap<String, u32>,
}

/// All kept effects, in application order.
#[derive(Default, Clone)]
pub struct ComponentLedger {
    records: Vec<ComponentRecord>,
    instances: HashMap<String, Arc<dyn EffectModel>>,
    visited: HashMap<String, AntPairPolCache>,
}

impl ComponentLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a record, replacing any earlier record of the same component.
    pub fn record(
        &mut self,
        record: ComponentRecord,
        visited: AntPairPolCache,
        instance: Option<Arc<dyn EffectModel>>,
    ) {
        let name = record.name.clone();
        self.records.retain(|r| r.name != name);
        self.records.push(record);
        self.visited.insert(name.clone(), visited);
        match instance {
            Some(model) => {
                self.instances.insert(name, model);
            }
            None => {
                self.instances.remove(&name);
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&ComponentRecord> {
        self.records.iter().find(|r| r.name == name)
    }

    pub fn records(&self) -> &[ComponentRecord] {
        &self.records
    }

    pub fn visited(&self, name: &str) -> Option<&AntPairPolCache> {
        self.visited.get(name)
    }

    /// Rebuilds the model of a kept component.
    pub fn model_for(&self, name: &str, registry: &ModelRegistry) -> Result<Arc<dyn EffectModel>, SimError> {
        if let Some(model) = self.instances.get(name) {
            return Ok(Arc::clone(model));
        }
        let record = self.get(name).ok_or_else(|| SimError::NotSimulated(name.to_string()))?;
        registry.build(&record.name, &record.params).map(Arc::from)
    }

    /// Whether any kept effect is multiplicative.
    pub fn has_multiplicative(&self) -> bool {
        self.records.iter().any(|r| r.is_multiplicative)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn clear(&mut self) {
        self.records.clear();
        self.instances.clear();
        self.visited.clear();
    }
}

impl std::fmt::Debug for ComponentLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComponentLedger")
            .field("records", &self.records)
            .field("instances", &self.instances.keys().collect::<Vec<_>>())
            .finish()
    }
}
