//! Seed policies and the per-component seed table.

use crate::error::SimError;
use crate::redundancy::RedundantBaselines;
use crate::types::{BaselineInt, Feed};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;
use tracing::debug;
use vissim_env::EntropySource;

/// How the random generator is seeded while an effect is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "SeedRepr", into = "SeedRepr")]
pub enum SeedPolicy {
    /// Draw from the simulator's ambient generator. Not reproducible.
    #[default]
    Unseeded,

    /// One generator seeded with this value, drawn sequentially.
    Explicit(u32),

    /// One seed per call, reseeded before every baseline (or feed).
    Once,

    /// One seed per call, seeded once at the start.
    Initial,

    /// One seed per redundant group, reseeded before every baseline.
    Redundant,
}

impl SeedPolicy {
    /// Fails for policies that need a baseline when the model is
    /// multiplicative.
    pub fn check_compatible(&self, component: &str, multiplicative: bool) -> Result<(), SimError> {
        if multiplicative && *self == SeedPolicy::Redundant {
            return Err(SimError::IncompatibleSeedPolicy {
                component: component.to_string(),
                policy: self.to_string(),
            });
        }
        Ok(())
    }

    pub fn is_seeded(&self) -> bool {
        !matches!(self, SeedPolicy::Unseeded)
    }

    /// Whether seeds stored under `key` are drawn by this policy.
    pub fn uses_key(&self, key: &SeedKey) -> bool {
        match (self, key) {
            (SeedPolicy::Once, SeedKey::Index(0) | SeedKey::Feed(_)) => true,
            (SeedPolicy::Initial, SeedKey::Index(-1)) => true,
            (SeedPolicy::Redundant, SeedKey::Group(_)) => true,
            _ => false,
        }
    }
}

impl fmt::Display for SeedPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SeedPolicy::Unseeded => f.write_str("none"),
            SeedPolicy::Explicit(seed) => write!(f, "{seed}"),
            SeedPolicy::Once => f.write_str("once"),
            SeedPolicy::Initial => f.write_str("initial"),
            SeedPolicy::Redundant => f.write_str("redundant"),
        }
    }
}

impl FromStr for SeedPolicy {
    type Err = SimError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "none" => Ok(SeedPolicy::Unseeded),
            "once" => Ok(SeedPolicy::Once),
            "initial" => Ok(SeedPolicy::Initial),
            "redundant" => Ok(SeedPolicy::Redundant),
            other => other
                .parse::<u32>()
                .map(SeedPolicy::Explicit)
                .map_err(|_| SimError::InvalidSeed(s.to_string())),
        }
    }
}

impl From<u32> for SeedPolicy {
    fn from(seed: u32) -> Self {
        SeedPolicy::Explicit(seed)
    }
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum SeedRepr {
    Int(u32),
    Mode(String),
}

impl TryFrom<SeedRepr> for SeedPolicy {
    type Error = SimError;

    fn try_from(repr: SeedRepr) -> Result<Self, Self::Error> {
        match repr {
            SeedRepr::Int(seed) => Ok(SeedPolicy::Explicit(seed)),
            SeedRepr::Mode(mode) => mode.parse(),
        }
    }
}

impl From<SeedPolicy> for SeedRepr {
    fn from(policy: SeedPolicy) -> Self {
        match policy {
            SeedPolicy::Explicit(seed) => SeedRepr::Int(seed),
            other => SeedRepr::Mode(other.to_string()),
        }
    }
}

/// Key under which a component's seed is stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SeedKey {
    /// Call-wide seeds: `0` for "once", `-1` for "initial"
    Index(i64),
    /// Per-feed seeds of multiplicative models
    Feed(Feed),
    /// Redundant-group representative
    Group(BaselineInt),
}

impl fmt::Display for SeedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SeedKey::Index(idx) => write!(f, "{idx}"),
            SeedKey::Feed(feed) => write!(f, "{feed}"),
            SeedKey::Group(bl) => write!(f, "{bl}"),
        }
    }
}

/// Builds the generator used for one unit of seeded work.
pub fn rng_from_seed(seed: u32) -> ChaCha8Rng {
    ChaCha8Rng::seed_from_u64(seed as u64)
}

/// Memoized component seeds, drawn lazily from an entropy source.
pub struct SeedManager {
    entropy: Box<dyn EntropySource>,
    seeds: HashMap<String, BTreeMap<SeedKey, u32>>,
}

impl SeedManager {
    pub fn new(entropy: Box<dyn EntropySource>) -> Self {
        Self {
            entropy,
            seeds: HashMap::new(),
        }
    }

    /// Returns the stored seed, drawing and storing a fresh one on first use.
    pub fn get_seed(&mut self, component: &str, key: SeedKey) -> u32 {
        if let Some(seed) = self.lookup(component, key) {
            return seed;
        }
        let seed = self.entropy.fresh_seed();
        debug!("New seed {} for {}[{}]", seed, component, key);
        self.seeds
            .entry(component.to_string())
            .or_default()
            .insert(key, seed);
        seed
    }

    /// Peeks at a stored seed without drawing.
    pub fn lookup(&self, component: &str, key: SeedKey) -> Option<u32> {
        self.seeds.get(component)?.get(&key).copied()
    }

    /// Draws any missing group seeds, walking the groups in order.
    ///
    /// Seeds the component already holds under other keys are left alone, so
    /// the group seeds never depend on the order baselines are visited in.
    pub fn generate_redundant_seeds(&mut self, component: &str, reds: &RedundantBaselines) {
        for group in reds.groups() {
            self.get_seed(component, SeedKey::Group(group.representative));
        }
    }

    /// Every seed stored for a component.
    pub fn seeds(&self, component: &str) -> Option<&BTreeMap<SeedKey, u32>> {
        self.seeds.get(component)
    }

    /// Seeds drawn under `policy`, rendered as dataset keywords.
    ///
    /// A single seed is stored as `<name>_seed`; several as
    /// `<name>_seed_<key>`.
    pub fn seed_keywords(&self, component: &str, policy: SeedPolicy) -> BTreeMap<String, u32> {
        let Some(seeds) = self.seeds.get(component) else {
            return BTreeMap::new();
        };
        let used: Vec<(&SeedKey, u32)> = seeds
            .iter()
            .filter(|(key, _)| policy.uses_key(key))
            .map(|(key, &seed)| (key, seed))
            .collect();
        if let [(_, seed)] = used.as_slice() {
            return BTreeMap::from([(format!("{component}_seed"), *seed)]);
        }
        used.into_iter()
            .map(|(key, seed)| (format!("{component}_seed_{key}"), seed))
            .collect()
    }

    /// Draws a seed that is not memoized, e.g. for the ambient generator.
    pub fn fresh_seed(&mut self) -> u32 {
        self.entropy.fresh_seed()
    }

    pub fn master_seed(&self) -> Option<u64> {
        self.entropy.master_seed()
    }

    pub fn remove(&mut self, component: &str) {
        self.seeds.remove(component);
    }

    pub fn clear(&mut self) {
        self.seeds.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.seeds.values().all(|s| s.is_empty())
    }
}

impl fmt::Debug for SeedManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SeedManager")
            .field("master_seed", &self.entropy.master_seed())
            .field("seeds", &self.seeds)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{ArrayConfig, VisibilityData};
    use crate::layouts::linear_array;
    use crate::redundancy::DEFAULT_TOLERANCE_M;
    use proptest::prelude::*;
    use rand::RngCore;
    use vissim_env::SeededEntropy;

    fn manager(seed: u64) -> SeedManager {
        SeedManager::new(Box::new(SeededEntropy::new(seed)))
    }

    #[test]
    fn test_parse_policies() {
        assert_eq!("once".parse::<SeedPolicy>().unwrap(), SeedPolicy::Once);
        assert_eq!("Initial".parse::<SeedPolicy>().unwrap(), SeedPolicy::Initial);
        assert_eq!("redundant".parse::<SeedPolicy>().unwrap(), SeedPolicy::Redundant);
        assert_eq!("none".parse::<SeedPolicy>().unwrap(), SeedPolicy::Unseeded);
        assert_eq!("1234".parse::<SeedPolicy>().unwrap(), SeedPolicy::Explicit(1234));
    }

    #[test]
    fn test_parse_rejects_malformed() {
        for bad in ["1.5", "-3", "4294967296", "sometimes", ""] {
            assert!(
                matches!(bad.parse::<SeedPolicy>(), Err(SimError::InvalidSeed(_))),
                "{bad} should be rejected"
            );
        }
    }

    #[test]
    fn test_serde_forms() {
        let explicit: SeedPolicy = serde_json::from_str("42").unwrap();
        assert_eq!(explicit, SeedPolicy::Explicit(42));
        let mode: SeedPolicy = serde_json::from_str("\"redundant\"").unwrap();
        assert_eq!(mode, SeedPolicy::Redundant);

        assert!(serde_json::from_str::<SeedPolicy>("1.5").is_err());
        assert!(serde_json::from_str::<SeedPolicy>("-1").is_err());
        assert!(serde_json::from_str::<SeedPolicy>("\"always\"").is_err());

        assert_eq!(serde_json::to_string(&SeedPolicy::Explicit(7)).unwrap(), "7");
        assert_eq!(serde_json::to_string(&SeedPolicy::Once).unwrap(), "\"once\"");
    }

    #[test]
    fn test_redundant_incompatible_with_multiplicative() {
        assert!(SeedPolicy::Redundant.check_compatible("gains", true).is_err());
        assert!(SeedPolicy::Redundant.check_compatible("noise", false).is_ok());
        assert!(SeedPolicy::Once.check_compatible("gains", true).is_ok());
    }

    #[test]
    fn test_get_seed_memoized() {
        let mut seeds = manager(1);
        let first = seeds.get_seed("noise", SeedKey::Index(0));
        let again = seeds.get_seed("noise", SeedKey::Index(0));
        assert_eq!(first, again);
        assert_eq!(seeds.lookup("noise", SeedKey::Index(0)), Some(first));
        assert_eq!(seeds.lookup("noise", SeedKey::Index(-1)), None);
    }

    #[test]
    fn test_redundant_seeds_pregenerated_in_group_order() {
        let data = VisibilityData::new(&ArrayConfig {
            antennas: linear_array(4, 14.6),
            no_autos: true,
            n_freq: 4,
            n_times: 2,
            ..Default::default()
        })
        .unwrap();
        let reds = RedundantBaselines::compute(&data, DEFAULT_TOLERANCE_M);

        let mut seeds = manager(9);
        seeds.generate_redundant_seeds("eor", &reds);
        let table = seeds.seeds("eor").unwrap().clone();
        assert_eq!(table.len(), reds.len());

        let mut entropy = SeededEntropy::new(9);
        for group in reds.groups() {
            assert_eq!(table[&SeedKey::Group(group.representative)], entropy.fresh_seed());
        }

        // Second call leaves the table alone
        seeds.generate_redundant_seeds("eor", &reds);
        assert_eq!(seeds.seeds("eor").unwrap(), &table);
    }

    #[test]
    fn test_redundant_seeds_follow_group_order_after_other_seeds() {
        let data = VisibilityData::new(&ArrayConfig {
            antennas: linear_array(4, 14.6),
            no_autos: true,
            n_freq: 4,
            n_times: 2,
            ..Default::default()
        })
        .unwrap();
        let reds = RedundantBaselines::compute(&data, DEFAULT_TOLERANCE_M);

        let mut seeds = manager(9);
        let once = seeds.get_seed("eor", SeedKey::Index(0));
        seeds.generate_redundant_seeds("eor", &reds);

        let mut entropy = SeededEntropy::new(9);
        assert_eq!(entropy.fresh_seed(), once);
        for group in reds.groups() {
            assert_eq!(
                seeds.lookup("eor", SeedKey::Group(group.representative)),
                Some(entropy.fresh_seed())
            );
        }
        assert_eq!(seeds.seeds("eor").unwrap().len(), reds.len() + 1);
    }

    #[test]
    fn test_seed_keywords() {
        let mut seeds = manager(3);
        let single = seeds.get_seed("rfi", SeedKey::Index(0));
        assert_eq!(
            seeds.seed_keywords("rfi", SeedPolicy::Once),
            BTreeMap::from([("rfi_seed".to_string(), single)])
        );

        seeds.get_seed("eor", SeedKey::Group(69634));
        seeds.get_seed("eor", SeedKey::Group(69635));
        let keywords = seeds.seed_keywords("eor", SeedPolicy::Redundant);
        assert!(keywords.contains_key("eor_seed_69634"));
        assert!(keywords.contains_key("eor_seed_69635"));

        assert!(seeds.seed_keywords("missing", SeedPolicy::Once).is_empty());
        assert!(seeds.seed_keywords("rfi", SeedPolicy::Explicit(3)).is_empty());
    }

    #[test]
    fn test_seed_keywords_only_cover_the_policy() {
        let mut seeds = manager(4);
        let initial = seeds.get_seed("rfi", SeedKey::Index(-1));
        seeds.get_seed("rfi", SeedKey::Index(0));
        seeds.get_seed("rfi", SeedKey::Group(69634));

        assert_eq!(
            seeds.seed_keywords("rfi", SeedPolicy::Initial),
            BTreeMap::from([("rfi_seed".to_string(), initial)])
        );
        let redundant = seeds.seed_keywords("rfi", SeedPolicy::Redundant);
        assert_eq!(redundant.keys().collect::<Vec<_>>(), vec!["rfi_seed"]);

        seeds.get_seed("gains", SeedKey::Feed(Feed::X));
        seeds.get_seed("gains", SeedKey::Feed(Feed::Y));
        let once = seeds.seed_keywords("gains", SeedPolicy::Once);
        assert_eq!(
            once.keys().collect::<Vec<_>>(),
            vec!["gains_seed_x", "gains_seed_y"]
        );
    }

    #[test]
    fn test_clear_and_remove() {
        let mut seeds = manager(5);
        seeds.get_seed("a", SeedKey::Index(0));
        seeds.get_seed("b", SeedKey::Feed(Feed::X));
        seeds.remove("a");
        assert!(seeds.seeds("a").is_none());
        assert!(!seeds.is_empty());
        seeds.clear();
        assert!(seeds.is_empty());
    }

    #[test]
    fn test_rng_from_seed_reproducible() {
        let mut a = rng_from_seed(17);
        let mut b = rng_from_seed(17);
        assert_eq!(a.next_u64(), b.next_u64());
    }

    proptest! {
        #[test]
        fn prop_integer_strings_are_explicit(seed in any::<u32>()) {
            prop_assert_eq!(seed.to_string().parse::<SeedPolicy>().unwrap(), SeedPolicy::Explicit(seed));
        }

        #[test]
        fn prop_out_of_range_rejected(seed in (u32::MAX as u64 + 1)..u64::MAX) {
            prop_assert!(seed.to_string().parse::<SeedPolicy>().is_err());
        }

        #[test]
        fn prop_display_roundtrips(seed in any::<u32>()) {
            for policy in [SeedPolicy::Explicit(seed), SeedPolicy::Once, SeedPolicy::Initial, SeedPolicy::Redundant, SeedPolicy::Unseeded] {
                prop_assert_eq!(policy.to_string().parse::<SeedPolicy>().unwrap(), policy);
            }
        }
    }
}
