//! Baseline/polarization inclusion filters.
//!
//! Filters are plain JSON-shaped values: `0`, `"xx"`, `[0, "xx"]`,
//! `[[0, 1, "xx"], [2]]`.

use crate::types::{AntNum, Polarization};
use serde::{Deserialize, Serialize};

/// One element of a filter key list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterKey {
    Ant(AntNum),
    Pol(Polarization),
}

impl From<AntNum> for FilterKey {
    fn from(ant: AntNum) -> Self {
        FilterKey::Ant(ant)
    }
}

impl From<Polarization> for FilterKey {
    fn from(pol: Polarization) -> Self {
        FilterKey::Pol(pol)
    }
}

/// Selects which (ant1, ant2, pol) an effect is applied to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum InclusionFilter {
    /// A single antenna or polarization
    Key(FilterKey),
    /// A flat key list
    Keys(Vec<FilterKey>),
    /// Alternatives, combined with OR
    AnyOf(Vec<InclusionFilter>),
}

impl InclusionFilter {
    /// Baselines touching `ant`.
    pub fn antenna(ant: AntNum) -> Self {
        InclusionFilter::Key(FilterKey::Ant(ant))
    }

    pub fn pol(pol: Polarization) -> Self {
        InclusionFilter::Key(FilterKey::Pol(pol))
    }

    /// Exactly the baseline (ant1, ant2) in either order, optionally
    /// restricted to one polarization.
    pub fn antpairpol(ant1: AntNum, ant2: AntNum, pol: Option<Polarization>) -> Self {
        let mut keys = vec![FilterKey::Ant(ant1), FilterKey::Ant(ant2)];
        keys.extend(pol.map(FilterKey::Pol));
        InclusionFilter::Keys(keys)
    }

    pub fn keys(keys: impl IntoIterator<Item = FilterKey>) -> Self {
        InclusionFilter::Keys(keys.into_iter().collect())
    }

    pub fn any_of(filters: impl IntoIterator<Item = InclusionFilter>) -> Self {
        InclusionFilter::AnyOf(filters.into_iter().collect())
    }

    /// Whether (ant1, ant2, pol) passes the filter.
    pub fn includes(&self, ant1: AntNum, ant2: AntNum, pol: Polarization) -> bool {
        match self {
            InclusionFilter::Key(key) => keys_include(std::slice::from_ref(key), ant1, ant2, pol),
            InclusionFilter::Keys(keys) => keys_include(keys, ant1, ant2, pol),
            InclusionFilter::AnyOf(alternatives) => {
                alternatives.is_empty()
                    || alternatives.iter().any(|f| f.includes(ant1, ant2, pol))
            }
        }
    }
}

/// Absent filter includes everything.
pub fn includes(filter: Option<&InclusionFilter>, ant1: AntNum, ant2: AntNum, pol: Polarization) -> bool {
    filter.map_or(true, |f| f.includes(ant1, ant2, pol))
}

fn keys_include(keys: &[FilterKey], ant1: AntNum, ant2: AntNum, pol: Polarization) -> bool {
    let ants: Vec<AntNum> = keys
        .iter()
        .filter_map(|k| match k {
            FilterKey::Ant(a) => Some(*a),
            FilterKey::Pol(_) => None,
        })
        .collect();
    let pols: Vec<Polarization> = keys
        .iter()
        .filter_map(|k| match k {
            FilterKey::Pol(p) => Some(*p),
            FilterKey::Ant(_) => None,
        })
        .collect();

    let pol_ok = pols.is_empty() || pols.contains(&pol);

    // Two antennas name a baseline
    if ants.len() == 2 && pols.len() <= 1 {
        let exact = (ants[0] == ant1 && ants[1] == ant2) || (ants[0] == ant2 && ants[1] == ant1);
        return exact && pol_ok;
    }

    let ant_ok = ants.is_empty() || ants.contains(&ant1) || ants.contains(&ant2);
    pol_ok && ant_ok
}
