//! Redundant baseline groups.
//!
//! Baselines whose ENU separation vectors agree within a tolerance see the
//! same sky, so seeds and filters are shared across a group. A baseline whose
//! vector is the *negation* of a group's vector joins that group flagged as
//! conjugated.

use crate::geometry::ArrayGeometry;
use crate::types::{antnums_to_baseline, AntNum, BaselineInt};
use nalgebra::Vector3;
use std::collections::HashMap;

/// Default grouping tolerance in metres.
pub const DEFAULT_TOLERANCE_M: f64 = 1.0;

/// An immutable redundant group.
#[derive(Debug, Clone)]
pub struct RedundantGroup {
    /// Member baseline integers, ascending
    pub baselines: Vec<BaselineInt>,

    /// Lowest-valued member
    pub representative: BaselineInt,

    /// Average member vector (metres), in the group orientation
    pub vector: Vector3<f64>,

    /// Length of the average vector (metres)
    pub length: f64,
}

/// Where a baseline sits in the grouping.
#[derive(Debug, Clone, Copy)]
struct Membership {
    group: usize,
    conjugated: bool,
}

/// All redundant groups of an array.
#[derive(Debug, Clone, Default)]
pub struct RedundantBaselines {
    groups: Vec<RedundantGroup>,
    membership: HashMap<BaselineInt, Membership>,
    tolerance: f64,
}

impl RedundantBaselines {
    /// Groups every realized antpair of `geometry`.
    ///
    /// Naive O(N_bl * N_groups) comparison against each group's first member.
    pub fn compute(geometry: &impl ArrayGeometry, tolerance: f64) -> Self {
        struct Building {
            reference: Vector3<f64>,
            sum: Vector3<f64>,
            members: Vec<(BaselineInt, bool)>,
        }

        let mut building: Vec<Building> = Vec::new();
        for &(a1, a2) in geometry.antpairs() {
            let Some(vec) = geometry.baseline_vector(a1, a2) else {
                continue;
            };
            let bl = antnums_to_baseline(a1, a2);

            let matched = building.iter_mut().find_map(|g| {
                if (vec - g.reference).norm() <= tolerance {
                    Some((g, false))
                } else if (vec + g.reference).norm() <= tolerance {
                    Some((g, true))
                } else {
                    None
                }
            });

            match matched {
                Some((group, conjugated)) => {
                    group.sum += if conjugated { -vec } else { vec };
                    group.members.push((bl, conjugated));
                }
                None => building.push(Building {
                    reference: vec,
                    sum: vec,
                    members: vec![(bl, false)],
                }),
            }
        }

        let mut groups: Vec<(RedundantGroup, Vec<(BaselineInt, bool)>)> = building
            .into_iter()
            .map(|g| {
                let vector = g.sum / g.members.len() as f64;
                let mut baselines: Vec<BaselineInt> = g.members.iter().map(|m| m.0).collect();
                baselines.sort_unstable();
                let group = RedundantGroup {
                    representative: baselines[0],
                    baselines,
                    length: vector.norm(),
                    vector,
                };
                (group, g.members)
            })
            .collect();
        groups.sort_by_key(|(g, _)| g.representative);

        let mut membership = HashMap::new();
        for (idx, (_, members)) in groups.iter().enumerate() {
            for &(bl, conjugated) in members {
                membership.insert(bl, Membership { group: idx, conjugated });
            }
        }

        Self {
            groups: groups.into_iter().map(|(g, _)| g).collect(),
            membership,
            tolerance,
        }
    }

    /// All groups, ordered by representative.
    pub fn groups(&self) -> &[RedundantGroup] {
        &self.groups
    }

    pub fn tolerance(&self) -> f64 {
        self.tolerance
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Group containing (ant1, ant2), and whether the pair points opposite to
    /// the group vector.
    ///
    /// Conjugate-aware: when only (ant2, ant1) is a member, its group is
    /// returned with the flag inverted.
    pub fn group_of(&self, ant1: AntNum, ant2: AntNum) -> Option<(&RedundantGroup, bool)> {
        if let Some(m) = self.membership.get(&antnums_to_baseline(ant1, ant2)) {
            return Some((&self.groups[m.group], m.conjugated));
        }
        self.membership
            .get(&antnums_to_baseline(ant2, ant1))
            .map(|m| (&self.groups[m.group], !m.conjugated))
    }
}
