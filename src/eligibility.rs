//! Capacity table and eligibility rules.
//!
//! A student's admissible destinations depend only on its period and its
//! internal-placement flag, never on current occupancy.

use std::collections::{BTreeMap, BTreeSet};

use crate::error::ConfigError;
use crate::models::{Config, GroupId};

/// Immutable rule set compiled from a [`Config`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllocationRules {
    capacities: BTreeMap<GroupId, u32>,
    periods: BTreeMap<String, BTreeSet<GroupId>>,
    internal_forbidden: BTreeSet<GroupId>,
}

impl AllocationRules {
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        let mut capacities = BTreeMap::new();
        for range in &config.capacities {
            if range.first > range.last {
                return Err(ConfigError::InvertedRange {
                    first: range.first,
                    last: range.last,
                });
            }
            for group in range.first..=range.last {
                if capacities.insert(group, range.capacity).is_some() {
                    return Err(ConfigError::DuplicateGroup(group));
                }
            }
        }
        if capacities.is_empty() {
            return Err(ConfigError::NoGroups);
        }

        let mut periods = BTreeMap::new();
        for (period, groups) in &config.periods {
            let mut allowed = BTreeSet::new();
            for &group in groups {
                if !capacities.contains_key(&group) {
                    return Err(ConfigError::UnknownPeriodGroup {
                        period: period.clone(),
                        group,
                    });
                }
                allowed.insert(group);
            }
            periods.insert(period.clone(), allowed);
        }

        let mut internal_forbidden = BTreeSet::new();
        for &group in &config.internal_forbidden_groups {
            if !capacities.contains_key(&group) {
                return Err(ConfigError::UnknownForbiddenGroup(group));
            }
            internal_forbidden.insert(group);
        }

        Ok(Self {
            capacities,
            periods,
            internal_forbidden,
        })
    }

    /// Groups a student of this profile may ever occupy, in ascending order.
    ///
    /// Unknown periods yield an empty set: such students stay unassigned.
    pub fn eligible_groups(&self, period: &str, internal_placement: bool) -> Vec<GroupId> {
        let Some(allowed) = self.periods.get(period) else {
            return Vec::new();
        };

        allowed
            .iter()
            .copied()
            .filter(|group| !(internal_placement && self.internal_forbidden.contains(group)))
            .collect()
    }

    pub fn capacity(&self, group: GroupId) -> Option<u32> {
        self.capacities.get(&group).copied()
    }

    pub fn groups(&self) -> impl Iterator<Item = (GroupId, u32)> + '_ {
        self.capacities.iter().map(|(&group, &capacity)| (group, capacity))
    }

    pub fn period_allows(&self, period: &str, group: GroupId) -> bool {
        self.periods
            .get(period)
            .is_some_and(|allowed| allowed.contains(&group))
    }

    pub fn periods(&self) -> impl Iterator<Item = (&str, &BTreeSet<GroupId>)> {
        self.periods.iter().map(|(period, groups)| (period.as_str(), groups))
    }

    pub fn is_internal_forbidden(&self, group: GroupId) -> bool {
        self.internal_forbidden.contains(&group)
    }

    pub fn internal_forbidden(&self) -> &BTreeSet<GroupId> {
        &self.internal_forbidden
    }
}

/// Rules for the default 23-group cohort.
#[cfg(test)]
pub(crate) fn cohort_rules() -> AllocationRules {
    AllocationRules::from_config(&Config::default()).unwrap()
}
