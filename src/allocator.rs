//! Greedy single-pass group allocator.
//!
//! Students are placed one at a time in input order. Each decision observes
//! every placement made before it, so the outcome depends on record order.
//!
//! Candidate groups are ranked lexicographically by:
//! 1. current occupancy (least filled first)
//! 2. students already placed there from the same source group
//! 3. students already placed there with the same profession
//! 4. group id (lowest first)

use std::collections::{BTreeMap, HashMap};

use tracing::{debug, warn};

use crate::eligibility::AllocationRules;
use crate::error::AllocationError;
use crate::models::{ExistingDestinations, GroupId, StudentRecord};
use crate::validator::validate_allocation;

/// Occupancy and mixing histograms of one destination group.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroupState {
    pub capacity: u32,
    pub occupancy: u32,
    source_groups: HashMap<String, u32>,
    professions: HashMap<String, u32>,
}

impl GroupState {
    fn new(capacity: u32) -> Self {
        Self {
            capacity,
            ..Self::default()
        }
    }

    pub fn is_full(&self) -> bool {
        self.occupancy >= self.capacity
    }

    pub fn source_group_count(&self, source_group: &str) -> u32 {
        self.source_groups.get(source_group).copied().unwrap_or(0)
    }

    pub fn profession_count(&self, profession: &str) -> u32 {
        self.professions.get(profession).copied().unwrap_or(0)
    }

    /// Largest number of members sharing one source group.
    pub fn max_source_group_repeat(&self) -> u32 {
        self.source_groups.values().copied().max().unwrap_or(0)
    }

    /// Largest number of members sharing one profession.
    pub fn max_profession_repeat(&self) -> u32 {
        self.professions.values().copied().max().unwrap_or(0)
    }

    fn record(&mut self, source_group: &str, profession: &str) {
        self.occupancy += 1;
        *self.source_groups.entry(source_group.to_string()).or_insert(0) += 1;
        *self.professions.entry(profession.to_string()).or_insert(0) += 1;
    }
}

/// Ranking key of a candidate group. Lower is better; field order is the
/// tie-break order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct GroupScore {
    pub occupancy: u32,
    pub same_source_group: u32,
    pub same_profession: u32,
    pub group: GroupId,
}

/// Counts produced by one pass over the record table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AllocationSummary {
    pub assigned: usize,
    pub unassigned: usize,
}

impl AllocationSummary {
    pub fn total(&self) -> usize {
        self.assigned + self.unassigned
    }
}

#[derive(Debug, Clone)]
pub struct GroupAllocator {
    rules: AllocationRules,
    groups: BTreeMap<GroupId, GroupState>,
}

impl GroupAllocator {
    pub fn new(rules: AllocationRules) -> Self {
        let groups = rules
            .groups()
            .map(|(group, capacity)| (group, GroupState::new(capacity)))
            .collect();

        Self { rules, groups }
    }

    pub fn rules(&self) -> &AllocationRules {
        &self.rules
    }

    pub fn groups(&self) -> impl Iterator<Item = (GroupId, &GroupState)> {
        self.groups.iter().map(|(&group, state)| (group, state))
    }

    #[cfg(test)]
    pub(crate) fn group_mut(&mut self, group: GroupId) -> Option<&mut GroupState> {
        self.groups.get_mut(&group)
    }

    pub fn occupancy(&self, group: GroupId) -> u32 {
        self.groups.get(&group).map(|g| g.occupancy).unwrap_or(0)
    }

    /// Eligible groups that still have a free seat, in ascending order.
    pub fn available_groups(&self, period: &str, internal_placement: bool) -> Vec<GroupId> {
        self.rules
            .eligible_groups(period, internal_placement)
            .into_iter()
            .filter(|group| self.groups.get(group).is_some_and(|g| !g.is_full()))
            .collect()
    }

    pub fn score_group(&self, group: GroupId, source_group: &str, profession: &str) -> GroupScore {
        let state = self.groups.get(&group);
        GroupScore {
            occupancy: state.map(|g| g.occupancy).unwrap_or(0),
            same_source_group: state.map(|g| g.source_group_count(source_group)).unwrap_or(0),
            same_profession: state.map(|g| g.profession_count(profession)).unwrap_or(0),
            group,
        }
    }

    /// Places one student, or returns `None` when every eligible group is full.
    pub fn allocate_student(
        &mut self,
        period: &str,
        internal_placement: bool,
        source_group: &str,
        profession: &str,
    ) -> Option<GroupId> {
        let best = self
            .available_groups(period, internal_placement)
            .into_iter()
            .map(|group| self.score_group(group, source_group, profession))
            .min()?;

        let state = self.groups.get_mut(&best.group)?;
        state.record(source_group, profession);

        debug!(
            group = best.group,
            occupancy = state.occupancy,
            same_source_group = best.same_source_group,
            same_profession = best.same_profession,
            "placed student"
        );
        Some(best.group)
    }

    /// Runs the forward pass over `records`, filling in destinations.
    ///
    /// Every placement is re-validated immediately; a failed check aborts the
    /// pass with [`AllocationError::Contradiction`].
    pub fn allocate_records(
        &mut self,
        records: &mut [StudentRecord],
        internal_token: &str,
    ) -> Result<AllocationSummary, AllocationError> {
        let mut summary = AllocationSummary::default();

        for record in records.iter_mut() {
            let internal_placement = record.is_internal_placement(internal_token);
            let placed = self.allocate_student(
                &record.period,
                internal_placement,
                &record.source_group,
                &record.profession,
            );
            record.destination = placed;
            record.stale_destination = None;

            match placed {
                Some(group) => {
                    validate_allocation(self, group, &record.period, internal_placement).map_err(
                        |violation| AllocationError::Contradiction {
                            line: record.line_number.clone(),
                            group,
                            reason: violation.to_string(),
                        },
                    )?;
                    summary.assigned += 1;
                }
                None => {
                    debug!(
                        line = %record.line_number,
                        period = %record.period,
                        internal_placement,
                        "no eligible group with a free seat"
                    );
                    summary.unassigned += 1;
                }
            }
        }

        Ok(summary)
    }
}

/// Applies the configured policy to destinations already present in the table.
///
/// Cells that do not hold a group id count as populated too. Returns how many
/// destinations were discarded.
pub fn reset_destinations(
    records: &mut [StudentRecord],
    policy: ExistingDestinations,
) -> Result<usize, AllocationError> {
    let populated = records.iter().filter(|r| r.has_existing_destination()).count();
    if populated == 0 {
        return Ok(0);
    }

    match policy {
        ExistingDestinations::Reject => Err(AllocationError::ExistingDestinations {
            count: populated,
            first_line: records
                .iter()
                .find(|r| r.has_existing_destination())
                .map(|r| r.line_number.clone())
                .unwrap_or_default(),
        }),
        ExistingDestinations::Reset => {
            for record in records.iter_mut() {
                if let Some(stale) = record.stale_destination.take() {
                    warn!(
                        line = %record.line_number,
                        value = %stale,
                        "discarding destination that is not a group id"
                    );
                }
                record.destination = None;
            }
            Ok(populated)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eligibility::cohort_rules;
    use crate::models::{CapacityRange, Config};
    use proptest::prelude::*;

    fn student(line: usize, profession: &str, source: &str, internal: bool, period: &str) -> StudentRecord {
        StudentRecord {
            line_number: line.to_string(),
            profession: profession.to_string(),
            program_choice: "M1".to_string(),
            source_group: source.to_string(),
            internal_placement: if internal { "oui" } else { "non" }.to_string(),
            period: period.to_string(),
            destination: None,
            stale_destination: None,
        }
    }

    fn two_group_rules() -> AllocationRules {
        let mut config = Config::default();
        config.capacities = vec![CapacityRange {
            first: 1,
            last: 2,
            capacity: 8,
        }];
        config.periods.clear();
        config.periods.insert("A".to_string(), vec![1, 2]);
        config.internal_forbidden_groups.clear();
        AllocationRules::from_config(&config).unwrap()
    }

    #[test]
    fn internal_p1_student_lands_in_group_17() {
        let mut allocator = GroupAllocator::new(cohort_rules());

        let group = allocator.allocate_student("P1", true, "G1", "Infirmier");

        assert_eq!(group, Some(17));
        let state = &allocator.groups[&17];
        assert_eq!(state.occupancy, 1);
        assert_eq!(state.source_group_count("G1"), 1);
        assert_eq!(state.profession_count("Infirmier"), 1);
    }

    #[test]
    fn full_group_is_skipped() {
        let mut allocator = GroupAllocator::new(cohort_rules());
        allocator.groups.get_mut(&1).unwrap().occupancy = 8;

        assert!(!allocator.available_groups("P1", false).contains(&1));
        assert_eq!(allocator.allocate_student("P1", false, "G1", "Kine"), Some(2));
    }

    #[test]
    fn student_stays_unassigned_when_every_eligible_group_is_full() {
        let mut allocator = GroupAllocator::new(cohort_rules());
        for group in 17..=23 {
            let state = allocator.groups.get_mut(&group).unwrap();
            state.occupancy = state.capacity;
        }

        assert_eq!(allocator.allocate_student("P1", true, "G1", "Kine"), None);
        // Groups 1-4 are still open to non-internal P1 students.
        assert_eq!(allocator.allocate_student("P1", false, "G1", "Kine"), Some(1));
    }

    #[test]
    fn unknown_period_is_unassigned() {
        let mut allocator = GroupAllocator::new(cohort_rules());
        assert_eq!(allocator.allocate_student("P9", false, "G1", "Kine"), None);
        assert!(allocator.groups().all(|(_, g)| g.occupancy == 0));
    }

    #[test]
    fn identical_students_are_spread() {
        let mut allocator = GroupAllocator::new(cohort_rules());

        let first = allocator.allocate_student("P2", false, "G3", "Sage-femme");
        let second = allocator.allocate_student("P2", false, "G3", "Sage-femme");

        assert_eq!(first, Some(1));
        assert_eq!(second, Some(2));
    }

    #[test]
    fn identical_students_share_the_last_open_group() {
        let mut allocator = GroupAllocator::new(cohort_rules());
        for group in 6..=16 {
            let state = allocator.groups.get_mut(&group).unwrap();
            state.occupancy = state.capacity;
        }

        assert_eq!(allocator.allocate_student("P2", true, "G3", "Kine"), Some(5));
        assert_eq!(allocator.allocate_student("P2", true, "G3", "Kine"), Some(5));
    }

    #[test]
    fn source_group_breaks_occupancy_ties() {
        let mut allocator = GroupAllocator::new(two_group_rules());

        assert_eq!(allocator.allocate_student("A", false, "X", "a"), Some(1));
        assert_eq!(allocator.allocate_student("A", false, "Y", "b"), Some(2));
        // Both groups hold one student; group 1 already has an X.
        assert_eq!(allocator.allocate_student("A", false, "X", "b"), Some(2));
    }

    #[test]
    fn profession_breaks_source_group_ties() {
        let mut allocator = GroupAllocator::new(two_group_rules());

        assert_eq!(allocator.allocate_student("A", false, "X", "a"), Some(1));
        assert_eq!(allocator.allocate_student("A", false, "Y", "b"), Some(2));
        // Neither group has a Z; group 1 already has an "a".
        assert_eq!(allocator.allocate_student("A", false, "Z", "a"), Some(2));
    }

    #[test]
    fn permuted_input_can_change_assignment() {
        let forward = vec![
            student(1, "a", "X", false, "A"),
            student(2, "b", "Y", false, "A"),
            student(3, "b", "X", false, "A"),
        ];
        let mut permuted = vec![forward[2].clone(), forward[0].clone(), forward[1].clone()];
        let mut forward = forward;

        let mut first = GroupAllocator::new(two_group_rules());
        first.allocate_records(&mut forward, "oui").unwrap();
        let mut second = GroupAllocator::new(two_group_rules());
        second.allocate_records(&mut permuted, "oui").unwrap();

        // Line 3 follows an X in group 1 in the first order, but comes first in the second.
        assert_eq!(forward[2].destination, Some(2));
        assert_eq!(permuted[0].destination, Some(1));

        for (allocator, records) in [(&first, &forward), (&second, &permuted)] {
            for record in records.iter() {
                let group = record.destination.unwrap();
                assert_eq!(validate_allocation(allocator, group, &record.period, false), Ok(()));
            }
            assert!(allocator.groups().all(|(_, g)| g.occupancy <= g.capacity));
        }
    }

    #[test]
    fn score_orders_lexicographically() {
        let low_occupancy = GroupScore {
            occupancy: 0,
            same_source_group: 5,
            same_profession: 5,
            group: 23,
        };
        let high_occupancy = GroupScore {
            occupancy: 1,
            same_source_group: 0,
            same_profession: 0,
            group: 1,
        };
        assert!(low_occupancy < high_occupancy);
    }

    #[test]
    fn allocate_records_fills_destinations() {
        let mut allocator = GroupAllocator::new(cohort_rules());
        let mut records = vec![
            student(2, "Kine", "G1", true, "P1"),
            student(3, "Kine", "G1", false, "P2"),
            student(4, "Kine", "G2", false, "P3"),
        ];

        let summary = allocator.allocate_records(&mut records, "oui").unwrap();

        assert_eq!(summary, AllocationSummary { assigned: 2, unassigned: 1 });
        assert_eq!(summary.total(), 3);
        assert_eq!(records[0].destination, Some(17));
        assert_eq!(records[1].destination, Some(1));
        assert_eq!(records[2].destination, None);
    }

    #[test]
    fn allocation_is_deterministic() {
        let records: Vec<_> = (0..120)
            .map(|i| {
                student(
                    i,
                    ["Kine", "Infirmier", "Sage-femme"][i % 3],
                    &format!("G{}", i % 7),
                    i % 4 == 0,
                    ["P1", "P2"][i % 2],
                )
            })
            .collect();

        let mut first = records.clone();
        let mut second = records;
        GroupAllocator::new(cohort_rules())
            .allocate_records(&mut first, "oui")
            .unwrap();
        GroupAllocator::new(cohort_rules())
            .allocate_records(&mut second, "oui")
            .unwrap();

        assert_eq!(first, second);
    }

    #[test]
    fn reset_policy_clears_existing_destinations() {
        let mut records = vec![student(2, "Kine", "G1", false, "P1"), student(3, "Kine", "G1", false, "P1")];
        records[1].destination = Some(4);

        assert_eq!(reset_destinations(&mut records, ExistingDestinations::Reset), Ok(1));
        assert!(records.iter().all(|r| r.destination.is_none()));
        assert_eq!(reset_destinations(&mut records, ExistingDestinations::Reject), Ok(0));
    }

    #[test]
    fn reset_policy_discards_non_numeric_destinations() {
        let mut records = vec![student(2, "Kine", "G1", false, "P1"), student(3, "Kine", "G1", false, "P1")];
        records[0].stale_destination = Some("N/A".to_string());
        records[1].destination = Some(4);

        assert_eq!(reset_destinations(&mut records, ExistingDestinations::Reset), Ok(2));
        assert_eq!(records.len(), 2);
        assert!(records.iter().all(|r| !r.has_existing_destination()));

        let mut allocator = GroupAllocator::new(cohort_rules());
        allocator.allocate_records(&mut records, "oui").unwrap();
        assert_eq!(records[0].destination, Some(1));
        assert_eq!(records[1].destination, Some(2));
    }

    #[test]
    fn reject_policy_counts_non_numeric_destinations() {
        let mut records = vec![student(2, "Kine", "G1", false, "P1"), student(3, "Kine", "G1", false, "P1")];
        records[1].stale_destination = Some("12a".to_string());

        assert_eq!(
            reset_destinations(&mut records, ExistingDestinations::Reject),
            Err(AllocationError::ExistingDestinations {
                count: 1,
                first_line: "3".to_string()
            })
        );
        assert_eq!(records[1].stale_destination.as_deref(), Some("12a"));
    }

    #[test]
    fn reject_policy_refuses_populated_table() {
        let mut records = vec![
            student(2, "Kine", "G1", false, "P1"),
            student(3, "Kine", "G1", false, "P1"),
            student(4, "Kine", "G1", false, "P1"),
        ];
        records[1].destination = Some(4);
        records[2].destination = Some(5);

        assert_eq!(
            reset_destinations(&mut records, ExistingDestinations::Reject),
            Err(AllocationError::ExistingDestinations {
                count: 2,
                first_line: "3".to_string()
            })
        );
        assert_eq!(records[1].destination, Some(4));
    }

    fn arb_student() -> impl Strategy<Value = (usize, usize, bool, usize)> {
        (0usize..4, 0usize..6, any::<bool>(), 0usize..3)
    }

    proptest! {
        #[test]
        fn hard_constraints_hold(students in prop::collection::vec(arb_student(), 0..250)) {
            let periods = ["P1", "P2", "P?"];
            let professions = ["Kine", "Infirmier", "Sage-femme", "Medecin"];
            let mut allocator = GroupAllocator::new(cohort_rules());

            for (profession, source, internal, period) in students {
                let period = periods[period];
                let source = format!("G{source}");
                let open_before = allocator.available_groups(period, internal);

                let placed = allocator.allocate_student(period, internal, &source, professions[profession]);

                match placed {
                    Some(group) => {
                        prop_assert!(open_before.contains(&group));
                        prop_assert!(allocator.rules().period_allows(period, group));
                        prop_assert!(!(internal && (1..=4).contains(&group)));
                        prop_assert!(validate_allocation(&allocator, group, period, internal).is_ok());
                    }
                    None => prop_assert!(open_before.is_empty()),
                }
            }

            for (_, state) in allocator.groups() {
                prop_assert!(state.occupancy <= state.capacity);
            }
        }
    }
}
