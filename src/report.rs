use crate::allocator::GroupAllocator;
use crate::models::{GroupId, StudentRecord};
use anyhow::{Context, Result};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupCount {
    pub group: GroupId,
    pub occupancy: u32,
    pub capacity: u32,
}

impl GroupCount {
    pub fn is_over_capacity(&self) -> bool {
        self.occupancy > self.capacity
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeriodCheck {
    pub period: String,
    pub allowed_groups: Vec<GroupId>,
    pub violations: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceSpread {
    pub students: usize,
    pub destinations: BTreeSet<GroupId>,
}

/// Post-run summary built from the allocator's final state and the records.
#[derive(Debug, Clone)]
pub struct ValidationReport {
    pub group_counts: Vec<GroupCount>,
    pub unassigned: Vec<StudentRecord>,
    pub period_checks: Vec<PeriodCheck>,
    pub internal_forbidden_groups: Vec<GroupId>,
    pub internal_violations: usize,
    /// Mean over non-empty groups of the most repeated source group.
    pub average_source_group_repeat: f64,
    /// Mean over non-empty groups of the most repeated profession.
    pub average_profession_repeat: f64,
    pub source_distribution: BTreeMap<String, SourceSpread>,
}

impl ValidationReport {
    pub fn build(allocator: &GroupAllocator, records: &[StudentRecord], internal_token: &str) -> Self {
        let rules = allocator.rules();

        let group_counts = allocator
            .groups()
            .map(|(group, state)| GroupCount {
                group,
                occupancy: state.occupancy,
                capacity: state.capacity,
            })
            .collect();

        let unassigned = records
            .iter()
            .filter(|record| !record.is_assigned())
            .cloned()
            .collect();

        let period_checks = rules
            .periods()
            .map(|(period, allowed)| PeriodCheck {
                period: period.to_string(),
                allowed_groups: allowed.iter().copied().collect(),
                violations: records
                    .iter()
                    .filter(|r| r.period == period)
                    .filter_map(|r| r.destination)
                    .filter(|&group| !allowed.contains(&group))
                    .count(),
            })
            .collect();

        let internal_violations = records
            .iter()
            .filter(|r| r.is_internal_placement(internal_token))
            .filter_map(|r| r.destination)
            .filter(|&group| rules.is_internal_forbidden(group))
            .count();

        let filled: Vec<_> = allocator
            .groups()
            .filter(|(_, state)| state.occupancy > 0)
            .map(|(_, state)| state)
            .collect();
        let average = |total: u32| {
            if filled.is_empty() {
                0.0
            } else {
                f64::from(total) / filled.len() as f64
            }
        };
        let average_source_group_repeat =
            average(filled.iter().map(|state| state.max_source_group_repeat()).sum());
        let average_profession_repeat =
            average(filled.iter().map(|state| state.max_profession_repeat()).sum());

        let mut source_distribution: BTreeMap<String, SourceSpread> = BTreeMap::new();
        for record in records {
            if let Some(group) = record.destination {
                let spread = source_distribution
                    .entry(record.source_group.clone())
                    .or_default();
                spread.students += 1;
                spread.destinations.insert(group);
            }
        }

        Self {
            group_counts,
            unassigned,
            period_checks,
            internal_forbidden_groups: rules.internal_forbidden().iter().copied().collect(),
            internal_violations,
            average_source_group_repeat,
            average_profession_repeat,
            source_distribution,
        }
    }

    pub fn has_violations(&self) -> bool {
        self.group_counts.iter().any(GroupCount::is_over_capacity)
            || self.period_checks.iter().any(|check| check.violations > 0)
            || self.internal_violations > 0
    }

    pub fn render(&self) -> String {
        let mut content = String::new();
        content.push_str("=== VALIDATION REPORT ===\n\n");

        content.push_str("1. DESTINATION GROUP COUNTS:\n");
        for count in &self.group_counts {
            let status = if count.is_over_capacity() { "VIOLATION" } else { "OK" };
            content.push_str(&format!(
                "   Group {:2}: {:2}/{} students [{}]\n",
                count.group, count.occupancy, count.capacity, status
            ));
        }

        content.push_str("\n2. CAPACITY VERIFICATION:\n");
        let over: Vec<_> = self
            .group_counts
            .iter()
            .filter(|count| count.is_over_capacity())
            .collect();
        if over.is_empty() {
            content.push_str("   ✓ All groups within capacity limits\n");
        }
        for count in over {
            content.push_str(&format!(
                "   VIOLATION: Group {} has {} students (capacity {})\n",
                count.group, count.occupancy, count.capacity
            ));
        }

        content.push_str("\n3. UNASSIGNED STUDENTS:\n");
        content.push_str(&format!("   Total unassigned: {}\n", self.unassigned.len()));
        if self.unassigned.is_empty() {
            content.push_str("   ✓ All students successfully assigned\n");
        }
        for record in &self.unassigned {
            content.push_str(&format!(
                "   - Line {}: {}, {}, Stage={}, {}\n",
                record.line_number,
                record.profession,
                record.source_group,
                record.internal_placement,
                record.period
            ));
        }

        content.push_str("\n4. PERIOD PLACEMENT VERIFICATION:\n");
        for check in &self.period_checks {
            if check.violations > 0 {
                content.push_str(&format!(
                    "   VIOLATION: {} {} students in wrong groups\n",
                    check.violations, check.period
                ));
            } else {
                content.push_str(&format!(
                    "   ✓ All {} students in allowed groups {}\n",
                    check.period,
                    format_groups(&check.allowed_groups)
                ));
            }
        }

        content.push_str("\n5. INTERNAL PLACEMENT VERIFICATION:\n");
        let forbidden = format_groups(&self.internal_forbidden_groups);
        if self.internal_violations > 0 {
            content.push_str(&format!(
                "   VIOLATION: {} internal-placement students in forbidden groups {}\n",
                self.internal_violations, forbidden
            ));
        } else {
            content.push_str(&format!(
                "   ✓ No internal-placement students in forbidden groups {}\n",
                forbidden
            ));
        }

        content.push_str("\n6. MIXING METRICS:\n");
        content.push_str(&format!(
            "   Average max source group repetition per destination: {:.2}\n",
            self.average_source_group_repeat
        ));
        content.push_str(&format!(
            "   Average max profession repetition per destination: {:.2}\n",
            self.average_profession_repeat
        ));

        content.push_str("\n7. SOURCE GROUP DISTRIBUTION:\n");
        for (source_group, spread) in &self.source_distribution {
            content.push_str(&format!(
                "   {}: {} students → {} unique destinations\n",
                source_group,
                spread.students,
                spread.destinations.len()
            ));
        }

        content
    }

    pub fn write_to_file(&self, file_path: &str) -> Result<()> {
        fs::write(file_path, self.render())
            .with_context(|| format!("Failed to write report: {}", file_path))
    }
}

fn format_groups(groups: &[GroupId]) -> String {
    let joined: Vec<String> = groups.iter().map(|g| g.to_string()).collect();
    format!("{{{}}}", joined.join(","))
}
