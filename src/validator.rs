//! Post-placement re-validation.
//!
//! Checks a committed placement against the hard constraints straight from
//! the rule tables, without going through the eligibility filter used for
//! selection.

use thiserror::Error;

use crate::allocator::GroupAllocator;
use crate::models::GroupId;

/// A hard constraint broken by a committed placement.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Violation {
    #[error("group {0} does not exist")]
    UnknownGroup(GroupId),

    #[error("occupancy {occupancy} exceeds capacity {capacity}")]
    OverCapacity { occupancy: u32, capacity: u32 },

    #[error("group is not allowed for period {0}")]
    PeriodMismatch(String),

    #[error("group is forbidden for internal placements")]
    ForbiddenForInternal,
}

pub fn validate_allocation(
    allocator: &GroupAllocator,
    group: GroupId,
    period: &str,
    internal_placement: bool,
) -> Result<(), Violation> {
    let rules = allocator.rules();

    let capacity = rules
        .capacity(group)
        .ok_or(Violation::UnknownGroup(group))?;
    let occupancy = allocator.occupancy(group);
    if occupancy > capacity {
        return Err(Violation::OverCapacity {
            occupancy,
            capacity,
        });
    }

    if !rules.period_allows(period, group) {
        return Err(Violation::PeriodMismatch(period.to_string()));
    }

    if internal_placement && rules.is_internal_forbidden(group) {
        return Err(Violation::ForbiddenForInternal);
    }

    Ok(())
}
