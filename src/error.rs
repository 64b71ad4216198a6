//! Allocation and configuration error types.

use thiserror::Error;

use crate::models::GroupId;

/// Errors that abort an allocation run.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AllocationError {
    #[error("line {line}: allocation to group {group} failed re-validation: {reason}")]
    Contradiction {
        line: String,
        group: GroupId,
        reason: String,
    },

    #[error("{count} record(s) already carry a destination (first at line {first_line}); clear them or use the reset policy")]
    ExistingDestinations { count: usize, first_line: String },
}

/// Errors raised while compiling a configuration into allocation rules.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("capacity table is empty")]
    NoGroups,

    #[error("capacity range {first}-{last} is inverted")]
    InvertedRange { first: GroupId, last: GroupId },

    #[error("group {0} appears in more than one capacity range")]
    DuplicateGroup(GroupId),

    #[error("period {period} references unknown group {group}")]
    UnknownPeriodGroup { period: String, group: GroupId },

    #[error("forbidden set references unknown group {0}")]
    UnknownForbiddenGroup(GroupId),
}
