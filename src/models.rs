use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Destination group identifier.
pub type GroupId = u32;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub input_file: String,
    // Overwrites the input table when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_file: Option<String>,
    pub report_file: String,
    pub internal_placement_token: String,
    pub existing_destinations: ExistingDestinations,
    pub internal_forbidden_groups: Vec<GroupId>,
    pub capacities: Vec<CapacityRange>,
    pub periods: BTreeMap<String, Vec<GroupId>>,
}

/// What to do with destinations already present in the input table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExistingDestinations {
    /// Discard them and re-derive every destination from scratch.
    #[serde(rename = "reset")]
    Reset,
    /// Refuse to run on an already populated table.
    #[serde(rename = "reject")]
    Reject,
}

/// Inclusive range of groups sharing one capacity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapacityRange {
    pub first: GroupId,
    pub last: GroupId,
    pub capacity: u32,
}

impl Default for Config {
    fn default() -> Self {
        let mut periods = BTreeMap::new();
        periods.insert(
            "P1".to_string(),
            vec![1, 2, 3, 4, 17, 18, 19, 20, 21, 22, 23],
        );
        periods.insert("P2".to_string(), (1..=16).collect());

        Self {
            input_file: "data_source.txt".to_string(),
            output_file: None,
            report_file: "validation_report.txt".to_string(),
            internal_placement_token: "oui".to_string(),
            existing_destinations: ExistingDestinations::Reset,
            internal_forbidden_groups: vec![1, 2, 3, 4],
            capacities: vec![
                CapacityRange { first: 1, last: 4, capacity: 8 },
                CapacityRange { first: 5, last: 22, capacity: 7 },
                CapacityRange { first: 23, last: 23, capacity: 6 },
            ],
            periods,
        }
    }
}

impl Config {
    pub fn load_from_file(file_path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(file_path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn save_to_file(&self, file_path: &str) -> anyhow::Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(file_path, content)?;
        Ok(())
    }

    pub fn output_path(&self) -> &str {
        self.output_file.as_deref().unwrap_or(&self.input_file)
    }
}

/// One row of the student table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudentRecord {
    pub line_number: String,
    pub profession: String,
    pub program_choice: String,
    pub source_group: String,
    /// Raw flag token, written back untouched.
    pub internal_placement: String,
    pub period: String,
    pub destination: Option<GroupId>,
    /// Existing destination cell that is not a group id, kept verbatim.
    pub stale_destination: Option<String>,
}

impl StudentRecord {
    pub fn is_internal_placement(&self, token: &str) -> bool {
        self.internal_placement.trim().eq_ignore_ascii_case(token)
    }

    pub fn is_assigned(&self) -> bool {
        self.destination.is_some()
    }

    /// True when the destination cell held anything at load time or since.
    pub fn has_existing_destination(&self) -> bool {
        self.destination.is_some() || self.stale_destination.is_some()
    }
}
