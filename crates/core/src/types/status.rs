//! Status enums for lead records.

use serde::{Deserialize, Serialize};

/// Follow-up status of a lead record.
///
/// This client only ever writes [`LeadStatus::New`]; the remaining values are
/// set by whoever works the lead downstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum LeadStatus {
    #[default]
    New,
    Contacted,
    Qualified,
    Closed,
}

impl LeadStatus {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::New => "New",
            Self::Contacted => "Contacted",
            Self::Qualified => "Qualified",
            Self::Closed => "Closed",
        }
    }
}

impl std::fmt::Display for LeadStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for LeadStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "New" => Ok(Self::New),
            "Contacted" => Ok(Self::Contacted),
            "Qualified" => Ok(Self::Qualified),
            "Closed" => Ok(Self::Closed),
            _ => Err(format!("invalid lead status: {s}")),
        }
    }
}
