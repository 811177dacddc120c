//! Shared domain enumerations.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::error::DomainError;

/// Where a fetched value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CallSource {
    Cache,
    Live,
}

impl CallSource {
    pub fn as_str(self) -> &'static str {
        match self {
            CallSource::Cache => "CACHE",
            CallSource::Live => "LIVE",
        }
    }
}

/// Coarse material family used to look up regional transport penalties.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaterialClass {
    Steel,
    Concrete,
    Timber,
    Other,
}

impl MaterialClass {
    pub fn as_str(self) -> &'static str {
        match self {
            MaterialClass::Steel => "steel",
            MaterialClass::Concrete => "concrete",
            MaterialClass::Timber => "timber",
            MaterialClass::Other => "other",
        }
    }
}

impl FromStr for MaterialClass {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "steel" => Ok(MaterialClass::Steel),
            "concrete" => Ok(MaterialClass::Concrete),
            "timber" => Ok(MaterialClass::Timber),
            "other" => Ok(MaterialClass::Other),
            other => Err(DomainError::validation(format!(
                "unknown material class `{other}`"
            ))),
        }
    }
}
