//! Material records as published by EPD registries.

use serde::{Deserialize, Serialize};

use super::error::DomainError;
use super::types::MaterialClass;

/// Identifier fragments mapped to their material class, checked in order.
///
/// The first fragment contained in the lower-cased identifier wins.
const CLASS_TABLE: &[(&str, MaterialClass)] = &[
    ("rebar", MaterialClass::Steel),
    ("steel", MaterialClass::Steel),
    ("mesh", MaterialClass::Steel),
    ("ready_mix", MaterialClass::Concrete),
    ("concrete", MaterialClass::Concrete),
    ("precast", MaterialClass::Concrete),
    ("shotcrete", MaterialClass::Concrete),
    ("timber", MaterialClass::Timber),
    ("glulam", MaterialClass::Timber),
    ("clt", MaterialClass::Timber),
    ("plywood", MaterialClass::Timber),
];

/// Raw carbon coefficient for one material, as returned by a registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MaterialRecord {
    pub material_id: String,
    /// kg CO2-e per `unit`.
    pub carbon_rate: f64,
    pub unit: String,
    /// Registry confidence in `[0, 1]`.
    pub confidence_score: f64,
    pub source_id: String,
}

impl MaterialRecord {
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.material_id.trim().is_empty() {
            return Err(DomainError::validation("material id must not be empty"));
        }
        if !self.carbon_rate.is_finite() {
            return Err(DomainError::validation(format!(
                "carbon rate for `{}` is not a finite number",
                self.material_id
            )));
        }
        if !(0.0..=1.0).contains(&self.confidence_score) {
            return Err(DomainError::validation(format!(
                "confidence score {} for `{}` is outside [0, 1]",
                self.confidence_score, self.material_id
            )));
        }
        Ok(())
    }

    pub fn class(&self) -> MaterialClass {
        classify(&self.material_id)
    }
}

/// Look up the material class for an identifier.
pub fn classify(material_id: &str) -> MaterialClass {
    let id = material_id.to_ascii_lowercase();
    CLASS_TABLE
        .iter()
        .find(|(fragment, _)| id.contains(fragment))
        .map(|(_, class)| *class)
        .unwrap_or(MaterialClass::Other)
}
