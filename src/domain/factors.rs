//! Regional emission-factor tables and the shipped fallback edition.
//!
//! The fallback is versioned reference data: every table built from it
//! carries the edition label and its `as_of` date, so callers can judge how
//! stale it is instead of trusting it silently.

use serde::{Deserialize, Serialize};
use time::{Date, macros::date};

use super::error::DomainError;

time::serde::format_description!(iso_date, Date, "[year]-[month]-[day]");

/// Edition label of the shipped fallback table.
pub const FALLBACK_VERSION: &str = "au-national-factors-2023";
/// Publication date of the shipped fallback table.
pub const FALLBACK_AS_OF: Date = date!(2023 - 08 - 01);

// kg CO2-e per kWh of purchased grid electricity, by grid region.
const FALLBACK_GRID_INTENSITY: &[(&str, f64)] = &[
    ("adelaide", 0.25),
    ("brisbane", 0.73),
    ("darwin", 0.54),
    ("hobart", 0.17),
    ("melbourne", 0.79),
    ("perth", 0.51),
    ("sydney", 0.68),
];
const FALLBACK_DIESEL_KG_PER_LITRE: f64 = 2.70;
const FALLBACK_NATURAL_GAS_KG_PER_GJ: f64 = 51.53;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmissionFactor {
    pub category: String,
    pub value: f64,
    pub unit: String,
}

impl EmissionFactor {
    fn new(category: &str, value: f64, unit: &str) -> Self {
        Self {
            category: category.to_string(),
            value,
            unit: unit.to_string(),
        }
    }
}

/// Emission factors published for one region.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmissionFactorTable {
    pub region_id: String,
    pub version: String,
    #[serde(with = "iso_date")]
    pub as_of: Date,
    pub factors: Vec<EmissionFactor>,
    /// Set when the table came from the shipped fallback edition.
    #[serde(default)]
    pub used_fallback: bool,
}

impl EmissionFactorTable {
    pub fn validate(&self) -> Result<(), DomainError> {
        if let Some(factor) = self.factors.iter().find(|f| !f.value.is_finite()) {
            return Err(DomainError::validation(format!(
                "factor `{}` for region `{}` is not a finite number",
                factor.category, self.region_id
            )));
        }
        Ok(())
    }

    pub fn factor(&self, category: &str) -> Option<&EmissionFactor> {
        self.factors.iter().find(|f| f.category == category)
    }

    /// Age of the table on `today`; zero if `as_of` lies in the future.
    pub fn age_on(&self, today: Date) -> time::Duration {
        (today - self.as_of).max(time::Duration::ZERO)
    }
}

/// The shipped fallback table for `region_id`, if the edition covers it.
pub fn fallback_table(region_id: &str) -> Option<EmissionFactorTable> {
    let (_, grid) = FALLBACK_GRID_INTENSITY
        .iter()
        .find(|(region, _)| *region == region_id)?;

    Some(EmissionFactorTable {
        region_id: region_id.to_string(),
        version: FALLBACK_VERSION.to_string(),
        as_of: FALLBACK_AS_OF,
        factors: vec![
            EmissionFactor::new("grid_electricity", *grid, "kgCO2e/kWh"),
            EmissionFactor::new("diesel_combustion", FALLBACK_DIESEL_KG_PER_LITRE, "kgCO2e/L"),
            EmissionFactor::new("natural_gas", FALLBACK_NATURAL_GAS_KG_PER_GJ, "kgCO2e/GJ"),
        ],
        used_fallback: true,
    })
}
