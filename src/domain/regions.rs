//! Regional reference data overlaid onto material records.

use std::borrow::Cow;
use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::{Deserialize, Serialize};
use tracing::warn;

use super::types::MaterialClass;

fn default_insulation_multiplier() -> f64 {
    1.0
}

/// Climate adjustments passed through to enriched results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all(serialize = "camelCase"))]
pub struct ClimateAdjustments {
    #[serde(default = "default_insulation_multiplier")]
    pub insulation_multiplier: f64,
    #[serde(default)]
    pub hazard_flags: BTreeSet<String>,
}

impl Default for ClimateAdjustments {
    fn default() -> Self {
        Self {
            insulation_multiplier: default_insulation_multiplier(),
            hazard_flags: BTreeSet::new(),
        }
    }
}

/// Static, read-only reference data for one region.
#[derive(Debug, Clone, PartialEq)]
pub struct RegionContext {
    pub region_id: String,
    pub transport_penalty_by_material_class: BTreeMap<MaterialClass, f64>,
    pub supplier_directory: BTreeMap<String, Vec<String>>,
    pub climate_adjustments: ClimateAdjustments,
}

impl RegionContext {
    /// A context with no penalties, no known suppliers and neutral climate.
    pub fn neutral(region_id: impl Into<String>) -> Self {
        Self {
            region_id: region_id.into(),
            transport_penalty_by_material_class: BTreeMap::new(),
            supplier_directory: BTreeMap::new(),
            climate_adjustments: ClimateAdjustments::default(),
        }
    }

    pub fn transport_penalty(&self, class: MaterialClass) -> f64 {
        self.transport_penalty_by_material_class
            .get(&class)
            .copied()
            .unwrap_or(0.0)
    }

    pub fn suppliers_for(&self, material_id: &str) -> Option<&[String]> {
        self.supplier_directory
            .get(material_id)
            .map(Vec::as_slice)
    }
}

/// All known regions, loaded once at startup.
#[derive(Debug, Clone, Default)]
pub struct RegionDirectory {
    regions: HashMap<String, RegionContext>,
}

impl RegionDirectory {
    pub fn new(regions: impl IntoIterator<Item = RegionContext>) -> Self {
        Self {
            regions: regions
                .into_iter()
                .map(|region| (region.region_id.clone(), region))
                .collect(),
        }
    }

    pub fn get(&self, region_id: &str) -> Option<&RegionContext> {
        self.regions.get(region_id)
    }

    /// Return the region, or a neutral context when it is unknown.
    pub fn resolve(&self, region_id: &str) -> Cow<'_, RegionContext> {
        match self.regions.get(region_id) {
            Some(region) => Cow::Borrowed(region),
            None => {
                warn!(region_id, "Unknown region; enriching with neutral context");
                Cow::Owned(RegionContext::neutral(region_id))
            }
        }
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }
}
