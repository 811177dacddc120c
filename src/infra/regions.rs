//! Region reference data loaded from a TOML file.
//!
//! ```toml
//! [regions.brisbane]
//! transport_penalties = { concrete = 5.0, steel = 0.15 }
//!
//! [regions.brisbane.suppliers]
//! ready_mix_25mpa = ["Boral Brisbane"]
//!
//! [regions.brisbane.climate]
//! insulation_multiplier = 1.1
//! hazard_flags = ["cyclone"]
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;
use tracing::info;

use super::error::InfraError;
use crate::domain::regions::{ClimateAdjustments, RegionContext, RegionDirectory};
use crate::domain::types::MaterialClass;

#[derive(Debug, Deserialize, Default)]
#[serde(default, deny_unknown_fields)]
struct RawRegionFile {
    regions: BTreeMap<String, RawRegion>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default, deny_unknown_fields)]
struct RawRegion {
    transport_penalties: BTreeMap<String, f64>,
    suppliers: BTreeMap<String, Vec<String>>,
    climate: ClimateAdjustments,
}

/// Read and validate the region file at `path`.
pub async fn load_region_directory(path: &Path) -> Result<RegionDirectory, InfraError> {
    let contents = tokio::fs::read_to_string(path)
        .await
        .map_err(|err| InfraError::region_file(path, err.to_string()))?;
    let directory = parse_region_directory(&contents, path)?;
    info!(path = %path.display(), regions = directory.len(), "Region directory loaded");
    Ok(directory)
}

fn parse_region_directory(contents: &str, path: &Path) -> Result<RegionDirectory, InfraError> {
    let raw: RawRegionFile =
        toml::from_str(contents).map_err(|err| InfraError::region_file(path, err.to_string()))?;

    let mut regions = Vec::with_capacity(raw.regions.len());
    for (region_id, region) in raw.regions {
        regions.push(build_region(region_id, region).map_err(|message| {
            InfraError::region_file(path, message)
        })?);
    }
    Ok(RegionDirectory::new(regions))
}

fn build_region(region_id: String, raw: RawRegion) -> Result<RegionContext, String> {
    let mut penalties = BTreeMap::new();
    for (class, penalty) in raw.transport_penalties {
        let class: MaterialClass = class
            .parse()
            .map_err(|err| format!("region `{region_id}`: {err}"))?;
        if !penalty.is_finite() {
            return Err(format!(
                "region `{region_id}`: transport penalty for `{}` is not finite",
                class.as_str()
            ));
        }
        penalties.insert(class, penalty);
    }

    if !raw.climate.insulation_multiplier.is_finite() {
        return Err(format!(
            "region `{region_id}`: insulation multiplier is not finite"
        ));
    }

    Ok(RegionContext {
        region_id,
        transport_penalty_by_material_class: penalties,
        supplier_directory: raw.suppliers,
        climate_adjustments: raw.climate,
    })
}
