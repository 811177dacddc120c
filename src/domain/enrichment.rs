//! Regional enrichment of raw material records.
//!
//! [`enrich`] is pure: the timestamp is an argument, so identical inputs
//! always produce identical results. Absent lookups fall back to zero penalty
//! and the generic supplier; nothing here can fail.

use serde::Serialize;
use time::OffsetDateTime;

use super::materials::MaterialRecord;
use super::regions::{ClimateAdjustments, RegionContext};
use super::types::MaterialClass;

/// Supplier listed when the region has no entry for a material.
pub const GENERIC_SUPPLIER: &str = "Generic Supplier";

/// A material record with its regional overlay applied.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrichedMaterialResult {
    pub material_record: MaterialRecord,
    pub region_id: String,
    pub material_class: MaterialClass,
    pub transport_penalty: f64,
    /// `carbon_rate + transport_penalty`.
    pub adjusted_carbon_rate: f64,
    pub suppliers: Vec<String>,
    pub climate_factors: ClimateAdjustments,
    #[serde(with = "time::serde::rfc3339")]
    pub enriched_at: OffsetDateTime,
}

pub fn enrich(
    record: &MaterialRecord,
    region: &RegionContext,
    enriched_at: OffsetDateTime,
) -> EnrichedMaterialResult {
    let material_class = record.class();
    let transport_penalty = region.transport_penalty(material_class);
    let suppliers = region
        .suppliers_for(&record.material_id)
        .map(<[String]>::to_vec)
        .unwrap_or_else(|| vec![GENERIC_SUPPLIER.to_string()]);

    EnrichedMaterialResult {
        material_record: record.clone(),
        region_id: region.region_id.clone(),
        material_class,
        transport_penalty,
        adjusted_carbon_rate: record.carbon_rate + transport_penalty,
        suppliers,
        climate_factors: region.climate_adjustments.clone(),
        enriched_at,
    }
}
