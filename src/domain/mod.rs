//! Domain layer types and invariants.

pub mod enrichment;
pub mod error;
pub mod factors;
pub mod materials;
pub mod projects;
pub mod regions;
pub mod types;
