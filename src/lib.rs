//! Resilient enrichment client for embodied-carbon material coefficients.
//!
//! Records are fetched from slow external registries through a TTL cache and
//! a retrying executor, then overlaid with regional transport penalties,
//! suppliers and climate factors.

pub mod application;
pub mod cache;
pub mod config;
pub mod domain;
pub mod infra;
