//! Response cache.
//!
//! A single TTL store is shared by every registry client of a service. Keys
//! fingerprint the request (method, URL, sorted parameters); values are the
//! raw JSON bodies returned by upstream registries.
//!
//! ## Configuration
//!
//! TTLs are controlled via `embodied.toml`:
//!
//! ```toml
//! [cache]
//! material_ttl_seconds = 21600
//! factor_ttl_seconds = 86400
//! project_ttl_seconds = 300
//! sweep_interval_seconds = 600
//! ```

mod config;
mod keys;
mod store;

pub use config::CacheConfig;
pub use keys::CacheKey;
pub use store::{CacheEntry, CacheStats, CacheStore};
