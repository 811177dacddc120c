//! Cache configuration.
//!
//! TTL policy per upstream plus the optional background sweep, derived from
//! the `[cache]` section of `embodied.toml`.

use std::time::Duration;

// Material EPD registries change over hours, national factor tables daily,
// the project backend within minutes.
const DEFAULT_MATERIAL_TTL_SECS: u64 = 6 * 60 * 60;
const DEFAULT_FACTOR_TTL_SECS: u64 = 24 * 60 * 60;
const DEFAULT_PROJECT_TTL_SECS: u64 = 5 * 60;

/// Cache TTL policy.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// TTL for material registry responses.
    pub material_ttl: Duration,
    /// TTL for regional emission-factor tables.
    pub factor_ttl: Duration,
    /// TTL for project backend responses.
    pub project_ttl: Duration,
    /// Interval of the expired-entry sweep; `None` keeps eviction lazy.
    pub sweep_interval: Option<Duration>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            material_ttl: Duration::from_secs(DEFAULT_MATERIAL_TTL_SECS),
            factor_ttl: Duration::from_secs(DEFAULT_FACTOR_TTL_SECS),
            project_ttl: Duration::from_secs(DEFAULT_PROJECT_TTL_SECS),
            sweep_interval: None,
        }
    }
}

impl From<&crate::config::CacheSettings> for CacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        Self {
            material_ttl: settings.material_ttl,
            factor_ttl: settings.factor_ttl,
            project_ttl: settings.project_ttl,
            sweep_interval: settings.sweep_interval,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_ttls_follow_upstream_volatility() {
        let config = CacheConfig::default();
        assert_eq!(config.material_ttl, Duration::from_secs(21_600));
        assert_eq!(config.factor_ttl, Duration::from_secs(86_400));
        assert_eq!(config.project_ttl, Duration::from_secs(300));
        assert!(config.project_ttl < config.material_ttl);
        assert!(config.material_ttl < config.factor_ttl);
        assert!(config.sweep_interval.is_none());
    }
}
