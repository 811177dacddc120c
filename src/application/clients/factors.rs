use std::time::Duration;

use metrics::counter;
use time::{Date, OffsetDateTime};
use tracing::{instrument, warn};

use super::{RegistryEndpoint, decode};
use crate::domain::factors::{EmissionFactorTable, fallback_table};
use crate::infra::http::{RequestError, RequestExecutor};

const METRIC_FACTOR_FALLBACK: &str = "embodied_factor_fallback_total";

/// Client for the regional emission-factor registry.
///
/// When the registry stays unavailable for the whole retry budget, the
/// shipped fallback edition is served instead, flagged with `used_fallback`.
/// Rejected requests and regions the edition does not cover still fail.
#[derive(Clone)]
pub struct EmissionFactorClient {
    executor: RequestExecutor,
    endpoint: RegistryEndpoint,
    ttl: Duration,
    fallback_max_age: Duration,
}

impl EmissionFactorClient {
    pub fn new(
        executor: RequestExecutor,
        endpoint: RegistryEndpoint,
        ttl: Duration,
        fallback_max_age: Duration,
    ) -> Self {
        Self {
            executor,
            endpoint,
            ttl,
            fallback_max_age,
        }
    }

    /// `GET {base}/emission-factors/{region}`
    #[instrument(skip(self))]
    pub async fn get_regional_emission_factors(
        &self,
        region_id: &str,
    ) -> Result<EmissionFactorTable, RequestError> {
        let request = self
            .endpoint
            .get(&["emission-factors", region_id])
            .cached_for(self.ttl);

        let live = self
            .executor
            .execute_with(&request, |value| {
                let table: EmissionFactorTable = decode(value, "emission factor table")?;
                table
                    .validate()
                    .map_err(|err| RequestError::decode("emission factor table", err))?;
                Ok(table)
            })
            .await;

        match live {
            Ok(fetched) => {
                let mut table = fetched.value;
                table.used_fallback = false;
                Ok(table)
            }
            Err(err @ RequestError::ExhaustedRetries { .. }) => {
                let today = OffsetDateTime::now_utc().date();
                match self.fallback_for(region_id, today) {
                    Some(table) => {
                        warn!(
                            region_id,
                            version = %table.version,
                            error = %err,
                            "Emission factor registry unavailable; serving fallback table"
                        );
                        Ok(table)
                    }
                    None => Err(err),
                }
            }
            Err(err) => Err(err),
        }
    }

    fn fallback_for(&self, region_id: &str, today: Date) -> Option<EmissionFactorTable> {
        let table = fallback_table(region_id)?;
        counter!(METRIC_FACTOR_FALLBACK).increment(1);

        if is_stale(&table, today, self.fallback_max_age) {
            warn!(
                region_id,
                version = %table.version,
                as_of = %table.as_of,
                age_days = table.age_on(today).whole_days(),
                max_age_days = self.fallback_max_age.as_secs() / 86_400,
                "Fallback emission factors are older than the configured maximum age"
            );
        }
        Some(table)
    }
}

fn is_stale(table: &EmissionFactorTable, today: Date, max_age: Duration) -> bool {
    let age_secs = u64::try_from(table.age_on(today).whole_seconds()).unwrap_or(0);
    age_secs > max_age.as_secs()
}
