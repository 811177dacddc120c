use std::sync::Once;

use metrics::{Unit, describe_counter, describe_gauge, describe_histogram};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::config::{LogFormat, LoggingSettings};

use super::error::InfraError;

static METRIC_DESCRIPTIONS: Once = Once::new();

/// Install a global tracing subscriber using the provided logging settings.
///
/// Logs go to stderr so command output on stdout stays machine-readable.
pub fn init(logging: &LoggingSettings) -> Result<(), InfraError> {
    describe_metrics();

    let env_filter = EnvFilter::builder()
        .with_default_directive(logging.level.into())
        .from_env_lossy();

    let fmt_layer = match logging.format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_current_span(true)
            .with_span_list(true)
            .with_target(true)
            .boxed(),
        LogFormat::Compact => fmt::layer()
            .compact()
            .with_writer(std::io::stderr)
            .with_target(true)
            .boxed(),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(ErrorLayer::default())
        .with(fmt_layer)
        .try_init()
        .map_err(|err| {
            InfraError::telemetry(format!("failed to install tracing subscriber: {err}"))
        })
}

fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            "embodied_cache_hit_total",
            Unit::Count,
            "Total number of response-cache hits."
        );
        describe_counter!(
            "embodied_cache_miss_total",
            Unit::Count,
            "Total number of response-cache misses, including expired entries."
        );
        describe_gauge!(
            "embodied_cache_entries",
            Unit::Count,
            "Current number of entries held by the response cache."
        );
        describe_counter!(
            "embodied_request_attempt_total",
            Unit::Count,
            "Total number of upstream request attempts."
        );
        describe_counter!(
            "embodied_request_retry_total",
            Unit::Count,
            "Total number of retries scheduled after a transient failure."
        );
        describe_counter!(
            "embodied_request_failure_total",
            Unit::Count,
            "Total number of logical requests that failed, labelled by kind."
        );
        describe_counter!(
            "embodied_factor_fallback_total",
            Unit::Count,
            "Total number of emission factor lookups served from the fallback table."
        );
        describe_histogram!(
            "embodied_batch_run_ms",
            Unit::Milliseconds,
            "Wall-clock duration of a batch enrichment run in milliseconds."
        );
    });
}
