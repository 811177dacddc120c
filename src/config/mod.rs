//! Configuration layer: typed settings with layered precedence (file → env → CLI).

use std::{
    num::{NonZeroU32, NonZeroUsize},
    path::PathBuf,
    str::FromStr,
    time::Duration,
};

use clap::{Args, Parser, Subcommand, ValueHint, builder::BoolishValueParser};
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;
use url::Url;

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "embodied";
const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;
const DEFAULT_HTTP_RETRY_ATTEMPTS: u64 = 3;
const DEFAULT_HTTP_RETRY_DELAY_MS: u64 = 1_000;
const DEFAULT_MATERIALS_URL: &str = "http://127.0.0.1:8081/";
const DEFAULT_FACTORS_URL: &str = "http://127.0.0.1:8082/";
const DEFAULT_PROJECTS_URL: &str = "http://127.0.0.1:8083/";
const DEFAULT_MATERIAL_TTL_SECS: u64 = 6 * 60 * 60;
const DEFAULT_FACTOR_TTL_SECS: u64 = 24 * 60 * 60;
const DEFAULT_PROJECT_TTL_SECS: u64 = 5 * 60;
const DEFAULT_FALLBACK_MAX_AGE_DAYS: u64 = 730;
const DEFAULT_BATCH_CHUNK_SIZE: u64 = 3;
const DEFAULT_REGIONS_PATH: &str = "config/regions.toml";

/// Command-line arguments for the embodied binary.
#[derive(Debug, Parser)]
#[command(
    name = "embodied",
    version,
    about = "Embodied-carbon enrichment client"
)]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "EMBODIED_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Enrich a JSON array of `{ materialId, regionId }` queries and print the report.
    Enrich(EnrichArgs),
    /// Print the emission factor table for a region.
    Factors(FactorsArgs),
    /// List projects known to the project backend.
    Projects(ProjectsArgs),
}

impl Command {
    pub fn overrides(&self) -> &RunOverrides {
        match self {
            Command::Enrich(args) => &args.overrides,
            Command::Factors(args) => &args.overrides,
            Command::Projects(args) => &args.overrides,
        }
    }
}

#[derive(Debug, Args, Clone)]
pub struct EnrichArgs {
    #[command(flatten)]
    pub overrides: RunOverrides,

    /// Path to the queries file.
    #[arg(value_name = "FILE", value_hint = ValueHint::FilePath)]
    pub file: PathBuf,

    /// Pretty-print the JSON report.
    #[arg(long, action = clap::ArgAction::SetTrue)]
    pub pretty: bool,
}

#[derive(Debug, Args, Clone)]
pub struct FactorsArgs {
    #[command(flatten)]
    pub overrides: RunOverrides,

    /// Region identifier, e.g. `brisbane`.
    #[arg(value_name = "REGION")]
    pub region: String,
}

#[derive(Debug, Args, Clone)]
pub struct ProjectsArgs {
    #[command(flatten)]
    pub overrides: RunOverrides,

    /// Fetch a single project instead of listing all of them.
    #[arg(long = "id", value_name = "ID")]
    pub id: Option<String>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct RunOverrides {
    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub log_json: Option<bool>,

    /// Override the per-attempt request timeout.
    #[arg(long = "http-timeout-seconds", value_name = "SECONDS")]
    pub http_timeout_seconds: Option<u64>,

    /// Override the number of attempts per logical request.
    #[arg(long = "http-retry-attempts", value_name = "COUNT")]
    pub http_retry_attempts: Option<u64>,

    /// Override the linear backoff step between attempts.
    #[arg(long = "http-retry-delay-ms", value_name = "MILLIS")]
    pub http_retry_delay_ms: Option<u64>,

    /// Override the material registry base URL.
    #[arg(long = "materials-url", value_name = "URL")]
    pub materials_url: Option<String>,

    /// Override the emission factor registry base URL.
    #[arg(long = "factors-url", value_name = "URL")]
    pub factors_url: Option<String>,

    /// Override the project backend base URL.
    #[arg(long = "projects-url", value_name = "URL")]
    pub projects_url: Option<String>,

    /// Override the batch chunk size.
    #[arg(long = "batch-chunk-size", value_name = "COUNT")]
    pub batch_chunk_size: Option<u64>,

    /// Override the region reference file.
    #[arg(long = "regions-path", value_name = "PATH", value_hint = ValueHint::FilePath)]
    pub regions_path: Option<PathBuf>,
}

/// Fully-resolved settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub logging: LoggingSettings,
    pub http: HttpSettings,
    pub registries: RegistrySettings,
    pub cache: CacheSettings,
    pub batch: BatchSettings,
    pub regions: RegionSettings,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone)]
pub struct HttpSettings {
    pub timeout: Duration,
    pub retry_attempts: NonZeroU32,
    pub retry_delay: Duration,
}

#[derive(Debug, Clone)]
pub struct EndpointSettings {
    pub base_url: Url,
    pub token: Option<String>,
}

#[derive(Debug, Clone)]
pub struct RegistrySettings {
    pub materials: EndpointSettings,
    pub factors: EndpointSettings,
    pub projects: EndpointSettings,
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub material_ttl: Duration,
    pub factor_ttl: Duration,
    pub project_ttl: Duration,
    /// `None` disables the background sweeper.
    pub sweep_interval: Option<Duration>,
    pub fallback_max_age: Duration,
}

#[derive(Debug, Clone)]
pub struct BatchSettings {
    pub chunk_size: NonZeroUsize,
}

#[derive(Debug, Clone)]
pub struct RegionSettings {
    pub path: PathBuf,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix("EMBODIED").separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;
    raw.apply_overrides(cli.command.overrides());

    Settings::from_raw(raw)
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    logging: RawLoggingSettings,
    http: RawHttpSettings,
    registries: RawRegistrySettings,
    cache: RawCacheSettings,
    batch: RawBatchSettings,
    regions: RawRegionSettings,
}

impl RawSettings {
    fn apply_overrides(&mut self, overrides: &RunOverrides) {
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
        if let Some(seconds) = overrides.http_timeout_seconds {
            self.http.timeout_seconds = Some(seconds);
        }
        if let Some(attempts) = overrides.http_retry_attempts {
            self.http.retry_attempts = Some(attempts);
        }
        if let Some(delay) = overrides.http_retry_delay_ms {
            self.http.retry_delay_ms = Some(delay);
        }
        if let Some(url) = overrides.materials_url.as_ref() {
            self.registries.materials.base_url = Some(url.clone());
        }
        if let Some(url) = overrides.factors_url.as_ref() {
            self.registries.factors.base_url = Some(url.clone());
        }
        if let Some(url) = overrides.projects_url.as_ref() {
            self.registries.projects.base_url = Some(url.clone());
        }
        if let Some(size) = overrides.batch_chunk_size {
            self.batch.chunk_size = Some(size);
        }
        if let Some(path) = overrides.regions_path.as_ref() {
            self.regions.path = Some(path.clone());
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            logging,
            http,
            registries,
            cache,
            batch,
            regions,
        } = raw;

        let logging = build_logging_settings(logging)?;
        let http = build_http_settings(http)?;
        let registries = build_registry_settings(registries)?;
        let cache = build_cache_settings(cache)?;
        let batch = build_batch_settings(batch)?;
        let regions = build_region_settings(regions)?;

        Ok(Self {
            logging,
            http,
            registries,
            cache,
            batch,
            regions,
        })
    }
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_http_settings(http: RawHttpSettings) -> Result<HttpSettings, LoadError> {
    let timeout_seconds = http.timeout_seconds.unwrap_or(DEFAULT_HTTP_TIMEOUT_SECS);
    if timeout_seconds == 0 {
        return Err(LoadError::invalid(
            "http.timeout_seconds",
            "must be greater than zero",
        ));
    }

    let retry_attempts = non_zero_u32(
        http.retry_attempts.unwrap_or(DEFAULT_HTTP_RETRY_ATTEMPTS),
        "http.retry_attempts",
    )?;

    Ok(HttpSettings {
        timeout: Duration::from_secs(timeout_seconds),
        retry_attempts,
        retry_delay: Duration::from_millis(
            http.retry_delay_ms.unwrap_or(DEFAULT_HTTP_RETRY_DELAY_MS),
        ),
    })
}

fn build_registry_settings(
    registries: RawRegistrySettings,
) -> Result<RegistrySettings, LoadError> {
    Ok(RegistrySettings {
        materials: build_endpoint(
            registries.materials,
            DEFAULT_MATERIALS_URL,
            "registries.materials.base_url",
        )?,
        factors: build_endpoint(
            registries.factors,
            DEFAULT_FACTORS_URL,
            "registries.factors.base_url",
        )?,
        projects: build_endpoint(
            registries.projects,
            DEFAULT_PROJECTS_URL,
            "registries.projects.base_url",
        )?,
    })
}

fn build_endpoint(
    endpoint: RawEndpointSettings,
    default_url: &str,
    key: &'static str,
) -> Result<EndpointSettings, LoadError> {
    let raw_url = endpoint
        .base_url
        .unwrap_or_else(|| default_url.to_string());
    let base_url = parse_base_url(raw_url.trim()).map_err(|reason| LoadError::invalid(key, reason))?;

    let token = endpoint.token.and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    });

    Ok(EndpointSettings { base_url, token })
}

fn build_cache_settings(cache: RawCacheSettings) -> Result<CacheSettings, LoadError> {
    let sweep_interval = match cache.sweep_interval_seconds {
        None | Some(0) => None,
        Some(seconds) => Some(Duration::from_secs(seconds)),
    };

    let fallback_days = cache
        .fallback_max_age_days
        .unwrap_or(DEFAULT_FALLBACK_MAX_AGE_DAYS);
    if fallback_days == 0 {
        return Err(LoadError::invalid(
            "cache.fallback_max_age_days",
            "must be greater than zero",
        ));
    }

    Ok(CacheSettings {
        material_ttl: Duration::from_secs(
            cache.material_ttl_seconds.unwrap_or(DEFAULT_MATERIAL_TTL_SECS),
        ),
        factor_ttl: Duration::from_secs(
            cache.factor_ttl_seconds.unwrap_or(DEFAULT_FACTOR_TTL_SECS),
        ),
        project_ttl: Duration::from_secs(
            cache.project_ttl_seconds.unwrap_or(DEFAULT_PROJECT_TTL_SECS),
        ),
        sweep_interval,
        fallback_max_age: Duration::from_secs(fallback_days.saturating_mul(24 * 60 * 60)),
    })
}

fn build_batch_settings(batch: RawBatchSettings) -> Result<BatchSettings, LoadError> {
    let value = batch.chunk_size.unwrap_or(DEFAULT_BATCH_CHUNK_SIZE);
    let value: usize = value
        .try_into()
        .map_err(|_| LoadError::invalid("batch.chunk_size", "value exceeds supported range"))?;
    let chunk_size = NonZeroUsize::new(value)
        .ok_or_else(|| LoadError::invalid("batch.chunk_size", "must be greater than zero"))?;
    Ok(BatchSettings { chunk_size })
}

fn build_region_settings(regions: RawRegionSettings) -> Result<RegionSettings, LoadError> {
    let path = regions
        .path
        .unwrap_or_else(|| PathBuf::from(DEFAULT_REGIONS_PATH));
    if path.as_os_str().is_empty() {
        return Err(LoadError::invalid("regions.path", "path must not be empty"));
    }
    Ok(RegionSettings { path })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawHttpSettings {
    timeout_seconds: Option<u64>,
    retry_attempts: Option<u64>,
    retry_delay_ms: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawRegistrySettings {
    materials: RawEndpointSettings,
    factors: RawEndpointSettings,
    projects: RawEndpointSettings,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawEndpointSettings {
    base_url: Option<String>,
    token: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCacheSettings {
    material_ttl_seconds: Option<u64>,
    factor_ttl_seconds: Option<u64>,
    project_ttl_seconds: Option<u64>,
    sweep_interval_seconds: Option<u64>,
    fallback_max_age_days: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawBatchSettings {
    chunk_size: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawRegionSettings {
    path: Option<PathBuf>,
}

fn parse_base_url(value: &str) -> Result<Url, String> {
    let url = Url::parse(value).map_err(|err| format!("invalid url `{value}`: {err}"))?;
    if url.cannot_be_a_base() {
        return Err(format!("url `{value}` cannot be used as a base"));
    }
    if !matches!(url.scheme(), "http" | "https") {
        return Err(format!("url `{value}` must use http or https"));
    }
    Ok(url)
}

fn non_zero_u32(value: u64, key: &'static str) -> Result<NonZeroU32, LoadError> {
    if value == 0 {
        return Err(LoadError::invalid(key, "must be greater than zero"));
    }
    let value_u32: u32 = value
        .try_into()
        .map_err(|_| LoadError::invalid(key, "value exceeds supported range for u32"))?;
    NonZeroU32::new(value_u32).ok_or_else(|| LoadError::invalid(key, "must be greater than zero"))
}

/// Resolve configuration using the supplied CLI arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}
