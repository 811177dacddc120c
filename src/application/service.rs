//! Inbound façade used by the binary and by embedding callers.

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::info;

use super::batch::{BatchOrchestrator, BatchReport, MaterialQuery};
use super::clients::{
    EmissionFactorClient, MaterialRegistryClient, ProjectBackendClient, RegistryEndpoint,
};
use crate::cache::{CacheConfig, CacheStats, CacheStore};
use crate::config::Settings;
use crate::domain::factors::EmissionFactorTable;
use crate::domain::projects::Project;
use crate::domain::regions::RegionDirectory;
use crate::infra::error::InfraError;
use crate::infra::http::{
    ReqwestTransport, RequestError, RequestExecutor, RetryPolicy, Transport,
};

/// Everything needed to wire the clients and the orchestrator together.
#[derive(Debug, Clone)]
pub struct EnrichmentConfig {
    pub retry: RetryPolicy,
    pub cache: CacheConfig,
    pub materials: RegistryEndpoint,
    pub factors: RegistryEndpoint,
    pub projects: RegistryEndpoint,
    pub chunk_size: NonZeroUsize,
    pub fallback_max_age: Duration,
}

impl From<&Settings> for EnrichmentConfig {
    fn from(settings: &Settings) -> Self {
        Self {
            retry: RetryPolicy::from(&settings.http),
            cache: CacheConfig::from(&settings.cache),
            materials: RegistryEndpoint::from(&settings.registries.materials),
            factors: RegistryEndpoint::from(&settings.registries.factors),
            projects: RegistryEndpoint::from(&settings.registries.projects),
            chunk_size: settings.batch.chunk_size,
            fallback_max_age: settings.cache.fallback_max_age,
        }
    }
}

#[derive(Clone)]
pub struct EnrichmentService {
    cache: Arc<CacheStore>,
    cache_config: CacheConfig,
    materials: Arc<MaterialRegistryClient>,
    factors: EmissionFactorClient,
    projects: ProjectBackendClient,
    orchestrator: BatchOrchestrator,
}

impl EnrichmentService {
    /// Build the service over the production `reqwest` transport.
    pub fn connect(config: EnrichmentConfig, regions: RegionDirectory) -> Result<Self, InfraError> {
        let transport = ReqwestTransport::new()?;
        Ok(Self::new(config, Arc::new(transport), regions))
    }

    pub fn new(
        config: EnrichmentConfig,
        transport: Arc<dyn Transport>,
        regions: RegionDirectory,
    ) -> Self {
        let cache = Arc::new(CacheStore::new());
        let executor = RequestExecutor::new(transport, Arc::clone(&cache), config.retry);

        let materials = Arc::new(MaterialRegistryClient::new(
            executor.clone(),
            config.materials,
            config.cache.material_ttl,
        ));
        let factors = EmissionFactorClient::new(
            executor.clone(),
            config.factors,
            config.cache.factor_ttl,
            config.fallback_max_age,
        );
        let projects = ProjectBackendClient::new(executor, config.projects, config.cache.project_ttl);
        let orchestrator = BatchOrchestrator::new(
            materials.clone(),
            Arc::new(regions),
            config.chunk_size,
        );

        Self {
            cache,
            cache_config: config.cache,
            materials,
            factors,
            projects,
            orchestrator,
        }
    }

    pub async fn run_batch(&self, queries: &[MaterialQuery]) -> BatchReport {
        self.orchestrator.run_batch(queries).await
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn cache(&self) -> &Arc<CacheStore> {
        &self.cache
    }

    pub fn materials(&self) -> &MaterialRegistryClient {
        &self.materials
    }

    pub async fn emission_factors(&self, region_id: &str) -> Result<EmissionFactorTable, RequestError> {
        self.factors.get_regional_emission_factors(region_id).await
    }

    pub async fn projects(&self) -> Result<Vec<Project>, RequestError> {
        self.projects.get_projects().await
    }

    pub async fn project(&self, project_id: &str) -> Result<Project, RequestError> {
        self.projects.get_project(project_id).await
    }

    /// Start the expired-entry sweeper when one is configured.
    pub fn spawn_cache_sweeper(&self) -> Option<JoinHandle<()>> {
        let every = self.cache_config.sweep_interval?;
        info!(interval_secs = every.as_secs(), "Starting cache sweeper");
        Some(self.cache.spawn_sweeper(every))
    }
}
