use std::time::Duration;

use tracing::instrument;

use super::{RegistryEndpoint, decode};
use crate::domain::projects::Project;
use crate::infra::http::{RequestError, RequestExecutor};

/// Client for the live project backend. Its short TTL keeps listings fresh.
#[derive(Clone)]
pub struct ProjectBackendClient {
    executor: RequestExecutor,
    endpoint: RegistryEndpoint,
    ttl: Duration,
}

impl ProjectBackendClient {
    pub fn new(executor: RequestExecutor, endpoint: RegistryEndpoint, ttl: Duration) -> Self {
        Self {
            executor,
            endpoint,
            ttl,
        }
    }

    /// `GET {base}/projects`
    #[instrument(skip(self))]
    pub async fn get_projects(&self) -> Result<Vec<Project>, RequestError> {
        let request = self.endpoint.get(&["projects"]).cached_for(self.ttl);
        let fetched = self
            .executor
            .execute_with(&request, |value| decode::<Vec<Project>>(value, "project list"))
            .await?;
        Ok(fetched.value)
    }

    /// `GET {base}/projects/{id}`
    #[instrument(skip(self))]
    pub async fn get_project(&self, project_id: &str) -> Result<Project, RequestError> {
        let request = self
            .endpoint
            .get(&["projects", project_id])
            .cached_for(self.ttl);
        let fetched = self
            .executor
            .execute_with(&request, |value| decode::<Project>(value, "project"))
            .await?;
        Ok(fetched.value)
    }
}
