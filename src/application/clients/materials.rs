use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, instrument};

use super::{RegistryEndpoint, decode};
use crate::application::batch::MaterialSource;
use crate::domain::materials::MaterialRecord;
use crate::infra::http::{Fetched, RequestError, RequestExecutor};

#[derive(Debug, Deserialize)]
struct SearchResponse {
    materials: Vec<MaterialRecord>,
}

/// Client for the EPD material registry.
#[derive(Clone)]
pub struct MaterialRegistryClient {
    executor: RequestExecutor,
    endpoint: RegistryEndpoint,
    ttl: Duration,
}

impl MaterialRegistryClient {
    pub fn new(executor: RequestExecutor, endpoint: RegistryEndpoint, ttl: Duration) -> Self {
        Self {
            executor,
            endpoint,
            ttl,
        }
    }

    /// `GET {base}/materials?q=&limit=`
    #[instrument(skip(self))]
    pub async fn search_materials(
        &self,
        query: &str,
        limit: u32,
    ) -> Result<Fetched<Vec<MaterialRecord>>, RequestError> {
        let request = self
            .endpoint
            .get(&["materials"])
            .param("q", query)
            .param("limit", limit.to_string())
            .cached_for(self.ttl);

        let fetched = self
            .executor
            .execute_with(&request, |value| {
                let response: SearchResponse = decode(value, "material search response")?;
                for record in &response.materials {
                    validate_record(record)?;
                }
                Ok(response.materials)
            })
            .await?;
        debug!(results = fetched.value.len(), "material search complete");
        Ok(fetched)
    }

    /// `GET {base}/materials/{id}`
    #[instrument(skip(self))]
    pub async fn get_material_record(
        &self,
        material_id: &str,
    ) -> Result<Fetched<MaterialRecord>, RequestError> {
        let request = self
            .endpoint
            .get(&["materials", material_id])
            .cached_for(self.ttl);

        self.executor
            .execute_with(&request, |value| {
                let record: MaterialRecord = decode(value, "material record")?;
                validate_record(&record)?;
                Ok(record)
            })
            .await
    }
}

fn validate_record(record: &MaterialRecord) -> Result<(), RequestError> {
    record
        .validate()
        .map_err(|err| RequestError::decode("material record", err))
}

#[async_trait]
impl MaterialSource for MaterialRegistryClient {
    async fn fetch_material(&self, material_id: &str) -> Result<Fetched<MaterialRecord>, RequestError> {
        self.get_material_record(material_id).await
    }
}
