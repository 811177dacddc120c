//! Typed façades over the request executor, one per upstream service.

mod factors;
mod materials;
mod projects;

pub use factors::EmissionFactorClient;
pub use materials::MaterialRegistryClient;
pub use projects::ProjectBackendClient;

use serde::de::DeserializeOwned;
use serde_json::Value;
use url::Url;

use crate::config::EndpointSettings;
use crate::infra::http::{RequestDescriptor, RequestError, endpoint_url};

/// Base URL and optional bearer token of one upstream service.
#[derive(Debug, Clone)]
pub struct RegistryEndpoint {
    pub base_url: Url,
    pub token: Option<String>,
}

impl RegistryEndpoint {
    pub fn new(base_url: Url) -> Self {
        Self {
            base_url,
            token: None,
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    fn get(&self, segments: &[&str]) -> RequestDescriptor {
        RequestDescriptor::get(endpoint_url(&self.base_url, segments)).bearer(self.token.as_deref())
    }
}

impl From<&EndpointSettings> for RegistryEndpoint {
    fn from(settings: &EndpointSettings) -> Self {
        Self {
            base_url: settings.base_url.clone(),
            token: settings.token.clone(),
        }
    }
}

fn decode<T: DeserializeOwned>(value: Value, what: &'static str) -> Result<T, RequestError> {
    serde_json::from_value(value).map_err(|err| RequestError::decode(what, err))
}
