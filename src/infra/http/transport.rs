//! Network seam beneath the request executor.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use thiserror::Error;
use tracing::trace;

use super::request::RequestDescriptor;
use crate::infra::error::InfraError;

/// Outcome of a single round-trip that did not produce a 2xx JSON body.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("network error: {0}")]
    Network(String),
    #[error("invalid JSON body: {0}")]
    InvalidBody(String),
}

/// Performs one HTTP round-trip. Implementations never retry.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: &RequestDescriptor) -> Result<Value, TransportError>;
}

/// Production transport backed by a shared `reqwest` client.
#[derive(Clone, Debug)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new() -> Result<Self, InfraError> {
        let client = Client::builder()
            .user_agent(Self::user_agent())
            .build()
            .map_err(|err| InfraError::configuration(format!("failed to build http client: {err}")))?;
        Ok(Self { client })
    }

    pub fn user_agent() -> &'static str {
        concat!("embodied/", env!("CARGO_PKG_VERSION"))
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: &RequestDescriptor) -> Result<Value, TransportError> {
        let url = request.full_url();
        trace!(method = %request.method, url = %url, "sending upstream request");

        let mut builder = self.client.request(request.method.clone(), url);
        if let Some(token) = request.bearer_token.as_deref() {
            builder = builder.bearer_auth(token);
        }

        let response = builder
            .send()
            .await
            .map_err(|err| TransportError::Network(err.to_string()))?;
        let status = response.status();
        let bytes = response
            .bytes()
            .await
            .map_err(|err| TransportError::Network(err.to_string()))?;

        if !status.is_success() {
            return Err(TransportError::Status {
                status: status.as_u16(),
                body: String::from_utf8_lossy(&bytes).into_owned(),
            });
        }
        if bytes.is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_slice(&bytes).map_err(|err| TransportError::InvalidBody(err.to_string()))
    }
}
