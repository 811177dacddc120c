use std::time::Duration;

use thiserror::Error;

/// Failure of one attempt that is worth retrying.
#[derive(Debug, Clone, Error)]
pub enum TransientError {
    #[error("network error: {0}")]
    Network(String),
    #[error("upstream responded with status {status}: {body}")]
    Server { status: u16, body: String },
    #[error("request timed out after {}ms", .after.as_millis())]
    Timeout { after: Duration },
    #[error("response body is not valid JSON: {0}")]
    InvalidBody(String),
}

/// Failure of a logical request, as seen by callers of the executor.
#[derive(Debug, Error)]
pub enum RequestError {
    /// 4xx: the request itself is wrong; retrying cannot help.
    #[error("upstream rejected the request with status {status}: {body}")]
    Client { status: u16, body: String },
    /// Every attempt failed transiently.
    #[error("request failed after {attempts} attempts: {last}")]
    ExhaustedRetries {
        attempts: u32,
        #[source]
        last: TransientError,
    },
    /// A 2xx body did not match the expected record.
    #[error("failed to decode {what}: {reason}")]
    Decode { what: &'static str, reason: String },
}

impl RequestError {
    pub fn decode(what: &'static str, reason: impl std::fmt::Display) -> Self {
        Self::Decode {
            what,
            reason: reason.to_string(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            RequestError::Client { .. } => "client",
            RequestError::ExhaustedRetries { .. } => "exhausted_retries",
            RequestError::Decode { .. } => "decode",
        }
    }
}
