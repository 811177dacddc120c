//! Upstream HTTP plumbing: request descriptors, the transport seam and the
//! retrying executor that sits on top of both.

mod error;
mod executor;
mod request;
mod transport;

pub use error::{RequestError, TransientError};
pub use executor::{Fetched, RequestExecutor, RetryPolicy};
pub use request::{RequestDescriptor, endpoint_url};
pub use transport::{ReqwestTransport, Transport, TransportError};
