//! The transport port.
//!
//! The pipeline never performs network I/O itself. For every send attempt it
//! builds a [`PreparedRequest`] (resolved URL, final headers, sealed body,
//! timeout) and hands it to a [`Transport`]. Infrastructure crates implement
//! the trait; `http-transport` provides one over `reqwest`.
//!
//! ## Contract
//!
//! - `send` performs exactly one request/response exchange and owns the I/O
//!   timeout. A timeout is reported as [`TransportError::Timeout`].
//! - `send` may be dropped at any await point; implementations must treat a
//!   dropped future as an aborted exchange.
//! - `abort` is invoked by [`crate::Pipeline::force_cancel_all`] for the
//!   request that is in flight, before its `send` future is dropped.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::{Method, RequestId, TransportError};

/// Receives upload/download progress in the range `[0.0, 1.0]`.
pub type ProgressSink = Arc<dyn Fn(f32) + Send + Sync>;

/// A fully built exchange, ready to hand to a [`Transport`].
///
/// Rebuilt from scratch for every send attempt.
#[derive(Clone, PartialEq, Eq)]
pub struct PreparedRequest {
    /// The request this attempt belongs to.
    pub id: RequestId,
    /// HTTP verb.
    pub method: Method,
    /// Base URL, path, and encoded query string.
    pub url: String,
    /// Final header set; keys are unique.
    pub headers: Vec<(String, String)>,
    /// Sealed upload payload, if the verb carries one.
    pub body: Option<Vec<u8>>,
    /// I/O timeout for this exchange.
    pub timeout: Duration,
}

impl PreparedRequest {
    /// Looks up a header value by exact name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }
}

impl fmt::Debug for PreparedRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Bodies are opaque ciphertext; only their size is useful in logs.
        f.debug_struct("PreparedRequest")
            .field("id", &self.id)
            .field("method", &self.method)
            .field("url", &self.url)
            .field("headers", &self.headers)
            .field("body_len", &self.body.as_ref().map(Vec::len))
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Performs single request/response exchanges.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Sends `request` and returns the raw response body.
    async fn send(
        &self,
        request: &PreparedRequest,
        progress: Option<ProgressSink>,
    ) -> Result<Vec<u8>, TransportError>;

    /// Tears down the exchange for `id`, if one is in flight.
    fn abort(&self, id: RequestId);
}
