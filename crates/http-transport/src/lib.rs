//! Courier HTTP transport adapter.
//!
//! Implements the [`pipeline::Transport`] port over [`reqwest`]: one
//! [`PreparedRequest`] becomes one HTTP exchange, and the raw response body is
//! handed back to the pipeline untouched (decryption, decompression, and
//! decoding happen there).
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** Connection handling, TLS, timeouts, and status-code
//! classification live here. The [`pipeline`] crate sees only
//! [`pipeline::Transport`].
//!
//! ## Error mapping
//!
//! | reqwest outcome | [`TransportError`] |
//! |-----------------|--------------------|
//! | timeout elapsed | `Timeout` |
//! | request could not be built (bad header, bad URL) | `InvalidRequest` |
//! | any other I/O failure | `Network` |
//! | response status outside 2xx | `Status` |
//!
//! ## Cancellation
//!
//! Every exchange registers an abort signal under its [`RequestId`] while it
//! runs. [`Transport::abort`] fires that signal, which drops the reqwest
//! future (closing the connection) and resolves the send with
//! [`TransportError::Canceled`].

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use pipeline::{Method, PreparedRequest, ProgressSink, RequestId, Transport, TransportError};
use thiserror::Error;
use tokio::sync::Notify;
use tracing::{debug, warn};

/// User agent sent with every request.
pub const USER_AGENT: &str = concat!("courier/", env!("CARGO_PKG_VERSION"));

/// Errors raised while constructing an [`HttpTransport`].
#[derive(Debug, Error)]
pub enum HttpTransportError {
    /// The underlying `reqwest` client could not be created (e.g. the TLS
    /// backend failed to initialise).
    #[error("failed to build HTTP client: {0}")]
    ClientBuild(#[from] reqwest::Error),
}

type AbortRegistry = Arc<Mutex<HashMap<RequestId, Arc<Notify>>>>;

/// A [`Transport`] backed by a shared [`reqwest::Client`].
///
/// Clones share the client and the set of in-flight exchanges.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    in_flight: AbortRegistry,
}

impl HttpTransport {
    /// Creates a transport with a default client.
    pub fn new() -> Result<Self, HttpTransportError> {
        let client = reqwest::Client::builder().user_agent(USER_AGENT).build()?;
        Ok(Self::with_client(client))
    }

    /// Wraps an existing client, keeping its connection pool and settings.
    pub fn with_client(client: reqwest::Client) -> Self {
        Self {
            client,
            in_flight: AbortRegistry::default(),
        }
    }

    /// Number of exchanges currently running.
    pub fn in_flight(&self) -> usize {
        lock(&self.in_flight).len()
    }

    fn register(&self, id: RequestId) -> Registration {
        let signal = Arc::new(Notify::new());
        lock(&self.in_flight).insert(id, signal.clone());
        Registration {
            registry: self.in_flight.clone(),
            id,
            signal,
        }
    }

    async fn exchange(
        &self,
        request: &PreparedRequest,
        progress: Option<ProgressSink>,
    ) -> Result<Vec<u8>, TransportError> {
        let mut builder = self
            .client
            .request(to_reqwest_method(request.method), &request.url)
            .timeout(request.timeout);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        let mut response = builder.send().await.map_err(|e| classify(request, e))?;
        let status = response.status();
        let total = response.content_length().filter(|&n| n > 0);
        debug!(
            request_id = %request.id,
            status = status.as_u16(),
            content_length = ?total,
            "response headers received"
        );

        let mut body = Vec::with_capacity(total.unwrap_or(0).min(1 << 20) as usize);
        while let Some(chunk) = response.chunk().await.map_err(|e| classify(request, e))? {
            body.extend_from_slice(&chunk);
            if let (Some(sink), Some(total)) = (&progress, total) {
                sink((body.len() as f64 / total as f64).min(1.0) as f32);
            }
        }

        if !status.is_success() {
            warn!(request_id = %request.id, status = status.as_u16(), "non-success status");
            return Err(TransportError::Status {
                status: status.as_u16(),
                body: String::from_utf8_lossy(&body).into_owned(),
            });
        }

        if let Some(sink) = &progress {
            sink(1.0);
        }
        Ok(body)
    }
}

fn lock(registry: &AbortRegistry) -> MutexGuard<'_, HashMap<RequestId, Arc<Notify>>> {
    registry.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Keeps an exchange's abort signal registered for as long as it runs.
struct Registration {
    registry: AbortRegistry,
    id: RequestId,
    signal: Arc<Notify>,
}

impl Drop for Registration {
    fn drop(&mut self) {
        let mut registry = lock(&self.registry);
        // A retry may already have registered a fresh signal under this id.
        if registry
            .get(&self.id)
            .is_some_and(|current| Arc::ptr_eq(current, &self.signal))
        {
            registry.remove(&self.id);
        }
    }
}

fn to_reqwest_method(method: Method) -> reqwest::Method {
    match method {
        Method::Get => reqwest::Method::GET,
        Method::Post => reqwest::Method::POST,
        Method::Put => reqwest::Method::PUT,
        Method::Patch => reqwest::Method::PATCH,
        Method::Delete => reqwest::Method::DELETE,
    }
}

fn classify(request: &PreparedRequest, error: reqwest::Error) -> TransportError {
    if error.is_timeout() {
        TransportError::Timeout {
            after: request.timeout,
        }
    } else if error.is_builder() {
        TransportError::InvalidRequest {
            message: error.to_string(),
        }
    } else {
        TransportError::Network {
            message: error.to_string(),
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(
        &self,
        request: &PreparedRequest,
        progress: Option<ProgressSink>,
    ) -> Result<Vec<u8>, TransportError> {
        let registration = self.register(request.id);
        tokio::select! {
            biased;
            _ = registration.signal.notified() => {
                debug!(request_id = %request.id, "exchange aborted");
                Err(TransportError::Canceled)
            }
            result = self.exchange(request, progress) => result,
        }
    }

    fn abort(&self, id: RequestId) {
        match lock(&self.in_flight).get(&id) {
            Some(signal) => signal.notify_one(),
            None => debug!(request_id = %id, "abort requested for an idle request"),
        }
    }
}
