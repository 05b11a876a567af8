//! The request pipeline.
//!
//! A [`Pipeline`] turns typed verb calls into serialised, retried, cancellable
//! exchanges over a [`Transport`]. One pipeline serves one API surface.
//!
//! ## Lifecycle of a call
//!
//! ```text
//! Queued ──▶ Sending ──▶ Success ─────────────────────────▶ Completed
//!               │  ├───▶ Canceled ────────────────────────▶ Completed
//!               │  └───▶ error ─┬─ retries exhausted ─────▶ Completed (Err)
//!               │               └─ decide_on_error
//!               │                    ├─ Cancel ───────────▶ Completed (Canceled)
//!               └◀── RetryDelay ◀────┘ Retry
//! ```
//!
//! - **Queued**: the request waits in the [`AdmissionQueue`] until it is at the
//!   head and no other request is active. Submission happens synchronously
//!   when the verb method is called, so call order is admission order.
//! - **Sending**: one [`Transport::send`] exchange.
//! - **RetryDelay**: sleeps for `retry_delay_seconds`, then rebuilds the
//!   exchange from scratch.
//!
//! Leaving the machine by any path, including the caller dropping its future,
//! releases the execution slot to the next queued request.
//!
//! A request attempted while every decision says Retry is sent exactly
//! `retry_count + 1` times.

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info, info_span, Instrument};

use crate::admission::{Admission, AdmissionQueue, QueueSnapshot, Ticket};
use crate::codec::PayloadCodec;
use crate::request::{DefaultsProvider, QueryParams, RequestDefaults};
use crate::{
    Method, Outcome, PayloadCipher, PipelineConfig, PipelineError, PipelineHooks, PlainText,
    ProgressSink, Request, RetryOutcome, Transport, TransportError,
};

struct Inner {
    config: PipelineConfig,
    codec: PayloadCodec,
    transport: Arc<dyn Transport>,
    hooks: Arc<dyn PipelineHooks>,
    cipher: Arc<dyn PayloadCipher>,
    defaults: RequestDefaults,
    queue: Arc<AdmissionQueue>,
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Assembles a [`Pipeline`] from its configuration and collaborators.
pub struct PipelineBuilder {
    config: PipelineConfig,
    transport: Option<Arc<dyn Transport>>,
    hooks: Option<Arc<dyn PipelineHooks>>,
    cipher: Arc<dyn PayloadCipher>,
    defaults: RequestDefaults,
}

impl PipelineBuilder {
    fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            transport: None,
            hooks: None,
            cipher: Arc::new(PlainText),
            defaults: RequestDefaults::default(),
        }
    }

    /// Sets the transport every exchange goes through. Required.
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Sets the telemetry and error-handling hooks. Required.
    pub fn hooks(mut self, hooks: Arc<dyn PipelineHooks>) -> Self {
        self.hooks = Some(hooks);
        self
    }

    /// Sets the payload cipher. Defaults to [`PlainText`].
    pub fn cipher(mut self, cipher: Arc<dyn PayloadCipher>) -> Self {
        self.cipher = cipher;
        self
    }

    /// Headers added to every send attempt, beneath the configured and
    /// per-request headers.
    pub fn default_headers<F>(mut self, provider: F) -> Self
    where
        F: Fn() -> Vec<(String, String)> + Send + Sync + 'static,
    {
        self.defaults.headers = Some(Arc::new(provider) as DefaultsProvider);
        self
    }

    /// Query parameters added to every send attempt, beneath the per-request
    /// parameters.
    pub fn default_url_params<F>(mut self, provider: F) -> Self
    where
        F: Fn() -> Vec<(String, String)> + Send + Sync + 'static,
    {
        self.defaults.url_params = Some(Arc::new(provider) as DefaultsProvider);
        self
    }

    /// Validates the configuration and builds the pipeline.
    pub fn build(self) -> Result<Pipeline, PipelineError> {
        self.config.validate()?;
        let transport = self
            .transport
            .ok_or_else(|| PipelineError::configuration("a transport is required"))?;
        let hooks = self
            .hooks
            .ok_or_else(|| PipelineError::configuration("pipeline hooks are required"))?;

        let codec = PayloadCodec::new(self.config.format, self.config.compress);
        debug!(
            server_url = %self.config.server_url,
            format = %codec.format(),
            compress = codec.compresses(),
            retry_count = self.config.retry_count,
            "pipeline built"
        );

        Ok(Pipeline {
            inner: Arc::new(Inner {
                config: self.config,
                codec,
                transport,
                hooks,
                cipher: self.cipher,
                defaults: self.defaults,
                queue: Arc::new(AdmissionQueue::default()),
            }),
        })
    }
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

/// Serialises calls against one API surface.
///
/// Cloning is cheap and every clone shares the same queue.
#[derive(Clone)]
pub struct Pipeline {
    inner: Arc<Inner>,
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("config", &self.inner.config)
            .field("queue", &self.inner.queue.snapshot())
            .finish()
    }
}

impl Pipeline {
    pub fn builder(config: PipelineConfig) -> PipelineBuilder {
        PipelineBuilder::new(config)
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.inner.config
    }

    /// Starts building a call with per-request parameters and headers.
    pub fn request(&self, method: Method, path: impl Into<String>) -> RequestBuilder {
        RequestBuilder {
            pipeline: self.clone(),
            method,
            path: path.into(),
            params: QueryParams::new(),
            headers: self.inner.config.headers.clone(),
            body: None,
            progress: None,
        }
    }

    /// Fetches a resource.
    pub fn get<T>(
        &self,
        path: &str,
        progress: Option<ProgressSink>,
    ) -> impl Future<Output = Result<Outcome<T>, PipelineError>> + Send + 'static
    where
        T: DeserializeOwned + fmt::Debug + Send + 'static,
    {
        self.request(Method::Get, path)
            .with_progress(progress)
            .send()
    }

    /// Creates a resource.
    pub fn post<T, C>(
        &self,
        path: &str,
        content: &C,
        progress: Option<ProgressSink>,
    ) -> impl Future<Output = Result<Outcome<T>, PipelineError>> + Send + 'static
    where
        T: DeserializeOwned + fmt::Debug + Send + 'static,
        C: Serialize + ?Sized,
    {
        self.request(Method::Post, path)
            .content(content)
            .with_progress(progress)
            .send()
    }

    /// Replaces a resource.
    pub fn put<T, C>(
        &self,
        path: &str,
        content: &C,
        progress: Option<ProgressSink>,
    ) -> impl Future<Output = Result<Outcome<T>, PipelineError>> + Send + 'static
    where
        T: DeserializeOwned + fmt::Debug + Send + 'static,
        C: Serialize + ?Sized,
    {
        self.request(Method::Put, path)
            .content(content)
            .with_progress(progress)
            .send()
    }

    /// Partially updates a resource.
    pub fn patch<T, C>(
        &self,
        path: &str,
        content: &C,
        progress: Option<ProgressSink>,
    ) -> impl Future<Output = Result<Outcome<T>, PipelineError>> + Send + 'static
    where
        T: DeserializeOwned + fmt::Debug + Send + 'static,
        C: Serialize + ?Sized,
    {
        self.request(Method::Patch, path)
            .content(content)
            .with_progress(progress)
            .send()
    }

    /// Deletes a resource.
    pub fn delete<T>(
        &self,
        path: &str,
        progress: Option<ProgressSink>,
    ) -> impl Future<Output = Result<Outcome<T>, PipelineError>> + Send + 'static
    where
        T: DeserializeOwned + fmt::Debug + Send + 'static,
    {
        self.request(Method::Delete, path)
            .with_progress(progress)
            .send()
    }

    /// Aborts the in-flight request and empties the admission queue.
    ///
    /// The active call and every queued call resolve to
    /// [`Outcome::Canceled`]. Queued calls never reach the transport. Calls
    /// submitted afterwards start once the aborted call has unwound.
    pub fn force_cancel_all(&self) {
        if let Some(id) = self.inner.queue.cancel_all() {
            info!(request_id = %id, "force-canceling in-flight request");
            self.inner.transport.abort(id);
        }
    }

    /// Returns the active and queued request ids.
    pub fn snapshot(&self) -> QueueSnapshot {
        self.inner.queue.snapshot()
    }
}

// ---------------------------------------------------------------------------
// Request builder
// ---------------------------------------------------------------------------

/// A call under construction. Finish it with [`RequestBuilder::send`].
pub struct RequestBuilder {
    pipeline: Pipeline,
    method: Method,
    path: String,
    params: QueryParams,
    headers: BTreeMap<String, String>,
    body: Option<Result<Vec<u8>, PipelineError>>,
    progress: Option<ProgressSink>,
}

impl RequestBuilder {
    /// Adds or replaces a query parameter.
    pub fn param(mut self, key: impl Into<String>, value: impl fmt::Display) -> Self {
        self.params.insert(key, value);
        self
    }

    /// Adds or replaces a header. Overrides configured and default headers.
    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    /// Sets the request content.
    ///
    /// The content is serialised, compressed, and encrypted immediately; an
    /// encoding failure is returned by [`RequestBuilder::send`] before the
    /// request is queued. Ignored for verbs without a body.
    pub fn content<C>(mut self, content: &C) -> Self
    where
        C: Serialize + ?Sized,
    {
        if self.method.has_body() {
            let inner = &self.pipeline.inner;
            self.body = Some(inner.codec.seal_body(content, inner.cipher.as_ref()));
        }
        self
    }

    /// Sets the progress sink handed to the transport.
    pub fn progress(mut self, sink: ProgressSink) -> Self {
        self.progress = Some(sink);
        self
    }

    fn with_progress(mut self, sink: Option<ProgressSink>) -> Self {
        self.progress = sink;
        self
    }

    /// Submits the call.
    ///
    /// The request joins the admission queue as soon as this method returns;
    /// awaiting the future drives it through the send-and-retry loop.
    /// Dropping the future withdraws it.
    pub fn send<T>(self) -> impl Future<Output = Result<Outcome<T>, PipelineError>> + Send + 'static
    where
        T: DeserializeOwned + fmt::Debug + Send + 'static,
    {
        let inner = self.pipeline.inner.clone();
        let progress = self.progress;

        let submitted = self.body.transpose().map(|body| {
            let request = Request::new(
                self.method,
                &inner.config.server_url,
                &self.path,
                self.headers,
                self.params,
                inner.config.format,
                inner.config.compress,
                inner.config.timeout(),
                body,
            );
            let admission = inner.queue.enqueue(request.id());
            let ticket = Ticket::new(inner.queue.clone(), request.id());
            (request, admission, ticket)
        });

        async move {
            let (request, admission, ticket) = submitted?;
            let span = info_span!(
                "request",
                request_id = %request.id(),
                method = %request.method(),
                path = request.path(),
            );
            execute(inner, request, admission, ticket, progress)
                .instrument(span)
                .await
        }
    }
}

// ---------------------------------------------------------------------------
// State machine
// ---------------------------------------------------------------------------

async fn execute<T>(
    inner: Arc<Inner>,
    mut request: Request,
    admission: Admission,
    _ticket: Ticket,
    progress: Option<ProgressSink>,
) -> Result<Outcome<T>, PipelineError>
where
    T: DeserializeOwned + fmt::Debug + Send + 'static,
{
    let abort = match admission {
        Admission::Granted(abort) => abort,
        Admission::Waiting(grant) => match grant.await {
            Ok(abort) => abort,
            Err(_) => {
                info!("queue cleared before admission");
                return Ok(Outcome::Canceled);
            }
        },
    };

    let started = Instant::now();
    let mut retries = 0u32;

    loop {
        let prepared = request.prepare(&inner.defaults, inner.cipher.as_ref());
        debug!(attempt = request.attempts(), url = %prepared.url, "sending");

        request.set_connecting(true);
        let exchange = tokio::select! {
            biased;
            _ = abort.notified() => None,
            result = inner.transport.send(&prepared, progress.clone()) => Some(result),
        };
        request.set_connecting(false);

        let error = match exchange {
            None => {
                info!("in-flight request aborted");
                return Ok(Outcome::Canceled);
            }
            Some(Err(TransportError::Canceled)) => {
                info!("transport canceled the exchange");
                return Ok(Outcome::Canceled);
            }
            Some(Err(e)) => PipelineError::from(e),
            Some(Ok(bytes)) => match inner.codec.open_response::<T>(bytes, inner.cipher.as_ref()) {
                Ok(Some(value)) => {
                    inner.hooks.on_complete(&request, &value, started.elapsed());
                    return Ok(Outcome::Received(value));
                }
                Ok(None) => {
                    debug!("empty response body");
                    return Ok(Outcome::Empty);
                }
                Err(e) => e,
            },
        };

        inner.hooks.on_error(&request, &error);

        if !error.is_retryable() {
            return Err(error);
        }
        if retries >= inner.config.retry_count {
            inner.hooks.on_retry_limit(&request);
            return Err(error);
        }

        let decision = tokio::select! {
            biased;
            _ = abort.notified() => return Ok(Outcome::Canceled),
            decision = inner.hooks.decide_on_error(&request, &error) => decision?,
        };

        match decision {
            RetryOutcome::Retry => retries += 1,
            RetryOutcome::Cancel => {
                info!("canceled by error handler");
                return Ok(Outcome::Canceled);
            }
        }

        debug!(retry = retries, delay = ?inner.config.retry_delay(), "waiting to retry");
        tokio::select! {
            biased;
            _ = abort.notified() => return Ok(Outcome::Canceled),
            _ = tokio::time::sleep(inner.config.retry_delay()) => {}
        }
    }
}
