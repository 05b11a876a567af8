//! Scripted collaborators shared by the pipeline integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use pipeline::{
    FixedDecision, Pipeline, PipelineConfig, PipelineError, PipelineHooks, PreparedRequest,
    ProgressSink, Request, RequestId, RetryOutcome, Transport, TransportError, WireFormat,
};
use tokio::sync::Notify;

// ---------------------------------------------------------------------------
// Transport
// ---------------------------------------------------------------------------

/// What the scripted transport does for one exchange.
#[derive(Debug, Clone)]
pub enum Reply {
    Body(Vec<u8>),
    Json(serde_json::Value),
    Fail(TransportError),
    /// Reply with the request body unchanged.
    Echo,
    /// Never complete; only an abort ends the exchange.
    Hang,
}

#[derive(Default)]
pub struct ScriptedTransport {
    script: Mutex<VecDeque<Reply>>,
    fallback: Mutex<Option<Reply>>,
    calls: Mutex<Vec<PreparedRequest>>,
    aborts: Mutex<Vec<RequestId>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    started: Notify,
}

impl ScriptedTransport {
    pub fn new(script: impl IntoIterator<Item = Reply>) -> Arc<Self> {
        let transport = Self::default();
        transport.script.lock().unwrap().extend(script);
        Arc::new(transport)
    }

    /// Reply used once the script runs out.
    pub fn with_fallback(self: Arc<Self>, reply: Reply) -> Arc<Self> {
        *self.fallback.lock().unwrap() = Some(reply);
        self
    }

    pub fn calls(&self) -> Vec<PreparedRequest> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn aborts(&self) -> Vec<RequestId> {
        self.aborts.lock().unwrap().clone()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Resolves once an exchange has started (including one that started
    /// before this call).
    pub async fn wait_started(&self) {
        self.started.notified().await;
    }

    fn next_reply(&self) -> Reply {
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .or_else(|| self.fallback.lock().unwrap().clone())
            .expect("transport script exhausted")
    }
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(
        &self,
        request: &PreparedRequest,
        progress: Option<ProgressSink>,
    ) -> Result<Vec<u8>, TransportError> {
        self.calls.lock().unwrap().push(request.clone());
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let _guard = InFlight(&self.in_flight);
        let reply = self.next_reply();
        self.started.notify_one();

        // Give every other task a chance to run while this exchange is open.
        for _ in 0..5 {
            tokio::task::yield_now().await;
        }

        let result = match reply {
            Reply::Body(bytes) => Ok(bytes),
            Reply::Json(value) => Ok(serde_json::to_vec(&value).unwrap()),
            Reply::Fail(error) => Err(error),
            Reply::Echo => Ok(request.body.clone().unwrap_or_default()),
            Reply::Hang => std::future::pending().await,
        };
        if let (Ok(_), Some(sink)) = (&result, progress) {
            sink(1.0);
        }
        result
    }

    fn abort(&self, id: RequestId) {
        self.aborts.lock().unwrap().push(id);
    }
}

// ---------------------------------------------------------------------------
// Hooks
// ---------------------------------------------------------------------------

/// Counts hook invocations and answers decisions from a script.
pub struct RecordingHooks {
    decisions: Mutex<VecDeque<Result<RetryOutcome, String>>>,
    fallback: RetryOutcome,
    pub completes: AtomicUsize,
    pub errors: AtomicUsize,
    pub retry_limits: AtomicUsize,
    pub decisions_asked: AtomicUsize,
    pub last_error: Mutex<Option<String>>,
}

impl RecordingHooks {
    pub fn always(outcome: RetryOutcome) -> Arc<Self> {
        Self::scripted([], outcome)
    }

    pub fn scripted(
        decisions: impl IntoIterator<Item = Result<RetryOutcome, String>>,
        fallback: RetryOutcome,
    ) -> Arc<Self> {
        Arc::new(Self {
            decisions: Mutex::new(decisions.into_iter().collect()),
            fallback,
            completes: AtomicUsize::new(0),
            errors: AtomicUsize::new(0),
            retry_limits: AtomicUsize::new(0),
            decisions_asked: AtomicUsize::new(0),
            last_error: Mutex::new(None),
        })
    }

    pub fn count(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PipelineHooks for RecordingHooks {
    fn on_complete(&self, _request: &Request, _result: &dyn fmt::Debug, _elapsed: Duration) {
        self.completes.fetch_add(1, Ordering::SeqCst);
    }

    fn on_retry_limit(&self, _request: &Request) {
        self.retry_limits.fetch_add(1, Ordering::SeqCst);
    }

    fn on_error(&self, _request: &Request, error: &PipelineError) {
        self.errors.fetch_add(1, Ordering::SeqCst);
        *self.last_error.lock().unwrap() = Some(error.to_string());
    }

    async fn decide_on_error(
        &self,
        _request: &Request,
        _error: &PipelineError,
    ) -> Result<RetryOutcome, PipelineError> {
        self.decisions_asked.fetch_add(1, Ordering::SeqCst);
        let next = self.decisions.lock().unwrap().pop_front();
        match next {
            Some(Ok(outcome)) => Ok(outcome),
            Some(Err(message)) => Err(PipelineError::Decision { message }),
            None => Ok(self.fallback),
        }
    }
}

// ---------------------------------------------------------------------------
// Pipelines
// ---------------------------------------------------------------------------

/// Plain JSON, no compression, short delay.
pub fn json_config() -> PipelineConfig {
    let mut config = PipelineConfig::new("http://api.test/v1");
    config.format = WireFormat::Json;
    config.compress = false;
    config.retry_delay_seconds = 0.01;
    config
}

pub fn pipeline_with(
    config: PipelineConfig,
    transport: Arc<ScriptedTransport>,
    hooks: Arc<RecordingHooks>,
) -> Pipeline {
    Pipeline::builder(config)
        .transport(transport)
        .hooks(hooks)
        .build()
        .unwrap()
}

pub fn simple_pipeline(transport: Arc<ScriptedTransport>) -> Pipeline {
    Pipeline::builder(json_config())
        .transport(transport)
        .hooks(Arc::new(FixedDecision::always_retry()))
        .build()
        .unwrap()
}
