//! Extension points supplied by a concrete deployment.
//!
//! [`PipelineHooks`] receives telemetry callbacks and decides what to do after
//! a failed attempt. Only [`PipelineHooks::decide_on_error`] is required; the
//! notification hooks default to doing nothing.
//!
//! The decision hook is `async` and may suspend for as long as it likes, for
//! example while a user is asked whether to retry. The request keeps the
//! pipeline's single execution slot for that whole time.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::{PipelineError, Request, RetryOutcome};

/// Telemetry and error-handling hooks invoked by the pipeline.
#[async_trait]
pub trait PipelineHooks: Send + Sync {
    /// Called after a response decoded successfully, before the value is
    /// delivered. `elapsed` is measured from the moment the request was
    /// admitted.
    fn on_complete(&self, request: &Request, result: &dyn fmt::Debug, elapsed: Duration) {
        let _ = (request, result, elapsed);
    }

    /// Called once when a request fails after exhausting its retries, just
    /// before the terminal error is delivered.
    fn on_retry_limit(&self, request: &Request) {
        let _ = request;
    }

    /// Called for every failed attempt. Purely a side effect.
    fn on_error(&self, request: &Request, error: &PipelineError) {
        let _ = (request, error);
    }

    /// Decides whether a failed request is retried or canceled.
    ///
    /// Returning `Err` ends the call with that error.
    async fn decide_on_error(
        &self,
        request: &Request,
        error: &PipelineError,
    ) -> Result<RetryOutcome, PipelineError>;
}

/// Hooks that log through `tracing` and always make the same decision.
#[derive(Debug, Clone, Copy)]
pub struct FixedDecision(pub RetryOutcome);

impl FixedDecision {
    /// Retries every failure until the retry limit is reached.
    pub fn always_retry() -> Self {
        Self(RetryOutcome::Retry)
    }

    /// Cancels on the first failure.
    pub fn always_cancel() -> Self {
        Self(RetryOutcome::Cancel)
    }
}

#[async_trait]
impl PipelineHooks for FixedDecision {
    fn on_complete(&self, request: &Request, _result: &dyn fmt::Debug, elapsed: Duration) {
        info!(
            request_id = %request.id(),
            method = %request.method(),
            url = request.resolved_url().unwrap_or_default(),
            elapsed_ms = elapsed.as_secs_f64() * 1000.0,
            "request completed"
        );
    }

    fn on_retry_limit(&self, request: &Request) {
        warn!(
            request_id = %request.id(),
            attempts = request.attempts(),
            "retry limit reached"
        );
    }

    fn on_error(&self, request: &Request, error: &PipelineError) {
        warn!(request_id = %request.id(), error = %error, "request attempt failed");
    }

    async fn decide_on_error(
        &self,
        _request: &Request,
        _error: &PipelineError,
    ) -> Result<RetryOutcome, PipelineError> {
        Ok(self.0)
    }
}
