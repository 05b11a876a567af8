//! Pipeline hooks for a terminal session.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use pipeline::{PipelineError, PipelineHooks, Request, RetryOutcome};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

/// Logs every hook through `tracing` and, when interactive, asks the user
/// whether to retry.
#[derive(Debug, Clone, Copy)]
pub struct ConsoleHooks {
    pub interactive: bool,
}

/// Maps a prompt answer to a decision. Anything but an explicit "no" retries.
fn parse_answer(answer: &str) -> RetryOutcome {
    match answer.trim().to_ascii_lowercase().as_str() {
        "n" | "no" | "c" | "cancel" => RetryOutcome::Cancel,
        _ => RetryOutcome::Retry,
    }
}

#[async_trait]
impl PipelineHooks for ConsoleHooks {
    fn on_complete(&self, request: &Request, _result: &dyn fmt::Debug, elapsed: Duration) {
        info!(
            method = %request.method(),
            url = request.resolved_url().unwrap_or_default(),
            attempts = request.attempts(),
            elapsed_ms = elapsed.as_millis() as u64,
            "completed"
        );
    }

    fn on_retry_limit(&self, request: &Request) {
        warn!(attempts = request.attempts(), "giving up after retry limit");
    }

    fn on_error(&self, request: &Request, error: &PipelineError) {
        warn!(attempt = request.attempts(), error = %error, "attempt failed");
    }

    async fn decide_on_error(
        &self,
        _request: &Request,
        error: &PipelineError,
    ) -> Result<RetryOutcome, PipelineError> {
        if !self.interactive {
            return Ok(RetryOutcome::Retry);
        }

        eprint!("{error}. Retry? [Y/n] ");
        let mut answer = String::new();
        let read = BufReader::new(tokio::io::stdin())
            .read_line(&mut answer)
            .await
            .map_err(|e| PipelineError::Decision {
                message: format!("failed to read answer: {e}"),
            })?;
        if read == 0 {
            // stdin closed; nobody is there to ask.
            return Ok(RetryOutcome::Cancel);
        }
        Ok(parse_answer(&answer))
    }
}
