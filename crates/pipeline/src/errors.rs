//! Error types for the Courier request pipeline.
//!
//! [`PipelineError`] is the single error type a caller of [`crate::Pipeline`]
//! ever sees. Transport failures are described by [`TransportError`], which is
//! produced by [`crate::Transport`] implementations and wrapped on the way out.
//!
//! Cancellation is deliberately **not** an error: a canceled call resolves to
//! [`crate::Outcome::Canceled`]. The only exception is
//! [`TransportError::Canceled`], which lets a transport report that the
//! exchange was torn down underneath it; the pipeline converts it into the
//! canceled outcome before anything reaches the caller.

use std::time::Duration;

use thiserror::Error;

// ---------------------------------------------------------------------------
// Transport errors
// ---------------------------------------------------------------------------

/// Failure of a single request/response exchange.
///
/// Reported by [`crate::Transport::send`]. Every variant except
/// [`TransportError::Canceled`] and [`TransportError::InvalidRequest`] is
/// recoverable through the retry loop.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The connection failed or was reset before a response was received.
    #[error("network failure: {message}")]
    Network {
        /// Description supplied by the underlying client.
        message: String,
    },

    /// No response arrived within the request's timeout.
    #[error("request timed out after {after:?}")]
    Timeout {
        /// The timeout that elapsed.
        after: Duration,
    },

    /// The server answered with a non-success status code.
    #[error("server returned HTTP {status}")]
    Status {
        /// The HTTP status code.
        status: u16,
        /// The (lossily decoded) response body, kept for diagnostics.
        body: String,
    },

    /// The exchange was aborted before it completed.
    #[error("exchange canceled")]
    Canceled,

    /// The prepared request could not be expressed by the transport
    /// (malformed URL, invalid header name, ...).
    #[error("invalid request: {message}")]
    InvalidRequest {
        /// Description of what was rejected.
        message: String,
    },
}

// ---------------------------------------------------------------------------
// Pipeline errors
// ---------------------------------------------------------------------------

/// Errors surfaced by the request pipeline.
///
/// Use [`PipelineError::is_retryable`] to tell recoverable failures (which go
/// through [`crate::PipelineHooks::decide_on_error`]) from configuration and
/// programming errors, which fail the call immediately.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The transport failed to complete the exchange.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The request content could not be serialised.
    #[error("failed to encode {format} payload: {message}")]
    Encode {
        /// Wire format tag that was being produced.
        format: &'static str,
        /// Serializer message.
        message: String,
    },

    /// The response body could not be deserialised into the expected type.
    #[error("failed to decode {format} payload: {message}")]
    Decode {
        /// Wire format tag that was being read.
        format: &'static str,
        /// Deserializer message.
        message: String,
    },

    /// Compressing or decompressing a payload failed.
    #[error("payload compression failed: {0}")]
    Compression(String),

    /// A [`crate::PayloadCipher`] hook rejected outgoing data.
    #[error("payload cipher failed: {0}")]
    Cipher(String),

    /// [`crate::PayloadCipher::decrypt_response`] rejected a response body.
    #[error("response decryption failed: {0}")]
    Decrypt(String),

    /// The configured wire format has no codec.
    #[error("unsupported wire format '{format}'")]
    UnsupportedFormat {
        /// The offending format tag.
        format: String,
    },

    /// The pipeline configuration is invalid.
    #[error("configuration error: {message}")]
    Configuration {
        /// Description of the configuration problem.
        message: String,
    },

    /// The error-decision hook itself failed.
    #[error("error handling failed: {message}")]
    Decision {
        /// Description supplied by the hook.
        message: String,
    },
}

impl PipelineError {
    /// Shorthand for a [`PipelineError::Configuration`] error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Returns `true` if the error may be recovered by sending the request again.
    ///
    /// Transport failures (timeouts and error statuses included) and every
    /// response decoding step, decryption included, are retryable. Everything else is a configuration or
    /// programming error and fails fast.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(TransportError::InvalidRequest { .. })
            | Self::Transport(TransportError::Canceled) => false,
            Self::Transport(_)
            | Self::Decrypt(_)
            | Self::Decode { .. }
            | Self::Compression(_) => true,
            Self::Encode { .. }
            | Self::Cipher(_)
            | Self::UnsupportedFormat { .. }
            | Self::Configuration { .. }
            | Self::Decision { .. } => false,
        }
    }
}
