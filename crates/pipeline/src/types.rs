//! Shared value types for the request pipeline.
//!
//! These are the small vocabulary types that flow between call sites, the
//! pipeline, and the extension hooks: the HTTP verb, the wire format, the
//! retry decision, and the terminal [`Outcome`] of a call.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::PipelineError;

// ---------------------------------------------------------------------------
// Method
// ---------------------------------------------------------------------------

/// HTTP verb of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl Method {
    /// Returns the verb exactly as it is sent on the wire.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
        }
    }

    /// Returns `true` for verbs that carry a request body.
    pub fn has_body(self) -> bool {
        matches!(self, Self::Post | Self::Put | Self::Patch)
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Wire format
// ---------------------------------------------------------------------------

/// Serialisation scheme used for request and response bodies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WireFormat {
    /// UTF-8 JSON text.
    Json,
    /// Compact binary encoding.
    #[default]
    BinaryPack,
}

impl WireFormat {
    /// Returns the configuration tag for this format.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::BinaryPack => "binary_pack",
        }
    }
}

impl fmt::Display for WireFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WireFormat {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "json" => Ok(Self::Json),
            "binary_pack" => Ok(Self::BinaryPack),
            other => Err(PipelineError::UnsupportedFormat {
                format: other.to_string(),
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// Retry decision
// ---------------------------------------------------------------------------

/// Decision returned by [`crate::PipelineHooks::decide_on_error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RetryOutcome {
    /// Send the request again after the configured retry delay.
    Retry,
    /// Give up; the call resolves to [`Outcome::Canceled`].
    Cancel,
}

// ---------------------------------------------------------------------------
// Outcome
// ---------------------------------------------------------------------------

/// Terminal, non-error state of a pipeline call.
///
/// A call either fails with a [`PipelineError`] or resolves to one of these.
/// Cancellation is an explicit state rather than an absence of signals, so
/// callers must not assume every non-success is an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome<T> {
    /// The exchange succeeded and the response body decoded to `T`.
    Received(T),
    /// The exchange succeeded but the response carried no body.
    Empty,
    /// The call was canceled, either by [`crate::Pipeline::force_cancel_all`],
    /// by the transport, or by a [`RetryOutcome::Cancel`] decision.
    Canceled,
}

impl<T> Outcome<T> {
    /// Returns the decoded value, if any.
    pub fn into_value(self) -> Option<T> {
        match self {
            Self::Received(value) => Some(value),
            Self::Empty | Self::Canceled => None,
        }
    }

    /// Returns `true` if the call was canceled.
    pub fn is_canceled(&self) -> bool {
        matches!(self, Self::Canceled)
    }
}
