//! Client-side API request pipeline for Courier.
//!
//! This crate turns typed "send a request" calls into serialised, retried,
//! cancellable network operations. It sits between application call sites and
//! a raw [`Transport`] that performs one exchange and yields bytes or an error.
//!
//! ## Architectural Layer
//!
//! **Business logic + port definitions.** This crate performs no network I/O.
//! It defines the [`Transport`], [`PipelineHooks`], and [`PayloadCipher`]
//! ports; infrastructure crates (such as `http-transport`) and deployments
//! supply the implementations.
//!
//! ## Module Layout
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`pipeline`] | [`Pipeline`], its builder, verb methods, and the send-and-retry state machine |
//! | [`admission`] | Single-flight FIFO admission queue |
//! | [`request`] | [`Request`], query-string encoding, URL joining |
//! | [`codec`] | Serialise → compress → encrypt and its mirror |
//! | [`cipher`] | [`PayloadCipher`] hooks |
//! | [`hooks`] | [`PipelineHooks`] telemetry and retry decisions |
//! | [`transport`] | [`Transport`] port and [`PreparedRequest`] |
//! | [`config`] | [`PipelineConfig`] |
//! | [`identifiers`] | [`RequestId`] |
//! | [`types`] | [`Method`], [`WireFormat`], [`RetryOutcome`], [`Outcome`] |
//! | [`errors`] | [`PipelineError`], [`TransportError`] |
//!
//! ## Example
//!
//! ```no_run
//! # use std::sync::Arc;
//! # use ::pipeline::*;
//! # async fn demo(transport: Arc<dyn Transport>) -> Result<(), PipelineError> {
//! let pipeline = Pipeline::builder(PipelineConfig::new("https://api.example.com"))
//!     .transport(transport)
//!     .hooks(Arc::new(FixedDecision::always_retry()))
//!     .build()?;
//!
//! match pipeline.get::<serde_json::Value>("status", None).await? {
//!     Outcome::Received(status) => println!("{status}"),
//!     Outcome::Empty => println!("no content"),
//!     Outcome::Canceled => println!("canceled"),
//! }
//! # Ok(())
//! # }
//! ```

pub mod admission;
pub mod cipher;
pub mod codec;
pub mod config;
pub mod errors;
pub mod hooks;
pub mod identifiers;
pub mod pipeline;
pub mod request;
pub mod transport;
pub mod types;

// Re-export everything at the crate root for ergonomic usage by downstream crates.
pub use admission::QueueSnapshot;
pub use cipher::{PayloadCipher, PlainText};
pub use codec::PayloadCodec;
pub use config::PipelineConfig;
pub use errors::{PipelineError, TransportError};
pub use hooks::{FixedDecision, PipelineHooks};
pub use identifiers::RequestId;
pub use pipeline::{Pipeline, PipelineBuilder, RequestBuilder};
pub use request::{DefaultsProvider, QueryParams, Request};
pub use transport::{PreparedRequest, ProgressSink, Transport};
pub use types::{Method, Outcome, RetryOutcome, WireFormat};
