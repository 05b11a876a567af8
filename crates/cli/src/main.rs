//! Courier CLI entry point.
//!
//! This binary is the composition root. Responsibilities:
//!
//! 1. **Parse configuration**: load the optional JSON config file, apply
//!    command line overrides, and validate the result.
//! 2. **Wire observability**: configure `tracing-subscriber` with an
//!    `EnvFilter` (`RUST_LOG`, default `info`) and optional JSON output. Logs
//!    go to stderr so stdout carries only the response.
//! 3. **Construct infrastructure**: an [`http_transport::HttpTransport`] and
//!    the [`console::ConsoleHooks`], injected into a [`pipeline::Pipeline`].
//! 4. **Run one call**: Ctrl-C force-cancels it.
//!
//! The CLI decodes responses as untyped JSON, so the pipeline always runs with
//! the JSON wire format.

mod args;
mod console;

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::Parser;
use http_transport::HttpTransport;
use pipeline::{Outcome, Pipeline, PipelineConfig, WireFormat};
use serde_json::Value;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::args::Cli;
use crate::console::ConsoleHooks;

/// Exit code used when the call is canceled (mirrors SIGINT).
const EXIT_CANCELED: u8 = 130;

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn load_config(cli: &Cli) -> anyhow::Result<PipelineConfig> {
    let mut config = match (&cli.config, &cli.server) {
        (Some(path), _) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            let mut config = PipelineConfig::from_json_str(&raw)
                .with_context(|| format!("loading {}", path.display()))?;
            if let Some(server) = &cli.server {
                config.server_url = server.clone();
            }
            if config.format != WireFormat::Json {
                bail!(
                    "{} selects the {} wire format; the CLI only decodes JSON responses",
                    path.display(),
                    config.format
                );
            }
            config
        }
        (None, Some(server)) => {
            let mut config = PipelineConfig::new(server.clone());
            config.format = WireFormat::Json;
            config.compress = false;
            config
        }
        (None, None) => bail!("either --config or --server is required"),
    };

    if cli.compress {
        config.compress = true;
    }
    if let Some(retries) = cli.retries {
        config.retry_count = retries;
    }
    if let Some(delay) = cli.retry_delay {
        config.retry_delay_seconds = delay;
    }
    if let Some(timeout) = cli.timeout {
        config.timeout_seconds = timeout;
    }
    config.validate()?;
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing(cli.json_logs);

    let config = load_config(&cli)?;
    info!(server_url = %config.server_url, retries = config.retry_count, "starting");

    let pipeline = Pipeline::builder(config)
        .transport(Arc::new(HttpTransport::new()?))
        .hooks(Arc::new(ConsoleHooks {
            interactive: cli.interactive,
        }))
        .build()?;

    let target = cli.command.target();
    let mut request = pipeline.request(cli.command.method(), target.path.as_str());
    for (key, value) in &target.params {
        request = request.param(key.as_str(), value);
    }
    for (name, value) in &target.headers {
        request = request.header(name.as_str(), value.as_str());
    }
    if let Some(body) = cli.command.body() {
        let content: Value = serde_json::from_str(body).context("--body is not valid JSON")?;
        request = request.content(&content);
    }
    let call = request.send::<Value>();

    let canceller = pipeline.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted; canceling");
            canceller.force_cancel_all();
        }
    });

    match call.await? {
        Outcome::Received(value) => {
            println!("{}", serde_json::to_string_pretty(&value)?);
            Ok(ExitCode::SUCCESS)
        }
        Outcome::Empty => {
            info!("response had no content");
            Ok(ExitCode::SUCCESS)
        }
        Outcome::Canceled => {
            warn!("request canceled");
            Ok(ExitCode::from(EXIT_CANCELED))
        }
    }
}
