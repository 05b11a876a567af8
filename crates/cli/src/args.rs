//! Command line definition.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use pipeline::Method;

/// Send one request through a Courier pipeline and print the JSON response.
#[derive(Debug, Parser)]
#[command(name = "courier", version, about)]
pub struct Cli {
    /// JSON pipeline configuration file.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Server base URL (overrides the config file).
    #[arg(long, global = true)]
    pub server: Option<String>,

    /// Gzip request and response bodies.
    #[arg(long, global = true)]
    pub compress: bool,

    /// Maximum number of retries after the first attempt.
    #[arg(long, global = true)]
    pub retries: Option<u32>,

    /// Seconds to wait between attempts.
    #[arg(long, global = true)]
    pub retry_delay: Option<f64>,

    /// Per-attempt timeout in seconds.
    #[arg(long, global = true)]
    pub timeout: Option<u64>,

    /// Ask on stdin whether to retry after each failure.
    #[arg(long, global = true)]
    pub interactive: bool,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    pub json_logs: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Fetch a resource.
    Get(Target),
    /// Create a resource.
    Post(WithBody),
    /// Replace a resource.
    Put(WithBody),
    /// Partially update a resource.
    Patch(WithBody),
    /// Delete a resource.
    Delete(Target),
}

impl Command {
    pub fn method(&self) -> Method {
        match self {
            Self::Get(_) => Method::Get,
            Self::Post(_) => Method::Post,
            Self::Put(_) => Method::Put,
            Self::Patch(_) => Method::Patch,
            Self::Delete(_) => Method::Delete,
        }
    }

    pub fn target(&self) -> &Target {
        match self {
            Self::Get(target) | Self::Delete(target) => target,
            Self::Post(with) | Self::Put(with) | Self::Patch(with) => &with.target,
        }
    }

    pub fn body(&self) -> Option<&str> {
        match self {
            Self::Get(_) | Self::Delete(_) => None,
            Self::Post(with) | Self::Put(with) | Self::Patch(with) => Some(&with.body),
        }
    }
}

#[derive(Debug, Args)]
pub struct Target {
    /// Resource path, joined onto the server URL.
    pub path: String,

    /// Query parameter as `key=value`; repeatable.
    #[arg(long = "param", value_parser = parse_pair)]
    pub params: Vec<(String, String)>,

    /// Header as `name=value`; repeatable.
    #[arg(long = "header", value_parser = parse_pair)]
    pub headers: Vec<(String, String)>,
}

#[derive(Debug, Args)]
pub struct WithBody {
    #[command(flatten)]
    pub target: Target,

    /// Request content as a JSON document.
    #[arg(long)]
    pub body: String,
}

fn parse_pair(raw: &str) -> Result<(String, String), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{raw}'"))?;
    if key.is_empty() {
        return Err(format!("empty key in '{raw}'"));
    }
    Ok((key.to_string(), value.to_string()))
}
