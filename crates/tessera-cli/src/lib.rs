//! # tessera-cli
//!
//! Command-line interface for the tessera catalog backend.
//!
//! ## Commands
//!
//! - `tessera assets` - Show one page of a view or collection
//! - `tessera run` - Start a scan, processing or analysis job
//! - `tessera watch` - Follow a job's log and progress
//! - `tessera cancel` - Cancel (or discard) a job
//! - `tessera finish` - Finish a manual job
//! - `tessera message` - Set a manual job's message
//!
//! ## Configuration
//!
//! The CLI uses environment variables or command-line flags for settings:
//!
//! - `TESSERA_API_URL` - API endpoint (default: `http://localhost:8080`)
//! - `TESSERA_API_TOKEN` - API authentication token
//! - `TESSERA_PAGE_SIZE` - Rows per page (default: 100)
//! - `TESSERA_STREAM_RETRY_MS` - Event stream reconnect delay (default: 3000)
//! - `TESSERA_REQUEST_TIMEOUT_SECS` - Optional deadline for plain API calls

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]
// CLI uses print! macros intentionally
#![allow(clippy::print_stdout)]
#![allow(clippy::print_stderr)]

pub mod commands;

use std::time::Duration;

use clap::{Parser, Subcommand};
use tessera_client::ClientConfig;
use tessera_client::config::{DEFAULT_API_URL, DEFAULT_PAGE_SIZE};

/// Tessera CLI - catalog browsing and job control.
#[derive(Debug, Parser)]
#[command(name = "tessera")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// API server URL.
    #[arg(long, env = "TESSERA_API_URL", default_value = DEFAULT_API_URL)]
    pub api_url: String,

    /// API authentication token.
    #[arg(long, env = "TESSERA_API_TOKEN", hide_env_values = true)]
    pub api_token: Option<String>,

    /// Rows per page.
    #[arg(long, env = "TESSERA_PAGE_SIZE", default_value_t = DEFAULT_PAGE_SIZE)]
    pub page_size: u64,

    /// Event stream reconnect delay in milliseconds.
    #[arg(long, env = "TESSERA_STREAM_RETRY_MS", default_value = "3000")]
    pub stream_retry_ms: u64,

    /// Deadline for plain API calls in seconds (event streams never time out).
    #[arg(long, env = "TESSERA_REQUEST_TIMEOUT_SECS")]
    pub request_timeout_secs: Option<u64>,

    /// Output format.
    #[arg(long, default_value = "text")]
    pub format: OutputFormat,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Get the effective configuration.
    #[must_use]
    pub fn config(&self) -> Config {
        Config {
            client: ClientConfig {
                api_url: self.api_url.clone(),
                api_token: self.api_token.clone(),
                request_timeout: self.request_timeout_secs.map(Duration::from_secs),
                page_size: self.page_size,
                stream_retry: Duration::from_millis(self.stream_retry_ms),
                ..ClientConfig::default()
            },
            format: self.format.clone(),
        }
    }
}

/// CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Show one page of assets.
    Assets(commands::assets::AssetsArgs),
    /// Start a job.
    Run(commands::run::RunArgs),
    /// Follow a job until it stops running.
    Watch(commands::watch::WatchArgs),
    /// Cancel an automated job or discard a manual one.
    Cancel(commands::jobs::JobArgs),
    /// Finish a manual job.
    Finish(commands::jobs::JobArgs),
    /// Set a manual job's message.
    Message(commands::jobs::MessageArgs),
}

/// Output format.
#[derive(Debug, Clone, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output.
    #[default]
    Text,
    /// JSON output.
    Json,
    /// Table output.
    Table,
}

/// CLI configuration.
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Client settings.
    pub client: ClientConfig,
    /// Output format.
    pub format: OutputFormat,
}
