//! Watch command - follow a job's log and progress.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use owo_colors::OwoColorize;
use tessera_client::{ApiClient, ConnectionState, Job, JobView, ProgressTracker};
use tessera_core::JobId;

use super::{api_client, fetch_job, format_status_colored};
use crate::{Config, OutputFormat};

/// Arguments for the watch command.
#[derive(Debug, Args)]
pub struct WatchArgs {
    /// Job ID to follow.
    #[arg()]
    pub job_id: JobId,

    /// The job is a manual changeset rather than an automated snapshot.
    #[arg(long, short = 'm')]
    pub manual: bool,
}

/// Execute the watch command.
///
/// # Errors
///
/// Returns an error if the job cannot be fetched.
pub async fn execute(args: &WatchArgs, config: &Config) -> Result<()> {
    let client = api_client(config)?;
    let job = fetch_job(&client, args.job_id, args.manual).await?;
    follow(client, job, config).await?;
    Ok(())
}

/// Follows `job` until its event stream closes and returns the final view.
///
/// New log lines go to stdout; status changes and stream notices go to
/// stderr. JSON output prints only the final view.
///
/// # Errors
///
/// Returns an error if the final view cannot be serialized.
pub async fn follow(client: Arc<ApiClient>, job: Job, config: &Config) -> Result<JobView> {
    let tracker = ProgressTracker::from_config(client, &config.client);
    let job_id = job.id;
    tracker.start_tracking(job);
    let mut rx = tracker
        .subscribe(job_id)
        .with_context(|| format!("job {job_id} is not tracked"))?;

    let quiet = matches!(config.format, OutputFormat::Json);
    let mut printed = 0;
    let mut last_status = None;
    let mut last_notice: Option<String> = None;

    let view = loop {
        let view = rx.borrow_and_update().clone();
        if !quiet {
            for line in view.logs.iter().skip(printed) {
                println!("{line}");
            }
            printed = view.logs.len();

            let status = (view.job.status, view.job.progress());
            if last_status != Some(status) {
                eprintln!(
                    "{} [{}] {}",
                    view.job.label(),
                    format_status_colored(status.0),
                    status.1
                );
                last_status = Some(status);
            }

            if view.notice != last_notice {
                if let Some(notice) = &view.notice {
                    eprintln!("{}", notice.yellow());
                }
                last_notice.clone_from(&view.notice);
            }
        }

        if view.connection == ConnectionState::Closed {
            break view;
        }
        if rx.changed().await.is_err() {
            break tracker.stream_view(job_id).unwrap_or(view);
        }
    };

    if let Some(error) = &view.error {
        tracing::warn!(%job_id, %error, "last status event was malformed");
    }

    if quiet {
        let output = serde_json::json!({
            "job": view.job,
            "logs": view.logs,
            "heartbeats": view.heartbeats,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
    }

    Ok(view)
}
