//! Job commands - cancel, finish and edit the message of a job.

use std::sync::Arc;

use anyhow::Result;
use clap::Args;
use owo_colors::OwoColorize;
use tessera_client::{ApiClient, Job, ProgressTracker};
use tessera_core::JobId;

use super::{api_client, fetch_job, format_status_colored};
use crate::{Config, OutputFormat};

/// Arguments for commands that act on one job.
#[derive(Debug, Args)]
pub struct JobArgs {
    /// Job ID.
    #[arg()]
    pub job_id: JobId,

    /// The job is a manual changeset rather than an automated snapshot.
    #[arg(long, short = 'm')]
    pub manual: bool,
}

/// Arguments for the message command.
#[derive(Debug, Args)]
pub struct MessageArgs {
    /// Changeset ID.
    #[arg()]
    pub job_id: JobId,

    /// New message.
    #[arg()]
    pub message: String,
}

async fn track(
    client: Arc<ApiClient>,
    job_id: JobId,
    manual: bool,
    config: &Config,
) -> Result<ProgressTracker> {
    let job = fetch_job(&client, job_id, manual).await?;
    let tracker = ProgressTracker::from_config(client, &config.client);
    tracker.start_tracking(job);
    Ok(tracker)
}

fn print_job(job: &Job, action: &str, config: &Config) -> Result<()> {
    match config.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(job)?),
        OutputFormat::Text | OutputFormat::Table => {
            println!("{} {action}", "✓".green());
            println!("  Job ID: {}", job.id);
            println!("  Status: {}", format_status_colored(job.status));
            if let Some(message) = &job.message {
                println!("  Message: {message}");
            }
        }
    }
    Ok(())
}

/// Execute the cancel command.
///
/// Automated jobs are asked to stop; manual jobs are discarded.
///
/// # Errors
///
/// Returns an error if the job cannot be fetched or the request fails.
pub async fn cancel(args: &JobArgs, config: &Config) -> Result<()> {
    let client = api_client(config)?;
    let tracker = track(client, args.job_id, args.manual, config).await?;
    tracker.cancel(args.job_id).await?;

    match tracker.job(args.job_id) {
        Some(job) => print_job(&job, "Cancellation requested", config),
        None => {
            match config.format {
                OutputFormat::Json => {
                    let output = serde_json::json!({ "id": args.job_id, "discarded": true });
                    println!("{}", serde_json::to_string_pretty(&output)?);
                }
                OutputFormat::Text | OutputFormat::Table => {
                    println!("{} Discarded job {}", "✓".green(), args.job_id);
                }
            }
            Ok(())
        }
    }
}

/// Execute the finish command.
///
/// # Errors
///
/// Returns an error if the job is not manual or the request fails.
pub async fn finish(args: &JobArgs, config: &Config) -> Result<()> {
    let client = api_client(config)?;
    let tracker = track(client, args.job_id, args.manual, config).await?;
    tracker.finish(args.job_id).await?;

    match tracker.job(args.job_id) {
        Some(job) => print_job(&job, "Job finished", config),
        None => anyhow::bail!("job {} is no longer tracked", args.job_id),
    }
}

/// Execute the message command.
///
/// # Errors
///
/// Returns an error if the changeset cannot be fetched or the save fails.
pub async fn message(args: MessageArgs, config: &Config) -> Result<()> {
    let client = api_client(config)?;
    let tracker = track(client, args.job_id, true, config).await?;

    let editor = tracker.message_editor(args.job_id)?;
    editor.edit(args.message);
    let sent = editor.commit().await?;

    match tracker.job(args.job_id) {
        Some(job) if sent => print_job(&job, "Message updated", config),
        Some(job) => print_job(&job, "Message unchanged", config),
        None => anyhow::bail!("job {} is no longer tracked", args.job_id),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_job_args_parsing() {
        #[derive(Parser)]
        struct TestCli {
            #[command(flatten)]
            args: JobArgs,
        }

        let cli = TestCli::parse_from(["test", "12", "-m"]);
        assert_eq!(cli.args.job_id, JobId::new(12));
        assert!(cli.args.manual);
    }

    #[test]
    fn test_message_args_parsing() {
        #[derive(Parser)]
        struct TestCli {
            #[command(flatten)]
            args: MessageArgs,
        }

        let cli = TestCli::parse_from(["test", "5", "tag holiday photos"]);
        assert_eq!(cli.args.job_id, JobId::new(5));
        assert_eq!(cli.args.message, "tag holiday photos");
    }
}
