//! CLI command implementations.

pub mod assets;
pub mod jobs;
pub mod run;
pub mod watch;

use std::sync::Arc;

use anyhow::Result;
use owo_colors::OwoColorize;
use tessera_client::{ApiClient, Job, JobKind, JobStatus};
use tessera_core::JobId;

use crate::Config;

/// Builds the shared API client for a command.
fn api_client(config: &Config) -> Result<Arc<ApiClient>> {
    Ok(Arc::new(ApiClient::new(&config.client)?))
}

/// Fetches a job. `manual` selects the changeset endpoint; a manual flag
/// reported by the server is never cleared.
async fn fetch_job(client: &ApiClient, job_id: JobId, manual: bool) -> Result<Job> {
    let kind = if manual {
        JobKind::Changeset
    } else {
        JobKind::Snapshot
    };
    let job = client.get_job(job_id, kind).await?;
    Ok(with_manual_flag(job, manual))
}

fn with_manual_flag(mut job: Job, manual: bool) -> Job {
    job.is_manual |= manual;
    job
}

fn format_status_colored(status: JobStatus) -> String {
    let text = status.as_str();
    match status {
        JobStatus::Completed => text.green().to_string(),
        JobStatus::Error => text.red().to_string(),
        JobStatus::Running => text.blue().to_string(),
        JobStatus::Queued | JobStatus::Partial => text.yellow().to_string(),
        JobStatus::Canceled | JobStatus::Skipped => text.dimmed().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_client::JobCounts;

    fn job(is_manual: bool) -> Job {
        Job {
            id: JobId::new(3),
            status: JobStatus::Running,
            counts: JobCounts::default(),
            message: None,
            log_message: None,
            is_manual,
        }
    }

    #[test]
    fn test_server_manual_flag_survives_missing_cli_flag() {
        assert!(with_manual_flag(job(true), false).is_manual);
    }

    #[test]
    fn test_cli_flag_marks_job_manual() {
        assert!(with_manual_flag(job(false), true).is_manual);
        assert!(!with_manual_flag(job(false), false).is_manual);
    }
}
