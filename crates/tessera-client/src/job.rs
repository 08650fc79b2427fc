//! Long-running jobs: automated snapshots and manual changesets.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use tessera_core::{JobId, Result};

/// Percentage shown while running with an unknown queue size.
pub const INDETERMINATE_MIDPOINT: u8 = 50;

/// Job lifecycle state.
///
/// Statuses only move forward; terminal statuses never change again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Waiting for a worker.
    Queued,
    /// Executing.
    #[serde(alias = "in_progress")]
    Running,
    /// Some items were processed; the job may continue.
    Partial,
    /// Finished successfully.
    Completed,
    /// Stopped on request.
    #[serde(alias = "cancelled")]
    Canceled,
    /// Failed.
    Error,
    /// Nothing to do.
    Skipped,
}

impl JobStatus {
    /// True for statuses that never change again.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Canceled | Self::Error | Self::Skipped
        )
    }

    /// True while the event stream is worth keeping open.
    #[must_use]
    pub const fn keeps_stream_open(self) -> bool {
        matches!(self, Self::Queued | Self::Running)
    }

    /// Position in the lifecycle; snapshots never move to a lower rank.
    #[must_use]
    pub const fn rank(self) -> u8 {
        match self {
            Self::Queued => 0,
            Self::Running => 1,
            Self::Partial => 2,
            Self::Completed | Self::Canceled | Self::Error | Self::Skipped => 3,
        }
    }

    /// Wire spelling.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Partial => "partial",
            Self::Completed => "completed",
            Self::Canceled => "canceled",
            Self::Error => "error",
            Self::Skipped => "skipped",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Item counters; any of them may be unknown.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobCounts {
    /// Items waiting.
    #[serde(default)]
    pub queued: Option<u64>,
    /// Items in progress.
    #[serde(default)]
    pub running: Option<u64>,
    /// Items done.
    #[serde(default)]
    pub finished: Option<u64>,
}

impl JobCounts {
    /// Overlays the known fields of `delta`.
    pub fn merge(&mut self, delta: &Self) {
        if delta.queued.is_some() {
            self.queued = delta.queued;
        }
        if delta.running.is_some() {
            self.running = delta.running;
        }
        if delta.finished.is_some() {
            self.finished = delta.finished;
        }
    }

    /// Progress derived from the counters.
    ///
    /// All three known: `round(finished / total * 100)` clamped to 0..=100.
    /// Only running and finished known: the fixed midpoint. Otherwise
    /// indeterminate.
    #[must_use]
    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss
    )]
    pub fn progress(&self) -> Progress {
        match (self.queued, self.running, self.finished) {
            (Some(queued), Some(running), Some(finished)) => {
                let total = u128::from(queued) + u128::from(running) + u128::from(finished);
                if total == 0 {
                    return Progress::Percent(0);
                }
                let percent = (finished as f64 / total as f64 * 100.0).round();
                Progress::Percent(percent.clamp(0.0, 100.0) as u8)
            }
            (None, Some(_), Some(_)) => Progress::Midpoint,
            _ => Progress::Indeterminate,
        }
    }
}

/// Progress of a job for display.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progress {
    /// Computed percentage.
    Percent(u8),
    /// Active with an unknown total; shown at [`INDETERMINATE_MIDPOINT`].
    Midpoint,
    /// Nothing known; shown as an animation.
    Indeterminate,
}

impl Progress {
    /// The value for a percentage bar, if any.
    #[must_use]
    pub const fn percent(self) -> Option<u8> {
        match self {
            Self::Percent(p) => Some(p),
            Self::Midpoint => Some(INDETERMINATE_MIDPOINT),
            Self::Indeterminate => None,
        }
    }
}

impl fmt::Display for Progress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.percent() {
            Some(p) => write!(f, "{p}%"),
            None => f.write_str("…"),
        }
    }
}

/// Whether a job is an automated run or a manual edit session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobKind {
    /// Automated scan or processing run.
    Snapshot,
    /// Manual editing session.
    Changeset,
}

impl JobKind {
    /// Resource path segment.
    #[must_use]
    pub const fn path_segment(self) -> &'static str {
        match self {
            Self::Snapshot => "snapshots",
            Self::Changeset => "changesets",
        }
    }
}

/// A tracked job as the server reports it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    /// Job id.
    pub id: JobId,
    /// Lifecycle state.
    pub status: JobStatus,
    /// Item counters.
    #[serde(default)]
    pub counts: JobCounts,
    /// Operator-facing description.
    #[serde(default)]
    pub message: Option<String>,
    /// Accumulated log text, newline separated.
    #[serde(default, alias = "log_message")]
    pub log_message: Option<String>,
    /// Manual editing session.
    #[serde(default, alias = "is_manual")]
    pub is_manual: bool,
}

impl Job {
    /// Snapshot or changeset.
    #[must_use]
    pub fn kind(&self) -> JobKind {
        if self.is_manual {
            JobKind::Changeset
        } else {
            JobKind::Snapshot
        }
    }

    /// Progress derived from the counters.
    #[must_use]
    pub fn progress(&self) -> Progress {
        self.counts.progress()
    }

    /// The message, or `job <id>` when there is none.
    #[must_use]
    pub fn label(&self) -> String {
        match self.message.as_deref().map(str::trim) {
            Some(message) if !message.is_empty() => message.to_string(),
            _ => format!("job {}", self.id),
        }
    }
}

/// Mutations on jobs.
#[async_trait]
pub trait JobActions: Send + Sync + 'static {
    /// Requests graceful cancellation of an automated job.
    async fn cancel_job(&self, id: JobId) -> Result<Option<Job>>;

    /// Discards a job outright.
    async fn delete_job(&self, id: JobId) -> Result<()>;

    /// Replaces a manual job's message.
    async fn update_message(&self, id: JobId, message: &str) -> Result<Job>;

    /// Completes a manual job.
    async fn finish_job(&self, id: JobId) -> Result<Option<Job>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn counts(queued: Option<u64>, running: Option<u64>, finished: Option<u64>) -> JobCounts {
        JobCounts {
            queued,
            running,
            finished,
        }
    }

    #[test]
    fn percent_from_all_counts() {
        let progress = counts(Some(2), Some(1), Some(3)).progress();
        assert_eq!(progress, Progress::Percent(50));
        assert_eq!(progress.to_string(), "50%");
        assert_eq!(counts(Some(1), Some(1), Some(1)).progress(), Progress::Percent(33));
        assert_eq!(counts(Some(0), Some(0), Some(0)).progress(), Progress::Percent(0));
        assert_eq!(counts(Some(0), Some(0), Some(9)).progress(), Progress::Percent(100));
    }

    #[test]
    fn huge_counts_do_not_overflow() {
        assert_eq!(
            counts(Some(u64::MAX), Some(1), Some(0)).progress(),
            Progress::Percent(0)
        );
        assert_eq!(
            counts(Some(0), Some(u64::MAX), Some(u64::MAX)).progress(),
            Progress::Percent(50)
        );
        assert_eq!(
            counts(Some(0), Some(0), Some(u64::MAX)).progress(),
            Progress::Percent(100)
        );
    }

    #[test]
    fn unknown_queue_pins_midpoint() {
        let progress = counts(None, Some(1), Some(5)).progress();
        assert_eq!(progress, Progress::Midpoint);
        assert_eq!(progress.percent(), Some(INDETERMINATE_MIDPOINT));
    }

    #[test]
    fn no_counts_is_indeterminate() {
        assert_eq!(JobCounts::default().progress(), Progress::Indeterminate);
        assert_eq!(counts(None, None, Some(4)).progress(), Progress::Indeterminate);
        assert_eq!(Progress::Indeterminate.percent(), None);
    }

    #[test]
    fn merge_overlays_known_fields() {
        let mut base = counts(Some(5), Some(1), Some(0));
        base.merge(&counts(None, Some(2), Some(3)));
        assert_eq!(base, counts(Some(5), Some(2), Some(3)));
    }

    #[test]
    fn statuses_rank_forward() {
        assert!(JobStatus::Queued.rank() < JobStatus::Running.rank());
        assert!(JobStatus::Running.rank() < JobStatus::Partial.rank());
        assert!(JobStatus::Partial.rank() < JobStatus::Completed.rank());
        assert!(JobStatus::Error.is_terminal());
        assert!(!JobStatus::Partial.is_terminal());
        assert!(JobStatus::Queued.keeps_stream_open());
        assert!(!JobStatus::Partial.keeps_stream_open());
    }

    #[test]
    fn job_deserializes_both_casings() {
        let camel: Job = serde_json::from_value(json!({
            "id": 7,
            "status": "in_progress",
            "counts": {"queued": 1, "running": null, "finished": 2},
            "message": "Nightly scan",
            "logMessage": "started",
            "isManual": false
        }))
        .expect("camelCase job");
        assert_eq!(camel.status, JobStatus::Running);
        assert_eq!(camel.counts.running, None);
        assert_eq!(camel.kind(), JobKind::Snapshot);

        let snake: Job = serde_json::from_value(json!({
            "id": 8,
            "status": "cancelled",
            "log_message": "a\nb",
            "is_manual": true
        }))
        .expect("snake_case job");
        assert_eq!(snake.status, JobStatus::Canceled);
        assert!(snake.is_manual);
        assert_eq!(snake.kind(), JobKind::Changeset);
        assert_eq!(snake.label(), "job 8");
        assert_eq!(camel.label(), "Nightly scan");
    }
}
