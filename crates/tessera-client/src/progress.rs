//! Progress aggregator.
//!
//! A [`ProgressTracker`] holds every job started in this session, each with
//! its own [`JobStream`]. The first tracked job that is not terminal drives
//! the global [`Ticker`]. Entries are in-memory only.
//!
//! Manual jobs (changesets) additionally get a [`MessageEditor`] and a
//! finish action; cancelling one deletes it, while cancelling an automated
//! job only asks the server to stop it.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use tokio::sync::watch;

use tessera_core::{Error, JobId, Result};

use crate::config::ClientConfig;
use crate::debounce::Debouncer;
use crate::job::{Job, JobActions, JobStatus, Progress};
use crate::stream::{EventTransport, JobStream, JobView, StreamPolicy};

/// The lead active job, summarised for a status bar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ticker {
    /// Job id.
    pub job_id: JobId,
    /// Message or `job <id>`.
    pub label: String,
    /// Current status.
    pub status: JobStatus,
    /// Derived progress.
    pub progress: Progress,
}

impl fmt::Display for Ticker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}] {}", self.label, self.status, self.progress)
    }
}

struct TrackerInner {
    transport: Arc<dyn EventTransport>,
    actions: Arc<dyn JobActions>,
    policy: StreamPolicy,
    message_debounce: Duration,
    entries: Mutex<Vec<JobStream>>,
}

impl TrackerInner {
    fn lock(&self) -> MutexGuard<'_, Vec<JobStream>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn observe(&self, job: Job) {
        let mut entries = self.lock();
        if let Some(stream) = entries.iter_mut().find(|s| s.job_id() == job.id) {
            stream.observe(job);
        }
    }
}

/// Registry of the jobs this session is following. Cheap to clone; clones
/// share state.
#[derive(Clone)]
pub struct ProgressTracker {
    inner: Arc<TrackerInner>,
}

impl fmt::Debug for ProgressTracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProgressTracker")
            .field("tracked", &self.inner.lock().len())
            .finish_non_exhaustive()
    }
}

impl ProgressTracker {
    /// Creates an empty tracker.
    #[must_use]
    pub fn new(
        transport: Arc<dyn EventTransport>,
        actions: Arc<dyn JobActions>,
        policy: StreamPolicy,
        message_debounce: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(TrackerInner {
                transport,
                actions,
                policy,
                message_debounce,
                entries: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Creates a tracker using one client for both events and actions.
    #[must_use]
    pub fn from_config<C>(client: Arc<C>, config: &ClientConfig) -> Self
    where
        C: EventTransport + JobActions,
    {
        Self::new(
            Arc::clone(&client) as Arc<dyn EventTransport>,
            client,
            StreamPolicy::from_config(config),
            config.search_debounce,
        )
    }

    /// Starts following `job`, replacing (and closing) any existing entry
    /// for the same id in place.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start_tracking(&self, job: Job) {
        let job_id = job.id;
        let stream = JobStream::open(Arc::clone(&self.inner.transport), job, self.inner.policy);
        let mut entries = self.inner.lock();
        if let Some(slot) = entries.iter_mut().find(|s| s.job_id() == job_id) {
            slot.close();
            *slot = stream;
            tracing::info!(%job_id, "job tracking restarted");
        } else {
            entries.push(stream);
            tracing::info!(%job_id, "job tracking started");
        }
    }

    /// Stops following a job and closes its stream. Returns false if it was
    /// not tracked.
    pub fn stop_tracking(&self, job_id: JobId) -> bool {
        let mut entries = self.inner.lock();
        let Some(index) = entries.iter().position(|s| s.job_id() == job_id) else {
            return false;
        };
        let mut stream = entries.remove(index);
        drop(entries);
        stream.close();
        tracing::info!(%job_id, "job tracking stopped");
        true
    }

    /// Latest snapshot of a tracked job.
    #[must_use]
    pub fn job(&self, job_id: JobId) -> Option<Job> {
        self.stream_view(job_id).map(|view| view.job)
    }

    /// Full stream view of a tracked job.
    #[must_use]
    pub fn stream_view(&self, job_id: JobId) -> Option<JobView> {
        self.inner
            .lock()
            .iter()
            .find(|s| s.job_id() == job_id)
            .map(JobStream::view)
    }

    /// Subscribes to a tracked job's view.
    #[must_use]
    pub fn subscribe(&self, job_id: JobId) -> Option<watch::Receiver<JobView>> {
        self.inner
            .lock()
            .iter()
            .find(|s| s.job_id() == job_id)
            .map(JobStream::subscribe)
    }

    /// Every tracked job in start order.
    #[must_use]
    pub fn tracked(&self) -> Vec<Job> {
        self.inner.lock().iter().map(|s| s.view().job).collect()
    }

    /// Tracked jobs that are not terminal, in start order.
    #[must_use]
    pub fn active(&self) -> Vec<Job> {
        self.tracked()
            .into_iter()
            .filter(|job| !job.status.is_terminal())
            .collect()
    }

    /// Summary of the lead active job.
    #[must_use]
    pub fn ticker(&self) -> Option<Ticker> {
        self.active().into_iter().next().map(|job| Ticker {
            job_id: job.id,
            label: job.label(),
            status: job.status,
            progress: job.progress(),
        })
    }

    fn require(&self, job_id: JobId) -> Result<Job> {
        self.job(job_id).ok_or_else(|| Error::NotTracked {
            job_id: job_id.to_string(),
        })
    }

    fn require_manual(&self, job_id: JobId, action: &'static str) -> Result<Job> {
        let job = self.require(job_id)?;
        if job.is_manual {
            Ok(job)
        } else {
            Err(Error::UnsupportedAction {
                action,
                reason: format!("job {job_id} is an automated run"),
            })
        }
    }

    /// Cancels a job.
    ///
    /// Manual jobs are deleted and dropped from tracking. Automated jobs get
    /// a graceful cancel request and stay tracked so the stream can report
    /// the `canceled` status.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotTracked`] for unknown ids, or the API error.
    pub async fn cancel(&self, job_id: JobId) -> Result<()> {
        let job = self.require(job_id)?;
        if job.is_manual {
            self.inner.actions.delete_job(job_id).await?;
            self.stop_tracking(job_id);
            tracing::info!(%job_id, "manual job discarded");
        } else {
            let updated = self.inner.actions.cancel_job(job_id).await?;
            tracing::info!(%job_id, "cancellation requested");
            if let Some(updated) = updated {
                self.inner.observe(updated);
            }
        }
        Ok(())
    }

    /// Completes a manual job.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnsupportedAction`] for automated jobs,
    /// [`Error::NotTracked`] for unknown ids, or the API error.
    pub async fn finish(&self, job_id: JobId) -> Result<()> {
        self.require_manual(job_id, "finish")?;
        let updated = self.inner.actions.finish_job(job_id).await?;
        tracing::info!(%job_id, "manual job finished");
        if let Some(updated) = updated {
            self.inner.observe(updated);
        }
        Ok(())
    }

    /// Editor for a manual job's message.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnsupportedAction`] for automated jobs or
    /// [`Error::NotTracked`] for unknown ids.
    pub fn message_editor(&self, job_id: JobId) -> Result<MessageEditor> {
        let job = self.require_manual(job_id, "message editing")?;
        Ok(MessageEditor::new(
            job_id,
            job.message.unwrap_or_default(),
            Arc::clone(&self.inner.actions),
            Arc::downgrade(&self.inner),
            self.inner.message_debounce,
        ))
    }
}

struct Draft {
    text: String,
    saved: String,
    last_error: Option<String>,
}

struct EditorInner {
    job_id: JobId,
    actions: Arc<dyn JobActions>,
    tracker: Weak<TrackerInner>,
    debouncer: Debouncer,
    draft: Mutex<Draft>,
    saving: tokio::sync::Mutex<()>,
}

/// Debounced editor for a manual job's message.
///
/// [`MessageEditor::edit`] schedules a save after the quiet period;
/// [`MessageEditor::commit`] (blur or Enter) saves immediately. A draft equal
/// to the last saved text is never sent.
#[derive(Clone)]
pub struct MessageEditor {
    inner: Arc<EditorInner>,
}

impl fmt::Debug for MessageEditor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageEditor")
            .field("job_id", &self.inner.job_id)
            .field("dirty", &self.is_dirty())
            .finish_non_exhaustive()
    }
}

impl MessageEditor {
    fn new(
        job_id: JobId,
        message: String,
        actions: Arc<dyn JobActions>,
        tracker: Weak<TrackerInner>,
        debounce: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(EditorInner {
                job_id,
                actions,
                tracker,
                debouncer: Debouncer::new(debounce),
                draft: Mutex::new(Draft {
                    text: message.clone(),
                    saved: message,
                    last_error: None,
                }),
                saving: tokio::sync::Mutex::new(()),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Draft> {
        self.inner
            .draft
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// The job being edited.
    #[must_use]
    pub fn job_id(&self) -> JobId {
        self.inner.job_id
    }

    /// Current draft.
    #[must_use]
    pub fn draft(&self) -> String {
        self.lock().text.clone()
    }

    /// True if the draft differs from the last saved message.
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        let draft = self.lock();
        draft.text != draft.saved
    }

    /// Message of the last failed save.
    #[must_use]
    pub fn last_error(&self) -> Option<String> {
        self.lock().last_error.clone()
    }

    /// Updates the draft and schedules a save.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn edit(&self, text: impl Into<String>) {
        self.lock().text = text.into();
        let weak = Arc::downgrade(&self.inner);
        self.inner.debouncer.schedule(async move {
            if let Some(inner) = weak.upgrade() {
                // Failures are kept in `last_error`.
                let _ = MessageEditor { inner }.save().await;
            }
        });
    }

    /// Cancels the pending save and saves now. Returns whether anything was
    /// sent.
    ///
    /// # Errors
    ///
    /// Returns the API error; it is also kept in [`MessageEditor::last_error`].
    pub async fn commit(&self) -> Result<bool> {
        self.inner.debouncer.cancel();
        self.save().await
    }

    async fn save(&self) -> Result<bool> {
        let _saving = self.inner.saving.lock().await;
        let text = {
            let draft = self.lock();
            if draft.text == draft.saved {
                return Ok(false);
            }
            draft.text.clone()
        };

        let job_id = self.inner.job_id;
        match self.inner.actions.update_message(job_id, &text).await {
            Ok(job) => {
                {
                    let mut draft = self.lock();
                    draft.saved = text;
                    draft.last_error = None;
                }
                tracing::debug!(%job_id, "job message saved");
                if let Some(tracker) = self.inner.tracker.upgrade() {
                    tracker.observe(job);
                }
                Ok(true)
            }
            Err(err) => {
                tracing::warn!(%job_id, error = %err, "saving job message failed");
                self.lock().last_error = Some(err.display_message());
                Err(err)
            }
        }
    }
}
