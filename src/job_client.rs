//! Job submission and the per-handle polling task.
//!
//! [`JobClient::start`] probes readiness, submits, then spawns one task that
//! polls `GET /jobs/{job_id}` on a fixed period until the job is done, the
//! connection is declared lost, or the caller abandons it. Ticks are strictly
//! sequential: a tick's fetch is only issued after the previous tick has been
//! applied.

use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use tokio::{
    task::JoinHandle,
    time::{self, Instant, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;

use crate::{
    backend_readiness::{wait_ready, ReadinessConfig},
    BackendApiError, ConversionApi, ConversionRequest, HistoryRecord, HistoryViewer, JobHandle,
    JobTracker, PollState, TickOutcome, HISTORY_RECENT_LIMIT, JOB_POLL_FETCH_TIMEOUT,
    JOB_POLL_INTERVAL, JOB_POLL_MAX_CONSECUTIVE_FAILURES,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollConfig {
    pub interval: Duration,
    pub failure_threshold: u32,
    pub fetch_timeout: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: JOB_POLL_INTERVAL,
            failure_threshold: JOB_POLL_MAX_CONSECUTIVE_FAILURES,
            fetch_timeout: JOB_POLL_FETCH_TIMEOUT,
        }
    }
}

impl PollConfig {
    /// A fetch may never outlive the tick it belongs to, so a stalled backend
    /// cannot push later ticks back.
    pub fn effective_fetch_timeout(&self) -> Duration {
        self.fetch_timeout.min(self.interval)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SubmitError {
    #[error("conversion service unavailable")]
    NotReady,
    #[error("conversion could not be started: {0}")]
    Rejected(#[source] BackendApiError),
}

#[derive(Debug, Clone, PartialEq)]
pub enum JobEvent {
    Progress {
        job_id: JobHandle,
        percent: u8,
        fraction: f64,
        message: String,
    },
    Finished {
        job_id: JobHandle,
        success: u64,
        failed: u64,
        output_dir: PathBuf,
    },
    ConnectionLost {
        job_id: JobHandle,
    },
    HistoryRefreshed {
        records: Vec<HistoryRecord>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    Done { success: u64, failed: u64 },
    ConnectionLost,
    /// Observation stopped locally; the backend may still be working.
    Abandoned,
}

#[derive(Clone)]
pub struct JobClient {
    api: Arc<dyn ConversionApi>,
    readiness: ReadinessConfig,
    poll: PollConfig,
    history_limit: usize,
}

impl JobClient {
    pub fn new(api: Arc<dyn ConversionApi>) -> Self {
        Self {
            api,
            readiness: ReadinessConfig::default(),
            poll: PollConfig::default(),
            history_limit: HISTORY_RECENT_LIMIT,
        }
    }

    pub fn with_readiness(mut self, readiness: ReadinessConfig) -> Self {
        self.readiness = readiness;
        self
    }

    pub fn with_poll_config(mut self, poll: PollConfig) -> Self {
        self.poll = poll;
        self
    }

    pub fn with_history_limit(mut self, history_limit: usize) -> Self {
        self.history_limit = history_limit;
        self
    }

    /// Waits for readiness, then posts the request. Either a handle or an
    /// error comes back, never both.
    pub async fn submit(&self, request: &ConversionRequest) -> Result<JobHandle, SubmitError> {
        if !wait_ready(self.api.as_ref(), &self.readiness).await {
            return Err(SubmitError::NotReady);
        }

        match self.api.submit(request).await {
            Ok(handle) => {
                tracing::info!(
                    job_id = %handle,
                    files = request.files().len(),
                    output_format = request.output_format(),
                    "conversion job submitted"
                );
                Ok(handle)
            }
            Err(error) => {
                tracing::warn!(%error, "conversion job submission failed");
                Err(SubmitError::Rejected(error))
            }
        }
    }

    /// Submits and immediately starts polling the new handle on its own task.
    pub async fn start<F>(
        &self,
        request: ConversionRequest,
        on_event: F,
    ) -> Result<ActiveJob, SubmitError>
    where
        F: Fn(JobEvent) + Send + Sync + 'static,
    {
        let handle = self.submit(&request).await?;
        Ok(self.watch(handle, request.output_dir().to_path_buf(), on_event))
    }

    /// Starts polling an already submitted handle on its own task.
    pub fn watch<F>(&self, handle: JobHandle, output_dir: PathBuf, on_event: F) -> ActiveJob
    where
        F: Fn(JobEvent) + Send + Sync + 'static,
    {
        let cancel = CancellationToken::new();
        let client = self.clone();
        let task_handle = handle.clone();
        let task_cancel = cancel.clone();
        let task = tokio::spawn(async move {
            client
                .poll_until_terminal(&task_handle, &output_dir, &on_event, &task_cancel)
                .await
        });

        ActiveJob {
            handle,
            cancel,
            task,
        }
    }

    pub async fn poll_until_terminal<F>(
        &self,
        handle: &JobHandle,
        output_dir: &Path,
        on_event: &F,
        cancel: &CancellationToken,
    ) -> PollOutcome
    where
        F: Fn(JobEvent) + Send + Sync,
    {
        let mut tracker = JobTracker::new(self.poll.failure_threshold);
        let fetch_timeout = self.poll.effective_fetch_timeout();
        let mut ticker = time::interval_at(Instant::now() + self.poll.interval, self.poll.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return abandoned(handle),
                _ = ticker.tick() => {}
            }

            let fetched = tokio::select! {
                biased;
                _ = cancel.cancelled() => return abandoned(handle),
                fetched = time::timeout(fetch_timeout, self.api.job_snapshot(handle)) => fetched,
            };

            let outcome = match fetched {
                Ok(Ok(snapshot)) => tracker.on_snapshot(&snapshot),
                Ok(Err(error)) => {
                    tracing::debug!(job_id = %handle, %error, "job poll failed");
                    tracker.on_fetch_failure()
                }
                Err(_) => {
                    tracing::debug!(
                        job_id = %handle,
                        error = %BackendApiError::Timeout(fetch_timeout),
                        "job poll failed"
                    );
                    tracker.on_fetch_failure()
                }
            };

            match outcome {
                TickOutcome::Progress(progress) => on_event(JobEvent::Progress {
                    job_id: handle.clone(),
                    percent: progress.percent,
                    fraction: progress.fraction,
                    message: progress.message,
                }),
                TickOutcome::FailureTolerated { consecutive } => {
                    tracing::debug!(job_id = %handle, consecutive, "tolerating job poll failure");
                }
                TickOutcome::Finished { success, failed } => {
                    tracing::info!(job_id = %handle, success, failed, "conversion job finished");
                    on_event(JobEvent::Finished {
                        job_id: handle.clone(),
                        success,
                        failed,
                        output_dir: output_dir.to_path_buf(),
                    });
                    let records = HistoryViewer::new(Arc::clone(&self.api))
                        .recent(self.history_limit)
                        .await;
                    on_event(JobEvent::HistoryRefreshed { records });
                }
                TickOutcome::ConnectionLost => {
                    tracing::warn!(
                        job_id = %handle,
                        failures = tracker.consecutive_failures(),
                        "lost connection to conversion service; giving up on job"
                    );
                    on_event(JobEvent::ConnectionLost {
                        job_id: handle.clone(),
                    });
                }
                TickOutcome::Ignored => {}
            }

            match tracker.state() {
                PollState::Polling => {}
                PollState::Done { success, failed } => return PollOutcome::Done { success, failed },
                PollState::ConnectionLost => return PollOutcome::ConnectionLost,
            }
        }
    }
}

fn abandoned(handle: &JobHandle) -> PollOutcome {
    tracing::info!(job_id = %handle, "stopped observing conversion job");
    PollOutcome::Abandoned
}

/// A submitted job and its polling task. Dropping it stops observation.
#[derive(Debug)]
pub struct ActiveJob {
    handle: JobHandle,
    cancel: CancellationToken,
    task: JoinHandle<PollOutcome>,
}

impl ActiveJob {
    pub fn handle(&self) -> &JobHandle {
        &self.handle
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Stops polling locally. There is no backend cancellation call.
    pub fn abandon(&self) {
        self.cancel.cancel();
    }

    pub async fn wait(mut self) -> PollOutcome {
        match (&mut self.task).await {
            Ok(outcome) => outcome,
            Err(error) => {
                tracing::warn!(job_id = %self.handle, %error, "job polling task ended abnormally");
                PollOutcome::Abandoned
            }
        }
    }
}

impl Drop for ActiveJob {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
