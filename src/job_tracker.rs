use serde::Serialize;

use crate::{progress_percent, JobSnapshot};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "camelCase")]
pub enum PollState {
    Polling,
    Done { success: u64, failed: u64 },
    ConnectionLost,
}

impl PollState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, PollState::Polling)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct JobProgress {
    pub processed: u64,
    pub total: u64,
    pub fraction: f64,
    pub percent: u8,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    Progress(JobProgress),
    Finished { success: u64, failed: u64 },
    FailureTolerated { consecutive: u32 },
    ConnectionLost,
    /// The tracker already reached a terminal state; nothing changes.
    Ignored,
}

/// Client-side view of one job handle. `Done` and `ConnectionLost` are
/// absorbing.
#[derive(Debug, Clone)]
pub struct JobTracker {
    state: PollState,
    consecutive_failures: u32,
    failure_threshold: u32,
}

impl JobTracker {
    pub fn new(failure_threshold: u32) -> Self {
        Self {
            state: PollState::Polling,
            consecutive_failures: 0,
            failure_threshold: failure_threshold.max(1),
        }
    }

    pub fn state(&self) -> PollState {
        self.state
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn on_snapshot(&mut self, snapshot: &JobSnapshot) -> TickOutcome {
        if self.state.is_terminal() {
            return TickOutcome::Ignored;
        }
        self.consecutive_failures = 0;

        if snapshot.done {
            self.state = PollState::Done {
                success: snapshot.success,
                failed: snapshot.failed,
            };
            return TickOutcome::Finished {
                success: snapshot.success,
                failed: snapshot.failed,
            };
        }

        let fraction = snapshot.progress_fraction();
        TickOutcome::Progress(JobProgress {
            processed: snapshot.processed,
            total: snapshot.total,
            fraction,
            percent: progress_percent(fraction),
            message: snapshot.message.clone().unwrap_or_default(),
        })
    }

    pub fn on_fetch_failure(&mut self) -> TickOutcome {
        if self.state.is_terminal() {
            return TickOutcome::Ignored;
        }

        self.consecutive_failures += 1;
        if self.consecutive_failures >= self.failure_threshold {
            self.state = PollState::ConnectionLost;
            return TickOutcome::ConnectionLost;
        }
        TickOutcome::FailureTolerated {
            consecutive: self.consecutive_failures,
        }
    }
}
