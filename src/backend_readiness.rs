use std::time::Duration;

use tokio::time::{self, Instant};

use crate::{
    ConversionApi, READINESS_MAX_WAIT, READINESS_POLL_INTERVAL, READINESS_PROBE_TIMEOUT,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadinessConfig {
    pub max_wait: Duration,
    pub poll_interval: Duration,
    pub probe_timeout: Duration,
}

impl Default for ReadinessConfig {
    fn default() -> Self {
        Self::new(READINESS_MAX_WAIT, READINESS_POLL_INTERVAL)
    }
}

impl ReadinessConfig {
    pub fn new(max_wait: Duration, poll_interval: Duration) -> Self {
        Self {
            max_wait,
            poll_interval,
            probe_timeout: READINESS_PROBE_TIMEOUT,
        }
    }

    pub fn with_probe_timeout(mut self, probe_timeout: Duration) -> Self {
        self.probe_timeout = probe_timeout;
        self
    }

    /// A probe may never outlive the interval between probes.
    pub fn effective_probe_timeout(&self) -> Duration {
        self.probe_timeout.min(self.poll_interval)
    }
}

/// Probes `/health` until it answers or `max_wait` runs out. Never fails;
/// transport errors and stalled probes simply count as "not ready yet".
pub async fn wait_ready(api: &dyn ConversionApi, config: &ReadinessConfig) -> bool {
    let deadline = Instant::now() + config.max_wait;
    let probe_timeout = config.effective_probe_timeout();
    let mut attempt = 0u32;

    loop {
        let started = Instant::now();
        attempt += 1;

        match time::timeout(probe_timeout, api.health()).await {
            Ok(Ok(())) => {
                tracing::debug!(attempt, "backend is ready");
                return true;
            }
            Ok(Err(error)) => {
                tracing::debug!(attempt, %error, "backend readiness probe failed");
            }
            Err(_) => {
                tracing::debug!(
                    attempt,
                    timeout_ms = probe_timeout.as_millis() as u64,
                    "backend readiness probe timed out"
                );
            }
        }

        let next_probe = started + config.poll_interval;
        if next_probe >= deadline {
            break;
        }
        time::sleep_until(next_probe).await;
    }

    tracing::warn!(
        attempts = attempt,
        max_wait_ms = config.max_wait.as_millis() as u64,
        "backend did not become ready in time"
    );
    false
}
