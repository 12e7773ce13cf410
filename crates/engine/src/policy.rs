use std::time::Duration;

/// Retry and pacing knobs for the submission and polling loops.
///
/// Every bound here is policy, not protocol: callers tune them from settings.
#[derive(Debug, Clone)]
pub struct EnginePolicy {
    /// Total submit attempts; only blank-description gateway errors consume
    /// attempts beyond the first.
    pub submit_attempts: u32,
    /// Base delay between submit attempts; attempt `n` waits `n * base`.
    pub submit_backoff: Duration,
    /// Fixed sleep between poll ticks.
    pub poll_interval: Duration,
    /// Consecutive transient poll failures tolerated before the job is
    /// escalated to a written error.
    pub max_consecutive_poll_failures: u32,
}

impl Default for EnginePolicy {
    fn default() -> Self {
        Self {
            submit_attempts: 3,
            submit_backoff: Duration::from_secs(1),
            poll_interval: Duration::from_secs(2),
            max_consecutive_poll_failures: 5,
        }
    }
}
