use std::sync::Mutex;
use std::time::Duration;

use tokio::time::Instant;

use crate::config::HealthConfig;

#[derive(Debug, Clone, Copy, Default)]
struct HealthState {
    consecutive_failures: u32,
    block_until: Option<Instant>,
}

/// Read-only view of the breaker state, for observability.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HealthSnapshot {
    /// Failures recorded since the last success or reset.
    pub consecutive_failures: u32,
    /// Remaining duration of the current block episode, if one is active.
    pub retry_after: Option<Duration>,
}

/// Circuit breaker guarding the remote API.
///
/// A single failure opens the breaker for a fixed block duration. That is
/// deliberately stricter than the usual "N consecutive failures" policy: it
/// contains request storms against a failing backend quickly, at the cost of
/// briefly blocking after a transient blip. While a block episode is active,
/// further failures are counted but do not push the deadline out.
pub struct HealthMonitor {
    block_time: Duration,
    state: Mutex<HealthState>,
}

impl HealthMonitor {
    pub fn new(config: &HealthConfig) -> Self {
        Self {
            block_time: config.block_time,
            state: Mutex::new(HealthState::default()),
        }
    }

    /// Records a failed request, opening the breaker if it is not already open.
    pub fn record_failure(&self) {
        let now = Instant::now();
        let mut state = self.state.lock().unwrap();

        state.consecutive_failures += 1;

        let already_blocked = state.block_until.is_some_and(|until| now < until);
        if !already_blocked {
            state.block_until = Some(now + self.block_time);
            tracing::info!(
                failures = state.consecutive_failures,
                block_time = %humantime::format_duration(self.block_time),
                "blocking api requests after failure"
            );
        }
    }

    /// Records a successful request, closing the breaker and clearing the
    /// failure count.
    pub fn record_success(&self) {
        let mut state = self.state.lock().unwrap();
        if state.consecutive_failures > 0 {
            tracing::info!(
                failures = state.consecutive_failures,
                "api recovered, resetting health state"
            );
        }
        *state = HealthState::default();
    }

    /// Manually closes the breaker, regardless of its current state.
    pub fn reset(&self) {
        *self.state.lock().unwrap() = HealthState::default();
    }

    pub fn is_available(&self) -> bool {
        self.retry_after().is_none()
    }

    /// If the breaker is open, returns how long callers have to wait.
    pub fn retry_after(&self) -> Option<Duration> {
        let state = self.state.lock().unwrap();
        let until = state.block_until?;
        let remaining = until.checked_duration_since(Instant::now())?;
        (!remaining.is_zero()).then_some(remaining)
    }

    pub fn snapshot(&self) -> HealthSnapshot {
        let now = Instant::now();
        let state = self.state.lock().unwrap();
        let retry_after = state
            .block_until
            .and_then(|until| until.checked_duration_since(now))
            .filter(|remaining| !remaining.is_zero());

        HealthSnapshot {
            consecutive_failures: state.consecutive_failures,
            retry_after,
        }
    }
}
