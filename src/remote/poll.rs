//! Operation polling with capped exponential backoff.

use std::fmt;
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use rebuild_protocol::{Operation, ServiceError};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::service::RemoteBuildService;

/// Polling schedule for a remote operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollPolicy {
    /// Delay before the first re-poll
    #[serde(with = "millis")]
    pub initial_delay: Duration,
    /// Upper bound for any single delay
    #[serde(with = "millis")]
    pub max_delay: Duration,
    /// Overall wall-clock limit for the wait
    #[serde(with = "millis")]
    pub timeout: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(30),
            timeout: Duration::from_secs(3 * 60 * 60),
        }
    }
}

impl PollPolicy {
    /// Delay before poll number `attempt` (1-based): `initial * 2^(attempt-1)`, capped.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.initial_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}

/// Cooperative cancellation shared between a caller and a waiting poll loop.
///
/// Cancelling wakes any thread sleeping in [`CancelToken::wait_timeout`].
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        let (flag, cvar) = &*self.inner;
        *flag.lock().unwrap_or_else(|p| p.into_inner()) = true;
        cvar.notify_all();
    }

    pub fn is_cancelled(&self) -> bool {
        *self.inner.0.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Sleep for `timeout` or until cancelled. Returns `true` if cancelled.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let (flag, cvar) = &*self.inner;
        let guard = flag.lock().unwrap_or_else(|p| p.into_inner());
        let (guard, _) = cvar
            .wait_timeout_while(guard, timeout, |cancelled| !*cancelled)
            .unwrap_or_else(|p| p.into_inner());
        *guard
    }
}

/// Why a wait ended before the operation finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AbortReason {
    Cancelled,
    Timeout,
}

impl fmt::Display for AbortReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AbortReason::Cancelled => write!(f, "cancelled"),
            AbortReason::Timeout => write!(f, "timed out"),
        }
    }
}

/// Result of waiting on an operation.
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    /// The operation reported `done`.
    Done(Operation),
    /// The wait was cut short; `last` is the last observed state.
    Aborted { reason: AbortReason, last: Operation },
}

/// Poll `op` until it is done, the policy times out, or `cancel` fires.
///
/// Retryable service errors are logged and polled through; others end the
/// wait with an error.
pub fn wait_for_operation(
    service: &dyn RemoteBuildService,
    mut op: Operation,
    policy: &PollPolicy,
    cancel: &CancelToken,
) -> Result<PollOutcome, ServiceError> {
    let started = Instant::now();
    let mut attempt = 0u32;
    loop {
        if op.done {
            return Ok(PollOutcome::Done(op));
        }
        if cancel.is_cancelled() {
            return Ok(PollOutcome::Aborted {
                reason: AbortReason::Cancelled,
                last: op,
            });
        }
        let elapsed = started.elapsed();
        if elapsed >= policy.timeout {
            return Ok(PollOutcome::Aborted {
                reason: AbortReason::Timeout,
                last: op,
            });
        }

        attempt += 1;
        let delay = policy.delay_for(attempt).min(policy.timeout - elapsed);
        debug!(operation = %op.name, attempt, delay_ms = delay.as_millis() as u64, "waiting for operation");
        if cancel.wait_timeout(delay) {
            return Ok(PollOutcome::Aborted {
                reason: AbortReason::Cancelled,
                last: op,
            });
        }

        match service.get_operation(&op) {
            Ok(next) => op = next,
            Err(e) if e.is_retryable() => {
                warn!(operation = %op.name, error = %e, "transient poll failure");
            }
            Err(e) => return Err(e),
        }
    }
}
