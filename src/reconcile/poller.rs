//! Readiness Poller
//!
//! Bounded fixed-interval wait used after asynchronous creates (LUN,
//! Snapshot). Exhausting the attempts is not an error: callers always
//! re-read the object afterwards and treat that read as authoritative.

use crate::error::{Error, Result};
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Bounds of a readiness wait
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    /// Maximum number of readiness checks
    pub max_attempts: u32,
    /// Sleep between readiness checks
    pub interval: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            interval: Duration::from_secs(1),
        }
    }
}

/// How a wait ended when the check never failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// Check reported ready on this attempt
    Ready { attempts: u32 },
    /// Every attempt reported not-ready
    Exhausted { attempts: u32 },
}

impl PollOutcome {
    pub fn attempts(&self) -> u32 {
        match self {
            PollOutcome::Ready { attempts } | PollOutcome::Exhausted { attempts } => *attempts,
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, PollOutcome::Ready { .. })
    }
}

/// Call `check` until it reports ready, fails, or the attempts run out.
///
/// The check's error is returned as-is on the attempt it occurs. There is no
/// sleep after the last attempt.
pub async fn wait_ready<F, Fut>(
    policy: &PollPolicy,
    cancel: &CancellationToken,
    mut check: F,
) -> Result<PollOutcome>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<bool>>,
{
    for attempt in 1..=policy.max_attempts {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        if check().await? {
            debug!("Ready after {} attempt(s)", attempt);
            return Ok(PollOutcome::Ready { attempts: attempt });
        }

        if attempt < policy.max_attempts {
            tokio::select! {
                _ = cancel.cancelled() => return Err(Error::Cancelled),
                _ = tokio::time::sleep(policy.interval) => {}
            }
        }
    }

    debug!("Not ready after {} attempt(s)", policy.max_attempts);
    Ok(PollOutcome::Exhausted {
        attempts: policy.max_attempts,
    })
}
