//! Stability wait
//!
//! A flow that is still being installed is not a valid object of
//! cross-controller comparison. After a change is detected the primary is
//! re-polled until every entry is installed, or until the wait bound is hit.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::normalize::Normalize;
use crate::model::Snapshot;
use crate::onos::ControllerApi;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StabilityState {
    Stable,
    TimedOut,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StabilityPolicy {
    pub poll_interval: Duration,
    /// Upper bound on elapsed time since the wait started
    pub max_wait: Duration,
    /// Upper bound on re-polls
    pub max_polls: u32,
}

impl Default for StabilityPolicy {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            max_wait: Duration::from_secs(60),
            max_polls: 120,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum StabilityOutcome<S> {
    Stable { snapshot: S, polls: u32 },
    TimedOut { last: S, polls: u32, elapsed: Duration },
    Cancelled,
}

impl<S> StabilityOutcome<S> {
    pub fn state(&self) -> Option<StabilityState> {
        match self {
            StabilityOutcome::Stable { .. } => Some(StabilityState::Stable),
            StabilityOutcome::TimedOut { .. } => Some(StabilityState::TimedOut),
            StabilityOutcome::Cancelled => None,
        }
    }
}

pub struct StabilityWaiter {
    primary: Arc<dyn ControllerApi>,
    policy: StabilityPolicy,
}

impl StabilityWaiter {
    pub fn new(primary: Arc<dyn ControllerApi>, policy: StabilityPolicy) -> Self {
        Self { primary, policy }
    }

    /// Re-poll the primary until `snapshot` has no transient entries.
    ///
    /// A failed re-poll keeps the previous working snapshot and counts
    /// against the bound like any other poll.
    pub async fn wait<S: Snapshot>(
        &self,
        snapshot: S,
        cancel: &CancellationToken,
    ) -> StabilityOutcome<S> {
        let started = Instant::now();
        let mut current = snapshot.normalized();
        let mut polls = 0u32;

        loop {
            if current.is_settled() {
                return StabilityOutcome::Stable {
                    snapshot: current,
                    polls,
                };
            }

            let elapsed = started.elapsed();
            if polls >= self.policy.max_polls || elapsed >= self.policy.max_wait {
                return StabilityOutcome::TimedOut {
                    last: current,
                    polls,
                    elapsed,
                };
            }

            debug!(
                "{} entries of {} still pending on {}, waiting",
                current.unsettled(),
                S::KIND,
                self.primary.address()
            );

            tokio::select! {
                _ = cancel.cancelled() => return StabilityOutcome::Cancelled,
                _ = sleep(self.policy.poll_interval) => {}
            }

            polls += 1;
            let fetched = tokio::select! {
                _ = cancel.cancelled() => return StabilityOutcome::Cancelled,
                fetched = S::fetch(self.primary.as_ref()) => fetched,
            };

            match fetched {
                Ok(next) => current = next.normalized(),
                Err(e) => warn!(
                    "Re-poll {} of {} during stability wait failed: {}",
                    polls,
                    S::KIND,
                    e
                ),
            }
        }
    }
}
