//! Pairwise agreement check against the backup controller
//!
//! This is the only gate between a detected change and the ledger: a
//! snapshot is forwarded for publishing only when the backup's normalized
//! view is structurally equal to the primary's stabilized one.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::normalize::Normalize;
use crate::model::{Divergence, Snapshot};
use crate::onos::{ControllerApi, ControllerError};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ConsensusPolicy {
    /// Wait before re-fetching the backup after a disagreement
    pub recheck_delay: Duration,
    /// Extra backup fetches allowed to absorb propagation lag
    pub max_rechecks: u32,
}

impl Default for ConsensusPolicy {
    fn default() -> Self {
        Self {
            recheck_delay: Duration::from_secs(1),
            max_rechecks: 1,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Verdict<S> {
    /// Views agree; `agreed` is the primary's normalized snapshot
    Agreement { agreed: S },
    /// Views differ after every allowed re-check
    Disagreement { backup: S, divergence: Divergence },
    Cancelled,
}

impl<S> Verdict<S> {
    pub fn is_agreement(&self) -> bool {
        matches!(self, Verdict::Agreement { .. })
    }
}

pub struct ConsensusValidator {
    backup: Arc<dyn ControllerApi>,
    policy: ConsensusPolicy,
}

impl ConsensusValidator {
    pub fn new(backup: Arc<dyn ControllerApi>, policy: ConsensusPolicy) -> Self {
        Self { backup, policy }
    }

    pub fn backup(&self) -> &Arc<dyn ControllerApi> {
        &self.backup
    }

    /// Compare the primary's stabilized snapshot with the backup's view.
    ///
    /// A backup fetch failure is returned as an error, not a disagreement.
    pub async fn validate<S: Snapshot>(
        &self,
        primary: &S,
        cancel: &CancellationToken,
    ) -> Result<Verdict<S>, ControllerError> {
        let primary = primary.normalized();
        let mut attempt = 0u32;

        loop {
            let fetched = tokio::select! {
                _ = cancel.cancelled() => return Ok(Verdict::Cancelled),
                fetched = S::fetch(self.backup.as_ref()) => fetched?,
            };
            let backup = fetched.normalized();

            let Some(divergence) = primary.divergence(&backup) else {
                if attempt > 0 {
                    info!(
                        "{} views converged on re-check {} against {}",
                        S::KIND,
                        attempt,
                        self.backup.address()
                    );
                }
                return Ok(Verdict::Agreement { agreed: primary });
            };

            if attempt >= self.policy.max_rechecks {
                return Ok(Verdict::Disagreement { backup, divergence });
            }

            attempt += 1;
            debug!(
                "{} views differ ({}), re-checking {} in {:?}",
                S::KIND,
                divergence,
                self.backup.address(),
                self.policy.recheck_delay
            );

            tokio::select! {
                _ = cancel.cancelled() => return Ok(Verdict::Cancelled),
                _ = sleep(self.policy.recheck_delay) => {}
            }
        }
    }
}
