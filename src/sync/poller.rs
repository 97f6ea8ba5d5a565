//! Fast loop: poll one controller into the handoff store

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::handoff::HandoffStore;
use super::normalize::Normalize;
use crate::error::Result;
use crate::model::Snapshot;
use crate::onos::ControllerApi;

pub struct StatePoller<S> {
    controller: Arc<dyn ControllerApi>,
    store: Arc<HandoffStore<S>>,
    interval: Duration,
}

impl<S: Snapshot> StatePoller<S> {
    pub fn new(
        controller: Arc<dyn ControllerApi>,
        store: Arc<HandoffStore<S>>,
        interval: Duration,
    ) -> Self {
        Self {
            controller,
            store,
            interval,
        }
    }

    /// Fetch, normalize and stage if different from the last write.
    ///
    /// Returns whether the store was updated.
    pub async fn poll_once(&self) -> Result<bool> {
        let snapshot = S::fetch(self.controller.as_ref()).await?.normalized();
        self.store.stage(snapshot).await
    }

    pub async fn run(self, cancel: CancellationToken) {
        info!(
            "Starting {} poller for {} every {:?}",
            S::KIND,
            self.controller.address(),
            self.interval
        );

        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut consecutive_failures = 0u32;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let polled = tokio::select! {
                _ = cancel.cancelled() => break,
                polled = self.poll_once() => polled,
            };

            match polled {
                Ok(changed) => {
                    if consecutive_failures > 0 {
                        info!(
                            "{} poller recovered after {} failed attempts",
                            S::KIND,
                            consecutive_failures
                        );
                    }
                    consecutive_failures = 0;
                    if changed {
                        debug!("{} state changed on {}", S::KIND, self.controller.address());
                    }
                }
                Err(e) => {
                    consecutive_failures += 1;
                    warn!(
                        "{} poll of {} failed ({} in a row), skipping iteration: {}",
                        S::KIND,
                        self.controller.address(),
                        consecutive_failures,
                        e
                    );
                }
            }
        }

        info!("{} poller stopped", S::KIND);
    }
}
