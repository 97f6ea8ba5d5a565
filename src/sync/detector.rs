//! Change detection against the last accepted snapshot

use chrono::{DateTime, Utc};

use super::handoff::HandoffReader;
use super::normalize::Normalize;
use crate::model::Snapshot;

#[derive(Clone, Debug, PartialEq)]
pub enum Detection<S> {
    Idle,
    Changed { snapshot: S, detected_at: DateTime<Utc> },
}

/// Reacts to the latest staged state only, never to every intermediate one
pub struct ChangeDetector<S> {
    reader: HandoffReader<S>,
    accepted: Option<S>,
    /// Change to re-report when nothing newer was staged
    retry: Option<S>,
}

impl<S: Snapshot> ChangeDetector<S> {
    pub fn new(reader: HandoffReader<S>, baseline: Option<S>) -> Self {
        Self {
            reader,
            accepted: baseline.map(|s| s.normalized()),
            retry: None,
        }
    }

    pub fn accepted(&self) -> Option<&S> {
        self.accepted.as_ref()
    }

    /// Replace the accepted snapshot, e.g. with its stabilized successor
    pub fn accept(&mut self, snapshot: &S) {
        self.accepted = Some(snapshot.normalized());
    }

    /// Report `snapshot` again on the next check unless a newer state is
    /// staged first
    pub fn retry(&mut self, snapshot: &S) {
        self.retry = Some(snapshot.normalized());
    }

    pub fn check(&mut self, now: DateTime<Utc>) -> Detection<S> {
        if let Some(latest) = self.reader.take_if_changed() {
            let latest = latest.normalized();
            if self.accepted.as_ref() != Some(&latest) {
                self.retry = None;
                self.accepted = Some(latest.clone());
                return Detection::Changed {
                    snapshot: latest,
                    detected_at: now,
                };
            }
        }

        match self.retry.take() {
            Some(snapshot) => Detection::Changed {
                snapshot,
                detected_at: now,
            },
            None => Detection::Idle,
        }
    }
}
