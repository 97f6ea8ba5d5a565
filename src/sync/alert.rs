//! Operator-facing alerts
//!
//! Semantic disagreements and refused payloads never crash the process but
//! must always be observable. Every such outcome goes through an
//! [`AlertSink`]; the default sink writes structured `tracing` events.

use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{error, warn};

use crate::model::{Divergence, SubjectKind};

#[derive(Clone, Debug, PartialEq)]
pub enum Alert {
    /// Primary and backup disagree after stabilization
    ConsensusFailure {
        kind: SubjectKind,
        primary: String,
        backup: String,
        origin: String,
        divergence: Divergence,
        detected_at: DateTime<Utc>,
    },
    /// Entries never reached an installed state
    StabilityTimeout {
        kind: SubjectKind,
        primary: String,
        polls: u32,
        elapsed: Duration,
        unsettled: usize,
    },
    /// Ledger unreachable or rejected the publish
    PublishFailure {
        kind: SubjectKind,
        stream: String,
        key: String,
        reason: String,
    },
    /// Payload refused before submission
    UnsafePayload {
        kind: SubjectKind,
        stream: String,
        reason: String,
    },
}

pub trait AlertSink: Send + Sync {
    fn raise(&self, alert: &Alert);
}

/// Writes alerts to the process-wide `tracing` subscriber
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingAlertSink;

impl AlertSink for TracingAlertSink {
    fn raise(&self, alert: &Alert) {
        match alert {
            Alert::ConsensusFailure {
                kind,
                primary,
                backup,
                origin,
                divergence,
                detected_at,
            } => warn!(
                kind = %kind,
                primary = %primary,
                backup = %backup,
                origin = %origin,
                reason = %divergence,
                detected_at = %detected_at.to_rfc3339(),
                "{} consensus not reached, consensus level = 0%, senderIp: {}",
                kind,
                origin
            ),
            Alert::StabilityTimeout {
                kind,
                primary,
                polls,
                elapsed,
                unsettled,
            } => error!(
                kind = %kind,
                primary = %primary,
                polls,
                unsettled,
                "{} did not stabilize within {:?}",
                kind,
                elapsed
            ),
            Alert::PublishFailure {
                kind,
                stream,
                key,
                reason,
            } => error!(
                kind = %kind,
                stream = %stream,
                key = %key,
                "Failed to publish agreed {} to the ledger: {}",
                kind,
                reason
            ),
            Alert::UnsafePayload {
                kind,
                stream,
                reason,
            } => error!(
                kind = %kind,
                stream = %stream,
                "Refused to publish {}: {}",
                kind,
                reason
            ),
        }
    }
}
