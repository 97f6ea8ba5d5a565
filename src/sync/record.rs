//! Agreement records
//!
//! A record is created when a change is detected and carries the subject
//! through the stability and consensus stages. It is only logged on its
//! terminal outcome, never persisted.

use std::fmt;

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::model::{Snapshot, SubjectKind};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RecordStage {
    StabilityWait,
    ConsensusCheck,
    Publishing,
    // terminal
    Published,
    Duplicate,
    ConsensusFailed,
    TimedOut,
    QueryFailed,
    PublishFailed,
    Cancelled,
}

impl RecordStage {
    pub fn is_terminal(&self) -> bool {
        !matches!(
            self,
            RecordStage::StabilityWait | RecordStage::ConsensusCheck | RecordStage::Publishing
        )
    }

    /// Only these outcomes mean the agreed state reached the ledger
    pub fn is_committed(&self) -> bool {
        matches!(self, RecordStage::Published | RecordStage::Duplicate)
    }
}

impl fmt::Display for RecordStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RecordStage::StabilityWait => "STABILITY_WAIT",
            RecordStage::ConsensusCheck => "CONSENSUS_CHECK",
            RecordStage::Publishing => "PUBLISHING",
            RecordStage::Published => "PUBLISHED",
            RecordStage::Duplicate => "DUPLICATE",
            RecordStage::ConsensusFailed => "CONSENSUS_FAILED",
            RecordStage::TimedOut => "TIMED_OUT",
            RecordStage::QueryFailed => "QUERY_FAILED",
            RecordStage::PublishFailed => "PUBLISH_FAILED",
            RecordStage::Cancelled => "CANCELLED",
        };
        f.write_str(s)
    }
}

#[derive(Clone, Debug)]
pub struct AgreementRecord<S> {
    pub kind: SubjectKind,
    /// Latest working snapshot; the stabilized one once past the wait
    pub subject: S,
    pub primary: String,
    pub backup: String,
    pub stage: RecordStage,
    pub detected_at: DateTime<Utc>,
    pub stabilized_at: Option<DateTime<Utc>>,
    pub checked_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl<S: Snapshot> AgreementRecord<S> {
    pub fn new(subject: S, primary: &str, backup: &str, detected_at: DateTime<Utc>) -> Self {
        Self {
            kind: S::KIND,
            subject,
            primary: primary.to_string(),
            backup: backup.to_string(),
            stage: RecordStage::StabilityWait,
            detected_at,
            stabilized_at: None,
            checked_at: None,
            finished_at: None,
        }
    }

    pub fn mark_stable(&mut self, subject: S, at: DateTime<Utc>) {
        self.subject = subject;
        self.stabilized_at = Some(at);
        self.stage = RecordStage::ConsensusCheck;
    }

    pub fn mark_agreed(&mut self, at: DateTime<Utc>) {
        self.checked_at = Some(at);
        self.stage = RecordStage::Publishing;
    }

    pub fn finish(&mut self, stage: RecordStage, at: DateTime<Utc>) {
        debug_assert!(stage.is_terminal());
        if stage == RecordStage::ConsensusFailed {
            self.checked_at.get_or_insert(at);
        }
        self.stage = stage;
        self.finished_at = Some(at);
    }

    /// Milliseconds from detection to `at`
    fn since_detection(&self, at: Option<DateTime<Utc>>) -> Option<i64> {
        at.map(|t| (t - self.detected_at).num_milliseconds())
    }

    /// Emit the terminal summary with stage timings
    pub fn log_summary(&self) {
        let stabilized_ms = self.since_detection(self.stabilized_at);
        let checked_ms = self.since_detection(self.checked_at);
        let finished_ms = self.since_detection(self.finished_at);

        if self.stage.is_committed() {
            info!(
                kind = %self.kind,
                stage = %self.stage,
                stabilized_ms,
                checked_ms,
                finished_ms,
                "{} change committed",
                self.kind
            );
        } else {
            warn!(
                kind = %self.kind,
                stage = %self.stage,
                stabilized_ms,
                checked_ms,
                finished_ms,
                "{} change dropped",
                self.kind
            );
        }
    }
}
