//! Change detection, stability wait, consensus validation and ledger publish

pub mod alert;
pub mod clock;
pub mod consensus;
pub mod detector;
pub mod handoff;
pub mod normalize;
pub mod pipeline;
pub mod poller;
pub mod publisher;
pub mod record;
pub mod stability;

#[cfg(test)]
mod test_support;

pub use alert::{Alert, AlertSink, TracingAlertSink};
pub use clock::{Clock, ManualClock, SystemClock};
pub use consensus::{ConsensusPolicy, ConsensusValidator, Verdict};
pub use detector::{ChangeDetector, Detection};
pub use handoff::{HandoffReader, HandoffStore};
pub use normalize::{semantically_equal, Normalize};
pub use pipeline::{
    check_once, spawn_subject, ConsensusLoop, PipelineSettings, StreamNames, SyncContext,
    SyncService,
};
pub use poller::StatePoller;
pub use publisher::{LedgerPublisher, PublishOutcome};
pub use record::{AgreementRecord, RecordStage};
pub use stability::{StabilityOutcome, StabilityPolicy, StabilityState, StabilityWaiter};
