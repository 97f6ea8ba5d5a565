//! Error types for the sync pipeline
//!
//! Every failure the pipeline can observe maps onto one of the variants below.
//! Transient controller failures are recovered inside the loops; consensus
//! and payload failures always surface through an alert.

use std::time::Duration;

use thiserror::Error;

use crate::ledger::{LedgerError, PayloadError};
use crate::model::{Divergence, SubjectKind};
use crate::onos::ControllerError;

#[derive(Error, Debug)]
pub enum Error {
    /// Controller unreachable or answered with a non-2xx status
    #[error("Controller query failed: {0}")]
    QueryFailure(#[from] ControllerError),

    /// Flows never reached a terminal installed state within the bound
    #[error("{kind} did not stabilize after {polls} re-polls ({elapsed:?})")]
    StabilityTimeout {
        kind: SubjectKind,
        polls: u32,
        elapsed: Duration,
    },

    /// Primary and backup controllers disagree on the subject
    #[error("{kind} consensus not reached between {primary} and {backup}: {divergence}")]
    ConsensusFailure {
        kind: SubjectKind,
        primary: String,
        backup: String,
        divergence: Divergence,
    },

    /// Ledger unreachable or rejected the publish call
    #[error("Ledger publish failed: {0}")]
    PublishFailure(#[from] LedgerError),

    /// Payload failed the JSON-safety check and was never submitted
    #[error("Unsafe ledger payload: {0}")]
    UnsafePayload(#[from] PayloadError),

    /// Shut down before the operation finished
    #[error("Operation cancelled")]
    Cancelled,

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
