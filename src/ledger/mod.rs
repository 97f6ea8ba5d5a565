//! Ledger publish interface
//!
//! Agreed state is committed to an append-only stream on a shared ledger.
//! This crate does not implement ledger consensus; it only submits values
//! through [`Ledger`]. [`MultiChainLedger`] is the JSON-RPC implementation.

pub mod error;
pub mod multichain;
pub mod payload;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use error::{LedgerError, PayloadError};
pub use multichain::MultiChainLedger;
pub use payload::{
    encode_payload, within_depth_limit, DEFAULT_MAX_PAYLOAD_BYTES, MAX_PAYLOAD_DEPTH,
};

/// Transaction receipt returned by the ledger
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishReceipt {
    pub txid: String,
}

#[async_trait]
pub trait Ledger: Send + Sync {
    /// Append `payload` to `stream` under `key`
    async fn publish(
        &self,
        stream: &str,
        key: &str,
        payload: &Value,
    ) -> Result<PublishReceipt, LedgerError>;
}
