//! Commits agreed snapshots to the ledger
//!
//! Payloads are checked for JSON safety before the ledger is contacted.
//! Publishing is idempotent per `(stream, key, content hash)`: republishing
//! the exact payload that was last committed under a stream and key is
//! skipped.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::Result;
use crate::ledger::{encode_payload, Ledger, PublishReceipt};
use crate::model::Snapshot;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PublishOutcome {
    Published(PublishReceipt),
    /// Identical content was already the last commit for this stream and key
    Duplicate { content_hash: String },
}

pub struct LedgerPublisher {
    ledger: Arc<dyn Ledger>,
    max_payload_bytes: usize,
    last_published: Mutex<HashMap<(String, String), String>>,
}

fn content_hash(payload: &Value) -> Result<String> {
    let bytes = serde_json::to_vec(payload)?;
    Ok(hex::encode(Sha256::digest(&bytes)))
}

impl LedgerPublisher {
    pub fn new(ledger: Arc<dyn Ledger>, max_payload_bytes: usize) -> Self {
        Self {
            ledger,
            max_payload_bytes,
            last_published: Mutex::new(HashMap::new()),
        }
    }

    pub async fn publish<S: Snapshot>(
        &self,
        stream: &str,
        key: &str,
        snapshot: &S,
    ) -> Result<PublishOutcome> {
        let payload = encode_payload(snapshot, self.max_payload_bytes)?;
        let hash = content_hash(&payload)?;
        let slot = (stream.to_string(), key.to_string());

        // Held across the call so concurrent publishers of one stream serialize
        let mut last = self.last_published.lock().await;
        if last.get(&slot) == Some(&hash) {
            debug!("{} payload {} already on {}, skipping", S::KIND, hash, stream);
            return Ok(PublishOutcome::Duplicate { content_hash: hash });
        }

        let receipt = self.ledger.publish(stream, key, &payload).await?;
        info!(
            "{} posted to ledger stream {} (key {}, txid {})",
            S::KIND,
            stream,
            key,
            receipt.txid
        );
        last.insert(slot, hash);
        Ok(PublishOutcome::Published(receipt))
    }
}
