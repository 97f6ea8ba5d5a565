//! JSON-safety gate for ledger payloads
//!
//! A payload is safe when it is, recursively, null, a boolean, a number, a
//! string, a sequence of safe values or a string-keyed mapping of safe values.
//! Anything that cannot be encoded that way (for example a map keyed by
//! tuples) is refused here, before the ledger client is ever called. Safe
//! values must also stay within a nesting depth and encoded size that JSON-RPC
//! nodes accept.

use serde::Serialize;
use serde_json::{json, Value};

use super::error::PayloadError;

/// Deepest nesting accepted; JSON-RPC servers commonly refuse beyond 128
pub const MAX_PAYLOAD_DEPTH: usize = 64;

/// Default cap on the encoded payload size
pub const DEFAULT_MAX_PAYLOAD_BYTES: usize = 8 * 1024 * 1024;

/// Nesting depth of a JSON value; scalars are depth 0
fn depth(value: &Value) -> usize {
    match value {
        Value::Array(items) => 1 + items.iter().map(depth).max().unwrap_or(0),
        Value::Object(map) => 1 + map.values().map(depth).max().unwrap_or(0),
        _ => 0,
    }
}

/// Whether an already-encoded value nests no deeper than [`MAX_PAYLOAD_DEPTH`]
pub fn within_depth_limit(value: &Value) -> bool {
    depth(value) <= MAX_PAYLOAD_DEPTH
}

/// Encode a payload as `{"json": <value>}`, failing fast if it is unsafe
pub fn encode_payload<T: Serialize + ?Sized>(
    payload: &T,
    max_bytes: usize,
) -> Result<Value, PayloadError> {
    let value =
        serde_json::to_value(payload).map_err(|e| PayloadError::Unserializable(e.to_string()))?;

    let wrapped = json!({ "json": value });
    if !within_depth_limit(&wrapped) {
        return Err(PayloadError::TooDeep {
            limit: MAX_PAYLOAD_DEPTH,
        });
    }

    let size = serde_json::to_vec(&wrapped)
        .map_err(|e| PayloadError::Unserializable(e.to_string()))?
        .len();
    if size > max_bytes {
        return Err(PayloadError::TooLarge {
            size,
            limit: max_bytes,
        });
    }

    Ok(wrapped)
}
