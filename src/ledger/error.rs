//! Error types for ledger publishing

use thiserror::Error;

#[derive(Error, Debug)]
pub enum LedgerError {
    /// Ledger node unreachable
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    /// Ledger node answered with a non-2xx status and no RPC error body
    #[error("ledger RPC returned HTTP {status}")]
    StatusError { status: u16 },

    /// Ledger rejected the call
    #[error("ledger RPC error {code}: {message}")]
    RpcError { code: i64, message: String },

    #[error("unexpected ledger response: {0}")]
    UnexpectedResponse(String),
}

/// Reasons a payload is refused before any network call
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PayloadError {
    #[error("payload cannot be represented as JSON: {0}")]
    Unserializable(String),

    #[error("payload nesting exceeds {limit} levels")]
    TooDeep { limit: usize },

    #[error("payload is {size} bytes, limit is {limit}")]
    TooLarge { size: usize, limit: usize },
}
