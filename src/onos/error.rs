//! Error types for controller queries

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ControllerError {
    /// HTTP request to the controller failed
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    /// Controller answered with a non-2xx status
    #[error("{url} returned HTTP {status}")]
    StatusError { url: String, status: u16 },

    /// Response body did not match the expected shape
    #[error("Failed to parse response from {url}: {reason}")]
    ParseError { url: String, reason: String },
}

pub type Result<T> = std::result::Result<T, ControllerError>;
