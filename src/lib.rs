//! sdn-ledger-sync: agreement gate between SDN controllers and a ledger
//!
//! Watches the state of a primary ONOS controller, waits for changes to
//! settle, checks that a backup controller holds the same state and only
//! then records it on a MultiChain stream.

pub mod config;
pub mod error;
pub mod ledger;
pub mod model;
pub mod onos;
pub mod sync;
pub mod telemetry;

pub use crate::error::{Error, Result};
