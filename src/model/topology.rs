//! Topology summary snapshot

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Device/link graph summary plus the observation timestamp
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TopologySnapshot {
    /// Observation time in controller nanoseconds; excluded from equality
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<u64>,

    #[serde(default)]
    pub devices: u64,

    #[serde(default)]
    pub links: u64,

    #[serde(default)]
    pub clusters: u64,

    #[serde(flatten)]
    pub attributes: Map<String, Value>,
}
