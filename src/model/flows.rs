//! Flow rule data structures as reported by the controller REST API

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Installation status of a flow rule
///
/// Unknown states reported by newer controllers are kept verbatim so they
/// survive a round trip and still count as not installed.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum FlowState {
    #[default]
    Pending,
    PendingAdd,
    Added,
    PendingRemove,
    Removed,
    Failed,
    Other(String),
}

impl FlowState {
    pub fn as_str(&self) -> &str {
        match self {
            FlowState::Pending => "PENDING",
            FlowState::PendingAdd => "PENDING_ADD",
            FlowState::Added => "ADDED",
            FlowState::PendingRemove => "PENDING_REMOVE",
            FlowState::Removed => "REMOVED",
            FlowState::Failed => "FAILED",
            FlowState::Other(s) => s,
        }
    }

    /// Only `ADDED` is a terminal installed state
    pub fn is_installed(&self) -> bool {
        matches!(self, FlowState::Added)
    }
}

impl From<String> for FlowState {
    fn from(s: String) -> Self {
        match s.as_str() {
            "PENDING" => FlowState::Pending,
            "PENDING_ADD" => FlowState::PendingAdd,
            "ADDED" => FlowState::Added,
            "PENDING_REMOVE" => FlowState::PendingRemove,
            "REMOVED" => FlowState::Removed,
            "FAILED" => FlowState::Failed,
            _ => FlowState::Other(s),
        }
    }
}

impl From<FlowState> for String {
    fn from(state: FlowState) -> Self {
        state.as_str().to_string()
    }
}

impl fmt::Display for FlowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One match predicate, e.g. `{"type": "ETH_DST", "mac": "aa:bb:cc:dd:ee:ff"}`
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Criterion {
    #[serde(rename = "type")]
    pub kind: String,

    /// Type-specific value fields (`mac`, `port`, `ethType`, ...)
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

/// Ordered set of match predicates
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Selector {
    #[serde(default)]
    pub criteria: Vec<Criterion>,
}

/// A single forwarding rule
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowEntry {
    /// Controller-assigned identifier, differs between replicas
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table_id: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_id: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,

    pub state: FlowState,

    #[serde(default)]
    pub selector: Selector,

    /// Action set, kept as reported
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub treatment: Value,

    // Volatile counters, never part of equality decisions
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub life: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub packets: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bytes: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_seen: Option<u64>,

    /// Remaining attributes (`priority`, `appId`, `isPermanent`, ...)
    #[serde(flatten)]
    pub attributes: Map<String, Value>,
}

impl FlowEntry {
    /// Find the first criterion of the given type
    pub fn criterion(&self, kind: &str) -> Option<&Criterion> {
        self.selector.criteria.iter().find(|c| c.kind == kind)
    }
}

/// All flow rules of one controller at one observation instant
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FlowSet {
    #[serde(default)]
    pub flows: Vec<FlowEntry>,
}

impl FlowSet {
    pub fn new(flows: Vec<FlowEntry>) -> Self {
        Self { flows }
    }

    pub fn len(&self) -> usize {
        self.flows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flows.is_empty()
    }

    /// Entries that have not reached `ADDED` yet
    pub fn pending(&self) -> impl Iterator<Item = &FlowEntry> {
        self.flows.iter().filter(|f| !f.state.is_installed())
    }
}
