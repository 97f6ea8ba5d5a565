//! Discovered host records

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Attachment point of a host
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HostLocation {
    pub element_id: String,
    pub port: String,
}

/// A single discovered host, installed individually
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HostRecord {
    pub id: String,
    pub mac: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vlan: Option<String>,

    #[serde(default)]
    pub ip_addresses: Vec<String>,

    #[serde(default)]
    pub locations: Vec<HostLocation>,

    #[serde(flatten)]
    pub attributes: Map<String, Value>,
}

/// Every host known to one controller
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct HostSet {
    #[serde(default)]
    pub hosts: Vec<HostRecord>,
}

impl HostSet {
    pub fn new(hosts: Vec<HostRecord>) -> Self {
        Self { hosts }
    }
}
