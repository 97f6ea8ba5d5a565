//! In-memory collaborators for pipeline unit tests

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::{json, Value};

use super::alert::{Alert, AlertSink};
use crate::ledger::{Ledger, LedgerError, PublishReceipt};
use crate::model::{FlowSet, HostSet, TopologySnapshot};
use crate::onos::error::Result;
use crate::onos::{ControllerApi, ControllerError};

/// Build a flow set from `(state, ETH_DST mac, life)` triples
pub fn flow_set(entries: &[(&str, &str, u64)]) -> FlowSet {
    let flows: Vec<Value> = entries
        .iter()
        .enumerate()
        .map(|(i, (state, mac, life))| {
            json!({
                "id": format!("{}", i + 1),
                "deviceId": "of:0000000000000001",
                "state": state,
                "life": life,
                "packets": life * 2,
                "selector": {"criteria": [{"type": "ETH_DST", "mac": mac}]}
            })
        })
        .collect();
    serde_json::from_value(json!({ "flows": flows })).unwrap()
}

/// Build a host set from `(mac, ip)` pairs attached to switch 1
pub fn host_set(entries: &[(&str, &str)]) -> HostSet {
    let hosts: Vec<Value> = entries
        .iter()
        .enumerate()
        .map(|(i, (mac, ip))| {
            json!({
                "id": format!("{mac}/None"),
                "mac": mac,
                "vlan": "None",
                "ipAddresses": [ip],
                "locations": [{"elementId": "of:0000000000000001", "port": format!("{}", i + 1)}]
            })
        })
        .collect();
    serde_json::from_value(json!({ "hosts": hosts })).unwrap()
}

/// Replies from a queue; the last reply repeats once the queue drains
struct Script<T> {
    replies: VecDeque<std::result::Result<T, u16>>,
    fetches: usize,
}

impl<T: Clone> Script<T> {
    fn new() -> Self {
        Self {
            replies: VecDeque::new(),
            fetches: 0,
        }
    }

    fn next(&mut self, url: &str) -> Result<T> {
        self.fetches += 1;
        let reply = if self.replies.len() > 1 {
            self.replies.pop_front()
        } else {
            self.replies.front().cloned()
        };
        match reply {
            Some(Ok(value)) => Ok(value),
            Some(Err(status)) => Err(ControllerError::StatusError {
                url: url.to_string(),
                status,
            }),
            None => Err(ControllerError::StatusError {
                url: url.to_string(),
                status: 404,
            }),
        }
    }
}

pub struct ScriptedController {
    address: String,
    flows: Mutex<Script<FlowSet>>,
    hosts: Mutex<Script<HostSet>>,
    topology: Mutex<Script<TopologySnapshot>>,
    inserted_flows: Mutex<Vec<FlowSet>>,
}

impl ScriptedController {
    pub fn new(address: &str) -> Self {
        Self {
            address: address.to_string(),
            flows: Mutex::new(Script::new()),
            hosts: Mutex::new(Script::new()),
            topology: Mutex::new(Script::new()),
            inserted_flows: Mutex::new(Vec::new()),
        }
    }

    /// Queue a flow reply; `Err(status)` answers with that HTTP status
    pub fn push_flows(&self, reply: std::result::Result<FlowSet, u16>) {
        self.flows.lock().unwrap().replies.push_back(reply);
    }

    pub fn push_hosts(&self, reply: std::result::Result<HostSet, u16>) {
        self.hosts.lock().unwrap().replies.push_back(reply);
    }

    pub fn push_topology(&self, reply: std::result::Result<TopologySnapshot, u16>) {
        self.topology.lock().unwrap().replies.push_back(reply);
    }

    pub fn flow_fetches(&self) -> usize {
        self.flows.lock().unwrap().fetches
    }

    pub fn host_fetches(&self) -> usize {
        self.hosts.lock().unwrap().fetches
    }

    pub fn inserted_flows(&self) -> Vec<FlowSet> {
        self.inserted_flows.lock().unwrap().clone()
    }
}

#[async_trait]
impl ControllerApi for ScriptedController {
    fn address(&self) -> &str {
        &self.address
    }

    async fn get_flows(&self) -> Result<FlowSet> {
        self.flows.lock().unwrap().next(&self.address)
    }

    async fn get_hosts(&self) -> Result<HostSet> {
        self.hosts.lock().unwrap().next(&self.address)
    }

    async fn get_topology(&self) -> Result<TopologySnapshot> {
        self.topology.lock().unwrap().next(&self.address)
    }

    async fn insert_flows(&self, flows: &FlowSet) -> Result<()> {
        use crate::sync::normalize::Normalize;
        self.inserted_flows
            .lock()
            .unwrap()
            .push(flows.for_insertion());
        Ok(())
    }

    async fn insert_hosts(&self, _hosts: &HostSet) -> Result<()> {
        Ok(())
    }

    async fn insert_topology(&self, _topology: &TopologySnapshot) -> Result<()> {
        Ok(())
    }
}

/// Ledger that records every publish call
#[derive(Default)]
pub struct RecordingLedger {
    calls: Mutex<Vec<(String, String, Value)>>,
    fail_with: Mutex<Option<String>>,
    counter: AtomicUsize,
}

impl RecordingLedger {
    pub fn failing(message: &str) -> Self {
        let ledger = Self::default();
        *ledger.fail_with.lock().unwrap() = Some(message.to_string());
        ledger
    }

    pub fn calls(&self) -> Vec<(String, String, Value)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Ledger for RecordingLedger {
    async fn publish(
        &self,
        stream: &str,
        key: &str,
        payload: &Value,
    ) -> std::result::Result<PublishReceipt, LedgerError> {
        if let Some(message) = self.fail_with.lock().unwrap().clone() {
            return Err(LedgerError::RpcError { code: -1, message });
        }
        self.calls
            .lock()
            .unwrap()
            .push((stream.to_string(), key.to_string(), payload.clone()));
        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        Ok(PublishReceipt {
            txid: format!("tx{n}"),
        })
    }
}

#[derive(Default)]
pub struct RecordingAlerts {
    alerts: Mutex<Vec<Alert>>,
}

impl RecordingAlerts {
    pub fn alerts(&self) -> Vec<Alert> {
        self.alerts.lock().unwrap().clone()
    }
}

impl AlertSink for RecordingAlerts {
    fn raise(&self, alert: &Alert) {
        self.alerts.lock().unwrap().push(alert.clone());
    }
}
