//! Runtime configuration
//!
//! Loaded from an optional TOML file; every field has a default matching the
//! reference two-controller lab deployment. The binary then applies CLI and
//! environment overrides on top.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::ledger::DEFAULT_MAX_PAYLOAD_BYTES;
use crate::model::SubjectKind;
use crate::sync::consensus::ConsensusPolicy;
use crate::sync::pipeline::{PipelineSettings, StreamNames};
use crate::sync::stability::StabilityPolicy;

/// Connection settings for one controller
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct ControllerEndpoint {
    /// Base URL of the northbound API, e.g. `http://10.0.0.1:8181/onos/v1`
    pub url: String,
    pub username: String,
    #[serde(skip_serializing)]
    pub password: String,
    /// Application id used when installing flows
    pub app_id: String,
    pub request_timeout_ms: u64,
    /// Attempts per read, including the first
    pub max_attempts: u32,
    pub retry_base_delay_ms: u64,
}

impl Default for ControllerEndpoint {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:8181/onos/v1".to_string(),
            username: "onos".to_string(),
            password: "rocks".to_string(),
            app_id: "org.onosproject.core".to_string(),
            request_timeout_ms: 5_000,
            max_attempts: 3,
            retry_base_delay_ms: 200,
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct LedgerConfig {
    pub rpc_url: String,
    pub rpc_user: String,
    #[serde(skip_serializing)]
    pub rpc_password: String,
    pub chain_name: String,
    /// Application key every publish is filed under
    pub key: String,
    pub flows_stream: String,
    pub hosts_stream: String,
    pub topology_stream: String,
    pub max_payload_bytes: usize,
    pub request_timeout_ms: u64,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            rpc_url: "http://127.0.0.1:6746".to_string(),
            rpc_user: "multichainrpc".to_string(),
            rpc_password: String::new(),
            chain_name: "chain_sdn1".to_string(),
            key: "key1".to_string(),
            flows_stream: SubjectKind::Flows.default_stream().to_string(),
            hosts_stream: SubjectKind::Hosts.default_stream().to_string(),
            topology_stream: SubjectKind::Topology.default_stream().to_string(),
            max_payload_bytes: DEFAULT_MAX_PAYLOAD_BYTES,
            request_timeout_ms: 10_000,
        }
    }
}

/// Loop cadences and bounds, all in milliseconds
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct TimingConfig {
    /// Fast loop: controller poll into the handoff store
    pub poll_interval_ms: u64,
    /// Slow loop: handoff check and the validation pipeline
    pub check_interval_ms: u64,
    pub stability_poll_interval_ms: u64,
    pub stability_max_wait_ms: u64,
    pub stability_max_polls: u32,
    /// Delay before re-fetching the backup after a disagreement
    pub consensus_recheck_delay_ms: u64,
    /// 0 disables the re-check
    pub consensus_max_rechecks: u32,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 100,
            check_interval_ms: 1_000,
            stability_poll_interval_ms: 1_000,
            stability_max_wait_ms: 60_000,
            stability_max_polls: 120,
            consensus_recheck_delay_ms: 1_000,
            consensus_max_rechecks: 1,
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct SyncConfig {
    /// Identity reported in alerts; host name when unset
    pub origin: Option<String>,
    pub subjects: Vec<SubjectKind>,
    pub primary: ControllerEndpoint,
    pub backup: ControllerEndpoint,
    pub ledger: LedgerConfig,
    pub timing: TimingConfig,
    /// Push the primary's state to the backup after a disagreement
    pub reconcile_on_disagreement: bool,
    /// Directory for the handoff file mirrors; in-memory only when unset
    pub handoff_dir: Option<PathBuf>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            origin: None,
            subjects: vec![SubjectKind::Flows],
            primary: ControllerEndpoint {
                url: "http://192.168.1.39:8181/onos/v1".to_string(),
                ..Default::default()
            },
            backup: ControllerEndpoint {
                url: "http://192.168.1.40:8181/onos/v1".to_string(),
                ..Default::default()
            },
            ledger: LedgerConfig::default(),
            timing: TimingConfig::default(),
            reconcile_on_disagreement: false,
            handoff_dir: None,
        }
    }
}

impl SyncConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        toml::from_str(raw).map_err(|e| Error::ConfigError(format!("invalid config: {e}")))
    }

    /// Load from `path`, or defaults when no path is given
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path).map_err(|e| {
                    Error::ConfigError(format!("cannot read {}: {e}", path.display()))
                })?;
                Self::from_toml_str(&raw)
            }
            None => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<()> {
        let t = &self.timing;
        let intervals = [
            ("poll_interval_ms", t.poll_interval_ms),
            ("check_interval_ms", t.check_interval_ms),
            ("stability_poll_interval_ms", t.stability_poll_interval_ms),
            ("stability_max_wait_ms", t.stability_max_wait_ms),
        ];
        if let Some((name, _)) = intervals.iter().find(|(_, v)| *v == 0) {
            return Err(Error::ConfigError(format!("timing.{name} must be > 0")));
        }
        if t.stability_max_polls == 0 {
            return Err(Error::ConfigError(
                "timing.stability_max_polls must be > 0".to_string(),
            ));
        }
        if self.primary.url.is_empty() || self.backup.url.is_empty() {
            return Err(Error::ConfigError(
                "primary and backup controller URLs are required".to_string(),
            ));
        }
        if self.primary.url.trim_end_matches('/') == self.backup.url.trim_end_matches('/') {
            return Err(Error::ConfigError(
                "primary and backup must be different controllers".to_string(),
            ));
        }
        if self.subjects.is_empty() {
            return Err(Error::ConfigError("no subjects enabled".to_string()));
        }
        if self.ledger.key.is_empty() {
            return Err(Error::ConfigError("ledger.key must not be empty".to_string()));
        }
        Ok(())
    }

    /// Configured identity, falling back to the host name
    pub fn origin(&self) -> String {
        self.origin.clone().unwrap_or_else(|| {
            hostname::get()
                .ok()
                .and_then(|h| h.into_string().ok())
                .unwrap_or_else(|| "unknown-host".to_string())
        })
    }

    pub fn pipeline_settings(&self) -> PipelineSettings {
        let t = &self.timing;
        PipelineSettings {
            poll_interval: Duration::from_millis(t.poll_interval_ms),
            check_interval: Duration::from_millis(t.check_interval_ms),
            stability: StabilityPolicy {
                poll_interval: Duration::from_millis(t.stability_poll_interval_ms),
                max_wait: Duration::from_millis(t.stability_max_wait_ms),
                max_polls: t.stability_max_polls,
            },
            consensus: ConsensusPolicy {
                recheck_delay: Duration::from_millis(t.consensus_recheck_delay_ms),
                max_rechecks: t.consensus_max_rechecks,
            },
            streams: StreamNames {
                flows: self.ledger.flows_stream.clone(),
                hosts: self.ledger.hosts_stream.clone(),
                topology: self.ledger.topology_stream.clone(),
            },
            ledger_key: self.ledger.key.clone(),
            reconcile_on_disagreement: self.reconcile_on_disagreement,
            handoff_dir: self.handoff_dir.clone(),
        }
    }
}
