//! Controller state snapshots
//!
//! A snapshot is one controller's view of a subject (flows, hosts or topology)
//! at one observation instant. The sync pipeline is generic over [`Snapshot`]
//! so the same detect/stabilize/validate/publish chain runs for every subject.

pub mod flows;
pub mod hosts;
pub mod topology;

use std::fmt;

use futures::future::BoxFuture;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::onos::{ControllerApi, ControllerError};
use crate::sync::normalize::Normalize;

pub use flows::{Criterion, FlowEntry, FlowSet, FlowState, Selector};
pub use hosts::{HostLocation, HostRecord, HostSet};
pub use topology::TopologySnapshot;

/// Which controller state a snapshot describes
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SubjectKind {
    Flows,
    Hosts,
    Topology,
}

impl SubjectKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubjectKind::Flows => "flows",
            SubjectKind::Hosts => "hosts",
            SubjectKind::Topology => "topology",
        }
    }

    /// Ledger stream used when none is configured
    pub fn default_stream(&self) -> &'static str {
        match self {
            SubjectKind::Flows => "sdn_flows",
            SubjectKind::Hosts => "sdn_hosts",
            SubjectKind::Topology => "sdn_topology",
        }
    }
}

impl fmt::Display for SubjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How two normalized views of the same subject differ
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Divergence {
    /// Different number of entries
    LengthMismatch { primary: usize, backup: usize },
    /// Same length, first differing entry at `index`
    EntryMismatch { index: usize },
    /// Single-document subjects that differ somewhere
    ContentMismatch,
}

impl fmt::Display for Divergence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Divergence::LengthMismatch { primary, backup } => {
                write!(f, "entry count differs (primary={primary}, backup={backup})")
            }
            Divergence::EntryMismatch { index } => write!(f, "entry {index} differs"),
            Divergence::ContentMismatch => f.write_str("content differs"),
        }
    }
}

/// A subject the pipeline can poll, compare, install and publish
pub trait Snapshot:
    Normalize + Clone + PartialEq + fmt::Debug + Serialize + DeserializeOwned + Send + Sync + 'static
{
    const KIND: SubjectKind;

    /// Whether every entry reached a terminal installed state
    fn is_settled(&self) -> bool {
        true
    }

    /// Number of entries still in a transient state
    fn unsettled(&self) -> usize {
        0
    }

    /// Read the current state from a controller
    fn fetch(api: &dyn ControllerApi) -> BoxFuture<'_, Result<Self, ControllerError>>;

    /// Push this state into a controller that lacks it
    fn install<'a>(
        api: &'a dyn ControllerApi,
        snapshot: &'a Self,
    ) -> BoxFuture<'a, Result<(), ControllerError>>;
}

impl Snapshot for FlowSet {
    const KIND: SubjectKind = SubjectKind::Flows;

    fn is_settled(&self) -> bool {
        self.pending().next().is_none()
    }

    fn unsettled(&self) -> usize {
        self.pending().count()
    }

    fn fetch(api: &dyn ControllerApi) -> BoxFuture<'_, Result<Self, ControllerError>> {
        api.get_flows()
    }

    fn install<'a>(
        api: &'a dyn ControllerApi,
        snapshot: &'a Self,
    ) -> BoxFuture<'a, Result<(), ControllerError>> {
        api.insert_flows(snapshot)
    }
}

impl Snapshot for HostSet {
    const KIND: SubjectKind = SubjectKind::Hosts;

    fn fetch(api: &dyn ControllerApi) -> BoxFuture<'_, Result<Self, ControllerError>> {
        api.get_hosts()
    }

    fn install<'a>(
        api: &'a dyn ControllerApi,
        snapshot: &'a Self,
    ) -> BoxFuture<'a, Result<(), ControllerError>> {
        api.insert_hosts(snapshot)
    }
}

impl Snapshot for TopologySnapshot {
    const KIND: SubjectKind = SubjectKind::Topology;

    fn fetch(api: &dyn ControllerApi) -> BoxFuture<'_, Result<Self, ControllerError>> {
        api.get_topology()
    }

    fn install<'a>(
        api: &'a dyn ControllerApi,
        snapshot: &'a Self,
    ) -> BoxFuture<'a, Result<(), ControllerError>> {
        api.insert_topology(snapshot)
    }
}
