//! Controller query interface
//!
//! The pipeline only talks to controllers through [`ControllerApi`]. The
//! production implementation is [`OnosClient`], an authenticated REST client
//! for the ONOS northbound API.

pub mod client;
pub mod error;

use async_trait::async_trait;

use crate::model::{FlowSet, HostSet, TopologySnapshot};

pub use client::{calculate_backoff, OnosClient};
pub use error::ControllerError;

/// Read and write access to one controller instance
#[async_trait]
pub trait ControllerApi: Send + Sync {
    /// Address used to identify this controller in logs and alerts
    fn address(&self) -> &str;

    async fn get_flows(&self) -> error::Result<FlowSet>;

    async fn get_hosts(&self) -> error::Result<HostSet>;

    async fn get_topology(&self) -> error::Result<TopologySnapshot>;

    /// Install flows; implementations submit the insertion projection
    async fn insert_flows(&self, flows: &FlowSet) -> error::Result<()>;

    /// Install hosts one at a time
    async fn insert_hosts(&self, hosts: &HostSet) -> error::Result<()>;

    async fn insert_topology(&self, topology: &TopologySnapshot) -> error::Result<()>;
}
