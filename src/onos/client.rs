//! HTTP client for the ONOS northbound REST API

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use super::error::{ControllerError, Result};
use super::ControllerApi;
use crate::config::ControllerEndpoint;
use crate::model::{FlowSet, HostSet, TopologySnapshot};
use crate::sync::normalize::Normalize;

/// Exponential backoff: `base * 2^attempt`, capped at `max`
pub fn calculate_backoff(attempt: u32, base: Duration, max: Duration) -> Duration {
    let factor = 2_u32.saturating_pow(attempt.min(16));
    base.saturating_mul(factor).min(max)
}

/// Client for one controller instance
pub struct OnosClient {
    http_client: Client,
    base_url: String,
    username: String,
    password: String,
    app_id: String,
    max_attempts: u32,
    retry_base_delay: Duration,
}

impl OnosClient {
    pub fn new(endpoint: &ControllerEndpoint) -> Result<Self> {
        let http_client = Client::builder()
            .timeout(Duration::from_millis(endpoint.request_timeout_ms))
            .user_agent(concat!("sdn-ledger-sync/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http_client,
            base_url: endpoint.url.trim_end_matches('/').to_string(),
            username: endpoint.username.clone(),
            password: endpoint.password.clone(),
            app_id: endpoint.app_id.clone(),
            max_attempts: endpoint.max_attempts.max(1),
            retry_base_delay: Duration::from_millis(endpoint.retry_base_delay_ms),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.url(path);
        debug!("Querying {}", url);

        let response = self.retry_request(&url).await?;
        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|e| ControllerError::ParseError {
            url,
            reason: e.to_string(),
        })
    }

    async fn post_json<T: Serialize + ?Sized>(&self, url: String, body: &T) -> Result<()> {
        debug!("Submitting to {}", url);

        let response = self
            .http_client
            .post(&url)
            .basic_auth(&self.username, Some(&self.password))
            .json(body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(ControllerError::StatusError {
                url,
                status: response.status().as_u16(),
            });
        }
        Ok(())
    }

    /// GET with bounded retry and exponential backoff
    async fn retry_request(&self, url: &str) -> Result<Response> {
        let mut attempt = 0;
        let mut last_error = None;

        while attempt < self.max_attempts {
            match self
                .http_client
                .get(url)
                .basic_auth(&self.username, Some(&self.password))
                .send()
                .await
            {
                Ok(response) if response.status().is_success() => return Ok(response),
                Ok(response) => {
                    warn!(
                        "HTTP request to {} failed with status {}, attempt {}/{}",
                        url,
                        response.status(),
                        attempt + 1,
                        self.max_attempts
                    );
                    last_error = Some(ControllerError::StatusError {
                        url: url.to_string(),
                        status: response.status().as_u16(),
                    });
                }
                Err(e) => {
                    warn!(
                        "HTTP request to {} failed: {}, attempt {}/{}",
                        url,
                        e,
                        attempt + 1,
                        self.max_attempts
                    );
                    last_error = Some(ControllerError::HttpError(e));
                }
            }

            attempt += 1;
            if attempt < self.max_attempts {
                let delay = calculate_backoff(
                    attempt - 1,
                    self.retry_base_delay,
                    self.retry_base_delay.saturating_mul(8),
                );
                debug!("Retrying after {:?}", delay);
                tokio::time::sleep(delay).await;
            }
        }

        Err(last_error.unwrap_or_else(|| ControllerError::ParseError {
            url: url.to_string(),
            reason: "max retries exceeded".to_string(),
        }))
    }
}

#[async_trait]
impl ControllerApi for OnosClient {
    fn address(&self) -> &str {
        &self.base_url
    }

    async fn get_flows(&self) -> Result<FlowSet> {
        self.get_json("flows").await
    }

    async fn get_hosts(&self) -> Result<HostSet> {
        self.get_json("hosts").await
    }

    async fn get_topology(&self) -> Result<TopologySnapshot> {
        self.get_json("topology").await
    }

    async fn insert_flows(&self, flows: &FlowSet) -> Result<()> {
        let url = format!("{}?appId={}", self.url("flows"), self.app_id);
        self.post_json(url, &flows.for_insertion()).await
    }

    async fn insert_hosts(&self, hosts: &HostSet) -> Result<()> {
        for host in &hosts.for_insertion().hosts {
            self.post_json(self.url("hosts"), host).await?;
        }
        Ok(())
    }

    async fn insert_topology(&self, topology: &TopologySnapshot) -> Result<()> {
        self.post_json(self.url("topology"), &topology.for_insertion())
            .await
    }
}
