//! MultiChain JSON-RPC client

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use super::error::LedgerError;
use super::{Ledger, PublishReceipt};
use crate::config::LedgerConfig;

#[derive(Debug, Deserialize)]
struct RpcError {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcError>,
}

/// Publishes stream items through a MultiChain node's RPC port
pub struct MultiChainLedger {
    http_client: Client,
    rpc_url: String,
    rpc_user: String,
    rpc_password: String,
    chain_name: String,
    next_id: AtomicU64,
}

impl MultiChainLedger {
    pub fn new(config: &LedgerConfig) -> Result<Self, LedgerError> {
        let http_client = Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()?;

        Ok(Self {
            http_client,
            rpc_url: config.rpc_url.clone(),
            rpc_user: config.rpc_user.clone(),
            rpc_password: config.rpc_password.clone(),
            chain_name: config.chain_name.clone(),
            next_id: AtomicU64::new(1),
        })
    }

    async fn call(&self, method: &str, params: Value) -> Result<Value, LedgerError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({
            "method": method,
            "params": params,
            "id": id,
            "chain_name": self.chain_name,
        });

        debug!("Calling ledger RPC {} (id {})", method, id);

        let response = self
            .http_client
            .post(&self.rpc_url)
            .basic_auth(&self.rpc_user, Some(&self.rpc_password))
            .json(&body)
            .send()
            .await?;

        // MultiChain reports RPC errors with a 500 status and an error body
        let status = response.status();
        let text = response.text().await?;
        let parsed: Option<RpcResponse> = serde_json::from_str(&text).ok();

        match parsed {
            Some(RpcResponse {
                error: Some(err), ..
            }) => Err(LedgerError::RpcError {
                code: err.code,
                message: err.message,
            }),
            _ if !status.is_success() => Err(LedgerError::StatusError {
                status: status.as_u16(),
            }),
            Some(RpcResponse {
                result: Some(result),
                ..
            }) => Ok(result),
            _ => Err(LedgerError::UnexpectedResponse(text)),
        }
    }
}

#[async_trait]
impl Ledger for MultiChainLedger {
    async fn publish(
        &self,
        stream: &str,
        key: &str,
        payload: &Value,
    ) -> Result<PublishReceipt, LedgerError> {
        let result = self.call("publish", json!([stream, key, payload])).await?;
        let txid = result
            .as_str()
            .ok_or_else(|| LedgerError::UnexpectedResponse(result.to_string()))?
            .to_string();
        Ok(PublishReceipt { txid })
    }
}
