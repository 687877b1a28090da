//! HTTP client for the monitored node's JSON-RPC status API

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::time::Duration;

const STATUS_ENDPOINT_PATH: &str = "/status";

/// Capability for sampling the current state of the monitored node
#[async_trait]
pub trait NodeStatusProbe: Send + Sync {
    async fn status(&self) -> Result<NodeState>;
}

/// Current sync state of a single node
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeState {
    pub node_info: NodeInfo,
    pub sync_info: SyncInfo,
}

/// Network identifiers for a node
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeInfo {
    pub id: String,
    pub moniker: String,
}

/// Node sync status fields used for performance benchmarking
/// and health monitoring
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncInfo {
    #[serde(with = "string_i64")]
    pub latest_block_height: i64,
    pub latest_block_time: DateTime<Utc>,
    pub catching_up: bool,
}

// the chain's RPC encodes block heights as decimal strings
mod string_i64 {
    use super::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &i64, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Deserialize)]
struct NodeStateResponse {
    result: NodeState,
}

/// JSON-RPC client for a single node's status API
pub struct HttpNodeClient {
    rpc_url: String,
    client: reqwest::Client,
}

impl HttpNodeClient {
    /// Create a client for the given RPC endpoint; the timeout bounds
    /// every status call made through this client.
    pub fn new(rpc_url: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| anyhow!("failed to create HTTP client: {}", e))?;

        Ok(Self {
            rpc_url: rpc_url.trim_end_matches('/').to_string(),
            client,
        })
    }
}

#[async_trait]
impl NodeStatusProbe for HttpNodeClient {
    async fn status(&self) -> Result<NodeState> {
        let url = format!("{}{}", self.rpc_url, STATUS_ENDPOINT_PATH);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| anyhow!("status request failed: {}", e))?;

        if !response.status().is_success() {
            return Err(anyhow!(
                "non 2xx response {} from {}",
                response.status(),
                url
            ));
        }

        let state: NodeStateResponse = response
            .json()
            .await
            .map_err(|e| anyhow!("failed to parse status response: {}", e))?;

        Ok(state.result)
    }
}
