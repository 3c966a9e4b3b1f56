//! Minimal JSON-RPC 2.0 client for the chain endpoints the watcher needs

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::instrument;

use crate::error::{ChainError, Result};
use crate::types::{
    format_h256, format_quantity, parse_data, parse_quantity, Address, Log, H256,
};

/// Configuration for the RPC connection
#[derive(Clone, Debug)]
pub struct RpcConfig {
    /// JSON-RPC endpoint URL (e.g., "http://localhost:8545")
    pub url: String,
    /// Per-request deadline
    pub timeout: Duration,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:8545".to_string(),
            timeout: Duration::from_secs(30),
        }
    }
}

impl RpcConfig {
    /// Create with a custom endpoint URL
    pub fn with_url(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }
}

/// JSON-RPC client
pub struct RpcClient {
    client: Client,
    config: RpcConfig,
    next_id: AtomicU64,
}

impl RpcClient {
    /// Create a new client
    pub fn new(config: RpcConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ChainError::Connection(e.to_string()))?;
        Ok(Self {
            client,
            config,
            next_id: AtomicU64::new(1),
        })
    }

    async fn call<R: DeserializeOwned>(&self, method: &str, params: Value) -> Result<R> {
        let request = RpcRequest {
            jsonrpc: "2.0",
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            method,
            params,
        };

        let response = self
            .client
            .post(&self.config.url)
            .json(&request)
            .send()
            .await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ChainError::Http(format!("{method} failed ({status}): {body}")));
        }

        let envelope: RpcResponse<R> = response.json().await.map_err(ChainError::from)?;
        if let Some(error) = envelope.error {
            return Err(ChainError::Rpc {
                code: error.code,
                message: error.message,
            });
        }
        envelope
            .result
            .ok_or_else(|| ChainError::Decode(format!("{method} returned neither result nor error")))
    }

    /// Current chain head height
    pub async fn block_number(&self) -> Result<u64> {
        let result: String = self.call("eth_blockNumber", json!([])).await?;
        parse_quantity(&result)
    }

    /// Chain id of the endpoint
    pub async fn chain_id(&self) -> Result<u64> {
        let result: String = self.call("eth_chainId", json!([])).await?;
        parse_quantity(&result)
    }

    /// Fetch logs matching the filter
    #[instrument(skip(self, filter), fields(from = filter.from_block, to = filter.to_block))]
    pub async fn get_logs(&self, filter: &LogFilter) -> Result<Vec<Log>> {
        let raw: Vec<RawLog> = self.call("eth_getLogs", json!([filter.to_value()])).await?;
        raw.into_iter().map(RawLog::into_log).collect()
    }

    /// Execute a read-only contract call at the given height
    pub async fn eth_call(&self, to: &Address, data: &[u8], height: Option<u64>) -> Result<Vec<u8>> {
        let block = match height {
            Some(h) => Value::String(format_quantity(h)),
            None => Value::String("latest".to_string()),
        };
        let params = json!([
            { "to": to.to_string(), "data": format!("0x{}", hex::encode(data)) },
            block,
        ]);
        let result: String = self.call("eth_call", params).await?;
        parse_data(&result)
    }
}

/// Log filter for `eth_getLogs`
#[derive(Clone, Debug, Default)]
pub struct LogFilter {
    pub from_block: u64,
    pub to_block: u64,
    /// Restrict to one emitting contract
    pub address: Option<Address>,
    /// Topic constraints; `None` entries match anything
    pub topics: Vec<Option<H256>>,
}

impl LogFilter {
    fn to_value(&self) -> Value {
        let mut filter = json!({
            "fromBlock": format_quantity(self.from_block),
            "toBlock": format_quantity(self.to_block),
        });
        if let Some(address) = &self.address {
            filter["address"] = Value::String(address.to_string());
        }
        if !self.topics.is_empty() {
            let topics: Vec<Value> = self
                .topics
                .iter()
                .map(|t| match t {
                    Some(h) => Value::String(format_h256(h)),
                    None => Value::Null,
                })
                .collect();
            filter["topics"] = Value::Array(topics);
        }
        filter
    }
}

#[derive(Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: Value,
}

#[derive(Deserialize)]
struct RpcResponse<R> {
    result: Option<R>,
    error: Option<RpcErrorObject>,
}

#[derive(Deserialize)]
struct RpcErrorObject {
    code: i64,
    message: String,
}

#[derive(Deserialize)]
struct RawLog {
    address: String,
    topics: Vec<String>,
    data: String,
    #[serde(rename = "blockNumber")]
    block_number: String,
}

impl RawLog {
    fn into_log(self) -> Result<Log> {
        Ok(Log {
            address: Address::from_hex(&self.address)?,
            topics: self
                .topics
                .iter()
                .map(|t| crate::types::parse_h256(t))
                .collect::<Result<_>>()?,
            data: parse_data(&self.data)?,
            block_number: parse_quantity(&self.block_number)?,
        })
    }
}
