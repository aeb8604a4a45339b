//! JSON-RPC access to an Ethereum node.
//!
//! The rest of the crate only sees [`RpcProvider`]; [`JsonRpcProvider`] is the
//! reqwest-backed implementation and [`Connector`] is how a session obtains one
//! for a URL.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use alloy::primitives::{Address, B256, Bytes, U64, U128, U256};
use alloy::rpc::types::TransactionRequest;
use async_trait::async_trait;
use ethershell_core::{NetworkSettings, validate_url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::debug;

use crate::error::{ChainError, Result};

// ---------------------------------------------------------------------------
// Network identity
// ---------------------------------------------------------------------------

/// Identity of the network behind a provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkInfo {
    pub url: String,
    pub name: String,
    pub chain_id: u64,
}

/// Well-known name for a chain id, `"unknown"` for local and private chains.
pub fn chain_name(chain_id: u64) -> &'static str {
    match chain_id {
        1 => "mainnet",
        10 => "optimism",
        137 => "matic",
        8453 => "base",
        17000 => "holesky",
        42161 => "arbitrum",
        11155111 => "sepolia",
        _ => "unknown",
    }
}

// ---------------------------------------------------------------------------
// Receipts
// ---------------------------------------------------------------------------

/// A raw event log as the node reports it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReceiptLog {
    pub address: Address,
    #[serde(default)]
    pub topics: Vec<B256>,
    #[serde(default)]
    pub data: Bytes,
    #[serde(default)]
    pub log_index: Option<U64>,
}

/// The subset of a transaction receipt the shell reports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Receipt {
    pub transaction_hash: B256,
    #[serde(default)]
    pub block_number: Option<U64>,
    pub from: Address,
    #[serde(default)]
    pub to: Option<Address>,
    #[serde(default)]
    pub contract_address: Option<Address>,
    #[serde(default)]
    pub gas_used: Option<U64>,
    /// `0x1` success, `0x0` reverted; absent on pre-Byzantium chains.
    #[serde(default)]
    pub status: Option<U64>,
    #[serde(default)]
    pub logs: Vec<ReceiptLog>,
}

impl Receipt {
    pub fn succeeded(&self) -> bool {
        self.status.is_none_or(|status| status != U64::ZERO)
    }
}

// ---------------------------------------------------------------------------
// Provider capability
// ---------------------------------------------------------------------------

/// Everything the registry, proxy and orchestrator need from a node.
#[async_trait]
pub trait RpcProvider: Send + Sync {
    fn url(&self) -> &str;

    async fn chain_id(&self) -> Result<u64>;

    async fn get_network(&self) -> Result<NetworkInfo> {
        let chain_id = self.chain_id().await?;
        Ok(NetworkInfo {
            url: self.url().to_string(),
            name: chain_name(chain_id).to_string(),
            chain_id,
        })
    }

    async fn get_balance(&self, address: Address) -> Result<U256>;

    async fn get_transaction_count(&self, address: Address) -> Result<u64>;

    /// Raw transaction object, `None` if the node does not know the hash.
    async fn get_transaction(&self, hash: B256) -> Result<Option<Value>>;

    async fn get_transaction_receipt(&self, hash: B256) -> Result<Option<Receipt>>;

    /// Accounts whose keys the node holds.
    async fn list_accounts(&self) -> Result<Vec<Address>>;

    async fn call(&self, tx: &TransactionRequest) -> Result<Bytes>;

    async fn estimate_gas(&self, tx: &TransactionRequest) -> Result<u64>;

    async fn gas_price(&self) -> Result<u128>;

    async fn max_priority_fee_per_gas(&self) -> Result<u128>;

    async fn send_raw_transaction(&self, raw: &[u8]) -> Result<B256>;

    /// Submit an unsigned transaction for the node to sign.
    async fn send_transaction(&self, tx: &TransactionRequest) -> Result<B256>;
}

/// Opens providers for URLs.
pub trait Connector: Send + Sync {
    fn connect(&self, url: &str, settings: &NetworkSettings) -> Result<Arc<dyn RpcProvider>>;
}

/// Connector producing [`JsonRpcProvider`]s.
#[derive(Debug, Clone, Copy, Default)]
pub struct HttpConnector;

impl Connector for HttpConnector {
    fn connect(&self, url: &str, settings: &NetworkSettings) -> Result<Arc<dyn RpcProvider>> {
        Ok(Arc::new(JsonRpcProvider::new(url, settings.request_timeout())?))
    }
}

// ---------------------------------------------------------------------------
// JSON-RPC 2.0 types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
struct JsonRpcRequest<'a> {
    jsonrpc: &'static str,
    method: &'a str,
    params: Value,
    id: u64,
}

#[derive(Debug, Clone, Deserialize)]
struct JsonRpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<JsonRpcError>,
}

#[derive(Debug, Clone, Deserialize)]
struct JsonRpcError {
    code: i64,
    message: String,
}

// ---------------------------------------------------------------------------
// HTTP provider
// ---------------------------------------------------------------------------

/// JSON-RPC 2.0 over HTTP. Every request is bounded by the configured timeout.
#[derive(Debug)]
pub struct JsonRpcProvider {
    url: String,
    client: reqwest::Client,
    timeout: Duration,
    next_id: AtomicU64,
}

impl JsonRpcProvider {
    pub fn new(url: &str, timeout: Duration) -> Result<Self> {
        if !validate_url(url) {
            return Err(ChainError::Validation(format!(
                "`{url}` is not a valid http(s) endpoint"
            )));
        }
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            url: url.to_string(),
            client,
            timeout,
            next_id: AtomicU64::new(1),
        })
    }

    async fn request<R: DeserializeOwned>(&self, method: &str, params: Value) -> Result<R> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        debug!(method, id, url = %self.url, "rpc request");

        let body = JsonRpcRequest {
            jsonrpc: "2.0",
            method,
            params,
            id,
        };
        let response = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;
        let status = response.status();
        let text = response.text().await.map_err(|e| self.transport_error(e))?;

        let parsed: JsonRpcResponse = serde_json::from_str(&text).map_err(|_| {
            let snippet: String = text.chars().take(200).collect();
            ChainError::Network(format!("HTTP {status} from {}: {snippet}", self.url))
        })?;
        if let Some(error) = parsed.error {
            debug!(method, id, code = error.code, "rpc error");
            return Err(ChainError::Rpc {
                code: error.code,
                message: error.message,
            });
        }
        Ok(serde_json::from_value(parsed.result.unwrap_or(Value::Null))?)
    }

    fn transport_error(&self, err: reqwest::Error) -> ChainError {
        if err.is_timeout() {
            ChainError::Timeout(self.timeout)
        } else {
            err.into()
        }
    }
}

#[async_trait]
impl RpcProvider for JsonRpcProvider {
    fn url(&self) -> &str {
        &self.url
    }

    async fn chain_id(&self) -> Result<u64> {
        let id: U64 = self.request("eth_chainId", json!([])).await?;
        Ok(id.to::<u64>())
    }

    async fn get_balance(&self, address: Address) -> Result<U256> {
        self.request("eth_getBalance", json!([address, "latest"])).await
    }

    async fn get_transaction_count(&self, address: Address) -> Result<u64> {
        let count: U64 = self
            .request("eth_getTransactionCount", json!([address, "pending"]))
            .await?;
        Ok(count.to::<u64>())
    }

    async fn get_transaction(&self, hash: B256) -> Result<Option<Value>> {
        self.request("eth_getTransactionByHash", json!([hash])).await
    }

    async fn get_transaction_receipt(&self, hash: B256) -> Result<Option<Receipt>> {
        self.request("eth_getTransactionReceipt", json!([hash])).await
    }

    async fn list_accounts(&self) -> Result<Vec<Address>> {
        self.request("eth_accounts", json!([])).await
    }

    async fn call(&self, tx: &TransactionRequest) -> Result<Bytes> {
        self.request("eth_call", json!([tx, "latest"])).await
    }

    async fn estimate_gas(&self, tx: &TransactionRequest) -> Result<u64> {
        let gas: U64 = self.request("eth_estimateGas", json!([tx])).await?;
        Ok(gas.to::<u64>())
    }

    async fn gas_price(&self) -> Result<u128> {
        let price: U128 = self.request("eth_gasPrice", json!([])).await?;
        Ok(price.to::<u128>())
    }

    async fn max_priority_fee_per_gas(&self) -> Result<u128> {
        let tip: U128 = self.request("eth_maxPriorityFeePerGas", json!([])).await?;
        Ok(tip.to::<u128>())
    }

    async fn send_raw_transaction(&self, raw: &[u8]) -> Result<B256> {
        self.request(
            "eth_sendRawTransaction",
            json!([Bytes::copy_from_slice(raw)]),
        )
        .await
    }

    async fn send_transaction(&self, tx: &TransactionRequest) -> Result<B256> {
        self.request("eth_sendTransaction", json!([tx])).await
    }
}

// ---------------------------------------------------------------------------
// Test double
// ---------------------------------------------------------------------------
