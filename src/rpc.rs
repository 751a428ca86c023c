use crate::repository::models::BaseSystemContractsHashes;
use alloy::providers::{Provider, RootProvider};
use alloy::rpc::types::BlockNumberOrTag;
use alloy_primitives::{Address, B256, Bytes, U256};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::time::timeout;
use tokio_retry::Retry;
use tokio_retry::strategy::{ExponentialBackoff, jitter};
use tracing::{debug, warn};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// `zks_getBlockDetails` response.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcBlockDetails {
    pub number: u64,
    pub l1_batch_number: u64,
    pub timestamp: u64,
    pub l1_tx_count: u64,
    pub l2_tx_count: u64,
    pub base_system_contracts_hashes: BaseSystemContractsHashes,
    pub operator_address: Address,
    pub l1_gas_price: u64,
    pub l2_fair_gas_price: u64,
}

/// `zks_getL1BatchDetails` response, reduced to the anchor fields.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcL1BatchDetails {
    pub number: u64,
    pub commit_tx_hash: Option<B256>,
    pub committed_at: Option<DateTime<Utc>>,
    pub prove_tx_hash: Option<B256>,
    pub proven_at: Option<DateTime<Utc>>,
    pub execute_tx_hash: Option<B256>,
    pub executed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcTransaction {
    pub hash: B256,
    #[serde(with = "alloy_serde::quantity")]
    pub nonce: u64,
    pub from: Address,
    pub to: Option<Address>,
    pub input: Bytes,
    pub value: U256,
    #[serde(with = "alloy_serde::quantity")]
    pub transaction_index: u64,
    #[serde(rename = "type", default, with = "alloy_serde::quantity::opt")]
    pub tx_type: Option<u8>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcBlock {
    pub hash: B256,
    #[serde(with = "alloy_serde::quantity")]
    pub number: u64,
    #[serde(with = "alloy_serde::quantity")]
    pub timestamp: u64,
    pub transactions: Vec<RpcTransaction>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcLog {
    pub address: Address,
    pub topics: Vec<B256>,
    pub data: Bytes,
    #[serde(with = "alloy_serde::quantity")]
    pub log_index: u64,
    #[serde(default)]
    pub removed: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcReceipt {
    pub transaction_hash: B256,
    pub gas_used: U256,
    pub effective_gas_price: U256,
    pub logs: Vec<RpcLog>,
}

/// Entry of `zks_getConfirmedTokens`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcToken {
    pub l1_address: Address,
    pub l2_address: Address,
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
}

/// Read-only JSON-RPC client over one or more node endpoints. Every call is
/// retried with backoff; errors and timeouts move on to the next endpoint.
#[derive(Clone)]
pub struct RpcClient {
    providers: Vec<RootProvider>,
    urls: Vec<String>,
    current_provider: Arc<AtomicUsize>,
    max_retries: usize,
}

impl RpcClient {
    pub fn new(rpc_urls: &[String]) -> Result<Self> {
        if rpc_urls.is_empty() {
            return Err(anyhow::anyhow!("At least one RPC URL must be provided"));
        }

        let providers = rpc_urls
            .iter()
            .map(|url| {
                url.parse()
                    .map(RootProvider::new_http)
                    .map_err(|_| anyhow::anyhow!("Invalid RPC URL: {}", url))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(RpcClient {
            providers,
            urls: rpc_urls.to_vec(),
            current_provider: Arc::new(AtomicUsize::new(0)),
            max_retries: 5,
        })
    }

    fn current_index(&self) -> usize {
        self.current_provider.load(Ordering::Relaxed) % self.providers.len()
    }

    pub fn current_url(&self) -> &str {
        &self.urls[self.current_index()]
    }

    fn rotate_provider(&self, reason: &str) {
        warn!("RPC {} on {}, rotating provider", reason, self.current_url());
        let next = (self.current_index() + 1) % self.providers.len();
        self.current_provider.store(next, Ordering::Relaxed);

        if self.providers.len() > 1 {
            debug!("Rotating to RPC provider #{}", next);
        }
    }

    fn retry_strategy(&self) -> impl Iterator<Item = Duration> {
        ExponentialBackoff::from_millis(100)
            .factor(2)
            .max_delay(Duration::from_secs(10))
            .map(jitter)
            .take(self.max_retries)
    }

    async fn call<T, E, F, Fut>(&self, f: F) -> Result<T>
    where
        F: Fn(RootProvider) -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
        E: std::fmt::Display,
    {
        Retry::spawn(self.retry_strategy(), || {
            let call = f(self.providers[self.current_index()].clone());
            async move {
                match timeout(REQUEST_TIMEOUT, call).await {
                    Ok(Ok(result)) => Ok(result),
                    Ok(Err(e)) => {
                        self.rotate_provider(&format!("error {e}"));
                        Err(anyhow::anyhow!("{}", e))
                    }
                    Err(_) => {
                        self.rotate_provider("timeout");
                        Err(anyhow::anyhow!(
                            "Request timeout after {} seconds",
                            REQUEST_TIMEOUT.as_secs()
                        ))
                    }
                }
            }
        })
        .await
    }

    pub async fn get_latest_block(&self) -> Result<u64> {
        self.call(|provider| async move { provider.get_block_number().await })
            .await
    }

    pub async fn get_code_at_block(&self, address: Address, block_number: u64) -> Result<Bytes> {
        self.call(|provider| async move {
            provider
                .get_code_at(address)
                .block_id(BlockNumberOrTag::Number(block_number).into())
                .await
        })
        .await
    }

    /// Rollup-specific methods and transaction types are not covered by the
    /// Ethereum network types, so their responses are decoded here.
    async fn request<R: DeserializeOwned>(&self, method: &'static str, params: Value) -> Result<R> {
        let response: Value = self
            .call(|provider| {
                let params = params.clone();
                async move { provider.raw_request::<_, Value>(method.into(), params).await }
            })
            .await?;

        serde_json::from_value(response).with_context(|| format!("Malformed {method} response"))
    }

    pub async fn get_block_details(&self, number: u64) -> Result<Option<RpcBlockDetails>> {
        self.request("zks_getBlockDetails", json!([number])).await
    }

    pub async fn get_block(&self, number: u64) -> Result<Option<RpcBlock>> {
        self.request(
            "eth_getBlockByNumber",
            json!([format!("{number:#x}"), true]),
        )
        .await
    }

    pub async fn get_block_receipts(&self, number: u64) -> Result<Vec<RpcReceipt>> {
        let receipts: Option<Vec<RpcReceipt>> = self
            .request("eth_getBlockReceipts", json!([format!("{number:#x}")]))
            .await?;
        Ok(receipts.unwrap_or_default())
    }

    pub async fn get_l1_batch_details(&self, number: u64) -> Result<Option<RpcL1BatchDetails>> {
        self.request("zks_getL1BatchDetails", json!([number])).await
    }

    pub async fn get_confirmed_tokens(&self, from: u32, limit: u8) -> Result<Vec<RpcToken>> {
        self.request("zks_getConfirmedTokens", json!([from, limit]))
            .await
    }

    pub async fn get_token_price(&self, address: Address) -> Result<Option<String>> {
        self.request("zks_getTokenPrice", json!([address])).await
    }
}
