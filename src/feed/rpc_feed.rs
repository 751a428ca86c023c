use super::{
    AnchorReceipt, ChainFeed, CreatedContract, FeedEvent, FeedLog, IncomingTransaction,
    SealedBlock,
};
use crate::events::{constructor_input, deployed_contract};
use crate::repository::models::{AnchorPhase, BlockHeader, Token};
use crate::rpc::{RpcClient, RpcReceipt};
use alloy_primitives::{B256, Bytes, U256};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::try_join_all;
use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{debug, info, warn};

const BATCH_SIZE: u64 = 10;
const RATE_LIMIT_DELAY_MS: u64 = 200; // 200ms between requests = 5 requests per second
const TOKEN_PAGE_SIZE: u8 = 100;
const PRIORITY_TX_TYPE: u8 = 0xff;

#[derive(Debug, Clone)]
pub struct RpcFeedConfig {
    pub poll_interval: Duration,
    pub token_refresh_interval: Duration,
}

/// Where the feed resumes. Anchors already recorded are re-sent and ignored
/// by the tracker. Without an anchor batch the feed anchors from the batch of
/// the first block it emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeedStart {
    pub next_block: u64,
    pub next_anchor_batch: Option<u64>,
    pub last_sealed_batch: Option<u64>,
}

/// Polls a rollup node over JSON-RPC and turns what it finds into feed events.
pub struct RpcFeed {
    client: RpcClient,
    config: RpcFeedConfig,
    next_block: u64,
    next_anchor_batch: Option<u64>,
    anchored_phases: usize,
    last_sealed_batch: Option<u64>,
    last_token_refresh: Option<Instant>,
    queue: VecDeque<FeedEvent>,
}

impl RpcFeed {
    pub fn new(client: RpcClient, config: RpcFeedConfig, start: FeedStart) -> Self {
        info!(
            "Feed starts at block {} and anchors from batch {:?}",
            start.next_block, start.next_anchor_batch
        );
        RpcFeed {
            client,
            config,
            next_block: start.next_block,
            next_anchor_batch: start.next_anchor_batch,
            anchored_phases: 0,
            last_sealed_batch: start.last_sealed_batch,
            last_token_refresh: None,
            queue: VecDeque::new(),
        }
    }

    async fn poll(&mut self) -> Result<()> {
        let refresh_due = self
            .last_token_refresh
            .is_none_or(|at| at.elapsed() >= self.config.token_refresh_interval);
        if refresh_due {
            self.refresh_tokens().await?;
        }

        self.poll_blocks().await?;
        self.poll_anchors().await
    }

    async fn poll_blocks(&mut self) -> Result<()> {
        let latest_block = self.client.get_latest_block().await?;
        if self.next_block > latest_block {
            debug!("Caught up to latest block {}", latest_block);
            return Ok(());
        }

        let to_block = (self.next_block + BATCH_SIZE - 1).min(latest_block);
        info!("Fetching blocks {} to {}", self.next_block, to_block);

        let client = &self.client;
        let blocks = try_join_all((self.next_block..=to_block).map(|n| fetch_block(client, n)))
            .await?;

        for block in blocks {
            // Details can lag behind the block number; retry on the next poll.
            let Some(block) = block else { break };
            self.next_block = block.header.number + 1;
            self.last_sealed_batch = Some(block.header.l1_batch_number);
            self.next_anchor_batch.get_or_insert(block.header.l1_batch_number);
            self.queue.push_back(FeedEvent::BlockSealed(block));
        }
        Ok(())
    }

    /// Anchors are only reported for closed batches: all of their blocks have
    /// been emitted once a later batch shows up.
    async fn poll_anchors(&mut self) -> Result<()> {
        loop {
            let (Some(batch), Some(last_sealed_batch)) =
                (self.next_anchor_batch, self.last_sealed_batch)
            else {
                return Ok(());
            };
            if batch >= last_sealed_batch {
                return Ok(());
            }
            let Some(details) = self.client.get_l1_batch_details(batch).await? else {
                return Ok(());
            };

            let phases = [
                (AnchorPhase::Commit, details.commit_tx_hash, details.committed_at),
                (AnchorPhase::Prove, details.prove_tx_hash, details.proven_at),
                (AnchorPhase::Execute, details.execute_tx_hash, details.executed_at),
            ];
            for (phase, tx_hash, confirmed_at) in phases.into_iter().skip(self.anchored_phases) {
                let (Some(tx_hash), Some(confirmed_at)) = (tx_hash, confirmed_at) else {
                    break;
                };
                self.queue.push_back(FeedEvent::AnchorConfirmed {
                    l1_batch_number: batch,
                    phase,
                    tx_hash,
                    receipt: AnchorReceipt {
                        confirmed_at,
                        succeeded: true,
                    },
                });
                self.anchored_phases += 1;
            }

            if self.anchored_phases < AnchorPhase::ALL.len() {
                return Ok(());
            }
            self.next_anchor_batch = Some(batch + 1);
            self.anchored_phases = 0;
        }
    }

    async fn refresh_tokens(&mut self) -> Result<()> {
        let mut from = 0u32;
        let mut prices = Vec::new();

        loop {
            let page = self
                .client
                .get_confirmed_tokens(from, TOKEN_PAGE_SIZE)
                .await?;
            let page_len = page.len();

            for token in page {
                match self.client.get_token_price(token.l2_address).await {
                    Ok(Some(usd_price)) => prices.push(FeedEvent::TokenPrice {
                        address: token.l2_address,
                        usd_price,
                    }),
                    Ok(None) => {}
                    Err(e) => warn!("Failed to fetch price of {:?}: {}", token.l2_address, e),
                }
                self.queue.push_back(FeedEvent::TokenRegistered(Token {
                    address: token.l2_address,
                    l1_address: Some(token.l1_address),
                    l2_address: token.l2_address,
                    name: token.name,
                    symbol: token.symbol,
                    decimals: token.decimals,
                    usd_price: None,
                }));
            }

            if page_len < TOKEN_PAGE_SIZE as usize {
                break;
            }
            from += page_len as u32;
        }

        self.queue.extend(prices);
        self.last_token_refresh = Some(Instant::now());
        Ok(())
    }
}

#[async_trait]
impl ChainFeed for RpcFeed {
    async fn next_event(&mut self) -> Result<Option<FeedEvent>> {
        loop {
            if let Some(event) = self.queue.pop_front() {
                return Ok(Some(event));
            }

            let loop_start = Instant::now();
            self.poll().await?;

            if self.queue.is_empty() {
                sleep(self.config.poll_interval).await;
                continue;
            }

            // Smart rate limiting: ensure minimum time between polls
            let loop_duration = loop_start.elapsed();
            let target_duration = Duration::from_millis(RATE_LIMIT_DELAY_MS);
            if loop_duration < target_duration {
                sleep(target_duration - loop_duration).await;
            }
        }
    }
}

async fn fetch_block(client: &RpcClient, number: u64) -> Result<Option<SealedBlock>> {
    let (details, block, receipts) = tokio::try_join!(
        client.get_block_details(number),
        client.get_block(number),
        client.get_block_receipts(number),
    )?;
    let (Some(details), Some(block)) = (details, block) else {
        return Ok(None);
    };

    let mut receipts: HashMap<B256, RpcReceipt> = receipts
        .into_iter()
        .map(|receipt| (receipt.transaction_hash, receipt))
        .collect();
    let received_at = DateTime::<Utc>::from_timestamp(block.timestamp as i64, 0)
        .with_context(|| format!("Block {number} has an invalid timestamp"))?;

    let mut transactions = Vec::with_capacity(block.transactions.len());
    for tx in block.transactions {
        let receipt = receipts
            .remove(&tx.hash)
            .with_context(|| format!("Missing receipt for transaction {:?}", tx.hash))?;

        let mut created_contracts = Vec::new();
        for log in &receipt.logs {
            if let Some(address) = deployed_contract(&log.address, &log.topics) {
                let code = client.get_code_at_block(address, number).await?;
                let input = constructor_input(&tx.input);
                let bytecode: Bytes = [code.as_ref(), input.as_ref()].concat().into();
                created_contracts.push(CreatedContract { address, bytecode });
            }
        }

        let tx_type = tx.tx_type.unwrap_or_default();
        transactions.push(IncomingTransaction {
            hash: tx.hash,
            nonce: tx.nonce,
            index_in_block: tx.transaction_index,
            is_l1_originated: tx_type == PRIORITY_TX_TYPE,
            initiator: tx.from,
            to: tx.to,
            calldata: tx.input,
            value: tx.value,
            factory_deps: None,
            tx_type,
            received_at,
            gas_used: receipt.gas_used,
            effective_gas_price: receipt.effective_gas_price,
            // Receipts report gas after the operator refund
            refund: Some(U256::ZERO),
            logs: receipt
                .logs
                .into_iter()
                .map(|log| FeedLog {
                    address: log.address,
                    topics: log.topics,
                    data: log.data,
                    log_index: log.log_index,
                    removed: log.removed,
                })
                .collect(),
            created_contracts,
            balance_updates: Vec::new(),
        });
    }

    Ok(Some(SealedBlock {
        header: BlockHeader {
            number,
            hash: block.hash,
            l1_batch_number: details.l1_batch_number,
            timestamp: details.timestamp,
            l1_tx_count: details.l1_tx_count,
            l2_tx_count: details.l2_tx_count,
            base_system_contracts_hashes: details.base_system_contracts_hashes,
            operator_address: details.operator_address,
            l1_gas_price: details.l1_gas_price,
            l2_fair_gas_price: details.l2_fair_gas_price,
        },
        transactions,
    }))
}
