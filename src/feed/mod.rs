//! Chain feed: everything the indexer learns about the rollup arrives as a
//! [`FeedEvent`], delivered strictly in order.

mod channel;
mod rpc_feed;

pub use channel::{ChannelFeed, channel};
pub use rpc_feed::{FeedStart, RpcFeed, RpcFeedConfig};

use crate::repository::models::{AnchorPhase, BlockHeader, Token};
use alloy_primitives::{Address, B256, Bytes, U256};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// A log as reported by the node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedLog {
    pub address: Address,
    pub topics: Vec<B256>,
    pub data: Bytes,
    pub log_index: u64,
    pub removed: bool,
}

/// Post-transaction balance reported by the node, when available.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BalanceUpdate {
    pub address: Address,
    pub token: Address,
    pub balance: U256,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedContract {
    pub address: Address,
    /// Deployed code followed by the constructor input.
    pub bytecode: Bytes,
}

/// A transaction together with its receipt data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingTransaction {
    pub hash: B256,
    pub nonce: u64,
    pub index_in_block: u64,
    pub is_l1_originated: bool,
    pub initiator: Address,
    pub to: Option<Address>,
    pub calldata: Bytes,
    pub value: U256,
    pub factory_deps: Option<Vec<Bytes>>,
    pub tx_type: u8,
    pub received_at: DateTime<Utc>,
    pub gas_used: U256,
    pub effective_gas_price: U256,
    /// Operator refund. When absent it is inferred from the logs.
    pub refund: Option<U256>,
    pub logs: Vec<FeedLog>,
    pub created_contracts: Vec<CreatedContract>,
    pub balance_updates: Vec<BalanceUpdate>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SealedBlock {
    pub header: BlockHeader,
    pub transactions: Vec<IncomingTransaction>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnchorReceipt {
    pub confirmed_at: DateTime<Utc>,
    pub succeeded: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedEvent {
    BlockSealed(SealedBlock),
    AnchorConfirmed {
        l1_batch_number: u64,
        phase: AnchorPhase,
        tx_hash: B256,
        receipt: AnchorReceipt,
    },
    TokenRegistered(Token),
    TokenPrice {
        address: Address,
        usd_price: String,
    },
}

#[async_trait]
pub trait ChainFeed: Send {
    /// Next event in delivery order, or `None` once the feed is exhausted.
    async fn next_event(&mut self) -> anyhow::Result<Option<FeedEvent>>;
}
