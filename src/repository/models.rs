use alloy_primitives::{Address, B256, Bytes, U256};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;

/// Address used for the native asset in balances and token records.
pub const ETH_ADDRESS: Address = Address::ZERO;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BlockStatus {
    Sealed,
    Verified,
}

impl BlockStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BlockStatus::Sealed => "sealed",
            BlockStatus::Verified => "verified",
        }
    }

}

#[derive(Debug, thiserror::Error)]
#[error("unknown status: {0}")]
pub struct UnknownStatus(pub String);

impl FromStr for BlockStatus {
    type Err = UnknownStatus;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "sealed" => Ok(BlockStatus::Sealed),
            "verified" => Ok(BlockStatus::Verified),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TransactionStatus {
    Included,
    Verified,
}

impl From<BlockStatus> for TransactionStatus {
    fn from(status: BlockStatus) -> Self {
        match status {
            BlockStatus::Sealed => TransactionStatus::Included,
            BlockStatus::Verified => TransactionStatus::Verified,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AnchorPhase {
    Commit,
    Prove,
    Execute,
}

impl AnchorPhase {
    pub const ALL: [AnchorPhase; 3] = [AnchorPhase::Commit, AnchorPhase::Prove, AnchorPhase::Execute];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BaseSystemContractsHashes {
    pub bootloader: B256,
    pub default_aa: B256,
}

/// Header of a freshly sealed L2 block as reported by the chain feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockHeader {
    pub number: u64,
    pub hash: B256,
    pub l1_batch_number: u64,
    pub timestamp: u64,
    pub l1_tx_count: u64,
    pub l2_tx_count: u64,
    pub base_system_contracts_hashes: BaseSystemContractsHashes,
    pub operator_address: Address,
    pub l1_gas_price: u64,
    pub l2_fair_gas_price: u64,
}

/// L1 anchor transactions of a batch. Only the confirmed phases are present.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnchorInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub commit_tx_hash: Option<B256>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub committed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prove_tx_hash: Option<B256>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proven_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execute_tx_hash: Option<B256>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub executed_at: Option<DateTime<Utc>>,
}

impl AnchorInfo {
    pub fn tx_hash(&self, phase: AnchorPhase) -> Option<B256> {
        match phase {
            AnchorPhase::Commit => self.commit_tx_hash,
            AnchorPhase::Prove => self.prove_tx_hash,
            AnchorPhase::Execute => self.execute_tx_hash,
        }
    }

    pub fn is_complete(&self) -> bool {
        AnchorPhase::ALL.iter().all(|phase| self.tx_hash(*phase).is_some())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockSummary {
    pub number: u64,
    pub l1_tx_count: u64,
    pub l2_tx_count: u64,
    pub hash: B256,
    pub status: BlockStatus,
    pub timestamp: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockDetails {
    pub number: u64,
    pub l1_batch_number: u64,
    pub l1_tx_count: u64,
    pub l2_tx_count: u64,
    pub root_hash: B256,
    pub status: BlockStatus,
    pub timestamp: u64,
    #[serde(flatten)]
    pub anchors: AnchorInfo,
    pub base_system_contracts_hashes: BaseSystemContractsHashes,
    pub l1_gas_price: u64,
    pub l2_fair_gas_price: u64,
    pub operator_address: Address,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct L1BatchSummary {
    pub number: u64,
    pub l1_tx_count: u64,
    pub l2_tx_count: u64,
    pub status: BlockStatus,
    pub timestamp: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct L1BatchDetails {
    pub number: u64,
    pub l1_tx_count: u64,
    pub l2_tx_count: u64,
    pub status: BlockStatus,
    pub timestamp: u64,
    #[serde(flatten)]
    pub anchors: AnchorInfo,
    pub base_system_contracts_hashes: BaseSystemContractsHashes,
    pub l1_gas_price: u64,
    pub l2_fair_gas_price: u64,
}

/// A token known to the explorer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Token {
    pub address: Address,
    pub l1_address: Option<Address>,
    pub l2_address: Address,
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
    pub usd_price: Option<String>,
}

impl Token {
    pub fn ether() -> Self {
        Token {
            address: ETH_ADDRESS,
            l1_address: Some(ETH_ADDRESS),
            l2_address: ETH_ADDRESS,
            name: "Ether".to_string(),
            symbol: "ETH".to_string(),
            decimals: 18,
            usd_price: None,
        }
    }
}

/// Token metadata embedded in balances and transfers. Metadata fields stay
/// empty when the token is not (yet) known.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenInfo {
    pub address: Address,
    pub l1_address: Option<Address>,
    pub l2_address: Address,
    pub symbol: Option<String>,
    pub name: Option<String>,
    pub decimals: Option<u8>,
    pub usd_price: Option<String>,
}

impl TokenInfo {
    pub fn partial(address: Address) -> Self {
        TokenInfo {
            address,
            l1_address: None,
            l2_address: address,
            symbol: None,
            name: None,
            decimals: None,
            usd_price: None,
        }
    }
}

impl From<Token> for TokenInfo {
    fn from(token: Token) -> Self {
        TokenInfo {
            address: token.address,
            l1_address: token.l1_address,
            l2_address: token.l2_address,
            symbol: Some(token.symbol),
            name: Some(token.name),
            decimals: Some(token.decimals),
            usd_price: token.usd_price,
        }
    }
}

/// A log as exposed by the explorer, with web3-style quantities.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub address: Address,
    pub topics: Vec<B256>,
    pub data: Bytes,
    pub block_hash: B256,
    #[serde(with = "alloy_serde::quantity")]
    pub block_number: u64,
    pub transaction_hash: B256,
    #[serde(with = "alloy_serde::quantity")]
    pub transaction_index: u64,
    #[serde(with = "alloy_serde::quantity")]
    pub log_index: u64,
    #[serde(with = "alloy_serde::quantity")]
    pub transaction_log_index: u64,
    pub removed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Erc20Transfer {
    pub token_info: TokenInfo,
    pub from: Address,
    pub to: Address,
    pub amount: U256,
    #[serde(with = "alloy_serde::quantity")]
    pub log_index: u64,
}

/// A decoded `Transfer` log. Movements of the native asset carry
/// `ETH_ADDRESS` as token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenMovement {
    pub token: Address,
    pub from: Address,
    pub to: Address,
    pub amount: U256,
    pub log_index: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceChange {
    pub address: Address,
    pub token_address: Address,
    pub balance_before: U256,
    pub balance_after: U256,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferSummary {
    pub from: Address,
    pub to: Address,
    pub amount: U256,
    pub token_info: TokenInfo,
}

/// Transfer summary as persisted. Token metadata is attached on read so that
/// prices stay current.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredTransfer {
    pub from: Address,
    pub to: Address,
    pub amount: U256,
    pub token_address: Address,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionData {
    pub calldata: Bytes,
    pub contract_address: Option<Address>,
    pub factory_deps: Option<Vec<Bytes>>,
    pub value: U256,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionDetails {
    pub transaction_hash: B256,
    pub nonce: u64,
    pub block_number: u64,
    pub block_hash: B256,
    pub l1_batch_number: u64,
    pub index_in_block: u64,
    pub status: TransactionStatus,
    pub fee: U256,
    pub is_l1_originated: bool,
    pub initiator_address: Address,
    pub received_at: DateTime<Utc>,
    pub miniblock_timestamp: u64,
    pub data: TransactionData,
    pub logs: Vec<Event>,
    pub balance_changes: Vec<BalanceChange>,
    pub erc20_transfers: Vec<Erc20Transfer>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transfer: Option<TransferSummary>,
    #[serde(rename = "type")]
    pub tx_type: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub eth_commit_tx_hash: Option<B256>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub eth_prove_tx_hash: Option<B256>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub eth_execute_tx_hash: Option<B256>,
}

/// A transaction as persisted after enrichment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionRecord {
    pub hash: B256,
    pub block_number: u64,
    pub index_in_block: u64,
    pub l1_batch_number: u64,
    pub nonce: u64,
    pub initiator_address: Address,
    pub to_address: Option<Address>,
    pub is_l1_originated: bool,
    pub tx_type: u8,
    pub calldata: Bytes,
    pub value: U256,
    pub fee: U256,
    pub factory_deps: Option<Vec<Bytes>>,
    pub received_at: DateTime<Utc>,
    pub balance_changes: Vec<BalanceChange>,
    pub transfer: Option<StoredTransfer>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccountType {
    #[serde(rename = "eOA")]
    Eoa,
    #[serde(rename = "contract")]
    Contract,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountBalance {
    pub balance: U256,
    pub token_info: TokenInfo,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountDetails {
    pub address: Address,
    pub balances: BTreeMap<Address, AccountBalance>,
    pub sealed_nonce: u64,
    pub verified_nonce: u64,
    pub account_type: AccountType,
}

/// A contract as recorded at creation time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractRecord {
    pub address: Address,
    pub creator_address: Address,
    pub creator_tx_hash: B256,
    pub created_in_block_number: u64,
    pub bytecode: Bytes,
    pub total_transactions: u64,
    pub verification_info: Option<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContractDetails {
    pub address: Address,
    pub creator_address: Address,
    pub creator_tx_hash: B256,
    pub created_in_block_number: u64,
    pub total_transactions: u64,
    pub bytecode: Bytes,
    pub verification_info: Option<serde_json::Value>,
    pub balances: BTreeMap<Address, AccountBalance>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkStats {
    pub last_sealed: u64,
    pub last_verified: u64,
    pub total_transactions: u64,
}

/// `{ total, list }` envelope of every list endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Paginated<T> {
    pub total: u64,
    pub list: Vec<T>,
}

impl<T> Paginated<T> {
    pub fn empty() -> Self {
        Paginated {
            total: 0,
            list: Vec::new(),
        }
    }
}
