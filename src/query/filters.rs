//! Typed list filters and the raw parameter bags they are parsed from.

use super::pagination::{DEFAULT_PAGE_SIZE, Direction, Pagination, Position};
use crate::error::{ExplorerError, ExplorerResult};
use alloy_primitives::Address;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockFilter {
    All,
    L1Batch(u64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionFilter {
    All,
    /// Transactions the address initiated or that moved its balances.
    Account(Address),
    /// Transactions sent to the contract.
    Contract(Address),
    Block(u64),
    L1Batch(u64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventFilter {
    All,
    Contract(Address),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListQuery<C, F> {
    pub pagination: Pagination<C>,
    pub filter: F,
}

pub type BlockQuery = ListQuery<u64, BlockFilter>;
pub type L1BatchQuery = ListQuery<u64, ()>;
pub type TransactionQuery = ListQuery<Position, TransactionFilter>;
pub type EventQuery = ListQuery<Position, EventFilter>;

fn default_limit() -> u64 {
    DEFAULT_PAGE_SIZE
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct BlockListParams {
    pub direction: Option<Direction>,
    #[serde(default = "default_limit")]
    pub limit: u64,
    #[serde(default)]
    pub offset: u64,
    pub from: Option<u64>,
    pub l1_batch_number: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct L1BatchListParams {
    pub direction: Option<Direction>,
    #[serde(default = "default_limit")]
    pub limit: u64,
    #[serde(default)]
    pub offset: u64,
    pub from: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct TransactionListParams {
    pub direction: Option<Direction>,
    #[serde(default = "default_limit")]
    pub limit: u64,
    #[serde(default)]
    pub offset: u64,
    pub from_block_number: Option<u64>,
    pub from_tx_index: Option<u64>,
    pub account_address: Option<Address>,
    pub contract_address: Option<Address>,
    pub block_number: Option<u64>,
    pub l1_batch_number: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct EventListParams {
    pub direction: Option<Direction>,
    #[serde(default = "default_limit")]
    pub limit: u64,
    #[serde(default)]
    pub offset: u64,
    pub from_block_number: Option<u64>,
    pub from_log_index: Option<u64>,
    pub contract_address: Option<Address>,
}

/// Numbers are stored as SQLite integers, so anything past `i64::MAX` can never match.
fn sql_integer(name: &str, value: Option<u64>) -> ExplorerResult<Option<u64>> {
    match value {
        Some(value) if value > i64::MAX as u64 => {
            Err(ExplorerError::invalid(format!("{name} is out of range")))
        }
        value => Ok(value),
    }
}

fn pagination<C>(
    direction: Option<Direction>,
    cursor: Option<C>,
    limit: u64,
    offset: u64,
) -> ExplorerResult<Pagination<C>> {
    let direction = direction.ok_or_else(|| ExplorerError::invalid("direction is required"))?;
    Ok(Pagination {
        direction,
        cursor,
        limit,
        offset,
    })
}

fn position(
    block_number: Option<u64>,
    index: Option<u64>,
    index_name: &str,
) -> ExplorerResult<Option<Position>> {
    let block_number = sql_integer("fromBlockNumber", block_number)?;
    let index = sql_integer(index_name, index)?;
    match (block_number, index) {
        (None, Some(_)) => Err(ExplorerError::invalid(format!(
            "{index_name} requires fromBlockNumber"
        ))),
        (Some(block_number), index) => Ok(Some(Position { block_number, index })),
        (None, None) => Ok(None),
    }
}

impl TryFrom<BlockListParams> for BlockQuery {
    type Error = ExplorerError;

    fn try_from(params: BlockListParams) -> ExplorerResult<Self> {
        let filter = match sql_integer("l1BatchNumber", params.l1_batch_number)? {
            Some(number) => BlockFilter::L1Batch(number),
            None => BlockFilter::All,
        };
        let from = sql_integer("from", params.from)?;
        Ok(ListQuery {
            pagination: pagination(params.direction, from, params.limit, params.offset)?,
            filter,
        })
    }
}

impl TryFrom<L1BatchListParams> for L1BatchQuery {
    type Error = ExplorerError;

    fn try_from(params: L1BatchListParams) -> ExplorerResult<Self> {
        let from = sql_integer("from", params.from)?;
        Ok(ListQuery {
            pagination: pagination(params.direction, from, params.limit, params.offset)?,
            filter: (),
        })
    }
}

impl TryFrom<TransactionListParams> for TransactionQuery {
    type Error = ExplorerError;

    fn try_from(params: TransactionListParams) -> ExplorerResult<Self> {
        let filters = [
            params.account_address.map(TransactionFilter::Account),
            params.contract_address.map(TransactionFilter::Contract),
            sql_integer("blockNumber", params.block_number)?.map(TransactionFilter::Block),
            sql_integer("l1BatchNumber", params.l1_batch_number)?.map(TransactionFilter::L1Batch),
        ];
        let mut given = filters.into_iter().flatten();
        let filter = match (given.next(), given.next()) {
            (None, _) => TransactionFilter::All,
            (Some(filter), None) => filter,
            (Some(_), Some(_)) => {
                return Err(ExplorerError::invalid(
                    "accountAddress, contractAddress, blockNumber and l1BatchNumber are mutually exclusive",
                ));
            }
        };

        let cursor = position(params.from_block_number, params.from_tx_index, "fromTxIndex")?;
        Ok(ListQuery {
            pagination: pagination(params.direction, cursor, params.limit, params.offset)?,
            filter,
        })
    }
}

impl TryFrom<EventListParams> for EventQuery {
    type Error = ExplorerError;

    fn try_from(params: EventListParams) -> ExplorerResult<Self> {
        let filter = match params.contract_address {
            Some(address) => EventFilter::Contract(address),
            None => EventFilter::All,
        };
        let cursor = position(
            params.from_block_number,
            params.from_log_index,
            "fromLogIndex",
        )?;
        Ok(ListQuery {
            pagination: pagination(params.direction, cursor, params.limit, params.offset)?,
            filter,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_transaction_params() {
        let params: TransactionListParams = serde_json::from_value(json!({
            "direction": "older",
            "limit": 5,
            "fromBlockNumber": 10,
            "fromTxIndex": 2,
            "accountAddress": "0x00000000000000000000000000000000000000aa"
        }))
        .unwrap();
        let query = TransactionQuery::try_from(params).unwrap();
        assert_eq!(
            query.filter,
            TransactionFilter::Account(Address::with_last_byte(0xaa))
        );
        assert_eq!(
            query.pagination.cursor,
            Some(Position {
                block_number: 10,
                index: Some(2)
            })
        );
        assert_eq!(query.pagination.limit, 5);
    }

    #[test]
    fn rejects_unknown_fields_and_combinations() {
        assert!(
            serde_json::from_value::<BlockListParams>(json!({
                "direction": "older",
                "pageSize": 5
            }))
            .is_err()
        );

        let both = TransactionListParams {
            direction: Some(Direction::Older),
            limit: 10,
            block_number: Some(1),
            l1_batch_number: Some(1),
            ..Default::default()
        };
        assert!(TransactionQuery::try_from(both).is_err());

        let dangling_index = EventListParams {
            direction: Some(Direction::Newer),
            limit: 10,
            from_log_index: Some(3),
            ..Default::default()
        };
        assert!(EventQuery::try_from(dangling_index).is_err());

        let no_direction = L1BatchListParams {
            limit: 10,
            ..Default::default()
        };
        assert!(L1BatchQuery::try_from(no_direction).is_err());
    }

    #[test]
    fn numbers_beyond_sqlite_range_are_invalid() {
        let blocks = BlockListParams {
            direction: Some(Direction::Older),
            limit: 10,
            from: Some(u64::MAX),
            ..Default::default()
        };
        assert!(matches!(
            BlockQuery::try_from(blocks),
            Err(ExplorerError::InvalidRequest(_))
        ));

        let transactions = TransactionListParams {
            direction: Some(Direction::Newer),
            limit: 10,
            block_number: Some(i64::MAX as u64 + 1),
            ..Default::default()
        };
        assert!(matches!(
            TransactionQuery::try_from(transactions),
            Err(ExplorerError::InvalidRequest(_))
        ));

        let events = EventListParams {
            direction: Some(Direction::Newer),
            limit: 10,
            from_block_number: Some(1),
            from_log_index: Some(u64::MAX),
            ..Default::default()
        };
        assert!(matches!(
            EventQuery::try_from(events),
            Err(ExplorerError::InvalidRequest(_))
        ));

        let edge = L1BatchListParams {
            direction: Some(Direction::Older),
            limit: 10,
            from: Some(i64::MAX as u64),
            ..Default::default()
        };
        assert!(L1BatchQuery::try_from(edge).is_ok());
    }

    #[test]
    fn missing_limit_uses_the_default_page_size() {
        let params: BlockListParams =
            serde_json::from_value(json!({ "direction": "older", "l1BatchNumber": 4 })).unwrap();
        let query = BlockQuery::try_from(params).unwrap();
        assert_eq!(query.pagination.limit, DEFAULT_PAGE_SIZE);
        assert_eq!(query.filter, BlockFilter::L1Batch(4));
    }
}
