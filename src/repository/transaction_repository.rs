use super::columns::{
    Conditions, Page, hex_column, parse_column, parse_json_column, parse_optional_column,
    parse_optional_json_column, parse_time_column, time_column,
};
use super::event_repository::EventRepository;
use super::models::{
    BlockStatus, StoredTransfer, TransactionData, TransactionDetails, TransactionRecord,
    TransferSummary,
};
use super::token_repository::TokenRepository;
use super::transfer_repository::TransferRepository;
use crate::error::ExplorerResult;
use alloy_primitives::{Address, B256};
use rusqlite::{OptionalExtension, Row, params};

pub struct TransactionRepository<'a> {
    conn: &'a rusqlite::Connection,
}

impl<'a> TransactionRepository<'a> {
    const INSERT_TRANSACTION: &'static str = "INSERT INTO transactions (
            hash, block_number, index_in_block, l1_batch_number, nonce, initiator_address,
            to_address, is_l1_originated, tx_type, calldata, value, fee, factory_deps,
            received_at, balance_changes, transfer
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)";

    const INSERT_ACCOUNT_INDEX: &'static str = "INSERT OR IGNORE INTO transaction_accounts (
            address, transaction_hash, block_number, index_in_block
        ) VALUES (?1, ?2, ?3, ?4)";

    const COUNT_ALL: &'static str = "SELECT COUNT(*) FROM transactions";

    const SELECT_DETAILS: &'static str = "SELECT t.hash, t.nonce, t.block_number, b.hash,
            t.l1_batch_number, t.index_in_block, b.status, t.fee, t.is_l1_originated,
            t.initiator_address, t.received_at, b.timestamp, t.calldata, t.to_address,
            t.factory_deps, t.value, t.balance_changes, t.transfer, t.tx_type,
            l.commit_tx_hash, l.prove_tx_hash, l.execute_tx_hash
        FROM transactions t
        JOIN blocks b ON b.number = t.block_number
        JOIN l1_batches l ON l.number = t.l1_batch_number";

    pub fn new(conn: &'a rusqlite::Connection) -> Self {
        Self { conn }
    }

    pub fn insert(&self, record: &TransactionRecord) -> ExplorerResult<()> {
        let factory_deps = record
            .factory_deps
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        let transfer = record
            .transfer
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        self.conn.execute(
            Self::INSERT_TRANSACTION,
            params![
                hex_column(&record.hash),
                record.block_number,
                record.index_in_block,
                record.l1_batch_number,
                record.nonce,
                hex_column(&record.initiator_address),
                record.to_address.as_ref().map(hex_column),
                record.is_l1_originated,
                record.tx_type,
                record.calldata.to_vec(),
                record.value.to_string(),
                record.fee.to_string(),
                factory_deps,
                time_column(&record.received_at),
                serde_json::to_string(&record.balance_changes)?,
                transfer,
            ],
        )?;
        Ok(())
    }

    /// Records the addresses a transaction touches, for the account filter.
    pub fn index_accounts<'b>(
        &self,
        record: &TransactionRecord,
        addresses: impl IntoIterator<Item = &'b Address>,
    ) -> ExplorerResult<()> {
        let mut stmt = self.conn.prepare_cached(Self::INSERT_ACCOUNT_INDEX)?;
        for address in addresses {
            stmt.execute(params![
                hex_column(address),
                hex_column(&record.hash),
                record.block_number,
                record.index_in_block,
            ])?;
        }
        Ok(())
    }

    pub fn count_all(&self) -> ExplorerResult<u64> {
        Ok(self.conn.query_row(Self::COUNT_ALL, [], |row| row.get(0))?)
    }

    pub fn get(&self, hash: &B256) -> ExplorerResult<Option<TransactionDetails>> {
        let query = format!("{} WHERE t.hash = ?1", Self::SELECT_DETAILS);
        let row = self
            .conn
            .query_row(&query, params![hex_column(hash)], Self::row_to_details)
            .optional()?;
        row.map(|(details, transfer)| self.hydrate(details, transfer))
            .transpose()
    }

    /// Conditions may only reference the `t` alias.
    pub fn count(&self, conditions: &Conditions) -> ExplorerResult<u64> {
        let query = format!(
            "SELECT COUNT(*) FROM transactions t{}",
            conditions.where_clause()
        );
        Ok(self
            .conn
            .query_row(&query, conditions.params(), |row| row.get(0))?)
    }

    pub fn list(
        &self,
        conditions: &Conditions,
        page: &Page,
    ) -> ExplorerResult<Vec<TransactionDetails>> {
        let query = format!(
            "{}{}{}",
            Self::SELECT_DETAILS,
            conditions.where_clause(),
            page.sql()
        );
        let mut stmt = self.conn.prepare(&query)?;
        let rows = stmt
            .query_map(conditions.params(), Self::row_to_details)?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(details, transfer)| self.hydrate(details, transfer))
            .collect()
    }

    fn hydrate(
        &self,
        mut details: TransactionDetails,
        transfer: Option<StoredTransfer>,
    ) -> ExplorerResult<TransactionDetails> {
        details.logs = EventRepository::new(self.conn).for_transaction(&details.transaction_hash)?;
        details.erc20_transfers =
            TransferRepository::new(self.conn).for_transaction(&details.transaction_hash)?;
        details.transfer = match transfer {
            Some(stored) => Some(TransferSummary {
                from: stored.from,
                to: stored.to,
                amount: stored.amount,
                token_info: TokenRepository::new(self.conn).token_info(&stored.token_address)?,
            }),
            None => None,
        };
        Ok(details)
    }

    fn row_to_details(
        row: &Row,
    ) -> rusqlite::Result<(TransactionDetails, Option<StoredTransfer>)> {
        let status: BlockStatus = parse_column(row, 6)?;
        let details = TransactionDetails {
            transaction_hash: parse_column(row, 0)?,
            nonce: row.get(1)?,
            block_number: row.get(2)?,
            block_hash: parse_column(row, 3)?,
            l1_batch_number: row.get(4)?,
            index_in_block: row.get(5)?,
            status: status.into(),
            fee: parse_column(row, 7)?,
            is_l1_originated: row.get(8)?,
            initiator_address: parse_column(row, 9)?,
            received_at: parse_time_column(row, 10)?,
            miniblock_timestamp: row.get(11)?,
            data: TransactionData {
                calldata: row.get::<_, Vec<u8>>(12)?.into(),
                contract_address: parse_optional_column(row, 13)?,
                factory_deps: parse_optional_json_column(row, 14)?,
                value: parse_column(row, 15)?,
            },
            logs: Vec::new(),
            balance_changes: parse_json_column(row, 16)?,
            erc20_transfers: Vec::new(),
            transfer: None,
            tx_type: row.get(18)?,
            eth_commit_tx_hash: parse_optional_column(row, 19)?,
            eth_prove_tx_hash: parse_optional_column(row, 20)?,
            eth_execute_tx_hash: parse_optional_column(row, 21)?,
        };
        Ok((details, parse_optional_json_column(row, 17)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::models::{BalanceChange, ETH_ADDRESS, TransactionStatus};
    use crate::testing::{seed_block, test_db, transaction_record};
    use alloy_primitives::U256;

    #[test]
    fn details_round_trip_with_transfer_summary() {
        let db = test_db();
        seed_block(&db.conn, 1, 1);
        let transactions = TransactionRepository::new(&db.conn);

        let mut record = transaction_record(1, 1, 1);
        record.balance_changes = vec![BalanceChange {
            address: record.initiator_address,
            token_address: ETH_ADDRESS,
            balance_before: U256::from(10u64),
            balance_after: U256::from(4u64),
        }];
        record.transfer = Some(StoredTransfer {
            from: record.initiator_address,
            to: Address::repeat_byte(0xbb),
            amount: U256::from(6u64),
            token_address: ETH_ADDRESS,
        });
        transactions.insert(&record).unwrap();

        let details = transactions.get(&record.hash).unwrap().unwrap();
        assert_eq!(details.status, TransactionStatus::Included);
        assert_eq!(details.balance_changes, record.balance_changes);
        assert_eq!(details.received_at, record.received_at);
        let transfer = details.transfer.unwrap();
        assert_eq!(transfer.amount, U256::from(6u64));
        assert_eq!(transfer.token_info.symbol.as_deref(), Some("ETH"));
        assert!(details.eth_commit_tx_hash.is_none());
        assert_eq!(transactions.count_all().unwrap(), 2);
    }

    #[test]
    fn account_index_backs_the_account_filter() {
        let db = test_db();
        seed_block(&db.conn, 1, 1);
        let transactions = TransactionRepository::new(&db.conn);
        let record = transaction_record(1, 1, 1);
        let watched = Address::repeat_byte(0x99);
        transactions.insert(&record).unwrap();
        transactions
            .index_accounts(&record, [&record.initiator_address, &watched, &watched])
            .unwrap();

        let conditions = Conditions::new().with(
            "t.hash IN (SELECT transaction_hash FROM transaction_accounts WHERE address = ?)",
            vec![Box::new(hex_column(&watched))],
        );
        assert_eq!(transactions.count(&conditions).unwrap(), 1);
    }
}
