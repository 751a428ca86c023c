use super::columns::{
    Conditions, Page, hex_column, parse_column, parse_optional_column, parse_optional_time_column,
    time_column,
};
use super::models::{
    AnchorInfo, AnchorPhase, BaseSystemContractsHashes, BlockHeader, BlockStatus, L1BatchDetails,
    L1BatchSummary,
};
use crate::error::ExplorerResult;
use alloy_primitives::B256;
use chrono::{DateTime, Utc};
use rusqlite::{OptionalExtension, Row, params};

pub struct L1BatchRepository<'a> {
    conn: &'a rusqlite::Connection,
}

impl<'a> L1BatchRepository<'a> {
    // The first block of a batch fixes its timestamp, hashes and gas prices;
    // later blocks only add to the counters.
    const UPSERT_FOR_BLOCK: &'static str = "INSERT INTO l1_batches (
            number, timestamp, l1_tx_count, l2_tx_count, status,
            bootloader_hash, default_aa_hash, l1_gas_price, l2_fair_gas_price
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
        ON CONFLICT(number) DO UPDATE SET
            l1_tx_count = l1_tx_count + excluded.l1_tx_count,
            l2_tx_count = l2_tx_count + excluded.l2_tx_count";

    const SELECT_STATUS: &'static str = "SELECT status FROM l1_batches WHERE number = ?1";

    const SELECT_LAST_NUMBER: &'static str = "SELECT MAX(number) FROM l1_batches";

    const SELECT_FIRST_UNVERIFIED_NUMBER: &'static str =
        "SELECT MIN(number) FROM l1_batches WHERE status != 'verified'";

    const SELECT_LAST_VERIFIED_NUMBER: &'static str =
        "SELECT MAX(number) FROM l1_batches WHERE status = 'verified'";

    const MARK_VERIFIED: &'static str =
        "UPDATE l1_batches SET status = 'verified' WHERE number = ?1";

    const SELECT_SUMMARY: &'static str =
        "SELECT number, l1_tx_count, l2_tx_count, status, timestamp FROM l1_batches";

    const SELECT_DETAILS: &'static str = "SELECT number, l1_tx_count, l2_tx_count, status,
            timestamp, commit_tx_hash, committed_at, prove_tx_hash, proven_at,
            execute_tx_hash, executed_at, bootloader_hash, default_aa_hash,
            l1_gas_price, l2_fair_gas_price
        FROM l1_batches WHERE number = ?1";

    const SELECT_ANCHORS: &'static str = "SELECT commit_tx_hash, committed_at, prove_tx_hash,
            proven_at, execute_tx_hash, executed_at
        FROM l1_batches WHERE number = ?1";

    pub fn new(conn: &'a rusqlite::Connection) -> Self {
        Self { conn }
    }

    pub fn upsert_for_block(&self, header: &BlockHeader) -> ExplorerResult<()> {
        self.conn.execute(
            Self::UPSERT_FOR_BLOCK,
            params![
                header.l1_batch_number,
                header.timestamp,
                header.l1_tx_count,
                header.l2_tx_count,
                BlockStatus::Sealed.as_str(),
                hex_column(&header.base_system_contracts_hashes.bootloader),
                hex_column(&header.base_system_contracts_hashes.default_aa),
                header.l1_gas_price,
                header.l2_fair_gas_price,
            ],
        )?;
        Ok(())
    }

    pub fn get_status(&self, number: u64) -> ExplorerResult<Option<BlockStatus>> {
        let status = self
            .conn
            .query_row(Self::SELECT_STATUS, params![number], |row| {
                parse_column::<BlockStatus>(row, 0)
            })
            .optional()?;
        Ok(status)
    }

    pub fn last_number(&self) -> ExplorerResult<Option<u64>> {
        Ok(self
            .conn
            .query_row(Self::SELECT_LAST_NUMBER, [], |row| row.get(0))?)
    }

    /// Oldest batch still waiting for its execute anchor.
    pub fn first_unverified_number(&self) -> ExplorerResult<Option<u64>> {
        Ok(self
            .conn
            .query_row(Self::SELECT_FIRST_UNVERIFIED_NUMBER, [], |row| row.get(0))?)
    }

    pub fn last_verified_number(&self) -> ExplorerResult<Option<u64>> {
        Ok(self
            .conn
            .query_row(Self::SELECT_LAST_VERIFIED_NUMBER, [], |row| row.get(0))?)
    }

    pub fn get_anchors(&self, number: u64) -> ExplorerResult<Option<AnchorInfo>> {
        let anchors = self
            .conn
            .query_row(Self::SELECT_ANCHORS, params![number], |row| {
                Self::row_to_anchors(row, 0)
            })
            .optional()?;
        Ok(anchors)
    }

    pub fn record_anchor(
        &self,
        number: u64,
        phase: AnchorPhase,
        tx_hash: &B256,
        confirmed_at: &DateTime<Utc>,
    ) -> ExplorerResult<()> {
        let (hash_column, time_column_name) = Self::anchor_columns(phase);
        let query = format!(
            "UPDATE l1_batches SET {hash_column} = ?1, {time_column_name} = ?2 WHERE number = ?3"
        );
        self.conn.execute(
            &query,
            params![hex_column(tx_hash), time_column(confirmed_at), number],
        )?;
        Ok(())
    }

    pub fn mark_verified(&self, number: u64) -> ExplorerResult<()> {
        self.conn.execute(Self::MARK_VERIFIED, params![number])?;
        Ok(())
    }

    pub fn get_details(&self, number: u64) -> ExplorerResult<Option<L1BatchDetails>> {
        let details = self
            .conn
            .query_row(Self::SELECT_DETAILS, params![number], Self::row_to_details)
            .optional()?;
        Ok(details)
    }

    pub fn count(&self, conditions: &Conditions) -> ExplorerResult<u64> {
        let query = format!("SELECT COUNT(*) FROM l1_batches{}", conditions.where_clause());
        Ok(self
            .conn
            .query_row(&query, conditions.params(), |row| row.get(0))?)
    }

    pub fn list(
        &self,
        conditions: &Conditions,
        page: &Page,
    ) -> ExplorerResult<Vec<L1BatchSummary>> {
        let query = format!(
            "{}{}{}",
            Self::SELECT_SUMMARY,
            conditions.where_clause(),
            page.sql()
        );
        let mut stmt = self.conn.prepare(&query)?;
        let batches = stmt
            .query_map(conditions.params(), |row| {
                Ok(L1BatchSummary {
                    number: row.get(0)?,
                    l1_tx_count: row.get(1)?,
                    l2_tx_count: row.get(2)?,
                    status: parse_column(row, 3)?,
                    timestamp: row.get(4)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(batches)
    }

    fn anchor_columns(phase: AnchorPhase) -> (&'static str, &'static str) {
        match phase {
            AnchorPhase::Commit => ("commit_tx_hash", "committed_at"),
            AnchorPhase::Prove => ("prove_tx_hash", "proven_at"),
            AnchorPhase::Execute => ("execute_tx_hash", "executed_at"),
        }
    }

    fn row_to_anchors(row: &Row, start: usize) -> rusqlite::Result<AnchorInfo> {
        Ok(AnchorInfo {
            commit_tx_hash: parse_optional_column(row, start)?,
            committed_at: parse_optional_time_column(row, start + 1)?,
            prove_tx_hash: parse_optional_column(row, start + 2)?,
            proven_at: parse_optional_time_column(row, start + 3)?,
            execute_tx_hash: parse_optional_column(row, start + 4)?,
            executed_at: parse_optional_time_column(row, start + 5)?,
        })
    }

    fn row_to_details(row: &Row) -> rusqlite::Result<L1BatchDetails> {
        Ok(L1BatchDetails {
            number: row.get(0)?,
            l1_tx_count: row.get(1)?,
            l2_tx_count: row.get(2)?,
            status: parse_column(row, 3)?,
            timestamp: row.get(4)?,
            anchors: Self::row_to_anchors(row, 5)?,
            base_system_contracts_hashes: BaseSystemContractsHashes {
                bootloader: parse_column(row, 11)?,
                default_aa: parse_column(row, 12)?,
            },
            l1_gas_price: row.get(13)?,
            l2_fair_gas_price: row.get(14)?,
        })
    }
}
