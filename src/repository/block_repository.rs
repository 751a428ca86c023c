use super::columns::{
    Conditions, Page, hex_column, parse_column, parse_optional_column, parse_optional_time_column,
};
use super::models::{
    AnchorInfo, BaseSystemContractsHashes, BlockDetails, BlockHeader, BlockStatus, BlockSummary,
};
use crate::error::ExplorerResult;
use alloy_primitives::B256;
use rusqlite::{OptionalExtension, Row, params};

pub struct BlockRepository<'a> {
    conn: &'a rusqlite::Connection,
}

/// Number range and size of the blocks sealed into one batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockRange {
    pub first: u64,
    pub last: u64,
    pub count: u64,
}

impl BlockRange {
    pub fn is_contiguous(&self) -> bool {
        self.last - self.first + 1 == self.count
    }
}

impl<'a> BlockRepository<'a> {
    const INSERT_BLOCK: &'static str = "INSERT INTO blocks (
            number, hash, l1_batch_number, timestamp, l1_tx_count, l2_tx_count, status,
            bootloader_hash, default_aa_hash, operator_address, l1_gas_price, l2_fair_gas_price
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)";

    const SELECT_HASH: &'static str = "SELECT hash FROM blocks WHERE number = ?1";

    const SELECT_LAST_NUMBER: &'static str = "SELECT MAX(number) FROM blocks";

    const SELECT_LAST_VERIFIED_NUMBER: &'static str =
        "SELECT MAX(number) FROM blocks WHERE status = 'verified'";

    const SELECT_BATCH_RANGE: &'static str =
        "SELECT MIN(number), MAX(number), COUNT(*) FROM blocks WHERE l1_batch_number = ?1";

    const MARK_BATCH_VERIFIED: &'static str =
        "UPDATE blocks SET status = 'verified' WHERE l1_batch_number = ?1";

    const SELECT_SUMMARY: &'static str =
        "SELECT number, l1_tx_count, l2_tx_count, hash, status, timestamp FROM blocks";

    const SELECT_DETAILS: &'static str = "SELECT b.number, b.l1_batch_number, b.l1_tx_count,
            b.l2_tx_count, b.hash, b.status, b.timestamp,
            l.commit_tx_hash, l.committed_at, l.prove_tx_hash, l.proven_at,
            l.execute_tx_hash, l.executed_at,
            b.bootloader_hash, b.default_aa_hash, b.l1_gas_price, b.l2_fair_gas_price,
            b.operator_address
        FROM blocks b JOIN l1_batches l ON l.number = b.l1_batch_number
        WHERE b.number = ?1";

    pub fn new(conn: &'a rusqlite::Connection) -> Self {
        Self { conn }
    }

    pub fn insert(&self, header: &BlockHeader) -> ExplorerResult<()> {
        self.conn.execute(
            Self::INSERT_BLOCK,
            params![
                header.number,
                hex_column(&header.hash),
                header.l1_batch_number,
                header.timestamp,
                header.l1_tx_count,
                header.l2_tx_count,
                BlockStatus::Sealed.as_str(),
                hex_column(&header.base_system_contracts_hashes.bootloader),
                hex_column(&header.base_system_contracts_hashes.default_aa),
                hex_column(&header.operator_address),
                header.l1_gas_price,
                header.l2_fair_gas_price,
            ],
        )?;
        Ok(())
    }

    pub fn get_hash(&self, number: u64) -> ExplorerResult<Option<B256>> {
        let hash = self
            .conn
            .query_row(Self::SELECT_HASH, params![number], |row| {
                parse_column::<B256>(row, 0)
            })
            .optional()?;
        Ok(hash)
    }

    pub fn last_number(&self) -> ExplorerResult<Option<u64>> {
        Ok(self
            .conn
            .query_row(Self::SELECT_LAST_NUMBER, [], |row| row.get(0))?)
    }

    pub fn last_verified_number(&self) -> ExplorerResult<Option<u64>> {
        Ok(self
            .conn
            .query_row(Self::SELECT_LAST_VERIFIED_NUMBER, [], |row| row.get(0))?)
    }

    pub fn batch_range(&self, l1_batch_number: u64) -> ExplorerResult<Option<BlockRange>> {
        let (first, last, count): (Option<u64>, Option<u64>, u64) = self.conn.query_row(
            Self::SELECT_BATCH_RANGE,
            params![l1_batch_number],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )?;
        Ok(match (first, last) {
            (Some(first), Some(last)) => Some(BlockRange { first, last, count }),
            _ => None,
        })
    }

    pub fn mark_batch_verified(&self, l1_batch_number: u64) -> ExplorerResult<usize> {
        Ok(self
            .conn
            .execute(Self::MARK_BATCH_VERIFIED, params![l1_batch_number])?)
    }

    pub fn get_details(&self, number: u64) -> ExplorerResult<Option<BlockDetails>> {
        let details = self
            .conn
            .query_row(Self::SELECT_DETAILS, params![number], Self::row_to_details)
            .optional()?;
        Ok(details)
    }

    pub fn count(&self, conditions: &Conditions) -> ExplorerResult<u64> {
        let query = format!("SELECT COUNT(*) FROM blocks{}", conditions.where_clause());
        Ok(self
            .conn
            .query_row(&query, conditions.params(), |row| row.get(0))?)
    }

    pub fn list(&self, conditions: &Conditions, page: &Page) -> ExplorerResult<Vec<BlockSummary>> {
        let query = format!(
            "{}{}{}",
            Self::SELECT_SUMMARY,
            conditions.where_clause(),
            page.sql()
        );
        let mut stmt = self.conn.prepare(&query)?;
        let blocks = stmt
            .query_map(conditions.params(), Self::row_to_summary)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(blocks)
    }

    fn row_to_summary(row: &Row) -> rusqlite::Result<BlockSummary> {
        Ok(BlockSummary {
            number: row.get(0)?,
            l1_tx_count: row.get(1)?,
            l2_tx_count: row.get(2)?,
            hash: parse_column(row, 3)?,
            status: parse_column(row, 4)?,
            timestamp: row.get(5)?,
        })
    }

    fn row_to_details(row: &Row) -> rusqlite::Result<BlockDetails> {
        Ok(BlockDetails {
            number: row.get(0)?,
            l1_batch_number: row.get(1)?,
            l1_tx_count: row.get(2)?,
            l2_tx_count: row.get(3)?,
            root_hash: parse_column(row, 4)?,
            status: parse_column(row, 5)?,
            timestamp: row.get(6)?,
            anchors: AnchorInfo {
                commit_tx_hash: parse_optional_column(row, 7)?,
                committed_at: parse_optional_time_column(row, 8)?,
                prove_tx_hash: parse_optional_column(row, 9)?,
                proven_at: parse_optional_time_column(row, 10)?,
                execute_tx_hash: parse_optional_column(row, 11)?,
                executed_at: parse_optional_time_column(row, 12)?,
            },
            base_system_contracts_hashes: BaseSystemContractsHashes {
                bootloader: parse_column(row, 13)?,
                default_aa: parse_column(row, 14)?,
            },
            l1_gas_price: row.get(15)?,
            l2_fair_gas_price: row.get(16)?,
            operator_address: parse_column(row, 17)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::L1BatchRepository;
    use crate::testing::{header, test_db};

    #[test]
    fn batch_range_reports_gaps() {
        let db = test_db();
        let batches = L1BatchRepository::new(&db.conn);
        let blocks = BlockRepository::new(&db.conn);

        for number in [1, 2, 4] {
            let header = header(number, 1);
            batches.upsert_for_block(&header).unwrap();
            blocks.insert(&header).unwrap();
        }

        let range = blocks.batch_range(1).unwrap().unwrap();
        assert_eq!(range, BlockRange { first: 1, last: 4, count: 3 });
        assert!(!range.is_contiguous());
        assert!(blocks.batch_range(2).unwrap().is_none());
    }

    #[test]
    fn details_carry_parent_batch_anchors() {
        let db = test_db();
        let header = header(7, 3);
        L1BatchRepository::new(&db.conn)
            .upsert_for_block(&header)
            .unwrap();
        let blocks = BlockRepository::new(&db.conn);
        blocks.insert(&header).unwrap();

        let details = blocks.get_details(7).unwrap().unwrap();
        assert_eq!(details.root_hash, header.hash);
        assert_eq!(details.l1_batch_number, 3);
        assert_eq!(details.status, BlockStatus::Sealed);
        assert_eq!(details.anchors, AnchorInfo::default());
        assert!(blocks.get_details(8).unwrap().is_none());
        assert_eq!(blocks.get_hash(7).unwrap(), Some(header.hash));
        assert_eq!(blocks.last_number().unwrap(), Some(7));
        assert_eq!(blocks.last_verified_number().unwrap(), None);
    }
}
