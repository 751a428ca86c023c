use super::columns::{hex_column, parse_column, parse_optional_json_column};
use super::models::ContractRecord;
use crate::error::ExplorerResult;
use alloy_primitives::Address;
use rusqlite::{Connection, OptionalExtension, Row, params};

pub struct ContractRepository<'a> {
    conn: &'a Connection,
}

impl<'a> ContractRepository<'a> {
    const INSERT_CONTRACT: &'static str = "INSERT OR IGNORE INTO contracts (
            address, creator_address, creator_tx_hash, created_in_block_number, bytecode
        ) VALUES (?1, ?2, ?3, ?4, ?5)";

    const SELECT_CONTRACT: &'static str = "SELECT address, creator_address, creator_tx_hash,
            created_in_block_number, bytecode, total_transactions, verification_info
        FROM contracts WHERE address = ?1";

    const EXISTS: &'static str = "SELECT EXISTS(SELECT 1 FROM contracts WHERE address = ?1)";

    const INCREMENT_TRANSACTIONS: &'static str =
        "UPDATE contracts SET total_transactions = total_transactions + 1 WHERE address = ?1";

    const SET_VERIFICATION_INFO: &'static str =
        "UPDATE contracts SET verification_info = ?1 WHERE address = ?2 AND verification_info IS NULL";

    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    pub fn insert(&self, contract: &ContractRecord) -> ExplorerResult<()> {
        self.conn.execute(
            Self::INSERT_CONTRACT,
            params![
                hex_column(&contract.address),
                hex_column(&contract.creator_address),
                hex_column(&contract.creator_tx_hash),
                contract.created_in_block_number,
                contract.bytecode.to_vec(),
            ],
        )?;
        Ok(())
    }

    pub fn get(&self, address: &Address) -> ExplorerResult<Option<ContractRecord>> {
        let contract = self
            .conn
            .query_row(
                Self::SELECT_CONTRACT,
                params![hex_column(address)],
                Self::row_to_contract,
            )
            .optional()?;
        Ok(contract)
    }

    pub fn exists(&self, address: &Address) -> ExplorerResult<bool> {
        Ok(self
            .conn
            .query_row(Self::EXISTS, params![hex_column(address)], |row| row.get(0))?)
    }

    /// No-op for addresses that are not contracts.
    pub fn increment_transactions(&self, address: &Address) -> ExplorerResult<()> {
        self.conn
            .execute(Self::INCREMENT_TRANSACTIONS, params![hex_column(address)])?;
        Ok(())
    }

    /// Returns false if the contract is unknown or already verified.
    pub fn set_verification_info(
        &self,
        address: &Address,
        info: &serde_json::Value,
    ) -> ExplorerResult<bool> {
        let updated = self.conn.execute(
            Self::SET_VERIFICATION_INFO,
            params![serde_json::to_string(info)?, hex_column(address)],
        )?;
        Ok(updated > 0)
    }

    fn row_to_contract(row: &Row) -> rusqlite::Result<ContractRecord> {
        Ok(ContractRecord {
            address: parse_column(row, 0)?,
            creator_address: parse_column(row, 1)?,
            creator_tx_hash: parse_column(row, 2)?,
            created_in_block_number: row.get(3)?,
            bytecode: row.get::<_, Vec<u8>>(4)?.into(),
            total_transactions: row.get(5)?,
            verification_info: parse_optional_json_column(row, 6)?,
        })
    }
}
