use super::columns::hex_column;
use crate::error::ExplorerResult;
use alloy_primitives::Address;
use rusqlite::{Connection, OptionalExtension, params};

pub struct AccountRepository<'a> {
    conn: &'a Connection,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Nonces {
    pub sealed: u64,
    pub verified: u64,
}

impl<'a> AccountRepository<'a> {
    const TOUCH: &'static str = "INSERT OR IGNORE INTO accounts (address) VALUES (?1)";

    const RAISE_SEALED_NONCE: &'static str = "INSERT INTO accounts (address, sealed_nonce)
        VALUES (?1, ?2)
        ON CONFLICT(address) DO UPDATE SET
            sealed_nonce = MAX(sealed_nonce, excluded.sealed_nonce)";

    // Verified nonce of every L2 initiator in the batch becomes one past its
    // highest nonce there. Never lowered.
    const APPLY_VERIFIED_NONCES: &'static str = "UPDATE accounts SET verified_nonce = MAX(
            verified_nonce,
            COALESCE((
                SELECT MAX(t.nonce) + 1 FROM transactions t
                WHERE t.l1_batch_number = ?1
                  AND t.is_l1_originated = 0
                  AND t.initiator_address = accounts.address
            ), 0)
        )
        WHERE address IN (
            SELECT initiator_address FROM transactions
            WHERE l1_batch_number = ?1 AND is_l1_originated = 0
        )";

    const SELECT_NONCES: &'static str =
        "SELECT sealed_nonce, verified_nonce FROM accounts WHERE address = ?1";

    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    pub fn touch(&self, address: &Address) -> ExplorerResult<()> {
        self.conn.execute(Self::TOUCH, params![hex_column(address)])?;
        Ok(())
    }

    pub fn raise_sealed_nonce(&self, address: &Address, sealed_nonce: u64) -> ExplorerResult<()> {
        self.conn.execute(
            Self::RAISE_SEALED_NONCE,
            params![hex_column(address), sealed_nonce],
        )?;
        Ok(())
    }

    pub fn apply_verified_nonces(&self, l1_batch_number: u64) -> ExplorerResult<usize> {
        Ok(self
            .conn
            .execute(Self::APPLY_VERIFIED_NONCES, params![l1_batch_number])?)
    }

    pub fn get_nonces(&self, address: &Address) -> ExplorerResult<Option<Nonces>> {
        let nonces = self
            .conn
            .query_row(Self::SELECT_NONCES, params![hex_column(address)], |row| {
                Ok(Nonces {
                    sealed: row.get(0)?,
                    verified: row.get(1)?,
                })
            })
            .optional()?;
        Ok(nonces)
    }
}
