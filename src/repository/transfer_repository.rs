use super::columns::{hex_column, parse_column, parse_optional_column};
use super::models::{Erc20Transfer, TokenInfo, TokenMovement};
use crate::error::ExplorerResult;
use alloy_primitives::{Address, B256};
use rusqlite::{Row, params};

pub struct TransferRepository<'a> {
    conn: &'a rusqlite::Connection,
}

impl<'a> TransferRepository<'a> {
    const INSERT_TRANSFER: &'static str = "INSERT OR IGNORE INTO transfers (
            transaction_hash, log_index, token_address,
            from_address, to_address, value, block_number
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)";

    const SELECT_FOR_TRANSACTION: &'static str = "SELECT tr.token_address, tr.from_address,
            tr.to_address, tr.value, tr.log_index,
            tk.l1_address, tk.l2_address, tk.name, tk.symbol, tk.decimals, tk.usd_price
        FROM transfers tr LEFT JOIN tokens tk ON tk.address = tr.token_address
        WHERE tr.transaction_hash = ?1
        ORDER BY tr.log_index";

    pub fn new(conn: &'a rusqlite::Connection) -> Self {
        Self { conn }
    }

    pub fn insert_batch(
        &self,
        transaction_hash: &B256,
        block_number: u64,
        movements: &[TokenMovement],
    ) -> ExplorerResult<usize> {
        let mut stmt = self.conn.prepare_cached(Self::INSERT_TRANSFER)?;
        let mut count = 0;

        for movement in movements {
            count += stmt.execute(params![
                hex_column(transaction_hash),
                movement.log_index,
                hex_column(&movement.token),
                hex_column(&movement.from),
                hex_column(&movement.to),
                movement.amount.to_string(),
                block_number,
            ])?;
        }

        Ok(count)
    }

    pub fn for_transaction(&self, transaction_hash: &B256) -> ExplorerResult<Vec<Erc20Transfer>> {
        let mut stmt = self.conn.prepare_cached(Self::SELECT_FOR_TRANSACTION)?;
        let transfers = stmt
            .query_map(params![hex_column(transaction_hash)], Self::row_to_transfer)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(transfers)
    }

    fn row_to_transfer(row: &Row) -> rusqlite::Result<Erc20Transfer> {
        let token_address: Address = parse_column(row, 0)?;
        let token_info = match parse_optional_column::<Address>(row, 6)? {
            Some(l2_address) => TokenInfo {
                address: token_address,
                l1_address: parse_optional_column(row, 5)?,
                l2_address,
                name: row.get(7)?,
                symbol: row.get(8)?,
                decimals: row.get(9)?,
                usd_price: row.get(10)?,
            },
            None => TokenInfo::partial(token_address),
        };

        Ok(Erc20Transfer {
            token_info,
            from: parse_column(row, 1)?,
            to: parse_column(row, 2)?,
            amount: parse_column(row, 3)?,
            log_index: row.get(4)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::TokenRepository;
    use crate::testing::{seed_block, test_db, test_token};
    use alloy_primitives::U256;

    #[test]
    fn transfers_come_back_with_token_metadata() {
        let db = test_db();
        let tx_hash = seed_block(&db.conn, 1, 1);
        let known = Address::repeat_byte(0x10);
        let unknown = Address::repeat_byte(0x20);
        TokenRepository::new(&db.conn)
            .upsert(&test_token(known))
            .unwrap();

        let movement = |token, log_index| TokenMovement {
            token,
            from: Address::repeat_byte(0xa1),
            to: Address::repeat_byte(0xb2),
            amount: U256::from(1_000u64),
            log_index,
        };
        let transfers = TransferRepository::new(&db.conn);
        let inserted = transfers
            .insert_batch(&tx_hash, 1, &[movement(unknown, 3), movement(known, 1)])
            .unwrap();
        assert_eq!(inserted, 2);

        let stored = transfers.for_transaction(&tx_hash).unwrap();
        assert_eq!(stored.len(), 2);
        assert_eq!(stored[0].log_index, 1);
        assert_eq!(stored[0].token_info.symbol.as_deref(), Some("TST"));
        assert_eq!(stored[1].token_info, TokenInfo::partial(unknown));
        assert_eq!(stored[1].amount, U256::from(1_000u64));
    }
}
