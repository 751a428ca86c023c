use super::columns::{hex_column, parse_column, parse_optional_column};
use super::models::{AccountBalance, TokenInfo};
use crate::error::ExplorerResult;
use alloy_primitives::{Address, U256};
use rusqlite::{Connection, OptionalExtension, params};
use std::collections::BTreeMap;

pub struct BalanceRepository<'a> {
    conn: &'a Connection,
}

impl<'a> BalanceRepository<'a> {
    const SELECT_BALANCE: &'static str =
        "SELECT balance FROM balances WHERE address = ?1 AND token_address = ?2";

    const UPSERT_BALANCE: &'static str =
        "INSERT OR REPLACE INTO balances (address, token_address, balance) VALUES (?1, ?2, ?3)";

    const DELETE_BALANCE: &'static str =
        "DELETE FROM balances WHERE address = ?1 AND token_address = ?2";

    const SELECT_FOR_ADDRESS: &'static str = "SELECT b.token_address, b.balance,
            tk.l1_address, tk.l2_address, tk.name, tk.symbol, tk.decimals, tk.usd_price
        FROM balances b LEFT JOIN tokens tk ON tk.address = b.token_address
        WHERE b.address = ?1
        ORDER BY b.token_address";

    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Stored balance, zero when nothing was recorded.
    pub fn get(&self, address: &Address, token: &Address) -> ExplorerResult<U256> {
        let balance = self
            .conn
            .query_row(
                Self::SELECT_BALANCE,
                params![hex_column(address), hex_column(token)],
                |row| parse_column::<U256>(row, 0),
            )
            .optional()?;
        Ok(balance.unwrap_or(U256::ZERO))
    }

    pub fn set(&self, address: &Address, token: &Address, balance: &U256) -> ExplorerResult<()> {
        if balance.is_zero() {
            // Remove zero balances
            self.conn.execute(
                Self::DELETE_BALANCE,
                params![hex_column(address), hex_column(token)],
            )?;
        } else {
            self.conn.execute(
                Self::UPSERT_BALANCE,
                params![hex_column(address), hex_column(token), balance.to_string()],
            )?;
        }
        Ok(())
    }

    pub fn for_address(&self, address: &Address) -> ExplorerResult<BTreeMap<Address, AccountBalance>> {
        let mut stmt = self.conn.prepare_cached(Self::SELECT_FOR_ADDRESS)?;
        let rows = stmt
            .query_map(params![hex_column(address)], |row| {
                let token_address: Address = parse_column(row, 0)?;
                let token_info = match parse_optional_column::<Address>(row, 3)? {
                    Some(l2_address) => TokenInfo {
                        address: token_address,
                        l1_address: parse_optional_column(row, 2)?,
                        l2_address,
                        name: row.get(4)?,
                        symbol: row.get(5)?,
                        decimals: row.get(6)?,
                        usd_price: row.get(7)?,
                    },
                    None => TokenInfo::partial(token_address),
                };
                Ok((
                    token_address,
                    AccountBalance {
                        balance: parse_column(row, 1)?,
                        token_info,
                    },
                ))
            })?
            .collect::<Result<BTreeMap<_, _>, _>>()?;
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::models::ETH_ADDRESS;
    use crate::testing::test_db;

    #[test]
    fn zero_balances_are_dropped() {
        let db = test_db();
        let balances = BalanceRepository::new(&db.conn);
        let holder = Address::repeat_byte(0x0a);
        let token = Address::repeat_byte(0x0b);

        balances.set(&holder, &ETH_ADDRESS, &U256::from(5u64)).unwrap();
        balances.set(&holder, &token, &U256::from(7u64)).unwrap();
        assert_eq!(balances.get(&holder, &token).unwrap(), U256::from(7u64));

        balances.set(&holder, &token, &U256::ZERO).unwrap();
        let all = balances.for_address(&holder).unwrap();
        assert_eq!(all.len(), 1);
        let eth = &all[&ETH_ADDRESS];
        assert_eq!(eth.balance, U256::from(5u64));
        assert_eq!(eth.token_info.symbol.as_deref(), Some("ETH"));
        assert_eq!(balances.get(&holder, &token).unwrap(), U256::ZERO);
    }
}
