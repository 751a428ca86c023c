use super::columns::{hex_column, parse_column, parse_optional_column};
use super::models::{Token, TokenInfo};
use crate::error::ExplorerResult;
use alloy_primitives::Address;
use rusqlite::{OptionalExtension, Row, params};

pub struct TokenRepository<'a> {
    conn: &'a rusqlite::Connection,
}

impl<'a> TokenRepository<'a> {
    const INSERT_TOKEN: &'static str = "INSERT OR IGNORE INTO tokens (
            address, l1_address, l2_address, name, symbol, decimals, usd_price
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)";

    // Registration refreshes metadata but keeps a known price.
    const UPSERT_TOKEN: &'static str = "INSERT INTO tokens (
            address, l1_address, l2_address, name, symbol, decimals, usd_price
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
        ON CONFLICT(address) DO UPDATE SET
            l1_address = excluded.l1_address,
            l2_address = excluded.l2_address,
            name = excluded.name,
            symbol = excluded.symbol,
            decimals = excluded.decimals,
            usd_price = COALESCE(excluded.usd_price, tokens.usd_price)";

    const UPDATE_PRICE: &'static str = "UPDATE tokens SET usd_price = ?1 WHERE address = ?2";

    const SELECT_TOKEN: &'static str = "SELECT address, l1_address, l2_address, name, symbol,
            decimals, usd_price
        FROM tokens WHERE address = ?1";

    const SELECT_ALL: &'static str = "SELECT address, l1_address, l2_address, name, symbol,
            decimals, usd_price
        FROM tokens ORDER BY address";

    pub fn new(conn: &'a rusqlite::Connection) -> Self {
        Self { conn }
    }

    pub fn insert_if_absent(&self, token: &Token) -> ExplorerResult<()> {
        self.write(Self::INSERT_TOKEN, token)
    }

    pub fn upsert(&self, token: &Token) -> ExplorerResult<()> {
        self.write(Self::UPSERT_TOKEN, token)
    }

    /// Returns false when the token is unknown.
    pub fn update_price(&self, address: &Address, usd_price: &str) -> ExplorerResult<bool> {
        let updated = self
            .conn
            .execute(Self::UPDATE_PRICE, params![usd_price, hex_column(address)])?;
        Ok(updated > 0)
    }

    pub fn get(&self, address: &Address) -> ExplorerResult<Option<Token>> {
        let token = self
            .conn
            .query_row(Self::SELECT_TOKEN, params![hex_column(address)], Self::row_to_token)
            .optional()?;
        Ok(token)
    }

    /// Metadata for embedding in balances and transfers. Unknown tokens get an
    /// info record carrying the address only.
    pub fn token_info(&self, address: &Address) -> ExplorerResult<TokenInfo> {
        Ok(self
            .get(address)?
            .map(TokenInfo::from)
            .unwrap_or_else(|| TokenInfo::partial(*address)))
    }

    pub fn list(&self) -> ExplorerResult<Vec<Token>> {
        let mut stmt = self.conn.prepare(Self::SELECT_ALL)?;
        let tokens = stmt
            .query_map([], Self::row_to_token)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(tokens)
    }

    fn write(&self, query: &str, token: &Token) -> ExplorerResult<()> {
        self.conn.execute(
            query,
            params![
                hex_column(&token.address),
                token.l1_address.as_ref().map(hex_column),
                hex_column(&token.l2_address),
                token.name,
                token.symbol,
                token.decimals,
                token.usd_price,
            ],
        )?;
        Ok(())
    }

    fn row_to_token(row: &Row) -> rusqlite::Result<Token> {
        Ok(Token {
            address: parse_column(row, 0)?,
            l1_address: parse_optional_column(row, 1)?,
            l2_address: parse_column(row, 2)?,
            name: row.get(3)?,
            symbol: row.get(4)?,
            decimals: row.get(5)?,
            usd_price: row.get(6)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{test_db, test_token};

    #[test]
    fn registration_keeps_known_price() {
        let db = test_db();
        let tokens = TokenRepository::new(&db.conn);
        let mut token = test_token(Address::repeat_byte(0x77));

        tokens.upsert(&token).unwrap();
        assert!(tokens.update_price(&token.address, "1.25").unwrap());

        token.name = "Renamed".to_string();
        tokens.upsert(&token).unwrap();

        let stored = tokens.get(&token.address).unwrap().unwrap();
        assert_eq!(stored.name, "Renamed");
        assert_eq!(stored.usd_price.as_deref(), Some("1.25"));
    }

    #[test]
    fn unknown_tokens_yield_partial_info() {
        let db = test_db();
        let tokens = TokenRepository::new(&db.conn);
        let address = Address::repeat_byte(0x42);

        assert!(!tokens.update_price(&address, "3").unwrap());
        let info = tokens.token_info(&address).unwrap();
        assert_eq!(info, TokenInfo::partial(address));
        assert!(info.symbol.is_none());
    }
}
