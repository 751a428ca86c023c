use super::columns::{Conditions, Page, hex_column, parse_column, parse_json_column};
use super::models::Event;
use crate::error::ExplorerResult;
use alloy_primitives::B256;
use rusqlite::{Row, params};

pub struct EventRepository<'a> {
    conn: &'a rusqlite::Connection,
}

impl<'a> EventRepository<'a> {
    const INSERT_EVENT: &'static str = "INSERT INTO events (
            block_number, log_index, address, topics, data, block_hash,
            transaction_hash, transaction_index, transaction_log_index, removed
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)";

    const SELECT_EVENT: &'static str = "SELECT address, topics, data, block_hash, block_number,
            transaction_hash, transaction_index, log_index, transaction_log_index, removed
        FROM events";

    pub fn new(conn: &'a rusqlite::Connection) -> Self {
        Self { conn }
    }

    pub fn insert_batch(&self, events: &[Event]) -> ExplorerResult<()> {
        let mut stmt = self.conn.prepare_cached(Self::INSERT_EVENT)?;
        for event in events {
            stmt.execute(params![
                event.block_number,
                event.log_index,
                hex_column(&event.address),
                serde_json::to_string(&event.topics)?,
                event.data.to_vec(),
                hex_column(&event.block_hash),
                hex_column(&event.transaction_hash),
                event.transaction_index,
                event.transaction_log_index,
                event.removed,
            ])?;
        }
        Ok(())
    }

    pub fn for_transaction(&self, transaction_hash: &B256) -> ExplorerResult<Vec<Event>> {
        let query = format!(
            "{} WHERE transaction_hash = ?1 ORDER BY log_index",
            Self::SELECT_EVENT
        );
        let mut stmt = self.conn.prepare_cached(&query)?;
        let events = stmt
            .query_map(params![hex_column(transaction_hash)], Self::row_to_event)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(events)
    }

    pub fn count(&self, conditions: &Conditions) -> ExplorerResult<u64> {
        let query = format!("SELECT COUNT(*) FROM events{}", conditions.where_clause());
        Ok(self
            .conn
            .query_row(&query, conditions.params(), |row| row.get(0))?)
    }

    pub fn list(&self, conditions: &Conditions, page: &Page) -> ExplorerResult<Vec<Event>> {
        let query = format!(
            "{}{}{}",
            Self::SELECT_EVENT,
            conditions.where_clause(),
            page.sql()
        );
        let mut stmt = self.conn.prepare(&query)?;
        let events = stmt
            .query_map(conditions.params(), Self::row_to_event)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(events)
    }

    fn row_to_event(row: &Row) -> rusqlite::Result<Event> {
        Ok(Event {
            address: parse_column(row, 0)?,
            topics: parse_json_column(row, 1)?,
            data: row.get::<_, Vec<u8>>(2)?.into(),
            block_hash: parse_column(row, 3)?,
            block_number: row.get(4)?,
            transaction_hash: parse_column(row, 5)?,
            transaction_index: row.get(6)?,
            log_index: row.get(7)?,
            transaction_log_index: row.get(8)?,
            removed: row.get(9)?,
        })
    }
}
