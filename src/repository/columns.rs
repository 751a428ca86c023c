//! Conversions between SQLite columns and chain types.
//!
//! Addresses and hashes are stored as lowercase `0x` strings, integers wider
//! than 64 bits as decimal strings and timestamps as RFC 3339 with
//! microseconds.

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{Row, ToSql, params_from_iter};
use serde::de::DeserializeOwned;
use std::fmt::Debug;
use std::str::FromStr;

pub fn hex_column<T: Debug>(value: &T) -> String {
    format!("{value:?}")
}

pub fn time_column(value: &DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn parse_column<T>(row: &Row, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    T::from_str(&row.get::<_, String>(idx)?)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

pub fn parse_optional_column<T>(row: &Row, idx: usize) -> rusqlite::Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    row.get::<_, Option<String>>(idx)?
        .map(|value| {
            T::from_str(&value).map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e))
            })
        })
        .transpose()
}

pub fn parse_time_column(row: &Row, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    parse_column::<DateTime<Utc>>(row, idx)
}

pub fn parse_optional_time_column(row: &Row, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    parse_optional_column::<DateTime<Utc>>(row, idx)
}

pub fn parse_json_column<T: DeserializeOwned>(row: &Row, idx: usize) -> rusqlite::Result<T> {
    serde_json::from_str(&row.get::<_, String>(idx)?)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

pub fn parse_optional_json_column<T: DeserializeOwned>(
    row: &Row,
    idx: usize,
) -> rusqlite::Result<Option<T>> {
    row.get::<_, Option<String>>(idx)?
        .map(|value| {
            serde_json::from_str(&value).map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e))
            })
        })
        .transpose()
}

/// WHERE clause accumulator for the list queries.
#[derive(Default)]
pub struct Conditions {
    clauses: Vec<String>,
    params: Vec<Box<dyn ToSql>>,
}

impl Conditions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a clause; every `?` in it consumes one of `params`, in order.
    pub fn push(&mut self, clause: impl Into<String>, params: Vec<Box<dyn ToSql>>) {
        self.clauses.push(clause.into());
        self.params.extend(params);
    }

    pub fn with(mut self, clause: impl Into<String>, params: Vec<Box<dyn ToSql>>) -> Self {
        self.push(clause, params);
        self
    }

    pub fn where_clause(&self) -> String {
        if self.clauses.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", self.clauses.join(" AND "))
        }
    }

    pub fn params(&self) -> impl rusqlite::Params + '_ {
        params_from_iter(self.params.iter())
    }
}

/// Ordering and window of a list query.
#[derive(Debug, Clone)]
pub struct Page {
    pub order_by: String,
    pub limit: u64,
    pub offset: u64,
}

impl Page {
    pub fn sql(&self) -> String {
        format!(
            " ORDER BY {} LIMIT {} OFFSET {}",
            self.order_by, self.limit, self.offset
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn conditions_render_in_insertion_order() {
        let conditions = Conditions::new()
            .with("block_number <= ?", vec![Box::new(10u64)])
            .with("(a = ? OR b = ?)", vec![Box::new("x"), Box::new("y")]);
        assert_eq!(
            conditions.where_clause(),
            " WHERE block_number <= ? AND (a = ? OR b = ?)"
        );
        assert!(Conditions::new().where_clause().is_empty());
    }

    #[test]
    fn times_keep_microseconds() {
        let time = Utc.timestamp_opt(1_700_000_000, 123_456_000).unwrap();
        assert_eq!(time_column(&time), "2023-11-14T22:13:20.123456Z");
    }
}
