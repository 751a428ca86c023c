use crate::error::{ExplorerError, ExplorerResult};
use crate::repository::{Conditions, Page};
use serde::{Deserialize, Serialize};

pub const DEFAULT_REQ_ENTITIES_LIMIT: u64 = 100;
pub const DEFAULT_OFFSET_LIMIT: u64 = 10_000;
pub const DEFAULT_PAGE_SIZE: u64 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryLimits {
    pub req_entities_limit: u64,
    pub offset_limit: u64,
}

impl Default for QueryLimits {
    fn default() -> Self {
        QueryLimits {
            req_entities_limit: DEFAULT_REQ_ENTITIES_LIMIT,
            offset_limit: DEFAULT_OFFSET_LIMIT,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Direction {
    Older,
    Newer,
}

impl Direction {
    fn comparison(&self) -> &'static str {
        match self {
            Direction::Older => "<",
            Direction::Newer => ">",
        }
    }

    fn order(&self) -> &'static str {
        match self {
            Direction::Older => "DESC",
            Direction::Newer => "ASC",
        }
    }
}

/// Position of a transaction or event. Without an index it stands for the
/// boundary of the whole block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Position {
    pub block_number: u64,
    pub index: Option<u64>,
}

/// Columns a list is ordered by.
#[derive(Debug, Clone, Copy)]
pub struct Keyset {
    pub primary: &'static str,
    pub secondary: Option<&'static str>,
}

pub trait Cursor: Copy {
    fn push_condition(&self, keys: &Keyset, direction: Direction, conditions: &mut Conditions);
}

impl Cursor for u64 {
    fn push_condition(&self, keys: &Keyset, direction: Direction, conditions: &mut Conditions) {
        conditions.push(
            format!("{} {} ?", keys.primary, direction.comparison()),
            vec![Box::new(*self)],
        );
    }
}

impl Cursor for Position {
    fn push_condition(&self, keys: &Keyset, direction: Direction, conditions: &mut Conditions) {
        let op = direction.comparison();
        match (self.index, keys.secondary) {
            (Some(index), Some(secondary)) => conditions.push(
                format!(
                    "({primary} {op} ? OR ({primary} = ? AND {secondary} {op} ?))",
                    primary = keys.primary
                ),
                vec![
                    Box::new(self.block_number),
                    Box::new(self.block_number),
                    Box::new(index),
                ],
            ),
            _ => conditions.push(
                format!("{} {} ?", keys.primary, op),
                vec![Box::new(self.block_number)],
            ),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination<C> {
    pub direction: Direction,
    pub cursor: Option<C>,
    pub limit: u64,
    pub offset: u64,
}

impl<C: Cursor> Pagination<C> {
    pub fn validate(&self, limits: &QueryLimits) -> ExplorerResult<()> {
        if self.direction == Direction::Newer && self.cursor.is_none() {
            return Err(ExplorerError::invalid(
                "direction 'newer' requires a cursor",
            ));
        }
        if self.limit == 0 || self.limit > limits.req_entities_limit {
            return Err(ExplorerError::invalid(format!(
                "limit must be between 1 and {}",
                limits.req_entities_limit
            )));
        }
        if self.offset.saturating_add(self.limit) > limits.offset_limit {
            return Err(ExplorerError::invalid(format!(
                "offset + limit must not exceed {}",
                limits.offset_limit
            )));
        }
        Ok(())
    }

    /// Narrows `conditions` (filter and snapshot bound) to the cursor window.
    pub fn window(&self, keys: &Keyset, mut conditions: Conditions) -> (Conditions, Page) {
        if let Some(cursor) = &self.cursor {
            cursor.push_condition(keys, self.direction, &mut conditions);
        }

        let order = self.direction.order();
        let order_by = match keys.secondary {
            Some(secondary) => format!("{} {order}, {secondary} {order}", keys.primary),
            None => format!("{} {order}", keys.primary),
        };
        let page = Page {
            order_by,
            limit: self.limit,
            offset: self.offset,
        };
        (conditions, page)
    }
}
