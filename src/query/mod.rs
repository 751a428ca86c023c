pub mod commands;
mod engine;
pub mod filters;
pub mod formatters;
pub mod pagination;

pub use engine::QueryEngine;
pub use filters::{
    BlockFilter, BlockListParams, BlockQuery, EventFilter, EventListParams, EventQuery,
    L1BatchListParams, L1BatchQuery, ListQuery, TransactionFilter, TransactionListParams,
    TransactionQuery,
};
pub use pagination::{Direction, Pagination, Position, QueryLimits};
