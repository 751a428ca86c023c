pub mod api;
pub mod config;
pub mod enrichment;
pub mod error;
pub mod events;
pub mod feed;
pub mod query;
pub mod repository;
pub mod rpc;
pub mod tracker;
pub mod verification;
