use crate::error::ExplorerResult;
use crate::repository::models::NetworkStats;
use crate::repository::{BlockRepository, L1BatchRepository, TransactionRepository};
use rusqlite::Connection;
use serde::Serialize;

/// Latest indexed state. Every commit by the tracker publishes a new snapshot
/// with a higher `version`; readers bound their queries by it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ChainHead {
    pub version: u64,
    pub last_sealed_block: Option<u64>,
    pub last_sealed_batch: Option<u64>,
    pub last_verified_block: Option<u64>,
    pub last_verified_batch: Option<u64>,
    pub total_transactions: u64,
}

impl ChainHead {
    pub fn load(conn: &Connection) -> ExplorerResult<Self> {
        let blocks = BlockRepository::new(conn);
        let batches = L1BatchRepository::new(conn);

        Ok(ChainHead {
            version: 0,
            last_sealed_block: blocks.last_number()?,
            last_sealed_batch: batches.last_number()?,
            last_verified_block: blocks.last_verified_number()?,
            last_verified_batch: batches.last_verified_number()?,
            total_transactions: TransactionRepository::new(conn).count_all()?,
        })
    }

    pub fn network_stats(&self) -> NetworkStats {
        NetworkStats {
            last_sealed: self.last_sealed_block.unwrap_or_default(),
            last_verified: self.last_verified_block.unwrap_or_default(),
            total_transactions: self.total_transactions,
        }
    }
}
