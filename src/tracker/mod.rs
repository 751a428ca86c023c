//! Finalization tracker: the single writer of chain data.
//!
//! Blocks arrive sealed and are stored together with their enriched
//! transactions. Batches then move through the L1 anchor phases (commit,
//! prove, execute); execution flips the batch and its blocks to verified in
//! one SQLite transaction.

mod head;

pub use head::ChainHead;

use crate::enrichment::EnrichmentEngine;
use crate::error::{ExplorerError, ExplorerResult};
use crate::feed::{AnchorReceipt, ChainFeed, FeedEvent, IncomingTransaction, SealedBlock};
use crate::repository::models::{
    AnchorPhase, BlockHeader, BlockStatus, ContractRecord, Event, Token, TransactionRecord,
};
use crate::repository::{
    AccountRepository, BalanceRepository, BlockRange, BlockRepository, ContractRepository, Database,
    EventRepository, L1BatchRepository, TokenRepository, TransactionRepository,
    TransferRepository, write_transaction,
};
use alloy_primitives::{Address, B256};
use rusqlite::Connection;
use std::time::Instant;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Applied,
    /// Already stored with identical content.
    Duplicate,
    Ignored,
}

pub struct FinalizationTracker {
    db: Database,
    engine: EnrichmentEngine,
    head: ChainHead,
    head_tx: watch::Sender<ChainHead>,
}

fn consistency(message: String) -> ExplorerError {
    ExplorerError::DataConsistency(message)
}

impl FinalizationTracker {
    pub fn new(db: Database, engine: EnrichmentEngine) -> ExplorerResult<Self> {
        let head = ChainHead::load(&db.conn)?;
        let (head_tx, _) = watch::channel(head);
        info!(
            "Tracker resumes at sealed block {:?}, verified batch {:?}",
            head.last_sealed_block, head.last_verified_batch
        );
        Ok(FinalizationTracker {
            db,
            engine,
            head,
            head_tx,
        })
    }

    pub fn head(&self) -> ChainHead {
        self.head
    }

    pub fn subscribe(&self) -> watch::Receiver<ChainHead> {
        self.head_tx.subscribe()
    }

    pub fn apply(&mut self, event: FeedEvent) -> ExplorerResult<Outcome> {
        let result = match event {
            FeedEvent::BlockSealed(block) => self.on_block_sealed(&block),
            FeedEvent::AnchorConfirmed {
                l1_batch_number,
                phase,
                tx_hash,
                receipt,
            } => self.on_anchor_confirmed(l1_batch_number, phase, tx_hash, receipt),
            FeedEvent::TokenRegistered(token) => self.on_token_registered(&token),
            FeedEvent::TokenPrice { address, usd_price } => {
                self.on_token_price(&address, &usd_price)
            }
        };

        if let Err(e) = &result {
            if e.is_data_consistency() {
                error!("Rejected feed event: {}", e);
            }
        }
        result
    }

    pub fn on_block_sealed(&mut self, block: &SealedBlock) -> ExplorerResult<Outcome> {
        let start = Instant::now();
        let header = &block.header;

        if let Some(stored) = BlockRepository::new(&self.db.conn).get_hash(header.number)? {
            if stored == header.hash {
                debug!("Block {} already indexed", header.number);
                return Ok(Outcome::Duplicate);
            }
            return Err(consistency(format!(
                "block {} is indexed with hash {:?} but the feed reports {:?}",
                header.number, stored, header.hash
            )));
        }
        self.check_block_position(header)?;

        let tx = write_transaction(&self.db.conn)?;
        L1BatchRepository::new(&tx).upsert_for_block(header)?;
        BlockRepository::new(&tx).insert(header)?;
        for incoming in &block.transactions {
            self.store_transaction(&tx, header, incoming)?;
        }
        tx.commit()?;

        self.head.last_sealed_block = Some(header.number);
        self.head.last_sealed_batch = Some(header.l1_batch_number);
        self.head.total_transactions += block.transactions.len() as u64;
        self.publish();

        info!(
            "Indexed block {} (batch {}, {} transactions) in {:?}",
            header.number,
            header.l1_batch_number,
            block.transactions.len(),
            start.elapsed()
        );
        Ok(Outcome::Applied)
    }

    fn check_block_position(&self, header: &BlockHeader) -> ExplorerResult<()> {
        if let Some(last) = self.head.last_sealed_block {
            if header.number != last + 1 {
                return Err(consistency(format!(
                    "block {} does not follow last sealed block {}",
                    header.number, last
                )));
            }
        }

        if let Some(open) = self.head.last_sealed_batch {
            if header.l1_batch_number != open && header.l1_batch_number != open + 1 {
                return Err(consistency(format!(
                    "block {} belongs to batch {} but the open batch is {}",
                    header.number, header.l1_batch_number, open
                )));
            }
        }

        let status = L1BatchRepository::new(&self.db.conn).get_status(header.l1_batch_number)?;
        if status == Some(BlockStatus::Verified) {
            return Err(consistency(format!(
                "block {} targets batch {} which is already verified",
                header.number, header.l1_batch_number
            )));
        }
        Ok(())
    }

    fn store_transaction(
        &self,
        conn: &Connection,
        header: &BlockHeader,
        incoming: &IncomingTransaction,
    ) -> ExplorerResult<()> {
        let enrichment = self.engine.enrich(conn, incoming)?;

        let record = TransactionRecord {
            hash: incoming.hash,
            block_number: header.number,
            index_in_block: incoming.index_in_block,
            l1_batch_number: header.l1_batch_number,
            nonce: incoming.nonce,
            initiator_address: incoming.initiator,
            to_address: incoming.to,
            is_l1_originated: incoming.is_l1_originated,
            tx_type: incoming.tx_type,
            calldata: incoming.calldata.clone(),
            value: incoming.value,
            fee: enrichment.fee,
            factory_deps: incoming.factory_deps.clone(),
            received_at: incoming.received_at,
            balance_changes: enrichment.balance_changes.clone(),
            transfer: enrichment.transfer.clone(),
        };
        let transactions = TransactionRepository::new(conn);
        transactions.insert(&record)?;
        transactions.index_accounts(&record, &enrichment.touched)?;

        let events: Vec<Event> = incoming
            .logs
            .iter()
            .enumerate()
            .map(|(position, log)| Event {
                address: log.address,
                topics: log.topics.clone(),
                data: log.data.clone(),
                block_hash: header.hash,
                block_number: header.number,
                transaction_hash: incoming.hash,
                transaction_index: incoming.index_in_block,
                log_index: log.log_index,
                transaction_log_index: position as u64,
                removed: log.removed,
            })
            .collect();
        EventRepository::new(conn).insert_batch(&events)?;
        TransferRepository::new(conn).insert_batch(
            &incoming.hash,
            header.number,
            &enrichment.erc20_movements(),
        )?;

        let balances = BalanceRepository::new(conn);
        for change in &enrichment.balance_changes {
            balances.set(&change.address, &change.token_address, &change.balance_after)?;
        }

        let accounts = AccountRepository::new(conn);
        for address in &enrichment.touched {
            accounts.touch(address)?;
        }
        // Priority transactions do not use the initiator's nonce
        if !incoming.is_l1_originated {
            accounts.raise_sealed_nonce(&incoming.initiator, incoming.nonce + 1)?;
        }

        let contracts = ContractRepository::new(conn);
        for created in &incoming.created_contracts {
            contracts.insert(&ContractRecord {
                address: created.address,
                creator_address: incoming.initiator,
                creator_tx_hash: incoming.hash,
                created_in_block_number: header.number,
                bytecode: created.bytecode.clone(),
                total_transactions: 0,
                verification_info: None,
            })?;
            accounts.touch(&created.address)?;
        }
        if let Some(to) = &incoming.to {
            contracts.increment_transactions(to)?;
        }
        Ok(())
    }

    pub fn on_anchor_confirmed(
        &mut self,
        l1_batch_number: u64,
        phase: AnchorPhase,
        tx_hash: B256,
        receipt: AnchorReceipt,
    ) -> ExplorerResult<Outcome> {
        if !receipt.succeeded {
            warn!(
                "{:?} transaction {:?} for batch {} failed on L1, phase not confirmed",
                phase, tx_hash, l1_batch_number
            );
            return Ok(Outcome::Ignored);
        }

        let batches = L1BatchRepository::new(&self.db.conn);
        let anchors = batches.get_anchors(l1_batch_number)?.ok_or_else(|| {
            consistency(format!(
                "{phase:?} confirmation {tx_hash:?} for unknown batch {l1_batch_number}"
            ))
        })?;

        if let Some(recorded) = anchors.tx_hash(phase) {
            if recorded == tx_hash {
                return Ok(Outcome::Duplicate);
            }
            return Err(consistency(format!(
                "batch {l1_batch_number} already has {phase:?} transaction {recorded:?}, got {tx_hash:?}"
            )));
        }

        let missing = match phase {
            AnchorPhase::Commit => None,
            AnchorPhase::Prove => anchors.commit_tx_hash.is_none().then_some(AnchorPhase::Commit),
            AnchorPhase::Execute => anchors.prove_tx_hash.is_none().then_some(AnchorPhase::Prove),
        };
        if let Some(missing) = missing {
            return Err(consistency(format!(
                "{phase:?} for batch {l1_batch_number} arrived before {missing:?}"
            )));
        }

        if phase != AnchorPhase::Execute {
            batches.record_anchor(l1_batch_number, phase, &tx_hash, &receipt.confirmed_at)?;
            info!("Batch {} {:?} confirmed by {:?}", l1_batch_number, phase, tx_hash);
            return Ok(Outcome::Applied);
        }

        let range = self.check_executable(l1_batch_number)?;

        let tx = write_transaction(&self.db.conn)?;
        let batches = L1BatchRepository::new(&tx);
        batches.record_anchor(l1_batch_number, phase, &tx_hash, &receipt.confirmed_at)?;
        batches.mark_verified(l1_batch_number)?;
        BlockRepository::new(&tx).mark_batch_verified(l1_batch_number)?;
        AccountRepository::new(&tx).apply_verified_nonces(l1_batch_number)?;
        tx.commit()?;

        self.head.last_verified_batch = Some(l1_batch_number);
        self.head.last_verified_block = Some(range.last);
        self.publish();

        info!(
            "Batch {} verified (blocks {}..={})",
            l1_batch_number, range.first, range.last
        );
        Ok(Outcome::Applied)
    }

    fn check_executable(&self, l1_batch_number: u64) -> ExplorerResult<BlockRange> {
        if l1_batch_number > 0 {
            let previous = L1BatchRepository::new(&self.db.conn).get_status(l1_batch_number - 1)?;
            if previous == Some(BlockStatus::Sealed) {
                return Err(consistency(format!(
                    "batch {} executed before batch {}",
                    l1_batch_number,
                    l1_batch_number - 1
                )));
            }
        }

        let range = BlockRepository::new(&self.db.conn)
            .batch_range(l1_batch_number)?
            .ok_or_else(|| consistency(format!("batch {l1_batch_number} has no blocks")))?;
        if !range.is_contiguous() {
            return Err(consistency(format!(
                "batch {} has {} blocks in range {}..={}",
                l1_batch_number, range.count, range.first, range.last
            )));
        }
        Ok(range)
    }

    pub fn on_token_registered(&mut self, token: &Token) -> ExplorerResult<Outcome> {
        TokenRepository::new(&self.db.conn).upsert(token)?;
        debug!("Token {} registered at {:?}", token.symbol, token.address);
        Ok(Outcome::Applied)
    }

    pub fn on_token_price(&mut self, address: &Address, usd_price: &str) -> ExplorerResult<Outcome> {
        if TokenRepository::new(&self.db.conn).update_price(address, usd_price)? {
            Ok(Outcome::Applied)
        } else {
            debug!("Price for unknown token {:?} ignored", address);
            Ok(Outcome::Ignored)
        }
    }

    fn publish(&mut self) {
        self.head.version += 1;
        self.head_tx.send_replace(self.head);
    }

    /// Applies feed events in delivery order until the feed ends or an event
    /// is rejected. Returns the tracker so the caller can keep using it.
    pub async fn run<F: ChainFeed + ?Sized>(mut self, feed: &mut F) -> anyhow::Result<Self> {
        while let Some(event) = feed.next_event().await? {
            let (tracker, result) = tokio::task::spawn_blocking(move || {
                let result = self.apply(event);
                (self, result)
            })
            .await?;
            self = tracker;
            result?;
        }
        info!("Feed ended at sealed block {:?}", self.head.last_sealed_block);
        Ok(self)
    }
}
