//! Derives fee, token movements, balance changes and the transfer summary of a
//! transaction before it is stored.

use crate::error::ExplorerResult;
use crate::events::{decode_transfer_event, is_transfer_log};
use crate::feed::IncomingTransaction;
use crate::repository::BalanceRepository;
use crate::repository::models::{BalanceChange, ETH_ADDRESS, StoredTransfer, TokenMovement};
use alloy_primitives::{Address, U256, address};
use rusqlite::Connection;
use std::collections::{BTreeMap, BTreeSet};
use tracing::warn;

/// System contract that emits `Transfer` logs for the native asset.
pub const DEFAULT_NATIVE_TOKEN_ADDRESS: Address =
    address!("000000000000000000000000000000000000800a");

/// Account collecting fees and paying refunds.
pub const DEFAULT_FEE_ACCOUNT_ADDRESS: Address =
    address!("0000000000000000000000000000000000008001");

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnrichmentConfig {
    pub native_token_address: Address,
    pub fee_account_address: Address,
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        EnrichmentConfig {
            native_token_address: DEFAULT_NATIVE_TOKEN_ADDRESS,
            fee_account_address: DEFAULT_FEE_ACCOUNT_ADDRESS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Enrichment {
    pub fee: U256,
    /// Every decoded movement, native ones included.
    pub movements: Vec<TokenMovement>,
    pub balance_changes: Vec<BalanceChange>,
    pub transfer: Option<StoredTransfer>,
    /// Addresses the account filter should return this transaction for.
    pub touched: BTreeSet<Address>,
}

impl Enrichment {
    pub fn erc20_movements(&self) -> Vec<TokenMovement> {
        self.movements
            .iter()
            .filter(|movement| movement.token != ETH_ADDRESS)
            .cloned()
            .collect()
    }
}

#[derive(Debug, Clone, Default)]
pub struct EnrichmentEngine {
    config: EnrichmentConfig,
}

impl EnrichmentEngine {
    pub fn new(config: EnrichmentConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &EnrichmentConfig {
        &self.config
    }

    /// Enriches one transaction. Balances are read through `conn`, so earlier
    /// transactions of the same block must already be written there.
    pub fn enrich(&self, conn: &Connection, tx: &IncomingTransaction) -> ExplorerResult<Enrichment> {
        let movements = self.token_movements(tx);
        let fee = self.fee(tx, &movements);
        let balance_changes = self.balance_changes(conn, tx, &movements)?;
        let transfer = self.transfer_summary(tx, &movements);

        let mut touched = BTreeSet::new();
        touched.insert(tx.initiator);
        touched.extend(balance_changes.iter().map(|change| change.address));
        if let Some(transfer) = &transfer {
            touched.insert(transfer.from);
            touched.insert(transfer.to);
        }

        Ok(Enrichment {
            fee,
            movements,
            balance_changes,
            transfer,
            touched,
        })
    }

    pub fn token_movements(&self, tx: &IncomingTransaction) -> Vec<TokenMovement> {
        let mut movements = Vec::new();
        for log in &tx.logs {
            if !is_transfer_log(&log.topics, &log.data) {
                continue;
            }
            match decode_transfer_event(&log.topics, &log.data) {
                Ok(event) => {
                    let token = if log.address == self.config.native_token_address {
                        ETH_ADDRESS
                    } else {
                        log.address
                    };
                    movements.push(TokenMovement {
                        token,
                        from: event.from,
                        to: event.to,
                        amount: event.value,
                        log_index: log.log_index,
                    });
                }
                Err(e) => {
                    warn!("Failed to decode transfer event in {:?}: {}", tx.hash, e);
                }
            }
        }
        movements
    }

    /// Fee after the operator refund, never below zero.
    pub fn fee(&self, tx: &IncomingTransaction, movements: &[TokenMovement]) -> U256 {
        let refund = tx.refund.unwrap_or_else(|| {
            movements
                .iter()
                .filter(|movement| {
                    movement.token == ETH_ADDRESS
                        && movement.from == self.config.fee_account_address
                        && movement.to == tx.initiator
                })
                .fold(U256::ZERO, |acc, movement| acc.saturating_add(movement.amount))
        });
        tx.gas_used
            .saturating_mul(tx.effective_gas_price)
            .saturating_sub(refund)
    }

    pub fn transfer_summary(
        &self,
        tx: &IncomingTransaction,
        movements: &[TokenMovement],
    ) -> Option<StoredTransfer> {
        let fee_account = self.config.fee_account_address;
        let mut transfers = movements
            .iter()
            .filter(|movement| movement.from != fee_account && movement.to != fee_account);

        match (transfers.next(), transfers.next()) {
            (Some(movement), None) => Some(StoredTransfer {
                from: movement.from,
                to: movement.to,
                amount: movement.amount,
                token_address: movement.token,
            }),
            (None, _) if !tx.value.is_zero() => tx.to.map(|to| StoredTransfer {
                from: tx.initiator,
                to,
                amount: tx.value,
                token_address: ETH_ADDRESS,
            }),
            _ => None,
        }
    }

    fn balance_changes(
        &self,
        conn: &Connection,
        tx: &IncomingTransaction,
        movements: &[TokenMovement],
    ) -> ExplorerResult<Vec<BalanceChange>> {
        #[derive(Default)]
        struct Delta {
            incoming: U256,
            outgoing: U256,
            reported: Option<U256>,
        }

        let mut deltas: BTreeMap<(Address, Address), Delta> = BTreeMap::new();
        for movement in movements {
            let incoming = deltas.entry((movement.to, movement.token)).or_default();
            incoming.incoming = incoming.incoming.saturating_add(movement.amount);
            let outgoing = deltas.entry((movement.from, movement.token)).or_default();
            outgoing.outgoing = outgoing.outgoing.saturating_add(movement.amount);
        }
        for update in &tx.balance_updates {
            deltas
                .entry((update.address, update.token))
                .or_default()
                .reported = Some(update.balance);
        }

        let balances = BalanceRepository::new(conn);
        let mut changes = Vec::with_capacity(deltas.len());
        for ((address, token_address), delta) in deltas {
            // Mints and burns
            if address == Address::ZERO {
                continue;
            }
            let balance_before = balances.get(&address, &token_address)?;
            let balance_after = delta.reported.unwrap_or_else(|| {
                balance_before
                    .saturating_add(delta.incoming)
                    .saturating_sub(delta.outgoing)
            });
            changes.push(BalanceChange {
                address,
                token_address,
                balance_before,
                balance_after,
            });
        }
        Ok(changes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::BalanceUpdate;
    use alloy_primitives::Bytes;
    use crate::testing::{incoming_transaction, native_transfer_log, test_db, transfer_log};

    const FEE_ACCOUNT: Address = DEFAULT_FEE_ACCOUNT_ADDRESS;

    #[test]
    fn fee_subtracts_refund_inferred_from_logs() {
        let engine = EnrichmentEngine::default();
        let alice = Address::repeat_byte(0xa1);
        let mut tx = incoming_transaction(alice, 0, 0);
        tx.gas_used = U256::from(100u64);
        tx.effective_gas_price = U256::from(10u64);
        tx.refund = None;
        tx.logs = vec![
            native_transfer_log(alice, FEE_ACCOUNT, 1_000, 0),
            native_transfer_log(FEE_ACCOUNT, alice, 250, 1),
        ];

        let movements = engine.token_movements(&tx);
        assert_eq!(engine.fee(&tx, &movements), U256::from(750u64));

        tx.refund = Some(U256::from(5_000u64));
        assert_eq!(engine.fee(&tx, &movements), U256::ZERO);
    }

    #[test]
    fn single_token_movement_becomes_the_summary() {
        let db = test_db();
        let engine = EnrichmentEngine::default();
        let alice = Address::repeat_byte(0xa1);
        let bob = Address::repeat_byte(0xb0);
        let token = Address::repeat_byte(0x70);
        let mut tx = incoming_transaction(alice, 0, 0);
        tx.to = Some(token);
        tx.logs = vec![
            native_transfer_log(alice, FEE_ACCOUNT, 1_000, 0),
            transfer_log(token, alice, bob, 1, 1),
            native_transfer_log(FEE_ACCOUNT, alice, 200, 2),
        ];

        let enrichment = engine.enrich(&db.conn, &tx).unwrap();
        assert_eq!(
            enrichment.transfer,
            Some(StoredTransfer {
                from: alice,
                to: bob,
                amount: U256::from(1u64),
                token_address: token,
            })
        );
        assert_eq!(enrichment.erc20_movements().len(), 1);
        assert!(enrichment.touched.contains(&bob));
        assert!(enrichment.touched.contains(&FEE_ACCOUNT));

        let keys: Vec<_> = enrichment
            .balance_changes
            .iter()
            .map(|change| (change.address, change.token_address))
            .collect();
        let mut sorted = keys.clone();
        sorted.sort();
        assert_eq!(keys, sorted);
        assert!(keys.contains(&(alice, token)));
        assert!(keys.contains(&(bob, token)));
        assert!(keys.contains(&(alice, ETH_ADDRESS)));
    }

    #[test]
    fn balances_follow_stored_state_or_reported_values() {
        let db = test_db();
        let engine = EnrichmentEngine::default();
        let alice = Address::repeat_byte(0xa1);
        let bob = Address::repeat_byte(0xb0);
        let token = Address::repeat_byte(0x70);
        BalanceRepository::new(&db.conn)
            .set(&alice, &token, &U256::from(10u64))
            .unwrap();

        let mut tx = incoming_transaction(alice, 0, 0);
        tx.logs = vec![
            transfer_log(token, alice, bob, 4, 0),
            transfer_log(token, Address::ZERO, alice, 1, 1),
        ];
        tx.balance_updates = vec![BalanceUpdate {
            address: bob,
            token,
            balance: U256::from(99u64),
        }];

        let changes = engine.enrich(&db.conn, &tx).unwrap().balance_changes;
        assert_eq!(
            changes,
            vec![
                BalanceChange {
                    address: alice,
                    token_address: token,
                    balance_before: U256::from(10u64),
                    balance_after: U256::from(7u64),
                },
                BalanceChange {
                    address: bob,
                    token_address: token,
                    balance_before: U256::ZERO,
                    balance_after: U256::from(99u64),
                },
            ]
        );
    }

    #[test]
    fn oversized_transfers_saturate_instead_of_wrapping() {
        let db = test_db();
        let engine = EnrichmentEngine::default();
        let alice = Address::repeat_byte(0xa1);
        let bob = Address::repeat_byte(0xb0);
        let token = Address::repeat_byte(0x70);

        let huge = |log_index| {
            let mut log = transfer_log(token, alice, bob, 0, log_index);
            log.data = Bytes::from(U256::MAX.to_be_bytes::<32>().to_vec());
            log
        };
        let mut tx = incoming_transaction(alice, 0, 0);
        tx.logs = vec![huge(0), huge(1)];

        let changes = engine.enrich(&db.conn, &tx).unwrap().balance_changes;
        let received = changes
            .iter()
            .find(|change| change.address == bob && change.token_address == token)
            .unwrap();
        assert_eq!(received.balance_after, U256::MAX);
        let sent = changes
            .iter()
            .find(|change| change.address == alice && change.token_address == token)
            .unwrap();
        assert_eq!(sent.balance_after, U256::ZERO);
    }

    #[test]
    fn plain_value_transfer_is_summarised_without_logs() {
        let engine = EnrichmentEngine::default();
        let alice = Address::repeat_byte(0xa1);
        let bob = Address::repeat_byte(0xb0);
        let mut tx = incoming_transaction(alice, 0, 0);
        tx.to = Some(bob);
        tx.value = U256::from(3u64);

        let summary = engine.transfer_summary(&tx, &[]).unwrap();
        assert_eq!(summary.token_address, ETH_ADDRESS);
        assert_eq!(summary.amount, U256::from(3u64));

        tx.value = U256::ZERO;
        assert!(engine.transfer_summary(&tx, &[]).is_none());
    }
}
