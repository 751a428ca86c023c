use alloy::sol_types::SolEvent;
use alloy_primitives::{Address, B256, Bytes, U256, keccak256};
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use rollup_explorer::enrichment::EnrichmentEngine;
use rollup_explorer::events::Transfer;
use rollup_explorer::feed::{
    AnchorReceipt, CreatedContract, FeedEvent, FeedLog, IncomingTransaction, SealedBlock, channel,
};
use rollup_explorer::query::{
    BlockListParams, BlockQuery, Direction, QueryEngine, QueryLimits, TransactionListParams,
    TransactionQuery,
};
use rollup_explorer::repository::Database;
use rollup_explorer::repository::models::{
    AnchorPhase, BaseSystemContractsHashes, BlockHeader, BlockStatus, Token, TransactionStatus,
};
use rollup_explorer::tracker::FinalizationTracker;
use rollup_explorer::verification::{
    CodeFormat, CompilationArtifacts, CompilationError, Compiler, SourceCodeData,
    VerificationRequest, VerificationStatus, spawn_verifier,
};
use std::time::Duration;

const ALICE: Address = Address::repeat_byte(0xa1);
const BOB: Address = Address::repeat_byte(0xb0);
const CAROL: Address = Address::repeat_byte(0xc4);
const TOKEN: Address = Address::repeat_byte(0x70);
const COUNTER: Address = Address::repeat_byte(0xcc);
const COUNTER_CODE: [u8; 4] = [0x60, 0x80, 0x60, 0x40];

fn block_header(number: u64, l1_batch_number: u64, l2_tx_count: u64) -> BlockHeader {
    BlockHeader {
        number,
        hash: keccak256(number.to_be_bytes()),
        l1_batch_number,
        timestamp: 1_700_000_000 + number,
        l1_tx_count: 0,
        l2_tx_count,
        base_system_contracts_hashes: BaseSystemContractsHashes {
            bootloader: B256::repeat_byte(0xb0),
            default_aa: B256::repeat_byte(0xaa),
        },
        operator_address: Address::repeat_byte(0x0e),
        l1_gas_price: 1_000_000_000,
        l2_fair_gas_price: 250_000_000,
    }
}

fn transaction(initiator: Address, nonce: u64, logs: Vec<FeedLog>) -> IncomingTransaction {
    IncomingTransaction {
        hash: keccak256([initiator.as_slice(), &nonce.to_be_bytes()[..]].concat()),
        nonce,
        index_in_block: 0,
        is_l1_originated: false,
        initiator,
        to: Some(TOKEN),
        calldata: Bytes::new(),
        value: U256::ZERO,
        factory_deps: None,
        tx_type: 2,
        received_at: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
        gas_used: U256::from(21_000u64),
        effective_gas_price: U256::from(10u64),
        refund: Some(U256::ZERO),
        logs,
        created_contracts: Vec::new(),
        balance_updates: Vec::new(),
    }
}

fn token_transfer(from: Address, to: Address, amount: u64) -> FeedLog {
    FeedLog {
        address: TOKEN,
        topics: vec![Transfer::SIGNATURE_HASH, from.into_word(), to.into_word()],
        data: Bytes::from(U256::from(amount).to_be_bytes::<32>().to_vec()),
        log_index: 0,
        removed: false,
    }
}

fn block(number: u64, l1_batch_number: u64, transactions: Vec<IncomingTransaction>) -> FeedEvent {
    FeedEvent::BlockSealed(SealedBlock {
        header: block_header(number, l1_batch_number, transactions.len() as u64),
        transactions,
    })
}

fn anchor(l1_batch_number: u64, phase: AnchorPhase, byte: u8) -> FeedEvent {
    FeedEvent::AnchorConfirmed {
        l1_batch_number,
        phase,
        tx_hash: B256::repeat_byte(byte),
        receipt: AnchorReceipt {
            confirmed_at: Utc.timestamp_opt(1_700_000_100, 0).unwrap(),
            succeeded: true,
        },
    }
}

/// Mint to Alice in block 1, Alice pays Bob in block 2, Carol deploys a
/// contract in block 3. Batch 1 (blocks 1-2) is executed on L1.
async fn index_scenario(db_path: &str) -> FinalizationTracker {
    let mint = transaction(ALICE, 0, vec![token_transfer(Address::ZERO, ALICE, 10)]);
    let payment = transaction(ALICE, 1, vec![token_transfer(ALICE, BOB, 1)]);
    let mut deploy = transaction(CAROL, 0, Vec::new());
    deploy.to = None;
    deploy.created_contracts = vec![CreatedContract {
        address: COUNTER,
        bytecode: Bytes::from([&COUNTER_CODE[..], &[0xaa]].concat()),
    }];

    let events = vec![
        FeedEvent::TokenRegistered(Token {
            address: TOKEN,
            l1_address: Some(Address::repeat_byte(0x11)),
            l2_address: TOKEN,
            name: "Test Token".to_string(),
            symbol: "TST".to_string(),
            decimals: 18,
            usd_price: None,
        }),
        block(1, 1, vec![mint]),
        block(2, 1, vec![payment]),
        block(3, 2, vec![deploy]),
        anchor(1, AnchorPhase::Commit, 0xc1),
        anchor(1, AnchorPhase::Prove, 0xc2),
        anchor(1, AnchorPhase::Execute, 0xc3),
    ];

    let (tx, mut feed) = channel(events.len());
    for event in events {
        tx.send(event).await.unwrap();
    }
    drop(tx);

    let db = Database::new(db_path).unwrap();
    let tracker = FinalizationTracker::new(db, EnrichmentEngine::default()).unwrap();
    tracker.run(&mut feed).await.unwrap()
}

fn db_path(dir: &tempfile::TempDir) -> String {
    dir.path().join("explorer.db").to_string_lossy().to_string()
}

#[tokio::test]
async fn token_transfer_is_enriched_and_verified() {
    let dir = tempfile::tempdir().unwrap();
    let path = db_path(&dir);
    let tracker = index_scenario(&path).await;

    let conn = Database::open_reader(&path).unwrap();
    let engine = QueryEngine::new(&conn, tracker.head(), QueryLimits::default());

    let stats = engine.network_stats();
    assert_eq!(stats.last_sealed, 3);
    assert_eq!(stats.last_verified, 2);
    assert_eq!(stats.total_transactions, 3);

    let payment_hash = keccak256([ALICE.as_slice(), &1u64.to_be_bytes()[..]].concat());
    let payment = engine.transaction(&payment_hash).unwrap().unwrap();
    assert_eq!(payment.status, TransactionStatus::Verified);
    assert_eq!(payment.eth_commit_tx_hash, Some(B256::repeat_byte(0xc1)));
    assert_eq!(payment.eth_execute_tx_hash, Some(B256::repeat_byte(0xc3)));
    assert_eq!(payment.fee, U256::from(210_000u64));

    assert_eq!(payment.erc20_transfers.len(), 1);
    let json = serde_json::to_value(&payment).unwrap();
    assert_eq!(json["transfer"]["amount"], "0x1");

    let transfer = payment.transfer.unwrap();
    assert_eq!((transfer.from, transfer.to), (ALICE, BOB));
    assert_eq!(transfer.amount, U256::from(1u64));
    assert_eq!(transfer.token_info.address, TOKEN);
    assert_eq!(transfer.token_info.symbol.as_deref(), Some("TST"));

    let changes: Vec<_> = payment
        .balance_changes
        .iter()
        .map(|change| (change.address, change.balance_before, change.balance_after))
        .collect();
    assert_eq!(
        changes,
        vec![
            (ALICE, U256::from(10u64), U256::from(9u64)),
            (BOB, U256::ZERO, U256::from(1u64)),
        ]
    );
    assert_eq!(payment.logs.len(), 1);

    let bob = engine.account(&BOB).unwrap().unwrap();
    assert_eq!(bob.balances[&TOKEN].balance, U256::from(1u64));
    let alice = engine.account(&ALICE).unwrap().unwrap();
    assert_eq!(alice.sealed_nonce, 2);
    assert_eq!(alice.verified_nonce, 2);
    let carol = engine.account(&CAROL).unwrap().unwrap();
    assert_eq!(carol.sealed_nonce, 1);
    assert_eq!(carol.verified_nonce, 0);

    let batch = engine.l1_batch(1).unwrap().unwrap();
    assert_eq!(batch.status, BlockStatus::Verified);
    assert_eq!(engine.block(3).unwrap().unwrap().status, BlockStatus::Sealed);
}

#[tokio::test]
async fn account_listing_counts_every_touching_transaction() {
    let dir = tempfile::tempdir().unwrap();
    let path = db_path(&dir);
    let tracker = index_scenario(&path).await;

    let conn = Database::open_reader(&path).unwrap();
    let engine = QueryEngine::new(&conn, tracker.head(), QueryLimits::default());

    let query = |account| {
        TransactionQuery::try_from(TransactionListParams {
            direction: Some(Direction::Older),
            limit: 10,
            account_address: Some(account),
            ..Default::default()
        })
        .unwrap()
    };

    let alice = engine.transactions(&query(ALICE)).unwrap();
    assert_eq!(alice.total, 2);
    assert_eq!(alice.list[0].block_number, 2);
    assert_eq!(alice.list[1].block_number, 1);

    let bob = engine.transactions(&query(BOB)).unwrap();
    assert_eq!(bob.total, 1);
    assert_eq!(bob.list[0].initiator_address, ALICE);
}

#[tokio::test]
async fn pages_mirror_around_a_cursor_and_stay_stable() {
    let dir = tempfile::tempdir().unwrap();
    let path = db_path(&dir);
    let tracker = index_scenario(&path).await;

    let conn = Database::open_reader(&path).unwrap();
    let engine = QueryEngine::new(&conn, tracker.head(), QueryLimits::default());
    let page = |direction, from| {
        let query = BlockQuery::try_from(BlockListParams {
            direction: Some(direction),
            limit: 1,
            from,
            ..Default::default()
        })
        .unwrap();
        engine.blocks(&query).unwrap()
    };

    let newest = page(Direction::Older, None);
    assert_eq!(newest.total, 3);
    assert_eq!(newest.list[0].number, 3);
    for _ in 0..3 {
        assert_eq!(page(Direction::Older, None), newest);
    }

    let older = page(Direction::Older, Some(3));
    let newer = page(Direction::Newer, Some(1));
    assert_eq!(older.list, newer.list);
    assert_eq!(older.list[0].number, 2);
    assert_eq!(newer.total, 3);
}

struct StaticCompiler;

#[async_trait]
impl Compiler for StaticCompiler {
    async fn compile(
        &self,
        _request: &VerificationRequest,
    ) -> Result<CompilationArtifacts, CompilationError> {
        Ok(CompilationArtifacts {
            bytecode: Bytes::from(COUNTER_CODE.to_vec()),
            abi: serde_json::json!([]),
        })
    }
}

#[tokio::test]
async fn deployed_contract_can_be_verified() {
    let dir = tempfile::tempdir().unwrap();
    let path = db_path(&dir);
    let tracker = index_scenario(&path).await;

    let (verifier, _dispatcher) =
        spawn_verifier(Database::new(&path).unwrap(), StaticCompiler, 1).unwrap();
    let request = VerificationRequest {
        contract_address: COUNTER,
        contract_name: "Counter".to_string(),
        source_code: SourceCodeData::SingleFile("contract Counter {}".to_string()),
        code_format: CodeFormat::SoliditySingleFile,
        compiler_zksolc_version: "v1.3.1".to_string(),
        compiler_solc_version: "0.8.16".to_string(),
        optimization_used: true,
        constructor_arguments: Bytes::from(vec![0xaa]),
        is_system: false,
    };
    let id = verifier.submit(request.clone()).await.unwrap();

    let mut status = None;
    for _ in 0..200 {
        let info = verifier.status(id).await.unwrap().unwrap();
        if info.status.is_terminal() {
            status = Some(info.status);
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(status, Some(VerificationStatus::Successful));

    let conn = Database::open_reader(&path).unwrap();
    let engine = QueryEngine::new(&conn, tracker.head(), QueryLimits::default());
    let contract = engine.contract(&COUNTER).unwrap().unwrap();
    assert_eq!(contract.creator_address, CAROL);
    let info = contract.verification_info.unwrap();
    assert_eq!(info["request"]["contractName"], "Counter");

    // A verified contract does not take new submissions
    assert!(verifier.submit(request).await.is_err());
}
