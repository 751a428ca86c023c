use super::filters::{
    BlockFilter, BlockQuery, EventFilter, EventQuery, L1BatchQuery, TransactionFilter,
    TransactionQuery,
};
use super::pagination::{Cursor, Keyset, Pagination, QueryLimits};
use crate::error::ExplorerResult;
use crate::repository::columns::hex_column;
use crate::repository::models::{
    AccountDetails, AccountType, BlockDetails, BlockSummary, ContractDetails, Event,
    L1BatchDetails, L1BatchSummary, NetworkStats, Paginated, Token, TransactionDetails,
};
use crate::repository::{
    AccountRepository, BalanceRepository, BlockRepository, Conditions, ContractRepository,
    EventRepository, L1BatchRepository, Page, TokenRepository, TransactionRepository,
};
use crate::tracker::ChainHead;
use alloy_primitives::{Address, B256};
use rusqlite::Connection;

const BLOCK_KEYS: Keyset = Keyset {
    primary: "number",
    secondary: None,
};
const L1_BATCH_KEYS: Keyset = Keyset {
    primary: "number",
    secondary: None,
};
const TRANSACTION_KEYS: Keyset = Keyset {
    primary: "t.block_number",
    secondary: Some("t.index_in_block"),
};
const EVENT_KEYS: Keyset = Keyset {
    primary: "block_number",
    secondary: Some("log_index"),
};

/// Read side of the explorer. Every answer is bounded by the `ChainHead`
/// snapshot it was created with, so rows committed after the snapshot stay
/// invisible.
pub struct QueryEngine<'a> {
    conn: &'a Connection,
    head: ChainHead,
    limits: QueryLimits,
}

impl<'a> QueryEngine<'a> {
    pub fn new(conn: &'a Connection, head: ChainHead, limits: QueryLimits) -> Self {
        Self { conn, head, limits }
    }

    pub fn head(&self) -> &ChainHead {
        &self.head
    }

    pub fn network_stats(&self) -> NetworkStats {
        self.head.network_stats()
    }

    pub fn blocks(&self, query: &BlockQuery) -> ExplorerResult<Paginated<BlockSummary>> {
        let filter = query.filter;
        let conditions = |last: u64| {
            let mut conditions = Conditions::new().with("number <= ?", vec![Box::new(last)]);
            if let BlockFilter::L1Batch(number) = filter {
                conditions.push("l1_batch_number = ?", vec![Box::new(number)]);
            }
            conditions
        };
        let blocks = BlockRepository::new(self.conn);
        self.paginate(
            &query.pagination,
            &BLOCK_KEYS,
            self.head.last_sealed_block,
            conditions,
            |c| blocks.count(c),
            |c, page| blocks.list(c, page),
        )
    }

    pub fn block(&self, number: u64) -> ExplorerResult<Option<BlockDetails>> {
        if !within(number, self.head.last_sealed_block) {
            return Ok(None);
        }
        BlockRepository::new(self.conn).get_details(number)
    }

    pub fn l1_batches(&self, query: &L1BatchQuery) -> ExplorerResult<Paginated<L1BatchSummary>> {
        let batches = L1BatchRepository::new(self.conn);
        self.paginate(
            &query.pagination,
            &L1_BATCH_KEYS,
            self.head.last_sealed_batch,
            |last| Conditions::new().with("number <= ?", vec![Box::new(last)]),
            |c| batches.count(c),
            |c, page| batches.list(c, page),
        )
    }

    pub fn l1_batch(&self, number: u64) -> ExplorerResult<Option<L1BatchDetails>> {
        if !within(number, self.head.last_sealed_batch) {
            return Ok(None);
        }
        L1BatchRepository::new(self.conn).get_details(number)
    }

    pub fn transactions(
        &self,
        query: &TransactionQuery,
    ) -> ExplorerResult<Paginated<TransactionDetails>> {
        let filter = query.filter;
        let conditions = |last: u64| {
            let mut conditions =
                Conditions::new().with("t.block_number <= ?", vec![Box::new(last)]);
            match filter {
                TransactionFilter::All => {}
                TransactionFilter::Account(address) => conditions.push(
                    "t.hash IN (SELECT transaction_hash FROM transaction_accounts WHERE address = ?)",
                    vec![Box::new(hex_column(&address))],
                ),
                TransactionFilter::Contract(address) => conditions.push(
                    "t.to_address = ?",
                    vec![Box::new(hex_column(&address))],
                ),
                TransactionFilter::Block(number) => {
                    conditions.push("t.block_number = ?", vec![Box::new(number)])
                }
                TransactionFilter::L1Batch(number) => {
                    conditions.push("t.l1_batch_number = ?", vec![Box::new(number)])
                }
            }
            conditions
        };
        let transactions = TransactionRepository::new(self.conn);
        self.paginate(
            &query.pagination,
            &TRANSACTION_KEYS,
            self.head.last_sealed_block,
            conditions,
            |c| transactions.count(c),
            |c, page| transactions.list(c, page),
        )
    }

    pub fn transaction(&self, hash: &B256) -> ExplorerResult<Option<TransactionDetails>> {
        let details = TransactionRepository::new(self.conn).get(hash)?;
        Ok(details.filter(|details| within(details.block_number, self.head.last_sealed_block)))
    }

    pub fn events(&self, query: &EventQuery) -> ExplorerResult<Paginated<Event>> {
        let filter = query.filter;
        let conditions = |last: u64| {
            let mut conditions = Conditions::new().with("block_number <= ?", vec![Box::new(last)]);
            if let EventFilter::Contract(address) = filter {
                conditions.push("address = ?", vec![Box::new(hex_column(&address))]);
            }
            conditions
        };
        let events = EventRepository::new(self.conn);
        self.paginate(
            &query.pagination,
            &EVENT_KEYS,
            self.head.last_sealed_block,
            conditions,
            |c| events.count(c),
            |c, page| events.list(c, page),
        )
    }

    /// `None` if the address never appeared in an indexed transaction.
    pub fn account(&self, address: &Address) -> ExplorerResult<Option<AccountDetails>> {
        let tx = self.conn.unchecked_transaction()?;
        let Some(nonces) = AccountRepository::new(self.conn).get_nonces(address)? else {
            return Ok(None);
        };
        let balances = BalanceRepository::new(self.conn).for_address(address)?;
        let account_type = if ContractRepository::new(self.conn).exists(address)? {
            AccountType::Contract
        } else {
            AccountType::Eoa
        };
        tx.commit()?;

        Ok(Some(AccountDetails {
            address: *address,
            balances,
            sealed_nonce: nonces.sealed,
            verified_nonce: nonces.verified,
            account_type,
        }))
    }

    pub fn contract(&self, address: &Address) -> ExplorerResult<Option<ContractDetails>> {
        let tx = self.conn.unchecked_transaction()?;
        let Some(contract) = ContractRepository::new(self.conn).get(address)? else {
            return Ok(None);
        };
        let balances = BalanceRepository::new(self.conn).for_address(address)?;
        tx.commit()?;

        Ok(Some(ContractDetails {
            address: contract.address,
            creator_address: contract.creator_address,
            creator_tx_hash: contract.creator_tx_hash,
            created_in_block_number: contract.created_in_block_number,
            total_transactions: contract.total_transactions,
            bytecode: contract.bytecode,
            verification_info: contract.verification_info,
            balances,
        }))
    }

    pub fn token(&self, address: &Address) -> ExplorerResult<Option<Token>> {
        TokenRepository::new(self.conn).get(address)
    }

    /// Validates the window, then counts and lists inside one read
    /// transaction. `bound` is the newest visible item, `None` when nothing
    /// has been indexed yet.
    fn paginate<C: Cursor, T>(
        &self,
        pagination: &Pagination<C>,
        keys: &Keyset,
        bound: Option<u64>,
        conditions: impl Fn(u64) -> Conditions,
        count: impl FnOnce(&Conditions) -> ExplorerResult<u64>,
        list: impl FnOnce(&Conditions, &Page) -> ExplorerResult<Vec<T>>,
    ) -> ExplorerResult<Paginated<T>> {
        pagination.validate(&self.limits)?;
        let Some(bound) = bound else {
            return Ok(Paginated::empty());
        };

        let tx = self.conn.unchecked_transaction()?;
        let total = count(&conditions(bound))?;
        let (window, page) = pagination.window(keys, conditions(bound));
        let list = list(&window, &page)?;
        tx.commit()?;

        Ok(Paginated { total, list })
    }
}

fn within(number: u64, bound: Option<u64>) -> bool {
    bound.is_some_and(|bound| number <= bound)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::filters::{BlockListParams, TransactionListParams};
    use crate::query::pagination::Direction;
    use crate::repository::models::{BlockStatus, ETH_ADDRESS};
    use crate::testing::{seed_block, test_db};

    fn block_query(direction: Direction, from: Option<u64>, limit: u64) -> BlockQuery {
        BlockQuery::try_from(BlockListParams {
            direction: Some(direction),
            from,
            limit,
            ..Default::default()
        })
        .unwrap()
    }

    fn numbers(page: &Paginated<BlockSummary>) -> Vec<u64> {
        page.list.iter().map(|block| block.number).collect()
    }

    #[test]
    fn empty_store_yields_empty_pages_but_still_validates() {
        let db = test_db();
        let head = ChainHead::load(&db.conn).unwrap();
        let engine = QueryEngine::new(&db.conn, head, QueryLimits::default());

        let page = engine.blocks(&block_query(Direction::Older, None, 10)).unwrap();
        assert_eq!(page, Paginated::empty());
        assert!(engine.blocks(&block_query(Direction::Newer, None, 10)).is_err());
        assert!(engine.block(0).unwrap().is_none());
    }

    #[test]
    fn newer_and_older_windows_mirror_each_other() {
        let db = test_db();
        for number in 1..=10 {
            seed_block(&db.conn, number, 1 + number / 4);
        }
        let head = ChainHead::load(&db.conn).unwrap();
        let engine = QueryEngine::new(&db.conn, head, QueryLimits::default());

        let newer = engine.blocks(&block_query(Direction::Newer, Some(3), 4)).unwrap();
        let older = engine.blocks(&block_query(Direction::Older, Some(3 + 4 + 1), 4)).unwrap();
        assert_eq!(numbers(&newer), vec![4, 5, 6, 7]);
        let mut reversed = numbers(&older);
        reversed.reverse();
        assert_eq!(numbers(&newer), reversed);
        assert_eq!(newer.total, 10);

        let latest = engine.blocks(&block_query(Direction::Older, None, 1)).unwrap();
        assert_eq!(numbers(&latest), vec![10]);
        assert_eq!(latest.list[0].status, BlockStatus::Sealed);
    }

    #[test]
    fn snapshot_hides_later_blocks() {
        let db = test_db();
        seed_block(&db.conn, 1, 1);
        let head = ChainHead::load(&db.conn).unwrap();
        seed_block(&db.conn, 2, 1);

        let engine = QueryEngine::new(&db.conn, head, QueryLimits::default());
        let page = engine.blocks(&block_query(Direction::Older, None, 10)).unwrap();
        assert_eq!(numbers(&page), vec![1]);
        assert_eq!(page.total, 1);
        assert!(engine.block(2).unwrap().is_none());

        let transactions = engine
            .transactions(
                &TransactionQuery::try_from(TransactionListParams {
                    direction: Some(Direction::Older),
                    limit: 10,
                    ..Default::default()
                })
                .unwrap(),
            )
            .unwrap();
        assert_eq!(transactions.total, 1);
    }

    #[test]
    fn transaction_cursor_walks_within_a_block() {
        let db = test_db();
        let first = seed_block(&db.conn, 1, 1);
        let second = seed_block(&db.conn, 2, 1);
        let head = ChainHead::load(&db.conn).unwrap();
        let engine = QueryEngine::new(&db.conn, head, QueryLimits::default());

        let query = |from_block_number, from_tx_index| {
            TransactionQuery::try_from(TransactionListParams {
                direction: Some(Direction::Older),
                limit: 10,
                from_block_number,
                from_tx_index,
                ..Default::default()
            })
            .unwrap()
        };

        let all = engine.transactions(&query(None, None)).unwrap();
        let hashes: Vec<_> = all.list.iter().map(|tx| tx.transaction_hash).collect();
        assert_eq!(hashes, vec![second, first]);

        let before_second = engine.transactions(&query(Some(2), Some(0))).unwrap();
        assert_eq!(before_second.list.len(), 1);
        assert_eq!(before_second.list[0].transaction_hash, first);
        assert_eq!(before_second.total, 2);

        let before_block_two = engine.transactions(&query(Some(2), None)).unwrap();
        assert_eq!(before_block_two.list.len(), 1);
    }

    #[test]
    fn unknown_items_are_none() {
        let db = test_db();
        seed_block(&db.conn, 1, 1);
        let head = ChainHead::load(&db.conn).unwrap();
        let engine = QueryEngine::new(&db.conn, head, QueryLimits::default());

        assert!(engine.transaction(&B256::repeat_byte(0x99)).unwrap().is_none());
        assert!(engine.account(&Address::repeat_byte(0x99)).unwrap().is_none());
        assert!(engine.contract(&Address::repeat_byte(0x99)).unwrap().is_none());
        assert!(engine.token(&Address::repeat_byte(0x99)).unwrap().is_none());
        assert!(engine.l1_batch(2).unwrap().is_none());
        assert_eq!(engine.token(&ETH_ADDRESS).unwrap().unwrap().symbol, "ETH");
        assert_eq!(engine.network_stats().last_sealed, 1);
    }
}
