use crate::error::ExplorerResult;
use crate::repository::models::Token;
use crate::repository::token_repository::TokenRepository;
use rusqlite::{Connection, OpenFlags, Transaction, TransactionBehavior};
use std::time::Duration;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

pub struct Database {
    pub conn: Connection,
}

/// Accepts both `sqlite:path` URLs and bare paths.
pub fn normalize_path(db_path: &str) -> &str {
    db_path.strip_prefix("sqlite:").unwrap_or(db_path)
}

fn configure_connection(conn: &Connection) -> rusqlite::Result<()> {
    conn.busy_timeout(BUSY_TIMEOUT)?;
    conn.execute_batch(
        "PRAGMA journal_mode=WAL;
         PRAGMA synchronous=NORMAL;
         PRAGMA foreign_keys=ON;",
    )
}

/// Starts a write transaction that holds the write lock from `BEGIN`, so rows
/// read inside it cannot be invalidated by another writer's commit.
pub fn write_transaction(conn: &Connection) -> ExplorerResult<Transaction<'_>> {
    Ok(Transaction::new_unchecked(conn, TransactionBehavior::Immediate)?)
}

impl Database {
    /// Opens a writer connection and makes sure the schema exists.
    pub fn new(db_path: &str) -> ExplorerResult<Self> {
        let conn = Connection::open(normalize_path(db_path))?;
        configure_connection(&conn)?;

        let db = Database { conn };
        db.create_tables()?;
        Ok(db)
    }

    /// Private in-memory database, used by tests and dry runs.
    pub fn in_memory() -> ExplorerResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;

        let db = Database { conn };
        db.create_tables()?;
        Ok(db)
    }

    /// Opens a read-only connection. Readers see the last committed state and
    /// never block the writer.
    pub fn open_reader(db_path: &str) -> ExplorerResult<Connection> {
        let conn = Connection::open_with_flags(
            normalize_path(db_path),
            OpenFlags::SQLITE_OPEN_READ_ONLY
                | OpenFlags::SQLITE_OPEN_URI
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        Ok(conn)
    }

    fn create_tables(&self) -> ExplorerResult<()> {
        self.conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS l1_batches (
                number INTEGER PRIMARY KEY,
                timestamp INTEGER NOT NULL,
                l1_tx_count INTEGER NOT NULL,
                l2_tx_count INTEGER NOT NULL,
                status TEXT NOT NULL,
                bootloader_hash TEXT NOT NULL,
                default_aa_hash TEXT NOT NULL,
                l1_gas_price INTEGER NOT NULL,
                l2_fair_gas_price INTEGER NOT NULL,
                commit_tx_hash TEXT,
                committed_at TEXT,
                prove_tx_hash TEXT,
                proven_at TEXT,
                execute_tx_hash TEXT,
                executed_at TEXT
            );

            CREATE TABLE IF NOT EXISTS blocks (
                number INTEGER PRIMARY KEY,
                hash TEXT NOT NULL UNIQUE,
                l1_batch_number INTEGER NOT NULL REFERENCES l1_batches(number),
                timestamp INTEGER NOT NULL,
                l1_tx_count INTEGER NOT NULL,
                l2_tx_count INTEGER NOT NULL,
                status TEXT NOT NULL,
                bootloader_hash TEXT NOT NULL,
                default_aa_hash TEXT NOT NULL,
                operator_address TEXT NOT NULL,
                l1_gas_price INTEGER NOT NULL,
                l2_fair_gas_price INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_blocks_l1_batch_number
             ON blocks(l1_batch_number);

            CREATE TABLE IF NOT EXISTS transactions (
                hash TEXT PRIMARY KEY,
                block_number INTEGER NOT NULL REFERENCES blocks(number),
                index_in_block INTEGER NOT NULL,
                l1_batch_number INTEGER NOT NULL,
                nonce INTEGER NOT NULL,
                initiator_address TEXT NOT NULL,
                to_address TEXT,
                is_l1_originated INTEGER NOT NULL,
                tx_type INTEGER NOT NULL,
                calldata BLOB NOT NULL,
                value TEXT NOT NULL,
                fee TEXT NOT NULL,
                factory_deps TEXT,
                received_at TEXT NOT NULL,
                balance_changes TEXT NOT NULL,
                transfer TEXT,
                UNIQUE (block_number, index_in_block)
            );

            CREATE INDEX IF NOT EXISTS idx_transactions_l1_batch_number
             ON transactions(l1_batch_number);

            CREATE INDEX IF NOT EXISTS idx_transactions_to
             ON transactions(to_address);

            CREATE TABLE IF NOT EXISTS transaction_accounts (
                address TEXT NOT NULL,
                transaction_hash TEXT NOT NULL REFERENCES transactions(hash),
                block_number INTEGER NOT NULL,
                index_in_block INTEGER NOT NULL,
                PRIMARY KEY (address, transaction_hash)
            );

            CREATE INDEX IF NOT EXISTS idx_transaction_accounts_position
             ON transaction_accounts(address, block_number, index_in_block);

            CREATE TABLE IF NOT EXISTS transfers (
                transaction_hash TEXT NOT NULL REFERENCES transactions(hash),
                log_index INTEGER NOT NULL,
                token_address TEXT NOT NULL,
                from_address TEXT NOT NULL,
                to_address TEXT NOT NULL,
                value TEXT NOT NULL,
                block_number INTEGER NOT NULL,
                PRIMARY KEY (transaction_hash, log_index)
            );

            CREATE INDEX IF NOT EXISTS idx_transfers_from
             ON transfers(from_address);

            CREATE INDEX IF NOT EXISTS idx_transfers_to
             ON transfers(to_address);

            CREATE TABLE IF NOT EXISTS events (
                block_number INTEGER NOT NULL REFERENCES blocks(number),
                log_index INTEGER NOT NULL,
                address TEXT NOT NULL,
                topics TEXT NOT NULL,
                data BLOB NOT NULL,
                block_hash TEXT NOT NULL,
                transaction_hash TEXT NOT NULL,
                transaction_index INTEGER NOT NULL,
                transaction_log_index INTEGER NOT NULL,
                removed INTEGER NOT NULL DEFAULT 0,
                PRIMARY KEY (block_number, log_index)
            );

            CREATE INDEX IF NOT EXISTS idx_events_address
             ON events(address, block_number, log_index);

            CREATE INDEX IF NOT EXISTS idx_events_transaction
             ON events(transaction_hash);

            CREATE TABLE IF NOT EXISTS accounts (
                address TEXT PRIMARY KEY,
                sealed_nonce INTEGER NOT NULL DEFAULT 0,
                verified_nonce INTEGER NOT NULL DEFAULT 0
            );

            CREATE TABLE IF NOT EXISTS balances (
                address TEXT NOT NULL,
                token_address TEXT NOT NULL,
                balance TEXT NOT NULL,
                PRIMARY KEY (address, token_address)
            );

            CREATE TABLE IF NOT EXISTS contracts (
                address TEXT PRIMARY KEY,
                creator_address TEXT NOT NULL,
                creator_tx_hash TEXT NOT NULL,
                created_in_block_number INTEGER NOT NULL,
                bytecode BLOB NOT NULL,
                total_transactions INTEGER NOT NULL DEFAULT 0,
                verification_info TEXT
            );

            CREATE TABLE IF NOT EXISTS tokens (
                address TEXT PRIMARY KEY,
                l1_address TEXT,
                l2_address TEXT NOT NULL,
                name TEXT NOT NULL,
                symbol TEXT NOT NULL,
                decimals INTEGER NOT NULL,
                usd_price TEXT
            );

            CREATE TABLE IF NOT EXISTS verification_requests (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                contract_address TEXT NOT NULL,
                request TEXT NOT NULL,
                status TEXT NOT NULL,
                error TEXT,
                created_at TEXT NOT NULL,
                processed_at TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_verification_requests_status
             ON verification_requests(status, id);

            CREATE INDEX IF NOT EXISTS idx_verification_requests_address
             ON verification_requests(contract_address);",
        )?;

        // The native asset is always known
        TokenRepository::new(&self.conn).insert_if_absent(&Token::ether())?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::models::ETH_ADDRESS;

    #[test]
    fn schema_creation_is_idempotent_and_seeds_ether() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("explorer.db");
        let path = format!("sqlite:{}", path.display());

        drop(Database::new(&path).unwrap());
        let db = Database::new(&path).unwrap();

        let token = TokenRepository::new(&db.conn)
            .get(&ETH_ADDRESS)
            .unwrap()
            .unwrap();
        assert_eq!(token.symbol, "ETH");
        assert_eq!(token.decimals, 18);

        let mode: String = db
            .conn
            .query_row("PRAGMA journal_mode", [], |row| row.get(0))
            .unwrap();
        assert_eq!(mode.to_lowercase(), "wal");
    }

    #[test]
    fn reader_sees_committed_rows_only() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("explorer.db");
        let path = path.to_string_lossy().to_string();
        let db = Database::new(&path).unwrap();

        let tx = db.conn.unchecked_transaction().unwrap();
        tx.execute(
            "INSERT INTO accounts (address, sealed_nonce) VALUES ('0x01', 1)",
            [],
        )
        .unwrap();

        let reader = Database::open_reader(&path).unwrap();
        let count = |conn: &Connection| -> u64 {
            conn.query_row("SELECT COUNT(*) FROM accounts", [], |row| row.get(0))
                .unwrap()
        };
        assert_eq!(count(&reader), 0);

        tx.commit().unwrap();
        assert_eq!(count(&reader), 1);
    }
}
