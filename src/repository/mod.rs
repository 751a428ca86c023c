pub mod account_repository;
pub mod balance_repository;
pub mod block_repository;
pub mod columns;
pub mod contract_repository;
pub mod database;
pub mod event_repository;
pub mod l1_batch_repository;
pub mod models;
pub mod token_repository;
pub mod transaction_repository;
pub mod transfer_repository;
pub mod verification_repository;

pub use account_repository::{AccountRepository, Nonces};
pub use balance_repository::BalanceRepository;
pub use block_repository::{BlockRange, BlockRepository};
pub use columns::{Conditions, Page};
pub use contract_repository::ContractRepository;
pub use database::{Database, write_transaction};
pub use event_repository::EventRepository;
pub use l1_batch_repository::L1BatchRepository;
pub use token_repository::TokenRepository;
pub use transaction_repository::TransactionRepository;
pub use transfer_repository::TransferRepository;
pub use verification_repository::VerificationRepository;
