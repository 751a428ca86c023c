//! JSON-RPC surface of the explorer (`explorer_*` methods).

use crate::error::{ExplorerError, ExplorerResult};
use crate::query::{
    BlockListParams, BlockQuery, EventListParams, EventQuery, L1BatchListParams, L1BatchQuery,
    QueryEngine, QueryLimits, TransactionListParams, TransactionQuery,
};
use crate::repository::Database;
use crate::repository::models::{
    AccountDetails, BlockDetails, BlockSummary, ContractDetails, Event, L1BatchDetails,
    L1BatchSummary, NetworkStats, Paginated, Token, TransactionDetails,
};
use crate::tracker::ChainHead;
use crate::verification::{VerificationHandle, VerificationRequest, VerificationStatusInfo};
use alloy_primitives::{Address, B256};
use async_trait::async_trait;
use jsonrpsee::core::RpcResult;
use jsonrpsee::proc_macros::rpc;
use jsonrpsee::server::{ServerBuilder, ServerHandle};
use jsonrpsee::types::ErrorObjectOwned;
use jsonrpsee::types::error::{INTERNAL_ERROR_CODE, INVALID_PARAMS_CODE};
use std::net::SocketAddr;
use tokio::sync::watch;
use tracing::error;

#[rpc(server, namespace = "explorer")]
pub trait ExplorerApi {
    #[method(name = "networkStats")]
    async fn network_stats(&self) -> RpcResult<NetworkStats>;

    #[method(name = "blocks")]
    async fn blocks(&self, params: BlockListParams) -> RpcResult<Paginated<BlockSummary>>;

    #[method(name = "block")]
    async fn block(&self, number: u64) -> RpcResult<Option<BlockDetails>>;

    #[method(name = "l1Batches")]
    async fn l1_batches(&self, params: L1BatchListParams) -> RpcResult<Paginated<L1BatchSummary>>;

    #[method(name = "l1Batch")]
    async fn l1_batch(&self, number: u64) -> RpcResult<Option<L1BatchDetails>>;

    #[method(name = "account")]
    async fn account(&self, address: Address) -> RpcResult<Option<AccountDetails>>;

    #[method(name = "contract")]
    async fn contract(&self, address: Address) -> RpcResult<Option<ContractDetails>>;

    #[method(name = "transaction")]
    async fn transaction(&self, hash: B256) -> RpcResult<Option<TransactionDetails>>;

    #[method(name = "transactions")]
    async fn transactions(
        &self,
        params: TransactionListParams,
    ) -> RpcResult<Paginated<TransactionDetails>>;

    #[method(name = "events")]
    async fn events(&self, params: EventListParams) -> RpcResult<Paginated<Event>>;

    #[method(name = "token")]
    async fn token(&self, address: Address) -> RpcResult<Option<Token>>;

    /// Queues a source verification and returns its request id.
    #[method(name = "contractVerification")]
    async fn contract_verification(&self, request: VerificationRequest) -> RpcResult<u64>;

    #[method(name = "contractVerificationStatus")]
    async fn contract_verification_status(
        &self,
        id: u64,
    ) -> RpcResult<Option<VerificationStatusInfo>>;
}

fn to_rpc_error(err: ExplorerError) -> ErrorObjectOwned {
    match err {
        ExplorerError::InvalidRequest(message) => {
            ErrorObjectOwned::owned(INVALID_PARAMS_CODE, message, None::<()>)
        }
        other => {
            error!("Request failed: {}", other);
            ErrorObjectOwned::owned(INTERNAL_ERROR_CODE, other.to_string(), None::<()>)
        }
    }
}

pub struct ExplorerRpc {
    db_path: String,
    head: watch::Receiver<ChainHead>,
    limits: QueryLimits,
    verifier: VerificationHandle,
}

impl ExplorerRpc {
    pub fn new(
        db_path: impl Into<String>,
        head: watch::Receiver<ChainHead>,
        limits: QueryLimits,
        verifier: VerificationHandle,
    ) -> Self {
        Self {
            db_path: db_path.into(),
            head,
            limits,
            verifier,
        }
    }

    pub async fn launch(self, addr: SocketAddr) -> std::io::Result<ServerHandle> {
        let server = ServerBuilder::default().build(addr).await?;
        Ok(server.start(self.into_rpc()))
    }

    /// Runs `f` on a fresh read-only connection against the current head.
    async fn read<T, F>(&self, f: F) -> RpcResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&QueryEngine<'_>) -> ExplorerResult<T> + Send + 'static,
    {
        let db_path = self.db_path.clone();
        let head = *self.head.borrow();
        let limits = self.limits;

        let result = tokio::task::spawn_blocking(move || {
            let conn = Database::open_reader(&db_path)?;
            f(&QueryEngine::new(&conn, head, limits))
        })
        .await;
        match result {
            Ok(result) => result.map_err(to_rpc_error),
            Err(e) => Err(to_rpc_error(e.into())),
        }
    }
}

#[async_trait]
impl ExplorerApiServer for ExplorerRpc {
    async fn network_stats(&self) -> RpcResult<NetworkStats> {
        Ok(self.head.borrow().network_stats())
    }

    async fn blocks(&self, params: BlockListParams) -> RpcResult<Paginated<BlockSummary>> {
        let query = BlockQuery::try_from(params).map_err(to_rpc_error)?;
        self.read(move |engine| engine.blocks(&query)).await
    }

    async fn block(&self, number: u64) -> RpcResult<Option<BlockDetails>> {
        self.read(move |engine| engine.block(number)).await
    }

    async fn l1_batches(&self, params: L1BatchListParams) -> RpcResult<Paginated<L1BatchSummary>> {
        let query = L1BatchQuery::try_from(params).map_err(to_rpc_error)?;
        self.read(move |engine| engine.l1_batches(&query)).await
    }

    async fn l1_batch(&self, number: u64) -> RpcResult<Option<L1BatchDetails>> {
        self.read(move |engine| engine.l1_batch(number)).await
    }

    async fn account(&self, address: Address) -> RpcResult<Option<AccountDetails>> {
        self.read(move |engine| engine.account(&address)).await
    }

    async fn contract(&self, address: Address) -> RpcResult<Option<ContractDetails>> {
        self.read(move |engine| engine.contract(&address)).await
    }

    async fn transaction(&self, hash: B256) -> RpcResult<Option<TransactionDetails>> {
        self.read(move |engine| engine.transaction(&hash)).await
    }

    async fn transactions(
        &self,
        params: TransactionListParams,
    ) -> RpcResult<Paginated<TransactionDetails>> {
        let query = TransactionQuery::try_from(params).map_err(to_rpc_error)?;
        self.read(move |engine| engine.transactions(&query)).await
    }

    async fn events(&self, params: EventListParams) -> RpcResult<Paginated<Event>> {
        let query = EventQuery::try_from(params).map_err(to_rpc_error)?;
        self.read(move |engine| engine.events(&query)).await
    }

    async fn token(&self, address: Address) -> RpcResult<Option<Token>> {
        self.read(move |engine| engine.token(&address)).await
    }

    async fn contract_verification(&self, request: VerificationRequest) -> RpcResult<u64> {
        self.verifier.submit(request).await.map_err(to_rpc_error)
    }

    async fn contract_verification_status(
        &self,
        id: u64,
    ) -> RpcResult<Option<VerificationStatusInfo>> {
        self.verifier.status(id).await.map_err(to_rpc_error)
    }
}
