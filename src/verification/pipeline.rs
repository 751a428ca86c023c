use super::compiler::{CompilationError, Compiler};
use super::types::{
    CompilationArtifacts, VerificationJob, VerificationRequest, VerificationStatus,
    VerificationStatusInfo,
};
use crate::error::{ExplorerError, ExplorerResult};
use crate::repository::{ContractRepository, Database, VerificationRepository, write_transaction};
use chrono::Utc;
use rusqlite::Connection;
use serde_json::json;
use std::sync::{Arc, Mutex};
use tokio::sync::{Semaphore, mpsc};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Validates a submission and stores it as a queued job.
pub fn enqueue(conn: &Connection, request: &VerificationRequest) -> ExplorerResult<u64> {
    let tx = write_transaction(conn)?;
    let address = request.contract_address;

    let contract = ContractRepository::new(&tx).get(&address)?.ok_or_else(|| {
        ExplorerError::invalid(format!("contract {address:?} is not deployed"))
    })?;
    if contract.verification_info.is_some() {
        return Err(ExplorerError::invalid(format!(
            "contract {address:?} is already verified"
        )));
    }
    let jobs = VerificationRepository::new(&tx);
    if jobs.has_active(&address)? {
        return Err(ExplorerError::invalid(format!(
            "a verification of {address:?} is already pending"
        )));
    }

    let id = jobs.insert(request)?;
    tx.commit()?;
    Ok(id)
}

/// Records the outcome of a compilation. A match stores the verification info
/// and the job status in the same transaction.
pub fn complete(
    conn: &Connection,
    job: &VerificationJob,
    compiled: Result<CompilationArtifacts, CompilationError>,
) -> ExplorerResult<VerificationStatus> {
    let tx = write_transaction(conn)?;
    let jobs = VerificationRepository::new(&tx);

    let artifacts = match compiled {
        Ok(artifacts) => artifacts,
        Err(e) => {
            jobs.finish(job.id, VerificationStatus::Failed, Some(&e.to_string()))?;
            tx.commit()?;
            return Ok(VerificationStatus::Failed);
        }
    };

    let contracts = ContractRepository::new(&tx);
    let address = job.request.contract_address;
    let deployed = contracts
        .get(&address)?
        .ok_or_else(|| ExplorerError::Internal(format!("contract {address:?} disappeared")))?;

    let expected = [
        artifacts.bytecode.as_ref(),
        job.request.constructor_arguments.as_ref(),
    ]
    .concat();
    if expected != deployed.bytecode.as_ref() {
        jobs.finish(
            job.id,
            VerificationStatus::Failed,
            Some("Compiled bytecode does not match the deployed contract"),
        )?;
        tx.commit()?;
        return Ok(VerificationStatus::Failed);
    }

    let info = json!({
        "request": job.request,
        "artifacts": artifacts,
        "verifiedAt": Utc::now(),
    });
    if !contracts.set_verification_info(&address, &info)? {
        jobs.finish(
            job.id,
            VerificationStatus::Failed,
            Some("Contract is already verified"),
        )?;
        tx.commit()?;
        return Ok(VerificationStatus::Failed);
    }
    jobs.finish(job.id, VerificationStatus::Successful, None)?;
    tx.commit()?;
    Ok(VerificationStatus::Successful)
}

fn with_db<T>(db: &Mutex<Database>, f: impl FnOnce(&Connection) -> ExplorerResult<T>) -> ExplorerResult<T> {
    let db = db
        .lock()
        .map_err(|_| ExplorerError::Internal("verifier database lock poisoned".to_string()))?;
    f(&db.conn)
}

/// Client side of the verifier: submissions and status lookups.
#[derive(Clone)]
pub struct VerificationHandle {
    db: Arc<Mutex<Database>>,
    jobs: mpsc::UnboundedSender<u64>,
}

impl VerificationHandle {
    pub async fn submit(&self, request: VerificationRequest) -> ExplorerResult<u64> {
        let db = self.db.clone();
        let id = tokio::task::spawn_blocking(move || with_db(&db, |conn| enqueue(conn, &request)))
            .await??;
        info!("Verification request {} queued", id);
        if self.jobs.send(id).is_err() {
            warn!("Verifier stopped, request {} stays queued until restart", id);
        }
        Ok(id)
    }

    pub async fn status(&self, id: u64) -> ExplorerResult<Option<VerificationStatusInfo>> {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || {
            with_db(&db, |conn| VerificationRepository::new(conn).get_status(id))
        })
        .await?
    }
}

async fn process<C: Compiler>(db: Arc<Mutex<Database>>, compiler: Arc<C>, id: u64) -> ExplorerResult<()> {
    let claim_db = db.clone();
    let job = tokio::task::spawn_blocking(move || {
        with_db(&claim_db, |conn| VerificationRepository::new(conn).claim(id))
    })
    .await??;
    let Some(job) = job else {
        return Ok(());
    };

    let compiled = compiler.compile(&job.request).await;
    if let Err(e) = &compiled {
        warn!("Compilation for request {} failed: {}", id, e);
    }

    let status = tokio::task::spawn_blocking(move || {
        with_db(&db, |conn| match complete(conn, &job, compiled) {
            Ok(status) => Ok(status),
            Err(e) => {
                error!("Recording the result of request {} failed: {}", job.id, e);
                VerificationRepository::new(conn).finish(
                    job.id,
                    VerificationStatus::Failed,
                    Some(&e.to_string()),
                )?;
                Ok(VerificationStatus::Failed)
            }
        })
    })
    .await??;
    info!("Verification request {} finished: {}", id, status.as_str());
    Ok(())
}

/// Starts the verifier with `workers` concurrent compilations. Jobs left
/// pending by a previous run are queued again first.
pub fn spawn_verifier<C: Compiler + 'static>(
    db: Database,
    compiler: C,
    workers: usize,
) -> ExplorerResult<(VerificationHandle, JoinHandle<()>)> {
    let pending = VerificationRepository::new(&db.conn).requeue_pending()?;
    if !pending.is_empty() {
        info!("Resuming {} pending verification requests", pending.len());
    }

    let db = Arc::new(Mutex::new(db));
    let compiler = Arc::new(compiler);
    let (jobs, mut rx) = mpsc::unbounded_channel();
    for id in pending {
        let _ = jobs.send(id);
    }

    let worker_db = db.clone();
    let dispatcher = tokio::spawn(async move {
        let semaphore = Arc::new(Semaphore::new(workers.max(1)));
        while let Some(id) = rx.recv().await {
            let Ok(permit) = semaphore.clone().acquire_owned().await else {
                break;
            };
            let db = worker_db.clone();
            let compiler = compiler.clone();
            tokio::spawn(async move {
                if let Err(e) = process(db, compiler, id).await {
                    error!("Verification request {} could not be processed: {}", id, e);
                }
                drop(permit);
            });
        }
    });

    Ok((VerificationHandle { db, jobs }, dispatcher))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::models::ContractRecord;
    use crate::testing::{seed_block, test_db, verification_request};
    use alloy_primitives::{Address, B256, Bytes};
    use async_trait::async_trait;
    use std::time::Duration;

    const CODE: [u8; 4] = [0x60, 0x80, 0x60, 0x40];

    struct FixedCompiler(Result<Bytes, String>);

    #[async_trait]
    impl Compiler for FixedCompiler {
        async fn compile(
            &self,
            _request: &VerificationRequest,
        ) -> Result<CompilationArtifacts, CompilationError> {
            match &self.0 {
                Ok(bytecode) => Ok(CompilationArtifacts {
                    bytecode: bytecode.clone(),
                    abi: json!([]),
                }),
                Err(message) => Err(CompilationError::Failed(message.clone())),
            }
        }
    }

    fn deploy(conn: &Connection, address: Address, constructor_args: &[u8]) {
        ContractRepository::new(conn)
            .insert(&ContractRecord {
                address,
                creator_address: Address::repeat_byte(0xa1),
                creator_tx_hash: B256::repeat_byte(0x01),
                created_in_block_number: 1,
                bytecode: [&CODE[..], constructor_args].concat().into(),
                total_transactions: 0,
                verification_info: None,
            })
            .unwrap();
    }

    async fn wait_for(handle: &VerificationHandle, id: u64) -> VerificationStatusInfo {
        for _ in 0..200 {
            let info = handle.status(id).await.unwrap().unwrap();
            if info.status.is_terminal() {
                return info;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("request {id} never finished");
    }

    #[test]
    fn submissions_are_validated() {
        let db = test_db();
        let address = Address::repeat_byte(0xc0);
        let request = verification_request(address);
        assert!(matches!(
            enqueue(&db.conn, &request),
            Err(ExplorerError::InvalidRequest(_))
        ));

        deploy(&db.conn, address, &[]);
        let first = enqueue(&db.conn, &request).unwrap();
        assert!(matches!(
            enqueue(&db.conn, &request),
            Err(ExplorerError::InvalidRequest(_))
        ));

        let job = VerificationRepository::new(&db.conn).claim(first).unwrap().unwrap();
        let status = complete(&db.conn, &job, Err(CompilationError::Failed("boom".into()))).unwrap();
        assert_eq!(status, VerificationStatus::Failed);
        let second = enqueue(&db.conn, &request).unwrap();
        assert!(second > first);
    }

    #[test]
    fn constructor_arguments_are_part_of_the_match() {
        let db = test_db();
        let address = Address::repeat_byte(0xc0);
        deploy(&db.conn, address, &[0, 0, 0, 7]);

        let mut request = verification_request(address);
        let id = enqueue(&db.conn, &request).unwrap();
        let job = VerificationRepository::new(&db.conn).claim(id).unwrap().unwrap();
        let artifacts = CompilationArtifacts {
            bytecode: Bytes::from(CODE.to_vec()),
            abi: json!([]),
        };
        assert_eq!(
            complete(&db.conn, &job, Ok(artifacts.clone())).unwrap(),
            VerificationStatus::Failed
        );
        let unverified = ContractRepository::new(&db.conn).get(&address).unwrap().unwrap();
        assert!(unverified.verification_info.is_none());
        let failed = VerificationRepository::new(&db.conn).get_status(id).unwrap().unwrap();
        assert_eq!(failed.status, VerificationStatus::Failed);

        request.constructor_arguments = Bytes::from(vec![0, 0, 0, 7]);
        let id = enqueue(&db.conn, &request).unwrap();
        let job = VerificationRepository::new(&db.conn).claim(id).unwrap().unwrap();
        assert_eq!(
            complete(&db.conn, &job, Ok(artifacts)).unwrap(),
            VerificationStatus::Successful
        );
        let info = ContractRepository::new(&db.conn)
            .get(&address)
            .unwrap()
            .unwrap()
            .verification_info
            .unwrap();
        assert_eq!(info["request"]["contractName"], request.contract_name);
        assert!(info["verifiedAt"].is_string());
    }

    #[tokio::test]
    async fn workers_run_submitted_jobs() {
        let db = test_db();
        let verified = Address::repeat_byte(0xc0);
        let mismatched = Address::repeat_byte(0xc1);
        deploy(&db.conn, verified, &[]);
        deploy(&db.conn, mismatched, &[0xff]);

        let compiler = FixedCompiler(Ok(Bytes::from(CODE.to_vec())));
        let (handle, _dispatcher) = spawn_verifier(db, compiler, 2).unwrap();

        let ok = handle.submit(verification_request(verified)).await.unwrap();
        let bad = handle.submit(verification_request(mismatched)).await.unwrap();

        assert_eq!(wait_for(&handle, ok).await.status, VerificationStatus::Successful);
        let failed = wait_for(&handle, bad).await;
        assert_eq!(failed.status, VerificationStatus::Failed);
        assert!(failed.error.is_some());
        assert!(handle.status(bad + 100).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn pending_jobs_resume_on_start() {
        let db = test_db();
        let address = Address::repeat_byte(0xc0);
        deploy(&db.conn, address, &[]);
        let id = enqueue(&db.conn, &verification_request(address)).unwrap();
        VerificationRepository::new(&db.conn).claim(id).unwrap();

        let compiler = FixedCompiler(Err("solc exploded".to_string()));
        let (handle, _dispatcher) = spawn_verifier(db, compiler, 1).unwrap();
        let info = wait_for(&handle, id).await;
        assert_eq!(info.status, VerificationStatus::Failed);
        assert!(info.error.unwrap().contains("solc exploded"));
    }

    #[test]
    fn submission_waits_for_a_concurrent_block_commit() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("explorer.db").to_string_lossy().to_string();
        let tracker = Database::new(&path).unwrap();
        let verifier = Database::new(&path).unwrap();
        let address = Address::repeat_byte(0xc0);
        deploy(&tracker.conn, address, &[]);

        let block = write_transaction(&tracker.conn).unwrap();
        seed_block(&block, 0, 0);
        let submission = std::thread::spawn(move || {
            let id = enqueue(&verifier.conn, &verification_request(address));
            (verifier, id)
        });
        std::thread::sleep(Duration::from_millis(100));
        block.commit().unwrap();

        let (verifier, id) = submission.join().unwrap();
        let id = id.unwrap();
        let info = VerificationRepository::new(&verifier.conn)
            .get_status(id)
            .unwrap()
            .unwrap();
        assert_eq!(info.status, VerificationStatus::Queued);
    }

    #[tokio::test]
    async fn jobs_fail_when_the_outcome_cannot_be_recorded() {
        let db = test_db();
        let address = Address::repeat_byte(0xc0);
        deploy(&db.conn, address, &[]);
        let id = enqueue(&db.conn, &verification_request(address)).unwrap();
        db.conn.execute("DELETE FROM contracts", []).unwrap();

        let db = Arc::new(Mutex::new(db));
        let compiler = Arc::new(FixedCompiler(Ok(Bytes::from(CODE.to_vec()))));
        process(db.clone(), compiler, id).await.unwrap();

        let db = db.lock().unwrap();
        let info = VerificationRepository::new(&db.conn)
            .get_status(id)
            .unwrap()
            .unwrap();
        assert_eq!(info.status, VerificationStatus::Failed);
        assert!(info.error.unwrap().contains("disappeared"));
    }
}
