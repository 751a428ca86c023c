use super::columns::{hex_column, parse_column, parse_json_column, time_column};
use crate::error::ExplorerResult;
use crate::verification::types::{
    VerificationJob, VerificationRequest, VerificationStatus, VerificationStatusInfo,
};
use alloy_primitives::Address;
use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, params};

pub struct VerificationRepository<'a> {
    conn: &'a Connection,
}

impl<'a> VerificationRepository<'a> {
    const INSERT_REQUEST: &'static str = "INSERT INTO verification_requests (
            contract_address, request, status, created_at
        ) VALUES (?1, ?2, 'queued', ?3)";

    const HAS_ACTIVE: &'static str = "SELECT EXISTS(
            SELECT 1 FROM verification_requests
            WHERE contract_address = ?1 AND status IN ('queued', 'in_progress')
        )";

    const SELECT_STATUS: &'static str =
        "SELECT status, error FROM verification_requests WHERE id = ?1";

    const CLAIM: &'static str = "UPDATE verification_requests SET status = 'in_progress'
        WHERE id = ?1 AND status = 'queued'";

    const SELECT_REQUEST: &'static str = "SELECT request FROM verification_requests WHERE id = ?1";

    const REQUEUE_IN_PROGRESS: &'static str =
        "UPDATE verification_requests SET status = 'queued' WHERE status = 'in_progress'";

    const SELECT_QUEUED_IDS: &'static str =
        "SELECT id FROM verification_requests WHERE status = 'queued' ORDER BY id";

    const FINISH: &'static str = "UPDATE verification_requests
        SET status = ?1, error = ?2, processed_at = ?3
        WHERE id = ?4";

    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    pub fn insert(&self, request: &VerificationRequest) -> ExplorerResult<u64> {
        self.conn.execute(
            Self::INSERT_REQUEST,
            params![
                hex_column(&request.contract_address),
                serde_json::to_string(request)?,
                time_column(&Utc::now()),
            ],
        )?;
        Ok(self.conn.last_insert_rowid() as u64)
    }

    pub fn has_active(&self, address: &Address) -> ExplorerResult<bool> {
        Ok(self
            .conn
            .query_row(Self::HAS_ACTIVE, params![hex_column(address)], |row| {
                row.get(0)
            })?)
    }

    pub fn get_status(&self, id: u64) -> ExplorerResult<Option<VerificationStatusInfo>> {
        let status = self
            .conn
            .query_row(Self::SELECT_STATUS, params![id], |row| {
                Ok(VerificationStatusInfo::new(
                    parse_column::<VerificationStatus>(row, 0)?,
                    row.get(1)?,
                ))
            })
            .optional()?;
        Ok(status)
    }

    /// Moves a queued job to `in_progress`. Returns None if another worker
    /// already took it or it does not exist.
    pub fn claim(&self, id: u64) -> ExplorerResult<Option<VerificationJob>> {
        if self.conn.execute(Self::CLAIM, params![id])? == 0 {
            return Ok(None);
        }
        let request = self
            .conn
            .query_row(Self::SELECT_REQUEST, params![id], |row| {
                parse_json_column::<VerificationRequest>(row, 0)
            })?;
        Ok(Some(VerificationJob { id, request }))
    }

    /// Puts jobs interrupted by a restart back in the queue and returns every
    /// queued id in submission order.
    pub fn requeue_pending(&self) -> ExplorerResult<Vec<u64>> {
        self.conn.execute(Self::REQUEUE_IN_PROGRESS, [])?;
        let mut stmt = self.conn.prepare(Self::SELECT_QUEUED_IDS)?;
        let ids = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ids)
    }

    pub fn finish(
        &self,
        id: u64,
        status: VerificationStatus,
        error: Option<&str>,
    ) -> ExplorerResult<()> {
        self.conn.execute(
            Self::FINISH,
            params![status.as_str(), error, time_column(&Utc::now()), id],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{test_db, verification_request};

    #[test]
    fn jobs_are_claimed_once_and_recovered_after_restart() {
        let db = test_db();
        let jobs = VerificationRepository::new(&db.conn);
        let address = Address::repeat_byte(0xc0);

        let first = jobs.insert(&verification_request(address)).unwrap();
        let second = jobs.insert(&verification_request(Address::repeat_byte(0xc1))).unwrap();
        assert!(second > first);
        assert!(jobs.has_active(&address).unwrap());

        let job = jobs.claim(first).unwrap().unwrap();
        assert_eq!(job.request.contract_address, address);
        assert!(jobs.claim(first).unwrap().is_none());
        assert_eq!(
            jobs.get_status(first).unwrap().unwrap().status,
            VerificationStatus::Queued
        );

        assert_eq!(jobs.requeue_pending().unwrap(), vec![first, second]);

        jobs.finish(first, VerificationStatus::Failed, Some("mismatch"))
            .unwrap();
        let status = jobs.get_status(first).unwrap().unwrap();
        assert_eq!(status.status, VerificationStatus::Failed);
        assert_eq!(status.error.as_deref(), Some("mismatch"));
        assert!(!jobs.has_active(&address).unwrap());
        assert!(jobs.get_status(999).unwrap().is_none());
    }
}
