mod dynamo;
mod memory;

pub use dynamo::DynamoLedger;
pub use memory::InMemoryLedger;

use crate::model::{AttendanceRecord, EmployeeProfile};
use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("ledger store unavailable: {0}")]
    Unavailable(String),
    /// The store refused the request itself (missing table, bad schema)
    #[error("ledger request rejected: {0}")]
    Rejected(String),
    #[error("invalid ledger item: {0}")]
    InvalidItem(String),
}

impl LedgerError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, LedgerError::Unavailable(_))
    }
}

/// Result of a conditional ledger write.
#[derive(Debug, Clone, PartialEq)]
pub enum Recorded {
    Inserted,
    /// A record with the same dedup key was already stored.
    Existing(AttendanceRecord),
}

/// Durable attendance ledger and employee profile table.
///
/// `record_if_absent` is the only cross-invocation synchronization point:
/// of two concurrent writes with the same dedup key exactly one observes
/// [`Recorded::Inserted`].
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Inserts `record` unless a record with the same dedup key exists, in
    /// which case the stored one is returned untouched.
    async fn record_if_absent(&self, record: &AttendanceRecord) -> Result<Recorded, LedgerError>;

    async fn find_record(&self, dedup_key: &str) -> Result<Option<AttendanceRecord>, LedgerError>;

    /// Unconditional put keyed by identity id. Re-registration overwrites.
    async fn put_profile(&self, profile: &EmployeeProfile) -> Result<(), LedgerError>;

    /// All records of `identity_id` whose UTC day is `day` (`YYYY-MM-DD`).
    async fn records_for_day(
        &self,
        identity_id: &str,
        day: &str,
    ) -> Result<Vec<AttendanceRecord>, LedgerError>;
}
