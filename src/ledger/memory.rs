use crate::ledger::{LedgerError, LedgerStore, Recorded};
use crate::model::{AttendanceRecord, EmployeeProfile};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Process-local [`LedgerStore`], used by tests and local runs.
#[derive(Debug, Default)]
pub struct InMemoryLedger {
    records: Mutex<HashMap<String, AttendanceRecord>>,
    profiles: Mutex<HashMap<String, EmployeeProfile>>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<AttendanceRecord> {
        let mut records: Vec<_> = lock(&self.records).values().cloned().collect();
        records.sort_by(|a, b| a.observed_at.cmp(&b.observed_at));
        records
    }

    pub fn record(&self, dedup_key: &str) -> Option<AttendanceRecord> {
        lock(&self.records).get(dedup_key).cloned()
    }

    pub fn profile(&self, identity_id: &str) -> Option<EmployeeProfile> {
        lock(&self.profiles).get(identity_id).cloned()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[async_trait]
impl LedgerStore for InMemoryLedger {
    async fn record_if_absent(&self, record: &AttendanceRecord) -> Result<Recorded, LedgerError> {
        let mut records = lock(&self.records);
        if let Some(existing) = records.get(&record.dedup_key) {
            return Ok(Recorded::Existing(existing.clone()));
        }

        records.insert(record.dedup_key.clone(), record.clone());
        Ok(Recorded::Inserted)
    }

    async fn find_record(&self, dedup_key: &str) -> Result<Option<AttendanceRecord>, LedgerError> {
        Ok(self.record(dedup_key))
    }

    async fn put_profile(&self, profile: &EmployeeProfile) -> Result<(), LedgerError> {
        lock(&self.profiles).insert(profile.identity_id.clone(), profile.clone());
        Ok(())
    }

    async fn records_for_day(
        &self,
        identity_id: &str,
        day: &str,
    ) -> Result<Vec<AttendanceRecord>, LedgerError> {
        Ok(self
            .records()
            .into_iter()
            .filter(|record| record.identity_id == identity_id && record.day() == day)
            .collect())
    }
}
