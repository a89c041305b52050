//! Call log collaborator: append-only audit trail of call attempts

use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;

use crate::error::{Result, SignalingError};
use crate::types::{CallRecord, CallRecordId, CallStatus, UserId};

/// Persists call records. Records are never deleted.
#[async_trait]
pub trait CallLog: Send + Sync {
    /// Append a record and return its id
    async fn log_call(
        &self,
        caller_id: &UserId,
        callee_id: &UserId,
        room_name: &str,
        status: CallStatus,
    ) -> Result<CallRecordId>;

    /// Update status. When `ended_at` is given the duration is recomputed
    /// from the record's start time.
    async fn update_call_status(
        &self,
        id: CallRecordId,
        status: CallStatus,
        ended_at: Option<DateTime<Utc>>,
    ) -> Result<()>;

    async fn get_call(&self, id: CallRecordId) -> Result<Option<CallRecord>>;
}

/// Whole seconds between start and end, never negative
pub fn duration_seconds(started_at: DateTime<Utc>, ended_at: DateTime<Utc>) -> i64 {
    (ended_at - started_at).num_seconds().max(0)
}

/// Call log held in memory
pub struct InMemoryCallLog {
    records: DashMap<CallRecordId, CallRecord>,
    next_id: AtomicI64,
}

impl InMemoryCallLog {
    pub fn new() -> Self {
        Self {
            records: DashMap::new(),
            next_id: AtomicI64::new(1),
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// All records, oldest first
    pub fn records(&self) -> Vec<CallRecord> {
        let mut records: Vec<CallRecord> = self.records.iter().map(|r| r.value().clone()).collect();
        records.sort_by_key(|r| r.id);
        records
    }
}

impl Default for InMemoryCallLog {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CallLog for InMemoryCallLog {
    async fn log_call(
        &self,
        caller_id: &UserId,
        callee_id: &UserId,
        room_name: &str,
        status: CallStatus,
    ) -> Result<CallRecordId> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.records.insert(
            id,
            CallRecord {
                id,
                caller_id: caller_id.clone(),
                callee_id: callee_id.clone(),
                room_name: room_name.to_string(),
                status,
                started_at: Utc::now(),
                ended_at: None,
                duration_seconds: None,
            },
        );
        Ok(id)
    }

    async fn update_call_status(
        &self,
        id: CallRecordId,
        status: CallStatus,
        ended_at: Option<DateTime<Utc>>,
    ) -> Result<()> {
        let mut record = self
            .records
            .get_mut(&id)
            .ok_or_else(|| SignalingError::call_log(format!("No call record {}", id)))?;

        record.status = status;
        if let Some(ended_at) = ended_at {
            record.duration_seconds = Some(duration_seconds(record.started_at, ended_at));
            record.ended_at = Some(ended_at);
        }
        Ok(())
    }

    async fn get_call(&self, id: CallRecordId) -> Result<Option<CallRecord>> {
        Ok(self.records.get(&id).map(|r| r.value().clone()))
    }
}
