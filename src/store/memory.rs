//! In-memory store backed by `DashMap`.
//!
//! Suitable for tests and single-process deployments that accept losing
//! everything on restart.

use crate::protocol::models::{RedemptionKeyRecord, Resource};
use crate::store::{KeyRecordStore, ResourceStore};
use crate::GateError;
use chrono::{DateTime, Utc};
use dashmap::DashMap;

/// In-memory resource and key record store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    resources: DashMap<String, Resource>,
    records: DashMap<String, RedemptionKeyRecord>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored resources.
    pub fn resource_count(&self) -> usize {
        self.resources.len()
    }
}

impl ResourceStore for MemoryStore {
    fn put(&self, resource: &Resource) -> Result<(), GateError> {
        self.resources.insert(resource.id.clone(), resource.clone());
        Ok(())
    }

    fn get(&self, id: &str) -> Result<Option<Resource>, GateError> {
        Ok(self.resources.get(id).map(|r| r.value().clone()))
    }
}

impl KeyRecordStore for MemoryStore {
    fn append_hash(
        &self,
        resource_id: &str,
        key_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<(), GateError> {
        // The entry guard holds the shard lock for the whole read-modify-write.
        let mut record = self
            .records
            .entry(resource_id.to_string())
            .or_insert_with(|| RedemptionKeyRecord::new(resource_id, now));
        record.key_hashes.insert(key_hash.to_string());
        record.updated_at = now;
        Ok(())
    }

    fn get_record(&self, resource_id: &str) -> Result<Option<RedemptionKeyRecord>, GateError> {
        Ok(self.records.get(resource_id).map(|r| r.value().clone()))
    }

    fn remove_hash(
        &self,
        resource_id: &str,
        key_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, GateError> {
        let Some(mut record) = self.records.get_mut(resource_id) else {
            return Ok(false);
        };
        let removed = record.key_hashes.remove(key_hash);
        if removed {
            record.updated_at = now;
        }
        Ok(removed)
    }
}
