//! Storage seams for resources and redemption key records.
//!
//! The gate only needs a small key-value contract from storage. Two backends
//! ship: [`memory::MemoryStore`] and the JSON-document [`file::FileStore`].

use crate::protocol::models::{RedemptionKeyRecord, Resource};
use crate::GateError;
use chrono::{DateTime, Utc};

pub mod file;
pub mod memory;

/// Durable mapping from resource id to resource.
///
/// Implementations must give read-your-writes consistency for a given id.
pub trait ResourceStore: Send + Sync {
    /// Store a new resource. Ids are never reused.
    fn put(&self, resource: &Resource) -> Result<(), GateError>;

    /// Fetch a resource, or `None` if unknown.
    fn get(&self, id: &str) -> Result<Option<Resource>, GateError>;
}

/// Per-resource sets of redemption key hashes.
///
/// `append_hash` and `remove_hash` must be atomic per resource: two
/// concurrent unlocks of the same resource must both land.
pub trait KeyRecordStore: Send + Sync {
    /// Add a hash to the resource's record, creating the record if absent.
    fn append_hash(
        &self,
        resource_id: &str,
        key_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<(), GateError>;

    /// Fetch the record for a resource.
    fn get_record(&self, resource_id: &str) -> Result<Option<RedemptionKeyRecord>, GateError>;

    /// Remove a hash. Returns whether it was present.
    fn remove_hash(
        &self,
        resource_id: &str,
        key_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, GateError>;
}
