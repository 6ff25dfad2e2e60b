//! Redemption key manager.
//!
//! Raw keys exist only in the return value of [`RedemptionKeyManager::issue`].
//! The store sees SHA-256 hashes, so a read-only leak of the store cannot be
//! turned into working keys.

use crate::clock::Clock;
use crate::config::RedemptionPolicy;
use crate::crypto::digest::hash_redemption_key;
use crate::crypto::token::generate_redemption_key;
use crate::store::KeyRecordStore;
use crate::GateError;
use std::sync::Arc;

/// Issues and verifies opaque redemption keys for resources.
pub struct RedemptionKeyManager {
    store: Arc<dyn KeyRecordStore>,
    clock: Arc<dyn Clock>,
    prefix: String,
    policy: RedemptionPolicy,
}

impl RedemptionKeyManager {
    /// Create a manager over a key record store.
    pub fn new(
        store: Arc<dyn KeyRecordStore>,
        clock: Arc<dyn Clock>,
        prefix: impl Into<String>,
        policy: RedemptionPolicy,
    ) -> Self {
        Self {
            store,
            clock,
            prefix: prefix.into(),
            policy,
        }
    }

    /// Issue a new key for `resource_id`.
    ///
    /// Earlier keys for the same resource stay valid. The returned raw key is
    /// never stored or logged.
    pub fn issue(&self, resource_id: &str) -> Result<String, GateError> {
        let raw_key = generate_redemption_key(&self.prefix);
        let key_hash = hash_redemption_key(&raw_key);
        self.store
            .append_hash(resource_id, &key_hash, self.clock.now_utc())?;
        Ok(raw_key)
    }

    /// Check a presented key against the resource's issued keys.
    ///
    /// Under [`RedemptionPolicy::SingleUse`] a successful check also spends the
    /// key; only one of several concurrent checks of the same key succeeds.
    pub fn verify(&self, resource_id: &str, raw_key: &str) -> Result<bool, GateError> {
        if raw_key.is_empty() {
            return Ok(false);
        }
        let key_hash = hash_redemption_key(raw_key);

        match self.policy {
            RedemptionPolicy::Reusable => Ok(self
                .store
                .get_record(resource_id)?
                .is_some_and(|record| record.contains(&key_hash))),
            RedemptionPolicy::SingleUse => {
                self.store
                    .remove_hash(resource_id, &key_hash, self.clock.now_utc())
            }
        }
    }
}
