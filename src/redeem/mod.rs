//! Redemption keys: issuance and verification.

pub mod keys;

pub use keys::RedemptionKeyManager;
