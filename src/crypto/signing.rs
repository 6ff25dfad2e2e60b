//! HMAC-SHA256 delivery ticket signing.
//!
//! The signed message is the resource id immediately followed by the
//! decimal Unix seconds, with no separator:
//! ```text
//! <resource id><unix seconds>
//! ```
//! Signatures are lowercase hex. Verification recomputes the expected value
//! and compares it in constant time; the TTL window is checked separately so
//! a stale ticket with a correct signature is still refused.

use crate::crypto::freshness::{parse_ticket_timestamp, within_ttl};
use crate::errors::Rejection;
use crate::protocol::models::DeliveryTicket;
use crate::GateError;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::fmt;
use std::time::Duration;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// Build the message covered by a ticket signature.
pub fn build_signing_message(resource_id: &str, timestamp: i64) -> String {
    format!("{}{}", resource_id, timestamp)
}

/// Process-wide ticket signer.
///
/// Holds the secret for the life of the process. Rotating the secret means
/// restarting; tickets minted before a rotation die within one TTL.
#[derive(Clone)]
pub struct TicketSigner {
    secret: Vec<u8>,
    ttl_seconds: u64,
}

impl TicketSigner {
    /// Create a signer with the given secret and TTL.
    pub fn new(secret: impl Into<Vec<u8>>, ttl: Duration) -> Self {
        Self {
            secret: secret.into(),
            ttl_seconds: ttl.as_secs(),
        }
    }

    /// Ticket TTL in seconds.
    pub fn ttl_seconds(&self) -> u64 {
        self.ttl_seconds
    }

    fn mac(&self) -> HmacSha256 {
        match HmacSha256::new_from_slice(&self.secret) {
            Ok(mac) => mac,
            Err(_) => unreachable!("HMAC accepts any key length"),
        }
    }

    /// Sign `(resource_id, timestamp)`.
    pub fn sign(&self, resource_id: &str, timestamp: i64) -> String {
        let mut mac = self.mac();
        mac.update(build_signing_message(resource_id, timestamp).as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    /// Mint a ticket for a resource at `now`.
    pub fn sign_ticket(&self, resource_id: &str, access_token: &str, now: i64) -> DeliveryTicket {
        DeliveryTicket {
            resource_id: resource_id.to_string(),
            access_token: access_token.to_string(),
            timestamp: now,
            signature: self.sign(resource_id, now),
        }
    }

    /// Check a presented signature and timestamp.
    ///
    /// # Returns
    /// * `Ok(())` - Signature matches and timestamp is within the TTL
    /// * `Err(Forbidden(MalformedTimestamp))` - Timestamp is not decimal digits
    /// * `Err(Forbidden(BadSignature))` - Signature mismatch (any length or format)
    /// * `Err(Forbidden(Expired))` - Timestamp outside the TTL window
    pub fn check(
        &self,
        resource_id: &str,
        timestamp: &str,
        signature: &str,
        now: i64,
    ) -> Result<(), GateError> {
        let ts = parse_ticket_timestamp(timestamp)?;

        let expected = self.sign(resource_id, ts);
        let signature_ok: bool = expected.as_bytes().ct_eq(signature.as_bytes()).into();
        let fresh = within_ttl(ts, now, self.ttl_seconds);

        if !signature_ok {
            return Err(GateError::Forbidden(Rejection::BadSignature));
        }
        if !fresh {
            return Err(GateError::Forbidden(Rejection::Expired));
        }
        Ok(())
    }

    /// Boolean form of [`TicketSigner::check`].
    pub fn verify(&self, resource_id: &str, timestamp: &str, signature: &str, now: i64) -> bool {
        self.check(resource_id, timestamp, signature, now).is_ok()
    }
}

impl fmt::Debug for TicketSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TicketSigner")
            .field("secret", &"<redacted>")
            .field("ttl_seconds", &self.ttl_seconds)
            .finish()
    }
}
