//! Ticket freshness enforcement (replay window).

use crate::errors::Rejection;
use crate::GateError;

/// TTL of a delivery ticket in the reference deployment.
pub const DEFAULT_TICKET_TTL_SECONDS: u64 = 10;

/// Parse a ticket timestamp.
///
/// Only plain ASCII decimal digits are accepted: no sign, no whitespace, no
/// fractional part.
pub fn parse_ticket_timestamp(ts: &str) -> Result<i64, GateError> {
    if ts.is_empty() || ts.len() > 18 || !ts.bytes().all(|b| b.is_ascii_digit()) {
        return Err(GateError::Forbidden(Rejection::MalformedTimestamp));
    }
    ts.parse::<i64>()
        .map_err(|_| GateError::Forbidden(Rejection::MalformedTimestamp))
}

/// Whether `|now - timestamp| <= ttl_seconds`.
pub fn within_ttl(timestamp: i64, now: i64, ttl_seconds: u64) -> bool {
    now.abs_diff(timestamp) <= ttl_seconds
}

/// Check that a ticket timestamp is inside the TTL window.
///
/// # Errors
/// * `Forbidden(Expired)` - Timestamp is older or newer than the window allows
pub fn check_ticket_freshness(timestamp: i64, now: i64, ttl_seconds: u64) -> Result<(), GateError> {
    if within_ttl(timestamp, now, ttl_seconds) {
        Ok(())
    } else {
        Err(GateError::Forbidden(Rejection::Expired))
    }
}
