//! Fixed-window throttle for key issuance.
//!
//! Counts issuances per client address. A window opens on the first hit and
//! resets once it has elapsed. State lives in memory only; losing it on
//! restart just resets everyone's window.

use crate::GateError;
use dashmap::DashMap;
use std::time::Duration;

/// Entry count above which expired windows are swept on access.
const PURGE_THRESHOLD: usize = 4096;

/// Rate limiter consulted before a key is issued.
pub trait UnlockThrottle: Send + Sync {
    /// Record one attempt by `client` at `now` (Unix seconds).
    ///
    /// # Errors
    /// * `RateLimited` - The client has used up its current window
    fn check(&self, client: &str, now: i64) -> Result<(), GateError>;
}

#[derive(Debug, Clone, Copy)]
struct Window {
    started_at: i64,
    count: u32,
}

/// In-memory fixed-window counter keyed by client address.
#[derive(Debug)]
pub struct WindowedThrottle {
    windows: DashMap<String, Window>,
    window_secs: i64,
    limit: u32,
}

impl WindowedThrottle {
    /// Allow `limit` attempts per `window` per client.
    pub fn new(limit: u32, window: Duration) -> Self {
        Self {
            windows: DashMap::new(),
            window_secs: i64::try_from(window.as_secs()).unwrap_or(i64::MAX).max(1),
            limit: limit.max(1),
        }
    }

    /// Number of tracked clients.
    pub fn tracked_clients(&self) -> usize {
        self.windows.len()
    }

    /// Drop windows that have elapsed.
    pub fn purge_expired(&self, now: i64) {
        let window_secs = self.window_secs;
        self.windows
            .retain(|_, w| now.saturating_sub(w.started_at) < window_secs);
    }
}

impl UnlockThrottle for WindowedThrottle {
    fn check(&self, client: &str, now: i64) -> Result<(), GateError> {
        if self.windows.len() > PURGE_THRESHOLD {
            self.purge_expired(now);
        }

        let mut window = self.windows.entry(client.to_string()).or_insert(Window {
            started_at: now,
            count: 0,
        });

        if now.saturating_sub(window.started_at) >= self.window_secs {
            window.started_at = now;
            window.count = 0;
        }

        if window.count >= self.limit {
            let elapsed = now.saturating_sub(window.started_at);
            let retry_after_secs = (self.window_secs - elapsed).max(1) as u64;
            return Err(GateError::RateLimited { retry_after_secs });
        }

        window.count += 1;
        Ok(())
    }
}
