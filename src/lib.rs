//! # Scriptgate
//!
//! **Keyed, time-boxed delivery of stored scripts.**
//!
//! Scriptgate stores an uploaded payload and releases it only through a
//! multi-step protocol: a monetized unlock link, a redemption key, and a
//! short-lived HMAC-signed delivery ticket that is honored only for the
//! sanctioned client runtime.
//!
//! ## Protocol
//!
//! - **Register** - `POST /api/upload` stores the payload and returns a loader
//!   URL plus the unlock link
//! - **Unlock** - the gateway redirects to `/key/{id}?token=...`; one key per
//!   client address per window
//! - **Redeem** - `POST /api/verify-key` (or `GET /verify/{id}?key=`) turns a
//!   key into a signed `/raw` URL
//! - **Deliver** - `GET /raw/{id}?token&ts&sig` releases the payload while the
//!   ticket is fresh (10 s by default)
//!
//! ## Quickstart
//!
//! ```no_run
//! use scriptgate::store::memory::MemoryStore;
//! use scriptgate::{AccessGate, GateConfig, TicketParams};
//! use std::sync::Arc;
//!
//! fn main() -> Result<(), scriptgate::GateError> {
//!     let config = GateConfig::new(
//!         b"a-secret-of-at-least-16-bytes".to_vec(),
//!         "https://scripts.example.net",
//!     );
//!     let store = Arc::new(MemoryStore::new());
//!     let gate = AccessGate::new(config, store.clone(), store)?;
//!
//!     let registration = gate.register(b"print(1)".to_vec())?;
//!     let id = &registration.resource_id;
//!
//!     let key = gate.issue_key(id, "203.0.113.9", None)?;
//!     let ticket = gate.verify_key(id, &key)?;
//!     let payload = gate.deliver(id, &TicketParams::from(&ticket), Some("Roblox/WinInet"))?;
//!     assert_eq!(payload, b"print(1)");
//!     Ok(())
//! }
//! ```
//!
//! ## Threat Model
//!
//! Scriptgate protects against:
//! - **Forged tickets** - signatures are HMAC-SHA256 under a server secret
//! - **Replayed URLs** - tickets expire after the TTL window
//! - **Key enumeration** - every verification failure looks the same
//! - **Key database leaks** - only SHA-256 hashes of keys are stored
//!
//! Client classification trusts the declared `User-Agent`. It stops casual
//! scraping tools, not a determined attacker who spoofs the header.
//!
//! ## Configuration
//!
//! - `SCRIPTGATE_SECRET_KEY` - HMAC secret, required, at least 16 bytes
//! - `SCRIPTGATE_PUBLIC_BASE_URL` - absolute base for rendered URLs
//! - `SCRIPTGATE_REDEMPTION_POLICY` - `reusable` (default) or `single-use`
//! - `SCRIPTGATE_LINK_API_KEY` - monetization gateway credential, required
//!   unless the gateway is disabled with `--no-gateway`
//!
//! Every setting is also a flag; see [`config::Settings`] and [`GateConfig`].

#![warn(missing_docs)]

// Core modules
pub mod clock;
pub mod config;
pub mod errors;

// Crypto layer
pub mod crypto;

// Protocol layer
pub mod protocol;

// Storage layer
pub mod store;

// Redemption keys
pub mod redeem;

// Client layer
pub mod client;

// Policy layer
pub mod policy;

// Orchestrator (main public API)
pub mod gate;

// HTTP surface
pub mod http;

// Re-exports for public API
pub use clock::{Clock, SystemClock};
pub use config::{GateConfig, GatewayConfig, RedemptionPolicy};
pub use errors::{GateError, Rejection};
pub use gate::AccessGate;
pub use protocol::models::{DeliveryTicket, Registration, TicketParams};

#[cfg(any(test, feature = "test-seams"))]
pub use clock::MockClock;
