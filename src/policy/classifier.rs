//! Client-class filtering by declared identity.
//!
//! **This is a best-effort filter, not an access-control guarantee.** The
//! declared identity (the `User-Agent` header) is supplied by the client and
//! trivially spoofed. Classification only raises the cost of casually
//! replaying a delivery ticket from outside the sanctioned runtime; the
//! ticket signature and access token are what actually authorize delivery.
//!
//! # Deny-list changelog
//!
//! - v1: generic CLI clients, scripting-language HTTP libraries and API
//!   tooling.
//!
//! Bump [`DENY_LIST_VERSION`] with every change to [`DEFAULT_DENY_LIST`].

/// Version of [`DEFAULT_DENY_LIST`].
pub const DENY_LIST_VERSION: u32 = 1;

/// Canonical identity prefix of the sanctioned runtime (lower-case).
pub const SANCTIONED_PREFIX: &str = "roblox";

/// Substrings (lower-case) that mark non-sanctioned tooling.
pub const DEFAULT_DENY_LIST: &[&str] = &[
    // command-line clients
    "curl",
    "wget",
    "httpie",
    // scripting-language HTTP libraries
    "python",
    "requests",
    "httpx",
    "aiohttp",
    "urllib",
    "node-fetch",
    "axios",
    "okhttp",
    "go-http-client",
    "libwww-perl",
    // API tooling
    "postman",
    "insomnia",
];

/// Outcome of classifying a declared client identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientClass {
    /// Plausibly the sanctioned runtime.
    Sanctioned,
    /// Missing identity, wrong prefix, or deny-listed tooling.
    Rejected,
}

/// Pure classifier over declared client identities.
#[derive(Debug, Clone)]
pub struct ClientClassifier {
    prefix: String,
    deny_list: Vec<String>,
}

impl Default for ClientClassifier {
    fn default() -> Self {
        Self::new(SANCTIONED_PREFIX, DEFAULT_DENY_LIST)
    }
}

impl ClientClassifier {
    /// Create a classifier. Prefix and deny-list entries are lower-cased.
    pub fn new(prefix: &str, deny_list: &[&str]) -> Self {
        Self {
            prefix: prefix.to_lowercase(),
            deny_list: deny_list.iter().map(|d| d.to_lowercase()).collect(),
        }
    }

    /// Classify a declared identity. Total: every input gets an answer.
    pub fn classify(&self, declared: Option<&str>) -> ClientClass {
        let Some(declared) = declared else {
            return ClientClass::Rejected;
        };
        let declared = declared.to_lowercase();

        if !declared.starts_with(&self.prefix) {
            return ClientClass::Rejected;
        }
        if self.deny_list.iter().any(|d| declared.contains(d.as_str())) {
            return ClientClass::Rejected;
        }
        ClientClass::Sanctioned
    }

    /// Shorthand for `classify(..) == Sanctioned`.
    pub fn is_sanctioned(&self, declared: Option<&str>) -> bool {
        self.classify(declared) == ClientClass::Sanctioned
    }
}
