//! Monetization gateway seam.

pub mod http;

use crate::GateError;

/// External service that puts a human-completed task in front of key issuance.
pub trait MonetizationGateway: Send + Sync {
    /// Create an externally hosted unlock URL for a resource.
    ///
    /// Once a human completes it, the gateway redirects to
    /// `/key/{resource_id}?token=<completion token>`.
    fn create_unlock_link(&self, resource_id: &str) -> Result<String, GateError>;

    /// Whether `completion_token` proves the task was completed from
    /// `client_addr`.
    fn validate_completion(&self, completion_token: &str, client_addr: &str)
        -> Result<bool, GateError>;
}
