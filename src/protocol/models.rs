//! Protocol data model and wire bodies.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// A stored payload plus its identifier and internal access token.
///
/// `id`, `access_token` and `payload` never change after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    /// Opaque resource identifier.
    pub id: String,

    /// Payload bytes, delivered verbatim.
    #[serde(with = "payload_b64")]
    pub payload: Vec<u8>,

    /// Internal token embedded in delivery tickets.
    pub access_token: String,

    /// Monetization link captured at upload, if the gateway produced one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unlock_url: Option<String>,

    /// When the resource was registered.
    pub created_at: DateTime<Utc>,
}

/// Hashes of every redemption key issued for one resource.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedemptionKeyRecord {
    /// Resource the keys unlock.
    pub resource_id: String,

    /// SHA-256 hex of each issued raw key.
    pub key_hashes: BTreeSet<String>,

    /// Last time a hash was added or removed.
    pub updated_at: DateTime<Utc>,
}

impl RedemptionKeyRecord {
    /// Create an empty record.
    pub fn new(resource_id: &str, now: DateTime<Utc>) -> Self {
        Self {
            resource_id: resource_id.to_string(),
            key_hashes: BTreeSet::new(),
            updated_at: now,
        }
    }

    /// Whether `key_hash` was issued for this resource.
    pub fn contains(&self, key_hash: &str) -> bool {
        self.key_hashes.contains(key_hash)
    }
}

/// A signed, short-lived authorization for one payload fetch.
///
/// Never persisted. It travels as the `token`, `ts` and `sig` query
/// parameters of `/raw/{resource_id}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryTicket {
    /// Resource the ticket is for.
    pub resource_id: String,
    /// The resource's internal access token.
    pub access_token: String,
    /// Unix seconds at minting.
    pub timestamp: i64,
    /// Hex HMAC over `(resource_id, timestamp)`.
    pub signature: String,
}

impl DeliveryTicket {
    /// Render the absolute delivery URL under `base_url`.
    pub fn to_url(&self, base_url: &str) -> String {
        format!(
            "{}/raw/{}?token={}&ts={}&sig={}",
            base_url, self.resource_id, self.access_token, self.timestamp, self.signature
        )
    }
}

/// Ticket parameters as received on `/raw/{resource_id}`.
///
/// All fields are optional so a missing parameter becomes a 403 rather than
/// an extractor error.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TicketParams {
    /// Access token.
    pub token: Option<String>,
    /// Timestamp, Unix seconds.
    pub ts: Option<String>,
    /// Signature.
    pub sig: Option<String>,
}

impl From<&DeliveryTicket> for TicketParams {
    fn from(ticket: &DeliveryTicket) -> Self {
        Self {
            token: Some(ticket.access_token.clone()),
            ts: Some(ticket.timestamp.to_string()),
            sig: Some(ticket.signature.clone()),
        }
    }
}

/// Result of registering a payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    /// New resource id.
    pub resource_id: String,
    /// Loader snippet URL.
    pub loader_url: String,
    /// Monetization link, when the gateway produced one.
    pub unlock_url: Option<String>,
}

/// `POST /api/upload` request body.
#[derive(Debug, Clone, Deserialize)]
pub struct UploadRequest {
    /// Script text to protect.
    #[serde(default)]
    pub script: Option<String>,
}

/// `POST /api/upload` response body.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    /// Always `true`; failures use an error status instead.
    pub success: bool,
    /// New resource id.
    pub resource_id: String,
    /// Loader snippet URL.
    pub loader: String,
    /// Monetization link.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unlock_url: Option<String>,
}

impl From<Registration> for UploadResponse {
    fn from(registration: Registration) -> Self {
        Self {
            success: true,
            resource_id: registration.resource_id,
            loader: registration.loader_url,
            unlock_url: registration.unlock_url,
        }
    }
}

/// `POST /api/verify-key` request body.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyKeyRequest {
    /// Resource the key should unlock.
    #[serde(default)]
    pub resource_id: String,
    /// Raw redemption key.
    #[serde(default)]
    pub key: String,
}

/// `POST /api/verify-key` response body.
///
/// Every failure serializes to exactly `{"success":false}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifyKeyResponse {
    /// Whether the key was accepted.
    pub success: bool,
    /// Freshly signed delivery URL on success.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl VerifyKeyResponse {
    /// The single failure shape.
    pub fn failure() -> Self {
        Self {
            success: false,
            url: None,
        }
    }

    /// Success carrying the signed URL.
    pub fn success(url: String) -> Self {
        Self {
            success: true,
            url: Some(url),
        }
    }
}

/// Payload bytes are stored as standard base64 in JSON documents.
mod payload_b64 {
    use base64::{engine::general_purpose::STANDARD, Engine};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded).map_err(serde::de::Error::custom)
    }
}
