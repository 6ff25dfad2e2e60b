//! Random identifiers and opaque tokens.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};

/// Random bytes behind a resource id.
pub const RESOURCE_ID_BYTES: usize = 8;

/// Random bytes behind a resource access token.
pub const ACCESS_TOKEN_BYTES: usize = 16;

/// Random bytes behind a redemption key.
pub const REDEMPTION_KEY_BYTES: usize = 16;

/// Generate a resource id: lowercase hex of 8 random bytes.
pub fn generate_resource_id() -> String {
    hex::encode(rand::random::<[u8; RESOURCE_ID_BYTES]>())
}

/// Generate an internal access token (URL-safe base64, no padding).
pub fn generate_access_token() -> String {
    URL_SAFE_NO_PAD.encode(rand::random::<[u8; ACCESS_TOKEN_BYTES]>())
}

/// Generate a raw redemption key with a human-readable prefix.
pub fn generate_redemption_key(prefix: &str) -> String {
    format!(
        "{}{}",
        prefix,
        URL_SAFE_NO_PAD.encode(rand::random::<[u8; REDEMPTION_KEY_BYTES]>())
    )
}
