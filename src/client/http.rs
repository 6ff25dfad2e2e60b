//! Reqwest-based client for a link-monetization service.
//!
//! Speaks the common "create link / validate completion token" shape:
//! - `POST <create_url>` with `{title, destination, link_description}` →
//!   `{error?, response: {url}}`
//! - `GET <validate_url with token>` → `{valid, info: {byIp}}`

use crate::client::MonetizationGateway;
use crate::config::GatewayConfig;
use crate::GateError;
use reqwest::blocking::Client;
use reqwest::header::{CONTENT_TYPE, USER_AGENT};
use serde::Deserialize;

/// Placeholder the service replaces with the completion token.
pub const TOKEN_PLACEHOLDER: &str = "{TOKEN}";

#[derive(Debug, Deserialize)]
struct CreateLinkResponse {
    #[serde(default)]
    error: Option<serde_json::Value>,
    #[serde(default)]
    response: Option<CreatedLink>,
}

#[derive(Debug, Deserialize)]
struct CreatedLink {
    url: String,
}

#[derive(Debug, Deserialize)]
struct ValidateTokenResponse {
    #[serde(default)]
    valid: bool,
    #[serde(default)]
    info: Option<CompletionInfo>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CompletionInfo {
    #[serde(default)]
    by_ip: Option<String>,
}

/// Link gateway HTTP client.
pub struct LinkGatewayClient {
    client: Client,
    config: GatewayConfig,
    public_base_url: String,
    user_agent: String,
}

impl LinkGatewayClient {
    /// Create a client. `public_base_url` is where the unlock callback lives.
    pub fn new(config: GatewayConfig, public_base_url: &str) -> Result<Self, GateError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| GateError::ConfigError(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            config,
            public_base_url: public_base_url.trim_end_matches('/').to_string(),
            user_agent: build_user_agent(),
        })
    }

    /// Callback URL the service redirects to after completion.
    pub fn destination_url(&self, resource_id: &str) -> String {
        format!(
            "{}/key/{}?token={}",
            self.public_base_url, resource_id, TOKEN_PLACEHOLDER
        )
    }
}

impl MonetizationGateway for LinkGatewayClient {
    fn create_unlock_link(&self, resource_id: &str) -> Result<String, GateError> {
        let body = serde_json::json!({
            "title": format!("Script {}", resource_id),
            "destination": self.destination_url(resource_id),
            "link_description": "Protected script access",
        });

        let response = self
            .client
            .post(&self.config.create_url)
            .header(USER_AGENT, &self.user_agent)
            .header(CONTENT_TYPE, "application/json")
            .header("X-Api-Key", &self.config.api_key)
            .json(&body)
            .send()
            .map_err(|e| GateError::UpstreamUnavailable(format!("Link request failed: {}", e)))?;
        check_status(response.status().as_u16(), "Link request")?;

        let parsed: CreateLinkResponse = response
            .json()
            .map_err(|e| GateError::ProtocolError(format!("Link response parse error: {}", e)))?;

        parse_created_link(parsed)
    }

    fn validate_completion(
        &self,
        completion_token: &str,
        client_addr: &str,
    ) -> Result<bool, GateError> {
        // The token is spliced into the URL path.
        if !is_token_safe(completion_token) {
            return Ok(false);
        }
        let url = self.config.validate_url.replace("{}", completion_token);

        let response = self
            .client
            .get(&url)
            .header(USER_AGENT, &self.user_agent)
            .send()
            .map_err(|e| {
                GateError::UpstreamUnavailable(format!("Token validation failed: {}", e))
            })?;
        check_status(response.status().as_u16(), "Token validation")?;

        let parsed: ValidateTokenResponse = response.json().map_err(|e| {
            GateError::ProtocolError(format!("Token validation parse error: {}", e))
        })?;

        Ok(completion_matches(&parsed, client_addr))
    }
}

/// Non-success statuses mean the service is unavailable, whatever the body.
fn check_status(status: u16, what: &str) -> Result<(), GateError> {
    if (200..300).contains(&status) {
        Ok(())
    } else {
        Err(GateError::UpstreamUnavailable(format!(
            "{} returned HTTP {}",
            what, status
        )))
    }
}

fn parse_created_link(parsed: CreateLinkResponse) -> Result<String, GateError> {
    if let Some(error) = parsed.error.filter(|e| !e.is_null() && *e != serde_json::json!(false)) {
        return Err(GateError::UpstreamUnavailable(format!(
            "Link service error: {}",
            error
        )));
    }
    parsed
        .response
        .map(|link| link.url)
        .ok_or_else(|| GateError::ProtocolError("Link response missing url".to_string()))
}

/// A completion counts only if it is valid and was made from the same address.
fn completion_matches(parsed: &ValidateTokenResponse, client_addr: &str) -> bool {
    parsed.valid
        && parsed
            .info
            .as_ref()
            .and_then(|info| info.by_ip.as_deref())
            .is_some_and(|ip| ip == client_addr)
}

fn is_token_safe(token: &str) -> bool {
    !token.is_empty()
        && token.len() <= 256
        && token
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_' || b == b'.')
}

/// Build a User-Agent string: `scriptgate/<version>`.
pub fn build_user_agent() -> String {
    format!("scriptgate/{}", env!("CARGO_PKG_VERSION"))
}
