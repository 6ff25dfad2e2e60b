//! Scriptgate configuration.
//!
//! Everything the gate needs is passed in through [`GateConfig`] at startup.
//! Nothing is read from module-level state afterwards.
//!
//! [`Settings`] is the process-level layer: every flag can also come from a
//! `SCRIPTGATE_*` environment variable. It produces the [`GateConfig`] and
//! [`GatewayConfig`] and fails fast when a required secret is absent.

use crate::crypto::freshness::DEFAULT_TICKET_TTL_SECONDS;
use crate::GateError;
use clap::Parser;
use std::fmt;
use std::time::Duration;

/// Environment variable holding the HMAC ticket secret.
pub const ENV_SECRET_KEY: &str = "SCRIPTGATE_SECRET_KEY";
/// Environment variable holding the public base URL.
pub const ENV_PUBLIC_BASE_URL: &str = "SCRIPTGATE_PUBLIC_BASE_URL";
/// Environment variable selecting the redemption policy (`reusable` / `single-use`).
pub const ENV_REDEMPTION_POLICY: &str = "SCRIPTGATE_REDEMPTION_POLICY";
/// Environment variable overriding the ticket TTL in seconds.
pub const ENV_TICKET_TTL_SECS: &str = "SCRIPTGATE_TICKET_TTL_SECS";
/// Environment variable holding the link gateway API key.
pub const ENV_LINK_API_KEY: &str = "SCRIPTGATE_LINK_API_KEY";
/// Environment variable overriding the link-creation endpoint.
pub const ENV_LINK_CREATE_URL: &str = "SCRIPTGATE_LINK_CREATE_URL";
/// Environment variable overriding the completion-token validation endpoint.
pub const ENV_LINK_VALIDATE_URL: &str = "SCRIPTGATE_LINK_VALIDATE_URL";
/// Environment variable disabling the link gateway.
pub const ENV_NO_GATEWAY: &str = "SCRIPTGATE_NO_GATEWAY";
/// Environment variable holding the listen port.
pub const ENV_PORT: &str = "SCRIPTGATE_PORT";
/// Environment variable holding the bind address.
pub const ENV_BIND_ADDRESS: &str = "SCRIPTGATE_BIND_ADDRESS";
/// Environment variable holding the store directory.
pub const ENV_DATA_DIR: &str = "SCRIPTGATE_DATA_DIR";
/// Environment variable selecting the in-memory store.
pub const ENV_IN_MEMORY: &str = "SCRIPTGATE_IN_MEMORY";
/// Environment variable enabling `X-Forwarded-For` trust.
pub const ENV_TRUST_FORWARDED_FOR: &str = "SCRIPTGATE_TRUST_FORWARDED_FOR";
/// Environment variable making the unlock link mandatory.
pub const ENV_REQUIRE_UNLOCK_LINK: &str = "SCRIPTGATE_REQUIRE_UNLOCK_LINK";
/// Environment variable enabling JSON logs.
pub const ENV_JSON_LOGS: &str = "SCRIPTGATE_JSON_LOGS";

/// Default link-creation endpoint (work.ink).
pub const DEFAULT_LINK_CREATE_URL: &str = "https://dashboard.work.ink/_api/v1/link";
/// Default completion-token validation endpoint; `{}` is replaced by the token.
pub const DEFAULT_LINK_VALIDATE_URL: &str = "https://work.ink/_api/v2/token/isValid/{}";
/// Timeout for link gateway requests.
pub const DEFAULT_GATEWAY_TIMEOUT: Duration = Duration::from_secs(10);

/// Minimum accepted secret length in bytes.
pub const MIN_SECRET_LEN: usize = 16;

/// What happens to a redemption key once it has been verified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RedemptionPolicy {
    /// Keys stay valid after use and coexist with later issuances.
    #[default]
    Reusable,
    /// A successful verification spends the key.
    SingleUse,
}

impl std::str::FromStr for RedemptionPolicy {
    type Err = GateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "reusable" => Ok(RedemptionPolicy::Reusable),
            "single-use" | "single_use" | "singleuse" => Ok(RedemptionPolicy::SingleUse),
            other => Err(GateError::ConfigError(format!(
                "unknown redemption policy: {}",
                other
            ))),
        }
    }
}

/// Configuration for the access gate.
#[derive(Clone)]
pub struct GateConfig {
    /// HMAC secret for delivery tickets.
    /// SECURITY: never logged; `Debug` prints it redacted.
    pub secret_key: Vec<u8>,

    /// How far a ticket timestamp may drift from now, in either direction.
    pub ticket_ttl: Duration,

    /// Absolute base URL used when rendering loader, signed and raw URLs
    /// (e.g., "https://scripts.example.net"). No trailing slash.
    pub public_base_url: String,

    /// Human-readable prefix prepended to every issued redemption key.
    pub key_prefix: String,

    /// Whether verified keys remain valid.
    pub redemption_policy: RedemptionPolicy,

    /// Length of one unlock throttle window.
    pub unlock_window: Duration,

    /// Key issuances allowed per client address per window.
    pub unlock_limit: u32,

    /// Fail uploads when the monetization gateway cannot produce a link.
    pub require_unlock_link: bool,

    /// Largest accepted payload.
    pub max_payload_bytes: usize,

    /// Take the client address from `X-Forwarded-For` (only behind a trusted proxy).
    pub trust_forwarded_for: bool,
}

impl GateConfig {
    /// Create a configuration with reference-deployment defaults.
    pub fn new(secret_key: impl Into<Vec<u8>>, public_base_url: impl Into<String>) -> Self {
        Self {
            secret_key: secret_key.into(),
            ticket_ttl: Duration::from_secs(DEFAULT_TICKET_TTL_SECONDS),
            public_base_url: public_base_url.into().trim_end_matches('/').to_string(),
            key_prefix: "GATE-".to_string(),
            redemption_policy: RedemptionPolicy::Reusable,
            unlock_window: Duration::from_secs(60),
            unlock_limit: 1,
            require_unlock_link: false,
            max_payload_bytes: 1024 * 1024,
            trust_forwarded_for: false,
        }
    }

    /// Validate configuration for obvious errors.
    pub fn validate(&self) -> Result<(), GateError> {
        if self.secret_key.len() < MIN_SECRET_LEN {
            return Err(GateError::ConfigError(format!(
                "secret_key must be at least {} bytes, got {}",
                MIN_SECRET_LEN,
                self.secret_key.len()
            )));
        }
        if self.ticket_ttl.is_zero() {
            return Err(GateError::ConfigError(
                "ticket_ttl cannot be zero".to_string(),
            ));
        }
        if !(self.public_base_url.starts_with("http://")
            || self.public_base_url.starts_with("https://"))
        {
            return Err(GateError::ConfigError(format!(
                "public_base_url must be an http(s) URL, got {}",
                self.public_base_url
            )));
        }
        if self.unlock_limit == 0 || self.unlock_window.is_zero() {
            return Err(GateError::ConfigError(
                "unlock throttle needs a non-zero limit and window".to_string(),
            ));
        }
        if self.max_payload_bytes == 0 {
            return Err(GateError::ConfigError(
                "max_payload_bytes cannot be zero".to_string(),
            ));
        }
        Ok(())
    }
}

impl fmt::Debug for GateConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GateConfig")
            .field("secret_key", &"<redacted>")
            .field("ticket_ttl", &self.ticket_ttl)
            .field("public_base_url", &self.public_base_url)
            .field("key_prefix", &self.key_prefix)
            .field("redemption_policy", &self.redemption_policy)
            .field("unlock_window", &self.unlock_window)
            .field("unlock_limit", &self.unlock_limit)
            .field("require_unlock_link", &self.require_unlock_link)
            .field("max_payload_bytes", &self.max_payload_bytes)
            .field("trust_forwarded_for", &self.trust_forwarded_for)
            .finish()
    }
}

/// Credentials and endpoints for the link gateway client.
#[derive(Clone)]
pub struct GatewayConfig {
    /// API key sent with link-creation requests.
    pub api_key: String,

    /// Link-creation endpoint.
    pub create_url: String,

    /// Completion-token validation endpoint; `{}` is replaced by the token.
    pub validate_url: String,

    /// Request timeout.
    pub timeout: Duration,
}

impl fmt::Debug for GatewayConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GatewayConfig")
            .field("api_key", &"<redacted>")
            .field("create_url", &self.create_url)
            .field("validate_url", &self.validate_url)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Server settings from flags and `SCRIPTGATE_*` environment variables.
#[derive(Parser, Clone)]
#[command(name = "scriptgate", version, about = "Keyed, time-boxed script delivery server")]
pub struct Settings {
    /// Port to listen on
    #[arg(long, env = ENV_PORT, default_value = "8080")]
    pub port: u16,

    /// Bind address
    #[arg(long, env = ENV_BIND_ADDRESS, default_value = "0.0.0.0")]
    pub bind_address: String,

    /// Directory for resources and key records (default: platform data dir)
    #[arg(long, env = ENV_DATA_DIR)]
    pub data_dir: Option<String>,

    /// Keep everything in memory; lost on restart
    #[arg(long, env = ENV_IN_MEMORY)]
    pub in_memory: bool,

    /// Enable structured JSON logging
    #[arg(long, env = ENV_JSON_LOGS)]
    pub json_logs: bool,

    /// HMAC secret for delivery tickets (at least 16 bytes)
    #[arg(long, env = ENV_SECRET_KEY, hide_env_values = true)]
    pub secret_key: Option<String>,

    /// Absolute base URL for rendered loader, signed and raw URLs
    #[arg(long, env = ENV_PUBLIC_BASE_URL, default_value = "http://127.0.0.1:8080")]
    pub public_base_url: String,

    /// Redemption policy: `reusable` or `single-use`
    #[arg(long, env = ENV_REDEMPTION_POLICY, default_value = "reusable")]
    pub redemption_policy: RedemptionPolicy,

    /// Delivery ticket TTL in seconds
    #[arg(long, env = ENV_TICKET_TTL_SECS, default_value_t = DEFAULT_TICKET_TTL_SECONDS)]
    pub ticket_ttl_secs: u64,

    /// Take client addresses from X-Forwarded-For (behind a trusted proxy only)
    #[arg(long, env = ENV_TRUST_FORWARDED_FOR)]
    pub trust_forwarded_for: bool,

    /// Refuse uploads when no unlock link can be created
    #[arg(long, env = ENV_REQUIRE_UNLOCK_LINK)]
    pub require_unlock_link: bool,

    /// Link gateway API key
    #[arg(long, env = ENV_LINK_API_KEY, hide_env_values = true)]
    pub link_api_key: Option<String>,

    /// Link-creation endpoint
    #[arg(long, env = ENV_LINK_CREATE_URL, default_value = DEFAULT_LINK_CREATE_URL)]
    pub link_create_url: String,

    /// Completion-token validation endpoint (`{}` is replaced by the token)
    #[arg(long, env = ENV_LINK_VALIDATE_URL, default_value = DEFAULT_LINK_VALIDATE_URL)]
    pub link_validate_url: String,

    /// Run without a link gateway; keys are issued without completion checks
    #[arg(long, env = ENV_NO_GATEWAY)]
    pub no_gateway: bool,
}

impl Settings {
    /// Build and validate the gate configuration.
    ///
    /// # Errors
    /// - `ConfigError` - Secret missing, or any field fails [`GateConfig::validate`]
    pub fn gate_config(&self) -> Result<GateConfig, GateError> {
        let secret = self
            .secret_key
            .as_deref()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| GateError::ConfigError(format!("{} must be set", ENV_SECRET_KEY)))?;

        let mut config = GateConfig::new(secret.as_bytes().to_vec(), self.public_base_url.as_str());
        config.redemption_policy = self.redemption_policy;
        config.ticket_ttl = Duration::from_secs(self.ticket_ttl_secs);
        config.trust_forwarded_for = self.trust_forwarded_for;
        config.require_unlock_link = self.require_unlock_link;

        config.validate()?;
        Ok(config)
    }

    /// Build the link gateway configuration.
    ///
    /// Returns `Ok(None)` only when the gateway is explicitly disabled.
    ///
    /// # Errors
    /// - `ConfigError` - API key missing without `--no-gateway`, or the
    ///   gateway is disabled while unlock links are required
    pub fn gateway_config(&self) -> Result<Option<GatewayConfig>, GateError> {
        if self.no_gateway {
            if self.require_unlock_link {
                return Err(GateError::ConfigError(
                    "--require-unlock-link cannot be combined with --no-gateway".to_string(),
                ));
            }
            return Ok(None);
        }

        let api_key = self
            .link_api_key
            .as_deref()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| {
                GateError::ConfigError(format!(
                    "{} must be set (or pass --no-gateway)",
                    ENV_LINK_API_KEY
                ))
            })?;
        if !self.link_validate_url.contains("{}") {
            return Err(GateError::ConfigError(
                "link validate URL must contain a {} token placeholder".to_string(),
            ));
        }

        Ok(Some(GatewayConfig {
            api_key: api_key.to_string(),
            create_url: self.link_create_url.clone(),
            validate_url: self.link_validate_url.clone(),
            timeout: DEFAULT_GATEWAY_TIMEOUT,
        }))
    }
}

impl fmt::Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settings")
            .field("port", &self.port)
            .field("bind_address", &self.bind_address)
            .field("data_dir", &self.data_dir)
            .field("in_memory", &self.in_memory)
            .field("secret_key", &self.secret_key.as_ref().map(|_| "<redacted>"))
            .field("public_base_url", &self.public_base_url)
            .field("redemption_policy", &self.redemption_policy)
            .field("ticket_ttl_secs", &self.ticket_ttl_secs)
            .field("link_api_key", &self.link_api_key.as_ref().map(|_| "<redacted>"))
            .field("no_gateway", &self.no_gateway)
            .finish()
    }
}
