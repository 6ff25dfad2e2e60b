//! Access gate - the delivery orchestrator.
//!
//! The `AccessGate` sequences the protocol for one resource:
//! 1. `register` - store the payload, obtain an unlock link
//! 2. `issue_key` - unlock callback: throttle, completion check, new key
//! 3. `verify_key` - exchange a key for a signed delivery ticket
//! 4. `deliver` - validate the ticket and client, release the payload
//!
//! Every operation is stateless apart from the stores and the throttle, so
//! one gate serves any number of concurrent requests.

use crate::client::MonetizationGateway;
use crate::clock::{Clock, SystemClock};
use crate::config::GateConfig;
use crate::crypto::signing::TicketSigner;
use crate::crypto::token::{generate_access_token, generate_resource_id};
use crate::errors::Rejection;
use crate::policy::classifier::ClientClassifier;
use crate::policy::throttle::{UnlockThrottle, WindowedThrottle};
use crate::protocol::models::{DeliveryTicket, Registration, Resource, TicketParams};
use crate::protocol::snippet;
use crate::redeem::RedemptionKeyManager;
use crate::store::{KeyRecordStore, ResourceStore};
use crate::GateError;
use std::sync::Arc;
use subtle::ConstantTimeEq;

/// Main orchestrator for gated delivery.
///
/// Create one instance per process and share it (it is `Send + Sync`).
pub struct AccessGate {
    config: GateConfig,
    clock: Arc<dyn Clock>,
    signer: TicketSigner,
    resources: Arc<dyn ResourceStore>,
    key_records: Arc<dyn KeyRecordStore>,
    keys: RedemptionKeyManager,
    classifier: ClientClassifier,
    throttle: Arc<dyn UnlockThrottle>,
    gateway: Option<Arc<dyn MonetizationGateway>>,
}

impl AccessGate {
    /// Create a gate with the system clock, the default classifier, an
    /// in-memory throttle sized from `config`, and no monetization gateway.
    ///
    /// # Errors
    /// Returns `ConfigError` if the configuration does not validate.
    pub fn new(
        config: GateConfig,
        resources: Arc<dyn ResourceStore>,
        key_records: Arc<dyn KeyRecordStore>,
    ) -> Result<Self, GateError> {
        config.validate()?;

        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let signer = TicketSigner::new(config.secret_key.clone(), config.ticket_ttl);
        let throttle = Arc::new(WindowedThrottle::new(
            config.unlock_limit,
            config.unlock_window,
        ));
        let keys = Self::key_manager(&config, &key_records, &clock);

        Ok(Self {
            config,
            clock,
            signer,
            resources,
            key_records,
            keys,
            classifier: ClientClassifier::default(),
            throttle,
            gateway: None,
        })
    }

    fn key_manager(
        config: &GateConfig,
        key_records: &Arc<dyn KeyRecordStore>,
        clock: &Arc<dyn Clock>,
    ) -> RedemptionKeyManager {
        RedemptionKeyManager::new(
            key_records.clone(),
            clock.clone(),
            config.key_prefix.clone(),
            config.redemption_policy,
        )
    }

    /// Replace the clock.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.keys = Self::key_manager(&self.config, &self.key_records, &clock);
        self.clock = clock;
        self
    }

    /// Attach a monetization gateway.
    pub fn with_gateway(mut self, gateway: Arc<dyn MonetizationGateway>) -> Self {
        self.gateway = Some(gateway);
        self
    }

    /// Replace the client classifier.
    pub fn with_classifier(mut self, classifier: ClientClassifier) -> Self {
        self.classifier = classifier;
        self
    }

    /// Replace the unlock throttle.
    pub fn with_throttle(mut self, throttle: Arc<dyn UnlockThrottle>) -> Self {
        self.throttle = throttle;
        self
    }

    /// Get the current configuration.
    pub fn config(&self) -> &GateConfig {
        &self.config
    }

    /// Register a payload and obtain its unlock references.
    ///
    /// When the gateway fails, the registration still succeeds without an
    /// unlock URL unless `require_unlock_link` is set.
    ///
    /// # Errors
    /// - `InvalidPayload` - Empty or larger than `max_payload_bytes`
    /// - `UpstreamUnavailable` - Gateway failed and a link is required
    pub fn register(&self, payload: Vec<u8>) -> Result<Registration, GateError> {
        if payload.is_empty() {
            return Err(GateError::InvalidPayload("payload is empty".to_string()));
        }
        if payload.len() > self.config.max_payload_bytes {
            return Err(GateError::InvalidPayload(format!(
                "payload is {} bytes, limit is {}",
                payload.len(),
                self.config.max_payload_bytes
            )));
        }

        let resource_id = generate_resource_id();
        let unlock_url = self.create_unlock_link(&resource_id)?;

        let resource = Resource {
            id: resource_id.clone(),
            payload,
            access_token: generate_access_token(),
            unlock_url: unlock_url.clone(),
            created_at: self.clock.now_utc(),
        };
        self.resources.put(&resource)?;

        tracing::info!(
            resource_id = %resource_id,
            bytes = resource.payload.len(),
            unlock_link = unlock_url.is_some(),
            "registered resource"
        );

        Ok(Registration {
            loader_url: format!("{}/loader/{}", self.config.public_base_url, resource_id),
            resource_id,
            unlock_url,
        })
    }

    fn create_unlock_link(&self, resource_id: &str) -> Result<Option<String>, GateError> {
        let Some(gateway) = &self.gateway else {
            if self.config.require_unlock_link {
                return Err(GateError::UpstreamUnavailable(
                    "no monetization gateway configured".to_string(),
                ));
            }
            return Ok(None);
        };

        match gateway.create_unlock_link(resource_id) {
            Ok(url) => Ok(Some(url)),
            Err(e) if self.config.require_unlock_link => {
                Err(GateError::UpstreamUnavailable(e.to_string()))
            }
            Err(e) => {
                tracing::warn!(
                    resource_id = %resource_id,
                    error = %e,
                    "unlock link unavailable, registering without one"
                );
                Ok(None)
            }
        }
    }

    /// Issue a redemption key on the unlock callback.
    ///
    /// Order: throttle, resource existence, gateway completion (when a
    /// gateway is attached), issuance.
    ///
    /// # Errors
    /// - `RateLimited` - Client address exhausted its window
    /// - `NotFound` - Unknown resource
    /// - `Forbidden` - Missing or rejected completion token
    /// - `UpstreamUnavailable` - Gateway could not be asked
    pub fn issue_key(
        &self,
        resource_id: &str,
        client_addr: &str,
        completion_token: Option<&str>,
    ) -> Result<String, GateError> {
        self.throttle.check(client_addr, self.clock.now_unix())?;
        self.require_resource(resource_id)?;

        if let Some(gateway) = &self.gateway {
            let token = completion_token
                .filter(|t| !t.is_empty())
                .ok_or_else(|| self.reject(resource_id, Rejection::MissingCompletion))?;
            if !gateway.validate_completion(token, client_addr)? {
                return Err(self.reject(resource_id, Rejection::CompletionRejected));
            }
        }

        let key = self.keys.issue(resource_id)?;
        tracing::info!(resource_id = %resource_id, "issued redemption key");
        Ok(key)
    }

    /// Exchange a redemption key for a freshly signed delivery ticket.
    ///
    /// Unknown resource, unknown key and wrong key all produce the same
    /// `Forbidden(UnknownKey)`, so resource ids cannot be enumerated.
    pub fn verify_key(&self, resource_id: &str, raw_key: &str) -> Result<DeliveryTicket, GateError> {
        // Both lookups always run.
        let resource = self.resources.get(resource_id)?;
        let key_ok = self.keys.verify(resource_id, raw_key)?;

        match resource {
            Some(resource) if key_ok => Ok(self.signer.sign_ticket(
                &resource.id,
                &resource.access_token,
                self.clock.now_unix(),
            )),
            _ => Err(self.reject(resource_id, Rejection::UnknownKey)),
        }
    }

    /// Mint a delivery ticket for an existing resource.
    ///
    /// # Errors
    /// - `NotFound` - Unknown resource
    pub fn mint_ticket(&self, resource_id: &str) -> Result<DeliveryTicket, GateError> {
        let resource = self.require_resource(resource_id)?;
        Ok(self.signer.sign_ticket(
            &resource.id,
            &resource.access_token,
            self.clock.now_unix(),
        ))
    }

    /// Absolute delivery URL for a ticket.
    pub fn ticket_url(&self, ticket: &DeliveryTicket) -> String {
        ticket.to_url(&self.config.public_base_url)
    }

    /// Validate a delivery request and release the payload.
    ///
    /// Checks run in order, stopping at the first failure: resource
    /// existence, access token, signature and TTL, client classification.
    ///
    /// # Errors
    /// - `NotFound` - Unknown resource
    /// - `Forbidden` - Any ticket or client check failed
    pub fn deliver(
        &self,
        resource_id: &str,
        params: &TicketParams,
        declared_client: Option<&str>,
    ) -> Result<Vec<u8>, GateError> {
        let resource = self.require_resource(resource_id)?;

        let token = params.token.as_deref().unwrap_or_default();
        let token_ok: bool = token
            .as_bytes()
            .ct_eq(resource.access_token.as_bytes())
            .into();
        if !token_ok {
            return Err(self.reject(resource_id, Rejection::TokenMismatch));
        }

        let Some(ts) = params.ts.as_deref() else {
            return Err(self.reject(resource_id, Rejection::MalformedTimestamp));
        };
        let sig = params.sig.as_deref().unwrap_or_default();
        if let Err(e) = self
            .signer
            .check(resource_id, ts, sig, self.clock.now_unix())
        {
            let reason = e.rejection().unwrap_or(Rejection::BadSignature);
            return Err(self.reject(resource_id, reason));
        }

        if !self.classifier.is_sanctioned(declared_client) {
            return Err(self.reject(resource_id, Rejection::ClientRejected));
        }

        tracing::debug!(resource_id = %resource_id, "delivered payload");
        Ok(resource.payload)
    }

    /// Render the loader snippet for a resource.
    ///
    /// # Errors
    /// - `NotFound` - Unknown resource
    pub fn loader(&self, resource_id: &str) -> Result<String, GateError> {
        let resource = self.require_resource(resource_id)?;
        Ok(snippet::loader(
            &resource.id,
            &self.config.public_base_url,
            resource.unlock_url.as_deref(),
        ))
    }

    fn require_resource(&self, resource_id: &str) -> Result<Resource, GateError> {
        self.resources.get(resource_id)?.ok_or(GateError::NotFound)
    }

    fn reject(&self, resource_id: &str, reason: Rejection) -> GateError {
        tracing::debug!(resource_id = %resource_id, reason = %reason, "request rejected");
        GateError::Forbidden(reason)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::MockClock;
    use crate::config::RedemptionPolicy;
    use crate::store::memory::MemoryStore;
    use std::sync::atomic::{AtomicBool, Ordering};

    const SANCTIONED: Option<&str> = Some("Roblox/WinInet");

    struct StubGateway {
        link_fails: bool,
        accept_completion: AtomicBool,
    }

    impl StubGateway {
        fn new(link_fails: bool) -> Self {
            Self {
                link_fails,
                accept_completion: AtomicBool::new(true),
            }
        }
    }

    impl MonetizationGateway for StubGateway {
        fn create_unlock_link(&self, resource_id: &str) -> Result<String, GateError> {
            if self.link_fails {
                Err(GateError::UpstreamUnavailable("down".to_string()))
            } else {
                Ok(format!("https://unlock.test/{}", resource_id))
            }
        }

        fn validate_completion(&self, token: &str, _client_addr: &str) -> Result<bool, GateError> {
            Ok(token == "done" && self.accept_completion.load(Ordering::SeqCst))
        }
    }

    fn test_config() -> GateConfig {
        GateConfig::new(b"unit-test-secret-0123456789".to_vec(), "https://gate.test")
    }

    fn gate_with(config: GateConfig) -> (AccessGate, Arc<MockClock>) {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(MockClock::from_rfc3339("2025-01-15T12:00:00Z"));
        let gate = AccessGate::new(config, store.clone(), store)
            .unwrap()
            .with_clock(clock.clone());
        (gate, clock)
    }

    fn gate() -> (AccessGate, Arc<MockClock>) {
        gate_with(test_config())
    }

    #[test]
    fn test_gate_rejects_invalid_config() {
        let store = Arc::new(MemoryStore::new());
        let config = GateConfig::new(b"short".to_vec(), "https://gate.test");
        let result = AccessGate::new(config, store.clone(), store);
        assert!(matches!(result, Err(GateError::ConfigError(_))));
    }

    #[test]
    fn test_register_returns_loader_url() {
        let (gate, _) = gate();
        let registration = gate.register(b"print(1)".to_vec()).unwrap();
        assert_eq!(
            registration.loader_url,
            format!("https://gate.test/loader/{}", registration.resource_id)
        );
        assert!(registration.unlock_url.is_none());
    }

    #[test]
    fn test_register_rejects_empty_and_oversized() {
        let mut config = test_config();
        config.max_payload_bytes = 4;
        let (gate, _) = gate_with(config);

        assert!(matches!(
            gate.register(Vec::new()),
            Err(GateError::InvalidPayload(_))
        ));
        assert!(matches!(
            gate.register(b"12345".to_vec()),
            Err(GateError::InvalidPayload(_))
        ));
        assert!(gate.register(b"1234".to_vec()).is_ok());
    }

    #[test]
    fn test_register_with_gateway_link() {
        let (gate, _) = gate();
        let gate = gate.with_gateway(Arc::new(StubGateway::new(false)));
        let registration = gate.register(b"print(1)".to_vec()).unwrap();
        assert_eq!(
            registration.unlock_url,
            Some(format!("https://unlock.test/{}", registration.resource_id))
        );
    }

    #[test]
    fn test_register_degrades_when_gateway_fails() {
        let (gate, _) = gate();
        let gate = gate.with_gateway(Arc::new(StubGateway::new(true)));
        let registration = gate.register(b"print(1)".to_vec()).unwrap();
        assert!(registration.unlock_url.is_none());
    }

    #[test]
    fn test_register_surfaces_gateway_failure_when_required() {
        let mut config = test_config();
        config.require_unlock_link = true;
        let (gate, _) = gate_with(config);
        assert!(matches!(
            gate.register(b"print(1)".to_vec()),
            Err(GateError::UpstreamUnavailable(_))
        ));

        let gate = gate.with_gateway(Arc::new(StubGateway::new(true)));
        assert!(matches!(
            gate.register(b"print(1)".to_vec()),
            Err(GateError::UpstreamUnavailable(_))
        ));
    }

    #[test]
    fn test_full_protocol() {
        let (gate, _) = gate();
        let id = gate.register(b"print(1)".to_vec()).unwrap().resource_id;

        let key = gate.issue_key(&id, "10.0.0.1", None).unwrap();
        let ticket = gate.verify_key(&id, &key).unwrap();
        assert_eq!(ticket.resource_id, id);

        let payload = gate
            .deliver(&id, &TicketParams::from(&ticket), SANCTIONED)
            .unwrap();
        assert_eq!(payload, b"print(1)");
    }

    #[test]
    fn test_issue_key_unknown_resource() {
        let (gate, _) = gate();
        assert!(matches!(
            gate.issue_key("ghost", "10.0.0.1", None),
            Err(GateError::NotFound)
        ));
    }

    #[test]
    fn test_issue_key_rate_limited_per_client() {
        let (gate, clock) = gate();
        let id = gate.register(b"print(1)".to_vec()).unwrap().resource_id;

        gate.issue_key(&id, "10.0.0.1", None).unwrap();
        assert!(matches!(
            gate.issue_key(&id, "10.0.0.1", None),
            Err(GateError::RateLimited { .. })
        ));
        assert!(gate.issue_key(&id, "10.0.0.2", None).is_ok());

        clock.advance(chrono::Duration::seconds(60));
        assert!(gate.issue_key(&id, "10.0.0.1", None).is_ok());
    }

    #[test]
    fn test_issue_key_requires_completion_with_gateway() {
        let (gate, _) = gate();
        let stub = Arc::new(StubGateway::new(false));
        let gate = gate.with_gateway(stub.clone());
        let id = gate.register(b"print(1)".to_vec()).unwrap().resource_id;

        let missing = gate.issue_key(&id, "10.0.0.1", None).unwrap_err();
        assert_eq!(missing.rejection(), Some(Rejection::MissingCompletion));

        let wrong = gate.issue_key(&id, "10.0.0.2", Some("nope")).unwrap_err();
        assert_eq!(wrong.rejection(), Some(Rejection::CompletionRejected));

        assert!(gate.issue_key(&id, "10.0.0.3", Some("done")).is_ok());

        stub.accept_completion.store(false, Ordering::SeqCst);
        let refused = gate.issue_key(&id, "10.0.0.4", Some("done")).unwrap_err();
        assert_eq!(refused.rejection(), Some(Rejection::CompletionRejected));
    }

    #[test]
    fn test_verify_key_failures_are_uniform() {
        let (gate, _) = gate();
        let id = gate.register(b"print(1)".to_vec()).unwrap().resource_id;
        gate.issue_key(&id, "10.0.0.1", None).unwrap();

        let unknown_resource = gate.verify_key("ghost", "GATE-x").unwrap_err();
        let wrong_key = gate.verify_key(&id, "GATE-x").unwrap_err();

        assert_eq!(unknown_resource.rejection(), Some(Rejection::UnknownKey));
        assert_eq!(wrong_key.rejection(), Some(Rejection::UnknownKey));
        assert_eq!(unknown_resource.to_string(), wrong_key.to_string());
    }

    #[test]
    fn test_key_from_other_resource_rejected() {
        let (gate, _) = gate();
        let a = gate.register(b"a".to_vec()).unwrap().resource_id;
        let b = gate.register(b"b".to_vec()).unwrap().resource_id;
        let key_a = gate.issue_key(&a, "10.0.0.1", None).unwrap();

        assert!(gate.verify_key(&b, &key_a).is_err());
    }

    #[test]
    fn test_single_use_policy_spends_key() {
        let mut config = test_config();
        config.redemption_policy = RedemptionPolicy::SingleUse;
        let (gate, _) = gate_with(config);
        let id = gate.register(b"print(1)".to_vec()).unwrap().resource_id;
        let key = gate.issue_key(&id, "10.0.0.1", None).unwrap();

        assert!(gate.verify_key(&id, &key).is_ok());
        assert!(gate.verify_key(&id, &key).is_err());
    }

    #[test]
    fn test_mint_ticket_unknown_resource() {
        let (gate, _) = gate();
        assert!(matches!(gate.mint_ticket("ghost"), Err(GateError::NotFound)));
    }

    #[test]
    fn test_ticket_url_contains_parameters() {
        let (gate, clock) = gate();
        let id = gate.register(b"print(1)".to_vec()).unwrap().resource_id;
        let ticket = gate.mint_ticket(&id).unwrap();
        let url = gate.ticket_url(&ticket);

        assert!(url.starts_with(&format!("https://gate.test/raw/{}?token=", id)));
        assert!(url.contains(&format!("&ts={}&sig=", clock.now_unix())));
    }

    #[test]
    fn test_deliver_unknown_resource() {
        let (gate, _) = gate();
        assert!(matches!(
            gate.deliver("ghost", &TicketParams::default(), SANCTIONED),
            Err(GateError::NotFound)
        ));
    }

    #[test]
    fn test_deliver_checks_each_ticket_field() {
        let (gate, _) = gate();
        let id = gate.register(b"print(1)".to_vec()).unwrap().resource_id;
        let ticket = gate.mint_ticket(&id).unwrap();
        let good = TicketParams::from(&ticket);

        let mut wrong_token = good.clone();
        wrong_token.token = Some("forged".to_string());
        let err = gate.deliver(&id, &wrong_token, SANCTIONED).unwrap_err();
        assert_eq!(err.rejection(), Some(Rejection::TokenMismatch));

        let mut missing_ts = good.clone();
        missing_ts.ts = None;
        let err = gate.deliver(&id, &missing_ts, SANCTIONED).unwrap_err();
        assert_eq!(err.rejection(), Some(Rejection::MalformedTimestamp));

        let mut bad_sig = good.clone();
        bad_sig.sig = Some("00".repeat(32));
        let err = gate.deliver(&id, &bad_sig, SANCTIONED).unwrap_err();
        assert_eq!(err.rejection(), Some(Rejection::BadSignature));

        let err = gate.deliver(&id, &good, Some("curl/8.0")).unwrap_err();
        assert_eq!(err.rejection(), Some(Rejection::ClientRejected));

        let err = gate.deliver(&id, &good, None).unwrap_err();
        assert_eq!(err.rejection(), Some(Rejection::ClientRejected));

        assert!(gate.deliver(&id, &good, SANCTIONED).is_ok());
    }

    #[test]
    fn test_deliver_expires_after_ttl() {
        let (gate, clock) = gate();
        let id = gate.register(b"print(1)".to_vec()).unwrap().resource_id;
        let params = TicketParams::from(&gate.mint_ticket(&id).unwrap());

        clock.advance(chrono::Duration::seconds(10));
        assert!(gate.deliver(&id, &params, SANCTIONED).is_ok());

        clock.advance(chrono::Duration::seconds(1));
        let err = gate.deliver(&id, &params, SANCTIONED).unwrap_err();
        assert_eq!(err.rejection(), Some(Rejection::Expired));
    }

    #[test]
    fn test_ticket_for_one_resource_fails_on_another() {
        let (gate, _) = gate();
        let a = gate.register(b"a".to_vec()).unwrap().resource_id;
        let b = gate.register(b"b".to_vec()).unwrap().resource_id;
        let params = TicketParams::from(&gate.mint_ticket(&a).unwrap());

        assert!(gate.deliver(&b, &params, SANCTIONED).is_err());
    }

    #[test]
    fn test_loader_renders_unlock_link() {
        let (gate, _) = gate();
        let gate = gate.with_gateway(Arc::new(StubGateway::new(false)));
        let id = gate.register(b"print(1)".to_vec()).unwrap().resource_id;

        let lua = gate.loader(&id).unwrap();
        assert!(lua.contains(&format!("https://unlock.test/{}", id)));
        assert!(lua.contains(&format!("https://gate.test/verify/{}?key=", id)));
        assert!(matches!(gate.loader("ghost"), Err(GateError::NotFound)));
    }
}
