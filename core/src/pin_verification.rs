//! Transfer PIN credentials.
//!
//! Hashing is a versioned strategy: one current hasher plus an ordered
//! list of legacy verifiers. The stored hash's hex length identifies its
//! version, so every legacy hasher must produce a length distinct from the
//! current one. A PIN that only matches a legacy hash is accepted once and
//! the credential is rewritten with the current hasher in the same call.

use crate::{
    clock::Clock,
    config::PinConfig,
    error::{GateError, GateResult},
    event::{self, AuditEvent, AuditSink},
    store::GateStore,
};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256, Sha512};
use subtle::ConstantTimeEq;

pub const PIN_LENGTH: usize = 4;

const ACTOR: &str = "pin_service";
const PBKDF2_OUTPUT_BYTES: usize = 64;

pub trait PinHasher: Send + Sync {
    fn version(&self) -> u8;

    /// Hex-encoded hash of `pin`, salted with the user identifier.
    fn hash(&self, pin: &str, user_id: &str) -> String;

    /// Length of `hash` output in hex characters.
    fn hash_len(&self) -> usize;
}

/// PBKDF2-HMAC-SHA512, 64-byte output.
#[derive(Debug, Clone)]
pub struct Pbkdf2Sha512Hasher {
    iterations: u32,
}

impl Pbkdf2Sha512Hasher {
    pub fn new(iterations: u32) -> Self {
        Self { iterations }
    }
}

impl PinHasher for Pbkdf2Sha512Hasher {
    fn version(&self) -> u8 {
        2
    }

    fn hash(&self, pin: &str, user_id: &str) -> String {
        let salt = format!("pin:v2:{user_id}");
        let mut out = [0u8; PBKDF2_OUTPUT_BYTES];
        pbkdf2::pbkdf2_hmac::<Sha512>(pin.as_bytes(), salt.as_bytes(), self.iterations, &mut out);
        hex::encode(out)
    }

    fn hash_len(&self) -> usize {
        PBKDF2_OUTPUT_BYTES * 2
    }
}

/// Single-pass SHA-256 over pin and user id. Verify-only.
#[derive(Debug, Clone, Copy, Default)]
pub struct LegacySha256Hasher;

impl PinHasher for LegacySha256Hasher {
    fn version(&self) -> u8 {
        1
    }

    fn hash(&self, pin: &str, user_id: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(pin.as_bytes());
        hasher.update(user_id.as_bytes());
        hex::encode(hasher.finalize())
    }

    fn hash_len(&self) -> usize {
        64
    }
}

/// Result of comparing a PIN against a stored hash.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinMatch {
    Current,
    Legacy { version: u8 },
    NoMatch,
}

pub struct PinHashScheme {
    current: Box<dyn PinHasher>,
    legacy: Vec<Box<dyn PinHasher>>,
}

impl PinHashScheme {
    pub fn new(current: Box<dyn PinHasher>) -> Self {
        Self {
            current,
            legacy: Vec::new(),
        }
    }

    /// Register a verify-only hasher. Its output length must not collide
    /// with the current hasher or another legacy hasher.
    pub fn with_legacy(mut self, hasher: Box<dyn PinHasher>) -> anyhow::Result<Self> {
        let len = hasher.hash_len();
        if len == self.current.hash_len() || self.legacy.iter().any(|h| h.hash_len() == len) {
            anyhow::bail!("legacy PIN hasher v{} has an ambiguous hash length {len}", hasher.version());
        }
        self.legacy.push(hasher);
        Ok(self)
    }

    /// PBKDF2-SHA512 current, SHA-256 legacy.
    pub fn from_config(config: &PinConfig) -> Self {
        Self {
            current: Box::new(Pbkdf2Sha512Hasher::new(config.pbkdf2_iterations)),
            legacy: vec![Box::new(LegacySha256Hasher)],
        }
    }

    pub fn current(&self) -> &dyn PinHasher {
        self.current.as_ref()
    }

    /// The current hash is always computed, whatever version is stored, so
    /// response time does not reveal an un-migrated credential.
    pub fn check(&self, pin: &str, user_id: &str, stored: &str) -> PinMatch {
        let candidate = self.current.hash(pin, user_id);
        if stored.len() == self.current.hash_len() && constant_time_eq(&candidate, stored) {
            return PinMatch::Current;
        }
        if let Some(legacy) = self.legacy.iter().find(|h| h.hash_len() == stored.len()) {
            let candidate = legacy.hash(pin, user_id);
            if constant_time_eq(&candidate, stored) {
                return PinMatch::Legacy {
                    version: legacy.version(),
                };
            }
        }
        PinMatch::NoMatch
    }
}

fn constant_time_eq(a: &str, b: &str) -> bool {
    bool::from(a.as_bytes().ct_eq(b.as_bytes()))
}

/// Exactly four ASCII digits.
pub fn validate_pin(pin: &str) -> GateResult<()> {
    if pin.len() != PIN_LENGTH || !pin.bytes().all(|b| b.is_ascii_digit()) {
        return Err(GateError::validation("PIN must be exactly 4 digits"));
    }
    Ok(())
}

/// Flat shape for request handlers: `{verified, error?}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PinResponse {
    pub verified: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PinResponse {
    pub fn from_result(result: GateResult<bool>) -> Self {
        match result {
            Ok(true) => Self {
                verified: true,
                error: None,
            },
            Ok(false) => Self {
                verified: false,
                error: Some("Incorrect PIN".to_string()),
            },
            Err(e) => Self {
                verified: false,
                error: Some(e.user_message()),
            },
        }
    }
}

pub struct PinService<'a> {
    store: &'a GateStore,
    clock: &'a dyn Clock,
    audit: &'a dyn AuditSink,
    scheme: &'a PinHashScheme,
}

impl<'a> PinService<'a> {
    pub fn new(
        store: &'a GateStore,
        clock: &'a dyn Clock,
        audit: &'a dyn AuditSink,
        scheme: &'a PinHashScheme,
    ) -> Self {
        Self {
            store,
            clock,
            audit,
            scheme,
        }
    }

    pub fn set_pin(&self, customer_id: &str, pin: &str) -> GateResult<()> {
        validate_pin(pin)?;
        if customer_id.trim().is_empty() {
            return Err(GateError::validation("customer id is required"));
        }
        let hash = self.scheme.current().hash(pin, customer_id);
        let now = self.clock.now_ts();
        self.store.upsert_pin_hash(customer_id, &hash, now)?;
        event::emit(
            self.audit,
            customer_id,
            now,
            AuditEvent::PinSet {
                customer_id: customer_id.to_string(),
            },
        )?;
        log::info!("pin: credential set for customer={customer_id}");
        Ok(())
    }

    /// Ok(false) for a wrong PIN. Which stage failed is never reported.
    pub fn verify_pin(&self, customer_id: &str, pin: &str) -> GateResult<bool> {
        validate_pin(pin)?;
        let stored = self
            .store
            .get_pin_hash(customer_id)?
            .ok_or(GateError::PinNotSet)?;

        match self.scheme.check(pin, customer_id, &stored) {
            PinMatch::Current => Ok(true),
            PinMatch::NoMatch => {
                log::debug!("pin: verification failed for customer={customer_id}");
                Ok(false)
            }
            PinMatch::Legacy { version } => {
                self.upgrade(customer_id, pin, &stored, version)?;
                Ok(true)
            }
        }
    }

    fn upgrade(&self, customer_id: &str, pin: &str, stored: &str, from_version: u8) -> GateResult<()> {
        let current = self.scheme.current();
        let rehashed = current.hash(pin, customer_id);
        let now = self.clock.now_ts();
        if !self
            .store
            .replace_pin_hash_if(customer_id, stored, &rehashed, now)?
        {
            log::warn!("pin: credential for customer={customer_id} changed during upgrade, skipped");
            return Ok(());
        }
        event::emit(
            self.audit,
            ACTOR,
            now,
            AuditEvent::PinCredentialUpgraded {
                customer_id: customer_id.to_string(),
                from_version,
                to_version: current.version(),
            },
        )?;
        log::info!(
            "pin: upgraded credential for customer={customer_id} v{from_version} -> v{}",
            current.version()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };

    fn scheme() -> PinHashScheme {
        PinHashScheme::from_config(&PinConfig { pbkdf2_iterations: 10 })
    }

    #[test]
    fn hash_lengths_distinguish_versions() {
        let s = scheme();
        assert_eq!(s.current().hash("1234", "c-1").len(), 128);
        assert_eq!(LegacySha256Hasher.hash("1234", "c-1").len(), 64);
    }

    #[test]
    fn hash_is_salted_by_user() {
        let s = scheme();
        assert_ne!(s.current().hash("1234", "c-1"), s.current().hash("1234", "c-2"));
    }

    #[test]
    fn check_recognises_each_version() {
        let s = scheme();
        let strong = s.current().hash("1234", "c-1");
        let legacy = LegacySha256Hasher.hash("1234", "c-1");
        assert_eq!(s.check("1234", "c-1", &strong), PinMatch::Current);
        assert_eq!(s.check("1234", "c-1", &legacy), PinMatch::Legacy { version: 1 });
        assert_eq!(s.check("9999", "c-1", &strong), PinMatch::NoMatch);
        assert_eq!(s.check("9999", "c-1", &legacy), PinMatch::NoMatch);
        assert_eq!(s.check("1234", "c-1", "deadbeef"), PinMatch::NoMatch);
    }

    struct CountingHasher {
        inner: Pbkdf2Sha512Hasher,
        calls: Arc<AtomicUsize>,
    }

    impl PinHasher for CountingHasher {
        fn version(&self) -> u8 {
            self.inner.version()
        }

        fn hash(&self, pin: &str, user_id: &str) -> String {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.hash(pin, user_id)
        }

        fn hash_len(&self) -> usize {
            self.inner.hash_len()
        }
    }

    #[test]
    fn strong_hash_runs_for_every_stored_version() {
        let calls = Arc::new(AtomicUsize::new(0));
        let s = PinHashScheme::new(Box::new(CountingHasher {
            inner: Pbkdf2Sha512Hasher::new(10),
            calls: Arc::clone(&calls),
        }))
        .with_legacy(Box::new(LegacySha256Hasher))
        .unwrap();
        let legacy = LegacySha256Hasher.hash("1234", "c-1");

        assert_eq!(s.check("9999", "c-1", &legacy), PinMatch::NoMatch);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(s.check("1234", "c-1", &legacy), PinMatch::Legacy { version: 1 });
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(s.check("1234", "c-1", "deadbeef"), PinMatch::NoMatch);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn ambiguous_legacy_length_rejected() {
        let s = PinHashScheme::new(Box::new(LegacySha256Hasher));
        assert!(s.with_legacy(Box::new(LegacySha256Hasher)).is_err());
    }

    #[test]
    fn pin_format() {
        assert!(validate_pin("0420").is_ok());
        assert!(validate_pin("123").is_err());
        assert!(validate_pin("12345").is_err());
        assert!(validate_pin("12a4").is_err());
        assert!(validate_pin("١٢٣٤").is_err());
    }
}
