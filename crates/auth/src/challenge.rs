//! Login challenges: nonce issuance and the replay fingerprint.

use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use rand::distributions::Alphanumeric;

use lockgate_core::{Address, keccak256_concat};

use crate::siwe::SignInMessage;

/// Length of issued nonces (alphanumeric, ~190 bits of entropy).
pub const NONCE_LEN: usize = 32;

/// Minimum nonce length accepted inside a sign-in message.
pub const MIN_NONCE_LEN: usize = 8;

/// Mints unguessable one-time nonces.
///
/// Stateless: a nonce only gains meaning once it is embedded in a signed
/// message and presented back to login.
#[derive(Debug, Default, Clone, Copy)]
pub struct NonceIssuer;

impl NonceIssuer {
    pub fn new() -> Self {
        Self
    }

    pub fn issue(&self) -> String {
        rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(NONCE_LEN)
            .map(char::from)
            .collect()
    }
}

pub fn is_valid_nonce(nonce: &str) -> bool {
    nonce.len() >= MIN_NONCE_LEN && nonce.bytes().all(|b| b.is_ascii_alphanumeric())
}

/// Stable identity of a challenge for replay detection: keccak256(address || nonce).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct ChallengeFingerprint([u8; 32]);

impl ChallengeFingerprint {
    pub fn for_challenge(address: &Address, nonce: &str) -> Self {
        Self(keccak256_concat(&[address.as_bytes(), nonce.as_bytes()]))
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

/// Parameters for rendering an unsigned sign-in message for a client.
#[derive(Debug, Clone)]
pub struct ChallengeTemplate {
    pub domain: String,
    pub uri: String,
    pub chain_id: u64,
    pub statement: Option<String>,
    pub ttl: Duration,
}

impl ChallengeTemplate {
    /// Build the message `address` is expected to sign, embedding a fresh nonce.
    pub fn render(&self, issuer: &NonceIssuer, address: Address, now: DateTime<Utc>) -> SignInMessage {
        SignInMessage {
            domain: self.domain.clone(),
            address,
            statement: self.statement.clone(),
            uri: Some(self.uri.clone()),
            version: Some("1".to_string()),
            chain_id: Some(self.chain_id),
            nonce: issuer.issue(),
            issued_at: now,
            expiration_time: now + self.ttl,
            not_before: None,
            request_id: None,
            resources: Vec::new(),
        }
    }
}
