use core::str::FromStr;

use rand::Rng;
use rand::distributions::Alphanumeric;
use serde::Serialize;

use lockgate_core::{Address, ApplicationId};

/// Longest api key accepted on the wire.
pub const MAX_API_KEY_LEN: usize = 128;

/// Identity of an authenticated request.
///
/// Resolved once per request and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type")]
pub enum Principal {
    /// A wallet that proved control of its address by signing a challenge.
    #[serde(rename = "user", rename_all = "camelCase")]
    User { wallet_address: Address },

    /// A registered application authenticated by its api key.
    #[serde(rename = "application", rename_all = "camelCase")]
    Application {
        application_id: ApplicationId,
        wallet_address: Address,
        #[serde(skip)]
        api_key: ApiKey,
    },
}

impl Principal {
    pub fn user(wallet_address: Address) -> Self {
        Principal::User { wallet_address }
    }

    /// The address capability checks are evaluated against.
    pub fn wallet_address(&self) -> Address {
        match self {
            Principal::User { wallet_address } => *wallet_address,
            Principal::Application { wallet_address, .. } => *wallet_address,
        }
    }

    pub fn application_id(&self) -> Option<ApplicationId> {
        match self {
            Principal::User { .. } => None,
            Principal::Application { application_id, .. } => Some(*application_id),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Principal::User { .. } => "user",
            Principal::Application { .. } => "application",
        }
    }
}

/// Application api key.
///
/// Keys are opaque: 1..=128 characters of `[A-Za-z0-9_-]`. Anything else is
/// rejected before a store lookup happens.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct ApiKey(String);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("malformed api key")]
pub struct MalformedApiKey;

impl ApiKey {
    pub fn parse(raw: &str) -> Result<Self, MalformedApiKey> {
        raw.parse()
    }

    /// Mint a fresh random key (used by application management and tests).
    pub fn generate() -> Self {
        let key: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(40)
            .map(char::from)
            .collect();
        Self(key)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for ApiKey {
    type Err = MalformedApiKey;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let valid = !s.is_empty()
            && s.len() <= MAX_API_KEY_LEN
            && s
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_');
        if valid { Ok(Self(s.to_string())) } else { Err(MalformedApiKey) }
    }
}

impl core::fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str("ApiKey([REDACTED])")
    }
}
