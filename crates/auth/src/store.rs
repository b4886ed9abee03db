//! Storage ports the auth services depend on.
//!
//! Implementations live next to their backing technology: in-memory fakes in
//! [`crate::memory`], Postgres/Redis adapters in `lockgate-infra`. Both shared
//! mutable resources (consumed challenges, refresh revocation flags) are only
//! ever changed through atomic operations declared here.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use lockgate_core::{Address, ApplicationId, ChainNetwork};

use crate::challenge::ChallengeFingerprint;
use crate::principal::ApiKey;
use crate::tokens::{RefreshToken, RefreshTokenId};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("record already exists: {0}")]
    AlreadyExists(String),
    #[error("stored record is corrupt: {0}")]
    Corrupt(String),
}

/// Consumed sign-in challenges (the replay guard).
#[async_trait]
pub trait ChallengeStore: Send + Sync {
    /// Atomically record `fingerprint` as consumed.
    ///
    /// Returns `Ok(true)` for the first caller and `Ok(false)` for every later
    /// one, including concurrent callers. The record must be kept at least
    /// until `expires_at`; `now` is the caller's clock reading.
    async fn consume(
        &self,
        fingerprint: &ChallengeFingerprint,
        expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    /// Drop records whose challenge window closed before `now`.
    ///
    /// Returns how many records were removed.
    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, StoreError>;
}

/// Persisted refresh tokens.
#[async_trait]
pub trait RefreshTokenStore: Send + Sync {
    async fn insert(&self, token: &RefreshToken) -> Result<(), StoreError>;

    async fn get(&self, id: &RefreshTokenId) -> Result<Option<RefreshToken>, StoreError>;

    /// Atomically set `revoked = true`. Idempotent.
    ///
    /// Returns `Ok(false)` only when no token with `id` exists.
    async fn revoke(&self, id: &RefreshTokenId) -> Result<bool, StoreError>;
}

/// A registered application, created by application management and read here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Application {
    pub id: ApplicationId,
    pub name: String,
    pub wallet_address: Address,
    #[serde(skip_serializing)]
    pub api_key: String,
    pub created_at: DateTime<Utc>,
}

#[async_trait]
pub trait ApplicationStore: Send + Sync {
    /// Exact-match lookup; no prefix or case-insensitive matching.
    async fn find_by_api_key(&self, key: &ApiKey) -> Result<Option<Application>, StoreError>;
}

/// A wallet granted the verifier role for one lock on one network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verifier {
    pub lock_address: Address,
    pub address: Address,
    pub network: ChainNetwork,
    pub name: Option<String>,
}

#[async_trait]
pub trait VerifierStore: Send + Sync {
    async fn is_verifier(
        &self,
        lock_address: &Address,
        address: &Address,
        network: ChainNetwork,
    ) -> Result<bool, StoreError>;
}

/// Allow-list of applications that act on behalf of the platform
/// (e.g. CMS plugins granting keys for any lock that opted in).
pub trait IntegrationRegistry: Send + Sync {
    fn is_platform_integration(&self, application_id: &ApplicationId) -> bool;
}
