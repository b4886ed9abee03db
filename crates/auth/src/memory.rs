//! In-memory store and chain-state implementations for tests/dev.
//!
//! Each store guards its map with a single lock so every check-and-set is
//! atomic with respect to other callers in the same process.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use lockgate_core::{Address, ApplicationId, ChainNetwork, TokenId};

use crate::chain::{ChainState, ChainStateError};
use crate::challenge::ChallengeFingerprint;
use crate::principal::ApiKey;
use crate::store::{
    Application, ApplicationStore, ChallengeStore, IntegrationRegistry, RefreshTokenStore,
    StoreError, Verifier, VerifierStore,
};
use crate::tokens::{RefreshToken, RefreshTokenId};

fn poisoned<T>(_: T) -> StoreError {
    StoreError::Unavailable("lock poisoned".into())
}

#[derive(Debug, Default)]
pub struct InMemoryChallengeStore {
    consumed: Mutex<HashMap<ChallengeFingerprint, DateTime<Utc>>>,
}

impl InMemoryChallengeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.consumed.lock().map(|c| c.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ChallengeStore for InMemoryChallengeStore {
    async fn consume(
        &self,
        fingerprint: &ChallengeFingerprint,
        expires_at: DateTime<Utc>,
        _now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let mut consumed = self.consumed.lock().map_err(poisoned)?;
        if consumed.contains_key(fingerprint) {
            return Ok(false);
        }
        consumed.insert(*fingerprint, expires_at);
        Ok(true)
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        let mut consumed = self.consumed.lock().map_err(poisoned)?;
        let before = consumed.len();
        consumed.retain(|_, expires_at| *expires_at >= now);
        Ok((before - consumed.len()) as u64)
    }
}

#[derive(Debug, Default)]
pub struct InMemoryRefreshTokenStore {
    tokens: RwLock<HashMap<RefreshTokenId, RefreshToken>>,
}

impl InMemoryRefreshTokenStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RefreshTokenStore for InMemoryRefreshTokenStore {
    async fn insert(&self, token: &RefreshToken) -> Result<(), StoreError> {
        let mut tokens = self.tokens.write().map_err(poisoned)?;
        if tokens.contains_key(&token.id) {
            return Err(StoreError::AlreadyExists(token.id.to_string()));
        }
        tokens.insert(token.id.clone(), token.clone());
        Ok(())
    }

    async fn get(&self, id: &RefreshTokenId) -> Result<Option<RefreshToken>, StoreError> {
        let tokens = self.tokens.read().map_err(poisoned)?;
        Ok(tokens.get(id).cloned())
    }

    async fn revoke(&self, id: &RefreshTokenId) -> Result<bool, StoreError> {
        let mut tokens = self.tokens.write().map_err(poisoned)?;
        match tokens.get_mut(id) {
            Some(token) => {
                token.revoked = true;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[derive(Debug, Default)]
pub struct InMemoryApplicationStore {
    applications: RwLock<HashMap<ApplicationId, Application>>,
}

impl InMemoryApplicationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an application with a freshly generated api key.
    pub fn register(&self, name: impl Into<String>, wallet_address: Address) -> Application {
        let application = Application {
            id: ApplicationId::new(),
            name: name.into(),
            wallet_address,
            api_key: ApiKey::generate().as_str().to_string(),
            created_at: Utc::now(),
        };
        if let Ok(mut apps) = self.applications.write() {
            apps.insert(application.id, application.clone());
        }
        application
    }

    pub fn delete(&self, id: &ApplicationId) -> bool {
        self.applications
            .write()
            .map(|mut apps| apps.remove(id).is_some())
            .unwrap_or(false)
    }
}

#[async_trait]
impl ApplicationStore for InMemoryApplicationStore {
    async fn find_by_api_key(&self, key: &ApiKey) -> Result<Option<Application>, StoreError> {
        let apps = self.applications.read().map_err(poisoned)?;
        Ok(apps.values().find(|a| a.api_key == key.as_str()).cloned())
    }
}

#[derive(Debug, Default)]
pub struct InMemoryVerifierStore {
    verifiers: RwLock<Vec<Verifier>>,
}

impl InMemoryVerifierStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, verifier: Verifier) {
        if let Ok(mut verifiers) = self.verifiers.write() {
            verifiers.push(verifier);
        }
    }
}

#[async_trait]
impl VerifierStore for InMemoryVerifierStore {
    async fn is_verifier(
        &self,
        lock_address: &Address,
        address: &Address,
        network: ChainNetwork,
    ) -> Result<bool, StoreError> {
        let verifiers = self.verifiers.read().map_err(poisoned)?;
        Ok(verifiers.iter().any(|v| {
            v.lock_address == *lock_address && v.address == *address && v.network == network
        }))
    }
}

/// Fixed allow-list of platform-integration applications.
#[derive(Debug, Default, Clone)]
pub struct StaticIntegrationRegistry {
    allowed: HashSet<ApplicationId>,
}

impl StaticIntegrationRegistry {
    pub fn new(allowed: impl IntoIterator<Item = ApplicationId>) -> Self {
        Self {
            allowed: allowed.into_iter().collect(),
        }
    }
}

impl IntegrationRegistry for StaticIntegrationRegistry {
    fn is_platform_integration(&self, application_id: &ApplicationId) -> bool {
        self.allowed.contains(application_id)
    }
}

/// Scriptable chain state: fixed managers/owners plus failure and latency injection.
#[derive(Debug, Default)]
pub struct StaticChainState {
    managers: RwLock<HashSet<(ChainNetwork, Address, Address)>>,
    owners: RwLock<HashMap<(ChainNetwork, Address, TokenId), Address>>,
    unavailable: RwLock<bool>,
    latency: RwLock<Option<Duration>>,
    calls: Mutex<Vec<&'static str>>,
}

impl StaticChainState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_manager(&self, network: ChainNetwork, lock_address: Address, manager: Address) {
        if let Ok(mut m) = self.managers.write() {
            m.insert((network, lock_address, manager));
        }
    }

    pub fn set_owner(&self, network: ChainNetwork, lock_address: Address, token_id: TokenId, owner: Address) {
        if let Ok(mut o) = self.owners.write() {
            o.insert((network, lock_address, token_id), owner);
        }
    }

    /// Make every call fail as if the RPC provider were down.
    pub fn set_unavailable(&self, unavailable: bool) {
        if let Ok(mut u) = self.unavailable.write() {
            *u = unavailable;
        }
    }

    /// Delay every call (to exercise caller timeouts).
    pub fn set_latency(&self, latency: Option<Duration>) {
        if let Ok(mut l) = self.latency.write() {
            *l = latency;
        }
    }

    /// Names of the calls made so far, in order.
    pub fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    async fn enter(&self, call: &'static str) -> Result<(), ChainStateError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(call);
        }
        let latency = self.latency.read().ok().and_then(|l| *l);
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        if self.unavailable.read().map(|u| *u).unwrap_or(true) {
            return Err(ChainStateError::Transport("provider unavailable".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl ChainState for StaticChainState {
    async fn is_lock_manager(
        &self,
        lock_address: &Address,
        address: &Address,
        network: ChainNetwork,
    ) -> Result<bool, ChainStateError> {
        self.enter("isLockManager").await?;
        let managers = self
            .managers
            .read()
            .map_err(|_| ChainStateError::Transport("lock poisoned".into()))?;
        Ok(managers.contains(&(network, *lock_address, *address)))
    }

    async fn owner_of(
        &self,
        lock_address: &Address,
        token_id: &TokenId,
        network: ChainNetwork,
    ) -> Result<Address, ChainStateError> {
        self.enter("ownerOf").await?;
        let owners = self
            .owners
            .read()
            .map_err(|_| ChainStateError::Transport("lock poisoned".into()))?;
        owners
            .get(&(network, *lock_address, *token_id))
            .copied()
            .ok_or_else(|| ChainStateError::Rpc("execution reverted: NO_SUCH_KEY".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;
    use std::sync::Arc;

    #[tokio::test]
    async fn consume_is_first_writer_wins() {
        let store = InMemoryChallengeStore::new();
        let fp = ChallengeFingerprint::for_challenge(&Address::ZERO, "abcdefgh");
        let now = Utc::now();
        let exp = now + ChronoDuration::minutes(5);
        assert!(store.consume(&fp, exp, now).await.unwrap());
        assert!(!store.consume(&fp, exp, now).await.unwrap());
    }

    #[tokio::test]
    async fn purge_drops_only_closed_windows() {
        let store = InMemoryChallengeStore::new();
        let now = Utc::now();
        let old = ChallengeFingerprint::for_challenge(&Address::ZERO, "oldnonce1");
        let live = ChallengeFingerprint::for_challenge(&Address::ZERO, "livenonce1");
        store.consume(&old, now - ChronoDuration::minutes(1), now).await.unwrap();
        store.consume(&live, now + ChronoDuration::minutes(1), now).await.unwrap();
        assert_eq!(store.purge_expired(now).await.unwrap(), 1);
        assert_eq!(store.purge_expired(now).await.unwrap(), 0);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn revoke_unknown_token_reports_false() {
        let store = InMemoryRefreshTokenStore::new();
        assert!(!store.revoke(&RefreshTokenId::generate()).await.unwrap());
    }

    #[tokio::test]
    async fn application_lookup_is_exact() {
        let store = InMemoryApplicationStore::new();
        let app = store.register("WordPress", Address::ZERO);
        let key = ApiKey::parse(&app.api_key).unwrap();
        assert_eq!(store.find_by_api_key(&key).await.unwrap(), Some(app.clone()));

        let longer = ApiKey::parse(&format!("{}x", app.api_key)).unwrap();
        assert_eq!(store.find_by_api_key(&longer).await.unwrap(), None);

        let shorter = ApiKey::parse(&app.api_key[1..]).unwrap();
        assert_eq!(store.find_by_api_key(&shorter).await.unwrap(), None);

        assert!(store.delete(&app.id));
        assert_eq!(store.find_by_api_key(&key).await.unwrap(), None);
    }

    #[tokio::test]
    async fn static_chain_state_records_calls_and_fails_on_demand() {
        let chain = Arc::new(StaticChainState::new());
        let lock = Address::from_bytes([1u8; 20]);
        let network = ChainNetwork::new(1);
        chain.add_manager(network, lock, Address::ZERO);
        assert!(chain.is_lock_manager(&lock, &Address::ZERO, network).await.unwrap());

        chain.set_unavailable(true);
        assert!(chain.is_lock_manager(&lock, &Address::ZERO, network).await.is_err());
        assert_eq!(chain.calls(), vec!["isLockManager", "isLockManager"]);
    }
}
