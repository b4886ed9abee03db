//! Capability authorization against local roles and on-chain state.
//!
//! A decision is an ordered walk over [`CheckKind`]s, cheapest first. Each
//! check runs only if no earlier check already granted, and only if it can
//! satisfy one of the requested capabilities. Chain calls are individually
//! bounded by a timeout; a failed or timed-out check counts as "not granted"
//! for that check and the walk continues. Decisions are never cached.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, instrument, warn};

use lockgate_core::{Address, ChainNetwork, TokenId};

use crate::chain::ChainState;
use crate::error::AuthError;
use crate::principal::Principal;
use crate::store::{IntegrationRegistry, VerifierStore};

pub const DEFAULT_CHECK_TIMEOUT: Duration = Duration::from_secs(3);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Capability {
    Manage,
    Own,
    Verify,
}

impl Capability {
    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::Manage => "manage",
            Capability::Own => "own",
            Capability::Verify => "verify",
        }
    }
}

impl core::fmt::Display for Capability {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown capability '{0}'")]
pub struct UnknownCapability(pub String);

impl core::str::FromStr for Capability {
    type Err = UnknownCapability;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "manage" => Ok(Capability::Manage),
            "own" => Ok(Capability::Own),
            "verify" => Ok(Capability::Verify),
            _ => Err(UnknownCapability(s.to_string())),
        }
    }
}

/// The protected thing: a lock on a network, optionally one key of it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Resource {
    pub network: ChainNetwork,
    pub lock_address: Address,
    pub token_id: Option<TokenId>,
}

impl Resource {
    pub fn lock(network: ChainNetwork, lock_address: Address) -> Self {
        Self {
            network,
            lock_address,
            token_id: None,
        }
    }

    pub fn key(network: ChainNetwork, lock_address: Address, token_id: TokenId) -> Self {
        Self {
            network,
            lock_address,
            token_id: Some(token_id),
        }
    }
}

/// Individual checks, in evaluation (cost) order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckKind {
    PlatformIntegration,
    VerifierRole,
    KeyOwnership,
    LockManager,
}

impl CheckKind {
    pub const ORDER: [CheckKind; 4] = [
        CheckKind::PlatformIntegration,
        CheckKind::VerifierRole,
        CheckKind::KeyOwnership,
        CheckKind::LockManager,
    ];

    /// Capabilities a passing check grants.
    pub fn grants(&self) -> &'static [Capability] {
        match self {
            CheckKind::PlatformIntegration => &[Capability::Manage, Capability::Verify],
            CheckKind::VerifierRole => &[Capability::Verify],
            CheckKind::KeyOwnership => &[Capability::Own],
            CheckKind::LockManager => &[Capability::Manage, Capability::Verify],
        }
    }

    fn is_remote(&self) -> bool {
        matches!(self, CheckKind::KeyOwnership | CheckKind::LockManager)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckOutcome {
    Granted,
    Denied,
    Failed,
    TimedOut,
    /// Not evaluated: irrelevant to the request, or an earlier check granted.
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckRecord {
    pub kind: CheckKind,
    pub outcome: CheckOutcome,
}

/// Audit record of one decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizationTrace {
    pub subject: Address,
    pub resource: Resource,
    pub requested: Vec<Capability>,
    pub checks: Vec<CheckRecord>,
    pub granted: bool,
}

impl AuthorizationTrace {
    pub fn outcome_of(&self, kind: CheckKind) -> Option<CheckOutcome> {
        self.checks.iter().find(|c| c.kind == kind).map(|c| c.outcome)
    }

    /// True when at least one check could not be evaluated.
    pub fn degraded(&self) -> bool {
        self.checks
            .iter()
            .any(|c| matches!(c.outcome, CheckOutcome::Failed | CheckOutcome::TimedOut))
    }
}

pub struct AuthorizationResolver {
    verifiers: Arc<dyn VerifierStore>,
    chain: Arc<dyn ChainState>,
    integrations: Arc<dyn IntegrationRegistry>,
    check_timeout: Duration,
}

impl AuthorizationResolver {
    pub fn new(
        verifiers: Arc<dyn VerifierStore>,
        chain: Arc<dyn ChainState>,
        integrations: Arc<dyn IntegrationRegistry>,
    ) -> Self {
        Self {
            verifiers,
            chain,
            integrations,
            check_timeout: DEFAULT_CHECK_TIMEOUT,
        }
    }

    pub fn with_check_timeout(mut self, timeout: Duration) -> Self {
        self.check_timeout = timeout;
        self
    }

    pub async fn authorize(
        &self,
        principal: &Principal,
        resource: &Resource,
        capability: Capability,
    ) -> bool {
        self.explain(principal, resource, &[capability]).await.granted
    }

    /// Succeeds if any of `capabilities` holds; the union of checks runs once.
    pub async fn authorize_any(
        &self,
        principal: &Principal,
        resource: &Resource,
        capabilities: &[Capability],
    ) -> bool {
        self.explain(principal, resource, capabilities).await.granted
    }

    /// Like [`Self::authorize_any`], mapping a denial to [`AuthError::Forbidden`].
    pub async fn require(
        &self,
        principal: &Principal,
        resource: &Resource,
        capabilities: &[Capability],
    ) -> Result<AuthorizationTrace, AuthError> {
        let trace = self.explain(principal, resource, capabilities).await;
        if trace.granted {
            Ok(trace)
        } else {
            let wanted = capabilities
                .iter()
                .map(Capability::as_str)
                .collect::<Vec<_>>()
                .join("|");
            Err(AuthError::Forbidden(wanted))
        }
    }

    #[instrument(
        skip_all,
        fields(
            subject = %principal.wallet_address(),
            network = %resource.network,
            lock = %resource.lock_address,
        )
    )]
    pub async fn explain(
        &self,
        principal: &Principal,
        resource: &Resource,
        capabilities: &[Capability],
    ) -> AuthorizationTrace {
        let subject = principal.wallet_address();
        let mut checks = Vec::with_capacity(CheckKind::ORDER.len());
        let mut granted = false;

        for kind in CheckKind::ORDER {
            let outcome = if granted || !self.applies(kind, principal, resource, capabilities) {
                CheckOutcome::Skipped
            } else {
                self.evaluate(kind, principal, subject, resource).await
            };
            granted |= outcome == CheckOutcome::Granted;
            checks.push(CheckRecord { kind, outcome });
        }

        let trace = AuthorizationTrace {
            subject,
            resource: *resource,
            requested: capabilities.to_vec(),
            checks,
            granted,
        };
        debug!(granted, degraded = trace.degraded(), "authorization decided");
        trace
    }

    fn applies(
        &self,
        kind: CheckKind,
        principal: &Principal,
        resource: &Resource,
        capabilities: &[Capability],
    ) -> bool {
        if !kind.grants().iter().any(|c| capabilities.contains(c)) {
            return false;
        }
        match kind {
            CheckKind::PlatformIntegration => principal.application_id().is_some(),
            CheckKind::KeyOwnership => resource.token_id.is_some(),
            CheckKind::VerifierRole | CheckKind::LockManager => true,
        }
    }

    async fn evaluate(
        &self,
        kind: CheckKind,
        principal: &Principal,
        subject: Address,
        resource: &Resource,
    ) -> CheckOutcome {
        let result = tokio::time::timeout(self.check_timeout, self.run(kind, principal, subject, resource)).await;
        match result {
            Ok(Ok(true)) => CheckOutcome::Granted,
            Ok(Ok(false)) => CheckOutcome::Denied,
            Ok(Err(e)) => {
                warn!(
                    check = ?kind,
                    remote = kind.is_remote(),
                    category = "upstream_unavailable",
                    error = %e,
                    "authorization check failed; treating as not granted"
                );
                CheckOutcome::Failed
            }
            Err(_) => {
                warn!(
                    check = ?kind,
                    timeout_ms = self.check_timeout.as_millis() as u64,
                    category = "upstream_unavailable",
                    "authorization check timed out; treating as not granted"
                );
                CheckOutcome::TimedOut
            }
        }
    }

    async fn run(
        &self,
        kind: CheckKind,
        principal: &Principal,
        subject: Address,
        resource: &Resource,
    ) -> Result<bool, AuthError> {
        match kind {
            CheckKind::PlatformIntegration => Ok(principal
                .application_id()
                .is_some_and(|id| self.integrations.is_platform_integration(&id))),
            CheckKind::VerifierRole => Ok(self
                .verifiers
                .is_verifier(&resource.lock_address, &subject, resource.network)
                .await?),
            CheckKind::KeyOwnership => match resource.token_id {
                Some(token_id) => {
                    let owner = self
                        .chain
                        .owner_of(&resource.lock_address, &token_id, resource.network)
                        .await?;
                    Ok(owner == subject)
                }
                None => Ok(false),
            },
            CheckKind::LockManager => Ok(self
                .chain
                .is_lock_manager(&resource.lock_address, &subject, resource.network)
                .await?),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lockgate_core::ApplicationId;

    use crate::memory::{InMemoryVerifierStore, StaticChainState, StaticIntegrationRegistry};
    use crate::principal::ApiKey;
    use crate::store::Verifier;

    const NETWORK: ChainNetwork = ChainNetwork::new(137);

    fn lock() -> Address {
        Address::from_bytes([0x11; 20])
    }

    fn alice() -> Address {
        Address::from_bytes([0xa1; 20])
    }

    struct Fixture {
        verifiers: Arc<InMemoryVerifierStore>,
        chain: Arc<StaticChainState>,
        resolver: AuthorizationResolver,
    }

    fn fixture_with(integrations: StaticIntegrationRegistry) -> Fixture {
        let verifiers = Arc::new(InMemoryVerifierStore::new());
        let chain = Arc::new(StaticChainState::new());
        let resolver =
            AuthorizationResolver::new(verifiers.clone(), chain.clone(), Arc::new(integrations))
                .with_check_timeout(Duration::from_millis(50));
        Fixture {
            verifiers,
            chain,
            resolver,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(StaticIntegrationRegistry::default())
    }

    fn application(id: ApplicationId, wallet: Address) -> Principal {
        Principal::Application {
            application_id: id,
            wallet_address: wallet,
            api_key: ApiKey::generate(),
        }
    }

    #[test]
    fn capability_parses_case_insensitively() {
        assert_eq!("Manage".parse::<Capability>(), Ok(Capability::Manage));
        assert_eq!("verify".parse::<Capability>(), Ok(Capability::Verify));
        assert!("admin".parse::<Capability>().is_err());
        assert_eq!(Capability::Own.to_string(), "own");
    }

    #[tokio::test]
    async fn lock_manager_may_manage_and_verify() {
        let f = fixture();
        f.chain.add_manager(NETWORK, lock(), alice());
        let user = Principal::user(alice());
        let resource = Resource::lock(NETWORK, lock());
        assert!(f.resolver.authorize(&user, &resource, Capability::Manage).await);
        assert!(f.resolver.authorize(&user, &resource, Capability::Verify).await);
        assert!(!f.resolver.authorize(&user, &resource, Capability::Own).await);
    }

    #[tokio::test]
    async fn verifier_role_short_circuits_chain_calls() {
        let f = fixture();
        f.verifiers.add(Verifier {
            lock_address: lock(),
            address: alice(),
            network: NETWORK,
            name: Some("door".into()),
        });
        let trace = f
            .resolver
            .explain(&Principal::user(alice()), &Resource::lock(NETWORK, lock()), &[Capability::Verify])
            .await;
        assert!(trace.granted);
        assert_eq!(trace.outcome_of(CheckKind::VerifierRole), Some(CheckOutcome::Granted));
        assert_eq!(trace.outcome_of(CheckKind::LockManager), Some(CheckOutcome::Skipped));
        assert!(f.chain.calls().is_empty());
    }

    #[tokio::test]
    async fn verifier_on_another_network_does_not_count() {
        let f = fixture();
        f.verifiers.add(Verifier {
            lock_address: lock(),
            address: alice(),
            network: ChainNetwork::new(1),
            name: None,
        });
        let resource = Resource::lock(NETWORK, lock());
        assert!(!f.resolver.authorize(&Principal::user(alice()), &resource, Capability::Verify).await);
    }

    #[tokio::test]
    async fn key_owner_has_own_only_with_token_id() {
        let f = fixture();
        let token = TokenId::from_u64(42);
        f.chain.set_owner(NETWORK, lock(), token, alice());
        let user = Principal::user(alice());

        assert!(f.resolver.authorize(&user, &Resource::key(NETWORK, lock(), token), Capability::Own).await);
        assert!(!f.resolver.authorize(&user, &Resource::lock(NETWORK, lock()), Capability::Own).await);

        let bob = Principal::user(Address::from_bytes([0xb0; 20]));
        assert!(!f.resolver.authorize(&bob, &Resource::key(NETWORK, lock(), token), Capability::Own).await);
    }

    #[tokio::test]
    async fn upstream_failure_never_authorizes() {
        let f = fixture();
        f.chain.add_manager(NETWORK, lock(), alice());
        f.chain.set_unavailable(true);
        let trace = f
            .resolver
            .explain(&Principal::user(alice()), &Resource::lock(NETWORK, lock()), &[Capability::Manage])
            .await;
        assert!(!trace.granted);
        assert!(trace.degraded());
        assert_eq!(trace.outcome_of(CheckKind::LockManager), Some(CheckOutcome::Failed));
    }

    #[tokio::test]
    async fn slow_upstream_times_out_closed() {
        let f = fixture();
        f.chain.add_manager(NETWORK, lock(), alice());
        f.chain.set_latency(Some(Duration::from_millis(500)));
        let trace = f
            .resolver
            .explain(&Principal::user(alice()), &Resource::lock(NETWORK, lock()), &[Capability::Manage])
            .await;
        assert!(!trace.granted);
        assert_eq!(trace.outcome_of(CheckKind::LockManager), Some(CheckOutcome::TimedOut));
    }

    #[tokio::test]
    async fn failing_check_does_not_stop_later_checks() {
        let f = fixture();
        let token = TokenId::from_u64(7);
        // ownerOf reverts for unknown tokens; the manager check still runs.
        f.chain.add_manager(NETWORK, lock(), alice());
        let granted = f
            .resolver
            .authorize_any(
                &Principal::user(alice()),
                &Resource::key(NETWORK, lock(), token),
                &[Capability::Own, Capability::Verify, Capability::Manage],
            )
            .await;
        assert!(granted);
        assert_eq!(f.chain.calls(), vec!["ownerOf", "isLockManager"]);
    }

    #[tokio::test]
    async fn platform_integration_is_allow_listed_by_application_id() {
        let allowed = ApplicationId::new();
        let f = fixture_with(StaticIntegrationRegistry::new([allowed]));
        let resource = Resource::lock(NETWORK, lock());

        let listed = application(allowed, alice());
        assert!(f.resolver.authorize(&listed, &resource, Capability::Manage).await);
        assert!(!f.resolver.authorize(&listed, &resource, Capability::Own).await);

        let unlisted = application(ApplicationId::new(), alice());
        assert!(!f.resolver.authorize(&unlisted, &resource, Capability::Manage).await);
    }

    #[tokio::test]
    async fn application_is_checked_against_its_wallet() {
        let f = fixture();
        f.chain.add_manager(NETWORK, lock(), alice());
        let app = application(ApplicationId::new(), alice());
        assert!(
            f.resolver
                .authorize(&app, &Resource::lock(NETWORK, lock()), Capability::Manage)
                .await
        );
    }

    #[tokio::test]
    async fn require_maps_denial_to_forbidden() {
        let f = fixture();
        let err = f
            .resolver
            .require(&Principal::user(alice()), &Resource::lock(NETWORK, lock()), &[Capability::Manage])
            .await
            .unwrap_err();
        assert_eq!(err, AuthError::Forbidden("manage".into()));
    }
}
