//! Service wiring: picks store/chain adapters from configuration and builds
//! the auth services the routes use.

use std::sync::Arc;

use anyhow::{Context, Result};

use lockgate_auth::memory::{
    InMemoryApplicationStore, InMemoryChallengeStore, InMemoryRefreshTokenStore,
    InMemoryVerifierStore, StaticIntegrationRegistry,
};
use lockgate_auth::{
    ApplicationStore, AuthorizationResolver, ChainState, ChallengeStore, IdentityResolver,
    IntegrationRegistry, LoginService, NonceIssuer, PolicyError, RefreshTokenStore, TokenService,
    VerifierStore,
};
use lockgate_core::{Clock, SystemClock};
use lockgate_infra::{JsonRpcChainState, PostgresAuthStore};

use crate::app::purge::ChallengePurge;
use crate::config::ApiConfig;

/// External collaborators of the auth services.
#[derive(Clone)]
pub struct Collaborators {
    pub clock: Arc<dyn Clock>,
    pub challenges: Arc<dyn ChallengeStore>,
    pub refresh_tokens: Arc<dyn RefreshTokenStore>,
    pub applications: Arc<dyn ApplicationStore>,
    pub verifiers: Arc<dyn VerifierStore>,
    pub chain: Arc<dyn ChainState>,
    pub integrations: Arc<dyn IntegrationRegistry>,
}

impl Collaborators {
    /// Process-local stores; state is lost on restart.
    pub fn in_memory(chain: Arc<dyn ChainState>, integrations: Arc<dyn IntegrationRegistry>) -> Self {
        Self {
            clock: Arc::new(SystemClock),
            challenges: Arc::new(InMemoryChallengeStore::new()),
            refresh_tokens: Arc::new(InMemoryRefreshTokenStore::new()),
            applications: Arc::new(InMemoryApplicationStore::new()),
            verifiers: Arc::new(InMemoryVerifierStore::new()),
            chain,
            integrations,
        }
    }
}

pub struct AuthServices {
    pub nonces: NonceIssuer,
    pub login: LoginService,
    pub tokens: Arc<TokenService>,
    pub identity: IdentityResolver,
    pub authorization: AuthorizationResolver,
    pub challenge_purge: ChallengePurge,
}

impl AuthServices {
    pub fn new(config: &ApiConfig, collaborators: Collaborators) -> Result<Self, PolicyError> {
        let Collaborators {
            clock,
            challenges,
            refresh_tokens,
            applications,
            verifiers,
            chain,
            integrations,
        } = collaborators;

        let tokens = Arc::new(TokenService::new(
            config.jwt_secret.as_bytes(),
            config.token_policy(),
            refresh_tokens,
            clock.clone(),
        )?);

        let challenge_purge = ChallengePurge::new(challenges.clone(), clock.clone());
        let mut login = LoginService::new(challenges, clock);
        if let Some(domain) = &config.siwe_domain {
            login = login.with_expected_domain(domain.clone());
        }

        Ok(Self {
            nonces: NonceIssuer::new(),
            login,
            identity: IdentityResolver::new(tokens.clone(), applications),
            authorization: AuthorizationResolver::new(verifiers, chain, integrations)
                .with_check_timeout(config.chain_check_timeout),
            tokens,
            challenge_purge,
        })
    }
}

/// Build services from configuration.
///
/// `DATABASE_URL` selects Postgres stores (tables are created on startup);
/// otherwise everything is in memory. With the `redis` feature, `REDIS_URL`
/// moves the consumed-challenge set to Redis.
pub async fn build_services(config: &ApiConfig) -> Result<AuthServices> {
    if config.rpc_urls.is_empty() {
        tracing::warn!("RPC_URLS not set; every on-chain authorization check will fail closed");
    }
    let chain: Arc<dyn ChainState> = Arc::new(
        JsonRpcChainState::new(config.rpc_urls.iter().cloned()).context("failed to build RPC client")?,
    );
    let integrations: Arc<dyn IntegrationRegistry> = Arc::new(StaticIntegrationRegistry::new(
        config.platform_applications.iter().copied(),
    ));

    let collaborators = match &config.database_url {
        Some(url) => {
            let store = Arc::new(
                PostgresAuthStore::connect(url)
                    .await
                    .context("failed to connect to Postgres")?,
            );
            store.migrate().await.context("failed to create auth tables")?;
            tracing::info!("using Postgres auth stores");
            Collaborators {
                clock: Arc::new(SystemClock),
                challenges: store.clone(),
                refresh_tokens: store.clone(),
                applications: store.clone(),
                verifiers: store,
                chain,
                integrations,
            }
        }
        None => {
            tracing::warn!("DATABASE_URL not set; using in-memory auth stores");
            Collaborators::in_memory(chain, integrations)
        }
    };

    let collaborators = with_redis_challenges(config, collaborators)?;

    let services = AuthServices::new(config, collaborators).context("invalid token policy")?;
    Ok(services)
}

#[cfg(feature = "redis")]
fn with_redis_challenges(config: &ApiConfig, mut collaborators: Collaborators) -> Result<Collaborators> {
    if let Some(url) = &config.redis_url {
        let store = lockgate_infra::RedisChallengeStore::new(url, None)
            .context("failed to configure Redis")?;
        collaborators.challenges = Arc::new(store);
        tracing::info!("using Redis consumed-challenge store");
    }
    Ok(collaborators)
}

#[cfg(not(feature = "redis"))]
fn with_redis_challenges(config: &ApiConfig, collaborators: Collaborators) -> Result<Collaborators> {
    if config.redis_url.is_some() {
        tracing::warn!("REDIS_URL is set but the `redis` feature is disabled; ignoring");
    }
    Ok(collaborators)
}
