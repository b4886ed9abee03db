//! Access/refresh token lifecycle.
//!
//! Access tokens are self-contained HS256 JWTs and are never persisted.
//! Refresh tokens are opaque random handles persisted through
//! [`RefreshTokenStore`]; their `revoked` flag only ever goes false → true.
//!
//! Refresh state machine:
//!
//! ```text
//! Issued → Active ──rotate()──▶ Active
//!            │ revoke()          │ expiry elapses
//!            ▼                   ▼
//!         Revoked             Expired      (both terminal; rotate() fails)
//! ```

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use lockgate_core::{Address, Clock};

use crate::claims::{AccessClaims, TokenValidationError, validate_claims};
use crate::error::AuthError;
use crate::principal::Principal;
use crate::store::RefreshTokenStore;

/// Longest lifetime accepted for either token kind (ten years).
pub const MAX_TOKEN_TTL_SECS: i64 = 3650 * 86_400;

/// Lifetimes and issuer for minted tokens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenPolicy {
    pub access_ttl: Duration,
    pub refresh_ttl: Duration,
    pub issuer: String,
}

impl Default for TokenPolicy {
    fn default() -> Self {
        Self {
            access_ttl: Duration::hours(1),
            refresh_ttl: Duration::days(30),
            issuer: "lockgate".to_string(),
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PolicyError {
    #[error("access token lifetime must be positive")]
    NonPositiveAccessTtl,

    #[error("access token lifetime ({access}s) must be shorter than refresh token lifetime ({refresh}s)")]
    AccessOutlivesRefresh { access: i64, refresh: i64 },

    #[error("token lifetime ({ttl}s) exceeds the {max}s maximum")]
    TtlTooLong { ttl: i64, max: i64 },

    #[error("signing secret must not be empty")]
    EmptySecret,
}

impl TokenPolicy {
    pub fn validate(&self) -> Result<(), PolicyError> {
        if self.access_ttl <= Duration::zero() {
            return Err(PolicyError::NonPositiveAccessTtl);
        }
        if self.refresh_ttl > Duration::seconds(MAX_TOKEN_TTL_SECS) {
            return Err(PolicyError::TtlTooLong {
                ttl: self.refresh_ttl.num_seconds(),
                max: MAX_TOKEN_TTL_SECS,
            });
        }
        if self.access_ttl >= self.refresh_ttl {
            return Err(PolicyError::AccessOutlivesRefresh {
                access: self.access_ttl.num_seconds(),
                refresh: self.refresh_ttl.num_seconds(),
            });
        }
        Ok(())
    }
}

/// Opaque refresh token handle (256 random bits, hex).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RefreshTokenId(String);

impl RefreshTokenId {
    pub fn generate() -> Self {
        let mut bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(hex::encode(bytes))
    }

    /// Wrap a client-supplied id. No format check: unknown ids simply miss in the store.
    pub fn from_string(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for RefreshTokenId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Persisted refresh token record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshToken {
    pub id: RefreshTokenId,
    pub subject: Address,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub revoked: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshTokenState {
    Active,
    Revoked,
    Expired,
}

impl RefreshToken {
    pub fn state(&self, now: DateTime<Utc>) -> RefreshTokenState {
        if self.revoked {
            RefreshTokenState::Revoked
        } else if now >= self.expires_at {
            RefreshTokenState::Expired
        } else {
            RefreshTokenState::Active
        }
    }
}

/// A signed access token together with its decoded claims.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessToken {
    token: String,
    claims: AccessClaims,
}

impl AccessToken {
    pub fn as_str(&self) -> &str {
        &self.token
    }

    pub fn claims(&self) -> &AccessClaims {
        &self.claims
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.claims.expires_at()
    }
}

#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access: AccessToken,
    pub refresh: RefreshToken,
}

pub struct TokenService {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    policy: TokenPolicy,
    store: Arc<dyn RefreshTokenStore>,
    clock: Arc<dyn Clock>,
}

impl TokenService {
    pub fn new(
        secret: &[u8],
        policy: TokenPolicy,
        store: Arc<dyn RefreshTokenStore>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, PolicyError> {
        if secret.is_empty() {
            return Err(PolicyError::EmptySecret);
        }
        policy.validate()?;

        // Expiry is judged against the injected clock in `validate_claims`.
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.leeway = 0;
        validation.set_issuer(&[policy.issuer.as_str()]);
        validation.required_spec_claims =
            HashSet::from(["exp".to_string(), "sub".to_string(), "iss".to_string()]);

        Ok(Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            validation,
            policy,
            store,
            clock,
        })
    }

    pub fn policy(&self) -> &TokenPolicy {
        &self.policy
    }

    /// Mint an access token and persist a fresh refresh token for `principal`.
    #[instrument(skip_all, fields(subject = %principal.wallet_address()))]
    pub async fn issue(&self, principal: &Principal) -> Result<TokenPair, AuthError> {
        let now = self.clock.now();
        let refresh = RefreshToken {
            id: RefreshTokenId::generate(),
            subject: principal.wallet_address(),
            issued_at: now,
            expires_at: expiry_after(now, self.policy.refresh_ttl)?,
            revoked: false,
        };
        let access = self.mint_access(refresh.subject, now, refresh.expires_at)?;
        self.store.insert(&refresh).await?;

        info!(kind = principal.kind(), "issued token pair");
        Ok(TokenPair { access, refresh })
    }

    /// Verify signature, issuer and expiry; yields the user principal.
    pub fn validate_access(&self, token: &str) -> Result<Principal, AuthError> {
        let claims = self.decode_access(token)?;
        Ok(Principal::user(claims.sub))
    }

    pub fn decode_access(&self, token: &str) -> Result<AccessClaims, AuthError> {
        let data = jsonwebtoken::decode::<AccessClaims>(token, &self.decoding, &self.validation)
            .map_err(|e| {
                debug!(error = %e, "access token rejected");
                AuthError::AccessInvalid
            })?;

        match validate_claims(&data.claims, self.clock.now()) {
            Ok(()) => Ok(data.claims),
            Err(TokenValidationError::Expired) => Err(AuthError::AccessExpired),
            Err(e) => {
                debug!(error = %e, "access token time window rejected");
                Err(AuthError::AccessInvalid)
            }
        }
    }

    /// Mint a new access token from a live refresh token.
    ///
    /// The refresh token itself is left untouched (non-rotating refresh policy).
    #[instrument(skip_all)]
    pub async fn rotate(&self, id: &RefreshTokenId) -> Result<AccessToken, AuthError> {
        let token = self.store.get(id).await?.ok_or(AuthError::UnknownToken)?;
        let now = self.clock.now();

        match token.state(now) {
            RefreshTokenState::Revoked => {
                warn!(subject = %token.subject, "rotate attempted with revoked refresh token");
                Err(AuthError::RevokedToken)
            }
            RefreshTokenState::Expired => Err(AuthError::ExpiredToken),
            RefreshTokenState::Active => {
                let access = self.mint_access(token.subject, now, token.expires_at)?;
                debug!(subject = %token.subject, "rotated access token");
                Ok(access)
            }
        }
    }

    /// Revoke a refresh token. Idempotent; `false` only for unknown ids.
    #[instrument(skip_all)]
    pub async fn revoke(&self, id: &RefreshTokenId) -> Result<bool, AuthError> {
        let revoked = self.store.revoke(id).await?;
        if revoked {
            info!("refresh token revoked");
        }
        Ok(revoked)
    }

    /// Access expiry is capped one second before `ceiling` (the refresh
    /// token's expiry) so an access token never outlives its refresh token.
    fn mint_access(
        &self,
        subject: Address,
        now: DateTime<Utc>,
        ceiling: DateTime<Utc>,
    ) -> Result<AccessToken, AuthError> {
        let ceiling = ceiling
            .checked_sub_signed(Duration::seconds(1))
            .ok_or_else(|| AuthError::Internal("refresh expiry out of range".into()))?;
        let expires_at = expiry_after(now, self.policy.access_ttl)?.min(ceiling);
        if expires_at.timestamp() <= now.timestamp() {
            return Err(AuthError::ExpiredToken);
        }

        let claims = AccessClaims {
            sub: subject,
            iss: self.policy.issuer.clone(),
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
            jti: Uuid::new_v4(),
        };
        let token = jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| AuthError::Internal(format!("jwt encode: {e}")))?;

        Ok(AccessToken { token, claims })
    }
}

fn expiry_after(now: DateTime<Utc>, ttl: Duration) -> Result<DateTime<Utc>, AuthError> {
    now.checked_add_signed(ttl)
        .ok_or_else(|| AuthError::Internal(format!("token expiry overflows ({}s from {now})", ttl.num_seconds())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use lockgate_core::ManualClock;

    use crate::memory::InMemoryRefreshTokenStore;

    const SECRET: &[u8] = b"test-secret";

    fn wallet() -> Address {
        "0xfB6916095ca1df60bB79Ce92cE3Ea74c37c5d359".parse().unwrap()
    }

    fn service_with(policy: TokenPolicy) -> (TokenService, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::starting_now());
        let svc = TokenService::new(
            SECRET,
            policy,
            Arc::new(InMemoryRefreshTokenStore::new()),
            clock.clone(),
        )
        .unwrap();
        (svc, clock)
    }

    fn service() -> (TokenService, Arc<ManualClock>) {
        service_with(TokenPolicy::default())
    }

    #[tokio::test]
    async fn issued_access_token_validates_to_the_same_user() {
        let (svc, _) = service();
        let pair = svc.issue(&Principal::user(wallet())).await.unwrap();
        assert_eq!(svc.validate_access(pair.access.as_str()).unwrap(), Principal::user(wallet()));
        assert!(!pair.refresh.revoked);
    }

    #[tokio::test]
    async fn access_expires_strictly_before_refresh() {
        let (svc, _) = service();
        let pair = svc.issue(&Principal::user(wallet())).await.unwrap();
        assert!(pair.access.expires_at() < pair.refresh.expires_at);
    }

    #[tokio::test]
    async fn access_token_expires_with_the_clock() {
        let (svc, clock) = service();
        let pair = svc.issue(&Principal::user(wallet())).await.unwrap();
        clock.advance(Duration::hours(1) + Duration::seconds(1));
        assert_eq!(svc.validate_access(pair.access.as_str()), Err(AuthError::AccessExpired));
    }

    #[tokio::test]
    async fn tampered_or_foreign_tokens_are_invalid() {
        let (svc, clock) = service();
        let pair = svc.issue(&Principal::user(wallet())).await.unwrap();

        let mut tampered = pair.access.as_str().to_string();
        tampered.push('x');
        assert_eq!(svc.validate_access(&tampered), Err(AuthError::AccessInvalid));
        assert_eq!(svc.validate_access("not-a-jwt"), Err(AuthError::AccessInvalid));

        let other = TokenService::new(
            b"other-secret",
            TokenPolicy::default(),
            Arc::new(InMemoryRefreshTokenStore::new()),
            clock,
        )
        .unwrap();
        assert_eq!(other.validate_access(pair.access.as_str()), Err(AuthError::AccessInvalid));
    }

    #[tokio::test]
    async fn issuer_mismatch_is_invalid() {
        let (svc, clock) = service();
        let pair = svc.issue(&Principal::user(wallet())).await.unwrap();
        let policy = TokenPolicy {
            issuer: "someone-else".into(),
            ..TokenPolicy::default()
        };
        let other = TokenService::new(SECRET, policy, Arc::new(InMemoryRefreshTokenStore::new()), clock)
            .unwrap();
        assert_eq!(other.validate_access(pair.access.as_str()), Err(AuthError::AccessInvalid));
    }

    #[tokio::test]
    async fn rotate_mints_a_distinct_token_for_the_same_subject() {
        let (svc, clock) = service();
        let pair = svc.issue(&Principal::user(wallet())).await.unwrap();
        clock.advance(Duration::minutes(5));
        let rotated = svc.rotate(&pair.refresh.id).await.unwrap();
        assert_ne!(rotated.as_str(), pair.access.as_str());
        assert_eq!(rotated.claims().sub, wallet());
        assert!(rotated.expires_at() > pair.access.expires_at());
    }

    #[tokio::test]
    async fn rotate_within_the_same_second_still_differs() {
        let (svc, _) = service();
        let pair = svc.issue(&Principal::user(wallet())).await.unwrap();
        let a = svc.rotate(&pair.refresh.id).await.unwrap();
        let b = svc.rotate(&pair.refresh.id).await.unwrap();
        assert_ne!(a.as_str(), b.as_str());
    }

    #[tokio::test]
    async fn revocation_is_final_and_idempotent() {
        let (svc, _) = service();
        let pair = svc.issue(&Principal::user(wallet())).await.unwrap();
        assert!(svc.revoke(&pair.refresh.id).await.unwrap());
        assert!(svc.revoke(&pair.refresh.id).await.unwrap());
        assert_eq!(svc.rotate(&pair.refresh.id).await, Err(AuthError::RevokedToken));
        // The already-issued access token is independent of revocation.
        assert!(svc.validate_access(pair.access.as_str()).is_ok());
    }

    #[tokio::test]
    async fn unknown_and_expired_refresh_tokens_are_rejected() {
        let (svc, clock) = service();
        assert_eq!(
            svc.rotate(&RefreshTokenId::from_string("nope")).await,
            Err(AuthError::UnknownToken)
        );
        assert!(!svc.revoke(&RefreshTokenId::from_string("nope")).await.unwrap());

        let pair = svc.issue(&Principal::user(wallet())).await.unwrap();
        clock.advance(Duration::days(30));
        assert_eq!(svc.rotate(&pair.refresh.id).await, Err(AuthError::ExpiredToken));
    }

    #[tokio::test]
    async fn rotation_near_refresh_expiry_is_clamped() {
        let (svc, clock) = service();
        let pair = svc.issue(&Principal::user(wallet())).await.unwrap();
        clock.advance(Duration::days(30) - Duration::minutes(10));
        let access = svc.rotate(&pair.refresh.id).await.unwrap();
        assert!(access.expires_at() < pair.refresh.expires_at);
        assert!(access.expires_at() > clock.now());
    }

    #[test]
    fn policy_rejects_access_outliving_refresh() {
        let policy = TokenPolicy {
            access_ttl: Duration::days(2),
            refresh_ttl: Duration::days(1),
            ..TokenPolicy::default()
        };
        assert!(matches!(policy.validate(), Err(PolicyError::AccessOutlivesRefresh { .. })));

        let equal = TokenPolicy {
            access_ttl: Duration::days(1),
            refresh_ttl: Duration::days(1),
            ..TokenPolicy::default()
        };
        assert!(equal.validate().is_err());

        let zero = TokenPolicy {
            access_ttl: Duration::zero(),
            ..TokenPolicy::default()
        };
        assert_eq!(zero.validate(), Err(PolicyError::NonPositiveAccessTtl));
    }

    #[test]
    fn policy_bounds_token_lifetimes() {
        let huge = TokenPolicy {
            refresh_ttl: Duration::seconds(10_000_000_000_000),
            ..TokenPolicy::default()
        };
        assert!(matches!(huge.validate(), Err(PolicyError::TtlTooLong { .. })));

        let at_limit = TokenPolicy {
            refresh_ttl: Duration::seconds(MAX_TOKEN_TTL_SECS),
            ..TokenPolicy::default()
        };
        assert_eq!(at_limit.validate(), Ok(()));
    }

    #[tokio::test]
    async fn expiry_overflow_is_an_internal_error() {
        let clock = Arc::new(ManualClock::new(DateTime::<Utc>::MAX_UTC - Duration::days(1)));
        let svc = TokenService::new(
            SECRET,
            TokenPolicy::default(),
            Arc::new(InMemoryRefreshTokenStore::new()),
            clock,
        )
        .unwrap();
        let err = svc.issue(&Principal::user(wallet())).await.unwrap_err();
        assert!(matches!(err, AuthError::Internal(_)));
    }

    #[test]
    fn empty_secret_is_rejected() {
        let result = TokenService::new(
            b"",
            TokenPolicy::default(),
            Arc::new(InMemoryRefreshTokenStore::new()),
            Arc::new(ManualClock::starting_now()),
        );
        assert!(matches!(result, Err(PolicyError::EmptySecret)));
    }

    #[test]
    fn refresh_ids_are_random_and_long() {
        let a = RefreshTokenId::generate();
        assert_eq!(a.as_str().len(), 64);
        assert_ne!(a, RefreshTokenId::generate());
    }
}
