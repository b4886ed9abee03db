use thiserror::Error;

use crate::chain::ChainStateError;
use crate::store::StoreError;

/// Every way an authentication or authorization step can fail.
///
/// Variants keep the precise cause for logs; [`AuthError::category`] collapses
/// them into the small set of outcomes callers are allowed to see.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("no credential supplied")]
    MissingCredential,

    #[error("unauthenticated: {0}")]
    Unauthenticated(String),

    #[error("malformed sign-in message: {0}")]
    InvalidMessage(String),

    #[error("signature does not match the declared address")]
    InvalidSignature,

    #[error("sign-in challenge has expired")]
    ExpiredChallenge,

    #[error("sign-in message was already used")]
    ReplayDetected,

    #[error("access token has expired")]
    AccessExpired,

    #[error("access token is invalid")]
    AccessInvalid,

    #[error("refresh token not found")]
    UnknownToken,

    #[error("refresh token has expired")]
    ExpiredToken,

    #[error("refresh token has been revoked")]
    RevokedToken,

    #[error("forbidden: missing capability '{0}'")]
    Forbidden(String),

    #[error("upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("internal error: {0}")]
    Internal(String),
}

/// Caller-visible outcome classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    Unauthenticated,
    ReplayDetected,
    Expired,
    Revoked,
    Forbidden,
    UpstreamUnavailable,
    Internal,
}

impl AuthError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            AuthError::MissingCredential
            | AuthError::Unauthenticated(_)
            | AuthError::InvalidMessage(_)
            | AuthError::InvalidSignature
            | AuthError::AccessInvalid
            | AuthError::UnknownToken => ErrorCategory::Unauthenticated,
            AuthError::ExpiredChallenge | AuthError::AccessExpired | AuthError::ExpiredToken => {
                ErrorCategory::Expired
            }
            AuthError::RevokedToken => ErrorCategory::Revoked,
            AuthError::ReplayDetected => ErrorCategory::ReplayDetected,
            AuthError::Forbidden(_) => ErrorCategory::Forbidden,
            AuthError::UpstreamUnavailable(_) => ErrorCategory::UpstreamUnavailable,
            AuthError::Internal(_) => ErrorCategory::Internal,
        }
    }

    /// Short machine-readable code for logs and error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            AuthError::MissingCredential => "missing_credential",
            AuthError::Unauthenticated(_) => "unauthenticated",
            AuthError::InvalidMessage(_) => "invalid_message",
            AuthError::InvalidSignature => "invalid_signature",
            AuthError::ExpiredChallenge => "expired_challenge",
            AuthError::ReplayDetected => "replay_detected",
            AuthError::AccessExpired => "access_expired",
            AuthError::AccessInvalid => "access_invalid",
            AuthError::UnknownToken => "unknown_token",
            AuthError::ExpiredToken => "expired_token",
            AuthError::RevokedToken => "revoked_token",
            AuthError::Forbidden(_) => "forbidden",
            AuthError::UpstreamUnavailable(_) => "upstream_unavailable",
            AuthError::Internal(_) => "internal",
        }
    }
}

impl From<StoreError> for AuthError {
    fn from(value: StoreError) -> Self {
        AuthError::UpstreamUnavailable(value.to_string())
    }
}

impl From<ChainStateError> for AuthError {
    fn from(value: ChainStateError) -> Self {
        AuthError::UpstreamUnavailable(value.to_string())
    }
}
