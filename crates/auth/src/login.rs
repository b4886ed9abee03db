//! Challenge/response login.

use std::sync::Arc;

use tracing::{debug, info, instrument, warn};

use lockgate_core::Clock;

use crate::challenge::ChallengeFingerprint;
use crate::error::AuthError;
use crate::principal::Principal;
use crate::signature::recover_personal_signer;
use crate::siwe::SignInMessage;
use crate::store::ChallengeStore;

/// Validates signed sign-in messages and produces user principals.
pub struct LoginService {
    challenges: Arc<dyn ChallengeStore>,
    clock: Arc<dyn Clock>,
    expected_domain: Option<String>,
}

impl LoginService {
    pub fn new(challenges: Arc<dyn ChallengeStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            challenges,
            clock,
            expected_domain: None,
        }
    }

    /// Only accept messages whose domain equals `domain`.
    pub fn with_expected_domain(mut self, domain: impl Into<String>) -> Self {
        self.expected_domain = Some(domain.into());
        self
    }

    /// Verify `message` was signed by the address it declares and consume it.
    ///
    /// The consume step is the single atomic decision point: of any number of
    /// concurrent submissions of the same challenge, exactly one succeeds.
    #[instrument(skip_all, fields(address))]
    pub async fn login(&self, message: &str, signature: &str) -> Result<Principal, AuthError> {
        let parsed = SignInMessage::parse(message).map_err(|e| {
            debug!(error = %e, "rejecting unparseable sign-in message");
            AuthError::InvalidMessage(e.to_string())
        })?;
        tracing::Span::current().record("address", tracing::field::display(&parsed.address));

        if let Some(expected) = &self.expected_domain {
            if parsed.domain != *expected {
                return Err(AuthError::InvalidMessage(format!(
                    "domain '{}' is not accepted",
                    parsed.domain
                )));
            }
        }

        let now = self.clock.now();
        if now > parsed.expiration_time {
            return Err(AuthError::ExpiredChallenge);
        }
        if parsed.not_before.is_some_and(|nb| now < nb) {
            return Err(AuthError::InvalidMessage("message is not valid yet".into()));
        }

        let signer = recover_personal_signer(message.as_bytes(), signature).map_err(|e| {
            debug!(error = %e, "signature recovery failed");
            AuthError::InvalidSignature
        })?;
        if signer != parsed.address {
            debug!(recovered = %signer, "recovered signer differs from declared address");
            return Err(AuthError::InvalidSignature);
        }

        let fingerprint = ChallengeFingerprint::for_challenge(&parsed.address, &parsed.nonce);
        let first_use = self
            .challenges
            .consume(&fingerprint, parsed.expiration_time, now)
            .await?;
        if !first_use {
            warn!(fingerprint = %fingerprint.to_hex(), "sign-in message replayed");
            return Err(AuthError::ReplayDetected);
        }

        info!("wallet signed in");
        Ok(Principal::user(parsed.address))
    }
}
