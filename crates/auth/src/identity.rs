//! Credential extraction and identity resolution.
//!
//! Identity only: nothing here decides what a principal may do.

use std::sync::Arc;

use tracing::{debug, instrument};

use crate::error::AuthError;
use crate::principal::{ApiKey, Principal};
use crate::store::ApplicationStore;
use crate::tokens::TokenService;

/// Raw credential presented by a caller.
#[derive(Clone, PartialEq, Eq)]
pub enum Credential {
    Bearer(String),
    ApiKey(String),
    /// Something was presented but it is not a usable credential.
    Malformed,
    None,
}

impl Credential {
    /// Build a credential from the `Authorization` header and the `api-key`
    /// query parameter.
    ///
    /// Schemes are matched case-insensitively (`Bearer`, `Api-key`). A present
    /// header always wins; an unrecognised scheme is [`Credential::Malformed`]
    /// and does not fall through to the query parameter. Credential values are
    /// taken verbatim; surrounding whitespace makes them fail validation.
    pub fn from_request_parts(authorization: Option<&str>, api_key_query: Option<&str>) -> Self {
        if let Some(header) = authorization {
            return Self::from_authorization_header(header);
        }
        match api_key_query {
            Some("") => Credential::Malformed,
            Some(key) => Credential::ApiKey(key.to_string()),
            None => Credential::None,
        }
    }

    fn from_authorization_header(header: &str) -> Self {
        let Some((scheme, value)) = header.trim().split_once(' ') else {
            return Credential::Malformed;
        };
        if value.is_empty() {
            return Credential::Malformed;
        }
        if scheme.eq_ignore_ascii_case("bearer") {
            Credential::Bearer(value.to_string())
        } else if scheme.eq_ignore_ascii_case("api-key") {
            Credential::ApiKey(value.to_string())
        } else {
            Credential::Malformed
        }
    }
}

impl core::fmt::Debug for Credential {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Credential::Bearer(_) => f.write_str("Bearer([REDACTED])"),
            Credential::ApiKey(_) => f.write_str("ApiKey([REDACTED])"),
            Credential::Malformed => f.write_str("Malformed"),
            Credential::None => f.write_str("None"),
        }
    }
}

pub struct IdentityResolver {
    tokens: Arc<TokenService>,
    applications: Arc<dyn ApplicationStore>,
}

impl IdentityResolver {
    pub fn new(tokens: Arc<TokenService>, applications: Arc<dyn ApplicationStore>) -> Self {
        Self {
            tokens,
            applications,
        }
    }

    /// Map a credential to a principal.
    ///
    /// Access-token expiry surfaces as [`AuthError::AccessExpired`]; every
    /// other rejection is in the `Unauthenticated` category.
    #[instrument(skip_all, fields(scheme = credential_scheme(credential)))]
    pub async fn resolve(&self, credential: &Credential) -> Result<Principal, AuthError> {
        match credential {
            Credential::None => Err(AuthError::MissingCredential),
            Credential::Malformed => Err(AuthError::Unauthenticated("malformed credential".into())),
            Credential::Bearer(token) => self.tokens.validate_access(token),
            Credential::ApiKey(raw) => {
                let key = ApiKey::parse(raw)
                    .map_err(|_| AuthError::Unauthenticated("malformed api key".into()))?;
                let application = self
                    .applications
                    .find_by_api_key(&key)
                    .await?
                    .ok_or_else(|| {
                        debug!("api key did not match any application");
                        AuthError::Unauthenticated("unknown api key".into())
                    })?;
                Ok(Principal::Application {
                    application_id: application.id,
                    wallet_address: application.wallet_address,
                    api_key: key,
                })
            }
        }
    }
}

fn credential_scheme(credential: &Credential) -> &'static str {
    match credential {
        Credential::Bearer(_) => "bearer",
        Credential::ApiKey(_) => "api-key",
        Credential::Malformed => "malformed",
        Credential::None => "none",
    }
}
