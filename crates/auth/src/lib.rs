//! `lockgate-auth`: wallet authentication and capability authorization.
//!
//! Decoupled from HTTP and storage: collaborators (stores, chain state,
//! clock) are traits injected at construction.

pub mod authorize;
pub mod chain;
pub mod challenge;
pub mod claims;
pub mod error;
pub mod identity;
pub mod login;
pub mod memory;
pub mod principal;
pub mod signature;
pub mod siwe;
pub mod store;
pub mod tokens;

pub use authorize::{
    AuthorizationResolver, AuthorizationTrace, Capability, CheckKind, CheckOutcome, CheckRecord,
    Resource, UnknownCapability,
};
pub use chain::{ChainState, ChainStateError};
pub use challenge::{ChallengeFingerprint, ChallengeTemplate, NonceIssuer};
pub use claims::{AccessClaims, TokenValidationError, validate_claims};
pub use error::{AuthError, ErrorCategory};
pub use identity::{Credential, IdentityResolver};
pub use login::LoginService;
pub use principal::{ApiKey, MalformedApiKey, Principal};
pub use siwe::{MessageError, SignInMessage};
pub use store::{
    Application, ApplicationStore, ChallengeStore, IntegrationRegistry, RefreshTokenStore,
    StoreError, Verifier, VerifierStore,
};
pub use tokens::{
    AccessToken, PolicyError, RefreshToken, RefreshTokenId, RefreshTokenState, TokenPair,
    TokenPolicy, TokenService,
};
