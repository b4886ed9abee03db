use axum::{
    Router,
    routing::{get, post},
};

pub mod auth;
pub mod system;

/// Unauthenticated endpoints: obtaining and managing credentials.
pub fn public_router() -> Router {
    Router::new()
        .route("/nonce", get(auth::nonce))
        .route("/login", post(auth::login))
        .route("/token", post(auth::refresh))
        .route("/revoke", post(auth::revoke))
}

/// Endpoints that require a resolved principal.
pub fn protected_router() -> Router {
    Router::new()
        .route("/user", get(system::whoami))
        .route("/access/:network/:lock_address", get(auth::access))
}
