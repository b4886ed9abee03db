//! HTTP API application wiring (Axum router + service wiring).
//!
//! - `services.rs`: adapter selection and auth service construction
//! - `routes/`: HTTP routes + handlers
//! - `dto.rs`: request/response DTOs
//! - `errors.rs`: consistent error responses

use std::sync::Arc;

use axum::{Extension, Router, routing::get};
use tower::ServiceBuilder;

use crate::middleware;

pub mod dto;
pub mod errors;
pub mod purge;
pub mod routes;
pub mod services;

pub use purge::{ChallengePurge, PurgeHandle};
pub use services::{AuthServices, Collaborators, build_services};

/// Build the full HTTP router (public entrypoint used by `main.rs`).
pub fn build_app(services: Arc<AuthServices>) -> Router {
    let auth_state = middleware::AuthState {
        services: services.clone(),
    };

    // Protected routes: require a resolved principal.
    let protected = routes::protected_router().layer(axum::middleware::from_fn_with_state(
        auth_state,
        middleware::auth_middleware,
    ));

    Router::new()
        .route("/health", get(routes::system::health))
        .nest("/v2/auth", routes::public_router().merge(protected))
        .layer(ServiceBuilder::new().layer(Extension(services)))
}
