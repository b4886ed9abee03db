use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use lockgate_auth::{AuthError, ErrorCategory};

/// Collapse an auth failure into its caller-visible status.
///
/// The detailed variant is logged and used as the `error` code; the status
/// only reflects the category.
pub fn auth_error_to_response(err: &AuthError) -> axum::response::Response {
    let status = status_for(err.category());
    if status.is_server_error() {
        tracing::warn!(code = err.code(), error = %err, "auth request failed upstream");
    } else {
        tracing::debug!(code = err.code(), error = %err, "auth request rejected");
    }
    json_error(status, err.code(), public_message(err))
}

pub fn status_for(category: ErrorCategory) -> StatusCode {
    match category {
        ErrorCategory::Unauthenticated | ErrorCategory::Expired | ErrorCategory::Revoked => {
            StatusCode::UNAUTHORIZED
        }
        ErrorCategory::ReplayDetected => StatusCode::UNPROCESSABLE_ENTITY,
        ErrorCategory::Forbidden => StatusCode::FORBIDDEN,
        ErrorCategory::UpstreamUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        ErrorCategory::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Upstream and internal details stay in the logs.
fn public_message(err: &AuthError) -> String {
    match err {
        AuthError::UpstreamUnavailable(_) => "a backing service is unavailable".to_string(),
        AuthError::Internal(_) => "internal error".to_string(),
        other => other.to_string(),
    }
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}

pub fn bad_request(message: impl Into<String>) -> axum::response::Response {
    json_error(StatusCode::BAD_REQUEST, "invalid_request", message)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn categories_map_to_statuses() {
        assert_eq!(status_for(AuthError::ReplayDetected.category()), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(status_for(AuthError::MissingCredential.category()), StatusCode::UNAUTHORIZED);
        assert_eq!(status_for(AuthError::RevokedToken.category()), StatusCode::UNAUTHORIZED);
        assert_eq!(
            status_for(AuthError::Forbidden("manage".into()).category()),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            status_for(AuthError::UpstreamUnavailable("db".into()).category()),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn upstream_details_are_not_exposed() {
        let err = AuthError::UpstreamUnavailable("postgres://user:pw@db".into());
        assert!(!public_message(&err).contains("postgres"));
    }
}
