use std::sync::Arc;

use axum::{
    extract::{Query, Request, State},
    http::{HeaderMap, Uri, header},
    middleware::Next,
    response::Response,
};
use serde::Deserialize;

use lockgate_auth::Credential;

use crate::app::errors::auth_error_to_response;
use crate::app::services::AuthServices;
use crate::context::PrincipalContext;

#[derive(Clone)]
pub struct AuthState {
    pub services: Arc<AuthServices>,
}

pub async fn auth_middleware(State(state): State<AuthState>, mut req: Request, next: Next) -> Response {
    let credential = extract_credential(req.headers(), req.uri());

    let principal = match state.services.identity.resolve(&credential).await {
        Ok(p) => p,
        Err(e) => return auth_error_to_response(&e),
    };

    req.extensions_mut().insert(PrincipalContext::new(principal));
    next.run(req).await
}

#[derive(Debug, Deserialize)]
struct CredentialQuery {
    #[serde(rename = "api-key")]
    api_key: Option<String>,
}

fn extract_credential(headers: &HeaderMap, uri: &Uri) -> Credential {
    match headers.get(header::AUTHORIZATION) {
        Some(value) => match value.to_str() {
            Ok(value) => Credential::from_request_parts(Some(value), None),
            Err(_) => Credential::Malformed,
        },
        None => {
            let api_key = Query::<CredentialQuery>::try_from_uri(uri)
                .ok()
                .and_then(|Query(q)| q.api_key);
            Credential::from_request_parts(None, api_key.as_deref())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn query_key_is_used_only_without_header() {
        let uri: Uri = "/v2/auth/user?api-key=k1".parse().unwrap();
        assert_eq!(
            extract_credential(&HeaderMap::new(), &uri),
            Credential::ApiKey("k1".into())
        );

        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer t1"));
        assert_eq!(extract_credential(&headers, &uri), Credential::Bearer("t1".into()));
    }

    #[test]
    fn query_key_is_decoded_verbatim() {
        let uri: Uri = "/v2/auth/user?api-key=%20k1%09".parse().unwrap();
        assert_eq!(
            extract_credential(&HeaderMap::new(), &uri),
            Credential::ApiKey(" k1\t".into())
        );
    }

    #[test]
    fn no_credential_is_none() {
        let uri: Uri = "/v2/auth/user?capability=manage".parse().unwrap();
        assert_eq!(extract_credential(&HeaderMap::new(), &uri), Credential::None);
    }
}
