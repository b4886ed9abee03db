use std::sync::Arc;

use axum::{
    Extension, Json,
    extract::{
        Path, Query,
        rejection::{JsonRejection, QueryRejection},
    },
    response::{IntoResponse, Response},
};

use lockgate_auth::{Capability, RefreshTokenId, Resource};
use lockgate_core::{Address, ChainNetwork, TokenId};

use crate::app::dto::{
    AccessQuery, AccessResponse, AccessTokenResponse, LoginRequest, LoginResponse, RefreshRequest,
    RevokeResponse,
};
use crate::app::errors::{auth_error_to_response, bad_request};
use crate::app::services::AuthServices;
use crate::context::PrincipalContext;

pub async fn nonce(Extension(services): Extension<Arc<AuthServices>>) -> String {
    services.nonces.issue()
}

pub async fn login(
    Extension(services): Extension<Arc<AuthServices>>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Response {
    let Json(req) = match payload {
        Ok(p) => p,
        Err(e) => return bad_request(e.body_text()),
    };

    let principal = match services.login.login(&req.message, &req.signature).await {
        Ok(p) => p,
        Err(e) => return auth_error_to_response(&e),
    };

    match services.tokens.issue(&principal).await {
        Ok(pair) => Json(LoginResponse {
            access_token: pair.access.as_str().to_string(),
            refresh_token: pair.refresh.id.to_string(),
            wallet_address: principal.wallet_address(),
        })
        .into_response(),
        Err(e) => auth_error_to_response(&e),
    }
}

pub async fn refresh(
    Extension(services): Extension<Arc<AuthServices>>,
    payload: Result<Json<RefreshRequest>, JsonRejection>,
) -> Response {
    let Json(req) = match payload {
        Ok(p) => p,
        Err(e) => return bad_request(e.body_text()),
    };

    match services.tokens.rotate(&RefreshTokenId::from_string(req.refresh_token)).await {
        Ok(access) => Json(AccessTokenResponse {
            access_token: access.as_str().to_string(),
        })
        .into_response(),
        Err(e) => auth_error_to_response(&e),
    }
}

pub async fn revoke(
    Extension(services): Extension<Arc<AuthServices>>,
    payload: Result<Json<RefreshRequest>, JsonRejection>,
) -> Response {
    let Json(req) = match payload {
        Ok(p) => p,
        Err(e) => return bad_request(e.body_text()),
    };

    match services.tokens.revoke(&RefreshTokenId::from_string(req.refresh_token)).await {
        Ok(revoked) => Json(RevokeResponse { revoked }).into_response(),
        Err(e) => auth_error_to_response(&e),
    }
}

pub async fn access(
    Extension(services): Extension<Arc<AuthServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path((network, lock_address)): Path<(String, String)>,
    query: Result<Query<AccessQuery>, QueryRejection>,
) -> Response {
    let Query(query) = match query {
        Ok(q) => q,
        Err(e) => return bad_request(e.body_text()),
    };
    let resource = match parse_resource(&network, &lock_address, query.token_id.as_deref()) {
        Ok(r) => r,
        Err(resp) => return resp,
    };
    let capabilities = match parse_capabilities(&query.capability) {
        Ok(c) => c,
        Err(resp) => return resp,
    };

    match services
        .authorization
        .require(principal.principal(), &resource, &capabilities)
        .await
    {
        Ok(trace) => Json(AccessResponse::from(trace)).into_response(),
        Err(e) => auth_error_to_response(&e),
    }
}

fn parse_resource(network: &str, lock_address: &str, token_id: Option<&str>) -> Result<Resource, Response> {
    let network: ChainNetwork = network
        .parse()
        .map_err(|_| bad_request(format!("invalid network '{network}'")))?;
    let lock_address: Address = lock_address
        .parse()
        .map_err(|_| bad_request(format!("invalid lock address '{lock_address}'")))?;
    let token_id = token_id
        .map(|raw| {
            raw.parse::<TokenId>()
                .map_err(|_| bad_request(format!("invalid tokenId '{raw}'")))
        })
        .transpose()?;

    Ok(Resource {
        network,
        lock_address,
        token_id,
    })
}

fn parse_capabilities(raw: &str) -> Result<Vec<Capability>, Response> {
    let capabilities = raw
        .split(',')
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(|c| c.parse::<Capability>().map_err(|e| bad_request(e.to_string())))
        .collect::<Result<Vec<_>, _>>()?;
    if capabilities.is_empty() {
        return Err(bad_request("capability must name at least one of: manage, own, verify"));
    }
    Ok(capabilities)
}
