use serde::{Deserialize, Serialize};

use lockgate_auth::{AuthorizationTrace, Capability, CheckRecord};
use lockgate_core::Address;

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub message: String,
    pub signature: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessQuery {
    /// Comma-separated; any one of them suffices.
    pub capability: String,
    pub token_id: Option<String>,
}

// -------------------------
// Response DTOs
// -------------------------

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub wallet_address: Address,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessTokenResponse {
    pub access_token: String,
}

#[derive(Debug, Serialize)]
pub struct RevokeResponse {
    pub revoked: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessResponse {
    pub authorized: bool,
    pub capabilities: Vec<Capability>,
    pub checks: Vec<CheckRecord>,
}

impl From<AuthorizationTrace> for AccessResponse {
    fn from(trace: AuthorizationTrace) -> Self {
        Self {
            authorized: trace.granted,
            capabilities: trace.requested,
            checks: trace.checks,
        }
    }
}
