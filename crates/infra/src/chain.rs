//! JSON-RPC (`eth_call`) chain-state client.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, instrument};

use lockgate_auth::chain::{ChainState, ChainStateError};
use lockgate_core::{Address, ChainNetwork, TokenId, keccak256};

const IS_LOCK_MANAGER: &str = "isLockManager(address)";
const OWNER_OF: &str = "ownerOf(uint256)";

/// Transport-level ceiling; callers apply their own, usually tighter, timeout.
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Reads lock state through one JSON-RPC endpoint per network.
#[derive(Debug)]
pub struct JsonRpcChainState {
    client: reqwest::Client,
    endpoints: HashMap<ChainNetwork, String>,
    next_id: AtomicU64,
}

#[derive(Debug, Serialize)]
struct RpcRequest {
    jsonrpc: &'static str,
    id: u64,
    method: &'static str,
    params: Value,
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<String>,
    #[serde(default)]
    error: Option<RpcErrorObject>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorObject {
    code: i64,
    message: String,
}

impl JsonRpcChainState {
    pub fn new(
        endpoints: impl IntoIterator<Item = (ChainNetwork, String)>,
    ) -> Result<Self, ChainStateError> {
        let client = reqwest::Client::builder()
            .timeout(DEFAULT_HTTP_TIMEOUT)
            .build()
            .map_err(|e| ChainStateError::Transport(format!("failed to create HTTP client: {e}")))?;
        Ok(Self {
            client,
            endpoints: endpoints.into_iter().collect(),
            next_id: AtomicU64::new(1),
        })
    }

    pub fn networks(&self) -> impl Iterator<Item = ChainNetwork> + '_ {
        self.endpoints.keys().copied()
    }

    /// `eth_call` against `to` at the latest block; returns the raw return data.
    async fn eth_call(
        &self,
        network: ChainNetwork,
        to: &Address,
        data: Vec<u8>,
    ) -> Result<Vec<u8>, ChainStateError> {
        let endpoint = self
            .endpoints
            .get(&network)
            .ok_or(ChainStateError::UnsupportedNetwork(network))?;

        let request = RpcRequest {
            jsonrpc: "2.0",
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            method: "eth_call",
            params: json!([
                { "to": to.to_lower_hex(), "data": format!("0x{}", hex::encode(data)) },
                "latest"
            ]),
        };

        let response = self
            .client
            .post(endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| ChainStateError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            return Err(ChainStateError::Transport(format!(
                "rpc endpoint returned HTTP {}",
                response.status()
            )));
        }

        let body: RpcResponse = response
            .json()
            .await
            .map_err(|e| ChainStateError::Decode(e.to_string()))?;
        decode_result(body)
    }
}

fn selector(signature: &str) -> [u8; 4] {
    let hash = keccak256(signature.as_bytes());
    [hash[0], hash[1], hash[2], hash[3]]
}

fn address_word(address: &Address) -> [u8; 32] {
    let mut word = [0u8; 32];
    word[12..].copy_from_slice(address.as_bytes());
    word
}

fn encode_call(signature: &str, word: [u8; 32]) -> Vec<u8> {
    let mut data = Vec::with_capacity(36);
    data.extend_from_slice(&selector(signature));
    data.extend_from_slice(&word);
    data
}

fn decode_result(body: RpcResponse) -> Result<Vec<u8>, ChainStateError> {
    if let Some(err) = body.error {
        return Err(ChainStateError::Rpc(format!("{} (code {})", err.message, err.code)));
    }
    let result = body
        .result
        .ok_or_else(|| ChainStateError::Decode("response has neither result nor error".into()))?;
    let digits = result.strip_prefix("0x").unwrap_or(&result);
    hex::decode(digits).map_err(|e| ChainStateError::Decode(format!("result is not hex: {e}")))
}

fn first_word(data: &[u8]) -> Result<[u8; 32], ChainStateError> {
    // Empty return data is what a call to a non-contract address yields.
    if data.len() < 32 {
        return Err(ChainStateError::Decode(format!(
            "expected a 32-byte word, got {} bytes",
            data.len()
        )));
    }
    let mut word = [0u8; 32];
    word.copy_from_slice(&data[..32]);
    Ok(word)
}

fn decode_bool(data: &[u8]) -> Result<bool, ChainStateError> {
    let word = first_word(data)?;
    match (word[..31].iter().all(|b| *b == 0), word[31]) {
        (true, 0) => Ok(false),
        (true, 1) => Ok(true),
        _ => Err(ChainStateError::Decode("word is not an ABI bool".into())),
    }
}

fn decode_address(data: &[u8]) -> Result<Address, ChainStateError> {
    let word = first_word(data)?;
    if word[..12].iter().any(|b| *b != 0) {
        return Err(ChainStateError::Decode("word is not an ABI address".into()));
    }
    Ok(Address::from_word(&word))
}

#[async_trait]
impl ChainState for JsonRpcChainState {
    #[instrument(skip(self), err)]
    async fn is_lock_manager(
        &self,
        lock_address: &Address,
        address: &Address,
        network: ChainNetwork,
    ) -> Result<bool, ChainStateError> {
        let data = encode_call(IS_LOCK_MANAGER, address_word(address));
        let out = self.eth_call(network, lock_address, data).await?;
        let is_manager = decode_bool(&out)?;
        debug!(is_manager, "isLockManager");
        Ok(is_manager)
    }

    #[instrument(skip(self), err)]
    async fn owner_of(
        &self,
        lock_address: &Address,
        token_id: &TokenId,
        network: ChainNetwork,
    ) -> Result<Address, ChainStateError> {
        let data = encode_call(OWNER_OF, token_id.to_be_bytes());
        let out = self.eth_call(network, lock_address, data).await?;
        decode_address(&out)
    }
}
