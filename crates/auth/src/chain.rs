//! On-chain state port (the authoritative, slow source of truth).

use async_trait::async_trait;
use thiserror::Error;

use lockgate_core::{Address, ChainNetwork, TokenId};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ChainStateError {
    #[error("no RPC provider configured for network {0}")]
    UnsupportedNetwork(ChainNetwork),

    /// The node answered with an error (including contract reverts).
    #[error("rpc error: {0}")]
    Rpc(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("could not decode rpc response: {0}")]
    Decode(String),
}

/// Read-only view of lock contracts.
///
/// Implementations should not retry internally on behalf of the auth layer;
/// callers bound every call with a timeout and treat any error as "no".
#[async_trait]
pub trait ChainState: Send + Sync {
    async fn is_lock_manager(
        &self,
        lock_address: &Address,
        address: &Address,
        network: ChainNetwork,
    ) -> Result<bool, ChainStateError>;

    async fn owner_of(
        &self,
        lock_address: &Address,
        token_id: &TokenId,
        network: ChainNetwork,
    ) -> Result<Address, ChainStateError>;
}
