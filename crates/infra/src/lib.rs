//! Infrastructure adapters for the auth ports: Postgres, Redis, JSON-RPC.

pub mod chain;
pub mod postgres;

#[cfg(feature = "redis")]
pub mod redis;

pub use chain::JsonRpcChainState;
pub use postgres::PostgresAuthStore;

#[cfg(feature = "redis")]
pub use crate::redis::RedisChallengeStore;
