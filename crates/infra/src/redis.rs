//! Redis-backed consumed-challenge store.
//!
//! `SET key 1 NX PX <ttl>` is the compare-and-set: Redis replies `OK` to the
//! first writer and nil to everyone else. Keys expire on their own once the
//! challenge could no longer be accepted.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{debug, instrument};

use lockgate_auth::challenge::ChallengeFingerprint;
use lockgate_auth::store::{ChallengeStore, StoreError};

/// Default key prefix for consumed challenges.
const DEFAULT_KEY_PREFIX: &str = "lockgate:challenge:";

/// Floor for key lifetimes so clock skew between nodes cannot drop a record early.
const MIN_TTL_MS: i64 = 1_000;

#[derive(Debug, Clone)]
pub struct RedisChallengeStore {
    client: Arc<::redis::Client>,
    key_prefix: String,
}

impl RedisChallengeStore {
    /// # Arguments
    ///
    /// * `redis_url` - Redis connection URL (e.g., "redis://localhost:6379")
    /// * `key_prefix` - key namespace (default: "lockgate:challenge:")
    pub fn new(redis_url: impl AsRef<str>, key_prefix: Option<String>) -> Result<Self, StoreError> {
        let client = ::redis::Client::open(redis_url.as_ref())
            .map_err(|e| StoreError::Unavailable(format!("redis connection error: {e}")))?;
        Ok(Self {
            client: Arc::new(client),
            key_prefix: key_prefix.unwrap_or_else(|| DEFAULT_KEY_PREFIX.to_string()),
        })
    }

    fn key(&self, fingerprint: &ChallengeFingerprint) -> String {
        format!("{}{}", self.key_prefix, fingerprint.to_hex())
    }
}

fn ttl_millis(expires_at: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    (expires_at - now).num_milliseconds().max(MIN_TTL_MS)
}

#[async_trait]
impl ChallengeStore for RedisChallengeStore {
    #[instrument(skip(self, fingerprint), fields(fingerprint = %fingerprint.to_hex()), err)]
    async fn consume(
        &self,
        fingerprint: &ChallengeFingerprint,
        expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let mut conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| StoreError::Unavailable(format!("redis connection error: {e}")))?;

        let reply: Option<String> = ::redis::cmd("SET")
            .arg(self.key(fingerprint))
            .arg(1)
            .arg("NX")
            .arg("PX")
            .arg(ttl_millis(expires_at, now))
            .query_async(&mut conn)
            .await
            .map_err(|e| StoreError::Unavailable(format!("redis command error: {e}")))?;

        let first = reply.is_some();
        debug!(first, "challenge consume");
        Ok(first)
    }

    /// Keys carry their own TTL; nothing to sweep.
    async fn purge_expired(&self, _now: DateTime<Utc>) -> Result<u64, StoreError> {
        Ok(0)
    }
}
