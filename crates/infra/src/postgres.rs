//! Postgres-backed auth stores.
//!
//! One pool serves all four store ports. Both shared mutable resources are
//! decided by a single statement each, so concurrent instances agree:
//!
//! | Operation | Statement | Decision |
//! |-----------|-----------|----------|
//! | consume challenge | `INSERT … ON CONFLICT DO NOTHING` | `rows_affected() == 1` |
//! | revoke refresh token | `UPDATE … SET revoked = TRUE` | `rows_affected() > 0` |
//!
//! ## Error Mapping
//!
//! | SQLx error | StoreError |
//! |------------|------------|
//! | Database, code `23505` (unique violation) | `AlreadyExists` |
//! | Row decode failures | `Corrupt` |
//! | Anything else (pool closed, io, timeouts) | `Unavailable` |

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use tracing::{debug, instrument};

use lockgate_auth::challenge::ChallengeFingerprint;
use lockgate_auth::principal::ApiKey;
use lockgate_auth::store::{
    Application, ApplicationStore, ChallengeStore, RefreshTokenStore, StoreError, Verifier,
    VerifierStore,
};
use lockgate_auth::tokens::{RefreshToken, RefreshTokenId};
use lockgate_core::{Address, ApplicationId, ChainNetwork};

const SCHEMA: &[(&str, &str)] = &[
    (
        "consumed_challenges",
        r#"
        CREATE TABLE IF NOT EXISTS consumed_challenges (
            fingerprint BYTEA PRIMARY KEY,
            expires_at  TIMESTAMPTZ NOT NULL,
            consumed_at TIMESTAMPTZ NOT NULL DEFAULT now()
        )
        "#,
    ),
    (
        "refresh_tokens",
        r#"
        CREATE TABLE IF NOT EXISTS refresh_tokens (
            id         TEXT PRIMARY KEY,
            subject    TEXT NOT NULL,
            issued_at  TIMESTAMPTZ NOT NULL,
            expires_at TIMESTAMPTZ NOT NULL,
            revoked    BOOLEAN NOT NULL DEFAULT FALSE
        )
        "#,
    ),
    (
        "applications",
        r#"
        CREATE TABLE IF NOT EXISTS applications (
            id             UUID PRIMARY KEY,
            name           TEXT NOT NULL,
            wallet_address TEXT NOT NULL,
            api_key        TEXT NOT NULL UNIQUE,
            created_at     TIMESTAMPTZ NOT NULL
        )
        "#,
    ),
    (
        "lock_verifiers",
        r#"
        CREATE TABLE IF NOT EXISTS lock_verifiers (
            lock_address TEXT NOT NULL,
            address      TEXT NOT NULL,
            network      BIGINT NOT NULL,
            name         TEXT NULL,
            PRIMARY KEY (lock_address, address, network)
        )
        "#,
    ),
];

/// All auth stores over one Postgres pool.
///
/// Addresses are stored as lowercase hex so lookups never depend on the
/// checksum casing a client happened to send.
#[derive(Debug, Clone)]
pub struct PostgresAuthStore {
    pool: Arc<PgPool>,
}

impl PostgresAuthStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPool::connect(database_url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self::new(pool))
    }

    /// Create the auth tables if they do not exist.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        for &(table, ddl) in SCHEMA {
            sqlx::query(ddl)
                .execute(&*self.pool)
                .await
                .map_err(|e| map_sqlx_error(table, e))?;
        }
        Ok(())
    }

    #[instrument(skip(self, application), fields(application_id = %application.id), err)]
    pub async fn insert_application(&self, application: &Application) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO applications (id, name, wallet_address, api_key, created_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(application.id.as_uuid())
        .bind(&application.name)
        .bind(application.wallet_address.to_lower_hex())
        .bind(&application.api_key)
        .bind(application.created_at)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert_application", e))?;
        Ok(())
    }

    #[instrument(skip(self), err)]
    pub async fn delete_application(&self, id: ApplicationId) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM applications WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("delete_application", e))?;
        Ok(result.rows_affected() > 0)
    }

    /// Insert or rename a verifier.
    #[instrument(skip(self, verifier), fields(lock = %verifier.lock_address, network = %verifier.network), err)]
    pub async fn upsert_verifier(&self, verifier: &Verifier) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO lock_verifiers (lock_address, address, network, name)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (lock_address, address, network) DO UPDATE SET name = EXCLUDED.name
            "#,
        )
        .bind(verifier.lock_address.to_lower_hex())
        .bind(verifier.address.to_lower_hex())
        .bind(network_to_db(verifier.network)?)
        .bind(&verifier.name)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("upsert_verifier", e))?;
        Ok(())
    }
}

#[async_trait]
impl ChallengeStore for PostgresAuthStore {
    #[instrument(skip(self, fingerprint), fields(fingerprint = %fingerprint.to_hex()), err)]
    async fn consume(
        &self,
        fingerprint: &ChallengeFingerprint,
        expires_at: DateTime<Utc>,
        _now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO consumed_challenges (fingerprint, expires_at)
            VALUES ($1, $2)
            ON CONFLICT (fingerprint) DO NOTHING
            "#,
        )
        .bind(fingerprint.as_bytes().as_slice())
        .bind(expires_at)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("consume_challenge", e))?;

        let first = result.rows_affected() == 1;
        debug!(first, "challenge consume");
        Ok(first)
    }

    #[instrument(skip(self), err)]
    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM consumed_challenges WHERE expires_at < $1")
            .bind(now)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("purge_expired_challenges", e))?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl RefreshTokenStore for PostgresAuthStore {
    #[instrument(skip(self, token), fields(subject = %token.subject), err)]
    async fn insert(&self, token: &RefreshToken) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO refresh_tokens (id, subject, issued_at, expires_at, revoked)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(token.id.as_str())
        .bind(token.subject.to_lower_hex())
        .bind(token.issued_at)
        .bind(token.expires_at)
        .bind(token.revoked)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert_refresh_token", e))?;
        Ok(())
    }

    #[instrument(skip_all, err)]
    async fn get(&self, id: &RefreshTokenId) -> Result<Option<RefreshToken>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT id, subject, issued_at, expires_at, revoked
            FROM refresh_tokens
            WHERE id = $1
            "#,
        )
        .bind(id.as_str())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("get_refresh_token", e))?;

        let Some(row) = row else {
            return Ok(None);
        };
        let subject: String = row.try_get("subject").map_err(corrupt)?;
        Ok(Some(RefreshToken {
            id: RefreshTokenId::from_string(row.try_get::<String, _>("id").map_err(corrupt)?),
            subject: parse_address(&subject)?,
            issued_at: row.try_get("issued_at").map_err(corrupt)?,
            expires_at: row.try_get("expires_at").map_err(corrupt)?,
            revoked: row.try_get("revoked").map_err(corrupt)?,
        }))
    }

    #[instrument(skip_all, err)]
    async fn revoke(&self, id: &RefreshTokenId) -> Result<bool, StoreError> {
        let result = sqlx::query("UPDATE refresh_tokens SET revoked = TRUE WHERE id = $1")
            .bind(id.as_str())
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("revoke_refresh_token", e))?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl ApplicationStore for PostgresAuthStore {
    #[instrument(skip_all, err)]
    async fn find_by_api_key(&self, key: &ApiKey) -> Result<Option<Application>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT id, name, wallet_address, api_key, created_at
            FROM applications
            WHERE api_key = $1
            "#,
        )
        .bind(key.as_str())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("find_application_by_api_key", e))?;

        let Some(row) = row else {
            return Ok(None);
        };
        let wallet: String = row.try_get("wallet_address").map_err(corrupt)?;
        Ok(Some(Application {
            id: ApplicationId::from_uuid(row.try_get("id").map_err(corrupt)?),
            name: row.try_get("name").map_err(corrupt)?,
            wallet_address: parse_address(&wallet)?,
            api_key: row.try_get("api_key").map_err(corrupt)?,
            created_at: row.try_get("created_at").map_err(corrupt)?,
        }))
    }
}

#[async_trait]
impl VerifierStore for PostgresAuthStore {
    #[instrument(skip(self), err)]
    async fn is_verifier(
        &self,
        lock_address: &Address,
        address: &Address,
        network: ChainNetwork,
    ) -> Result<bool, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM lock_verifiers
                WHERE lock_address = $1 AND address = $2 AND network = $3
            ) AS found
            "#,
        )
        .bind(lock_address.to_lower_hex())
        .bind(address.to_lower_hex())
        .bind(network_to_db(network)?)
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("is_verifier", e))?;

        row.try_get("found").map_err(corrupt)
    }
}

fn network_to_db(network: ChainNetwork) -> Result<i64, StoreError> {
    i64::try_from(network.id())
        .map_err(|_| StoreError::Corrupt(format!("network id {network} does not fit BIGINT")))
}

fn parse_address(raw: &str) -> Result<Address, StoreError> {
    raw.parse()
        .map_err(|e| StoreError::Corrupt(format!("stored address '{raw}': {e}")))
}

fn corrupt(err: sqlx::Error) -> StoreError {
    StoreError::Corrupt(format!("failed to decode row: {err}"))
}

/// Map SQLx errors to store errors (see module docs).
fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code().as_deref() {
                Some("23505") => StoreError::AlreadyExists(msg),
                _ => StoreError::Unavailable(msg),
            }
        }
        sqlx::Error::PoolClosed => {
            StoreError::Unavailable(format!("connection pool closed in {}", operation))
        }
        sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => {
            StoreError::Corrupt(format!("decode error in {}: {}", operation, err))
        }
        _ => StoreError::Unavailable(format!("sqlx error in {}: {}", operation, err)),
    }
}
