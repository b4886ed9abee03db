//! Environment-driven configuration.

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use chrono::Duration as ChronoDuration;

use lockgate_auth::TokenPolicy;
use lockgate_core::{ApplicationId, ChainNetwork};

const DEV_JWT_SECRET: &str = "lockgate-dev-secret";

#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub bind_addr: SocketAddr,
    pub jwt_secret: String,
    pub jwt_issuer: String,
    pub access_token_ttl: ChronoDuration,
    pub refresh_token_ttl: ChronoDuration,
    /// When set, login only accepts messages for this domain.
    pub siwe_domain: Option<String>,
    pub chain_check_timeout: Duration,
    /// How often expired consumed-challenge records are swept.
    pub challenge_purge_interval: Duration,
    pub database_url: Option<String>,
    pub redis_url: Option<String>,
    pub rpc_urls: Vec<(ChainNetwork, String)>,
    pub platform_applications: Vec<ApplicationId>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        let policy = TokenPolicy::default();
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            jwt_secret: DEV_JWT_SECRET.to_string(),
            jwt_issuer: policy.issuer,
            access_token_ttl: policy.access_ttl,
            refresh_token_ttl: policy.refresh_ttl,
            siwe_domain: None,
            chain_check_timeout: Duration::from_millis(3000),
            challenge_purge_interval: Duration::from_secs(300),
            database_url: None,
            redis_url: None,
            rpc_urls: Vec::new(),
            platform_applications: Vec::new(),
        }
    }
}

impl ApiConfig {
    /// Load from the process environment (after reading `.env`, if any).
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary key lookup; unset keys take their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let defaults = Self::default();

        let bind_addr = match get("BIND_ADDR") {
            Some(raw) => raw
                .parse()
                .with_context(|| format!("BIND_ADDR '{raw}' is not a socket address"))?,
            None => defaults.bind_addr,
        };

        let jwt_secret = get("JWT_SECRET").unwrap_or_else(|| {
            tracing::warn!("JWT_SECRET not set; using insecure dev default");
            DEV_JWT_SECRET.to_string()
        });

        let access_token_ttl = match get("ACCESS_TOKEN_TTL_SECS") {
            Some(raw) => parse_ttl("ACCESS_TOKEN_TTL_SECS", &raw)?,
            None => defaults.access_token_ttl,
        };
        let refresh_token_ttl = match get("REFRESH_TOKEN_TTL_SECS") {
            Some(raw) => parse_ttl("REFRESH_TOKEN_TTL_SECS", &raw)?,
            None => defaults.refresh_token_ttl,
        };
        let chain_check_timeout = match get("CHAIN_CHECK_TIMEOUT_MS") {
            Some(raw) => Duration::from_millis(parse_number("CHAIN_CHECK_TIMEOUT_MS", &raw)?),
            None => defaults.chain_check_timeout,
        };

        let challenge_purge_interval = match get("CHALLENGE_PURGE_INTERVAL_SECS") {
            Some(raw) => match parse_number::<u64>("CHALLENGE_PURGE_INTERVAL_SECS", &raw)? {
                0 => return Err(anyhow!("CHALLENGE_PURGE_INTERVAL_SECS must be positive")),
                secs => Duration::from_secs(secs),
            },
            None => defaults.challenge_purge_interval,
        };

        let rpc_urls = match get("RPC_URLS") {
            Some(raw) => parse_rpc_urls(&raw)?,
            None => Vec::new(),
        };
        let platform_applications = match get("PLATFORM_APPLICATIONS") {
            Some(raw) => parse_application_ids(&raw)?,
            None => Vec::new(),
        };

        let config = Self {
            bind_addr,
            jwt_secret,
            jwt_issuer: get("JWT_ISSUER").unwrap_or(defaults.jwt_issuer),
            access_token_ttl,
            refresh_token_ttl,
            siwe_domain: get("SIWE_DOMAIN"),
            chain_check_timeout,
            challenge_purge_interval,
            database_url: get("DATABASE_URL"),
            redis_url: get("REDIS_URL"),
            rpc_urls,
            platform_applications,
        };
        config.token_policy().validate()?;
        Ok(config)
    }

    pub fn token_policy(&self) -> TokenPolicy {
        TokenPolicy {
            access_ttl: self.access_token_ttl,
            refresh_ttl: self.refresh_token_ttl,
            issuer: self.jwt_issuer.clone(),
        }
    }
}

fn parse_number<T>(key: &str, raw: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    raw.parse::<T>()
        .with_context(|| format!("{key} must be a non-negative integer, got '{raw}'"))
}

fn parse_ttl(key: &str, raw: &str) -> Result<ChronoDuration> {
    let secs: i64 = parse_number(key, raw)?;
    ChronoDuration::try_seconds(secs).ok_or_else(|| anyhow!("{key} is out of range: {raw}"))
}

/// `network=url,network=url`
fn parse_rpc_urls(raw: &str) -> Result<Vec<(ChainNetwork, String)>> {
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            let (network, url) = entry
                .split_once('=')
                .ok_or_else(|| anyhow!("RPC_URLS entry '{entry}' must look like network=url"))?;
            let network: ChainNetwork = network
                .parse()
                .with_context(|| format!("RPC_URLS entry '{entry}' has an invalid network"))?;
            Ok((network, url.trim().to_string()))
        })
        .collect()
}

fn parse_application_ids(raw: &str) -> Result<Vec<ApplicationId>> {
    raw.split(',')
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(|id| {
            id.parse()
                .with_context(|| format!("PLATFORM_APPLICATIONS entry '{id}' is not an application id"))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(pairs: &[(&str, &str)]) -> Result<ApiConfig> {
        let env: HashMap<String, String> =
            pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        ApiConfig::from_lookup(|key| env.get(key).cloned())
    }

    #[test]
    fn empty_environment_yields_defaults() {
        let config = load(&[]).unwrap();
        assert_eq!(config.bind_addr.port(), 8080);
        assert_eq!(config.access_token_ttl, ChronoDuration::seconds(3600));
        assert_eq!(config.refresh_token_ttl, ChronoDuration::seconds(2_592_000));
        assert_eq!(config.chain_check_timeout, Duration::from_millis(3000));
        assert!(config.database_url.is_none());
    }

    #[test]
    fn rpc_urls_and_platform_applications_are_parsed() {
        let app = ApplicationId::new();
        let config = load(&[
            ("RPC_URLS", "1=https://rpc.one, 137=https://rpc.polygon"),
            ("PLATFORM_APPLICATIONS", &app.to_string()),
        ])
        .unwrap();
        assert_eq!(
            config.rpc_urls,
            vec![
                (ChainNetwork::new(1), "https://rpc.one".to_string()),
                (ChainNetwork::new(137), "https://rpc.polygon".to_string()),
            ]
        );
        assert_eq!(config.platform_applications, vec![app]);
    }

    #[test]
    fn invalid_values_are_errors() {
        assert!(load(&[("ACCESS_TOKEN_TTL_SECS", "soon")]).is_err());
        assert!(load(&[("RPC_URLS", "mainnet")]).is_err());
        assert!(load(&[("BIND_ADDR", "localhost")]).is_err());
        assert!(load(&[("PLATFORM_APPLICATIONS", "not-a-uuid")]).is_err());
        assert!(load(&[("CHALLENGE_PURGE_INTERVAL_SECS", "0")]).is_err());
    }

    #[test]
    fn oversized_ttls_are_errors_not_panics() {
        assert!(load(&[("REFRESH_TOKEN_TTL_SECS", "10000000000000")]).is_err());
        assert!(load(&[("REFRESH_TOKEN_TTL_SECS", &i64::MAX.to_string())]).is_err());
        assert!(load(&[("ACCESS_TOKEN_TTL_SECS", "99999999999999999")]).is_err());
    }

    #[test]
    fn access_ttl_must_be_shorter_than_refresh_ttl() {
        let err = load(&[("ACCESS_TOKEN_TTL_SECS", "600"), ("REFRESH_TOKEN_TTL_SECS", "600")]);
        assert!(err.is_err());
    }
}
