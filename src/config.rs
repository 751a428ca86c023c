use crate::enrichment::{DEFAULT_FEE_ACCOUNT_ADDRESS, DEFAULT_NATIVE_TOKEN_ADDRESS, EnrichmentConfig};
use crate::query::QueryLimits;
use crate::query::pagination::{DEFAULT_OFFSET_LIMIT, DEFAULT_REQ_ENTITIES_LIMIT};
use alloy_primitives::Address;
use anyhow::Result;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub json_rpc_urls: Vec<String>,
    pub api_bind_addr: SocketAddr,
    pub limits: QueryLimits,
    pub enrichment: EnrichmentConfig,
    pub compilers_dir: String,
    pub compilation_timeout: Duration,
    pub verifier_workers: usize,
    pub feed_poll_interval: Duration,
    pub token_refresh_interval: Duration,
    pub feed_start_block: u64,
}

fn var_or<T: FromStr>(name: &str, default: T) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(value) => value
            .trim()
            .parse()
            .map_err(|e| anyhow::anyhow!("Invalid {} value {:?}: {}", name, value, e)),
        Err(_) => Ok(default),
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();

        let database_url =
            std::env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite:./explorer.db".to_string());

        // Only the indexer needs a node
        let json_rpc_urls: Vec<String> = std::env::var("JSON_RPC_URLS")
            .unwrap_or_default()
            .split(',')
            .map(|url| url.trim().to_string())
            .filter(|url| !url.is_empty())
            .collect();

        let api_bind_addr = var_or(
            "API_BIND_ADDR",
            SocketAddr::from(([127, 0, 0, 1], 3020)),
        )?;

        let limits = QueryLimits {
            req_entities_limit: var_or("REQ_ENTITIES_LIMIT", DEFAULT_REQ_ENTITIES_LIMIT)?,
            offset_limit: var_or("OFFSET_LIMIT", DEFAULT_OFFSET_LIMIT)?,
        };
        if limits.req_entities_limit == 0 {
            anyhow::bail!("REQ_ENTITIES_LIMIT must be positive");
        }

        let enrichment = EnrichmentConfig {
            native_token_address: var_or::<Address>(
                "NATIVE_TOKEN_ADDRESS",
                DEFAULT_NATIVE_TOKEN_ADDRESS,
            )?,
            fee_account_address: var_or::<Address>(
                "FEE_ACCOUNT_ADDRESS",
                DEFAULT_FEE_ACCOUNT_ADDRESS,
            )?,
        };

        Ok(Config {
            database_url,
            json_rpc_urls,
            api_bind_addr,
            limits,
            enrichment,
            compilers_dir: std::env::var("COMPILERS_DIR").unwrap_or_else(|_| "./bin".to_string()),
            compilation_timeout: Duration::from_secs(var_or("COMPILATION_TIMEOUT_SECS", 30)?),
            verifier_workers: var_or("VERIFIER_WORKERS", 2)?,
            feed_poll_interval: Duration::from_millis(var_or("FEED_POLL_INTERVAL_MS", 1_000)?),
            token_refresh_interval: Duration::from_secs(var_or(
                "TOKEN_REFRESH_INTERVAL_SECS",
                300,
            )?),
            feed_start_block: var_or("FEED_START_BLOCK", 1)?,
        })
    }

    pub fn require_rpc_urls(&self) -> Result<&[String]> {
        if self.json_rpc_urls.is_empty() {
            anyhow::bail!("JSON_RPC_URLS must be set in .env");
        }
        Ok(&self.json_rpc_urls)
    }
}
