//! Application configuration loaded from environment variables.

use std::time::Duration;

use alloy_primitives::Address;

use crate::errors::{ClaimError, Result};

#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL of the eligibility service (`{url}/claim?account=...`)
    pub eligibility_url: String,
    /// JSON-RPC node used for contract reads and receipts
    pub rpc_url: String,
    /// JSON-RPC endpoint that owns the account's key (wallet / signer)
    pub wallet_rpc_url: String,
    /// Account claiming the airdrop
    pub account: Address,
    /// Distributor for the optional (lockup) tranche
    pub optional_distributor: Address,
    /// Distributor for the mandatory tranche
    pub mandatory_distributor: Address,
    /// veOGV staking contract
    pub staking_contract: Address,
    /// Path to the SQLite claim journal
    pub database_url: String,
    /// Port for the operator API
    pub api_port: u16,
    /// Artificial delay after submission so the network state is observable.
    /// `None` disables it.
    pub simulate_latency: Option<Duration>,
    /// How often to poll for a transaction receipt
    pub confirmation_poll: Duration,
    /// Give up waiting for a receipt after this long
    pub confirmation_timeout: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let rpc_url =
            env_var("RPC_URL").unwrap_or_else(|_| "http://localhost:8545".to_string());
        Ok(Config {
            eligibility_url: env_var("ELIGIBILITY_URL")
                .unwrap_or_else(|_| "http://localhost:3000/api".to_string()),
            wallet_rpc_url: env_var("WALLET_RPC_URL").unwrap_or_else(|_| rpc_url.clone()),
            rpc_url,
            account: address_var("ACCOUNT")?,
            optional_distributor: address_var("OPTIONAL_DISTRIBUTOR")?,
            mandatory_distributor: address_var("MANDATORY_DISTRIBUTOR")?,
            staking_contract: address_var("STAKING_CONTRACT")?,
            database_url: env_var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite:./claims.db".to_string()),
            api_port: env_var("API_PORT")
                .unwrap_or_else(|_| "3002".to_string())
                .parse()
                .map_err(|_| ClaimError::Config("Invalid API_PORT".to_string()))?,
            simulate_latency: parse_latency(env_var("SIMULATE_LATENCY_MS").ok().as_deref())?,
            confirmation_poll: Duration::from_millis(
                env_var("CONFIRMATION_POLL_MS")
                    .unwrap_or_else(|_| "1000".to_string())
                    .parse()
                    .map_err(|_| ClaimError::Config("Invalid CONFIRMATION_POLL_MS".to_string()))?,
            ),
            confirmation_timeout: Duration::from_secs(
                env_var("CONFIRMATION_TIMEOUT_SECS")
                    .unwrap_or_else(|_| "600".to_string())
                    .parse()
                    .map_err(|_| {
                        ClaimError::Config("Invalid CONFIRMATION_TIMEOUT_SECS".to_string())
                    })?,
            ),
        })
    }
}

fn env_var(key: &str) -> Result<String> {
    std::env::var(key).map_err(|_| ClaimError::Config(format!("Missing env var: {key}")))
}

fn address_var(key: &str) -> Result<Address> {
    env_var(key)?
        .trim()
        .parse()
        .map_err(|_| ClaimError::Config(format!("Invalid address in {key}")))
}

/// `None`, empty and `0` all disable the delay.
fn parse_latency(raw: Option<&str>) -> Result<Option<Duration>> {
    match raw.map(str::trim) {
        None | Some("") => Ok(None),
        Some(v) => {
            let ms: u64 = v
                .parse()
                .map_err(|_| ClaimError::Config("Invalid SIMULATE_LATENCY_MS".to_string()))?;
            Ok((ms > 0).then(|| Duration::from_millis(ms)))
        }
    }
}
