//! Ethereum JSON-RPC client: contract reads, claim submission and receipt
//! polling.
//!
//! ## Resilience
//!
//! * Reads back off exponentially on transport errors, rate limits and soft
//!   RPC errors, giving up after [`MAX_READ_ATTEMPTS`] with a
//!   [`ClaimError::ContractCall`].
//! * Writes are sent exactly once. A retry here could double-submit.
//! * Receipt polling tolerates transient errors until the confirmation
//!   timeout expires.

use std::time::Duration;

use alloy_primitives::{Address, Bytes, U256};
use alloy_sol_types::{sol, SolCall};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::chain::{ConfirmationSource, DistributorContract, StakingContract, TxSigner};
use crate::errors::{ClaimError, Result};
use crate::types::{ClaimArgs, ClaimEntry, Receipt, Tranche, TxHash, TxRequest};

const MAX_BACKOFF_SECS: u64 = 60;
const INITIAL_BACKOFF_SECS: u64 = 2;
const MAX_READ_ATTEMPTS: u32 = 4;

/// EIP-1193 "User Rejected Request".
const USER_REJECTED: i64 = 4001;
/// Geth's code for `execution reverted`.
const EXECUTION_REVERTED: i64 = 3;

sol! {
    interface IMerkleDistributor {
        function isClaimed(uint256 index) external view returns (bool);
        function isProofValid(
            uint256 index,
            uint256 amount,
            address account,
            bytes32[] calldata merkleProof
        ) external view returns (bool);
    }

    interface IMandatoryDistributor {
        function claim(uint256 index, uint256 amount, bytes32[] calldata merkleProof) external;
    }

    interface IOptionalDistributor {
        function claim(
            uint256 index,
            uint256 amount,
            bytes32[] calldata merkleProof,
            uint256 stakeDuration
        ) external;
    }

    interface IOgvStaking {
        function totalSupply() external view returns (uint256);
        function balanceOf(address account) external view returns (uint256);
    }
}

// ─────────────────────────────────────────────────────────
// JSON-RPC response shapes
// ─────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct RpcResponse {
    pub result: Option<Value>,
    pub error: Option<RpcError>,
}

#[derive(Debug, Deserialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
}

impl RpcError {
    fn is_hard(&self) -> bool {
        matches!(self.code, -32600 | -32601 | -32602 | EXECUTION_REVERTED)
            || self.message.contains("revert")
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawReceipt {
    pub transaction_hash: TxHash,
    pub status: Option<String>,
    pub block_number: Option<String>,
}

/// Why a single request failed.
#[derive(Debug)]
enum Failure {
    Transport(reqwest::Error),
    RateLimited,
    Rpc(RpcError),
}

impl std::fmt::Display for Failure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Transport(e) => write!(f, "{e}"),
            Self::RateLimited => f.write_str("rate limited"),
            Self::Rpc(e) => write!(f, "RPC error {}: {}", e.code, e.message),
        }
    }
}

// ─────────────────────────────────────────────────────────
// Transport
// ─────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct RpcClient {
    client: Client,
    url: String,
}

impl RpcClient {
    pub fn new(client: Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }

    async fn request_once(&self, method: &str, params: Value) -> std::result::Result<Value, Failure> {
        let resp = self
            .client
            .post(&self.url)
            .json(&json!({
                "jsonrpc": "2.0",
                "id": 1,
                "method": method,
                "params": params,
            }))
            .send()
            .await
            .map_err(Failure::Transport)?;

        if resp.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(Failure::RateLimited);
        }

        let body: RpcResponse = resp.json().await.map_err(Failure::Transport)?;
        if let Some(err) = body.error {
            return Err(Failure::Rpc(err));
        }
        Ok(body.result.unwrap_or(Value::Null))
    }

    /// Read-only request with back-off.
    async fn read(&self, method: &str, params: Value) -> Result<Value> {
        let mut backoff = INITIAL_BACKOFF_SECS;
        let mut attempt = 1;

        loop {
            let failure = match self.request_once(method, params.clone()).await {
                Ok(v) => return Ok(v),
                Err(Failure::Rpc(err)) if err.is_hard() => {
                    return Err(ClaimError::ContractCall(format!(
                        "{method} failed {}: {}",
                        err.code, err.message
                    )));
                }
                Err(failure) => failure,
            };

            if attempt >= MAX_READ_ATTEMPTS {
                return Err(ClaimError::ContractCall(format!(
                    "{method} failed after {attempt} attempts: {failure}"
                )));
            }
            warn!("{method} failed (will retry in {backoff}s): {failure}");
            tokio::time::sleep(Duration::from_secs(backoff)).await;
            backoff = (backoff * 2).min(MAX_BACKOFF_SECS);
            attempt += 1;
        }
    }

    /// `eth_call` against the latest block, returning the raw return data.
    pub async fn eth_call(&self, to: Address, data: Vec<u8>) -> Result<Vec<u8>> {
        let result = self
            .read(
                "eth_call",
                json!([{ "to": to, "data": format!("0x{}", hex::encode(data)) }, "latest"]),
            )
            .await?;
        let hex_str = result
            .as_str()
            .ok_or_else(|| ClaimError::ContractCall("eth_call returned no data".to_string()))?;
        hex::decode(hex_str.trim_start_matches("0x"))
            .map_err(|e| ClaimError::ContractCall(format!("eth_call returned bad hex: {e}")))
    }

    async fn call<C: SolCall>(&self, to: Address, call: C) -> Result<C::Return> {
        let out = self.eth_call(to, call.abi_encode()).await?;
        C::abi_decode_returns(&out, true).map_err(|e| {
            ClaimError::ContractCall(format!("cannot decode {} result: {e}", C::SIGNATURE))
        })
    }
}

pub fn parse_quantity(raw: &str) -> Option<u64> {
    u64::from_str_radix(raw.trim_start_matches("0x"), 16).ok()
}

pub fn parse_receipt(raw: RawReceipt) -> Receipt {
    Receipt {
        transaction_hash: raw.transaction_hash,
        // Pre-Byzantium receipts carry no status; count them as failed.
        status: raw.status.as_deref().and_then(parse_quantity).unwrap_or(0),
        block_number: raw.block_number.as_deref().and_then(parse_quantity),
    }
}

// ─────────────────────────────────────────────────────────
// Contracts
// ─────────────────────────────────────────────────────────

pub struct RpcDistributor {
    rpc: RpcClient,
    address: Address,
    tranche: Tranche,
}

impl RpcDistributor {
    pub fn new(rpc: RpcClient, address: Address, tranche: Tranche) -> Self {
        Self {
            rpc,
            address,
            tranche,
        }
    }
}

#[async_trait]
impl DistributorContract for RpcDistributor {
    fn address(&self) -> Address {
        self.address
    }

    async fn is_claimed(&self, index: U256) -> Result<bool> {
        let ret = self
            .rpc
            .call(self.address, IMerkleDistributor::isClaimedCall { index })
            .await?;
        Ok(ret._0)
    }

    async fn is_proof_valid(&self, account: Address, entry: &ClaimEntry) -> Result<bool> {
        let amount = entry.amount.ok_or_else(|| {
            ClaimError::InvalidRequest(format!("claim {} has no amount", entry.index))
        })?;
        let ret = self
            .rpc
            .call(
                self.address,
                IMerkleDistributor::isProofValidCall {
                    index: U256::from(entry.index),
                    amount,
                    account,
                    merkleProof: entry.proof.clone(),
                },
            )
            .await?;
        Ok(ret._0)
    }

    fn encode_claim(&self, args: &ClaimArgs) -> Result<Bytes> {
        let data = match (self.tranche, args.lock_duration) {
            (Tranche::Mandatory, _) => IMandatoryDistributor::claimCall {
                index: args.index,
                amount: args.amount,
                merkleProof: args.proof.clone(),
            }
            .abi_encode(),
            (Tranche::Optional, Some(stake_duration)) => IOptionalDistributor::claimCall {
                index: args.index,
                amount: args.amount,
                merkleProof: args.proof.clone(),
                stakeDuration: stake_duration,
            }
            .abi_encode(),
            (Tranche::Optional, None) => {
                return Err(ClaimError::InvalidRequest(
                    "optional claim needs a lock duration".to_string(),
                ))
            }
        };
        Ok(Bytes::from(data))
    }
}

pub struct RpcStaking {
    rpc: RpcClient,
    address: Address,
}

impl RpcStaking {
    pub fn new(rpc: RpcClient, address: Address) -> Self {
        Self { rpc, address }
    }
}

#[async_trait]
impl StakingContract for RpcStaking {
    async fn total_supply(&self) -> Result<U256> {
        let ret = self
            .rpc
            .call(self.address, IOgvStaking::totalSupplyCall {})
            .await?;
        Ok(ret._0)
    }

    async fn balance_of(&self, account: Address) -> Result<U256> {
        let ret = self
            .rpc
            .call(self.address, IOgvStaking::balanceOfCall { account })
            .await?;
        Ok(ret._0)
    }
}

// ─────────────────────────────────────────────────────────
// Signer and confirmations
// ─────────────────────────────────────────────────────────

/// Submits through `eth_sendTransaction` on an endpoint that holds the key
/// (a wallet bridge or a node with an unlocked account).
pub struct RpcSigner {
    rpc: RpcClient,
}

impl RpcSigner {
    pub fn new(rpc: RpcClient) -> Self {
        Self { rpc }
    }
}

#[async_trait]
impl TxSigner for RpcSigner {
    async fn send_transaction(&self, request: TxRequest) -> Result<TxHash> {
        let params = json!([{
            "from": request.from,
            "to": request.to,
            "data": format!("0x{}", hex::encode(&request.data)),
            "gas": format!("{:#x}", request.gas_limit),
        }]);

        let result = match self.rpc.request_once("eth_sendTransaction", params).await {
            Ok(v) => v,
            Err(Failure::Rpc(err)) if err.code == USER_REJECTED => {
                return Err(ClaimError::SignerRejected(err.message))
            }
            Err(failure) => return Err(ClaimError::Submission(failure.to_string())),
        };

        serde_json::from_value(result)
            .map_err(|e| ClaimError::Submission(format!("signer returned no hash: {e}")))
    }
}

pub struct RpcConfirmations {
    rpc: RpcClient,
    poll: Duration,
    timeout: Duration,
}

impl RpcConfirmations {
    pub fn new(rpc: RpcClient, poll: Duration, timeout: Duration) -> Self {
        Self { rpc, poll, timeout }
    }
}

#[async_trait]
impl ConfirmationSource for RpcConfirmations {
    async fn wait_for_transaction(&self, hash: TxHash) -> Result<Receipt> {
        let deadline = tokio::time::Instant::now() + self.timeout;

        loop {
            match self
                .rpc
                .request_once("eth_getTransactionReceipt", json!([hash]))
                .await
            {
                Ok(Value::Null) => debug!("{hash} not mined yet"),
                Ok(v) => {
                    let raw: RawReceipt = serde_json::from_value(v).map_err(|e| {
                        ClaimError::Confirmation(format!("bad receipt for {hash}: {e}"))
                    })?;
                    return Ok(parse_receipt(raw));
                }
                Err(Failure::Rpc(err)) if err.is_hard() => {
                    return Err(ClaimError::Confirmation(format!(
                        "receipt query failed {}: {}",
                        err.code, err.message
                    )));
                }
                Err(failure) => warn!("Receipt poll for {hash} failed: {failure}"),
            }

            if tokio::time::Instant::now() + self.poll > deadline {
                return Err(ClaimError::Confirmation(format!(
                    "{hash} not mined after {:?}",
                    self.timeout
                )));
            }
            tokio::time::sleep(self.poll).await;
        }
    }
}

// ─────────────────────────────────────────────────────────
// Unit tests
// ─────────────────────────────────────────────────────────
