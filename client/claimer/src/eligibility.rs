//! Eligibility service client: fetches and normalizes claim records.
//!
//! The service answers `GET {base}/claim?account=<address>` with
//! `{ "optional": ClaimRecordWire, "mandatory": ClaimRecordWire }`. Numeric
//! fields arrive as `{ "type": "BigNumber", "hex": "0x…" }`; anything without
//! a `hex` string is treated as "no value" rather than an error.

use std::collections::BTreeMap;

use alloy_primitives::{Address, B256, U256};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::errors::{ClaimError, Result};
use crate::types::{ClaimEntry, Eligibility};

#[async_trait]
pub trait EligibilitySource: Send + Sync {
    async fn fetch(&self, account: Address) -> Result<Eligibility>;
}

// ─────────────────────────────────────────────────────────
// Wire shapes
// ─────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct EligibilityResponse {
    pub optional: ClaimRecordWire,
    pub mandatory: ClaimRecordWire,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimRecordWire {
    #[serde(default)]
    pub has_claim: bool,
    pub index: Option<Value>,
    pub amount: Option<Value>,
    #[serde(default)]
    pub proof: Vec<String>,
    #[serde(default)]
    pub split: BTreeMap<String, Value>,
}

// ─────────────────────────────────────────────────────────
// HTTP client
// ─────────────────────────────────────────────────────────

pub struct EligibilityClient {
    client: Client,
    base_url: String,
}

impl EligibilityClient {
    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl EligibilitySource for EligibilityClient {
    async fn fetch(&self, account: Address) -> Result<Eligibility> {
        let body = self
            .client
            .get(format!("{}/claim", self.base_url))
            .query(&[("account", account.to_string())])
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await?;

        let response: EligibilityResponse = serde_json::from_slice(&body)
            .map_err(|e| ClaimError::MalformedResponse(format!("eligibility payload: {e}")))?;

        let eligibility = normalize(response)?;
        debug!(
            "Eligibility for {account}: optional={} mandatory={}",
            eligibility.optional.is_some(),
            eligibility.mandatory.is_some()
        );
        Ok(eligibility)
    }
}

// ─────────────────────────────────────────────────────────
// Normalization
// ─────────────────────────────────────────────────────────

pub fn normalize(response: EligibilityResponse) -> Result<Eligibility> {
    Ok(Eligibility {
        optional: normalize_record(response.optional)?,
        mandatory: normalize_record(response.mandatory)?,
    })
}

fn normalize_record(wire: ClaimRecordWire) -> Result<Option<ClaimEntry>> {
    if !wire.has_claim {
        return Ok(None);
    }

    let index = wire
        .index
        .as_ref()
        .and_then(decode_index)
        .ok_or_else(|| ClaimError::MalformedResponse("claim index missing".to_string()))?;

    let amount = match &wire.amount {
        Some(v) => maybe_u256(v)?,
        None => None,
    };

    let proof = wire
        .proof
        .iter()
        .map(|p| {
            p.parse::<B256>()
                .map_err(|_| ClaimError::MalformedResponse(format!("bad proof node {p}")))
        })
        .collect::<Result<Vec<_>>>()?;

    let split = wire
        .split
        .iter()
        .map(|(k, v)| Ok((k.clone(), maybe_u256(v)?)))
        .collect::<Result<BTreeMap<_, _>>>()?;

    Ok(Some(ClaimEntry {
        index,
        amount,
        proof,
        split,
    }))
}

/// Decode a `{ "hex": "0x…" }` big-number object into an exact integer.
/// Values without a `hex` string are `None`.
pub fn maybe_u256(value: &Value) -> Result<Option<U256>> {
    let Some(hex) = value.get("hex").and_then(Value::as_str) else {
        return Ok(None);
    };
    let digits = hex
        .strip_prefix("0x")
        .or_else(|| hex.strip_prefix("0X"))
        .unwrap_or(hex);
    if digits.is_empty() {
        return Err(ClaimError::MalformedResponse(format!("empty hex value {hex:?}")));
    }
    U256::from_str_radix(digits, 16)
        .map(Some)
        .map_err(|e| ClaimError::MalformedResponse(format!("bad hex value {hex:?}: {e}")))
}

/// The leaf index is normally a plain JSON number, but accept the big-number
/// encoding too.
fn decode_index(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.parse().ok(),
        Value::Object(_) => maybe_u256(value)
            .ok()
            .flatten()
            .and_then(|v| u64::try_from(v).ok()),
        _ => None,
    }
}

// ─────────────────────────────────────────────────────────
// Unit tests
// ─────────────────────────────────────────────────────────
