//! Claim lifecycle events, broadcast by the lifecycle managers and persisted
//! by the journal.

use alloy_primitives::Address;
use serde::{Deserialize, Serialize};

use crate::types::{Tranche, TxHash};

/// Everything worth journaling about a claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClaimEventKind {
    /// The signer broadcast a claim transaction.
    Submitted,
    /// Receipt came back with status 1.
    Confirmed,
    /// Receipt came back with a failure status.
    Reverted,
    /// Signer refused or failed before a hash existed.
    Rejected,
    /// Waiting for the receipt failed (dropped, timed out, node error).
    Dropped,
    /// Verification found the index already claimed on-chain.
    AlreadyClaimed,
}

impl ClaimEventKind {
    /// Return a short identifier string suitable for storage in the database.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Submitted => "submitted",
            Self::Confirmed => "confirmed",
            Self::Reverted => "reverted",
            Self::Rejected => "rejected",
            Self::Dropped => "dropped",
            Self::AlreadyClaimed => "already_claimed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimEvent {
    pub tranche: Tranche,
    pub account: Address,
    pub kind: ClaimEventKind,
    pub tx_hash: Option<TxHash>,
    pub detail: Option<String>,
    /// Unix seconds.
    pub timestamp: i64,
}

impl ClaimEvent {
    pub fn now(tranche: Tranche, account: Address, kind: ClaimEventKind) -> Self {
        Self {
            tranche,
            account,
            kind,
            tx_hash: None,
            detail: None,
            timestamp: chrono::Utc::now().timestamp(),
        }
    }

    pub fn with_hash(mut self, tx_hash: TxHash) -> Self {
        self.tx_hash = Some(tx_hash);
        self
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

/// A journaled event as stored in / read from the database.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ClaimEventRecord {
    pub id: i64,
    pub tranche: String,
    pub account: String,
    pub kind: String,
    pub tx_hash: Option<String>,
    pub detail: Option<String>,
    pub timestamp: i64,
    pub created_at: i64,
}
