//! # Types
//!
//! Shared data structures used across the claim client.
//!
//! ## Claim state as a finite-state machine
//!
//! [`ClaimTxState`] is one instance per [`Tranche`]. Transitions go through
//! [`ClaimTxState::apply`]; anything it returns `None` for is rejected.
//!
//! ```text
//! Ready ──► AwaitingUserConfirmation ──► AwaitingNetworkConfirmation ──► Claimed
//!   ▲                 │                               │
//!   └─────────────────┴───────────────────────────────┘   (any failure)
//!
//! any ──► Claimed   (verification found the index already claimed)
//! ```
//!
//! The transaction hash lives inside the variants that have one, so it can
//! never disagree with the state: returning to `Ready` drops it.

use std::collections::BTreeMap;
use std::fmt;

use alloy_primitives::{Address, Bytes, B256, U256};
use serde::{Deserialize, Serialize};

/// 278_048 gas observed on-chain × 1.5.
pub const OPTIONAL_CLAIM_GAS_LIMIT: u64 = 417_072;
/// 498_316 gas observed on-chain × 1.5.
pub const MANDATORY_CLAIM_GAS_LIMIT: u64 = 747_474;

pub type TxHash = B256;

/// One of the two independent claim categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tranche {
    /// User picks a lock duration when claiming.
    Optional,
    /// Fixed claim call.
    Mandatory,
}

impl Tranche {
    pub const ALL: [Tranche; 2] = [Tranche::Optional, Tranche::Mandatory];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Optional => "optional",
            Self::Mandatory => "mandatory",
        }
    }

    /// Fixed gas-limit override attached to this tranche's claim call.
    pub fn gas_limit(&self) -> u64 {
        match self {
            Self::Optional => OPTIONAL_CLAIM_GAS_LIMIT,
            Self::Mandatory => MANDATORY_CLAIM_GAS_LIMIT,
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "optional" => Some(Self::Optional),
            "mandatory" => Some(Self::Mandatory),
            _ => None,
        }
    }
}

impl fmt::Display for Tranche {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A claim leaf for one tranche, normalized from the eligibility payload.
///
/// Amounts are exact 256-bit integers. `None` means the payload carried no
/// hex-encoded value for that field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimEntry {
    /// Leaf index in the Merkle tree.
    pub index: u64,
    /// Claimable quantity in base units.
    pub amount: Option<U256>,
    /// Merkle proof path, leaf to root.
    pub proof: Vec<B256>,
    /// Sub-breakdown of `amount` (e.g. vested vs liquid).
    pub split: BTreeMap<String, Option<U256>>,
}

/// Eligibility for both tranches. `None` is the common "no claim" case.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Eligibility {
    pub optional: Option<ClaimEntry>,
    pub mandatory: Option<ClaimEntry>,
}

impl Eligibility {
    pub fn get(&self, tranche: Tranche) -> Option<&ClaimEntry> {
        match tranche {
            Tranche::Optional => self.optional.as_ref(),
            Tranche::Mandatory => self.mandatory.as_ref(),
        }
    }

    pub fn has_any_claim(&self) -> bool {
        self.optional.is_some() || self.mandatory.is_some()
    }
}

/// On-chain view of a claim at verification time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifiedClaim {
    pub is_claimed: bool,
    pub is_valid: bool,
}

/// Per-tranche claim transaction state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClaimTxState {
    #[default]
    Ready,
    /// Waiting on the wallet prompt.
    AwaitingUserConfirmation,
    /// Submitted, waiting to be mined.
    AwaitingNetworkConfirmation { tx_hash: TxHash },
    /// Terminal. `tx_hash` is `None` when verification found it already claimed.
    Claimed { tx_hash: Option<TxHash> },
}

/// Inputs that drive [`ClaimTxState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimTransition {
    Invoke,
    Submitted(TxHash),
    SignerFailed,
    ReceiptSucceeded,
    ReceiptFailed,
    WaitFailed,
    AlreadyClaimed,
}

impl ClaimTxState {
    /// Pure transition function. `None` means the transition is not allowed
    /// from the current state.
    pub fn apply(&self, transition: ClaimTransition) -> Option<ClaimTxState> {
        use ClaimTransition as T;
        use ClaimTxState as S;

        match (*self, transition) {
            (_, T::AlreadyClaimed) => Some(S::Claimed {
                tx_hash: self.tx_hash(),
            }),
            (S::Ready, T::Invoke) => Some(S::AwaitingUserConfirmation),
            (S::AwaitingUserConfirmation, T::Submitted(tx_hash)) => {
                Some(S::AwaitingNetworkConfirmation { tx_hash })
            }
            (S::AwaitingUserConfirmation, T::SignerFailed) => Some(S::Ready),
            (S::AwaitingNetworkConfirmation { tx_hash }, T::ReceiptSucceeded) => {
                Some(S::Claimed {
                    tx_hash: Some(tx_hash),
                })
            }
            (S::AwaitingNetworkConfirmation { .. }, T::ReceiptFailed | T::WaitFailed) => {
                Some(S::Ready)
            }
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ready => "ready",
            Self::AwaitingUserConfirmation => "awaiting_user_confirmation",
            Self::AwaitingNetworkConfirmation { .. } => "awaiting_network_confirmation",
            Self::Claimed { .. } => "claimed",
        }
    }

    /// Last recorded transaction hash, if the state carries one.
    pub fn tx_hash(&self) -> Option<TxHash> {
        match self {
            Self::AwaitingNetworkConfirmation { tx_hash } => Some(*tx_hash),
            Self::Claimed { tx_hash } => *tx_hash,
            _ => None,
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready)
    }

    pub fn is_claimed(&self) -> bool {
        matches!(self, Self::Claimed { .. })
    }
}

impl fmt::Display for ClaimTxState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for ClaimTxState {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Arguments of a distributor `claim(...)` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimArgs {
    pub index: U256,
    pub amount: U256,
    pub proof: Vec<B256>,
    /// Lock duration, optional tranche only.
    pub lock_duration: Option<U256>,
}

/// A transaction handed to the signer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxRequest {
    pub from: Address,
    pub to: Address,
    pub data: Bytes,
    pub gas_limit: u64,
}

/// Confirmation record for a mined transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Receipt {
    pub transaction_hash: TxHash,
    /// `1` = success, anything else = failure.
    pub status: u64,
    pub block_number: Option<u64>,
}

impl Receipt {
    pub fn is_success(&self) -> bool {
        self.status == 1
    }
}
