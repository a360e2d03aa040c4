//! Merkle airdrop claim client.
//!
//! Loads an account's eligibility for the optional and mandatory distributor
//! tranches, verifies each leaf against its distributor contract, and drives
//! claim transactions through a per-tranche state machine.
//!
//! | Piece              | Module                        |
//! |--------------------|-------------------------------|
//! | Eligibility fetch  | [`eligibility`]               |
//! | Proof verification | [`verifier`]                  |
//! | Staked supply      | [`supply`]                    |
//! | Claim lifecycle    | [`lifecycle`]                 |
//! | Orchestration      | [`coordinator`]               |
//! | Ledger transport   | [`rpc`] behind [`chain`]      |
//! | Journal and API    | [`journal`], [`api`]          |

pub mod api;
pub mod balances;
pub mod chain;
pub mod config;
pub mod coordinator;
pub mod eligibility;
pub mod errors;
pub mod events;
pub mod journal;
pub mod lifecycle;
pub mod rpc;
pub mod supply;
pub mod types;
pub mod verifier;

#[cfg(test)]
mod testing;

pub use coordinator::{ClaimCoordinator, ClaimHandle, ClaimView, ContractBindings, CoordinatorContext};
pub use errors::{ClaimError, Result};
pub use types::{ClaimEntry, ClaimTxState, Eligibility, Receipt, Tranche, VerifiedClaim};
