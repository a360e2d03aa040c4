//! Collaborator seams for everything that talks to the ledger.
//!
//! The coordinator only ever sees these traits. [`crate::rpc`] implements them
//! over JSON-RPC; tests use the in-memory versions in `crate::testing`.

use alloy_primitives::{Address, Bytes, U256};
use async_trait::async_trait;

use crate::errors::Result;
use crate::types::{ClaimArgs, ClaimEntry, Receipt, TxHash, TxRequest};

/// A Merkle distributor contract for one tranche.
#[async_trait]
pub trait DistributorContract: Send + Sync {
    fn address(&self) -> Address;

    /// `isClaimed(index)`
    async fn is_claimed(&self, index: U256) -> Result<bool>;

    /// `isProofValid(index, amount, account, proof)`
    async fn is_proof_valid(&self, account: Address, entry: &ClaimEntry) -> Result<bool>;

    /// ABI calldata for this distributor's `claim(...)` overload.
    fn encode_claim(&self, args: &ClaimArgs) -> Result<Bytes>;
}

/// The veOGV staking contract.
#[async_trait]
pub trait StakingContract: Send + Sync {
    async fn total_supply(&self) -> Result<U256>;

    async fn balance_of(&self, account: Address) -> Result<U256>;
}

/// Whatever holds the account key and asks the user to approve transactions.
#[async_trait]
pub trait TxSigner: Send + Sync {
    /// Returns once the transaction has been broadcast.
    async fn send_transaction(&self, request: TxRequest) -> Result<TxHash>;
}

/// Ledger confirmation queries.
#[async_trait]
pub trait ConfirmationSource: Send + Sync {
    /// Resolve once `hash` is mined. Errors when the transaction is dropped
    /// or the wait times out.
    async fn wait_for_transaction(&self, hash: TxHash) -> Result<Receipt>;
}

/// Side effect fired after a successful claim. Must tolerate being called
/// from both tranches at once.
#[async_trait]
pub trait BalanceRefresher: Send + Sync {
    async fn refresh(&self);
}
