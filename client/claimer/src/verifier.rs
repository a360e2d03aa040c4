//! Checks a claim leaf against its distributor contract.

use alloy_primitives::{Address, U256};

use crate::chain::DistributorContract;
use crate::errors::{ClaimError, Result};
use crate::types::{ClaimEntry, VerifiedClaim};

/// Ask the distributor whether `entry` is already claimed and whether its
/// proof checks out against the stored root. Both reads run concurrently.
pub async fn verify_claim(
    distributor: &dyn DistributorContract,
    account: Address,
    entry: &ClaimEntry,
) -> Result<VerifiedClaim> {
    if entry.amount.is_none() {
        return Err(ClaimError::MalformedResponse(format!(
            "claim {} has no amount",
            entry.index
        )));
    }

    let (is_claimed, is_valid) = tokio::try_join!(
        distributor.is_claimed(U256::from(entry.index)),
        distributor.is_proof_valid(account, entry),
    )?;

    Ok(VerifiedClaim {
        is_claimed,
        is_valid,
    })
}
