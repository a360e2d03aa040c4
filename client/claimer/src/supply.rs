//! Staked-supply metric used for reward-rate display.

use std::str::FromStr;

use alloy_primitives::U256;
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{debug, error};

use crate::chain::StakingContract;

/// 100m OGV. Below this the first stakers would see absurd reward rates.
pub const MIN_ADJUSTED_SUPPLY: u64 = 100_000_000;

const DECIMALS: u64 = 18;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SupplyMetric {
    /// Raw `totalSupply()` reading, base units.
    #[serde(rename = "totalSupplyVeOgv")]
    pub total_supply: U256,
    /// `max(total_supply / 10^18, 100m)`.
    #[serde(rename = "totalSupplyVeOgvAdjusted")]
    pub adjusted_supply: Decimal,
}

impl SupplyMetric {
    pub fn from_total_supply(total_supply: U256) -> Self {
        let whole = total_supply / U256::from(10u64).pow(U256::from(DECIMALS));
        // Decimal tops out near 7.9e28 whole tokens; saturate past that.
        let whole = Decimal::from_str(&whole.to_string()).unwrap_or(Decimal::MAX);
        Self {
            total_supply,
            adjusted_supply: whole.max(Decimal::from(MIN_ADJUSTED_SUPPLY)),
        }
    }
}

/// Read the staking contract. On failure the caller keeps whatever it had.
pub async fn read_supply(staking: &dyn StakingContract) -> Option<SupplyMetric> {
    match staking.total_supply().await {
        Ok(total) => {
            let metric = SupplyMetric::from_total_supply(total);
            debug!("veOGV total supply {total} (adjusted {})", metric.adjusted_supply);
            Some(metric)
        }
        Err(e) => {
            error!("Can not fetch veOGV total supply: {e}");
            None
        }
    }
}
