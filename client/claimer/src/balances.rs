//! Staked-balance refresh fired after a successful claim.

use std::sync::Arc;

use alloy_primitives::{Address, U256};
use async_trait::async_trait;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::chain::{BalanceRefresher, StakingContract};

pub struct StakedBalances {
    staking: Arc<dyn StakingContract>,
    account: Address,
    latest: watch::Sender<Option<U256>>,
}

impl StakedBalances {
    pub fn new(staking: Arc<dyn StakingContract>, account: Address) -> Self {
        let (latest, _) = watch::channel(None);
        Self {
            staking,
            account,
            latest,
        }
    }

    /// Last successful reading, `None` until the first one.
    pub fn latest(&self) -> Option<U256> {
        *self.latest.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<U256>> {
        self.latest.subscribe()
    }
}

#[async_trait]
impl BalanceRefresher for StakedBalances {
    async fn refresh(&self) {
        match self.staking.balance_of(self.account).await {
            Ok(balance) => {
                info!("Staked balance for {} is now {balance}", self.account);
                self.latest.send_replace(Some(balance));
            }
            Err(e) => warn!("Can not refresh staked balance for {}: {e}", self.account),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockStaking;
    use std::sync::atomic::Ordering;

    #[tokio::test]
    async fn refresh_publishes_latest() {
        let staking = Arc::new(MockStaking::new(U256::ZERO));
        staking.set_balance(Some(U256::from(7u64)));
        let balances = StakedBalances::new(staking.clone(), Address::ZERO);
        let rx = balances.subscribe();

        assert_eq!(balances.latest(), None);
        balances.refresh().await;
        assert_eq!(*rx.borrow(), Some(U256::from(7u64)));
    }

    #[tokio::test]
    async fn failed_refresh_keeps_previous_value() {
        let staking = Arc::new(MockStaking::new(U256::ZERO));
        staking.set_balance(Some(U256::from(3u64)));
        let balances = StakedBalances::new(staking.clone(), Address::ZERO);
        balances.refresh().await;

        staking.set_balance(None);
        balances.refresh().await;
        assert_eq!(balances.latest(), Some(U256::from(3u64)));
        assert_eq!(staking.balance_reads.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn concurrent_refreshes_are_safe() {
        let staking = Arc::new(MockStaking::new(U256::ZERO));
        staking.set_balance(Some(U256::from(11u64)));
        let balances = StakedBalances::new(staking.clone(), Address::ZERO);

        tokio::join!(balances.refresh(), balances.refresh());
        assert_eq!(balances.latest(), Some(U256::from(11u64)));
    }
}
