//! Drives one tranche's claim transaction: submit → confirm → finalize.
//!
//! State lives in a [`watch`] channel so observers see every committed
//! transition. The check-and-set out of `Ready` is done inside
//! [`watch::Sender::send_if_modified`], so a second `claim` racing the first
//! is rejected with [`ClaimError::NotReady`] instead of submitting twice.
//!
//! A hash submitted before a failure may still land on-chain after the tranche
//! reset to `Ready`. The next verification pass picks that up and moves the
//! tranche to `Claimed`.

use std::sync::Arc;
use std::time::Duration;

use alloy_primitives::{Address, U256};
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, warn};

use crate::chain::{BalanceRefresher, ConfirmationSource, DistributorContract, TxSigner};
use crate::errors::{ClaimError, Result};
use crate::events::{ClaimEvent, ClaimEventKind};
use crate::types::{
    ClaimArgs, ClaimEntry, ClaimTransition, ClaimTxState, Receipt, Tranche, TxHash, TxRequest,
};

/// Everything a single `claim` invocation needs besides the manager itself.
pub struct ClaimCall<'a> {
    pub distributor: &'a dyn DistributorContract,
    pub signer: &'a dyn TxSigner,
    pub entry: &'a ClaimEntry,
    /// Required for the optional tranche, rejected for the mandatory one.
    pub lock_duration: Option<U256>,
}

pub struct TxLifecycleManager {
    tranche: Tranche,
    account: Address,
    state: watch::Sender<ClaimTxState>,
    confirmations: Arc<dyn ConfirmationSource>,
    refresher: Arc<dyn BalanceRefresher>,
    events: broadcast::Sender<ClaimEvent>,
    simulate_latency: Option<Duration>,
}

impl TxLifecycleManager {
    pub fn new(
        tranche: Tranche,
        account: Address,
        confirmations: Arc<dyn ConfirmationSource>,
        refresher: Arc<dyn BalanceRefresher>,
        events: broadcast::Sender<ClaimEvent>,
        simulate_latency: Option<Duration>,
    ) -> Self {
        let (state, _) = watch::channel(ClaimTxState::Ready);
        Self {
            tranche,
            account,
            state,
            confirmations,
            refresher,
            events,
            simulate_latency,
        }
    }

    pub fn tranche(&self) -> Tranche {
        self.tranche
    }

    pub fn state(&self) -> ClaimTxState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<ClaimTxState> {
        self.state.subscribe()
    }

    /// Verification found the index already claimed on-chain.
    pub fn mark_claimed(&self) {
        let before = self.state();
        if before.is_claimed() {
            return;
        }
        if self.transition(ClaimTransition::AlreadyClaimed).is_some() {
            info!("{} claim already claimed on-chain", self.tranche);
            self.emit(ClaimEvent::now(
                self.tranche,
                self.account,
                ClaimEventKind::AlreadyClaimed,
            ));
        }
    }

    /// Run the full claim. Write-path errors are returned after the tranche
    /// has been reset to `Ready`. A mined-but-failed transaction is not an
    /// error: the receipt comes back and the tranche is `Ready` again.
    pub async fn claim(&self, call: ClaimCall<'_>) -> Result<Receipt> {
        let args = self.claim_args(call.entry, call.lock_duration)?;
        let data = call.distributor.encode_claim(&args)?;

        if self.transition(ClaimTransition::Invoke).is_none() {
            return Err(ClaimError::NotReady {
                tranche: self.tranche,
                state: self.state(),
            });
        }
        info!("{} claim: waiting for user confirmation", self.tranche);

        let request = TxRequest {
            from: self.account,
            to: call.distributor.address(),
            data,
            gas_limit: self.tranche.gas_limit(),
        };

        let tx_hash = match call.signer.send_transaction(request).await {
            Ok(hash) => hash,
            Err(e) => {
                warn!("{} claim not submitted: {e}", self.tranche);
                self.transition(ClaimTransition::SignerFailed);
                self.emit(
                    ClaimEvent::now(self.tranche, self.account, ClaimEventKind::Rejected)
                        .with_detail(e.to_string()),
                );
                return Err(e);
            }
        };

        self.transition(ClaimTransition::Submitted(tx_hash));
        self.emit(
            ClaimEvent::now(self.tranche, self.account, ClaimEventKind::Submitted)
                .with_hash(tx_hash),
        );
        info!("{} claim submitted: {tx_hash}", self.tranche);

        let receipt = match self.wait_for_receipt(tx_hash).await {
            Ok(receipt) => receipt,
            Err(e) => {
                warn!("{} claim {tx_hash} not confirmed: {e}", self.tranche);
                self.transition(ClaimTransition::WaitFailed);
                self.emit(
                    ClaimEvent::now(self.tranche, self.account, ClaimEventKind::Dropped)
                        .with_hash(tx_hash)
                        .with_detail(e.to_string()),
                );
                return Err(e);
            }
        };

        if receipt.is_success() {
            self.transition(ClaimTransition::ReceiptSucceeded);
            self.emit(
                ClaimEvent::now(self.tranche, self.account, ClaimEventKind::Confirmed)
                    .with_hash(tx_hash),
            );
            info!("{} claim confirmed in {tx_hash}", self.tranche);
            self.refresher.refresh().await;
        } else {
            self.transition(ClaimTransition::ReceiptFailed);
            self.emit(
                ClaimEvent::now(self.tranche, self.account, ClaimEventKind::Reverted)
                    .with_hash(tx_hash)
                    .with_detail(format!("status {}", receipt.status)),
            );
            warn!(
                "{} claim {tx_hash} failed with status {}",
                self.tranche, receipt.status
            );
        }

        Ok(receipt)
    }

    fn claim_args(&self, entry: &ClaimEntry, lock_duration: Option<U256>) -> Result<ClaimArgs> {
        let amount = entry.amount.ok_or_else(|| {
            ClaimError::InvalidRequest(format!("{} claim has no amount", self.tranche))
        })?;
        match (self.tranche, lock_duration) {
            (Tranche::Optional, None) => Err(ClaimError::InvalidRequest(
                "optional claim needs a lock duration".to_string(),
            )),
            (Tranche::Mandatory, Some(_)) => Err(ClaimError::InvalidRequest(
                "mandatory claim takes no lock duration".to_string(),
            )),
            _ => Ok(ClaimArgs {
                index: U256::from(entry.index),
                amount,
                proof: entry.proof.clone(),
                lock_duration,
            }),
        }
    }

    async fn wait_for_receipt(&self, tx_hash: TxHash) -> Result<Receipt> {
        let receipt = self.confirmations.wait_for_transaction(tx_hash).await?;
        if let Some(delay) = self.simulate_latency {
            debug!("Holding {} receipt for {delay:?}", self.tranche);
            tokio::time::sleep(delay).await;
        }
        Ok(receipt)
    }

    /// Apply `transition` atomically. Returns the new state, or `None` if the
    /// transition was not allowed and nothing changed.
    fn transition(&self, transition: ClaimTransition) -> Option<ClaimTxState> {
        let mut next = None;
        self.state.send_if_modified(|state| match state.apply(transition) {
            Some(new_state) => {
                let changed = new_state != *state;
                *state = new_state;
                next = Some(new_state);
                changed
            }
            None => false,
        });
        if next.is_none() {
            debug!(
                "{} ignored {transition:?} in state {}",
                self.tranche,
                self.state()
            );
        }
        next
    }

    fn emit(&self, event: ClaimEvent) {
        // No subscribers just means nobody is journaling.
        let _ = self.events.send(event);
    }
}
