//! Claim coordinator: composes eligibility, verification, supply and the
//! per-tranche lifecycle managers behind one re-enterable view.
//!
//! Three inputs drive recomputation: the account, the contract bindings and
//! the signer. Each change is an explicit call (`set_account`,
//! `set_contracts`, `set_signer`). Work is split in three stages, each with
//! its own generation counter and [`CancellationToken`]:
//!
//! * **eligibility**: restarted only by an account change or `reload`.
//! * **verification**: restarted by any input change.
//! * **supply**: restarted by a binding change. Runs alongside verification
//!   and never gates it.
//!
//! Starting a stage cancels the previous run of that stage, and a result is
//! only committed if its generation is still current when the session lock
//! is taken. Late answers for an old account or old bindings are dropped.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use alloy_primitives::{Address, B256, U256};
use serde::Serialize;
use tokio::sync::{broadcast, Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::chain::{
    BalanceRefresher, ConfirmationSource, DistributorContract, StakingContract, TxSigner,
};
use crate::eligibility::EligibilitySource;
use crate::errors::{ClaimError, Result};
use crate::events::ClaimEvent;
use crate::lifecycle::{ClaimCall, TxLifecycleManager};
use crate::supply::{read_supply, SupplyMetric};
use crate::types::{ClaimEntry, ClaimTxState, Eligibility, Receipt, Tranche, TxHash, VerifiedClaim};
use crate::verifier::verify_claim;

/// On-chain contracts the coordinator reads from and claims against.
#[derive(Clone)]
pub struct ContractBindings {
    pub optional: Arc<dyn DistributorContract>,
    pub mandatory: Arc<dyn DistributorContract>,
    pub staking: Arc<dyn StakingContract>,
}

impl ContractBindings {
    pub fn distributor(&self, tranche: Tranche) -> &Arc<dyn DistributorContract> {
        match tranche {
            Tranche::Optional => &self.optional,
            Tranche::Mandatory => &self.mandatory,
        }
    }
}

/// Fixed collaborators, passed in once.
pub struct CoordinatorContext {
    pub eligibility: Arc<dyn EligibilitySource>,
    pub confirmations: Arc<dyn ConfirmationSource>,
    pub refresher: Arc<dyn BalanceRefresher>,
    pub events: broadcast::Sender<ClaimEvent>,
    pub simulate_latency: Option<Duration>,
}

#[derive(Default)]
struct Session {
    account: Option<Address>,
    /// `None` until the eligibility fetch for `account` has committed.
    eligibility: Option<Eligibility>,
    eligibility_error: Option<String>,
    verified: BTreeMap<Tranche, VerifiedClaim>,
    managers: BTreeMap<Tranche, Arc<TxLifecycleManager>>,
    loaded: bool,
}

#[derive(Default)]
struct Inputs {
    contracts: Option<ContractBindings>,
    signer: Option<Arc<dyn TxSigner>>,
}

#[derive(Default)]
struct Stage {
    generation: AtomicU64,
    token: Mutex<CancellationToken>,
}

impl Stage {
    async fn begin(&self) -> (u64, CancellationToken) {
        let mut token = self.token.lock().await;
        token.cancel();
        *token = CancellationToken::new();
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        (generation, token.clone())
    }

    fn is_current(&self, generation: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == generation
    }
}

pub struct ClaimCoordinator {
    ctx: CoordinatorContext,
    session: RwLock<Session>,
    inputs: RwLock<Inputs>,
    supply: RwLock<Option<SupplyMetric>>,
    eligibility_stage: Stage,
    verify_stage: Stage,
    supply_stage: Stage,
}

impl ClaimCoordinator {
    pub fn new(ctx: CoordinatorContext) -> Self {
        Self {
            ctx,
            session: RwLock::new(Session::default()),
            inputs: RwLock::new(Inputs::default()),
            supply: RwLock::new(None),
            eligibility_stage: Stage::default(),
            verify_stage: Stage::default(),
            supply_stage: Stage::default(),
        }
    }

    // ─────────────────────────────────────────────────────
    // Inputs
    // ─────────────────────────────────────────────────────

    /// Switch accounts. All per-account state is dropped before the new
    /// eligibility is fetched.
    pub async fn set_account(&self, account: Option<Address>) {
        let (generation, token) = self.eligibility_stage.begin().await;
        self.verify_stage.begin().await;

        {
            let mut session = self.session.write().await;
            *session = Session {
                account,
                managers: account
                    .map(|a| self.new_managers(a))
                    .unwrap_or_default(),
                ..Session::default()
            };
        }

        if let Some(account) = account {
            info!("Account changed to {account}");
            self.load_eligibility(account, generation, token).await;
        }
    }

    pub async fn set_contracts(&self, contracts: Option<ContractBindings>) {
        let staking = contracts.as_ref().map(|c| c.staking.clone());
        self.inputs.write().await.contracts = contracts;

        tokio::join!(self.refresh_supply(staking), self.reverify());
    }

    pub async fn set_signer(&self, signer: Option<Arc<dyn TxSigner>>) {
        self.inputs.write().await.signer = signer;
        self.reverify().await;
    }

    /// Re-fetch eligibility for the current account and re-verify, keeping
    /// claim state.
    pub async fn reload(&self) {
        let Some(account) = self.session.read().await.account else {
            return;
        };
        let (generation, token) = self.eligibility_stage.begin().await;
        self.load_eligibility(account, generation, token).await;
    }

    // ─────────────────────────────────────────────────────
    // Stages
    // ─────────────────────────────────────────────────────

    async fn load_eligibility(&self, account: Address, generation: u64, token: CancellationToken) {
        self.session.write().await.loaded = false;

        let fetched = tokio::select! {
            _ = token.cancelled() => {
                debug!("Eligibility fetch for {account} superseded");
                return;
            }
            fetched = self.ctx.eligibility.fetch(account) => fetched,
        };

        {
            let mut session = self.session.write().await;
            if !self.eligibility_stage.is_current(generation) || session.account != Some(account) {
                debug!("Dropping stale eligibility for {account}");
                return;
            }
            match fetched {
                Ok(eligibility) => {
                    if !eligibility.has_any_claim() {
                        // Nothing else to fetch.
                        session.loaded = true;
                    }
                    session.eligibility = Some(eligibility);
                    session.eligibility_error = None;
                }
                Err(e) => {
                    error!("Error fetching claim eligibility for {account}: {e}");
                    session.eligibility = None;
                    session.eligibility_error = Some(e.to_string());
                    session.loaded = true;
                    return;
                }
            }
        }

        self.reverify().await;
    }

    /// Re-run the proof verification for every tranche with a claim.
    pub async fn reverify(&self) {
        let (generation, token) = self.verify_stage.begin().await;

        let Some(contracts) = self.inputs.read().await.contracts.clone() else {
            return;
        };

        let (account, eligibility) = {
            let mut session = self.session.write().await;
            let (Some(account), Some(eligibility)) =
                (session.account, session.eligibility.clone())
            else {
                return;
            };
            if !eligibility.has_any_claim() {
                return;
            }
            session.verified.clear();
            session.loaded = false;
            (account, eligibility)
        };

        let work = async {
            tokio::join!(
                verify_tranche(&contracts, account, &eligibility, Tranche::Optional),
                verify_tranche(&contracts, account, &eligibility, Tranche::Mandatory),
            )
        };
        let (optional, mandatory) = tokio::select! {
            _ = token.cancelled() => {
                debug!("Verification for {account} superseded");
                return;
            }
            results = work => results,
        };

        let mut session = self.session.write().await;
        if !self.verify_stage.is_current(generation) || session.account != Some(account) {
            debug!("Dropping stale verification for {account}");
            return;
        }
        for (tranche, result) in [(Tranche::Optional, optional), (Tranche::Mandatory, mandatory)] {
            match result {
                Some(Ok(verified)) => {
                    if verified.is_claimed {
                        if let Some(manager) = session.managers.get(&tranche) {
                            manager.mark_claimed();
                        }
                    }
                    session.verified.insert(tranche, verified);
                }
                Some(Err(e)) => {
                    error!("Error fetching {tranche} distributor state: {e}");
                }
                None => {}
            }
        }
        session.loaded = true;
    }

    /// Re-read the staked supply. A failed read keeps the previous metric.
    async fn refresh_supply(&self, staking: Option<Arc<dyn StakingContract>>) {
        let (generation, token) = self.supply_stage.begin().await;
        let Some(staking) = staking else {
            return;
        };

        let metric = tokio::select! {
            _ = token.cancelled() => {
                debug!("Supply read superseded");
                return;
            }
            metric = read_supply(staking.as_ref()) => metric,
        };

        let mut supply = self.supply.write().await;
        if !self.supply_stage.is_current(generation) {
            debug!("Dropping stale supply reading");
            return;
        }
        if let Some(metric) = metric {
            *supply = Some(metric);
        }
    }

    fn new_managers(&self, account: Address) -> BTreeMap<Tranche, Arc<TxLifecycleManager>> {
        Tranche::ALL
            .into_iter()
            .map(|tranche| {
                let manager = TxLifecycleManager::new(
                    tranche,
                    account,
                    self.ctx.confirmations.clone(),
                    self.ctx.refresher.clone(),
                    self.ctx.events.clone(),
                    self.ctx.simulate_latency,
                );
                (tranche, Arc::new(manager))
            })
            .collect()
    }

    // ─────────────────────────────────────────────────────
    // Outputs
    // ─────────────────────────────────────────────────────

    /// Claim handle for `tranche`, once its verification has committed.
    pub async fn handle(&self, tranche: Tranche) -> Option<ClaimHandle> {
        let contracts = self.inputs.read().await.contracts.clone()?;
        let signer = self.inputs.read().await.signer.clone();
        let session = self.session.read().await;

        Some(ClaimHandle {
            tranche,
            account: session.account?,
            entry: session.eligibility.as_ref()?.get(tranche)?.clone(),
            verified: *session.verified.get(&tranche)?,
            distributor: contracts.distributor(tranche).clone(),
            signer,
            manager: session.managers.get(&tranche)?.clone(),
        })
    }

    pub async fn claim(&self, tranche: Tranche, lock_duration: Option<U256>) -> Result<Receipt> {
        let handle = self
            .handle(tranche)
            .await
            .ok_or(ClaimError::NotLoaded(tranche))?;
        handle.claim(lock_duration).await
    }

    /// Live state of one tranche's lifecycle (`Ready` when there is no account).
    pub async fn state(&self, tranche: Tranche) -> ClaimTxState {
        self.session
            .read()
            .await
            .managers
            .get(&tranche)
            .map(|m| m.state())
            .unwrap_or_default()
    }

    pub async fn is_loaded(&self) -> bool {
        self.session.read().await.loaded
    }

    pub async fn view(&self) -> ClaimView {
        let session = self.session.read().await;
        let tranche_view = |tranche: Tranche| {
            let entry = session.eligibility.as_ref().and_then(|e| e.get(tranche));
            let verified = session.verified.get(&tranche);
            let state = session
                .managers
                .get(&tranche)
                .map(|m| m.state())
                .unwrap_or_default();
            TrancheView {
                state,
                tx_hash: state.tx_hash(),
                has_claim: entry.is_some(),
                index: entry.map(|e| e.index),
                amount: entry.and_then(|e| e.amount),
                proof: entry.map(|e| e.proof.clone()).unwrap_or_default(),
                split: entry.map(|e| e.split.clone()).unwrap_or_default(),
                is_claimed: verified.map(|v| v.is_claimed),
                is_valid: verified.map(|v| v.is_valid),
            }
        };

        ClaimView {
            account: session.account,
            optional: tranche_view(Tranche::Optional),
            mandatory: tranche_view(Tranche::Mandatory),
            staking: *self.supply.read().await,
            has_claim: session
                .eligibility
                .as_ref()
                .is_some_and(Eligibility::has_any_claim),
            loaded: session.loaded,
            eligibility_error: session.eligibility_error.clone(),
        }
    }
}

async fn verify_tranche(
    contracts: &ContractBindings,
    account: Address,
    eligibility: &Eligibility,
    tranche: Tranche,
) -> Option<Result<VerifiedClaim>> {
    let entry = eligibility.get(tranche)?;
    Some(verify_claim(contracts.distributor(tranche).as_ref(), account, entry).await)
}

/// Everything needed to claim one tranche: the verified leaf plus the
/// contract, signer and lifecycle it runs through.
#[derive(Clone)]
pub struct ClaimHandle {
    pub tranche: Tranche,
    pub account: Address,
    pub entry: ClaimEntry,
    pub verified: VerifiedClaim,
    distributor: Arc<dyn DistributorContract>,
    signer: Option<Arc<dyn TxSigner>>,
    manager: Arc<TxLifecycleManager>,
}

impl ClaimHandle {
    pub fn is_claimed(&self) -> bool {
        self.verified.is_claimed
    }

    pub fn is_valid(&self) -> bool {
        self.verified.is_valid
    }

    pub fn state(&self) -> ClaimTxState {
        self.manager.state()
    }

    pub async fn claim(&self, lock_duration: Option<U256>) -> Result<Receipt> {
        let signer = self.signer.as_deref().ok_or(ClaimError::SignerUnavailable)?;
        self.manager
            .claim(ClaimCall {
                distributor: self.distributor.as_ref(),
                signer,
                entry: &self.entry,
                lock_duration,
            })
            .await
    }
}

// ─────────────────────────────────────────────────────────
// View
// ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrancheView {
    pub state: ClaimTxState,
    pub tx_hash: Option<TxHash>,
    pub has_claim: bool,
    pub index: Option<u64>,
    pub amount: Option<U256>,
    pub proof: Vec<B256>,
    pub split: BTreeMap<String, Option<U256>>,
    pub is_claimed: Option<bool>,
    pub is_valid: Option<bool>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimView {
    pub account: Option<Address>,
    pub optional: TrancheView,
    pub mandatory: TrancheView,
    pub staking: Option<SupplyMetric>,
    pub has_claim: bool,
    pub loaded: bool,
    pub eligibility_error: Option<String>,
}

// ─────────────────────────────────────────────────────────
// Unit tests
// ─────────────────────────────────────────────────────────
