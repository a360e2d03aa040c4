//! In-memory collaborators for unit tests.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use alloy_primitives::{Address, Bytes, B256, U256};
use async_trait::async_trait;
use tokio::sync::{watch, Notify};

use crate::chain::{
    BalanceRefresher, ConfirmationSource, DistributorContract, StakingContract, TxSigner,
};
use crate::eligibility::EligibilitySource;
use crate::errors::{ClaimError, Result};
use crate::types::{ClaimArgs, ClaimEntry, ClaimTxState, Eligibility, Receipt, TxHash, TxRequest};

/// 500 tokens with a three-node proof.
pub fn entry(index: u64) -> ClaimEntry {
    ClaimEntry {
        index,
        amount: Some(U256::from(500u64) * U256::from(10u64).pow(U256::from(18u64))),
        proof: vec![
            B256::repeat_byte(1),
            B256::repeat_byte(2),
            B256::repeat_byte(3),
        ],
        split: Default::default(),
    }
}

// ─────────────────────────────────────────────────────────
// Distributor
// ─────────────────────────────────────────────────────────

#[derive(Default)]
struct DistributorInner {
    is_claimed: Mutex<bool>,
    is_valid: bool,
    fail: bool,
    reads: AtomicUsize,
    encoded: Mutex<Vec<ClaimArgs>>,
    gate: Mutex<Option<Arc<Notify>>>,
}

#[derive(Clone, Default)]
pub struct MockDistributor(Arc<DistributorInner>);

impl MockDistributor {
    pub fn new(is_claimed: bool, is_valid: bool) -> Self {
        Self(Arc::new(DistributorInner {
            is_claimed: Mutex::new(is_claimed),
            is_valid,
            ..Default::default()
        }))
    }

    pub fn failing() -> Self {
        Self(Arc::new(DistributorInner {
            fail: true,
            ..Default::default()
        }))
    }

    pub fn set_claimed(&self, claimed: bool) {
        *self.0.is_claimed.lock().unwrap() = claimed;
    }

    /// Reads block until the returned handle is notified.
    pub fn hold(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.0.gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    pub fn read_calls(&self) -> usize {
        self.0.reads.load(Ordering::SeqCst)
    }

    pub fn last_encoded(&self) -> Option<ClaimArgs> {
        self.0.encoded.lock().unwrap().last().cloned()
    }

    async fn read(&self) -> Result<()> {
        self.0.reads.fetch_add(1, Ordering::SeqCst);
        let gate = self.0.gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        if self.0.fail {
            return Err(ClaimError::ContractCall("node unreachable".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl DistributorContract for MockDistributor {
    fn address(&self) -> Address {
        Address::repeat_byte(0xd1)
    }

    async fn is_claimed(&self, _index: U256) -> Result<bool> {
        self.read().await?;
        Ok(*self.0.is_claimed.lock().unwrap())
    }

    async fn is_proof_valid(&self, _account: Address, _entry: &ClaimEntry) -> Result<bool> {
        self.read().await?;
        Ok(self.0.is_valid)
    }

    fn encode_claim(&self, args: &ClaimArgs) -> Result<Bytes> {
        self.0.encoded.lock().unwrap().push(args.clone());
        Ok(Bytes::from_static(b"claim"))
    }
}

// ─────────────────────────────────────────────────────────
// Staking
// ─────────────────────────────────────────────────────────

pub struct MockStaking {
    total_supply: Option<U256>,
    delay: Option<Duration>,
    supply_reads: AtomicUsize,
    balance: Mutex<Option<U256>>,
    pub balance_reads: AtomicUsize,
}

impl MockStaking {
    pub fn new(total_supply: U256) -> Self {
        Self {
            total_supply: Some(total_supply),
            delay: None,
            supply_reads: AtomicUsize::new(0),
            balance: Mutex::new(Some(U256::ZERO)),
            balance_reads: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            total_supply: None,
            delay: None,
            supply_reads: AtomicUsize::new(0),
            balance: Mutex::new(None),
            balance_reads: AtomicUsize::new(0),
        }
    }

    /// `totalSupply()` answers only after `delay` has elapsed.
    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn supply_reads(&self) -> usize {
        self.supply_reads.load(Ordering::SeqCst)
    }

    pub fn set_balance(&self, balance: Option<U256>) {
        *self.balance.lock().unwrap() = balance;
    }
}

#[async_trait]
impl StakingContract for MockStaking {
    async fn total_supply(&self) -> Result<U256> {
        self.supply_reads.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.total_supply
            .ok_or_else(|| ClaimError::ContractCall("totalSupply reverted".to_string()))
    }

    async fn balance_of(&self, _account: Address) -> Result<U256> {
        self.balance_reads.fetch_add(1, Ordering::SeqCst);
        self.balance
            .lock()
            .unwrap()
            .ok_or_else(|| ClaimError::ContractCall("balanceOf reverted".to_string()))
    }
}

// ─────────────────────────────────────────────────────────
// Signer
// ─────────────────────────────────────────────────────────

#[derive(Default)]
struct SignerInner {
    script: Mutex<VecDeque<std::result::Result<TxHash, String>>>,
    requests: Mutex<Vec<TxRequest>>,
    observer: Mutex<Option<watch::Receiver<ClaimTxState>>>,
    observed: Mutex<Vec<ClaimTxState>>,
    gate: Mutex<Option<Arc<Notify>>>,
}

/// Answers `send_transaction` from a script. Rejections map to
/// `SignerRejected`.
#[derive(Clone, Default)]
pub struct ScriptedSigner(Arc<SignerInner>);

impl ScriptedSigner {
    pub fn push_hash(&self, hash: TxHash) {
        self.0.script.lock().unwrap().push_back(Ok(hash));
    }

    pub fn push_rejection(&self, reason: &str) {
        self.0
            .script
            .lock()
            .unwrap()
            .push_back(Err(reason.to_string()));
    }

    /// Record the manager's state every time the signer is asked to sign.
    pub fn observe(&self, rx: watch::Receiver<ClaimTxState>) {
        *self.0.observer.lock().unwrap() = Some(rx);
    }

    pub fn observed(&self) -> Vec<ClaimTxState> {
        self.0.observed.lock().unwrap().clone()
    }

    pub fn hold(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.0.gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    pub fn requests(&self) -> Vec<TxRequest> {
        self.0.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl TxSigner for ScriptedSigner {
    async fn send_transaction(&self, request: TxRequest) -> Result<TxHash> {
        if let Some(rx) = self.0.observer.lock().unwrap().as_ref() {
            self.0.observed.lock().unwrap().push(*rx.borrow());
        }
        self.0.requests.lock().unwrap().push(request);
        let gate = self.0.gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        match self.0.script.lock().unwrap().pop_front() {
            Some(Ok(hash)) => Ok(hash),
            Some(Err(reason)) => Err(ClaimError::SignerRejected(reason)),
            None => Err(ClaimError::Submission("no scripted response".to_string())),
        }
    }
}

// ─────────────────────────────────────────────────────────
// Confirmations
// ─────────────────────────────────────────────────────────

#[derive(Default)]
pub struct ScriptedConfirmations {
    script: Mutex<VecDeque<std::result::Result<u64, String>>>,
    calls: AtomicUsize,
    observer: Mutex<Option<watch::Receiver<ClaimTxState>>>,
    observed: Mutex<Vec<ClaimTxState>>,
}

impl ScriptedConfirmations {
    pub fn push_status(&self, status: u64) {
        self.script.lock().unwrap().push_back(Ok(status));
    }

    pub fn push_failure(&self, reason: &str) {
        self.script
            .lock()
            .unwrap()
            .push_back(Err(reason.to_string()));
    }

    pub fn observe(&self, rx: watch::Receiver<ClaimTxState>) {
        *self.observer.lock().unwrap() = Some(rx);
    }

    pub fn observed(&self) -> Vec<ClaimTxState> {
        self.observed.lock().unwrap().clone()
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ConfirmationSource for ScriptedConfirmations {
    async fn wait_for_transaction(&self, hash: TxHash) -> Result<Receipt> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(rx) = self.observer.lock().unwrap().as_ref() {
            self.observed.lock().unwrap().push(*rx.borrow());
        }
        match self.script.lock().unwrap().pop_front() {
            Some(Ok(status)) => Ok(Receipt {
                transaction_hash: hash,
                status,
                block_number: Some(1),
            }),
            Some(Err(reason)) => Err(ClaimError::Confirmation(reason)),
            None => Err(ClaimError::Confirmation("no scripted receipt".to_string())),
        }
    }
}

// ─────────────────────────────────────────────────────────
// Balance refresh
// ─────────────────────────────────────────────────────────

#[derive(Default)]
pub struct CountingRefresher(AtomicUsize);

impl CountingRefresher {
    pub fn count(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BalanceRefresher for CountingRefresher {
    async fn refresh(&self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

// ─────────────────────────────────────────────────────────
// Eligibility
// ─────────────────────────────────────────────────────────

#[derive(Default)]
pub struct StaticEligibility {
    records: Mutex<HashMap<Address, Eligibility>>,
    fail: Mutex<bool>,
    gates: Mutex<HashMap<Address, Arc<Notify>>>,
    calls: AtomicUsize,
}

impl StaticEligibility {
    pub fn insert(&self, account: Address, eligibility: Eligibility) {
        self.records.lock().unwrap().insert(account, eligibility);
    }

    pub fn set_failing(&self, fail: bool) {
        *self.fail.lock().unwrap() = fail;
    }

    /// Fetches for `account` block until the returned handle is notified.
    pub fn hold(&self, account: Address) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        self.gates.lock().unwrap().insert(account, gate.clone());
        gate
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EligibilitySource for StaticEligibility {
    async fn fetch(&self, account: Address) -> Result<Eligibility> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let gate = self.gates.lock().unwrap().get(&account).cloned();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        if *self.fail.lock().unwrap() {
            return Err(ClaimError::MalformedResponse("bad payload".to_string()));
        }
        Ok(self
            .records
            .lock()
            .unwrap()
            .get(&account)
            .cloned()
            .unwrap_or_default())
    }
}
