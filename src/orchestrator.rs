//! Wallet orchestrator
//!
//! Owns the transaction lifecycle of one account on one chain:
//!
//! ```text
//! idle -> loaded -> preparing -> prepared -> confirming -> confirmed
//!                        \            \            \
//!                         +------------+------------+--> failed
//! ```
//!
//! Signing only proceeds from `prepared`, and only for the exact request
//! that was simulated and analyzed. Observers get a read-only view of the
//! state through [`WalletOrchestrator::subscribe`].

use crate::amount::Balance;
use crate::chain::Chain;
use crate::error::FailureReport;
use crate::intent::{GasEstimate, TransactionIntent, TransferRequest};
use crate::risk::{RiskAlert, RiskAnalyzer, Severity};
use crate::rpc::{self, ChainRpc};
use crate::wallet::{FeeEstimator, Signer, SimulationResult, Simulator};
use crate::{Error, Result};
use std::sync::{Arc, RwLock};
use tokio::sync::watch;

/// An account loaded into the session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    /// Secret store id the account is derived from
    pub id: String,
    pub address: String,
    pub balance: Balance,
}

/// Everything confirmation needs, produced by a successful prepare
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedTransaction {
    pub intent: TransactionIntent,
    pub simulation: SimulationResult,
    pub alerts: Vec<RiskAlert>,
    pub gas: GasEstimate,
}

impl PreparedTransaction {
    /// Most severe alert, if any
    pub fn max_severity(&self) -> Option<Severity> {
        self.alerts.iter().map(|a| a.severity).max()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrchestratorState {
    Idle,
    Loaded(Balance),
    Preparing,
    Prepared(Box<PreparedTransaction>),
    Confirming,
    /// Transaction hash reported by the node
    Confirmed(String),
    Failed(FailureReport),
}

impl OrchestratorState {
    pub fn name(&self) -> &'static str {
        match self {
            OrchestratorState::Idle => "idle",
            OrchestratorState::Loaded(_) => "loaded",
            OrchestratorState::Preparing => "preparing",
            OrchestratorState::Prepared(_) => "prepared",
            OrchestratorState::Confirming => "confirming",
            OrchestratorState::Confirmed(_) => "confirmed",
            OrchestratorState::Failed(_) => "failed",
        }
    }

    fn is_busy(&self) -> bool {
        matches!(
            self,
            OrchestratorState::Preparing | OrchestratorState::Confirming
        )
    }
}

/// Injected capabilities
pub struct Dependencies {
    pub rpc: Arc<dyn ChainRpc>,
    pub signer: Arc<dyn Signer>,
    pub simulator: Arc<dyn Simulator>,
    pub fees: Arc<dyn FeeEstimator>,
    pub analyzer: Arc<dyn RiskAnalyzer>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrchestratorConfig {
    /// Alerts at or above this severity are reported through `on_breach`
    pub breach_severity: Severity,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            breach_severity: Severity::High,
        }
    }
}

impl From<&crate::config::RiskConfig> for OrchestratorConfig {
    fn from(risk: &crate::config::RiskConfig) -> Self {
        Self {
            breach_severity: risk.breach_severity,
        }
    }
}

/// Moves the state to `failed(Cancelled)` if dropped while armed
struct InFlightGuard<'a> {
    state: &'a watch::Sender<OrchestratorState>,
    stage: &'static str,
    armed: bool,
}

impl<'a> InFlightGuard<'a> {
    fn new(state: &'a watch::Sender<OrchestratorState>, stage: &'static str) -> Self {
        Self {
            state,
            stage,
            armed: true,
        }
    }

    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            tracing::warn!(stage = self.stage, "Operation cancelled in flight");
            self.state
                .send_replace(OrchestratorState::Failed(FailureReport::from(&Error::Cancelled)));
        }
    }
}

/// Drives load → prepare → confirm for one chain
pub struct WalletOrchestrator {
    chain: Chain,
    deps: Dependencies,
    config: OrchestratorConfig,
    state: watch::Sender<OrchestratorState>,
    account: RwLock<Option<Account>>,
}

impl WalletOrchestrator {
    pub fn new(chain: Chain, deps: Dependencies, config: OrchestratorConfig) -> Self {
        let (state, _) = watch::channel(OrchestratorState::Idle);
        Self {
            chain,
            deps,
            config,
            state,
            account: RwLock::new(None),
        }
    }

    pub fn chain(&self) -> Chain {
        self.chain
    }

    /// Snapshot of the current state
    pub fn state(&self) -> OrchestratorState {
        self.state.borrow().clone()
    }

    /// Read-only stream of state changes
    pub fn subscribe(&self) -> watch::Receiver<OrchestratorState> {
        self.state.subscribe()
    }

    /// The loaded account, if any
    pub fn account(&self) -> Option<Account> {
        match self.account.read() {
            Ok(account) => account.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn set_account(&self, account: Account) {
        match self.account.write() {
            Ok(mut slot) => *slot = Some(account),
            Err(poisoned) => *poisoned.into_inner() = Some(account),
        }
    }

    fn transition(&self, next: OrchestratorState) {
        let previous = self.state.send_replace(next);
        tracing::info!(
            chain = %self.chain,
            from = previous.name(),
            to = self.state.borrow().name(),
            "State transition"
        );
    }

    fn fail(&self, error: Error) -> Error {
        tracing::error!(chain = %self.chain, kind = ?error.kind(), error = %error, "Operation failed");
        self.transition(OrchestratorState::Failed(FailureReport::from(&error)));
        error
    }

    /// Atomically move to `next` unless an operation is in flight
    fn begin(&self, next: OrchestratorState, expected: &'static str) -> Result<()> {
        self.begin_with(next, expected, || {})
    }

    /// Like [`begin`](Self::begin), running `on_commit` inside the same
    /// critical section as the state change
    fn begin_with(
        &self,
        next: OrchestratorState,
        expected: &'static str,
        on_commit: impl FnOnce(),
    ) -> Result<()> {
        let mut actual = "";
        let mut previous = "";
        let started = self.state.send_if_modified(|state| {
            if state.is_busy() {
                actual = state.name();
                return false;
            }
            previous = state.name();
            *state = next;
            on_commit();
            true
        });
        if started {
            tracing::info!(
                chain = %self.chain,
                from = previous,
                to = self.state.borrow().name(),
                "State transition"
            );
            Ok(())
        } else {
            Err(Error::state_mismatch(expected, actual))
        }
    }

    /// Derive the account `id` and fetch its balance.
    ///
    /// `id` names the root secret in the secret store. Failures land in
    /// `failed` with the error kind preserved. A prepare or confirm that
    /// started while the balance was in flight keeps its state and the load
    /// fails with `StateMismatch`.
    pub async fn load_account(&self, id: &str) -> Result<Balance> {
        if self.state.borrow().is_busy() {
            return Err(Error::state_mismatch("idle", self.state.borrow().name()));
        }

        let address = match self.deps.signer.address(id, self.chain).await {
            Ok(address) => address,
            Err(e) => return Err(self.fail_load(e)),
        };
        let value = match rpc::fetch_balance(self.deps.rpc.as_ref(), self.chain, &address).await {
            Ok(value) => value,
            Err(e) => return Err(self.fail_load(e)),
        };

        let balance = Balance::from_base_units(value, self.chain);
        tracing::info!(
            chain = %self.chain,
            %address,
            balance = %balance.amount,
            symbol = %balance.symbol,
            "Account loaded"
        );
        let account = Account {
            id: id.to_string(),
            address,
            balance: balance.clone(),
        };
        self.begin_with(OrchestratorState::Loaded(balance.clone()), "idle", || {
            self.set_account(account)
        })
        .inspect_err(|e| tracing::warn!(chain = %self.chain, error = %e, "Load discarded"))?;
        Ok(balance)
    }

    /// Record a load failure without clobbering an operation in flight
    fn fail_load(&self, error: Error) -> Error {
        tracing::error!(chain = %self.chain, kind = ?error.kind(), error = %error, "Load failed");
        let failed = OrchestratorState::Failed(FailureReport::from(&error));
        if let Err(busy) = self.begin(failed, "idle") {
            tracing::warn!(chain = %self.chain, error = %busy, "Load failure not recorded");
        }
        error
    }

    /// Simulate, price and analyze `request`.
    ///
    /// Every call runs the full sequence against fresh chain data and
    /// overwrites any earlier `prepared` result.
    pub async fn prepare_transaction(&self, request: &TransferRequest) -> Result<PreparedTransaction> {
        let account = self
            .account()
            .ok_or_else(|| Error::state_mismatch("loaded", self.state.borrow().name()))?;
        self.begin(OrchestratorState::Preparing, "loaded")?;
        let guard = InFlightGuard::new(&self.state, "preparing");

        let result = self.run_prepare(&account, request).await;
        guard.disarm();

        match result {
            Ok(prepared) => {
                tracing::info!(
                    chain = %self.chain,
                    to = %prepared.intent.to,
                    value = %prepared.intent.value,
                    simulated_ok = prepared.simulation.success,
                    alerts = prepared.alerts.len(),
                    "Transaction prepared"
                );
                self.transition(OrchestratorState::Prepared(Box::new(prepared.clone())));
                Ok(prepared)
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    async fn run_prepare(
        &self,
        account: &Account,
        request: &TransferRequest,
    ) -> Result<PreparedTransaction> {
        let mut intent = TransactionIntent::new(self.chain, account.address.as_str(), request);
        if self.chain == Chain::Ethereum {
            intent.nonce = Some(rpc::fetch_nonce(self.deps.rpc.as_ref(), &account.address).await?);
        }

        let (simulation, gas) = futures::future::join(
            self.deps.simulator.simulate(&intent),
            self.deps.fees.estimate_gas(&intent),
        )
        .await;
        let simulation = simulation?;
        let gas = gas?;

        let alerts = self.deps.analyzer.analyze(&simulation, &intent);
        self.report_breaches(&alerts);

        Ok(PreparedTransaction {
            intent,
            simulation,
            alerts,
            gas,
        })
    }

    /// Hand breach-level alerts to the analyzer off the calling task
    fn report_breaches(&self, alerts: &[RiskAlert]) {
        let breaches: Vec<RiskAlert> = alerts
            .iter()
            .filter(|a| a.severity >= self.config.breach_severity)
            .cloned()
            .collect();
        if breaches.is_empty() {
            return;
        }

        let analyzer = Arc::clone(&self.deps.analyzer);
        tokio::task::spawn_blocking(move || {
            for alert in &breaches {
                analyzer.on_breach(alert);
            }
        });
    }

    /// Sign and broadcast the prepared transaction for `request`.
    ///
    /// Fails with `StateMismatch` unless the state is `prepared` for exactly
    /// this request. Dropping the returned future after it started leaves the
    /// state `failed(Cancelled)`.
    pub async fn confirm_transaction(&self, request: &TransferRequest) -> Result<String> {
        let mut taken = None;
        let mut actual = "";
        self.state.send_if_modified(|state| match state {
            OrchestratorState::Prepared(prepared) if request.matches(&prepared.intent) => {
                taken = Some(prepared.as_ref().clone());
                *state = OrchestratorState::Confirming;
                true
            }
            OrchestratorState::Prepared(_) => {
                actual = "prepared for a different request";
                false
            }
            other => {
                actual = other.name();
                false
            }
        });
        let Some(prepared) = taken else {
            tracing::warn!(chain = %self.chain, state = actual, "Confirm rejected");
            return Err(Error::state_mismatch("prepared", actual));
        };
        tracing::info!(chain = %self.chain, from = "prepared", to = "confirming", "State transition");

        let guard = InFlightGuard::new(&self.state, "confirming");
        let result = self.sign_and_broadcast(&prepared).await;
        guard.disarm();

        match result {
            Ok(hash) => {
                tracing::info!(chain = %self.chain, %hash, "Transaction broadcast");
                self.transition(OrchestratorState::Confirmed(hash.clone()));
                Ok(hash)
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    async fn sign_and_broadcast(&self, prepared: &PreparedTransaction) -> Result<String> {
        let account = self
            .account()
            .ok_or_else(|| Error::state_mismatch("loaded", "confirming"))?;
        let signed = self
            .deps
            .signer
            .sign(&account.id, &prepared.intent, &prepared.gas)
            .await?;
        rpc::broadcast(self.deps.rpc.as_ref(), &signed).await
    }
}
