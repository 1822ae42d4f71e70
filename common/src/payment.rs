//! Pay-to-upgrade flow controller.
//!
//! Drives one payment attempt from user intent to a terminal outcome:
//!
//! ```text
//! idle ──initiate──▶ submitting ──tx ref──▶ awaiting-confirmation ──confirmed + ack──▶ succeeded
//!   │                    │                          │
//!   └─ no wallet ─┐      └─ wallet error ─┐         └─ not confirmed / no ack ─┐
//!                 ▼                       ▼                                   ▼
//!                                       failed ◀───────────────────────────────┘
//! ```
//!
//! `failed` and `succeeded` are terminal for an attempt; `initiate` (or
//! `retry` from `failed`) starts a new one. `reset` returns to `idle` from
//! anywhere and bumps the attempt generation, so every late answer for the
//! abandoned attempt is dropped on arrival.

use std::fmt;

use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::cancel::CancelSignal;
use crate::chain::ConfirmationSource;
use crate::confirmation::{poll_confirmation, ConfirmationPolicy, PollOutcome};
use crate::currency::UsdcAmount;
use crate::subscription::{SubscriptionLedger, SubscriptionState, UserRecord};
use crate::wallet::{PaymentRequest, PaymentWallet, TxRef};

/// Controller state as seen by a UI.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum PaymentState {
    #[default]
    Idle,
    Submitting,
    AwaitingConfirmation,
    Succeeded,
    Failed,
}

impl PaymentState {
    /// An attempt is running and owns the controller.
    pub fn is_in_flight(self) -> bool {
        matches!(
            self,
            PaymentState::Submitting | PaymentState::AwaitingConfirmation
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, PaymentState::Succeeded | PaymentState::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PaymentState::Idle => "idle",
            PaymentState::Submitting => "submitting",
            PaymentState::AwaitingConfirmation => "awaiting-confirmation",
            PaymentState::Succeeded => "succeeded",
            PaymentState::Failed => "failed",
        }
    }
}

impl fmt::Display for PaymentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum AttemptStatus {
    Submitted,
    AwaitingConfirmation,
    Confirmed,
    Failed,
}

/// A submitted transaction and how far its confirmation has got.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PaymentAttempt {
    pub tx_ref: TxRef,
    pub status: AttemptStatus,
}

/// What the user should do about a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Remedy {
    ConnectWallet,
    RetryPayment,
    ContactSupport,
    Wait,
    StartOver,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PaymentError {
    #[error("wallet not connected: connect your wallet to continue")]
    NoWalletConnected,
    #[error("payment was not submitted: {0}")]
    SubmissionRejected(String),
    #[error("transaction did not confirm: {0}")]
    ConfirmationFailed(String),
    #[error("server failed to record subscription: {0}")]
    ServerAcknowledgmentFailed(String),
    #[error("a payment attempt is already in progress")]
    AttemptInProgress,
    #[error("payment cancelled")]
    Cancelled,
    #[error("payment cancelled after {0} was submitted; it may still settle")]
    CancelledAfterSubmission(TxRef),
    #[error("payment attempt was reset before it finished")]
    Abandoned,
    #[error("there is no failed payment to retry")]
    NothingToRetry,
}

impl PaymentError {
    pub fn remedy(&self) -> Remedy {
        match self {
            PaymentError::NoWalletConnected => Remedy::ConnectWallet,
            PaymentError::SubmissionRejected(_)
            | PaymentError::ConfirmationFailed(_)
            | PaymentError::Cancelled => Remedy::RetryPayment,
            // Funds may have moved on-chain; paying again could double-charge.
            PaymentError::ServerAcknowledgmentFailed(_)
            | PaymentError::CancelledAfterSubmission(_) => Remedy::ContactSupport,
            PaymentError::AttemptInProgress => Remedy::Wait,
            PaymentError::Abandoned | PaymentError::NothingToRetry => Remedy::StartOver,
        }
    }
}

/// Everything a UI needs to render the flow.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PaymentSnapshot {
    pub state: PaymentState,
    /// Bumped on every new attempt and every reset.
    pub generation: u64,
    pub amount: Option<UsdcAmount>,
    pub attempt: Option<PaymentAttempt>,
    pub error: Option<PaymentError>,
    /// Subscription as acknowledged by the server on success.
    pub subscription: Option<SubscriptionState>,
}

impl PaymentSnapshot {
    pub fn tx_ref(&self) -> Option<&TxRef> {
        self.attempt.as_ref().map(|a| &a.tx_ref)
    }
}

/// Outcome of a successful attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentReceipt {
    pub tx_ref: TxRef,
    pub amount: UsdcAmount,
    pub confirmations: u32,
    pub user: Option<UserRecord>,
}

/// Optional hooks fired once for every attempt that reaches a terminal state.
/// Attempts abandoned by `reset` never fire.
pub trait PaymentObserver: Send + Sync {
    fn on_success(&self, _receipt: &PaymentReceipt) {}
    fn on_failure(&self, _error: &PaymentError) {}
}

/// Drives payment attempts against injected wallet, chain and ledger
/// collaborators. At most one attempt is in flight per controller.
pub struct PaymentController<W, C, L> {
    wallet: W,
    chain: C,
    ledger: L,
    policy: ConfirmationPolicy,
    observer: Option<Box<dyn PaymentObserver>>,
    snapshot: watch::Sender<PaymentSnapshot>,
}

impl<W, C, L> PaymentController<W, C, L>
where
    W: PaymentWallet,
    C: ConfirmationSource,
    L: SubscriptionLedger,
{
    pub fn new(wallet: W, chain: C, ledger: L) -> Self {
        let (snapshot, _rx) = watch::channel(PaymentSnapshot::default());
        Self {
            wallet,
            chain,
            ledger,
            policy: ConfirmationPolicy::default(),
            observer: None,
            snapshot,
        }
    }

    pub fn with_policy(mut self, policy: ConfirmationPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_observer(mut self, observer: impl PaymentObserver + 'static) -> Self {
        self.observer = Some(Box::new(observer));
        self
    }

    pub fn wallet(&self) -> &W {
        &self.wallet
    }

    pub fn chain(&self) -> &C {
        &self.chain
    }

    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    pub fn snapshot(&self) -> PaymentSnapshot {
        self.snapshot.borrow().clone()
    }

    pub fn state(&self) -> PaymentState {
        self.snapshot.borrow().state
    }

    pub fn tx_ref(&self) -> Option<TxRef> {
        self.snapshot.borrow().tx_ref().cloned()
    }

    pub fn error(&self) -> Option<PaymentError> {
        self.snapshot.borrow().error.clone()
    }

    /// Receiver that sees every state change.
    pub fn subscribe(&self) -> watch::Receiver<PaymentSnapshot> {
        self.snapshot.subscribe()
    }

    /// Pay `amount` and upgrade. See [`initiate_with_cancel`](Self::initiate_with_cancel).
    pub async fn initiate(&self, amount: UsdcAmount) -> Result<PaymentReceipt, PaymentError> {
        self.initiate_with_cancel(amount, &CancelSignal::new()).await
    }

    /// Pay `amount` and upgrade, giving up if `cancel` fires before the
    /// transaction is confirmed. Once confirmed, the subscription update
    /// always runs to completion so a settled payment is never left
    /// unrecorded.
    pub async fn initiate_with_cancel(
        &self,
        amount: UsdcAmount,
        cancel: &CancelSignal,
    ) -> Result<PaymentReceipt, PaymentError> {
        let payer = self.wallet.payer();
        let generation = self.begin(amount, payer.is_some())?;

        let Some(payer) = payer else {
            warn!("Payment of {} refused: no wallet connected", amount);
            self.notify_failure(&PaymentError::NoWalletConnected);
            return Err(PaymentError::NoWalletConnected);
        };

        info!(
            "Attempt {}: submitting {} from {} via {}",
            generation,
            amount,
            payer,
            self.wallet.wallet_name()
        );
        let request = PaymentRequest { amount, payer };
        let submitted = tokio::select! {
            biased;
            _ = cancel.cancelled() => return self.fail(generation, PaymentError::Cancelled),
            res = self.wallet.submit(&request) => res,
        };
        let tx_ref = match submitted {
            Ok(tx_ref) => tx_ref,
            Err(e) => {
                return self.fail(generation, PaymentError::SubmissionRejected(e.to_string()))
            }
        };

        let accepted = self.advance(generation, |snap| {
            snap.state = PaymentState::AwaitingConfirmation;
            snap.attempt = Some(PaymentAttempt {
                tx_ref: tx_ref.clone(),
                status: AttemptStatus::Submitted,
            });
        });
        if !accepted {
            return Err(self.discard_stale(generation, &tx_ref));
        }
        info!("Attempt {}: submitted {}", generation, tx_ref);

        self.set_attempt_status(generation, AttemptStatus::AwaitingConfirmation);
        let polled = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                let error = PaymentError::CancelledAfterSubmission(tx_ref.clone());
                return self.fail(generation, error);
            }
            outcome = poll_confirmation(&self.chain, &tx_ref, &self.policy, || self.is_current(generation)) => outcome,
        };
        let confirmations = match polled {
            PollOutcome::Confirmed { confirmations } => confirmations,
            PollOutcome::NotConfirmed { reason } => {
                return self.fail(generation, PaymentError::ConfirmationFailed(reason))
            }
            PollOutcome::Abandoned => return Err(self.discard_stale(generation, &tx_ref)),
        };
        if !self.set_attempt_status(generation, AttemptStatus::Confirmed) {
            return Err(self.discard_stale(generation, &tx_ref));
        }
        info!(
            "Attempt {}: {} confirmed ({} confirmations), recording subscription",
            generation, tx_ref, confirmations
        );

        let ack = match self.ledger.record_payment(&tx_ref).await {
            Ok(ack) if ack.success => ack,
            Ok(_) => {
                return self.fail(
                    generation,
                    PaymentError::ServerAcknowledgmentFailed(
                        "server did not confirm the subscription update".to_string(),
                    ),
                )
            }
            Err(e) => {
                return self.fail(
                    generation,
                    PaymentError::ServerAcknowledgmentFailed(e.to_string()),
                )
            }
        };

        let receipt = PaymentReceipt {
            tx_ref: tx_ref.clone(),
            amount,
            confirmations,
            user: ack.user,
        };
        let subscription = receipt.user.as_ref().map(|u| u.subscription.clone());
        let finished = self.advance(generation, |snap| {
            snap.state = PaymentState::Succeeded;
            snap.subscription = subscription;
        });
        if !finished {
            return Err(self.discard_stale(generation, &tx_ref));
        }

        info!("Attempt {}: {} succeeded, subscription recorded", generation, tx_ref);
        if let Some(observer) = &self.observer {
            observer.on_success(&receipt);
        }
        Ok(receipt)
    }

    /// Start a new attempt with the amount of the last failed one.
    ///
    /// Refused when the failed attempt may already have moved funds
    /// (its remedy is [`Remedy::ContactSupport`]); the original error is
    /// returned again and nothing is submitted.
    pub async fn retry(&self) -> Result<PaymentReceipt, PaymentError> {
        let (state, amount, error) = {
            let snap = self.snapshot.borrow();
            (snap.state, snap.amount, snap.error.clone())
        };
        if let Some(error) = error.filter(|e| e.remedy() == Remedy::ContactSupport) {
            warn!("Refusing to retry: {}", error);
            return Err(error);
        }
        match (state, amount) {
            (PaymentState::Failed, Some(amount)) => self.initiate(amount).await,
            (s, _) if s.is_in_flight() => Err(PaymentError::AttemptInProgress),
            _ => Err(PaymentError::NothingToRetry),
        }
    }

    /// Back to `idle` from any state. An in-flight collaborator call is not
    /// interrupted, but its answer will be discarded.
    pub fn reset(&self) {
        self.snapshot.send_modify(|snap| {
            if snap.state.is_in_flight() {
                debug!("Reset abandons in-flight attempt {}", snap.generation);
            }
            *snap = PaymentSnapshot {
                generation: snap.generation + 1,
                ..PaymentSnapshot::default()
            };
        });
    }

    // ─── Transitions ─────────────────────────────────────────────────────────

    /// Claim the controller for a new attempt. Refuses without touching
    /// anything if an attempt is already in flight.
    fn begin(&self, amount: UsdcAmount, has_wallet: bool) -> Result<u64, PaymentError> {
        let mut claimed = Err(PaymentError::AttemptInProgress);
        self.snapshot.send_if_modified(|snap| {
            if snap.state.is_in_flight() {
                return false;
            }
            let generation = snap.generation + 1;
            *snap = if has_wallet {
                PaymentSnapshot {
                    state: PaymentState::Submitting,
                    generation,
                    amount: Some(amount),
                    ..PaymentSnapshot::default()
                }
            } else {
                PaymentSnapshot {
                    state: PaymentState::Failed,
                    generation,
                    amount: Some(amount),
                    error: Some(PaymentError::NoWalletConnected),
                    ..PaymentSnapshot::default()
                }
            };
            claimed = Ok(generation);
            true
        });
        if claimed.is_err() {
            debug!("Rejected concurrent initiate of {}", amount);
        }
        claimed
    }

    /// Apply `update` only if `generation` is still the active attempt.
    fn advance(&self, generation: u64, update: impl FnOnce(&mut PaymentSnapshot)) -> bool {
        self.snapshot.send_if_modified(|snap| {
            if snap.generation != generation {
                return false;
            }
            update(snap);
            true
        })
    }

    fn set_attempt_status(&self, generation: u64, status: AttemptStatus) -> bool {
        self.advance(generation, |snap| {
            if let Some(attempt) = snap.attempt.as_mut() {
                attempt.status = status;
            }
        })
    }

    fn is_current(&self, generation: u64) -> bool {
        self.snapshot.borrow().generation == generation
    }

    fn fail(&self, generation: u64, error: PaymentError) -> Result<PaymentReceipt, PaymentError> {
        let recorded = self.advance(generation, |snap| {
            snap.state = PaymentState::Failed;
            snap.error = Some(error.clone());
            if let Some(attempt) = snap.attempt.as_mut() {
                attempt.status = AttemptStatus::Failed;
            }
        });
        if !recorded {
            debug!("Attempt {} failed after reset, dropping: {}", generation, error);
            return Err(PaymentError::Abandoned);
        }
        warn!("Attempt {} failed: {}", generation, error);
        self.notify_failure(&error);
        Err(error)
    }

    fn discard_stale(&self, generation: u64, tx_ref: &TxRef) -> PaymentError {
        debug!(
            "Discarding stale response for {} (attempt {} was reset)",
            tx_ref, generation
        );
        PaymentError::Abandoned
    }

    fn notify_failure(&self, error: &PaymentError) {
        if let Some(observer) = &self.observer {
            observer.on_failure(error);
        }
    }
}
