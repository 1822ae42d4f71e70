//! In-memory collaborators for development and tests.
//!
//! Each mock records how often it was called and can be scripted with a
//! queue of answers, falling back to a default once the queue is empty. A
//! mock can also be gated on a `Notify` so a test can hold a call in flight.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::Notify;

use crate::chain::{ChainError, ConfirmationSource, ConfirmationStatus};
use crate::subscription::{
    LedgerError, SubscriptionAck, SubscriptionLedger, SubscriptionState, UserRecord,
    DEFAULT_USER_ID,
};
use crate::wallet::{PayerId, PaymentRequest, PaymentWallet, TxRef, WalletError};

async fn pass_gate(gate: &Option<Arc<Notify>>) {
    if let Some(gate) = gate {
        gate.notified().await;
    }
}

fn pop<T>(queue: &Mutex<VecDeque<T>>) -> Option<T> {
    queue.lock().unwrap_or_else(|e| e.into_inner()).pop_front()
}

// ─── Wallet ──────────────────────────────────────────────────────────────────

/// Mock wallet. Submissions return scripted results, then `0xmock{n}`.
pub struct MockWallet {
    payer: Option<PayerId>,
    script: Mutex<VecDeque<Result<TxRef, WalletError>>>,
    requests: Mutex<Vec<PaymentRequest>>,
    submissions: AtomicUsize,
    gate: Option<Arc<Notify>>,
}

impl MockWallet {
    pub fn connected(payer: &str) -> Self {
        Self {
            payer: Some(PayerId(payer.to_string())),
            script: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
            submissions: AtomicUsize::new(0),
            gate: None,
        }
    }

    pub fn disconnected() -> Self {
        Self {
            payer: None,
            ..Self::connected("")
        }
    }

    /// Queue a successful submission returning `tx_ref`.
    pub fn returning(self, tx_ref: &str) -> Self {
        self.push(Ok(TxRef::from(tx_ref)))
    }

    /// Queue a failed submission.
    pub fn failing(self, error: WalletError) -> Self {
        self.push(Err(error))
    }

    /// Hold every submission until `gate` is notified.
    pub fn gated(mut self, gate: Arc<Notify>) -> Self {
        self.gate = Some(gate);
        self
    }

    fn push(self, result: Result<TxRef, WalletError>) -> Self {
        self.script
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(result);
        self
    }

    pub fn submissions(&self) -> usize {
        self.submissions.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<PaymentRequest> {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

impl PaymentWallet for MockWallet {
    fn payer(&self) -> Option<PayerId> {
        self.payer.clone()
    }

    async fn submit(&self, request: &PaymentRequest) -> Result<TxRef, WalletError> {
        let n = self.submissions.fetch_add(1, Ordering::SeqCst) + 1;
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(request.clone());
        pass_gate(&self.gate).await;
        pop(&self.script).unwrap_or_else(|| Ok(TxRef(format!("0xmock{n}"))))
    }

    fn wallet_name(&self) -> &str {
        "mock"
    }
}

// ─── Chain ───────────────────────────────────────────────────────────────────

/// Mock confirmation source.
pub struct MockChain {
    fallback: ConfirmationStatus,
    script: Mutex<VecDeque<Result<ConfirmationStatus, ChainError>>>,
    checked: Mutex<Vec<TxRef>>,
    gate: Option<Arc<Notify>>,
}

impl MockChain {
    /// Every check answers `status` unless scripted otherwise.
    pub fn always(status: ConfirmationStatus) -> Self {
        Self {
            fallback: status,
            script: Mutex::new(VecDeque::new()),
            checked: Mutex::new(Vec::new()),
            gate: None,
        }
    }

    pub fn confirmed() -> Self {
        Self::always(ConfirmationStatus::Confirmed { confirmations: 12 })
    }

    /// Answers returned, in order, before falling back.
    pub fn with_script(self, script: Vec<Result<ConfirmationStatus, ChainError>>) -> Self {
        *self.script.lock().unwrap_or_else(|e| e.into_inner()) = script.into();
        self
    }

    pub fn gated(mut self, gate: Arc<Notify>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn checks(&self) -> usize {
        self.checked.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn checked(&self) -> Vec<TxRef> {
        self.checked
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

impl ConfirmationSource for MockChain {
    async fn check(&self, tx_ref: &TxRef) -> Result<ConfirmationStatus, ChainError> {
        self.checked
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(tx_ref.clone());
        pass_gate(&self.gate).await;
        pop(&self.script).unwrap_or_else(|| Ok(self.fallback.clone()))
    }

    fn source_name(&self) -> &str {
        "mock"
    }
}

// ─── Ledger ──────────────────────────────────────────────────────────────────

/// Mock subscription ledger. Accepts every payment unless scripted otherwise.
pub struct MockLedger {
    script: Mutex<VecDeque<Result<SubscriptionAck, LedgerError>>>,
    recorded: Mutex<Vec<TxRef>>,
    gate: Option<Arc<Notify>>,
}

impl MockLedger {
    pub fn accepting() -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            recorded: Mutex::new(Vec::new()),
            gate: None,
        }
    }

    /// Next call answers `{ success: false }`.
    pub fn unsuccessful(self) -> Self {
        self.push(Ok(SubscriptionAck {
            success: false,
            user: None,
        }))
    }

    /// Next call fails with `error`.
    pub fn failing(self, error: LedgerError) -> Self {
        self.push(Err(error))
    }

    pub fn gated(mut self, gate: Arc<Notify>) -> Self {
        self.gate = Some(gate);
        self
    }

    fn push(self, result: Result<SubscriptionAck, LedgerError>) -> Self {
        self.script
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(result);
        self
    }

    pub fn calls(&self) -> usize {
        self.recorded.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn recorded(&self) -> Vec<TxRef> {
        self.recorded
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

impl SubscriptionLedger for MockLedger {
    async fn record_payment(&self, tx_ref: &TxRef) -> Result<SubscriptionAck, LedgerError> {
        self.recorded
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(tx_ref.clone());
        pass_gate(&self.gate).await;
        pop(&self.script).unwrap_or_else(|| {
            Ok(SubscriptionAck {
                success: true,
                user: Some(UserRecord {
                    id: DEFAULT_USER_ID.to_string(),
                    subscription: SubscriptionState {
                        is_pro: true,
                        expiry: None,
                    },
                }),
            })
        })
    }
}

// ─── Dev wallet ──────────────────────────────────────────────────────────────

/// Development wallet that "submits" instantly and hands back a random
/// 32-byte transaction hash. No funds move.
#[cfg(feature = "dev")]
pub struct DevWallet {
    payer: Option<PayerId>,
}

#[cfg(feature = "dev")]
impl DevWallet {
    pub fn new(payer: Option<String>) -> Self {
        Self {
            payer: payer.map(PayerId),
        }
    }
}

#[cfg(feature = "dev")]
impl PaymentWallet for DevWallet {
    fn payer(&self) -> Option<PayerId> {
        self.payer.clone()
    }

    async fn submit(&self, request: &PaymentRequest) -> Result<TxRef, WalletError> {
        let hash: [u8; 32] = rand::random();
        let tx_ref = TxRef(format!("0x{}", hex::encode(hash)));
        tracing::debug!(
            "dev wallet: {} from {} -> {} ({})",
            request.amount,
            request.payer,
            crate::chain::RECIPIENT_ADDRESS,
            tx_ref
        );
        Ok(tx_ref)
    }

    fn wallet_name(&self) -> &str {
        "dev"
    }
}
