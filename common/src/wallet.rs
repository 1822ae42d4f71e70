use std::fmt;

use serde::{Deserialize, Serialize};

use crate::currency::UsdcAmount;

/// Wallet address of the paying user (e.g. "0x71C7...976F").
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PayerId(pub String);

/// Opaque handle to a submitted transaction, assigned by the wallet.
///
/// The flow never interprets it beyond equality; on Base it is the
/// transaction hash.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TxRef(pub String);

impl TxRef {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TxRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TxRef {
    fn from(s: &str) -> Self {
        TxRef(s.to_string())
    }
}

impl fmt::Display for PayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A single pay-to-upgrade request. Built when the user initiates an
/// upgrade and handed straight to the wallet; never stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentRequest {
    pub amount: UsdcAmount,
    pub payer: PayerId,
}

/// Errors from wallet submission.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WalletError {
    #[error("user rejected the transaction")]
    Rejected,
    #[error("insufficient balance: have {available}, need {requested}")]
    InsufficientBalance {
        available: UsdcAmount,
        requested: UsdcAmount,
    },
    #[error("submission failed: {0}")]
    SubmissionFailed(String),
    #[error("wallet unavailable: {0}")]
    Unavailable(String),
}

/// Abstraction over the wallet that signs and submits the upgrade payment.
///
/// The controller receives one at construction; it never looks a wallet up
/// from ambient state. A wallet that exists but has no connected account
/// reports `payer() == None`.
#[allow(async_fn_in_trait)]
pub trait PaymentWallet {
    /// The connected account, if any.
    fn payer(&self) -> Option<PayerId>;

    /// Sign and submit a USDC transfer, returning its reference.
    async fn submit(&self, request: &PaymentRequest) -> Result<TxRef, WalletError>;

    /// Human-readable backend name (e.g. "x402", "dev").
    fn wallet_name(&self) -> &str;
}
