use serde::{Deserialize, Serialize};

use crate::wallet::TxRef;

/// Base mainnet chain id.
pub const BASE_CHAIN_ID: u64 = 8453;

/// USDC token contract on Base.
pub const USDC_CONTRACT_ADDRESS: &str = "0x833589fCD6eDb6E08f4c7C32D4f71b54bdA02913";

/// Address that receives Pro subscription payments.
pub const RECIPIENT_ADDRESS: &str = "0xcdbb00f8ef99436a89796ecd8358e31d";

/// Block explorer link for a submitted transaction.
pub fn explorer_url(tx_ref: &TxRef) -> String {
    format!("https://basescan.org/tx/{}", tx_ref)
}

/// Settlement status of a submitted transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfirmationStatus {
    Confirmed { confirmations: u32 },
    Pending,
    Failed { reason: String },
}

impl ConfirmationStatus {
    pub fn is_confirmed(&self) -> bool {
        matches!(self, ConfirmationStatus::Confirmed { .. })
    }
}

/// Errors from confirmation lookups.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChainError {
    #[error("status lookup failed: {0}")]
    LookupFailed(String),
    #[error("chain provider unavailable: {0}")]
    Unavailable(String),
}

/// Abstraction over whatever reports on-chain status for a transaction
/// reference (an RPC provider, the verifier's status endpoint, a mock).
#[allow(async_fn_in_trait)]
pub trait ConfirmationSource {
    async fn check(&self, tx_ref: &TxRef) -> Result<ConfirmationStatus, ChainError>;

    /// Human-readable name of this source.
    fn source_name(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explorer_url_points_at_basescan() {
        assert_eq!(
            explorer_url(&TxRef::from("0xabc")),
            "https://basescan.org/tx/0xabc"
        );
    }

    #[test]
    fn only_confirmed_counts_as_confirmed() {
        assert!(ConfirmationStatus::Confirmed { confirmations: 1 }.is_confirmed());
        assert!(!ConfirmationStatus::Pending.is_confirmed());
        assert!(!ConfirmationStatus::Failed {
            reason: "reverted".into()
        }
        .is_confirmed());
    }
}
