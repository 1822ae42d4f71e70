use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::currency::UsdcAmount;
use crate::wallet::TxRef;

/// Monthly Pro price, in whole USDC.
pub const PRO_PRICE_USDC: u64 = 5;

/// Length of one paid Pro period.
pub const PRO_PERIOD_DAYS: i64 = 30;

/// User id the verifier falls back to when a request carries none.
pub const DEFAULT_USER_ID: &str = "user-123";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionTier {
    #[default]
    Free,
    Pro,
}

impl SubscriptionTier {
    pub fn label(&self) -> &'static str {
        match self {
            SubscriptionTier::Free => "Free",
            SubscriptionTier::Pro => "Pro",
        }
    }

    /// Price per period; `None` for the free tier.
    pub fn price(&self) -> Option<UsdcAmount> {
        match self {
            SubscriptionTier::Free => None,
            SubscriptionTier::Pro => UsdcAmount::from_whole(PRO_PRICE_USDC).ok(),
        }
    }
}

/// One line of the plan comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlanFeature {
    pub name: &'static str,
    pub free: bool,
    pub pro: bool,
}

impl PlanFeature {
    pub fn included_in(&self, tier: SubscriptionTier) -> bool {
        match tier {
            SubscriptionTier::Free => self.free,
            SubscriptionTier::Pro => self.pro,
        }
    }
}

pub const PLAN_FEATURES: &[PlanFeature] = &[
    PlanFeature { name: "Unlimited statement uploads", free: false, pro: true },
    PlanFeature { name: "Basic spending analysis", free: true, pro: true },
    PlanFeature { name: "Advanced insights & recommendations", free: false, pro: true },
    PlanFeature { name: "Priority processing", free: false, pro: true },
    PlanFeature { name: "Export financial reports", free: false, pro: true },
    PlanFeature { name: "Email notifications", free: false, pro: true },
];

/// Features available on a tier.
pub fn features_for(tier: SubscriptionTier) -> impl Iterator<Item = &'static PlanFeature> {
    PLAN_FEATURES.iter().filter(move |f| f.included_in(tier))
}

/// Paid-tier status of a user. The verifier owns it; clients only observe it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionState {
    pub is_pro: bool,
    #[serde(rename = "subscriptionExpiry", default, skip_serializing_if = "Option::is_none")]
    pub expiry: Option<DateTime<Utc>>,
}

impl SubscriptionState {
    pub fn tier(&self) -> SubscriptionTier {
        if self.is_pro {
            SubscriptionTier::Pro
        } else {
            SubscriptionTier::Free
        }
    }

    /// Pro and not yet expired at `now`. A Pro state without expiry never lapses.
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.is_pro && self.expiry.map_or(true, |expiry| expiry > now)
    }

    /// State after one more paid period. Time left on an active
    /// subscription is carried over rather than discarded.
    ///
    /// `None` if the new expiry falls outside the representable range.
    pub fn extended(&self, now: DateTime<Utc>, period: Duration) -> Option<SubscriptionState> {
        let start = match self.expiry {
            Some(expiry) if self.is_active(now) => expiry.max(now),
            _ => now,
        };
        Some(SubscriptionState {
            is_pro: true,
            expiry: Some(start.checked_add_signed(period)?),
        })
    }
}

// ─── Verifier wire types ─────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyPaymentRequest {
    #[serde(default)]
    pub tx_hash: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

/// A user record as returned by the verifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRecord {
    pub id: String,
    #[serde(flatten)]
    pub subscription: SubscriptionState,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifyPaymentResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<UserRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionInfo {
    pub hash: String,
    pub status: String,
    pub confirmations: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionStatusResponse {
    pub success: bool,
    pub transaction: TransactionInfo,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

// ─── Subscription-update collaborator ────────────────────────────────────────

/// Server answer to a subscription-update request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionAck {
    pub success: bool,
    pub user: Option<UserRecord>,
}

impl From<VerifyPaymentResponse> for SubscriptionAck {
    fn from(resp: VerifyPaymentResponse) -> Self {
        SubscriptionAck {
            success: resp.success,
            user: resp.user,
        }
    }
}

/// Errors from the subscription-update call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    #[error("server rejected the payment ({status}): {message}")]
    Rejected { status: u16, message: String },
    #[error("server unreachable: {0}")]
    Unavailable(String),
    #[error("malformed server response: {0}")]
    Malformed(String),
}

/// The authoritative server-side record of who has paid-tier access.
#[allow(async_fn_in_trait)]
pub trait SubscriptionLedger {
    /// Ask the server to record the payment behind `tx_ref`.
    async fn record_payment(&self, tx_ref: &TxRef) -> Result<SubscriptionAck, LedgerError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pro_costs_five_usdc() {
        assert_eq!(SubscriptionTier::Pro.price(), UsdcAmount::from_whole(5).ok());
        assert_eq!(SubscriptionTier::Free.price(), None);
    }

    #[test]
    fn free_tier_has_basic_analysis_only() {
        let free: Vec<_> = features_for(SubscriptionTier::Free).map(|f| f.name).collect();
        assert_eq!(free, vec!["Basic spending analysis"]);
        assert_eq!(features_for(SubscriptionTier::Pro).count(), PLAN_FEATURES.len());
    }

    #[test]
    fn extension_starts_now_when_lapsed() {
        let now = Utc::now();
        let lapsed = SubscriptionState {
            is_pro: true,
            expiry: Some(now - Duration::days(3)),
        };
        let next = lapsed.extended(now, Duration::days(PRO_PERIOD_DAYS)).unwrap();
        assert_eq!(next.expiry, Some(now + Duration::days(30)));
        assert!(next.is_active(now));

        let free = SubscriptionState::default()
            .extended(now, Duration::days(30))
            .unwrap();
        assert_eq!(free.expiry, Some(now + Duration::days(30)));
    }

    #[test]
    fn extension_carries_over_remaining_time() {
        let now = Utc::now();
        let active = SubscriptionState {
            is_pro: true,
            expiry: Some(now + Duration::days(10)),
        };
        let next = active.extended(now, Duration::days(30)).unwrap();
        assert_eq!(next.expiry, Some(now + Duration::days(40)));
    }

    #[test]
    fn extension_past_calendar_range_is_refused() {
        let now = Utc::now();
        let active = SubscriptionState {
            is_pro: true,
            expiry: Some(DateTime::<Utc>::MAX_UTC - Duration::days(1)),
        };
        assert_eq!(active.extended(now, Duration::days(30)), None);
    }

    #[test]
    fn user_record_wire_format_is_flat_camel_case() {
        let record = UserRecord {
            id: "user-123".into(),
            subscription: SubscriptionState {
                is_pro: true,
                expiry: None,
            },
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json, serde_json::json!({ "id": "user-123", "isPro": true }));

        let req: VerifyPaymentRequest = serde_json::from_str(r#"{"txHash":"0xabc"}"#).unwrap();
        assert_eq!(req.tx_hash, "0xabc");
        assert_eq!(req.user_id, None);
    }
}
