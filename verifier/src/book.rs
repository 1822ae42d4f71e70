//! In-memory record of who has paid for Pro.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Duration, Utc};
use sage_common::subscription::{SubscriptionState, UserRecord};
use tokio::sync::RwLock;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RedeemError {
    #[error("Transaction already used")]
    AlreadyUsed { owner: String },
    #[error("Subscription expiry out of range")]
    ExpiryOutOfRange,
}

#[derive(Default)]
struct BookInner {
    users: BTreeMap<String, SubscriptionState>,
    /// Redeemed transaction hash (lowercased) → user it was credited to.
    redeemed: HashMap<String, String>,
}

/// Subscription state per user plus the set of transaction hashes already
/// credited. One lock covers both so a hash can never be credited twice.
#[derive(Default)]
pub struct SubscriptionBook {
    inner: RwLock<BookInner>,
}

impl SubscriptionBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Credit one Pro period to `user_id` for `tx_hash`.
    ///
    /// Replaying a hash for the user it was credited to returns the current
    /// record unchanged; replaying it for anyone else is refused.
    pub async fn redeem(
        &self,
        tx_hash: &str,
        user_id: &str,
        now: DateTime<Utc>,
        period: Duration,
    ) -> Result<UserRecord, RedeemError> {
        let key = tx_hash.trim().to_ascii_lowercase();
        let mut inner = self.inner.write().await;

        if let Some(owner) = inner.redeemed.get(&key) {
            if owner != user_id {
                return Err(RedeemError::AlreadyUsed {
                    owner: owner.clone(),
                });
            }
            let subscription = inner.users.get(user_id).cloned().unwrap_or_default();
            return Ok(UserRecord {
                id: user_id.to_string(),
                subscription,
            });
        }

        let current = inner.users.get(user_id).cloned().unwrap_or_default();
        let next = current
            .extended(now, period)
            .ok_or(RedeemError::ExpiryOutOfRange)?;
        inner.users.insert(user_id.to_string(), next.clone());
        inner.redeemed.insert(key, user_id.to_string());
        info!(
            "Credited {} to {}: Pro until {:?}",
            tx_hash, user_id, next.expiry
        );

        Ok(UserRecord {
            id: user_id.to_string(),
            subscription: next,
        })
    }

    /// Current state of `user_id`; free if never seen.
    pub async fn subscription(&self, user_id: &str) -> SubscriptionState {
        self.inner
            .read()
            .await
            .users
            .get(user_id)
            .cloned()
            .unwrap_or_default()
    }

    pub async fn is_redeemed(&self, tx_hash: &str) -> bool {
        self.inner
            .read()
            .await
            .redeemed
            .contains_key(&tx_hash.trim().to_ascii_lowercase())
    }

    /// (known users, redeemed hashes)
    pub async fn counts(&self) -> (usize, usize) {
        let inner = self.inner.read().await;
        (inner.users.len(), inner.redeemed.len())
    }
}
