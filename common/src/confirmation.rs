//! How many times, and how patiently, the flow asks whether a submitted
//! transaction has settled.

use std::time::Duration;

use tracing::debug;

use crate::chain::{ConfirmationSource, ConfirmationStatus};
use crate::wallet::TxRef;

/// Polling policy for confirmation checks.
///
/// `single_check()` asks once and takes the answer as final. `with_backoff`
/// re-asks after `Pending` or a failed lookup, doubling the delay each time
/// up to `max_backoff`. A `Failed` status always ends polling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfirmationPolicy {
    pub max_checks: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl ConfirmationPolicy {
    pub fn single_check() -> Self {
        Self {
            max_checks: 1,
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
        }
    }

    pub fn with_backoff(max_checks: u32, initial_backoff: Duration, max_backoff: Duration) -> Self {
        Self {
            max_checks: max_checks.max(1),
            initial_backoff,
            max_backoff: max_backoff.max(initial_backoff),
        }
    }

    /// Delay to wait after check number `check` (1-based) before the next one.
    pub fn delay_after(&self, check: u32) -> Duration {
        let factor = 2u32.saturating_pow(check.saturating_sub(1));
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }
}

impl Default for ConfirmationPolicy {
    fn default() -> Self {
        Self::single_check()
    }
}

/// Result of polling one transaction reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    Confirmed { confirmations: u32 },
    NotConfirmed { reason: String },
    /// `is_current` turned false between checks; the answer no longer matters.
    Abandoned,
}

/// Poll `source` for `tx_ref` according to `policy`.
///
/// `is_current` is consulted after every check so that an attempt that was
/// reset mid-poll stops asking.
pub async fn poll_confirmation<C, F>(
    source: &C,
    tx_ref: &TxRef,
    policy: &ConfirmationPolicy,
    is_current: F,
) -> PollOutcome
where
    C: ConfirmationSource,
    F: Fn() -> bool,
{
    let max_checks = policy.max_checks.max(1);
    let mut last_reason = String::new();

    for check in 1..=max_checks {
        match source.check(tx_ref).await {
            Ok(ConfirmationStatus::Confirmed { confirmations }) => {
                return if is_current() {
                    PollOutcome::Confirmed { confirmations }
                } else {
                    PollOutcome::Abandoned
                };
            }
            Ok(ConfirmationStatus::Failed { reason }) => {
                return if is_current() {
                    PollOutcome::NotConfirmed { reason }
                } else {
                    PollOutcome::Abandoned
                };
            }
            Ok(ConfirmationStatus::Pending) => last_reason = "transaction still pending".to_string(),
            Err(e) => last_reason = e.to_string(),
        }

        if !is_current() {
            return PollOutcome::Abandoned;
        }
        if check < max_checks {
            let delay = policy.delay_after(check);
            debug!(
                "{} not confirmed on check {}/{} via {} ({}), retrying in {:?}",
                tx_ref,
                check,
                max_checks,
                source.source_name(),
                last_reason,
                delay
            );
            tokio::time::sleep(delay).await;
            if !is_current() {
                return PollOutcome::Abandoned;
            }
        }
    }

    PollOutcome::NotConfirmed {
        reason: format!("not confirmed after {max_checks} check(s): {last_reason}"),
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;
    use crate::chain::ChainError;
    use crate::mock::MockChain;

    #[test]
    fn backoff_doubles_up_to_cap() {
        let policy = ConfirmationPolicy::with_backoff(
            6,
            Duration::from_millis(500),
            Duration::from_secs(3),
        );
        assert_eq!(policy.delay_after(1), Duration::from_millis(500));
        assert_eq!(policy.delay_after(2), Duration::from_secs(1));
        assert_eq!(policy.delay_after(3), Duration::from_secs(2));
        assert_eq!(policy.delay_after(4), Duration::from_secs(3));
        assert_eq!(policy.delay_after(40), Duration::from_secs(3));
    }

    #[test]
    fn zero_checks_means_one() {
        let policy = ConfirmationPolicy::with_backoff(0, Duration::ZERO, Duration::ZERO);
        assert_eq!(policy.max_checks, 1);
        assert_eq!(ConfirmationPolicy::default(), ConfirmationPolicy::single_check());
    }

    #[tokio::test]
    async fn single_check_takes_pending_as_final() {
        let chain = MockChain::always(ConfirmationStatus::Pending);
        let outcome = poll_confirmation(
            &chain,
            &TxRef::from("0xabc"),
            &ConfirmationPolicy::single_check(),
            || true,
        )
        .await;
        assert!(matches!(outcome, PollOutcome::NotConfirmed { .. }));
        assert_eq!(chain.checks(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn backoff_polls_until_confirmed() {
        let chain = MockChain::always(ConfirmationStatus::Confirmed { confirmations: 3 })
            .with_script(vec![
                Ok(ConfirmationStatus::Pending),
                Err(ChainError::LookupFailed("timeout".into())),
            ]);
        let policy = ConfirmationPolicy::with_backoff(
            5,
            Duration::from_secs(1),
            Duration::from_secs(4),
        );
        let outcome = poll_confirmation(&chain, &TxRef::from("0xabc"), &policy, || true).await;
        assert_eq!(outcome, PollOutcome::Confirmed { confirmations: 3 });
        assert_eq!(chain.checks(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn backoff_gives_up_after_max_checks() {
        let chain = MockChain::always(ConfirmationStatus::Pending);
        let policy = ConfirmationPolicy::with_backoff(
            4,
            Duration::from_millis(100),
            Duration::from_secs(1),
        );
        match poll_confirmation(&chain, &TxRef::from("0xabc"), &policy, || true).await {
            PollOutcome::NotConfirmed { reason } => {
                assert!(reason.contains("after 4 check(s)"), "reason: {reason}");
            }
            other => panic!("expected NotConfirmed, got {other:?}"),
        }
        assert_eq!(chain.checks(), 4);
    }

    #[tokio::test]
    async fn failed_status_stops_polling() {
        let chain = MockChain::always(ConfirmationStatus::Failed {
            reason: "reverted".into(),
        });
        let policy = ConfirmationPolicy::with_backoff(
            5,
            Duration::from_millis(1),
            Duration::from_millis(1),
        );
        let outcome = poll_confirmation(&chain, &TxRef::from("0xabc"), &policy, || true).await;
        assert_eq!(
            outcome,
            PollOutcome::NotConfirmed {
                reason: "reverted".into()
            }
        );
        assert_eq!(chain.checks(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn stops_when_attempt_is_no_longer_current() {
        let chain = MockChain::always(ConfirmationStatus::Pending);
        let policy = ConfirmationPolicy::with_backoff(
            10,
            Duration::from_secs(1),
            Duration::from_secs(1),
        );
        let remaining = Cell::new(2u32);
        let is_current = || {
            let left = remaining.get();
            remaining.set(left.saturating_sub(1));
            left > 0
        };
        let outcome = poll_confirmation(&chain, &TxRef::from("0xabc"), &policy, is_current).await;
        assert_eq!(outcome, PollOutcome::Abandoned);
        assert!(chain.checks() < 10);
    }
}
