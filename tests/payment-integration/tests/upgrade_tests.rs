use std::time::Duration;

use sage_common::confirmation::ConfirmationPolicy;
use sage_common::payment::{PaymentError, PaymentState, Remedy};
use sage_common::subscription::DEFAULT_USER_ID;
use sage_payment_integration::{pro_price, TestVerifier};
use sage_verifier::VerifierConfig;

#[tokio::test]
async fn upgrade_end_to_end_makes_user_pro() {
    let verifier = TestVerifier::start(VerifierConfig::default()).await;
    let controller = verifier.controller(
        Some("0x71C7656EC7ab88b098defB751B7401B5f6d8976F"),
        Some("alice"),
        ConfirmationPolicy::single_check(),
    );

    let receipt = controller.initiate(pro_price()).await.unwrap();

    assert_eq!(controller.state(), PaymentState::Succeeded);
    assert_eq!(controller.tx_ref(), Some(receipt.tx_ref.clone()));
    assert_eq!(receipt.confirmations, 12);
    let user = receipt.user.unwrap();
    assert_eq!(user.id, "alice");
    assert!(user.subscription.is_active(chrono::Utc::now()));

    // The verifier's record is the source of truth.
    let record = verifier.client().subscription("alice").await.unwrap();
    assert_eq!(record.subscription, user.subscription);
    assert!(verifier.state.book.is_redeemed(receipt.tx_ref.as_str()).await);
}

#[tokio::test]
async fn default_user_is_credited_without_user_id() {
    let verifier = TestVerifier::start(VerifierConfig::default()).await;
    let controller = verifier.controller(Some("0xpayer"), None, ConfirmationPolicy::single_check());

    let receipt = controller.initiate(pro_price()).await.unwrap();

    assert_eq!(receipt.user.unwrap().id, DEFAULT_USER_ID);
    assert!(verifier.state.book.subscription(DEFAULT_USER_ID).await.is_pro);
}

#[tokio::test]
async fn no_wallet_never_reaches_verifier() {
    let verifier = TestVerifier::start(VerifierConfig::default()).await;
    let controller = verifier.controller(None, Some("alice"), ConfirmationPolicy::single_check());

    let err = controller.initiate(pro_price()).await.unwrap_err();

    assert_eq!(err, PaymentError::NoWalletConnected);
    assert_eq!(verifier.state.book.counts().await, (0, 0));
}

#[tokio::test]
async fn server_refusal_is_not_reported_as_success() {
    let verifier = TestVerifier::start(VerifierConfig {
        reject_payments: true,
        ..VerifierConfig::default()
    })
    .await;
    let controller = verifier.controller(Some("0xpayer"), Some("alice"), ConfirmationPolicy::single_check());

    let err = controller.initiate(pro_price()).await.unwrap_err();

    assert!(matches!(err, PaymentError::ServerAcknowledgmentFailed(_)));
    assert_eq!(err.remedy(), Remedy::ContactSupport);
    assert_eq!(controller.state(), PaymentState::Failed);
    assert!(!verifier.state.book.subscription("alice").await.is_pro);
}

#[tokio::test]
async fn pending_transaction_fails_after_bounded_polling() {
    let verifier = TestVerifier::start(VerifierConfig {
        pending: true,
        ..VerifierConfig::default()
    })
    .await;
    let controller = verifier.controller(
        Some("0xpayer"),
        Some("alice"),
        ConfirmationPolicy::with_backoff(3, Duration::from_millis(10), Duration::from_millis(20)),
    );

    let err = controller.initiate(pro_price()).await.unwrap_err();

    match err {
        PaymentError::ConfirmationFailed(reason) => {
            assert!(reason.contains("after 3 check(s)"), "reason: {reason}");
        }
        other => panic!("expected ConfirmationFailed, got {other:?}"),
    }
    assert_eq!(verifier.state.book.counts().await, (0, 0));
}

#[tokio::test]
async fn unreachable_verifier_fails_confirmation() {
    let verifier = TestVerifier::start(VerifierConfig::default()).await;
    let controller = verifier.controller(Some("0xpayer"), None, ConfirmationPolicy::single_check());
    drop(verifier);
    // Give the aborted server task a moment to release the socket.
    tokio::time::sleep(Duration::from_millis(50)).await;

    let err = controller.initiate(pro_price()).await.unwrap_err();

    assert!(matches!(err, PaymentError::ConfirmationFailed(_)), "got {err:?}");
}

#[tokio::test]
async fn repeated_upgrades_stack_periods() {
    let verifier = TestVerifier::start(VerifierConfig::default()).await;
    let controller = verifier.controller(Some("0xpayer"), Some("alice"), ConfirmationPolicy::single_check());

    let first = controller.initiate(pro_price()).await.unwrap().user.unwrap();
    let second = controller.initiate(pro_price()).await.unwrap().user.unwrap();

    let gained = second.subscription.expiry.unwrap() - first.subscription.expiry.unwrap();
    assert_eq!(gained.num_days(), 30);
    assert_eq!(verifier.state.book.counts().await, (1, 2));
}
