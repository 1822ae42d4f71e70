//! Command-line Pro upgrade against a running verifier.
//!
//! Uses the development wallet, so no funds move: the point is to exercise
//! the payment flow and the verifier end to end.

use std::time::Duration;

use anyhow::bail;
use clap::{Parser, Subcommand};
use sage_common::cancel::CancelSignal;
use sage_common::chain::{explorer_url, BASE_CHAIN_ID, RECIPIENT_ADDRESS, USDC_CONTRACT_ADDRESS};
use sage_common::confirmation::ConfirmationPolicy;
use sage_common::currency::UsdcAmount;
use sage_common::mock::DevWallet;
use sage_common::payment::{
    PaymentController, PaymentError, PaymentObserver, PaymentReceipt, Remedy,
};
use sage_common::subscription::{SubscriptionTier, DEFAULT_USER_ID, PLAN_FEATURES};
use sage_common::wallet::TxRef;
use sage_pay::http::{HttpConfirmationSource, HttpSubscriptionLedger, VerifierClient};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "sage-pay", about = "Upgrade to StatementSage Pro from the command line")]
struct Cli {
    /// Base URL of the verifier.
    #[arg(long, global = true, default_value = "http://localhost:3010")]
    verifier: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Pay for Pro and wait for the verifier to record it.
    Upgrade {
        /// Amount in USDC (e.g. "5" or "4.99").
        #[arg(long, default_value = "5")]
        amount: UsdcAmount,

        /// Connected wallet address. Without it there is no wallet.
        #[arg(long)]
        payer: Option<String>,

        /// User to credit (the verifier's default user if omitted).
        #[arg(long)]
        user_id: Option<String>,

        /// Confirmation checks before giving up (1 = check once).
        #[arg(long, default_value_t = 1)]
        max_checks: u32,

        /// Delay after the first unconfirmed check, doubled each time.
        #[arg(long, default_value_t = 500)]
        backoff_ms: u64,

        /// Upper bound on the delay between checks.
        #[arg(long, default_value_t = 8000)]
        max_backoff_ms: u64,
    },

    /// Show a transaction's status as the verifier sees it.
    Status {
        #[arg(long)]
        tx_hash: String,
    },

    /// Show a user's subscription.
    Subscription {
        #[arg(long, default_value = DEFAULT_USER_ID)]
        user_id: String,
    },

    /// List plans and what they include.
    Plans,
}

struct LogObserver;

impl PaymentObserver for LogObserver {
    fn on_success(&self, receipt: &PaymentReceipt) {
        info!("Upgrade paid with {} ({})", receipt.tx_ref, receipt.amount);
    }

    fn on_failure(&self, error: &PaymentError) {
        warn!("Upgrade failed: {}", error);
    }
}

fn remedy_hint(remedy: Remedy) -> &'static str {
    match remedy {
        Remedy::ConnectWallet => "Pass --payer with your wallet address and try again.",
        Remedy::RetryPayment => "The payment did not go through; you can try again.",
        Remedy::ContactSupport => {
            "Your payment may already have gone through. Contact support with the transaction hash; do not pay again."
        }
        Remedy::Wait => "Another payment is still in progress.",
        Remedy::StartOver => "Start a new upgrade.",
    }
}

async fn upgrade(
    client: VerifierClient,
    amount: UsdcAmount,
    payer: Option<String>,
    user_id: Option<String>,
    policy: ConfirmationPolicy,
) -> anyhow::Result<()> {
    let controller = PaymentController::new(
        DevWallet::new(payer),
        HttpConfirmationSource::new(client.clone()),
        HttpSubscriptionLedger::new(client, user_id),
    )
    .with_policy(policy)
    .with_observer(LogObserver);

    println!(
        "Paying {} to {} (USDC {} on chain {})",
        amount, RECIPIENT_ADDRESS, USDC_CONTRACT_ADDRESS, BASE_CHAIN_ID
    );

    let cancel = CancelSignal::new();
    let on_ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_ctrl_c.cancel();
        }
    });

    let mut updates = controller.subscribe();
    let watcher = async {
        let mut last = None;
        while updates.changed().await.is_ok() {
            let state = updates.borrow_and_update().state;
            if last != Some(state) {
                println!("  {}", state);
                last = Some(state);
            }
            if state.is_terminal() {
                break;
            }
        }
    };
    let attempt = controller.initiate_with_cancel(amount, &cancel);
    let (result, ()) = tokio::join!(attempt, watcher);

    match result {
        Ok(receipt) => {
            println!("Payment successful! Your Pro subscription has been activated.");
            println!("  transaction: {}", explorer_url(&receipt.tx_ref));
            if let Some(user) = receipt.user {
                match user.subscription.expiry {
                    Some(expiry) => println!("  {} is Pro until {}", user.id, expiry.to_rfc3339()),
                    None => println!("  {} is Pro", user.id),
                }
            }
            Ok(())
        }
        Err(e) => {
            if let Some(tx_ref) = controller.tx_ref() {
                println!("  transaction: {}", explorer_url(&tx_ref));
            }
            println!("Payment failed: {e}");
            println!("{}", remedy_hint(e.remedy()));
            bail!(e)
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();
    let client = VerifierClient::new(cli.verifier);

    match cli.command {
        Command::Upgrade {
            amount,
            payer,
            user_id,
            max_checks,
            backoff_ms,
            max_backoff_ms,
        } => {
            let policy = if max_checks <= 1 {
                ConfirmationPolicy::single_check()
            } else {
                ConfirmationPolicy::with_backoff(
                    max_checks,
                    Duration::from_millis(backoff_ms),
                    Duration::from_millis(max_backoff_ms),
                )
            };
            upgrade(client, amount, payer, user_id, policy).await
        }
        Command::Status { tx_hash } => {
            let status = client.transaction_status(&TxRef(tx_hash)).await?;
            println!("{}", serde_json::to_string_pretty(&status)?);
            Ok(())
        }
        Command::Subscription { user_id } => {
            let record = client.subscription(&user_id).await?;
            println!("{}", serde_json::to_string_pretty(&record)?);
            Ok(())
        }
        Command::Plans => {
            for tier in [SubscriptionTier::Free, SubscriptionTier::Pro] {
                match tier.price() {
                    Some(price) => println!("{} ({} per month)", tier.label(), price),
                    None => println!("{}", tier.label()),
                }
                for feature in PLAN_FEATURES {
                    let mark = if feature.included_in(tier) { "✓" } else { " " };
                    println!("  {} {}", mark, feature.name);
                }
            }
            Ok(())
        }
    }
}
