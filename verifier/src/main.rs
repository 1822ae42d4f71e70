use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use sage_common::subscription::PRO_PERIOD_DAYS;
use sage_verifier::{AppState, VerifierConfig};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "sage-verifier", about = "StatementSage Pro payment verifier")]
struct Cli {
    /// HTTP port to listen on.
    #[arg(long, default_value_t = 3010)]
    port: u16,

    /// Address to bind.
    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    /// Days of Pro credited per payment.
    #[arg(long, default_value_t = PRO_PERIOD_DAYS)]
    period_days: i64,

    /// Confirmation count reported for every transaction.
    #[arg(long, default_value_t = 12)]
    confirmations: u32,

    /// Answer every subscription update with `success: false`.
    #[arg(long)]
    reject_payments: bool,

    /// Report every transaction as pending instead of confirmed.
    #[arg(long)]
    pending: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    anyhow::ensure!(cli.period_days > 0, "--period-days must be positive");
    let period = chrono::Duration::try_days(cli.period_days)
        .with_context(|| format!("--period-days {} is out of range", cli.period_days))?;

    let config = VerifierConfig {
        period,
        confirmations: cli.confirmations,
        reject_payments: cli.reject_payments,
        pending: cli.pending,
    };
    let state = Arc::new(AppState::new(config));

    let addr = format!("{}:{}", cli.host, cli.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("Verifier listening on {}", addr);

    sage_verifier::serve(listener, state)
        .await
        .context("server failed")
}
