//! StatementSage payment verifier.
//!
//! Server side of the Pro upgrade: records paid subscriptions and reports
//! transaction status. Like the app it backs, it trusts transaction hashes
//! rather than checking them on-chain.

pub mod book;
pub mod routes;

use std::sync::Arc;

use tokio::net::TcpListener;

pub use routes::{router, AppState, VerifierConfig};

/// Serve the verifier API on `listener` until the task is dropped.
pub async fn serve(listener: TcpListener, state: Arc<AppState>) -> std::io::Result<()> {
    axum::serve(listener, router(state)).await
}
