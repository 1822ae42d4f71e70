//! End-to-end checks of the Pro upgrade flow against a live verifier.

use std::net::SocketAddr;

use sage_common::currency::UsdcAmount;
use sage_common::subscription::PRO_PRICE_USDC;
use tokio::net::TcpListener;

pub mod harness;

pub use harness::{HttpController, TestVerifier};

/// Bind a listener on an OS-assigned loopback port.
pub async fn bind_ephemeral() -> (TcpListener, SocketAddr) {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .unwrap_or_else(|e| panic!("Failed to bind ephemeral port: {e}"));
    let addr = listener
        .local_addr()
        .unwrap_or_else(|e| panic!("Listener has no local address: {e}"));
    (listener, addr)
}

/// The Pro monthly price.
pub fn pro_price() -> UsdcAmount {
    UsdcAmount::from_whole(PRO_PRICE_USDC)
        .unwrap_or_else(|e| panic!("Pro price is not a valid amount: {e}"))
}
