//! A verifier on a local port plus controllers wired to it over HTTP.

use std::net::SocketAddr;
use std::sync::Arc;

use sage_common::confirmation::ConfirmationPolicy;
use sage_common::mock::DevWallet;
use sage_common::payment::PaymentController;
use sage_pay::http::{HttpConfirmationSource, HttpSubscriptionLedger, VerifierClient};
use sage_verifier::{AppState, VerifierConfig};
use tokio::task::JoinHandle;

pub type HttpController =
    PaymentController<DevWallet, HttpConfirmationSource, HttpSubscriptionLedger>;

/// A verifier running on an ephemeral local port.
pub struct TestVerifier {
    pub addr: SocketAddr,
    pub state: Arc<AppState>,
    handle: JoinHandle<()>,
}

impl TestVerifier {
    pub async fn start(config: VerifierConfig) -> Self {
        tracing_subscriber::fmt::try_init().ok();
        let (listener, addr) = crate::bind_ephemeral().await;
        let state = Arc::new(AppState::new(config));
        let serve_state = state.clone();
        let handle = tokio::spawn(async move {
            if let Err(e) = sage_verifier::serve(listener, serve_state).await {
                tracing::error!("test verifier stopped: {}", e);
            }
        });
        Self {
            addr,
            state,
            handle,
        }
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn client(&self) -> VerifierClient {
        VerifierClient::new(self.url())
    }

    /// Controller wired to this verifier with a dev wallet for `payer`.
    pub fn controller(
        &self,
        payer: Option<&str>,
        user_id: Option<&str>,
        policy: ConfirmationPolicy,
    ) -> HttpController {
        PaymentController::new(
            DevWallet::new(payer.map(str::to_string)),
            HttpConfirmationSource::new(self.client()),
            HttpSubscriptionLedger::new(self.client(), user_id.map(str::to_string)),
        )
        .with_policy(policy)
    }
}

impl Drop for TestVerifier {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
