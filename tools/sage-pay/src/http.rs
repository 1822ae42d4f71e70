//! Confirmation and subscription collaborators backed by the verifier's
//! HTTP API.

use sage_common::chain::{ChainError, ConfirmationSource, ConfirmationStatus};
use sage_common::subscription::{
    ErrorResponse, LedgerError, SubscriptionAck, SubscriptionLedger, TransactionStatusResponse,
    UserRecord, VerifyPaymentRequest, VerifyPaymentResponse,
};
use sage_common::wallet::TxRef;
use tracing::debug;

/// Thin client for the verifier endpoints.
#[derive(Clone, Debug)]
pub struct VerifierClient {
    base_url: String,
    http: reqwest::Client,
}

impl VerifierClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            base_url,
            http: reqwest::Client::new(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// `GET /api/payment?txHash=`
    pub async fn transaction_status(
        &self,
        tx_ref: &TxRef,
    ) -> Result<TransactionStatusResponse, ChainError> {
        let resp = self
            .http
            .get(format!("{}/api/payment", self.base_url))
            .query(&[("txHash", tx_ref.as_str())])
            .send()
            .await
            .map_err(|e| ChainError::Unavailable(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let message = error_message(resp).await;
            return Err(ChainError::LookupFailed(format!("{status}: {message}")));
        }
        resp.json()
            .await
            .map_err(|e| ChainError::LookupFailed(format!("bad status body: {e}")))
    }

    /// `POST /api/payment`
    pub async fn verify_payment(
        &self,
        tx_ref: &TxRef,
        user_id: Option<&str>,
    ) -> Result<VerifyPaymentResponse, LedgerError> {
        let body = VerifyPaymentRequest {
            tx_hash: tx_ref.to_string(),
            user_id: user_id.map(str::to_string),
        };
        let resp = self
            .http
            .post(format!("{}/api/payment", self.base_url))
            .json(&body)
            .send()
            .await
            .map_err(|e| LedgerError::Unavailable(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(LedgerError::Rejected {
                status: status.as_u16(),
                message: error_message(resp).await,
            });
        }
        resp.json()
            .await
            .map_err(|e| LedgerError::Malformed(e.to_string()))
    }

    /// `GET /api/subscription/{user_id}`
    pub async fn subscription(&self, user_id: &str) -> Result<UserRecord, LedgerError> {
        let mut url = reqwest::Url::parse(&self.base_url)
            .map_err(|e| LedgerError::Unavailable(format!("bad verifier url: {e}")))?;
        url.path_segments_mut()
            .map_err(|_| LedgerError::Unavailable(format!("bad verifier url: {}", self.base_url)))?
            .pop_if_empty()
            .extend(["api", "subscription", user_id]);
        let resp = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| LedgerError::Unavailable(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(LedgerError::Rejected {
                status: status.as_u16(),
                message: error_message(resp).await,
            });
        }
        resp.json()
            .await
            .map_err(|e| LedgerError::Malformed(e.to_string()))
    }
}

/// Pull `error` out of an error body, falling back to the raw text.
async fn error_message(resp: reqwest::Response) -> String {
    let text = resp.text().await.unwrap_or_default();
    serde_json::from_str::<ErrorResponse>(&text)
        .map(|e| e.error)
        .unwrap_or(text)
}

/// Asks the verifier's status endpoint whether a transaction settled.
pub struct HttpConfirmationSource {
    client: VerifierClient,
}

impl HttpConfirmationSource {
    pub fn new(client: VerifierClient) -> Self {
        Self { client }
    }
}

impl ConfirmationSource for HttpConfirmationSource {
    async fn check(&self, tx_ref: &TxRef) -> Result<ConfirmationStatus, ChainError> {
        let resp = self.client.transaction_status(tx_ref).await?;
        debug!(
            "status of {}: {} ({} confirmations)",
            tx_ref, resp.transaction.status, resp.transaction.confirmations
        );
        Ok(match resp.transaction.status.as_str() {
            "confirmed" if resp.success => ConfirmationStatus::Confirmed {
                confirmations: resp.transaction.confirmations,
            },
            "pending" => ConfirmationStatus::Pending,
            other => ConfirmationStatus::Failed {
                reason: format!("transaction status '{other}'"),
            },
        })
    }

    fn source_name(&self) -> &str {
        "verifier"
    }
}

/// Records payments through the verifier's `POST /api/payment`.
pub struct HttpSubscriptionLedger {
    client: VerifierClient,
    user_id: Option<String>,
}

impl HttpSubscriptionLedger {
    /// `user_id == None` lets the verifier apply its default user.
    pub fn new(client: VerifierClient, user_id: Option<String>) -> Self {
        Self { client, user_id }
    }
}

impl SubscriptionLedger for HttpSubscriptionLedger {
    async fn record_payment(&self, tx_ref: &TxRef) -> Result<SubscriptionAck, LedgerError> {
        let resp = self
            .client
            .verify_payment(tx_ref, self.user_id.as_deref())
            .await?;
        Ok(resp.into())
    }
}
