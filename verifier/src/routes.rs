use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::{Method, StatusCode};
use axum::routing::get;
use axum::{Json, Router};
use chrono::{Duration, Utc};
use sage_common::subscription::{
    ErrorResponse, TransactionInfo, TransactionStatusResponse, UserRecord, VerifyPaymentRequest,
    VerifyPaymentResponse, DEFAULT_USER_ID, PRO_PERIOD_DAYS,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info, warn};

use crate::book::{RedeemError, SubscriptionBook};

/// Runtime knobs of the verifier.
#[derive(Clone, Debug)]
pub struct VerifierConfig {
    /// Length of the Pro period credited per payment.
    pub period: Duration,
    /// Confirmation count reported by the status endpoint.
    pub confirmations: u32,
    /// Answer every subscription update with `success: false`.
    pub reject_payments: bool,
    /// Report every transaction as pending.
    pub pending: bool,
}

impl Default for VerifierConfig {
    fn default() -> Self {
        Self {
            period: Duration::days(PRO_PERIOD_DAYS),
            confirmations: 12,
            reject_payments: false,
            pending: false,
        }
    }
}

pub struct AppState {
    pub config: VerifierConfig,
    pub book: SubscriptionBook,
}

impl AppState {
    pub fn new(config: VerifierConfig) -> Self {
        Self {
            config,
            book: SubscriptionBook::new(),
        }
    }
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(status: StatusCode, message: &str) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: message.to_string(),
        }),
    )
}

#[derive(Deserialize)]
struct StatusQuery {
    #[serde(rename = "txHash")]
    tx_hash: Option<String>,
}

#[derive(Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub users: usize,
    pub redeemed: usize,
}

// ─── Handlers ────────────────────────────────────────────────────────────────

/// Record a payment and upgrade the user.
///
/// No on-chain lookup happens here: a transaction hash is taken at its word,
/// exactly once.
async fn verify_payment_handler(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<VerifyPaymentRequest>, JsonRejection>,
) -> Result<Json<VerifyPaymentResponse>, ApiError> {
    let Json(req) = payload.map_err(|e| {
        warn!("Rejected payment verification body: {}", e);
        api_error(StatusCode::BAD_REQUEST, "Invalid request body")
    })?;

    let tx_hash = req.tx_hash.trim();
    if tx_hash.is_empty() {
        return Err(api_error(
            StatusCode::BAD_REQUEST,
            "Transaction hash is required",
        ));
    }
    let user_id = req
        .user_id
        .as_deref()
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .unwrap_or(DEFAULT_USER_ID);

    if state.config.reject_payments {
        warn!("Refusing to record {} for {} (--reject-payments)", tx_hash, user_id);
        return Ok(Json(VerifyPaymentResponse {
            success: false,
            user: None,
        }));
    }

    match state
        .book
        .redeem(tx_hash, user_id, Utc::now(), state.config.period)
        .await
    {
        Ok(user) => Ok(Json(VerifyPaymentResponse {
            success: true,
            user: Some(user),
        })),
        Err(e @ RedeemError::AlreadyUsed { .. }) => {
            warn!("Replay of {} by {}: {:?}", tx_hash, user_id, e);
            Err(api_error(StatusCode::CONFLICT, &e.to_string()))
        }
        Err(e @ RedeemError::ExpiryOutOfRange) => {
            error!("Cannot credit {} to {}: {}", tx_hash, user_id, e);
            Err(api_error(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string()))
        }
    }
}

/// Report settlement status of a transaction.
async fn transaction_status_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<StatusQuery>,
) -> Result<Json<TransactionStatusResponse>, ApiError> {
    let tx_hash = query
        .tx_hash
        .as_deref()
        .map(str::trim)
        .filter(|h| !h.is_empty())
        .ok_or_else(|| api_error(StatusCode::BAD_REQUEST, "Transaction hash is required"))?;

    let (status, confirmations) = if state.config.pending {
        ("pending", 0)
    } else {
        ("confirmed", state.config.confirmations)
    };

    Ok(Json(TransactionStatusResponse {
        success: true,
        transaction: TransactionInfo {
            hash: tx_hash.to_string(),
            status: status.to_string(),
            confirmations,
        },
    }))
}

async fn subscription_handler(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> Json<UserRecord> {
    let subscription = state.book.subscription(&user_id).await;
    Json(UserRecord {
        id: user_id,
        subscription,
    })
}

async fn health_handler(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let (users, redeemed) = state.book.counts().await;
    Json(HealthResponse {
        status: "ok".to_string(),
        users,
        redeemed,
    })
}

// ─── Router ──────────────────────────────────────────────────────────────────

pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any);

    info!(
        "Verifier routes ready (period {} days, {} confirmations{}{})",
        state.config.period.num_days(),
        state.config.confirmations,
        if state.config.reject_payments { ", rejecting payments" } else { "" },
        if state.config.pending { ", reporting pending" } else { "" }
    );

    Router::new()
        .route(
            "/api/payment",
            get(transaction_status_handler).post(verify_payment_handler),
        )
        .route("/api/subscription/{user_id}", get(subscription_handler))
        .route("/health", get(health_handler))
        .layer(cors)
        .with_state(state)
}
