use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chrono::Utc;
use tracing::error;

use super::state::AppState;
use super::types::{
    CreateIntentRequest, CreateIntentResponse, ErrorResponse, HealthResponse, ItemRef,
    StatusResponse,
};
use crate::engine::{EngineError, MAX_SUPPLY};

/// GET /mint-progress
pub async fn mint_progress(State(state): State<AppState>) -> Response {
    match state.store.progress(MAX_SUPPLY).await {
        Ok(progress) => (StatusCode::OK, Json(progress)).into_response(),
        Err(e) => {
            error!(error = %e, "mint progress query failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse::new("Internal error")),
            )
                .into_response()
        }
    }
}

/// POST /create-payment-intent
///
/// Business failures stay HTTP 200 with an `error` field; only store
/// faults surface as 5xx.
pub async fn create_payment_intent(
    State(state): State<AppState>,
    Json(request): Json<CreateIntentRequest>,
) -> Response {
    match state.engine.create_intent(request.quantity).await {
        Ok(intent) => (
            StatusCode::OK,
            Json(CreateIntentResponse {
                success: true,
                session_id: intent.session_id,
                amount: intent.amount_due.to_string(),
                payment_address: intent.address,
            }),
        )
            .into_response(),
        Err(EngineError::Store(e)) => {
            error!(error = %e, "create intent store failure");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse::new("Internal error")),
            )
                .into_response()
        }
        Err(e) => (StatusCode::OK, Json(ErrorResponse::new(e.to_string()))).into_response(),
    }
}

/// GET /check-payment-status/{session_id}
pub async fn check_payment_status(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Response {
    let session = match state.store.session_by_id(&session_id).await {
        Ok(Some(session)) => session,
        Ok(None) => {
            // Kept at 200 by the current storefront contract.
            return (
                StatusCode::OK,
                Json(StatusResponse::Error {
                    message: "Invalid session.".to_string(),
                }),
            )
                .into_response();
        }
        Err(e) => {
            error!(error = %e, "status query failed");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(StatusResponse::Error {
                    message: "Internal error".to_string(),
                }),
            )
                .into_response();
        }
    };

    use crate::store::SessionStatus::*;
    let body = match session.status {
        Pending => {
            let age = Utc::now().timestamp() - session.created_at;
            if age > state.session_timeout_secs {
                StatusResponse::Expired {
                    message: "Payment session expired.".to_string(),
                }
            } else {
                StatusResponse::Pending
            }
        }
        PaymentPending => StatusResponse::PaymentPending {
            message: "Payment detected, awaiting confirmation.".to_string(),
            txid: session.txid.clone().unwrap_or_default(),
        },
        Complete => StatusResponse::Complete {
            items: session
                .assigned_refs
                .clone()
                .unwrap_or_default()
                .into_iter()
                .map(|cid| ItemRef { cid })
                .collect(),
            quantity: session.quantity,
        },
        Expired => StatusResponse::Expired {
            message: "Payment session expired.".to_string(),
        },
        Failed => StatusResponse::Error {
            message: "Payment received but item assignment failed.".to_string(),
        },
    };

    (StatusCode::OK, Json(body)).into_response()
}

/// GET /health
pub async fn health(State(state): State<AppState>) -> Response {
    match state.store.health_check().await {
        Ok(()) => (
            StatusCode::OK,
            Json(HealthResponse::healthy(Utc::now().timestamp())),
        )
            .into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(HealthResponse::unhealthy(e.to_string())),
        )
            .into_response(),
    }
}
