//! Cart signal handler

use std::sync::Arc;

use axum::{extract::State, http::StatusCode, Json};
use chrono::Utc;

use crate::{AppError, AppState};
use anya_core::{CartSignal, SignalResponse, SignalStatus};

/// POST /api/signals/cart - Score a purchase-intent signal
///
/// Malformed signals come back as 400 with `status: "rejected"` and a reason;
/// nothing is persisted for them.
pub async fn post_cart_signal(
    State(state): State<Arc<AppState>>,
    Json(signal): Json<CartSignal>,
) -> Result<(StatusCode, Json<SignalResponse>), AppError> {
    let response = state.orchestrator.handle_signal(&signal, Utc::now())?;

    let status = match response.status {
        SignalStatus::Rejected => StatusCode::BAD_REQUEST,
        SignalStatus::Accepted | SignalStatus::Suppressed => StatusCode::OK,
    };
    Ok((status, Json(response)))
}
