//! Intervention follow-up handlers

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    Json,
};
use chrono::Utc;

use crate::{AppError, AppState};
use anya_core::intervention::ReconcileSummary;
use anya_core::models::InterventionEvent;

/// POST /api/interventions/:id/dismiss - User waved the nudge away
pub async fn dismiss_intervention(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<InterventionEvent>, AppError> {
    let event = state.orchestrator.dismiss_intervention(id, Utc::now())?;
    Ok(Json(event))
}

/// POST /api/users/:id/reconcile - Settle old nudges as purchased or abandoned
pub async fn reconcile_user(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> Result<Json<ReconcileSummary>, AppError> {
    let summary = state.orchestrator.reconcile(&user_id, Utc::now())?;
    tracing::info!(
        user_id = %user_id,
        checked = summary.checked,
        abandoned = summary.abandoned,
        "Reconciled interventions"
    );
    Ok(Json(summary))
}
