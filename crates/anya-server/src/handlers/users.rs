//! Read-only per-user handlers

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::Utc;
use serde::Deserialize;

use crate::{AppError, AppState, MAX_PAGE_LIMIT};
use anya_core::models::{GoalProgress, InterventionEvent};
use anya_core::{BudgetMonitor, BudgetStatus, DashboardSnapshot, GoalPlanner};

/// Query parameters for listing interventions
#[derive(Debug, Deserialize)]
pub struct InterventionQuery {
    #[serde(default = "default_limit")]
    pub limit: i64,
}

fn default_limit() -> i64 {
    50
}

/// GET /api/users/:id/dashboard - Full dashboard snapshot
pub async fn get_dashboard(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> Result<Json<DashboardSnapshot>, AppError> {
    let snapshot = state.orchestrator.dashboard(&user_id, Utc::now())?;
    Ok(Json(snapshot))
}

/// GET /api/users/:id/goals - Progress for every goal, active first
pub async fn list_goals(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> Result<Json<Vec<GoalProgress>>, AppError> {
    let db = state.orchestrator.db();
    let user = db.get_user(&user_id)?;
    let goals = GoalPlanner::new(db).all_progress(&user, Utc::now())?;
    Ok(Json(goals))
}

/// GET /api/users/:id/budgets - Status of every defined budget in its current window
pub async fn list_budgets(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> Result<Json<Vec<BudgetStatus>>, AppError> {
    let db = state.orchestrator.db();
    let user = db.get_user(&user_id)?;
    let statuses =
        BudgetMonitor::new(db, state.orchestrator.config()).all_statuses(&user, Utc::now())?;
    Ok(Json(statuses))
}

/// GET /api/users/:id/interventions - Recent intervention events, newest first
pub async fn list_interventions(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
    Query(params): Query<InterventionQuery>,
) -> Result<Json<Vec<InterventionEvent>>, AppError> {
    if params.limit < 1 {
        return Err(AppError::bad_request("limit must be at least 1"));
    }
    let limit = params.limit.min(MAX_PAGE_LIMIT);

    let db = state.orchestrator.db();
    db.get_user(&user_id)?;
    Ok(Json(db.list_interventions(&user_id, limit)?))
}
