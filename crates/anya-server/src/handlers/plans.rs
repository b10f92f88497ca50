//! Goal and budget write handlers

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;

use crate::{AppError, AppState};
use anya_core::models::{Budget, BudgetPeriod, BudgetScope, Goal};
use anya_core::GoalPlanner;

/// Body for defining a budget
#[derive(Debug, Deserialize)]
pub struct CreateBudgetRequest {
    /// Category name, or "overall"
    #[serde(default = "default_scope")]
    pub scope: String,
    #[serde(default = "default_period")]
    pub period: String,
    /// Limit in minor currency units
    pub limit_amount: i64,
}

fn default_scope() -> String {
    "overall".to_string()
}

fn default_period() -> String {
    "monthly".to_string()
}

/// POST /api/users/:id/budgets - Define a budget (409 if the scope and period already have one)
pub async fn create_budget(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
    Json(req): Json<CreateBudgetRequest>,
) -> Result<(StatusCode, Json<Budget>), AppError> {
    let scope: BudgetScope = req
        .scope
        .parse()
        .map_err(|e: String| AppError::bad_request(&e))?;
    let period: BudgetPeriod = req
        .period
        .parse()
        .map_err(|e: String| AppError::bad_request(&e))?;

    let db = state.orchestrator.db();
    let user = db.get_user(&user_id)?;
    let budget = db.create_budget(&user.id, &scope, period, req.limit_amount)?;
    Ok((StatusCode::CREATED, Json(budget)))
}

/// POST /api/users/:id/goals/:goal_id/primary - Make a goal the intervention reference
pub async fn set_primary_goal(
    State(state): State<Arc<AppState>>,
    Path((user_id, goal_id)): Path<(String, i64)>,
) -> Result<Json<Goal>, AppError> {
    let db = state.orchestrator.db();
    let user = db.get_user(&user_id)?;
    let goal = GoalPlanner::new(db).set_primary(&user, goal_id)?;
    Ok(Json(goal))
}
