//! Chat transport handler

use std::sync::Arc;

use axum::{extract::State, Json};

use crate::{AppError, AppState};
use anya_core::{InboundMessage, OutboundMessage};

/// POST /api/chat - Handle one inbound chat message
///
/// `timestamp` may be omitted; the server clock is used then. Replaying the
/// same `{user_id, timestamp, text}` never logs an expense twice.
pub async fn post_chat(
    State(state): State<Arc<AppState>>,
    Json(message): Json<InboundMessage>,
) -> Result<Json<OutboundMessage>, AppError> {
    tracing::debug!(user_id = %message.user_id, "Inbound chat message");
    let reply = state.orchestrator.handle_message(&message).await?;
    Ok(Json(reply))
}
