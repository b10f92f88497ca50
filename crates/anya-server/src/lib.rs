//! Anya Web Server
//!
//! Axum-based JSON API in front of the Anya session orchestrator: chat
//! messages, cart signals, intervention follow-ups and read-only dashboards.
//!
//! Security features:
//! - Bearer API key authentication (secure by default, use --no-auth for local dev)
//! - Restrictive CORS policy
//! - Input validation (pagination limits)
//! - Sanitized error responses

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{header, HeaderValue, Method, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use tower_http::{cors::CorsLayer, set_header::SetResponseHeaderLayer, trace::TraceLayer};
use tracing::{error, info, warn};

use anya_core::{AIBackend, ErrorKind, SessionOrchestrator};

mod handlers;
mod scheduler;

pub use scheduler::{start_reconcile_scheduler, ReconcileScheduleConfig};

/// Maximum pagination limit
pub const MAX_PAGE_LIMIT: i64 = 1000;

/// Authorization header for API key auth
const AUTHORIZATION_HEADER: &str = "authorization";

/// Server configuration
#[derive(Clone)]
pub struct ServerConfig {
    /// Whether authentication is required (secure by default)
    pub require_auth: bool,
    /// Allowed CORS origins (empty = same-origin only in production)
    pub allowed_origins: Vec<String>,
    /// API keys for the chat transport and the cart collaborator.
    /// Format: "Bearer <key>" in Authorization header
    pub api_keys: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            require_auth: true,
            allowed_origins: vec![],
            api_keys: vec![],
        }
    }
}

impl ServerConfig {
    /// Read bearer keys from `ANYA_API_KEYS` (comma-separated)
    pub fn with_env_api_keys(mut self) -> Self {
        if let Ok(keys) = std::env::var("ANYA_API_KEYS") {
            self.api_keys = parse_api_keys(&keys);
        }
        self
    }
}

/// Split a comma-separated key list, dropping blanks
pub fn parse_api_keys(input: &str) -> Vec<String> {
    input
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

/// Shared application state
pub struct AppState {
    pub orchestrator: Arc<SessionOrchestrator>,
    pub config: ServerConfig,
}

/// Authentication middleware - validates the Bearer API key
///
/// Keys are compared in constant time to prevent timing attacks.
async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    if !state.config.require_auth {
        return next.run(request).await;
    }

    let api_key_valid = request
        .headers()
        .get(AUTHORIZATION_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|auth| auth.strip_prefix("Bearer "))
        .map(|key| validate_api_key(key, &state.config.api_keys))
        .unwrap_or(false);

    if api_key_valid {
        tracing::debug!(path = %request.uri().path(), "Authenticated via API key");
        return next.run(request).await;
    }

    warn!(path = %request.uri().path(), "Unauthorized request - no valid auth");
    (
        StatusCode::UNAUTHORIZED,
        Json(serde_json::json!({
            "error": "Authentication required"
        })),
    )
        .into_response()
}

/// Validate an API key against the configured keys using constant-time comparison
fn validate_api_key(provided: &str, valid_keys: &[String]) -> bool {
    use subtle::ConstantTimeEq;

    let provided_bytes = provided.as_bytes();

    for key in valid_keys {
        let key_bytes = key.as_bytes();
        // Only compare if lengths match (constant-time for same-length keys)
        if provided_bytes.len() == key_bytes.len() && bool::from(provided_bytes.ct_eq(key_bytes)) {
            return true;
        }
    }
    false
}

/// Success response
#[derive(Serialize)]
pub struct SuccessResponse {
    pub success: bool,
}

/// GET /health - liveness probe, outside authentication
async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

/// Create the application router
pub fn create_router(orchestrator: Arc<SessionOrchestrator>, config: ServerConfig) -> Router {
    info!(
        "Categorization backend: {} ({})",
        orchestrator.ai().model(),
        orchestrator.ai().host()
    );

    let state = Arc::new(AppState {
        orchestrator,
        config: config.clone(),
    });

    let api_routes = Router::new()
        // Chat transport
        .route("/chat", post(handlers::post_chat))
        // Cart collaborator
        .route("/signals/cart", post(handlers::post_cart_signal))
        // Intervention follow-ups
        .route(
            "/interventions/:id/dismiss",
            post(handlers::dismiss_intervention),
        )
        .route("/users/:id/reconcile", post(handlers::reconcile_user))
        // Goal and budget definitions
        .route(
            "/users/:id/goals/:goal_id/primary",
            post(handlers::set_primary_goal),
        )
        // Dashboard (read-only)
        .route("/users/:id/dashboard", get(handlers::get_dashboard))
        .route("/users/:id/goals", get(handlers::list_goals))
        .route(
            "/users/:id/budgets",
            get(handlers::list_budgets).post(handlers::create_budget),
        )
        .route("/users/:id/interventions", get(handlers::list_interventions));

    // Build CORS layer
    let cors = if config.allowed_origins.is_empty() {
        // Restrictive default: only allow same-origin
        CorsLayer::new()
            .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
            .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
    } else {
        let origins: Vec<HeaderValue> = config
            .allowed_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
            .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
    };

    Router::new()
        .nest("/api", api_routes)
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ))
        .route("/health", get(health))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        // Security headers
        .layer(SetResponseHeaderLayer::overriding(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::X_FRAME_OPTIONS,
            HeaderValue::from_static("DENY"),
        ))
}

/// Start the server with default configuration
pub async fn serve(orchestrator: SessionOrchestrator, host: &str, port: u16) -> anyhow::Result<()> {
    serve_with_config(
        orchestrator,
        host,
        port,
        ServerConfig::default().with_env_api_keys(),
    )
    .await
}

/// Start the server with custom configuration
pub async fn serve_with_config(
    orchestrator: SessionOrchestrator,
    host: &str,
    port: u16,
    config: ServerConfig,
) -> anyhow::Result<()> {
    if !config.require_auth {
        warn!("⚠️  Authentication disabled - do not expose to network!");
    } else if config.api_keys.is_empty() {
        warn!("⚠️  No API keys configured (set ANYA_API_KEYS); every /api request will be rejected");
    }

    check_ai_connection(&orchestrator).await;

    let orchestrator = Arc::new(orchestrator);

    if let Some(schedule) = ReconcileScheduleConfig::from_env() {
        start_reconcile_scheduler(orchestrator.clone(), schedule);
    }

    let app = create_router(orchestrator, config);
    let addr = format!("{}:{}", host, port);

    info!("Starting server at http://{}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Check and log categorization backend status
async fn check_ai_connection(orchestrator: &SessionOrchestrator) {
    let ai = orchestrator.ai();
    if ai.health_check().await {
        info!("✅ Categorization backend ready: {} ({})", ai.model(), ai.host());
    } else {
        warn!(
            "⚠️  Categorization backend not responding: {} (keyword fallback will be used)",
            ai.host()
        );
    }
}

// ============================================================================
// Error Handling
// ============================================================================

/// Application error type with proper HTTP status codes
pub struct AppError {
    status: StatusCode,
    message: String,
    internal: Option<anyhow::Error>,
}

impl AppError {
    pub fn bad_request(msg: &str) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: msg.to_string(),
            internal: None,
        }
    }

    pub fn not_found(msg: &str) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: msg.to_string(),
            internal: None,
        }
    }

    pub fn conflict(msg: &str) -> Self {
        Self {
            status: StatusCode::CONFLICT,
            message: msg.to_string(),
            internal: None,
        }
    }

    pub fn internal(err: anyhow::Error) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            // Return generic message to client
            message: "An internal error occurred".to_string(),
            // Keep full error for logging
            internal: Some(err),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        // Log the full internal error if present
        if let Some(err) = &self.internal {
            error!(error = %err, "Internal error");
        }

        let body = Json(serde_json::json!({
            "error": self.message
        }));

        (self.status, body).into_response()
    }
}

impl From<anya_core::Error> for AppError {
    fn from(err: anya_core::Error) -> Self {
        match err.kind() {
            ErrorKind::InvalidInput => Self::bad_request(&err.to_string()),
            ErrorKind::NotFound => Self::not_found(&err.to_string()),
            ErrorKind::Conflict => Self::conflict("Request conflicted with another update, retry"),
            ErrorKind::Degraded | ErrorKind::Internal => Self::internal(err.into()),
        }
    }
}
