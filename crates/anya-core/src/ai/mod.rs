//! Pluggable expense-categorization backend
//!
//! The interpreter hands ambiguous expenses to this capability. Callers only
//! see the `AIBackend` interface; which implementation answers is decided by
//! the environment.
//!
//! # Architecture
//!
//! - `AIBackend` trait: the categorization interface
//! - `AIClient` enum: concrete wrapper providing Clone + compile-time dispatch
//! - Backend implementations: `OpenAICompatibleBackend` (primary, external),
//!   `LocalBackend` (deterministic keyword table), `MockBackend` (tests)
//!
//! # Configuration
//!
//! Environment variables:
//! - `AI_BACKEND`: Backend to use (openai_compatible, local, mock). Default: local
//! - `OPENAI_COMPATIBLE_HOST`: Server URL (required for openai_compatible backend)
//! - `OPENAI_COMPATIBLE_MODEL`: Model name (default: llama-3.1-8b-instant)
//! - `OPENAI_COMPATIBLE_API_KEY`: API key if required (optional)

mod local;
mod mock;
mod openai_compatible;
pub mod parsing;
pub mod types;

pub use local::LocalBackend;
pub use mock::MockBackend;
pub use openai_compatible::OpenAICompatibleBackend;
pub use types::*;

use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::categories::KeywordTable;
use crate::error::{Error, Result};
use crate::models::Category;

/// Trait defining the interface for all categorization backends
///
/// Backends should be Send + Sync to allow use across async tasks.
#[async_trait]
pub trait AIBackend: Send + Sync {
    /// Pick a category for an expense the keyword table could not place.
    ///
    /// `candidates` are the interpreter's own guesses, best first.
    async fn classify_expense(
        &self,
        text: &str,
        candidates: &[Category],
    ) -> Result<ExpenseClassification>;

    /// Check if the backend is available
    async fn health_check(&self) -> bool;

    /// Get the model name (for logging)
    fn model(&self) -> &str;

    /// Get the host URL (for logging)
    fn host(&self) -> &str;
}

/// Concrete AI client enum
///
/// Provides Clone and compile-time dispatch without Box<dyn> overhead.
#[derive(Clone)]
pub enum AIClient {
    /// OpenAI-compatible chat completions (Groq, vLLM, LocalAI, llama-server)
    OpenAICompatible(OpenAICompatibleBackend),
    /// Deterministic keyword-table backend
    Local(LocalBackend),
    /// Mock backend for testing
    Mock(MockBackend),
}

impl AIClient {
    /// Create an AI client from environment variables
    ///
    /// Checks `AI_BACKEND` to determine which backend to use:
    /// - `local` (default): keyword table only, no network
    /// - `openai_compatible`: Uses OPENAI_COMPATIBLE_HOST and OPENAI_COMPATIBLE_MODEL;
    ///   falls back to `local` when the host is not set
    /// - `mock`: Creates a mock backend for testing
    pub fn from_env(keywords: &KeywordTable) -> Self {
        let backend = std::env::var("AI_BACKEND").unwrap_or_else(|_| "local".to_string());

        match backend.to_lowercase().as_str() {
            "openai_compatible" | "openai" | "groq" | "vllm" | "localai" | "llamacpp" => {
                match OpenAICompatibleBackend::from_env() {
                    Some(b) => AIClient::OpenAICompatible(b),
                    None => {
                        warn!("AI_BACKEND=openai_compatible but OPENAI_COMPATIBLE_HOST is not set, using local keywords");
                        AIClient::local(keywords)
                    }
                }
            }
            "mock" => AIClient::mock(),
            "local" => AIClient::local(keywords),
            _ => {
                warn!(backend = %backend, "Unknown AI_BACKEND, falling back to local");
                AIClient::local(keywords)
            }
        }
    }

    /// Create a local keyword backend directly
    pub fn local(keywords: &KeywordTable) -> Self {
        AIClient::Local(LocalBackend::new(keywords.clone()))
    }

    /// Create a mock backend for testing
    pub fn mock() -> Self {
        AIClient::Mock(MockBackend::new())
    }
}

// Implement AIBackend for AIClient by delegating to the inner backend
#[async_trait]
impl AIBackend for AIClient {
    async fn classify_expense(
        &self,
        text: &str,
        candidates: &[Category],
    ) -> Result<ExpenseClassification> {
        match self {
            AIClient::OpenAICompatible(b) => b.classify_expense(text, candidates).await,
            AIClient::Local(b) => b.classify_expense(text, candidates).await,
            AIClient::Mock(b) => b.classify_expense(text, candidates).await,
        }
    }

    async fn health_check(&self) -> bool {
        match self {
            AIClient::OpenAICompatible(b) => b.health_check().await,
            AIClient::Local(b) => b.health_check().await,
            AIClient::Mock(b) => b.health_check().await,
        }
    }

    fn model(&self) -> &str {
        match self {
            AIClient::OpenAICompatible(b) => b.model(),
            AIClient::Local(b) => b.model(),
            AIClient::Mock(b) => b.model(),
        }
    }

    fn host(&self) -> &str {
        match self {
            AIClient::OpenAICompatible(b) => b.host(),
            AIClient::Local(b) => b.host(),
            AIClient::Mock(b) => b.host(),
        }
    }
}

/// Classify with an upper time bound.
///
/// Timeouts, transport failures and answers outside the allowed set all come
/// back as `Error::Degraded`; the caller substitutes its own fallback.
pub async fn classify_with_timeout<B: AIBackend + ?Sized>(
    backend: &B,
    text: &str,
    candidates: &[Category],
    timeout: Duration,
) -> Result<ExpenseClassification> {
    let result = tokio::time::timeout(timeout, backend.classify_expense(text, candidates))
        .await
        .map_err(|_| {
            Error::Degraded(format!(
                "{} did not answer within {}ms",
                backend.host(),
                timeout.as_millis()
            ))
        })?;

    let classification = match result {
        Ok(c) => c,
        Err(Error::Degraded(msg)) => return Err(Error::Degraded(msg)),
        Err(e) => return Err(Error::Degraded(e.to_string())),
    };

    let allowed = candidates.contains(&classification.category)
        || (classification.category.is_builtin() && classification.category != Category::Savings);
    if !allowed {
        return Err(Error::Degraded(format!(
            "AI proposed unknown category '{}'",
            classification.category
        )));
    }

    debug!(
        model = backend.model(),
        category = %classification.category,
        confidence = classification.confidence,
        "AI categorized expense"
    );
    Ok(classification)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::categories::KeywordRule;

    fn keywords() -> KeywordTable {
        KeywordTable::new(
            3,
            Category::Uncategorized,
            vec![KeywordRule::new(Category::Groceries, &["vegetables"], &["bigbasket"])],
        )
    }

    #[test]
    fn test_ai_client_mock() {
        let client = AIClient::mock();
        assert_eq!(client.model(), "mock");
        assert_eq!(client.host(), "mock://localhost");
    }

    #[test]
    fn test_ai_client_local() {
        let client = AIClient::local(&keywords());
        assert_eq!(client.model(), "keyword-table-v3");
        assert_eq!(client.host(), "local");
    }

    #[tokio::test]
    async fn test_mock_health_check() {
        assert!(AIClient::mock().health_check().await);
        assert!(!AIClient::Mock(MockBackend::unhealthy()).health_check().await);
    }

    #[tokio::test]
    async fn test_classify_with_timeout_ok() {
        let client = AIClient::Mock(MockBackend::new().with_category(Category::Travel));
        let result = classify_with_timeout(
            &client,
            "paid 4000 to Raju",
            &[Category::Groceries],
            Duration::from_secs(1),
        )
        .await
        .unwrap();
        assert_eq!(result.category, Category::Travel);
    }

    #[tokio::test]
    async fn test_classify_with_timeout_degrades_on_slow_backend() {
        let client = AIClient::Mock(MockBackend::new().with_delay(Duration::from_millis(200)));
        let err = classify_with_timeout(
            &client,
            "paid 4000 to Raju",
            &[Category::Groceries],
            Duration::from_millis(20),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, Error::Degraded(_)));
    }

    #[tokio::test]
    async fn test_classify_rejects_unknown_custom_category() {
        let client = AIClient::Mock(
            MockBackend::new().with_category(Category::Custom("crypto".to_string())),
        );
        let err = classify_with_timeout(
            &client,
            "paid 4000",
            &[Category::Groceries],
            Duration::from_secs(1),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, Error::Degraded(_)));
    }

    #[tokio::test]
    async fn test_unhealthy_mock_is_degraded() {
        let client = AIClient::Mock(MockBackend::unhealthy());
        let err = classify_with_timeout(&client, "x", &[], Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Degraded(_)));
    }
}
