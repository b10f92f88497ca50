//! Mock backend for testing
//!
//! Answers instantly (or after a configured delay) with a fixed category.
//! Useful for unit tests and development without a running LLM server.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::models::Category;

use super::types::ExpenseClassification;
use super::AIBackend;

/// Mock AI backend for testing
#[derive(Clone, Default)]
pub struct MockBackend {
    /// Whether health_check should return true; unhealthy mocks fail every call
    pub healthy: bool,
    /// Category to answer with; `None` echoes the first candidate
    pub category: Option<Category>,
    /// Artificial latency, for timeout tests
    pub delay: Option<Duration>,
}

impl MockBackend {
    /// Create a new mock backend (healthy by default)
    pub fn new() -> Self {
        Self {
            healthy: true,
            ..Default::default()
        }
    }

    /// Create an unhealthy mock backend
    pub fn unhealthy() -> Self {
        Self::default()
    }

    pub fn with_category(mut self, category: Category) -> Self {
        self.category = Some(category);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

#[async_trait]
impl AIBackend for MockBackend {
    async fn classify_expense(
        &self,
        _text: &str,
        candidates: &[Category],
    ) -> Result<ExpenseClassification> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if !self.healthy {
            return Err(Error::Degraded("mock backend is unhealthy".into()));
        }

        let category = self
            .category
            .clone()
            .or_else(|| candidates.first().cloned())
            .unwrap_or(Category::Uncategorized);

        Ok(ExpenseClassification {
            category,
            confidence: 0.9,
        })
    }

    async fn health_check(&self) -> bool {
        self.healthy
    }

    fn model(&self) -> &str {
        "mock"
    }

    fn host(&self) -> &str {
        "mock://localhost"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_echoes_first_candidate() {
        let mock = MockBackend::new();
        let result = mock
            .classify_expense("paid 300", &[Category::Bills, Category::Dining])
            .await
            .unwrap();
        assert_eq!(result.category, Category::Bills);
    }

    #[tokio::test]
    async fn test_mock_health_check() {
        assert!(MockBackend::new().health_check().await);
        assert!(!MockBackend::unhealthy().health_check().await);
    }
}
