//! Deterministic local backend
//!
//! Answers from the keyword table alone, so categorization keeps working
//! with no network and gives the same answer for the same input.

use async_trait::async_trait;

use crate::categories::KeywordTable;
use crate::error::Result;
use crate::models::Category;

use super::types::ExpenseClassification;
use super::AIBackend;

#[derive(Clone)]
pub struct LocalBackend {
    keywords: KeywordTable,
    model: String,
}

impl LocalBackend {
    pub fn new(keywords: KeywordTable) -> Self {
        let model = format!("keyword-table-v{}", keywords.version);
        Self { keywords, model }
    }
}

#[async_trait]
impl AIBackend for LocalBackend {
    async fn classify_expense(
        &self,
        text: &str,
        candidates: &[Category],
    ) -> Result<ExpenseClassification> {
        if let Some(m) = self.keywords.match_text(text) {
            return Ok(ExpenseClassification {
                category: m.category,
                confidence: 1.0,
            });
        }

        Ok(ExpenseClassification {
            category: candidates
                .first()
                .cloned()
                .unwrap_or_else(|| self.keywords.default.clone()),
            confidence: 0.2,
        })
    }

    async fn health_check(&self) -> bool {
        true
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn host(&self) -> &str {
        "local"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::categories::KeywordRule;

    fn backend() -> LocalBackend {
        LocalBackend::new(KeywordTable::new(
            2,
            Category::Uncategorized,
            vec![KeywordRule::new(Category::Healthcare, &["pharmacy"], &["apollo"])],
        ))
    }

    #[tokio::test]
    async fn test_keyword_hit() {
        let result = backend()
            .classify_expense("apollo 800", &[Category::Dining])
            .await
            .unwrap();
        assert_eq!(result.category, Category::Healthcare);
        assert_eq!(result.confidence, 1.0);
    }

    #[tokio::test]
    async fn test_falls_back_to_candidates_then_default() {
        let b = backend();
        let first = b.classify_expense("paid 800", &[Category::Dining]).await.unwrap();
        assert_eq!(first.category, Category::Dining);
        assert_eq!(first.confidence, 0.2);

        let none = b.classify_expense("paid 800", &[]).await.unwrap();
        assert_eq!(none.category, Category::Uncategorized);
    }
}
