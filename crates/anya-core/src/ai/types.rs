//! AI backend response types
//!
//! These types are backend-agnostic and used across all AI implementations.

use serde::{Deserialize, Serialize};

use crate::models::Category;

/// Result of classifying an ambiguous expense
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpenseClassification {
    pub category: Category,
    /// Backend's own confidence in [0, 1]
    #[serde(default = "default_confidence")]
    pub confidence: f64,
}

fn default_confidence() -> f64 {
    0.5
}
