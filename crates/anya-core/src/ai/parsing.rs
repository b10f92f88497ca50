//! JSON parsing helpers for AI backend responses
//!
//! Models often wrap the JSON payload in prose or code fences, so the
//! outermost `{...}` is extracted before deserializing.

use crate::error::{Error, Result};

use super::types::ExpenseClassification;

/// Truncate long responses for the error message
fn truncate_raw(raw: &str) -> String {
    if raw.chars().count() > 200 {
        format!("{}...", raw.chars().take(200).collect::<String>())
    } else {
        raw.to_string()
    }
}

/// Parse an expense classification from an AI response
pub fn parse_classification(response: &str) -> Result<ExpenseClassification> {
    let response = response.trim();
    let start = response.find('{');
    let end = response.rfind('}');

    match (start, end) {
        (Some(s), Some(e)) if s < e => {
            let json_str = &response[s..=e];
            let parsed: ExpenseClassification = serde_json::from_str(json_str).map_err(|e| {
                Error::Degraded(format!(
                    "Invalid JSON from AI: {} | Raw: {}",
                    e,
                    truncate_raw(json_str)
                ))
            })?;
            if !(0.0..=1.0).contains(&parsed.confidence) {
                return Err(Error::Degraded(format!(
                    "AI confidence out of range: {}",
                    parsed.confidence
                )));
            }
            Ok(parsed)
        }
        _ => Err(Error::Degraded(format!(
            "No JSON found in AI response | Raw: {}",
            truncate_raw(response)
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Category;

    #[test]
    fn test_parse_wrapped_json() {
        let raw = "Sure! Here you go:\n```json\n{\"category\": \"Groceries\", \"confidence\": 0.8}\n```";
        let parsed = parse_classification(raw).unwrap();
        assert_eq!(parsed.category, Category::Groceries);
        assert_eq!(parsed.confidence, 0.8);
    }

    #[test]
    fn test_parse_missing_confidence_defaults() {
        let parsed = parse_classification("{\"category\": \"travel\"}").unwrap();
        assert_eq!(parsed.category, Category::Travel);
        assert_eq!(parsed.confidence, 0.5);
    }

    #[test]
    fn test_parse_failures_are_degraded() {
        assert!(matches!(
            parse_classification("I think it's dining"),
            Err(Error::Degraded(_))
        ));
        assert!(matches!(
            parse_classification("{\"category\": \"dining\", \"confidence\": 3}"),
            Err(Error::Degraded(_))
        ));
        assert!(matches!(
            parse_classification("{\"category\": \"\"}"),
            Err(Error::Degraded(_))
        ));
    }
}
