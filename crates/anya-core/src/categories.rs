//! Keyword → category table
//!
//! A typed, versioned lookup shared by the expense interpreter and the
//! intervention engine. Rules are checked in order and the first rule with a
//! matching keyword or merchant token wins; when nothing matches the caller
//! decides what to fall back to (history, the table default, or `Shopping`
//! for cart signals).

use serde::Serialize;

use crate::models::Category;

/// One category and the tokens that select it
#[derive(Debug, Clone, Serialize)]
pub struct KeywordRule {
    pub category: Category,
    /// Generic words ("coffee", "rent")
    pub keywords: Vec<String>,
    /// Merchant/brand names ("starbucks", "uber")
    pub merchants: Vec<String>,
}

impl KeywordRule {
    pub fn new(category: Category, keywords: &[&str], merchants: &[&str]) -> Self {
        Self {
            category,
            keywords: keywords.iter().map(|k| k.to_lowercase()).collect(),
            merchants: merchants.iter().map(|m| m.to_lowercase()).collect(),
        }
    }
}

/// Result of matching text against the table
#[derive(Debug, Clone, PartialEq)]
pub struct KeywordMatch {
    pub category: Category,
    /// The token that matched, lowercase
    pub token: String,
    /// Whether the token came from the rule's merchant list
    pub is_merchant: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct KeywordTable {
    pub version: u32,
    /// Explicit entry used when neither keywords nor history decide
    pub default: Category,
    rules: Vec<KeywordRule>,
}

impl KeywordTable {
    pub fn new(version: u32, default: Category, rules: Vec<KeywordRule>) -> Self {
        let rules = rules
            .into_iter()
            .map(|mut rule| {
                rule.keywords = rule.keywords.iter().map(|k| normalize(k)).collect();
                rule.merchants = rule.merchants.iter().map(|m| normalize(m)).collect();
                rule
            })
            .collect();
        Self {
            version,
            default,
            rules,
        }
    }

    /// Table with no rules; everything falls through to `default`
    pub fn empty(default: Category) -> Self {
        Self::new(0, default, Vec::new())
    }

    pub fn rules(&self) -> &[KeywordRule] {
        &self.rules
    }

    /// First rule whose keyword or merchant token appears in `text`
    pub fn match_text(&self, text: &str) -> Option<KeywordMatch> {
        let haystack = format!(" {} ", normalize(text));
        for rule in &self.rules {
            if let Some(token) = rule.merchants.iter().find(|m| contains_token(&haystack, m)) {
                return Some(KeywordMatch {
                    category: rule.category.clone(),
                    token: token.clone(),
                    is_merchant: true,
                });
            }
            if let Some(token) = rule.keywords.iter().find(|k| contains_token(&haystack, k)) {
                return Some(KeywordMatch {
                    category: rule.category.clone(),
                    token: token.clone(),
                    is_merchant: false,
                });
            }
        }
        None
    }
}

/// Lowercase and collapse everything that is not a letter or digit to single spaces
fn normalize(text: &str) -> String {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

fn contains_token(haystack: &str, token: &str) -> bool {
    !token.is_empty() && haystack.contains(&format!(" {} ", token))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> KeywordTable {
        KeywordTable::new(
            1,
            Category::Uncategorized,
            vec![
                KeywordRule::new(Category::Dining, &["coffee", "snacks"], &["starbucks"]),
                KeywordRule::new(Category::Transport, &["taxi", "metro card"], &["uber"]),
                KeywordRule::new(Category::Shopping, &["shoes"], &["amazon"]),
            ],
        )
    }

    #[test]
    fn test_keyword_match() {
        let m = table()
            .match_text("Spent ₹450 on coffee and snacks at Starbucks")
            .unwrap();
        assert_eq!(m.category, Category::Dining);
        assert!(m.is_merchant);
        assert_eq!(m.token, "starbucks");
    }

    #[test]
    fn test_whole_token_only() {
        // "taxidermy" must not match "taxi"
        assert!(table().match_text("paid 200 for taxidermy").is_none());
        assert_eq!(
            table().match_text("topped up my Metro-Card").unwrap().category,
            Category::Transport
        );
    }

    #[test]
    fn test_url_host_matches_merchant() {
        assert_eq!(
            table().match_text("www.amazon.in").unwrap().category,
            Category::Shopping
        );
        assert!(table().match_text("example.org").is_none());
    }

    #[test]
    fn test_rule_order_wins() {
        // Both dining and shopping tokens present: the earlier rule wins
        assert_eq!(
            table().match_text("coffee shoes").unwrap().category,
            Category::Dining
        );
    }
}
