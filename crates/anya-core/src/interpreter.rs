//! Expense interpreter: free text → structured transaction proposal
//!
//! Pure and synchronous. The caller supplies the user's recent category
//! history; nothing here touches the ledger or the network.
//!
//! Three steps:
//! 1. Amount: every money-looking token is a candidate and the largest wins.
//! 2. Category: keyword table, then history (most frequent, ties to the most
//!    recent), then the table default.
//! 3. Merchant: the phrase after `at`/`from`/`to`, else the merchant token the
//!    keyword table matched.

use std::collections::HashMap;

use regex::Regex;
use serde::Serialize;

use crate::categories::KeywordTable;
use crate::config::EngineConfig;
use crate::error::Result;
use crate::models::Category;
use crate::money;

/// Confidence assigned by each categorization tier
pub const KEYWORD_CONFIDENCE: f64 = 1.0;
pub const HISTORY_CONFIDENCE: f64 = 0.5;
pub const DEFAULT_CONFIDENCE: f64 = 0.2;

/// Words that end a merchant phrase
const MERCHANT_STOP_WORDS: &[&str] = &[
    "for", "on", "with", "and", "using", "via", "in", "today", "yesterday", "tonight", "this",
    "last",
];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExpenseProposal {
    /// Minor units
    pub amount: i64,
    pub category: Category,
    pub merchant: Option<String>,
    pub confidence: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryCandidate {
    pub category: Category,
    pub confidence: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Interpretation {
    Proposal(ExpenseProposal),
    NotAnExpense,
    AmbiguousCategory {
        amount: i64,
        merchant: Option<String>,
        /// Best first; never empty
        candidates: Vec<CategoryCandidate>,
    },
}

pub struct ExpenseInterpreter {
    amount_re: Regex,
    merchant_re: Regex,
    keywords: KeywordTable,
    confidence_threshold: f64,
    history_limit: usize,
}

impl ExpenseInterpreter {
    pub fn new(config: &EngineConfig) -> Result<Self> {
        let amount_re = Regex::new(
            r"(?ix)
            (?P<neg>-)?
            (?:(?P<prefix>₹|rs\.?|inr|usd|\$|€|eur|£|gbp)\s*)?
            (?P<num>\d[\d,.]*\d|\d)
            (?:\s*(?P<suffix>k|lakhs?|lacs?|crores?|cr|rupees?|rs|inr|usd|dollars?|eur|euros?|gbp|pounds?)\b)?
            ",
        )?;
        let merchant_re = Regex::new(
            r"(?i)\b(?:at|from|to)\s+(?P<phrase>\p{L}[\p{L}\d&'.-]*(?:\s+\p{L}[\p{L}\d&'.-]*){0,4})",
        )?;

        Ok(Self {
            amount_re,
            merchant_re,
            keywords: config.keywords.clone(),
            confidence_threshold: config.interpreter.confidence_threshold,
            history_limit: config.interpreter.history_limit,
        })
    }

    pub fn keywords(&self) -> &KeywordTable {
        &self.keywords
    }

    /// Interpret one chat message.
    ///
    /// `history` is the user's recent spend categories, most recent first;
    /// anything past the configured limit is ignored.
    pub fn interpret(&self, text: &str, history: &[Category], currency: &str) -> Interpretation {
        let amount = match self.extract_amount(text, currency) {
            Some(a) if a > 0 => a,
            _ => return Interpretation::NotAnExpense,
        };

        let keyword = self.keywords.match_text(text);
        let merchant = self.extract_merchant(text).or_else(|| {
            keyword
                .as_ref()
                .filter(|m| m.is_merchant)
                .map(|m| title_case(&m.token))
        });

        let history = &history[..history.len().min(self.history_limit)];
        let candidates = match keyword {
            Some(m) => vec![CategoryCandidate {
                category: m.category,
                confidence: KEYWORD_CONFIDENCE,
            }],
            None => self.fallback_candidates(history),
        };

        let best = &candidates[0];
        if best.confidence >= self.confidence_threshold {
            Interpretation::Proposal(ExpenseProposal {
                amount,
                category: best.category.clone(),
                merchant,
                confidence: best.confidence,
            })
        } else {
            Interpretation::AmbiguousCategory {
                amount,
                merchant,
                candidates,
            }
        }
    }

    /// Largest money amount in `text`, in minor units. `None` when there is none.
    pub fn extract_amount(&self, text: &str, currency: &str) -> Option<i64> {
        self.amount_re
            .captures_iter(text)
            .filter_map(|caps| {
                let minor = money::parse_minor(caps.name("num")?.as_str(), currency)?;
                let multiplier = caps
                    .name("suffix")
                    .map(|s| suffix_multiplier(s.as_str()))
                    .unwrap_or(1);
                let value = minor.checked_mul(multiplier)?;
                Some(if caps.name("neg").is_some() { -value } else { value })
            })
            .max()
    }

    /// Merchant phrase after at/from/to, title-cased
    pub fn extract_merchant(&self, text: &str) -> Option<String> {
        let caps = self.merchant_re.captures(text)?;
        let words: Vec<&str> = caps
            .name("phrase")?
            .as_str()
            .split_whitespace()
            .take_while(|w| !MERCHANT_STOP_WORDS.contains(&w.to_lowercase().as_str()))
            .collect();
        let phrase = words.join(" ");
        let phrase = phrase.trim_end_matches(|c: char| c == '.' || c == '\'' || c == '-');
        if phrase.is_empty() {
            return None;
        }
        Some(title_case(phrase))
    }

    /// History-ranked candidates followed by the table default
    fn fallback_candidates(&self, history: &[Category]) -> Vec<CategoryCandidate> {
        // (count, most recent index)
        let mut stats: HashMap<&Category, (usize, usize)> = HashMap::new();
        for (idx, category) in history.iter().enumerate() {
            let entry = stats.entry(category).or_insert((0, idx));
            entry.0 += 1;
        }

        let mut ranked: Vec<(&Category, usize, usize)> =
            stats.into_iter().map(|(c, (n, first))| (c, n, first)).collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.2.cmp(&b.2)));

        let top_count = ranked.first().map(|r| r.1).unwrap_or(1) as f64;
        let mut candidates: Vec<CategoryCandidate> = ranked
            .into_iter()
            .map(|(category, count, _)| CategoryCandidate {
                category: category.clone(),
                confidence: HISTORY_CONFIDENCE * count as f64 / top_count,
            })
            .collect();

        if !candidates.iter().any(|c| c.category == self.keywords.default) {
            candidates.push(CategoryCandidate {
                category: self.keywords.default.clone(),
                confidence: DEFAULT_CONFIDENCE,
            });
        }
        candidates
    }
}

fn suffix_multiplier(suffix: &str) -> i64 {
    match suffix.to_lowercase().as_str() {
        "k" => 1_000,
        "lakh" | "lakhs" | "lac" | "lacs" => 100_000,
        "crore" | "crores" | "cr" => 10_000_000,
        _ => 1,
    }
}

fn title_case(phrase: &str) -> String {
    phrase
        .split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
