//! Domain models for Anya

use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::period::DEFAULT_TZ;

/// A person talking to the assistant. Created on first contact, never deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    /// ISO 4217 code, e.g. "INR"
    pub currency: String,
    /// IANA timezone name, e.g. "Asia/Kolkata"
    pub timezone: String,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

impl User {
    /// Parsed timezone; names are validated on write so the fallback is not hit in practice
    pub fn tz(&self) -> Tz {
        self.timezone.parse().unwrap_or(DEFAULT_TZ)
    }
}

/// Spending category
///
/// The fixed variants cover the keyword table; anything else a user or an AI
/// backend names is kept as a lowercase `Custom` tag.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Category {
    Dining,
    Groceries,
    Shopping,
    Transport,
    Entertainment,
    Bills,
    Healthcare,
    Education,
    Travel,
    /// Money put aside toward a goal
    Savings,
    Uncategorized,
    Custom(String),
}

impl Category {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Dining => "dining",
            Self::Groceries => "groceries",
            Self::Shopping => "shopping",
            Self::Transport => "transport",
            Self::Entertainment => "entertainment",
            Self::Bills => "bills",
            Self::Healthcare => "healthcare",
            Self::Education => "education",
            Self::Travel => "travel",
            Self::Savings => "savings",
            Self::Uncategorized => "uncategorized",
            Self::Custom(tag) => tag.as_str(),
        }
    }

    /// Human-readable label ("Dining", "Pet care")
    pub fn label(&self) -> String {
        let s = self.as_str().replace(|c: char| c == '_' || c == '-', " ");
        let mut chars = s.chars();
        match chars.next() {
            Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
            None => String::new(),
        }
    }

    /// Needs rather than wants. Spend in these categories defaults to essential.
    pub fn is_essential(&self) -> bool {
        matches!(
            self,
            Self::Groceries | Self::Transport | Self::Bills | Self::Healthcare | Self::Education
        )
    }

    /// Every built-in category, for prompts and listings
    pub fn builtin() -> &'static [Category] {
        &[
            Category::Dining,
            Category::Groceries,
            Category::Shopping,
            Category::Transport,
            Category::Entertainment,
            Category::Bills,
            Category::Healthcare,
            Category::Education,
            Category::Travel,
            Category::Savings,
            Category::Uncategorized,
        ]
    }

    pub fn is_builtin(&self) -> bool {
        !matches!(self, Self::Custom(_))
    }
}

impl std::str::FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase();
        match normalized.as_str() {
            "" => Err("Category cannot be empty".to_string()),
            "*" => Err("'*' is a budget scope, not a category".to_string()),
            "dining" | "food" | "restaurants" => Ok(Self::Dining),
            "groceries" | "grocery" => Ok(Self::Groceries),
            "shopping" => Ok(Self::Shopping),
            "transport" | "transportation" => Ok(Self::Transport),
            "entertainment" => Ok(Self::Entertainment),
            "bills" | "utilities" => Ok(Self::Bills),
            "healthcare" | "health" => Ok(Self::Healthcare),
            "education" => Ok(Self::Education),
            "travel" => Ok(Self::Travel),
            "savings" => Ok(Self::Savings),
            "uncategorized" | "other" => Ok(Self::Uncategorized),
            other => Ok(Self::Custom(other.to_string())),
        }
    }
}

impl TryFrom<String> for Category {
    type Error = String;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Category> for String {
    fn from(category: Category) -> Self {
        category.as_str().to_string()
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Transaction source - how it entered the ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum TransactionSource {
    /// Logged through a chat message
    #[default]
    Chat,
    /// Recorded from a cart/checkout signal
    ExternalSignal,
}

impl TransactionSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Chat => "chat",
            Self::ExternalSignal => "external-signal",
        }
    }
}

impl std::str::FromStr for TransactionSource {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "chat" => Ok(Self::Chat),
            "external-signal" | "external_signal" => Ok(Self::ExternalSignal),
            _ => Err(format!("Unknown transaction source: {}", s)),
        }
    }
}

impl std::fmt::Display for TransactionSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An immutable ledger entry
///
/// Positive amounts are money leaving the user's spendable balance (a
/// purchase, or a contribution when `goal_id` is set); negative amounts
/// offset earlier entries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub id: i64,
    pub user_id: String,
    /// Minor units (paise for INR)
    pub amount: i64,
    pub category: Category,
    pub merchant: Option<String>,
    /// Original chat text, if any
    pub description: Option<String>,
    pub occurred_at: DateTime<Utc>,
    pub source: TransactionSource,
    /// Set when the entry is a contribution toward a goal
    pub goal_id: Option<i64>,
    /// Set on offsetting/replacement entries: the transaction being corrected
    pub corrects_id: Option<i64>,
    pub dedupe_hash: Option<String>,
    pub created_at: DateTime<Utc>,
    /// Needed spend; the rest counts toward non-essential totals
    pub is_essential: bool,
}

/// New transaction to be appended
#[derive(Debug, Clone)]
pub struct NewTransaction {
    pub user_id: String,
    pub amount: i64,
    pub category: Category,
    pub merchant: Option<String>,
    pub description: Option<String>,
    pub occurred_at: DateTime<Utc>,
    pub source: TransactionSource,
    pub goal_id: Option<i64>,
    pub dedupe_hash: Option<String>,
    pub is_essential: bool,
}

impl NewTransaction {
    /// Spend entry logged from chat
    pub fn spend(user_id: &str, amount: i64, category: Category, occurred_at: DateTime<Utc>) -> Self {
        Self {
            user_id: user_id.to_string(),
            amount,
            merchant: None,
            description: None,
            occurred_at,
            source: TransactionSource::Chat,
            goal_id: None,
            dedupe_hash: None,
            is_essential: category.is_essential(),
            category,
        }
    }

    /// Contribution toward a goal
    pub fn contribution(user_id: &str, goal_id: i64, amount: i64, occurred_at: DateTime<Utc>) -> Self {
        Self {
            goal_id: Some(goal_id),
            ..Self::spend(user_id, amount, Category::Savings, occurred_at)
        }
    }

    pub fn with_merchant(mut self, merchant: Option<String>) -> Self {
        self.merchant = merchant;
        self
    }

    pub fn with_description(mut self, description: &str) -> Self {
        self.description = Some(description.to_string());
        self
    }

    pub fn with_essential(mut self, is_essential: bool) -> Self {
        self.is_essential = is_essential;
        self
    }

    pub fn with_dedupe_hash(mut self, hash: String) -> Self {
        self.dedupe_hash = Some(hash);
        self
    }

    /// Hash identifying a chat message, so a redelivered webhook is not logged twice
    pub fn compute_dedupe_hash(user_id: &str, occurred_at: DateTime<Utc>, text: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(user_id.as_bytes());
        hasher.update(b"|");
        hasher.update(occurred_at.timestamp_millis().to_string().as_bytes());
        hasher.update(b"|");
        hasher.update(text.trim().as_bytes());
        hex::encode(hasher.finalize())
    }
}

/// Goal lifecycle. `Achieved` and `Abandoned` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum GoalStatus {
    #[default]
    Active,
    Achieved,
    Abandoned,
}

impl GoalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Achieved => "achieved",
            Self::Abandoned => "abandoned",
        }
    }
}

impl std::str::FromStr for GoalStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "active" => Ok(Self::Active),
            "achieved" => Ok(Self::Achieved),
            "abandoned" => Ok(Self::Abandoned),
            _ => Err(format!("Unknown goal status: {}", s)),
        }
    }
}

impl std::fmt::Display for GoalStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A savings goal
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Goal {
    pub id: i64,
    pub user_id: String,
    pub name: String,
    /// Minor units
    pub target_amount: i64,
    /// Last day (user-local) by which the target should be reached
    pub deadline: NaiveDate,
    pub created_at: DateTime<Utc>,
    pub status: GoalStatus,
    /// Explicitly marked as the reference goal for interventions
    pub is_primary: bool,
    pub achieved_at: Option<DateTime<Utc>>,
}

/// Derived view of a goal against the ledger, recomputed on every read
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GoalProgress {
    pub goal_id: i64,
    pub name: String,
    pub status: GoalStatus,
    pub target_amount: i64,
    pub saved_amount: i64,
    pub remaining_amount: i64,
    /// Contribution needed per month from today, rounded up to the minor unit
    pub required_monthly: i64,
    pub months_remaining: u32,
    pub on_track: bool,
    /// saved / target as a percentage, capped at 100
    pub percent: f64,
    pub deadline: NaiveDate,
}

/// What a budget limits: one category, or everything (`*`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum BudgetScope {
    Overall,
    Category(Category),
}

impl BudgetScope {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Overall => "*",
            Self::Category(c) => c.as_str(),
        }
    }

    pub fn label(&self) -> String {
        match self {
            Self::Overall => "Overall".to_string(),
            Self::Category(c) => c.label(),
        }
    }
}

impl std::str::FromStr for BudgetScope {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "*" | "overall" | "total" | "all" => Ok(Self::Overall),
            other => other.parse().map(Self::Category),
        }
    }
}

impl TryFrom<String> for BudgetScope {
    type Error = String;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<BudgetScope> for String {
    fn from(scope: BudgetScope) -> Self {
        scope.as_str().to_string()
    }
}

impl std::fmt::Display for BudgetScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Budget period, aligned to the user's calendar
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BudgetPeriod {
    Weekly,
    Monthly,
}

impl BudgetPeriod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Weekly => "weekly",
            Self::Monthly => "monthly",
        }
    }
}

impl std::str::FromStr for BudgetPeriod {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "weekly" | "week" => Ok(Self::Weekly),
            "monthly" | "month" => Ok(Self::Monthly),
            _ => Err(format!("Unknown budget period: {}", s)),
        }
    }
}

impl std::fmt::Display for BudgetPeriod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A spending limit. Unique per (user, scope, period).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Budget {
    pub id: i64,
    pub user_id: String,
    pub scope: BudgetScope,
    pub period: BudgetPeriod,
    /// Minor units, never negative
    pub limit_amount: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Budget severity, ordered from best to worst
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum BudgetLevel {
    Ok,
    Warning,
    Over,
}

impl BudgetLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ok => "OK",
            Self::Warning => "WARNING",
            Self::Over => "OVER",
        }
    }
}

impl std::fmt::Display for BudgetLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Intervention verdict, ordered by severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Verdict {
    Silent,
    SoftNotice,
    HardAlert,
}

impl Verdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Silent => "silent",
            Self::SoftNotice => "soft-notice",
            Self::HardAlert => "hard-alert",
        }
    }
}

impl std::str::FromStr for Verdict {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "silent" => Ok(Self::Silent),
            "soft-notice" | "soft_notice" => Ok(Self::SoftNotice),
            "hard-alert" | "hard_alert" => Ok(Self::HardAlert),
            _ => Err(format!("Unknown verdict: {}", s)),
        }
    }
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// What happened to an intervention after the verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InterventionOutcome {
    /// Handed to the caller for delivery
    Sent,
    /// Not delivered: silent verdict, duplicate, or degraded context
    Suppressed,
    UserDismissed,
    /// No matching purchase appeared within the abandonment window
    UserAbandonedCart,
}

impl InterventionOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sent => "sent",
            Self::Suppressed => "suppressed",
            Self::UserDismissed => "user-dismissed",
            Self::UserAbandonedCart => "user-abandoned-cart",
        }
    }
}

impl std::str::FromStr for InterventionOutcome {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "sent" => Ok(Self::Sent),
            "suppressed" => Ok(Self::Suppressed),
            "user-dismissed" => Ok(Self::UserDismissed),
            "user-abandoned-cart" => Ok(Self::UserAbandonedCart),
            _ => Err(format!("Unknown intervention outcome: {}", s)),
        }
    }
}

impl std::fmt::Display for InterventionOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A recorded intervention decision
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterventionEvent {
    pub id: i64,
    pub user_id: String,
    pub created_at: DateTime<Utc>,
    pub merchant: String,
    pub url: Option<String>,
    /// Minor units
    pub amount: i64,
    pub category: Category,
    pub verdict: Verdict,
    pub impact_ratio: f64,
    pub message: Option<String>,
    pub outcome: InterventionOutcome,
    pub dedupe_key: String,
    pub resolved_at: Option<DateTime<Utc>>,
}

/// Intervention decision about to be persisted
#[derive(Debug, Clone)]
pub struct NewInterventionEvent {
    pub user_id: String,
    pub created_at: DateTime<Utc>,
    pub merchant: String,
    pub url: Option<String>,
    pub amount: i64,
    pub category: Category,
    pub verdict: Verdict,
    pub impact_ratio: f64,
    pub message: Option<String>,
    /// Outcome to record when the event is not a duplicate
    pub outcome: InterventionOutcome,
    pub dedupe_key: String,
}

/// Counts of intervention outcomes, for the dashboard
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InterventionSummary {
    pub total: i64,
    pub sent: i64,
    pub suppressed: i64,
    pub dismissed: i64,
    pub abandoned: i64,
    /// Sum of amounts on carts the user walked away from (minor units)
    pub abandoned_amount: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_parse() {
        assert_eq!("Dining".parse::<Category>().unwrap(), Category::Dining);
        assert_eq!("food".parse::<Category>().unwrap(), Category::Dining);
        assert_eq!(
            "Pet Care".parse::<Category>().unwrap(),
            Category::Custom("pet care".to_string())
        );
        assert!("".parse::<Category>().is_err());
        assert!("*".parse::<Category>().is_err());
    }

    #[test]
    fn test_category_serde_as_string() {
        let json = serde_json::to_string(&Category::Dining).unwrap();
        assert_eq!(json, "\"dining\"");
        let back: Category = serde_json::from_str("\"pet_care\"").unwrap();
        assert_eq!(back, Category::Custom("pet_care".to_string()));
        assert_eq!(back.label(), "Pet care");
    }

    #[test]
    fn test_budget_scope_parse() {
        assert_eq!("*".parse::<BudgetScope>().unwrap(), BudgetScope::Overall);
        assert_eq!(
            "groceries".parse::<BudgetScope>().unwrap(),
            BudgetScope::Category(Category::Groceries)
        );
        assert_eq!(BudgetScope::Overall.to_string(), "*");
    }

    #[test]
    fn test_severity_ordering() {
        assert!(BudgetLevel::Over > BudgetLevel::Warning);
        assert!(BudgetLevel::Warning > BudgetLevel::Ok);
        assert!(Verdict::HardAlert > Verdict::SoftNotice);
        assert_eq!(
            serde_json::to_string(&Verdict::SoftNotice).unwrap(),
            "\"soft-notice\""
        );
        assert_eq!(
            serde_json::to_string(&InterventionOutcome::UserAbandonedCart).unwrap(),
            "\"user-abandoned-cart\""
        );
    }

    #[test]
    fn test_dedupe_hash_is_stable() {
        let at = Utc::now();
        let a = NewTransaction::compute_dedupe_hash("u1", at, "spent 450 on coffee");
        let b = NewTransaction::compute_dedupe_hash("u1", at, "spent 450 on coffee ");
        let c = NewTransaction::compute_dedupe_hash("u2", at, "spent 450 on coffee");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 64);
    }
}
