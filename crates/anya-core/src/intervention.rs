//! Intervention decision engine
//!
//! Turns a "cart detected" signal into a verdict (silent, soft notice or hard
//! alert) scored against the user's primary goal and budgets. Every decision
//! is persisted as an intervention event; delivery is left to the caller.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::db::Database;
use crate::error::{Error, Result};
use crate::models::{
    BudgetLevel, BudgetPeriod, BudgetScope, Category, Goal, GoalProgress, InterventionEvent,
    InterventionOutcome, NewInterventionEvent, User, Verdict,
};
use crate::monitor::{BudgetEvaluation, BudgetMonitor, BudgetStatus};
use crate::money;
use crate::planner::GoalPlanner;

/// What the browser collaborator saw on the page
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProductDetails {
    /// Cart total in whole units of the user's currency
    #[serde(default)]
    pub price: f64,
    #[serde(default)]
    pub items: Vec<String>,
    #[serde(default)]
    pub is_cart: bool,
    #[serde(default)]
    pub is_checkout: bool,
}

/// Purchase-intent signal from the cart collaborator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CartSignal {
    pub user_id: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub merchant: Option<String>,
    #[serde(default)]
    pub product_details: ProductDetails,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalStatus {
    /// A nudge was produced and should be delivered
    Accepted,
    /// The signal was malformed; nothing was recorded
    Rejected,
    /// Recorded, but nothing to deliver (silent, duplicate or degraded)
    Suppressed,
}

/// Reply to the cart collaborator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalResponse {
    pub status: SignalStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verdict: Option<Verdict>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_id: Option<i64>,
    /// Why a signal was rejected
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl SignalResponse {
    pub fn rejected(reason: impl Into<String>) -> Self {
        Self {
            status: SignalStatus::Rejected,
            verdict: None,
            message: None,
            event_id: None,
            reason: Some(reason.into()),
        }
    }

    fn from_event(event: &InterventionEvent) -> Self {
        let delivered = event.outcome == InterventionOutcome::Sent;
        Self {
            status: if delivered {
                SignalStatus::Accepted
            } else {
                SignalStatus::Suppressed
            },
            verdict: Some(event.verdict),
            message: if delivered { event.message.clone() } else { None },
            event_id: Some(event.id),
            reason: None,
        }
    }
}

/// What the impact ratio was measured against
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImpactBasis {
    /// Monthly savings the primary goal requires
    GoalRate,
    /// The overall monthly budget limit
    MonthlyBudget,
    /// Nothing to compare against
    None,
}

/// Goal and budget state a verdict is scored against
#[derive(Debug, Clone)]
pub struct SignalContext {
    pub primary: Option<(Goal, GoalProgress)>,
    /// Monthly status of the merchant's likely category and the overall budget
    pub budgets: BudgetEvaluation,
}

/// Scored verdict before persistence
#[derive(Debug, Clone, PartialEq)]
pub struct Assessment {
    pub verdict: Verdict,
    pub impact_ratio: f64,
    pub basis: ImpactBasis,
}

/// Result of reconciling old `sent` events
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReconcileSummary {
    pub checked: usize,
    /// Events still `sent` because a matching purchase was logged
    pub purchased: usize,
    pub abandoned: usize,
}

/// Signal after validation, with amounts in minor units
#[derive(Debug, Clone)]
struct ValidSignal {
    merchant: String,
    url: Option<String>,
    amount: i64,
}

/// Merchant name from a URL host: `https://www.amazon.in/cart` gives "Amazon"
pub fn merchant_from_url(url: &str) -> Option<String> {
    let rest = url.trim();
    let rest = rest.split_once("://").map(|(_, r)| r).unwrap_or(rest);
    let host = rest
        .split(|c: char| c == '/' || c == '?' || c == '#')
        .next()
        .unwrap_or("");
    let host = host.rsplit_once('@').map(|(_, h)| h).unwrap_or(host);
    let host = host.split(':').next().unwrap_or("").to_lowercase();
    let host = host.strip_prefix("www.").unwrap_or(&host);
    let host = host.strip_prefix("m.").unwrap_or(host);

    let label = host.split('.').next().filter(|l| !l.is_empty())?;
    let mut chars = label.chars();
    let first = chars.next()?;
    Some(first.to_uppercase().collect::<String>() + chars.as_str())
}

/// `sha256(user | lowercase merchant | amount rounded to whole units)`
pub fn dedupe_key(user_id: &str, merchant: &str, amount: i64, currency: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(user_id.as_bytes());
    hasher.update(b"|");
    hasher.update(merchant.trim().to_lowercase().as_bytes());
    hasher.update(b"|");
    hasher.update(money::round_to_units(amount, currency).to_string().as_bytes());
    hex::encode(hasher.finalize())
}

/// Score a purchase against goal and budget context
pub fn assess(amount: i64, context: &SignalContext, config: &EngineConfig) -> Assessment {
    let thresholds = &config.intervention;
    if amount <= 0 {
        return Assessment {
            verdict: Verdict::Silent,
            impact_ratio: 0.0,
            basis: ImpactBasis::None,
        };
    }

    let goal_rate = context
        .primary
        .as_ref()
        .map(|(_, p)| p.required_monthly)
        .filter(|r| *r > 0);
    let monthly_limit = context.budgets.overall.limit.filter(|l| *l > 0);

    let (impact_ratio, basis) = match (goal_rate, monthly_limit) {
        (Some(rate), _) => (amount as f64 / rate as f64, ImpactBasis::GoalRate),
        (None, Some(limit)) => (amount as f64 / limit as f64, ImpactBasis::MonthlyBudget),
        (None, None) => (0.0, ImpactBasis::None),
    };

    let budget_over = context.budgets.worst().level == BudgetLevel::Over;
    let verdict = if impact_ratio >= thresholds.hard_threshold || budget_over {
        Verdict::HardAlert
    } else if impact_ratio >= thresholds.soft_threshold {
        Verdict::SoftNotice
    } else {
        Verdict::Silent
    };

    Assessment {
        verdict,
        impact_ratio,
        basis,
    }
}

/// Budget line for a hard alert: the current overage, or the one this purchase would cause
fn overage_line(status: &BudgetStatus, amount: i64, currency: &str) -> Option<String> {
    let limit = status.limit?;
    let name = match &status.scope {
        BudgetScope::Overall => format!("{} budget", status.period),
        BudgetScope::Category(c) => format!("{} {} budget", c.label(), status.period),
    };
    if let Some(over) = status.overage() {
        return Some(format!(
            "You're already {} over your {}.",
            money::format_amount(over, currency),
            name
        ));
    }
    let projected = status.spent + amount - limit;
    (projected > 0).then(|| {
        format!(
            "This would put you {} over your {}.",
            money::format_amount(projected, currency),
            name
        )
    })
}

fn items_line(items: &[String]) -> Option<String> {
    let names: Vec<&str> = items
        .iter()
        .map(|i| i.trim())
        .filter(|i| !i.is_empty())
        .collect();
    if names.is_empty() {
        return None;
    }
    let mut line = names.iter().take(3).copied().collect::<Vec<_>>().join(", ");
    if names.len() > 3 {
        line.push_str(&format!(" and {} more", names.len() - 3));
    }
    Some(format!("In the cart: {}.", line))
}

/// Nudge text for a soft notice or hard alert
fn compose_message(
    signal: &ValidSignal,
    details: &ProductDetails,
    assessment: &Assessment,
    context: &SignalContext,
    currency: &str,
) -> String {
    let hard = assessment.verdict == Verdict::HardAlert;
    let opening = match (details.is_checkout, hard) {
        (true, true) => "🛑 Stop before you pay!",
        (true, false) => "✋ Before you hit pay,",
        (false, true) => "🚨 Hold on!",
        (false, false) => "👀 Quick pause.",
    };
    let amount = money::format_amount(signal.amount, currency);

    let mut parts = vec![opening.to_string()];
    match (assessment.basis, &context.primary) {
        (ImpactBasis::GoalRate, Some((goal, _))) => parts.push(format!(
            "{} at {} is {:.1} months of your savings rate for '{}'.",
            amount, signal.merchant, assessment.impact_ratio, goal.name
        )),
        (ImpactBasis::MonthlyBudget, _) => parts.push(format!(
            "{} at {} is {:.0}% of your monthly budget.",
            amount,
            signal.merchant,
            assessment.impact_ratio * 100.0
        )),
        _ => parts.push(format!("That's {} at {}.", amount, signal.merchant)),
    }
    if let Some(items) = items_line(&details.items) {
        parts.push(items);
    }
    if hard {
        let worst = context.budgets.worst();
        let line = overage_line(worst, signal.amount, currency)
            .or_else(|| overage_line(&context.budgets.overall, signal.amount, currency));
        if let Some(line) = line {
            parts.push(line);
        }
        parts.push(if details.is_checkout {
            "Close the tab and sleep on it.".to_string()
        } else {
            "Is this worth pushing your goal back?".to_string()
        });
    } else {
        parts.push("Still want it tomorrow? Then it's yours.".to_string());
    }
    parts.join(" ")
}

pub struct InterventionEngine<'a> {
    db: &'a Database,
    config: &'a EngineConfig,
}

impl<'a> InterventionEngine<'a> {
    pub fn new(db: &'a Database, config: &'a EngineConfig) -> Self {
        Self { db, config }
    }

    fn validate(&self, signal: &CartSignal, currency: &str) -> Result<ValidSignal> {
        let price = signal.product_details.price;
        if !price.is_finite() || price < 0.0 {
            return Err(Error::InvalidInput(format!("invalid price: {}", price)));
        }
        let amount = (price * money::minor_per_unit(currency) as f64).round();
        if amount >= i64::MAX as f64 {
            return Err(Error::InvalidInput(format!("price out of range: {}", price)));
        }

        let url = signal
            .url
            .as_deref()
            .map(str::trim)
            .filter(|u| !u.is_empty())
            .map(str::to_string);
        let merchant = signal
            .merchant
            .as_deref()
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .map(str::to_string)
            .or_else(|| url.as_deref().and_then(merchant_from_url))
            .ok_or_else(|| Error::InvalidInput("signal needs a merchant or url".into()))?;

        Ok(ValidSignal {
            merchant,
            url,
            amount: amount as i64,
        })
    }

    /// Primary goal and monthly budget status for `category`
    pub fn assemble_context(
        &self,
        user: &User,
        category: &Category,
        now: DateTime<Utc>,
    ) -> Result<SignalContext> {
        let primary = GoalPlanner::new(self.db).primary_progress(user, now)?;
        let budgets = BudgetMonitor::new(self.db, self.config).evaluate_detailed(
            user,
            category,
            BudgetPeriod::Monthly,
            now,
        )?;
        Ok(SignalContext { primary, budgets })
    }

    /// Decide, persist and describe the response to one cart signal.
    ///
    /// Malformed signals are rejected without recording anything. Failures
    /// while reading goal or budget state are logged and produce a silent,
    /// suppressed event.
    pub fn handle_signal(&self, signal: &CartSignal, now: DateTime<Utc>) -> Result<SignalResponse> {
        if signal.user_id.trim().is_empty() {
            return Ok(SignalResponse::rejected("user_id is required"));
        }
        let user_id = signal.user_id.trim();
        let existing = match self.db.get_user(user_id) {
            Ok(user) => Some(user),
            Err(Error::NotFound(_)) => None,
            Err(e) => return Err(e),
        };
        if existing.as_ref().is_some_and(|u| !u.active) {
            return Ok(SignalResponse::rejected("user is inactive"));
        }

        // Nothing is written for a rejected signal, not even the user row
        let currency = existing
            .as_ref()
            .map(|u| u.currency.as_str())
            .unwrap_or(&self.config.default_currency);
        let valid = match self.validate(signal, currency) {
            Ok(v) => v,
            Err(e) => {
                debug!(user_id, error = %e, "Rejected cart signal");
                return Ok(SignalResponse::rejected(e.to_string()));
            }
        };

        let user = match existing {
            Some(user) => user,
            None => self.db.ensure_user(
                user_id,
                &self.config.default_currency,
                self.config.default_timezone.name(),
            )?,
        };

        let category = self
            .config
            .keywords
            .match_text(&valid.merchant)
            .or_else(|| valid.url.as_deref().and_then(|u| self.config.keywords.match_text(u)))
            .map(|m| m.category)
            .unwrap_or_else(|| self.config.intervention.default_category.clone());

        let (assessment, message) = match self.assemble_context(&user, &category, now) {
            Ok(context) => {
                let assessment = assess(valid.amount, &context, self.config);
                let message = (assessment.verdict != Verdict::Silent).then(|| {
                    compose_message(
                        &valid,
                        &signal.product_details,
                        &assessment,
                        &context,
                        &user.currency,
                    )
                });
                (assessment, message)
            }
            Err(e) => {
                warn!(user_id = %user.id, error = %e, "Signal context unavailable, staying silent");
                (
                    Assessment {
                        verdict: Verdict::Silent,
                        impact_ratio: 0.0,
                        basis: ImpactBasis::None,
                    },
                    None,
                )
            }
        };

        let outcome = if assessment.verdict == Verdict::Silent {
            InterventionOutcome::Suppressed
        } else {
            InterventionOutcome::Sent
        };

        let recorded = self.db.record_intervention(
            &NewInterventionEvent {
                user_id: user.id.clone(),
                created_at: now,
                merchant: valid.merchant.clone(),
                url: valid.url.clone(),
                amount: valid.amount,
                category,
                verdict: assessment.verdict,
                impact_ratio: assessment.impact_ratio,
                message,
                outcome,
                dedupe_key: dedupe_key(&user.id, &valid.merchant, valid.amount, &user.currency),
            },
            self.config.intervention.dedupe_window,
        )?;

        Ok(SignalResponse::from_event(&recorded.event))
    }

    /// The user dismissed a nudge
    pub fn dismiss(&self, event_id: i64, now: DateTime<Utc>) -> Result<InterventionEvent> {
        self.db.dismiss_intervention(event_id, now)
    }

    /// Settle `sent` events older than the abandonment window.
    ///
    /// A purchase logged at the same merchant after the nudge keeps the event
    /// `sent`; otherwise the cart counts as abandoned.
    pub fn reconcile_outcomes(&self, user_id: &str, now: DateTime<Utc>) -> Result<ReconcileSummary> {
        let cutoff = now - self.config.intervention.abandon_window;
        let mut summary = ReconcileSummary::default();

        for event in self.db.sent_interventions_before(user_id, cutoff)? {
            summary.checked += 1;
            if self
                .db
                .has_purchase_at_merchant_since(user_id, &event.merchant, event.created_at)?
            {
                summary.purchased += 1;
                continue;
            }
            if self
                .db
                .resolve_intervention(event.id, InterventionOutcome::UserAbandonedCart, now)?
            {
                summary.abandoned += 1;
            }
        }

        if summary.checked > 0 {
            info!(
                user_id,
                checked = summary.checked,
                abandoned = summary.abandoned,
                purchased = summary.purchased,
                "Reconciled interventions"
            );
        }
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, NaiveDate, TimeZone};

    use super::*;
    use crate::models::NewTransaction;

    fn signal(user: &str, merchant: &str, price: f64) -> CartSignal {
        CartSignal {
            user_id: user.to_string(),
            url: Some(format!("https://www.{}.in/cart", merchant.to_lowercase())),
            merchant: Some(merchant.to_string()),
            product_details: ProductDetails {
                price,
                items: vec!["Headphones".into()],
                is_cart: true,
                is_checkout: false,
            },
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 10, 6, 0, 0).unwrap()
    }

    /// User with a goal requiring ₹15,000 a month
    fn setup() -> (Database, EngineConfig) {
        let db = Database::in_memory().unwrap();
        let user = db.ensure_user("u1", "INR", "Asia/Kolkata").unwrap();
        db.create_goal(
            &user.id,
            "Goa trip",
            9_000_000,
            NaiveDate::from_ymd_opt(2024, 9, 10).unwrap(),
            now(),
        )
        .unwrap();
        (db, EngineConfig::default())
    }

    #[test]
    fn test_merchant_from_url() {
        assert_eq!(merchant_from_url("https://www.amazon.in/gp/cart").as_deref(), Some("Amazon"));
        assert_eq!(merchant_from_url("flipkart.com").as_deref(), Some("Flipkart"));
        assert_eq!(merchant_from_url("http://m.myntra.com:8080/x").as_deref(), Some("Myntra"));
        assert_eq!(merchant_from_url(""), None);
    }

    #[test]
    fn test_dedupe_key_rounds_amount() {
        let a = dedupe_key("u1", "Amazon", 3_000_040, "INR");
        let b = dedupe_key("u1", "amazon ", 3_000_000, "INR");
        let c = dedupe_key("u1", "Amazon", 3_000_100, "INR");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_hard_alert_against_goal_rate() {
        let (db, config) = setup();
        let engine = InterventionEngine::new(&db, &config);

        let response = engine.handle_signal(&signal("u1", "Amazon", 30_000.0), now()).unwrap();
        assert_eq!(response.status, SignalStatus::Accepted);
        assert_eq!(response.verdict, Some(Verdict::HardAlert));
        let message = response.message.unwrap();
        assert!(message.contains("2.0 months"), "{}", message);
        assert!(message.contains("Goa trip"));

        let event = db.get_intervention(response.event_id.unwrap()).unwrap();
        assert!((event.impact_ratio - 2.0).abs() < 1e-9);
        assert_eq!(event.category, Category::Shopping);
    }

    #[test]
    fn test_soft_and_silent_bands() {
        let (db, config) = setup();
        let engine = InterventionEngine::new(&db, &config);

        let soft = engine.handle_signal(&signal("u1", "Myntra", 3_000.0), now()).unwrap();
        assert_eq!(soft.verdict, Some(Verdict::SoftNotice));
        assert_eq!(soft.status, SignalStatus::Accepted);

        let silent = engine.handle_signal(&signal("u1", "Nykaa", 500.0), now()).unwrap();
        assert_eq!(silent.verdict, Some(Verdict::Silent));
        assert_eq!(silent.status, SignalStatus::Suppressed);
        assert!(silent.message.is_none());
    }

    #[test]
    fn test_zero_price_is_silent() {
        let (db, config) = setup();
        let engine = InterventionEngine::new(&db, &config);
        let response = engine.handle_signal(&signal("u1", "Amazon", 0.0), now()).unwrap();
        assert_eq!(response.verdict, Some(Verdict::Silent));
        assert_eq!(response.status, SignalStatus::Suppressed);
    }

    #[test]
    fn test_replay_is_suppressed() {
        let (db, config) = setup();
        let engine = InterventionEngine::new(&db, &config);

        let first = engine.handle_signal(&signal("u1", "Amazon", 30_000.0), now()).unwrap();
        let replay = engine
            .handle_signal(&signal("u1", "Amazon", 30_000.0), now() + Duration::minutes(5))
            .unwrap();
        assert_eq!(first.status, SignalStatus::Accepted);
        assert_eq!(replay.status, SignalStatus::Suppressed);
        assert_eq!(replay.verdict, Some(Verdict::HardAlert));

        let later = engine
            .handle_signal(&signal("u1", "Amazon", 30_000.0), now() + Duration::minutes(31))
            .unwrap();
        assert_eq!(later.status, SignalStatus::Accepted);
    }

    #[test]
    fn test_malformed_signals_rejected() {
        let (db, config) = setup();
        let engine = InterventionEngine::new(&db, &config);

        let mut bad_price = signal("u1", "Amazon", -5.0);
        assert_eq!(engine.handle_signal(&bad_price, now()).unwrap().status, SignalStatus::Rejected);
        bad_price.product_details.price = f64::NAN;
        assert_eq!(engine.handle_signal(&bad_price, now()).unwrap().status, SignalStatus::Rejected);

        let mut no_source = signal("u1", "Amazon", 100.0);
        no_source.merchant = None;
        no_source.url = None;
        assert_eq!(engine.handle_signal(&no_source, now()).unwrap().status, SignalStatus::Rejected);

        assert_eq!(
            engine.handle_signal(&signal(" ", "Amazon", 100.0), now()).unwrap().status,
            SignalStatus::Rejected
        );
        assert!(db.list_interventions("u1", 10).unwrap().is_empty());
    }

    #[test]
    fn test_rejected_signal_does_not_create_user() {
        let db = Database::in_memory().unwrap();
        let config = EngineConfig::default();
        let engine = InterventionEngine::new(&db, &config);

        let response = engine.handle_signal(&signal("newbie", "Amazon", -1.0), now()).unwrap();
        assert_eq!(response.status, SignalStatus::Rejected);
        assert!(matches!(db.get_user("newbie"), Err(Error::NotFound(_))));

        // A valid signal from the same id creates the user with defaults
        let response = engine.handle_signal(&signal("newbie", "Amazon", 100.0), now()).unwrap();
        assert_ne!(response.status, SignalStatus::Rejected);
        assert_eq!(db.get_user("newbie").unwrap().currency, config.default_currency);
    }

    #[test]
    fn test_budget_basis_without_goal() {
        let db = Database::in_memory().unwrap();
        let config = EngineConfig::default();
        let user = db.ensure_user("u2", "INR", "Asia/Kolkata").unwrap();
        db.set_budget(&user.id, &BudgetScope::Overall, BudgetPeriod::Monthly, 2_000_000)
            .unwrap();
        let engine = InterventionEngine::new(&db, &config);

        let response = engine.handle_signal(&signal("u2", "Amazon", 4_000.0), now()).unwrap();
        assert_eq!(response.verdict, Some(Verdict::SoftNotice));
        assert!(response.message.unwrap().contains("20% of your monthly budget"));
    }

    #[test]
    fn test_over_budget_forces_hard_alert() {
        let db = Database::in_memory().unwrap();
        let config = EngineConfig::default();
        let user = db.ensure_user("u3", "INR", "Asia/Kolkata").unwrap();
        db.set_budget(
            &user.id,
            &BudgetScope::Category(Category::Shopping),
            BudgetPeriod::Monthly,
            100_000,
        )
        .unwrap();
        db.insert_transaction(&NewTransaction::spend(&user.id, 150_000, Category::Shopping, now()))
            .unwrap();
        let engine = InterventionEngine::new(&db, &config);

        let response = engine.handle_signal(&signal("u3", "Amazon", 10.0), now()).unwrap();
        assert_eq!(response.verdict, Some(Verdict::HardAlert));
        assert!(response.message.unwrap().contains("already ₹500 over"));
    }

    #[test]
    fn test_checkout_is_firmer() {
        let (db, config) = setup();
        let engine = InterventionEngine::new(&db, &config);
        let mut s = signal("u1", "Amazon", 30_000.0);
        s.product_details.is_checkout = true;
        let message = engine.handle_signal(&s, now()).unwrap().message.unwrap();
        assert!(message.starts_with("🛑"));
    }

    #[test]
    fn test_dismiss_and_reconcile() {
        let (db, config) = setup();
        let engine = InterventionEngine::new(&db, &config);

        let dismissed = engine.handle_signal(&signal("u1", "Amazon", 30_000.0), now()).unwrap();
        let bought = engine.handle_signal(&signal("u1", "Croma", 30_000.0), now()).unwrap();
        let walked = engine.handle_signal(&signal("u1", "Flipkart", 30_000.0), now()).unwrap();

        let event = engine.dismiss(dismissed.event_id.unwrap(), now()).unwrap();
        assert_eq!(event.outcome, InterventionOutcome::UserDismissed);

        db.insert_transaction(
            &NewTransaction::spend("u1", 3_000_000, Category::Shopping, now() + Duration::hours(1))
                .with_merchant(Some("Croma".into())),
        )
        .unwrap();

        // Nothing is old enough yet
        let early = engine.reconcile_outcomes("u1", now() + Duration::hours(2)).unwrap();
        assert_eq!(early.checked, 0);

        let summary = engine.reconcile_outcomes("u1", now() + Duration::hours(25)).unwrap();
        assert_eq!(summary.checked, 2);
        assert_eq!(summary.purchased, 1);
        assert_eq!(summary.abandoned, 1);

        let walked = db.get_intervention(walked.event_id.unwrap()).unwrap();
        assert_eq!(walked.outcome, InterventionOutcome::UserAbandonedCart);
        let bought = db.get_intervention(bought.event_id.unwrap()).unwrap();
        assert_eq!(bought.outcome, InterventionOutcome::Sent);
    }
}
