//! Session orchestrator: routes chat messages and cart signals
//!
//! Every call carries the user id explicitly; nothing is kept between
//! messages. Chat text is routed by command prefix, then by keyword intent,
//! and the reply merges whatever the interpreter, planner and budget monitor
//! produced.

use chrono::{DateTime, Duration, Months, NaiveDate, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::ai::{classify_with_timeout, AIClient};
use crate::config::EngineConfig;
use crate::dashboard::DashboardSnapshot;
use crate::db::Database;
use crate::error::{Error, ErrorKind, Result};
use crate::intervention::{CartSignal, InterventionEngine, ReconcileSummary, SignalResponse};
use crate::interpreter::{ExpenseInterpreter, Interpretation};
use crate::models::{
    BudgetLevel, BudgetPeriod, BudgetScope, Category, GoalProgress, GoalStatus, InterventionEvent,
    NewTransaction, User,
};
use crate::money;
use crate::monitor::{BudgetMonitor, BudgetStatus};
use crate::period::local_date;
use crate::planner::GoalPlanner;

/// A chat message from the transport adapter
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundMessage {
    pub user_id: String,
    pub text: String,
    /// When the user sent it; retries of one message carry the same timestamp
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

/// Something the transport should render or fetch alongside the reply
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Attachment {
    /// Link to the user's dashboard
    Dashboard { user_id: String },
    /// Goal visualization to generate
    ImageRequest { prompt: String },
    /// Cheaper venue lookup for a social plan
    PlacesLookup { context: String, place: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub user_id: String,
    pub reply_text: String,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
}

/// Reply before it is addressed to a user
struct Reply {
    text: String,
    attachments: Vec<Attachment>,
}

impl Reply {
    fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            attachments: Vec::new(),
        }
    }

    fn with(mut self, attachment: Attachment) -> Self {
        self.attachments.push(attachment);
        self
    }
}

/// Keyword intent of a free-text message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    AbandonGoal,
    Budget,
    Contribution,
    Withdrawal,
    Expense,
    CreateGoal,
    Status,
    Unknown,
}

/// Patterns for intent detection and goal phrase parsing
struct Patterns {
    abandon: Regex,
    budget: Regex,
    budget_command: Regex,
    contribution: Regex,
    withdrawal: Regex,
    expense: Regex,
    goal: Regex,
    status: Regex,
    weekly: Regex,
    goal_title: Vec<Regex>,
    relative_deadline: Regex,
    absolute_deadline: Regex,
}

impl Patterns {
    fn new() -> Result<Self> {
        Ok(Self {
            abandon: Regex::new(
                r"(?i)\b(?:delete|remove|clear|abandon|cancel|drop)\s+(?:my\s+|the\s+)?goals?\b|\bgive\s+up\s+on\b",
            )?,
            // A limit being set, not a budget merely mentioned ("blew my budget")
            budget: Regex::new(
                r"(?i)\b(?:set|change|update|make|raise|lower|increase|reduce)\b[^.!?]*\bbudget\b|\bbudget\b\s*(?:is|to|of|at|=|:)?\s*(?:[₹$€£]|rs\.?|inr)?\s*\d",
            )?,
            budget_command: Regex::new(
                r"(?i)^\s*(?:please\s+)?(?:(?:set|change|update|make|raise|lower|increase|reduce)\b|(?:\w+\s+){0,2}budget\b)",
            )?,
            contribution: Regex::new(
                r"(?i)\b(?:saved|put\s+aside|set\s+aside|deposited|added\s+to\s+(?:my\s+)?(?:goal|savings))\b",
            )?,
            withdrawal: Regex::new(r"(?i)\b(?:withdrew|took\s+out)\b")?,
            expense: Regex::new(
                r"(?i)\b(?:spent|spend|paid|pay|bought|purchased|ordered|cost|costs|charged)\b",
            )?,
            goal: Regex::new(
                r"(?i)\b(?:goals?|save|saving|want\s+to\s+(?:buy|get)|planning\s+to\s+(?:buy|get))\b",
            )?,
            status: Regex::new(
                r"(?i)\b(?:status|how\s+am\s+i|progress|on\s+track|doing|stats|how\s+much\s+(?:have\s+i|did\s+i)\s+spen[dt])\b",
            )?,
            weekly: Regex::new(r"(?i)\b(?:week|weekly|per\s+week)\b")?,
            goal_title: vec![
                Regex::new(
                    r"(?i)\b(?:save|saving|buy|purchase|get)\s+(?:up\s+)?(?:for\s+)?(?:(?:a|an|the|my)\s+)?(?P<title>\p{L}[\p{L}\d' -]*?)(?:\s+(?:for|in|by|within|worth|costing|of)\b|[.,!?]|$)",
                )?,
                Regex::new(
                    r"(?i)\bfor\s+(?:(?:a|an|the|my)\s+)?(?P<title>\p{L}[\p{L}\d' -]*?)(?:\s+(?:in|by|within|worth|costing)\b|[.,!?]|$)",
                )?,
            ],
            relative_deadline: Regex::new(
                r"(?i)\b(?:in|within)\s+(?:the\s+next\s+)?(?P<n>\d{1,3})\s*(?P<unit>days?|weeks?|months?|years?|yrs?)\b",
            )?,
            absolute_deadline: Regex::new(r"(?i)\b(?:by|before|on)\s+(?P<date>\d{4}-\d{2}-\d{2})\b")?,
        })
    }

    fn intent(&self, text: &str) -> Intent {
        if self.abandon.is_match(text) {
            Intent::AbandonGoal
        } else if self.budget.is_match(text)
            && (self.budget_command.is_match(text) || !self.expense.is_match(text))
        {
            Intent::Budget
        } else if self.contribution.is_match(text) {
            Intent::Contribution
        } else if self.withdrawal.is_match(text) {
            Intent::Withdrawal
        } else if self.expense.is_match(text) {
            Intent::Expense
        } else if self.goal.is_match(text) {
            Intent::CreateGoal
        } else if self.status.is_match(text) {
            Intent::Status
        } else {
            Intent::Unknown
        }
    }

    /// Goal name from phrases like "save for a Goa trip" or "buy a laptop"
    fn goal_title(&self, text: &str) -> Option<String> {
        self.goal_title.iter().find_map(|re| {
            let raw = re.captures(text)?.name("title")?.as_str().trim();
            let words: Vec<&str> = raw
                .split_whitespace()
                .filter(|w| !matches!(w.to_lowercase().as_str(), "goal" | "a" | "an" | "the" | "my"))
                .collect();
            let title = words.join(" ");
            (title.chars().count() > 2).then(|| title_case(&title))
        })
    }

    /// Deadline from "in 6 months", "within 2 years" or "by 2025-03-01".
    ///
    /// Returns the date and the text with the phrase removed, so its number is
    /// not mistaken for the amount.
    fn deadline(&self, text: &str, today: NaiveDate) -> Option<(NaiveDate, String)> {
        if let Some(caps) = self.absolute_deadline.captures(text) {
            let date = NaiveDate::parse_from_str(caps.name("date")?.as_str(), "%Y-%m-%d").ok()?;
            let rest = self.absolute_deadline.replace(text, " ").into_owned();
            return Some((date, rest));
        }
        let caps = self.relative_deadline.captures(text)?;
        let n: u32 = caps.name("n")?.as_str().parse().ok()?;
        let unit = caps.name("unit")?.as_str().to_lowercase();
        let date = match unit.chars().next() {
            Some('d') => today.checked_add_signed(Duration::days(n as i64)),
            Some('w') => today.checked_add_signed(Duration::weeks(n as i64)),
            Some('m') => today.checked_add_months(Months::new(n)),
            _ => today.checked_add_months(Months::new(n.saturating_mul(12))),
        }?;
        let rest = self.relative_deadline.replace(text, " ").into_owned();
        Some((date, rest))
    }
}

fn title_case(text: &str) -> String {
    text.split_whitespace()
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn progress_bar(percent: f64) -> String {
    let filled = ((percent / 100.0) * 10.0).floor().clamp(0.0, 10.0) as usize;
    format!("{}{}", "█".repeat(filled), "░".repeat(10 - filled))
}

fn goal_block(progress: &GoalProgress, currency: &str) -> String {
    let mut block = format!(
        "{}\n{} {:.0}%\n{} / {}",
        progress.name,
        progress_bar(progress.percent),
        progress.percent,
        money::format_amount(progress.saved_amount, currency),
        money::format_amount(progress.target_amount, currency),
    );
    match progress.status {
        GoalStatus::Achieved => block.push_str("\n🎉 Target reached!"),
        GoalStatus::Abandoned => block.push_str("\n(abandoned)"),
        GoalStatus::Active => {
            block.push_str(&format!(
                "\nNeed {}/month until {}{}",
                money::format_amount(progress.required_monthly, currency),
                progress.deadline,
                if progress.on_track { "" } else { " (behind pace)" }
            ));
        }
    }
    block
}

fn budget_line(status: &BudgetStatus, currency: &str) -> String {
    let name = format!("{} {}", status.scope.label(), status.period);
    match status.limit {
        Some(limit) => {
            let emoji = match status.level {
                BudgetLevel::Ok => "🟢",
                BudgetLevel::Warning => "🟠",
                BudgetLevel::Over => "🔴",
            };
            let tail = match status.overage() {
                Some(over) => format!("over by {}", money::format_amount(over, currency)),
                None => format!(
                    "{} left",
                    money::format_amount(status.remaining().unwrap_or(0), currency)
                ),
            };
            format!(
                "{} {}: {} of {} ({})",
                emoji,
                name,
                money::format_amount(status.spent, currency),
                money::format_amount(limit, currency),
                tail
            )
        }
        None => format!(
            "⚪ {}: {} spent, no limit set",
            name,
            money::format_amount(status.spent, currency)
        ),
    }
}

const WELCOME_TEXT: &str = "Hey! 👋 I'm Anya, your financial co-pilot.\n\n\
I'm here to help you:\n\
💰 Set and track savings goals\n\
📊 Monitor your spending\n\
🎯 Make smarter decisions before you buy\n\n\
Just chat with me naturally, for example:\n\
• \"Save ₹1,50,000 for a Goa trip in 6 months\"\n\
• \"Spent ₹450 on coffee at Starbucks\"\n\
• \"Monthly budget is ₹20,000\"\n\n\
Let's start: what are you saving for? 🎯";

const HELP_TEXT: &str = "🤖 Anya commands\n\n\
/start - Get started\n\
/help - Show this help\n\
/mystats - Goal progress and this month's budget\n\
/goals - Your active goals\n\
/budget - Budget statuses\n\
/dashboard - Dashboard summary\n\
/dream <dream> - Picture what you're saving for\n\
/social <plan> <area> - A cheaper plan to pitch to friends\n\
/undo - Undo the last expense you logged\n\n\
💬 Or just chat:\n\
• \"I want to buy a MacBook for ₹1,20,000 in 10 months\"\n\
• \"Paid 300 for an auto\"\n\
• \"I saved 5000\"\n\
• \"Set dining budget to 4000 weekly\"\n\
• \"Am I on track?\"";

const NO_GOAL_TEXT: &str = "You haven't set a goal yet! 🎯\n\n\
Tell me what you're saving for, e.g. \"Save ₹50,000 for a laptop in 5 months\".";

/// Next step for a lookup miss, by what was missing
fn not_found_text(err: &Error) -> String {
    let what = match err {
        Error::NotFound(what) => what.as_str(),
        _ => "",
    };
    if what.contains("goal") {
        NO_GOAL_TEXT.to_string()
    } else if what.contains("budget") {
        "I couldn't find that budget. Send /budget to see the ones you have.".to_string()
    } else if what.starts_with("transaction") {
        "That entry is gone already, so there's nothing to undo. 👍".to_string()
    } else {
        format!("I couldn't find {}. Send /help to see what I can do.", what)
    }
}

pub struct SessionOrchestrator {
    db: Database,
    config: EngineConfig,
    interpreter: ExpenseInterpreter,
    ai: AIClient,
    patterns: Patterns,
}

impl SessionOrchestrator {
    pub fn new(db: Database, config: EngineConfig, ai: AIClient) -> Result<Self> {
        Ok(Self {
            interpreter: ExpenseInterpreter::new(&config)?,
            patterns: Patterns::new()?,
            db,
            config,
            ai,
        })
    }

    pub fn db(&self) -> &Database {
        &self.db
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn ai(&self) -> &AIClient {
        &self.ai
    }

    /// Keyword intent for a free-text message
    pub fn detect_intent(&self, text: &str) -> Intent {
        self.patterns.intent(text)
    }

    fn ensure_user(&self, user_id: &str) -> Result<User> {
        self.db.ensure_user(
            user_id.trim(),
            &self.config.default_currency,
            self.config.default_timezone.name(),
        )
    }

    /// Handle one chat message and compose the reply.
    ///
    /// Input, lookup and conflict errors become reply text. Only
    /// infrastructure failures come back as `Err`.
    pub async fn handle_message(&self, message: &InboundMessage) -> Result<OutboundMessage> {
        if message.user_id.trim().is_empty() {
            return Err(Error::InvalidInput("user_id is required".into()));
        }
        let user = self.ensure_user(&message.user_id)?;

        let reply = if !user.active {
            Reply::text("This account is deactivated. Ask the admin to turn it back on.")
        } else {
            match self.route(&user, message).await {
                Ok(reply) => reply,
                Err(e) => self.error_reply(e)?,
            }
        };

        Ok(OutboundMessage {
            user_id: user.id,
            reply_text: reply.text,
            attachments: reply.attachments,
        })
    }

    fn error_reply(&self, err: Error) -> Result<Reply> {
        match (err.kind(), err) {
            (ErrorKind::InvalidInput, Error::InvalidInput(msg)) => Ok(Reply::text(format!("⚠️ {}", msg))),
            (ErrorKind::NotFound, e) => {
                debug!(error = %e, "Turning lookup miss into guidance");
                Ok(Reply::text(not_found_text(&e)))
            }
            (ErrorKind::Conflict, e) => {
                Ok(Reply::text(format!("⚠️ {}. Please try again.", e)))
            }
            (ErrorKind::Degraded, e) => {
                warn!(error = %e, "Degraded while handling chat");
                Ok(Reply::text("I couldn't work that out just now. Please try again in a moment."))
            }
            (_, e) => Err(e),
        }
    }

    async fn route(&self, user: &User, message: &InboundMessage) -> Result<Reply> {
        let text = message.text.trim();
        if text.is_empty() {
            return Ok(Reply::text(HELP_TEXT));
        }

        if let Some(command) = text.strip_prefix('/') {
            let (name, args) = command.split_once(char::is_whitespace).unwrap_or((command, ""));
            // Telegram appends the bot name in groups: /help@anya_bot
            let name = name.split('@').next().unwrap_or(name).to_lowercase();
            debug!(user_id = %user.id, command = %name, "Routing command");
            return match name.as_str() {
                "start" => Ok(Reply::text(WELCOME_TEXT)),
                "help" => Ok(Reply::text(HELP_TEXT)),
                "mystats" | "stats" | "status" => self.status_reply(user, message.timestamp),
                "goals" => self.goals_reply(user, message.timestamp),
                "budget" | "budgets" => self.budgets_reply(user, message.timestamp),
                "dashboard" => self.dashboard_reply(user, message.timestamp),
                "dream" => self.dream_reply(user, args.trim(), message.timestamp),
                "social" => Ok(self.social_reply(args.trim())),
                "undo" => self.undo_reply(user, message.timestamp),
                _ => Ok(Reply::text(format!("I don't know /{}.\n\n{}", name, HELP_TEXT))),
            };
        }

        let intent = self.patterns.intent(text);
        debug!(user_id = %user.id, ?intent, "Routing chat text");
        match intent {
            Intent::AbandonGoal => self.abandon_reply(user),
            Intent::Budget => self.budget_intent(user, text, message.timestamp),
            Intent::Contribution => self.contribution_reply(user, message, 1),
            Intent::Withdrawal => self.contribution_reply(user, message, -1),
            Intent::Expense => self.expense_reply(user, message).await,
            Intent::CreateGoal => self.goal_reply(user, text, message.timestamp),
            Intent::Status => self.status_reply(user, message.timestamp),
            Intent::Unknown => Ok(Reply::text(format!(
                "I'm here to help with your goals and spending! 😊\n\n{}",
                HELP_TEXT
            ))),
        }
    }

    async fn expense_reply(&self, user: &User, message: &InboundMessage) -> Result<Reply> {
        let text = message.text.trim();
        let history = self
            .db
            .recent_categories(&user.id, self.config.interpreter.history_limit)?;

        let (amount, category, merchant) =
            match self.interpreter.interpret(text, &history, &user.currency) {
                Interpretation::NotAnExpense => {
                    return Ok(Reply::text(
                        "I couldn't find an amount in that. Try \"Spent ₹450 on coffee at Starbucks\".",
                    ))
                }
                Interpretation::Proposal(p) => (p.amount, p.category, p.merchant),
                Interpretation::AmbiguousCategory {
                    amount,
                    merchant,
                    candidates,
                } => {
                    let categories: Vec<Category> =
                        candidates.iter().map(|c| c.category.clone()).collect();
                    let fallback = categories
                        .first()
                        .cloned()
                        .unwrap_or_else(|| self.interpreter.keywords().default.clone());
                    let category = match classify_with_timeout(
                        &self.ai,
                        text,
                        &categories,
                        self.config.ai_timeout,
                    )
                    .await
                    {
                        Ok(classification) => classification.category,
                        Err(e) => {
                            warn!(user_id = %user.id, error = %e, fallback = %fallback, "AI categorization degraded");
                            fallback
                        }
                    };
                    (amount, category, merchant)
                }
            };

        let hash = NewTransaction::compute_dedupe_hash(&user.id, message.timestamp, text);
        let tx = NewTransaction::spend(&user.id, amount, category.clone(), message.timestamp)
            .with_merchant(merchant.clone())
            .with_description(text)
            .with_dedupe_hash(hash);
        let inserted = self.db.insert_transaction(&tx)?;
        if inserted.is_duplicate() {
            debug!(user_id = %user.id, id = inserted.id(), "Redelivered expense message");
        }

        let mut lines = vec![format!(
            "✅ Logged {} for {}{}.",
            money::format_amount(amount, &user.currency),
            category.label(),
            merchant.map(|m| format!(" at {}", m)).unwrap_or_default()
        )];

        let statuses = BudgetMonitor::new(&self.db, &self.config).affected_budgets(
            user,
            &category,
            message.timestamp,
        )?;
        for status in statuses.iter().filter(|s| s.level != BudgetLevel::Ok) {
            lines.push(budget_line(status, &user.currency));
        }
        if statuses.iter().any(|s| s.level == BudgetLevel::Over) {
            lines.push("Time to slow down for the rest of the period. 🧘".to_string());
        }
        Ok(Reply::text(lines.join("\n")))
    }

    fn goal_reply(&self, user: &User, text: &str, now: DateTime<Utc>) -> Result<Reply> {
        let today = local_date(now, user.tz());
        let title = self.patterns.goal_title(text);
        let deadline = self.patterns.deadline(text, today);
        let amount_text = deadline.as_ref().map(|(_, rest)| rest.as_str()).unwrap_or(text);
        let amount = self
            .interpreter
            .extract_amount(amount_text, &user.currency)
            .filter(|a| *a > 0);

        let (title, amount, deadline) = match (title, amount, deadline) {
            (Some(t), Some(a), Some((d, _))) => (t, a, d),
            (title, amount, deadline) => {
                let mut missing = Vec::new();
                if title.is_none() {
                    missing.push("what it's for");
                }
                if amount.is_none() {
                    missing.push("how much");
                }
                if deadline.is_none() {
                    missing.push("by when");
                }
                return Ok(Reply::text(format!(
                    "I'd love to help you set a goal! 🎯 I still need {}.\n\
                     Try: \"Save ₹1,50,000 for a Goa trip in 6 months\".",
                    missing.join(" and ")
                )));
            }
        };

        let planner = GoalPlanner::new(&self.db);
        let goal = planner.create_goal(user, &title, amount, deadline, now)?;
        let progress = planner.progress(user, &goal, now)?;
        info!(user_id = %user.id, goal_id = goal.id, "Goal created from chat");

        let mut reply = format!(
            "🎯 Goal set: {}\nTarget {} by {}.\nThat's {}/month over {} month{}.",
            goal.name,
            money::format_amount(goal.target_amount, &user.currency),
            goal.deadline,
            money::format_amount(progress.required_monthly, &user.currency),
            progress.months_remaining,
            if progress.months_remaining == 1 { "" } else { "s" }
        );
        if goal.is_primary {
            reply.push_str("\nI'll use it to keep impulse buys in check. 💪");
        }
        Ok(Reply::text(reply))
    }

    fn contribution_reply(&self, user: &User, message: &InboundMessage, sign: i64) -> Result<Reply> {
        let text = message.text.trim();
        let amount = match self.interpreter.extract_amount(text, &user.currency) {
            Some(a) if a > 0 => a,
            _ => return Ok(Reply::text("How much? Try \"I saved ₹5,000\".")),
        };
        let hash = NewTransaction::compute_dedupe_hash(&user.id, message.timestamp, text);
        let (progress, _) = GoalPlanner::new(&self.db).contribute(
            user,
            None,
            sign * amount,
            message.timestamp,
            Some(hash),
        )?;

        let verb = if sign > 0 { "💰 Saved" } else { "💸 Withdrew" };
        let mut reply = format!(
            "{} {} {} {}.\n\n{}",
            verb,
            money::format_amount(amount, &user.currency),
            if sign > 0 { "toward" } else { "from" },
            progress.name,
            goal_block(&progress, &user.currency)
        );
        if progress.status == GoalStatus::Achieved {
            reply.push_str("\n\nAmazing work! Ready to pick the next goal?");
        }
        Ok(Reply::text(reply))
    }

    fn budget_intent(&self, user: &User, text: &str, now: DateTime<Utc>) -> Result<Reply> {
        let amount = match self.interpreter.extract_amount(text, &user.currency) {
            Some(a) if a >= 0 => a,
            _ => return self.budgets_reply(user, now),
        };
        let period = if self.patterns.weekly.is_match(text) {
            BudgetPeriod::Weekly
        } else {
            BudgetPeriod::Monthly
        };
        let scope = self
            .budget_category(text)
            .map(BudgetScope::Category)
            .unwrap_or(BudgetScope::Overall);

        self.db.set_budget(&user.id, &scope, period, amount)?;
        let status = BudgetMonitor::new(&self.db, &self.config).scope_status(user, &scope, period, now)?;
        Ok(Reply::text(format!(
            "✅ {} {} budget set to {}.\n{}",
            title_case(period.as_str()),
            match &scope {
                BudgetScope::Overall => "overall".to_string(),
                BudgetScope::Category(c) => c.label(),
            },
            money::format_amount(amount, &user.currency),
            budget_line(&status, &user.currency)
        )))
    }

    /// Category named in a budget message: a category word, else a keyword match
    fn budget_category(&self, text: &str) -> Option<Category> {
        text.split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .filter_map(|w| w.parse::<Category>().ok())
            .find(|c| c.is_builtin() && !matches!(c, Category::Savings | Category::Uncategorized))
            .or_else(|| self.interpreter.keywords().match_text(text).map(|m| m.category))
    }

    fn abandon_reply(&self, user: &User) -> Result<Reply> {
        let goal = GoalPlanner::new(&self.db).abandon(user, None)?;
        Ok(Reply::text(format!(
            "🗑️ Dropped '{}'. Its savings stay on the record.\nTell me about a new goal whenever you're ready.",
            goal.name
        )))
    }

    fn status_reply(&self, user: &User, now: DateTime<Utc>) -> Result<Reply> {
        let primary = GoalPlanner::new(&self.db).primary_progress(user, now)?;
        let month = BudgetMonitor::new(&self.db, &self.config).scope_status(
            user,
            &BudgetScope::Overall,
            BudgetPeriod::Monthly,
            now,
        )?;

        if primary.is_none() && month.no_limit_set && month.spent == 0 {
            return Ok(Reply::text(NO_GOAL_TEXT));
        }

        let mut sections = vec!["📊 Your status".to_string()];
        match primary {
            Some((_, progress)) => sections.push(format!(
                "Goal progress:\n{}",
                goal_block(&progress, &user.currency)
            )),
            None => sections.push("No active goal. Tell me what you're saving for! 🎯".to_string()),
        }
        sections.push(format!(
            "This month:\n{}",
            budget_line(&month, &user.currency)
        ));
        Ok(Reply::text(sections.join("\n\n")))
    }

    fn goals_reply(&self, user: &User, now: DateTime<Utc>) -> Result<Reply> {
        let goals = GoalPlanner::new(&self.db).active_progress(user, now)?;
        if goals.is_empty() {
            return Ok(Reply::text(
                "You don't have any active goals yet! 🎯\n\nLet's set one: what are you saving for?",
            ));
        }
        let blocks: Vec<String> = goals
            .iter()
            .map(|g| goal_block(g, &user.currency))
            .collect();
        Ok(Reply::text(format!(
            "🎯 Your active goals\n\n{}",
            blocks.join("\n\n")
        )))
    }

    fn budgets_reply(&self, user: &User, now: DateTime<Utc>) -> Result<Reply> {
        let statuses = BudgetMonitor::new(&self.db, &self.config).all_statuses(user, now)?;
        if statuses.is_empty() {
            return Ok(Reply::text(
                "No budgets yet. Try \"Monthly budget is ₹20,000\" or \"Dining budget 4000 weekly\".",
            ));
        }
        let lines: Vec<String> = statuses
            .iter()
            .map(|s| budget_line(s, &user.currency))
            .collect();
        Ok(Reply::text(format!("💵 Your budgets\n\n{}", lines.join("\n"))))
    }

    fn dashboard_reply(&self, user: &User, now: DateTime<Utc>) -> Result<Reply> {
        let snapshot = DashboardSnapshot::build(&self.db, &self.config, &user.id, now)?;
        Ok(Reply::text(snapshot.summary_text()).with(Attachment::Dashboard {
            user_id: user.id.clone(),
        }))
    }

    fn dream_reply(&self, user: &User, topic: &str, now: DateTime<Utc>) -> Result<Reply> {
        let primary = GoalPlanner::new(&self.db).primary_progress(user, now)?;
        let topic = if topic.is_empty() {
            match &primary {
                Some((goal, _)) => goal.name.clone(),
                None => {
                    return Ok(Reply::text(
                        "What are you dreaming of? Try /dream a 2BHK in Pune 🏡",
                    ))
                }
            }
        } else {
            topic.to_string()
        };

        let prompt = format!(
            "A photorealistic image of {}. Warm lighting, aspirational and cozy, \
             high quality photography.",
            topic
        );
        let mut text = format!("✨ Picture this: {}.", topic);
        if let Some((_, progress)) = primary {
            text.push_str(&format!(
                "\n\nYou're {:.0}% of the way to {}. Keep saving, you're building toward it.",
                progress.percent, progress.name
            ));
        }
        Ok(Reply::text(text).with(Attachment::ImageRequest { prompt }))
    }

    fn social_reply(&self, args: &str) -> Reply {
        let (context, place) = match args.split_once(char::is_whitespace) {
            Some((context, place)) if !place.trim().is_empty() => (context, place.trim()),
            _ => {
                return Reply::text(
                    "Tell me the plan and the area, e.g. /social dinner Koramangala 🍽️",
                )
            }
        };
        let script = format!(
            "Guys, found a better plan for {} around {}: great vibe and easy on the wallet. In?",
            context, place
        );
        Reply::text(format!(
            "💡 Social currency hack\n\nInstead of blowing cash on {}, pitch a cheaper spot around {}.\n\n\
             Copy-paste to friends:\n\"{}\"",
            context, place, script
        ))
        .with(Attachment::PlacesLookup {
            context: context.to_string(),
            place: place.to_string(),
        })
    }

    fn undo_reply(&self, user: &User, now: DateTime<Utc>) -> Result<Reply> {
        let Some(last) = self.db.last_correctable_chat_transaction(&user.id)? else {
            return Ok(Reply::text("Nothing to undo. 👍"));
        };
        self.db.correct_transaction(&user.id, last.id, None)?;
        let what = match last.goal_id {
            Some(_) => "savings entry".to_string(),
            None => last.category.label(),
        };
        debug!(user_id = %user.id, id = last.id, at = %now, "Undid chat transaction");
        Ok(Reply::text(format!(
            "↩️ Undid {} ({}{}).",
            money::format_amount(last.amount, &user.currency),
            what,
            last.merchant
                .map(|m| format!(" at {}", m))
                .unwrap_or_default()
        )))
    }

    /// Route a cart signal to the intervention engine
    pub fn handle_signal(&self, signal: &CartSignal, now: DateTime<Utc>) -> Result<SignalResponse> {
        InterventionEngine::new(&self.db, &self.config).handle_signal(signal, now)
    }

    pub fn dismiss_intervention(&self, event_id: i64, now: DateTime<Utc>) -> Result<InterventionEvent> {
        InterventionEngine::new(&self.db, &self.config).dismiss(event_id, now)
    }

    pub fn reconcile(&self, user_id: &str, now: DateTime<Utc>) -> Result<ReconcileSummary> {
        self.db.get_user(user_id)?;
        InterventionEngine::new(&self.db, &self.config).reconcile_outcomes(user_id, now)
    }

    /// Reconcile every active user (for periodic runs)
    pub fn reconcile_all(&self, now: DateTime<Utc>) -> Result<ReconcileSummary> {
        let engine = InterventionEngine::new(&self.db, &self.config);
        let mut total = ReconcileSummary::default();
        for user_id in self.db.list_active_user_ids()? {
            let summary = engine.reconcile_outcomes(&user_id, now)?;
            total.checked += summary.checked;
            total.purchased += summary.purchased;
            total.abandoned += summary.abandoned;
        }
        Ok(total)
    }

    pub fn dashboard(&self, user_id: &str, now: DateTime<Utc>) -> Result<DashboardSnapshot> {
        DashboardSnapshot::build(&self.db, &self.config, user_id, now)
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::ai::MockBackend;
    use crate::models::TransactionSource;

    fn orchestrator() -> SessionOrchestrator {
        let db = Database::in_memory().unwrap();
        SessionOrchestrator::new(db, EngineConfig::default(), AIClient::mock()).unwrap()
    }

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 10, 6, 0, 0).unwrap()
    }

    fn msg(text: &str, timestamp: DateTime<Utc>) -> InboundMessage {
        InboundMessage {
            user_id: "u1".into(),
            text: text.into(),
            timestamp,
        }
    }

    async fn say(o: &SessionOrchestrator, text: &str) -> OutboundMessage {
        o.handle_message(&msg(text, at())).await.unwrap()
    }

    #[test]
    fn test_intent_detection() {
        let o = orchestrator();
        assert_eq!(o.detect_intent("Spent ₹450 on coffee"), Intent::Expense);
        assert_eq!(o.detect_intent("paid 300 for an auto"), Intent::Expense);
        assert_eq!(o.detect_intent("I saved 5000"), Intent::Contribution);
        assert_eq!(o.detect_intent("withdrew 2000"), Intent::Withdrawal);
        assert_eq!(o.detect_intent("monthly budget is 20000"), Intent::Budget);
        assert_eq!(o.detect_intent("Set dining budget to 2000 weekly"), Intent::Budget);
        assert_eq!(o.detect_intent("Dining budget 4000 weekly"), Intent::Budget);
        assert_eq!(o.detect_intent("show my budget"), Intent::Unknown);
        assert_eq!(
            o.detect_intent("Spent 450 on coffee at Starbucks, blew my budget"),
            Intent::Expense
        );
        assert_eq!(o.detect_intent("I spent 2000 over my budget of 5000"), Intent::Expense);
        assert_eq!(o.detect_intent("please delete my goal"), Intent::AbandonGoal);
        assert_eq!(o.detect_intent("Save 150000 for a Goa trip in 6 months"), Intent::CreateGoal);
        assert_eq!(o.detect_intent("I want to buy a laptop"), Intent::CreateGoal);
        assert_eq!(o.detect_intent("how am i doing?"), Intent::Status);
        assert_eq!(o.detect_intent("hello there"), Intent::Unknown);
    }

    #[test]
    fn test_goal_title_and_deadline() {
        let p = Patterns::new().unwrap();
        assert_eq!(p.goal_title("Save 150000 for a Goa trip in 6 months").as_deref(), Some("Goa Trip"));
        assert_eq!(p.goal_title("I want to buy a laptop for 50000").as_deref(), Some("Laptop"));
        assert_eq!(p.goal_title("saving for a bike, 80000 by 2025-01-01").as_deref(), Some("Bike"));
        assert_eq!(p.goal_title("save 500"), None);

        let today = NaiveDate::from_ymd_opt(2024, 3, 10).unwrap();
        let (date, rest) = p.deadline("save 150000 for a trip in 6 months", today).unwrap();
        assert_eq!(date, NaiveDate::from_ymd_opt(2024, 9, 10).unwrap());
        assert!(!rest.contains('6'));
        let (date, _) = p.deadline("within 2 weeks", today).unwrap();
        assert_eq!(date, NaiveDate::from_ymd_opt(2024, 3, 24).unwrap());
        let (date, _) = p.deadline("by 2025-01-31", today).unwrap();
        assert_eq!(date, NaiveDate::from_ymd_opt(2025, 1, 31).unwrap());
        assert!(p.deadline("someday", today).is_none());
    }

    #[tokio::test]
    async fn test_start_creates_user() {
        let o = orchestrator();
        let out = say(&o, "/start").await;
        assert!(out.reply_text.contains("Anya"));
        assert!(o.db().get_user("u1").is_ok());
    }

    #[tokio::test]
    async fn test_expense_logged_with_keyword_category() {
        let o = orchestrator();
        let out = say(&o, "Spent ₹450 on coffee and snacks at Starbucks").await;
        assert!(out.reply_text.contains("Logged ₹450 for Dining at Starbucks"), "{}", out.reply_text);

        let txs = o.db().list_transactions("u1", 10).unwrap();
        assert_eq!(txs.len(), 1);
        assert_eq!(txs[0].amount, 45_000);
        assert_eq!(txs[0].category, Category::Dining);
        assert_eq!(txs[0].source, TransactionSource::Chat);
    }

    #[tokio::test]
    async fn test_redelivered_message_is_logged_once() {
        let o = orchestrator();
        let message = msg("paid 300 for an uber", at());
        o.handle_message(&message).await.unwrap();
        o.handle_message(&message).await.unwrap();
        assert_eq!(o.db().list_transactions("u1", 10).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_ambiguous_expense_uses_ai() {
        let db = Database::in_memory().unwrap();
        let ai = AIClient::Mock(MockBackend::new().with_category(Category::Education));
        let o = SessionOrchestrator::new(db, EngineConfig::default(), ai).unwrap();

        say(&o, "paid 1200 for the thing").await;
        let txs = o.db().list_transactions("u1", 10).unwrap();
        assert_eq!(txs[0].category, Category::Education);
    }

    #[tokio::test]
    async fn test_ambiguous_expense_degrades_to_fallback() {
        let db = Database::in_memory().unwrap();
        let ai = AIClient::Mock(MockBackend::unhealthy());
        let o = SessionOrchestrator::new(db, EngineConfig::default(), ai).unwrap();

        let out = say(&o, "paid 1200 for the thing").await;
        assert!(out.reply_text.contains("Logged ₹1,200"));
        let txs = o.db().list_transactions("u1", 10).unwrap();
        assert_eq!(txs[0].category, o.config().keywords.default);
    }

    #[tokio::test]
    async fn test_goal_flow() {
        let o = orchestrator();
        let out = say(&o, "Save ₹1,50,000 for a Goa trip in 6 months").await;
        assert!(out.reply_text.contains("Goal set: Goa Trip"), "{}", out.reply_text);
        assert!(out.reply_text.contains("₹25,000/month"), "{}", out.reply_text);

        let out = say(&o, "I saved 50000").await;
        assert!(out.reply_text.contains("Saved ₹50,000 toward Goa Trip"));

        let out = say(&o, "/goals").await;
        assert!(out.reply_text.contains("33%"), "{}", out.reply_text);

        let out = say(&o, "abandon my goal").await;
        assert!(out.reply_text.contains("Dropped 'Goa Trip'"));
        let out = say(&o, "I saved 100").await;
        assert!(out.reply_text.contains("haven't set a goal"));
    }

    #[tokio::test]
    async fn test_incomplete_goal_asks_for_details() {
        let o = orchestrator();
        let out = say(&o, "I want to buy a laptop").await;
        assert!(out.reply_text.contains("how much and by when"), "{}", out.reply_text);
        assert!(o.db().list_goals("u1", false).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_past_deadline_is_explained() {
        let o = orchestrator();
        let out = say(&o, "Save 5000 for a bike by 2020-01-01").await;
        assert!(out.reply_text.starts_with("⚠️"), "{}", out.reply_text);
    }

    #[tokio::test]
    async fn test_budget_messages_and_warnings() {
        let o = orchestrator();
        let out = say(&o, "monthly budget is 5000").await;
        assert!(out.reply_text.contains("Monthly overall budget set to ₹5,000"), "{}", out.reply_text);

        let out = say(&o, "spent 4500 on groceries").await;
        assert!(out.reply_text.contains("🟠"), "{}", out.reply_text);

        let out = o
            .handle_message(&msg("spent 600 on groceries", at() + Duration::minutes(1)))
            .await
            .unwrap();
        assert!(out.reply_text.contains("over by ₹100"), "{}", out.reply_text);

        let out = say(&o, "set dining budget to 2000 weekly").await;
        assert!(out.reply_text.contains("Weekly Dining budget"), "{}", out.reply_text);
        let out = say(&o, "/budget").await;
        assert!(out.reply_text.contains("Overall monthly"));
        assert!(out.reply_text.contains("Dining weekly"));
    }

    #[tokio::test]
    async fn test_expense_mentioning_budget_is_logged() {
        let o = orchestrator();
        say(&o, "monthly budget is 20000").await;

        let out = o
            .handle_message(&msg(
                "Spent 450 on coffee at Starbucks, blew my budget",
                at() + Duration::minutes(1),
            ))
            .await
            .unwrap();
        assert!(out.reply_text.contains("Logged ₹450 for Dining"), "{}", out.reply_text);

        let txs = o.db().list_transactions("u1", 10).unwrap();
        assert_eq!(txs.len(), 1);
        assert_eq!(txs[0].amount, 45_000);

        // Only the overall budget exists, still at its original limit
        let budgets = o.db().list_budgets("u1").unwrap();
        assert_eq!(budgets.len(), 1);
        assert_eq!(budgets[0].scope, BudgetScope::Overall);
        assert_eq!(budgets[0].limit_amount, 2_000_000);
    }

    #[tokio::test]
    async fn test_undo_offsets_last_expense() {
        let o = orchestrator();
        say(&o, "spent 300 on uber").await;
        let out = say(&o, "/undo").await;
        assert!(out.reply_text.contains("Undid ₹300"), "{}", out.reply_text);
        let out = say(&o, "/undo").await;
        assert!(out.reply_text.contains("Nothing to undo"));

        let user = o.db().get_user("u1").unwrap();
        let window = crate::period::PeriodWindow::containing(BudgetPeriod::Monthly, at(), user.tz());
        assert_eq!(o.db().sum_spend("u1", None, window.start, window.end).unwrap(), 0);
    }

    #[tokio::test]
    async fn test_attachment_commands() {
        let o = orchestrator();
        let out = say(&o, "/dashboard").await;
        assert_eq!(
            out.attachments,
            vec![Attachment::Dashboard {
                user_id: "u1".into()
            }]
        );

        let out = say(&o, "/dream a 2BHK in Pune").await;
        assert!(matches!(&out.attachments[0], Attachment::ImageRequest { prompt } if prompt.contains("2BHK")));

        let out = say(&o, "/social dinner Koramangala").await;
        assert_eq!(
            out.attachments,
            vec![Attachment::PlacesLookup {
                context: "dinner".into(),
                place: "Koramangala".into()
            }]
        );

        let out = say(&o, "/social").await;
        assert!(out.attachments.is_empty());
    }

    #[tokio::test]
    async fn test_status_without_state_guides() {
        let o = orchestrator();
        let out = say(&o, "/mystats").await;
        assert!(out.reply_text.contains("haven't set a goal"));
        let out = say(&o, "hello").await;
        assert!(out.reply_text.contains("/help"));
    }

    #[test]
    fn test_lookup_misses_get_matching_guidance() {
        let o = orchestrator();
        let reply = |what: &str| o.error_reply(Error::NotFound(what.into())).unwrap().text;

        assert_eq!(reply("no active goal to abandon"), NO_GOAL_TEXT);
        assert!(reply("goal 12").contains("haven't set a goal"));
        assert!(reply("transaction 9").contains("nothing to undo"));
        assert!(reply("no weekly budget for Dining").contains("/budget"));
        let other = reply("intervention 4");
        assert!(other.contains("intervention 4"), "{}", other);
        assert!(!other.contains("haven't set a goal"));
    }

    #[tokio::test]
    async fn test_blank_user_is_invalid() {
        let o = orchestrator();
        let err = o
            .handle_message(&InboundMessage {
                user_id: "  ".into(),
                text: "/start".into(),
                timestamp: at(),
            })
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }
}
