//! Read-only dashboard snapshot
//!
//! One query surface for everything a dashboard renders. Nothing here writes.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::config::EngineConfig;
use crate::db::Database;
use crate::error::Result;
use crate::models::{
    BudgetPeriod, BudgetScope, GoalProgress, InterventionEvent, InterventionSummary, Transaction,
    User,
};
use crate::money;
use crate::monitor::{BudgetMonitor, BudgetStatus};
use crate::period::PeriodWindow;
use crate::planner::GoalPlanner;

const RECENT_LIMIT: i64 = 10;

#[derive(Debug, Clone, Serialize)]
pub struct DashboardSnapshot {
    pub user: User,
    /// Active goals first (primary leading), then achieved and abandoned ones
    pub goals: Vec<GoalProgress>,
    pub budgets: Vec<BudgetStatus>,
    /// Overall spend this calendar month, whether or not a budget exists
    pub month_spend: i64,
    /// Part of `month_spend` that was not essential
    pub month_nonessential_spend: i64,
    pub interventions: InterventionSummary,
    pub recent_interventions: Vec<InterventionEvent>,
    pub recent_transactions: Vec<Transaction>,
    pub generated_at: DateTime<Utc>,
}

impl DashboardSnapshot {
    /// Build a snapshot for an existing user (`NotFound` otherwise)
    pub fn build(
        db: &Database,
        config: &EngineConfig,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Self> {
        let user = db.get_user(user_id)?;
        let monitor = BudgetMonitor::new(db, config);

        let month = monitor.scope_status(&user, &BudgetScope::Overall, BudgetPeriod::Monthly, now)?;
        let window = PeriodWindow::containing(BudgetPeriod::Monthly, now, user.tz());

        Ok(Self {
            goals: GoalPlanner::new(db).all_progress(&user, now)?,
            budgets: monitor.all_statuses(&user, now)?,
            month_spend: month.spent,
            month_nonessential_spend: db.sum_nonessential_spend(&user.id, window.start, window.end)?,
            interventions: db.intervention_summary(&user.id)?,
            recent_interventions: db.list_interventions(&user.id, RECENT_LIMIT)?,
            recent_transactions: db.list_transactions(&user.id, RECENT_LIMIT)?,
            generated_at: now,
            user,
        })
    }

    /// Short chat summary
    pub fn summary_text(&self) -> String {
        let currency = &self.user.currency;
        let mut lines = vec!["📊 Your dashboard".to_string(), String::new()];

        lines.push(format!(
            "Spent this month: {}",
            money::format_amount(self.month_spend, currency)
        ));
        if self.month_spend > 0 {
            lines.push(format!(
                "  of which non-essential: {}",
                money::format_amount(self.month_nonessential_spend, currency)
            ));
        }

        let active: Vec<&GoalProgress> = self
            .goals
            .iter()
            .filter(|g| g.status == crate::models::GoalStatus::Active)
            .collect();
        lines.push(format!("Active goals: {}", active.len()));
        if let Some(goal) = active.first() {
            lines.push(format!(
                "  {} at {:.0}%, {}/month needed",
                goal.name,
                goal.percent,
                money::format_amount(goal.required_monthly, currency)
            ));
        }

        lines.push(format!("Budgets tracked: {}", self.budgets.len()));

        let s = &self.interventions;
        lines.push(format!(
            "Nudges sent: {}, carts walked away from: {} ({})",
            s.sent + s.dismissed + s.abandoned,
            s.abandoned,
            money::format_amount(s.abandoned_amount, currency)
        ));
        lines.join("\n")
    }
}
