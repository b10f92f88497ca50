//! Budget monitor: spend against limits in calendar-aligned windows

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::Serialize;

use crate::config::EngineConfig;
use crate::db::Database;
use crate::error::Result;
use crate::models::{Budget, BudgetLevel, BudgetPeriod, BudgetScope, Category, User};
use crate::period::PeriodWindow;

/// Status of one budget scope in one window
#[derive(Debug, Clone, Serialize)]
pub struct BudgetStatus {
    pub scope: BudgetScope,
    pub period: BudgetPeriod,
    pub level: BudgetLevel,
    /// Net spend in the window (minor units)
    pub spent: i64,
    /// `None` when no budget is defined for this scope and period
    pub limit: Option<i64>,
    /// spent / limit; `None` without a limit or with a zero limit
    pub ratio: Option<f64>,
    pub no_limit_set: bool,
    pub window: PeriodWindow,
}

impl BudgetStatus {
    /// Amount by which spend exceeds the limit, if it does
    pub fn overage(&self) -> Option<i64> {
        self.limit
            .map(|limit| self.spent - limit)
            .filter(|over| *over > 0)
    }

    /// Limit minus spend, floored at zero
    pub fn remaining(&self) -> Option<i64> {
        self.limit.map(|limit| (limit - self.spent).max(0))
    }
}

/// Both sides of an evaluation: the category's own budget and the overall one
#[derive(Debug, Clone, Serialize)]
pub struct BudgetEvaluation {
    pub category: BudgetStatus,
    pub overall: BudgetStatus,
}

impl BudgetEvaluation {
    /// The higher-severity status. On a tie the category-specific one.
    pub fn worst(&self) -> &BudgetStatus {
        if self.overall.level > self.category.level {
            &self.overall
        } else {
            &self.category
        }
    }
}

/// OK below the warning ratio, WARNING up to and including the limit, OVER past it.
///
/// A zero limit is OVER as soon as anything is spent.
pub fn level_for(spent: i64, limit: i64, warning_ratio: f64) -> BudgetLevel {
    if limit <= 0 {
        return if spent > 0 {
            BudgetLevel::Over
        } else {
            BudgetLevel::Ok
        };
    }
    let ratio = spent as f64 / limit as f64;
    if ratio > 1.0 {
        BudgetLevel::Over
    } else if ratio >= warning_ratio {
        BudgetLevel::Warning
    } else {
        BudgetLevel::Ok
    }
}

pub struct BudgetMonitor<'a> {
    db: &'a Database,
    warning_ratio: f64,
}

impl<'a> BudgetMonitor<'a> {
    pub fn new(db: &'a Database, config: &EngineConfig) -> Self {
        Self {
            db,
            warning_ratio: config.budget.warning_ratio,
        }
    }

    /// Status of one scope in the `period` window containing `at`
    pub fn scope_status(
        &self,
        user: &User,
        scope: &BudgetScope,
        period: BudgetPeriod,
        at: DateTime<Utc>,
    ) -> Result<BudgetStatus> {
        let budget = self.db.find_budget(&user.id, scope, period)?;
        self.status_for(user.tz(), &user.id, scope, period, budget.as_ref(), at)
    }

    /// Category and overall status for the window containing `at`
    pub fn evaluate_detailed(
        &self,
        user: &User,
        category: &Category,
        period: BudgetPeriod,
        at: DateTime<Utc>,
    ) -> Result<BudgetEvaluation> {
        Ok(BudgetEvaluation {
            category: self.scope_status(user, &BudgetScope::Category(category.clone()), period, at)?,
            overall: self.scope_status(user, &BudgetScope::Overall, period, at)?,
        })
    }

    /// The worse of the category and overall status
    pub fn evaluate(
        &self,
        user: &User,
        category: &Category,
        period: BudgetPeriod,
        at: DateTime<Utc>,
    ) -> Result<BudgetStatus> {
        Ok(self
            .evaluate_detailed(user, category, period, at)?
            .worst()
            .clone())
    }

    /// Every defined budget that covers `category`, in both periods
    pub fn affected_budgets(
        &self,
        user: &User,
        category: &Category,
        at: DateTime<Utc>,
    ) -> Result<Vec<BudgetStatus>> {
        let tz = user.tz();
        self.db
            .list_budgets(&user.id)?
            .iter()
            .filter(|b| match &b.scope {
                BudgetScope::Overall => true,
                BudgetScope::Category(c) => c == category,
            })
            .map(|b| self.status_for(tz, &user.id, &b.scope, b.period, Some(b), at))
            .collect()
    }

    /// Status of every budget the user has defined
    pub fn all_statuses(&self, user: &User, at: DateTime<Utc>) -> Result<Vec<BudgetStatus>> {
        let tz = user.tz();
        self.db
            .list_budgets(&user.id)?
            .iter()
            .map(|b| self.status_for(tz, &user.id, &b.scope, b.period, Some(b), at))
            .collect()
    }

    fn status_for(
        &self,
        tz: Tz,
        user_id: &str,
        scope: &BudgetScope,
        period: BudgetPeriod,
        budget: Option<&Budget>,
        at: DateTime<Utc>,
    ) -> Result<BudgetStatus> {
        let window = PeriodWindow::containing(period, at, tz);
        let category = match scope {
            BudgetScope::Overall => None,
            BudgetScope::Category(c) => Some(c),
        };
        let spent = self.db.sum_spend(user_id, category, window.start, window.end)?;

        let status = match budget {
            Some(b) => BudgetStatus {
                scope: scope.clone(),
                period,
                level: level_for(spent, b.limit_amount, self.warning_ratio),
                spent,
                limit: Some(b.limit_amount),
                ratio: (b.limit_amount > 0).then(|| spent as f64 / b.limit_amount as f64),
                no_limit_set: false,
                window,
            },
            None => BudgetStatus {
                scope: scope.clone(),
                period,
                level: BudgetLevel::Ok,
                spent,
                limit: None,
                ratio: None,
                no_limit_set: true,
                window,
            },
        };
        Ok(status)
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::models::NewTransaction;

    #[test]
    fn test_level_thresholds() {
        assert_eq!(level_for(7_999, 10_000, 0.8), BudgetLevel::Ok);
        assert_eq!(level_for(8_000, 10_000, 0.8), BudgetLevel::Warning);
        assert_eq!(level_for(10_000, 10_000, 0.8), BudgetLevel::Warning);
        assert_eq!(level_for(10_001, 10_000, 0.8), BudgetLevel::Over);
        assert_eq!(level_for(1, 0, 0.8), BudgetLevel::Over);
        assert_eq!(level_for(0, 0, 0.8), BudgetLevel::Ok);
    }

    fn setup() -> (Database, User, EngineConfig) {
        let db = Database::in_memory().unwrap();
        let user = db.ensure_user("u1", "INR", "Asia/Kolkata").unwrap();
        (db, user, EngineConfig::default())
    }

    #[test]
    fn test_no_budget_is_ok_with_flag() {
        let (db, user, config) = setup();
        let monitor = BudgetMonitor::new(&db, &config);
        let status = monitor
            .evaluate(&user, &Category::Dining, BudgetPeriod::Monthly, Utc::now())
            .unwrap();
        assert_eq!(status.level, BudgetLevel::Ok);
        assert!(status.no_limit_set);
        assert!(status.limit.is_none());
    }

    #[test]
    fn test_worse_of_category_and_overall() {
        let (db, user, config) = setup();
        let monitor = BudgetMonitor::new(&db, &config);
        let at = Utc.with_ymd_and_hms(2024, 3, 10, 6, 0, 0).unwrap();

        db.set_budget(
            &user.id,
            &BudgetScope::Category(Category::Dining),
            BudgetPeriod::Monthly,
            1_000_000,
        )
        .unwrap();
        db.set_budget(&user.id, &BudgetScope::Overall, BudgetPeriod::Monthly, 500_000)
            .unwrap();
        db.insert_transaction(&NewTransaction::spend(&user.id, 450_000, Category::Dining, at))
            .unwrap();

        let detail = monitor
            .evaluate_detailed(&user, &Category::Dining, BudgetPeriod::Monthly, at)
            .unwrap();
        assert_eq!(detail.category.level, BudgetLevel::Ok);
        assert_eq!(detail.overall.level, BudgetLevel::Warning);
        assert_eq!(detail.worst().scope, BudgetScope::Overall);

        assert_eq!(monitor.affected_budgets(&user, &Category::Dining, at).unwrap().len(), 2);
        assert_eq!(monitor.affected_budgets(&user, &Category::Travel, at).unwrap().len(), 1);
    }

    #[test]
    fn test_window_is_calendar_month_in_user_tz() {
        let (db, user, config) = setup();
        let monitor = BudgetMonitor::new(&db, &config);
        db.set_budget(&user.id, &BudgetScope::Overall, BudgetPeriod::Monthly, 100_000)
            .unwrap();

        // 18:29:59 UTC on Mar 31 is 23:59:59 Mar 31 in Kolkata; 18:30 is Apr 1
        let last_march = Utc.with_ymd_and_hms(2024, 3, 31, 18, 29, 59).unwrap();
        let first_april = Utc.with_ymd_and_hms(2024, 3, 31, 18, 30, 0).unwrap();
        db.insert_transaction(&NewTransaction::spend(&user.id, 60_000, Category::Bills, last_march))
            .unwrap();

        let march = monitor
            .scope_status(&user, &BudgetScope::Overall, BudgetPeriod::Monthly, last_march)
            .unwrap();
        let april = monitor
            .scope_status(&user, &BudgetScope::Overall, BudgetPeriod::Monthly, first_april)
            .unwrap();
        assert_eq!(march.spent, 60_000);
        assert_eq!(april.spent, 0);
    }
}
