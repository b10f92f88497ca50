//! Goal planner: savings plans and progress arithmetic
//!
//! Progress is never stored. Every read sums the contributions tagged with the
//! goal and recomputes the monthly requirement against the current date in the
//! user's timezone.

use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;

use crate::db::{Database, TransactionInsertResult};
use crate::error::{Error, Result};
use crate::models::{Goal, GoalProgress, GoalStatus, NewTransaction, User};
use crate::money;
use crate::period::{local_date, whole_months_between};

/// `ceil(remaining / months)` in minor units; zero once nothing remains
pub fn required_monthly(remaining: i64, months: u32) -> i64 {
    if remaining <= 0 {
        return 0;
    }
    let months = months.max(1) as i64;
    (remaining + months - 1) / months
}

/// Whole calendar months from `today` to `deadline`, floored, at least 1
pub fn months_remaining(today: NaiveDate, deadline: NaiveDate) -> u32 {
    whole_months_between(today, deadline).max(1)
}

/// Derive a goal's progress from its saved total
pub fn compute_progress(goal: &Goal, saved: i64, today: NaiveDate, tz: Tz) -> GoalProgress {
    let remaining = (goal.target_amount - saved).max(0);
    let months = months_remaining(today, goal.deadline);

    let required = match goal.status {
        GoalStatus::Active => required_monthly(remaining, months),
        GoalStatus::Achieved | GoalStatus::Abandoned => 0,
    };

    // Pace fixed at creation: target spread over the months the goal was given
    let created = local_date(goal.created_at, tz);
    let pace = required_monthly(goal.target_amount, months_remaining(created, goal.deadline));
    let elapsed = whole_months_between(created, today) as i64;
    let on_track = goal.status == GoalStatus::Achieved
        || saved >= goal.target_amount
        || elapsed == 0
        || saved >= pace.saturating_mul(elapsed);

    let percent = if goal.target_amount > 0 {
        (saved.max(0) as f64 / goal.target_amount as f64 * 100.0).min(100.0)
    } else {
        0.0
    };

    GoalProgress {
        goal_id: goal.id,
        name: goal.name.clone(),
        status: goal.status,
        target_amount: goal.target_amount,
        saved_amount: saved,
        remaining_amount: remaining,
        required_monthly: required,
        months_remaining: months,
        on_track,
        percent,
        deadline: goal.deadline,
    }
}

/// Goal operations bound to a ledger
pub struct GoalPlanner<'a> {
    db: &'a Database,
}

impl<'a> GoalPlanner<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Create a goal. The deadline must fall after today in the user's timezone.
    pub fn create_goal(
        &self,
        user: &User,
        name: &str,
        target_amount: i64,
        deadline: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<Goal> {
        let today = local_date(now, user.tz());
        if deadline <= today {
            return Err(Error::InvalidInput(format!(
                "the deadline {} must be after today ({})",
                deadline, today
            )));
        }
        self.db
            .create_goal(&user.id, name, target_amount, deadline, now)
    }

    /// Progress for one goal. Read-only: the stored status is reported as is.
    pub fn progress(&self, user: &User, goal: &Goal, now: DateTime<Utc>) -> Result<GoalProgress> {
        let saved = self.db.goal_saved_amount(goal.id)?;
        Ok(compute_progress(goal, saved, local_date(now, user.tz()), user.tz()))
    }

    pub fn goal_progress(&self, user: &User, goal_id: i64, now: DateTime<Utc>) -> Result<GoalProgress> {
        let goal = self.db.get_user_goal(&user.id, goal_id)?;
        self.progress(user, &goal, now)
    }

    /// The primary active goal with its progress, if the user has one
    pub fn primary_progress(
        &self,
        user: &User,
        now: DateTime<Utc>,
    ) -> Result<Option<(Goal, GoalProgress)>> {
        match self.db.primary_goal(&user.id)? {
            Some(goal) => {
                let progress = self.progress(user, &goal, now)?;
                Ok(Some((goal, progress)))
            }
            None => Ok(None),
        }
    }

    /// Progress for every active goal, primary first
    pub fn active_progress(&self, user: &User, now: DateTime<Utc>) -> Result<Vec<GoalProgress>> {
        self.db
            .list_goals(&user.id, true)?
            .iter()
            .map(|goal| self.progress(user, goal, now))
            .collect()
    }

    /// Progress for all goals including achieved and abandoned ones
    pub fn all_progress(&self, user: &User, now: DateTime<Utc>) -> Result<Vec<GoalProgress>> {
        self.db
            .list_goals(&user.id, false)?
            .iter()
            .map(|goal| self.progress(user, goal, now))
            .collect()
    }

    /// Log money put aside toward a goal (the primary goal when `goal_id` is `None`).
    ///
    /// Negative amounts record a withdrawal.
    pub fn contribute(
        &self,
        user: &User,
        goal_id: Option<i64>,
        amount: i64,
        at: DateTime<Utc>,
        dedupe_hash: Option<String>,
    ) -> Result<(GoalProgress, TransactionInsertResult)> {
        if amount == 0 {
            return Err(Error::InvalidInput("contribution must not be zero".into()));
        }
        let goal = match goal_id {
            Some(id) => self.db.get_user_goal(&user.id, id)?,
            None => self
                .db
                .primary_goal(&user.id)?
                .ok_or_else(|| Error::NotFound("no active goal to save toward".into()))?,
        };
        if goal.status != GoalStatus::Active {
            return Err(Error::InvalidInput(format!(
                "goal '{}' is {}",
                goal.name, goal.status
            )));
        }

        let mut tx = NewTransaction::contribution(&user.id, goal.id, amount, at)
            .with_description(&format!(
                "saved {} toward {}",
                money::format_amount(amount, &user.currency),
                goal.name
            ));
        if let Some(hash) = dedupe_hash {
            tx = tx.with_dedupe_hash(hash);
        }
        let inserted = self.db.insert_transaction(&tx)?;

        // Reaching the target is the only way into `achieved`, and it is never left
        let mut goal = goal;
        if self.db.goal_saved_amount(goal.id)? >= goal.target_amount {
            if self.db.mark_goal_achieved(goal.id, at)? {
                tracing::info!(user_id = %user.id, goal_id = goal.id, "Goal reached its target");
            }
            goal.status = GoalStatus::Achieved;
            goal.achieved_at = Some(at);
        }
        let progress = self.progress(user, &goal, at)?;
        Ok((progress, inserted))
    }

    /// Abandon a goal (the primary goal when `goal_id` is `None`)
    pub fn abandon(&self, user: &User, goal_id: Option<i64>) -> Result<Goal> {
        let id = match goal_id {
            Some(id) => id,
            None => {
                self.db
                    .primary_goal(&user.id)?
                    .ok_or_else(|| Error::NotFound("no active goal to abandon".into()))?
                    .id
            }
        };
        self.db.abandon_goal(&user.id, id)
    }

    /// Make `goal_id` the reference goal for interventions
    pub fn set_primary(&self, user: &User, goal_id: i64) -> Result<Goal> {
        self.db.set_primary_goal(&user.id, goal_id)
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::period::DEFAULT_TZ;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn goal(target: i64, created: DateTime<Utc>, deadline: NaiveDate) -> Goal {
        Goal {
            id: 1,
            user_id: "u1".into(),
            name: "Goa trip".into(),
            target_amount: target,
            deadline,
            created_at: created,
            status: GoalStatus::Active,
            is_primary: true,
            achieved_at: None,
        }
    }

    #[test]
    fn test_required_monthly_rounds_up() {
        assert_eq!(required_monthly(15_000_000, 6), 2_500_000);
        assert_eq!(required_monthly(100, 3), 34);
        assert_eq!(required_monthly(0, 3), 0);
        assert_eq!(required_monthly(-5, 3), 0);
        assert_eq!(required_monthly(100, 0), 100);
    }

    #[test]
    fn test_months_remaining_minimum_one() {
        assert_eq!(months_remaining(date(2024, 1, 15), date(2024, 7, 15)), 6);
        assert_eq!(months_remaining(date(2024, 1, 15), date(2024, 7, 14)), 5);
        assert_eq!(months_remaining(date(2024, 1, 15), date(2024, 1, 20)), 1);
    }

    #[test]
    fn test_fresh_goal_progress() {
        let created = Utc.with_ymd_and_hms(2024, 1, 15, 6, 0, 0).unwrap();
        let g = goal(15_000_000, created, date(2024, 7, 15));
        let p = compute_progress(&g, 0, date(2024, 1, 15), DEFAULT_TZ);
        assert_eq!(p.required_monthly, 2_500_000);
        assert_eq!(p.months_remaining, 6);
        assert!(p.on_track);
        assert_eq!(p.percent, 0.0);
    }

    #[test]
    fn test_on_track_uses_creation_pace() {
        let created = Utc.with_ymd_and_hms(2024, 1, 15, 6, 0, 0).unwrap();
        let g = goal(600_000, created, date(2024, 7, 15)); // pace 100_000 / month
        let today = date(2024, 3, 20); // two months elapsed

        assert!(compute_progress(&g, 200_000, today, DEFAULT_TZ).on_track);
        let behind = compute_progress(&g, 150_000, today, DEFAULT_TZ);
        assert!(!behind.on_track);
        // 450_000 left over 3 remaining months
        assert_eq!(behind.required_monthly, 150_000);
    }

    #[test]
    fn test_requirement_drops_to_zero_when_saved() {
        let created = Utc.with_ymd_and_hms(2024, 1, 15, 6, 0, 0).unwrap();
        let g = goal(600_000, created, date(2024, 7, 15));
        let p = compute_progress(&g, 700_000, date(2024, 2, 1), DEFAULT_TZ);
        assert_eq!(p.required_monthly, 0);
        assert_eq!(p.remaining_amount, 0);
        assert_eq!(p.percent, 100.0);
    }

    fn setup() -> (Database, User) {
        let db = Database::in_memory().unwrap();
        let user = db.ensure_user("u1", "INR", "Asia/Kolkata").unwrap();
        (db, user)
    }

    #[test]
    fn test_create_goal_validates_deadline_in_user_tz() {
        let (db, user) = setup();
        let planner = GoalPlanner::new(&db);
        // 20:00 UTC on Jan 31 is already Feb 1 in Kolkata
        let now = Utc.with_ymd_and_hms(2024, 1, 31, 20, 0, 0).unwrap();

        assert!(matches!(
            planner.create_goal(&user, "Bike", 100_000, date(2024, 2, 1), now),
            Err(Error::InvalidInput(_))
        ));
        let goal = planner
            .create_goal(&user, "Bike", 100_000, date(2024, 2, 2), now)
            .unwrap();
        assert!(goal.is_primary);
    }

    #[test]
    fn test_contribute_and_achieve_is_terminal() {
        let (db, user) = setup();
        let planner = GoalPlanner::new(&db);
        let now = Utc::now();
        let deadline = local_date(now, user.tz()) + chrono::Duration::days(400);
        let goal = planner
            .create_goal(&user, "Phone", 1_000_000, deadline, now)
            .unwrap();

        let (progress, _) = planner
            .contribute(&user, None, 1_000_000, now, None)
            .unwrap();
        assert_eq!(progress.status, GoalStatus::Achieved);
        assert_eq!(progress.required_monthly, 0);

        // A later withdrawal does not revert the terminal state
        let goal = db.get_goal(goal.id).unwrap();
        assert_eq!(goal.status, GoalStatus::Achieved);
        db.insert_transaction(&NewTransaction::contribution(&user.id, goal.id, -500_000, now))
            .unwrap();
        let progress = planner.progress(&user, &goal, now).unwrap();
        assert_eq!(progress.status, GoalStatus::Achieved);
        assert_eq!(progress.saved_amount, 500_000);

        // No active goal is left to contribute to
        assert!(matches!(
            planner.contribute(&user, None, 100, now, None),
            Err(Error::NotFound(_))
        ));
        assert!(matches!(
            planner.contribute(&user, Some(goal.id), 100, now, None),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn test_progress_read_does_not_write() {
        let (db, user) = setup();
        let planner = GoalPlanner::new(&db);
        let now = Utc::now();
        let deadline = local_date(now, user.tz()) + chrono::Duration::days(200);
        let goal = planner
            .create_goal(&user, "Camera", 300_000, deadline, now)
            .unwrap();
        db.insert_transaction(&NewTransaction::contribution(&user.id, goal.id, 300_000, now))
            .unwrap();

        let progress = planner.progress(&user, &goal, now).unwrap();
        assert_eq!(progress.required_monthly, 0);
        assert_eq!(progress.status, GoalStatus::Active);
        assert_eq!(db.get_goal(goal.id).unwrap().status, GoalStatus::Active);
        assert!(db.get_goal(goal.id).unwrap().achieved_at.is_none());
    }

    #[test]
    fn test_set_primary_moves_the_flag() {
        let (db, user) = setup();
        let planner = GoalPlanner::new(&db);
        let now = Utc::now();
        let deadline = local_date(now, user.tz()) + chrono::Duration::days(200);
        let first = planner
            .create_goal(&user, "Laptop", 500_000, deadline, now)
            .unwrap();
        let second = planner
            .create_goal(&user, "Trip", 200_000, deadline, now)
            .unwrap();
        assert!(first.is_primary);
        assert!(!second.is_primary);

        let promoted = planner.set_primary(&user, second.id).unwrap();
        assert!(promoted.is_primary);
        assert!(!db.get_goal(first.id).unwrap().is_primary);
        let (primary, _) = planner.primary_progress(&user, now).unwrap().unwrap();
        assert_eq!(primary.id, second.id);

        planner.abandon(&user, Some(first.id)).unwrap();
        assert!(matches!(
            planner.set_primary(&user, first.id),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn test_abandon_primary() {
        let (db, user) = setup();
        let planner = GoalPlanner::new(&db);
        assert!(matches!(
            planner.abandon(&user, None),
            Err(Error::NotFound(_))
        ));

        let now = Utc::now();
        let deadline = local_date(now, user.tz()) + chrono::Duration::days(90);
        let goal = planner
            .create_goal(&user, "Watch", 50_000, deadline, now)
            .unwrap();
        let abandoned = planner.abandon(&user, None).unwrap();
        assert_eq!(abandoned.id, goal.id);
        assert_eq!(abandoned.status, GoalStatus::Abandoned);
        assert!(planner.primary_progress(&user, now).unwrap().is_none());
    }
}
