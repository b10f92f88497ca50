//! Savings goal operations

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::{format_datetime, get_date, get_datetime, get_opt_datetime, Database};
use crate::error::{Error, Result};
use crate::models::{Goal, GoalStatus};

const GOAL_COLUMNS: &str =
    "id, user_id, name, target_amount, deadline, created_at, status, is_primary, achieved_at";

fn row_to_goal(row: &Row<'_>) -> rusqlite::Result<Goal> {
    let status: String = row.get(6)?;

    Ok(Goal {
        id: row.get(0)?,
        user_id: row.get(1)?,
        name: row.get(2)?,
        target_amount: row.get(3)?,
        deadline: get_date(row, 4)?,
        created_at: get_datetime(row, 5)?,
        status: status.parse().unwrap_or_default(),
        is_primary: row.get(7)?,
        achieved_at: get_opt_datetime(row, 8)?,
    })
}

fn fetch_goal(conn: &Connection, goal_id: i64) -> Result<Goal> {
    conn.query_row(
        &format!("SELECT {} FROM goals WHERE id = ?", GOAL_COLUMNS),
        params![goal_id],
        row_to_goal,
    )
    .optional()?
    .ok_or_else(|| Error::NotFound(format!("goal {}", goal_id)))
}

fn fetch_user_goal(conn: &Connection, user_id: &str, goal_id: i64) -> Result<Goal> {
    let goal = fetch_goal(conn, goal_id)?;
    if goal.user_id != user_id {
        return Err(Error::NotFound(format!("goal {}", goal_id)));
    }
    Ok(goal)
}

impl Database {
    /// Insert a goal. It becomes primary when the user has no primary active goal.
    ///
    /// Deadline validation needs the user's timezone and lives in the planner.
    pub fn create_goal(
        &self,
        user_id: &str,
        name: &str,
        target_amount: i64,
        deadline: NaiveDate,
        created_at: DateTime<Utc>,
    ) -> Result<Goal> {
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::InvalidInput("goal name must not be empty".into()));
        }
        if target_amount <= 0 {
            return Err(Error::InvalidInput("goal target must be positive".into()));
        }

        let goal = self.write_tx(|conn| {
            let has_primary: bool = conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM goals WHERE user_id = ? AND status = 'active' AND is_primary = 1)",
                params![user_id],
                |row| row.get(0),
            )?;

            conn.execute(
                r#"
                INSERT INTO goals (user_id, name, target_amount, deadline, status, is_primary, created_at)
                VALUES (?, ?, ?, ?, 'active', ?, ?)
                "#,
                params![
                    user_id,
                    name,
                    target_amount,
                    deadline.format("%Y-%m-%d").to_string(),
                    !has_primary,
                    format_datetime(created_at),
                ],
            )?;
            fetch_goal(conn, conn.last_insert_rowid())
        })?;

        tracing::info!(user_id, goal_id = goal.id, primary = goal.is_primary, "Created goal");
        Ok(goal)
    }

    /// Get a goal by id
    pub fn get_goal(&self, goal_id: i64) -> Result<Goal> {
        let conn = self.conn()?;
        fetch_goal(&conn, goal_id)
    }

    /// Get a goal, treating another user's goal as absent
    pub fn get_user_goal(&self, user_id: &str, goal_id: i64) -> Result<Goal> {
        let conn = self.conn()?;
        fetch_user_goal(&conn, user_id, goal_id)
    }

    /// List a user's goals, primary first then newest first
    pub fn list_goals(&self, user_id: &str, active_only: bool) -> Result<Vec<Goal>> {
        let conn = self.conn()?;
        let sql = format!(
            "SELECT {} FROM goals WHERE user_id = ? {} ORDER BY status = 'active' DESC, is_primary DESC, created_at DESC, id DESC",
            GOAL_COLUMNS,
            if active_only { "AND status = 'active'" } else { "" }
        );
        let mut stmt = conn.prepare(&sql)?;
        let goals = stmt
            .query_map(params![user_id], row_to_goal)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(goals)
    }

    /// The active goal interventions are measured against.
    ///
    /// An explicitly marked goal wins; otherwise the most recently created
    /// active goal.
    pub fn primary_goal(&self, user_id: &str) -> Result<Option<Goal>> {
        let conn = self.conn()?;
        let goal = conn
            .query_row(
                &format!(
                    "SELECT {} FROM goals WHERE user_id = ? AND status = 'active' \
                     ORDER BY is_primary DESC, created_at DESC, id DESC LIMIT 1",
                    GOAL_COLUMNS
                ),
                params![user_id],
                row_to_goal,
            )
            .optional()?;
        Ok(goal)
    }

    /// Mark one active goal primary and clear the flag everywhere else
    pub fn set_primary_goal(&self, user_id: &str, goal_id: i64) -> Result<Goal> {
        let goal = self.write_tx(|conn| {
            let goal = fetch_user_goal(conn, user_id, goal_id)?;
            if goal.status != GoalStatus::Active {
                return Err(Error::InvalidInput(format!(
                    "goal '{}' is {} and cannot be primary",
                    goal.name, goal.status
                )));
            }
            conn.execute(
                "UPDATE goals SET is_primary = (id = ?) WHERE user_id = ?",
                params![goal_id, user_id],
            )?;
            fetch_goal(conn, goal_id)
        })?;
        tracing::info!(user_id, goal_id, "Set primary goal");
        Ok(goal)
    }

    /// Move an active goal to `achieved`. Returns false if it was not active.
    pub fn mark_goal_achieved(&self, goal_id: i64, at: DateTime<Utc>) -> Result<bool> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE goals SET status = 'achieved', achieved_at = ? WHERE id = ? AND status = 'active'",
            params![format_datetime(at), goal_id],
        )?;
        if changed > 0 {
            tracing::info!(goal_id, "Goal achieved");
        }
        Ok(changed > 0)
    }

    /// Abandon an active goal (explicit user action only)
    pub fn abandon_goal(&self, user_id: &str, goal_id: i64) -> Result<Goal> {
        let goal = self.write_tx(|conn| {
            let goal = fetch_user_goal(conn, user_id, goal_id)?;
            if goal.status != GoalStatus::Active {
                return Err(Error::InvalidInput(format!(
                    "goal '{}' is already {}",
                    goal.name, goal.status
                )));
            }
            conn.execute(
                "UPDATE goals SET status = 'abandoned', is_primary = 0 WHERE id = ?",
                params![goal_id],
            )?;
            fetch_goal(conn, goal_id)
        })?;
        tracing::info!(user_id, goal_id, "Abandoned goal");
        Ok(goal)
    }

    /// Net amount contributed toward a goal
    pub fn goal_saved_amount(&self, goal_id: i64) -> Result<i64> {
        let conn = self.conn()?;
        let saved: i64 = conn.query_row(
            "SELECT COALESCE(SUM(amount), 0) FROM transactions WHERE goal_id = ?",
            params![goal_id],
            |row| row.get(0),
        )?;
        Ok(saved)
    }
}
