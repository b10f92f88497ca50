//! Budget definitions

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::{format_datetime, get_datetime, Database};
use crate::error::{Error, Result};
use crate::models::{Budget, BudgetPeriod, BudgetScope};

const BUDGET_COLUMNS: &str = "id, user_id, scope, period, limit_amount, created_at, updated_at";

fn row_to_budget(row: &Row<'_>) -> rusqlite::Result<Budget> {
    let scope: String = row.get(2)?;
    let period: String = row.get(3)?;

    Ok(Budget {
        id: row.get(0)?,
        user_id: row.get(1)?,
        scope: scope.parse().unwrap_or(BudgetScope::Overall),
        period: period.parse().unwrap_or(BudgetPeriod::Monthly),
        limit_amount: row.get(4)?,
        created_at: get_datetime(row, 5)?,
        updated_at: get_datetime(row, 6)?,
    })
}

fn find_budget(
    conn: &Connection,
    user_id: &str,
    scope: &BudgetScope,
    period: BudgetPeriod,
) -> Result<Option<Budget>> {
    let budget = conn
        .query_row(
            &format!(
                "SELECT {} FROM budgets WHERE user_id = ? AND scope = ? AND period = ?",
                BUDGET_COLUMNS
            ),
            params![user_id, scope.as_str(), period.as_str()],
            row_to_budget,
        )
        .optional()?;
    Ok(budget)
}

fn check_limit(limit_amount: i64) -> Result<()> {
    if limit_amount < 0 {
        return Err(Error::InvalidInput("budget limit must not be negative".into()));
    }
    Ok(())
}

impl Database {
    /// Define a new budget. `Conflict` if one exists for the same scope and period.
    pub fn create_budget(
        &self,
        user_id: &str,
        scope: &BudgetScope,
        period: BudgetPeriod,
        limit_amount: i64,
    ) -> Result<Budget> {
        check_limit(limit_amount)?;
        let budget = self.write_tx(|conn| {
            if find_budget(conn, user_id, scope, period)?.is_some() {
                return Err(Error::Conflict(format!(
                    "a {} budget for {} already exists",
                    period,
                    scope.label()
                )));
            }
            let now = format_datetime(Utc::now());
            conn.execute(
                "INSERT INTO budgets (user_id, scope, period, limit_amount, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?)",
                params![user_id, scope.as_str(), period.as_str(), limit_amount, now, now],
            )?;
            find_budget(conn, user_id, scope, period)?
                .ok_or_else(|| Error::NotFound("budget vanished after insert".into()))
        })?;
        tracing::info!(user_id, scope = %scope, period = %period, limit_amount, "Created budget");
        Ok(budget)
    }

    /// Create or update the budget for (scope, period)
    pub fn set_budget(
        &self,
        user_id: &str,
        scope: &BudgetScope,
        period: BudgetPeriod,
        limit_amount: i64,
    ) -> Result<Budget> {
        check_limit(limit_amount)?;
        let budget = self.write_tx(|conn| {
            let now = format_datetime(Utc::now());
            conn.execute(
                r#"
                INSERT INTO budgets (user_id, scope, period, limit_amount, created_at, updated_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?5)
                ON CONFLICT(user_id, scope, period)
                DO UPDATE SET limit_amount = excluded.limit_amount, updated_at = excluded.updated_at
                "#,
                params![user_id, scope.as_str(), period.as_str(), limit_amount, now],
            )?;
            find_budget(conn, user_id, scope, period)?
                .ok_or_else(|| Error::NotFound("budget vanished after upsert".into()))
        })?;
        tracing::info!(user_id, scope = %scope, period = %period, limit_amount, "Set budget");
        Ok(budget)
    }

    /// Remove a budget definition
    pub fn delete_budget(&self, user_id: &str, scope: &BudgetScope, period: BudgetPeriod) -> Result<()> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "DELETE FROM budgets WHERE user_id = ? AND scope = ? AND period = ?",
            params![user_id, scope.as_str(), period.as_str()],
        )?;
        if changed == 0 {
            return Err(Error::NotFound(format!(
                "no {} budget for {}",
                period,
                scope.label()
            )));
        }
        tracing::info!(user_id, scope = %scope, period = %period, "Deleted budget");
        Ok(())
    }

    /// Budget for an exact (scope, period), if defined
    pub fn find_budget(
        &self,
        user_id: &str,
        scope: &BudgetScope,
        period: BudgetPeriod,
    ) -> Result<Option<Budget>> {
        let conn = self.conn()?;
        find_budget(&conn, user_id, scope, period)
    }

    /// All budgets for a user, overall first
    pub fn list_budgets(&self, user_id: &str) -> Result<Vec<Budget>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM budgets WHERE user_id = ? ORDER BY scope != '*', scope, period",
            BUDGET_COLUMNS
        ))?;
        let budgets = stmt
            .query_map(params![user_id], row_to_budget)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(budgets)
    }
}
