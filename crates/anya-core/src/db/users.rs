//! User operations

use chrono::Utc;
use chrono_tz::Tz;
use rusqlite::{params, OptionalExtension, Row};

use super::{format_datetime, get_datetime, Database};
use crate::error::{Error, Result};
use crate::models::User;
use crate::money;

const USER_COLUMNS: &str = "id, currency, timezone, active, created_at";

fn row_to_user(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        currency: row.get(1)?,
        timezone: row.get(2)?,
        active: row.get(3)?,
        created_at: get_datetime(row, 4)?,
    })
}

pub(crate) fn validate_user_id(user_id: &str) -> Result<()> {
    let trimmed = user_id.trim();
    if trimmed.is_empty() {
        return Err(Error::InvalidInput("user id must not be empty".into()));
    }
    if trimmed.len() > 128 || trimmed != user_id {
        return Err(Error::InvalidInput(format!("invalid user id: {:?}", user_id)));
    }
    Ok(())
}

fn validate_settings(currency: &str, timezone: &str) -> Result<()> {
    if !money::is_currency_code(currency) {
        return Err(Error::InvalidInput(format!("unknown currency code: {}", currency)));
    }
    timezone
        .parse::<Tz>()
        .map_err(|_| Error::InvalidInput(format!("unknown timezone: {}", timezone)))?;
    Ok(())
}

impl Database {
    /// Get the user, creating it with the given defaults on first contact
    pub fn ensure_user(&self, user_id: &str, currency: &str, timezone: &str) -> Result<User> {
        validate_user_id(user_id)?;
        validate_settings(currency, timezone)?;

        let conn = self.conn()?;
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO users (id, currency, timezone, active, created_at) VALUES (?, ?, ?, 1, ?)",
            params![
                user_id,
                currency.to_uppercase(),
                timezone,
                format_datetime(Utc::now())
            ],
        )?;
        if inserted > 0 {
            tracing::info!(user_id, "Created user");
        }

        let user = conn.query_row(
            &format!("SELECT {} FROM users WHERE id = ?", USER_COLUMNS),
            params![user_id],
            row_to_user,
        )?;
        Ok(user)
    }

    /// Get a user by id
    pub fn get_user(&self, user_id: &str) -> Result<User> {
        let conn = self.conn()?;
        conn.query_row(
            &format!("SELECT {} FROM users WHERE id = ?", USER_COLUMNS),
            params![user_id],
            row_to_user,
        )
        .optional()?
        .ok_or_else(|| Error::NotFound(format!("user {}", user_id)))
    }

    /// Deactivate or reactivate a user. Users are never deleted.
    pub fn set_user_active(&self, user_id: &str, active: bool) -> Result<()> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE users SET active = ? WHERE id = ?",
            params![active, user_id],
        )?;
        if changed == 0 {
            return Err(Error::NotFound(format!("user {}", user_id)));
        }
        tracing::info!(user_id, active, "Updated user active flag");
        Ok(())
    }

    /// Deactivate a user; their data stays but signals are rejected
    pub fn deactivate_user(&self, user_id: &str) -> Result<()> {
        self.set_user_active(user_id, false)
    }

    /// Ids of every active user, for batch jobs such as reconciliation
    pub fn list_active_user_ids(&self) -> Result<Vec<String>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT id FROM users WHERE active = 1 ORDER BY id")?;
        let ids = stmt
            .query_map([], |row| row.get(0))?
            .collect::<std::result::Result<Vec<String>, _>>()?;
        Ok(ids)
    }
}
