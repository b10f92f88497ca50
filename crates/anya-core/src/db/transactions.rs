//! Transaction ledger operations
//!
//! Rows are never updated or deleted (triggers enforce it). A correction is a
//! new row with the opposite amount and `corrects_id` pointing at the
//! original, optionally followed by a replacement entry.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::{format_datetime, get_datetime, Database};
use crate::error::{Error, Result};
use crate::models::{Category, NewTransaction, Transaction, TransactionSource};

/// Result of inserting a transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionInsertResult {
    /// Transaction was inserted successfully, contains new transaction ID
    Inserted(i64),
    /// Same dedupe hash already logged, contains existing transaction ID
    Duplicate(i64),
}

impl TransactionInsertResult {
    pub fn id(&self) -> i64 {
        match self {
            Self::Inserted(id) | Self::Duplicate(id) => *id,
        }
    }

    pub fn is_duplicate(&self) -> bool {
        matches!(self, Self::Duplicate(_))
    }
}

/// Ids written by a correction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Correction {
    pub offset_id: i64,
    pub replacement_id: Option<i64>,
}

const TX_COLUMNS: &str = "id, user_id, amount, category, merchant, description, occurred_at, \
                          source, goal_id, corrects_id, dedupe_hash, created_at, is_essential";

fn row_to_transaction(row: &Row<'_>) -> rusqlite::Result<Transaction> {
    let category: String = row.get(3)?;
    let source: String = row.get(7)?;

    Ok(Transaction {
        id: row.get(0)?,
        user_id: row.get(1)?,
        amount: row.get(2)?,
        category: category.parse().unwrap_or(Category::Uncategorized),
        merchant: row.get(4)?,
        description: row.get(5)?,
        occurred_at: get_datetime(row, 6)?,
        source: source.parse().unwrap_or_default(),
        goal_id: row.get(8)?,
        corrects_id: row.get(9)?,
        dedupe_hash: row.get(10)?,
        created_at: get_datetime(row, 11)?,
        is_essential: row.get(12)?,
    })
}

fn insert_row(conn: &Connection, tx: &NewTransaction, corrects_id: Option<i64>) -> Result<i64> {
    conn.execute(
        r#"
        INSERT INTO transactions (user_id, amount, category, merchant, description, occurred_at,
                                  source, goal_id, corrects_id, dedupe_hash, created_at,
                                  is_essential)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
        params![
            tx.user_id,
            tx.amount,
            tx.category.as_str(),
            tx.merchant,
            tx.description,
            format_datetime(tx.occurred_at),
            tx.source.as_str(),
            tx.goal_id,
            corrects_id,
            tx.dedupe_hash,
            format_datetime(Utc::now()),
            tx.is_essential,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

fn fetch(conn: &Connection, id: i64) -> Result<Transaction> {
    conn.query_row(
        &format!("SELECT {} FROM transactions WHERE id = ?", TX_COLUMNS),
        params![id],
        row_to_transaction,
    )
    .optional()?
    .ok_or_else(|| Error::NotFound(format!("transaction {}", id)))
}

impl Database {
    /// Append a transaction (skips duplicates based on dedupe_hash)
    pub fn insert_transaction(&self, tx: &NewTransaction) -> Result<TransactionInsertResult> {
        if tx.amount == 0 {
            return Err(Error::InvalidInput("transaction amount must not be zero".into()));
        }

        let result = self.write_tx(|conn| {
            if let Some(ref hash) = tx.dedupe_hash {
                let existing: Option<i64> = conn
                    .query_row(
                        "SELECT id FROM transactions WHERE dedupe_hash = ?",
                        params![hash],
                        |row| row.get(0),
                    )
                    .optional()?;
                if let Some(existing_id) = existing {
                    return Ok(TransactionInsertResult::Duplicate(existing_id));
                }
            }

            Ok(TransactionInsertResult::Inserted(insert_row(conn, tx, None)?))
        })?;

        match result {
            TransactionInsertResult::Inserted(id) => tracing::info!(
                user_id = %tx.user_id,
                id,
                amount = tx.amount,
                category = %tx.category,
                "Logged transaction"
            ),
            TransactionInsertResult::Duplicate(id) => {
                tracing::debug!(user_id = %tx.user_id, id, "Skipped duplicate transaction")
            }
        }
        Ok(result)
    }

    /// Get a transaction by id
    pub fn get_transaction(&self, id: i64) -> Result<Transaction> {
        let conn = self.conn()?;
        fetch(&conn, id)
    }

    /// Most recent transactions for a user, newest first
    pub fn list_transactions(&self, user_id: &str, limit: i64) -> Result<Vec<Transaction>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM transactions WHERE user_id = ? ORDER BY occurred_at DESC, id DESC LIMIT ?",
            TX_COLUMNS
        ))?;
        let rows = stmt
            .query_map(params![user_id, limit], row_to_transaction)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Categories of the user's recent spend, most recent first.
    ///
    /// Contributions, offsets, corrected entries and uncategorized spend are
    /// skipped so they do not bias the interpreter's history fallback.
    pub fn recent_categories(&self, user_id: &str, limit: usize) -> Result<Vec<Category>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT t.category FROM transactions t
            WHERE t.user_id = ?
              AND t.goal_id IS NULL
              AND t.corrects_id IS NULL
              AND t.amount > 0
              AND t.category NOT IN ('savings', 'uncategorized')
              AND NOT EXISTS (SELECT 1 FROM transactions c WHERE c.corrects_id = t.id)
            ORDER BY t.occurred_at DESC, t.id DESC
            LIMIT ?
            "#,
        )?;
        let categories = stmt
            .query_map(params![user_id, limit as i64], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?
            .into_iter()
            .filter_map(|c| c.parse().ok())
            .collect();
        Ok(categories)
    }

    /// Net spend in `[start, end)`, optionally for one category.
    ///
    /// Goal contributions never count as spend. Offsets are included, so a
    /// corrected purchase nets to zero in the window it was logged in.
    pub fn sum_spend(
        &self,
        user_id: &str,
        category: Option<&Category>,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<i64> {
        let conn = self.conn()?;
        let total: i64 = conn.query_row(
            r#"
            SELECT COALESCE(SUM(amount), 0) FROM transactions
            WHERE user_id = ?1
              AND goal_id IS NULL
              AND category != 'savings'
              AND (?2 IS NULL OR category = ?2)
              AND occurred_at >= ?3 AND occurred_at < ?4
            "#,
            params![
                user_id,
                category.map(|c| c.as_str()),
                format_datetime(start),
                format_datetime(end)
            ],
            |row| row.get(0),
        )?;
        Ok(total)
    }

    /// Net non-essential spend in `[start, end)`, contributions excluded
    pub fn sum_nonessential_spend(
        &self,
        user_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<i64> {
        let conn = self.conn()?;
        let total: i64 = conn.query_row(
            r#"
            SELECT COALESCE(SUM(amount), 0) FROM transactions
            WHERE user_id = ?1
              AND goal_id IS NULL
              AND category != 'savings'
              AND is_essential = 0
              AND occurred_at >= ?2 AND occurred_at < ?3
            "#,
            params![user_id, format_datetime(start), format_datetime(end)],
            |row| row.get(0),
        )?;
        Ok(total)
    }

    /// Offset a transaction and optionally log a replacement, atomically.
    ///
    /// Returns `Conflict` if the transaction was already corrected and
    /// `InvalidInput` when asked to correct an offset entry.
    pub fn correct_transaction(
        &self,
        user_id: &str,
        id: i64,
        replacement: Option<&NewTransaction>,
    ) -> Result<Correction> {
        let correction = self.write_tx(|conn| {
            let original = fetch(conn, id)?;
            if original.user_id != user_id {
                return Err(Error::NotFound(format!("transaction {}", id)));
            }
            if original.corrects_id.is_some() {
                return Err(Error::InvalidInput(format!(
                    "transaction {} is itself a correction",
                    id
                )));
            }
            let already: Option<i64> = conn
                .query_row(
                    "SELECT id FROM transactions WHERE corrects_id = ? LIMIT 1",
                    params![id],
                    |row| row.get(0),
                )
                .optional()?;
            if already.is_some() {
                return Err(Error::Conflict(format!(
                    "transaction {} was already corrected",
                    id
                )));
            }

            let offset = NewTransaction {
                user_id: original.user_id.clone(),
                amount: -original.amount,
                category: original.category.clone(),
                merchant: original.merchant.clone(),
                description: Some(format!("correction of #{}", id)),
                occurred_at: original.occurred_at,
                source: original.source,
                goal_id: original.goal_id,
                dedupe_hash: None,
                is_essential: original.is_essential,
            };
            let offset_id = insert_row(conn, &offset, Some(id))?;

            let replacement_id = match replacement {
                Some(r) if r.amount != 0 => Some(insert_row(conn, r, None)?),
                Some(_) => {
                    return Err(Error::InvalidInput(
                        "replacement amount must not be zero".into(),
                    ))
                }
                None => None,
            };

            Ok(Correction {
                offset_id,
                replacement_id,
            })
        })?;

        tracing::info!(user_id, id, offset_id = correction.offset_id, "Corrected transaction");
        Ok(correction)
    }

    /// The newest chat-logged entry that has not been corrected yet (for `/undo`)
    pub fn last_correctable_chat_transaction(&self, user_id: &str) -> Result<Option<Transaction>> {
        let conn = self.conn()?;
        let tx = conn
            .query_row(
                &format!(
                    r#"
                    SELECT {} FROM transactions t
                    WHERE t.user_id = ?
                      AND t.source = ?
                      AND t.corrects_id IS NULL
                      AND NOT EXISTS (SELECT 1 FROM transactions c WHERE c.corrects_id = t.id)
                    ORDER BY t.id DESC
                    LIMIT 1
                    "#,
                    TX_COLUMNS
                ),
                params![user_id, TransactionSource::Chat.as_str()],
                row_to_transaction,
            )
            .optional()?;
        Ok(tx)
    }

    /// Whether a purchase at `merchant` was logged at or after `since`
    pub fn has_purchase_at_merchant_since(
        &self,
        user_id: &str,
        merchant: &str,
        since: DateTime<Utc>,
    ) -> Result<bool> {
        let conn = self.conn()?;
        let found: Option<i64> = conn
            .query_row(
                r#"
                SELECT id FROM transactions
                WHERE user_id = ?
                  AND goal_id IS NULL
                  AND amount > 0
                  AND merchant IS NOT NULL
                  AND lower(merchant) = lower(?)
                  AND occurred_at >= ?
                LIMIT 1
                "#,
                params![user_id, merchant, format_datetime(since)],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }
}
