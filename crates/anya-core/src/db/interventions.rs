//! Intervention event operations

use chrono::{DateTime, Duration, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::{format_datetime, get_datetime, get_opt_datetime, Database};
use crate::error::{Error, Result};
use crate::models::{
    Category, InterventionEvent, InterventionOutcome, InterventionSummary, NewInterventionEvent,
    Verdict,
};

/// A persisted event and whether de-duplication downgraded it
#[derive(Debug, Clone)]
pub struct RecordedIntervention {
    pub event: InterventionEvent,
    /// An earlier event with the same key fired inside the window
    pub duplicate: bool,
}

const EVENT_COLUMNS: &str = "id, user_id, created_at, merchant, url, amount, category, verdict, \
                             impact_ratio, message, outcome, dedupe_key, resolved_at";

fn row_to_event(row: &Row<'_>) -> rusqlite::Result<InterventionEvent> {
    let category: String = row.get(6)?;
    let verdict: String = row.get(7)?;
    let outcome: String = row.get(10)?;

    Ok(InterventionEvent {
        id: row.get(0)?,
        user_id: row.get(1)?,
        created_at: get_datetime(row, 2)?,
        merchant: row.get(3)?,
        url: row.get(4)?,
        amount: row.get(5)?,
        category: category.parse().unwrap_or(Category::Uncategorized),
        verdict: verdict.parse().unwrap_or(Verdict::Silent),
        impact_ratio: row.get(8)?,
        message: row.get(9)?,
        outcome: outcome.parse().unwrap_or(InterventionOutcome::Suppressed),
        dedupe_key: row.get(11)?,
        resolved_at: get_opt_datetime(row, 12)?,
    })
}

fn fetch_event(conn: &Connection, id: i64) -> Result<InterventionEvent> {
    conn.query_row(
        &format!("SELECT {} FROM intervention_events WHERE id = ?", EVENT_COLUMNS),
        params![id],
        row_to_event,
    )
    .optional()?
    .ok_or_else(|| Error::NotFound(format!("intervention {}", id)))
}

impl Database {
    /// Persist an intervention decision, de-duplicating atomically.
    ///
    /// If an event with the same user and dedupe key fired (outcome other than
    /// `suppressed`) within `window` before this one, the new event is stored
    /// with outcome `suppressed`. The lookup and insert share one immediate
    /// transaction, so concurrent identical signals fire at most once.
    pub fn record_intervention(
        &self,
        new: &NewInterventionEvent,
        window: Duration,
    ) -> Result<RecordedIntervention> {
        let recorded = self.write_tx(|conn| {
            let since = new.created_at - window;
            let prior: Option<i64> = conn
                .query_row(
                    r#"
                    SELECT id FROM intervention_events
                    WHERE user_id = ? AND dedupe_key = ?
                      AND outcome != 'suppressed'
                      AND created_at > ? AND created_at <= ?
                    ORDER BY created_at DESC
                    LIMIT 1
                    "#,
                    params![
                        new.user_id,
                        new.dedupe_key,
                        format_datetime(since),
                        format_datetime(new.created_at)
                    ],
                    |row| row.get(0),
                )
                .optional()?;

            let duplicate = prior.is_some();
            let outcome = if duplicate {
                InterventionOutcome::Suppressed
            } else {
                new.outcome
            };

            conn.execute(
                r#"
                INSERT INTO intervention_events (user_id, created_at, merchant, url, amount, category,
                    verdict, impact_ratio, message, outcome, dedupe_key)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
                params![
                    new.user_id,
                    format_datetime(new.created_at),
                    new.merchant,
                    new.url,
                    new.amount,
                    new.category.as_str(),
                    new.verdict.as_str(),
                    new.impact_ratio,
                    new.message,
                    outcome.as_str(),
                    new.dedupe_key,
                ],
            )?;
            let event = fetch_event(conn, conn.last_insert_rowid())?;
            Ok(RecordedIntervention { event, duplicate })
        })?;

        tracing::info!(
            user_id = %new.user_id,
            id = recorded.event.id,
            verdict = %recorded.event.verdict,
            outcome = %recorded.event.outcome,
            duplicate = recorded.duplicate,
            "Recorded intervention"
        );
        Ok(recorded)
    }

    pub fn get_intervention(&self, id: i64) -> Result<InterventionEvent> {
        let conn = self.conn()?;
        fetch_event(&conn, id)
    }

    /// Events for a user, newest first
    pub fn list_interventions(&self, user_id: &str, limit: i64) -> Result<Vec<InterventionEvent>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM intervention_events WHERE user_id = ? ORDER BY created_at DESC, id DESC LIMIT ?",
            EVENT_COLUMNS
        ))?;
        let events = stmt
            .query_map(params![user_id, limit], row_to_event)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(events)
    }

    /// Move a `sent` event to a follow-up outcome. Returns false if it was no longer `sent`.
    pub fn resolve_intervention(
        &self,
        id: i64,
        outcome: InterventionOutcome,
        at: DateTime<Utc>,
    ) -> Result<bool> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE intervention_events SET outcome = ?, resolved_at = ? WHERE id = ? AND outcome = 'sent'",
            params![outcome.as_str(), format_datetime(at), id],
        )?;
        Ok(changed > 0)
    }

    /// The user dismissed a delivered nudge. Dismissing twice is a no-op.
    pub fn dismiss_intervention(&self, id: i64, at: DateTime<Utc>) -> Result<InterventionEvent> {
        let event = self.write_tx(|conn| {
            let event = fetch_event(conn, id)?;
            match event.outcome {
                InterventionOutcome::Sent => {
                    conn.execute(
                        "UPDATE intervention_events SET outcome = 'user-dismissed', resolved_at = ? WHERE id = ?",
                        params![format_datetime(at), id],
                    )?;
                    fetch_event(conn, id)
                }
                InterventionOutcome::UserDismissed => Ok(event),
                other => Err(Error::InvalidInput(format!(
                    "intervention {} was {} and cannot be dismissed",
                    id, other
                ))),
            }
        })?;
        tracing::info!(id, user_id = %event.user_id, "Intervention dismissed");
        Ok(event)
    }

    /// `sent` events created before `cutoff`, oldest first
    pub fn sent_interventions_before(
        &self,
        user_id: &str,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<InterventionEvent>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM intervention_events WHERE user_id = ? AND outcome = 'sent' AND created_at < ? ORDER BY created_at, id",
            EVENT_COLUMNS
        ))?;
        let events = stmt
            .query_map(params![user_id, format_datetime(cutoff)], row_to_event)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(events)
    }

    /// Outcome counts for the dashboard
    pub fn intervention_summary(&self, user_id: &str) -> Result<InterventionSummary> {
        let conn = self.conn()?;
        let summary = conn.query_row(
            r#"
            SELECT
                COUNT(*),
                COALESCE(SUM(outcome = 'sent'), 0),
                COALESCE(SUM(outcome = 'suppressed'), 0),
                COALESCE(SUM(outcome = 'user-dismissed'), 0),
                COALESCE(SUM(outcome = 'user-abandoned-cart'), 0),
                COALESCE(SUM(CASE WHEN outcome = 'user-abandoned-cart' THEN amount ELSE 0 END), 0)
            FROM intervention_events
            WHERE user_id = ?
            "#,
            params![user_id],
            |row| {
                Ok(InterventionSummary {
                    total: row.get(0)?,
                    sent: row.get(1)?,
                    suppressed: row.get(2)?,
                    dismissed: row.get(3)?,
                    abandoned: row.get(4)?,
                    abandoned_amount: row.get(5)?,
                })
            },
        )?;
        Ok(summary)
    }
}
