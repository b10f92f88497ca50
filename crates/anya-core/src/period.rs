//! Calendar-aligned periods in a user's timezone
//!
//! Budget windows are never rolling: a weekly window runs Monday 00:00 to the
//! next Monday 00:00 local time, a monthly window from the 1st to the 1st.
//! Windows are half-open `[start, end)` so an instant on a boundary belongs
//! to exactly one period.

use chrono::{
    DateTime, Datelike, Duration, LocalResult, Months, NaiveDate, NaiveTime, TimeZone, Utc,
};
use chrono_tz::Tz;
use serde::Serialize;

use crate::models::BudgetPeriod;

/// Default timezone for users who never set one
pub const DEFAULT_TZ: Tz = chrono_tz::Asia::Kolkata;

/// Converts a UTC instant to the calendar date the user sees.
pub fn local_date(instant: DateTime<Utc>, tz: Tz) -> NaiveDate {
    instant.with_timezone(&tz).date_naive()
}

/// The UTC instant at which `date` begins in `tz`.
///
/// When local midnight does not exist (a DST jump at 00:00) the day starts at
/// the first valid instant after it.
pub fn start_of_day(date: NaiveDate, tz: Tz) -> DateTime<Utc> {
    let naive = date.and_time(NaiveTime::MIN);
    match tz.from_local_datetime(&naive) {
        LocalResult::Single(dt) => dt.with_timezone(&Utc),
        LocalResult::Ambiguous(earliest, _) => earliest.with_timezone(&Utc),
        LocalResult::None => tz
            .from_local_datetime(&(naive + Duration::hours(1)))
            .earliest()
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|| naive.and_utc()),
    }
}

/// A half-open window of time aligned to a calendar period
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PeriodWindow {
    pub period: BudgetPeriod,
    /// First local date in the window
    pub start_date: NaiveDate,
    /// First local date after the window
    pub end_date: NaiveDate,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl PeriodWindow {
    /// The window of `period` that contains `instant` in the user's timezone
    pub fn containing(period: BudgetPeriod, instant: DateTime<Utc>, tz: Tz) -> Self {
        let today = local_date(instant, tz);
        let (start_date, end_date) = match period {
            BudgetPeriod::Weekly => {
                let start = today - Duration::days(today.weekday().num_days_from_monday() as i64);
                (start, start + Duration::days(7))
            }
            BudgetPeriod::Monthly => {
                let start = first_of_month(today);
                let end = start
                    .checked_add_months(Months::new(1))
                    .unwrap_or(NaiveDate::MAX);
                (start, end)
            }
        };

        Self {
            period,
            start_date,
            end_date,
            start: start_of_day(start_date, tz),
            end: start_of_day(end_date, tz),
        }
    }

    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        self.start <= instant && instant < self.end
    }
}

/// First day of the month containing `date`
pub fn first_of_month(date: NaiveDate) -> NaiveDate {
    date.with_day(1).unwrap_or(date)
}

/// Largest `n >= 0` such that `from + n months <= to`.
///
/// Month addition clamps to the end of shorter months, so Jan 31 + 1 month
/// is Feb 28/29.
pub fn whole_months_between(from: NaiveDate, to: NaiveDate) -> u32 {
    if to <= from {
        return 0;
    }
    let mut months = (to.year() - from.year()) * 12 + to.month() as i32 - from.month() as i32;
    while months > 0 {
        match from.checked_add_months(Months::new(months as u32)) {
            Some(candidate) if candidate <= to => break,
            _ => months -= 1,
        }
    }
    months.max(0) as u32
}
