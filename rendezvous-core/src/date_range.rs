//! Bounded date windows for occurrence enumeration.

use chrono::{Duration, Months, NaiveDate};

use crate::error::{EngineError, EngineResult};

/// Longest window a caller may enumerate (roughly ten years).
pub const MAX_WINDOW_DAYS: i64 = 3660;

/// Inclusive range of calendar dates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub from: NaiveDate,
    pub to: NaiveDate,
}

impl DateRange {
    pub fn new(from: NaiveDate, to: NaiveDate) -> EngineResult<Self> {
        if from > to {
            return Err(EngineError::InvalidRange(format!(
                "{} is after {}",
                from, to
            )));
        }
        if (to - from).num_days() > MAX_WINDOW_DAYS {
            return Err(EngineError::InvalidRange(format!(
                "window of {} days exceeds the {} day limit",
                (to - from).num_days(),
                MAX_WINDOW_DAYS
            )));
        }
        Ok(DateRange { from, to })
    }

    /// ±`months` around `today`.
    pub fn around(today: NaiveDate, months: u32) -> Self {
        let from = today
            .checked_sub_months(Months::new(months))
            .unwrap_or(NaiveDate::MIN);
        let to = today
            .checked_add_months(Months::new(months))
            .unwrap_or(NaiveDate::MAX);
        DateRange { from, to }
    }

    /// Parse optional YYYY-MM-DD bounds, defaulting to ±`months` around `today`.
    pub fn from_args(
        from: Option<&str>,
        to: Option<&str>,
        today: NaiveDate,
        months: u32,
    ) -> EngineResult<Self> {
        let default = Self::around(today, months);
        let from = match from {
            Some(s) => parse_date(s)?,
            None => default.from,
        };
        let to = match to {
            Some(s) => parse_date(s)?,
            None => default.to,
        };
        Self::new(from, to)
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.from && date <= self.to
    }

    /// Every date in the range, ascending.
    pub fn days(&self) -> impl Iterator<Item = NaiveDate> + '_ {
        let len = (self.to - self.from).num_days() + 1;
        (0..len.max(0)).map(move |offset| self.from + Duration::days(offset))
    }
}

fn parse_date(s: &str) -> EngineResult<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|_| {
        EngineError::InvalidRange(format!("Invalid date format '{}'. Expected YYYY-MM-DD", s))
    })
}
