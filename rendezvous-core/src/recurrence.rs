//! Recurrence evaluation for repeating events.
//!
//! A rule never materializes occurrences on its own: callers ask whether a
//! single date occurs, or enumerate a bounded [`DateRange`]. Daily, weekly and
//! monthly rules repeat forever, so unbounded enumeration is not offered.

use std::collections::{BTreeSet, HashSet};

use chrono::{Datelike, Duration, NaiveDate, NaiveTime, Weekday};
use serde::{Deserialize, Serialize};

use crate::date_range::DateRange;

/// A recurrence rule anchored to its start date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecurrenceRule {
    /// Anchor date; no occurrence happens before it (custom dates excepted)
    pub start: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<NaiveTime>,
    #[serde(flatten)]
    pub kind: RecurrenceKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RecurrenceKind {
    Daily,
    Weekly {
        /// Encoded as day numbers, 0 = Sunday
        #[serde(with = "weekday_set")]
        days: HashSet<Weekday>,
    },
    Monthly {
        day: u32,
    },
    CustomDates {
        dates: BTreeSet<NaiveDate>,
    },
}

/// Whether `kind`, anchored at `anchor`, produces an occurrence on `candidate`.
pub fn occurs_on(kind: &RecurrenceKind, anchor: NaiveDate, candidate: NaiveDate) -> bool {
    match kind {
        RecurrenceKind::Daily => candidate >= anchor,
        RecurrenceKind::Weekly { days } => candidate >= anchor && days.contains(&candidate.weekday()),
        RecurrenceKind::Monthly { day } => candidate >= anchor && candidate.day() == *day,
        RecurrenceKind::CustomDates { dates } => dates.contains(&candidate),
    }
}

impl RecurrenceRule {
    pub fn occurs_on(&self, candidate: NaiveDate) -> bool {
        occurs_on(&self.kind, self.start, candidate)
    }

    /// Every occurrence date inside `range`, ascending.
    pub fn occurrences(&self, range: &DateRange) -> Vec<NaiveDate> {
        if range.from > range.to {
            return Vec::new();
        }
        match &self.kind {
            RecurrenceKind::CustomDates { dates } => dates
                .range(range.from..=range.to)
                .copied()
                .collect(),
            _ => range.days().filter(|d| self.occurs_on(*d)).collect(),
        }
    }

    /// Whether the rule admits any occurrence on or after `today`.
    ///
    /// This is not "does today have an occurrence": daily, weekly and monthly
    /// rules recur indefinitely, custom dates only until the last listed date.
    pub fn has_upcoming(&self, today: NaiveDate) -> bool {
        match &self.kind {
            RecurrenceKind::Daily => true,
            RecurrenceKind::Weekly { days } => !days.is_empty(),
            RecurrenceKind::Monthly { day } => (1..=31).contains(day),
            RecurrenceKind::CustomDates { dates } => dates.range(today..).next().is_some(),
        }
    }

    /// First occurrence on or after `today`, looking at most `horizon_days` ahead.
    pub fn next_occurrence(&self, today: NaiveDate, horizon_days: u32) -> Option<NaiveDate> {
        if let RecurrenceKind::CustomDates { dates } = &self.kind {
            return dates.range(today..).next().copied();
        }
        let from = today.max(self.start);
        let range = DateRange {
            from,
            to: from + Duration::days(i64::from(horizon_days)),
        };
        range.days().find(|d| self.occurs_on(*d))
    }

    pub fn validate(&self) -> Result<(), String> {
        match &self.kind {
            RecurrenceKind::Daily => Ok(()),
            RecurrenceKind::Weekly { days } if days.is_empty() => {
                Err("weekly rule needs at least one weekday".into())
            }
            RecurrenceKind::Weekly { .. } => Ok(()),
            RecurrenceKind::Monthly { day } if !(1..=31).contains(day) => {
                Err(format!("day of month must be 1-31, got {}", day))
            }
            RecurrenceKind::Monthly { .. } => Ok(()),
            RecurrenceKind::CustomDates { dates } if dates.is_empty() => {
                Err("custom-dates rule needs at least one date".into())
            }
            RecurrenceKind::CustomDates { .. } => Ok(()),
        }
    }
}

/// Serialize a weekday set as day numbers with 0 = Sunday.
mod weekday_set {
    use std::collections::HashSet;

    use chrono::Weekday;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(days: &HashSet<Weekday>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut numbers: Vec<u8> = days
            .iter()
            .map(|d| d.num_days_from_sunday() as u8)
            .collect();
        numbers.sort_unstable();
        serializer.collect_seq(numbers)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<HashSet<Weekday>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let numbers: Vec<u8> = Vec::deserialize(deserializer)?;
        numbers
            .into_iter()
            .map(|n| match n {
                0 => Ok(Weekday::Sun),
                1 => Ok(Weekday::Mon),
                2 => Ok(Weekday::Tue),
                3 => Ok(Weekday::Wed),
                4 => Ok(Weekday::Thu),
                5 => Ok(Weekday::Fri),
                6 => Ok(Weekday::Sat),
                n => Err(serde::de::Error::custom(format!(
                    "weekday must be 0-6 (0 = Sunday), got {}",
                    n
                ))),
            })
            .collect()
    }
}
