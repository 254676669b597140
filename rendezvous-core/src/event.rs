//! Event records as held in the local cache.
//!
//! Events are owned by the remote authority. The engine keeps a cached copy,
//! and everything it shows about an event (relationship, capacity, occurrences)
//! is derived from these fields on demand.

use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};
use crate::recurrence::RecurrenceRule;

pub type EventId = String;
pub type UserId = String;
pub type RequestId = String;

/// An event (server record)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    pub organizer_id: UserId,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    pub schedule: Schedule,
    pub max_participants: u32,

    // Denormalized snapshot of accepted participants. Display only: capacity
    // checks go through the capacity aggregator instead.
    #[serde(default)]
    pub participants: Vec<UserId>,
    #[serde(default)]
    pub participant_count: u32,

    #[serde(default)]
    pub visibility: Visibility,
    /// Users named by the `*_excluded` visibility policies
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub excluded_users: Vec<UserId>,

    pub created_at: DateTime<Utc>,
}

/// Exactly one scheduling mode is active per event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum Schedule {
    Once {
        date: NaiveDate,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        time: Option<NaiveTime>,
    },
    Recurring(RecurrenceRule),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    #[default]
    All,
    FriendsOnly,
    AllExceptFriends,
    AllExceptExcluded,
    OnlyMe,
    MeAndExcluded,
}

impl Schedule {
    pub fn occurs_on(&self, date: NaiveDate) -> bool {
        match self {
            Schedule::Once { date: d, .. } => *d == date,
            Schedule::Recurring(rule) => rule.occurs_on(date),
        }
    }

    /// Whether anything happens on or after `today`.
    pub fn is_upcoming(&self, today: NaiveDate) -> bool {
        match self {
            Schedule::Once { date, .. } => *date >= today,
            Schedule::Recurring(rule) => rule.has_upcoming(today),
        }
    }

    pub fn time(&self) -> Option<NaiveTime> {
        match self {
            Schedule::Once { time, .. } => *time,
            Schedule::Recurring(rule) => rule.time,
        }
    }

    pub fn validate(&self) -> EngineResult<()> {
        match self {
            Schedule::Once { .. } => Ok(()),
            Schedule::Recurring(rule) => rule.validate().map_err(EngineError::InvalidSchedule),
        }
    }
}

impl Event {
    pub fn is_organizer(&self, user_id: &str) -> bool {
        self.organizer_id == user_id
    }

    /// Past events are the ones the authority may stop returning; the cache keeps them for history.
    pub fn is_past(&self, today: NaiveDate) -> bool {
        !self.schedule.is_upcoming(today)
    }

    /// Date used to order events in listings: the event date, or the next
    /// occurrence within `horizon_days` for recurring events.
    pub fn next_date(&self, today: NaiveDate, horizon_days: u32) -> Option<NaiveDate> {
        match &self.schedule {
            Schedule::Once { date, .. } => Some(*date),
            Schedule::Recurring(rule) => rule.next_occurrence(today, horizon_days),
        }
    }

    /// Record `user_id` as accepted in the display snapshot. Returns false if already present.
    pub(crate) fn add_participant(&mut self, user_id: &str) -> bool {
        if self.participants.iter().any(|p| p == user_id) {
            return false;
        }
        self.participants.push(user_id.to_string());
        self.participant_count = self.participant_count.saturating_add(1);
        true
    }

    pub(crate) fn remove_participant(&mut self, user_id: &str) -> bool {
        let before = self.participants.len();
        self.participants.retain(|p| p != user_id);
        if self.participants.len() == before {
            return false;
        }
        self.participant_count = self.participant_count.saturating_sub(1);
        true
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.title)
    }
}

/// Organizer input for creating an event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventDraft {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    pub schedule: Schedule,
    pub max_participants: u32,
    #[serde(default)]
    pub visibility: Visibility,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub excluded_users: Vec<UserId>,
}

impl EventDraft {
    pub fn validate(&self) -> EngineResult<()> {
        if self.title.trim().is_empty() {
            return Err(EngineError::InvalidSchedule("title must not be empty".into()));
        }
        self.schedule.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recurrence::RecurrenceKind;
    use std::collections::BTreeSet;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_schedule_json_shape() {
        let json = r#"{
            "mode": "recurring",
            "start": "2024-01-01",
            "kind": "weekly",
            "days": [1, 3]
        }"#;
        let schedule: Schedule = serde_json::from_str(json).unwrap();
        let Schedule::Recurring(rule) = &schedule else {
            panic!("expected recurring schedule");
        };
        assert_eq!(rule.start, date(2024, 1, 1));
        assert!(matches!(rule.kind, RecurrenceKind::Weekly { .. }));
        assert!(schedule.occurs_on(date(2024, 1, 3)));

        let once: Schedule =
            serde_json::from_str(r#"{"mode":"once","date":"2024-05-01","time":"18:30:00"}"#)
                .unwrap();
        assert_eq!(once.time(), NaiveTime::from_hms_opt(18, 30, 0));
    }

    #[test]
    fn test_empty_custom_dates_is_past() {
        let schedule = Schedule::Recurring(RecurrenceRule {
            start: date(2024, 1, 1),
            time: None,
            kind: RecurrenceKind::CustomDates {
                dates: BTreeSet::new(),
            },
        });
        assert!(!schedule.is_upcoming(date(2020, 1, 1)));
        assert!(schedule.validate().is_err());
    }

    #[test]
    fn test_participant_snapshot_counts() {
        let mut event = Event {
            id: "e1".into(),
            organizer_id: "org".into(),
            title: "Climbing".into(),
            description: None,
            location: None,
            schedule: Schedule::Once {
                date: date(2024, 3, 1),
                time: None,
            },
            max_participants: 4,
            participants: vec![],
            participant_count: 0,
            visibility: Visibility::All,
            excluded_users: vec![],
            created_at: Utc::now(),
        };

        assert!(event.add_participant("a"));
        assert!(!event.add_participant("a"));
        assert_eq!(event.participant_count, 1);
        assert!(event.remove_participant("a"));
        assert!(!event.remove_participant("a"));
        assert_eq!(event.participant_count, 0);
        assert!(event.is_past(date(2024, 3, 2)));
        assert!(!event.is_past(date(2024, 3, 1)));
    }
}
