//! TUI rendering traits for rendezvous types.
//!
//! Extension traits that add colored terminal rendering to rendezvous-core
//! types using owo_colors.

use chrono::NaiveDate;
use owo_colors::OwoColorize;
use rendezvous_core::{
    Event, MembershipRequest, Outcome, RecurrenceKind, Relationship, RequestKind, RequestStatus,
    Schedule, SourceOutcome, SyncReport,
};

pub trait Render {
    fn render(&self) -> String;
}

impl Render for Relationship {
    fn render(&self) -> String {
        let label = format!("[{}]", self);
        match self {
            Relationship::Organizer => label.cyan().to_string(),
            Relationship::Accepted => label.green().to_string(),
            Relationship::Invited | Relationship::Waiting => label.yellow().to_string(),
            Relationship::Removed | Relationship::Rejected => label.red().to_string(),
            Relationship::NonMember => label.dimmed().to_string(),
        }
    }
}

impl Render for Schedule {
    fn render(&self) -> String {
        match self {
            Schedule::Once { date, time } => match time {
                Some(t) => format!("{} {}", date, t.format("%H:%M")),
                None => date.to_string(),
            },
            Schedule::Recurring(rule) => {
                let every = match &rule.kind {
                    RecurrenceKind::Daily => "daily".to_string(),
                    RecurrenceKind::Weekly { days } => {
                        let mut days: Vec<_> = days.iter().collect();
                        days.sort_by_key(|d| d.num_days_from_monday());
                        let names: Vec<_> = days.iter().map(|d| d.to_string()).collect();
                        format!("weekly on {}", names.join(", "))
                    }
                    RecurrenceKind::Monthly { day } => format!("monthly on day {}", day),
                    RecurrenceKind::CustomDates { dates } => {
                        return format!("on {} chosen dates", dates.len());
                    }
                };
                format!("{} from {}", every, rule.start)
            }
        }
    }
}

impl Render for MembershipRequest {
    fn render(&self) -> String {
        let status = match self.status {
            RequestStatus::Pending => self.status.to_string().yellow().to_string(),
            RequestStatus::Accepted => self.status.to_string().green().to_string(),
            RequestStatus::Rejected | RequestStatus::Removed => {
                self.status.to_string().red().to_string()
            }
        };
        let what = match self.kind {
            RequestKind::Join => format!("{} asked to join", self.requester_id),
            RequestKind::Invite => format!("{} invited {}", self.requester_id, self.target_id),
        };
        let id = if self.is_local() {
            "(sending)".to_string()
        } else {
            self.id.clone()
        };

        format!("{} {} {}", what, status, id.dimmed())
    }
}

impl Render for Outcome {
    fn render(&self) -> String {
        match self {
            Outcome::Applied(request) => {
                format!("{} {}", "✓".green(), request.render())
            }
            Outcome::Removed => format!("{} Removed", "✓".green()),
            Outcome::Resynced => format!("{} Already done, refreshed", "✓".green()),
            Outcome::Unchanged => "Nothing to do".dimmed().to_string(),
            Outcome::Superseded => "Replaced by a later action".dimmed().to_string(),
        }
    }
}

/// One event line: title, schedule, capacity and the user's relationship.
pub fn render_event(event: &Event, relationship: Relationship, accepted: usize) -> String {
    let capacity = format!("{}/{}", accepted, event.max_participants);
    let capacity = if accepted as u32 >= event.max_participants {
        capacity.red().to_string()
    } else {
        capacity.dimmed().to_string()
    };

    format!(
        "{} {} {} {} {}",
        relationship.render(),
        event.title.bold(),
        event.schedule.render().dimmed(),
        capacity,
        event.id.dimmed()
    )
}

/// Format a date as a human-readable label (e.g. "Today", "Tomorrow", "Wed Feb 25")
pub fn format_date_label(date: NaiveDate, today: NaiveDate) -> String {
    match (date - today).num_days() {
        0 => "Today".to_string(),
        1 => "Tomorrow".to_string(),
        _ => date.format("%a %b %-d %Y").to_string(),
    }
}

impl Render for SyncReport {
    fn render(&self) -> String {
        let mut lines = Vec::new();

        lines.push(render_source("events", &self.events));
        for (scope, outcome) in &self.requests {
            lines.push(render_source(&format!("{} requests", scope.as_str()), outcome));
        }

        if self.is_unchanged() {
            lines.push(format!("\n{}", "No changes".dimmed()));
        } else {
            lines.push(format!(
                "\nEvents: {} created, {} updated, {} dropped, {} evicted",
                self.created, self.updated, self.dropped, self.evicted
            ));
        }
        if self.retained > 0 {
            lines.push(
                format!("Kept {} past {} no longer listed", self.retained, pluralize("event", self.retained))
                    .dimmed()
                    .to_string(),
            );
        }

        lines.join("\n")
    }
}

fn render_source(label: &str, outcome: &SourceOutcome) -> String {
    match outcome {
        SourceOutcome::Fetched(_) => format!("   {} {}: {}", "✓".green(), label, outcome),
        SourceOutcome::Failed(_) => format!("   {} {}: {}", "✗".red(), label, outcome.red()),
    }
}

fn pluralize(word: &str, count: usize) -> String {
    if count == 1 {
        word.to_string()
    } else {
        format!("{}s", word)
    }
}
