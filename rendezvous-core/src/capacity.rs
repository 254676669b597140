//! Accepted-participant aggregation for capacity checks.
//!
//! No single source is complete: the event's participant snapshot, accepted
//! requests and profile-level rosters are each written by different paths.
//! They are unioned at read time instead.

use std::collections::BTreeSet;

use crate::event::{Event, UserId};
use crate::request::{MembershipRequest, RequestStatus};

/// Deduplicated union of every source that marks a user as accepted for `event`.
pub fn accepted_participants<'a>(
    event: &Event,
    requests: impl IntoIterator<Item = &'a MembershipRequest>,
    roster: impl IntoIterator<Item = &'a UserId>,
) -> BTreeSet<UserId> {
    let mut accepted: BTreeSet<UserId> = event.participants.iter().cloned().collect();

    accepted.extend(
        requests
            .into_iter()
            .filter(|r| r.event_id == event.id && r.status == RequestStatus::Accepted)
            .map(|r| r.subject().to_string()),
    );

    accepted.extend(roster.into_iter().cloned());
    accepted
}

pub fn is_full(event: &Event, accepted: &BTreeSet<UserId>) -> bool {
    accepted.len() >= event.max_participants as usize
}
