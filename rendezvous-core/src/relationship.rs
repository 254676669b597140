//! Relationship classification for a (user, event) pair.
//!
//! The relationship is never stored. It is derived from the event record and
//! whatever membership requests are known, with a fixed priority order where
//! the first match wins:
//!
//! 1. `Invited`: a pending invitation targets the user
//! 2. `Organizer`
//! 3. `Accepted`: in the participant snapshot, or an accepted request
//! 4. `Waiting`: a pending join raised by the user
//! 5. `Removed`: removed by the organizer after being accepted
//! 6. `Rejected`: a request about the user was declined
//! 7. `NonMember`
//!
//! Invitations come first because they carry the organizer's current intent,
//! which stale join history must not hide.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::event::Event;
use crate::request::{MembershipRequest, RequestKind, RequestStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Relationship {
    Organizer,
    Invited,
    Accepted,
    Waiting,
    Removed,
    Rejected,
    NonMember,
}

impl Relationship {
    /// Relationships from which the organizer may (re-)invite the user.
    pub fn is_invitable(self) -> bool {
        matches!(
            self,
            Relationship::NonMember | Relationship::Rejected | Relationship::Removed
        )
    }

    pub fn is_member(self) -> bool {
        matches!(self, Relationship::Organizer | Relationship::Accepted)
    }
}

/// Classify `user_id` against `event`, using any requests known for it.
///
/// Requests for other events are ignored, so callers may pass the whole cache.
pub fn classify<'a>(
    event: &Event,
    user_id: &str,
    requests: impl IntoIterator<Item = &'a MembershipRequest>,
) -> Relationship {
    let mut invited = false;
    let mut accepted = false;
    let mut waiting = false;
    let mut removed = false;
    let mut rejected = false;

    for request in requests {
        if request.event_id != event.id {
            continue;
        }
        let about_user = request.subject() == user_id;
        match (request.kind, request.status) {
            (RequestKind::Invite, RequestStatus::Pending) if request.target_id == user_id => {
                invited = true
            }
            (RequestKind::Join, RequestStatus::Pending) if request.requester_id == user_id => {
                waiting = true
            }
            (_, RequestStatus::Accepted) if about_user => accepted = true,
            (_, RequestStatus::Removed) if about_user => removed = true,
            (_, RequestStatus::Rejected) if about_user => rejected = true,
            _ => {}
        }
    }

    // A removal outranks a participant snapshot that has not caught up yet.
    let in_snapshot = event.participants.iter().any(|p| p == user_id) && !removed;

    if invited {
        Relationship::Invited
    } else if event.is_organizer(user_id) {
        Relationship::Organizer
    } else if accepted || in_snapshot {
        Relationship::Accepted
    } else if waiting {
        Relationship::Waiting
    } else if removed {
        Relationship::Removed
    } else if rejected {
        Relationship::Rejected
    } else {
        Relationship::NonMember
    }
}

impl fmt::Display for Relationship {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Relationship::Organizer => "organizer",
            Relationship::Invited => "invited",
            Relationship::Accepted => "accepted",
            Relationship::Waiting => "waiting",
            Relationship::Removed => "removed",
            Relationship::Rejected => "rejected",
            Relationship::NonMember => "non-member",
        };
        write!(f, "{}", label)
    }
}
