//! Membership requests: join requests raised by users and invitations sent by organizers.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::event::{EventId, RequestId, UserId};

/// Prefix of identifiers synthesized locally before the authority assigns one.
pub const LOCAL_ID_PREFIX: &str = "local-";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestKind {
    Join,
    Invite,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Pending,
    Accepted,
    Rejected,
    /// Participant removed by the organizer after being accepted
    Removed,
}

/// A join request or invitation (server record, or a local stand-in for one)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MembershipRequest {
    pub id: RequestId,
    pub event_id: EventId,
    pub kind: RequestKind,
    /// Who acted: the joiner for `join`, the organizer for `invite`
    pub requester_id: UserId,
    /// Who the relationship is about: the joiner for `join`, the invitee for `invite`
    pub target_id: UserId,
    pub status: RequestStatus,
    pub created_at: DateTime<Utc>,
}

/// (event, subject) identity used for reconciliation instead of request ids.
pub type PairKey = (EventId, UserId);

impl MembershipRequest {
    /// Local stand-in for a join request that has not reached the authority yet.
    pub fn synthesize_join(event_id: &str, user_id: &str, status: RequestStatus) -> Self {
        MembershipRequest {
            id: local_id(),
            event_id: event_id.to_string(),
            kind: RequestKind::Join,
            requester_id: user_id.to_string(),
            target_id: user_id.to_string(),
            status,
            created_at: Utc::now(),
        }
    }

    /// Local stand-in for an invitation that has not reached the authority yet.
    pub fn synthesize_invite(event_id: &str, organizer_id: &str, invitee_id: &str) -> Self {
        MembershipRequest {
            id: local_id(),
            event_id: event_id.to_string(),
            kind: RequestKind::Invite,
            requester_id: organizer_id.to_string(),
            target_id: invitee_id.to_string(),
            status: RequestStatus::Pending,
            created_at: Utc::now(),
        }
    }

    /// The user this record is about.
    pub fn subject(&self) -> &str {
        match self.kind {
            RequestKind::Invite => &self.target_id,
            RequestKind::Join => &self.requester_id,
        }
    }

    pub fn pair(&self) -> PairKey {
        (self.event_id.clone(), self.subject().to_string())
    }

    pub fn is_pending(&self) -> bool {
        self.status == RequestStatus::Pending
    }

    pub fn is_local(&self) -> bool {
        self.id.starts_with(LOCAL_ID_PREFIX)
    }

    pub fn concerns(&self, event_id: &str, user_id: &str) -> bool {
        self.event_id == event_id && self.subject() == user_id
    }
}

fn local_id() -> RequestId {
    format!("{}{}", LOCAL_ID_PREFIX, uuid::Uuid::new_v4())
}

impl fmt::Display for RequestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestKind::Join => write!(f, "join"),
            RequestKind::Invite => write!(f, "invite"),
        }
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestStatus::Pending => write!(f, "pending"),
            RequestStatus::Accepted => write!(f, "accepted"),
            RequestStatus::Rejected => write!(f, "rejected"),
            RequestStatus::Removed => write!(f, "removed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subject_follows_kind() {
        let join = MembershipRequest::synthesize_join("e1", "alice", RequestStatus::Pending);
        assert_eq!(join.subject(), "alice");
        assert!(join.is_local());

        let invite = MembershipRequest::synthesize_invite("e1", "org", "bob");
        assert_eq!(invite.subject(), "bob");
        assert_eq!(invite.pair(), ("e1".to_string(), "bob".to_string()));
        assert!(invite.concerns("e1", "bob"));
        assert!(!invite.concerns("e1", "org"));
    }

    #[test]
    fn test_server_join_with_organizer_target_keeps_joiner_subject() {
        let json = r#"{
            "id": "r1",
            "event_id": "e1",
            "kind": "join",
            "requester_id": "alice",
            "target_id": "org",
            "status": "pending",
            "created_at": "2024-01-01T10:00:00Z"
        }"#;
        let request: MembershipRequest = serde_json::from_str(json).unwrap();
        assert_eq!(request.subject(), "alice");
        assert!(!request.is_local());
    }
}
