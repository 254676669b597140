//! Request/response shapes exchanged with the remote authority.
//!
//! Transports map each [`Route`] onto their own wire format; the engine only
//! relies on the operation and the classified outcome.

use serde::{Deserialize, Serialize};

use crate::event::{Event, EventId, RequestId, UserId};
use crate::request::MembershipRequest;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    Get,
    Post,
    Patch,
    Delete,
}

/// Method and path of one authority operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub method: Method,
    pub path: String,
}

impl Route {
    fn new(method: Method, path: String) -> Self {
        Route { method, path }
    }

    pub fn list_events() -> Self {
        Self::new(Method::Get, "events".into())
    }

    pub fn fetch_event(event_id: &str) -> Self {
        Self::new(Method::Get, format!("events/{}", event_id))
    }

    pub fn create_event() -> Self {
        Self::new(Method::Post, "events".into())
    }

    pub fn delete_event(event_id: &str) -> Self {
        Self::new(Method::Delete, format!("events/{}", event_id))
    }

    pub fn list_requests(scope: RequestScope) -> Self {
        Self::new(Method::Get, format!("requests?kind={}", scope.as_str()))
    }

    pub fn event_requests(event_id: &str) -> Self {
        Self::new(Method::Get, format!("events/{}/requests", event_id))
    }

    pub fn join(event_id: &str) -> Self {
        Self::new(Method::Post, format!("events/{}/join", event_id))
    }

    pub fn invite(event_id: &str) -> Self {
        Self::new(Method::Post, format!("events/{}/invite", event_id))
    }

    pub fn respond_invitation(request_id: &str, accept: bool) -> Self {
        let verb = if accept { "accept" } else { "reject" };
        Self::new(
            Method::Post,
            format!("events/invitations/{}/{}", request_id, verb),
        )
    }

    pub fn decide_join(event_id: &str, request_id: &str, accept: bool) -> Self {
        Self::new(
            Method::Patch,
            format!("events/{}/requests/{}?accept={}", event_id, request_id, accept),
        )
    }

    pub fn cancel_request(event_id: &str, request_id: &str) -> Self {
        Self::new(
            Method::Delete,
            format!("events/{}/requests/{}", event_id, request_id),
        )
    }

    pub fn cancel_participation(event_id: &str) -> Self {
        Self::new(Method::Delete, format!("events/{}/participation", event_id))
    }

    pub fn ensure_channel(event_id: &str) -> Self {
        Self::new(Method::Post, format!("events/{}/channel", event_id))
    }
}

/// Which requests a bulk fetch covers, from the current identity's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestScope {
    /// Invitations addressed to me
    Incoming,
    /// Invitations I sent as organizer
    Outgoing,
    /// Join requests I raised, or raised on events I organize
    Join,
}

impl RequestScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestScope::Incoming => "incoming",
            RequestScope::Outgoing => "outgoing",
            RequestScope::Join => "join",
        }
    }
}

/// Body of an invitation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InviteParams {
    pub invitee_id: UserId,
    /// Client-generated; the authority deduplicates retried invitations on it
    pub idempotency_key: String,
}

/// Body of a channel-ensure call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelParams {
    pub member_id: UserId,
}

/// Change notification delivered over the push channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PushEvent {
    EventCreated {
        event_id: EventId,
        #[serde(default)]
        event: Option<Event>,
    },
    EventUpdated {
        event_id: EventId,
        #[serde(default)]
        event: Option<Event>,
    },
    EventDeleted {
        event_id: EventId,
    },
    RequestCreated {
        request_id: RequestId,
        event_id: EventId,
        subject_id: UserId,
        #[serde(default)]
        request: Option<MembershipRequest>,
    },
    RequestUpdated {
        request_id: RequestId,
        event_id: EventId,
        subject_id: UserId,
        #[serde(default)]
        request: Option<MembershipRequest>,
    },
    RequestDeleted {
        request_id: RequestId,
        event_id: EventId,
        subject_id: UserId,
    },
}

impl PushEvent {
    pub fn event_id(&self) -> &str {
        match self {
            PushEvent::EventCreated { event_id, .. }
            | PushEvent::EventUpdated { event_id, .. }
            | PushEvent::EventDeleted { event_id }
            | PushEvent::RequestCreated { event_id, .. }
            | PushEvent::RequestUpdated { event_id, .. }
            | PushEvent::RequestDeleted { event_id, .. } => event_id,
        }
    }
}
