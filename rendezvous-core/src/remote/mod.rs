pub mod protocol;
pub mod reauth;

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::RemoteError;
use crate::event::{Event, EventDraft, UserId};
use crate::request::MembershipRequest;
use crate::remote::protocol::{InviteParams, RequestScope};

pub type RemoteResult<T> = Result<T, RemoteError>;

/// The remote authority that owns events and membership requests.
///
/// Every call is made on behalf of one authenticated identity. Implementations
/// classify failures into [`RemoteError`] so the engine can tell benign races
/// from transient and fatal outcomes.
#[async_trait]
pub trait Authority: Send + Sync {
    /// Who the calls are made as.
    fn identity(&self) -> &str;

    async fn list_events(&self) -> RemoteResult<Vec<Event>>;

    async fn list_requests(&self, scope: RequestScope) -> RemoteResult<Vec<MembershipRequest>>;

    async fn fetch_event(&self, event_id: &str) -> RemoteResult<Event>;

    async fn fetch_event_requests(&self, event_id: &str) -> RemoteResult<Vec<MembershipRequest>>;

    async fn create_event(&self, draft: &EventDraft) -> RemoteResult<Event>;

    async fn delete_event(&self, event_id: &str) -> RemoteResult<()>;

    /// Ask to join; the authority answers with the stored request, which may
    /// already be accepted when the organizer auto-accepts.
    async fn join(&self, event_id: &str) -> RemoteResult<MembershipRequest>;

    async fn invite(&self, event_id: &str, params: &InviteParams) -> RemoteResult<MembershipRequest>;

    async fn respond_invitation(
        &self,
        request_id: &str,
        accept: bool,
    ) -> RemoteResult<MembershipRequest>;

    async fn decide_join(
        &self,
        event_id: &str,
        request_id: &str,
        accept: bool,
    ) -> RemoteResult<MembershipRequest>;

    async fn cancel_request(&self, event_id: &str, request_id: &str) -> RemoteResult<()>;

    async fn cancel_participation(&self, event_id: &str) -> RemoteResult<()>;
}

/// Creates the group conversation that accompanies an event's membership.
#[async_trait]
pub trait ChannelService: Send + Sync {
    async fn ensure_channel(&self, event_id: &str, member_id: &UserId) -> RemoteResult<()>;
}

#[async_trait]
impl<T: Authority + ?Sized> Authority for Arc<T> {
    fn identity(&self) -> &str {
        (**self).identity()
    }

    async fn list_events(&self) -> RemoteResult<Vec<Event>> {
        (**self).list_events().await
    }

    async fn list_requests(&self, scope: RequestScope) -> RemoteResult<Vec<MembershipRequest>> {
        (**self).list_requests(scope).await
    }

    async fn fetch_event(&self, event_id: &str) -> RemoteResult<Event> {
        (**self).fetch_event(event_id).await
    }

    async fn fetch_event_requests(&self, event_id: &str) -> RemoteResult<Vec<MembershipRequest>> {
        (**self).fetch_event_requests(event_id).await
    }

    async fn create_event(&self, draft: &EventDraft) -> RemoteResult<Event> {
        (**self).create_event(draft).await
    }

    async fn delete_event(&self, event_id: &str) -> RemoteResult<()> {
        (**self).delete_event(event_id).await
    }

    async fn join(&self, event_id: &str) -> RemoteResult<MembershipRequest> {
        (**self).join(event_id).await
    }

    async fn invite(&self, event_id: &str, params: &InviteParams) -> RemoteResult<MembershipRequest> {
        (**self).invite(event_id, params).await
    }

    async fn respond_invitation(
        &self,
        request_id: &str,
        accept: bool,
    ) -> RemoteResult<MembershipRequest> {
        (**self).respond_invitation(request_id, accept).await
    }

    async fn decide_join(
        &self,
        event_id: &str,
        request_id: &str,
        accept: bool,
    ) -> RemoteResult<MembershipRequest> {
        (**self).decide_join(event_id, request_id, accept).await
    }

    async fn cancel_request(&self, event_id: &str, request_id: &str) -> RemoteResult<()> {
        (**self).cancel_request(event_id, request_id).await
    }

    async fn cancel_participation(&self, event_id: &str) -> RemoteResult<()> {
        (**self).cancel_participation(event_id).await
    }
}

/// Channel service that does nothing, for sessions without chat.
pub struct NoChannels;

#[async_trait]
impl ChannelService for NoChannels {
    async fn ensure_channel(&self, _event_id: &str, _member_id: &UserId) -> RemoteResult<()> {
        Ok(())
    }
}
