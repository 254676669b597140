//! Optimistic membership mutations.
//!
//! Every entry point validates against the current snapshot, applies its local
//! change through the store, and returns once that change is visible. The
//! remote call runs on a spawned task; its result is reported through the
//! returned [`Completion`].
//!
//! Responses are reconciled by (event, subject) rather than by request id.
//! Each mutation takes a sequence number for its pair, and a response whose
//! number is no longer current is dropped so it cannot overwrite the result
//! of a newer local action.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::oneshot;

use crate::error::{EngineError, EngineResult, RemoteError};
use crate::event::{Event, EventDraft, UserId};
use crate::profile::ProfilePatch;
use crate::relationship::Relationship;
use crate::remote::protocol::InviteParams;
use crate::remote::{Authority, ChannelService};
use crate::request::{MembershipRequest, PairKey, RequestKind, RequestStatus};
use crate::store::{ActionKind, State, Store};
use crate::sync::Synchronizer;

/// What a mutation's remote call ended up doing to the cache.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// The authority's record replaced the optimistic one
    Applied(MembershipRequest),
    /// The record is gone locally and on the authority
    Removed,
    /// The authority was already in the intended state; the event's requests were re-fetched
    Resynced,
    /// Nothing to do; no remote call was made
    Unchanged,
    /// A later local action on the same pair took over
    Superseded,
}

/// Completion signal for the remote half of a mutation.
pub struct Completion {
    rx: oneshot::Receiver<EngineResult<Outcome>>,
}

impl Completion {
    /// A completion that resolves immediately.
    pub fn ready(outcome: Outcome) -> Self {
        let (tx, rx) = oneshot::channel();
        let _ = tx.send(Ok(outcome));
        Completion { rx }
    }

    pub async fn wait(self) -> EngineResult<Outcome> {
        self.rx.await.unwrap_or(Err(EngineError::Dropped))
    }
}

enum Failure {
    Benign,
    NotFound,
    Transient(RemoteError),
    Fatal(RemoteError),
}

impl From<RemoteError> for Failure {
    fn from(e: RemoteError) -> Self {
        if e.is_benign_race() {
            Failure::Benign
        } else if e.is_not_found() {
            Failure::NotFound
        } else if e.is_transient() {
            Failure::Transient(e)
        } else {
            Failure::Fatal(e)
        }
    }
}

struct Inner<A> {
    sync: Synchronizer<A>,
    channels: Arc<dyn ChannelService>,
}

pub struct Reconciler<A> {
    inner: Arc<Inner<A>>,
}

impl<A> Clone for Reconciler<A> {
    fn clone(&self) -> Self {
        Reconciler {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<A: Authority + 'static> Reconciler<A> {
    pub fn new(sync: Synchronizer<A>, channels: Arc<dyn ChannelService>) -> Self {
        Reconciler {
            inner: Arc::new(Inner { sync, channels }),
        }
    }

    fn store(&self) -> &Store {
        self.inner.sync.store()
    }

    fn authority(&self) -> &A {
        self.inner.sync.authority()
    }

    fn identity(&self) -> &str {
        self.authority().identity()
    }

    fn ensure_self(&self, user_id: &str, what: &str) -> EngineResult<()> {
        if user_id != self.identity() {
            return Err(EngineError::NotPermitted(format!(
                "cannot {} on behalf of '{}'",
                what, user_id
            )));
        }
        Ok(())
    }

    fn spawn<F>(&self, work: F) -> Completion
    where
        F: Future<Output = EngineResult<Outcome>> + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        tokio::spawn(async move {
            let _ = tx.send(work.await);
        });
        Completion { rx }
    }

    /// Finish the action `seq` on `pair` and run `f` under the same lock,
    /// telling it whether `seq` was still the latest action on the pair.
    fn settle<R>(&self, pair: &PairKey, seq: u64, f: impl FnOnce(&mut State, bool) -> R) -> R {
        self.store().apply(|state| {
            let current = state.is_current(pair, seq);
            state.finish_action(pair, seq);
            f(state, current)
        })
    }

    fn cancelled_locally(&self, pair: &PairKey) -> bool {
        self.store().snapshot().current_action(pair) == Some(ActionKind::CancelRequest)
    }

    /// Undo a join the authority recorded after the user cancelled it locally.
    /// Without a record in hand, the event's requests are looked up first.
    async fn withdraw_join(&self, event_id: &str, record: Option<MembershipRequest>) {
        let me = self.identity();
        let record = match record {
            Some(record) => record,
            None => match self.authority().fetch_event_requests(event_id).await {
                Ok(records) => {
                    let found = records.into_iter().find(|r| {
                        r.kind == RequestKind::Join
                            && r.requester_id == me
                            && matches!(r.status, RequestStatus::Pending | RequestStatus::Accepted)
                    });
                    let Some(found) = found else {
                        return;
                    };
                    found
                }
                Err(e) => {
                    tracing::warn!(event_id, error = %e, "Could not look up superseded join");
                    return;
                }
            },
        };

        tracing::debug!(event_id, request_id = %record.id, "Withdrawing superseded join");
        let result = if record.status == RequestStatus::Accepted {
            self.authority().cancel_participation(event_id).await
        } else {
            self.authority().cancel_request(event_id, &record.id).await
        };
        if let Err(e) = result {
            tracing::warn!(event_id, error = %e, "Could not withdraw superseded join");
        }
    }

    async fn resync(&self, event_id: &str) -> EngineResult<Outcome> {
        match self.inner.sync.resync_event_requests(event_id).await {
            Ok(_) => Ok(Outcome::Resynced),
            Err(e) if e.is_soft() => Err(e),
            Err(e) => {
                tracing::warn!(event_id, error = %e, "Resync after benign race failed");
                Ok(Outcome::Resynced)
            }
        }
    }

    fn ensure_channel(&self, event_id: &str, member_id: &str) {
        let channels = Arc::clone(&self.inner.channels);
        let config = self.inner.sync.config();
        let attempts = config.channel_retry_attempts.max(1);
        let delay = config.channel_retry_delay();
        let event_id = event_id.to_string();
        let member_id: UserId = member_id.to_string();

        tokio::spawn(async move {
            for attempt in 1..=attempts {
                match channels.ensure_channel(&event_id, &member_id).await {
                    Ok(()) => return,
                    Err(e) if attempt < attempts => {
                        tracing::debug!(%event_id, attempt, error = %e, "Channel setup failed, retrying");
                        tokio::time::sleep(delay).await;
                    }
                    Err(e) => {
                        tracing::warn!(%event_id, %member_id, error = %e, "Giving up on channel setup");
                    }
                }
            }
        });
    }

    fn record_membership(&self, record: &MembershipRequest) {
        if record.status == RequestStatus::Accepted && record.subject() == self.identity() {
            let me = self.identity().to_string();
            self.store().apply(|state| {
                if state.profiles.contains_key(&me) {
                    state.patch_profile(&me, &ProfilePatch::joined(&record.event_id));
                }
            });
        }
    }

    // JOIN:

    /// Ask to join `event_id` as `user_id`, which must be the session identity.
    ///
    /// Does nothing if a request for the pair is already pending. A local
    /// stand-in left behind by a transient failure is re-sent, whether it is
    /// pending or was optimistically accepted.
    pub fn request_join(&self, event_id: &str, user_id: &str) -> EngineResult<Completion> {
        self.ensure_self(user_id, "join")?;
        let pair: PairKey = (event_id.to_string(), user_id.to_string());

        let seq = self.store().apply(|state| -> EngineResult<Option<u64>> {
            let relationship = state
                .relationship(event_id, user_id)
                .ok_or_else(|| EngineError::EventNotFound(event_id.to_string()))?;

            let leftover = state
                .requests_for(event_id)
                .any(|r| r.kind == RequestKind::Join && r.is_local() && r.subject() == user_id);
            if leftover {
                if state.is_in_flight(&pair) {
                    return Ok(None);
                }
                tracing::debug!(event_id, "Re-sending join left over from a failed attempt");
                return Ok(Some(state.begin_action(pair.clone(), ActionKind::Join)));
            }

            if relationship.is_member() || state.pending_for(event_id, user_id).is_some() {
                return Ok(None);
            }

            let auto_accept = state.organizer_auto_accepts(event_id)
                && !state.is_full(event_id).unwrap_or(true);
            let status = if auto_accept {
                RequestStatus::Accepted
            } else {
                RequestStatus::Pending
            };
            state.insert_request(MembershipRequest::synthesize_join(event_id, user_id, status));
            Ok(Some(state.begin_action(pair.clone(), ActionKind::Join)))
        })?;

        let Some(seq) = seq else {
            return Ok(Completion::ready(Outcome::Unchanged));
        };

        let this = self.clone();
        Ok(self.spawn(async move { this.finish_join(pair, seq).await }))
    }

    async fn finish_join(&self, pair: PairKey, seq: u64) -> EngineResult<Outcome> {
        let (event_id, _) = &pair;
        let record = match self.authority().join(event_id).await {
            Ok(record) => record,
            Err(e) => return self.join_failed(&pair, seq, Failure::from(e)).await,
        };

        let current = self.settle(&pair, seq, |state, current| {
            if current {
                state.apply_server_request(record.clone());
            }
            current
        });
        if !current {
            if self.cancelled_locally(&pair) {
                self.withdraw_join(event_id, Some(record)).await;
            }
            return Ok(Outcome::Superseded);
        }

        if record.status == RequestStatus::Accepted {
            self.record_membership(&record);
            self.ensure_channel(event_id, record.subject());
        }
        Ok(Outcome::Applied(record))
    }

    async fn join_failed(&self, pair: &PairKey, seq: u64, failure: Failure) -> EngineResult<Outcome> {
        let event_id = pair.0.as_str();
        let refused = matches!(failure, Failure::Fatal(_));
        let current = self.settle(pair, seq, |state, current| {
            if current && refused {
                state.remove_synthesized(pair, RequestKind::Join);
            }
            current
        });

        match failure {
            Failure::Benign if current => {
                tracing::warn!(event_id, "Join already recorded by the authority");
                self.resync(event_id).await
            }
            Failure::Benign => {
                // A resync here would bring back the request the user just cancelled.
                if self.cancelled_locally(pair) {
                    self.withdraw_join(event_id, None).await;
                }
                Ok(Outcome::Superseded)
            }
            Failure::Transient(e) => {
                tracing::warn!(event_id, error = %e, "Join not confirmed, keeping local request");
                Err(e.into())
            }
            Failure::NotFound => {
                self.store().apply(|state| state.remove_event(event_id));
                Err(EngineError::Stale(format!("event '{}'", event_id)))
            }
            Failure::Fatal(e) => {
                if current {
                    tracing::warn!(event_id, error = %e, "Join refused, rolled back");
                }
                Err(e.into())
            }
        }
    }

    // INVITE:

    /// Invite `to_user` to `event_id`. `from_user` must be the session identity
    /// and the event's organizer; the invitee must not be a member, invited or waiting.
    pub fn invite(&self, event_id: &str, from_user: &str, to_user: &str) -> EngineResult<Completion> {
        self.ensure_self(from_user, "invite")?;
        let pair: PairKey = (event_id.to_string(), to_user.to_string());

        let (seq, token) = self.store().apply(|state| -> EngineResult<(u64, String)> {
            let event = state
                .event(event_id)
                .ok_or_else(|| EngineError::EventNotFound(event_id.to_string()))?;
            if !event.is_organizer(from_user) {
                return Err(EngineError::NotOrganizer(event_id.to_string()));
            }
            let relationship = state
                .relationship(event_id, to_user)
                .unwrap_or(Relationship::NonMember);
            if !relationship.is_invitable() || state.is_in_flight(&pair) {
                return Err(EngineError::InvalidTarget {
                    user: to_user.to_string(),
                    relationship,
                });
            }

            state.insert_request(MembershipRequest::synthesize_invite(event_id, from_user, to_user));
            let token = state.invite_token(&pair);
            Ok((state.begin_action(pair.clone(), ActionKind::Invite), token))
        })?;

        let this = self.clone();
        Ok(self.spawn(async move { this.finish_invite(pair, seq, token).await }))
    }

    async fn finish_invite(&self, pair: PairKey, seq: u64, token: String) -> EngineResult<Outcome> {
        let (event_id, invitee) = &pair;
        let params = InviteParams {
            invitee_id: invitee.clone(),
            idempotency_key: token,
        };
        let result = self.authority().invite(event_id, &params).await;

        match result {
            Ok(record) => {
                let current = self.settle(&pair, seq, |state, current| {
                    state.clear_invite_token(&pair);
                    if current {
                        state.apply_server_request(record.clone());
                    }
                    current
                });
                Ok(if current {
                    Outcome::Applied(record)
                } else {
                    Outcome::Superseded
                })
            }
            Err(e) => {
                let failure = Failure::from(e);
                self.settle(&pair, seq, |state, current| {
                    // Keep the token so a retry after a transient failure is deduplicated.
                    if !matches!(failure, Failure::Transient(_)) {
                        state.clear_invite_token(&pair);
                    }
                    if current && !matches!(failure, Failure::Benign) {
                        state.remove_synthesized(&pair, RequestKind::Invite);
                    }
                });
                match failure {
                    Failure::Benign => self.resync(event_id).await,
                    Failure::NotFound => {
                        self.store().apply(|state| state.remove_event(event_id));
                        Err(EngineError::Stale(format!("event '{}'", event_id)))
                    }
                    Failure::Transient(e) | Failure::Fatal(e) => {
                        tracing::warn!(event_id, %invitee, error = %e, "Invitation failed, rolled back");
                        Err(e.into())
                    }
                }
            }
        }
    }

    // RESPOND:

    /// Answer a request: the invitee answering an invitation, or the organizer
    /// deciding on a join request.
    pub fn respond(&self, request_id: &str, accept: bool) -> EngineResult<Completion> {
        let request = self
            .store()
            .snapshot()
            .request(request_id)
            .cloned()
            .ok_or_else(|| EngineError::RequestNotFound(request_id.to_string()))?;

        match request.kind {
            RequestKind::Invite if accept => self.accept_invitation(request_id),
            RequestKind::Invite => self.reject_invitation(request_id),
            RequestKind::Join => self.decide_join(request, accept),
        }
    }

    fn decide_join(&self, request: MembershipRequest, accept: bool) -> EngineResult<Completion> {
        let pair = request.pair();
        let event_id = request.event_id.clone();
        let subject = request.subject().to_string();
        let me = self.identity().to_string();

        let seq = self.store().apply(|state| -> EngineResult<Option<u64>> {
            let event = state
                .event(&event_id)
                .ok_or_else(|| EngineError::EventNotFound(event_id.clone()))?;
            if !event.is_organizer(&me) {
                return Err(EngineError::NotOrganizer(event_id.clone()));
            }
            let Some(cached) = state.request(&request.id) else {
                return Err(EngineError::RequestNotFound(request.id.clone()));
            };
            if !cached.is_pending() {
                return Ok(None);
            }
            if accept && state.is_full(&event_id).unwrap_or(false) {
                return Err(EngineError::EventFull(event_id.clone()));
            }

            let mut decided = cached.clone();
            decided.status = if accept {
                RequestStatus::Accepted
            } else {
                RequestStatus::Rejected
            };
            state.insert_request(decided);
            if accept {
                if let Some(event) = state.events.get_mut(&event_id) {
                    event.add_participant(&subject);
                }
            }
            Ok(Some(state.begin_action(pair.clone(), ActionKind::Decide)))
        })?;

        let Some(seq) = seq else {
            return Ok(Completion::ready(Outcome::Unchanged));
        };

        let this = self.clone();
        Ok(self.spawn(async move { this.finish_decide(request, accept, seq).await }))
    }

    async fn finish_decide(
        &self,
        previous: MembershipRequest,
        accept: bool,
        seq: u64,
    ) -> EngineResult<Outcome> {
        let pair = previous.pair();
        let event_id = previous.event_id.clone();
        let result = self
            .authority()
            .decide_join(&event_id, &previous.id, accept)
            .await;

        let record = match result {
            Ok(record) => record,
            Err(e) => return self.decide_failed(previous, accept, seq, Failure::from(e)).await,
        };
        let current = self.settle(&pair, seq, |state, current| {
            if current {
                state.apply_server_request(record.clone());
            }
            current
        });
        if !current {
            return Ok(Outcome::Superseded);
        }
        if record.status == RequestStatus::Accepted {
            self.ensure_channel(&event_id, record.subject());
        }
        Ok(Outcome::Applied(record))
    }

    async fn decide_failed(
        &self,
        previous: MembershipRequest,
        accept: bool,
        seq: u64,
        failure: Failure,
    ) -> EngineResult<Outcome> {
        let pair = previous.pair();
        let event_id = previous.event_id.clone();
        let restore = matches!(failure, Failure::Transient(_) | Failure::Fatal(_));
        let current = self.settle(&pair, seq, |state, current| {
            if current && restore {
                if accept {
                    if let Some(event) = state.events.get_mut(&event_id) {
                        event.remove_participant(previous.subject());
                    }
                }
                state.insert_request(previous.clone());
            }
            current
        });

        match failure {
            Failure::Benign => self.resync(&event_id).await,
            Failure::NotFound => {
                self.store().apply(|state| {
                    state.remove_request(&previous.id);
                    if accept {
                        if let Some(event) = state.events.get_mut(&event_id) {
                            event.remove_participant(previous.subject());
                        }
                    }
                });
                Err(EngineError::Stale(format!("request '{}'", previous.id)))
            }
            Failure::Transient(e) | Failure::Fatal(e) => {
                if current {
                    tracing::warn!(event_id, request_id = %previous.id, error = %e, "Decision failed, rolled back");
                }
                Err(e.into())
            }
        }
    }

    /// Accept an invitation addressed to the session identity.
    pub fn accept_invitation(&self, request_id: &str) -> EngineResult<Completion> {
        self.answer_invitation(request_id, true)
    }

    /// Reject an invitation addressed to the session identity. The cached
    /// invitation is removed entirely.
    pub fn reject_invitation(&self, request_id: &str) -> EngineResult<Completion> {
        self.answer_invitation(request_id, false)
    }

    fn answer_invitation(&self, request_id: &str, accept: bool) -> EngineResult<Completion> {
        let me = self.identity().to_string();

        let prepared = self.store().apply(|state| -> EngineResult<Option<(MembershipRequest, u64)>> {
            let invite = state
                .request(request_id)
                .cloned()
                .ok_or_else(|| EngineError::RequestNotFound(request_id.to_string()))?;
            if invite.kind != RequestKind::Invite || invite.target_id != me {
                return Err(EngineError::NotTarget(request_id.to_string()));
            }
            if !invite.is_pending() {
                return Ok(None);
            }
            if accept && state.is_full(&invite.event_id).unwrap_or(false) {
                return Err(EngineError::EventFull(invite.event_id.clone()));
            }

            if accept {
                let mut accepted = invite.clone();
                accepted.status = RequestStatus::Accepted;
                state.insert_request(accepted);
                if let Some(event) = state.events.get_mut(&invite.event_id) {
                    event.add_participant(&me);
                }
            } else {
                state.remove_request(request_id);
            }
            let seq = state.begin_action(invite.pair(), ActionKind::RespondInvitation);
            Ok(Some((invite, seq)))
        })?;

        let Some((invite, seq)) = prepared else {
            return Ok(Completion::ready(Outcome::Unchanged));
        };

        let this = self.clone();
        Ok(self.spawn(async move { this.finish_answer(invite, accept, seq).await }))
    }

    async fn finish_answer(
        &self,
        invite: MembershipRequest,
        accept: bool,
        seq: u64,
    ) -> EngineResult<Outcome> {
        let pair = invite.pair();
        let event_id = invite.event_id.clone();
        let result = self.authority().respond_invitation(&invite.id, accept).await;

        let record = match result {
            Ok(record) => record,
            Err(e) => return self.answer_failed(invite, accept, seq, Failure::from(e)).await,
        };
        let current = self.settle(&pair, seq, |state, current| {
            if current && accept {
                state.apply_server_request(record.clone());
            }
            current
        });
        if !current {
            return Ok(Outcome::Superseded);
        }
        if !accept {
            return Ok(Outcome::Removed);
        }
        self.record_membership(&record);
        self.ensure_channel(&event_id, &invite.target_id);
        Ok(Outcome::Applied(record))
    }

    async fn answer_failed(
        &self,
        invite: MembershipRequest,
        accept: bool,
        seq: u64,
        failure: Failure,
    ) -> EngineResult<Outcome> {
        let pair = invite.pair();
        let event_id = invite.event_id.clone();
        let restore = matches!(failure, Failure::Transient(_) | Failure::Fatal(_));
        let current = self.settle(&pair, seq, |state, current| {
            if current && restore {
                if accept {
                    if let Some(event) = state.events.get_mut(&event_id) {
                        event.remove_participant(&invite.target_id);
                    }
                }
                state.insert_request(invite.clone());
            }
            current
        });

        match failure {
            Failure::Benign => self.resync(&event_id).await,
            Failure::NotFound => {
                self.store().apply(|state| {
                    state.remove_request(&invite.id);
                    if accept {
                        if let Some(event) = state.events.get_mut(&event_id) {
                            event.remove_participant(&invite.target_id);
                        }
                    }
                });
                Err(EngineError::Stale(format!("invitation '{}'", invite.id)))
            }
            Failure::Transient(e) | Failure::Fatal(e) => {
                if current {
                    tracing::warn!(event_id, request_id = %invite.id, error = %e, "Answer failed, invitation restored");
                }
                Err(e.into())
            }
        }
    }

    // CANCEL:

    /// Withdraw the session identity's pending join request. The local record
    /// is removed whatever the authority answers.
    pub fn cancel_request(&self, event_id: &str, user_id: &str) -> EngineResult<Completion> {
        self.ensure_self(user_id, "cancel a request")?;
        let pair: PairKey = (event_id.to_string(), user_id.to_string());

        let removed = self.store().apply(|state| -> Option<(MembershipRequest, u64)> {
            let pending = state
                .requests_for(event_id)
                .find(|r| r.kind == RequestKind::Join && r.is_pending() && r.subject() == user_id)
                .cloned()?;
            state.remove_request(&pending.id);
            let seq = state.begin_action(pair.clone(), ActionKind::CancelRequest);
            if pending.is_local() {
                // Never reached the authority under this id; an in-flight join
                // withdraws itself once it sees this action.
                state.finish_action(&pair, seq);
            }
            Some((pending, seq))
        });

        let Some((pending, seq)) = removed else {
            return Ok(Completion::ready(Outcome::Unchanged));
        };
        if pending.is_local() {
            return Ok(Completion::ready(Outcome::Removed));
        }

        let this = self.clone();
        Ok(self.spawn(async move {
            let result = this
                .authority()
                .cancel_request(&pending.event_id, &pending.id)
                .await;
            this.settle(&pair, seq, |_, _| ());
            match result.map_err(Failure::from) {
                Ok(()) | Err(Failure::Benign) | Err(Failure::NotFound) => Ok(Outcome::Removed),
                Err(Failure::Transient(e)) | Err(Failure::Fatal(e)) => {
                    tracing::warn!(event_id = %pending.event_id, error = %e, "Cancel not confirmed by the authority");
                    Err(e.into())
                }
            }
        }))
    }

    /// Leave an event the session identity participates in.
    pub fn cancel_participation(&self, event_id: &str, user_id: &str) -> EngineResult<Completion> {
        self.ensure_self(user_id, "leave")?;
        let pair: PairKey = (event_id.to_string(), user_id.to_string());

        let (removed, seq) = self.store().apply(|state| -> EngineResult<(Vec<MembershipRequest>, u64)> {
            let relationship = state
                .relationship(event_id, user_id)
                .ok_or_else(|| EngineError::EventNotFound(event_id.to_string()))?;
            if relationship != Relationship::Accepted {
                return Err(EngineError::NotParticipant {
                    event_id: event_id.to_string(),
                    user: user_id.to_string(),
                });
            }

            let removed: Vec<MembershipRequest> = state
                .requests_for(event_id)
                .filter(|r| r.subject() == user_id && r.status == RequestStatus::Accepted)
                .cloned()
                .collect();
            for record in &removed {
                state.remove_request(&record.id);
            }
            if let Some(event) = state.events.get_mut(event_id) {
                event.remove_participant(user_id);
            }
            if state.profiles.contains_key(user_id) {
                state.patch_profile(user_id, &ProfilePatch::left(event_id));
            }
            Ok((removed, state.begin_action(pair.clone(), ActionKind::CancelParticipation)))
        })?;

        let this = self.clone();
        Ok(self.spawn(async move {
            let result = this
                .authority()
                .cancel_participation(&pair.0)
                .await
                .map_err(Failure::from);
            let refused = matches!(result, Err(Failure::Fatal(_)));
            let current = this.settle(&pair, seq, |state, current| {
                if current && refused {
                    for record in removed {
                        state.insert_request(record);
                    }
                    if let Some(event) = state.events.get_mut(&pair.0) {
                        event.add_participant(&pair.1);
                    }
                    if state.profiles.contains_key(&pair.1) {
                        state.patch_profile(&pair.1, &ProfilePatch::joined(&pair.0));
                    }
                }
                current
            });
            match result {
                Ok(()) | Err(Failure::Benign) | Err(Failure::NotFound) => Ok(Outcome::Removed),
                Err(Failure::Transient(e)) => Err(e.into()),
                Err(Failure::Fatal(e)) => {
                    if current {
                        tracing::warn!(event_id = %pair.0, error = %e, "Leave refused, membership restored");
                    }
                    Err(e.into())
                }
            }
        }))
    }

    // EVENTS:

    /// Create an event; it is cached once the authority returns it.
    pub async fn create_event(&self, draft: &EventDraft) -> EngineResult<Event> {
        draft.validate()?;
        let event = self.authority().create_event(draft).await?;
        tracing::info!(event_id = %event.id, "Created event");
        self.store().apply(|state| state.upsert_event(event.clone()));
        Ok(event)
    }

    /// Cancel an event the session identity organizes and purge it locally.
    pub async fn cancel_event(&self, event_id: &str) -> EngineResult<()> {
        let snapshot = self.store().snapshot();
        let event = snapshot
            .event(event_id)
            .ok_or_else(|| EngineError::EventNotFound(event_id.to_string()))?;
        if !event.is_organizer(self.identity()) {
            return Err(EngineError::NotOrganizer(event_id.to_string()));
        }

        match self.authority().delete_event(event_id).await {
            Ok(()) => {}
            Err(e) if e.is_not_found() => {
                tracing::debug!(event_id, "Event already gone from the authority");
            }
            Err(e) => return Err(e.into()),
        }
        self.store().apply(|state| state.remove_event(event_id));
        Ok(())
    }
}
