//! Canonical client-side state and its single mutation path.
//!
//! One [`Store`] exists per authenticated session. User mutations, bulk syncs
//! and push events all write through [`Store::apply`], which serializes them
//! behind one lock. Readers take [`Store::snapshot`], an `Arc` of the state as
//! of the last completed write.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::capacity;
use crate::event::{Event, EventId, RequestId, UserId};
use crate::profile::{Profile, ProfilePatch};
use crate::relationship::{self, Relationship};
use crate::request::{MembershipRequest, PairKey, RequestKind, RequestStatus};

/// What the latest local action on an (event, subject) pair was.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionKind {
    Join,
    Invite,
    Decide,
    RespondInvitation,
    CancelRequest,
    CancelParticipation,
}

#[derive(Debug, Clone, Copy)]
struct Action {
    seq: u64,
    kind: ActionKind,
    in_flight: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct State {
    #[serde(default)]
    pub events: BTreeMap<EventId, Event>,
    #[serde(default)]
    pub requests: BTreeMap<RequestId, MembershipRequest>,
    #[serde(default)]
    pub profiles: BTreeMap<UserId, Profile>,
    /// Retained past events absent from recent snapshots, keyed to when they went missing
    #[serde(default)]
    pub missing_since: BTreeMap<EventId, DateTime<Utc>>,
    #[serde(default)]
    pub last_sync: Option<DateTime<Utc>>,

    #[serde(skip)]
    actions: HashMap<PairKey, Action>,
    #[serde(skip)]
    next_seq: u64,
    #[serde(skip)]
    invite_tokens: HashMap<PairKey, String>,
}

impl State {
    // READS:

    pub fn event(&self, event_id: &str) -> Option<&Event> {
        self.events.get(event_id)
    }

    pub fn request(&self, request_id: &str) -> Option<&MembershipRequest> {
        self.requests.get(request_id)
    }

    pub fn requests_for<'a>(
        &'a self,
        event_id: &'a str,
    ) -> impl Iterator<Item = &'a MembershipRequest> + 'a {
        self.requests.values().filter(move |r| r.event_id == event_id)
    }

    /// The pending request (either kind) about `subject` for `event_id`, invitations first.
    pub fn pending_for<'a>(
        &'a self,
        event_id: &'a str,
        subject: &str,
    ) -> Option<&'a MembershipRequest> {
        let mut pending = self
            .requests_for(event_id)
            .filter(|r| r.is_pending() && r.subject() == subject);
        let first = pending.next()?;
        if first.kind == RequestKind::Invite {
            return Some(first);
        }
        Some(
            pending
                .find(|r| r.kind == RequestKind::Invite)
                .unwrap_or(first),
        )
    }

    /// Profile-level roster: users whose profile lists `event_id` as joined.
    pub fn roster(&self, event_id: &str) -> Vec<&UserId> {
        self.profiles
            .values()
            .filter(|p| p.joined_events.contains(event_id))
            .map(|p| &p.id)
            .collect()
    }

    pub fn relationship(&self, event_id: &str, user_id: &str) -> Option<Relationship> {
        let event = self.event(event_id)?;
        Some(relationship::classify(
            event,
            user_id,
            self.requests_for(event_id),
        ))
    }

    pub fn accepted_participants(&self, event_id: &str) -> Option<BTreeSet<UserId>> {
        let event = self.event(event_id)?;
        Some(capacity::accepted_participants(
            event,
            self.requests_for(event_id),
            self.roster(event_id),
        ))
    }

    pub fn is_full(&self, event_id: &str) -> Option<bool> {
        let event = self.event(event_id)?;
        let accepted = self.accepted_participants(event_id)?;
        Some(capacity::is_full(event, &accepted))
    }

    pub fn organizer_auto_accepts(&self, event_id: &str) -> bool {
        self.event(event_id)
            .and_then(|e| self.profiles.get(&e.organizer_id))
            .is_some_and(|p| p.auto_accept)
    }

    pub fn is_in_flight(&self, pair: &PairKey) -> bool {
        self.actions.get(pair).is_some_and(|a| a.in_flight)
    }

    pub fn in_flight_pairs(&self) -> HashSet<PairKey> {
        self.actions
            .iter()
            .filter(|(_, a)| a.in_flight)
            .map(|(pair, _)| pair.clone())
            .collect()
    }

    pub fn current_action(&self, pair: &PairKey) -> Option<ActionKind> {
        self.actions.get(pair).map(|a| a.kind)
    }

    // ACTION SEQUENCING:

    /// Start a local action on `pair`; any earlier action on it is superseded.
    pub(crate) fn begin_action(&mut self, pair: PairKey, kind: ActionKind) -> u64 {
        self.next_seq += 1;
        let seq = self.next_seq;
        self.actions.insert(
            pair,
            Action {
                seq,
                kind,
                in_flight: true,
            },
        );
        seq
    }

    pub(crate) fn is_current(&self, pair: &PairKey, seq: u64) -> bool {
        self.actions.get(pair).is_some_and(|a| a.seq == seq)
    }

    pub(crate) fn finish_action(&mut self, pair: &PairKey, seq: u64) {
        if let Some(action) = self.actions.get_mut(pair) {
            if action.seq == seq {
                action.in_flight = false;
            }
        }
    }

    /// Idempotency key for inviting the subject of `pair`, reused until cleared.
    pub(crate) fn invite_token(&mut self, pair: &PairKey) -> String {
        self.invite_tokens
            .entry(pair.clone())
            .or_insert_with(|| uuid::Uuid::new_v4().to_string())
            .clone()
    }

    pub(crate) fn clear_invite_token(&mut self, pair: &PairKey) {
        self.invite_tokens.remove(pair);
    }

    // WRITES:

    pub fn upsert_event(&mut self, event: Event) {
        self.missing_since.remove(&event.id);
        self.events.insert(event.id.clone(), event);
    }

    /// Remove an event together with every cached request for it.
    pub fn remove_event(&mut self, event_id: &str) -> Option<Event> {
        self.requests.retain(|_, r| r.event_id != event_id);
        self.missing_since.remove(event_id);
        self.events.remove(event_id)
    }

    pub fn insert_request(&mut self, request: MembershipRequest) {
        self.requests.insert(request.id.clone(), request);
    }

    pub fn remove_request(&mut self, request_id: &str) -> Option<MembershipRequest> {
        self.requests.remove(request_id)
    }

    /// Drop local stand-ins of `kind` for the (event, subject) pair.
    pub(crate) fn remove_synthesized(&mut self, pair: &PairKey, kind: RequestKind) {
        self.requests
            .retain(|_, r| !(r.is_local() && r.kind == kind && r.pair() == *pair));
    }

    /// Store a record confirmed by the authority, replacing any local stand-in
    /// for the same pair and keeping the participant snapshot in step.
    pub fn apply_server_request(&mut self, record: MembershipRequest) {
        let pair = record.pair();
        self.remove_synthesized(&pair, record.kind);

        if let Some(event) = self.events.get_mut(&record.event_id) {
            match record.status {
                RequestStatus::Accepted => {
                    event.add_participant(record.subject());
                }
                RequestStatus::Removed => {
                    event.remove_participant(record.subject());
                }
                RequestStatus::Pending | RequestStatus::Rejected => {}
            }
        }

        self.insert_request(record);
    }

    /// Replace every cached request for `event_id` with `records`, except for
    /// pairs that have a local action in flight.
    pub fn replace_requests_for_event(&mut self, event_id: &str, records: Vec<MembershipRequest>) {
        let in_flight = self.in_flight_pairs();
        self.requests
            .retain(|_, r| r.event_id != event_id || in_flight.contains(&r.pair()));
        for record in records {
            if record.event_id != event_id || in_flight.contains(&record.pair()) {
                continue;
            }
            self.apply_server_request(record);
        }
    }

    pub fn patch_profile(&mut self, user_id: &str, patch: &ProfilePatch) -> Profile {
        let current = self
            .profiles
            .get(user_id)
            .cloned()
            .unwrap_or_else(|| Profile::new(user_id));
        let next = current.patched(patch);
        self.profiles.insert(user_id.to_string(), next.clone());
        next
    }
}

/// Owner of the canonical [`State`] for one session.
pub struct Store {
    state: Mutex<Arc<State>>,
    revision: watch::Sender<u64>,
}

impl Store {
    pub fn new() -> Self {
        Self::from_state(State::default())
    }

    pub fn from_state(state: State) -> Self {
        let (revision, _) = watch::channel(0);
        Store {
            state: Mutex::new(Arc::new(state)),
            revision,
        }
    }

    /// Cheap, consistent view of the state as of the last completed write.
    pub fn snapshot(&self) -> Arc<State> {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Run `f` as the only writer and publish a new revision.
    pub fn apply<R>(&self, f: impl FnOnce(&mut State) -> R) -> R {
        let result = {
            let mut guard = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            f(Arc::make_mut(&mut *guard))
        };
        self.revision.send_modify(|rev| *rev += 1);
        result
    }

    /// Receive a tick after every write.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.revision.subscribe()
    }

    pub fn revision(&self) -> u64 {
        *self.revision.borrow()
    }
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}
