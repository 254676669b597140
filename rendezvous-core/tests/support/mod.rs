//! In-memory authority shared by the integration tests.
//!
//! Several [`FakeAuthority`] handles can share one [`Server`], each acting as
//! a different user, so multi-user and multi-device flows run against the
//! same authoritative data.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use rendezvous_core::remote::RemoteResult;
use rendezvous_core::{
    Authority, ChannelService, Engine, EngineConfig, Event, EventDraft, InviteParams,
    MembershipRequest, RemoteError, RequestKind, RequestScope, RequestStatus, Schedule, UserId,
    Visibility,
};
use tokio::sync::Notify;

#[derive(Default)]
pub struct Server {
    pub events: BTreeMap<String, Event>,
    pub requests: BTreeMap<String, MembershipRequest>,
    pub auto_accept: HashSet<UserId>,
    invite_keys: HashMap<String, String>,
    next_id: u64,
}

impl Server {
    fn next_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{}{}", prefix, self.next_id)
    }

    fn event(&self, event_id: &str) -> RemoteResult<&Event> {
        self.events
            .get(event_id)
            .ok_or_else(|| RemoteError::NotFound(format!("event {}", event_id)))
    }

    fn accept(&mut self, request_id: &str) {
        let Some(request) = self.requests.get_mut(request_id) else {
            return;
        };
        request.status = RequestStatus::Accepted;
        let subject = request.subject().to_string();
        if let Some(event) = self.events.get_mut(&request.event_id) {
            if !event.participants.contains(&subject) {
                event.participants.push(subject);
                event.participant_count += 1;
            }
        }
    }

    fn is_full(&self, event: &Event) -> bool {
        event.participants.len() >= event.max_participants as usize
    }

    fn has_open_request(&self, event_id: &str, subject: &str) -> bool {
        self.requests.values().any(|r| {
            r.event_id == event_id
                && r.subject() == subject
                && matches!(r.status, RequestStatus::Pending | RequestStatus::Accepted)
        })
    }

    /// Organizer-side removal of an accepted participant.
    pub fn remove_participant(&mut self, event_id: &str, user_id: &str) {
        for request in self.requests.values_mut() {
            if request.event_id == event_id
                && request.subject() == user_id
                && request.status == RequestStatus::Accepted
            {
                request.status = RequestStatus::Removed;
            }
        }
        if let Some(event) = self.events.get_mut(event_id) {
            event.participants.retain(|p| p != user_id);
            event.participant_count = event.participants.len() as u32;
        }
    }
}

#[derive(Clone)]
pub struct FakeAuthority {
    identity: UserId,
    pub server: Arc<Mutex<Server>>,
    failures: Arc<Mutex<HashMap<&'static str, VecDeque<RemoteError>>>>,
    holds: Arc<Mutex<HashMap<&'static str, Arc<Notify>>>>,
    calls: Arc<Mutex<Vec<&'static str>>>,
    lost: Arc<Mutex<HashSet<&'static str>>>,
    expired: Arc<AtomicBool>,
}

impl FakeAuthority {
    pub fn new(identity: &str) -> Self {
        FakeAuthority {
            identity: identity.to_string(),
            server: Arc::new(Mutex::new(Server::default())),
            failures: Arc::default(),
            holds: Arc::default(),
            calls: Arc::default(),
            lost: Arc::default(),
            expired: Arc::default(),
        }
    }

    /// Another user talking to the same server, with its own failures and call log.
    pub fn as_user(&self, identity: &str) -> Self {
        FakeAuthority {
            identity: identity.to_string(),
            server: Arc::clone(&self.server),
            failures: Arc::default(),
            holds: Arc::default(),
            calls: Arc::default(),
            lost: Arc::default(),
            expired: Arc::default(),
        }
    }

    pub fn server(&self) -> std::sync::MutexGuard<'_, Server> {
        self.server.lock().unwrap()
    }

    pub fn add_event(&self, event: Event) {
        self.server().events.insert(event.id.clone(), event);
    }

    /// Record a pending join for this identity without going through the engine.
    pub fn join_directly(&self, event_id: &str) -> String {
        let mut server = self.server();
        let id = server.next_id("r");
        let request = MembershipRequest {
            id: id.clone(),
            event_id: event_id.to_string(),
            kind: RequestKind::Join,
            requester_id: self.identity.clone(),
            target_id: self.identity.clone(),
            status: RequestStatus::Pending,
            created_at: Utc::now(),
        };
        server.requests.insert(id.clone(), request);
        id
    }

    pub fn fail_next(&self, op: &'static str, error: RemoteError) {
        self.failures
            .lock()
            .unwrap()
            .entry(op)
            .or_default()
            .push_back(error);
    }

    /// Make calls to `op` wait until the returned handle is notified.
    pub fn hold(&self, op: &'static str) -> Arc<Notify> {
        let notify = Arc::new(Notify::new());
        self.holds.lock().unwrap().insert(op, Arc::clone(&notify));
        notify
    }

    /// The next `op` takes effect on the server but the caller sees a transient error.
    pub fn lose_next_response(&self, op: &'static str) {
        self.lost.lock().unwrap().insert(op);
    }

    pub fn set_expired(&self, expired: bool) {
        self.expired.store(expired, Ordering::SeqCst);
    }

    fn respond<T>(&self, op: &'static str, value: T) -> RemoteResult<T> {
        if self.lost.lock().unwrap().remove(op) {
            return Err(RemoteError::Transient {
                status: 504,
                message: "gateway timeout".into(),
            });
        }
        Ok(value)
    }

    pub fn calls(&self, op: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| **c == op).count()
    }

    async fn enter(&self, op: &'static str) -> RemoteResult<()> {
        self.calls.lock().unwrap().push(op);
        let hold = self.holds.lock().unwrap().remove(op);
        if let Some(notify) = hold {
            notify.notified().await;
        }
        if self.expired.load(Ordering::SeqCst) {
            return Err(RemoteError::Unauthorized);
        }
        match self.failures.lock().unwrap().get_mut(op).and_then(|q| q.pop_front()) {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl Authority for FakeAuthority {
    fn identity(&self) -> &str {
        &self.identity
    }

    async fn list_events(&self) -> RemoteResult<Vec<Event>> {
        self.enter("list_events").await?;
        Ok(self.server().events.values().cloned().collect())
    }

    async fn list_requests(&self, scope: RequestScope) -> RemoteResult<Vec<MembershipRequest>> {
        self.enter(match scope {
            RequestScope::Incoming => "list_incoming",
            RequestScope::Outgoing => "list_outgoing",
            RequestScope::Join => "list_join",
        })
        .await?;
        let server = self.server();
        let me = self.identity.as_str();
        Ok(server
            .requests
            .values()
            .filter(|r| match (scope, r.kind) {
                (RequestScope::Incoming, RequestKind::Invite) => r.target_id == me,
                (RequestScope::Outgoing, RequestKind::Invite) => r.requester_id == me,
                (RequestScope::Join, RequestKind::Join) => {
                    r.requester_id == me
                        || server
                            .events
                            .get(&r.event_id)
                            .is_some_and(|e| e.organizer_id == me)
                }
                _ => false,
            })
            .cloned()
            .collect())
    }

    async fn fetch_event(&self, event_id: &str) -> RemoteResult<Event> {
        self.enter("fetch_event").await?;
        self.server().event(event_id).cloned()
    }

    async fn fetch_event_requests(&self, event_id: &str) -> RemoteResult<Vec<MembershipRequest>> {
        self.enter("fetch_event_requests").await?;
        let server = self.server();
        server.event(event_id)?;
        Ok(server
            .requests
            .values()
            .filter(|r| r.event_id == event_id)
            .cloned()
            .collect())
    }

    async fn create_event(&self, draft: &EventDraft) -> RemoteResult<Event> {
        self.enter("create_event").await?;
        let mut server = self.server();
        let id = server.next_id("e");
        let event = Event {
            id: id.clone(),
            organizer_id: self.identity.clone(),
            title: draft.title.clone(),
            description: draft.description.clone(),
            location: draft.location.clone(),
            schedule: draft.schedule.clone(),
            max_participants: draft.max_participants,
            participants: vec![],
            participant_count: 0,
            visibility: draft.visibility,
            excluded_users: draft.excluded_users.clone(),
            created_at: Utc::now(),
        };
        server.events.insert(id, event.clone());
        Ok(event)
    }

    async fn delete_event(&self, event_id: &str) -> RemoteResult<()> {
        self.enter("delete_event").await?;
        let mut server = self.server();
        if server.event(event_id)?.organizer_id != self.identity {
            return Err(RemoteError::Forbidden("not the organizer".into()));
        }
        server.events.remove(event_id);
        server.requests.retain(|_, r| r.event_id != event_id);
        Ok(())
    }

    async fn join(&self, event_id: &str) -> RemoteResult<MembershipRequest> {
        self.enter("join").await?;
        let mut server = self.server();
        let event = server.event(event_id)?.clone();
        if event.participants.contains(&self.identity)
            || server.has_open_request(event_id, &self.identity)
        {
            return Err(RemoteError::from_status(400, "User already requested to join"));
        }

        let id = server.next_id("r");
        let request = MembershipRequest {
            id: id.clone(),
            event_id: event_id.to_string(),
            kind: RequestKind::Join,
            requester_id: self.identity.clone(),
            target_id: self.identity.clone(),
            status: RequestStatus::Pending,
            created_at: Utc::now(),
        };
        server.requests.insert(id.clone(), request);
        if server.auto_accept.contains(&event.organizer_id) && !server.is_full(&event) {
            server.accept(&id);
        }
        let stored = server.requests[&id].clone();
        self.respond("join", stored)
    }

    async fn invite(&self, event_id: &str, params: &InviteParams) -> RemoteResult<MembershipRequest> {
        self.enter("invite").await?;
        let mut server = self.server();
        if server.event(event_id)?.organizer_id != self.identity {
            return Err(RemoteError::Forbidden("not the organizer".into()));
        }
        if let Some(existing) = server.invite_keys.get(&params.idempotency_key) {
            if let Some(request) = server.requests.get(existing) {
                return Ok(request.clone());
            }
        }
        if server.has_open_request(event_id, &params.invitee_id) {
            return Err(RemoteError::from_status(409, "already invited"));
        }

        let id = server.next_id("r");
        let request = MembershipRequest {
            id: id.clone(),
            event_id: event_id.to_string(),
            kind: RequestKind::Invite,
            requester_id: self.identity.clone(),
            target_id: params.invitee_id.clone(),
            status: RequestStatus::Pending,
            created_at: Utc::now(),
        };
        server.requests.insert(id.clone(), request.clone());
        server
            .invite_keys
            .insert(params.idempotency_key.clone(), id);
        self.respond("invite", request)
    }

    async fn respond_invitation(
        &self,
        request_id: &str,
        accept: bool,
    ) -> RemoteResult<MembershipRequest> {
        self.enter("respond_invitation").await?;
        let mut server = self.server();
        let request = server
            .requests
            .get(request_id)
            .cloned()
            .ok_or_else(|| RemoteError::NotFound(request_id.to_string()))?;
        if request.target_id != self.identity {
            return Err(RemoteError::Forbidden("not the invitee".into()));
        }
        if request.status != RequestStatus::Pending {
            return Err(RemoteError::from_status(409, "already answered"));
        }
        if accept {
            server.accept(request_id);
        } else if let Some(r) = server.requests.get_mut(request_id) {
            r.status = RequestStatus::Rejected;
        }
        Ok(server.requests[request_id].clone())
    }

    async fn decide_join(
        &self,
        event_id: &str,
        request_id: &str,
        accept: bool,
    ) -> RemoteResult<MembershipRequest> {
        self.enter("decide_join").await?;
        let mut server = self.server();
        if server.event(event_id)?.organizer_id != self.identity {
            return Err(RemoteError::Forbidden("not the organizer".into()));
        }
        let status = server
            .requests
            .get(request_id)
            .map(|r| r.status)
            .ok_or_else(|| RemoteError::NotFound(request_id.to_string()))?;
        if status != RequestStatus::Pending {
            return Err(RemoteError::from_status(409, "already decided"));
        }
        if accept {
            server.accept(request_id);
        } else if let Some(r) = server.requests.get_mut(request_id) {
            r.status = RequestStatus::Rejected;
        }
        Ok(server.requests[request_id].clone())
    }

    async fn cancel_request(&self, _event_id: &str, request_id: &str) -> RemoteResult<()> {
        self.enter("cancel_request").await?;
        let mut server = self.server();
        match server.requests.get(request_id) {
            None => Err(RemoteError::NotFound(request_id.to_string())),
            Some(r) if r.requester_id != self.identity => {
                Err(RemoteError::Forbidden("not the requester".into()))
            }
            Some(_) => {
                server.requests.remove(request_id);
                Ok(())
            }
        }
    }

    async fn cancel_participation(&self, event_id: &str) -> RemoteResult<()> {
        self.enter("cancel_participation").await?;
        let mut server = self.server();
        server.event(event_id)?;
        let me = self.identity.clone();
        server
            .requests
            .retain(|_, r| !(r.event_id == event_id && r.subject() == me));
        if let Some(event) = server.events.get_mut(event_id) {
            event.participants.retain(|p| *p != me);
            event.participant_count = event.participants.len() as u32;
        }
        Ok(())
    }
}

/// Records channel setups; can be told to fail a number of times first.
#[derive(Default)]
pub struct FakeChannels {
    pub ensured: Mutex<Vec<(String, UserId)>>,
    pub failures_left: Mutex<u32>,
    pub notify: Notify,
}

#[async_trait]
impl ChannelService for FakeChannels {
    async fn ensure_channel(&self, event_id: &str, member_id: &UserId) -> RemoteResult<()> {
        {
            let mut left = self.failures_left.lock().unwrap();
            if *left > 0 {
                *left -= 1;
                return Err(RemoteError::Network("chat offline".into()));
            }
        }
        self.ensured
            .lock()
            .unwrap()
            .push((event_id.to_string(), member_id.clone()));
        self.notify.notify_one();
        Ok(())
    }
}

pub fn day(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn event(id: &str, organizer: &str, max_participants: u32) -> Event {
    Event {
        id: id.to_string(),
        organizer_id: organizer.to_string(),
        title: format!("Event {}", id),
        description: None,
        location: None,
        schedule: Schedule::Once {
            date: Utc::now().date_naive() + chrono::Duration::days(14),
            time: None,
        },
        max_participants,
        participants: vec![],
        participant_count: 0,
        visibility: Visibility::All,
        excluded_users: vec![],
        created_at: Utc::now(),
    }
}

pub fn past_event(id: &str, organizer: &str) -> Event {
    let mut e = event(id, organizer, 10);
    e.schedule = Schedule::Once {
        date: day(2020, 1, 1),
        time: None,
    };
    e
}

pub fn test_config() -> EngineConfig {
    EngineConfig {
        channel_retry_delay_ms: 1,
        ..Default::default()
    }
}

pub fn engine(authority: &FakeAuthority) -> Engine<FakeAuthority> {
    engine_with_channels(authority, Arc::new(FakeChannels::default()))
}

pub fn engine_with_channels(
    authority: &FakeAuthority,
    channels: Arc<FakeChannels>,
) -> Engine<FakeAuthority> {
    Engine::new(authority.clone(), channels, test_config()).unwrap()
}
