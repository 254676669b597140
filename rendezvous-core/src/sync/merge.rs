//! Merge policy for full server snapshots.
//!
//! Both merges are pure: they take the cached maps and what the authority
//! returned, and produce the next maps plus counters for the sync report.

use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Duration, NaiveDate, Utc};

use crate::event::{Event, EventId, RequestId};
use crate::remote::protocol::RequestScope;
use crate::request::{MembershipRequest, PairKey, RequestKind};

/// Result of merging an event snapshot into the cache.
#[derive(Debug, Default)]
pub struct EventMerge {
    pub events: BTreeMap<EventId, Event>,
    pub missing_since: BTreeMap<EventId, DateTime<Utc>>,
    pub created: usize,
    pub updated: usize,
    /// Past events kept although the snapshot omitted them
    pub retained: usize,
    /// Retained past events whose grace period ran out
    pub evicted: Vec<EventId>,
    /// Upcoming events the snapshot no longer contains
    pub dropped: Vec<EventId>,
}

impl EventMerge {
    /// Ids that were cached before and are gone after the merge.
    pub fn removed(&self) -> impl Iterator<Item = &EventId> {
        self.evicted.iter().chain(self.dropped.iter())
    }
}

/// `server ∪ {past local events the server omitted}`.
///
/// Every server event replaces its cached copy. Omitted past events stay until
/// they have been missing for longer than `grace`.
pub fn merge_events(
    local: &BTreeMap<EventId, Event>,
    missing_since: &BTreeMap<EventId, DateTime<Utc>>,
    server: Vec<Event>,
    today: NaiveDate,
    now: DateTime<Utc>,
    grace: Duration,
) -> EventMerge {
    let mut merge = EventMerge::default();

    for event in server {
        match local.get(&event.id) {
            None => merge.created += 1,
            Some(cached) if *cached != event => merge.updated += 1,
            Some(_) => {}
        }
        merge.events.insert(event.id.clone(), event);
    }

    for (id, cached) in local {
        if merge.events.contains_key(id) {
            continue;
        }
        if !cached.is_past(today) {
            merge.dropped.push(id.clone());
            continue;
        }

        let since = missing_since.get(id).copied().unwrap_or(now);
        if now - since > grace {
            merge.evicted.push(id.clone());
            continue;
        }

        merge.retained += 1;
        merge.missing_since.insert(id.clone(), since);
        merge.events.insert(id.clone(), cached.clone());
    }

    merge
}

/// Whether a successful fetch of `scope` would have returned `request`.
///
/// `organizer_of` resolves the organizer of the request's event, when known.
pub fn scope_covers(
    scope: RequestScope,
    request: &MembershipRequest,
    identity: &str,
    organizer_of: impl Fn(&str) -> Option<String>,
) -> bool {
    match (scope, request.kind) {
        (RequestScope::Incoming, RequestKind::Invite) => request.target_id == identity,
        (RequestScope::Outgoing, RequestKind::Invite) => request.requester_id == identity,
        (RequestScope::Join, RequestKind::Join) => {
            request.requester_id == identity
                || organizer_of(&request.event_id).is_some_and(|org| org == identity)
        }
        _ => false,
    }
}

/// Join requests the identity raised or that concern an event it organizes.
pub fn is_owned(
    request: &MembershipRequest,
    identity: &str,
    organizer_of: impl Fn(&str) -> Option<String>,
) -> bool {
    request.kind == RequestKind::Join
        && (request.requester_id == identity
            || organizer_of(&request.event_id).is_some_and(|org| org == identity))
}

#[derive(Debug, Default)]
pub struct RequestMerge {
    pub requests: BTreeMap<RequestId, MembershipRequest>,
    /// Local records kept on top of the snapshot
    pub kept_local: usize,
    pub overlaid: usize,
}

/// Merge the request scopes that were fetched successfully into the cache.
///
/// Cached records stay when no successful scope covers them, when they are
/// owned local join stand-ins the authority has not confirmed yet, or when
/// their pair has a local action in flight. Server-issued records a
/// successful scope no longer lists are gone from the authority and dropped.
/// Server records then overlay, replacing local stand-ins for the same pair.
/// Records of events that are no longer cached are dropped.
pub fn merge_requests(
    local: &BTreeMap<RequestId, MembershipRequest>,
    fetched: &[(RequestScope, Vec<MembershipRequest>)],
    identity: &str,
    events: &BTreeMap<EventId, Event>,
    in_flight: &HashSet<PairKey>,
) -> RequestMerge {
    let organizer_of = |event_id: &str| events.get(event_id).map(|e| e.organizer_id.clone());
    let covered = |r: &MembershipRequest| {
        fetched
            .iter()
            .any(|(scope, _)| scope_covers(*scope, r, identity, organizer_of))
    };

    let mut merge = RequestMerge::default();

    for (id, cached) in local {
        if !events.contains_key(&cached.event_id) {
            continue;
        }
        let keep = !covered(cached)
            || (cached.is_local() && is_owned(cached, identity, organizer_of))
            || in_flight.contains(&cached.pair());
        if keep {
            merge.requests.insert(id.clone(), cached.clone());
            merge.kept_local += 1;
        }
    }

    for record in fetched.iter().flat_map(|(_, records)| records) {
        if !events.contains_key(&record.event_id) || in_flight.contains(&record.pair()) {
            continue;
        }
        let pair = record.pair();
        merge
            .requests
            .retain(|_, r| !(r.is_local() && r.kind == record.kind && r.pair() == pair));
        merge.requests.insert(record.id.clone(), record.clone());
        merge.overlaid += 1;
    }

    merge
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{Schedule, Visibility};
    use crate::request::RequestStatus;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn event(id: &str, date: NaiveDate, title: &str) -> Event {
        Event {
            id: id.into(),
            organizer_id: "org".into(),
            title: title.into(),
            description: None,
            location: None,
            schedule: Schedule::Once { date, time: None },
            max_participants: 5,
            participants: vec![],
            participant_count: 0,
            visibility: Visibility::All,
            excluded_users: vec![],
            created_at: Utc::now(),
        }
    }

    fn by_id(events: Vec<Event>) -> BTreeMap<EventId, Event> {
        events.into_iter().map(|e| (e.id.clone(), e)).collect()
    }

    fn request(id: &str, kind: RequestKind, requester: &str, target: &str) -> MembershipRequest {
        MembershipRequest {
            id: id.into(),
            event_id: "e1".into(),
            kind,
            requester_id: requester.into(),
            target_id: target.into(),
            status: RequestStatus::Pending,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_missing_past_event_kept_and_updated_event_replaced() {
        let today = day(2024, 6, 1);
        let local = by_id(vec![
            event("x", day(2024, 1, 1), "Old meetup"),
            event("y", day(2024, 7, 1), "Before"),
        ]);
        let server = vec![event("y", day(2024, 7, 1), "After")];

        let merge = merge_events(
            &local,
            &BTreeMap::new(),
            server,
            today,
            Utc::now(),
            Duration::days(30),
        );

        assert!(merge.events.contains_key("x"));
        assert_eq!(merge.events["y"].title, "After");
        assert_eq!(merge.updated, 1);
        assert_eq!(merge.retained, 1);
        assert!(merge.missing_since.contains_key("x"));
    }

    #[test]
    fn test_missing_upcoming_event_dropped() {
        let local = by_id(vec![event("z", day(2024, 8, 1), "Cancelled")]);
        let merge = merge_events(
            &local,
            &BTreeMap::new(),
            vec![],
            day(2024, 6, 1),
            Utc::now(),
            Duration::days(30),
        );
        assert!(merge.events.is_empty());
        assert_eq!(merge.dropped, vec!["z".to_string()]);
    }

    #[test]
    fn test_grace_period_evicts_long_missing_events() {
        let now = Utc::now();
        let local = by_id(vec![event("x", day(2024, 1, 1), "Old")]);
        let mut missing = BTreeMap::new();
        missing.insert("x".to_string(), now - Duration::days(31));

        let merge = merge_events(&local, &missing, vec![], day(2024, 6, 1), now, Duration::days(30));
        assert!(merge.events.is_empty());
        assert_eq!(merge.evicted, vec!["x".to_string()]);
    }

    #[test]
    fn test_owned_pending_join_survives_snapshot_without_it() {
        let events = by_id(vec![event("e1", day(2024, 7, 1), "Hike")]);
        let mut local = BTreeMap::new();
        let mine = MembershipRequest::synthesize_join("e1", "me", RequestStatus::Pending);
        local.insert(mine.id.clone(), mine.clone());
        let stale_invite = request("r-old", RequestKind::Invite, "org", "me");
        local.insert(stale_invite.id.clone(), stale_invite);

        let fetched = vec![
            (RequestScope::Incoming, vec![]),
            (RequestScope::Join, vec![]),
        ];
        let merge = merge_requests(&local, &fetched, "me", &events, &HashSet::new());

        assert!(merge.requests.contains_key(&mine.id));
        assert!(!merge.requests.contains_key("r-old"));
    }

    #[test]
    fn test_confirmed_join_missing_from_snapshot_is_dropped() {
        let events = by_id(vec![event("e1", day(2024, 7, 1), "Hike")]);
        let mut local = BTreeMap::new();
        // Withdrawn from another device since the last sync
        let withdrawn = request("srv-7", RequestKind::Join, "me", "org");
        local.insert(withdrawn.id.clone(), withdrawn);

        let fetched = vec![(RequestScope::Join, vec![])];
        let merge = merge_requests(&local, &fetched, "me", &events, &HashSet::new());
        assert!(merge.requests.is_empty());

        let in_flight: HashSet<PairKey> = [("e1".to_string(), "me".to_string())].into();
        let merge = merge_requests(&local, &fetched, "me", &events, &in_flight);
        assert!(merge.requests.contains_key("srv-7"));
    }

    #[test]
    fn test_failed_scope_leaves_its_records_untouched() {
        let events = by_id(vec![event("e1", day(2024, 7, 1), "Hike")]);
        let mut local = BTreeMap::new();
        let invite = request("r1", RequestKind::Invite, "org", "me");
        local.insert(invite.id.clone(), invite);

        // Incoming failed, only Join came back
        let fetched = vec![(RequestScope::Join, vec![])];
        let merge = merge_requests(&local, &fetched, "me", &events, &HashSet::new());
        assert!(merge.requests.contains_key("r1"));
    }

    #[test]
    fn test_server_record_replaces_stand_in_unless_in_flight() {
        let events = by_id(vec![event("e1", day(2024, 7, 1), "Hike")]);
        let mut local = BTreeMap::new();
        let mine = MembershipRequest::synthesize_join("e1", "me", RequestStatus::Pending);
        local.insert(mine.id.clone(), mine.clone());

        let mut confirmed = request("srv-1", RequestKind::Join, "me", "org");
        confirmed.status = RequestStatus::Accepted;
        let fetched = vec![(RequestScope::Join, vec![confirmed])];

        let merge = merge_requests(&local, &fetched, "me", &events, &HashSet::new());
        assert_eq!(merge.requests.len(), 1);
        assert!(merge.requests.contains_key("srv-1"));

        let in_flight: HashSet<PairKey> = [("e1".to_string(), "me".to_string())].into();
        let merge = merge_requests(&local, &fetched, "me", &events, &in_flight);
        assert_eq!(merge.requests.len(), 1);
        assert!(merge.requests.contains_key(&mine.id));
    }

    #[test]
    fn test_requests_of_vanished_events_are_purged() {
        let mut local = BTreeMap::new();
        let r = request("r1", RequestKind::Invite, "org", "me");
        local.insert(r.id.clone(), r);
        let merge = merge_requests(&local, &[], "me", &BTreeMap::new(), &HashSet::new());
        assert!(merge.requests.is_empty());
    }
}
