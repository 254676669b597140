//! End-to-end membership flows across several users sharing one authority.

mod support;

use std::collections::{BTreeSet, HashSet};

use chrono::Weekday;
use rendezvous_core::{
    Authority, DateRange, Outcome, RecurrenceKind, RecurrenceRule, Relationship, Schedule,
};
use support::{FakeAuthority, day, engine, event};

async fn join_and_wait(authority: &FakeAuthority, event_id: &str) -> Relationship {
    let engine = engine(authority);
    engine.sync_all().await;
    engine
        .reconciler()
        .request_join(event_id, authority.identity())
        .unwrap()
        .wait()
        .await
        .unwrap();
    engine.classify(event_id, authority.identity()).unwrap()
}

#[tokio::test]
async fn test_capacity_fills_at_the_limit() {
    let org = FakeAuthority::new("org");
    org.add_event(event("e1", "org", 2));
    let organizer = engine(&org);

    let accept_pending = |subject: &'static str| {
        let organizer = &organizer;
        async move {
            organizer.sync_all().await;
            let request_id = organizer
                .snapshot()
                .pending_for("e1", subject)
                .map(|r| r.id.clone())
                .unwrap();
            organizer
                .reconciler()
                .respond(&request_id, true)
                .unwrap()
                .wait()
                .await
                .unwrap()
        }
    };

    let a = org.as_user("a");
    assert_eq!(join_and_wait(&a, "e1").await, Relationship::Waiting);
    assert!(matches!(accept_pending("a").await, Outcome::Applied(_)));
    assert_eq!(
        organizer.accepted_participants("e1").unwrap(),
        BTreeSet::from(["a".to_string()])
    );
    assert!(!organizer.is_full("e1").unwrap());

    let b = org.as_user("b");
    assert_eq!(join_and_wait(&b, "e1").await, Relationship::Waiting);
    accept_pending("b").await;
    assert!(organizer.is_full("e1").unwrap());

    let c = org.as_user("c");
    assert_eq!(join_and_wait(&c, "e1").await, Relationship::Waiting);
    organizer.sync_all().await;
    assert!(organizer.is_full("e1").unwrap());
    assert_eq!(organizer.classify("e1", "c").unwrap(), Relationship::Waiting);
}

#[tokio::test]
async fn test_weekly_event_occurrences() {
    let org = FakeAuthority::new("org");
    let mut e = event("e1", "org", 10);
    e.schedule = Schedule::Recurring(RecurrenceRule {
        start: day(2024, 1, 1),
        time: None,
        kind: RecurrenceKind::Weekly {
            days: HashSet::from([Weekday::Mon, Weekday::Wed]),
        },
    });
    org.add_event(e);
    let engine = engine(&org);
    engine.sync_all().await;

    assert!(engine.occurs_on("e1", day(2024, 1, 3)).unwrap());
    assert!(engine.occurs_on("e1", day(2024, 1, 8)).unwrap());
    assert!(!engine.occurs_on("e1", day(2024, 1, 2)).unwrap());
    assert!(!engine.occurs_on("e1", day(2023, 12, 25)).unwrap());

    let range = DateRange::new(day(2023, 12, 25), day(2024, 1, 14)).unwrap();
    let dates = engine
        .occurrences("e1", Some(range), day(2024, 1, 1))
        .unwrap();
    assert_eq!(
        dates,
        vec![
            day(2024, 1, 1),
            day(2024, 1, 3),
            day(2024, 1, 8),
            day(2024, 1, 10)
        ]
    );
}

#[tokio::test]
async fn test_invite_after_rejection_yields_invited() {
    let org = FakeAuthority::new("org");
    org.add_event(event("e1", "org", 5));
    let d = org.as_user("d");

    assert_eq!(join_and_wait(&d, "e1").await, Relationship::Waiting);

    let organizer = engine(&org);
    organizer.sync_all().await;
    let request_id = organizer
        .snapshot()
        .pending_for("e1", "d")
        .map(|r| r.id.clone())
        .unwrap();
    organizer
        .reconciler()
        .respond(&request_id, false)
        .unwrap()
        .wait()
        .await
        .unwrap();
    assert_eq!(organizer.classify("e1", "d").unwrap(), Relationship::Rejected);

    organizer
        .reconciler()
        .invite("e1", "org", "d")
        .unwrap()
        .wait()
        .await
        .unwrap();
    assert_eq!(organizer.classify("e1", "d").unwrap(), Relationship::Invited);

    let invitee = engine(&d);
    invitee.sync_all().await;
    assert_eq!(invitee.classify("e1", "d").unwrap(), Relationship::Invited);
}

#[tokio::test]
async fn test_two_devices_converge_after_sync() {
    let org = FakeAuthority::new("org");
    org.add_event(event("e1", "org", 5));
    let phone = org.as_user("alice");
    let laptop = phone.clone();

    let on_phone = engine(&phone);
    let on_laptop = engine(&laptop);
    on_phone.sync_all().await;
    on_laptop.sync_all().await;

    on_phone
        .reconciler()
        .request_join("e1", "alice")
        .unwrap()
        .wait()
        .await
        .unwrap();

    // The laptop has not heard about it yet; its own join is a benign race.
    let outcome = on_laptop
        .reconciler()
        .request_join("e1", "alice")
        .unwrap()
        .wait()
        .await
        .unwrap();
    assert_eq!(outcome, Outcome::Resynced);

    let phone_requests: Vec<_> = on_phone.snapshot().requests.keys().cloned().collect();
    let laptop_requests: Vec<_> = on_laptop.snapshot().requests.keys().cloned().collect();
    assert_eq!(phone_requests, laptop_requests);
}

#[tokio::test]
async fn test_join_withdrawn_on_other_device_is_dropped_by_sync() {
    let org = FakeAuthority::new("org");
    org.add_event(event("e1", "org", 5));
    let phone = org.as_user("alice");
    let laptop = phone.clone();

    let on_phone = engine(&phone);
    on_phone.sync_all().await;
    on_phone
        .reconciler()
        .request_join("e1", "alice")
        .unwrap()
        .wait()
        .await
        .unwrap();
    assert_eq!(on_phone.classify("e1", "alice").unwrap(), Relationship::Waiting);

    let on_laptop = engine(&laptop);
    on_laptop.sync_all().await;
    let cancel = on_laptop.reconciler().cancel_request("e1", "alice").unwrap();
    assert_eq!(cancel.wait().await.unwrap(), Outcome::Removed);

    on_phone.sync_all().await;
    assert_eq!(on_phone.classify("e1", "alice").unwrap(), Relationship::NonMember);
    assert_eq!(on_phone.snapshot().requests_for("e1").count(), 0);

    // A fresh join reaches the authority instead of being swallowed as a duplicate.
    let joins_before = phone.calls("join");
    let outcome = on_phone
        .reconciler()
        .request_join("e1", "alice")
        .unwrap()
        .wait()
        .await
        .unwrap();
    assert!(matches!(outcome, Outcome::Applied(_)));
    assert_eq!(phone.calls("join"), joins_before + 1);
}
