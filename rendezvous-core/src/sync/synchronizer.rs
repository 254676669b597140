//! Full-snapshot and targeted synchronization against the authority.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult, RemoteError};
use crate::event::Event;
use crate::remote::Authority;
use crate::remote::protocol::RequestScope;
use crate::store::Store;
use crate::sync::merge::{merge_events, merge_requests};

/// How one source of a full sync went.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceOutcome {
    Fetched(usize),
    Failed(String),
}

impl SourceOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, SourceOutcome::Failed(_))
    }
}

impl fmt::Display for SourceOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceOutcome::Fetched(n) => write!(f, "{} fetched", n),
            SourceOutcome::Failed(msg) => write!(f, "failed: {}", msg),
        }
    }
}

/// Summary of one full sync.
#[derive(Debug, Clone)]
pub struct SyncReport {
    pub events: SourceOutcome,
    pub requests: Vec<(RequestScope, SourceOutcome)>,
    pub created: usize,
    pub updated: usize,
    pub retained: usize,
    pub evicted: usize,
    pub dropped: usize,
}

impl SyncReport {
    pub fn has_failures(&self) -> bool {
        self.events.is_failed() || self.requests.iter().any(|(_, o)| o.is_failed())
    }

    pub fn is_unchanged(&self) -> bool {
        self.created == 0 && self.updated == 0 && self.evicted == 0 && self.dropped == 0
    }
}

/// Fetches snapshots from the authority and merges them into the store.
pub struct Synchronizer<A> {
    authority: Arc<A>,
    store: Arc<Store>,
    config: Arc<EngineConfig>,
}

impl<A> Clone for Synchronizer<A> {
    fn clone(&self) -> Self {
        Synchronizer {
            authority: Arc::clone(&self.authority),
            store: Arc::clone(&self.store),
            config: Arc::clone(&self.config),
        }
    }
}

fn outcome<T>(result: &Result<Vec<T>, RemoteError>) -> SourceOutcome {
    match result {
        Ok(items) => SourceOutcome::Fetched(items.len()),
        Err(e) => SourceOutcome::Failed(e.to_string()),
    }
}

impl<A: Authority> Synchronizer<A> {
    pub fn new(authority: Arc<A>, store: Arc<Store>, config: EngineConfig) -> Self {
        Synchronizer {
            authority,
            store,
            config: Arc::new(config),
        }
    }

    pub fn authority(&self) -> &Arc<A> {
        &self.authority
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub async fn sync_all(&self) -> SyncReport {
        self.sync_all_at(Utc::now()).await
    }

    /// Fetch events and every request scope concurrently and merge whatever
    /// succeeded. A failed source leaves its part of the cache as it was.
    pub async fn sync_all_at(&self, now: DateTime<Utc>) -> SyncReport {
        let authority = &self.authority;
        let (events, incoming, outgoing, joins) = tokio::join!(
            authority.list_events(),
            authority.list_requests(RequestScope::Incoming),
            authority.list_requests(RequestScope::Outgoing),
            authority.list_requests(RequestScope::Join),
        );

        let mut report = SyncReport {
            events: outcome(&events),
            requests: vec![
                (RequestScope::Incoming, outcome(&incoming)),
                (RequestScope::Outgoing, outcome(&outgoing)),
                (RequestScope::Join, outcome(&joins)),
            ],
            created: 0,
            updated: 0,
            retained: 0,
            evicted: 0,
            dropped: 0,
        };

        let fetched: Vec<_> = [
            (RequestScope::Incoming, incoming),
            (RequestScope::Outgoing, outgoing),
            (RequestScope::Join, joins),
        ]
        .into_iter()
        .filter_map(|(scope, result)| match result {
            Ok(records) => Some((scope, records)),
            Err(e) => {
                tracing::warn!(scope = scope.as_str(), error = %e, "Request fetch failed");
                None
            }
        })
        .collect();

        let identity = authority.identity().to_string();
        let today = now.date_naive();
        let grace = self.config.past_grace();

        self.store.apply(|state| {
            match events {
                Ok(server) => {
                    let merge =
                        merge_events(&state.events, &state.missing_since, server, today, now, grace);
                    report.created = merge.created;
                    report.updated = merge.updated;
                    report.retained = merge.retained;
                    report.evicted = merge.evicted.len();
                    report.dropped = merge.dropped.len();
                    for id in merge.removed() {
                        tracing::debug!(event_id = %id, "Event no longer cached");
                    }
                    state.events = merge.events;
                    state.missing_since = merge.missing_since;
                    state.last_sync = Some(now);
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Event fetch failed, keeping cached events");
                }
            }

            let in_flight = state.in_flight_pairs();
            let merge = merge_requests(&state.requests, &fetched, &identity, &state.events, &in_flight);
            tracing::debug!(
                kept = merge.kept_local,
                overlaid = merge.overlaid,
                "Merged requests"
            );
            state.requests = merge.requests;
        });

        tracing::info!(
            created = report.created,
            updated = report.updated,
            retained = report.retained,
            evicted = report.evicted,
            dropped = report.dropped,
            "Sync finished"
        );
        report
    }

    /// Re-fetch one event. A not-found answer purges it locally.
    pub async fn refresh_event(&self, event_id: &str) -> EngineResult<Event> {
        match self.authority.fetch_event(event_id).await {
            Ok(event) => {
                self.store.apply(|state| state.upsert_event(event.clone()));
                Ok(event)
            }
            Err(e) if e.is_not_found() => Err(self.purge(event_id)),
            Err(e) => Err(e.into()),
        }
    }

    /// Replace the cached requests of one event with the authority's list,
    /// except for pairs with a local action in flight.
    pub async fn resync_event_requests(&self, event_id: &str) -> EngineResult<usize> {
        match self.authority.fetch_event_requests(event_id).await {
            Ok(records) => {
                let count = records.len();
                self.store
                    .apply(|state| state.replace_requests_for_event(event_id, records));
                tracing::debug!(event_id, count, "Resynced event requests");
                Ok(count)
            }
            Err(e) if e.is_not_found() => Err(self.purge(event_id)),
            Err(e) => Err(e.into()),
        }
    }

    fn purge(&self, event_id: &str) -> EngineError {
        tracing::info!(event_id, "Event gone from the authority, purging");
        self.store.apply(|state| state.remove_event(event_id));
        EngineError::Stale(format!("event '{}'", event_id))
    }
}
