//! One session's engine: the store and every component wired to it.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::NaiveDate;
use tokio::sync::watch;

use crate::bridge::InvalidationBridge;
use crate::capacity;
use crate::config::EngineConfig;
use crate::date_range::DateRange;
use crate::error::{EngineError, EngineResult};
use crate::event::{Event, Schedule, UserId};
use crate::profile::{Profile, ProfilePatch};
use crate::reconciler::Reconciler;
use crate::relationship::{self, Relationship};
use crate::remote::{Authority, ChannelService};
use crate::store::{State, Store};
use crate::sync::{SyncReport, Synchronizer};

pub struct Engine<A> {
    store: Arc<Store>,
    sync: Synchronizer<A>,
    reconciler: Reconciler<A>,
    bridge: InvalidationBridge<A>,
}

impl<A: Authority + 'static> Engine<A> {
    pub fn new(
        authority: A,
        channels: Arc<dyn ChannelService>,
        config: EngineConfig,
    ) -> EngineResult<Self> {
        Self::with_state(authority, channels, config, State::default())
    }

    /// Start from a previously cached state.
    pub fn with_state(
        authority: A,
        channels: Arc<dyn ChannelService>,
        config: EngineConfig,
        state: State,
    ) -> EngineResult<Self> {
        config.validate()?;
        let store = Arc::new(Store::from_state(state));
        let sync = Synchronizer::new(Arc::new(authority), Arc::clone(&store), config);
        let reconciler = Reconciler::new(sync.clone(), channels);
        let bridge = InvalidationBridge::new(sync.clone());
        Ok(Engine {
            store,
            sync,
            reconciler,
            bridge,
        })
    }

    pub fn identity(&self) -> &str {
        self.sync.authority().identity()
    }

    pub fn config(&self) -> &EngineConfig {
        self.sync.config()
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    pub fn snapshot(&self) -> Arc<State> {
        self.store.snapshot()
    }

    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.store.subscribe()
    }

    pub fn reconciler(&self) -> &Reconciler<A> {
        &self.reconciler
    }

    pub fn synchronizer(&self) -> &Synchronizer<A> {
        &self.sync
    }

    pub fn bridge(&self) -> InvalidationBridge<A> {
        self.bridge.clone()
    }

    pub async fn sync_all(&self) -> SyncReport {
        self.sync.sync_all().await
    }

    fn event(&self, state: &State, event_id: &str) -> EngineResult<Event> {
        state
            .event(event_id)
            .cloned()
            .ok_or_else(|| EngineError::EventNotFound(event_id.to_string()))
    }

    pub fn classify(&self, event_id: &str, user_id: &str) -> EngineResult<Relationship> {
        let state = self.snapshot();
        let event = self.event(&state, event_id)?;
        Ok(relationship::classify(&event, user_id, state.requests_for(event_id)))
    }

    pub fn accepted_participants(&self, event_id: &str) -> EngineResult<BTreeSet<UserId>> {
        self.snapshot()
            .accepted_participants(event_id)
            .ok_or_else(|| EngineError::EventNotFound(event_id.to_string()))
    }

    pub fn is_full(&self, event_id: &str) -> EngineResult<bool> {
        let state = self.snapshot();
        let event = self.event(&state, event_id)?;
        let accepted = state
            .accepted_participants(event_id)
            .unwrap_or_default();
        Ok(capacity::is_full(&event, &accepted))
    }

    pub fn occurs_on(&self, event_id: &str, date: NaiveDate) -> EngineResult<bool> {
        let state = self.snapshot();
        Ok(self.event(&state, event_id)?.schedule.occurs_on(date))
    }

    /// Dates `event_id` takes place on within `range`, defaulting to the
    /// configured window around `today`.
    pub fn occurrences(
        &self,
        event_id: &str,
        range: Option<DateRange>,
        today: NaiveDate,
    ) -> EngineResult<Vec<NaiveDate>> {
        let state = self.snapshot();
        let event = self.event(&state, event_id)?;
        let range = range
            .unwrap_or_else(|| DateRange::around(today, self.config().occurrence_window_months));

        Ok(match &event.schedule {
            Schedule::Once { date, .. } if range.contains(*date) => vec![*date],
            Schedule::Once { .. } => vec![],
            Schedule::Recurring(rule) => rule.occurrences(&range),
        })
    }

    /// Cached events ordered by their next date. Past events are left out
    /// unless `include_past` is set.
    pub fn events(&self, include_past: bool, today: NaiveDate) -> Vec<Event> {
        let horizon = self.config().horizon_days();
        let mut events: Vec<Event> = self
            .snapshot()
            .events
            .values()
            .filter(|e| include_past || !e.is_past(today))
            .cloned()
            .collect();
        events.sort_by_key(|e| {
            (
                e.next_date(today, horizon).unwrap_or(NaiveDate::MAX),
                e.title.clone(),
            )
        });
        events
    }

    pub fn apply_profile_patch(&self, user_id: &str, patch: &ProfilePatch) -> Profile {
        self.store.apply(|state| state.patch_profile(user_id, patch))
    }
}
